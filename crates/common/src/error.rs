/// Error types that can be built from a plain message string.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Attach a human-readable prefix to a failure.
///
/// `E` is the crate error the failure is converted into. Crates alias this
/// with their own error via [`impl_context!`].
pub trait ContextFor<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T, E>;
}

impl<T, S, E> ContextFor<T, E> for Result<T, S>
where
    S: std::fmt::Display,
    E: FromMessage,
{
    fn context(self, context: impl Into<String>) -> Result<T, E> {
        self.map_err(|source| E::from_message(format!("{}: {source}", context.into())))
    }
}

impl<T, E: FromMessage> ContextFor<T, E> for Option<T> {
    fn context(self, context: impl Into<String>) -> Result<T, E> {
        self.ok_or_else(|| E::from_message(context.into()))
    }
}

/// Declare `Context<T>` for the error type named in the invoking module.
///
/// ```ignore
/// fastzap_common::impl_context!(Error);
/// ```
#[macro_export]
macro_rules! impl_context {
    ($error:ty) => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $error>;
        }

        impl<T, C: $crate::error::ContextFor<T, $error>> Context<T> for C {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $error> {
                $crate::error::ContextFor::<T, $error>::context(self, context)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Message(String);

    impl FromMessage for Message {
        fn from_message(message: String) -> Self {
            Self(message)
        }
    }

    #[test]
    fn result_context_prefixes_source() {
        let failed: Result<(), &str> = Err("disk full");
        let err: Result<(), Message> = failed.context("saving creds");
        assert_eq!(err, Err(Message("saving creds: disk full".into())));
    }

    #[test]
    fn option_context_uses_message_only() {
        let err: Result<u8, Message> = None.context("no qr");
        assert_eq!(err, Err(Message("no qr".into())));
    }
}
