//! `${VAR}` and `${VAR:-fallback}` expansion for raw config text.

/// Expand placeholders from the process environment.
///
/// A placeholder whose variable is unset and has no fallback is kept
/// verbatim so the parse error points at it.
pub fn substitute_env(input: &str) -> String {
    expand(input, |name| std::env::var(name).ok())
}

fn expand(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pieces = input.split("${");
    if let Some(head) = pieces.next() {
        out.push_str(head);
    }

    for piece in pieces {
        let Some((inner, tail)) = piece.split_once('}') else {
            out.push_str("${");
            out.push_str(piece);
            continue;
        };
        let (name, fallback) = match inner.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (inner, None),
        };
        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(inner);
                out.push('}');
            },
        }
        out.push_str(tail);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        (name == "FASTZAP_WEBHOOK_HOST").then(|| "hooks.internal".to_string())
    }

    #[test]
    fn known_variable_is_replaced() {
        assert_eq!(
            expand("url = \"https://${FASTZAP_WEBHOOK_HOST}/wa\"", env),
            "url = \"https://hooks.internal/wa\""
        );
    }

    #[test]
    fn fallback_applies_only_when_unset() {
        assert_eq!(expand("${FASTZAP_PORT:-8000}", env), "8000");
        assert_eq!(expand("${FASTZAP_WEBHOOK_HOST:-localhost}", env), "hooks.internal");
    }

    #[test]
    fn unknown_variable_is_kept() {
        assert_eq!(expand("${FASTZAP_UNSET_TOKEN}", env), "${FASTZAP_UNSET_TOKEN}");
    }

    #[test]
    fn malformed_placeholders_are_literal() {
        assert_eq!(expand("token=${TOKEN", env), "token=${TOKEN");
        assert_eq!(expand("empty=${}", env), "empty=${}");
        assert_eq!(expand("cost=$5", env), "cost=$5");
    }
}
