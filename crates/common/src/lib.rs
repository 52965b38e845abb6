//! Shared error plumbing and JID helpers used across all fastzap crates.

pub mod error;
pub mod jid;

pub use {
    error::FromMessage,
    jid::{GROUP_SUFFIX, USER_SUFFIX, format_group, format_phone},
};
