//! WhatsApp JID normalisation.

/// Suffix of a one-to-one chat JID.
pub const USER_SUFFIX: &str = "@s.whatsapp.net";

/// Suffix of a group chat JID.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Turn a phone number in any human format into a user JID.
///
/// Already-qualified JIDs are returned unchanged.
pub fn format_phone(phone: &str) -> String {
    if phone.ends_with(USER_SUFFIX) {
        return phone.to_string();
    }
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}{USER_SUFFIX}")
}

/// Turn a group identifier (`<creator>-<timestamp>`) into a group JID.
pub fn format_group(group: &str) -> String {
    if group.ends_with(GROUP_SUFFIX) {
        return group.to_string();
    }
    let id: String = group
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    format!("{id}{GROUP_SUFFIX}")
}

/// Whether a JID addresses a group chat.
pub fn is_group(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_strips_formatting() {
        assert_eq!(format_phone("+55 (11) 98765-4321"), "5511987654321@s.whatsapp.net");
    }

    #[test]
    fn phone_keeps_qualified_jid() {
        assert_eq!(format_phone("123@s.whatsapp.net"), "123@s.whatsapp.net");
    }

    #[test]
    fn group_keeps_dash() {
        assert_eq!(format_group("1203630-1612345678"), "1203630-1612345678@g.us");
        assert_eq!(format_group("abc 12-34"), "12-34@g.us");
    }

    #[test]
    fn group_detection() {
        assert!(is_group("1-2@g.us"));
        assert!(!is_group("1@s.whatsapp.net"));
    }
}
