//! Characters a workbook cell can hold.
//!
//! XML 1.0 has no representation for most C0 controls, lone surrogates or
//! the non-characters U+FFFE/U+FFFF. Record fields are normalized through
//! [`sanitize`] so a record holds exactly the text its row will hold.

use std::borrow::Cow;

/// Stand-in for characters XML cannot carry.
pub const REPLACEMENT: char = '\u{FFFD}';

/// `true` for characters XML 1.0 can carry.
pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
        || ('\u{10000}'..='\u{10FFFF}').contains(&c)
}

/// Replaces characters XML cannot carry with U+FFFD.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(
            text.chars()
                .map(|c| if is_xml_char(c) { c } else { REPLACEMENT })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_control_characters() {
        assert_eq!(sanitize("plain\ttext\n"), "plain\ttext\n");
        assert!(matches!(sanitize("plain"), Cow::Borrowed(_)));
        assert_eq!(sanitize("a\u{0}b\u{1b}c\u{FFFE}"), "a\u{FFFD}b\u{FFFD}c\u{FFFD}");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize("bell\u{7} and vt\u{b}").into_owned();
        assert_eq!(sanitize(&once), once.as_str());
        assert!(once.chars().all(is_xml_char));
    }
}
