//! Reversible backslash escaping for string values.
//!
//! Characters XML cannot carry reliably (controls, format characters,
//! private-use and non-ASCII separators) are written as `\uXXXX`; tab,
//! carriage return and newline use `\t`, `\r` and `\n`; a space at either end
//! of the value becomes `\s` so whitespace trimming on read cannot eat it; a
//! literal backslash is doubled. Characters outside the basic plane are
//! written as a UTF-16 surrogate pair.

use std::borrow::Cow;

use crate::error::ConversionError;

/// Escapes a string for its wire form. Borrows when nothing needs escaping.
pub fn escape(text: &str) -> Cow<'_, str> {
    let last = text.chars().count().saturating_sub(1);
    if !text
        .chars()
        .enumerate()
        .any(|(i, c)| needs_escape(c, i == 0 || i == last))
    {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for (i, c) in text.chars().enumerate() {
        let edge = i == 0 || i == last;
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ' ' if edge => out.push_str("\\s"),
            c if needs_escape(c, edge) => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04X}", unit));
                }
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Reverses [`escape`].
pub fn unescape(text: &str) -> Result<Cow<'_, str>, ConversionError> {
    if !text.contains('\\') {
        return Ok(Cow::Borrowed(text));
    }

    let fail = |reason: &str| ConversionError::new(text, "String", reason);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('s') => out.push(' '),
            Some('u') => {
                let unit = read_unit(&mut chars).ok_or_else(|| fail("malformed \\u escape"))?;
                if (0xD800..0xDC00).contains(&unit) {
                    let low = match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => read_unit(&mut chars),
                        _ => None,
                    }
                    .filter(|low| (0xDC00..0xE000).contains(low))
                    .ok_or_else(|| fail("unpaired high surrogate"))?;
                    let decoded = char::decode_utf16([unit, low])
                        .next()
                        .and_then(|r| r.ok())
                        .ok_or_else(|| fail("invalid surrogate pair"))?;
                    out.push(decoded);
                } else {
                    let decoded = char::from_u32(u32::from(unit))
                        .ok_or_else(|| fail("unpaired low surrogate"))?;
                    out.push(decoded);
                }
            }
            Some(other) => return Err(fail(&format!("unknown escape '\\{}'", other))),
            None => return Err(fail("dangling backslash")),
        }
    }
    Ok(Cow::Owned(out))
}

fn read_unit(chars: &mut std::str::Chars<'_>) -> Option<u16> {
    let hex: String = chars.by_ref().take(4).collect();
    if hex.len() != 4 {
        return None;
    }
    u16::from_str_radix(&hex, 16).ok()
}

fn needs_escape(c: char, edge: bool) -> bool {
    match c {
        '\\' | '\t' | '\r' | '\n' => true,
        ' ' => edge,
        c if c.is_control() => true,
        c => is_format(c) || is_private_use(c) || is_separator(c),
    }
}

/// Unicode general category Cf.
fn is_format(c: char) -> bool {
    matches!(
        c as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x0890..=0x0891
            | 0x08E2
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0x110BD
            | 0x110CD
            | 0x13430..=0x1343F
            | 0x1BCA0..=0x1BCA3
            | 0x1D173..=0x1D17A
            | 0xE0001
            | 0xE0020..=0xE007F
    )
}

/// Unicode general category Co.
fn is_private_use(c: char) -> bool {
    matches!(c as u32, 0xE000..=0xF8FF | 0xF0000..=0xFFFFD | 0x100000..=0x10FFFD)
}

/// Unicode general categories Zs, Zl and Zp, except the ASCII space.
fn is_separator(c: char) -> bool {
    matches!(
        c as u32,
        0x00A0 | 0x1680 | 0x2000..=0x200A | 0x2028 | 0x2029 | 0x202F | 0x205F | 0x3000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(s: &str) -> String {
        let escaped = escape(s).into_owned();
        unescape(&escaped).unwrap().into_owned()
    }

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(escape("hello world"), Cow::Borrowed(_)));
        assert!(matches!(unescape("hello world").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_whitespace_controls() {
        assert_eq!(escape("a\tb\r\nc"), "a\\tb\\r\\nc");
        assert_eq!(escape("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_edge_spaces_only() {
        assert_eq!(escape(" padded "), "\\spadded\\s");
        assert_eq!(escape("a b"), "a b");
        assert_eq!(escape(" "), "\\s");
    }

    #[test]
    fn test_unicode_categories_use_u_escape() {
        assert_eq!(escape("\u{0001}"), "\\u0001");
        assert_eq!(escape("x\u{200B}y"), "x\\u200By");
        assert_eq!(escape("\u{E000}"), "\\uE000");
        assert_eq!(escape("\u{00A0}"), "\\u00A0");
        assert_eq!(escape("\u{2028}"), "\\u2028");
    }

    #[test]
    fn test_supplementary_private_use_uses_surrogates() {
        assert_eq!(escape("\u{F0000}"), "\\uDB80\\uDC00");
        assert_eq!(round_trip("\u{F0000}"), "\u{F0000}");
    }

    #[test]
    fn test_tab_newline_and_nonspacing_mark_round_trip() {
        let original = "e\u{0301}\ttab\nline";
        // Combining marks pass through untouched.
        assert!(escape(original).contains('\u{0301}'));
        assert_eq!(round_trip(original), original);
    }

    #[test]
    fn test_round_trip_mixed() {
        for s in [" lead", "trail ", "\\u0041", "\u{FEFF}bom", "", "\u{1F600} emoji"] {
            assert_eq!(round_trip(s), s);
        }
    }

    #[test]
    fn test_unescape_errors() {
        assert!(unescape("bad\\q").is_err());
        assert!(unescape("dangling\\").is_err());
        assert!(unescape("\\u12").is_err());
        assert!(unescape("\\uD800x").is_err());
        assert!(unescape("\\uDC00").is_err());
    }
}
