/// Characters network B accepts in a nick besides ASCII letters and digits.
const NICK_SPECIALS: &str = "_-[]\\^{}|`";

/// Fallback base when a display name has no usable characters.
const FALLBACK_BASE: &str = "user";

/// Returns `true` for characters that may appear inside a network-B nick.
pub fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || NICK_SPECIALS.contains(c)
}

/// Truncation + suffix rule that turns a display name into a virtual nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NickRule {
    suffix: String,
    max_len: usize,
}

impl NickRule {
    /// `max_len` is the full nick length including the suffix.
    pub fn new(suffix: impl Into<String>, max_len: usize) -> Self {
        Self {
            suffix: suffix.into(),
            max_len,
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Derive the virtual nick for `display_name`.
    ///
    /// Lowercases, turns whitespace into `_`, drops characters network B
    /// does not allow, strips leading digits and dashes, truncates the base so
    /// base + suffix fits `max_len`, then appends the suffix.
    pub fn nick_for(&self, display_name: &str) -> String {
        let mut base = String::with_capacity(display_name.len());
        for c in display_name.trim().chars() {
            if c.is_whitespace() {
                if !base.ends_with('_') {
                    base.push('_');
                }
            } else if is_nick_char(c) {
                base.push(c.to_ascii_lowercase());
            }
        }

        let base = base.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-');
        let base = if base.is_empty() { FALLBACK_BASE } else { base };

        let room = self.max_len.saturating_sub(self.suffix.chars().count()).max(1);
        let mut nick: String = base.chars().take(room).collect();
        nick.push_str(&self.suffix);
        nick
    }

    /// Does `token` have the shape of a virtual nick (non-empty base + suffix)?
    pub fn is_virtual(&self, token: &str) -> bool {
        token.len() > self.suffix.len()
            && token.is_char_boundary(token.len() - self.suffix.len())
            && token[token.len() - self.suffix.len()..].eq_ignore_ascii_case(&self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> NickRule {
        NickRule::new("-sl", 16)
    }

    #[test]
    fn simple_name_gets_suffix() {
        assert_eq!(rule().nick_for("bob"), "bob-sl");
        assert_eq!(rule().nick_for("Ana"), "ana-sl");
    }

    #[test]
    fn whitespace_becomes_underscore() {
        assert_eq!(rule().nick_for("Jean  Luc"), "jean_luc-sl");
    }

    #[test]
    fn disallowed_characters_are_dropped() {
        assert_eq!(rule().nick_for("Émilie!"), "milie-sl");
        assert_eq!(rule().nick_for("o'brien"), "obrien-sl");
    }

    #[test]
    fn leading_digits_are_stripped() {
        assert_eq!(rule().nick_for("1337hacker"), "hacker-sl");
    }

    #[test]
    fn empty_base_falls_back() {
        assert_eq!(rule().nick_for("日本"), "user-sl");
        assert_eq!(rule().nick_for(""), "user-sl");
    }

    #[test]
    fn long_names_are_truncated_to_max_len() {
        let nick = rule().nick_for("averyveryverylongname");
        assert_eq!(nick, "averyveryvery-sl");
        assert_eq!(nick.len(), 16);
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(rule().nick_for("Bob Smith"), rule().nick_for("Bob Smith"));
    }

    #[test]
    fn recognises_virtual_nick_shape() {
        assert!(rule().is_virtual("bob-sl"));
        assert!(rule().is_virtual("BOB-SL"));
        assert!(!rule().is_virtual("-sl"));
        assert!(!rule().is_virtual("bob"));
    }
}
