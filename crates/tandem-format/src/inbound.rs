//! Network B → network A.

use std::collections::HashMap;

use crate::nick::{is_nick_char, NickRule};

const BOLD: char = '\x02';
const COLOR: char = '\x03';
const HEX_COLOR: char = '\x04';
const RESET: char = '\x0f';
const MONOSPACE: char = '\x11';
const REVERSE: char = '\x16';
const ITALIC: char = '\x1d';
const STRIKETHROUGH: char = '\x1e';
const UNDERLINE: char = '\x1f';

/// Maps currently-known virtual nicks back to their owners' display names.
pub trait NickDirectory {
    fn display_name(&self, nick: &str) -> Option<String>;
}

/// Keys are lowercased nicks.
impl NickDirectory for HashMap<String, String> {
    fn display_name(&self, nick: &str) -> Option<String> {
        self.get(&nick.to_lowercase()).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Italic,
    Strike,
    Mono,
}

impl Style {
    fn marker(self) -> char {
        match self {
            Style::Bold => '*',
            Style::Italic => '_',
            Style::Strike => '~',
            Style::Mono => '`',
        }
    }
}

/// Rewrite a network-B line for network A.
///
/// Virtual nicks of known shadows are replaced by the owner's display name
/// first; then control codes become emphasis markup and `& < >` are escaped.
pub fn to_network_a<D>(text: &str, directory: &D, rule: &NickRule) -> String
where
    D: NickDirectory + ?Sized,
{
    let named = replace_virtual_nicks(text, directory, rule);
    render_styles(&named)
}

fn replace_virtual_nicks<D>(text: &str, directory: &D, rule: &NickRule) -> String
where
    D: NickDirectory + ?Sized,
{
    let mut out = String::with_capacity(text.len());
    let mut token_start: Option<usize> = None;

    let flush = |out: &mut String, token: &str| {
        match rule
            .is_virtual(token)
            .then(|| directory.display_name(token))
            .flatten()
        {
            Some(name) => out.push_str(&name),
            None => out.push_str(token),
        }
    };

    for (i, c) in text.char_indices() {
        if is_nick_char(c) {
            token_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = token_start.take() {
            flush(&mut out, &text[start..i]);
        }
        out.push(c);
    }
    if let Some(start) = token_start {
        flush(&mut out, &text[start..]);
    }
    out
}

fn render_styles(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut open: Vec<Style> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            BOLD => toggle(&mut out, &mut open, Style::Bold),
            ITALIC => toggle(&mut out, &mut open, Style::Italic),
            STRIKETHROUGH => toggle(&mut out, &mut open, Style::Strike),
            MONOSPACE => toggle(&mut out, &mut open, Style::Mono),
            RESET => close_all(&mut out, &mut open),
            COLOR => {
                // \x03[fg[,bg]] with 1-2 digit colour numbers
                let fg = skip_digits(&mut chars, 2);
                if fg > 0 && chars.peek() == Some(&',') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                        chars.next();
                        skip_digits(&mut chars, 2);
                    }
                }
            }
            HEX_COLOR => {
                skip_hex(&mut chars, 6);
                if chars.peek() == Some(&',') {
                    chars.next();
                    skip_hex(&mut chars, 6);
                }
            }
            REVERSE | UNDERLINE => {}
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }

    close_all(&mut out, &mut open);
    out
}

/// Open `style`, or close it (closing and re-opening anything nested inside).
fn toggle(out: &mut String, open: &mut Vec<Style>, style: Style) {
    let Some(pos) = open.iter().position(|s| *s == style) else {
        out.push(style.marker());
        open.push(style);
        return;
    };

    let nested: Vec<Style> = open.drain(pos + 1..).collect();
    for s in nested.iter().rev() {
        out.push(s.marker());
    }
    out.push(style.marker());
    open.pop();
    for s in &nested {
        out.push(s.marker());
    }
    open.extend(nested);
}

fn close_all(out: &mut String, open: &mut Vec<Style>) {
    while let Some(s) = open.pop() {
        out.push(s.marker());
    }
}

/// Consume up to `max` ASCII digits; returns how many were consumed.
fn skip_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) -> usize {
    let mut taken = 0;
    while taken < max {
        match chars.peek() {
            Some(c) if c.is_ascii_digit() => {
                chars.next();
                taken += 1;
            }
            _ => break,
        }
    }
    taken
}

fn skip_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) {
    for _ in 0..max {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                chars.next();
            }
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> NickRule {
        NickRule::new("-sl", 16)
    }

    fn directory() -> HashMap<String, String> {
        HashMap::from([
            ("ana-sl".to_string(), "Ana".to_string()),
            ("bob-sl".to_string(), "bob".to_string()),
        ])
    }

    fn convert(text: &str) -> String {
        to_network_a(text, &directory(), &rule())
    }

    #[test]
    fn known_virtual_nick_maps_back_to_display_name() {
        assert_eq!(convert("ana-sl: ping"), "Ana: ping");
        assert_eq!(convert("hey ANA-SL, and bob-sl"), "hey Ana, and bob");
    }

    #[test]
    fn unknown_virtual_nick_is_left_alone() {
        assert_eq!(convert("zed-sl: hi"), "zed-sl: hi");
    }

    #[test]
    fn plain_words_are_left_alone() {
        assert_eq!(convert("ana said hi"), "ana said hi");
    }

    #[test]
    fn bold_and_italic_become_markup() {
        assert_eq!(convert("\x02loud\x02 and \x1dsoft\x1d"), "*loud* and _soft_");
    }

    #[test]
    fn unterminated_styles_are_closed() {
        assert_eq!(convert("\x02\x1dboth"), "*_both_*");
    }

    #[test]
    fn reset_closes_everything() {
        assert_eq!(convert("\x02bold \x1eold\x0f plain"), "*bold ~old~* plain");
    }

    #[test]
    fn overlapping_styles_stay_well_nested() {
        assert_eq!(convert("\x02a\x1db\x02c\x1d"), "*a_b_*_c_");
    }

    #[test]
    fn colours_are_stripped() {
        assert_eq!(convert("\x0304,12red\x03 plain \x035x"), "red plain x");
        assert_eq!(convert("\x03,5 keep comma"), ",5 keep comma");
        assert_eq!(convert("\x04FF0000hex"), "hex");
    }

    #[test]
    fn underline_and_reverse_are_dropped() {
        assert_eq!(convert("\x1funder\x1f \x16rev\x16"), "under rev");
    }

    #[test]
    fn markup_characters_are_escaped() {
        assert_eq!(convert("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }

    #[test]
    fn monospace_uses_backticks() {
        assert_eq!(convert("run \x11cargo\x11"), "run `cargo`");
    }
}
