/// Split `text` into pieces of at most `budget` bytes, preferring to break on
/// spaces so words stay whole. Never splits inside a UTF-8 character.
///
/// Blank input yields no pieces at all.
pub fn split_line(text: &str, budget: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= budget {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > budget {
        let mut cut = budget;
        while cut > 0 && !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // budget smaller than the first character: emit it alone
            cut = remaining.chars().next().map(char::len_utf8).unwrap_or(1);
        }

        let window = &remaining[..cut];
        let split_at = window.rfind(' ').filter(|&i| i > 0).unwrap_or(cut);

        chunks.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}
