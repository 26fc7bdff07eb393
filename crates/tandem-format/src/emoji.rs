use std::collections::HashMap;

use once_cell::sync::Lazy;

/// `:name:` → Unicode for the emoji names people actually type.
const EMOJI: &[(&str, &str)] = &[
    ("+1", "\u{1f44d}"),
    ("-1", "\u{1f44e}"),
    ("100", "\u{1f4af}"),
    ("beer", "\u{1f37a}"),
    ("blush", "\u{1f60a}"),
    ("bug", "\u{1f41b}"),
    ("clap", "\u{1f44f}"),
    ("coffee", "\u{2615}"),
    ("cry", "\u{1f622}"),
    ("eyes", "\u{1f440}"),
    ("facepalm", "\u{1f926}"),
    ("fire", "\u{1f525}"),
    ("grin", "\u{1f601}"),
    ("grinning", "\u{1f600}"),
    ("heart", "\u{2764}\u{fe0f}"),
    ("heart_eyes", "\u{1f60d}"),
    ("joy", "\u{1f602}"),
    ("laughing", "\u{1f606}"),
    ("muscle", "\u{1f4aa}"),
    ("neutral_face", "\u{1f610}"),
    ("ok_hand", "\u{1f44c}"),
    ("pizza", "\u{1f355}"),
    ("point_up", "\u{261d}\u{fe0f}"),
    ("pray", "\u{1f64f}"),
    ("rage", "\u{1f621}"),
    ("raised_hands", "\u{1f64c}"),
    ("rocket", "\u{1f680}"),
    ("shrug", "\u{1f937}"),
    ("simple_smile", "\u{1f642}"),
    ("skull", "\u{1f480}"),
    ("slightly_frowning_face", "\u{1f641}"),
    ("slightly_smiling_face", "\u{1f642}"),
    ("smile", "\u{1f604}"),
    ("smiley", "\u{1f603}"),
    ("sob", "\u{1f62d}"),
    ("sparkles", "\u{2728}"),
    ("star", "\u{2b50}"),
    ("stuck_out_tongue", "\u{1f61b}"),
    ("sunglasses", "\u{1f60e}"),
    ("sweat_smile", "\u{1f605}"),
    ("tada", "\u{1f389}"),
    ("thinking_face", "\u{1f914}"),
    ("thumbsdown", "\u{1f44e}"),
    ("thumbsup", "\u{1f44d}"),
    ("warning", "\u{26a0}\u{fe0f}"),
    ("wave", "\u{1f44b}"),
    ("white_check_mark", "\u{2705}"),
    ("wink", "\u{1f609}"),
    ("x", "\u{274c}"),
    ("zap", "\u{26a1}"),
];

static TABLE: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| EMOJI.iter().copied().collect());

/// Look up an emoji by name (without the surrounding colons).
pub fn lookup(name: &str) -> Option<&'static str> {
    TABLE.get(name).copied()
}
