//! Network A → network B.

use std::ops::Range;

use async_trait::async_trait;
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::emoji;
use crate::nick::NickRule;

/// `<…>` reference tokens: `<@U123>`, `<#C123|general>`, `<!here>`, `<https://x|label>`.
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^<>\s][^<>]*)>").expect("Invalid regex pattern for references"));

static EMOJI_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-z0-9_+\-]+):").expect("Invalid regex pattern for emoji"));

static NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*(?:\r?\n)+[ \t]*").expect("Invalid regex pattern for newlines"));

/// Looks up the names behind network-A reference tokens.
///
/// Lookups may hit the network; returning `None` leaves the token untouched.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Display name for a user id.
    async fn user_name(&self, user_id: &str) -> Option<String>;

    /// Channel name (without `#`) for a channel id.
    async fn channel_name(&self, channel_id: &str) -> Option<String>;
}

/// What a single reference token turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    Fixed(String),
    User { id: String, label: Option<String> },
    Channel { id: String, label: Option<String> },
    Keep,
}

/// Rewrite network-A text into a single network-B line.
///
/// Reference tokens are resolved concurrently; each replacement is keyed by
/// the span it matched and spliced in only after every lookup has finished,
/// so the output order always follows the input.
pub async fn to_network_b<R>(text: &str, resolver: &R, rule: &NickRule) -> String
where
    R: ReferenceResolver + ?Sized,
{
    let spans: Vec<(Range<usize>, Reference)> = REFERENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.range(), classify(&caps[1])))
        })
        .collect();

    let resolved = join_all(spans.iter().map(|(_, reference)| resolve(reference, resolver, rule))).await;

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for ((span, _), replacement) in spans.iter().zip(resolved) {
        out.push_str(&text[cursor..span.start]);
        match replacement {
            Some(r) => out.push_str(&r),
            None => out.push_str(&text[span.clone()]),
        }
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);

    let out = replace_emoji(&out);
    let out = unescape_entities(&out);
    NEWLINES.replace_all(&out, " ").trim().to_string()
}

/// Decide what a token means from its inner text (between `<` and `>`).
fn classify(inner: &str) -> Reference {
    let (target, label) = match inner.split_once('|') {
        Some((t, l)) if !l.is_empty() => (t, Some(l.to_string())),
        Some((t, _)) => (t, None),
        None => (inner, None),
    };

    if let Some(id) = target.strip_prefix('@') {
        return Reference::User {
            id: id.to_string(),
            label,
        };
    }
    if let Some(id) = target.strip_prefix('#') {
        return Reference::Channel {
            id: id.to_string(),
            label,
        };
    }
    if let Some(special) = target.strip_prefix('!') {
        return match special {
            "channel" | "here" | "everyone" => Reference::Fixed(format!("@{}", special)),
            _ => match label {
                // <!subteam^S123|@ops>, <!date^…|fallback>
                Some(l) if l.starts_with('@') || !special.starts_with("subteam") => {
                    Reference::Fixed(l)
                }
                Some(l) => Reference::Fixed(format!("@{}", l)),
                None => Reference::Keep,
            },
        };
    }

    let url = target;
    let shown = url.strip_prefix("mailto:").unwrap_or(url);
    match label {
        None => Reference::Fixed(shown.to_string()),
        Some(l) if l == url || l == shown || url.ends_with(&format!("//{}", l)) => {
            Reference::Fixed(shown.to_string())
        }
        Some(l) => Reference::Fixed(format!("{} ({})", l, shown)),
    }
}

async fn resolve<R>(reference: &Reference, resolver: &R, rule: &NickRule) -> Option<String>
where
    R: ReferenceResolver + ?Sized,
{
    match reference {
        Reference::Fixed(s) => Some(s.clone()),
        Reference::Keep => None,
        Reference::User { id, label } => {
            let name = match resolver.user_name(id).await {
                Some(name) => Some(name),
                None => label.clone(),
            };
            if name.is_none() {
                debug!(user_id = %id, "unresolved user reference left as-is");
            }
            name.map(|n| rule.nick_for(&n))
        }
        Reference::Channel { id, label } => {
            let name = match resolver.channel_name(id).await {
                Some(name) => Some(name),
                None => label.clone(),
            };
            if name.is_none() {
                debug!(channel_id = %id, "unresolved channel reference left as-is");
            }
            name.map(|n| format!("#{}", n.trim_start_matches('#')))
        }
    }
}

/// `:name:` → Unicode when the name is in the table; unknown names stay.
fn replace_emoji(text: &str) -> String {
    EMOJI_NAME
        .replace_all(text, |caps: &Captures<'_>| match emoji::lookup(&caps[1]) {
            Some(e) => e.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
