//! Text rewriting between the two networks' conventions.
//!
//! - [`outbound`]: network A → network B (reference tokens, emoji, entities).
//! - [`inbound`]: network B → network A (virtual nicks, control codes).
//! - [`nick`]: the deterministic display-name → virtual-nick rule.
//! - [`chunk`]: splitting long lines to fit the network-B line budget.
//!
//! Everything here is stateless apart from the read-only emoji table.

pub mod chunk;
pub mod emoji;
pub mod inbound;
pub mod nick;
pub mod outbound;

pub use chunk::split_line;
pub use inbound::{to_network_a, NickDirectory};
pub use nick::NickRule;
pub use outbound::{to_network_b, ReferenceResolver};
