//! Party matching: free-text party labels to registered parties.

pub mod error;
pub mod matcher;
pub mod overrides;
pub mod registry;
pub mod resolver;

pub use error::MatchError;
pub use matcher::PartyMatcher;
pub use overrides::{DbOverrideStore, MemoryOverrideStore, OverrideStore};
pub use registry::{PartyIndex, PartyOption, PartyReference};
pub use resolver::{ManualResolver, ReviewQueueResolver, TerminalResolver};
