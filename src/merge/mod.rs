//! Rule-driven outbound merging.
//!
//! A rule string such as `ℹ️🇭🇰 HongKong🏷ℹ️hk|hongkong` names the groups
//! (by tag pattern) that should list the nodes whose tags match the second
//! pattern. See [`rule`] for the syntax and [`merger`] for how a document is
//! rewritten.

pub mod merger;
pub mod rule;

pub use merger::{MergeReport, Merger, PLACEHOLDER_TAG};
pub use rule::{parse_rules, Pattern, Rule};
