//! Rewrites a sing-box configuration so that its outbound groups list the
//! nodes of a subscription, selected by a compact rule string.

pub mod app;
pub mod common;
pub mod config;
pub mod merge;
