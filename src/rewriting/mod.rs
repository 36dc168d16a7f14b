//! Reaction rules and their application.
//!
//! A [`RewritingRule`] pairs a redex with a reactum and an
//! [`InstantiationMap`]. Applying it to an agent enumerates the matches of the
//! redex and, for each, replaces the redex image with a fresh copy of the
//! reactum whose sites are filled as the instantiation map says.

mod instantiation;
mod rule;

pub use instantiation::InstantiationMap;
pub use rule::{Rewrites, RewritingRule};
