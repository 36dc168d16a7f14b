//! bigraphs: Milner's bigraphs with their algebra, matching and rewriting.
//!
//! A bigraph is two structures over one set of nodes. The *place graph* is a
//! forest whose roots are the regions of the bigraph and whose leaves may be
//! sites, holes where other bigraphs can be plugged. The *link graph* is a
//! hypergraph joining node ports and inner names to edges or outer names.
//! Sites and inner names form the inner face, roots and outer names the outer
//! face; composition plugs one bigraph's outer face into another's inner face.
//!
//! This crate provides:
//! - [`Bigraph`], immutable and cheap to share, and [`BigraphBuilder`] for
//!   editing, with composition, juxtaposition, parallel and merge products,
//!   and nesting.
//! - A consistency checker that can run after every mutation, only when a
//!   bigraph is frozen, or not at all ([`ConsistencyPolicy`]).
//! - [`Matcher`] and [`WeightedMatcher`], which enumerate the occurrences of
//!   a redex inside a ground agent, each decomposed into context, redex image
//!   and parameters.
//! - [`RewritingRule`], which applies a reaction rule through a matcher and an
//!   [`InstantiationMap`].
//!
//! # References
//!
//! - Milner, R. "The Space and Motion of Communicating Agents" (2009)
//! - Jensen, Milner. "Bigraphs and mobile processes" (2004)
//! - Miculan, Peressotti. "A CSP implementation of the bigraph embedding problem" (2014)
//!
//! # Example
//!
//! ```
//! use bigraphs::prelude::*;
//!
//! let sig = SignatureBuilder::new()
//!     .add("A", true, 1)
//!     .add("B", true, 0)
//!     .build()
//!     .unwrap();
//!
//! // A[x]{ B, B }
//! let mut agent = BigraphBuilder::new(sig.clone());
//! let root = agent.add_root();
//! let x = agent.add_outer_name("x").unwrap();
//! let a = agent.add_node("A", root.into(), &[x.into()]).unwrap();
//! agent.add_node("B", a.into(), &[]).unwrap();
//! agent.add_node("B", a.into(), &[]).unwrap();
//! let agent = agent.freeze();
//!
//! // A[y]{ site }
//! let mut redex = BigraphBuilder::new(sig);
//! let root = redex.add_root();
//! let y = redex.add_outer_name("y").unwrap();
//! let a = redex.add_node("A", root.into(), &[y.into()]).unwrap();
//! redex.add_site(a.into()).unwrap();
//! let redex = redex.freeze();
//!
//! let matches: Vec<Match> = Matcher::new().match_in(&agent, &redex).unwrap().collect();
//! assert_eq!(matches.len(), 1);
//! assert_eq!(matches[0].params()[0].node_count(), 2);
//! ```

pub mod arena;
pub mod bigraph;
pub mod builder;
pub mod config;
mod consistency;
pub mod error;
pub mod fingerprint;
mod isomorphism;
pub mod matching;
pub mod names;
mod replicate;
pub mod rewriting;
pub mod signature;
pub mod structure;

pub use arena::{EdgeId, EntityId, InnerNameId, NodeId, OuterNameId, RootId, SiteId};
pub use bigraph::Bigraph;
pub use builder::BigraphBuilder;
pub use config::{ConsistencyPolicy, MatcherConfig, CONSISTENCY_ENV};
pub use error::{BigraphError, BigraphResult, Inconsistency};
pub use fingerprint::{HashValue, StructuralFingerprint};
pub use matching::{
    ControlMatching, Match, MatchEngine, MatchPhase, MatchPolicy, Matcher, Matches, Objective, WeightedMatcher,
};
pub use names::NameGenerator;
pub use rewriting::{InstantiationMap, Rewrites, RewritingRule};
pub use signature::{Control, Signature, SignatureBuilder};
pub use structure::{Child, Face, Handle, Parent, Point, Port};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arena::{EdgeId, InnerNameId, NodeId, OuterNameId, RootId, SiteId};
    pub use crate::bigraph::Bigraph;
    pub use crate::builder::BigraphBuilder;
    pub use crate::config::{ConsistencyPolicy, MatcherConfig};
    pub use crate::error::{BigraphError, BigraphResult};
    pub use crate::matching::{ControlMatching, Match, MatchPolicy, Matcher, Objective, WeightedMatcher};
    pub use crate::rewriting::{InstantiationMap, RewritingRule};
    pub use crate::signature::{Control, Signature, SignatureBuilder};
    pub use crate::structure::{Child, Handle, Parent, Point, Port};
}
