//! Runtime configuration knobs.
//!
//! The consistency checker is the correctness backbone of the crate but it
//! walks the whole structure. `ConsistencyPolicy` decides when it runs:
//! never, once whenever a bigraph (or a match component) is produced, or after
//! every mutating builder operation.
//!
//! The default is fixed at compile time (`EveryMutation` in debug builds or
//! with the `strict-consistency` feature, `OnFreeze` otherwise) and can be
//! overridden for the whole process through the `BIGRAPHS_CONSISTENCY`
//! environment variable (`off`, `freeze`, `mutation`).

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

/// Name of the environment variable overriding the default policy.
pub const CONSISTENCY_ENV: &str = "BIGRAPHS_CONSISTENCY";

/// When the structural consistency check is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyPolicy {
    Off,
    /// Check every bigraph handed out (frozen snapshots, match parts, rewrites).
    OnFreeze,
    /// Additionally check the builder after every mutating operation.
    EveryMutation,
}

impl ConsistencyPolicy {
    /// Policy selected by the build profile alone.
    pub const fn compiled_default() -> Self {
        if cfg!(any(debug_assertions, feature = "strict-consistency")) {
            ConsistencyPolicy::EveryMutation
        } else {
            ConsistencyPolicy::OnFreeze
        }
    }

    /// Parses the textual form used by [`CONSISTENCY_ENV`].
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(ConsistencyPolicy::Off),
            "freeze" | "on_freeze" => Some(ConsistencyPolicy::OnFreeze),
            "mutation" | "every_mutation" | "full" => Some(ConsistencyPolicy::EveryMutation),
            _ => None,
        }
    }

    /// Process-wide policy: the environment override if present and valid,
    /// the compiled default otherwise. Read once.
    pub fn process_default() -> Self {
        static POLICY: OnceLock<ConsistencyPolicy> = OnceLock::new();
        *POLICY.get_or_init(|| match std::env::var(CONSISTENCY_ENV) {
            Ok(raw) => Self::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognised {CONSISTENCY_ENV}, using compiled default");
                Self::compiled_default()
            }),
            Err(_) => Self::compiled_default(),
        })
    }

    #[inline]
    pub fn checks_on_freeze(self) -> bool {
        !matches!(self, ConsistencyPolicy::Off)
    }

    #[inline]
    pub fn checks_on_mutation(self) -> bool {
        matches!(self, ConsistencyPolicy::EveryMutation)
    }
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self::process_default()
    }
}

/// Matcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Whether reconstructed match components are checked.
    pub consistency: ConsistencyPolicy,
    /// Redex sites whose parameter must be reconstructed. `None` means all of
    /// them; parameters of unneeded sites are returned as empty regions.
    pub needed_params: Option<Vec<bool>>,
}

impl MatcherConfig {
    pub fn with_needed_params(mut self, needed: Vec<bool>) -> Self {
        self.needed_params = Some(needed);
        self
    }

    pub fn with_consistency(mut self, policy: ConsistencyPolicy) -> Self {
        self.consistency = policy;
        self
    }

    /// Whether the parameter of redex site `site` must be built.
    pub fn is_needed(&self, site: usize) -> bool {
        self.needed_params
            .as_ref()
            .map_or(true, |mask| mask.get(site).copied().unwrap_or(true))
    }
}
