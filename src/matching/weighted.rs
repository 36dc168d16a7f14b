//! Matching restricted to optimal total weight.
//!
//! The search first runs to exhaustion while raising its floor past every
//! solution it meets, which leaves the optimum. It then starts over with the
//! floor at the optimum and yields exactly the optimal matches. Branches whose
//! score cannot reach the floor even if every unmatched redex node got its
//! best candidate are cut.

use super::search::Search;
use super::{prepare, MatchEngine, MatchPolicy, Matches, Mode};
use crate::bigraph::Bigraph;
use crate::config::MatcherConfig;
use crate::error::BigraphResult;
use crate::names::NameGenerator;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether the total weight is to be maximised or minimised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Maximize,
    Minimize,
}

impl Objective {
    fn sense(self) -> i64 {
        match self {
            Objective::Maximize => 1,
            Objective::Minimize => -1,
        }
    }
}

/// Runs `search` to find the best score, then rewinds it so that it yields
/// the solutions reaching that score. `None` when there is no solution.
pub(super) fn settle_optimum(search: &mut Search) -> Option<i64> {
    let mut best = None;
    search.set_floor(None);
    while let Some(state) = search.next_solution() {
        best = Some(state.score);
        search.set_floor(Some(state.score + 1));
    }
    let best = best?;
    search.restart();
    search.set_floor(Some(best));
    debug!(score = best, "optimal match score settled");
    Some(best)
}

/// Enumerates the matches of optimal weight under a [`MatchPolicy`].
///
/// Only matches reaching the optimum are yielded, all of them when several
/// tie. Intermediate improving matches found on the way to the optimum are
/// not reported.
#[derive(Debug, Clone)]
pub struct WeightedMatcher<P> {
    policy: P,
    objective: Objective,
    config: MatcherConfig,
    names: NameGenerator,
}

impl<P: MatchPolicy> WeightedMatcher<P> {
    pub fn new(policy: P, objective: Objective) -> Self {
        Self {
            policy,
            objective,
            config: MatcherConfig::default(),
            names: NameGenerator::global(),
        }
    }

    pub fn with_config(mut self, config: MatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_name_generator(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// The optimal matches of `redex` in `agent`.
    pub fn match_in(&self, agent: &Bigraph, redex: &Bigraph) -> BigraphResult<Matches> {
        self.matches(agent, redex, &self.config)
    }
}

impl<P: MatchPolicy> MatchEngine for WeightedMatcher<P> {
    fn matches(&self, agent: &Bigraph, redex: &Bigraph, config: &MatcherConfig) -> BigraphResult<Matches> {
        let problem = prepare(agent, redex, &self.policy, self.objective.sense(), config)?;
        Ok(Matches::new(
            problem,
            Mode::Optimize { settled: false },
            self.names.clone(),
            config.consistency,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeId;
    use crate::builder::BigraphBuilder;
    use crate::matching::{ControlMatching, Match};
    use crate::signature::{Signature, SignatureBuilder};
    use std::sync::Arc;

    /// Weighs a pairing by the number of children of the agent node.
    struct ByChildren;

    impl MatchPolicy for ByChildren {
        fn weight(&self, agent: &Bigraph, a: NodeId, _redex: &Bigraph, _r: NodeId) -> i64 {
            agent.children(a.into()).map_or(0, |c| c.len() as i64)
        }
    }

    fn sig() -> Arc<Signature> {
        SignatureBuilder::new()
            .add("A", true, 0)
            .add("B", true, 0)
            .build()
            .unwrap()
    }

    /// root{ A{B}, A{B, B}, A, ...extra }
    fn agent(sig: &Arc<Signature>, heavy: usize) -> Bigraph {
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let light = b.add_node("A", r.into(), &[]).unwrap();
        b.add_node("B", light.into(), &[]).unwrap();
        for _ in 0..heavy {
            let a = b.add_node("A", r.into(), &[]).unwrap();
            b.add_node("B", a.into(), &[]).unwrap();
            b.add_node("B", a.into(), &[]).unwrap();
        }
        b.add_node("A", r.into(), &[]).unwrap();
        b.freeze()
    }

    fn redex(sig: &Arc<Signature>) -> Bigraph {
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let a = b.add_node("A", r.into(), &[]).unwrap();
        b.add_site(a.into()).unwrap();
        b.freeze()
    }

    #[test]
    fn maximising_keeps_only_the_heaviest() {
        let sig = sig();
        let found: Vec<Match> = WeightedMatcher::new(ByChildren, Objective::Maximize)
            .match_in(&agent(&sig, 1), &redex(&sig))
            .unwrap()
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].weight(), 2);
        assert_eq!(found[0].params()[0].node_count(), 2);
    }

    #[test]
    fn lighter_matches_met_first_are_not_reported() {
        let sig = sig();
        // The light A{B} and the bare A precede the heavy ones.
        let mut matches = WeightedMatcher::new(ByChildren, Objective::Maximize)
            .match_in(&agent(&sig, 3), &redex(&sig))
            .unwrap();
        let weights: Vec<i64> = matches.by_ref().map(|m| m.weight()).collect();
        assert_eq!(weights, vec![2, 2, 2]);
        assert_eq!(matches.phase(), crate::matching::MatchPhase::Exhausted);
    }

    #[test]
    fn ties_are_all_enumerated() {
        let sig = sig();
        let found = WeightedMatcher::new(ByChildren, Objective::Maximize)
            .match_in(&agent(&sig, 2), &redex(&sig))
            .unwrap()
            .count();
        assert_eq!(found, 2);
    }

    #[test]
    fn minimising_prefers_the_lightest() {
        let sig = sig();
        let found: Vec<Match> = WeightedMatcher::new(ByChildren, Objective::Minimize)
            .match_in(&agent(&sig, 1), &redex(&sig))
            .unwrap()
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].weight(), 0);
        assert_eq!(found[0].params()[0].node_count(), 0);
    }

    #[test]
    fn zero_weights_enumerate_everything() {
        let sig = sig();
        let found = WeightedMatcher::new(ControlMatching, Objective::Maximize)
            .match_in(&agent(&sig, 1), &redex(&sig))
            .unwrap()
            .count();
        assert_eq!(found, 3);
    }

    #[test]
    fn objective_serialises_in_snake_case() {
        assert_eq!(serde_json::to_string(&Objective::Minimize).unwrap(), "\"minimize\"");
    }
}
