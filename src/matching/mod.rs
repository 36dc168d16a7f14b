//! Finding occurrences of a redex inside a ground agent.
//!
//! A match decomposes the agent as
//! `context ∘ (redex_image ⊗ redex_id) ∘ param`, where `param` is the parameter
//! wiring composed with the juxtaposition of one parameter per redex site.
//! [`Matcher::match_in`] checks the operands, tabulates the problem, and hands
//! back a lazy [`Matches`] iterator that drives a backtracking search and
//! rebuilds each solution on demand. [`WeightedMatcher`] enumerates only the
//! matches of optimal total weight.
//!
//! Which nodes may stand for which is decided by a [`MatchPolicy`]; the
//! default, [`ControlMatching`], requires equal controls.
//!
//! # Citations
//! - Bigraphical reactive systems: Milner, "The Space and Motion of Communicating Agents" (2009)
//! - Matching as constraint satisfaction: Miculan & Peressotti, "A CSP implementation of the bigraph embedding problem" (2014)

mod problem;
mod reconstruct;
mod search;
mod weighted;

pub use weighted::{Objective, WeightedMatcher};

use crate::arena::NodeId;
use crate::bigraph::Bigraph;
use crate::config::{ConsistencyPolicy, MatcherConfig};
use crate::error::{BigraphError, BigraphResult};
use crate::names::NameGenerator;
use crate::signature::ensure_same_signature;
use problem::Problem;
use search::Search;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Decides which agent nodes may be images of which redex nodes, and what a
/// pairing is worth to [`WeightedMatcher`].
///
/// Arity equality is always required on top of `are_matchable`.
pub trait MatchPolicy {
    fn are_matchable(&self, agent: &Bigraph, agent_node: NodeId, redex: &Bigraph, redex_node: NodeId) -> bool {
        match (agent.control(agent_node), redex.control(redex_node)) {
            (Some(a), Some(r)) => a == r,
            _ => false,
        }
    }

    fn weight(&self, _agent: &Bigraph, _agent_node: NodeId, _redex: &Bigraph, _redex_node: NodeId) -> i64 {
        0
    }
}

/// Nodes match when their controls are equal; every pairing weighs 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlMatching;

impl MatchPolicy for ControlMatching {}

/// Anything that can enumerate the matches of a redex in an agent.
pub trait MatchEngine {
    /// Enumerates matches, overriding the engine's own configuration.
    fn matches(&self, agent: &Bigraph, redex: &Bigraph, config: &MatcherConfig) -> BigraphResult<Matches>;
}

/// One occurrence of a redex in an agent.
#[derive(Debug, Clone)]
pub struct Match {
    context: Bigraph,
    redex_image: Bigraph,
    redex_id: Bigraph,
    param_wiring: Bigraph,
    params: Vec<Bigraph>,
    embedding: BTreeMap<NodeId, NodeId>,
    image_nodes: BTreeMap<NodeId, NodeId>,
    weight: i64,
}

impl Match {
    /// The agent around the occurrence; one site per redex root.
    pub fn context(&self) -> &Bigraph {
        &self.context
    }

    /// The redex as it occurs in the agent.
    pub fn redex_image(&self) -> &Bigraph {
        &self.redex_image
    }

    /// The identity on the names parameters use to reach the context
    /// without going through the redex.
    pub fn redex_id(&self) -> &Bigraph {
        &self.redex_id
    }

    /// Routes the parameters' outer names to the redex inner names and to
    /// the identity.
    pub fn param_wiring(&self) -> &Bigraph {
        &self.param_wiring
    }

    /// One parameter per redex site. Parameters that were not needed are
    /// empty regions.
    pub fn params(&self) -> &[Bigraph] {
        &self.params
    }

    /// `redex_image ⊗ redex_id`.
    pub fn redex(&self) -> BigraphResult<Bigraph> {
        self.redex_image.juxtapose(&self.redex_id)
    }

    /// `param_wiring ∘ (param_0 ⊗ … ⊗ param_k)`.
    pub fn param(&self) -> BigraphResult<Bigraph> {
        let params = Bigraph::juxtapose_all(self.param_wiring.signature().clone(), &self.params)?;
        self.param_wiring.compose(&params)
    }

    /// Redex node to agent node.
    pub fn embedding(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.embedding
    }

    /// The node standing for `redex_node` in [`Match::redex_image`].
    pub fn image_node(&self, redex_node: NodeId) -> Option<NodeId> {
        self.image_nodes.get(&redex_node).copied()
    }

    /// Total weight of the node pairings, as given by the match policy.
    pub fn weight(&self) -> i64 {
        self.weight
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "context:")?;
        write!(f, "{}", self.context)?;
        writeln!(f, "redex image:")?;
        write!(f, "{}", self.redex_image)?;
        for (k, param) in self.params.iter().enumerate() {
            writeln!(f, "param {k}:")?;
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

/// Progress of a [`Matches`] iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Unstarted,
    Solving,
    SolutionReady,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Enumerate,
    /// Find the optimum first; `settled` once it is known.
    Optimize { settled: bool },
}

/// Lazy sequence of matches.
///
/// The search advances only when a match is asked for. Once exhausted the
/// search state is dropped and the iterator stays empty.
pub struct Matches {
    search: Option<Search>,
    mode: Mode,
    phase: MatchPhase,
    pending: Option<Match>,
    names: NameGenerator,
    policy: ConsistencyPolicy,
    yielded: usize,
}

impl Matches {
    fn new(problem: Problem, mode: Mode, names: NameGenerator, policy: ConsistencyPolicy) -> Self {
        Self {
            search: Some(Search::new(Arc::new(problem))),
            mode,
            phase: MatchPhase::Unstarted,
            pending: None,
            names,
            policy,
            yielded: 0,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Whether another match exists. Runs the search up to the next solution
    /// if none is pending.
    pub fn has_next(&mut self) -> bool {
        match self.phase {
            MatchPhase::SolutionReady => true,
            MatchPhase::Exhausted => false,
            MatchPhase::Unstarted | MatchPhase::Solving => {
                self.phase = MatchPhase::Solving;
                self.pull();
                self.phase == MatchPhase::SolutionReady
            }
        }
    }

    fn exhaust(&mut self) {
        self.search = None;
        self.phase = MatchPhase::Exhausted;
        debug!(matches = self.yielded, "match search exhausted");
    }

    fn pull(&mut self) {
        let Some(search) = self.search.as_mut() else {
            self.phase = MatchPhase::Exhausted;
            return;
        };
        if self.mode == (Mode::Optimize { settled: false }) {
            self.mode = Mode::Optimize { settled: true };
            if weighted::settle_optimum(search).is_none() {
                self.exhaust();
                return;
            }
        }
        match search.next_solution() {
            Some(state) => {
                let found = reconstruct::reconstruct(search.problem(), &state, &self.names, self.policy);
                self.pending = Some(found);
                self.phase = MatchPhase::SolutionReady;
            }
            None => self.exhaust(),
        }
    }
}

impl Iterator for Matches {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if !self.has_next() {
            return None;
        }
        self.phase = MatchPhase::Solving;
        self.yielded += 1;
        self.pending.take()
    }
}

impl fmt::Debug for Matches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matches")
            .field("phase", &self.phase)
            .field("yielded", &self.yielded)
            .finish()
    }
}

/// Checks the operands and tabulates the problem.
fn prepare<P: MatchPolicy + ?Sized>(
    agent: &Bigraph,
    redex: &Bigraph,
    policy: &P,
    sense: i64,
    config: &MatcherConfig,
) -> BigraphResult<Problem> {
    ensure_same_signature(agent.signature(), redex.signature())?;
    if !agent.is_ground() {
        return Err(BigraphError::UnsupportedGroundRequirement);
    }
    let needed: Vec<bool> = (0..redex.sites().len()).map(|s| config.is_needed(s)).collect();
    let problem = Problem::new(agent, redex, policy, sense, needed);
    debug!(
        agent_nodes = problem.agent_nodes.len(),
        redex_nodes = problem.redex_nodes.len(),
        redex_roots = problem.redex_root_count(),
        redex_sites = problem.redex_site_count(),
        "match problem prepared"
    );
    Ok(problem)
}

/// Enumerates every match of a redex.
#[derive(Debug, Clone)]
pub struct Matcher<P = ControlMatching> {
    policy: P,
    config: MatcherConfig,
    names: NameGenerator,
}

impl Matcher<ControlMatching> {
    pub fn new() -> Self {
        Self::with_policy(ControlMatching)
    }
}

impl Default for Matcher<ControlMatching> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: MatchPolicy> Matcher<P> {
    pub fn with_policy(policy: P) -> Self {
        Self {
            policy,
            config: MatcherConfig::default(),
            names: NameGenerator::global(),
        }
    }

    pub fn with_config(mut self, config: MatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Generator for the names that bridge the components of a match.
    pub fn with_name_generator(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// All matches of `redex` in `agent`.
    ///
    /// Fails if the signatures differ or `agent` is not ground. An empty
    /// sequence means there is no occurrence.
    pub fn match_in(&self, agent: &Bigraph, redex: &Bigraph) -> BigraphResult<Matches> {
        self.matches(agent, redex, &self.config)
    }
}

impl<P: MatchPolicy> MatchEngine for Matcher<P> {
    fn matches(&self, agent: &Bigraph, redex: &Bigraph, config: &MatcherConfig) -> BigraphResult<Matches> {
        let problem = prepare(agent, redex, &self.policy, 1, config)?;
        Ok(Matches::new(problem, Mode::Enumerate, self.names.clone(), config.consistency))
    }
}
