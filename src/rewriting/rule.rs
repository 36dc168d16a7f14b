//! Rewriting rules.

use super::instantiation::InstantiationMap;
use crate::bigraph::Bigraph;
use crate::config::MatcherConfig;
use crate::error::{BigraphError, BigraphResult};
use crate::matching::{Match, MatchEngine, Matcher, Matches};
use crate::signature::ensure_same_signature;
use std::fmt;
use tracing::{debug, info};

/// A reaction rule `redex → reactum` with an instantiation map for the
/// parameters.
///
/// Redex and reactum share signature, root count, outer names and inner
/// names; `eta` maps the reactum sites onto the redex sites.
#[derive(Debug, Clone)]
pub struct RewritingRule {
    redex: Bigraph,
    reactum: Bigraph,
    eta: InstantiationMap,
}

fn interface_error(what: &str) -> BigraphError {
    BigraphError::IncompatibleInterface(format!("redex and reactum differ in their {what}"))
}

impl RewritingRule {
    pub fn new(redex: Bigraph, reactum: Bigraph, eta: InstantiationMap) -> BigraphResult<Self> {
        ensure_same_signature(redex.signature(), reactum.signature())?;
        if eta.domain() != reactum.sites().len() {
            return Err(BigraphError::InvalidInstantiation(format!(
                "domain {} does not match the {} reactum sites",
                eta.domain(),
                reactum.sites().len()
            )));
        }
        if eta.codomain() != redex.sites().len() {
            return Err(BigraphError::InvalidInstantiation(format!(
                "codomain {} does not match the {} redex sites",
                eta.codomain(),
                redex.sites().len()
            )));
        }
        if redex.roots().len() != reactum.roots().len() {
            return Err(interface_error("root count"));
        }
        if !redex.outer_names().map(|(n, _)| n).eq(reactum.outer_names().map(|(n, _)| n)) {
            return Err(interface_error("outer names"));
        }
        if !redex.inner_names().map(|(n, _)| n).eq(reactum.inner_names().map(|(n, _)| n)) {
            return Err(interface_error("inner names"));
        }
        Ok(Self { redex, reactum, eta })
    }

    /// A rule whose reactum keeps every parameter in place.
    pub fn with_identity(redex: Bigraph, reactum: Bigraph) -> BigraphResult<Self> {
        let eta = InstantiationMap::identity(redex.sites().len());
        Self::new(redex, reactum, eta)
    }

    pub fn redex(&self) -> &Bigraph {
        &self.redex
    }

    pub fn reactum(&self) -> &Bigraph {
        &self.reactum
    }

    pub fn instantiation_map(&self) -> &InstantiationMap {
        &self.eta
    }

    /// Matcher configuration that skips the parameters the rule drops.
    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig::default().with_needed_params(self.eta.needed_mask())
    }

    /// Every bigraph `agent` can become by one application of the rule.
    pub fn apply(&self, agent: &Bigraph) -> BigraphResult<Rewrites> {
        self.apply_with(&Matcher::new(), agent)
    }

    /// Like [`RewritingRule::apply`], finding matches with `engine`.
    pub fn apply_with<E: MatchEngine + ?Sized>(&self, engine: &E, agent: &Bigraph) -> BigraphResult<Rewrites> {
        let config = self.matcher_config();
        let matches = engine.matches(agent, &self.redex, &config)?;
        debug!(redex_sites = self.eta.codomain(), reactum_sites = self.eta.domain(), "rewriting started");
        Ok(Rewrites {
            rule: self.clone(),
            matches,
            produced: 0,
        })
    }

    /// The result of the reaction at `found`:
    /// `context ∘ (reactum ⊗ redex_id) ∘ η(param)`.
    pub fn rewrite(&self, found: &Match) -> BigraphResult<Bigraph> {
        let mut builder = self.reactum.replicate().to_builder();
        builder.right_juxtapose(found.redex_id())?;
        builder.outer_compose(found.context())?;
        let param = self.eta.instantiate(&found.param()?)?;
        builder.inner_compose(&param)?;
        Ok(builder.freeze())
    }
}

impl fmt::Display for RewritingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "redex:")?;
        write!(f, "{}", self.redex)?;
        writeln!(f, "reactum:")?;
        write!(f, "{}", self.reactum)
    }
}

/// Lazy sequence of the results of a rule, one per match.
#[derive(Debug)]
pub struct Rewrites {
    rule: RewritingRule,
    matches: Matches,
    produced: usize,
}

impl Rewrites {
    pub fn has_next(&mut self) -> bool {
        self.matches.has_next()
    }
}

impl Iterator for Rewrites {
    type Item = BigraphResult<Bigraph>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.matches.next() {
            Some(found) => {
                self.produced += 1;
                Some(self.rule.rewrite(&found))
            }
            None => {
                if self.produced > 0 {
                    info!(results = self.produced, "rewriting finished");
                    self.produced = 0;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BigraphBuilder;
    use crate::matching::{Objective, WeightedMatcher, ControlMatching};
    use crate::signature::{Signature, SignatureBuilder};
    use std::sync::Arc;

    fn sig() -> Arc<Signature> {
        SignatureBuilder::new()
            .add("A", true, 1)
            .add("B", true, 0)
            .add("C", true, 0)
            .build()
            .unwrap()
    }

    /// root{ A[x]{ site_0 .. site_{n-1} } }
    fn a_with_sites(sig: &Arc<Signature>, sites: usize, extra_b: bool) -> Bigraph {
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        let a = b.add_node("A", r.into(), &[x.into()]).unwrap();
        for _ in 0..sites {
            b.add_site(a.into()).unwrap();
        }
        if extra_b {
            b.add_node("B", a.into(), &[]).unwrap();
        }
        b.freeze()
    }

    /// root{ A[x]{ B, B } }
    fn agent(sig: &Arc<Signature>) -> Bigraph {
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        let a = b.add_node("A", r.into(), &[x.into()]).unwrap();
        b.add_node("B", a.into(), &[]).unwrap();
        b.add_node("B", a.into(), &[]).unwrap();
        b.freeze()
    }

    fn count(big: &Bigraph, control: &str) -> usize {
        big.nodes()
            .iter()
            .filter(|&&n| big.control(n).map_or(false, |c| c.name() == control))
            .count()
    }

    #[test]
    fn adds_a_node_next_to_the_parameter() {
        let sig = sig();
        let rule = RewritingRule::with_identity(a_with_sites(&sig, 1, false), a_with_sites(&sig, 1, true)).unwrap();
        let results: Vec<Bigraph> = rule.apply(&agent(&sig)).unwrap().collect::<BigraphResult<_>>().unwrap();
        assert_eq!(results.len(), 1);
        let out = &results[0];
        assert_eq!(count(out, "A"), 1);
        assert_eq!(count(out, "B"), 3);
        assert!(out.outer_name("x").is_some());
        assert!(out.is_ground());

        let expected = {
            let mut b = BigraphBuilder::new(sig.clone());
            let r = b.add_root();
            let x = b.add_outer_name("x").unwrap();
            let a = b.add_node("A", r.into(), &[x.into()]).unwrap();
            for _ in 0..3 {
                b.add_node("B", a.into(), &[]).unwrap();
            }
            b.freeze()
        };
        assert!(out.is_isomorphic(&expected));
    }

    #[test]
    fn cloning_the_parameter() {
        let sig = sig();
        let eta = InstantiationMap::new(1, vec![0, 0]).unwrap();
        let rule = RewritingRule::new(a_with_sites(&sig, 1, false), a_with_sites(&sig, 2, false), eta).unwrap();
        let out = rule.apply(&agent(&sig)).unwrap().next().unwrap().unwrap();
        assert_eq!(count(&out, "B"), 4);
    }

    #[test]
    fn dropping_the_parameter() {
        let sig = sig();
        let eta = InstantiationMap::new(1, vec![]).unwrap();
        let rule = RewritingRule::new(a_with_sites(&sig, 1, false), a_with_sites(&sig, 0, true), eta).unwrap();
        assert_eq!(rule.matcher_config().needed_params, Some(vec![false]));
        let out = rule.apply(&agent(&sig)).unwrap().next().unwrap().unwrap();
        assert_eq!(count(&out, "B"), 1);
        assert_eq!(out.node_count(), 2);
    }

    #[test]
    fn validation() {
        let sig = sig();
        let one = a_with_sites(&sig, 1, false);
        let none = a_with_sites(&sig, 0, false);

        let err = RewritingRule::new(one.clone(), none.clone(), InstantiationMap::identity(1)).unwrap_err();
        assert!(matches!(err, BigraphError::InvalidInstantiation(_)));

        let err = RewritingRule::new(one.clone(), one.clone(), InstantiationMap::identity(0)).unwrap_err();
        assert!(matches!(err, BigraphError::InvalidInstantiation(_)));

        let renamed = {
            let mut b = a_with_sites(&sig, 1, false).to_builder();
            b.rename_outer_name("x", "y").unwrap();
            b.freeze()
        };
        let err = RewritingRule::with_identity(one.clone(), renamed).unwrap_err();
        assert!(matches!(err, BigraphError::IncompatibleInterface(_)));

        let other = SignatureBuilder::new().add("A", true, 1).usid("other").build().unwrap();
        let foreign = BigraphBuilder::new(other).freeze();
        let err = RewritingRule::with_identity(one, foreign).unwrap_err();
        assert!(matches!(err, BigraphError::SignatureMismatch { .. }));
    }

    #[test]
    fn one_result_per_match() {
        let sig = sig();
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        b.add_node("A", r.into(), &[x.into()]).unwrap();
        b.add_node("A", r.into(), &[x.into()]).unwrap();
        let two = b.freeze();

        let rule = RewritingRule::with_identity(a_with_sites(&sig, 1, false), a_with_sites(&sig, 1, true)).unwrap();
        let results: Vec<Bigraph> = rule.apply(&two).unwrap().collect::<BigraphResult<_>>().unwrap();
        assert_eq!(results.len(), 2);
        for out in &results {
            assert_eq!(count(out, "B"), 1);
            assert_eq!(count(out, "A"), 2);
        }
        assert!(results[0].is_isomorphic(&results[1]));
    }

    #[test]
    fn custom_engine() {
        let sig = sig();
        let rule = RewritingRule::with_identity(a_with_sites(&sig, 1, false), a_with_sites(&sig, 1, true)).unwrap();
        let engine = WeightedMatcher::new(ControlMatching, Objective::Maximize);
        assert_eq!(rule.apply_with(&engine, &agent(&sig)).unwrap().count(), 1);
    }
}
