//! Instantiation maps.
//!
//! An instantiation map `η: m → n` tells, for each of the `m` sites of a
//! reactum, which of the `n` parameters captured by the redex goes there. A
//! parameter may be used several times (it is copied) or not at all (it is
//! dropped, and the matcher need not build it).

use crate::bigraph::Bigraph;
use crate::config::ConsistencyPolicy;
use crate::error::{BigraphError, BigraphResult};
use crate::structure::{Child, Handle, Parent, Structure};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A map from reactum sites to redex sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstantiationMap {
    codomain: usize,
    map: Vec<usize>,
}

impl InstantiationMap {
    /// `map[i]` is the redex site whose parameter fills reactum site `i`.
    pub fn new(codomain: usize, map: Vec<usize>) -> BigraphResult<Self> {
        if let Some((i, &j)) = map.iter().enumerate().find(|(_, &j)| j >= codomain) {
            return Err(BigraphError::InvalidInstantiation(format!(
                "site {i} maps to {j}, outside a codomain of {codomain}"
            )));
        }
        Ok(Self { codomain, map })
    }

    /// The identity on `n` sites.
    pub fn identity(n: usize) -> Self {
        Self {
            codomain: n,
            map: (0..n).collect(),
        }
    }

    pub fn domain(&self) -> usize {
        self.map.len()
    }

    pub fn codomain(&self) -> usize {
        self.codomain
    }

    /// The redex site feeding reactum site `i`.
    pub fn instance(&self, i: usize) -> Option<usize> {
        self.map.get(i).copied()
    }

    /// How many reactum sites take the parameter of redex site `j`.
    pub fn multiplicity(&self, j: usize) -> usize {
        self.map.iter().filter(|&&k| k == j).count()
    }

    pub fn is_needed(&self, j: usize) -> bool {
        self.map.contains(&j)
    }

    /// Per redex site, whether its parameter is used.
    pub fn needed_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.codomain];
        for &j in &self.map {
            mask[j] = true;
        }
        mask
    }

    /// Rearranges the regions of a ground `param` with `codomain` roots:
    /// region `i` of the result is a copy of region `map[i]`. All copies keep
    /// the outer names of `param` and share its edges.
    pub fn instantiate(&self, param: &Bigraph) -> BigraphResult<Bigraph> {
        self.instantiate_with(param, ConsistencyPolicy::default())
    }

    pub(crate) fn instantiate_with(&self, param: &Bigraph, policy: ConsistencyPolicy) -> BigraphResult<Bigraph> {
        let p = param.structure();
        if p.roots.len() != self.codomain {
            return Err(BigraphError::InvalidInstantiation(format!(
                "parameter has {} regions, expected {}",
                p.roots.len(),
                self.codomain
            )));
        }
        if !p.is_ground() {
            return Err(BigraphError::InvalidInstantiation(
                "parameter must be ground".to_string(),
            ));
        }

        let mut s = Structure::empty(p.signature.clone());
        let mut handles: HashMap<Handle, Handle> = HashMap::new();
        for (name, &id) in &p.outer_index {
            let copy = s.new_outer(name.clone());
            handles.insert(Handle::Outer(id), Handle::Outer(copy));
        }
        for &j in &self.map {
            let root = s.new_root(None);
            let mut queue: VecDeque<(Parent, Parent)> = VecDeque::new();
            queue.push_back((Parent::Root(p.roots[j]), Parent::Root(root)));
            while let Some((from, to)) = queue.pop_front() {
                for child in p.children_of(from) {
                    let Child::Node(node) = *child else { continue };
                    let data = &p.node_data[node];
                    let ports: Vec<Handle> = data
                        .ports
                        .iter()
                        .map(|h| *handles.entry(*h).or_insert_with(|| Handle::Edge(s.new_edge())))
                        .collect();
                    let copy = s.new_node(data.control.clone(), to, ports);
                    queue.push_back((Parent::Node(node), Parent::Node(copy)));
                }
            }
        }
        Ok(Bigraph::from_structure(s, policy))
    }
}
