//! Exact isomorphism of bigraphs.
//!
//! Two bigraphs are isomorphic when they share signature and interfaces and
//! there are bijections between their nodes and between their edges that
//! preserve controls, parents, site and root positions, and the handle of
//! every port and inner name. The search pairs up children region by region,
//! only trying candidates with equal WL labels, and backtracks on conflicts.

use crate::arena::{EdgeId, NodeId, SiteId};
use crate::bigraph::Bigraph;
use crate::fingerprint::{structure_fingerprint, wl_labels, HashValue, DEFAULT_WL_ROUNDS};
use crate::signature::same_signature;
use crate::structure::{Child, Handle, Parent, Point, Port, Structure};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct Pairing {
    nodes: HashMap<NodeId, NodeId>,
    used: HashSet<NodeId>,
    edges: HashMap<EdgeId, EdgeId>,
    edges_back: HashMap<EdgeId, EdgeId>,
}

struct Search<'a> {
    a: &'a Structure,
    b: &'a Structure,
    labels_a: HashMap<NodeId, HashValue>,
    labels_b: HashMap<NodeId, HashValue>,
    sites_a: HashMap<SiteId, usize>,
    sites_b: HashMap<SiteId, usize>,
}

impl<'a> Search<'a> {
    fn new(a: &'a Structure, b: &'a Structure) -> Self {
        let index = |s: &Structure| s.sites.iter().enumerate().map(|(k, &id)| (id, k)).collect();
        Self {
            a,
            b,
            labels_a: wl_labels(a, DEFAULT_WL_ROUNDS),
            labels_b: wl_labels(b, DEFAULT_WL_ROUNDS),
            sites_a: index(a),
            sites_b: index(b),
        }
    }

    fn site_positions(&self, s: &Structure, sites: &HashMap<SiteId, usize>, parent: Parent) -> BTreeSet<usize> {
        s.children_of(parent)
            .iter()
            .filter_map(|child| match child {
                Child::Site(id) => sites.get(id).copied(),
                Child::Node(_) => None,
            })
            .collect()
    }

    /// Pairs the regions in `pending` one after the other.
    fn extend(&self, pairing: Pairing, mut pending: Vec<(Parent, Parent)>) -> bool {
        let Some((pa, pb)) = pending.pop() else {
            return self.finish(pairing);
        };
        if self.site_positions(self.a, &self.sites_a, pa) != self.site_positions(self.b, &self.sites_b, pb) {
            return false;
        }
        let left: Vec<NodeId> = self.a.child_nodes(pa).collect();
        let right: Vec<NodeId> = self.b.child_nodes(pb).collect();
        if left.len() != right.len() {
            return false;
        }
        self.pair_children(pairing, &left, &right, pending)
    }

    fn pair_children(
        &self,
        pairing: Pairing,
        left: &[NodeId],
        right: &[NodeId],
        pending: Vec<(Parent, Parent)>,
    ) -> bool {
        let Some((&first, rest)) = left.split_first() else {
            return self.extend(pairing, pending);
        };
        for &candidate in right {
            if pairing.used.contains(&candidate) || self.labels_a[&first] != self.labels_b[&candidate] {
                continue;
            }
            let mut next = pairing.clone();
            if !self.pair_nodes(&mut next, first, candidate) {
                continue;
            }
            let mut queue = pending.clone();
            queue.push((Parent::Node(first), Parent::Node(candidate)));
            if self.pair_children(next, rest, right, queue) {
                return true;
            }
        }
        false
    }

    fn pair_nodes(&self, pairing: &mut Pairing, na: NodeId, nb: NodeId) -> bool {
        let (da, db) = (&self.a.node_data[na], &self.b.node_data[nb]);
        if da.control != db.control {
            return false;
        }
        for (&ha, &hb) in da.ports.iter().zip(&db.ports) {
            if !self.pair_handles(pairing, ha, hb) {
                return false;
            }
        }
        pairing.nodes.insert(na, nb);
        pairing.used.insert(nb);
        true
    }

    fn pair_handles(&self, pairing: &mut Pairing, ha: Handle, hb: Handle) -> bool {
        match (ha, hb) {
            (Handle::Outer(x), Handle::Outer(y)) => self.a.outer_name(x) == self.b.outer_name(y),
            (Handle::Edge(e), Handle::Edge(f)) => {
                match (pairing.edges.get(&e), pairing.edges_back.get(&f)) {
                    (None, None) => {
                        if self.a.points_of(ha).len() != self.b.points_of(hb).len() {
                            return false;
                        }
                        pairing.edges.insert(e, f);
                        pairing.edges_back.insert(f, e);
                        true
                    }
                    (Some(&g), Some(&h)) => g == f && h == e,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn finish(&self, mut pairing: Pairing) -> bool {
        for (name, &ia) in &self.a.inner_index {
            let Some(&ib) = self.b.inner_index.get(name) else {
                return false;
            };
            let ha = self.a.handle_of(Point::Inner(ia));
            let hb = self.b.handle_of(Point::Inner(ib));
            if !self.pair_handles(&mut pairing, ha, hb) {
                return false;
            }
        }
        // Every port of a paired node must land on the paired handle's port.
        pairing.nodes.len() == self.a.node_data.len()
            && pairing.edges.len() == self.a.edge_data.len()
            && pairing.nodes.iter().all(|(&na, &nb)| {
                (0..self.a.node_data[na].ports.len()).all(|k| {
                    let pa = Point::Port(Port::new(na, k));
                    let pb = Point::Port(Port::new(nb, k));
                    match (self.a.handle_of(pa), self.b.handle_of(pb)) {
                        (Handle::Edge(e), Handle::Edge(f)) => pairing.edges.get(&e) == Some(&f),
                        (Handle::Outer(x), Handle::Outer(y)) => self.a.outer_name(x) == self.b.outer_name(y),
                        _ => false,
                    }
                })
            })
    }
}

pub(crate) fn isomorphic(a: &Structure, b: &Structure) -> bool {
    if !same_signature(&a.signature, &b.signature)
        || a.roots.len() != b.roots.len()
        || a.sites.len() != b.sites.len()
        || a.node_data.len() != b.node_data.len()
        || a.edge_data.len() != b.edge_data.len()
        || !a.outer_index.keys().eq(b.outer_index.keys())
        || !a.inner_index.keys().eq(b.inner_index.keys())
    {
        return false;
    }
    if structure_fingerprint(a) != structure_fingerprint(b) {
        return false;
    }
    let search = Search::new(a, b);
    let pending: Vec<(Parent, Parent)> = a
        .roots
        .iter()
        .zip(&b.roots)
        .rev()
        .map(|(&ra, &rb)| (Parent::Root(ra), Parent::Root(rb)))
        .collect();
    search.extend(Pairing::default(), pending)
}

impl Bigraph {
    /// Whether `self` and `other` are equal up to the identity of nodes and
    /// edges.
    pub fn is_isomorphic(&self, other: &Bigraph) -> bool {
        isomorphic(self.structure(), other.structure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BigraphBuilder;
    use crate::signature::{Signature, SignatureBuilder};
    use std::sync::Arc;

    fn sig() -> Arc<Signature> {
        SignatureBuilder::new()
            .add("A", true, 2)
            .add("B", true, 0)
            .build()
            .unwrap()
    }

    /// Two A nodes in one root; `shared` links their second ports together.
    fn pair(sig: &Arc<Signature>, shared: bool) -> Bigraph {
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        let n1 = b.add_node("A", r.into(), &[x.into()]).unwrap();
        let n2 = b.add_node("A", r.into(), &[x.into()]).unwrap();
        if shared {
            b.relink_points(&[Point::Port(Port::new(n1, 1)), Point::Port(Port::new(n2, 1))])
                .unwrap();
        }
        b.freeze()
    }

    #[test]
    fn identical_shapes_are_isomorphic() {
        let sig = sig();
        assert!(pair(&sig, true).is_isomorphic(&pair(&sig, true)));
        assert!(pair(&sig, false).is_isomorphic(&pair(&sig, false)));
    }

    #[test]
    fn different_links_are_not_isomorphic() {
        let sig = sig();
        assert!(!pair(&sig, true).is_isomorphic(&pair(&sig, false)));
    }

    #[test]
    fn site_positions_matter() {
        let sig = sig();
        let build = |first_left: bool| {
            let mut b = BigraphBuilder::new(sig.clone());
            let r = b.add_root();
            let left = b.add_node("B", r.into(), &[]).unwrap();
            let right = b.add_node("A", r.into(), &[]).unwrap();
            if first_left {
                b.add_site(left.into()).unwrap();
                b.add_site(right.into()).unwrap();
            } else {
                b.add_site(right.into()).unwrap();
                b.add_site(left.into()).unwrap();
            }
            b.freeze()
        };
        assert!(build(true).is_isomorphic(&build(true)));
        assert!(!build(true).is_isomorphic(&build(false)));
    }

    #[test]
    fn symmetric_children_pair_up() {
        let sig = sig();
        let build = || {
            let mut b = BigraphBuilder::new(sig.clone());
            let r = b.add_root();
            for _ in 0..4 {
                let a = b.add_node("A", r.into(), &[]).unwrap();
                b.add_node("B", a.into(), &[]).unwrap();
            }
            b.freeze()
        };
        assert!(build().is_isomorphic(&build().replicate()));
    }
}
