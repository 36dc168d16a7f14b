//! Fingerprinting and WL (Weisfeiler–Lehman) refinement for bigraphs.
//!
//! Node labels start from the control and are refined with the parent's
//! label, the multiset of children labels and, port by port, a label of the
//! linked handle. Interface positions (root and site indices, names) enter the
//! labels as themselves because isomorphisms of bigraphs fix the interfaces.
//! The resulting fingerprints are invariant under renaming of nodes and edges:
//! isomorphic bigraphs always get the same fingerprint. The converse does not
//! hold; [`Bigraph::is_isomorphic`] settles the question exactly and uses the node
//! labels to prune its search.
//!
//! # Citations
//! - Weisfeiler–Lehman graph isomorphism test: Weisfeiler & Lehman, "A reduction of a graph to a canonical form" (1968)
//! - SHA-256: NIST FIPS 180-4 (2015)

use crate::arena::NodeId;
use crate::bigraph::Bigraph;
use crate::structure::{Child, Handle, Parent, Point, Structure};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Rounds of refinement used by [`Bigraph::fingerprint`].
pub const DEFAULT_WL_ROUNDS: usize = 3;

/// A 256-bit hash value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// Hashes `b"BIG:<domain>:v1" || length_prefix(data) || data`, the length
    /// prefix being a 64-bit little-endian byte count.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"BIG:");
        hasher.update(domain);
        hasher.update(b":v1");
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Structural label of a node after WL refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuralFingerprint(HashValue);

impl StructuralFingerprint {
    #[inline]
    pub const fn hash(&self) -> HashValue {
        self.0
    }
}

/// Byte buffer with length-prefixed fields.
#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn tag(&mut self, tag: &[u8]) -> &mut Self {
        self.bytes(tag)
    }

    fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.0.extend_from_slice(&(data.len() as u64).to_le_bytes());
        self.0.extend_from_slice(data);
        self
    }

    fn num(&mut self, n: usize) -> &mut Self {
        self.0.extend_from_slice(&(n as u64).to_le_bytes());
        self
    }

    fn hash(&mut self, h: &HashValue) -> &mut Self {
        self.0.extend_from_slice(&h.0);
        self
    }

    fn finish(&self, domain: &[u8]) -> HashValue {
        HashValue::hash_with_domain(domain, &self.0)
    }
}

pub(crate) fn wl_labels(s: &Structure, max_rounds: usize) -> HashMap<NodeId, HashValue> {
    let nodes = s.nodes_bfs();
    let site_index: HashMap<_, _> = s.sites.iter().enumerate().map(|(k, &id)| (id, k)).collect();
    let root_index: HashMap<_, _> = s.roots.iter().enumerate().map(|(k, &id)| (id, k)).collect();

    let mut labels: HashMap<NodeId, HashValue> = HashMap::with_capacity(nodes.len());
    for &id in &nodes {
        let data = &s.node_data[id];
        let mut enc = Encoder::default();
        enc.tag(b"NODE_INIT")
            .bytes(data.control.name().as_bytes())
            .num(data.control.arity())
            .num(usize::from(data.control.is_active()))
            .num(data.children.len());
        labels.insert(id, enc.finish(b"WL_INIT"));
    }

    for round in 0..max_rounds {
        let mut next = HashMap::with_capacity(nodes.len());
        let mut changed = false;
        for &id in &nodes {
            let data = &s.node_data[id];
            let mut enc = Encoder::default();
            enc.tag(b"NODE_WL").num(round).hash(&labels[&id]);

            match data.parent {
                Parent::Root(r) => enc.tag(b"ROOT").num(root_index[&r]),
                Parent::Node(p) => enc.tag(b"NODE").hash(&labels[&p]),
            };

            let mut children: Vec<HashValue> = Vec::new();
            let mut sites: Vec<usize> = Vec::new();
            for child in &data.children {
                match child {
                    Child::Node(c) => children.push(labels[c]),
                    Child::Site(site) => sites.push(site_index[site]),
                }
            }
            children.sort();
            sites.sort_unstable();
            enc.num(children.len());
            for h in &children {
                enc.hash(h);
            }
            enc.num(sites.len());
            for k in sites {
                enc.num(k);
            }

            for &handle in &data.ports {
                let link = link_label(s, handle, &labels);
                enc.hash(&link);
            }

            let label = enc.finish(b"WL_ROUND");
            changed |= label != labels[&id];
            next.insert(id, label);
        }
        labels = next;
        if !changed {
            break;
        }
    }
    labels
}

fn link_label(s: &Structure, handle: Handle, labels: &HashMap<NodeId, HashValue>) -> HashValue {
    let mut enc = Encoder::default();
    match handle {
        Handle::Outer(id) => {
            enc.tag(b"OUTER").bytes(s.outer_data[id].name.as_bytes());
        }
        Handle::Edge(_) => {
            enc.tag(b"EDGE");
        }
    }
    let mut points: Vec<HashValue> = s
        .points_of(handle)
        .iter()
        .map(|point| {
            let mut p = Encoder::default();
            match *point {
                Point::Port(port) => p.tag(b"PORT").hash(&labels[&port.node]).num(port.index),
                Point::Inner(id) => p.tag(b"INNER").bytes(s.inner_data[id].name.as_bytes()),
            };
            p.finish(b"POINT")
        })
        .collect();
    points.sort();
    for h in &points {
        enc.hash(h);
    }
    enc.finish(b"LINK")
}

/// Computes WL refinement fingerprints for all nodes of `bigraph`.
///
/// Performs up to `max_rounds` iterations, stopping early once no label
/// changes.
pub fn wl_refinement(bigraph: &Bigraph, max_rounds: usize) -> HashMap<NodeId, StructuralFingerprint> {
    wl_labels(bigraph.structure(), max_rounds)
        .into_iter()
        .map(|(id, h)| (id, StructuralFingerprint(h)))
        .collect()
}

/// Isomorphism-invariant fingerprint of a whole bigraph.
pub(crate) fn structure_fingerprint(s: &Structure) -> HashValue {
    let labels = wl_labels(s, DEFAULT_WL_ROUNDS);
    let mut enc = Encoder::default();
    enc.tag(b"SIGNATURE").bytes(s.signature.usid().as_bytes());
    enc.tag(b"OUTER_FACE").num(s.roots.len());
    for name in s.outer_index.keys() {
        enc.bytes(name.as_bytes());
    }
    enc.tag(b"INNER_FACE").num(s.sites.len());
    for name in s.inner_index.keys() {
        enc.bytes(name.as_bytes());
    }

    let mut node_labels: Vec<HashValue> = labels.values().copied().collect();
    node_labels.sort();
    enc.tag(b"NODES").num(node_labels.len());
    for h in &node_labels {
        enc.hash(h);
    }

    let mut links: Vec<HashValue> = s
        .outer_data
        .ids()
        .map(Handle::Outer)
        .chain(s.edge_data.ids().map(Handle::Edge))
        .map(|h| link_label(s, h, &labels))
        .collect();
    links.sort();
    enc.tag(b"LINKS").num(links.len());
    for h in &links {
        enc.hash(h);
    }

    // Regions and sites directly under roots.
    for &root in &s.roots {
        let mut children: Vec<HashValue> = s.child_nodes(Parent::Root(root)).map(|c| labels[&c]).collect();
        children.sort();
        enc.tag(b"REGION").num(children.len());
        for h in &children {
            enc.hash(h);
        }
        let mut sites: Vec<usize> = s
            .children_of(Parent::Root(root))
            .iter()
            .filter_map(|c| match c {
                Child::Site(site) => s.sites.iter().position(|x| x == site),
                Child::Node(_) => None,
            })
            .collect();
        sites.sort_unstable();
        enc.num(sites.len());
        for k in sites {
            enc.num(k);
        }
    }
    enc.finish(b"BIGRAPH_FINGERPRINT")
}

impl Bigraph {
    /// Isomorphism-invariant structural fingerprint.
    pub fn fingerprint(&self) -> HashValue {
        structure_fingerprint(self.structure())
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
            .add("A", true, 1)
            .add("B", true, 0)
            .build()
            .unwrap()
    }

    /// root{ A[x]{B}, A[e] } built in the given insertion order.
    fn build(sig: &Arc<Signature>, swap: bool) -> Bigraph {
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        if swap {
            b.add_node("A", r.into(), &[]).unwrap();
        }
        let a = b.add_node("A", r.into(), &[x.into()]).unwrap();
        b.add_node("B", a.into(), &[]).unwrap();
        if !swap {
            b.add_node("A", r.into(), &[]).unwrap();
        }
        b.freeze()
    }

    #[test]
    fn hash_with_domain_separates_domains() {
        assert_ne!(
            HashValue::hash_with_domain(b"X", b"data"),
            HashValue::hash_with_domain(b"Y", b"data")
        );
        assert_eq!(
            HashValue::hash_with_domain(b"X", b"data"),
            HashValue::hash_with_domain(b"X", b"data")
        );
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let sig = sig();
        assert_eq!(build(&sig, false).fingerprint(), build(&sig, true).fingerprint());
    }

    #[test]
    fn fingerprint_sees_links() {
        let sig = sig();
        let plain = build(&sig, false);
        let mut b = plain.to_builder();
        let x = b.outer_name("x").unwrap();
        let nodes = b.nodes();
        let free_a = nodes
            .iter()
            .copied()
            .find(|&n| b.control(n).unwrap().name() == "A" && b.children(n.into()).unwrap().is_empty())
            .unwrap();
        b.relink(Point::Port(crate::structure::Port::new(free_a, 0)), x.into())
            .unwrap();
        assert_ne!(b.freeze().fingerprint(), plain.fingerprint());
    }

    #[test]
    fn wl_distinguishes_nesting() {
        let sig = sig();
        let labels = wl_refinement(&build(&sig, false), DEFAULT_WL_ROUNDS);
        let distinct: std::collections::HashSet<_> = labels.values().collect();
        assert_eq!(distinct.len(), 3);
    }
}
