//! Mutable staging area for bigraphs.
//!
//! [`BigraphBuilder`] exposes the construction API (roots, sites, nodes,
//! names, linking) and the algebra (juxtaposition, composition, products,
//! nesting) as in-place operations. Every operation validates all of its
//! inputs before touching the structure: a rejected call returns an error and
//! leaves the builder exactly as it was.
//!
//! Identifiers handed out by a builder stay valid across algebraic
//! operations for the entities the builder already owned; entities copied in
//! from an operand get fresh identifiers.
//!
//! Edges that lose their last point are dropped at the end of each operation.
//!
//! # Citations
//! - Milner, "The Space and Motion of Communicating Agents" (2009), Def. 2.7 (composition), 2.9 (juxtaposition), 3.14 (nesting)
//! - Perrone, "On the Implementation of Bigraphs" (2013) – builder staging

use crate::arena::{EdgeId, InnerNameId, NodeId, OuterNameId, RootId, SiteId};
use crate::bigraph::{write_structure, Bigraph};
use crate::config::ConsistencyPolicy;
use crate::consistency;
use crate::error::{BigraphError, BigraphResult};
use crate::names::NameGenerator;
use crate::replicate::RootPlacement;
use crate::signature::{ensure_same_signature, Signature};
use crate::structure::{impl_read_queries, Handle, Parent, Point, Structure};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A mutable bigraph under construction.
#[derive(Debug, Clone)]
pub struct BigraphBuilder {
    structure: Structure,
    policy: ConsistencyPolicy,
    names: NameGenerator,
}

impl_read_queries!(BigraphBuilder);

impl BigraphBuilder {
    /// An empty builder over `signature`.
    pub fn new(signature: Arc<Signature>) -> Self {
        Self {
            structure: Structure::empty(signature),
            policy: ConsistencyPolicy::default(),
            names: NameGenerator::global(),
        }
    }

    /// A builder holding a copy of `bigraph`; its identifiers remain valid.
    pub fn from_bigraph(bigraph: &Bigraph) -> Self {
        Self {
            structure: bigraph.structure().clone(),
            policy: ConsistencyPolicy::default(),
            names: NameGenerator::global(),
        }
    }

    pub fn with_policy(mut self, policy: ConsistencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Uses `names` for anonymous outer and inner names.
    pub fn with_name_generator(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    pub fn policy(&self) -> ConsistencyPolicy {
        self.policy
    }

    fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Snapshot of the current state; the builder stays usable.
    pub fn make_bigraph(&self) -> Bigraph {
        Bigraph::from_structure(self.structure.clone(), self.policy)
    }

    /// Consumes the builder and adopts its state without copying.
    pub fn freeze(self) -> Bigraph {
        Bigraph::from_structure(self.structure, self.policy)
    }

    fn commit(&mut self, operation: &'static str) {
        self.structure.drop_idle_edges();
        if self.policy.checks_on_mutation() {
            consistency::enforce(&self.structure, operation);
        }
        trace!(operation, nodes = self.structure.node_data.len(), "builder updated");
    }

    // ---- place graph ----------------------------------------------------

    /// Adds a root at the end of the outer face.
    pub fn add_root(&mut self) -> RootId {
        let id = self.structure.new_root(None);
        self.commit("add_root");
        id
    }

    /// Adds a root at position `index` of the outer face.
    pub fn add_root_at(&mut self, index: usize) -> BigraphResult<RootId> {
        if index > self.structure.roots.len() {
            return Err(BigraphError::IncompatibleInterface(format!(
                "root index {index} out of range for width {}",
                self.structure.roots.len()
            )));
        }
        let id = self.structure.new_root(Some(index));
        self.commit("add_root_at");
        Ok(id)
    }

    /// Adds a site under `parent` at the end of the inner face.
    pub fn add_site(&mut self, parent: Parent) -> BigraphResult<SiteId> {
        self.structure.check_parent(parent)?;
        let id = self.structure.new_site(parent);
        self.commit("add_site");
        Ok(id)
    }

    /// Adds a node of control `control` under `parent`.
    ///
    /// Port `i` is linked to `handles[i]`; ports without a handle get a fresh
    /// edge each. Supplying more handles than the arity is an error.
    pub fn add_node(&mut self, control: &str, parent: Parent, handles: &[Handle]) -> BigraphResult<NodeId> {
        let control = self.structure.signature.control(control)?.clone();
        self.structure.check_parent(parent)?;
        if handles.len() > control.arity() {
            return Err(BigraphError::ArityMismatch {
                control: control.name().to_string(),
                arity: control.arity(),
                given: handles.len(),
            });
        }
        for &handle in handles {
            self.structure.check_handle(handle)?;
        }
        let mut ports = handles.to_vec();
        while ports.len() < control.arity() {
            ports.push(Handle::Edge(self.structure.new_edge()));
        }
        let id = self.structure.new_node(control, parent, ports);
        self.commit("add_node");
        Ok(id)
    }

    /// Removes an empty root.
    pub fn remove_root(&mut self, root: RootId) -> BigraphResult<()> {
        self.structure.check_root(root)?;
        if !self.structure.root_data[root].children.is_empty() {
            return Err(BigraphError::NonEmptyRoot(root));
        }
        self.structure.remove_root(root);
        self.commit("remove_root");
        Ok(())
    }

    /// Removes a site from the inner face (fills it with nothing).
    pub fn close_site(&mut self, site: SiteId) -> BigraphResult<()> {
        self.structure.check_site(site)?;
        self.structure.remove_site(site);
        self.commit("close_site");
        Ok(())
    }

    /// Merges all roots into a single root. Without roots, one is created.
    pub fn merge(&mut self) -> RootId {
        let target = self.structure.alloc_root();
        for root in std::mem::take(&mut self.structure.roots) {
            self.structure.move_children(Parent::Root(root), Parent::Root(target));
            self.structure.root_data.remove(root);
        }
        self.structure.roots.push(target);
        self.commit("merge");
        target
    }

    /// Merges the `count` roots starting at `index` into one root placed at
    /// `index`. With `count == 0` an empty root is inserted there.
    pub fn merge_roots(&mut self, index: usize, count: usize) -> BigraphResult<RootId> {
        let width = self.structure.roots.len();
        if index.checked_add(count).map_or(true, |end| end > width) {
            return Err(BigraphError::IncompatibleInterface(format!(
                "cannot merge roots {index}..{} of width {width}",
                index.saturating_add(count)
            )));
        }
        let target = self.structure.alloc_root();
        let merged: Vec<RootId> = self.structure.roots.splice(index..index + count, [target]).collect();
        for root in merged {
            self.structure.move_children(Parent::Root(root), Parent::Root(target));
            self.structure.root_data.remove(root);
        }
        self.commit("merge_roots");
        Ok(target)
    }

    /// Removes every site and inner name.
    pub fn ground(&mut self) {
        for site in self.structure.sites.clone() {
            self.structure.remove_site(site);
        }
        let inners: Vec<InnerNameId> = self.structure.inner_index.values().copied().collect();
        for inner in inners {
            self.structure.remove_inner(inner);
        }
        self.commit("ground");
    }

    // ---- link graph -----------------------------------------------------

    /// Adds the outer name `name`.
    pub fn add_outer_name(&mut self, name: &str) -> BigraphResult<OuterNameId> {
        if self.structure.outer_index.contains_key(name) {
            return Err(BigraphError::NameClash(vec![name.to_string()]));
        }
        let id = self.structure.new_outer(name.to_string());
        self.commit("add_outer_name");
        Ok(id)
    }

    /// Adds an outer name with a generated, unused name.
    pub fn add_fresh_outer_name(&mut self) -> OuterNameId {
        let index = &self.structure.outer_index;
        let name = self.names.fresh_avoiding(|n| index.contains_key(n));
        let id = self.structure.new_outer(name);
        self.commit("add_fresh_outer_name");
        id
    }

    /// Adds the inner name `name` linked to `handle`, or to a fresh edge.
    pub fn add_inner_name(&mut self, name: &str, handle: Option<Handle>) -> BigraphResult<InnerNameId> {
        if self.structure.inner_index.contains_key(name) {
            return Err(BigraphError::NameClash(vec![name.to_string()]));
        }
        if let Some(handle) = handle {
            self.structure.check_handle(handle)?;
        }
        let handle = handle.unwrap_or_else(|| Handle::Edge(self.structure.new_edge()));
        let id = self.structure.new_inner(name.to_string(), handle);
        self.commit("add_inner_name");
        Ok(id)
    }

    /// Adds an inner name with a generated, unused name.
    pub fn add_fresh_inner_name(&mut self, handle: Option<Handle>) -> BigraphResult<InnerNameId> {
        let index = &self.structure.inner_index;
        let name = self.names.fresh_avoiding(|n| index.contains_key(n));
        self.add_inner_name(&name, handle)
    }

    /// Links `point` to `handle`.
    pub fn relink(&mut self, point: Point, handle: Handle) -> BigraphResult<()> {
        self.structure.check_point(point)?;
        self.structure.check_handle(handle)?;
        self.structure.link(point, handle);
        self.commit("relink");
        Ok(())
    }

    /// Links all `points` to one fresh edge.
    pub fn relink_points(&mut self, points: &[Point]) -> BigraphResult<EdgeId> {
        if points.is_empty() {
            return Err(BigraphError::IncompatibleInterface(
                "relinking needs at least one point".into(),
            ));
        }
        for &point in points {
            self.structure.check_point(point)?;
        }
        let edge = self.structure.new_edge();
        for &point in points {
            self.structure.link(point, Handle::Edge(edge));
        }
        self.commit("relink_points");
        Ok(edge)
    }

    /// Disconnects `point`, linking it to a fresh edge of its own.
    pub fn unlink(&mut self, point: Point) -> BigraphResult<EdgeId> {
        self.relink_points(&[point])
    }

    /// Removes the outer name `name`; its points keep being linked together
    /// through a fresh edge.
    pub fn close_outer_name(&mut self, name: &str) -> BigraphResult<()> {
        let id = self.lookup_outer(name)?;
        let handle = Handle::Outer(id);
        if !self.structure.points_of(handle).is_empty() {
            let edge = self.structure.new_edge();
            self.structure.move_points(handle, Handle::Edge(edge));
        }
        self.structure.remove_outer(id);
        self.commit("close_outer_name");
        Ok(())
    }

    /// Removes the inner name `name`.
    pub fn close_inner_name(&mut self, name: &str) -> BigraphResult<()> {
        let id = self.lookup_inner(name)?;
        self.structure.remove_inner(id);
        self.commit("close_inner_name");
        Ok(())
    }

    pub fn rename_outer_name(&mut self, old: &str, new: &str) -> BigraphResult<()> {
        let id = self.lookup_outer(old)?;
        if old == new {
            return Ok(());
        }
        if self.structure.outer_index.contains_key(new) {
            return Err(BigraphError::NameClash(vec![new.to_string()]));
        }
        self.structure.outer_index.remove(old);
        self.structure.outer_data[id].name = new.to_string();
        self.structure.outer_index.insert(new.to_string(), id);
        self.commit("rename_outer_name");
        Ok(())
    }

    pub fn rename_inner_name(&mut self, old: &str, new: &str) -> BigraphResult<()> {
        let id = self.lookup_inner(old)?;
        if old == new {
            return Ok(());
        }
        if self.structure.inner_index.contains_key(new) {
            return Err(BigraphError::NameClash(vec![new.to_string()]));
        }
        self.structure.inner_index.remove(old);
        self.structure.inner_data[id].name = new.to_string();
        self.structure.inner_index.insert(new.to_string(), id);
        self.commit("rename_inner_name");
        Ok(())
    }

    fn lookup_outer(&self, name: &str) -> BigraphResult<OuterNameId> {
        self.structure
            .outer_index
            .get(name)
            .copied()
            .ok_or_else(|| BigraphError::UnknownName(name.to_string()))
    }

    fn lookup_inner(&self, name: &str) -> BigraphResult<InnerNameId> {
        self.structure
            .inner_index
            .get(name)
            .copied()
            .ok_or_else(|| BigraphError::UnknownName(name.to_string()))
    }

    // ---- algebra --------------------------------------------------------

    fn ensure_disjoint(&self, other: &Structure, check_outer: bool) -> BigraphResult<()> {
        let mut clashes: Vec<String> = Vec::new();
        if check_outer {
            clashes.extend(
                other
                    .outer_index
                    .keys()
                    .filter(|n| self.structure.outer_index.contains_key(*n))
                    .cloned(),
            );
        }
        clashes.extend(
            other
                .inner_index
                .keys()
                .filter(|n| self.structure.inner_index.contains_key(*n))
                .cloned(),
        );
        if clashes.is_empty() {
            Ok(())
        } else {
            Err(BigraphError::NameClash(clashes))
        }
    }

    fn absorb_side_by_side(&mut self, other: &Structure, on_the_left: bool, merge_outer: bool) {
        let targets: BTreeMap<String, Handle> = if merge_outer {
            other
                .outer_index
                .keys()
                .filter_map(|n| {
                    self.structure
                        .outer_index
                        .get(n)
                        .map(|&id| (n.clone(), Handle::Outer(id)))
                })
                .collect()
        } else {
            BTreeMap::new()
        };
        let map = self.structure.absorb(other, RootPlacement::Fresh, &targets);
        if on_the_left {
            self.structure.roots.splice(0..0, map.roots);
            self.structure.sites.splice(0..0, map.sites);
        } else {
            self.structure.roots.extend(map.roots);
            self.structure.sites.extend(map.sites);
        }
        for id in map.outers {
            self.structure.index_outer(id);
        }
        for id in map.inners {
            self.structure.index_inner(id);
        }
    }

    /// `self ⊗ other`: `other`'s roots and sites go after `self`'s.
    pub fn right_juxtapose(&mut self, other: &Bigraph) -> BigraphResult<()> {
        self.juxtapose(other, false)
    }

    /// `other ⊗ self`: `other`'s roots and sites go before `self`'s.
    pub fn left_juxtapose(&mut self, other: &Bigraph) -> BigraphResult<()> {
        self.juxtapose(other, true)
    }

    fn juxtapose(&mut self, other: &Bigraph, on_the_left: bool) -> BigraphResult<()> {
        ensure_same_signature(&self.structure.signature, other.signature())?;
        self.ensure_disjoint(other.structure(), true)?;
        self.absorb_side_by_side(other.structure(), on_the_left, false);
        debug!(width = self.structure.roots.len(), on_the_left, "juxtaposed");
        self.commit("juxtapose");
        Ok(())
    }

    /// `self ∥ other`: like juxtaposition, shared outer names are merged.
    pub fn right_parallel_product(&mut self, other: &Bigraph) -> BigraphResult<()> {
        self.parallel_product(other, false)
    }

    /// `other ∥ self`.
    pub fn left_parallel_product(&mut self, other: &Bigraph) -> BigraphResult<()> {
        self.parallel_product(other, true)
    }

    fn parallel_product(&mut self, other: &Bigraph, on_the_left: bool) -> BigraphResult<()> {
        ensure_same_signature(&self.structure.signature, other.signature())?;
        self.ensure_disjoint(other.structure(), false)?;
        self.absorb_side_by_side(other.structure(), on_the_left, true);
        debug!(width = self.structure.roots.len(), on_the_left, "parallel product");
        self.commit("parallel_product");
        Ok(())
    }

    /// `self | other`: parallel product with all roots merged into one.
    pub fn right_merge_product(&mut self, other: &Bigraph) -> BigraphResult<()> {
        self.right_parallel_product(other)?;
        self.merge();
        Ok(())
    }

    /// `other | self`.
    pub fn left_merge_product(&mut self, other: &Bigraph) -> BigraphResult<()> {
        self.left_parallel_product(other)?;
        self.merge();
        Ok(())
    }

    fn ensure_composable(outer: &Structure, inner: &Structure) -> BigraphResult<()> {
        ensure_same_signature(&outer.signature, &inner.signature)?;
        if outer.sites.len() != inner.roots.len() || outer.inner_names() != inner.outer_names() {
            let inner_face = crate::structure::Face::new(outer.sites.len(), outer.inner_names());
            let outer_face = crate::structure::Face::new(inner.roots.len(), inner.outer_names());
            return Err(BigraphError::IncompatibleInterface(format!(
                "inner face {inner_face} does not match outer face {outer_face}"
            )));
        }
        Ok(())
    }

    /// `self ∘ inner`: each site of `self` is filled with the corresponding
    /// region of `inner`, each inner name of `self` is joined with the
    /// same-named outer name of `inner`.
    pub fn inner_compose(&mut self, inner: &Bigraph) -> BigraphResult<()> {
        Self::ensure_composable(&self.structure, inner.structure())?;
        let s = &mut self.structure;
        let parents: Vec<Parent> = s.sites.iter().map(|&site| s.site_data[site].parent).collect();
        let targets: BTreeMap<String, Handle> = s
            .inner_index
            .iter()
            .map(|(name, &id)| (name.clone(), s.inner_data[id].handle))
            .collect();
        let old_inners: Vec<InnerNameId> = s.inner_index.values().copied().collect();
        let old_sites = std::mem::take(&mut s.sites);

        let map = s.absorb(inner.structure(), RootPlacement::Glue(&parents), &targets);
        debug_assert!(map.outers.is_empty());
        for site in old_sites {
            s.remove_site(site);
        }
        for id in old_inners {
            s.remove_inner(id);
        }
        s.sites = map.sites;
        for id in map.inners {
            s.index_inner(id);
        }
        debug!(nodes = s.node_data.len(), "composed with inner bigraph");
        self.commit("inner_compose");
        Ok(())
    }

    /// `outer ∘ self`: `self` fills the sites of `outer`.
    pub fn outer_compose(&mut self, outer: &Bigraph) -> BigraphResult<()> {
        Self::ensure_composable(outer.structure(), &self.structure)?;
        let s = &mut self.structure;
        let map = s.absorb(outer.structure(), RootPlacement::Fresh, &BTreeMap::new());

        for (k, root) in std::mem::take(&mut s.roots).into_iter().enumerate() {
            let site = map.sites[k];
            let parent = s.site_data[site].parent;
            s.move_children(Parent::Root(root), parent);
            s.remove_site(site);
            s.root_data.remove(root);
        }
        let old_outers: Vec<OuterNameId> = s.outer_index.values().copied().collect();
        for &inner in &map.inners {
            let (name, handle) = {
                let data = &s.inner_data[inner];
                (data.name.clone(), data.handle)
            };
            if let Some(&own) = s.outer_index.get(&name) {
                s.move_points(Handle::Outer(own), handle);
            }
            s.remove_inner(inner);
        }
        for id in old_outers {
            s.remove_outer(id);
        }
        s.roots = map.roots;
        for id in map.outers {
            s.index_outer(id);
        }
        debug!(nodes = s.node_data.len(), "composed into outer bigraph");
        self.commit("outer_compose");
        Ok(())
    }

    /// `self . inner`: like `inner_compose`, but outer names of `inner` are
    /// exported through `self`'s outer face, creating the missing ones.
    /// `self` must have no inner names.
    pub fn inner_nest(&mut self, inner: &Bigraph) -> BigraphResult<()> {
        ensure_same_signature(&self.structure.signature, inner.signature())?;
        if !self.structure.inner_index.is_empty() {
            return Err(BigraphError::IncompatibleInterface(
                "nesting requires an outer bigraph without inner names".into(),
            ));
        }
        if self.structure.sites.len() != inner.roots().len() {
            return Err(BigraphError::IncompatibleInterface(format!(
                "{} sites cannot host {} regions",
                self.structure.sites.len(),
                inner.roots().len()
            )));
        }
        for (name, _) in inner.outer_names() {
            let outer = match self.structure.outer_index.get(name) {
                Some(&id) => id,
                None => self.structure.new_outer(name.to_string()),
            };
            self.structure.new_inner(name.to_string(), Handle::Outer(outer));
        }
        self.inner_compose(inner)
    }

    /// `outer . self`.
    pub fn outer_nest(&mut self, outer: &Bigraph) -> BigraphResult<()> {
        ensure_same_signature(&self.structure.signature, outer.signature())?;
        if !outer.structure().inner_index.is_empty() {
            return Err(BigraphError::IncompatibleInterface(
                "nesting requires an outer bigraph without inner names".into(),
            ));
        }
        if outer.sites().len() != self.structure.roots.len() {
            return Err(BigraphError::IncompatibleInterface(format!(
                "{} sites cannot host {} regions",
                outer.sites().len(),
                self.structure.roots.len()
            )));
        }
        let mut host = outer.structure().clone();
        for name in self.structure.outer_index.keys() {
            let id = match host.outer_index.get(name) {
                Some(&id) => id,
                None => host.new_outer(name.clone()),
            };
            host.new_inner(name.clone(), Handle::Outer(id));
        }
        let host = Bigraph::from_structure(host, self.policy);
        self.outer_compose(&host)
    }
}

impl fmt::Display for BigraphBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_structure(&self.structure, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureBuilder;
    use crate::structure::{Child, Port};
    use proptest::prelude::*;

    fn sig() -> Arc<Signature> {
        SignatureBuilder::new()
            .add("A", true, 1)
            .add("B", true, 0)
            .add("L", true, 2)
            .add("P", false, 1)
            .build()
            .unwrap()
    }

    #[test]
    fn add_node_fills_missing_ports_with_fresh_edges() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        let n = b.add_node("L", r.into(), &[]).unwrap();
        let h0 = b.handle(Point::Port(Port::new(n, 0))).unwrap();
        let h1 = b.handle(Point::Port(Port::new(n, 1))).unwrap();
        assert!(matches!(h0, Handle::Edge(_)));
        assert_ne!(h0, h1);
        assert_eq!(b.edges().len(), 2);
        assert!(b.is_consistent());
    }

    #[test]
    fn add_node_rejects_extra_handles() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        let before = b.to_string();
        let err = b.add_node("A", r.into(), &[x.into(), x.into()]).unwrap_err();
        assert_eq!(
            err,
            BigraphError::ArityMismatch {
                control: "A".into(),
                arity: 1,
                given: 2
            }
        );
        assert_eq!(b.to_string(), before);
        assert_eq!(b.node_count(), 0);
    }

    #[test]
    fn add_node_rejects_unknown_control_and_stale_parent() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        assert_eq!(
            b.add_node("Z", r.into(), &[]).unwrap_err(),
            BigraphError::UnknownControl("Z".into())
        );
        b.remove_root(r).unwrap();
        assert!(matches!(
            b.add_node("B", r.into(), &[]),
            Err(BigraphError::UnknownEntity { kind: "root", .. })
        ));
    }

    #[test]
    fn relinking_drops_idle_edges() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        let n = b.add_node("A", r.into(), &[]).unwrap();
        assert_eq!(b.edges().len(), 1);
        let x = b.add_outer_name("x").unwrap();
        b.relink(Point::Port(Port::new(n, 0)), x.into()).unwrap();
        assert!(b.edges().is_empty());
        let e = b.unlink(Point::Port(Port::new(n, 0))).unwrap();
        assert_eq!(b.edges(), vec![e]);
        assert!(b.points(x.into()).unwrap().is_empty());
    }

    #[test]
    fn relink_points_joins_ports() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        let n1 = b.add_node("A", r.into(), &[]).unwrap();
        let n2 = b.add_node("A", r.into(), &[]).unwrap();
        let p1 = Point::Port(Port::new(n1, 0));
        let p2 = Point::Port(Port::new(n2, 0));
        let e = b.relink_points(&[p1, p2]).unwrap();
        assert_eq!(b.edges(), vec![e]);
        assert_eq!(b.points(e.into()).unwrap().len(), 2);
        assert!(b.relink_points(&[]).is_err());
    }

    #[test]
    fn close_and_rename_names() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        b.add_node("A", r.into(), &[x.into()]).unwrap();
        b.add_node("A", r.into(), &[x.into()]).unwrap();
        b.add_inner_name("y", Some(x.into())).unwrap();

        b.rename_outer_name("x", "z").unwrap();
        assert!(b.outer_name("x").is_none());
        assert_eq!(b.outer_name("z"), Some(x));
        assert_eq!(
            b.rename_inner_name("y", "y"),
            Ok(())
        );
        b.add_inner_name("w", None).unwrap();
        assert_eq!(
            b.rename_inner_name("y", "w").unwrap_err(),
            BigraphError::NameClash(vec!["w".into()])
        );

        b.close_outer_name("z").unwrap();
        assert!(b.outer_name("z").is_none());
        // The two ports and the inner name now share one edge.
        let edge_sizes: Vec<usize> = b
            .edges()
            .into_iter()
            .map(|e| b.points(e.into()).unwrap().len())
            .collect();
        assert!(edge_sizes.contains(&3));

        b.close_inner_name("w").unwrap();
        assert!(b.inner_name("w").is_none());
        assert_eq!(
            b.close_inner_name("w").unwrap_err(),
            BigraphError::UnknownName("w".into())
        );
        assert!(b.is_consistent());
    }

    #[test]
    fn merge_and_merge_roots() {
        let mut b = BigraphBuilder::new(sig());
        let roots: Vec<RootId> = (0..4).map(|_| b.add_root()).collect();
        for &r in &roots {
            b.add_node("B", r.into(), &[]).unwrap();
        }
        let merged = b.merge_roots(1, 2).unwrap();
        assert_eq!(b.roots(), &[roots[0], merged, roots[3]]);
        assert_eq!(b.children(merged.into()).unwrap().len(), 2);
        assert!(b.merge_roots(2, 2).is_err());

        let single = b.merge();
        assert_eq!(b.roots(), &[single]);
        assert_eq!(b.children(single.into()).unwrap().len(), 4);

        let empty_slot = b.merge_roots(0, 0).unwrap();
        assert_eq!(b.roots(), &[empty_slot, single]);
    }

    #[test]
    fn remove_root_requires_empty_root() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        b.add_node("B", r.into(), &[]).unwrap();
        assert_eq!(b.remove_root(r).unwrap_err(), BigraphError::NonEmptyRoot(r));
        let r2 = b.add_root_at(0).unwrap();
        assert_eq!(b.roots(), &[r2, r]);
        b.remove_root(r2).unwrap();
        assert_eq!(b.roots(), &[r]);
        assert!(b.add_root_at(5).is_err());
    }

    #[test]
    fn ground_removes_sites_and_inner_names() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        b.add_site(r.into()).unwrap();
        b.add_inner_name("y", None).unwrap();
        assert!(!b.is_ground());
        b.ground();
        assert!(b.is_ground());
        assert!(b.edges().is_empty());
    }

    #[test]
    fn left_juxtapose_puts_operand_first() {
        let s = sig();
        let mut b = BigraphBuilder::new(s.clone());
        let mine = b.add_root();
        let id = Bigraph::make_id(s, 1, ["x"]).unwrap();
        b.left_juxtapose(&id).unwrap();
        assert_eq!(b.roots().len(), 2);
        assert_eq!(b.roots()[1], mine);
        assert_eq!(b.sites().len(), 1);
    }

    #[test]
    fn inner_compose_keeps_own_identifiers() {
        let s = sig();
        let mut outer = BigraphBuilder::new(s.clone());
        let r = outer.add_root();
        let x = outer.add_outer_name("x").unwrap();
        let a = outer.add_node("A", r.into(), &[x.into()]).unwrap();
        outer.add_site(a.into()).unwrap();
        outer.add_inner_name("y", Some(x.into())).unwrap();

        let mut inner = BigraphBuilder::new(s.clone());
        let ir = inner.add_root();
        let y = inner.add_outer_name("y").unwrap();
        inner.add_node("A", ir.into(), &[y.into()]).unwrap();
        let inner = inner.freeze();

        outer.inner_compose(&inner).unwrap();
        assert_eq!(outer.roots(), &[r]);
        assert!(outer.is_ground());
        assert_eq!(outer.node_count(), 2);
        assert_eq!(outer.control(a).unwrap().name(), "A");
        // Both A ports end up on x.
        assert_eq!(outer.points(x.into()).unwrap().len(), 2);
    }

    #[test]
    fn outer_compose_matches_inner_compose() {
        let s = sig();
        let mut host = BigraphBuilder::new(s.clone());
        let r = host.add_root();
        let a = host.add_node("A", r.into(), &[]).unwrap();
        host.add_site(a.into()).unwrap();
        let host_edge = host.handle(Point::Port(Port::new(a, 0))).unwrap();
        host.add_inner_name("y", Some(host_edge)).unwrap();
        let host = host.freeze();

        let mut guest = BigraphBuilder::new(s.clone());
        let gr = guest.add_root();
        let y = guest.add_outer_name("y").unwrap();
        let b_node = guest.add_node("A", gr.into(), &[y.into()]).unwrap();
        let guest_frozen = guest.make_bigraph();

        guest.outer_compose(&host).unwrap();
        assert!(guest.is_ground());
        assert!(guest.outer_name("y").is_none());
        assert_eq!(guest.control(b_node).unwrap().name(), "A");
        let expected = host.compose(&guest_frozen).unwrap();
        assert!(guest.make_bigraph().is_isomorphic(&expected));
    }

    #[test]
    fn nest_imports_outer_names() {
        let s = sig();
        let mut host = BigraphBuilder::new(s.clone());
        let r = host.add_root();
        let a = host.add_node("A", r.into(), &[]).unwrap();
        host.add_site(a.into()).unwrap();
        let host = host.freeze();

        let mut guest = BigraphBuilder::new(s.clone());
        let gr = guest.add_root();
        let z = guest.add_outer_name("z").unwrap();
        guest.add_node("A", gr.into(), &[z.into()]).unwrap();
        let guest = guest.freeze();

        let nested = host.nest(&guest).unwrap();
        assert!(nested.outer_name("z").is_some());
        assert!(nested.is_ground());
        assert_eq!(nested.node_count(), 2);

        let mut outer_side = guest.to_builder();
        outer_side.outer_nest(&host).unwrap();
        assert!(outer_side.make_bigraph().is_isomorphic(&nested));
    }

    #[test]
    fn nest_rejects_inner_names_on_host() {
        let s = sig();
        let host = Bigraph::make_id(s.clone(), 1, ["q"]).unwrap();
        let guest = Bigraph::make_id(s, 1, Vec::<&str>::new()).unwrap();
        assert!(matches!(
            host.nest(&guest),
            Err(BigraphError::IncompatibleInterface(_))
        ));
    }

    #[test]
    fn freeze_and_make_bigraph_share_identifiers() {
        let mut b = BigraphBuilder::new(sig());
        let r = b.add_root();
        let n = b.add_node("B", r.into(), &[]).unwrap();
        let snapshot = b.make_bigraph();
        b.add_node("B", r.into(), &[]).unwrap();
        assert_eq!(snapshot.node_count(), 1);
        assert_eq!(snapshot.parent(Child::Node(n)), Some(Parent::Root(r)));
        let frozen = b.freeze();
        assert_eq!(frozen.node_count(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        AddRoot,
        AddSite(usize),
        AddNode(usize, usize, Vec<usize>),
        AddOuter(u8),
        AddInner(u8, Option<usize>),
        Relink(usize, usize),
        Unlink(usize),
        CloseOuter(u8),
        CloseInner(u8),
        RemoveRoot(usize),
        CloseSite(usize),
        Merge,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::AddRoot),
            any::<usize>().prop_map(Op::AddSite),
            (any::<usize>(), 0..5usize, prop::collection::vec(any::<usize>(), 0..3))
                .prop_map(|(p, c, h)| Op::AddNode(p, c, h)),
            (0..4u8).prop_map(Op::AddOuter),
            (0..4u8, prop::option::of(any::<usize>())).prop_map(|(n, h)| Op::AddInner(n, h)),
            (any::<usize>(), any::<usize>()).prop_map(|(p, h)| Op::Relink(p, h)),
            any::<usize>().prop_map(Op::Unlink),
            (0..4u8).prop_map(Op::CloseOuter),
            (0..4u8).prop_map(Op::CloseInner),
            any::<usize>().prop_map(Op::RemoveRoot),
            any::<usize>().prop_map(Op::CloseSite),
            Just(Op::Merge),
        ]
    }

    fn all_handles(b: &BigraphBuilder) -> Vec<Handle> {
        b.outer_names()
            .map(|(_, id)| Handle::Outer(id))
            .chain(b.edges().into_iter().map(Handle::Edge))
            .collect()
    }

    fn all_points(b: &BigraphBuilder) -> Vec<Point> {
        let mut points = Vec::new();
        for n in b.nodes() {
            for k in 0..b.control(n).unwrap().arity() {
                points.push(Point::Port(Port::new(n, k)));
            }
        }
        points.extend(b.inner_names().map(|(_, id)| Point::Inner(id)));
        points
    }

    fn all_parents(b: &BigraphBuilder) -> Vec<Parent> {
        b.roots()
            .iter()
            .map(|&r| Parent::Root(r))
            .chain(b.nodes().into_iter().map(Parent::Node))
            .collect()
    }

    fn pick<T: Copy>(items: &[T], seed: usize) -> Option<T> {
        (!items.is_empty()).then(|| items[seed % items.len()])
    }

    fn apply(b: &mut BigraphBuilder, op: &Op) -> BigraphResult<()> {
        const CONTROLS: [&str; 5] = ["A", "B", "L", "P", "Missing"];
        // Stale ids are produced on purpose: a removed root stays addressable.
        let stale_root = RootId::new(u32::MAX);
        match op {
            Op::AddRoot => {
                b.add_root();
            }
            Op::AddSite(p) => {
                let parent = pick(&all_parents(b), *p).unwrap_or(Parent::Root(stale_root));
                b.add_site(parent)?;
            }
            Op::AddNode(p, c, hs) => {
                let parent = pick(&all_parents(b), *p).unwrap_or(Parent::Root(stale_root));
                let handles = all_handles(b);
                let chosen: Vec<Handle> = hs.iter().filter_map(|&h| pick(&handles, h)).collect();
                b.add_node(CONTROLS[*c], parent, &chosen)?;
            }
            Op::AddOuter(n) => {
                b.add_outer_name(&format!("o{n}"))?;
            }
            Op::AddInner(n, h) => {
                let handle = h.and_then(|h| pick(&all_handles(b), h));
                b.add_inner_name(&format!("i{n}"), handle)?;
            }
            Op::Relink(p, h) => {
                if let (Some(point), Some(handle)) = (pick(&all_points(b), *p), pick(&all_handles(b), *h)) {
                    b.relink(point, handle)?;
                }
            }
            Op::Unlink(p) => {
                if let Some(point) = pick(&all_points(b), *p) {
                    b.unlink(point)?;
                }
            }
            Op::CloseOuter(n) => b.close_outer_name(&format!("o{n}"))?,
            Op::CloseInner(n) => b.close_inner_name(&format!("i{n}"))?,
            Op::RemoveRoot(r) => {
                let root = pick(b.roots(), *r).unwrap_or(stale_root);
                b.remove_root(root)?;
            }
            Op::CloseSite(s) => {
                if let Some(site) = pick(b.sites(), *s) {
                    b.close_site(site)?;
                }
            }
            Op::Merge => {
                b.merge();
            }
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn mutations_keep_builder_consistent(ops in prop::collection::vec(op(), 1..40)) {
            let mut b = BigraphBuilder::new(sig()).with_policy(ConsistencyPolicy::Off);
            for op in &ops {
                let before = b.to_string();
                match apply(&mut b, op) {
                    Ok(()) => prop_assert!(b.check_consistency().is_ok(), "{:?} broke {}", op, b),
                    Err(_) => prop_assert_eq!(b.to_string(), before),
                }
            }
            let frozen = b.freeze();
            prop_assert!(frozen.replicate().is_isomorphic(&frozen));
        }
    }
}
