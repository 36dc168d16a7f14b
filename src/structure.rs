//! Entity kinds and the arena-backed store shared by bigraphs and builders.
//!
//! A [`Structure`] owns one arena per entity kind plus the ordered root and
//! site lists and the name indexes of the two faces. Place and link relations
//! are stored in both directions (a child records its parent and the parent
//! records its children; a point records its handle and the handle records its
//! points) and the primitive edits below keep both directions in sync.
//!
//! Primitives do not validate their arguments; the builder validates every
//! identifier and name first and only then edits, so a rejected operation
//! never leaves a partial change behind.

use crate::arena::{
    Arena, EdgeId, EntityId, InnerNameId, NodeId, OuterNameId, RootId, SiteId,
};
use crate::error::{BigraphError, BigraphResult};
use crate::signature::{Control, Signature};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Something that can contain place-graph children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Parent {
    Root(RootId),
    Node(NodeId),
}

/// Something that sits below a parent in the place graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Child {
    Node(NodeId),
    Site(SiteId),
}

/// The `index`-th port of `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Port {
    pub node: NodeId,
    pub index: usize,
}

impl Port {
    pub const fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// A link-graph point: references exactly one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Point {
    Port(Port),
    Inner(InnerNameId),
}

/// A link-graph handle: referenced by any number of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Handle {
    Outer(OuterNameId),
    Edge(EdgeId),
}

impl From<NodeId> for Parent {
    fn from(id: NodeId) -> Self {
        Parent::Node(id)
    }
}

impl From<RootId> for Parent {
    fn from(id: RootId) -> Self {
        Parent::Root(id)
    }
}

impl From<NodeId> for Child {
    fn from(id: NodeId) -> Self {
        Child::Node(id)
    }
}

impl From<SiteId> for Child {
    fn from(id: SiteId) -> Self {
        Child::Site(id)
    }
}

impl From<Port> for Point {
    fn from(port: Port) -> Self {
        Point::Port(port)
    }
}

impl From<InnerNameId> for Point {
    fn from(id: InnerNameId) -> Self {
        Point::Inner(id)
    }
}

impl From<OuterNameId> for Handle {
    fn from(id: OuterNameId) -> Self {
        Handle::Outer(id)
    }
}

impl From<EdgeId> for Handle {
    fn from(id: EdgeId) -> Self {
        Handle::Edge(id)
    }
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parent::Root(id) => write!(f, "{id}"),
            Parent::Node(id) => write!(f, "{id}"),
        }
    }
}

impl fmt::Display for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Node(id) => write!(f, "{id}"),
            Child::Site(id) => write!(f, "{id}"),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Port(port) => write!(f, "{}:{}", port.node, port.index),
            Point::Inner(id) => write!(f, "{id}"),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Outer(id) => write!(f, "{id}"),
            Handle::Edge(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RootData {
    pub children: BTreeSet<Child>,
}

#[derive(Debug, Clone)]
pub(crate) struct SiteData {
    pub parent: Parent,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub control: Arc<Control>,
    pub parent: Parent,
    pub children: BTreeSet<Child>,
    pub ports: Vec<Handle>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EdgeData {
    pub points: BTreeSet<Point>,
}

#[derive(Debug, Clone)]
pub(crate) struct OuterNameData {
    pub name: String,
    pub points: BTreeSet<Point>,
}

#[derive(Debug, Clone)]
pub(crate) struct InnerNameData {
    pub name: String,
    pub handle: Handle,
}

/// Arena-backed storage of one bigraph.
#[derive(Debug, Clone)]
pub(crate) struct Structure {
    pub signature: Arc<Signature>,
    pub roots: Vec<RootId>,
    pub sites: Vec<SiteId>,
    pub outer_index: BTreeMap<String, OuterNameId>,
    pub inner_index: BTreeMap<String, InnerNameId>,
    pub root_data: Arena<RootId, RootData>,
    pub site_data: Arena<SiteId, SiteData>,
    pub node_data: Arena<NodeId, NodeData>,
    pub edge_data: Arena<EdgeId, EdgeData>,
    pub outer_data: Arena<OuterNameId, OuterNameData>,
    pub inner_data: Arena<InnerNameId, InnerNameData>,
}

fn unknown<I: EntityId + fmt::Display>(id: I) -> BigraphError {
    BigraphError::UnknownEntity {
        kind: I::KIND,
        id: id.to_string(),
    }
}

impl Structure {
    pub fn empty(signature: Arc<Signature>) -> Self {
        Self {
            signature,
            roots: Vec::new(),
            sites: Vec::new(),
            outer_index: BTreeMap::new(),
            inner_index: BTreeMap::new(),
            root_data: Arena::new(),
            site_data: Arena::new(),
            node_data: Arena::new(),
            edge_data: Arena::new(),
            outer_data: Arena::new(),
            inner_data: Arena::new(),
        }
    }

    // ---- validation -----------------------------------------------------

    pub fn check_root(&self, id: RootId) -> BigraphResult<()> {
        self.root_data.contains(id).then_some(()).ok_or_else(|| unknown(id))
    }

    pub fn check_site(&self, id: SiteId) -> BigraphResult<()> {
        self.site_data.contains(id).then_some(()).ok_or_else(|| unknown(id))
    }

    pub fn check_node(&self, id: NodeId) -> BigraphResult<()> {
        self.node_data.contains(id).then_some(()).ok_or_else(|| unknown(id))
    }

    pub fn check_parent(&self, parent: Parent) -> BigraphResult<()> {
        match parent {
            Parent::Root(id) => self.check_root(id),
            Parent::Node(id) => self.check_node(id),
        }
    }

    pub fn check_child(&self, child: Child) -> BigraphResult<()> {
        match child {
            Child::Node(id) => self.check_node(id),
            Child::Site(id) => self.check_site(id),
        }
    }

    pub fn check_handle(&self, handle: Handle) -> BigraphResult<()> {
        let live = match handle {
            Handle::Outer(id) => self.outer_data.contains(id),
            Handle::Edge(id) => self.edge_data.contains(id),
        };
        live.then_some(()).ok_or_else(|| match handle {
            Handle::Outer(id) => unknown(id),
            Handle::Edge(id) => unknown(id),
        })
    }

    pub fn check_point(&self, point: Point) -> BigraphResult<()> {
        match point {
            Point::Port(port) => {
                let node = self.node_data.get(port.node).ok_or_else(|| unknown(port.node))?;
                if port.index < node.ports.len() {
                    Ok(())
                } else {
                    Err(BigraphError::UnknownEntity {
                        kind: "port",
                        id: format!("{}:{}", port.node, port.index),
                    })
                }
            }
            Point::Inner(id) => self.inner_data.contains(id).then_some(()).ok_or_else(|| unknown(id)),
        }
    }

    // ---- queries --------------------------------------------------------

    pub fn parent_of(&self, child: Child) -> Parent {
        match child {
            Child::Node(id) => self.node_data[id].parent,
            Child::Site(id) => self.site_data[id].parent,
        }
    }

    pub fn children_of(&self, parent: Parent) -> &BTreeSet<Child> {
        match parent {
            Parent::Root(id) => &self.root_data[id].children,
            Parent::Node(id) => &self.node_data[id].children,
        }
    }

    fn children_mut(&mut self, parent: Parent) -> &mut BTreeSet<Child> {
        match parent {
            Parent::Root(id) => &mut self.root_data[id].children,
            Parent::Node(id) => &mut self.node_data[id].children,
        }
    }

    pub fn handle_of(&self, point: Point) -> Handle {
        match point {
            Point::Port(port) => self.node_data[port.node].ports[port.index],
            Point::Inner(id) => self.inner_data[id].handle,
        }
    }

    pub fn points_of(&self, handle: Handle) -> &BTreeSet<Point> {
        match handle {
            Handle::Outer(id) => &self.outer_data[id].points,
            Handle::Edge(id) => &self.edge_data[id].points,
        }
    }

    fn points_mut(&mut self, handle: Handle) -> &mut BTreeSet<Point> {
        match handle {
            Handle::Outer(id) => &mut self.outer_data[id].points,
            Handle::Edge(id) => &mut self.edge_data[id].points,
        }
    }

    pub fn outer_name(&self, id: OuterNameId) -> &str {
        &self.outer_data[id].name
    }

    /// Node children of `parent`, in id order.
    pub fn child_nodes(&self, parent: Parent) -> impl Iterator<Item = NodeId> + '_ {
        self.children_of(parent).iter().filter_map(|child| match child {
            Child::Node(id) => Some(*id),
            Child::Site(_) => None,
        })
    }

    /// Nodes in breadth-first order from the roots.
    pub fn nodes_bfs(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_data.len());
        let mut queue: VecDeque<Parent> = self.roots.iter().map(|&r| Parent::Root(r)).collect();
        while let Some(parent) = queue.pop_front() {
            for id in self.child_nodes(parent) {
                out.push(id);
                queue.push_back(Parent::Node(id));
            }
        }
        out
    }

    /// Strict ancestors of `parent` that are nodes, closest first.
    pub fn node_ancestors(&self, parent: Parent) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = match parent {
            Parent::Root(_) => return out,
            Parent::Node(id) => self.node_data[id].parent,
        };
        while let Parent::Node(id) = cursor {
            out.push(id);
            cursor = self.node_data[id].parent;
        }
        out
    }

    /// Root of the region containing `parent`.
    pub fn region_of(&self, parent: Parent) -> RootId {
        let mut cursor = parent;
        loop {
            match cursor {
                Parent::Root(id) => return id,
                Parent::Node(id) => cursor = self.node_data[id].parent,
            }
        }
    }

    pub fn is_ground(&self) -> bool {
        self.sites.is_empty() && self.inner_index.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
            && self.sites.is_empty()
            && self.outer_index.is_empty()
            && self.inner_index.is_empty()
    }

    pub fn outer_names(&self) -> BTreeSet<String> {
        self.outer_index.keys().cloned().collect()
    }

    pub fn inner_names(&self) -> BTreeSet<String> {
        self.inner_index.keys().cloned().collect()
    }

    // ---- primitive edits ------------------------------------------------

    /// Creates a root; it is not yet part of the ordered root list.
    pub fn alloc_root(&mut self) -> RootId {
        self.root_data.insert(RootData::default())
    }

    /// Creates a root at `position` in the root order (at the end if `None`).
    pub fn new_root(&mut self, position: Option<usize>) -> RootId {
        let id = self.alloc_root();
        match position {
            Some(index) => self.roots.insert(index, id),
            None => self.roots.push(id),
        }
        id
    }

    /// Creates a site under `parent`; it is not yet part of the site order.
    pub fn alloc_site(&mut self, parent: Parent) -> SiteId {
        let id = self.site_data.insert(SiteData { parent });
        self.children_mut(parent).insert(Child::Site(id));
        id
    }

    pub fn new_site(&mut self, parent: Parent) -> SiteId {
        let id = self.alloc_site(parent);
        self.sites.push(id);
        id
    }

    /// Creates a node whose `i`-th port is linked to `ports[i]`.
    pub fn new_node(&mut self, control: Arc<Control>, parent: Parent, ports: Vec<Handle>) -> NodeId {
        let id = self.node_data.insert(NodeData {
            control,
            parent,
            children: BTreeSet::new(),
            ports: ports.clone(),
        });
        self.children_mut(parent).insert(Child::Node(id));
        for (index, handle) in ports.into_iter().enumerate() {
            self.points_mut(handle).insert(Point::Port(Port::new(id, index)));
        }
        id
    }

    /// Creates an edge without points. Callers link something to it before
    /// the next `drop_idle_edges`.
    pub fn new_edge(&mut self) -> EdgeId {
        self.edge_data.insert(EdgeData::default())
    }

    /// Creates an outer name that is not yet indexed by name.
    pub fn alloc_outer(&mut self, name: String) -> OuterNameId {
        self.outer_data.insert(OuterNameData {
            name,
            points: BTreeSet::new(),
        })
    }

    pub fn new_outer(&mut self, name: String) -> OuterNameId {
        let id = self.alloc_outer(name.clone());
        self.outer_index.insert(name, id);
        id
    }

    /// Creates an inner name that is not yet indexed by name.
    pub fn alloc_inner(&mut self, name: String, handle: Handle) -> InnerNameId {
        let id = self.inner_data.insert(InnerNameData { name, handle });
        self.points_mut(handle).insert(Point::Inner(id));
        id
    }

    pub fn new_inner(&mut self, name: String, handle: Handle) -> InnerNameId {
        let id = self.alloc_inner(name.clone(), handle);
        self.inner_index.insert(name, id);
        id
    }

    pub fn index_outer(&mut self, id: OuterNameId) {
        let name = self.outer_data[id].name.clone();
        self.outer_index.insert(name, id);
    }

    pub fn index_inner(&mut self, id: InnerNameId) {
        let name = self.inner_data[id].name.clone();
        self.inner_index.insert(name, id);
    }

    /// Points `point` at `handle`, keeping both directions in sync. The old
    /// handle may become idle; see [`Structure::drop_idle_edges`].
    pub fn link(&mut self, point: Point, handle: Handle) {
        let old = self.handle_of(point);
        if old == handle {
            return;
        }
        self.points_mut(old).remove(&point);
        match point {
            Point::Port(port) => self.node_data[port.node].ports[port.index] = handle,
            Point::Inner(id) => self.inner_data[id].handle = handle,
        }
        self.points_mut(handle).insert(point);
    }

    /// Relinks every point of `from` to `to`.
    pub fn move_points(&mut self, from: Handle, to: Handle) {
        if from == to {
            return;
        }
        let points: Vec<Point> = self.points_of(from).iter().copied().collect();
        for point in points {
            self.link(point, to);
        }
    }

    /// Removes edges without points.
    pub fn drop_idle_edges(&mut self) {
        let idle: Vec<EdgeId> = self
            .edge_data
            .iter()
            .filter(|(_, edge)| edge.points.is_empty())
            .map(|(id, _)| id)
            .collect();
        for id in idle {
            self.edge_data.remove(id);
        }
    }

    /// Moves `child` under `parent`.
    pub fn set_parent(&mut self, child: Child, parent: Parent) {
        let old = self.parent_of(child);
        self.children_mut(old).remove(&child);
        match child {
            Child::Node(id) => self.node_data[id].parent = parent,
            Child::Site(id) => self.site_data[id].parent = parent,
        }
        self.children_mut(parent).insert(child);
    }

    /// Moves all children of `from` under `to`.
    pub fn move_children(&mut self, from: Parent, to: Parent) {
        let children: Vec<Child> = self.children_of(from).iter().copied().collect();
        for child in children {
            self.set_parent(child, to);
        }
    }

    /// Deletes a site, detaching it from its parent and from the site order.
    pub fn remove_site(&mut self, id: SiteId) {
        let parent = self.site_data[id].parent;
        self.children_mut(parent).remove(&Child::Site(id));
        self.sites.retain(|&s| s != id);
        self.site_data.remove(id);
    }

    /// Deletes a root that has already been emptied.
    pub fn remove_root(&mut self, id: RootId) {
        debug_assert!(self.root_data[id].children.is_empty(), "removing a non-empty root");
        self.roots.retain(|&r| r != id);
        self.root_data.remove(id);
    }

    /// Deletes an inner name, unlinking it from its handle.
    pub fn remove_inner(&mut self, id: InnerNameId) {
        let data = &self.inner_data[id];
        let (handle, name) = (data.handle, data.name.clone());
        self.points_mut(handle).remove(&Point::Inner(id));
        if self.inner_index.get(&name) == Some(&id) {
            self.inner_index.remove(&name);
        }
        self.inner_data.remove(id);
    }

    /// Deletes an outer name. Its points must have been relinked already.
    pub fn remove_outer(&mut self, id: OuterNameId) {
        debug_assert!(self.outer_data[id].points.is_empty(), "removing a linked outer name");
        let name = self.outer_data[id].name.clone();
        if self.outer_index.get(&name) == Some(&id) {
            self.outer_index.remove(&name);
        }
        self.outer_data.remove(id);
    }

    /// Deletes a node subtree (nodes and sites below it included), unlinking
    /// all ports.
    pub fn remove_subtree(&mut self, id: NodeId) {
        let parent = self.node_data[id].parent;
        self.children_mut(parent).remove(&Child::Node(id));
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let Some(data) = self.node_data.remove(node) else {
                continue;
            };
            for (index, handle) in data.ports.iter().enumerate() {
                self.points_mut(*handle).remove(&Point::Port(Port::new(node, index)));
            }
            for child in data.children {
                match child {
                    Child::Node(n) => stack.push(n),
                    Child::Site(s) => {
                        self.sites.retain(|&x| x != s);
                        self.site_data.remove(s);
                    }
                }
            }
        }
    }
}

/// Read-only query surface shared by [`Bigraph`](crate::Bigraph) and
/// [`BigraphBuilder`](crate::BigraphBuilder). The implementing type provides a
/// private `structure(&self) -> &Structure`.
macro_rules! impl_read_queries {
    ($ty:ty) => {
        impl $ty {
            pub fn signature(&self) -> &std::sync::Arc<$crate::signature::Signature> {
                &self.structure().signature
            }

            /// Roots in order (the width of the outer face).
            pub fn roots(&self) -> &[$crate::arena::RootId] {
                &self.structure().roots
            }

            /// Sites in order (the width of the inner face).
            pub fn sites(&self) -> &[$crate::arena::SiteId] {
                &self.structure().sites
            }

            /// Outer names by name.
            pub fn outer_names(&self) -> impl Iterator<Item = (&str, $crate::arena::OuterNameId)> + '_ {
                self.structure().outer_index.iter().map(|(name, &id)| (name.as_str(), id))
            }

            /// Inner names by name.
            pub fn inner_names(&self) -> impl Iterator<Item = (&str, $crate::arena::InnerNameId)> + '_ {
                self.structure().inner_index.iter().map(|(name, &id)| (name.as_str(), id))
            }

            pub fn outer_name(&self, name: &str) -> Option<$crate::arena::OuterNameId> {
                self.structure().outer_index.get(name).copied()
            }

            pub fn inner_name(&self, name: &str) -> Option<$crate::arena::InnerNameId> {
                self.structure().inner_index.get(name).copied()
            }

            pub fn outer_face(&self) -> $crate::structure::Face {
                $crate::structure::Face::new(self.structure().roots.len(), self.structure().outer_names())
            }

            pub fn inner_face(&self) -> $crate::structure::Face {
                $crate::structure::Face::new(self.structure().sites.len(), self.structure().inner_names())
            }

            /// Nodes in breadth-first order from the roots.
            pub fn nodes(&self) -> Vec<$crate::arena::NodeId> {
                self.structure().nodes_bfs()
            }

            pub fn node_count(&self) -> usize {
                self.structure().node_data.len()
            }

            pub fn edges(&self) -> Vec<$crate::arena::EdgeId> {
                self.structure().edge_data.ids().collect()
            }

            pub fn parent(&self, child: $crate::structure::Child) -> Option<$crate::structure::Parent> {
                let s = self.structure();
                s.check_child(child).ok().map(|_| s.parent_of(child))
            }

            pub fn children(
                &self,
                parent: $crate::structure::Parent,
            ) -> Option<&std::collections::BTreeSet<$crate::structure::Child>> {
                let s = self.structure();
                s.check_parent(parent).ok().map(|_| s.children_of(parent))
            }

            pub fn control(&self, node: $crate::arena::NodeId) -> Option<&$crate::signature::Control> {
                self.structure().node_data.get(node).map(|n| n.control.as_ref())
            }

            pub fn handle(&self, point: $crate::structure::Point) -> Option<$crate::structure::Handle> {
                let s = self.structure();
                s.check_point(point).ok().map(|_| s.handle_of(point))
            }

            pub fn points(
                &self,
                handle: $crate::structure::Handle,
            ) -> Option<&std::collections::BTreeSet<$crate::structure::Point>> {
                let s = self.structure();
                s.check_handle(handle).ok().map(|_| s.points_of(handle))
            }

            pub fn outer_name_of(&self, id: $crate::arena::OuterNameId) -> Option<&str> {
                self.structure().outer_data.get(id).map(|o| o.name.as_str())
            }

            pub fn inner_name_of(&self, id: $crate::arena::InnerNameId) -> Option<&str> {
                self.structure().inner_data.get(id).map(|i| i.name.as_str())
            }

            /// No sites and no inner names.
            pub fn is_ground(&self) -> bool {
                self.structure().is_ground()
            }

            /// No roots, sites or names.
            pub fn is_empty(&self) -> bool {
                self.structure().is_empty()
            }

            /// Runs the full structural consistency check.
            pub fn check_consistency(&self) -> Result<(), $crate::error::Inconsistency> {
                $crate::consistency::check(self.structure())
            }

            pub fn is_consistent(&self) -> bool {
                self.check_consistency().is_ok()
            }
        }
    };
}

pub(crate) use impl_read_queries;

/// One face of a bigraph: a width (roots or sites) and a name set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Face {
    pub width: usize,
    pub names: BTreeSet<String>,
}

impl Face {
    pub fn new(width: usize, names: BTreeSet<String>) -> Self {
        Self { width, names }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {{", self.width)?;
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}}>")
    }
}
