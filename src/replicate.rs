//! Deep copy of one structure into another.
//!
//! Every rebuilding operation (replication, juxtaposition, products,
//! composition, nesting) is a single traversal of the source structure that
//! allocates fresh records in the destination arenas and remembers the
//! old-id → new-id correspondence. The callers decide how the copied roots,
//! sites and names are spliced into the destination's faces.

use crate::arena::{EdgeId, InnerNameId, NodeId, OuterNameId, RootId, SiteId};
use crate::structure::{Child, Handle, Parent, Structure};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Where the copied regions go.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RootPlacement<'a> {
    /// Allocate one fresh root per source root (not yet in the root order).
    Fresh,
    /// The children of source root `k` are placed under `parents[k]`.
    Glue(&'a [Parent]),
}

/// Old-id → new-id correspondence produced by [`Structure::absorb`].
#[derive(Debug, Default)]
pub(crate) struct ReplicaMap {
    /// New roots in source root order (empty when glued).
    pub roots: Vec<RootId>,
    /// New sites in source site order; not yet in the destination site order.
    pub sites: Vec<SiteId>,
    /// Newly allocated outer names (not indexed), in source name order.
    pub outers: Vec<OuterNameId>,
    /// Newly allocated inner names (not indexed), in source name order.
    pub inners: Vec<InnerNameId>,
    pub nodes: HashMap<NodeId, NodeId>,
    pub edges: HashMap<EdgeId, EdgeId>,
    pub handles: HashMap<Handle, Handle>,
}

impl Structure {
    /// Copies `source` into `self`.
    ///
    /// Points of a source outer name whose name appears in `outer_targets`
    /// are attached to that handle of `self`; other outer names are copied as
    /// new, unindexed outer names. Inner names are always copied unindexed.
    pub(crate) fn absorb(
        &mut self,
        source: &Structure,
        roots: RootPlacement<'_>,
        outer_targets: &BTreeMap<String, Handle>,
    ) -> ReplicaMap {
        let mut map = ReplicaMap::default();

        for (name, &id) in &source.outer_index {
            let target = match outer_targets.get(name) {
                Some(&handle) => handle,
                None => {
                    let copy = self.alloc_outer(name.clone());
                    map.outers.push(copy);
                    Handle::Outer(copy)
                }
            };
            map.handles.insert(Handle::Outer(id), target);
        }

        let mut parents: VecDeque<(Parent, Parent)> = VecDeque::new();
        for (k, &root) in source.roots.iter().enumerate() {
            let target = match roots {
                RootPlacement::Fresh => {
                    let copy = self.alloc_root();
                    map.roots.push(copy);
                    Parent::Root(copy)
                }
                RootPlacement::Glue(targets) => targets[k],
            };
            parents.push_back((Parent::Root(root), target));
        }

        let mut site_copies: HashMap<SiteId, SiteId> = HashMap::new();
        while let Some((old_parent, new_parent)) = parents.pop_front() {
            for &child in source.children_of(old_parent) {
                match child {
                    Child::Site(site) => {
                        site_copies.insert(site, self.alloc_site(new_parent));
                    }
                    Child::Node(node) => {
                        let data = &source.node_data[node];
                        let ports: Vec<Handle> = data
                            .ports
                            .iter()
                            .map(|&handle| self.copy_handle(handle, &mut map))
                            .collect();
                        let copy = self.new_node(data.control.clone(), new_parent, ports);
                        map.nodes.insert(node, copy);
                        parents.push_back((Parent::Node(node), Parent::Node(copy)));
                    }
                }
            }
        }
        map.sites = source
            .sites
            .iter()
            .filter_map(|site| site_copies.get(site).copied())
            .collect();

        for (name, &id) in &source.inner_index {
            let handle = self.copy_handle(source.inner_data[id].handle, &mut map);
            map.inners.push(self.alloc_inner(name.clone(), handle));
        }

        map
    }

    fn copy_handle(&mut self, handle: Handle, map: &mut ReplicaMap) -> Handle {
        if let Some(&copy) = map.handles.get(&handle) {
            return copy;
        }
        let copy = match handle {
            Handle::Edge(edge) => {
                let fresh = self.new_edge();
                map.edges.insert(edge, fresh);
                Handle::Edge(fresh)
            }
            // Every source outer name is mapped up front.
            Handle::Outer(_) => handle,
        };
        map.handles.insert(handle, copy);
        copy
    }

    /// A compacted, independent copy with fresh identifiers.
    pub(crate) fn replicate(&self) -> (Structure, ReplicaMap) {
        let mut copy = Structure::empty(self.signature.clone());
        let map = copy.absorb(self, RootPlacement::Fresh, &BTreeMap::new());
        copy.roots = map.roots.clone();
        copy.sites = map.sites.clone();
        for &id in &map.outers {
            copy.index_outer(id);
        }
        for &id in &map.inners {
            copy.index_inner(id);
        }
        (copy, map)
    }
}
