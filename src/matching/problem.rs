//! Dense index tables for one agent/redex pair.
//!
//! The search works on small integer indices instead of arena identifiers:
//! agent and redex nodes are numbered in breadth-first order, roots and sites
//! by their interface position, and handles in a fixed order (outer names by
//! name, then edges). Everything the constraints need (children lists,
//! blocking by passive ancestors, handle incidence, candidate pairs with their
//! weights) is computed once here and shared by every search state.

use super::MatchPolicy;
use crate::arena::{InnerNameId, NodeId};
use crate::bigraph::Bigraph;
use crate::structure::{Child, Handle, Parent, Point, Structure};
use std::collections::HashMap;

/// A place-graph parent in index form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Place {
    Root(usize),
    Node(usize),
}

/// Link incidence of one side of the problem.
#[derive(Debug, Default)]
pub(crate) struct LinkTable {
    pub handles: Vec<Handle>,
    pub handle_index: HashMap<Handle, usize>,
    pub is_edge: Vec<bool>,
    /// Per node, the handle index of each port.
    pub port_handle: Vec<Vec<usize>>,
    /// Per handle, its ports as (node index, port).
    pub handle_ports: Vec<Vec<(usize, usize)>>,
    /// Per handle, the inner names pointing at it (inner-name indices).
    pub handle_inners: Vec<Vec<usize>>,
    /// Inner names in name order with their handle index.
    pub inners: Vec<(InnerNameId, usize)>,
}

impl LinkTable {
    fn build(s: &Structure, nodes: &[NodeId], node_index: &HashMap<NodeId, usize>) -> Self {
        let mut table = LinkTable::default();
        let handles: Vec<Handle> = s
            .outer_index
            .values()
            .map(|&id| Handle::Outer(id))
            .chain(s.edge_data.ids().map(Handle::Edge))
            .collect();
        for (k, &h) in handles.iter().enumerate() {
            table.handle_index.insert(h, k);
            table.is_edge.push(matches!(h, Handle::Edge(_)));
            table.handle_ports.push(Vec::new());
            table.handle_inners.push(Vec::new());
        }
        table.handles = handles;

        for (n, &node) in nodes.iter().enumerate() {
            let ports: Vec<usize> = s.node_data[node]
                .ports
                .iter()
                .map(|h| table.handle_index[h])
                .collect();
            for (k, &h) in ports.iter().enumerate() {
                table.handle_ports[h].push((n, k));
            }
            table.port_handle.push(ports);
        }
        for (i, &id) in s.inner_index.values().enumerate() {
            let h = table.handle_index[&s.handle_of(Point::Inner(id))];
            table.handle_inners[h].push(i);
            table.inners.push((id, h));
        }
        debug_assert!(table
            .handle_ports
            .iter()
            .flatten()
            .all(|(n, _)| node_index.contains_key(&nodes[*n])));
        table
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Everything the search and the reconstruction need, in index form.
#[derive(Debug)]
pub(crate) struct Problem {
    pub agent: Bigraph,
    pub redex: Bigraph,

    pub agent_nodes: Vec<NodeId>,
    pub agent_parent: Vec<Place>,
    pub agent_root_children: Vec<Vec<usize>>,
    pub agent_node_children: Vec<Vec<usize>>,
    /// Strict node ancestors of each agent node, closest first.
    pub agent_ancestors: Vec<Vec<usize>>,
    /// Passive, or below a passive node: no redex root may land here.
    pub agent_blocked: Vec<bool>,
    pub agent_links: LinkTable,

    pub redex_nodes: Vec<NodeId>,
    pub redex_parent: Vec<Place>,
    pub redex_root_children: Vec<Vec<usize>>,
    pub redex_node_children: Vec<Vec<usize>>,
    pub redex_root_sites: Vec<Vec<usize>>,
    pub redex_node_sites: Vec<Vec<usize>>,
    pub redex_site_parent: Vec<Place>,
    pub redex_links: LinkTable,

    /// Per redex node: compatible agent nodes with their raw weight.
    pub candidates: Vec<HashMap<usize, i64>>,
    /// +1 when maximising the total weight, -1 when minimising.
    pub sense: i64,
    /// Per redex node: the best attainable signed score.
    pub best_score: Vec<i64>,
    pub needed: Vec<bool>,
}

fn index_place(s: &Structure, node_index: &HashMap<NodeId, usize>, parent: Parent) -> Place {
    match parent {
        Parent::Root(r) => Place::Root(s.roots.iter().position(|&x| x == r).unwrap_or(usize::MAX)),
        Parent::Node(n) => Place::Node(node_index[&n]),
    }
}

fn children_tables(
    s: &Structure,
    nodes: &[NodeId],
    node_index: &HashMap<NodeId, usize>,
) -> (Vec<Vec<usize>>, Vec<Vec<usize>>, Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let site_index: HashMap<_, _> = s.sites.iter().enumerate().map(|(k, &id)| (id, k)).collect();
    let split = |parent: Parent| {
        let mut node_children = Vec::new();
        let mut site_children = Vec::new();
        for child in s.children_of(parent) {
            match child {
                Child::Node(n) => node_children.push(node_index[n]),
                Child::Site(site) => site_children.push(site_index[site]),
            }
        }
        (node_children, site_children)
    };
    let (root_nodes, root_sites): (Vec<_>, Vec<_>) = s.roots.iter().map(|&r| split(Parent::Root(r))).unzip();
    let (node_nodes, node_sites): (Vec<_>, Vec<_>) = nodes.iter().map(|&n| split(Parent::Node(n))).unzip();
    (root_nodes, node_nodes, root_sites, node_sites)
}

impl Problem {
    pub fn new<P: MatchPolicy + ?Sized>(
        agent: &Bigraph,
        redex: &Bigraph,
        policy: &P,
        sense: i64,
        needed: Vec<bool>,
    ) -> Self {
        let a = agent.structure();
        let r = redex.structure();

        let agent_nodes = a.nodes_bfs();
        let agent_index: HashMap<NodeId, usize> =
            agent_nodes.iter().enumerate().map(|(k, &id)| (id, k)).collect();
        let agent_parent: Vec<Place> = agent_nodes
            .iter()
            .map(|&n| index_place(a, &agent_index, a.node_data[n].parent))
            .collect();
        let (agent_root_children, agent_node_children, _, _) = children_tables(a, &agent_nodes, &agent_index);
        let agent_ancestors: Vec<Vec<usize>> = agent_nodes
            .iter()
            .map(|&n| {
                a.node_ancestors(Parent::Node(n))
                    .into_iter()
                    .map(|m| agent_index[&m])
                    .collect()
            })
            .collect();
        let agent_blocked: Vec<bool> = agent_nodes
            .iter()
            .enumerate()
            .map(|(k, &n)| {
                !a.node_data[n].control.is_active()
                    || agent_ancestors[k]
                        .iter()
                        .any(|&m| !a.node_data[agent_nodes[m]].control.is_active())
            })
            .collect();
        let agent_links = LinkTable::build(a, &agent_nodes, &agent_index);

        let redex_nodes = r.nodes_bfs();
        let redex_index: HashMap<NodeId, usize> =
            redex_nodes.iter().enumerate().map(|(k, &id)| (id, k)).collect();
        let redex_parent: Vec<Place> = redex_nodes
            .iter()
            .map(|&n| index_place(r, &redex_index, r.node_data[n].parent))
            .collect();
        let (redex_root_children, redex_node_children, redex_root_sites, redex_node_sites) =
            children_tables(r, &redex_nodes, &redex_index);
        let redex_site_parent: Vec<Place> = r
            .sites
            .iter()
            .map(|&s| index_place(r, &redex_index, r.site_data[s].parent))
            .collect();
        let redex_links = LinkTable::build(r, &redex_nodes, &redex_index);

        let candidates: Vec<HashMap<usize, i64>> = redex_nodes
            .iter()
            .map(|&rn| {
                let arity = r.node_data[rn].control.arity();
                agent_nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, &an)| {
                        a.node_data[an].control.arity() == arity && policy.are_matchable(agent, an, redex, rn)
                    })
                    .map(|(k, &an)| (k, policy.weight(agent, an, redex, rn)))
                    .collect()
            })
            .collect();
        let best_score = candidates
            .iter()
            .map(|c| c.values().map(|&w| w * sense).max().unwrap_or(0))
            .collect();

        Self {
            agent: agent.clone(),
            redex: redex.clone(),
            agent_nodes,
            agent_parent,
            agent_root_children,
            agent_node_children,
            agent_ancestors,
            agent_blocked,
            agent_links,
            redex_nodes,
            redex_parent,
            redex_root_children,
            redex_node_children,
            redex_root_sites,
            redex_node_sites,
            redex_site_parent,
            redex_links,
            candidates,
            sense,
            best_score,
            needed,
        }
    }

    pub fn agent_children(&self, place: Place) -> &[usize] {
        match place {
            Place::Root(k) => &self.agent_root_children[k],
            Place::Node(n) => &self.agent_node_children[n],
        }
    }

    pub fn redex_children(&self, place: Place) -> &[usize] {
        match place {
            Place::Root(k) => &self.redex_root_children[k],
            Place::Node(n) => &self.redex_node_children[n],
        }
    }

    pub fn redex_sites_under(&self, place: Place) -> &[usize] {
        match place {
            Place::Root(k) => &self.redex_root_sites[k],
            Place::Node(n) => &self.redex_node_sites[n],
        }
    }

    pub fn agent_root_count(&self) -> usize {
        self.agent_root_children.len()
    }

    pub fn redex_root_count(&self) -> usize {
        self.redex_root_children.len()
    }

    pub fn redex_site_count(&self) -> usize {
        self.redex_site_parent.len()
    }

    pub fn is_needed(&self, site: usize) -> bool {
        self.needed.get(site).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BigraphBuilder;
    use crate::matching::ControlMatching;
    use crate::signature::SignatureBuilder;

    #[test]
    fn tables_follow_breadth_first_order() {
        let sig = SignatureBuilder::new()
            .add("A", true, 1)
            .add("P", false, 0)
            .build()
            .unwrap();
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let x = b.add_outer_name("x").unwrap();
        let p = b.add_node("P", r.into(), &[]).unwrap();
        let a1 = b.add_node("A", p.into(), &[x.into()]).unwrap();
        b.add_node("A", r.into(), &[x.into()]).unwrap();
        let agent = b.freeze();

        let mut rb = BigraphBuilder::new(sig);
        let rr = rb.add_root();
        let a = rb.add_node("A", rr.into(), &[]).unwrap();
        rb.add_site(a.into()).unwrap();
        let redex = rb.freeze();

        let problem = Problem::new(&agent, &redex, &ControlMatching, 1, vec![true]);
        assert_eq!(problem.agent_nodes.len(), 3);
        assert_eq!(problem.agent_root_children[0].len(), 2);
        let k1 = problem.agent_nodes.iter().position(|&n| n == a1).unwrap();
        assert!(problem.agent_blocked[k1]);
        assert_eq!(problem.candidates[0].len(), 2);
        assert_eq!(problem.redex_node_sites[0], vec![0]);
        assert_eq!(problem.redex_site_parent, vec![Place::Node(0)]);
        // One outer name with two ports.
        assert_eq!(problem.agent_links.len(), 1);
        assert_eq!(problem.agent_links.handle_ports[0].len(), 2);
        assert_eq!(problem.redex_links.len(), 1);
        assert!(problem.redex_links.is_edge[0]);
    }
}
