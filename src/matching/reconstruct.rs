//! Turning a complete search state into the bigraphs of a [`Match`].
//!
//! For a solution the agent decomposes as
//! `context ∘ (redex_image ⊗ redex_id) ∘ (param_wiring ∘ (param_0 ⊗ … ⊗ param_k))`.
//!
//! - The context keeps the agent's outer face and every node that is neither
//!   an image nor inside a parameter; each redex root leaves a site where its
//!   image was. Its inner names are the redex's outer names plus one bypass
//!   name for every visible agent handle that some parameter port reaches
//!   around the redex.
//! - The redex image is the redex with the agent's controls.
//! - The identity next to it carries the bypass names.
//! - The wiring has one root per redex site, and routes every parameter port
//!   either to a redex inner name, to a bypass name, or to an edge shared
//!   among parameters only.
//! - Each parameter is the subtree placed in that site, with an outer name per
//!   distinct route of its ports. Parameters that were not asked for are empty
//!   regions.

use super::problem::{Place, Problem};
use super::search::{Class, Role, Route, State};
use super::Match;
use crate::bigraph::Bigraph;
use crate::config::ConsistencyPolicy;
use crate::names::NameGenerator;
use crate::structure::{Handle, Parent, Structure};
use std::collections::{BTreeMap, BTreeSet, HashMap};

struct Builder<'a> {
    problem: &'a Problem,
    state: &'a State,
    names: &'a NameGenerator,
    taken: BTreeSet<String>,
}

impl<'a> Builder<'a> {
    fn fresh(&mut self) -> String {
        let taken = &self.taken;
        let name = self.names.fresh_avoiding(|n| taken.contains(n));
        self.taken.insert(name.clone());
        name
    }

    fn agent(&self) -> &'a Structure {
        self.problem.agent.structure()
    }

    fn redex(&self) -> &'a Structure {
        self.problem.redex.structure()
    }

    /// Agent handles a parameter port reaches around the redex, with whether
    /// they are also reachable from outside the parameters.
    fn bypassed_handles(&self) -> BTreeMap<usize, bool> {
        let p = self.problem;
        let st = self.state;
        let mut bypassed = BTreeMap::new();
        for (&(node, port), route) in &st.routes {
            if *route != Route::Bypass {
                continue;
            }
            let ha = p.agent_links.port_handle[node][port];
            bypassed.entry(ha).or_insert_with(|| {
                !p.agent_links.is_edge[ha]
                    || st.outer_claim[ha]
                    || p.agent_links.handle_ports[ha]
                        .iter()
                        .any(|&(n, _)| st.class[n] == Class::Context)
            });
        }
        bypassed
    }

    fn build(mut self, policy: ConsistencyPolicy) -> Match {
        let p = self.problem;
        let st = self.state;
        let signature = self.agent().signature.clone();
        self.taken.extend(self.redex().outer_index.keys().cloned());
        self.taken.extend(self.redex().inner_index.keys().cloned());

        let bypassed = self.bypassed_handles();
        let bypass_names: BTreeMap<usize, String> = bypassed
            .iter()
            .filter(|(_, &visible)| visible)
            .map(|(&ha, _)| ha)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|ha| (ha, self.fresh()))
            .collect();

        // Context.
        let mut ctx = Structure::empty(signature.clone());
        let mut ctx_handles: HashMap<usize, Handle> = HashMap::new();
        for (name, &id) in &self.agent().outer_index {
            let copy = ctx.new_outer(name.clone());
            ctx_handles.insert(p.agent_links.handle_index[&Handle::Outer(id)], Handle::Outer(copy));
        }
        let mut ctx_handle = |ctx: &mut Structure, ha: usize| {
            *ctx_handles
                .entry(ha)
                .or_insert_with(|| Handle::Edge(ctx.new_edge()))
        };
        let ctx_roots: Vec<Parent> = (0..p.agent_root_count())
            .map(|_| Parent::Root(ctx.new_root(None)))
            .collect();
        let mut ctx_nodes: HashMap<usize, Parent> = HashMap::new();
        for n in 0..p.agent_nodes.len() {
            if st.class[n] != Class::Context {
                continue;
            }
            let parent = match p.agent_parent[n] {
                Place::Root(k) => ctx_roots[k],
                Place::Node(m) => ctx_nodes[&m],
            };
            let ports: Vec<Handle> = p.agent_links.port_handle[n]
                .iter()
                .map(|&ha| ctx_handle(&mut ctx, ha))
                .collect();
            let control = self.agent().node_data[p.agent_nodes[n]].control.clone();
            let copy = ctx.new_node(control, parent, ports);
            ctx_nodes.insert(n, Parent::Node(copy));
        }
        for place in st.root_image.iter().flatten() {
            let parent = match *place {
                Place::Root(k) => ctx_roots[k],
                Place::Node(m) => ctx_nodes[&m],
            };
            ctx.new_site(parent);
        }
        for (name, &id) in &self.redex().outer_index {
            let hr = p.redex_links.handle_index[&Handle::Outer(id)];
            let handle = match st.handle_image[hr] {
                Some(ha) => ctx_handle(&mut ctx, ha),
                None => Handle::Edge(ctx.new_edge()),
            };
            ctx.new_inner(name.clone(), handle);
        }
        for (&ha, name) in &bypass_names {
            let handle = ctx_handle(&mut ctx, ha);
            ctx.new_inner(name.clone(), handle);
        }

        // Redex image.
        let mut rdx = Structure::empty(signature.clone());
        let mut rdx_handles: HashMap<usize, Handle> = HashMap::new();
        for (name, &id) in &self.redex().outer_index {
            let copy = rdx.new_outer(name.clone());
            rdx_handles.insert(p.redex_links.handle_index[&Handle::Outer(id)], Handle::Outer(copy));
        }
        let mut rdx_handle = |rdx: &mut Structure, hr: usize| {
            *rdx_handles
                .entry(hr)
                .or_insert_with(|| Handle::Edge(rdx.new_edge()))
        };
        let rdx_roots: Vec<Parent> = (0..p.redex_root_count())
            .map(|_| Parent::Root(rdx.new_root(None)))
            .collect();
        let mut rdx_nodes: Vec<Parent> = Vec::with_capacity(p.redex_nodes.len());
        let mut embedding = BTreeMap::new();
        let mut image_nodes = BTreeMap::new();
        for c in 0..p.redex_nodes.len() {
            let parent = match p.redex_parent[c] {
                Place::Root(k) => rdx_roots[k],
                Place::Node(m) => rdx_nodes[m],
            };
            let ports: Vec<Handle> = p.redex_links.port_handle[c]
                .iter()
                .map(|&hr| rdx_handle(&mut rdx, hr))
                .collect();
            let x = st.node_image[c].unwrap_or_default();
            let control = self.agent().node_data[p.agent_nodes[x]].control.clone();
            let copy = rdx.new_node(control, parent, ports);
            rdx_nodes.push(Parent::Node(copy));
            embedding.insert(p.redex_nodes[c], p.agent_nodes[x]);
            image_nodes.insert(p.redex_nodes[c], copy);
        }
        for &place in &p.redex_site_parent {
            let parent = match place {
                Place::Root(k) => rdx_roots[k],
                Place::Node(m) => rdx_nodes[m],
            };
            rdx.new_site(parent);
        }
        for (name, &id) in &self.redex().inner_index {
            let hr = p.redex_links.handle_index[&self.redex().inner_data[id].handle];
            let handle = rdx_handle(&mut rdx, hr);
            rdx.new_inner(name.clone(), handle);
        }
        rdx.drop_idle_edges();

        // Identity on the bypass names.
        let mut id = Structure::empty(signature.clone());
        for name in bypass_names.values() {
            let outer = id.new_outer(name.clone());
            id.new_inner(name.clone(), Handle::Outer(outer));
        }

        // Wiring and parameters.
        let mut lmb = Structure::empty(signature.clone());
        let mut lmb_outer: Vec<Handle> = Vec::with_capacity(p.redex_links.inners.len());
        for (inner, _) in &p.redex_links.inners {
            let name = self.redex().inner_data[*inner].name.clone();
            lmb_outer.push(Handle::Outer(lmb.new_outer(name)));
        }
        let mut lmb_bypass: HashMap<usize, Handle> = HashMap::new();
        for (&ha, name) in &bypass_names {
            lmb_bypass.insert(ha, Handle::Outer(lmb.new_outer(name.clone())));
        }
        for _ in 0..p.redex_site_count() {
            let root = lmb.new_root(None);
            lmb.new_site(Parent::Root(root));
        }

        let mut params = Vec::with_capacity(p.redex_site_count());
        for site in 0..p.redex_site_count() {
            let mut prm = Structure::empty(signature.clone());
            let root = Parent::Root(prm.new_root(None));
            if p.is_needed(site) {
                let mut prm_nodes: HashMap<usize, Parent> = HashMap::new();
                let mut prm_names: HashMap<(Route, usize), Handle> = HashMap::new();
                for n in 0..p.agent_nodes.len() {
                    if st.class[n] != Class::Param(site) {
                        continue;
                    }
                    let parent = match (st.role[n], p.agent_parent[n]) {
                        (Role::Param(_), _) => root,
                        (_, Place::Node(m)) => prm_nodes[&m],
                        (_, Place::Root(_)) => root,
                    };
                    let mut ports = Vec::with_capacity(p.agent_links.port_handle[n].len());
                    for (port, &ha) in p.agent_links.port_handle[n].iter().enumerate() {
                        let route = st.routes.get(&(n, port)).copied().unwrap_or(Route::Bypass);
                        let key = match route {
                            Route::Inner(i) => (route, i),
                            Route::Bypass => (route, ha),
                        };
                        if let Some(&handle) = prm_names.get(&key) {
                            ports.push(handle);
                            continue;
                        }
                        let target = match route {
                            Route::Inner(i) => lmb_outer[i],
                            Route::Bypass => match lmb_bypass.get(&ha) {
                                Some(&handle) => handle,
                                None => {
                                    let edge = Handle::Edge(lmb.new_edge());
                                    lmb_bypass.insert(ha, edge);
                                    edge
                                }
                            },
                        };
                        let name = self.fresh();
                        lmb.new_inner(name.clone(), target);
                        let handle = Handle::Outer(prm.new_outer(name));
                        prm_names.insert(key, handle);
                        ports.push(handle);
                    }
                    let control = self.agent().node_data[p.agent_nodes[n]].control.clone();
                    let copy = prm.new_node(control, parent, ports);
                    prm_nodes.insert(n, Parent::Node(copy));
                }
            }
            params.push(Bigraph::from_structure(prm, policy));
        }

        let weight = st
            .node_image
            .iter()
            .enumerate()
            .filter_map(|(c, x)| x.map(|x| p.candidates[c][&x]))
            .sum();

        Match {
            context: Bigraph::from_structure(ctx, policy),
            redex_image: Bigraph::from_structure(rdx, policy),
            redex_id: Bigraph::from_structure(id, policy),
            param_wiring: Bigraph::from_structure(lmb, policy),
            params,
            embedding,
            image_nodes,
            weight,
        }
    }
}

/// Builds the components of the match described by `state`.
pub(crate) fn reconstruct(
    problem: &Problem,
    state: &State,
    names: &NameGenerator,
    policy: ConsistencyPolicy,
) -> Match {
    Builder {
        problem,
        state,
        names,
        taken: BTreeSet::new(),
    }
    .build(policy)
}
