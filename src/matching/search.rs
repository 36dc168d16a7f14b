//! Backtracking search for redex occurrences.
//!
//! A search state carries the partial assignment and an agenda of pending
//! tasks. Deterministic tasks run in place; a task with alternatives turns
//! into a frame of [`Choice`]s on an explicit stack, and each alternative is
//! tried on a clone of the state. The agenda is a stack too: the place graph
//! is matched root by root and top-down, the leftover children of every
//! image go to sites (or stay in the context under a root image), and only
//! then the link graph is solved, first the redex handles without ports and
//! then the routing of every parameter port.
//!
//! Weights are tracked as signed scores so that the same bound works for
//! maximisation and minimisation. With a floor set, a state is dropped as soon
//! as its score plus the best attainable score of the redex nodes still
//! unmatched cannot reach the floor.

use super::problem::{Place, Problem};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// What an agent node currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Free,
    /// Image of the given redex node.
    Image(usize),
    /// Topmost node of the parameter of the given site.
    Param(usize),
}

/// Where a node ends up once the place graph is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    Context,
    Image(usize),
    Param(usize),
}

/// How a parameter port reaches its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Route {
    /// Around the redex, through the identity next to it.
    Bypass,
    /// Through the given redex inner name (inner-name index).
    Inner(usize),
}

#[derive(Debug, Clone, Copy)]
enum Task {
    PlaceRoot(usize),
    MatchChild { agent: Place, child: usize },
    Leftovers { redex: Place, agent: Place },
    Assign { redex: Place, node: usize },
    Links,
    PortlessHandle(usize),
    RoutePort { node: usize, port: usize },
    Verify,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Choice {
    RootImage(usize, Place),
    NodeImage(usize, usize),
    ToSite(usize, usize),
    Stay,
    HandleImage(usize, Option<usize>),
    Route(usize, usize, Route),
}

/// A (partial) solution.
#[derive(Debug, Clone)]
pub(crate) struct State {
    pub root_image: Vec<Option<Place>>,
    pub node_image: Vec<Option<usize>>,
    pub role: Vec<Role>,
    pub hosts_root: Vec<bool>,
    pub class: Vec<Class>,
    /// Per redex handle, the agent handle it stands for. `None` on a redex
    /// handle without ports means a fresh context edge.
    pub handle_image: Vec<Option<usize>>,
    /// Per agent handle, the redex edge that owns it.
    pub edge_claim: Vec<Option<usize>>,
    /// Per agent handle, whether some redex outer name stands for it.
    pub outer_claim: Vec<bool>,
    pub routes: HashMap<(usize, usize), Route>,
    pub score: i64,
    agenda: Vec<Task>,
}

enum Decision {
    Done,
    Fail,
    Branch(Vec<Choice>),
}

fn branch(choices: Vec<Choice>) -> Decision {
    if choices.is_empty() {
        Decision::Fail
    } else {
        Decision::Branch(choices)
    }
}

impl Problem {
    fn initial_state(&self) -> State {
        let mut agenda = vec![Task::Verify, Task::Links];
        agenda.extend((0..self.redex_root_count()).rev().map(Task::PlaceRoot));
        State {
            root_image: vec![None; self.redex_root_count()],
            node_image: vec![None; self.redex_nodes.len()],
            role: vec![Role::Free; self.agent_nodes.len()],
            hosts_root: vec![false; self.agent_nodes.len()],
            class: Vec::new(),
            handle_image: vec![None; self.redex_links.len()],
            edge_claim: vec![None; self.agent_links.len()],
            outer_claim: vec![false; self.agent_links.len()],
            routes: HashMap::new(),
            score: 0,
            agenda,
        }
    }

    fn remaining_bound(&self, st: &State) -> i64 {
        st.node_image
            .iter()
            .zip(&self.best_score)
            .filter(|(image, _)| image.is_none())
            .map(|(_, &best)| best)
            .sum()
    }

    /// Whether an ancestor of `node` is already an image or a parameter.
    fn is_covered(&self, st: &State, node: usize) -> bool {
        self.agent_ancestors[node]
            .iter()
            .any(|&a| matches!(st.role[a], Role::Param(_) | Role::Image(_)))
    }

    /// Runs deterministic tasks until a choice is needed or the agenda ends.
    fn advance(&self, st: &mut State, floor: Option<i64>) -> Decision {
        loop {
            if let Some(floor) = floor {
                if st.score + self.remaining_bound(st) < floor {
                    return Decision::Fail;
                }
            }
            let Some(task) = st.agenda.pop() else {
                return Decision::Done;
            };
            match task {
                Task::PlaceRoot(j) => return branch(self.root_options(st, j)),
                Task::MatchChild { agent, child } => return branch(self.child_options(st, agent, child)),
                Task::Leftovers { redex, agent } => {
                    let leftovers: Vec<usize> = self
                        .agent_children(agent)
                        .iter()
                        .copied()
                        .filter(|&n| st.role[n] == Role::Free)
                        .collect();
                    let sites = self.redex_sites_under(redex);
                    let under_root = matches!(redex, Place::Root(_));
                    if !under_root && sites.is_empty() && !leftovers.is_empty() {
                        return Decision::Fail;
                    }
                    if !sites.is_empty() {
                        st.agenda
                            .extend(leftovers.into_iter().rev().map(|node| Task::Assign { redex, node }));
                    }
                }
                Task::Assign { redex, node } => {
                    let mut options: Vec<Choice> = if st.hosts_root[node] || self.hosts_root_below(st, node) {
                        Vec::new()
                    } else {
                        self.redex_sites_under(redex)
                            .iter()
                            .map(|&s| Choice::ToSite(node, s))
                            .collect()
                    };
                    if matches!(redex, Place::Root(_)) {
                        options.push(Choice::Stay);
                    }
                    return branch(options);
                }
                Task::Links => {
                    if !self.bind_ports(st) {
                        return Decision::Fail;
                    }
                }
                Task::PortlessHandle(h) => return branch(self.portless_options(st, h)),
                Task::RoutePort { node, port } => return branch(self.route_options(st, node, port)),
                Task::Verify => {
                    if !self.verify(st) {
                        return Decision::Fail;
                    }
                }
            }
        }
    }

    fn hosts_root_below(&self, st: &State, node: usize) -> bool {
        st.root_image.iter().flatten().any(|place| match *place {
            Place::Node(p) => self.agent_ancestors[p].contains(&node),
            Place::Root(_) => false,
        })
    }

    fn root_options(&self, st: &State, j: usize) -> Vec<Choice> {
        // Unmatched children of a root image may stay in the context, so
        // only a lower bound on the children applies here.
        let needed = self.redex_children(Place::Root(j)).len();
        let free_children = |place: Place| {
            self.agent_children(place)
                .iter()
                .filter(|&&n| st.role[n] == Role::Free)
                .count()
        };
        let roots = (0..self.agent_root_count()).map(Place::Root);
        let nodes = (0..self.agent_nodes.len())
            .filter(|&n| st.role[n] == Role::Free && !self.agent_blocked[n] && !self.is_covered(st, n))
            .map(Place::Node);
        roots
            .chain(nodes)
            .filter(|&place| free_children(place) >= needed)
            .map(|place| Choice::RootImage(j, place))
            .collect()
    }

    fn child_options(&self, st: &State, agent: Place, child: usize) -> Vec<Choice> {
        let needed = self.redex_node_children[child].len();
        let exact = self.redex_node_sites[child].is_empty();
        self.agent_children(agent)
            .iter()
            .copied()
            .filter(|&n| st.role[n] == Role::Free && !st.hosts_root[n])
            .filter(|n| self.candidates[child].contains_key(n))
            .filter(|&n| {
                let have = self.agent_node_children[n].len();
                if exact {
                    have == needed
                } else {
                    have >= needed
                }
            })
            .map(|n| Choice::NodeImage(child, n))
            .collect()
    }

    fn portless_options(&self, st: &State, h: usize) -> Vec<Choice> {
        let is_edge = self.redex_links.is_edge[h];
        let mut options = vec![Choice::HandleImage(h, None)];
        for ha in 0..self.agent_links.len() {
            if st.edge_claim[ha].is_some() {
                continue;
            }
            let ports = &self.agent_links.handle_ports[ha];
            let in_needed_param =
                |&(n, _): &(usize, usize)| matches!(st.class[n], Class::Param(s) if self.is_needed(s));
            let acceptable = if is_edge {
                self.agent_links.is_edge[ha]
                    && !st.outer_claim[ha]
                    && !ports.is_empty()
                    && ports.iter().all(in_needed_param)
            } else {
                ports.iter().any(in_needed_param)
            };
            if acceptable {
                options.push(Choice::HandleImage(h, Some(ha)));
            }
        }
        options
    }

    fn route_options(&self, st: &State, node: usize, port: usize) -> Vec<Choice> {
        let ha = self.agent_links.port_handle[node][port];
        if let Some(owner) = st.edge_claim[ha] {
            return self.redex_links.handle_inners[owner]
                .iter()
                .map(|&i| Choice::Route(node, port, Route::Inner(i)))
                .collect();
        }
        let mut options = vec![Choice::Route(node, port, Route::Bypass)];
        options.extend(
            self.redex_links
                .inners
                .iter()
                .enumerate()
                .filter(|(_, &(_, hr))| st.handle_image[hr] == Some(ha))
                .map(|(i, _)| Choice::Route(node, port, Route::Inner(i))),
        );
        options
    }

    /// Binds a redex handle to an agent handle, honouring edge exclusivity.
    fn bind(&self, st: &mut State, hr: usize, ha: usize) -> bool {
        if let Some(bound) = st.handle_image[hr] {
            return bound == ha;
        }
        if st.edge_claim[ha].is_some() {
            return false;
        }
        if self.redex_links.is_edge[hr] {
            if !self.agent_links.is_edge[ha] || st.outer_claim[ha] {
                return false;
            }
            st.edge_claim[ha] = Some(hr);
        } else {
            st.outer_claim[ha] = true;
        }
        st.handle_image[hr] = Some(ha);
        true
    }

    /// Settles the node classes, binds every redex port to the agent port it
    /// covers, and queues the link-graph decisions.
    fn bind_ports(&self, st: &mut State) -> bool {
        let mut class = Vec::with_capacity(self.agent_nodes.len());
        for n in 0..self.agent_nodes.len() {
            let c = match st.role[n] {
                Role::Image(c) => Class::Image(c),
                Role::Param(s) => Class::Param(s),
                Role::Free => match self.agent_parent[n] {
                    Place::Node(p) => match class[p] {
                        Class::Param(s) => Class::Param(s),
                        _ => Class::Context,
                    },
                    Place::Root(_) => Class::Context,
                },
            };
            class.push(c);
        }
        st.class = class;

        for c in 0..self.redex_nodes.len() {
            let Some(x) = st.node_image[c] else {
                return false;
            };
            for (k, &hr) in self.redex_links.port_handle[c].iter().enumerate() {
                let ha = self.agent_links.port_handle[x][k];
                if !self.bind(st, hr, ha) {
                    return false;
                }
            }
        }

        // Agent edges owned by a redex edge admit no other points than the
        // redex ports and parameter ports that enter through its inner names.
        for ha in 0..self.agent_links.len() {
            let Some(hr) = st.edge_claim[ha] else { continue };
            for &(n, _) in &self.agent_links.handle_ports[ha] {
                match st.class[n] {
                    Class::Image(_) => {}
                    Class::Context => return false,
                    Class::Param(_) => {
                        if self.redex_links.handle_inners[hr].is_empty() {
                            return false;
                        }
                    }
                }
            }
        }

        let mut tasks = Vec::new();
        for n in 0..self.agent_nodes.len() {
            if let Class::Param(s) = st.class[n] {
                if self.is_needed(s) {
                    tasks.extend(
                        (0..self.agent_links.port_handle[n].len()).map(|port| Task::RoutePort { node: n, port }),
                    );
                }
            }
        }
        for hr in 0..self.redex_links.len() {
            if self.redex_links.handle_ports[hr].is_empty() && !self.redex_links.handle_inners[hr].is_empty() {
                tasks.push(Task::PortlessHandle(hr));
            }
        }
        st.agenda.extend(tasks.into_iter().rev());
        true
    }

    fn verify(&self, st: &State) -> bool {
        let roots_ok = st.root_image.iter().all(|place| match place {
            Some(Place::Node(p)) => st.role[*p] == Role::Free && !self.is_covered(st, *p),
            Some(Place::Root(_)) => true,
            None => false,
        });
        if !roots_ok {
            return false;
        }
        (0..self.redex_links.len()).all(|hr| {
            if !self.redex_links.handle_ports[hr].is_empty() || st.handle_image[hr].is_none() {
                return true;
            }
            let inners = &self.redex_links.handle_inners[hr];
            st.routes
                .values()
                .any(|route| matches!(route, Route::Inner(i) if inners.contains(i)))
        })
    }

    /// Applies `choice` to `st`; false when it turns out infeasible.
    fn apply(&self, st: &mut State, choice: Choice) -> bool {
        match choice {
            Choice::RootImage(j, place) => {
                if let Place::Node(p) = place {
                    if st.role[p] != Role::Free {
                        return false;
                    }
                    st.hosts_root[p] = true;
                }
                st.root_image[j] = Some(place);
                let redex = Place::Root(j);
                st.agenda.push(Task::Leftovers { redex, agent: place });
                st.agenda.extend(
                    self.redex_children(redex)
                        .iter()
                        .rev()
                        .map(|&child| Task::MatchChild { agent: place, child }),
                );
            }
            Choice::NodeImage(c, x) => {
                if st.role[x] != Role::Free || st.hosts_root[x] {
                    return false;
                }
                st.role[x] = Role::Image(c);
                st.node_image[c] = Some(x);
                st.score += self.candidates[c][&x] * self.sense;
                let (redex, agent) = (Place::Node(c), Place::Node(x));
                st.agenda.push(Task::Leftovers { redex, agent });
                st.agenda.extend(
                    self.redex_node_children[c]
                        .iter()
                        .rev()
                        .map(|&child| Task::MatchChild { agent, child }),
                );
            }
            Choice::ToSite(node, site) => {
                if st.role[node] != Role::Free {
                    return false;
                }
                st.role[node] = Role::Param(site);
            }
            Choice::Stay => {}
            Choice::HandleImage(hr, None) => {
                st.handle_image[hr] = None;
            }
            Choice::HandleImage(hr, Some(ha)) => {
                if st.edge_claim[ha].is_some() {
                    return false;
                }
                if self.redex_links.is_edge[hr] {
                    if st.outer_claim[ha] {
                        return false;
                    }
                    st.edge_claim[ha] = Some(hr);
                } else {
                    st.outer_claim[ha] = true;
                }
                st.handle_image[hr] = Some(ha);
            }
            Choice::Route(node, port, route) => {
                st.routes.insert((node, port), route);
            }
        }
        true
    }
}

struct Frame {
    state: State,
    choices: Vec<Choice>,
    next: usize,
}

/// Depth-first enumeration of complete states.
pub(crate) struct Search {
    problem: Arc<Problem>,
    stack: Vec<Frame>,
    started: bool,
    floor: Option<i64>,
}

impl Search {
    pub fn new(problem: Arc<Problem>) -> Self {
        Self {
            problem,
            stack: Vec::new(),
            started: false,
            floor: None,
        }
    }

    pub fn problem(&self) -> &Arc<Problem> {
        &self.problem
    }

    /// Only yield states scoring at least `floor`.
    pub fn set_floor(&mut self, floor: Option<i64>) {
        self.floor = floor;
    }

    /// Starts over with an empty stack.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.started = false;
    }

    fn settle(&mut self, mut state: State) -> Option<State> {
        match self.problem.advance(&mut state, self.floor) {
            Decision::Done => Some(state),
            Decision::Fail => None,
            Decision::Branch(choices) => {
                self.stack.push(Frame {
                    state,
                    choices,
                    next: 0,
                });
                None
            }
        }
    }

    pub fn next_solution(&mut self) -> Option<State> {
        if !self.started {
            self.started = true;
            let initial = self.problem.initial_state();
            if let Some(solution) = self.settle(initial) {
                return Some(solution);
            }
        }
        while let Some(frame) = self.stack.last_mut() {
            if frame.next >= frame.choices.len() {
                self.stack.pop();
                continue;
            }
            let choice = frame.choices[frame.next];
            frame.next += 1;
            let mut child = frame.state.clone();
            if !self.problem.apply(&mut child, choice) {
                continue;
            }
            if let Some(solution) = self.settle(child) {
                trace!(score = solution.score, depth = self.stack.len(), "solution");
                return Some(solution);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigraph::Bigraph;
    use crate::builder::BigraphBuilder;
    use crate::matching::ControlMatching;
    use crate::signature::{Signature, SignatureBuilder};

    fn sig() -> Arc<Signature> {
        SignatureBuilder::new()
            .add("A", true, 0)
            .add("B", true, 0)
            .build()
            .unwrap()
    }

    fn count(agent: &Bigraph, redex: &Bigraph) -> usize {
        let needed = vec![true; redex.sites().len()];
        let problem = Arc::new(Problem::new(agent, redex, &ControlMatching, 1, needed));
        let mut search = Search::new(problem);
        std::iter::from_fn(|| search.next_solution()).count()
    }

    #[test]
    fn single_node_redex_matches_each_occurrence() {
        let sig = sig();
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        for _ in 0..3 {
            b.add_node("A", r.into(), &[]).unwrap();
        }
        let agent = b.freeze();

        let mut rb = BigraphBuilder::new(sig);
        let rr = rb.add_root();
        rb.add_node("A", rr.into(), &[]).unwrap();
        let redex = rb.freeze();
        assert_eq!(count(&agent, &redex), 3);
    }

    #[test]
    fn leftovers_of_an_image_need_a_site() {
        let sig = sig();
        let mut b = BigraphBuilder::new(sig.clone());
        let r = b.add_root();
        let a = b.add_node("A", r.into(), &[]).unwrap();
        b.add_node("B", a.into(), &[]).unwrap();
        let agent = b.freeze();

        let mut closed = BigraphBuilder::new(sig.clone());
        let rr = closed.add_root();
        closed.add_node("A", rr.into(), &[]).unwrap();
        assert_eq!(count(&agent, &closed.freeze()), 0);

        let mut open = BigraphBuilder::new(sig);
        let rr = open.add_root();
        let ra = open.add_node("A", rr.into(), &[]).unwrap();
        open.add_site(ra.into()).unwrap();
        assert_eq!(count(&agent, &open.freeze()), 1);
    }
}
