//! Structural consistency checking.
//!
//! The check walks the place graph breadth-first from the roots. For every
//! visited parent it verifies that each child records that parent, that no
//! child is reached twice, and that node controls and port counts agree with
//! the signature; every port is collected together with its handle. Inner
//! names are collected next. Finally every handle's recorded point set must be
//! exactly the set of collected points referring to it, every declared site
//! must have been reached, and no edge may be idle.
//!
//! A failed check is a defect of this crate, so [`enforce`] logs and panics.

use crate::arena::NodeId;
use crate::error::Inconsistency;
use crate::structure::{Child, Handle, Parent, Point, Port, Structure};
use std::collections::{HashSet, VecDeque};
use tracing::error;

/// Verifies every structural invariant of `s`.
pub(crate) fn check(s: &Structure) -> Result<(), Inconsistency> {
    check_name_indexes(s)?;

    let mut points: HashSet<Point> = HashSet::new();
    let mut seen_children: HashSet<Child> = HashSet::new();
    let mut seen_roots = HashSet::new();
    let mut queue: VecDeque<Parent> = VecDeque::new();

    for &root in &s.roots {
        if !s.root_data.contains(root) {
            return Err(Inconsistency::Dangling(root.to_string()));
        }
        if !seen_roots.insert(root) {
            return Err(Inconsistency::Revisited(root.to_string()));
        }
        queue.push_back(Parent::Root(root));
    }
    if seen_roots.len() != s.root_data.len() {
        return Err(Inconsistency::Dangling("unordered root".into()));
    }

    while let Some(parent) = queue.pop_front() {
        for &child in s.children_of(parent) {
            let recorded = match child {
                Child::Node(id) => s.node_data.get(id).map(|n| n.parent),
                Child::Site(id) => s.site_data.get(id).map(|site| site.parent),
            }
            .ok_or_else(|| Inconsistency::Dangling(child.to_string()))?;
            if recorded != parent {
                return Err(Inconsistency::ParentMismatch {
                    child: child.to_string(),
                    recorded: recorded.to_string(),
                    actual: parent.to_string(),
                });
            }
            if !seen_children.insert(child) {
                return Err(Inconsistency::Revisited(child.to_string()));
            }
            if let Child::Node(id) = child {
                check_node(s, id, &mut points)?;
                queue.push_back(Parent::Node(id));
            }
        }
    }

    if let Some((id, _)) = s
        .node_data
        .iter()
        .find(|(id, _)| !seen_children.contains(&Child::Node(*id)))
    {
        return Err(Inconsistency::UnreachableNode(id));
    }
    let mut declared = HashSet::new();
    for &site in &s.sites {
        if !declared.insert(site) {
            return Err(Inconsistency::Revisited(site.to_string()));
        }
        if !seen_children.contains(&Child::Site(site)) {
            return Err(Inconsistency::UnreachableSite(site));
        }
    }
    if let Some((id, _)) = s.site_data.iter().find(|(id, _)| !declared.contains(id)) {
        return Err(Inconsistency::UnreachableSite(id));
    }

    for (id, inner) in s.inner_data.iter() {
        let point = Point::Inner(id);
        ensure_recorded(s, point, inner.handle)?;
        points.insert(point);
    }

    let handles = s
        .outer_data
        .ids()
        .map(Handle::Outer)
        .chain(s.edge_data.ids().map(Handle::Edge));
    for handle in handles {
        let recorded = s.points_of(handle);
        if let Handle::Edge(_) = handle {
            if recorded.is_empty() {
                return Err(Inconsistency::IdleEdge(handle.to_string()));
            }
        }
        for &point in recorded {
            let back = points.contains(&point).then(|| s.handle_of(point));
            if back != Some(handle) {
                return Err(Inconsistency::StrayPoint {
                    handle: handle.to_string(),
                    point: point.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_name_indexes(s: &Structure) -> Result<(), Inconsistency> {
    for (name, &id) in &s.outer_index {
        if s.outer_data.get(id).map(|o| o.name.as_str()) != Some(name.as_str()) {
            return Err(Inconsistency::NameIndex(name.clone()));
        }
    }
    if s.outer_index.len() != s.outer_data.len() {
        return Err(Inconsistency::NameIndex("<outer face>".into()));
    }
    for (name, &id) in &s.inner_index {
        if s.inner_data.get(id).map(|i| i.name.as_str()) != Some(name.as_str()) {
            return Err(Inconsistency::NameIndex(name.clone()));
        }
    }
    if s.inner_index.len() != s.inner_data.len() {
        return Err(Inconsistency::NameIndex("<inner face>".into()));
    }
    Ok(())
}

fn check_node(s: &Structure, id: NodeId, points: &mut HashSet<Point>) -> Result<(), Inconsistency> {
    let node = &s.node_data[id];
    if !s.signature.contains(&node.control) {
        return Err(Inconsistency::ForeignControl {
            node: id,
            control: node.control.name().to_string(),
        });
    }
    if node.ports.len() != node.control.arity() {
        return Err(Inconsistency::PortCount {
            node: id,
            ports: node.ports.len(),
            arity: node.control.arity(),
        });
    }
    for (index, &handle) in node.ports.iter().enumerate() {
        let point = Point::Port(Port::new(id, index));
        ensure_recorded(s, point, handle)?;
        points.insert(point);
    }
    Ok(())
}

fn ensure_recorded(s: &Structure, point: Point, handle: Handle) -> Result<(), Inconsistency> {
    let live = match handle {
        Handle::Outer(h) => s.outer_data.get(h).map(|o| &o.points),
        Handle::Edge(h) => s.edge_data.get(h).map(|e| &e.points),
    };
    match live {
        None => Err(Inconsistency::Dangling(handle.to_string())),
        Some(recorded) if !recorded.contains(&point) => Err(Inconsistency::UnrecordedPoint {
            point: point.to_string(),
            handle: handle.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

/// Runs [`check`] and treats a failure as a fatal defect.
pub(crate) fn enforce(s: &Structure, what: &str) {
    if let Err(violation) = check(s) {
        error!(operation = what, %violation, "bigraph consistency violated");
        panic!("{what} produced an inconsistent bigraph: {violation}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureBuilder;

    fn sample() -> Structure {
        let sig = SignatureBuilder::new().add("A", true, 1).build().unwrap();
        let a = sig.get("A").unwrap().clone();
        let mut s = Structure::empty(sig);
        let root = s.new_root(None);
        let x = s.new_outer("x".into());
        let node = s.new_node(a, Parent::Root(root), vec![Handle::Outer(x)]);
        s.new_site(Parent::Node(node));
        let e = s.new_edge();
        s.new_inner("y".into(), Handle::Edge(e));
        s
    }

    #[test]
    fn sample_is_consistent() {
        assert_eq!(check(&sample()), Ok(()));
    }

    #[test]
    fn detects_wrong_parent() {
        let mut s = sample();
        let node = s.nodes_bfs()[0];
        let other = s.alloc_root();
        s.roots.push(other);
        s.node_data[node].parent = Parent::Root(other);
        assert!(matches!(check(&s), Err(Inconsistency::ParentMismatch { .. })));
    }

    #[test]
    fn detects_unrecorded_port() {
        let mut s = sample();
        let x = s.outer_index["x"];
        s.outer_data[x].points.clear();
        assert!(matches!(check(&s), Err(Inconsistency::UnrecordedPoint { .. })));
    }

    #[test]
    fn detects_stray_point() {
        let mut s = sample();
        let y = s.inner_index["y"];
        let x = s.outer_index["x"];
        s.outer_data[x].points.insert(Point::Inner(y));
        assert!(matches!(check(&s), Err(Inconsistency::StrayPoint { .. })));
    }

    #[test]
    fn detects_unreachable_site() {
        let mut s = sample();
        let site = s.sites[0];
        let parent = s.site_data[site].parent;
        match parent {
            Parent::Node(n) => {
                s.node_data[n].children.clear();
            }
            Parent::Root(_) => unreachable!(),
        }
        assert!(matches!(check(&s), Err(Inconsistency::UnreachableSite(_))));
    }

    #[test]
    fn detects_idle_edge() {
        let mut s = sample();
        s.new_edge();
        assert!(matches!(check(&s), Err(Inconsistency::IdleEdge(_))));
    }

    #[test]
    #[should_panic(expected = "inconsistent bigraph")]
    fn enforce_panics() {
        let mut s = sample();
        s.new_edge();
        enforce(&s, "test");
    }
}
