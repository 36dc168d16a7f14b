//! Immutable bigraphs.
//!
//! A [`Bigraph`] is a frozen [`Structure`] behind an `Arc`: cloning a
//! `Bigraph` value shares the snapshot, and snapshots are `Send + Sync`.
//! [`Bigraph::replicate`] produces an independent deep copy with fresh
//! identifiers. Every operation that returns a new bigraph goes through
//! [`BigraphBuilder`], which owns the mutation logic.
//!
//! # Citations
//! - Milner, "The Space and Motion of Communicating Agents" (2009), Ch. 2–3
//! - Jensen & Milner, "Bigraphs and mobile processes" (2004)

use crate::builder::BigraphBuilder;
use crate::config::ConsistencyPolicy;
use crate::consistency;
use crate::error::{BigraphError, BigraphResult};
use crate::signature::Signature;
use crate::structure::{impl_read_queries, Child, Handle, Parent, Point, Structure};
use std::fmt;
use std::sync::Arc;

/// An immutable bigraph.
#[derive(Debug, Clone)]
pub struct Bigraph {
    structure: Arc<Structure>,
}

impl_read_queries!(Bigraph);

impl Bigraph {
    /// Wraps a finished structure, checking it unless `policy` is `Off`.
    pub(crate) fn from_structure(structure: Structure, policy: ConsistencyPolicy) -> Self {
        if policy.checks_on_freeze() {
            consistency::enforce(&structure, "freeze");
        }
        Self {
            structure: Arc::new(structure),
        }
    }

    pub(crate) fn structure(&self) -> &Structure {
        &self.structure
    }

    /// The bigraph with no roots, sites or names: the unit of juxtaposition.
    pub fn make_empty(signature: Arc<Signature>) -> Self {
        Self {
            structure: Arc::new(Structure::empty(signature)),
        }
    }

    /// The identity on `<width, names>`: `width` roots each holding one site,
    /// and each name both as inner and outer name, linked together.
    pub fn make_id<S: AsRef<str>>(
        signature: Arc<Signature>,
        width: usize,
        names: impl IntoIterator<Item = S>,
    ) -> BigraphResult<Self> {
        let mut s = Structure::empty(signature);
        for _ in 0..width {
            let root = s.new_root(None);
            s.new_site(Parent::Root(root));
        }
        let mut clashes = Vec::new();
        for name in names {
            let name = name.as_ref();
            if s.outer_index.contains_key(name) {
                clashes.push(name.to_string());
                continue;
            }
            let outer = s.new_outer(name.to_string());
            s.new_inner(name.to_string(), Handle::Outer(outer));
        }
        if !clashes.is_empty() {
            return Err(BigraphError::NameClash(clashes));
        }
        Ok(Self::from_structure(s, ConsistencyPolicy::default()))
    }

    /// A deep copy with fresh identifiers, sharing nothing with `self`.
    pub fn replicate(&self) -> Bigraph {
        let (copy, _) = self.structure.replicate();
        Self::from_structure(copy, ConsistencyPolicy::default())
    }

    /// A builder initialised with this bigraph. Identifiers stay valid.
    pub fn to_builder(&self) -> BigraphBuilder {
        BigraphBuilder::from_bigraph(self)
    }

    /// `self ⊗ other`.
    pub fn juxtapose(&self, other: &Bigraph) -> BigraphResult<Bigraph> {
        let mut builder = self.to_builder();
        builder.right_juxtapose(other)?;
        Ok(builder.freeze())
    }

    /// `self ∘ inner`.
    pub fn compose(&self, inner: &Bigraph) -> BigraphResult<Bigraph> {
        let mut builder = self.to_builder();
        builder.inner_compose(inner)?;
        Ok(builder.freeze())
    }

    /// `self ∥ other`.
    pub fn parallel_product(&self, other: &Bigraph) -> BigraphResult<Bigraph> {
        let mut builder = self.to_builder();
        builder.right_parallel_product(other)?;
        Ok(builder.freeze())
    }

    /// `self | other`.
    pub fn merge_product(&self, other: &Bigraph) -> BigraphResult<Bigraph> {
        let mut builder = self.to_builder();
        builder.right_merge_product(other)?;
        Ok(builder.freeze())
    }

    /// `self . inner`.
    pub fn nest(&self, inner: &Bigraph) -> BigraphResult<Bigraph> {
        let mut builder = self.to_builder();
        builder.inner_nest(inner)?;
        Ok(builder.freeze())
    }

    /// Juxtaposes many bigraphs left to right. The empty list yields the empty
    /// bigraph over `signature`.
    pub fn juxtapose_all<'a>(
        signature: Arc<Signature>,
        parts: impl IntoIterator<Item = &'a Bigraph>,
    ) -> BigraphResult<Bigraph> {
        let mut builder = BigraphBuilder::new(signature);
        for part in parts {
            builder.right_juxtapose(part)?;
        }
        Ok(builder.freeze())
    }
}

pub(crate) fn write_structure(s: &Structure, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let outer = crate::structure::Face::new(s.roots.len(), s.outer_names());
    let inner = crate::structure::Face::new(s.sites.len(), s.inner_names());
    writeln!(f, "{} : {} -> {}", s.signature.usid(), inner, outer)?;
    for (k, &root) in s.roots.iter().enumerate() {
        writeln!(f, "{k}:{root}")?;
        write_children(s, Parent::Root(root), 1, f)?;
    }
    for (name, &id) in &s.inner_index {
        writeln!(f, "{name} -> {}", handle_label(s, s.inner_data[id].handle))?;
    }
    Ok(())
}

fn write_children(s: &Structure, parent: Parent, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for &child in s.children_of(parent) {
        write!(f, "{:width$}", "", width = depth * 2)?;
        match child {
            Child::Site(site) => {
                let index = s.sites.iter().position(|&x| x == site).unwrap_or(usize::MAX);
                writeln!(f, "[{index}]")?;
            }
            Child::Node(node) => {
                let data = &s.node_data[node];
                write!(f, "{}:{}", node, data.control.name())?;
                if !data.ports.is_empty() {
                    let labels: Vec<String> = data.ports.iter().map(|&h| handle_label(s, h)).collect();
                    write!(f, "[{}]", labels.join(", "))?;
                }
                writeln!(f)?;
                write_children(s, Parent::Node(node), depth + 1, f)?;
            }
        }
    }
    Ok(())
}

fn handle_label(s: &Structure, handle: Handle) -> String {
    match handle {
        Handle::Outer(id) => s.outer_data[id].name.clone(),
        Handle::Edge(id) => id.to_string(),
    }
}

impl fmt::Display for Bigraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_structure(&self.structure, f)
    }
}

impl Bigraph {
    /// Every point sharing a handle with `point`, `point` included.
    pub fn linked_points(&self, point: Point) -> Vec<Point> {
        match self.handle(point) {
            Some(handle) => self.structure.points_of(handle).iter().copied().collect(),
            None => Vec::new(),
        }
    }
}
