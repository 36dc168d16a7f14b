//! Signatures: the vocabulary of node kinds.
//!
//! A [`Control`] has a name, an arity (the number of ports of every node
//! carrying it) and an activity flag. Redex roots can never be matched
//! strictly below a passive node.
//!
//! A [`Signature`] is an immutable set of controls keyed by name, shared
//! through `Arc` by every bigraph built over it.
//!
//! # Citations
//! - Milner, "The Space and Motion of Communicating Agents" (2009), Def. 1.1

use crate::error::{BigraphError, BigraphResult};
use crate::names::NameGenerator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A node kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Control {
    name: String,
    arity: usize,
    active: bool,
}

impl Control {
    pub fn new(name: impl Into<String>, active: bool, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            active,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.active { "active" } else { "passive" };
        write!(f, "{}:({},{})", self.name, mode, self.arity)
    }
}

/// An immutable set of controls.
///
/// Two signatures are equal when they carry the same id and the same controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    usid: String,
    controls: BTreeMap<String, Arc<Control>>,
}

impl Signature {
    /// Creates a signature from a list of controls with a generated id.
    ///
    /// Fails with `NameClash` if two controls share a name.
    pub fn new(controls: impl IntoIterator<Item = Control>) -> BigraphResult<Self> {
        Self::with_id(signature_ids().fresh(), controls)
    }

    pub fn with_id(
        usid: impl Into<String>,
        controls: impl IntoIterator<Item = Control>,
    ) -> BigraphResult<Self> {
        let mut map = BTreeMap::new();
        let mut clashes = Vec::new();
        for control in controls {
            let name = control.name.clone();
            if map.insert(name.clone(), Arc::new(control)).is_some() {
                clashes.push(name);
            }
        }
        if !clashes.is_empty() {
            return Err(BigraphError::NameClash(clashes));
        }
        Ok(Self {
            usid: usid.into(),
            controls: map,
        })
    }

    /// Signature id.
    pub fn usid(&self) -> &str {
        &self.usid
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Control>> {
        self.controls.get(name)
    }

    /// Returns the control named `name` or `UnknownControl`.
    pub fn control(&self, name: &str) -> BigraphResult<&Arc<Control>> {
        self.get(name)
            .ok_or_else(|| BigraphError::UnknownControl(name.to_string()))
    }

    /// Whether `control` is exactly one of this signature's controls.
    pub fn contains(&self, control: &Control) -> bool {
        self.controls
            .get(&control.name)
            .is_some_and(|own| own.as_ref() == control)
    }

    /// Controls in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Control>> {
        self.controls.values()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.usid)?;
        for (i, control) in self.controls.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{control}")?;
        }
        write!(f, "}}")
    }
}

fn signature_ids() -> &'static NameGenerator {
    static IDS: OnceLock<NameGenerator> = OnceLock::new();
    IDS.get_or_init(|| NameGenerator::new("sig"))
}

/// Two shared signatures are compatible if they are the same allocation or
/// structurally equal.
pub(crate) fn same_signature(a: &Arc<Signature>, b: &Arc<Signature>) -> bool {
    Arc::ptr_eq(a, b) || a == b
}

pub(crate) fn ensure_same_signature(a: &Arc<Signature>, b: &Arc<Signature>) -> BigraphResult<()> {
    if same_signature(a, b) {
        Ok(())
    } else {
        Err(BigraphError::SignatureMismatch {
            left: a.usid().to_string(),
            right: b.usid().to_string(),
        })
    }
}

/// Incremental construction of a [`Signature`].
#[derive(Debug, Default, Clone)]
pub struct SignatureBuilder {
    controls: Vec<Control>,
    usid: Option<String>,
}

impl SignatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a control; chainable.
    pub fn add(mut self, name: impl Into<String>, active: bool, arity: usize) -> Self {
        self.controls.push(Control::new(name, active, arity));
        self
    }

    pub fn usid(mut self, usid: impl Into<String>) -> Self {
        self.usid = Some(usid.into());
        self
    }

    pub fn build(self) -> BigraphResult<Arc<Signature>> {
        let signature = match self.usid {
            Some(usid) => Signature::with_id(usid, self.controls)?,
            None => Signature::new(self.controls)?,
        };
        Ok(Arc::new(signature))
    }
}
