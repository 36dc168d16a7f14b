//! Fresh name generation.
//!
//! Outer and inner names are identified by their string. Whenever the crate
//! needs a name nobody chose (anonymous `add_outer_name`, bridging names
//! created while reconstructing a match), it asks a [`NameGenerator`]. A
//! generator is a cheap handle over an atomic counter; clones share the
//! counter. A process-wide default is available through
//! [`NameGenerator::global`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Produces names of the form `<prefix><n>` from a shared monotonic counter.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    prefix: Arc<str>,
    counter: Arc<AtomicU64>,
}

impl NameGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Arc::from(prefix.into()),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The process-wide generator (prefix `_n`).
    pub fn global() -> Self {
        static GLOBAL: OnceLock<NameGenerator> = OnceLock::new();
        GLOBAL.get_or_init(|| NameGenerator::new("_n")).clone()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the next name.
    pub fn fresh(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }

    /// Returns the next name for which `taken` is false.
    pub fn fresh_avoiding(&self, mut taken: impl FnMut(&str) -> bool) -> String {
        loop {
            let name = self.fresh();
            if !taken(&name) {
                return name;
            }
        }
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn clones_share_the_counter() {
        let gen = NameGenerator::new("x");
        let other = gen.clone();
        assert_eq!(gen.fresh(), "x0");
        assert_eq!(other.fresh(), "x1");
        assert_eq!(gen.fresh(), "x2");
    }

    #[test]
    fn fresh_avoiding_skips_taken_names() {
        let gen = NameGenerator::new("b");
        let taken: HashSet<&str> = ["b0", "b1"].into_iter().collect();
        assert_eq!(gen.fresh_avoiding(|n| taken.contains(n)), "b2");
    }

    #[test]
    fn global_generator_is_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| (0..50).map(|_| NameGenerator::global().fresh()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(all.insert(name));
            }
        }
        assert_eq!(all.len(), 200);
    }
}
