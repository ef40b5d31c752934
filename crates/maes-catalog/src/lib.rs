//! Control catalog and checker registry
//!
//! Benchmark definitions are shipped as code and are read-only at runtime;
//! catalog changes are out-of-band migrations. Checkers bind to controls
//! through string keys so a missing binding degrades to manual review
//! instead of failing the run.

pub mod checker;
pub mod checkers;
mod controls;

use maes_common::{Benchmark, ControlDefinition};

pub use checker::{Checker, CheckerError, CheckerOutcome, CheckerRegistry};

/// Read-mostly registry of benchmark controls.
pub struct ControlCatalog {
    controls: Vec<ControlDefinition>,
}

impl ControlCatalog {
    /// Catalog with the built-in CIS v3 and v4 benchmarks.
    pub fn builtin() -> Self {
        let mut controls = controls::cis_v4();
        controls.extend(controls::cis_v3());
        Self { controls }
    }

    /// Catalog over an explicit control set (custom benchmarks).
    pub fn from_controls(controls: Vec<ControlDefinition>) -> Self {
        Self { controls }
    }

    /// Active controls of one benchmark, ordered lexicographically by
    /// control id so runs are deterministic.
    pub fn active_controls(&self, benchmark: Benchmark) -> Vec<ControlDefinition> {
        let mut out: Vec<ControlDefinition> = self
            .controls
            .iter()
            .filter(|c| c.benchmark == benchmark && c.active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn get(&self, benchmark: Benchmark, id: &str) -> Option<&ControlDefinition> {
        self.controls
            .iter()
            .find(|c| c.benchmark == benchmark && c.id == id)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_lexicographic_by_id() {
        let catalog = ControlCatalog::builtin();
        let controls = catalog.active_controls(Benchmark::CisV4);
        assert!(!controls.is_empty());
        let ids: Vec<&str> = controls.iter().map(|c| c.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn v4_includes_the_seed_controls() {
        let catalog = ControlCatalog::builtin();
        for id in ["1.1.1", "1.2.1", "8.2.2"] {
            assert!(catalog.get(Benchmark::CisV4, id).is_some(), "missing {id}");
        }
    }

    #[test]
    fn benchmark_and_id_are_unique() {
        let catalog = ControlCatalog::builtin();
        let mut seen = std::collections::HashSet::new();
        for c in &catalog.controls {
            assert!(seen.insert((c.benchmark, c.id.clone())), "duplicate {:?} {}", c.benchmark, c.id);
        }
    }

    #[test]
    fn custom_benchmark_is_empty_by_default() {
        let catalog = ControlCatalog::builtin();
        assert!(catalog.active_controls(Benchmark::Custom).is_empty());
    }
}
