//! Catalog of runnable test cases, built once at startup

use crate::error::{AppError, Result};
use crate::types::CandidateFilter;
use serde::Serialize;

pub const THROUGHPUT_SUITE: &str = "throughput";

/// Which measurement component a test case drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "component", content = "candidates", rename_all = "snake_case")]
pub enum TestKind {
    DataThroughput,
    VideoBandwidth,
    NetworkLatency(CandidateFilter),
}

/// A registered test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub suite: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Explicit tests run only when named or when all tests are requested
    pub explicit: bool,
    pub kind: TestKind,
}

/// Ordered registry of test cases
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    cases: Vec<TestCase>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in throughput suite
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    fn register_defaults(&mut self) {
        let defaults = [
            TestCase {
                suite: THROUGHPUT_SUITE,
                name: "data-throughput",
                description: "Saturate a relay data channel and measure the sustained bitrate",
                explicit: false,
                kind: TestKind::DataThroughput,
            },
            TestCase {
                suite: THROUGHPUT_SUITE,
                name: "video-bandwidth",
                description: "Track bandwidth estimation ramp-up and RTT of a relayed video call",
                explicit: false,
                kind: TestKind::VideoBandwidth,
            },
            TestCase {
                suite: THROUGHPUT_SUITE,
                name: "network-latency",
                description: "Probe one-way delay stability over non-host candidates",
                explicit: true,
                kind: TestKind::NetworkLatency(CandidateFilter::NotHost),
            },
            TestCase {
                suite: THROUGHPUT_SUITE,
                name: "network-latency-relay",
                description: "Probe one-way delay stability over relay candidates",
                explicit: true,
                kind: TestKind::NetworkLatency(CandidateFilter::Relay),
            },
        ];
        // names above are unique
        self.cases.extend(defaults);
    }

    /// Add a test case; names must be unique
    pub fn register(&mut self, case: TestCase) -> Result<()> {
        if self.get(case.name).is_some() {
            return Err(AppError::config(format!("Test '{}' is already registered", case.name)));
        }
        self.cases.push(case);
        Ok(())
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    /// Resolve the cases to run.
    ///
    /// With no names, every non-explicit case runs (every case when
    /// `include_explicit` is set). Named cases run in registry order whether
    /// explicit or not.
    pub fn select(&self, names: &[String], include_explicit: bool) -> Result<Vec<&TestCase>> {
        if names.is_empty() {
            return Ok(self
                .cases
                .iter()
                .filter(|c| include_explicit || !c.explicit)
                .collect());
        }

        if let Some(unknown) = names.iter().find(|n| self.get(n).is_none()) {
            let available: Vec<&str> = self.cases.iter().map(|c| c.name).collect();
            return Err(AppError::config(format!(
                "Unknown test '{}'. Available tests: {}",
                unknown,
                available.join(", ")
            )));
        }

        Ok(self
            .cases
            .iter()
            .filter(|c| names.iter().any(|n| n == c.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let registry = TestRegistry::with_defaults();
        let names: Vec<&str> = registry.cases().iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["data-throughput", "video-bandwidth", "network-latency", "network-latency-relay"]
        );
        assert_eq!(
            registry.get("network-latency-relay").map(|c| c.kind),
            Some(TestKind::NetworkLatency(CandidateFilter::Relay))
        );
    }

    #[test]
    fn test_select_skips_explicit_by_default() {
        let registry = TestRegistry::with_defaults();
        let selected = registry.select(&[], false).unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|c| !c.explicit));

        assert_eq!(registry.select(&[], true).unwrap().len(), 4);
    }

    #[test]
    fn test_select_by_name_includes_explicit() {
        let registry = TestRegistry::with_defaults();
        let selected = registry.select(&["network-latency".to_string()], false).unwrap();
        assert_eq!(selected.len(), 1);
        assert!(selected[0].explicit);
    }

    #[test]
    fn test_select_unknown_name() {
        let registry = TestRegistry::with_defaults();
        let err = registry.select(&["nope".to_string()], false).unwrap_err();
        assert!(err.to_string().contains("Unknown test 'nope'"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = TestRegistry::with_defaults();
        let case = registry.cases()[0].clone();
        assert!(registry.register(case).is_err());
    }
}
