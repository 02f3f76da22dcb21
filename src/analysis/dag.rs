//! Stage dependency graph
//!
//! Stages and their edges are data, not control flow: the engine asks the
//! graph which stages apply to a request and in which waves they can run.
//! A stage may start once every applicable dependency has completed, whether
//! that dependency succeeded or not.

use super::request::AnalysisRequest;
use super::result::StageKind;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGraph {
    nodes: Vec<StageKind>,
    /// `(from, to)`: `to` waits for `from`
    edges: Vec<(StageKind, StageKind)>,
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}

impl StageGraph {
    /// Error and Code feed RootCause, which feeds Solution
    pub fn standard() -> Self {
        Self {
            nodes: StageKind::ALL.to_vec(),
            edges: vec![
                (StageKind::Error, StageKind::RootCause),
                (StageKind::Code, StageKind::RootCause),
                (StageKind::RootCause, StageKind::Solution),
            ],
        }
    }

    pub fn nodes(&self) -> &[StageKind] {
        &self.nodes
    }

    pub fn dependencies(&self, stage: StageKind) -> Vec<StageKind> {
        self.edges
            .iter()
            .filter(|(_, to)| *to == stage)
            .map(|(from, _)| *from)
            .collect()
    }

    /// Stages whose inputs are present in the request
    pub fn applicable(&self, request: &AnalysisRequest) -> Vec<StageKind> {
        self.nodes
            .iter()
            .copied()
            .filter(|stage| match stage {
                StageKind::Error => request.error_message().is_some(),
                StageKind::Code => request.code_snippet().is_some(),
                StageKind::RootCause | StageKind::Solution => !request.is_empty(),
            })
            .collect()
    }

    /// Groups `subset` into waves; every stage in a wave only depends on
    /// stages of earlier waves. Dependencies outside `subset` are ignored.
    pub fn waves(&self, subset: &[StageKind]) -> Vec<Vec<StageKind>> {
        let included: HashSet<StageKind> = subset.iter().copied().collect();
        let mut done: HashSet<StageKind> = HashSet::new();
        let mut remaining: Vec<StageKind> = self
            .nodes
            .iter()
            .copied()
            .filter(|s| included.contains(s))
            .collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<StageKind>, Vec<StageKind>) =
                remaining.iter().copied().partition(|stage| {
                    self.dependencies(*stage)
                        .iter()
                        .all(|dep| !included.contains(dep) || done.contains(dep))
                });

            // A cycle would leave nothing ready; the standard graph is acyclic
            if ready.is_empty() {
                waves.push(blocked);
                break;
            }

            done.extend(ready.iter().copied());
            waves.push(ready);
            remaining = blocked;
        }

        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_request_waves() {
        let graph = StageGraph::standard();
        let request = AnalysisRequest::builder()
            .error_message("ZeroDivisionError")
            .code_snippet("x / 0")
            .build();

        let applicable = graph.applicable(&request);
        assert_eq!(applicable, StageKind::ALL.to_vec());
        assert_eq!(
            graph.waves(&applicable),
            vec![
                vec![StageKind::Error, StageKind::Code],
                vec![StageKind::RootCause],
                vec![StageKind::Solution],
            ]
        );
    }

    #[test]
    fn test_code_skipped_without_snippet() {
        let graph = StageGraph::standard();
        let request = AnalysisRequest::builder()
            .error_message("KeyError: 'id'")
            .build();

        let applicable = graph.applicable(&request);
        assert!(!applicable.contains(&StageKind::Code));
        assert_eq!(graph.waves(&applicable)[0], vec![StageKind::Error]);
    }

    #[test]
    fn test_description_only_request() {
        let graph = StageGraph::standard();
        let request = AnalysisRequest::builder()
            .problem_description("checkout hangs")
            .build();

        let applicable = graph.applicable(&request);
        assert_eq!(applicable, vec![StageKind::RootCause, StageKind::Solution]);
        assert_eq!(
            graph.waves(&applicable),
            vec![vec![StageKind::RootCause], vec![StageKind::Solution]]
        );
    }

    #[test]
    fn test_empty_request_has_no_stages() {
        let graph = StageGraph::standard();
        assert!(graph
            .applicable(&AnalysisRequest::builder().build())
            .is_empty());
    }

    #[test]
    fn test_dependencies() {
        let graph = StageGraph::standard();
        assert_eq!(
            graph.dependencies(StageKind::RootCause),
            vec![StageKind::Error, StageKind::Code]
        );
        assert!(graph.dependencies(StageKind::Error).is_empty());
    }
}
