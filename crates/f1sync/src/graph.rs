//! Declared stage dependencies
//!
//! Each stage names the datasets it consumes and produces. The graph is
//! validated up front (every input has exactly one producer, no cycles) and
//! then yields a deterministic execution order.

use crate::error::{Result, SyncError};
use crate::model::EntityType;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, dataset: impl Into<String>) -> Self {
        self.inputs.push(dataset.into());
        self
    }

    pub fn output(mut self, dataset: impl Into<String>) -> Self {
        self.outputs.push(dataset.into());
        self
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] -> [{}]", self.name, self.inputs.join(", "), self.outputs.join(", "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    stages: Vec<Stage>,
}

impl StageGraph {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        let graph = Self { stages };
        graph.order()?;
        Ok(graph)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Topological order; ties broken by declaration order
    pub fn order(&self) -> Result<Vec<&Stage>> {
        let mut producers: BTreeMap<&str, usize> = BTreeMap::new();
        let mut names = BTreeSet::new();
        for (idx, stage) in self.stages.iter().enumerate() {
            if !names.insert(stage.name.as_str()) {
                return Err(SyncError::Graph(format!("duplicate stage name: {}", stage.name)));
            }
            for output in &stage.outputs {
                if let Some(prev) = producers.insert(output.as_str(), idx) {
                    return Err(SyncError::Graph(format!(
                        "dataset {} produced by both {} and {}",
                        output, self.stages[prev].name, stage.name
                    )));
                }
            }
        }

        let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let mut upstream = BTreeSet::new();
            for input in &stage.inputs {
                let producer = producers.get(input.as_str()).ok_or_else(|| {
                    SyncError::Graph(format!("stage {} consumes unknown dataset {}", stage.name, input))
                })?;
                upstream.insert(*producer);
            }
            deps.push(upstream);
        }

        let mut done = vec![false; self.stages.len()];
        let mut ordered = Vec::with_capacity(self.stages.len());
        while ordered.len() < self.stages.len() {
            let ready = (0..self.stages.len())
                .find(|&idx| !done[idx] && deps[idx].iter().all(|&d| done[d]));
            match ready {
                Some(idx) => {
                    done[idx] = true;
                    ordered.push(&self.stages[idx]);
                },
                None => {
                    let stuck: Vec<&str> = (0..self.stages.len())
                        .filter(|&idx| !done[idx])
                        .map(|idx| self.stages[idx].name.as_str())
                        .collect();
                    return Err(SyncError::Graph(format!(
                        "dependency cycle among stages: {}",
                        stuck.join(", ")
                    )));
                },
            }
        }
        Ok(ordered)
    }
}

pub fn extract_stage(entity: EntityType) -> String {
    format!("extract_{}", entity.landing_dir())
}

pub fn transform_stage(entity: EntityType) -> String {
    format!("transform_{}", entity.landing_dir())
}

pub const LOAD_STAGE: &str = "load";

fn raw(entity: EntityType) -> String {
    format!("raw/{}", entity.landing_dir())
}

fn processed(entity: EntityType) -> String {
    format!("processed/{}", entity.landing_dir())
}

/// Key datasets passed between extraction stages
const MEETING_KEYS: &str = "keys/meetings";
const SESSION_PAIRS: &str = "keys/session_pairs";

/// The full sync graph: five extractions, one transform per entity, one load
pub fn default_graph() -> Result<StageGraph> {
    use EntityType::*;

    let mut stages = vec![
        Stage::new(extract_stage(Meetings))
            .output(raw(Meetings))
            .output(MEETING_KEYS),
        Stage::new(extract_stage(Drivers)).output(raw(Drivers)),
        Stage::new(extract_stage(Sessions))
            .input(MEETING_KEYS)
            .output(raw(Sessions))
            .output(SESSION_PAIRS),
        Stage::new(extract_stage(SessionResults))
            .input(SESSION_PAIRS)
            .output(raw(SessionResults)),
        Stage::new(extract_stage(StartingGrids))
            .input(MEETING_KEYS)
            .output(raw(StartingGrids)),
    ];

    let mut load = Stage::new(LOAD_STAGE);
    for entity in EntityType::ALL {
        stages.push(
            Stage::new(transform_stage(entity))
                .input(raw(entity))
                .output(processed(entity)),
        );
        load = load.input(processed(entity));
    }
    stages.push(load.output("tables"));

    StageGraph::new(stages)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn position(order: &[&Stage], name: &str) -> usize {
        order.iter().position(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_default_graph_orders_dependencies() {
        let graph = default_graph().unwrap();
        let order = graph.order().unwrap();
        assert_eq!(order.len(), 11);

        let meetings = position(&order, "extract_meetings");
        let sessions = position(&order, "extract_sessions");
        let results = position(&order, "extract_session_results");
        let grids = position(&order, "extract_starting_grids");
        assert!(meetings < sessions);
        assert!(sessions < results);
        assert!(meetings < grids);
        assert_eq!(order.last().unwrap().name, LOAD_STAGE);
        for entity in EntityType::ALL {
            assert!(position(&order, &extract_stage(entity)) < position(&order, &transform_stage(entity)));
        }
    }

    #[test]
    fn test_order_is_deterministic() {
        let a: Vec<String> = default_graph().unwrap().order().unwrap().iter().map(|s| s.name.clone()).collect();
        let b: Vec<String> = default_graph().unwrap().order().unwrap().iter().map(|s| s.name.clone()).collect();
        assert_eq!(a, b);
        assert_eq!(a[0], "extract_meetings");
        assert_eq!(a[1], "extract_drivers");
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let graph = StageGraph::new(vec![
            Stage::new("b").input("x").output("y"),
            Stage::new("a").output("x"),
        ])
        .unwrap();
        let names: Vec<&str> = graph.order().unwrap().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_unknown_input() {
        let err = StageGraph::new(vec![Stage::new("a").input("nowhere")]).unwrap_err();
        assert!(err.to_string().contains("unknown dataset nowhere"));
    }

    #[test]
    fn test_rejects_duplicate_producer() {
        let err = StageGraph::new(vec![Stage::new("a").output("x"), Stage::new("b").output("x")]).unwrap_err();
        assert!(err.to_string().contains("produced by both a and b"));
    }

    #[test]
    fn test_rejects_cycle() {
        let err = StageGraph::new(vec![
            Stage::new("a").input("y").output("x"),
            Stage::new("b").input("x").output("y"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }
}
