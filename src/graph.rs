//! Directed acyclic graph of trained models
//!
//! Nodes carry the bookkeeping the trainer needs without loading a model; an
//! edge `base -> model` means `model` consumes the predictions of `base`.
//! Edges are only ever added towards a newly registered node, so the graph
//! stays acyclic and registration order is a topological order.

use crate::error::{Result, TrainerError};
use crate::models::ForecastModel;
use petgraph::algo::dijkstra;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction::{Incoming, Outgoing};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Metadata of one trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    pub path: PathBuf,
    pub model_type: String,
    pub fit_time: Option<f64>,
    pub predict_time: Option<f64>,
    pub val_score: Option<f64>,
}

impl ModelRecord {
    /// Snapshot the bookkeeping of a model
    pub fn from_model(model: &dyn ForecastModel) -> Self {
        let state = model.state();
        Self {
            name: state.name.clone(),
            path: state.path.clone(),
            model_type: model.model_type().to_string(),
            fit_time: state.fit_time,
            predict_time: state.predict_time,
            val_score: state.val_score,
        }
    }
}

/// Node attribute keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Path,
    Type,
    FitTime,
    PredictTime,
    ValScore,
}

impl FromStr for Attribute {
    type Err = TrainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "path" => Ok(Attribute::Path),
            "type" => Ok(Attribute::Type),
            "fit_time" => Ok(Attribute::FitTime),
            "predict_time" => Ok(Attribute::PredictTime),
            "val_score" => Ok(Attribute::ValScore),
            _ => Err(TrainerError::NotFoundError(format!(
                "Unknown model attribute '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Attribute::Path => "path",
            Attribute::Type => "type",
            Attribute::FitTime => "fit_time",
            Attribute::PredictTime => "predict_time",
            Attribute::ValScore => "val_score",
        };
        write!(f, "{}", s)
    }
}

/// Value of a node attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Path(PathBuf),
    Text(String),
    Seconds(Option<f64>),
    Score(Option<f64>),
}

/// Serialized form: nodes in registration order plus edges by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphSnapshot {
    nodes: Vec<ModelRecord>,
    edges: Vec<(String, String)>,
}

/// The trainer's model graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphSnapshot", into = "GraphSnapshot")]
pub struct ModelGraph {
    graph: StableDiGraph<ModelRecord, ()>,
    index: HashMap<String, NodeIndex>,
    order: Vec<String>,
}

impl ModelGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered models
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of dependency edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn node(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| TrainerError::NotFoundError(format!("Model '{}' is not registered", name)))
    }

    /// Register a trained model.
    ///
    /// `base_models` may only be given for ensembles; every base model must
    /// already be registered. Nothing is changed when an error is returned.
    pub fn add_model(&mut self, model: &dyn ForecastModel, base_models: Option<&[String]>) -> Result<()> {
        if base_models.is_some() && !model.is_ensemble() {
            return Err(TrainerError::TypeInvariantError(format!(
                "Model '{}' of type {} cannot depend on base models",
                model.name(),
                model.model_type()
            )));
        }
        self.insert(ModelRecord::from_model(model), base_models.unwrap_or_default())
    }

    fn insert(&mut self, record: ModelRecord, base_models: &[String]) -> Result<()> {
        if self.contains(&record.name) {
            return Err(TrainerError::DuplicateModelError(record.name));
        }
        let mut bases = Vec::with_capacity(base_models.len());
        for base in base_models {
            let idx = self.index.get(base).copied().ok_or_else(|| {
                TrainerError::DependencyError(format!(
                    "Base model '{}' of '{}' is not registered",
                    base, record.name
                ))
            })?;
            if !bases.contains(&idx) {
                bases.push(idx);
            }
        }

        let name = record.name.clone();
        let node = self.graph.add_node(record);
        for base in bases {
            self.graph.add_edge(base, node, ());
        }
        self.index.insert(name.clone(), node);
        self.order.push(name);
        Ok(())
    }

    /// Drop a model and all its edges
    pub fn remove(&mut self, name: &str) -> Result<ModelRecord> {
        let node = self.node(name)?;
        self.index.remove(name);
        self.order.retain(|n| n != name);
        self.graph
            .remove_node(node)
            .ok_or_else(|| TrainerError::NotFoundError(format!("Model '{}' is not registered", name)))
    }

    /// Metadata of a model
    pub fn record(&self, name: &str) -> Result<&ModelRecord> {
        let node = self.node(name)?;
        self.graph
            .node_weight(node)
            .ok_or_else(|| TrainerError::NotFoundError(format!("Model '{}' is not registered", name)))
    }

    fn record_mut(&mut self, name: &str) -> Result<&mut ModelRecord> {
        let node = self.node(name)?;
        self.graph
            .node_weight_mut(node)
            .ok_or_else(|| TrainerError::NotFoundError(format!("Model '{}' is not registered", name)))
    }

    /// Records in registration order
    pub fn records(&self) -> impl Iterator<Item = &ModelRecord> {
        self.order
            .iter()
            .filter_map(move |name| self.index.get(name))
            .filter_map(move |idx| self.graph.node_weight(*idx))
    }

    /// Read one attribute (`path`, `type`, `fit_time`, `predict_time`, `val_score`)
    pub fn get_attribute(&self, name: &str, key: &str) -> Result<AttributeValue> {
        let attribute: Attribute = key.parse()?;
        let record = self.record(name)?;
        Ok(match attribute {
            Attribute::Path => AttributeValue::Path(record.path.clone()),
            Attribute::Type => AttributeValue::Text(record.model_type.clone()),
            Attribute::FitTime => AttributeValue::Seconds(record.fit_time),
            Attribute::PredictTime => AttributeValue::Seconds(record.predict_time),
            Attribute::ValScore => AttributeValue::Score(record.val_score),
        })
    }

    /// Overwrite one attribute; the value kind must match the key
    pub fn set_attribute(&mut self, name: &str, key: &str, value: AttributeValue) -> Result<()> {
        let attribute: Attribute = key.parse()?;
        let record = self.record_mut(name)?;
        match (attribute, value) {
            (Attribute::Path, AttributeValue::Path(path)) => record.path = path,
            (Attribute::Type, AttributeValue::Text(model_type)) => record.model_type = model_type,
            (Attribute::FitTime, AttributeValue::Seconds(t)) => record.fit_time = t,
            (Attribute::PredictTime, AttributeValue::Seconds(t)) => record.predict_time = t,
            (Attribute::ValScore, AttributeValue::Score(s)) => record.val_score = s,
            (attribute, value) => {
                return Err(TrainerError::InvalidParameter {
                    name: attribute.to_string(),
                    value: format!("{:?}", value),
                    reason: "value kind does not match the attribute".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Attribute values of every model, keyed by model name
    pub fn attribute_map(&self, key: &str) -> Result<BTreeMap<String, AttributeValue>> {
        self.order
            .iter()
            .map(|name| Ok((name.clone(), self.get_attribute(name, key)?)))
            .collect()
    }

    /// Models whose predictions `name` consumes directly, in registration order
    pub fn base_models(&self, name: &str) -> Result<Vec<String>> {
        let node = self.node(name)?;
        let mut bases: Vec<NodeIndex> = self.graph.neighbors_directed(node, Incoming).collect();
        bases.sort_by_key(|idx| self.position(*idx));
        Ok(bases.into_iter().filter_map(|idx| self.name_of(idx)).collect())
    }

    /// Models that consume the predictions of `name` directly, in registration order
    pub fn dependents(&self, name: &str) -> Result<Vec<String>> {
        let node = self.node(name)?;
        let mut users: Vec<NodeIndex> = self.graph.neighbors_directed(node, Outgoing).collect();
        users.sort_by_key(|idx| self.position(*idx));
        Ok(users.into_iter().filter_map(|idx| self.name_of(idx)).collect())
    }

    /// Every model `name` transitively depends on, in registration order.
    ///
    /// `name` itself is included only when `include_self` is set.
    pub fn minimum_dependency_set(&self, name: &str, include_self: bool) -> Result<Vec<String>> {
        let start = self.node(name)?;
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut found = Vec::new();
        while let Some(idx) = bfs.next(reversed) {
            if idx != start || include_self {
                found.push(idx);
            }
        }
        found.sort_by_key(|idx| self.position(*idx));
        Ok(found.into_iter().filter_map(|idx| self.name_of(idx)).collect())
    }

    /// Depth of every model.
    ///
    /// Roots have level 0; any other node takes the largest of its shortest
    /// distances from the roots that reach it.
    pub fn levels(&self) -> HashMap<String, usize> {
        let mut levels: HashMap<String, usize> = self.order.iter().map(|n| (n.clone(), 0)).collect();
        let roots = self
            .graph
            .node_indices()
            .filter(|idx| self.graph.neighbors_directed(*idx, Incoming).next().is_none());
        for root in roots {
            for (idx, distance) in dijkstra(&self.graph, root, None, |_| 1usize) {
                if let Some(name) = self.graph.node_weight(idx).map(|r| &r.name) {
                    if let Some(level) = levels.get_mut(name) {
                        *level = (*level).max(distance);
                    }
                }
            }
        }
        levels
    }

    /// Model names in registration order, optionally only those at `level`
    pub fn model_names(&self, level: Option<usize>) -> Vec<String> {
        match level {
            None => self.order.clone(),
            Some(level) => {
                let levels = self.levels();
                self.order
                    .iter()
                    .filter(|name| levels.get(*name) == Some(&level))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Models nothing else depends on
    pub fn leaves(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.index
                    .get(*name)
                    .map_or(false, |idx| self.graph.neighbors_directed(*idx, Outgoing).next().is_none())
            })
            .cloned()
            .collect()
    }

    /// Name of the model with the highest validation score.
    ///
    /// Ties go to the model registered first.
    pub fn best_model(&self) -> Result<String> {
        let mut best: Option<(&str, f64)> = None;
        for record in self.records() {
            if let Some(score) = record.val_score.filter(|s| !s.is_nan()) {
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((record.name.as_str(), score));
                }
            }
        }
        best.map(|(name, _)| name.to_string()).ok_or_else(|| {
            TrainerError::NoModelsError(
                "Trainer has no fit models that can predict".to_string(),
            )
        })
    }

    /// Move every path below `old_root` to the same place below `new_root`
    pub fn rewrite_paths(&mut self, old_root: &Path, new_root: &Path) {
        let nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in nodes {
            if let Some(record) = self.graph.node_weight_mut(idx) {
                if let Ok(relative) = record.path.strip_prefix(old_root) {
                    record.path = new_root.join(relative);
                }
            }
        }
    }

    fn position(&self, idx: NodeIndex) -> usize {
        self.graph
            .node_weight(idx)
            .and_then(|r| self.order.iter().position(|n| *n == r.name))
            .unwrap_or(usize::MAX)
    }

    fn name_of(&self, idx: NodeIndex) -> Option<String> {
        self.graph.node_weight(idx).map(|r| r.name.clone())
    }
}

impl From<ModelGraph> for GraphSnapshot {
    fn from(graph: ModelGraph) -> Self {
        let edges = graph
            .graph
            .edge_indices()
            .filter_map(|e| graph.graph.edge_endpoints(e))
            .filter_map(|(a, b)| Some((graph.name_of(a)?, graph.name_of(b)?)))
            .collect();
        let nodes = graph.records().cloned().collect();
        GraphSnapshot { nodes, edges }
    }
}

impl TryFrom<GraphSnapshot> for ModelGraph {
    type Error = TrainerError;

    fn try_from(snapshot: GraphSnapshot) -> Result<Self> {
        let mut bases: HashMap<String, Vec<String>> = HashMap::new();
        for (base, model) in snapshot.edges {
            bases.entry(model).or_default().push(base);
        }
        let mut graph = ModelGraph::new();
        for record in snapshot.nodes {
            let deps = bases.remove(&record.name).unwrap_or_default();
            graph.insert(record, &deps)?;
        }
        if let Some((model, _)) = bases.into_iter().next() {
            return Err(TrainerError::DependencyError(format!(
                "Edge points at unregistered model '{}'",
                model
            )));
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelState, NaiveModel, WeightedEnsemble};

    fn naive(name: &str, score: Option<f64>) -> NaiveModel {
        let mut state = ModelState::new(name, 1).with_path(format!("/root/models/{}", name));
        state.val_score = score;
        NaiveModel::new(state)
    }

    fn ensemble(name: &str) -> WeightedEnsemble {
        WeightedEnsemble::new(ModelState::new(name, 1)).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// A, B roots; E1 <- {A, B}; E2 <- {E1, B}
    fn sample_graph() -> ModelGraph {
        let mut g = ModelGraph::new();
        g.add_model(&naive("A", Some(0.5)), None).unwrap();
        g.add_model(&naive("B", Some(0.9)), None).unwrap();
        g.add_model(&ensemble("E1"), Some(&names(&["A", "B"]))).unwrap();
        g.add_model(&ensemble("E2"), Some(&names(&["E1", "B"]))).unwrap();
        g
    }

    #[test]
    fn test_add_ensemble_adds_edges() {
        let mut g = ModelGraph::new();
        g.add_model(&naive("A", None), None).unwrap();
        g.add_model(&naive("B", None), None).unwrap();
        g.add_model(&ensemble("E"), Some(&names(&["A", "B"]))).unwrap();
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.base_models("E").unwrap(), names(&["A", "B"]));
    }

    #[test]
    fn test_missing_base_model() {
        let mut g = ModelGraph::new();
        g.add_model(&naive("A", None), None).unwrap();
        let err = g
            .add_model(&ensemble("E"), Some(&names(&["A", "Ghost"])))
            .unwrap_err();
        assert!(matches!(err, TrainerError::DependencyError(_)));
        assert!(!g.contains("E"));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_base_models_on_non_ensemble() {
        let mut g = ModelGraph::new();
        g.add_model(&naive("A", None), None).unwrap();
        let err = g.add_model(&naive("B", None), Some(&names(&["A"]))).unwrap_err();
        assert!(matches!(err, TrainerError::TypeInvariantError(_)));
    }

    #[test]
    fn test_duplicate_name() {
        let mut g = ModelGraph::new();
        g.add_model(&naive("A", None), None).unwrap();
        assert!(matches!(
            g.add_model(&naive("A", None), None),
            Err(TrainerError::DuplicateModelError(_))
        ));
    }

    #[test]
    fn test_minimum_dependency_set() {
        let g = sample_graph();
        assert_eq!(g.minimum_dependency_set("E2", false).unwrap(), names(&["A", "B", "E1"]));
        assert_eq!(
            g.minimum_dependency_set("E2", true).unwrap(),
            names(&["A", "B", "E1", "E2"])
        );
        assert!(g.minimum_dependency_set("A", false).unwrap().is_empty());
        assert!(matches!(
            g.minimum_dependency_set("Z", true),
            Err(TrainerError::NotFoundError(_))
        ));
    }

    #[test]
    fn test_levels_take_max_over_roots() {
        let g = sample_graph();
        let levels = g.levels();
        assert_eq!(levels["A"], 0);
        assert_eq!(levels["B"], 0);
        assert_eq!(levels["E1"], 1);
        // reachable from A in two hops, from B in one
        assert_eq!(levels["E2"], 2);
        assert_eq!(g.model_names(Some(0)), names(&["A", "B"]));
    }

    #[test]
    fn test_best_model() {
        let mut g = ModelGraph::new();
        g.add_model(&naive("A", Some(0.5)), None).unwrap();
        g.add_model(&naive("B", Some(0.9)), None).unwrap();
        g.add_model(&naive("C", None), None).unwrap();
        assert_eq!(g.best_model().unwrap(), "B");

        g.add_model(&naive("D", Some(0.9)), None).unwrap();
        assert_eq!(g.best_model().unwrap(), "B");
    }

    #[test]
    fn test_best_model_without_scores() {
        let mut g = ModelGraph::new();
        assert!(matches!(g.best_model(), Err(TrainerError::NoModelsError(_))));
        g.add_model(&naive("A", None), None).unwrap();
        assert!(matches!(g.best_model(), Err(TrainerError::NoModelsError(_))));
    }

    #[test]
    fn test_attributes() {
        let mut g = sample_graph();
        assert_eq!(
            g.get_attribute("A", "val_score").unwrap(),
            AttributeValue::Score(Some(0.5))
        );
        assert_eq!(
            g.get_attribute("E1", "type").unwrap(),
            AttributeValue::Text("WeightedEnsemble".to_string())
        );
        g.set_attribute("A", "fit_time", AttributeValue::Seconds(Some(1.5)))
            .unwrap();
        assert_eq!(g.record("A").unwrap().fit_time, Some(1.5));

        assert!(matches!(
            g.get_attribute("A", "colour"),
            Err(TrainerError::NotFoundError(_))
        ));
        assert!(matches!(
            g.get_attribute("Z", "path"),
            Err(TrainerError::NotFoundError(_))
        ));
        assert!(g
            .set_attribute("A", "path", AttributeValue::Score(None))
            .is_err());
        assert_eq!(g.attribute_map("type").unwrap().len(), 4);
    }

    #[test]
    fn test_remove_drops_edges() {
        let mut g = sample_graph();
        g.remove("E2").unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.leaves(), names(&["E1"]));
    }

    #[test]
    fn test_dependents() {
        let g = sample_graph();
        assert_eq!(g.dependents("B").unwrap(), names(&["E1", "E2"]));
        assert!(g.dependents("E2").unwrap().is_empty());
    }

    #[test]
    fn test_rewrite_paths() {
        let mut g = sample_graph();
        g.rewrite_paths(Path::new("/root"), Path::new("/new"));
        assert_eq!(g.record("A").unwrap().path, PathBuf::from("/new/models/A"));
        assert_eq!(g.record("A").unwrap().val_score, Some(0.5));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let g = sample_graph();
        let json = serde_json::to_string(&g).unwrap();
        let back: ModelGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model_names(None), g.model_names(None));
        assert_eq!(back.edge_count(), 4);
        assert_eq!(back.levels(), g.levels());
    }
}
