//! Hyperparameter specifications and search spaces

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Concrete hyperparameters handed to a model constructor
pub type Params = BTreeMap<String, Value>;

/// Domain of a searchable hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "space", rename_all = "snake_case")]
pub enum Space {
    /// Continuous range, optionally sampled on a log scale
    Real {
        lower: f64,
        upper: f64,
        #[serde(default)]
        log: bool,
    },
    /// Inclusive integer range
    Int { lower: i64, upper: i64 },
    /// Finite set of choices
    Categorical { choices: Vec<Value> },
}

impl Space {
    /// Create a linear real range
    pub fn real(lower: f64, upper: f64) -> Self {
        Space::Real {
            lower,
            upper,
            log: false,
        }
    }

    /// Create a log-scale real range
    pub fn log_real(lower: f64, upper: f64) -> Self {
        Space::Real {
            lower,
            upper,
            log: true,
        }
    }

    /// Create an integer range
    pub fn int(lower: i64, upper: i64) -> Self {
        Space::Int { lower, upper }
    }

    /// Create a categorical choice
    pub fn categorical(choices: Vec<Value>) -> Self {
        Space::Categorical { choices }
    }

    /// Value used when the space is not searched
    pub fn default_value(&self) -> Value {
        match self {
            Space::Real { lower, upper, log } => {
                let v = if *log && *lower > 0.0 {
                    (lower * upper).sqrt()
                } else {
                    (lower + upper) / 2.0
                };
                Value::from(v)
            }
            Space::Int { lower, upper } => Value::from(lower + (upper - lower) / 2),
            Space::Categorical { choices } => choices.first().cloned().unwrap_or(Value::Null),
        }
    }

    /// Draw a random value from the space
    pub fn sample(&self, rng: &mut impl Rng) -> Value {
        match self {
            Space::Real { lower, upper, log } => {
                let v = if *log && *lower > 0.0 {
                    let (lo, hi) = (lower.ln(), upper.ln());
                    (rng.gen::<f64>() * (hi - lo) + lo).exp()
                } else {
                    rng.gen::<f64>() * (upper - lower) + lower
                };
                Value::from(v)
            }
            Space::Int { lower, upper } => {
                if upper <= lower {
                    Value::from(*lower)
                } else {
                    Value::from(rng.gen_range(*lower..=*upper))
                }
            }
            Space::Categorical { choices } => {
                if choices.is_empty() {
                    Value::Null
                } else {
                    choices[rng.gen_range(0..choices.len())].clone()
                }
            }
        }
    }
}

/// A hyperparameter that is either fixed or searched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hyperparameter {
    Search(Space),
    Fixed(Value),
}

impl From<Space> for Hyperparameter {
    fn from(space: Space) -> Self {
        Hyperparameter::Search(space)
    }
}

impl From<Value> for Hyperparameter {
    fn from(value: Value) -> Self {
        Hyperparameter::Fixed(value)
    }
}

/// Declarative description of one candidate model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Registry tag of the model implementation
    pub model_type: String,
    /// Requested name; defaults to the model type
    #[serde(default)]
    pub name: Option<String>,
    /// Fixed values and search spaces by hyperparameter name
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, Hyperparameter>,
}

impl ModelSpec {
    /// Create a spec with no hyperparameters
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            name: None,
            hyperparameters: BTreeMap::new(),
        }
    }

    /// Builder method to set the model name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder method to set a fixed hyperparameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.hyperparameters
            .insert(key.into(), Hyperparameter::Fixed(value.into()));
        self
    }

    /// Builder method to add a searched hyperparameter
    pub fn with_space(mut self, key: impl Into<String>, space: Space) -> Self {
        self.hyperparameters
            .insert(key.into(), Hyperparameter::Search(space));
        self
    }

    /// Name the model will be registered under (before collision handling)
    pub fn base_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.model_type)
    }

    /// Whether any hyperparameter is a search space
    pub fn contains_search_space(&self) -> bool {
        self.hyperparameters
            .values()
            .any(|h| matches!(h, Hyperparameter::Search(_)))
    }

    /// Concrete parameters using each space's default value
    pub fn default_params(&self) -> Params {
        self.hyperparameters
            .iter()
            .map(|(key, h)| {
                let value = match h {
                    Hyperparameter::Fixed(v) => v.clone(),
                    Hyperparameter::Search(space) => space.default_value(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Concrete parameters with every search space sampled
    pub fn sample_params(&self, rng: &mut impl Rng) -> Params {
        self.hyperparameters
            .iter()
            .map(|(key, h)| {
                let value = match h {
                    Hyperparameter::Fixed(v) => v.clone(),
                    Hyperparameter::Search(space) => space.sample(rng),
                };
                (key.clone(), value)
            })
            .collect()
    }
}
