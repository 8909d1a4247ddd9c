//! Sampling strategies for hyperparameter tuning

use super::search_space::{ModelSpec, Params};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Independent uniform draws from each space
    #[default]
    Random,
    /// First trial uses the space defaults, later trials draw at random
    DefaultFirst,
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send + Sync {
    /// Sample the next set of hyperparameters given previous (params, score) pairs
    fn sample(&mut self, spec: &ModelSpec, history: &[(Params, f64)]) -> Params;
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    /// Create a new random sampler
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        Self { rng }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, spec: &ModelSpec, _history: &[(Params, f64)]) -> Params {
        spec.sample_params(&mut self.rng)
    }
}

/// Starts from the declared defaults before exploring randomly
#[derive(Debug)]
pub struct DefaultFirstSampler {
    inner: RandomSampler,
    issued: usize,
}

impl DefaultFirstSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            inner: RandomSampler::new(seed),
            issued: 0,
        }
    }
}

impl Sampler for DefaultFirstSampler {
    fn sample(&mut self, spec: &ModelSpec, history: &[(Params, f64)]) -> Params {
        self.issued += 1;
        if self.issued == 1 {
            spec.default_params()
        } else {
            self.inner.sample(spec, history)
        }
    }
}

/// Create a sampler from type
pub fn create_sampler(sampler_type: SamplerType, seed: Option<u64>) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::DefaultFirst => Box::new(DefaultFirstSampler::new(seed)),
    }
}
