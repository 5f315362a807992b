use crate::config::RigConfig;
use crate::error::ConfigError;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy)]
pub struct Unvalidated;

#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// Total target mass and its split between the two components.
///
/// Only a `BatchPlan<Validated>` can be run, so a bad split is rejected
/// before any output is driven.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlan<State = Unvalidated> {
    target_kg: f64,
    split: [f64; 2],
    _state: PhantomData<State>,
}

impl BatchPlan<Unvalidated> {
    pub fn new(target_kg: f64, split: [f64; 2]) -> Self {
        Self {
            target_kg,
            split,
            _state: PhantomData,
        }
    }

    pub fn validate(self, config: &RigConfig) -> Result<BatchPlan<Validated>, ConfigError> {
        if !self.target_kg.is_finite()
            || self.target_kg <= 0.0
            || self.target_kg > config.max_target_kg
        {
            return Err(ConfigError::TargetOutOfRange {
                target_kg: self.target_kg,
                max_kg: config.max_target_kg,
            });
        }

        for (component, &value) in config.components.iter().zip(self.split.iter()) {
            if value < 0.0 {
                return Err(ConfigError::NegativeFraction {
                    component: component.name.clone(),
                    value,
                });
            }
            let zero_allowed = config.allow_zero_fraction && value == 0.0;
            if !(value > 0.0 || zero_allowed) {
                return Err(ConfigError::NonPositiveFraction {
                    component: component.name.clone(),
                    value,
                });
            }
        }

        let sum = self.split[0] + self.split[1];
        if (sum - 1.0).abs() > config.split_epsilon {
            return Err(ConfigError::SplitSum {
                sum,
                epsilon: config.split_epsilon,
            });
        }

        Ok(BatchPlan {
            target_kg: self.target_kg,
            split: self.split,
            _state: PhantomData,
        })
    }
}

impl BatchPlan<Validated> {
    pub fn target_kg(&self) -> f64 {
        self.target_kg
    }

    pub fn split(&self) -> [f64; 2] {
        self.split
    }

    /// Mass to add in stage `index`.
    pub fn stage_target(&self, index: usize) -> f64 {
        self.target_kg * self.split[index]
    }
}
