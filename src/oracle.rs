use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::error::{NudgeError, Result};

pub trait Oracle: Send + Sync {
    /// Returns `1` when the model recommends the nudge, `0` otherwise.
    fn predict(&self, features: &[f64]) -> Result<u8>;
}

fn default_threshold() -> f64 {
    0.5
}

/// Logistic regression exported as JSON coefficients.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticOracle {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl LogisticOracle {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model from {}", path.display()))?;
        let model: LogisticOracle = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model in {}", path.display()))?;
        ensure!(
            !model.coefficients.is_empty(),
            "model in {} has no coefficients",
            path.display()
        );
        Ok(model)
    }

    pub fn probability(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            return Err(NudgeError::FeatureMismatch {
                expected: self.coefficients.len(),
                got: features.len(),
            });
        }
        let logit: f64 = self
            .coefficients
            .iter()
            .zip(features)
            .map(|(weight, value)| weight * value)
            .sum::<f64>()
            + self.intercept;
        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

impl Oracle for LogisticOracle {
    fn predict(&self, features: &[f64]) -> Result<u8> {
        let probability = self.probability(features)?;
        Ok(u8::from(probability >= self.threshold))
    }
}

/// The two classifiers the decider consults. Either may be absent.
#[derive(Clone, Default)]
pub struct OracleSet {
    pub resume: Option<Arc<dyn Oracle>>,
    pub event: Option<Arc<dyn Oracle>>,
}

impl OracleSet {
    pub fn load(resume: Option<&Path>, event: Option<&Path>) -> anyhow::Result<Self> {
        Ok(Self {
            resume: load_optional(resume)?,
            event: load_optional(event)?,
        })
    }
}

fn load_optional(path: Option<&Path>) -> anyhow::Result<Option<Arc<dyn Oracle>>> {
    match path {
        Some(path) => {
            let model = LogisticOracle::load(path)?;
            tracing::info!(path = %path.display(), features = model.coefficients.len(), "model loaded");
            Ok(Some(Arc::new(model)))
        }
        None => Ok(None),
    }
}
