//! Optimizer construction and wrapping.

use candle_core::Tensor;
use candle_nn::{Optimizer, ParamsAdamW, VarMap};

use crate::error::{BrdnetError, Result};

/// Optimizer hyperparameters.
///
/// Weight decay defaults to zero, which makes the update rule plain Adam.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1 for Adam
    pub beta1: f64,
    /// Beta2 for Adam
    pub beta2: f64,
    /// Weight decay
    pub weight_decay: f64,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.0,
            eps: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Create an Adam optimizer over all variables of a [`VarMap`].
    ///
    /// # Errors
    ///
    /// Returns an error if the optimizer cannot be created.
    pub fn build(&self, varmap: &VarMap) -> Result<AdamOptimizer> {
        let vars = varmap.all_vars();
        let params = ParamsAdamW {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        };

        let opt = candle_nn::AdamW::new(vars, params)
            .map_err(|e| BrdnetError::Training(format!("failed to create optimizer: {e}")))?;

        Ok(AdamOptimizer { inner: opt })
    }
}

/// Adam optimizer wrapper.
pub struct AdamOptimizer {
    inner: candle_nn::AdamW,
}

impl AdamOptimizer {
    /// Backpropagate a scalar loss and apply one update step.
    ///
    /// Prior gradients are implicitly cleared: the backward pass produces a
    /// fresh gradient store each call.
    ///
    /// # Errors
    ///
    /// Returns an error if the backward pass or the update fails.
    pub fn step(&mut self, loss: &Tensor) -> Result<()> {
        self.inner
            .backward_step(loss)
            .map_err(|e| BrdnetError::Training(format!("optimizer step failed: {e}")))
    }

    /// Get current learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.inner.learning_rate()
    }

    /// Set learning rate (used by the scheduler).
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.inner.set_learning_rate(lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_default() {
        let config = OptimizerConfig::default();
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.beta1, 0.9);
        assert_eq!(config.beta2, 0.999);
        assert_eq!(config.weight_decay, 0.0);
    }

    #[test]
    fn test_build_and_set_lr() -> Result<()> {
        let config = OptimizerConfig::default();
        let varmap = VarMap::new();

        let mut optimizer = config.build(&varmap)?;
        assert_eq!(optimizer.learning_rate(), 1e-3);

        optimizer.set_learning_rate(3e-4);
        assert_eq!(optimizer.learning_rate(), 3e-4);

        Ok(())
    }
}
