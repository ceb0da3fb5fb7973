//! Plateau-based learning rate reduction.

use crate::config::SchedulerConfig;
use crate::optimizer::AdamOptimizer;

/// Relative improvement threshold; an epoch only counts as an improvement
/// when the metric drops below `best * (1 - THRESHOLD)`.
const THRESHOLD: f64 = 1e-4;

/// Reduces the learning rate once a monitored metric stops improving.
///
/// Tracks the best metric seen so far and a consecutive stagnant-epoch
/// counter. After more than `patience` stagnant epochs the learning rate is
/// multiplied by `factor`, floored at `min_lr`, and the counter resets.
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    factor: f64,
    patience: usize,
    min_lr: f64,
    best: f64,
    num_bad_epochs: usize,
}

impl ReduceOnPlateau {
    /// Create a scheduler from its configuration section.
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            factor: config.factor,
            patience: config.patience,
            min_lr: config.min_lr,
            best: f64::INFINITY,
            num_bad_epochs: 0,
        }
    }

    /// Feed this epoch's monitored metric and update the optimizer.
    ///
    /// Returns `true` when the learning rate was reduced.
    pub fn step(&mut self, metric: f64, optimizer: &mut AdamOptimizer) -> bool {
        if metric < self.best * (1.0 - THRESHOLD) {
            self.best = metric;
            self.num_bad_epochs = 0;
            return false;
        }

        self.num_bad_epochs += 1;
        if self.num_bad_epochs <= self.patience {
            return false;
        }

        self.num_bad_epochs = 0;
        let old_lr = optimizer.learning_rate();
        let new_lr = (old_lr * self.factor).max(self.min_lr);
        if new_lr < old_lr {
            optimizer.set_learning_rate(new_lr);
            tracing::info!("Reducing learning rate: {:.3e} -> {:.3e}", old_lr, new_lr);
            true
        } else {
            false
        }
    }

    /// Best metric value observed so far.
    #[must_use]
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Consecutive epochs without improvement.
    #[must_use]
    pub fn num_bad_epochs(&self) -> usize {
        self.num_bad_epochs
    }
}
