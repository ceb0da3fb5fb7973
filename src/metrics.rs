//! Image quality metrics and running accumulators.

/// Peak signal-to-noise ratio for images normalized to [0, 1].
///
/// PSNR is `10 * log10(1 / mse)`; a zero MSE maps to infinity.
///
/// # Example
///
/// ```rust
/// use brdnet_rs::metrics::mse_to_psnr;
///
/// let clean = mse_to_psnr(1e-4);
/// let noisy = mse_to_psnr(1e-2);
/// assert!(clean > noisy);
/// ```
#[must_use]
pub fn mse_to_psnr(mse: f64) -> f64 {
    if mse <= 0.0 {
        f64::INFINITY
    } else {
        10.0 * (1.0 / mse).log10()
    }
}

/// Running mean accumulator for per-batch metrics.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation.
    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Mean over all observations, 0.0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Number of observations.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psnr_increases_as_mse_decreases() {
        let mses = [1.0, 0.1, 0.01, 0.001, 0.0001];
        let psnrs: Vec<f64> = mses.iter().map(|&m| mse_to_psnr(m)).collect();
        for pair in psnrs.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_psnr_known_values() {
        assert!((mse_to_psnr(1.0) - 0.0).abs() < 1e-12);
        assert!((mse_to_psnr(0.01) - 20.0).abs() < 1e-9);
        assert!((mse_to_psnr(1e-4) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_psnr_zero_mse_is_infinite() {
        assert!(mse_to_psnr(0.0).is_infinite());
    }

    #[test]
    fn test_running_mean() {
        let mut mean = RunningMean::new();
        assert_eq!(mean.mean(), 0.0);
        assert_eq!(mean.count(), 0);

        mean.update(2.0);
        mean.update(4.0);
        mean.update(6.0);
        assert_eq!(mean.count(), 3);
        assert!((mean.mean() - 4.0).abs() < 1e-12);
    }
}
