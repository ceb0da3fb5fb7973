//! Training and validation loop.

use candle_core::{Device, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::BrdnetConfig;
use crate::dataset::CtDataset;
use crate::error::{BrdnetError, Result};
use crate::metrics::{mse_to_psnr, RunningMean};
use crate::model::BrdNet;
use crate::optimizer::{AdamOptimizer, OptimizerConfig};
use crate::scheduler::ReduceOnPlateau;

/// Persisted training progress, written alongside the best checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last completed epoch (1-based).
    pub epoch: usize,
    /// Best validation loss seen so far.
    pub best_loss: f64,
    /// Learning rate at save time.
    pub learning_rate: f64,
}

/// Training orchestrator.
///
/// # Example
///
/// ```no_run
/// use brdnet_rs::{BrdnetConfig, Trainer};
///
/// # fn main() -> brdnet_rs::Result<()> {
/// let config = BrdnetConfig::from_file("config.yaml")?;
/// let mut trainer = Trainer::new(config)?;
/// trainer.train()?;
/// # Ok(())
/// # }
/// ```
pub struct Trainer {
    /// Configuration
    config: BrdnetConfig,
    /// Device for training
    device: Device,
    /// Model (created during train())
    model: Option<BrdNet>,
    /// Optimizer (created during train())
    optimizer: Option<AdamOptimizer>,
    /// Plateau scheduler, stepped once per epoch on validation loss
    scheduler: ReduceOnPlateau,
    /// Current epoch (1-based)
    epoch: usize,
    /// Best validation loss seen so far
    best_loss: f64,
}

impl Trainer {
    /// Create a new trainer.
    ///
    /// Validates the configuration and resolves the compute device before
    /// any data is touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the device
    /// string cannot be parsed.
    pub fn new(config: BrdnetConfig) -> Result<Self> {
        config.validate()?;
        let device = parse_device(&config.device)?;
        let scheduler = ReduceOnPlateau::new(&config.scheduler);

        Ok(Self {
            config,
            device,
            model: None,
            optimizer: None,
            scheduler,
            epoch: 0,
            best_loss: f64::INFINITY,
        })
    }

    /// Best validation loss observed so far.
    #[must_use]
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    /// Last completed epoch.
    #[must_use]
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Run the full training loop.
    ///
    /// Per epoch: one pass over the training set, one pass over the
    /// validation set, a scheduler step on the validation loss, then
    /// checkpointing (best-so-far and every `save_interval` epochs).
    ///
    /// # Errors
    ///
    /// Returns an error if data loading, a tensor operation, or a
    /// checkpoint write fails.
    pub fn train(&mut self) -> Result<()> {
        tracing::info!("Starting training");
        tracing::info!("  Save dir: {}", self.config.save_dir);
        tracing::info!("  Epochs: {}", self.config.training.num_epochs);
        tracing::info!(
            "  Batch: {} pairs x {} patches of {}px",
            self.config.training.batch_size,
            self.config.data.patch_n,
            self.config.data.patch_size
        );
        if self.config.data.num_workers > 0 {
            // data loading is synchronous; the knob is kept for config
            // compatibility with existing run scripts
            tracing::debug!(
                "num_workers = {} has no effect on this loader",
                self.config.data.num_workers
            );
        }

        std::fs::create_dir_all(&self.config.save_dir)?;

        let train_set = CtDataset::load(
            &self.config.data.train_path,
            self.config.data.patch_n,
            self.config.data.patch_size,
        )?;
        let val_set = CtDataset::load(
            &self.config.data.val_path,
            self.config.data.patch_n,
            self.config.data.patch_size,
        )?;
        if train_set.is_empty() {
            return Err(BrdnetError::Dataset(format!(
                "no training pairs in {}",
                self.config.data.train_path
            )));
        }
        if val_set.is_empty() {
            return Err(BrdnetError::Dataset(format!(
                "no validation pairs in {}",
                self.config.data.val_path
            )));
        }
        tracing::info!(
            "Loaded {} training pairs, {} validation pairs",
            train_set.len(),
            val_set.len()
        );

        let mut model = BrdNet::new(&self.config.model, &self.device)?;
        if let Some(pretrained) = &self.config.pretrained {
            model.load_pretrained(pretrained)?;
            tracing::info!("Loaded pretrained weights from {}", pretrained);
        }
        tracing::info!("Model parameters: {}", model.parameter_count());
        self.model = Some(model);

        let optimizer_config = OptimizerConfig {
            learning_rate: self.config.training.learning_rate,
            ..OptimizerConfig::default()
        };
        let model = self.model.as_ref().ok_or_else(|| {
            BrdnetError::Training("model must be built before optimizer init".into())
        })?;
        let optimizer = optimizer_config.build(model.var_map())?;
        tracing::info!("Initialized optimizer with lr={}", optimizer.learning_rate());
        self.optimizer = Some(optimizer);

        let batches_per_epoch = train_set.len().div_ceil(self.config.training.batch_size);
        let total_steps = batches_per_epoch * self.config.training.num_epochs;
        let pb = ProgressBar::new(total_steps as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>7}/{len:7} {msg}")?
                .progress_chars("#>-"),
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);

        for epoch in 1..=self.config.training.num_epochs {
            self.epoch = epoch;
            tracing::info!("Epoch {}/{}", epoch, self.config.training.num_epochs);

            let train_loss = self.train_epoch(&train_set, &mut rng, &pb)?;
            let val_loss = self.validate_epoch(&val_set)?;
            tracing::info!(
                "Epoch {} done: train loss {:.8}, val loss {:.8}",
                epoch,
                train_loss,
                val_loss
            );

            let optimizer = self
                .optimizer
                .as_mut()
                .ok_or_else(|| BrdnetError::Training("optimizer not initialized".into()))?;
            self.scheduler.step(val_loss, optimizer);

            self.checkpoint_epoch(val_loss)?;
        }

        pb.finish_with_message("Training complete");
        Ok(())
    }

    /// One pass over the training set.
    ///
    /// Returns the mean loss over all batches of the epoch.
    fn train_epoch(
        &mut self,
        dataset: &CtDataset,
        rng: &mut StdRng,
        pb: &ProgressBar,
    ) -> Result<f64> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BrdnetError::Training("model not built".into()))?;
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| BrdnetError::Training("optimizer not initialized".into()))?;

        let ps = self.config.data.patch_size;
        let patch_n = self.config.data.patch_n;
        let patch_len = ps * ps;

        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(rng);

        let batches = indices.len().div_ceil(self.config.training.batch_size);
        let mut epoch_mean = RunningMean::new();

        for (step, chunk) in indices.chunks(self.config.training.batch_size).enumerate() {
            let n = chunk.len() * patch_n;
            let mut noisy_buf = Vec::with_capacity(n * patch_len);
            let mut clean_buf = Vec::with_capacity(n * patch_len);
            for &idx in chunk {
                let sample = dataset.sample(idx, rng)?;
                noisy_buf.extend_from_slice(&sample.noisy);
                clean_buf.extend_from_slice(&sample.clean);
            }

            let noisy = Tensor::from_vec(noisy_buf, (n, 1, ps, ps), &self.device)?;
            let clean = Tensor::from_vec(clean_buf, (n, 1, ps, ps), &self.device)?;

            let output = model.forward_t(&noisy, true)?;
            let loss = candle_nn::loss::mse(&output, &clean)?;
            optimizer.step(&loss)?;

            let loss_val = f64::from(loss.to_scalar::<f32>()?);
            epoch_mean.update(loss_val);

            pb.set_message(format!("{loss_val:.6}"));
            pb.inc(1);

            if (step + 1) % self.config.training.print_iters == 0 {
                // running mean accumulates over the whole epoch
                tracing::info!(
                    "Epoch {}, step {}/{}, loss {:.8}, lr {:.2e}",
                    self.epoch,
                    step + 1,
                    batches,
                    epoch_mean.mean(),
                    optimizer.learning_rate()
                );
            }
        }

        Ok(epoch_mean.mean())
    }

    /// One pass over the validation set in inference mode.
    ///
    /// One image pair per step. Reports PSNR for the model output and for
    /// the raw noisy input as a no-op baseline, then returns the mean
    /// validation loss.
    fn validate_epoch(&self, dataset: &CtDataset) -> Result<f64> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BrdnetError::Training("model not built".into()))?;

        let ps = self.config.data.patch_size;
        let patch_n = self.config.data.patch_n;

        // crops are re-seeded each epoch so every validation pass scores
        // the same patches
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut loss_mean = RunningMean::new();
        let mut psnr_mean = RunningMean::new();
        let mut base_psnr_mean = RunningMean::new();

        for idx in 0..dataset.len() {
            let sample = dataset.sample(idx, &mut rng)?;
            let noisy = Tensor::from_vec(sample.noisy, (patch_n, 1, ps, ps), &self.device)?;
            let clean = Tensor::from_vec(sample.clean, (patch_n, 1, ps, ps), &self.device)?;

            let output = model.forward_t(&noisy, false)?;
            let loss = f64::from(candle_nn::loss::mse(&output, &clean)?.to_scalar::<f32>()?);
            let base_mse = f64::from(candle_nn::loss::mse(&noisy, &clean)?.to_scalar::<f32>()?);

            let psnr = mse_to_psnr(loss);
            let base_psnr = mse_to_psnr(base_mse);
            loss_mean.update(loss);
            psnr_mean.update(psnr);
            base_psnr_mean.update(base_psnr);

            if (idx + 1) % self.config.training.print_iters == 0 {
                tracing::info!(
                    "Val step {}/{} ({}): loss {:.8} (mean {:.8}), psnr {:.4} dB (mean {:.4}), base psnr {:.4} dB",
                    idx + 1,
                    dataset.len(),
                    sample.id,
                    loss,
                    loss_mean.mean(),
                    psnr,
                    psnr_mean.mean(),
                    base_psnr
                );
            }
        }

        tracing::info!(
            "Validation: loss {:.8}, psnr {:.4} dB, base psnr {:.4} dB",
            loss_mean.mean(),
            psnr_mean.mean(),
            base_psnr_mean.mean()
        );
        Ok(loss_mean.mean())
    }

    /// End-of-epoch checkpoint policy.
    ///
    /// Writes the best checkpoint only when `val_loss` strictly improves on
    /// the best loss seen so far; writes the periodic checkpoint whenever
    /// the current epoch is a multiple of `save_interval`, improvement or
    /// not.
    fn checkpoint_epoch(&mut self, val_loss: f64) -> Result<()> {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.save_best()?;
        }
        if self.epoch % self.config.training.save_interval == 0 {
            self.save_interval_checkpoint(self.epoch)?;
        }
        Ok(())
    }

    /// Save the best-so-far checkpoint plus state and config sidecars.
    fn save_best(&self) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BrdnetError::Checkpoint("model not built during save".into()))?;
        let optimizer = self
            .optimizer
            .as_ref()
            .ok_or_else(|| BrdnetError::Checkpoint("optimizer missing during save".into()))?;

        let dir = std::path::Path::new(&self.config.save_dir);
        model.save(dir.join("model_best.safetensors"))?;

        let state = TrainingState {
            epoch: self.epoch,
            best_loss: self.best_loss,
            learning_rate: optimizer.learning_rate(),
        };
        std::fs::write(
            dir.join("training_state.json"),
            serde_json::to_string_pretty(&state)?,
        )?;
        self.config.to_file(dir.join("config.yaml"))?;

        tracing::info!(
            "Saved best model at epoch {} (val loss {:.8})",
            self.epoch,
            self.best_loss
        );
        Ok(())
    }

    /// Save the periodic per-epoch checkpoint.
    fn save_interval_checkpoint(&self, epoch: usize) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BrdnetError::Checkpoint("model not built during save".into()))?;
        let path = std::path::Path::new(&self.config.save_dir)
            .join(format!("model_checkpoint_{epoch}.safetensors"));
        model.save(&path)?;
        tracing::info!("Saved checkpoint {}", path.display());
        Ok(())
    }
}

/// Resolve a device string (`cpu`, `cuda`, or `cuda:N`).
fn parse_device(name: &str) -> Result<Device> {
    match name {
        "cpu" => Ok(Device::Cpu),
        s if s == "cuda" || s.starts_with("cuda:") => {
            let ordinal = s
                .strip_prefix("cuda:")
                .map_or(Ok(0), str::parse)
                .map_err(|_| BrdnetError::Config(format!("invalid device string: {s}")))?;
            match Device::cuda_if_available(ordinal)? {
                device @ Device::Cuda(_) => {
                    tracing::info!("Training device: CUDA ({ordinal})");
                    Ok(device)
                }
                _ => {
                    tracing::warn!("CUDA not available; falling back to CPU");
                    Ok(Device::Cpu)
                }
            }
        }
        other => Err(BrdnetError::Config(format!(
            "invalid device string: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::optimizer::OptimizerConfig;
    use tempfile::TempDir;

    fn trainer_with_model(save_dir: &std::path::Path, save_interval: usize) -> Trainer {
        let mut config = BrdnetConfig::default();
        config.save_dir = save_dir.to_string_lossy().into_owned();
        config.model = ModelConfig::test();
        config.training.save_interval = save_interval;

        let mut trainer = Trainer::new(config).unwrap();
        let model = BrdNet::new(&trainer.config.model, &trainer.device).unwrap();
        let optimizer = OptimizerConfig::default().build(model.var_map()).unwrap();
        trainer.model = Some(model);
        trainer.optimizer = Some(optimizer);
        trainer
    }

    #[test]
    fn test_best_checkpoint_only_on_strict_improvement() {
        let dir = TempDir::new().unwrap();
        let mut trainer = trainer_with_model(dir.path(), 1);
        let best = dir.path().join("model_best.safetensors");

        trainer.epoch = 1;
        trainer.checkpoint_epoch(0.5).unwrap();
        assert!(best.exists());

        // a stagnant or worse epoch must not rewrite the best checkpoint;
        // removing the file makes any rewrite observable
        std::fs::remove_file(&best).unwrap();
        trainer.epoch = 2;
        trainer.checkpoint_epoch(0.5).unwrap();
        assert!(!best.exists());
        trainer.epoch = 3;
        trainer.checkpoint_epoch(0.7).unwrap();
        assert!(!best.exists());
        assert!((trainer.best_loss() - 0.5).abs() < 1e-12);

        trainer.epoch = 4;
        trainer.checkpoint_epoch(0.4).unwrap();
        assert!(best.exists());
        assert!((trainer.best_loss() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_interval_checkpoint_respects_save_interval() {
        let dir = TempDir::new().unwrap();
        let mut trainer = trainer_with_model(dir.path(), 2);

        trainer.epoch = 1;
        trainer.checkpoint_epoch(1.0).unwrap();
        assert!(!dir.path().join("model_checkpoint_1.safetensors").exists());

        trainer.epoch = 2;
        trainer.checkpoint_epoch(2.0).unwrap();
        assert!(dir.path().join("model_checkpoint_2.safetensors").exists());
    }

    #[test]
    fn test_interval_checkpoint_written_without_improvement() {
        let dir = TempDir::new().unwrap();
        let mut trainer = trainer_with_model(dir.path(), 1);

        trainer.epoch = 1;
        trainer.checkpoint_epoch(0.5).unwrap();
        trainer.epoch = 2;
        trainer.checkpoint_epoch(0.9).unwrap();
        assert!(dir.path().join("model_checkpoint_2.safetensors").exists());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = BrdnetConfig::default();
        config.training.batch_size = 0;
        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_new_with_defaults() {
        let trainer = Trainer::new(BrdnetConfig::default()).unwrap();
        assert_eq!(trainer.epoch(), 0);
        assert!(trainer.best_loss().is_infinite());
    }

    #[test]
    fn test_parse_device_cpu() {
        assert!(matches!(parse_device("cpu").unwrap(), Device::Cpu));
    }

    #[test]
    fn test_parse_device_rejects_garbage() {
        assert!(parse_device("tpu").is_err());
        assert!(parse_device("cuda:x").is_err());
    }

    #[test]
    fn test_training_state_roundtrip() {
        let state = TrainingState {
            epoch: 3,
            best_loss: 0.0025,
            learning_rate: 3e-4,
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: TrainingState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.epoch, 3);
        assert!((back.best_loss - 0.0025).abs() < 1e-12);
        assert!((back.learning_rate - 3e-4).abs() < 1e-12);
    }
}
