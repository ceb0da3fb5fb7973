//! Configuration parsing and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BrdnetError, Result};

/// Main configuration for a denoising training run.
///
/// # Example
///
/// ```no_run
/// use brdnet_rs::BrdnetConfig;
///
/// # fn main() -> brdnet_rs::Result<()> {
/// // Load from a YAML file
/// let config = BrdnetConfig::from_file("config.yaml")?;
/// config.validate()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrdnetConfig {
    /// Path to pretrained weights (safetensors). Loaded before training.
    #[serde(default)]
    pub pretrained: Option<String>,

    /// Directory for checkpoints and run state.
    #[serde(default = "default_save_dir")]
    pub save_dir: String,

    /// Compute device: "cpu" or "cuda:N". Falls back to CPU when unavailable.
    #[serde(default = "default_device")]
    pub device: String,

    /// Random seed for shuffling and validation crops.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Dataset configuration.
    #[serde(default)]
    pub data: DataConfig,

    /// Model architecture settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Training hyperparameters.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Plateau scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_save_dir() -> String {
    "./ckpt".into()
}

fn default_device() -> String {
    "cpu".into()
}

fn default_seed() -> u64 {
    42
}

impl Default for BrdnetConfig {
    fn default() -> Self {
        Self {
            pretrained: None,
            save_dir: default_save_dir(),
            device: default_device(),
            seed: default_seed(),
            data: DataConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Dataset configuration.
///
/// The effective training batch is `patch_n * batch_size` patches: each index
/// entry contributes `patch_n` aligned random crops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Index file listing training image pairs (`noisy clean` per line).
    #[serde(default = "default_train_path")]
    pub train_path: String,

    /// Index file listing validation image pairs.
    #[serde(default = "default_val_path")]
    pub val_path: String,

    /// Number of patches cropped from each image pair.
    #[serde(default = "default_patch_n")]
    pub patch_n: usize,

    /// Side length of a square patch, in pixels.
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,

    /// Loader worker count. Accepted for interface parity; loading is
    /// synchronous, so the value is logged and otherwise unused.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

fn default_train_path() -> String {
    "data/image_path/train.txt".into()
}
fn default_val_path() -> String {
    "data/image_path/val.txt".into()
}
fn default_patch_n() -> usize {
    10
}
fn default_patch_size() -> usize {
    50
}
fn default_num_workers() -> usize {
    2
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_path: default_train_path(),
            val_path: default_val_path(),
            patch_n: default_patch_n(),
            patch_size: default_patch_size(),
            num_workers: default_num_workers(),
        }
    }
}

/// Model architecture settings.
///
/// Defaults match the published BRDNet layout (64 features, 16-layer
/// branches); tests shrink these to keep runs fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Feature maps per hidden conv layer.
    #[serde(default = "default_features")]
    pub features: usize,

    /// Conv layers in the plain branch (first and last included).
    #[serde(default = "default_upper_depth")]
    pub upper_depth: usize,

    /// Conv layers in the dilated branch (first and last included).
    #[serde(default = "default_lower_depth")]
    pub lower_depth: usize,
}

fn default_features() -> usize {
    64
}
fn default_upper_depth() -> usize {
    16
}
fn default_lower_depth() -> usize {
    16
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            features: default_features(),
            upper_depth: default_upper_depth(),
            lower_depth: default_lower_depth(),
        }
    }
}

impl ModelConfig {
    /// Small configuration for unit tests.
    #[must_use]
    pub fn test() -> Self {
        Self {
            features: 4,
            upper_depth: 3,
            lower_depth: 4,
        }
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs.
    #[serde(default = "default_epochs")]
    pub num_epochs: usize,

    /// Image pairs consumed per training step.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Initial learning rate.
    #[serde(default = "default_lr")]
    pub learning_rate: f64,

    /// Log running loss every N batches.
    #[serde(default = "default_print_iters")]
    pub print_iters: usize,

    /// Save a periodic checkpoint every N epochs.
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,
}

fn default_epochs() -> usize {
    50
}
fn default_batch_size() -> usize {
    16
}
fn default_lr() -> f64 {
    1e-3
}
fn default_print_iters() -> usize {
    20
}
fn default_save_interval() -> usize {
    1
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_lr(),
            print_iters: default_print_iters(),
            save_interval: default_save_interval(),
        }
    }
}

/// Plateau scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Multiplicative factor applied to the lr on reduction.
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Stagnant epochs tolerated before reducing.
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Lower bound for the learning rate.
    #[serde(default = "default_min_lr")]
    pub min_lr: f64,
}

fn default_factor() -> f64 {
    0.3
}
fn default_patience() -> usize {
    6
}
fn default_min_lr() -> f64 {
    1e-7
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            patience: default_patience(),
            min_lr: default_min_lr(),
        }
    }
}

impl BrdnetConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`BrdnetError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.save_dir.is_empty() {
            return Err(BrdnetError::Config("save_dir is required".into()));
        }
        if self.data.train_path.is_empty() {
            return Err(BrdnetError::Config("data.train_path is required".into()));
        }
        if self.data.val_path.is_empty() {
            return Err(BrdnetError::Config("data.val_path is required".into()));
        }
        if self.data.patch_n == 0 {
            return Err(BrdnetError::Config("data.patch_n must be > 0".into()));
        }
        if self.data.patch_size == 0 {
            return Err(BrdnetError::Config("data.patch_size must be > 0".into()));
        }
        if self.model.features == 0 {
            return Err(BrdnetError::Config("model.features must be > 0".into()));
        }
        if self.model.upper_depth < 3 {
            return Err(BrdnetError::Config("model.upper_depth must be >= 3".into()));
        }
        if self.model.lower_depth < 4 {
            return Err(BrdnetError::Config("model.lower_depth must be >= 4".into()));
        }
        if self.training.num_epochs == 0 {
            return Err(BrdnetError::Config("training.num_epochs must be > 0".into()));
        }
        if self.training.batch_size == 0 {
            return Err(BrdnetError::Config("training.batch_size must be > 0".into()));
        }
        if self.training.learning_rate <= 0.0 {
            return Err(BrdnetError::Config(
                "training.learning_rate must be > 0".into(),
            ));
        }
        if self.training.print_iters == 0 {
            return Err(BrdnetError::Config(
                "training.print_iters must be > 0".into(),
            ));
        }
        if self.training.save_interval == 0 {
            return Err(BrdnetError::Config(
                "training.save_interval must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.scheduler.factor) || self.scheduler.factor == 0.0 {
            return Err(BrdnetError::Config(
                "scheduler.factor must be in (0, 1)".into(),
            ));
        }
        if self.scheduler.min_lr < 0.0 {
            return Err(BrdnetError::Config("scheduler.min_lr must be >= 0".into()));
        }
        Ok(())
    }
}
