//! # brdnet-rs
//!
//! Training and validation driver for a dual-branch residual CNN that
//! denoises low-dose CT images.
//!
//! The model takes noisy grayscale patches, predicts the noise component in
//! two parallel convolutional branches, and fuses the branch outputs into a
//! denoised image. Training runs over an index file of noisy/clean image
//! pairs, validates once per epoch with PSNR reporting, reduces the learning
//! rate on validation-loss plateaus, and checkpoints both the best model and
//! periodic per-epoch snapshots.
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Generate a sample configuration
//! brdnet init config.yaml
//!
//! # Validate configuration
//! brdnet validate config.yaml
//!
//! # Start training
//! brdnet train --config config.yaml
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use brdnet_rs::{BrdnetConfig, Trainer};
//!
//! # fn main() -> brdnet_rs::Result<()> {
//! // Load configuration from YAML file
//! let config = BrdnetConfig::from_file("config.yaml")?;
//!
//! // Create trainer and start training
//! let mut trainer = Trainer::new(config)?;
//! trainer.train()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Building Custom Configurations
//!
//! ```rust
//! use brdnet_rs::BrdnetConfig;
//!
//! let mut config = BrdnetConfig::default();
//! config.training.num_epochs = 10;
//! config.training.learning_rate = 5e-4;
//! config.data.patch_size = 64;
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod model;
pub mod optimizer;
pub mod scheduler;
pub mod trainer;

pub use config::BrdnetConfig;
pub use error::{BrdnetError, Result};
pub use model::BrdNet;
pub use trainer::Trainer;
