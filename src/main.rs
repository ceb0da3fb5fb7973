//! CLI entry point for brdnet-rs.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brdnet_rs::{BrdnetConfig, Result, Trainer};

#[derive(Parser)]
#[command(name = "brdnet")]
#[command(about = "Training driver for a dual-branch CT denoising network")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },
    /// Start training
    Train(TrainArgs),
    /// Generate a sample configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "config.yaml")]
        output: String,
    },
}

/// Training options. Flags override values from the config file.
#[derive(clap::Args)]
struct TrainArgs {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
    /// Index file of training pairs
    #[arg(long)]
    train_path: Option<String>,
    /// Index file of validation pairs
    #[arg(long)]
    val_path: Option<String>,
    /// Directory for checkpoints and state
    #[arg(long)]
    save_dir: Option<String>,
    /// Warm-start weights (safetensors)
    #[arg(long)]
    pretrained: Option<String>,
    /// Patches drawn per image pair
    #[arg(long)]
    patch_n: Option<usize>,
    /// Side length of a square patch
    #[arg(long)]
    patch_size: Option<usize>,
    /// Image pairs per training batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Number of training epochs
    #[arg(long)]
    num_epochs: Option<usize>,
    /// Log every N batches
    #[arg(long)]
    print_iters: Option<usize>,
    /// Save a checkpoint every N epochs
    #[arg(long)]
    save_interval: Option<usize>,
    /// Initial learning rate
    #[arg(long)]
    lr: Option<f64>,
    /// Compute device (cpu, cuda, cuda:N)
    #[arg(long)]
    device: Option<String>,
    /// Loader worker count (accepted for script compatibility)
    #[arg(long)]
    num_workers: Option<usize>,
    /// RNG seed for shuffling and patch sampling
    #[arg(long)]
    seed: Option<u64>,
}

impl TrainArgs {
    fn into_config(self) -> Result<BrdnetConfig> {
        let mut config = match &self.config {
            Some(path) => BrdnetConfig::from_file(path)?,
            None => BrdnetConfig::default(),
        };

        if let Some(v) = self.train_path {
            config.data.train_path = v;
        }
        if let Some(v) = self.val_path {
            config.data.val_path = v;
        }
        if let Some(v) = self.save_dir {
            config.save_dir = v;
        }
        if self.pretrained.is_some() {
            config.pretrained = self.pretrained;
        }
        if let Some(v) = self.patch_n {
            config.data.patch_n = v;
        }
        if let Some(v) = self.patch_size {
            config.data.patch_size = v;
        }
        if let Some(v) = self.batch_size {
            config.training.batch_size = v;
        }
        if let Some(v) = self.num_epochs {
            config.training.num_epochs = v;
        }
        if let Some(v) = self.print_iters {
            config.training.print_iters = v;
        }
        if let Some(v) = self.save_interval {
            config.training.save_interval = v;
        }
        if let Some(v) = self.lr {
            config.training.learning_rate = v;
        }
        if let Some(v) = self.device {
            config.device = v;
        }
        if let Some(v) = self.num_workers {
            config.data.num_workers = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {}", config);
            let config = BrdnetConfig::from_file(&config)?;
            config.validate()?;
            println!("✓ Configuration is valid");
            println!("  Train index: {}", config.data.train_path);
            println!("  Val index: {}", config.data.val_path);
            println!("  Save dir: {}", config.save_dir);
        }
        Commands::Train(args) => {
            let config = args.into_config()?;
            config.validate()?;

            let mut trainer = Trainer::new(config)?;
            trainer.train()?;
        }
        Commands::Init { output } => {
            let config = BrdnetConfig::default();
            config.to_file(&output)?;
            println!("✓ Configuration written to: {output}");
        }
    }

    Ok(())
}
