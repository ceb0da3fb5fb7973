//! Dual-branch residual denoising network.
//!
//! Two parallel convolutional branches each predict the noise component of
//! the input and subtract it; the branch outputs are concatenated and fused
//! by a final convolution, with one more residual connection producing the
//! denoised image.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{
    batch_norm, conv2d, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Module, ModuleT,
    VarBuilder, VarMap,
};

use crate::config::ModelConfig;
use crate::error::{BrdnetError, Result};

const BN_EPS: f64 = 1e-5;

/// Conv2d followed by optional batch norm and ReLU.
struct ConvBlock {
    conv: Conv2d,
    norm: Option<BatchNorm>,
}

impl ConvBlock {
    fn new(
        in_ch: usize,
        out_ch: usize,
        dilation: usize,
        with_norm: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: dilation,
            dilation,
            ..Default::default()
        };
        let conv = conv2d(in_ch, out_ch, 3, cfg, vb.pp("conv"))?;
        let norm = if with_norm {
            Some(batch_norm(
                out_ch,
                BatchNormConfig {
                    eps: BN_EPS,
                    ..Default::default()
                },
                vb.pp("norm"),
            )?)
        } else {
            None
        };
        Ok(Self { conv, norm })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = self.conv.forward(x)?;
        if let Some(norm) = &self.norm {
            x = norm.forward_t(&x, train)?;
        }
        Ok(x.relu()?)
    }
}

/// A branch that predicts a noise residual from a 1-channel input.
struct Branch {
    blocks: Vec<ConvBlock>,
    conv_out: Conv2d,
}

impl Branch {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = x.clone();
        for block in &self.blocks {
            h = block.forward_t(&h, train)?;
        }
        let noise = self.conv_out.forward(&h)?;
        // residual: subtract the predicted noise
        Ok((x - noise)?)
    }
}

/// The dual-branch denoising model.
///
/// Owns its [`VarMap`] so checkpoints can be saved and restored without
/// threading the parameter store through callers.
pub struct BrdNet {
    upper: Branch,
    lower: Branch,
    fuse: Conv2d,
    var_map: VarMap,
}

impl BrdNet {
    /// Build a model with freshly initialized parameters on `device`.
    ///
    /// # Errors
    ///
    /// Fails if parameter tensors cannot be allocated on the device.
    pub fn new(config: &ModelConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        Self::from_varbuilder(config, vb, var_map)
    }

    fn from_varbuilder(config: &ModelConfig, vb: VarBuilder, var_map: VarMap) -> Result<Self> {
        if config.upper_depth < 3 {
            return Err(BrdnetError::Model(format!(
                "upper_depth must be >= 3, got {}",
                config.upper_depth
            )));
        }
        if config.lower_depth < 4 {
            return Err(BrdnetError::Model(format!(
                "lower_depth must be >= 4, got {}",
                config.lower_depth
            )));
        }

        let f = config.features;

        // plain branch: conv+norm+relu stack, then a bare output conv
        let ub = vb.pp("upper");
        let mut blocks = Vec::with_capacity(config.upper_depth - 1);
        blocks.push(ConvBlock::new(1, f, 1, true, ub.pp("block_0"))?);
        for i in 1..config.upper_depth - 1 {
            blocks.push(ConvBlock::new(f, f, 1, true, ub.pp(format!("block_{i}")))?);
        }
        let conv_out = conv2d(
            f,
            1,
            3,
            Conv2dConfig {
                padding: 1,
                ..Default::default()
            },
            ub.pp("conv_out"),
        )?;
        let upper = Branch { blocks, conv_out };

        // dilated branch: two groups of dilation-2 convs separated by
        // normalized convs
        let lb = vb.pp("lower");
        let dilated = config.lower_depth - 4;
        let first = dilated.div_ceil(2);
        let second = dilated - first;

        let mut blocks = Vec::with_capacity(config.lower_depth - 1);
        let mut idx = 0usize;
        let mut push = |blocks: &mut Vec<ConvBlock>,
                        in_ch: usize,
                        dilation: usize,
                        with_norm: bool|
         -> Result<()> {
            blocks.push(ConvBlock::new(
                in_ch,
                f,
                dilation,
                with_norm,
                lb.pp(format!("block_{idx}")),
            )?);
            idx += 1;
            Ok(())
        };
        push(&mut blocks, 1, 1, true)?;
        for _ in 0..first {
            push(&mut blocks, f, 2, false)?;
        }
        push(&mut blocks, f, 1, true)?;
        for _ in 0..second {
            push(&mut blocks, f, 2, false)?;
        }
        push(&mut blocks, f, 1, true)?;
        let conv_out = conv2d(
            f,
            1,
            3,
            Conv2dConfig {
                padding: 1,
                ..Default::default()
            },
            lb.pp("conv_out"),
        )?;
        let lower = Branch { blocks, conv_out };

        let fuse = conv2d(
            2,
            1,
            3,
            Conv2dConfig {
                padding: 1,
                ..Default::default()
            },
            vb.pp("fuse"),
        )?;

        Ok(Self {
            upper,
            lower,
            fuse,
            var_map,
        })
    }

    /// Run the network on a `(batch, 1, h, w)` tensor.
    ///
    /// `train` selects batch-statistics mode for the normalization layers.
    ///
    /// # Errors
    ///
    /// Propagates tensor-operation failures, e.g. shape mismatches.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let u = self.upper.forward_t(x, train)?;
        let l = self.lower.forward_t(x, train)?;
        let cat = Tensor::cat(&[&u, &l], 1)?;
        let noise = self.fuse.forward(&cat)?;
        Ok((x - noise)?)
    }

    /// Save all parameters to a safetensors file at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.var_map.save(path)?;
        Ok(())
    }

    /// Load parameters saved by [`BrdNet::save`] into this model.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or its tensors do not match the
    /// model's shapes.
    pub fn load_pretrained<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.var_map.load(path)?;
        Ok(())
    }

    /// The parameter store backing this model.
    #[must_use]
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    /// Total number of parameter elements, running statistics included.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.var_map
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> (BrdNet, Device) {
        let device = Device::Cpu;
        let model = BrdNet::new(&ModelConfig::test(), &device).unwrap();
        (model, device)
    }

    #[test]
    fn test_forward_preserves_shape() {
        let (model, device) = tiny_model();
        let x = Tensor::zeros((2, 1, 8, 8), DType::F32, &device).unwrap();
        let y = model.forward_t(&x, true).unwrap();
        assert_eq!(y.dims(), &[2, 1, 8, 8]);
    }

    #[test]
    fn test_forward_eval_mode() {
        let (model, device) = tiny_model();
        let x = Tensor::rand(0.0f32, 1.0, (1, 1, 8, 8), &device).unwrap();
        let y = model.forward_t(&x, false).unwrap();
        assert_eq!(y.dims(), &[1, 1, 8, 8]);
        let vals = y.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(vals.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_new_rejects_shallow_depths() {
        let device = Device::Cpu;

        let mut config = ModelConfig::test();
        config.upper_depth = 2;
        assert!(BrdNet::new(&config, &device).is_err());

        let mut config = ModelConfig::test();
        config.lower_depth = 3;
        assert!(BrdNet::new(&config, &device).is_err());
    }

    #[test]
    fn test_parameter_count_nonzero() {
        let (model, _) = tiny_model();
        assert!(model.parameter_count() > 0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");
        let (model, device) = tiny_model();
        model.save(&path).unwrap();

        let mut restored = BrdNet::new(&ModelConfig::test(), &device).unwrap();
        restored.load_pretrained(&path).unwrap();

        let x = Tensor::rand(0.0f32, 1.0, (1, 1, 8, 8), &device).unwrap();
        let a = model.forward_t(&x, false).unwrap();
        let b = restored.forward_t(&x, false).unwrap();
        let a = a.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = b.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
