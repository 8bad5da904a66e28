#![recursion_limit = "256"]

use burn::nn::Initializer;
use burn::nn::PaddingConfig2d;
use burn::nn::Relu;
use burn::nn::conv::Conv2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::MaxPool2d;
use burn::nn::pool::MaxPool2dConfig;
use burn::tensor::Device;
use burn::{
    config::Config,
    module::{Module, Param},
    tensor::{Tensor, TensorData, backend::Backend},
};
use safetensors::SafeTensors;
use std::f64::consts::SQRT_2;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LpipsError {
    #[error("failed to read weight file")]
    Io(#[from] std::io::Error),

    #[error("failed to parse safetensors file: {0}")]
    Parse(String),

    #[error("weight file is missing tensor {0}")]
    MissingTensor(String),

    #[error("tensor {name} has shape {got:?}, expected {expected:?}")]
    BadShape {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("tensor {0} is not float32")]
    BadDtype(String),
}

struct ConvReluConfig {
    conv: Conv2dConfig,
}

impl ConvReluConfig {
    fn new(in_channels: usize, out_channels: usize) -> Self {
        // conv3x3
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1));
        Self { conv }
    }

    fn init<B: Backend>(&self, device: &Device<B>) -> ConvRelu<B> {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        ConvRelu {
            conv: self.conv.clone().with_initializer(initializer).init(device),
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    conv: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> ConvRelu<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.relu.forward(out)
    }
}

#[derive(Config)]
struct VggBlockConfig {
    num_blocks: usize,
    in_channels: usize,
    out_channels: usize,
}

impl VggBlockConfig {
    fn init<B: Backend>(&self, device: &Device<B>) -> VggBlock<B> {
        let convs = (0..self.num_blocks)
            .map(|b| {
                ConvReluConfig::new(
                    if b == 0 {
                        self.in_channels
                    } else {
                        self.out_channels
                    },
                    self.out_channels,
                )
                .init(device)
            })
            .collect();

        VggBlock { convs }
    }
}

#[derive(Module, Debug)]
struct VggBlock<B: Backend> {
    convs: Vec<ConvRelu<B>>,
}

impl<B: Backend> VggBlock<B> {
    pub(crate) fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut cur = input;
        for conv in &self.convs {
            cur = conv.forward(cur);
        }
        cur
    }
}

/// Learned 1x1 convolution collapsing a feature difference to one channel.
#[derive(Module, Debug)]
struct LinHead<B: Backend> {
    conv: Conv2d<B>,
}

#[derive(Module, Debug)]
pub struct LpipsModel<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    heads: Vec<LinHead<B>>,
    max_pool: MaxPool2d,
}

impl<B: Backend> LpipsModel<B> {
    /// VGG feature taps, saved before each max pool.
    fn forward(&self, patches: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut fold = patches;
        let mut res = vec![];
        for block in &self.blocks {
            fold = block.forward(fold);
            res.push(fold.clone());
            fold = self.max_pool.forward(fold);
        }
        res
    }

    /// Calculate per-image lpips. Imgs are in NHWC order, 0-1 normalised.
    /// Returns one value per batch element.
    pub fn lpips(&self, imgs_a: Tensor<B, 4>, imgs_b: Tensor<B, 4>) -> Tensor<B, 1> {
        // Convert NHWC to NCHW
        let imgs_a = imgs_a.permute([0, 3, 1, 2]);
        let imgs_b = imgs_b.permute([0, 3, 1, 2]);

        let taps_a = self.forward(imgs_a * 2.0 - 1.0);
        let taps_b = self.forward(imgs_b * 2.0 - 1.0);

        let mut total: Option<Tensor<B, 1>> = None;
        for ((ta, tb), head) in taps_a.into_iter().zip(taps_b).zip(&self.heads) {
            let diff = (unit_normalize(ta) - unit_normalize(tb)).powf_scalar(2.0);
            // [n, 1, h, w] per-location distances, averaged over space.
            let dist = head.conv.forward(diff);
            let per_image = dist.mean_dim(3).mean_dim(2).squeeze_dims::<1>(&[1, 2, 3]);
            total = Some(match total {
                Some(acc) => acc + per_image,
                None => per_image,
            });
        }
        match total {
            Some(total) => total,
            None => Tensor::zeros([0], &B::Device::default()),
        }
    }

    /// Replace the random VGG features and averaging heads with trained
    /// weights from a safetensors file.
    ///
    /// Expected tensor names: `blocks.{i}.convs.{j}.conv.{weight,bias}` and
    /// `heads.{i}.conv.weight`.
    pub fn load_weights(mut self, path: &Path) -> Result<Self, LpipsError> {
        let bytes = std::fs::read(path)?;
        let store =
            SafeTensors::deserialize(&bytes).map_err(|e| LpipsError::Parse(e.to_string()))?;

        for (bi, block) in self.blocks.iter_mut().enumerate() {
            for (ci, conv_relu) in block.convs.iter_mut().enumerate() {
                let prefix = format!("blocks.{bi}.convs.{ci}.conv");
                let weight = load_tensor::<B, 4>(
                    &store,
                    &format!("{prefix}.weight"),
                    &conv_relu.conv.weight.device(),
                )?;
                check_shape(
                    &format!("{prefix}.weight"),
                    &weight,
                    conv_relu.conv.weight.shape().dims.as_slice(),
                )?;
                conv_relu.conv.weight = Param::from_tensor(weight);

                if let Some(bias) = conv_relu.conv.bias.take() {
                    let loaded = load_tensor::<B, 1>(
                        &store,
                        &format!("{prefix}.bias"),
                        &bias.device(),
                    )?;
                    check_shape(&format!("{prefix}.bias"), &loaded, bias.shape().dims.as_slice())?;
                    conv_relu.conv.bias = Some(Param::from_tensor(loaded));
                }
            }
        }

        for (hi, head) in self.heads.iter_mut().enumerate() {
            let name = format!("heads.{hi}.conv.weight");
            let weight = load_tensor::<B, 4>(&store, &name, &head.conv.weight.device())?;
            check_shape(&name, &weight, head.conv.weight.shape().dims.as_slice())?;
            head.conv.weight = Param::from_tensor(weight);
        }

        Ok(self)
    }
}

/// Scale each spatial feature vector to unit length over the channel dim.
fn unit_normalize<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 4> {
    let norm = (tensor.clone().powf_scalar(2.0).sum_dim(1) + 1e-10).sqrt();
    tensor / norm
}

fn load_tensor<B: Backend, const D: usize>(
    store: &SafeTensors,
    name: &str,
    device: &B::Device,
) -> Result<Tensor<B, D>, LpipsError> {
    let view = store
        .tensor(name)
        .map_err(|_| LpipsError::MissingTensor(name.to_owned()))?;
    if view.dtype() != safetensors::Dtype::F32 {
        return Err(LpipsError::BadDtype(name.to_owned()));
    }
    let values: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let shape: Vec<usize> = view.shape().to_vec();
    if shape.len() != D {
        return Err(LpipsError::BadShape {
            name: name.to_owned(),
            got: shape,
            expected: vec![0; D],
        });
    }
    let mut dims = [0usize; D];
    dims.copy_from_slice(&shape);
    Ok(Tensor::from_data(TensorData::new(values, dims), device))
}

fn check_shape<B: Backend, const D: usize>(
    name: &str,
    tensor: &Tensor<B, D>,
    expected: &[usize],
) -> Result<(), LpipsError> {
    let got = tensor.shape().dims.to_vec();
    if got != expected {
        return Err(LpipsError::BadShape {
            name: name.to_owned(),
            got,
            expected: expected.to_vec(),
        });
    }
    Ok(())
}

#[derive(Config)]
pub struct LpipsModelConfig {}

impl LpipsModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LpipsModel<B> {
        // VGG16 feature extractor.
        let widths = [64, 128, 256, 512, 512];
        let block1 = VggBlockConfig::new(2, 3, widths[0]).init(device);
        let block2 = VggBlockConfig::new(2, widths[0], widths[1]).init(device);
        let block3 = VggBlockConfig::new(3, widths[1], widths[2]).init(device);
        let block4 = VggBlockConfig::new(3, widths[2], widths[3]).init(device);
        let block5 = VggBlockConfig::new(3, widths[3], widths[4]).init(device);

        // Heads start as plain channel averages so an unweighted model is
        // still deterministic. Trained weights overwrite these.
        let heads = widths
            .iter()
            .map(|&channels| LinHead {
                conv: Conv2dConfig::new([channels, 1], [1, 1])
                    .with_bias(false)
                    .with_initializer(Initializer::Constant {
                        value: 1.0 / channels as f64,
                    })
                    .init(device),
            })
            .collect();

        LpipsModel {
            blocks: vec![block1, block2, block3, block4, block5],
            heads,
            max_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}
