use burn::prelude::Backend;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, TensorData};

const C1: f32 = 0.01 * 0.01;
const C2: f32 = 0.03 * 0.03;

/// Structural similarity with a Gaussian window, computed per pixel with a
/// depthwise convolution.
pub struct Ssim<B: Backend> {
    window: Tensor<B, 4>,
    padding: usize,
    channels: usize,
}

impl<B: Backend> Ssim<B> {
    pub fn new(window_size: usize, channels: usize, device: &B::Device) -> Self {
        Self {
            window: gaussian_window(window_size, 1.5, channels, device),
            padding: window_size / 2,
            channels,
        }
    }

    fn filter(&self, img: Tensor<B, 4>) -> Tensor<B, 4> {
        conv2d(
            img,
            self.window.clone(),
            None,
            ConvOptions::new([1, 1], [self.padding, self.padding], [1, 1], self.channels),
        )
    }

    /// Per-pixel SSIM map of two HWC images in [0, 1].
    pub fn ssim(&self, img_a: Tensor<B, 3>, img_b: Tensor<B, 3>) -> Tensor<B, 3> {
        let [h, w, c] = img_a.dims();
        let x = img_a.permute([2, 0, 1]).unsqueeze_dim::<4>(0);
        let y = img_b.permute([2, 0, 1]).unsqueeze_dim::<4>(0);

        let mu_x = self.filter(x.clone());
        let mu_y = self.filter(y.clone());
        let mu_xx = mu_x.clone() * mu_x.clone();
        let mu_yy = mu_y.clone() * mu_y.clone();
        let mu_xy = mu_x * mu_y;

        let sigma_xx = self.filter(x.clone() * x.clone()) - mu_xx.clone();
        let sigma_yy = self.filter(y.clone() * y.clone()) - mu_yy.clone();
        let sigma_xy = self.filter(x * y) - mu_xy.clone();

        let numerator = (mu_xy * 2.0 + C1) * (sigma_xy * 2.0 + C2);
        let denominator = (mu_xx + mu_yy + C1) * (sigma_xx + sigma_yy + C2);
        let map = numerator / denominator;

        map.squeeze_dims::<3>(&[0]).permute([1, 2, 0]).reshape([h, w, c])
    }
}

fn gaussian_window<B: Backend>(
    size: usize,
    sigma: f32,
    channels: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let half = (size as f32 - 1.0) / 2.0;
    let gauss: Vec<f32> = (0..size)
        .map(|i| (-((i as f32 - half).powi(2)) / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f32 = gauss.iter().sum();

    let mut window = Vec::with_capacity(size * size);
    for gy in &gauss {
        for gx in &gauss {
            window.push(gy * gx / (norm * norm));
        }
    }

    Tensor::from_data(TensorData::new(window, [1, 1, size, size]), device)
        .repeat_dim(0, channels)
}
