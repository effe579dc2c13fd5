//! Causal multi-head self-attention with a fused Q/K/V projection.

use candle_core::{DType, IndexOp, Result, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

use crate::config::ModelConfig;

#[derive(Debug)]
pub struct CausalSelfAttention {
    c_attn: Linear,
    c_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl CausalSelfAttention {
    pub fn new(config: &ModelConfig, head_dim: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let c_attn = linear(hidden, 3 * hidden, vb.pp("c_attn"))?;
        let c_proj = linear(hidden, hidden, vb.pp("c_proj"))?;

        Ok(Self {
            c_attn,
            c_proj,
            num_heads: config.num_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, c) = x.dims3()?;

        let qkv = self.c_attn.forward(x)?;
        let qkv = qkv.reshape((b, t, 3, self.num_heads, self.head_dim))?;
        let qkv = qkv.permute((0, 3, 1, 4, 2))?; // (b, heads, t, head_dim, 3)

        let q = qkv.i((.., .., .., .., 0))?.contiguous()?;
        let k = qkv.i((.., .., .., .., 1))?.contiguous()?;
        let v = qkv.i((.., .., .., .., 2))?.contiguous()?;

        let scores = (q.matmul(&k.t()?)? * self.scale)?;
        let scores = scores.broadcast_add(&causal_bias(t, x.device())?)?;

        let att = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let y = att.contiguous()?.matmul(&v)?;
        let y = y.transpose(1, 2)?.reshape((b, t, c))?;
        self.c_proj.forward(&y)
    }
}

/// `(1, 1, t, t)` additive mask: 0 on and below the diagonal, -1e9 above.
fn causal_bias(t: usize, device: &candle_core::Device) -> Result<Tensor> {
    let mask = Tensor::tril2(t, DType::F32, device)?.reshape((1, 1, t, t))?;
    let ones = Tensor::ones((1, 1, t, t), DType::F32, device)?;
    -1e9f64 * (&ones - &mask)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn causal_bias_blocks_future_positions() {
        let bias = causal_bias(3, &Device::Cpu).unwrap();
        let rows: Vec<Vec<f32>> = bias.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        assert_eq!(rows[0][0], 0.0);
        assert!(rows[0][1] < -1e8);
        assert_eq!(rows[2][1], 0.0);
    }

    #[test]
    fn output_keeps_input_shape() {
        let config = ModelConfig {
            hidden_size: 16,
            num_heads: 4,
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let attn = CausalSelfAttention::new(&config, 4, vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (1, 5, 16), &Device::Cpu).unwrap();
        assert_eq!(attn.forward(&x).unwrap().dims(), &[1, 5, 16]);
    }
}
