//! Next-token selection: arg-max, or a temperature-scaled softmax draw
//! optionally restricted to the top-p nucleus.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use agrilm_common::{EngineError, Result, RuntimeConfig, SamplingStrategy};

/// Sampling configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub strategy: SamplingStrategy,
    pub temperature: f32,
    /// Nucleus mass kept before the draw; `1.0` keeps the full distribution.
    pub top_p: f32,
    /// Fixed seed for reproducible draws; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::Temperature,
            temperature: 0.8,
            top_p: 1.0,
            seed: None,
        }
    }
}

impl From<&RuntimeConfig> for SamplerConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            strategy: config.strategy,
            temperature: config.temperature,
            top_p: config.top_p,
            seed: config.seed,
        }
    }
}

/// Per-request replacements for the configured sampling knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingOverrides {
    /// Switches to temperature sampling; zero or below still means arg-max.
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl SamplingOverrides {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if t.is_nan() {
                return Err(EngineError::InvalidArgument("temperature is NaN".into()));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(EngineError::InvalidArgument(format!(
                    "topP must be in (0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, base: &SamplerConfig) -> SamplerConfig {
        let mut config = base.clone();
        if let Some(t) = self.temperature {
            config.strategy = SamplingStrategy::Temperature;
            config.temperature = t;
        }
        if let Some(p) = self.top_p {
            config.top_p = p;
        }
        config
    }
}

pub struct Sampler {
    config: SamplerConfig,
    rng: StdRng,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Swap the sampling knobs, keeping the random stream.
    pub fn set_config(&mut self, config: SamplerConfig) {
        self.config = config;
    }

    /// Greedy when asked for, or when the temperature is unusable
    /// (zero, negative or non-finite).
    pub fn is_greedy(&self) -> bool {
        let t = self.config.temperature;
        self.config.strategy == SamplingStrategy::Greedy || !(t.is_finite() && t > 0.0)
    }

    /// Pick one token id from a vocabulary-sized logits row.
    pub fn select_token(&mut self, logits: &[f32]) -> u32 {
        if self.is_greedy() {
            return argmax(logits);
        }
        let mut probs = softmax_with_temperature(logits, self.config.temperature);
        apply_top_p(&mut probs, self.config.top_p);
        let draw: f64 = self.rng.gen();
        sample_cumulative(&probs, draw)
    }
}

/// Index of the largest logit. Ties go to the lowest index; NaN never wins.
pub fn argmax(logits: &[f32]) -> u32 {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in logits.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i as u32).unwrap_or(0)
}

/// Temperature-scaled softmax, accumulated in `f64`.
///
/// NaN is treated as −∞. All −∞ gives a uniform distribution; any +∞
/// entries split the mass between them.
pub fn softmax_with_temperature(logits: &[f32], temperature: f32) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }
    let t = temperature as f64;
    let scaled: Vec<f64> = logits
        .iter()
        .map(|&v| if v.is_nan() { f64::NEG_INFINITY } else { v as f64 / t })
        .collect();

    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::INFINITY {
        let n = scaled.iter().filter(|v| **v == f64::INFINITY).count() as f64;
        return scaled
            .iter()
            .map(|&v| if v == f64::INFINITY { 1.0 / n } else { 0.0 })
            .collect();
    }
    if max == f64::NEG_INFINITY {
        return vec![1.0 / scaled.len() as f64; scaled.len()];
    }

    let mut probs: Vec<f64> = scaled.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = probs.iter().sum();
    for p in &mut probs {
        *p /= sum;
    }
    probs
}

/// Zero every probability outside the nucleus and renormalise the rest.
///
/// Tokens are ranked by probability (ties to the lower id). The nucleus runs
/// up to and including the first token whose running total exceeds `top_p`.
/// `top_p >= 1` leaves `probs` untouched.
pub fn apply_top_p(probs: &mut [f64], top_p: f32) {
    if probs.is_empty() || top_p.is_nan() || top_p >= 1.0 {
        return;
    }
    let limit = top_p.max(0.0) as f64;
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut cumsum = 0.0;
    let mut keep = order.len();
    for (rank, &i) in order.iter().enumerate() {
        cumsum += probs[i];
        if cumsum > limit {
            keep = rank + 1;
            break;
        }
    }

    for &i in &order[keep..] {
        probs[i] = 0.0;
    }
    let kept: f64 = order[..keep].iter().map(|&i| probs[i]).sum();
    if kept > 0.0 {
        for &i in &order[..keep] {
            probs[i] /= kept;
        }
    }
}

/// First index whose running total exceeds `draw` (in `[0, 1)`); the last
/// index absorbs rounding shortfall.
pub fn sample_cumulative(probs: &[f64], draw: f64) -> u32 {
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if cumsum > draw {
            return i as u32;
        }
    }
    probs.len().saturating_sub(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(temperature: f32) -> Sampler {
        Sampler::new(SamplerConfig {
            temperature,
            seed: Some(42),
            ..Default::default()
        })
    }

    #[test]
    fn greedy_sampling() {
        let mut sampler = Sampler::new(SamplerConfig {
            strategy: SamplingStrategy::Greedy,
            ..Default::default()
        });
        assert_eq!(sampler.select_token(&[0.1, 0.9, 0.3, 0.5]), 1);
    }

    #[test]
    fn argmax_ties_and_nan() {
        assert_eq!(argmax(&[0.5, 2.0, 2.0, 1.0]), 1);
        assert_eq!(argmax(&[f32::NAN, -1.0, -3.0]), 1);
        assert_eq!(argmax(&[]), 0);
        assert_eq!(argmax(&[f32::NEG_INFINITY, f32::NEG_INFINITY]), 0);
    }

    #[test]
    fn zero_or_bad_temperature_falls_back_to_argmax() {
        for t in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let mut sampler = seeded(t);
            assert!(sampler.is_greedy());
            assert_eq!(sampler.select_token(&[0.0, 3.0, 1.0]), 1);
        }
    }

    #[test]
    fn softmax_sums_to_one() {
        let logits: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.37).sin() * 20.0).collect();
        let sum: f64 = softmax_with_temperature(&logits, 0.8).iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_sums_to_one_for_large_vocab() {
        let logits: Vec<f32> = (0..256_000).map(|i| ((i % 97) as f32) * 0.1).collect();
        let probs = softmax_with_temperature(&logits, 0.8);
        assert_eq!(probs.len(), 256_000);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_degenerate_inputs() {
        let all_neg = softmax_with_temperature(&[f32::NEG_INFINITY; 4], 0.8);
        assert!(all_neg.iter().all(|p| (p - 0.25).abs() < 1e-12));

        let with_inf = softmax_with_temperature(&[1.0, f32::INFINITY, 3.0, f32::INFINITY], 0.8);
        assert_eq!(with_inf, vec![0.0, 0.5, 0.0, 0.5]);

        let with_nan = softmax_with_temperature(&[f32::NAN, 0.0], 1.0);
        assert_eq!(with_nan, vec![0.0, 1.0]);
    }

    #[test]
    fn cumulative_draw_boundaries() {
        let probs = [0.2, 0.3, 0.5];
        assert_eq!(sample_cumulative(&probs, 0.0), 0);
        assert_eq!(sample_cumulative(&probs, 0.2), 1);
        assert_eq!(sample_cumulative(&probs, 0.99), 2);
        assert_eq!(sample_cumulative(&[0.1, 0.1], 0.5), 1);
    }

    #[test]
    fn equal_logits_draw_uniformly() {
        let mut sampler = seeded(0.8);
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[sampler.select_token(&[1.0, 1.0, 1.0]) as usize] += 1;
        }
        let expected = 10_000.0 / 3.0;
        for c in counts {
            assert!((c as f64 - expected).abs() < expected * 0.1, "{counts:?}");
        }
    }

    #[test]
    fn top_p_keeps_the_smallest_covering_prefix() {
        let mut probs = vec![0.2, 0.5, 0.3];
        apply_top_p(&mut probs, 0.6);
        assert!((probs[1] - 0.625).abs() < 1e-12);
        assert!((probs[2] - 0.375).abs() < 1e-12);
        assert_eq!(probs[0], 0.0);

        let mut probs = vec![0.2, 0.5, 0.3];
        apply_top_p(&mut probs, 0.4);
        assert_eq!(probs, vec![0.0, 1.0, 0.0]);

        let mut probs = vec![0.2, 0.5, 0.3];
        apply_top_p(&mut probs, 1.0);
        assert_eq!(probs, vec![0.2, 0.5, 0.3]);
    }

    #[test]
    fn top_p_ties_prefer_lower_ids() {
        let mut probs = vec![0.25; 4];
        apply_top_p(&mut probs, 0.3);
        assert!((probs[0] - 0.5).abs() < 1e-12);
        assert!((probs[1] - 0.5).abs() < 1e-12);
        assert_eq!(&probs[2..], &[0.0, 0.0]);
    }

    #[test]
    fn small_top_p_only_draws_the_favourite() {
        let mut sampler = Sampler::new(SamplerConfig {
            temperature: 1.0,
            top_p: 0.5,
            seed: Some(7),
            ..Default::default()
        });
        for _ in 0..200 {
            assert_eq!(sampler.select_token(&[0.5, 3.0, 1.0]), 1);
        }
    }

    #[test]
    fn overrides_replace_configured_knobs() {
        let base = SamplerConfig {
            strategy: SamplingStrategy::Greedy,
            ..Default::default()
        };
        assert!(SamplingOverrides::default().is_empty());
        assert_eq!(SamplingOverrides::default().apply(&base).strategy, SamplingStrategy::Greedy);

        let warm = SamplingOverrides {
            temperature: Some(1.2),
            top_p: Some(0.9),
        }
        .apply(&base);
        assert_eq!(warm.strategy, SamplingStrategy::Temperature);
        assert_eq!(warm.temperature, 1.2);
        assert_eq!(warm.top_p, 0.9);

        let cold = SamplingOverrides {
            temperature: Some(0.0),
            top_p: None,
        };
        assert!(Sampler::new(cold.apply(&base)).is_greedy());
    }

    #[test]
    fn overrides_reject_bad_top_p() {
        for p in [0.0, -0.1, 1.5, f32::NAN] {
            let bad = SamplingOverrides {
                temperature: None,
                top_p: Some(p),
            };
            assert_eq!(bad.validate().unwrap_err().code(), "INVALID_ARGS");
        }
        let nan_temp = SamplingOverrides {
            temperature: Some(f32::NAN),
            top_p: None,
        };
        assert!(nan_temp.validate().is_err());
        assert!(SamplingOverrides {
            temperature: Some(0.7),
            top_p: Some(1.0)
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn same_seed_same_sequence() {
        let logits = [0.3, 1.2, 0.8, 0.1, 2.0];
        let mut a = seeded(1.0);
        let mut b = seeded(1.0);
        let xs: Vec<u32> = (0..50).map(|_| a.select_token(&logits)).collect();
        let ys: Vec<u32> = (0..50).map(|_| b.select_token(&logits)).collect();
        assert_eq!(xs, ys);
    }
}
