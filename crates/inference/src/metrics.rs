//! Performance counters reported to the host application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of the last generation, keyed the way host apps read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Wall-clock seconds of the last `generate` call.
    pub last_inference_time: f64,
    /// Generated tokens divided by `last_inference_time`.
    pub tokens_per_second: f64,
    /// Context window the model is driven with.
    pub max_sequence_length: usize,
    pub model_loaded: bool,
    pub last_generated_tokens: usize,
    /// Device label of the resident model, empty when idle.
    pub backend: String,
}

impl PerformanceMetrics {
    pub fn record_generation(&mut self, generated: usize, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        self.last_inference_time = secs;
        self.last_generated_tokens = generated;
        self.tokens_per_second = if secs > 0.0 {
            generated as f64 / secs
        } else {
            0.0
        };
    }

    /// A bare forward pass: only the timing changes.
    pub fn record_inference(&mut self, elapsed: Duration) {
        self.last_inference_time = elapsed.as_secs_f64();
    }

    /// Zero the per-generation counters; load state and window stay.
    pub fn reset_counters(&mut self) {
        self.last_inference_time = 0.0;
        self.tokens_per_second = 0.0;
        self.last_generated_tokens = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_host_keys() {
        let mut metrics = PerformanceMetrics {
            max_sequence_length: 128,
            model_loaded: true,
            backend: "cpu".into(),
            ..Default::default()
        };
        metrics.record_generation(10, Duration::from_millis(500));
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["lastInferenceTime"], 0.5);
        assert_eq!(json["tokensPerSecond"], 20.0);
        assert_eq!(json["maxSequenceLength"], 128);
        assert_eq!(json["modelLoaded"], true);
        assert_eq!(json["lastGeneratedTokens"], 10);
        assert_eq!(json["backend"], "cpu");
    }

    #[test]
    fn reset_keeps_load_state() {
        let mut metrics = PerformanceMetrics {
            model_loaded: true,
            max_sequence_length: 128,
            ..Default::default()
        };
        metrics.record_generation(4, Duration::from_secs(2));
        metrics.reset_counters();
        assert_eq!(metrics.tokens_per_second, 0.0);
        assert_eq!(metrics.last_generated_tokens, 0);
        assert!(metrics.model_loaded);
        assert_eq!(metrics.max_sequence_length, 128);

        metrics.record_generation(3, Duration::ZERO);
        assert_eq!(metrics.tokens_per_second, 0.0);
    }

    #[test]
    fn forward_pass_only_updates_timing() {
        let mut metrics = PerformanceMetrics::default();
        metrics.record_generation(8, Duration::from_secs(2));
        metrics.record_inference(Duration::from_millis(250));
        assert_eq!(metrics.last_inference_time, 0.25);
        assert_eq!(metrics.last_generated_tokens, 8);
        assert_eq!(metrics.tokens_per_second, 4.0);
    }
}
