use serde::{Deserialize, Serialize};

/// Rolling health stats for one provider or carrier. Shared shape for both
/// `provider_health:{name}` and `carrier_health:{domain}:{carrier}` — the
/// router treats providers and carriers identically once reduced to this.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub captcha_solves: u64,
    pub avg_latency_ms: f64,
}

impl HealthSnapshot {
    /// Smoothing factor for the latency EMA. Matches the window the router
    /// uses for its latency-penalty term in the epsilon-greedy score.
    const LATENCY_ALPHA: f64 = 0.2;

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.5; // unknown provider: neutral prior, neither favored nor excluded
        }
        self.successes as f64 / self.attempts as f64
    }

    pub fn record(&mut self, success: bool, latency_ms: f64, captcha_solved: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
        if captcha_solved {
            self.captcha_solves += 1;
        }
        self.avg_latency_ms = if self.attempts == 1 {
            latency_ms
        } else {
            Self::LATENCY_ALPHA * latency_ms + (1.0 - Self::LATENCY_ALPHA) * self.avg_latency_ms
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_has_neutral_success_rate() {
        assert_eq!(HealthSnapshot::default().success_rate(), 0.5);
    }

    #[test]
    fn record_updates_rate_and_latency_ema() {
        let mut h = HealthSnapshot::default();
        h.record(true, 100.0, false);
        assert_eq!(h.attempts, 1);
        assert_eq!(h.success_rate(), 1.0);
        assert_eq!(h.avg_latency_ms, 100.0);

        h.record(false, 200.0, false);
        assert_eq!(h.attempts, 2);
        assert_eq!(h.success_rate(), 0.5);
        assert!((h.avg_latency_ms - 120.0).abs() < 1e-9);
    }
}
