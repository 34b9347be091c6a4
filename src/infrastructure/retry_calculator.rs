//! 재시도 계산기 모듈
//! Capped exponential backoff for transport-level retries

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use crate::infrastructure::config::RetryConfig;

/// 재시도 계산기
#[derive(Debug, Clone)]
pub struct RetryCalculator {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
    jitter_range_ms: u64,
    retry_http_codes: Vec<u16>,
}

impl RetryCalculator {
    pub fn new(
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        jitter_range_ms: u64,
    ) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            jitter_range_ms,
            retry_http_codes: Vec::new(),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            retry_http_codes: config.retry_http_codes.clone(),
            ..Self::new(
                config.max_retries,
                config.base_delay_ms,
                config.max_delay_ms,
                config.backoff_multiplier,
                config.jitter_range_ms,
            )
        }
    }

    #[must_use]
    pub fn with_retry_codes(mut self, codes: &[u16]) -> Self {
        self.retry_http_codes = codes.to_vec();
        self
    }

    /// 재시도 가능 여부 확인 (`retries_done` retries already spent)
    pub const fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_http_codes.contains(&status)
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if exponential.is_finite() {
            exponential.min(self.max_delay_ms as f64) as u64
        } else {
            self.max_delay_ms
        };
        Duration::from_millis(capped)
    }

    /// 지연 시간 계산 (Exponential Backoff + jitter)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        if self.jitter_range_ms == 0 {
            base
        } else {
            base + Duration::from_millis(fastrand::u64(0..=self.jitter_range_ms))
        }
    }
}

impl Default for RetryCalculator {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 5)]
    #[case(2, 10)]
    #[case(3, 20)]
    #[case(4, 40)]
    #[case(5, 60)]
    #[case(12, 60)]
    fn test_default_backoff_is_capped(#[case] retry: u32, #[case] expected_secs: u64) {
        let calculator = RetryCalculator::default();
        assert_eq!(calculator.delay_for(retry), Duration::from_secs(expected_secs));
    }

    #[test]
    fn test_should_retry_bounds() {
        let calculator = RetryCalculator::new(3, 10, 100, 2.0, 0);
        assert!(calculator.should_retry(0));
        assert!(calculator.should_retry(2));
        assert!(!calculator.should_retry(3));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let calculator = RetryCalculator::new(3, 100, 1000, 2.0, 50);
        for _ in 0..100 {
            let delay = calculator.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_huge_exponent_saturates_at_cap() {
        let calculator = RetryCalculator::new(3, 1000, 5000, 10.0, 0);
        assert_eq!(calculator.delay_for(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_retryable_status_codes_from_config() {
        let calculator = RetryCalculator::default();
        assert!(calculator.is_retryable_status(503));
        assert!(calculator.is_retryable_status(429));
        assert!(!calculator.is_retryable_status(404));
    }
}
