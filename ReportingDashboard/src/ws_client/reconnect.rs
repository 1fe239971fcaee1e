// ReportingDashboard/src/ws_client/reconnect.rs

//! 重连退避策略。
//!
//! 第 `n` 次连续失败后的等待时间为 `min(base * factor^n, max)`，再叠加
//! `±jitter` 比例的随机抖动，避免大量仪表盘在后端恢复时同时重连。
//! `ReconnectPolicy::fixed` 给出固定间隔、无抖动的策略。

use rand::Rng;
use std::time::Duration;

/// 任何一次重连等待的上限，配置中更大的值会被截断。
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 2.0, 0.1)
    }
}

impl ReconnectPolicy {
    /// 创建策略。`backoff_factor` 小于 1 时按 1 处理，`jitter_factor` 被限制在 `[0, 1]`，
    /// 两个延迟都截断到 `MAX_RECONNECT_DELAY`，`max_delay` 小于 `base_delay` 时取 `base_delay`。
    pub fn new(base_delay: Duration, max_delay: Duration, backoff_factor: f64, jitter_factor: f64) -> Self {
        let backoff_factor = if backoff_factor.is_finite() { backoff_factor.max(1.0) } else { 1.0 };
        let jitter_factor = if jitter_factor.is_finite() { jitter_factor.clamp(0.0, 1.0) } else { 0.0 };
        let base_delay = base_delay.min(MAX_RECONNECT_DELAY);
        Self {
            base_delay,
            max_delay: max_delay.min(MAX_RECONNECT_DELAY).max(base_delay),
            backoff_factor,
            jitter_factor,
        }
    }

    /// 固定间隔重连。
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0, 0.0)
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// 不含抖动的延迟。`attempt` 从 0 开始计数 (0 = 第一次重连)。
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.max_delay)
    }

    /// 第 `attempt` 次重连前应等待的时间。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter_factor <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let spread: f64 = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        Duration::try_from_secs_f64((nominal.as_secs_f64() * (1.0 + spread)).max(0.0)).unwrap_or(nominal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_doubles_until_cap() {
        let policy = ReconnectPolicy::default();
        let nominal: Vec<u64> = (0..6).map(|n| policy.nominal_delay(n).as_secs()).collect();
        assert_eq!(nominal, vec![5, 10, 20, 40, 60, 60]);
        assert_eq!(policy.nominal_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::default();
        for _ in 0..200 {
            let delay = policy.delay_for_attempt(1).as_secs_f64();
            assert!((9.0..=11.0).contains(&delay), "抖动后的延迟越界: {}", delay);
        }
    }

    #[test]
    fn test_fixed_policy_is_constant() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(5));
        for attempt in [0, 1, 7, 100] {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_out_of_range_parameters_are_normalised() {
        let policy = ReconnectPolicy::new(Duration::from_secs(10), Duration::from_secs(1), 0.5, 3.0);
        assert_eq!(policy.max_delay(), Duration::from_secs(10));
        assert_eq!(policy.nominal_delay(3), Duration::from_secs(10));
        let jittered = policy.delay_for_attempt(0).as_secs_f64();
        assert!((0.0..=20.0).contains(&jittered));
    }

    #[test]
    fn test_huge_configured_cap_is_clamped() {
        let policy = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(u64::MAX), 2.0, 0.1);
        assert_eq!(policy.max_delay(), MAX_RECONNECT_DELAY);
        for attempt in [10, 80, u32::MAX] {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay <= MAX_RECONNECT_DELAY.mul_f64(1.1), "第 {} 次的延迟越界: {:?}", attempt, delay);
        }

        let huge_base = ReconnectPolicy::new(Duration::from_secs(u64::MAX), Duration::from_secs(u64::MAX), 1.0, 0.0);
        assert_eq!(huge_base.delay_for_attempt(3), MAX_RECONNECT_DELAY);
    }
}
