use crate::utils::error::Retryable;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// 重試策略：嘗試次數上限與指數退避
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// 每次延遲加上的隨機抖動上限
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 800,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// 不等待的策略，測試用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter_ms: 0,
        }
    }

    /// 第 `attempt` 次失敗後（從 1 起算）要等待的時間，不含抖動
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(fastrand::u64(0..=self.jitter_ms))
        }
    }
}

/// 成功結果與實際嘗試次數
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// 有上限的重試迴圈
///
/// 只有 `is_transient()` 的錯誤會重試；達到上限後回傳最後一個錯誤。
/// `Retry-After` 提示優先於計算出的延遲，但不超過 `max_delay_ms`。
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<Attempted<T>, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("✅ {} succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = match e.retry_after() {
                    Some(hint) => hint.min(policy.max_delay()),
                    None => policy.delay_for(attempt) + policy.jitter(),
                };
                tracing::warn!(
                    "🔄 {} attempt {}/{} failed: {} (retrying in {:?})",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!("❌ {} gave up after {} attempts: {}", label, attempt, e);
                } else {
                    tracing::debug!("{} failed permanently on attempt {}: {}", label, attempt, e);
                }
                return Err(e);
            }
        }
    }
}
