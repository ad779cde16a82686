//! 重试策略
//!
//! 纯函数形式的退避计算与错误分类，外加一个与任务队列无关的通用重试执行器。
//! 任务生命周期服务在失败重排时使用 [`calculate_delay`]，调用远程依赖的代码
//! 可以使用 [`execute_with_retry`] / [`execute_with_conditional_retry`]。

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 重试策略配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避底数
    pub exponential_base: f64,
    /// 是否添加 ±15% 的随机抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_delay_ms == 0 {
            return Err(anyhow::anyhow!("基础重试延迟必须大于0"));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(anyhow::anyhow!("最大重试延迟不能小于基础延迟"));
        }

        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            return Err(anyhow::anyhow!("指数退避底数必须是不小于1的有限数"));
        }

        Ok(())
    }

    /// 关闭抖动，便于得到确定的延迟
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// 被视为瞬时故障的错误特征（小写匹配）
const RETRYABLE_PATTERNS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "etimedout",
    "enotfound",
    "eai_again",
    "connection refused",
    "connection reset",
    "socket hang up",
    "timeout",
    "timed out",
    "network",
    "temporary",
    "temporarily",
    "unavailable",
];

/// 计算第 `attempt_number` 次重试前的等待时间（毫秒）
///
/// `base * exponential_base^attempt` 并以 `max_delay_ms` 封顶；启用抖动时结果落在
/// 封顶值的 85%-115% 之间。
pub fn calculate_delay(attempt_number: u32, config: &RetryConfig) -> u64 {
    let exponent = i32::try_from(attempt_number).unwrap_or(i32::MAX);
    let exponential_delay = config.base_delay_ms as f64 * config.exponential_base.powi(exponent);
    let capped_delay = exponential_delay.min(config.max_delay_ms as f64);

    let final_delay = if config.jitter {
        capped_delay * 0.85 + rand::random::<f64>() * capped_delay * 0.3
    } else {
        capped_delay
    };

    final_delay.round() as u64
}

/// 判断错误是否属于可重试的瞬时故障
///
/// 连接被拒绝、超时、DNS 解析失败以及 network / temporary / unavailable 等描述
/// 返回 true；校验失败、认证失败等其它错误一律不可重试。
pub fn is_retryable_error<E: Display + ?Sized>(error: &E) -> bool {
    let message = error.to_string().to_lowercase();
    RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// 通用重试执行结果
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    /// 实际调用次数
    pub attempts: u32,
    pub total_time: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn total_time_ms(&self) -> u128 {
        self.total_time.as_millis()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// 执行操作，失败后按退避策略重试，最多重试 `max_retries` 次
///
/// 最后一次尝试失败后不再等待，直接返回最后的错误。
pub async fn execute_with_retry<T, E, F, Fut>(operation: F, config: &RetryConfig) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_with_retry(operation, config, |_| true).await
}

/// 与 [`execute_with_retry`] 相同，但遇到不可重试的错误时立即返回
pub async fn execute_with_conditional_retry<T, E, F, Fut>(
    operation: F,
    config: &RetryConfig,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_with_retry(operation, config, |e: &E| is_retryable_error(e)).await
}

async fn run_with_retry<T, E, F, Fut, P>(
    mut operation: F,
    config: &RetryConfig,
    should_retry: P,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let start = Instant::now();
    let max_attempts = config.max_retries.saturating_add(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("操作在第 {} 次尝试后成功", attempt);
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    total_time: start.elapsed(),
                };
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!("错误不可重试，立即返回: {}", e);
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                        total_time: start.elapsed(),
                    };
                }

                if attempt >= max_attempts {
                    warn!("操作在 {} 次尝试后仍然失败: {}", attempt, e);
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                        total_time: start.elapsed(),
                    };
                }

                let delay = calculate_delay(attempt - 1, config);
                warn!(
                    "操作第 {}/{} 次尝试失败: {}，{}ms 后重试",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert_eq!(config.exponential_base, 2.0);
        assert!(config.jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut config = RetryConfig::default();
        config.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = RetryConfig::default();
        config.exponential_base = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calculate_delay_without_jitter() {
        let config = RetryConfig::default().without_jitter();
        assert_eq!(calculate_delay(0, &config), 1000);
        assert_eq!(calculate_delay(1, &config), 2000);
        assert_eq!(calculate_delay(2, &config), 4000);
        assert_eq!(calculate_delay(5, &config), 32_000);
        // 2^6 * 1000 = 64000 超过上限
        assert_eq!(calculate_delay(6, &config), 60_000);
        assert_eq!(calculate_delay(40, &config), 60_000);
        assert_eq!(calculate_delay(u32::MAX, &config), 60_000);
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("connect ECONNREFUSED 127.0.0.1:6379"));
        assert!(is_retryable_error("request timeout after 30s"));
        assert!(is_retryable_error("Network is unreachable"));
        assert!(is_retryable_error("Service Unavailable"));
        assert!(is_retryable_error("getaddrinfo ENOTFOUND neo4j"));
        assert!(is_retryable_error("temporary failure in name resolution"));

        assert!(!is_retryable_error("Invalid input"));
        assert!(!is_retryable_error("Authentication failed"));
        assert!(!is_retryable_error("payload missing field `document_id`"));
    }

    #[tokio::test]
    async fn test_execute_with_retry_eventually_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = execute_with_retry(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("ECONNREFUSED".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            &fast_config(5),
        )
        .await;

        assert!(outcome.success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_execute_with_retry_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: RetryOutcome<(), String> = execute_with_retry(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err(format!("Invalid input #{n}"))
                }
            },
            &fast_config(3),
        )
        .await;

        assert!(!outcome.success());
        // 首次调用 + 3 次重试
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.result.unwrap_err(), "Invalid input #3");
    }

    #[tokio::test]
    async fn test_conditional_retry_fails_fast_on_non_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: RetryOutcome<(), String> = execute_with_conditional_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("Authentication failed".to_string())
                }
            },
            &fast_config(5),
        )
        .await;

        assert!(!outcome.success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conditional_retry_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: RetryOutcome<(), String> = execute_with_conditional_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("upstream unavailable".to_string())
                }
            },
            &fast_config(2),
        )
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_calls_once() {
        let outcome: RetryOutcome<(), String> =
            execute_with_retry(|| async { Err("timeout".to_string()) }, &fast_config(0)).await;
        assert_eq!(outcome.attempts, 1);
    }

    proptest! {
        #[test]
        fn prop_jittered_delay_within_band(attempt in 0u32..20, base in 1u64..5_000, max_factor in 1u64..100) {
            let config = RetryConfig {
                max_retries: 5,
                base_delay_ms: base,
                max_delay_ms: base * max_factor,
                exponential_base: 2.0,
                jitter: true,
            };
            let capped = (base as f64 * 2f64.powi(attempt as i32)).min(config.max_delay_ms as f64);
            let delay = calculate_delay(attempt, &config) as f64;
            prop_assert!(delay >= (capped * 0.85).floor());
            prop_assert!(delay <= (capped * 1.15).ceil());
        }

        #[test]
        fn prop_delay_is_exact_below_cap(attempt in 0u32..6) {
            let config = RetryConfig::default().without_jitter();
            let expected = 1000u64 * 2u64.pow(attempt);
            prop_assert_eq!(calculate_delay(attempt, &config), expected.min(60_000));
        }
    }
}
