//! 指数退避重试
//!
//! 所有数据存储调用和下游 RPC 调用共用的重试封装，只重试临时错误。

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tonic::{Code, Status};

use crate::error::DatastoreError;

/// 可判断是否为临时错误的类型
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DatastoreError {
    fn is_transient(&self) -> bool {
        DatastoreError::is_transient(self)
    }
}

impl Transient for Status {
    fn is_transient(&self) -> bool {
        matches!(
            self.code(),
            Code::Unavailable | Code::DeadlineExceeded | Code::Aborted | Code::ResourceExhausted
        )
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f32 {
    2.0
}

/// 重试策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次调用）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 首次退避时间（毫秒）
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// 退避时间上限（毫秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// 退避倍率
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// 不重试的策略
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        if self.multiplier < 1.0 {
            return Err("retry.multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }
}

/// 按策略执行异步操作，遇到临时错误时指数退避重试
///
/// 非临时错误立即返回；重试耗尽后返回最后一次的错误。
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    // backon 的 max_times 是重试次数，不含第一次调用
    let max_retries = policy.max_attempts.saturating_sub(1) as usize;

    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(policy.initial_backoff_ms))
        .with_max_delay(Duration::from_millis(policy.max_backoff_ms))
        .with_factor(policy.multiplier)
        .with_max_times(max_retries)
        .with_jitter();

    operation
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|e: &E| e.is_transient())
        .notify(|err: &E, dur: Duration| {
            tracing::debug!(
                backoff_ms = dur.as_millis() as u64,
                error = %err,
                "retrying after transient error"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(&fast_policy(5), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(DatastoreError::Transient("busy".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(5), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(DatastoreError::not_found("Action", "a1"))
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), Status> = with_retry(&fast_policy(3), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Status::unavailable("down"))
        })
        .await;

        assert_eq!(result.unwrap_err().code(), Code::Unavailable);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::none().validate().is_ok());

        let bad = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(bad.validate().is_err());

        let bad = RetryPolicy {
            initial_backoff_ms: 5_000,
            max_backoff_ms: 10,
            ..RetryPolicy::default()
        };
        assert!(bad.validate().is_err());
    }
}
