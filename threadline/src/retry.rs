use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::api::ApiResult;
use crate::logging::RETRIES;

/// Backend call sites that carry their own retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    FetchComments,
    FetchReplies,
    PostComment,
    DeleteComment,
    ToggleLike,
    ReportComment,
}

impl CallSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSite::FetchComments => "fetch_comments",
            CallSite::FetchReplies => "fetch_replies",
            CallSite::PostComment => "post_comment",
            CallSite::DeleteComment => "delete_comment",
            CallSite::ToggleLike => "toggle_like",
            CallSite::ReportComment => "report_comment",
        }
    }
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff policy for one call site
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(raw.min(self.max_backoff_ms as f64) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned.
    pub async fn run<T, F, Fut>(&self, site: CallSite, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        target: RETRIES,
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        site,
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        log::warn!(target: RETRIES, "{} gave up after {} attempts: {}", site, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Retry policies for every backend call site.
///
/// Creating a comment and toggling a like are not idempotent, so they default
/// to a single attempt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    pub fetch_comments: RetryPolicy,
    pub fetch_replies: RetryPolicy,
    pub post_comment: RetryPolicy,
    pub delete_comment: RetryPolicy,
    pub toggle_like: RetryPolicy,
    pub report_comment: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            fetch_comments: RetryPolicy::default(),
            fetch_replies: RetryPolicy::default(),
            post_comment: RetryPolicy::once(),
            delete_comment: RetryPolicy::default(),
            toggle_like: RetryPolicy::once(),
            report_comment: RetryPolicy {
                max_attempts: 2,
                ..Default::default()
            },
        }
    }
}

impl RetryPolicies {
    /// Same policy everywhere
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            fetch_comments: policy.clone(),
            fetch_replies: policy.clone(),
            post_comment: policy.clone(),
            delete_comment: policy.clone(),
            toggle_like: policy.clone(),
            report_comment: policy,
        }
    }

    pub fn for_site(&self, site: CallSite) -> &RetryPolicy {
        match site {
            CallSite::FetchComments => &self.fetch_comments,
            CallSite::FetchReplies => &self.fetch_replies,
            CallSite::PostComment => &self.post_comment,
            CallSite::DeleteComment => &self.delete_comment,
            CallSite::ToggleLike => &self.toggle_like,
            CallSite::ReportComment => &self.report_comment,
        }
    }

    pub async fn run<T, F, Fut>(&self, site: CallSite, op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        self.for_site(site).run(site, op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            multiplier: 2.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(9), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retries_retryable_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result = fast(3)
            .run(CallSite::FetchComments, || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ApiError::Api { status: 502, message: "bad gateway".to_string() })
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let attempts = AtomicU32::new(0);
        let result: ApiResult<()> = fast(5)
            .run(CallSite::DeleteComment, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::NotFound("gone".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: ApiResult<()> = fast(2)
            .run(CallSite::FetchReplies, || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::TooManyRequests("later".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_non_idempotent_sites_default_to_single_attempt() {
        let policies = RetryPolicies::default();
        assert_eq!(policies.for_site(CallSite::PostComment).max_attempts, 1);
        assert_eq!(policies.for_site(CallSite::ToggleLike).max_attempts, 1);
        assert_eq!(policies.for_site(CallSite::FetchComments).max_attempts, 3);
    }
}
