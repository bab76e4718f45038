//! Per-request context with cancellation and deadline support

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Interrupted;

/// Context for a single credential request.
///
/// Carries the caller's display name (used as an identity hint when the
/// target builds the username), cooperative cancellation, and an optional
/// deadline that bounds connection creation and credential generation.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Display name of the authenticated caller.
    pub display_name: String,
    /// Cooperative cancellation token.
    pub cancellation: CancellationToken,
    /// Absolute deadline for the whole request.
    pub deadline: Option<Instant>,
    /// Arbitrary key-value pairs forwarded to connectors (e.g. request id).
    pub metadata: HashMap<String, String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("")
    }
}

impl RequestContext {
    /// Create a new context for the given caller.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            cancellation: CancellationToken::new(),
            deadline: None,
            metadata: HashMap::new(),
        }
    }

    /// Replace the default cancellation token with the provided one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now. A timeout too large to represent
    /// leaves the request without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Add a key-value metadata pair to the context.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Drive `fut` to completion unless the request is cancelled, the
    /// deadline passes, or `limit` elapses, whichever comes first.
    pub(crate) async fn bounded<F, T>(
        &self,
        operation: &'static str,
        limit: Option<Duration>,
        fut: F,
    ) -> std::result::Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        let budget = match (self.remaining(), limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let guarded = async {
            tokio::select! {
                biased;
                () = self.cancellation.cancelled() => Err(Interrupted::Cancelled { operation }),
                out = fut => Ok(out),
            }
        };

        match budget {
            Some(budget) => tokio::time::timeout(budget, guarded)
                .await
                .unwrap_or(Err(Interrupted::TimedOut {
                    operation,
                    elapsed: budget,
                })),
            None => guarded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_builders() {
        let ctx = RequestContext::new("token-alice")
            .with_metadata("request_id", "r-1")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.display_name, "token-alice");
        assert_eq!(ctx.metadata.get("request_id").map(String::as_str), Some("r-1"));
        assert!(ctx.remaining().is_some());
    }

    #[test]
    fn child_token_follows_parent() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new("x")
            .with_cancellation(token.child_token());
        assert!(!ctx.cancellation.is_cancelled());
        token.cancel();
        assert!(ctx.cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn bounded_completes() {
        let ctx = RequestContext::new("x");
        let out = ctx.bounded("op", None, async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let ctx = RequestContext::new("x").with_timeout(Duration::MAX);
        assert!(ctx.deadline.is_none());
        assert!(ctx.remaining().is_none());
    }

    #[tokio::test]
    async fn bounded_observes_cancellation() {
        let ctx = RequestContext::new("x");
        ctx.cancellation.cancel();
        let out = ctx
            .bounded("connect", None, std::future::pending::<()>())
            .await;
        assert_eq!(out, Err(Interrupted::Cancelled { operation: "connect" }));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_uses_tighter_budget() {
        let ctx = RequestContext::new("x")
            .with_timeout(Duration::from_secs(60));
        let out = ctx
            .bounded(
                "connect",
                Some(Duration::from_secs(2)),
                std::future::pending::<()>(),
            )
            .await;
        assert_eq!(
            out,
            Err(Interrupted::TimedOut {
                operation: "connect",
                elapsed: Duration::from_secs(2),
            })
        );
    }
}
