//! Cancellation and the overall time budget of one CLI operation.

use crate::error::{GhcrError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;


/// Default budget for one operation.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(300);

/// Cancellation handle plus deadline shared by every network call of an
/// operation.
///
/// Cloning shares the same token and deadline.
#[derive(Debug, Clone)]
pub struct Operation {
    cancel: CancellationToken,
    deadline: Instant,
    budget: Duration,
}

impl Default for Operation {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

impl Operation {
    /// Starts an operation with a fresh token and the given budget.
    pub fn new(budget: Duration) -> Self {
        Self::with_cancel(CancellationToken::new(), budget)
    }

    /// Starts an operation bound to an existing token.
    pub fn with_cancel(cancel: CancellationToken, budget: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + budget,
            budget,
        }
    }

    /// The token that aborts this operation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the operation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `fut`, aborting at its next suspension point on cancellation
    /// or when the budget runs out.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(GhcrError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GhcrError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(GhcrError::transient(format!(
                "operation exceeded its {}s budget",
                self.budget.as_secs()
            ))),
            result = fut => result,
        }
    }

    /// Sleeps for `duration`, waking early with an error on cancellation or
    /// when the budget runs out.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
