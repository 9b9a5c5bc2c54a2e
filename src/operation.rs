//! Waiting on long-running operations.
//!
//! `SetAccessBindings` and `UpdateAccessBindings` return an operation
//! immediately; the bindings are only in effect once the operation reports
//! `done`. [`OperationWaiter`] polls until then.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{IamError, Result};
use crate::generated::{operation, Operation};

/// Source of operation status, normally the operation service.
#[async_trait::async_trait]
pub trait OperationPoller: Send + Sync {
    /// Fetch the current state of operation `id`.
    async fn get_operation(&self, id: &str) -> Result<Operation>;
}

/// Polls an operation until it finishes or the deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct OperationWaiter {
    poll_interval: Duration,
    timeout: Duration,
}

impl OperationWaiter {
    /// Create a waiter.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Wait for `op` to finish and turn its error status into an [`IamError`].
    ///
    /// NOT_FOUND becomes [`IamError::NotFound`]; any other code is kept as
    /// [`IamError::Operation`].
    #[instrument(skip_all, fields(operation = %op.id))]
    pub async fn wait(&self, poller: &dyn OperationPoller, op: Operation) -> Result<()> {
        let id = op.id.clone();
        let finished = tokio::time::timeout(self.timeout, async {
            let mut op = op;
            while !op.done {
                tokio::time::sleep(self.poll_interval).await;
                op = poller.get_operation(&op.id).await?;
                debug!(done = op.done, "Polled operation");
            }
            Ok::<_, IamError>(op)
        })
        .await
        .map_err(|_| {
            IamError::DeadlineExceeded(format!(
                "operation {} did not finish within {:?}",
                id, self.timeout
            ))
        })??;

        match finished.result {
            Some(operation::Result::Error(status)) => {
                let code = tonic::Code::from(status.code);
                if code == tonic::Code::NotFound {
                    Err(IamError::NotFound(status.message))
                } else {
                    Err(IamError::Operation {
                        id,
                        code: status.code,
                        message: status.message,
                    })
                }
            },
            _ => Ok(()),
        }
    }
}
