//! Command execution with optimistic concurrency retries.
//!
//! A [`Command`] reads whatever documents it needs from the store and decides
//! on a batch of writes plus an output. The [`CommandExecutor`] commits that
//! batch atomically; when a document changed underneath the command it runs
//! the whole command again against fresh state, with jittered backoff.

mod retry;

pub use retry::{MaxRetryAttempts, RetryBaseDelayMs, RetryConfig, RetryPolicy};

use crate::errors::CommandResult;
use crate::store::{DocumentStore, DocumentWrites};
use std::future::Future;
use tracing::{info, instrument, warn};

/// The outcome of a command's decision step.
#[derive(Debug)]
pub struct Decision<T> {
    /// Writes to commit atomically
    pub writes: DocumentWrites,
    /// Value returned to the caller once the writes are committed
    pub output: T,
}

impl<T> Decision<T> {
    /// A decision that commits `writes` and then yields `output`.
    pub const fn new(writes: DocumentWrites, output: T) -> Self {
        Self { writes, output }
    }
}

/// A business operation executed against a [`DocumentStore`].
///
/// `decide` must be free of side effects other than reading the store: it
/// may run several times when the executor retries after a conflict.
pub trait Command: Send + Sync {
    /// Value produced by a successful execution.
    type Output: Send;

    /// Short name used in logs and spans.
    fn name(&self) -> &'static str;

    /// Read current state and decide what to write.
    fn decide<S: DocumentStore + Sync>(
        &self,
        store: &S,
    ) -> impl Future<Output = CommandResult<Decision<Self::Output>>> + Send;
}

/// Executes commands against a document store with retry support.
#[derive(Debug, Clone)]
pub struct CommandExecutor<S> {
    store: S,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
}

impl<S> CommandExecutor<S>
where
    S: DocumentStore + Sync,
{
    /// Creates a new command executor with default retry configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_config: RetryConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the retry configuration for this executor.
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets the retry policy for this executor.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// The underlying store, for queries.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Executes a command, retrying per the configured policy.
    ///
    /// Errors the policy does not cover are returned immediately. A retryable
    /// error on the last permitted attempt is returned as-is.
    #[instrument(name = "command.execute", skip(self, command), fields(command = command.name()))]
    pub async fn execute<C>(&self, command: &C) -> CommandResult<C::Output>
    where
        C: Command,
    {
        let max_attempts = self.retry_config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.execute_once(command).await {
                Ok(output) => {
                    info!(
                        command = command.name(),
                        attempts = attempt + 1,
                        "[command.execute] command committed"
                    );
                    return Ok(output);
                }
                Err(error)
                    if attempt + 1 < max_attempts && self.retry_policy.should_retry(&error) =>
                {
                    let delay = self.retry_config.delay_for(attempt);
                    warn!(
                        command = command.name(),
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "[command.retry] retrying command after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn execute_once<C>(&self, command: &C) -> CommandResult<C::Output>
    where
        C: Command,
    {
        let Decision { writes, output } = command.decide(&self.store).await?;
        if !writes.is_empty() {
            self.store.commit(writes).await?;
        }
        Ok(output)
    }
}
