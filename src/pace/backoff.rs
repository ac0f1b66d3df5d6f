//! Exponential backoff for throttled and transient failures.

// crates.io
use tokio::time;
// self
use crate::{_prelude::*, error::ConfigError};

/// Exponential backoff settings.
///
/// Delays start at `base_delay`, double per failed attempt, and never exceed `max_delay`.
/// `max_attempts` counts the first try.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
	/// Delay before the second attempt.
	#[serde(rename = "base_delay_ms", with = "crate::pace::millis")]
	pub base_delay: Duration,
	/// Upper bound for any single delay, server hints included.
	#[serde(rename = "max_delay_ms", with = "crate::pace::millis")]
	pub max_delay: Duration,
	/// Total attempts, including the first one.
	pub max_attempts: u32,
}
impl BackoffPolicy {
	/// Overrides the initial delay.
	pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
		self.base_delay = base_delay;

		self
	}

	/// Overrides the delay cap.
	pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
		self.max_delay = max_delay;

		self
	}

	/// Overrides the attempt budget.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Rejects budgets that could never send a request.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 || self.base_delay > self.max_delay {
			return Err(ConfigError::InvalidBackoff);
		}

		Ok(())
	}

	/// Computed delay after the `failed_attempt`-th failure (1-based).
	pub fn delay_for(&self, failed_attempt: u32) -> Duration {
		let exponent = failed_attempt.saturating_sub(1).min(31);

		self.base_delay.saturating_mul(1 << exponent).min(self.max_delay)
	}

	/// Starts a fresh retry state for one call.
	pub fn start(&self) -> RetryState {
		RetryState { attempt: 0, next_delay: self.delay_for(1), max_attempts: self.max_attempts }
	}

	/// Runs `op` until it succeeds, fails with a non-retryable error, or the budget is spent.
	///
	/// Exhaustion returns the last failure unchanged.
	pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut state = self.start();

		loop {
			state.attempt += 1;

			let err = match op(state.attempt).await {
				Ok(value) => return Ok(value),
				Err(err) => err,
			};
			let Some(directive) = state.on_failure(self, &err) else {
				return Err(err);
			};

			tracing::warn!(
				operation,
				attempt = state.attempt,
				max_attempts = state.max_attempts,
				delay_ms = directive.delay.as_millis() as u64,
				reason = %directive.reason,
				"Retrying after a transient failure."
			);

			time::sleep(directive.delay).await;
		}
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(60),
			max_attempts: 5,
		}
	}
}

/// Per-call retry bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
	/// Attempts made so far.
	pub attempt: u32,
	/// Computed delay to apply after the next failure.
	pub next_delay: Duration,
	/// Attempt budget.
	pub max_attempts: u32,
}
impl RetryState {
	/// Returns `true` while another attempt fits in the budget.
	pub fn can_retry(&self) -> bool {
		self.attempt < self.max_attempts
	}

	/// Classifies a failed attempt; `None` means the error must surface now.
	pub fn on_failure(&mut self, policy: &BackoffPolicy, err: &Error) -> Option<RetryDirective> {
		if !err.is_retryable() || !self.can_retry() {
			return None;
		}

		let delay = err.retry_after().map_or(self.next_delay, |hint| hint.min(policy.max_delay));

		self.next_delay = policy.delay_for(self.attempt + 1);

		Some(RetryDirective { delay, reason: err.to_string() })
	}
}

/// Advises the caller how long to wait before the next attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Delay before retrying.
	pub delay: Duration,
	/// Failure that triggered the retry.
	pub reason: String,
}
