//! Sliding-window rate limiter shared by every outbound request.

// std
use std::collections::VecDeque;
// crates.io
use tokio::time::{self, Instant};
// self
use crate::{_prelude::*, error::ConfigError};

/// One rolling window: at most `max_requests` admissions per `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
	/// Admissions allowed within the trailing window.
	pub max_requests: u32,
	/// Length of the trailing window, in milliseconds when serialized.
	#[serde(rename = "window_ms", with = "crate::pace::millis")]
	pub window: Duration,
}
impl RateWindow {
	/// Creates a window admitting `max_requests` per `window`.
	pub const fn new(max_requests: u32, window: Duration) -> Self {
		Self { max_requests, window }
	}
}

/// Rate limit configuration; every window must have room for a request to be admitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
	/// Windows enforced simultaneously.
	pub windows: Vec<RateWindow>,
}
impl RateLimitConfig {
	/// Builds a configuration from explicit windows.
	pub fn new(windows: impl IntoIterator<Item = RateWindow>) -> Self {
		Self { windows: windows.into_iter().collect() }
	}

	/// Adds another window.
	pub fn with_window(mut self, max_requests: u32, window: Duration) -> Self {
		self.windows.push(RateWindow::new(max_requests, window));

		self
	}

	/// Rejects windows that could never admit a request.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.windows.iter().any(|w| w.max_requests == 0 || w.window.is_zero()) {
			return Err(ConfigError::InvalidRateLimit);
		}

		Ok(())
	}
}
impl Default for RateLimitConfig {
	/// Published upstream limits: 5 requests per second and 90 per minute.
	fn default() -> Self {
		Self::new([
			RateWindow::new(5, Duration::from_secs(1)),
			RateWindow::new(90, Duration::from_secs(60)),
		])
	}
}

#[derive(Debug)]
struct WindowState {
	limit: RateWindow,
	hits: VecDeque<Instant>,
}
impl WindowState {
	fn prune(&mut self, now: Instant) {
		while let Some(oldest) = self.hits.front() {
			if now.saturating_duration_since(*oldest) >= self.limit.window {
				self.hits.pop_front();
			} else {
				break;
			}
		}
	}

	fn wait_time(&self, now: Instant) -> Option<Duration> {
		if self.hits.len() < self.limit.max_requests as usize {
			return None;
		}

		self.hits
			.front()
			.map(|oldest| self.limit.window.saturating_sub(now.saturating_duration_since(*oldest)))
	}
}

/// Sliding-window limiter; [`acquire`](RateLimiter::acquire) only ever delays, never fails.
///
/// Waiters are served in arrival order. A timestamp is recorded only when a slot is granted, so
/// cancelling a waiting caller consumes nothing.
#[derive(Debug)]
pub struct RateLimiter {
	windows: Mutex<Vec<WindowState>>,
	queue: AsyncMutex<()>,
}
impl RateLimiter {
	/// Builds a limiter after validating `config`.
	pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		let windows = config
			.windows
			.iter()
			.map(|limit| WindowState {
				limit: *limit,
				hits: VecDeque::with_capacity(limit.max_requests as usize),
			})
			.collect();

		Ok(Self { windows: Mutex::new(windows), queue: AsyncMutex::new(()) })
	}

	/// Waits until every window has room, then consumes one slot in each.
	pub async fn acquire(&self) {
		let _turn = self.queue.lock().await;

		loop {
			match self.try_acquire_at(Instant::now()) {
				Ok(()) => return,
				Err(wait) => {
					tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit saturated.");

					time::sleep(wait).await;
				},
			}
		}
	}

	/// Consumes a slot at `now` if every window has room; otherwise returns the required wait.
	pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
		let mut windows = self.windows.lock();
		let mut wait = None::<Duration>;

		for window in windows.iter_mut() {
			window.prune(now);

			if let Some(w) = window.wait_time(now) {
				wait = Some(wait.map_or(w, |current| current.max(w)));
			}
		}

		if let Some(wait) = wait {
			return Err(wait);
		}

		for window in windows.iter_mut() {
			window.hits.push_back(now);
		}

		Ok(())
	}

	/// Admissions currently counted in each window, in configuration order.
	pub fn in_flight_counts(&self) -> Vec<usize> {
		let now = Instant::now();
		let mut windows = self.windows.lock();

		windows
			.iter_mut()
			.map(|window| {
				window.prune(now);

				window.hits.len()
			})
			.collect()
	}
}
