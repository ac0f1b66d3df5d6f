//! Token lifecycle management with single-flight exchanges and store persistence.
//!
//! [`TokenManager`] owns the app's [`Credentials`]. Every mutation bumps a generation counter, so a
//! caller that saw generation `n` rejected by upstream can ask for a refresh "of generation `n`".
//! After acquiring the exchange guard it compares generations and reuses the result when another
//! caller already rotated the pair. Token endpoint calls share the executor's rate limiter and
//! backoff policy.
//!
//! The store keeps one record per authorized user. After a refresh the manager saves the rotated
//! record and deletes the one it replaced; adopting another user's pair leaves existing records
//! alone.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenPair, TokenSecret, TokenState},
	oauth::OAuth2Facade,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	pace::{BackoffPolicy, RateLimiter},
	store::{ConfigStore, StoreError},
};

/// Bearer token handed to one protected call.
#[derive(Clone, Debug)]
pub struct AccessGrant {
	/// Access token to attach as `Authorization: Bearer`.
	pub token: TokenSecret,
	/// Credential generation the token belongs to.
	pub generation: u64,
}

#[derive(Clone, Copy)]
enum Grant<'a> {
	AuthorizationCode(&'a str),
	RefreshToken(&'a str),
}
impl Grant<'_> {
	const fn stage(self) -> &'static str {
		match self {
			Grant::AuthorizationCode(_) => "exchange_code",
			Grant::RefreshToken(_) => "exchange_refresh_token",
		}
	}
}

#[derive(Debug)]
struct TokenInner {
	credentials: Credentials,
	authenticating: bool,
	generation: u64,
	dirty: bool,
	loaded: bool,
	// Access token of the store record that mirrors `credentials`.
	persisted: Option<TokenSecret>,
}

/// Resets the `Authenticating` flag when an exchange finishes or its future is dropped.
struct ExchangeFlag<'a>(&'a Mutex<TokenInner>);
impl Drop for ExchangeFlag<'_> {
	fn drop(&mut self) {
		self.0.lock().authenticating = false;
	}
}

/// Owns the token pair and drives the Unauthenticated/Authenticating/Authenticated machine.
pub struct TokenManager {
	inner: Mutex<TokenInner>,
	exchange_guard: AsyncMutex<()>,
	store: Arc<dyn ConfigStore>,
	facade: Arc<dyn OAuth2Facade>,
	limiter: Arc<RateLimiter>,
	backoff: BackoffPolicy,
	metrics: RefreshMetrics,
}
impl TokenManager {
	pub(crate) fn new(
		credentials: Credentials,
		store: Arc<dyn ConfigStore>,
		facade: Arc<dyn OAuth2Facade>,
		limiter: Arc<RateLimiter>,
		backoff: BackoffPolicy,
	) -> Self {
		Self {
			inner: Mutex::new(TokenInner {
				persisted: credentials.access_token.clone(),
				credentials,
				authenticating: false,
				generation: 0,
				dirty: false,
				loaded: false,
			}),
			exchange_guard: AsyncMutex::new(()),
			store,
			facade,
			limiter,
			backoff,
			metrics: RefreshMetrics::default(),
		}
	}

	/// Current lifecycle state.
	pub fn state(&self) -> TokenState {
		let inner = self.inner.lock();

		if inner.authenticating { TokenState::Authenticating } else { inner.credentials.state() }
	}

	/// Snapshot of the current credentials.
	pub fn credentials(&self) -> Credentials {
		self.inner.lock().credentials.clone()
	}

	/// Generation counter, bumped on every token mutation.
	pub fn generation(&self) -> u64 {
		self.inner.lock().generation
	}

	/// Returns `true` when the last persist attempt failed.
	pub fn has_unsaved_changes(&self) -> bool {
		self.inner.lock().dirty
	}

	/// Refresh exchange counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Adopts the stored token pair for this app when no token is held in memory.
	///
	/// Returns `true` if stored tokens were adopted. Runs lazily before the first protected call.
	pub async fn load(&self) -> Result<bool> {
		let _exchange = self.exchange_guard.lock().await;
		let app_name = self.inner.lock().credentials.app_name.clone();
		let stored = self.store.load(&app_name).await?;
		let mut inner = self.inner.lock();

		inner.loaded = true;

		let Some(stored) = stored else {
			return Ok(false);
		};

		if inner.credentials.access_token.is_some()
			|| stored.access_token.is_none()
			|| !stored.same_app(&inner.credentials)
		{
			return Ok(false);
		}

		inner.credentials.adopt_tokens(stored);
		inner.persisted = inner.credentials.access_token.clone();
		inner.generation += 1;

		tracing::debug!(app_name = %app_name, "Adopted stored credentials.");

		Ok(true)
	}

	/// Exchanges an authorization code for a token pair and persists it.
	///
	/// A rejected code surfaces [`Error::InvalidGrant`] and leaves the previous state intact.
	pub async fn authenticate(&self, code: &str) -> Result<()> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "authenticate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let _exchange = self.exchange_guard.lock().await;
				let pair = {
					let _flag = self.begin_exchange();

					self.exchange(Grant::AuthorizationCode(code)).await?
				};

				{
					let mut inner = self.inner.lock();

					inner.credentials.apply(pair);
					inner.credentials.auth_code = Some(code.to_owned());
					inner.generation += 1;
					inner.loaded = true;
					// A fresh code belongs to a new record.
					inner.persisted = None;
				}

				tracing::info!("Exchanged authorization code for a token pair.");

				self.persist().await;

				Ok(())
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	/// Returns a usable access token, refreshing first when it is expired or its expiry is unknown.
	pub async fn access(&self) -> Result<AccessGrant> {
		self.ensure_loaded().await;

		let (grant, expired) = {
			let inner = self.inner.lock();
			let Some(token) = inner.credentials.access_token.clone() else {
				return Err(Error::AuthRequired);
			};

			(
				AccessGrant { token, generation: inner.generation },
				inner.credentials.is_expired_at(OffsetDateTime::now_utc()),
			)
		};

		if !expired {
			return Ok(grant);
		}

		tracing::debug!("Access token expired; refreshing before use.");

		self.refresh_stale(grant.generation).await
	}

	/// Forces a refresh-token exchange for the current generation.
	pub async fn refresh(&self) -> Result<AccessGrant> {
		self.ensure_loaded().await;

		let generation = self.generation();

		self.refresh_stale(generation).await
	}

	/// Refreshes the pair if it is still at `seen_generation`; otherwise reuses the newer pair.
	pub(crate) async fn refresh_stale(&self, seen_generation: u64) -> Result<AccessGrant> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_stale");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_stale_inner(seen_generation)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn refresh_stale_inner(&self, seen_generation: u64) -> Result<AccessGrant> {
		let _exchange = self.exchange_guard.lock().await;
		let (refresh_token, cleared) = {
			let mut inner = self.inner.lock();

			if inner.generation != seen_generation {
				tracing::debug!(
					seen_generation,
					current_generation = inner.generation,
					"Reusing the token pair rotated by a concurrent caller."
				);

				return match inner.credentials.access_token.clone() {
					Some(token) => {
						self.metrics.record_reuse();

						Ok(AccessGrant { token, generation: inner.generation })
					},
					None => Err(Error::AuthExpired {
						reason: "token pair was revoked by a concurrent refresh".into(),
					}),
				};
			}

			let refresh_token = inner.credentials.refresh_token.clone();
			let cleared = refresh_token.is_none() && inner.credentials.access_token.is_some();

			if cleared {
				inner.credentials.clear_tokens();
				inner.generation += 1;
			}

			(refresh_token, cleared)
		};
		let Some(refresh_token) = refresh_token else {
			if cleared {
				self.persist().await;
			}

			return Err(Error::AuthExpired { reason: "no refresh token is available".into() });
		};

		self.metrics.record_attempt();

		let outcome = {
			let _flag = self.begin_exchange();

			self.exchange(Grant::RefreshToken(refresh_token.expose())).await
		};

		match outcome {
			Ok(pair) => {
				let token = pair.access_token.clone();
				let grant = {
					let mut inner = self.inner.lock();

					inner.credentials.apply(pair);
					inner.generation += 1;

					AccessGrant { token, generation: inner.generation }
				};

				self.metrics.record_success();

				tracing::info!(generation = grant.generation, "Refreshed the access token.");

				self.persist().await;

				Ok(grant)
			},
			Err(Error::InvalidGrant { reason }) => {
				self.metrics.record_failure();

				{
					let mut inner = self.inner.lock();

					inner.credentials.clear_tokens();
					inner.generation += 1;
				}

				tracing::warn!(reason = %reason, "Refresh token was rejected; credentials cleared.");

				self.persist().await;

				Err(Error::AuthExpired { reason })
			},
			Err(e) => {
				self.metrics.record_failure();

				Err(e)
			},
		}
	}

	/// Adopts the token pair of `source` and persists it as its own record.
	///
	/// Waits for any exchange in flight, so the adopted pair is never overwritten by a refresh that
	/// started before it.
	pub(crate) async fn adopt(&self, source: Credentials) {
		let _exchange = self.exchange_guard.lock().await;

		{
			let mut inner = self.inner.lock();

			inner.credentials.adopt_tokens(source);
			inner.generation += 1;
			inner.loaded = true;
			inner.persisted = None;
		}

		self.persist().await;
	}

	/// Retries a persist that failed earlier.
	pub async fn flush(&self) -> Result<()> {
		if !self.inner.lock().dirty {
			return Ok(());
		}

		self.save().await
	}

	/// Writes the current credentials to the store, surfacing storage failures.
	pub(crate) async fn save(&self) -> Result<()> {
		let _exchange = self.exchange_guard.lock().await;

		Ok(self.write_back().await?)
	}

	async fn ensure_loaded(&self) {
		if self.inner.lock().loaded {
			return;
		}
		if let Err(e) = self.load().await {
			tracing::warn!(error = %e, "Failed to load stored credentials.");
		}
	}

	async fn persist(&self) {
		if let Err(e) = self.write_back().await {
			tracing::warn!(error = %e, "Failed to persist credentials; will retry on release.");
		}
	}

	// Callers hold the exchange guard.
	async fn write_back(&self) -> Result<(), StoreError> {
		let (snapshot, replaced) = {
			let inner = self.inner.lock();

			(inner.credentials.clone(), inner.persisted.clone())
		};
		let app_name = snapshot.app_name.clone();
		let current = snapshot.access_token.clone();
		let replaced = replaced.filter(|token| Some(token) != current.as_ref());
		let result = async {
			if current.is_some() {
				self.store.save(snapshot).await?;
			}
			if let Some(replaced) = &replaced {
				self.store.delete_token(&app_name, replaced.expose()).await?;
			}

			Ok::<_, StoreError>(())
		}
		.await;
		let mut inner = self.inner.lock();

		match &result {
			Ok(()) => {
				inner.dirty = false;
				inner.persisted = current;
			},
			Err(_) => inner.dirty = true,
		}

		result
	}

	async fn exchange(&self, grant: Grant<'_>) -> Result<TokenPair> {
		let facade = &*self.facade;
		let limiter = &*self.limiter;

		self.backoff
			.run(grant.stage(), move |_| async move {
				limiter.acquire().await;

				match grant {
					Grant::AuthorizationCode(code) => facade.exchange_code(code).await,
					Grant::RefreshToken(token) => facade.refresh_token(token).await,
				}
			})
			.await
	}

	fn begin_exchange(&self) -> ExchangeFlag<'_> {
		self.inner.lock().authenticating = true;

		ExchangeFlag(&self.inner)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.inner.lock();

		f.debug_struct("TokenManager")
			.field("app_name", &inner.credentials.app_name)
			.field("authenticating", &inner.authenticating)
			.field("generation", &inner.generation)
			.field("dirty", &inner.dirty)
			.finish()
	}
}
