//! Long-lived client handle tying configuration, pacing, tokens, and the executor together.

// std
use std::sync::atomic::AtomicBool;
// self
use crate::{
	_prelude::*,
	auth::{AuthSession, Credentials, SessionParams, TokenState},
	config::ClientConfig,
	error::ConfigError,
	executor::Executor,
	http::{self, HttpTransport},
	oauth::{BasicFacade, OAuth2Facade},
	pace::RateLimiter,
	parse::{self, CurrentUser},
	request::{ApiRequest, ApiResponse},
	store::ConfigStore,
	tokens::TokenManager,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = Client<ReqwestHttpClient>;

/// Client for the upstream REST API.
///
/// One client is meant to be shared across tasks: the rate limiter and token manager inside it
/// coordinate every concurrent call. API calls and token exchanges use the same transport, so both
/// count against the same rate limit windows.
pub struct Client<C>
where
	C: HttpTransport,
{
	executor: Executor<C>,
	tokens: Arc<TokenManager>,
	store: Arc<dyn ConfigStore>,
	session_active: AtomicBool,
}
impl<C> Client<C>
where
	C: HttpTransport,
{
	/// Builds a client over a caller-provided transport.
	pub fn with_http_client(
		config: ClientConfig,
		store: Arc<dyn ConfigStore>,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		let endpoints = config.endpoints()?;
		let user_agent = http::user_agent(&config.credentials.app_name)?;
		let limiter = Arc::new(RateLimiter::new(&config.rate_limit)?);
		let http_client = http_client.into();
		let facade: Arc<dyn OAuth2Facade> =
			Arc::new(BasicFacade::new(&config.credentials, &endpoints, Arc::clone(&http_client))?);
		let tokens = Arc::new(TokenManager::new(
			config.credentials,
			Arc::clone(&store),
			facade,
			Arc::clone(&limiter),
			config.backoff,
		));
		let executor = Executor::new(
			http_client,
			endpoints,
			limiter,
			config.backoff,
			Arc::clone(&tokens),
			user_agent,
		);

		Ok(Self { executor, tokens, store, session_active: AtomicBool::new(false) })
	}

	/// Performs one API call, returning the decoded body or a typed failure.
	pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		self.executor.execute(request).await
	}

	/// Issues several calls concurrently; results keep the input order.
	pub async fn execute_all(&self, requests: &[ApiRequest]) -> Vec<Result<ApiResponse>> {
		self.executor.execute_all(requests).await
	}

	/// Performs one call and decodes it into `T`, degrading recoverable failures to `T::default()`.
	///
	/// Missing resources, rejected requests, and bodies that do not match `T` are logged at `warn`
	/// and yield the default. Auth, throttle, transport, and config failures still propagate.
	pub async fn call<T>(&self, request: &ApiRequest) -> Result<T>
	where
		T: DeserializeOwned + Default,
	{
		match self.execute(request).await {
			Ok(response) => Ok(parse::parse_or_default(&response)),
			Err(e) if e.is_recoverable() => {
				tracing::warn!(
					method = %request.method,
					path = %request.path,
					error = %e,
					"API call failed; using default."
				);

				Ok(T::default())
			},
			Err(e) => Err(e),
		}
	}

	/// Concurrent counterpart of [`Client::call`].
	pub async fn call_all<T>(&self, requests: &[ApiRequest]) -> Vec<Result<T>>
	where
		T: DeserializeOwned + Default,
	{
		futures::future::join_all(requests.iter().map(|request| self.call(request))).await
	}

	/// Profile of the user the access token belongs to.
	pub async fn whoami(&self) -> Result<CurrentUser> {
		let response = self.execute(&ApiRequest::get("users/whoami").protected()).await?;

		parse::parse(&response)
	}

	/// Exchanges an authorization code for a token pair.
	pub async fn authenticate(&self, code: &str) -> Result<()> {
		self.tokens.authenticate(code).await
	}

	/// Forces a refresh-token exchange.
	pub async fn refresh(&self) -> Result<()> {
		self.tokens.refresh().await.map(|_| ())
	}

	/// Opens the client's single auth session.
	///
	/// Fails with [`Error::SessionActive`] while another session is open.
	pub async fn session(&self, params: SessionParams) -> Result<AuthSession<'_, C>> {
		AuthSession::open(self, params).await
	}

	/// Link the user opens to grant access and obtain an authorization code.
	pub fn authorization_url(&self) -> Url {
		let credentials = self.tokens.credentials();
		let scopes = credentials.scopes.split_whitespace().collect::<Vec<_>>();

		self.executor.endpoints().authorization_url(
			&credentials.client_id,
			&credentials.redirect_uri,
			&scopes,
		)
	}

	/// Current token lifecycle state.
	pub fn token_state(&self) -> TokenState {
		self.tokens.state()
	}

	/// Snapshot of the current credentials.
	pub fn credentials(&self) -> Credentials {
		self.tokens.credentials()
	}

	/// Token manager driving the credential lifecycle.
	pub fn tokens(&self) -> &TokenManager {
		&self.tokens
	}

	/// Executor shared by every call.
	pub fn executor(&self) -> &Executor<C> {
		&self.executor
	}

	/// Config store credentials persist to.
	pub fn store(&self) -> &dyn ConfigStore {
		&*self.store
	}

	pub(crate) fn session_flag(&self) -> &AtomicBool {
		&self.session_active
	}
}
#[cfg(feature = "reqwest")]
impl Client<ReqwestHttpClient> {
	/// Builds a client with its own reqwest transport.
	pub fn new(config: ClientConfig, store: Arc<dyn ConfigStore>) -> Result<Self, ConfigError> {
		config.validate()?;

		let http_client = ReqwestHttpClient::new(&config.credentials.app_name)?;

		Self::with_http_client(config, store, http_client)
	}
}
impl<C> Debug for Client<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("executor", &self.executor)
			.field("tokens", &self.tokens)
			.finish()
	}
}
