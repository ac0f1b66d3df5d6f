//! Client configuration: app credentials, pacing settings, and the upstream host.

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
	endpoints::{DEFAULT_BASE_URL, Endpoints},
	error::ConfigError,
	http,
	pace::{BackoffPolicy, RateLimitConfig},
};

/// Everything needed to construct a [`Client`](crate::client::Client).
///
/// Deserializes from a flat document: the [`Credentials`] fields sit at the top level next to
/// the optional `rate_limit`, `backoff`, and `base_url` settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// App credentials and the optional initial token pair.
	#[serde(flatten)]
	pub credentials: Credentials,
	/// Rolling windows enforced on every outbound request.
	#[serde(default)]
	pub rate_limit: RateLimitConfig,
	/// Retry policy for throttled and transient failures.
	#[serde(default)]
	pub backoff: BackoffPolicy,
	/// Upstream host override for mirrors and tests; the production host when unset.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub base_url: Option<Url>,
}
impl ClientConfig {
	/// Creates a configuration for the given app with default pacing against the production host.
	pub fn new(
		app_name: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<TokenSecret>,
	) -> Self {
		Self::from_credentials(Credentials::new(app_name, client_id, client_secret))
	}

	/// Wraps pre-built credentials.
	pub fn from_credentials(credentials: Credentials) -> Self {
		Self {
			credentials,
			rate_limit: RateLimitConfig::default(),
			backoff: BackoffPolicy::default(),
			base_url: None,
		}
	}

	/// Overrides the redirect URI registered for the app.
	pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.credentials.redirect_uri = redirect_uri.into();

		self
	}

	/// Overrides the requested scopes (space separated).
	pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
		self.credentials.scopes = scopes.into();

		self
	}

	/// Replaces the rate limit windows.
	pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.rate_limit = rate_limit;

		self
	}

	/// Replaces the backoff policy.
	pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
		self.backoff = backoff;

		self
	}

	/// Points the client at another host.
	pub fn with_base_url(mut self, base_url: Url) -> Self {
		self.base_url = Some(base_url);

		self
	}

	/// Parses and sets the upstream host.
	pub fn with_base_url_str(self, base_url: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(base_url).map_err(|e| ConfigError::invalid_url(base_url, e))?;

		Ok(self.with_base_url(url))
	}

	/// Checks every setting before any request is sent.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.credentials.validate()?;
		self.rate_limit.validate()?;
		self.backoff.validate()?;
		http::user_agent(&self.credentials.app_name)?;

		Ok(())
	}

	/// Endpoints derived from [`ClientConfig::base_url`], or from [`DEFAULT_BASE_URL`].
	pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
		match &self.base_url {
			Some(base_url) => Endpoints::new(base_url.clone()),
			None => Endpoints::parse(DEFAULT_BASE_URL),
		}
	}
}
