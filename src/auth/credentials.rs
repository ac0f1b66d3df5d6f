//! OAuth credentials, token pairs, and the token lifecycle states.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Out-of-band redirect URI used when the app does not register one.
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Lifecycle state of the token manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
	/// No access token; only public endpoints are reachable.
	Unauthenticated,
	/// An authorization-code or refresh-token exchange is in flight.
	Authenticating,
	/// An access token is present and assumed valid until expiry or a 401.
	Authenticated,
}
impl TokenState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenState::Unauthenticated => "unauthenticated",
			TokenState::Authenticating => "authenticating",
			TokenState::Authenticated => "authenticated",
		}
	}
}
impl Display for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Token pair issued by the upstream token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
	/// Bearer token attached to protected calls.
	pub access_token: TokenSecret,
	/// Refresh token; upstream rotates it on every refresh.
	pub refresh_token: Option<TokenSecret>,
	/// Space-separated scopes granted to the pair, when reported.
	pub scope: Option<String>,
	/// Instant after which the access token is considered expired.
	pub expires_at: OffsetDateTime,
}

/// OAuth app credentials plus the current token pair for one app.
///
/// Persisted as-is by [`ConfigStore`](crate::store::ConfigStore) implementations; the expiry is
/// stored as unix seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// App name registered upstream; doubles as the `User-Agent` and store key.
	pub app_name: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Redirect URI registered for the app.
	#[serde(default = "default_redirect_uri")]
	pub redirect_uri: String,
	/// Space-separated scopes requested for the app.
	#[serde(default)]
	pub scopes: String,
	/// Authorization code the current token pair was obtained with.
	#[serde(default)]
	pub auth_code: Option<String>,
	/// Current access token.
	#[serde(default)]
	pub access_token: Option<TokenSecret>,
	/// Current refresh token.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Access token expiry.
	#[serde(default, with = "time::serde::timestamp::option")]
	pub token_expire_at: Option<OffsetDateTime>,
}
impl Credentials {
	/// Creates token-less credentials for the provided app.
	pub fn new(
		app_name: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<TokenSecret>,
	) -> Self {
		Self {
			app_name: app_name.into(),
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			redirect_uri: default_redirect_uri(),
			scopes: String::new(),
			auth_code: None,
			access_token: None,
			refresh_token: None,
			token_expire_at: None,
		}
	}

	/// Overrides the redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.redirect_uri = redirect_uri.into();

		self
	}

	/// Overrides the requested scopes.
	pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
		self.scopes = scopes.into();

		self
	}

	/// Records the authorization code used to mint the token pair.
	pub fn with_auth_code(mut self, code: impl Into<String>) -> Self {
		self.auth_code = Some(code.into());

		self
	}

	/// Seeds an existing token pair. Without an expiry the access token is treated as expired.
	pub fn with_tokens(
		mut self,
		access_token: impl Into<TokenSecret>,
		refresh_token: Option<TokenSecret>,
		token_expire_at: Option<OffsetDateTime>,
	) -> Self {
		self.access_token = Some(access_token.into());
		self.refresh_token = refresh_token;
		self.token_expire_at = token_expire_at;

		self
	}

	/// Checks that every field required to talk to the token endpoint is present.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.app_name.trim().is_empty() {
			return Err(ConfigError::MissingField { field: "app_name" });
		}
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::MissingField { field: "client_id" });
		}
		if self.client_secret.is_blank() {
			return Err(ConfigError::MissingField { field: "client_secret" });
		}
		if self.redirect_uri.trim().is_empty() {
			return Err(ConfigError::MissingField { field: "redirect_uri" });
		}

		Ok(())
	}

	/// Lifecycle state implied by the stored tokens.
	pub fn state(&self) -> TokenState {
		if self.access_token.is_some() {
			TokenState::Authenticated
		} else {
			TokenState::Unauthenticated
		}
	}

	/// Returns `true` if the access token must be refreshed before use at `now`.
	///
	/// A token without a recorded expiry counts as expired.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		match (&self.access_token, self.token_expire_at) {
			(None, _) => false,
			(Some(_), None) => true,
			(Some(_), Some(expire_at)) => now >= expire_at,
		}
	}

	/// Returns `true` when `other` describes the same upstream app.
	pub fn same_app(&self, other: &Credentials) -> bool {
		self.app_name == other.app_name && self.client_id == other.client_id
	}

	/// Replaces the token pair after a successful exchange.
	pub fn apply(&mut self, pair: TokenPair) {
		let TokenPair { access_token, refresh_token, scope, expires_at } = pair;

		self.access_token = Some(access_token);
		// Upstream omits the refresh token only for grants that never rotate it.
		if refresh_token.is_some() {
			self.refresh_token = refresh_token;
		}
		if let Some(scope) = scope {
			self.scopes = scope;
		}

		self.token_expire_at = Some(expires_at);
	}

	/// Takes over the token pair recorded in `stored`, keeping this app's own settings.
	pub fn adopt_tokens(&mut self, stored: Credentials) {
		self.access_token = stored.access_token;
		self.refresh_token = stored.refresh_token;
		self.token_expire_at = stored.token_expire_at;

		if stored.auth_code.is_some() {
			self.auth_code = stored.auth_code;
		}
		if !stored.scopes.is_empty() {
			self.scopes = stored.scopes;
		}
	}

	/// Drops the token pair, returning the credentials to the unauthenticated state.
	pub fn clear_tokens(&mut self) {
		self.access_token = None;
		self.refresh_token = None;
		self.token_expire_at = None;
	}
}

fn default_redirect_uri() -> String {
	DEFAULT_REDIRECT_URI.into()
}
