//! Client-level error types shared across the executor, token manager, and stores.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// A protected endpoint was called without usable credentials.
	#[error("This endpoint requires an authenticated client.")]
	AuthRequired,
	/// Token refresh failed or the refreshed token was rejected; re-authenticate out of band.
	#[error("Access token expired and could not be refreshed: {reason}.")]
	AuthExpired {
		/// Upstream- or client-supplied reason string.
		reason: String,
	},
	/// The upstream API kept answering HTTP 429 after the retry budget was spent.
	#[error("Upstream API throttled the request.")]
	Throttled {
		/// Retry-After hint from the last response, if supplied.
		retry_after: Option<Duration>,
	},
	/// The requested resource does not exist.
	#[error("Resource `{path}` was not found.")]
	NotFound {
		/// Request path relative to the API root.
		path: String,
	},
	/// The upstream API rejected the request or returned a body that failed validation.
	#[error("Upstream API returned an invalid response: {reason}.")]
	InvalidResponse {
		/// HTTP status code, when the failure came from a response.
		status: Option<u16>,
		/// Short description of the failure.
		reason: String,
	},
	/// The upstream API failed with a server-side error.
	#[error("Upstream API failed with HTTP {status}: {message}.")]
	Upstream {
		/// HTTP status code (5xx).
		status: u16,
		/// Body preview or status text.
		message: String,
	},
	/// The token endpoint rejected the authorization code.
	#[error("Token endpoint rejected the grant: {reason}.")]
	InvalidGrant {
		/// Upstream-supplied reason string.
		reason: String,
	},
	/// Another auth session is already active on this client.
	#[error("An auth session is already active on this client.")]
	SessionActive,

	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Config store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}
impl Error {
	/// Returns `true` when the backoff policy may retry the failed attempt.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Throttled { .. } | Self::Upstream { .. } | Self::Transport(_))
	}

	/// Returns `true` for API-level failures that lenient calls degrade to a default value.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Self::NotFound { .. } | Self::InvalidResponse { .. })
	}

	/// Server-supplied retry hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Throttled { retry_after } => *retry_after,
			_ => None,
		}
	}
}

/// Configuration and validation failures raised before any request is sent.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required credential field is empty.
	#[error("Client config is missing the required `{field}` value.")]
	MissingField {
		/// Name of the missing field.
		field: &'static str,
	},
	/// An authorization code or access token is required to open an auth session.
	#[error("An auth session needs either an authorization code or an access token.")]
	MissingAuthMaterial,
	/// Rate limit window settings cannot admit any request.
	#[error("Rate limit window must allow at least one request over a non-zero duration.")]
	InvalidRateLimit,
	/// Backoff settings are unusable.
	#[error("Backoff policy must allow at least one attempt.")]
	InvalidBackoff,
	/// An endpoint or redirect URL cannot be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL text.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[from] serde_json::Error),
	/// The app name cannot be sent as a `User-Agent` header.
	#[error("App name `{app_name}` is not a valid User-Agent header value.")]
	InvalidUserAgent {
		/// Offending app name.
		app_name: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
		Self::InvalidUrl { url: url.into(), source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
