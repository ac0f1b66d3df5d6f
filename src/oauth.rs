//! Internal facade over the `oauth2` crate for the upstream token endpoint.
//!
//! Upstream authenticates clients with `client_secret_post` and reports `created_at` next to
//! `expires_in`; the expiry of a fresh pair is `created_at + expires_in`.

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
	http::HeaderValue,
};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenPair},
	endpoints::Endpoints,
	error::ConfigError,
	http::{self, HttpTransport, ResponseMetadata, ResponseMetadataSlot, UserAgentHandle},
};

/// Extra fields carried by upstream token responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShikimoriTokenFields {
	/// Unix timestamp at which the pair was minted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at: Option<i64>,
}
impl ExtraTokenFields for ShikimoriTokenFields {}

/// Token response shape returned by the upstream token endpoint.
pub type ShikimoriTokenResponse = StandardTokenResponse<ShikimoriTokenFields, BasicTokenType>;

type ConfiguredClient = oauth2::Client<
	BasicErrorResponse,
	ShikimoriTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;
type FacadeRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// Token endpoint operations used by the token manager.
pub(crate) trait OAuth2Facade
where
	Self: Send + Sync,
{
	/// Exchanges an authorization code for a token pair.
	fn exchange_code<'a>(&'a self, code: &'a str) -> FacadeFuture<'a, TokenPair>;

	/// Rotates the token pair with a refresh token.
	fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenPair>;
}

pub(crate) struct BasicFacade<C>
where
	C: ?Sized + HttpTransport,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	user_agent: HeaderValue,
}
impl<C> BasicFacade<C>
where
	C: ?Sized + HttpTransport,
{
	pub(crate) fn new(
		credentials: &Credentials,
		endpoints: &Endpoints,
		http_client: Arc<C>,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::from_url(endpoints.authorize().clone());
		let token_url = TokenUrl::from_url(endpoints.token().clone());
		let redirect_url = RedirectUrl::new(credentials.redirect_uri.clone())
			.map_err(|e| ConfigError::invalid_url(&credentials.redirect_uri, e))?;
		let oauth_client: ConfiguredClient =
			oauth2::Client::new(ClientId::new(credentials.client_id.clone()))
				.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
				.set_auth_uri(auth_url)
				.set_token_uri(token_url)
				.set_redirect_uri(redirect_url)
				.set_auth_type(AuthType::RequestBody);
		let user_agent = http::user_agent(&credentials.app_name)?;

		Ok(Self { oauth_client, http_client, user_agent })
	}

	fn handle(&self, slot: ResponseMetadataSlot) -> UserAgentHandle<C::Handle> {
		UserAgentHandle::new(self.http_client.with_metadata(slot), self.user_agent.clone())
	}
}
impl<C> OAuth2Facade for BasicFacade<C>
where
	C: ?Sized + HttpTransport,
{
	fn exchange_code<'a>(&'a self, code: &'a str) -> FacadeFuture<'a, TokenPair> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.handle(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.request_async(&handle)
				.await
				.map_err(|e| map_request_error(meta.take(), e))?;

			token_pair(response, meta_status(meta.take().as_ref()))
		})
	}

	fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenPair> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let handle = self.handle(meta.clone());
			let secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&secret)
				.request_async(&handle)
				.await
				.map_err(|e| map_request_error(meta.take(), e))?;

			token_pair(response, meta_status(meta.take().as_ref()))
		})
	}
}

fn token_pair(response: ShikimoriTokenResponse, status: Option<u16>) -> Result<TokenPair> {
	let invalid = |reason: &str| Error::InvalidResponse { status, reason: reason.into() };
	let expires_in = response
		.expires_in()
		.ok_or_else(|| invalid("token response is missing expires_in"))?;
	let expires_in = time::Duration::try_from(expires_in)
		.map_err(|_| invalid("token response expires_in is out of range"))?;
	let issued_at = match response.extra_fields().created_at {
		Some(created_at) => OffsetDateTime::from_unix_timestamp(created_at)
			.map_err(|_| invalid("token response created_at is out of range"))?,
		None => OffsetDateTime::now_utc(),
	};
	let expires_at = issued_at
		.checked_add(expires_in)
		.ok_or_else(|| invalid("token response expiry is out of range"))?;
	let scope = response
		.scopes()
		.map(|scopes| scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" "));

	Ok(TokenPair {
		access_token: response.access_token().secret().as_str().into(),
		refresh_token: response.refresh_token().map(|t| t.secret().as_str().into()),
		scope,
		expires_at,
	})
}

fn map_request_error<E>(meta: Option<ResponseMetadata>, err: FacadeRequestError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta_status(meta.as_ref());

	match (status, err) {
		(_, RequestTokenError::Request(e)) => http::map_client_error(e),
		(Some(429), _) => Error::Throttled { retry_after: meta.and_then(|m| m.retry_after) },
		(Some(status), err) if status >= 500 =>
			Error::Upstream { status, message: describe_request_error(&err) },
		(_, RequestTokenError::ServerResponse(response)) => Error::InvalidGrant {
			reason: response
				.error_description()
				.cloned()
				.unwrap_or_else(|| response.error().as_ref().to_owned()),
		},
		(Some(status), RequestTokenError::Parse(..)) if (400..500).contains(&status) =>
			Error::InvalidGrant { reason: format!("token endpoint answered HTTP {status}") },
		(status, RequestTokenError::Parse(e, _)) =>
			Error::InvalidResponse { status, reason: format!("token response did not parse: {e}") },
		(status, RequestTokenError::Other(message)) =>
			Error::InvalidResponse { status, reason: message },
	}
}

fn describe_request_error<E>(err: &FacadeRequestError<E>) -> String
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		RequestTokenError::ServerResponse(response) => response.error().as_ref().to_owned(),
		RequestTokenError::Request(e) => e.to_string(),
		RequestTokenError::Parse(..) => "token endpoint returned an unparseable body".into(),
		RequestTokenError::Other(message) => message.clone(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
