//! Transport primitives shared by API calls and token exchanges.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack. Every request, whether it
//! targets the REST API or the token endpoint, runs through an [`AsyncHttpClient`] handle minted
//! with a fresh [`ResponseMetadataSlot`]. Handles call [`ResponseMetadataSlot::take`] before
//! dispatching and [`ResponseMetadataSlot::store`] once a status is known, so the token layer can
//! classify `oauth2` failures (429, 5xx) that the crate would otherwise flatten into parse errors.

// std
use std::ops::Deref;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		HeaderMap, HeaderValue,
		header::{RETRY_AFTER, USER_AGENT},
	},
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Abstraction over HTTP transports that execute requests while publishing response metadata.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back a client shared
/// across tasks, and the handles they return must own whatever state the request futures need.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds a handle that records response outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the request so stale information
	///   never leaks across retries.
	/// - Once a response provides a status, save it with [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}
impl<T> HttpTransport for Arc<T>
where
	T: HttpTransport,
{
	type Handle = T::Handle;
	type TransportError = T::TransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		(**self).with_metadata(slot)
	}
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Neither the token endpoint nor the API is expected to redirect; clients built through
/// [`ReqwestHttpClient::new`] never follow redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that sends `user_agent` and does not follow redirects.
	pub fn new(user_agent: &str) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.user_agent(user_agent)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records status and Retry-After.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let retry_after = parse_retry_after(&headers);

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Handle wrapper that stamps every outgoing request with the app's `User-Agent`.
pub(crate) struct UserAgentHandle<H> {
	inner: H,
	user_agent: HeaderValue,
}
impl<H> UserAgentHandle<H> {
	pub(crate) fn new(inner: H, user_agent: HeaderValue) -> Self {
		Self { inner, user_agent }
	}
}
impl<'c, H> AsyncHttpClient<'c> for UserAgentHandle<H>
where
	H: AsyncHttpClient<'c>,
{
	type Error = H::Error;
	type Future = H::Future;

	fn call(&'c self, mut request: HttpRequest) -> Self::Future {
		request.headers_mut().insert(USER_AGENT, self.user_agent.clone());

		self.inner.call(request)
	}
}

/// Validates `app_name` as a `User-Agent` header value.
pub(crate) fn user_agent(app_name: &str) -> Result<HeaderValue, ConfigError> {
	HeaderValue::from_str(app_name)
		.map_err(|_| ConfigError::InvalidUserAgent { app_name: app_name.to_owned() })
}

/// Maps a failed transport call into the client taxonomy.
pub(crate) fn map_client_error<E>(err: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => TransportError::Network { source: inner }.into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::Network { source: message.into() }.into(),
		_ => TransportError::Network { source: "unknown HTTP client failure".into() }.into(),
	}
}

/// Reads `Retry-After` as delta-seconds or an RFC 2822 date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}

	let moment = OffsetDateTime::parse(raw, &Rfc2822).ok()?;

	Duration::try_from(moment - OffsetDateTime::now_utc()).ok().filter(|d| !d.is_zero())
}
