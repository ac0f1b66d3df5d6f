//! Request executor: rate limiting, bearer tokens, backoff, and the one-shot 401 refresh.
//!
//! Each attempt waits for a limiter slot, and the backoff policy retries throttled and transient
//! failures. A protected call that sees HTTP 401 asks the token manager to refresh the generation
//! it used and retries exactly once. A second 401 is terminal for that call.

// crates.io
use oauth2::{
	AsyncHttpClient, HttpResponse,
	http::{
		self as http_types, HeaderValue,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	endpoints::Endpoints,
	error::ConfigError,
	http::{self, HttpTransport, ResponseMetadataSlot},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	pace::{BackoffPolicy, RateLimiter},
	request::{ApiRequest, ApiResponse, Body},
	tokens::{AccessGrant, TokenManager},
};

const PREVIEW_LIMIT: usize = 256;

enum Sent {
	Done(ApiResponse),
	Unauthorized,
}

/// Composes the rate limiter, backoff policy, and token manager around one transport.
pub struct Executor<C>
where
	C: HttpTransport,
{
	transport: Arc<C>,
	endpoints: Endpoints,
	limiter: Arc<RateLimiter>,
	backoff: BackoffPolicy,
	tokens: Arc<TokenManager>,
	user_agent: HeaderValue,
}
impl<C> Executor<C>
where
	C: HttpTransport,
{
	pub(crate) fn new(
		transport: Arc<C>,
		endpoints: Endpoints,
		limiter: Arc<RateLimiter>,
		backoff: BackoffPolicy,
		tokens: Arc<TokenManager>,
		user_agent: HeaderValue,
	) -> Self {
		Self { transport, endpoints, limiter, backoff, tokens, user_agent }
	}

	/// Endpoints requests are resolved against.
	pub fn endpoints(&self) -> &Endpoints {
		&self.endpoints
	}

	/// Shared rate limiter.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// Performs one API call.
	pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "execute");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.execute_inner(request)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		if let Err(e) = &result {
			tracing::debug!(method = %request.method, path = %request.path, error = %e, "API call failed.");
		}

		result
	}

	/// Issues every request concurrently and returns the results in input order.
	pub async fn execute_all(&self, requests: &[ApiRequest]) -> Vec<Result<ApiResponse>> {
		tracing::debug!(count = requests.len(), "Issuing a batch of API calls.");

		futures::future::join_all(requests.iter().map(|request| self.execute(request))).await
	}

	async fn execute_inner(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let mut url = self.endpoints.resource(request.version, &request.path)?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&request.query);
		}

		let mut refreshed = false;

		loop {
			let grant =
				if request.is_protected() { Some(self.tokens.access().await?) } else { None };
			let sent = {
				let this = self;
				let url = &url;
				let grant = grant.as_ref();

				self.backoff
					.run(&request.path, move |attempt| async move {
						this.limiter.acquire().await;
						this.send(request, url, grant, attempt).await
					})
					.await?
			};

			match (sent, grant) {
				(Sent::Done(response), _) => return Ok(response),
				(Sent::Unauthorized, None) => return Err(Error::AuthRequired),
				(Sent::Unauthorized, Some(_)) if refreshed =>
					return Err(Error::AuthExpired {
						reason: "access token was rejected again after a refresh".into(),
					}),
				(Sent::Unauthorized, Some(grant)) => {
					tracing::warn!(
						path = %request.path,
						generation = grant.generation,
						"Access token was rejected; refreshing once."
					);

					refreshed = true;

					self.tokens.refresh_stale(grant.generation).await?;
				},
			}
		}
	}

	async fn send(
		&self,
		request: &ApiRequest,
		url: &Url,
		grant: Option<&AccessGrant>,
		attempt: u32,
	) -> Result<Sent> {
		let mut builder = http_types::Request::builder()
			.method(request.method.to_http())
			.uri(url.as_str())
			.header(USER_AGENT, self.user_agent.clone())
			.header(ACCEPT, "application/json");

		if let Some(grant) = grant {
			let mut value = HeaderValue::try_from(grant.token.bearer())
				.map_err(|e| ConfigError::from(http_types::Error::from(e)))?;

			value.set_sensitive(true);
			builder = builder.header(AUTHORIZATION, value);
		}

		let body = match &request.body {
			Some(body) => {
				builder = builder.header(CONTENT_TYPE, "application/json");

				serde_json::to_vec(body).map_err(ConfigError::from)?
			},
			None => Vec::new(),
		};
		let http_request = builder.body(body).map_err(ConfigError::from)?;
		let slot = ResponseMetadataSlot::default();
		let handle = self.transport.with_metadata(slot.clone());
		let response = handle.call(http_request).await.map_err(http::map_client_error)?;
		let status = response.status().as_u16();
		let retry_after = slot
			.take()
			.and_then(|meta| meta.retry_after)
			.or_else(|| http::parse_retry_after(response.headers()));

		tracing::debug!(
			method = %request.method,
			path = %request.path,
			status,
			attempt,
			"Received API response."
		);

		classify(&request.path, status, retry_after, response)
	}
}
impl<C> Debug for Executor<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Executor")
			.field("endpoints", &self.endpoints)
			.field("backoff", &self.backoff)
			.finish()
	}
}

fn classify(
	path: &str,
	status: u16,
	retry_after: Option<Duration>,
	response: HttpResponse,
) -> Result<Sent> {
	match status {
		200..=299 => Ok(Sent::Done(ApiResponse { status, body: decode_body(status, &response)? })),
		401 => Ok(Sent::Unauthorized),
		404 => Err(Error::NotFound { path: path.to_owned() }),
		429 => Err(Error::Throttled { retry_after }),
		500..=599 => Err(Error::Upstream { status, message: preview(&response) }),
		_ => Err(Error::InvalidResponse { status: Some(status), reason: preview(&response) }),
	}
}

fn decode_body(status: u16, response: &HttpResponse) -> Result<Body> {
	let bytes = response.body();

	if bytes.iter().all(u8::is_ascii_whitespace) {
		return Ok(Body::Empty);
	}

	match serde_json::from_slice::<Value>(bytes) {
		Ok(Value::Object(map)) if map.is_empty() => Ok(Body::Empty),
		Ok(value) => Ok(Body::Json(value)),
		Err(_) if is_plain_text(response) =>
			Ok(Body::Text(String::from_utf8_lossy(bytes).into_owned())),
		Err(e) => Err(Error::InvalidResponse {
			status: Some(status),
			reason: format!("response body is not JSON: {e}"),
		}),
	}
}

fn is_plain_text(response: &HttpResponse) -> bool {
	response
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.is_some_and(|value| value.trim_start().starts_with("text/plain"))
}

fn preview(response: &HttpResponse) -> String {
	let text = String::from_utf8_lossy(response.body());
	let text = text.trim();

	if text.is_empty() {
		return response.status().canonical_reason().unwrap_or("no response body").to_owned();
	}

	text.chars().take(PREVIEW_LIMIT).collect()
}
