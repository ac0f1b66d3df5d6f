//! Scripted transport and fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::HashMap,
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
};
use parking_lot::Mutex;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Instant;
// self
use shikimori_client::{
	auth::{Credentials, TokenSecret},
	client::Client,
	config::ClientConfig,
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot},
	pace::{BackoffPolicy, RateLimitConfig},
	store::{ConfigStore, MemoryStore},
};

pub const APP_NAME: &str = "shiki-test";
pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";
pub const BASE_URL: &str = "http://shikimori.test";

/// Request as seen by the scripted transport.
#[derive(Clone, Debug)]
pub struct Recorded {
	pub method: String,
	pub path: String,
	pub query: Vec<(String, String)>,
	pub headers: HeaderMap,
	pub body: String,
	pub at: Instant,
}
impl Recorded {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	pub fn bearer(&self) -> Option<&str> {
		self.header("authorization").and_then(|value| value.strip_prefix("Bearer "))
	}

	pub fn form(&self) -> HashMap<String, String> {
		url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
	}

	pub fn is_token_call(&self) -> bool {
		self.path == "/oauth/token"
	}
}

/// Scripted response.
#[derive(Clone, Debug)]
pub struct Reply {
	pub status: u16,
	pub headers: Vec<(&'static str, String)>,
	pub body: String,
	pub delay: Option<Duration>,
}
impl Reply {
	pub fn status(status: u16) -> Self {
		Self { status, headers: Vec::new(), body: String::new(), delay: None }
	}

	pub fn json(status: u16, body: Value) -> Self {
		Self {
			status,
			headers: vec![("content-type", "application/json".into())],
			body: body.to_string(),
			delay: None,
		}
	}

	pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		self.headers.push((name, value.into()));

		self
	}

	pub fn delayed(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}
}

type Handler = dyn Fn(&Recorded) -> Reply + Send + Sync;

struct Script {
	handler: Box<Handler>,
	requests: Mutex<Vec<Recorded>>,
}

/// In-process transport answering every request through a handler closure.
#[derive(Clone)]
pub struct ScriptedTransport(Arc<Script>);
impl ScriptedTransport {
	pub fn new(handler: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> Self {
		Self(Arc::new(Script { handler: Box::new(handler), requests: Mutex::new(Vec::new()) }))
	}

	pub fn requests(&self) -> Vec<Recorded> {
		self.0.requests.lock().clone()
	}

	pub fn paths(&self) -> Vec<String> {
		self.0.requests.lock().iter().map(|request| request.path.clone()).collect()
	}

	pub fn token_calls(&self) -> usize {
		self.0.requests.lock().iter().filter(|request| request.is_token_call()).count()
	}
}
impl HttpTransport for ScriptedTransport {
	type Handle = ScriptedHandle;
	type TransportError = std::io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { script: Arc::clone(&self.0), slot }
	}
}

pub struct ScriptedHandle {
	script: Arc<Script>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<std::io::Error>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let recorded = Recorded {
				method: request.method().to_string(),
				path: request.uri().path().to_owned(),
				query: request
					.uri()
					.query()
					.map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
					.unwrap_or_default(),
				headers: request.headers().clone(),
				body: String::from_utf8_lossy(request.body()).into_owned(),
				at: Instant::now(),
			};

			self.script.requests.lock().push(recorded.clone());

			let reply = (self.script.handler)(&recorded);

			if let Some(delay) = reply.delay {
				tokio::time::sleep(delay).await;
			}

			let status = StatusCode::from_u16(reply.status)
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let mut response = HttpResponse::new(reply.body.into_bytes());

			*response.status_mut() = status;

			for (name, value) in reply.headers {
				let value =
					HeaderValue::from_str(&value).map_err(|e| HttpClientError::Other(e.to_string()))?;

				response.headers_mut().insert(HeaderName::from_static(name), value);
			}

			let retry_after = response
				.headers()
				.get("retry-after")
				.and_then(|value| value.to_str().ok())
				.and_then(|value| value.parse::<u64>().ok())
				.map(Duration::from_secs);

			self.slot.store(ResponseMetadata { status: Some(reply.status), retry_after });

			Ok(response)
		})
	}
}

/// Counter shared between a handler and the test body.
#[derive(Clone, Debug, Default)]
pub struct Counter(Arc<AtomicUsize>);
impl Counter {
	pub fn bump(&self) -> usize {
		self.0.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn get(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}

pub fn token_reply(access: &str, refresh: &str) -> Reply {
	Reply::json(
		200,
		serde_json::json!({
			"access_token": access,
			"token_type": "Bearer",
			"expires_in": 86_400,
			"refresh_token": refresh,
			"scope": "user_rates",
			"created_at": OffsetDateTime::now_utc().unix_timestamp(),
		}),
	)
}

pub fn invalid_grant_reply() -> Reply {
	Reply::json(
		400,
		serde_json::json!({
			"error": "invalid_grant",
			"error_description": "The provided authorization grant is invalid.",
		}),
	)
}

pub fn whoami_reply(nickname: &str) -> Reply {
	Reply::json(200, serde_json::json!({ "id": 42, "nickname": nickname, "locale": "ru" }))
}

pub fn credentials() -> Credentials {
	Credentials::new(APP_NAME, CLIENT_ID, CLIENT_SECRET).with_scopes("user_rates")
}

/// Seeds a token pair that stays valid for an hour.
pub fn authenticated(access: &str, refresh: &str) -> Credentials {
	credentials().with_tokens(
		access,
		Some(TokenSecret::new(refresh)),
		Some(OffsetDateTime::now_utc() + time::Duration::hours(1)),
	)
}

pub fn config(credentials: Credentials) -> ClientConfig {
	ClientConfig::from_credentials(credentials)
		.with_base_url_str(BASE_URL)
		.expect("Test base URL should parse.")
		.with_backoff(
			BackoffPolicy::default()
				.with_base_delay(Duration::from_millis(100))
				.with_max_delay(Duration::from_secs(5))
				.with_max_attempts(4),
		)
}

pub fn client_with(
	config: ClientConfig,
	store: Arc<dyn ConfigStore>,
	transport: &ScriptedTransport,
) -> Client<ScriptedTransport> {
	Client::with_http_client(config, store, transport.clone())
		.expect("Test client should build.")
}

pub fn client(
	credentials: Credentials,
	transport: &ScriptedTransport,
) -> (Client<ScriptedTransport>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let client = client_with(config(credentials), store.clone(), transport);

	(client, store)
}

pub fn rate_limited(credentials: Credentials, rate_limit: RateLimitConfig) -> ClientConfig {
	config(credentials).with_rate_limit(rate_limit)
}
