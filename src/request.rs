//! Request and response models passed through the executor.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::ConfigError};

/// HTTP methods accepted by the upstream API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`.
	#[default]
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl Method {
	/// Upper-case method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}

	pub(crate) fn to_http(self) -> oauth2::http::Method {
		match self {
			Method::Get => oauth2::http::Method::GET,
			Method::Post => oauth2::http::Method::POST,
			Method::Put => oauth2::http::Method::PUT,
			Method::Patch => oauth2::http::Method::PATCH,
			Method::Delete => oauth2::http::Method::DELETE,
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// REST API generation a path belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApiVersion {
	/// Resources under `/api`.
	#[default]
	V1,
	/// Resources under `/api/v2`.
	V2,
}

/// Whether a call needs a bearer token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
	/// No token is attached; a 401 surfaces [`Error::AuthRequired`].
	#[default]
	Public,
	/// A bearer token is attached and refreshed as needed.
	Protected,
}

/// One REST API call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// API generation the path is resolved against.
	pub version: ApiVersion,
	/// Path relative to the API root, e.g. `animes/1`.
	pub path: String,
	/// Query pairs appended in order.
	pub query: Vec<(String, String)>,
	/// JSON body, if any.
	pub body: Option<Value>,
	/// Token requirement.
	pub auth: AuthMode,
}
impl ApiRequest {
	/// Creates a public request for `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			version: ApiVersion::V1,
			path: path.into(),
			query: Vec::new(),
			body: None,
			auth: AuthMode::Public,
		}
	}

	/// Shorthand for a public `GET`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a public `POST`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a public `PUT`.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Shorthand for a public `PATCH`.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// Shorthand for a public `DELETE`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Resolves the path against `/api/v2` instead of `/api`.
	pub fn v2(mut self) -> Self {
		self.version = ApiVersion::V2;

		self
	}

	/// Requires a bearer token.
	pub fn protected(mut self) -> Self {
		self.auth = AuthMode::Protected;

		self
	}

	/// Appends one query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((key.into(), value.to_string()));

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_value(body)?);

		Ok(self)
	}

	/// Uses an already-built JSON payload.
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Returns `true` when a bearer token must be attached.
	pub fn is_protected(&self) -> bool {
		matches!(self.auth, AuthMode::Protected)
	}
}

/// Decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
	/// JSON document, including a literal `null`.
	Json(Value),
	/// Non-JSON `text/plain` payload.
	Text(String),
	/// Empty body or an empty JSON object.
	Empty,
}

/// Successful API response.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Decoded body.
	pub body: Body,
}
impl ApiResponse {
	/// JSON payload, if the body was JSON.
	pub fn json(&self) -> Option<&Value> {
		match &self.body {
			Body::Json(value) => Some(value),
			_ => None,
		}
	}

	/// Consumes the response, returning the JSON payload or `null` for other bodies.
	pub fn into_json(self) -> Value {
		match self.body {
			Body::Json(value) => value,
			_ => Value::Null,
		}
	}

	/// Returns `true` for empty bodies.
	pub fn is_empty(&self) -> bool {
		matches!(self.body, Body::Empty)
	}
}
