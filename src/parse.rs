//! Response-to-model parsing.
//!
//! Models declare their required fields, mark the rest optional, and collect anything else under a
//! `#[serde(flatten)]` [`Extra`] map so upstream additions never break decoding. Failures name the
//! offending field path.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	request::{ApiResponse, Body},
};

/// Catch-all map for fields a model does not declare.
pub type Extra = BTreeMap<String, Value>;

/// Decodes the response body into `T`.
///
/// Empty bodies decode as JSON `null`, so `Option<T>` and `()` accept them; plain-text bodies
/// decode as a JSON string.
pub fn parse<T>(response: &ApiResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let value = match &response.body {
		Body::Json(value) => value.clone(),
		Body::Text(text) => Value::String(text.clone()),
		Body::Empty => Value::Null,
	};

	parse_value(value).map_err(|reason| Error::InvalidResponse {
		status: Some(response.status),
		reason,
	})
}

/// Decodes the response body into `T`, logging and degrading to `T::default()` on shape errors.
pub fn parse_or_default<T>(response: &ApiResponse) -> T
where
	T: DeserializeOwned + Default,
{
	parse(response).unwrap_or_else(|e| {
		tracing::warn!(error = %e, "Response did not match the expected model; using default.");

		T::default()
	})
}

pub(crate) fn parse_value<T>(value: Value) -> Result<T, String>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(|e| {
		let path = e.path().to_string();

		if path == "." {
			e.into_inner().to_string()
		} else {
			format!("field `{path}`: {}", e.into_inner())
		}
	})
}

/// Profile of the authenticated user, as returned by `users/whoami`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
	/// User id.
	pub id: u64,
	/// Display name.
	pub nickname: String,
	/// Avatar URL.
	#[serde(default)]
	pub avatar: Option<String>,
	/// Avatar URLs keyed by size (`x160`, `x48`, ...).
	#[serde(default)]
	pub image: BTreeMap<String, String>,
	/// Last activity, as reported upstream (ISO 8601).
	#[serde(default)]
	pub last_online_at: Option<String>,
	/// Profile URL.
	#[serde(default)]
	pub url: Option<String>,
	/// Preferred locale.
	#[serde(default)]
	pub locale: Option<String>,
	/// Fields not declared above.
	#[serde(flatten)]
	pub extra: Extra,
}
