//! Upstream URL layout: REST API roots, OAuth endpoints, and the authorization link.

// self
use crate::{_prelude::*, error::ConfigError, request::ApiVersion};

/// Production host of the upstream service.
pub const DEFAULT_BASE_URL: &str = "https://shikimori.one";

/// Resolved URLs derived from a single base host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
	base: Url,
	api: Url,
	api_v2: Url,
	token: Url,
	authorize: Url,
}
impl Endpoints {
	/// Derives every endpoint from `base`, e.g. `https://shikimori.one`.
	pub fn new(mut base: Url) -> Result<Self, ConfigError> {
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		let join = |path: &str| {
			base.join(path).map_err(|e| ConfigError::invalid_url(format!("{base}{path}"), e))
		};
		let api = join("api/")?;
		let api_v2 = join("api/v2/")?;
		let token = join("oauth/token")?;
		let authorize = join("oauth/authorize")?;

		Ok(Self { base, api, api_v2, token, authorize })
	}

	/// Parses `base` and derives every endpoint from it.
	pub fn parse(base: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(base).map_err(|e| ConfigError::invalid_url(base, e))?;

		Self::new(url)
	}

	/// Endpoints of the production service.
	pub fn shikimori() -> Result<Self, ConfigError> {
		Self::parse(DEFAULT_BASE_URL)
	}

	/// Base host URL, always with a trailing slash.
	pub fn base(&self) -> &Url {
		&self.base
	}

	/// REST API root for `version`.
	pub fn api(&self, version: ApiVersion) -> &Url {
		match version {
			ApiVersion::V1 => &self.api,
			ApiVersion::V2 => &self.api_v2,
		}
	}

	/// OAuth token endpoint.
	pub fn token(&self) -> &Url {
		&self.token
	}

	/// OAuth authorization endpoint.
	pub fn authorize(&self) -> &Url {
		&self.authorize
	}

	/// Resolves a resource path such as `animes/1` against the API root for `version`.
	pub fn resource(&self, version: ApiVersion, path: &str) -> Result<Url, ConfigError> {
		let path = path.trim_start_matches('/');

		self.api(version).join(path).map_err(|e| ConfigError::invalid_url(path, e))
	}

	/// Builds the link a user opens to grant the app access and obtain an authorization code.
	pub fn authorization_url(&self, client_id: &str, redirect_uri: &str, scopes: &[&str]) -> Url {
		let mut url = self.authorize.clone();

		{
			let mut query = url.query_pairs_mut();

			query
				.append_pair("client_id", client_id)
				.append_pair("redirect_uri", redirect_uri)
				.append_pair("response_type", "code");

			if !scopes.is_empty() {
				query.append_pair("scope", &scopes.join(" "));
			}
		}

		url
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::DEFAULT_REDIRECT_URI;

	#[test]
	fn derives_api_and_oauth_urls_from_base() {
		let endpoints = Endpoints::shikimori().expect("Production endpoints should parse.");

		assert_eq!(endpoints.api(ApiVersion::V1).as_str(), "https://shikimori.one/api/");
		assert_eq!(endpoints.api(ApiVersion::V2).as_str(), "https://shikimori.one/api/v2/");
		assert_eq!(endpoints.token().as_str(), "https://shikimori.one/oauth/token");
		assert_eq!(endpoints.authorize().as_str(), "https://shikimori.one/oauth/authorize");
	}

	#[test]
	fn base_path_prefix_is_preserved() {
		let endpoints =
			Endpoints::parse("http://127.0.0.1:8080/mirror").expect("Mirror base should parse.");
		let url = endpoints
			.resource(ApiVersion::V1, "/users/whoami")
			.expect("Resource path should resolve.");

		assert_eq!(url.as_str(), "http://127.0.0.1:8080/mirror/api/users/whoami");
	}

	#[test]
	fn authorization_url_carries_code_grant_parameters() {
		let endpoints = Endpoints::shikimori().expect("Production endpoints should parse.");
		let url = endpoints.authorization_url(
			"client-id",
			DEFAULT_REDIRECT_URI,
			&["user_rates", "comments"],
		);
		let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

		assert_eq!(pairs, vec![
			("client_id".into(), "client-id".into()),
			("redirect_uri".into(), DEFAULT_REDIRECT_URI.into()),
			("response_type".into(), "code".into()),
			("scope".into(), "user_rates comments".into()),
		]);
	}

	#[test]
	fn rejects_unparseable_base() {
		assert!(matches!(Endpoints::parse("not a url"), Err(ConfigError::InvalidUrl { .. })));
	}
}
