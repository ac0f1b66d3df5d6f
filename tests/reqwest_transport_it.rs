#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde::Deserialize;
// self
use shikimori_client::{
	auth::{Credentials, TokenState},
	client::{Client, ReqwestApiClient},
	config::ClientConfig,
	error::Error,
	http::ReqwestHttpClient,
	request::{ApiRequest, Body},
	store::MemoryStore,
};

const APP_NAME: &str = "shiki-reqwest-test";

#[derive(Debug, Default, Deserialize)]
struct Anime {
	id: u64,
	name: String,
	#[serde(default)]
	score: Option<String>,
}

fn build_config(server: &MockServer) -> ClientConfig {
	ClientConfig::from_credentials(
		Credentials::new(APP_NAME, "client-reqwest", "secret-reqwest").with_scopes("user_rates"),
	)
	.with_base_url_str(&server.base_url())
	.expect("Mock server URL should parse.")
}

fn build_client(server: &MockServer) -> ReqwestApiClient {
	Client::new(build_config(server), Arc::new(MemoryStore::default()))
		.expect("Reqwest-backed client should build.")
}

#[tokio::test]
async fn public_get_sends_user_agent_and_query() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/animes/1")
				.query_param("censored", "false")
				.header("user-agent", APP_NAME);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":1,\"name\":\"Cowboy Bebop\",\"score\":\"8.75\",\"kind\":\"tv\"}");
		})
		.await;
	let client = build_client(&server);
	let anime = client
		.call::<Anime>(&ApiRequest::get("animes/1").query("censored", false))
		.await
		.expect("Public call should succeed.");

	mock.assert_async().await;

	assert_eq!(anime.id, 1);
	assert_eq!(anime.name, "Cowboy Bebop");
	assert_eq!(anime.score.as_deref(), Some("8.75"));
}

#[tokio::test]
async fn missing_resource_degrades_to_default() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/animes/999999");
			then.status(404).header("content-type", "application/json").body("{\"code\":404}");
		})
		.await;
	let client = build_client(&server);
	let err = client
		.execute(&ApiRequest::get("animes/999999"))
		.await
		.expect_err("Missing resource should be typed.");

	assert!(matches!(err, Error::NotFound { .. }));

	let anime = client
		.call::<Anime>(&ApiRequest::get("animes/999999"))
		.await
		.expect("Lenient call should degrade.");

	mock.assert_calls_async(2).await;

	assert_eq!(anime.id, 0);
}

#[tokio::test]
async fn code_exchange_then_protected_call_carries_bearer() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.header("user-agent", APP_NAME);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-http\",\"token_type\":\"Bearer\",\"expires_in\":86400,\"refresh_token\":\"refresh-http\",\"scope\":\"user_rates\",\"created_at\":4102444800}",
			);
		})
		.await;
	let whoami = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/whoami").header("authorization", "Bearer access-http");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":7,\"nickname\":\"http-user\"}");
		})
		.await;
	let client = build_client(&server);

	client.authenticate("code-http").await.expect("Code exchange should succeed.");

	token.assert_async().await;

	assert_eq!(client.token_state(), TokenState::Authenticated);

	let user = client.whoami().await.expect("Protected call should succeed.");

	whoami.assert_async().await;

	assert_eq!(user.nickname, "http-user");
}

#[tokio::test]
async fn rejected_code_is_an_invalid_grant() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"already used\"}");
		})
		.await;
	let client = build_client(&server);
	let err = client.authenticate("stale-code").await.expect_err("Stale code should be rejected.");

	mock.assert_async().await;

	assert!(matches!(err, Error::InvalidGrant { .. }), "unexpected error: {err:?}");
	assert_eq!(client.token_state(), TokenState::Unauthenticated);
}

#[tokio::test]
async fn plain_text_and_empty_bodies_are_reported() {
	let server = MockServer::start_async().await;
	let text = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/users/sign_out");
			then.status(200).header("content-type", "text/plain; charset=utf-8").body("signed out");
		})
		.await;
	let empty = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/v2/user_rates/5");
			then.status(204);
		})
		.await;
	let client = build_client(&server);
	let response = client
		.execute(&ApiRequest::post("users/sign_out"))
		.await
		.expect("Text response should be accepted.");

	text.assert_async().await;

	assert_eq!(response.body, Body::Text("signed out".into()));

	let response = client
		.execute(&ApiRequest::delete("user_rates/5").v2())
		.await
		.expect("Empty response should be accepted.");

	empty.assert_async().await;

	assert_eq!(response.status, 204);
	assert!(response.is_empty());
}

#[tokio::test]
async fn json_payload_is_posted_through_a_supplied_reqwest_client() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/styles/preview")
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "style": { "css": "body { color: red; }" } }));
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":null,\"css\":\"body { color: red; }\",\"compiled_css\":\"body{color:red}\"}");
		})
		.await;
	let http_client = ReqwestHttpClient::with_client(
		reqwest::Client::builder()
			.redirect(reqwest::redirect::Policy::none())
			.user_agent(APP_NAME)
			.build()
			.expect("Reqwest client should build."),
	);
	let client: ReqwestApiClient =
		Client::with_http_client(build_config(&server), Arc::new(MemoryStore::default()), http_client)
			.expect("Client over a supplied reqwest client should build.");
	let response = client
		.execute(
			&ApiRequest::post("styles/preview")
				.with_body(serde_json::json!({ "style": { "css": "body { color: red; }" } })),
		)
		.await
		.expect("Preview call should succeed.");

	mock.assert_async().await;

	let json = response.into_json();

	assert_eq!(json["compiled_css"], "body{color:red}");
	assert!(json["id"].is_null());
}
