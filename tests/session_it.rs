mod support;

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};
// crates.io
use color_eyre::Result;
// self
use shikimori_client::{
	auth::{Credentials, SessionParams, TokenSecret, TokenState},
	error::{ConfigError, Error},
	store::{ConfigStore, MemoryStore, StoreError, StoreFuture},
};
use support::*;

/// Memory store whose writes fail while `failing` is set.
#[derive(Default)]
struct FlakyStore {
	inner: MemoryStore,
	failing: AtomicBool,
}
impl ConfigStore for FlakyStore {
	fn load<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		self.inner.load(app_name)
	}

	fn load_by_access_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		self.inner.load_by_access_token(app_name, access_token)
	}

	fn load_by_auth_code<'a>(
		&'a self,
		app_name: &'a str,
		auth_code: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		self.inner.load_by_auth_code(app_name, auth_code)
	}

	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()> {
		if self.failing.load(Ordering::SeqCst) {
			return Box::pin(async {
				Err(StoreError::Backend { message: "disk unavailable".into() })
			});
		}

		self.inner.save(credentials)
	}

	fn delete_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		self.inner.delete_token(app_name, access_token)
	}

	fn delete<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		self.inner.delete(app_name)
	}
}

fn api() -> ScriptedTransport {
	ScriptedTransport::new(|request| {
		if request.is_token_call() {
			token_reply("access-code", "refresh-code")
		} else {
			whoami_reply("morr")
		}
	})
}

#[tokio::test(start_paused = true)]
async fn only_one_session_is_active_at_a_time() -> Result<()> {
	let transport = api();
	let (client, _) = client(credentials(), &transport);
	let params = SessionParams::default().with_tokens("access-1", None, None);
	let session = client.session(params.clone()).await?;

	assert!(matches!(client.session(params.clone()).await, Err(Error::SessionActive)));

	session.release().await?;

	let session = client.session(params).await?;

	drop(session);

	assert!(client.session(SessionParams::default()).await.is_ok());

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn code_session_exchanges_once_and_reuses_the_stored_pair() -> Result<()> {
	let transport = api();
	let (client, store) = client(credentials(), &transport);
	let session = client.session(SessionParams::from_auth_code("code-1")).await?;

	assert_eq!(session.token_state(), TokenState::Authenticated);
	assert_eq!(session.whoami().await?.nickname, "morr");

	session.release().await?;

	assert_eq!(transport.token_calls(), 1);

	// A second client for the same app finds the pair minted from this code.
	let other = client_with(config(credentials()), store, &transport);
	let session = other.session(SessionParams::from_auth_code("code-1")).await?;

	assert_eq!(transport.token_calls(), 1);
	assert_eq!(
		session.credentials().access_token.as_ref().map(TokenSecret::expose),
		Some("access-code")
	);

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn supplied_tokens_are_adopted_and_saved() -> Result<()> {
	let transport = api();
	let (client, store) = client(credentials(), &transport);
	let expire_at = time::OffsetDateTime::now_utc() + time::Duration::hours(2);
	let params = SessionParams::default().with_tokens(
		"access-given",
		Some(TokenSecret::new("refresh-given")),
		Some(expire_at),
	);
	let session = client.session(params).await?;

	session.whoami().await?;
	session.release().await?;

	assert_eq!(transport.token_calls(), 0);
	assert_eq!(transport.requests()[0].bearer(), Some("access-given"));

	let stored = store.load(APP_NAME).await?.expect("Adopted pair should be saved.");

	assert_eq!(stored.access_token.as_ref().map(TokenSecret::expose), Some("access-given"));
	assert_eq!(stored.token_expire_at.map(|at| at.unix_timestamp()), Some(expire_at.unix_timestamp()));

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn session_without_material_is_rejected() {
	let transport = api();
	let (client, _) = client(credentials(), &transport);
	let err = client
		.session(SessionParams::default())
		.await
		.expect_err("Session without material should fail.");

	assert!(matches!(err, Error::Config(ConfigError::MissingAuthMaterial)));
	assert!(transport.requests().is_empty());
	// A failed open leaves no session behind.
	assert!(client.session(SessionParams::from_auth_code("code-1")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn release_retries_a_failed_persist() -> Result<()> {
	let transport = api();
	let store = Arc::new(FlakyStore { failing: AtomicBool::new(true), ..Default::default() });
	let client = client_with(config(credentials()), store.clone(), &transport);
	let session = client.session(SessionParams::from_auth_code("code-1")).await?;

	assert!(client.tokens().has_unsaved_changes());
	assert!(store.load(APP_NAME).await?.is_none());

	store.failing.store(false, Ordering::SeqCst);
	session.release().await?;

	assert!(!client.tokens().has_unsaved_changes());
	assert_eq!(store.load(APP_NAME).await?, Some(client.credentials()));

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn release_surfaces_storage_failures() -> Result<()> {
	let transport = api();
	let store = Arc::new(FlakyStore { failing: AtomicBool::new(true), ..Default::default() });
	let client = client_with(config(credentials()), store, &transport);
	let session = client.session(SessionParams::from_auth_code("code-1")).await?;
	let err = session.release().await.expect_err("Failing store should surface on release.");

	assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
	assert!(client.tokens().has_unsaved_changes());

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn flush_retries_a_failed_persist() -> Result<()> {
	let transport = api();
	let store = Arc::new(FlakyStore { failing: AtomicBool::new(true), ..Default::default() });
	let client = client_with(config(credentials()), store.clone(), &transport);

	client.authenticate("code-1").await?;

	assert!(client.tokens().has_unsaved_changes());
	assert!(client.tokens().flush().await.is_err());

	store.failing.store(false, Ordering::SeqCst);
	client.tokens().flush().await?;

	assert!(!client.tokens().has_unsaved_changes());
	assert_eq!(store.load_by_auth_code(APP_NAME, "code-1").await?, Some(client.credentials()));

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn session_opened_during_a_refresh_keeps_the_supplied_token() -> Result<()> {
	let transport = ScriptedTransport::new(|request| {
		if request.is_token_call() {
			token_reply("access-refreshed", "refresh-refreshed").delayed(Duration::from_secs(5))
		} else {
			whoami_reply("morr")
		}
	});
	let (client, store) = client(authenticated("access-old", "refresh-old"), &transport);
	let params = SessionParams::default().with_tokens(
		"access-given",
		Some(TokenSecret::new("refresh-given")),
		Some(time::OffsetDateTime::now_utc() + time::Duration::hours(2)),
	);
	let (refreshed, session) = tokio::join!(client.refresh(), async {
		tokio::time::sleep(Duration::from_secs(1)).await;
		client.session(params).await
	});

	refreshed?;

	let session = session?;

	assert_eq!(
		session.credentials().access_token.as_ref().map(TokenSecret::expose),
		Some("access-given")
	);

	session.whoami().await?;
	session.release().await?;

	assert_eq!(transport.requests().last().and_then(|request| request.bearer()), Some("access-given"));
	assert!(store.load_by_access_token(APP_NAME, "access-given").await?.is_some());
	// The pair rotated for the previous holder stays on record.
	assert_eq!(store.token_count(APP_NAME), 2);

	Ok(())
}

#[tokio::test(start_paused = true)]
async fn users_of_one_app_keep_their_own_records() -> Result<()> {
	let transport = ScriptedTransport::new(|request| {
		if request.is_token_call() {
			return match request.form().get("code").map(String::as_str) {
				Some("code-a") => token_reply("access-a", "refresh-a"),
				Some("code-b") => token_reply("access-b", "refresh-b"),
				_ => invalid_grant_reply(),
			};
		}

		match request.bearer() {
			Some("access-a") => whoami_reply("alice"),
			Some("access-b") => whoami_reply("bob"),
			_ => Reply::status(401),
		}
	});
	let (client, store) = client(credentials(), &transport);

	for (code, nickname) in [("code-a", "alice"), ("code-b", "bob")] {
		let session = client.session(SessionParams::from_auth_code(code)).await?;

		assert_eq!(session.whoami().await?.nickname, nickname);

		session.release().await?;
	}

	assert_eq!(transport.token_calls(), 2);
	assert_eq!(store.token_count(APP_NAME), 2);

	// The first user's code resolves to their own stored pair without a new exchange.
	let session = client.session(SessionParams::from_auth_code("code-a")).await?;

	assert_eq!(session.whoami().await?.nickname, "alice");

	session.release().await?;

	let session =
		client.session(SessionParams::default().with_tokens("access-b", None, None)).await?;

	assert_eq!(
		session.credentials().refresh_token.as_ref().map(TokenSecret::expose),
		Some("refresh-b")
	);
	assert_eq!(session.whoami().await?.nickname, "bob");

	session.release().await?;

	assert_eq!(transport.token_calls(), 2);
	assert_eq!(store.token_count(APP_NAME), 2);

	Ok(())
}

#[test]
fn authorization_url_uses_configured_scopes() {
	let transport = api();
	let (client, _) = client(credentials(), &transport);
	let url = client.authorization_url();

	assert_eq!(url.path(), "/oauth/authorize");
	assert_eq!(
		url.query(),
		Some(
			"client_id=client-id&redirect_uri=urn%3Aietf%3Awg%3Aoauth%3A2.0%3Aoob&response_type=code&scope=user_rates"
		)
	);
}
