//! Scoped auth sessions over a client's credentials.
//!
//! At most one [`AuthSession`] is open per [`Client`]. Opening one establishes a token pair from the
//! supplied material or the matching stored record; releasing it writes the credentials back when
//! the session rotated tokens or a persist failed along the way.

// std
use std::{ops::Deref, sync::atomic::Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenSecret},
	client::Client,
	error::ConfigError,
	http::HttpTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{ConfigStore, StoreError},
};

/// Material a session is opened with.
///
/// With an access token the app's stored record holding that token is reused, otherwise the
/// supplied pair is adopted as-is. With only an authorization code the record minted from that
/// code is reused, otherwise the code is exchanged. Without either the session resumes whatever
/// the client holds or the app's most recent record.
#[derive(Clone, Debug, Default)]
pub struct SessionParams {
	/// Authorization code obtained through the authorization link.
	pub auth_code: Option<String>,
	/// Existing access token.
	pub access_token: Option<TokenSecret>,
	/// Refresh token paired with `access_token`.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry of `access_token`; unknown expiry triggers a refresh before first use.
	pub token_expire_at: Option<OffsetDateTime>,
}
impl SessionParams {
	/// Opens the session with an authorization code.
	pub fn from_auth_code(code: impl Into<String>) -> Self {
		Self::default().with_auth_code(code)
	}

	/// Sets the authorization code.
	pub fn with_auth_code(mut self, code: impl Into<String>) -> Self {
		self.auth_code = Some(code.into());

		self
	}

	/// Sets an existing token pair.
	pub fn with_tokens(
		mut self,
		access_token: impl Into<TokenSecret>,
		refresh_token: Option<TokenSecret>,
		token_expire_at: Option<OffsetDateTime>,
	) -> Self {
		self.access_token = Some(access_token.into());
		self.refresh_token = refresh_token;
		self.token_expire_at = token_expire_at;

		self
	}

	fn is_empty(&self) -> bool {
		self.auth_code.is_none() && self.access_token.is_none()
	}

	// The access token wins over the code when both are supplied.
	async fn lookup(
		&self,
		store: &dyn ConfigStore,
		app_name: &str,
	) -> Result<Option<Credentials>, StoreError> {
		match (&self.access_token, &self.auth_code) {
			(Some(token), _) => store.load_by_access_token(app_name, token.expose()).await,
			(None, Some(code)) => store.load_by_auth_code(app_name, code).await,
			(None, None) => store.load(app_name).await,
		}
	}
}

/// Scoped lease on a client's credentials; dereferences to the [`Client`].
pub struct AuthSession<'a, C>
where
	C: HttpTransport,
{
	client: &'a Client<C>,
	opened_generation: u64,
}
impl<'a, C> AuthSession<'a, C>
where
	C: HttpTransport,
{
	pub(crate) async fn open(client: &'a Client<C>, params: SessionParams) -> Result<Self> {
		const KIND: FlowKind = FlowKind::Session;

		if client.session_flag().swap(true, Ordering::AcqRel) {
			return Err(Error::SessionActive);
		}

		// Constructed before the first await so cancellation still clears the flag.
		let mut session = Self { client, opened_generation: client.tokens().generation() };
		let span = FlowSpan::new(KIND, "open");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(session.establish(params)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));
		result?;

		session.opened_generation = client.tokens().generation();

		Ok(session)
	}

	/// Client the session is bound to.
	pub fn client(&self) -> &'a Client<C> {
		self.client
	}

	/// Ends the session, writing the credentials back if they changed or a persist failed.
	pub async fn release(self) -> Result<()> {
		let tokens = self.client.tokens();

		if tokens.generation() != self.opened_generation || tokens.has_unsaved_changes() {
			tokens.save().await?;

			tracing::debug!("Saved credentials on session release.");
		}

		Ok(())
	}

	async fn establish(&self, params: SessionParams) -> Result<()> {
		let tokens = self.client.tokens();
		let current = tokens.credentials();

		if params.is_empty() && current.access_token.is_some() {
			return Ok(());
		}

		let stored = params
			.lookup(self.client.store(), &current.app_name)
			.await?
			.filter(|stored| stored.same_app(&current) && stored.access_token.is_some());

		if let Some(stored) = stored {
			tokens.adopt(stored).await;

			tracing::debug!("Session resumed the stored token pair.");

			return Ok(());
		}

		let SessionParams { auth_code, access_token, refresh_token, token_expire_at } = params;

		if let Some(access_token) = access_token {
			let mut source = current.with_tokens(access_token, refresh_token, token_expire_at);

			if auth_code.is_some() {
				source.auth_code = auth_code;
			}

			tokens.adopt(source).await;

			return Ok(());
		}
		if let Some(code) = auth_code {
			return tokens.authenticate(&code).await;
		}

		Err(ConfigError::MissingAuthMaterial.into())
	}
}
impl<C> Deref for AuthSession<'_, C>
where
	C: HttpTransport,
{
	type Target = Client<C>;

	fn deref(&self) -> &Self::Target {
		self.client
	}
}
impl<C> Drop for AuthSession<'_, C>
where
	C: HttpTransport,
{
	fn drop(&mut self) {
		self.client.session_flag().store(false, Ordering::Release);
	}
}
impl<C> Debug for AuthSession<'_, C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthSession").field("opened_generation", &self.opened_generation).finish()
	}
}
