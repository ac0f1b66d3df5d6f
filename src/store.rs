//! Storage contracts and built-in stores for per-app credentials.

pub mod file;
pub mod memory;
pub mod null;

mod records;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use null::NullStore;

// self
use crate::{_prelude::*, auth::Credentials};

/// Boxed future returned by [`ConfigStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for per-app token records.
///
/// An app may hold several records, one per authorized user, each identified by its access token.
/// Writes must be atomic with respect to concurrent loads of the same app: a reader sees either
/// the previous records or the new ones, never a partial write.
pub trait ConfigStore
where
	Self: Send + Sync,
{
	/// Fetches the most recently saved record for `app_name`, if any.
	fn load<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>>;

	/// Fetches the record of `app_name` that holds `access_token`.
	fn load_by_access_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>>;

	/// Fetches the record of `app_name` that was minted from `auth_code`.
	fn load_by_auth_code<'a>(
		&'a self,
		app_name: &'a str,
		auth_code: &'a str,
	) -> StoreFuture<'a, Option<Credentials>>;

	/// Persists the record, replacing the one of the same app that holds the same access token.
	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()>;

	/// Removes the record of `app_name` that holds `access_token`, returning it.
	fn delete_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>>;

	/// Removes every record of `app_name`, returning the most recent one.
	fn delete<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>>;
}
impl<S> ConfigStore for Arc<S>
where
	S: ?Sized + ConfigStore,
{
	fn load<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		(**self).load(app_name)
	}

	fn load_by_access_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		(**self).load_by_access_token(app_name, access_token)
	}

	fn load_by_auth_code<'a>(
		&'a self,
		app_name: &'a str,
		auth_code: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		(**self).load_by_auth_code(app_name, auth_code)
	}

	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()> {
		(**self).save(credentials)
	}

	fn delete_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		(**self).delete_token(app_name, access_token)
	}

	fn delete<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		(**self).delete(app_name)
	}
}

/// Error type produced by [`ConfigStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
