//! [`ConfigStore`] that persists nothing.

// self
use crate::{
	_prelude::*,
	auth::Credentials,
	store::{ConfigStore, StoreFuture},
};

/// Discards saves and never returns stored credentials.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStore;
impl ConfigStore for NullStore {
	fn load<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async { Ok(None) })
	}

	fn load_by_access_token<'a>(
		&'a self,
		_: &'a str,
		_: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async { Ok(None) })
	}

	fn load_by_auth_code<'a>(&'a self, _: &'a str, _: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async { Ok(None) })
	}

	fn save(&self, _: Credentials) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	fn delete_token<'a>(&'a self, _: &'a str, _: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async { Ok(None) })
	}

	fn delete<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async { Ok(None) })
	}
}
