//! Thread-safe in-memory [`ConfigStore`] for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	auth::Credentials,
	store::{ConfigStore, StoreFuture, records::AppRecords},
};

type StoreMap = Arc<RwLock<HashMap<String, AppRecords>>>;

/// Keeps token records in-process; contents are lost when the last clone drops.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of apps with at least one record.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	/// Number of token records kept for `app_name`.
	pub fn token_count(&self, app_name: &str) -> usize {
		self.0.read().get(app_name).map_or(0, AppRecords::len)
	}

	fn find(
		&self,
		app_name: &str,
		pick: impl FnOnce(&AppRecords) -> Option<&Credentials>,
	) -> Option<Credentials> {
		self.0.read().get(app_name).and_then(pick).cloned()
	}
}
impl ConfigStore for MemoryStore {
	fn load<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async move { Ok(self.find(app_name, AppRecords::latest)) })
	}

	fn load_by_access_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(
			async move { Ok(self.find(app_name, |records| records.by_access_token(access_token))) },
		)
	}

	fn load_by_auth_code<'a>(
		&'a self,
		app_name: &'a str,
		auth_code: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async move { Ok(self.find(app_name, |records| records.by_auth_code(auth_code))) })
	}

	fn save(&self, credentials: Credentials) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().entry(credentials.app_name.clone()).or_default().upsert(credentials);

			Ok(())
		})
	}

	fn delete_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async move {
			let mut map = self.0.write();
			let Some(records) = map.get_mut(app_name) else {
				return Ok(None);
			};
			let removed = records.remove_token(access_token);

			if records.is_empty() {
				map.remove(app_name);
			}

			Ok(removed)
		})
	}

	fn delete<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async move { Ok(self.0.write().remove(app_name).and_then(AppRecords::into_latest)) })
	}
}
