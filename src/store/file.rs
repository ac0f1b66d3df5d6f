//! File-backed [`ConfigStore`] that keeps every app's token records in one JSON document.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::Credentials,
	store::{ConfigStore, StoreError, StoreFuture, records::AppRecords},
};

type Snapshot = BTreeMap<String, AppRecords>;

/// Persists token records to a JSON object mapping app names to record lists after each mutation.
///
/// Writes go to a sibling `.tmp` file that is renamed over the target, so readers of the file
/// never observe a partial document.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing JSON document.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn find(
		&self,
		app_name: &str,
		pick: impl FnOnce(&AppRecords) -> Option<&Credentials>,
	) -> Option<Credentials> {
		self.inner.read().get(app_name).and_then(pick).cloned()
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Snapshot::new());
		}

		let de = &mut serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(de).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {} at `{}`: {}", path.display(), e.path(), e.inner()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl ConfigStore for FileStore {
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
		Box::pin(async move {
			let mut guard = self.inner.write();
			let app_name = credentials.app_name.clone();
			let previous = guard.entry(app_name.clone()).or_default().upsert(credentials.clone());

			if let Err(e) = self.persist_locked(&guard) {
				// Keep memory and disk in agreement when the write fails.
				if let Some(records) = guard.get_mut(&app_name) {
					records.restore(&credentials, previous);

					if records.is_empty() {
						guard.remove(&app_name);
					}
				}

				return Err(e);
			}

			Ok(())
		})
	}

	fn delete_token<'a>(
		&'a self,
		app_name: &'a str,
		access_token: &'a str,
	) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let Some(records) = guard.get_mut(app_name) else {
				return Ok(None);
			};
			let before = records.clone();
			let Some(removed) = records.remove_token(access_token) else {
				return Ok(None);
			};

			if records.is_empty() {
				guard.remove(app_name);
			}
			if let Err(e) = self.persist_locked(&guard) {
				guard.insert(app_name.to_owned(), before);

				return Err(e);
			}

			Ok(Some(removed))
		})
	}

	fn delete<'a>(&'a self, app_name: &'a str) -> StoreFuture<'a, Option<Credentials>> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let Some(removed) = guard.remove(app_name) else {
				return Ok(None);
			};

			if let Err(e) = self.persist_locked(&guard) {
				guard.insert(app_name.to_owned(), removed);

				return Err(e);
			}

			Ok(removed.into_latest())
		})
	}
}
