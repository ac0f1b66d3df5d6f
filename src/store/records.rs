//! Per-app token records shared by the built-in stores.

// self
use crate::{_prelude::*, auth::Credentials};

/// Token records of one app, oldest first.
///
/// Records are keyed by access token, so every user who authorized the app keeps their own pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct AppRecords(Vec<Credentials>);
impl AppRecords {
	pub(crate) fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub(crate) fn len(&self) -> usize {
		self.0.len()
	}

	/// Most recently saved record.
	pub(crate) fn latest(&self) -> Option<&Credentials> {
		self.0.last()
	}

	pub(crate) fn by_access_token(&self, access_token: &str) -> Option<&Credentials> {
		self.0.iter().rev().find(|record| Self::holds(record, access_token))
	}

	pub(crate) fn by_auth_code(&self, auth_code: &str) -> Option<&Credentials> {
		self.0.iter().rev().find(|record| record.auth_code.as_deref() == Some(auth_code))
	}

	/// Replaces the record with the same access token and moves it to the newest position.
	pub(crate) fn upsert(&mut self, credentials: Credentials) -> Option<Credentials> {
		let previous = self
			.0
			.iter()
			.position(|record| record.access_token == credentials.access_token)
			.map(|index| self.0.remove(index));

		self.0.push(credentials);

		previous
	}

	pub(crate) fn remove_token(&mut self, access_token: &str) -> Option<Credentials> {
		let index = self.0.iter().position(|record| Self::holds(record, access_token))?;

		Some(self.0.remove(index))
	}

	/// Puts a removed record back after a failed write.
	pub(crate) fn restore(&mut self, saved: &Credentials, previous: Option<Credentials>) {
		self.0.retain(|record| record.access_token != saved.access_token);
		self.0.extend(previous);
	}

	pub(crate) fn into_latest(mut self) -> Option<Credentials> {
		self.0.pop()
	}

	fn holds(record: &Credentials, access_token: &str) -> bool {
		record.access_token.as_ref().is_some_and(|token| token.expose() == access_token)
	}
}
