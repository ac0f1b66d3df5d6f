//! Outbound pacing: sliding-window rate limiting and throttle-aware retries.

pub mod backoff;
pub mod rate_limit;

pub use backoff::*;
pub use rate_limit::*;

/// Serializes [`Duration`](std::time::Duration) values as integer milliseconds.
pub(crate) mod millis {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(crate) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
