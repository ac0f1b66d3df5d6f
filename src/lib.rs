//! Shikimori API client core: OAuth token lifecycle, sliding-window rate limiting, and
//! throttle-aware retries over a pluggable HTTP transport.
//!
//! The crate deliberately stops at the request layer. [`client::Client`] performs authenticated or
//! public calls against the upstream API, keeps the token pair fresh, paces outbound traffic, and
//! hands the decoded JSON to [`parse`] helpers. Per-resource endpoint wrappers are left to callers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod executor;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod pace;
pub mod parse;
pub mod request;
pub mod store;
pub mod tokens;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
