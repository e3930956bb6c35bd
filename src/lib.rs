//! Authenticated, tenant-aware HTTP exchanges: an ordered interceptor pipeline, single-flight
//! credential refresh, and typed event buses that keep state in sync across execution contexts.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bus;
pub mod cosec;
pub mod error;
pub mod exchange;
pub mod id;
pub mod obs;
pub mod pipeline;
pub mod refresh;
pub mod store;
pub mod transport;

mod registry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		auth::{Clock, CompositeToken},
		exchange::{Exchange, ExchangeResponse},
		store::MemoryBackend,
		transport::{Transport, TransportFuture},
	};

	/// Encodes an unsigned JWT carrying the provided claims.
	///
	/// The signature segment is a fixed placeholder because the crate never verifies
	/// signatures; it only reads claims.
	pub fn encode_test_jwt(claims: serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.c2lnbmF0dXJl")
	}

	/// Builds a composite token whose access/refresh tokens expire at the provided unix seconds.
	pub fn test_composite_token(access_exp: i64, refresh_exp: i64) -> CompositeToken {
		CompositeToken::new(
			encode_test_jwt(serde_json::json!({
				"sub": "owner-1",
				"exp": access_exp,
				"tenantId": "tenant-1",
			})),
			encode_test_jwt(serde_json::json!({ "sub": "owner-1", "exp": refresh_exp })),
		)
	}

	/// Shared in-memory backend wrapped in an [`Arc`].
	pub fn test_backend() -> Arc<MemoryBackend> {
		Arc::new(MemoryBackend::default())
	}

	/// Clock pinned to a manually advanced instant.
	#[derive(Debug)]
	pub struct FixedClock(Mutex<OffsetDateTime>);
	impl FixedClock {
		/// Creates a clock pinned at `instant`.
		pub fn new(instant: OffsetDateTime) -> Self {
			Self(Mutex::new(instant))
		}

		/// Moves the clock forward by `delta`.
		pub fn advance(&self, delta: Duration) {
			*self.0.lock() += delta;
		}
	}
	impl Clock for FixedClock {
		fn now(&self) -> OffsetDateTime {
			*self.0.lock()
		}
	}

	type Responder = Box<dyn Fn(&Exchange) -> Result<ExchangeResponse> + Send + Sync>;

	/// Transport double that records every request and answers through a closure.
	pub struct ScriptedTransport {
		responder: Responder,
		calls: Mutex<Vec<RecordedRequest>>,
	}
	impl ScriptedTransport {
		/// Creates a transport answering every request with `responder`.
		pub fn new(
			responder: impl Fn(&Exchange) -> Result<ExchangeResponse> + Send + Sync + 'static,
		) -> Self {
			Self { responder: Box::new(responder), calls: Default::default() }
		}

		/// Returns a snapshot of the requests sent so far.
		pub fn calls(&self) -> Vec<RecordedRequest> {
			self.calls.lock().clone()
		}
	}
	impl Transport for ScriptedTransport {
		fn send<'a>(&'a self, exchange: &'a Exchange) -> TransportFuture<'a> {
			Box::pin(async move {
				let url = exchange.resolved_url()?;

				self.calls.lock().push(RecordedRequest {
					method: exchange.method.clone(),
					url,
					headers: exchange.headers.clone(),
				});

				(self.responder)(exchange)
			})
		}
	}

	/// Request captured by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// Method of the captured request.
		pub method: http::Method,
		/// Fully resolved URL.
		pub url: Url,
		/// Headers as sent.
		pub headers: http::HeaderMap,
	}
	impl RecordedRequest {
		/// Returns a header value as a string, if present and valid UTF-8.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers.get(name).and_then(|value| value.to_str().ok())
		}
	}

	/// Builds a JSON response with the provided status code.
	pub fn json_response(status: u16, body: serde_json::Value) -> ExchangeResponse {
		let mut response = ExchangeResponse::new(
			http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR),
			body.to_string().into_bytes(),
		);

		response.headers.insert(
			http::header::CONTENT_TYPE,
			http::HeaderValue::from_static("application/json"),
		);

		response
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use http;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
