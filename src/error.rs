//! Crate-level error types shared across the pipeline, credential manager, and stores.

// self
use crate::{_prelude::*, auth::CompositeToken};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts, undecodable payloads).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Credential refresh failed; the stored credential has been cleared.
	#[error(transparent)]
	RefreshFailed(#[from] RefreshTokenError),

	/// A refresh was requested while no credential is stored.
	#[error("No credential is available to refresh.")]
	NoCredential,
	/// Response status was rejected by the status validation stage.
	#[error("Request to {url} failed with HTTP status {status}.")]
	HttpStatus {
		/// Status returned by the server.
		status: http::StatusCode,
		/// Resolved request URL.
		url: String,
	},
	/// A pipeline stage failed for a reason of its own.
	#[error("Interceptor `{name}` failed.")]
	Interceptor {
		/// Name of the failing stage.
		name: String,
		/// Stage-specific failure.
		#[source]
		source: BoxError,
	},
}
impl Error {
	/// Wraps a stage-specific failure raised by the interceptor named `name`.
	pub fn interceptor(
		name: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Interceptor { name: name.into(), source: Box::new(src) }
	}

	/// Returns `true` when the caller must authenticate again.
	pub fn is_refresh_failed(&self) -> bool {
		matches!(self, Self::RefreshFailed(_))
	}

	/// Returns the HTTP status carried by [`Error::HttpStatus`], if any.
	pub fn status(&self) -> Option<http::StatusCode> {
		match self {
			Self::HttpStatus { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A URL could not be parsed or joined onto the base URL.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending URL or template.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A `{name}` placeholder has no matching path parameter.
	#[error("Path parameter `{name}` is not provided.")]
	UnresolvedPathParam {
		/// Placeholder name.
		name: String,
	},
	/// A header name or value contains characters HTTP does not allow.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// Request body could not be encoded.
	#[error("Request body could not be encoded as JSON.")]
	BodyEncode(#[from] serde_json::Error),

	/// The application identifier is empty.
	#[error("Application identifier must not be empty.")]
	MissingAppId,
	/// A storage key is empty.
	#[error("The {which} storage key must not be empty.")]
	EmptyStorageKey {
		/// Which key failed validation.
		which: &'static str,
	},
	/// The early expiry margin is negative.
	#[error("Early expiry period must not be negative.")]
	NegativeEarlyPeriod,
	/// A fetcher was built without a transport.
	#[error("A transport is required to build a fetcher.")]
	MissingTransport,
	/// Neither a refresher nor a refresh endpoint was configured.
	#[error("A token refresher or a refresh endpoint is required.")]
	MissingRefresher,
	/// A component that spawns background tasks was built outside a Tokio runtime.
	#[error("A Tokio runtime is required to start the broadcast listener.")]
	MissingRuntime,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, undecodable payloads).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
	/// Response body is not the JSON document the caller expected.
	#[error("Response body is malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
	/// The pipeline finished without a response or an error.
	#[error("Exchange completed without a response.")]
	NoResponse,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Raised when a refresh attempt is rejected; carries the credential that failed.
///
/// The value is cloned to every caller sharing the same in-flight refresh.
#[derive(Clone, Debug, ThisError)]
#[error("Refreshing credential {} failed.", .token.fingerprint())]
pub struct RefreshTokenError {
	/// Credential pair that could not be refreshed.
	pub token: CompositeToken,
	/// Failure reported by the refresher or the credential store.
	#[source]
	pub source: Arc<dyn StdError + Send + Sync>,
}
impl RefreshTokenError {
	/// Builds a refresh failure for `token` caused by `source`.
	pub fn new(
		token: CompositeToken,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self { token, source: Arc::new(src) }
	}
}
