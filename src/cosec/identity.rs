//! Request stage identifying the application, the installation, and the request.

// crates.io
use http::{HeaderName, HeaderValue};
// self
use crate::{
	_prelude::*,
	cosec::{IDENTITY_REQUEST_ORDER, SpaceIdProvider, headers},
	error::ConfigError,
	exchange::Exchange,
	id,
	pipeline::{InterceptFuture, Interceptor},
	store::DeviceIdStorage,
};

/// Adds the `CoSec-*` identity headers the caller did not set.
///
/// The device id is generated on first use and persisted. The request id is fresh for every
/// exchange and kept when the exchange is replayed, so both attempts share one id.
/// `CoSec-Space-Id` is only sent when the provider resolves one.
pub struct CoSecRequestInterceptor {
	app_id: HeaderValue,
	device_ids: DeviceIdStorage,
	space_ids: Option<Arc<dyn SpaceIdProvider>>,
}
impl CoSecRequestInterceptor {
	/// Registry name.
	pub const NAME: &'static str = "CoSecRequestInterceptor";

	/// Identity stage for `app_id`, reading the device id from `device_ids`.
	pub fn new(app_id: &str, device_ids: DeviceIdStorage) -> Result<Self> {
		let app_id = HeaderValue::from_str(app_id)
			.map_err(|_| ConfigError::InvalidHeader { name: headers::COSEC_APP_ID.to_string() })?;

		Ok(Self { app_id, device_ids, space_ids: None })
	}

	/// Resolves `CoSec-Space-Id` through `provider`.
	pub fn space_id_provider(mut self, provider: Arc<dyn SpaceIdProvider>) -> Self {
		self.space_ids = Some(provider);

		self
	}

	async fn identify(&self, exchange: &mut Exchange) -> Result<()> {
		if !exchange.headers.contains_key(headers::COSEC_APP_ID) {
			exchange.headers.insert(headers::COSEC_APP_ID, self.app_id.clone());
		}
		if !exchange.headers.contains_key(headers::COSEC_DEVICE_ID) {
			let device_id = self.device_ids.get_or_create().await?;

			insert_text(exchange, headers::COSEC_DEVICE_ID, &device_id)?;
		}
		if !exchange.headers.contains_key(headers::COSEC_REQUEST_ID) {
			insert_text(exchange, headers::COSEC_REQUEST_ID, &id::random_id(id::REQUEST_ID_LEN))?;
		}
		if !exchange.headers.contains_key(headers::COSEC_SPACE_ID) {
			let space_id = self.space_ids.as_ref().and_then(|provider| provider.space_id(exchange));

			if let Some(space_id) = space_id {
				insert_text(exchange, headers::COSEC_SPACE_ID, &space_id)?;
			}
		}

		Ok(())
	}
}
impl Debug for CoSecRequestInterceptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CoSecRequestInterceptor")
			.field("app_id", &self.app_id)
			.field("device_id_key", &self.device_ids.key())
			.field("space_ids", &self.space_ids.is_some())
			.finish()
	}
}
impl Interceptor for CoSecRequestInterceptor {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn order(&self) -> i32 {
		IDENTITY_REQUEST_ORDER
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		Box::pin(self.identify(exchange))
	}
}

fn insert_text(exchange: &mut Exchange, name: HeaderName, value: &str) -> Result<()> {
	let value = HeaderValue::from_str(value)
		.map_err(|_| ConfigError::InvalidHeader { name: name.to_string() })?;

	exchange.headers.insert(name, value);

	Ok(())
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::Method;
	// self
	use super::*;
	use crate::_preludet::test_backend;

	#[tokio::test]
	async fn fills_identity_headers_and_keeps_caller_values() {
		let devices = DeviceIdStorage::new(test_backend());
		let stage = CoSecRequestInterceptor::new("console", devices.clone())
			.expect("App id should be a valid header.")
			.space_id_provider(Arc::new(|_: &Exchange| Some("space-7".to_owned())));
		let mut first = Exchange::new(Method::GET, "/a");
		let mut second = Exchange::new(Method::GET, "/b")
			.try_header("CoSec-Request-Id", "caller-request")
			.expect("Header fixture should be valid.");

		stage.intercept(&mut first).await.expect("Identity stage should succeed.");
		stage.intercept(&mut second).await.expect("Identity stage should succeed.");

		let header = |exchange: &Exchange, name: &str| {
			exchange.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
		};

		assert_eq!(header(&first, "cosec-app-id"), Some("console".into()));
		assert_eq!(header(&first, "cosec-device-id"), devices.get());
		assert_eq!(header(&first, "cosec-device-id"), header(&second, "cosec-device-id"));
		assert_eq!(header(&first, "cosec-space-id"), Some("space-7".into()));
		assert_eq!(header(&second, "cosec-request-id"), Some("caller-request".into()));
		assert_eq!(
			header(&first, "cosec-request-id").map(|id| id.len()),
			Some(id::REQUEST_ID_LEN)
		);
	}

	#[tokio::test]
	async fn space_id_is_omitted_when_unresolved() {
		let stage = CoSecRequestInterceptor::new("console", DeviceIdStorage::new(test_backend()))
			.expect("App id should be a valid header.");
		let mut exchange = Exchange::new(Method::GET, "/a");

		stage.intercept(&mut exchange).await.expect("Identity stage should succeed.");

		assert!(!exchange.headers.contains_key("cosec-space-id"));
	}

	#[test]
	fn rejects_app_ids_that_are_not_header_safe() {
		let devices = DeviceIdStorage::new(test_backend());

		assert!(CoSecRequestInterceptor::new("bad\napp", devices).is_err());
	}
}
