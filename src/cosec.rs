//! CoSec context: identity, authorization, and attribution stages wired to shared credential
//! and device stores.
//!
//! A [`CoSec`] value is the explicit home of everything a CoSec-aware client shares: the
//! [`TokenStorage`], the [`DeviceIdStorage`], and the single-flight [`TokenManager`]. Install it
//! on any number of [`FetcherBuilder`]s; every fetcher built that way shares one refresh.
//!
//! # Stage order
//!
//! Request stages:
//! 1. [`CoSecRequestInterceptor`] at [`IDENTITY_REQUEST_ORDER`]
//! 2. the built-in body stage at [`REQUEST_BODY_ORDER`]
//! 3. [`AuthorizationRequestInterceptor`] at [`AUTHORIZATION_REQUEST_ORDER`]
//! 4. [`ResourceAttributionRequestInterceptor`] at [`ATTRIBUTION_REQUEST_ORDER`]
//!
//! Response stages:
//! 1. [`AuthorizationResponseInterceptor`] at [`AUTHORIZATION_RESPONSE_ORDER`]
//! 2. the built-in status stage at
//!    [`VALIDATE_STATUS_ORDER`](crate::pipeline::VALIDATE_STATUS_ORDER)

pub mod attribution;
pub mod authorization;
pub mod config;
pub mod identity;

pub use attribution::*;
pub use authorization::*;
pub use config::*;
pub use identity::*;

/// Header names sent by the CoSec stages.
pub mod headers {
	// crates.io
	use http::HeaderName;

	/// Bearer credential.
	pub const AUTHORIZATION: HeaderName = http::header::AUTHORIZATION;
	/// Application identifier.
	pub const COSEC_APP_ID: HeaderName = HeaderName::from_static("cosec-app-id");
	/// Per-installation device identifier.
	pub const COSEC_DEVICE_ID: HeaderName = HeaderName::from_static("cosec-device-id");
	/// Per-request identifier.
	pub const COSEC_REQUEST_ID: HeaderName = HeaderName::from_static("cosec-request-id");
	/// Workspace the request acts in.
	pub const COSEC_SPACE_ID: HeaderName = HeaderName::from_static("cosec-space-id");
}

// self
use crate::{
	_prelude::*,
	auth::{Clock, SystemClock},
	error::ConfigError,
	exchange::Exchange,
	pipeline::{self, FetcherBuilder, REQUEST_BODY_ORDER},
	refresh::{EndpointTokenRefresher, TokenManager, TokenRefresher},
	store::{DeviceIdStorage, KeyValueBackend, StorageEventBus, TokenStorage},
	transport::Transport,
};

/// Exchange flag (boolean `true`) that disables refreshing for one exchange.
pub const IGNORE_REFRESH_TOKEN_ATTRIBUTE: &str = "Ignore-Refresh-Token";
/// Set by [`AuthorizationRequestInterceptor`] when it attached the header itself.
pub const AUTHORIZATION_ATTACHED_ATTRIBUTE: &str = "CoSec-Authorization-Attached";
/// Set once an exchange was replayed after a refresh.
pub const REPLAYED_ATTRIBUTE: &str = "CoSec-Replayed";

/// Identity headers go first so every later stage sees them.
pub const IDENTITY_REQUEST_ORDER: i32 = REQUEST_BODY_ORDER - 1_000;
/// Credentials attach right after the body is declared.
pub const AUTHORIZATION_REQUEST_ORDER: i32 = REQUEST_BODY_ORDER + 1_000;
/// Attribution runs last among request stages.
pub const ATTRIBUTION_REQUEST_ORDER: i32 = i32::MAX - 10_000;
/// 401 recovery runs before status validation.
pub const AUTHORIZATION_RESPONSE_ORDER: i32 = i32::MIN + 10_000;

/// Resolves the `CoSec-Space-Id` header for an exchange.
pub trait SpaceIdProvider
where
	Self: Send + Sync,
{
	/// Space of `exchange`, or `None` to omit the header.
	fn space_id(&self, exchange: &Exchange) -> Option<String>;
}
impl<F> SpaceIdProvider for F
where
	F: Send + Sync + Fn(&Exchange) -> Option<String>,
{
	fn space_id(&self, exchange: &Exchange) -> Option<String> {
		self(exchange)
	}
}

/// Shared credential, device, and refresh state for CoSec-aware fetchers.
#[derive(Clone)]
pub struct CoSec {
	config: CoSecConfig,
	token_storage: TokenStorage,
	device_ids: DeviceIdStorage,
	manager: TokenManager,
	space_ids: Option<Arc<dyn SpaceIdProvider>>,
}
impl CoSec {
	/// Starts configuring a context persisting its state in `backend`.
	pub fn builder(config: CoSecConfig, backend: Arc<dyn KeyValueBackend>) -> CoSecBuilder {
		CoSecBuilder {
			config,
			backend,
			event_bus: None,
			refresher: None,
			transport: None,
			clock: Arc::new(SystemClock),
			space_ids: None,
		}
	}

	/// Settings the context was built from.
	pub fn config(&self) -> &CoSecConfig {
		&self.config
	}

	/// Credential store.
	pub fn token_storage(&self) -> &TokenStorage {
		&self.token_storage
	}

	/// Device identifier store.
	pub fn device_id_storage(&self) -> &DeviceIdStorage {
		&self.device_ids
	}

	/// Single-flight refresh manager shared by every installed fetcher.
	pub fn token_manager(&self) -> &TokenManager {
		&self.manager
	}

	/// Identity request stage.
	pub fn request_interceptor(&self) -> Result<CoSecRequestInterceptor> {
		let stage = CoSecRequestInterceptor::new(&self.config.app_id, self.device_ids.clone())?;

		Ok(match &self.space_ids {
			Some(provider) => stage.space_id_provider(provider.clone()),
			None => stage,
		})
	}

	/// Authorization request stage.
	pub fn authorization_request_interceptor(&self) -> AuthorizationRequestInterceptor {
		AuthorizationRequestInterceptor::new(self.manager.clone())
	}

	/// 401 recovery response stage.
	pub fn authorization_response_interceptor(&self) -> AuthorizationResponseInterceptor {
		AuthorizationResponseInterceptor::new(self.manager.clone())
	}

	/// Tenant/owner attribution request stage.
	pub fn attribution_interceptor(&self) -> ResourceAttributionRequestInterceptor {
		ResourceAttributionRequestInterceptor::new(self.token_storage.clone())
			.tenant_id_param(self.config.tenant_id_param.clone())
			.owner_id_param(self.config.owner_id_param.clone())
	}

	/// Registers every CoSec stage on `builder`.
	pub fn install(&self, builder: FetcherBuilder) -> Result<FetcherBuilder> {
		Ok(builder
			.request_interceptor(self.request_interceptor()?)
			.request_interceptor(self.authorization_request_interceptor())
			.request_interceptor(self.attribution_interceptor())
			.response_interceptor(self.authorization_response_interceptor()))
	}

	/// Stops following changes made by other writers.
	pub fn destroy(&self) {
		self.token_storage.destroy();
		self.device_ids.destroy();
	}
}
impl Debug for CoSec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CoSec")
			.field("config", &self.config)
			.field("token_storage", &self.token_storage)
			.field("device_ids", &self.device_ids)
			.field("manager", &self.manager)
			.finish()
	}
}

/// Configures a [`CoSec`] context.
///
/// Without an explicit refresher, [`CoSecConfig::refresh_endpoint`] is used with the configured
/// transport (the reqwest transport when the `reqwest` feature is enabled).
pub struct CoSecBuilder {
	config: CoSecConfig,
	backend: Arc<dyn KeyValueBackend>,
	event_bus: Option<StorageEventBus>,
	refresher: Option<Arc<dyn TokenRefresher>>,
	transport: Option<Arc<dyn Transport>>,
	clock: Arc<dyn Clock>,
	space_ids: Option<Arc<dyn SpaceIdProvider>>,
}
impl CoSecBuilder {
	/// Announces storage changes on `bus` and follows changes announced by other contexts.
	pub fn event_bus(mut self, bus: StorageEventBus) -> Self {
		self.event_bus = Some(bus);

		self
	}

	/// Uses `refresher` instead of the endpoint refresher.
	pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
		self.refresher = Some(refresher);

		self
	}

	/// Transport used by the endpoint refresher.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Uses `clock` for expiry decisions.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Resolves `CoSec-Space-Id` through `provider`.
	pub fn space_id_provider(mut self, provider: Arc<dyn SpaceIdProvider>) -> Self {
		self.space_ids = Some(provider);

		self
	}

	/// Validates the configuration and wires the stores and the refresh manager.
	pub fn build(self) -> Result<CoSec> {
		self.config.validate()?;

		let refresher = match (self.refresher, self.config.refresh_endpoint_url()?) {
			(Some(refresher), _) => refresher,
			(None, Some(endpoint)) => {
				let transport = match self.transport {
					Some(transport) => transport,
					None => pipeline::default_transport()?,
				};

				Arc::new(EndpointTokenRefresher::new(endpoint, transport))
			},
			(None, None) => return Err(ConfigError::MissingRefresher.into()),
		};
		let mut token_storage = TokenStorage::builder(self.backend.clone())
			.key(self.config.token_key.clone())
			.early_period(self.config.early_period_duration())
			.clock(self.clock);

		if let Some(bus) = &self.event_bus {
			token_storage = token_storage.event_bus(bus.clone());
		}

		let token_storage = token_storage.build();
		let device_ids = DeviceIdStorage::with_key(
			self.config.device_id_key.clone(),
			self.backend,
			self.event_bus,
		);
		let manager = TokenManager::new(token_storage.clone(), refresher);

		Ok(CoSec {
			config: self.config,
			token_storage,
			device_ids,
			manager,
			space_ids: self.space_ids,
		})
	}
}
impl Debug for CoSecBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CoSecBuilder")
			.field("config", &self.config)
			.field("event_bus", &self.event_bus.is_some())
			.field("refresher", &self.refresher.is_some())
			.finish()
	}
}
