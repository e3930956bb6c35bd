//! Deserializable settings for a [`CoSec`](crate::cosec::CoSec) context.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	store::{DEFAULT_DEVICE_ID_KEY, DEFAULT_TOKEN_KEY},
};

/// Application-level settings; every field except `app_id` has a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoSecConfig {
	/// Value of the `CoSec-App-Id` header.
	pub app_id: String,
	/// Backend key of the credential pair.
	pub token_key: String,
	/// Backend key of the device identifier.
	pub device_id_key: String,
	/// Seconds before `exp` at which tokens are already treated as expired.
	pub early_period: i64,
	/// Endpoint the built-in refresher posts the credential pair to.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refresh_endpoint: Option<String>,
	/// URL placeholder filled with the `tenantId` claim.
	pub tenant_id_param: String,
	/// URL placeholder filled with the `sub` claim.
	pub owner_id_param: String,
}
impl CoSecConfig {
	/// Placeholder filled with the tenant unless configured otherwise.
	pub const DEFAULT_TENANT_ID_PARAM: &'static str = "tenantId";
	/// Placeholder filled with the owner unless configured otherwise.
	pub const DEFAULT_OWNER_ID_PARAM: &'static str = "ownerId";

	/// Defaults for the application `app_id`.
	pub fn new(app_id: impl Into<String>) -> Self {
		Self { app_id: app_id.into(), ..Default::default() }
	}

	/// Overrides the credential storage key.
	pub fn token_key(mut self, key: impl Into<String>) -> Self {
		self.token_key = key.into();

		self
	}

	/// Overrides the device identifier storage key.
	pub fn device_id_key(mut self, key: impl Into<String>) -> Self {
		self.device_id_key = key.into();

		self
	}

	/// Sets the early expiry margin in seconds.
	pub fn early_period(mut self, seconds: i64) -> Self {
		self.early_period = seconds;

		self
	}

	/// Sets the endpoint used by the built-in refresher.
	pub fn refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.refresh_endpoint = Some(endpoint.into());

		self
	}

	/// Overrides the tenant placeholder name.
	pub fn tenant_id_param(mut self, name: impl Into<String>) -> Self {
		self.tenant_id_param = name.into();

		self
	}

	/// Overrides the owner placeholder name.
	pub fn owner_id_param(mut self, name: impl Into<String>) -> Self {
		self.owner_id_param = name.into();

		self
	}

	/// Early expiry margin as a [`Duration`].
	pub fn early_period_duration(&self) -> Duration {
		Duration::seconds(self.early_period.max(0))
	}

	/// Parsed refresh endpoint, if one is configured.
	pub fn refresh_endpoint_url(&self) -> Result<Option<Url>, ConfigError> {
		self.refresh_endpoint
			.as_deref()
			.map(|value| {
				Url::parse(value)
					.map_err(|source| ConfigError::InvalidUrl { value: value.to_owned(), source })
			})
			.transpose()
	}

	/// Checks every field and reports the first problem found.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.app_id.trim().is_empty() {
			return Err(ConfigError::MissingAppId);
		}
		if self.token_key.is_empty() {
			return Err(ConfigError::EmptyStorageKey { which: "token" });
		}
		if self.device_id_key.is_empty() {
			return Err(ConfigError::EmptyStorageKey { which: "device id" });
		}
		if self.early_period < 0 {
			return Err(ConfigError::NegativeEarlyPeriod);
		}

		self.refresh_endpoint_url()?;

		Ok(())
	}
}
impl Default for CoSecConfig {
	fn default() -> Self {
		Self {
			app_id: String::new(),
			token_key: DEFAULT_TOKEN_KEY.into(),
			device_id_key: DEFAULT_DEVICE_ID_KEY.into(),
			early_period: 0,
			refresh_endpoint: None,
			tenant_id_param: Self::DEFAULT_TENANT_ID_PARAM.into(),
			owner_id_param: Self::DEFAULT_OWNER_ID_PARAM.into(),
		}
	}
}
