//! Stable per-installation device identifier.

// self
use crate::{
	_prelude::*,
	id,
	store::{KeyStorage, KeyValueBackend, StorageEventBus, StoreError, StringSerializer},
};

/// Backend key holding the device identifier unless configured otherwise.
pub const DEFAULT_DEVICE_ID_KEY: &str = "cosec-device-id";

/// Generates the device identifier once and hands out the persisted value afterwards.
#[derive(Clone, Debug)]
pub struct DeviceIdStorage {
	storage: KeyStorage<String>,
}
impl DeviceIdStorage {
	/// Device id storage under [`DEFAULT_DEVICE_ID_KEY`].
	pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
		Self::with_key(DEFAULT_DEVICE_ID_KEY, backend, None)
	}

	/// Device id storage under `key`, optionally following changes announced on `bus`.
	pub fn with_key(
		key: impl Into<String>,
		backend: Arc<dyn KeyValueBackend>,
		bus: Option<StorageEventBus>,
	) -> Self {
		let mut builder = KeyStorage::builder(key, backend, StringSerializer);

		if let Some(bus) = bus {
			builder = builder.event_bus(bus);
		}

		Self { storage: builder.build() }
	}

	/// Backend key in use.
	pub fn key(&self) -> &str {
		self.storage.key()
	}

	/// Stored identifier, if one was generated already.
	pub fn get(&self) -> Option<String> {
		self.storage.get()
	}

	/// Returns the stored identifier, generating and persisting one on first use.
	///
	/// Two contexts racing on an empty backend may both generate; the last write wins.
	pub async fn get_or_create(&self) -> Result<String, StoreError> {
		if let Some(existing) = self.storage.get() {
			return Ok(existing);
		}

		let created = id::random_id(id::DEVICE_ID_LEN);

		self.storage.set(created.clone()).await?;

		Ok(created)
	}

	/// Replaces the identifier.
	pub async fn set(&self, device_id: impl Into<String>) -> Result<(), StoreError> {
		self.storage.set(device_id.into()).await
	}

	/// Stops listening for changes made by other writers.
	pub fn destroy(&self) {
		self.storage.destroy();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::test_backend;

	#[tokio::test]
	async fn identifier_is_generated_once_and_persisted() {
		let backend = test_backend();
		let devices = DeviceIdStorage::new(backend.clone());

		assert_eq!(devices.get(), None);

		let first = devices.get_or_create().await.expect("Device id should be created.");
		let second = devices.get_or_create().await.expect("Device id should be reused.");

		assert_eq!(first, second);
		assert_eq!(first.len(), id::DEVICE_ID_LEN);
		assert_eq!(backend.get_item(DEFAULT_DEVICE_ID_KEY), Ok(Some(first.clone())));

		let other_context = DeviceIdStorage::new(backend);

		assert_eq!(other_context.get_or_create().await, Ok(first));
	}

	#[tokio::test]
	async fn explicit_identifier_replaces_generated_one() {
		let devices = DeviceIdStorage::with_key("custom-device", test_backend(), None);

		devices.set("device-42").await.expect("Device id should be stored.");

		assert_eq!(devices.key(), "custom-device");
		assert_eq!(devices.get_or_create().await, Ok("device-42".into()));
	}
}
