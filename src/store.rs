//! Key-value storage contracts, built-in backends, and typed cached views over single keys.
//!
//! Backends hold raw strings and announce every change to their subscribers. A
//! [`KeyStorage`] caches the decoded value for one key and drops or refreshes that cache
//! whenever a backend notification or a [`StorageEvent`] on its event bus names the key.

pub mod device;
pub mod file;
pub mod key;
pub mod memory;
pub mod token;

pub use device::*;
pub use file::FileBackend;
pub use key::*;
pub use memory::MemoryBackend;
pub use token::*;

// std
use std::{
	marker::PhantomData,
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::_prelude::*;

/// Callback invoked synchronously for every change a backend applies.
pub type ChangeListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// String-keyed, string-valued storage with change notifications.
pub trait KeyValueBackend
where
	Self: Send + Sync,
{
	/// Reads the raw value stored under `key`.
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Deletes `key`; missing keys are not an error.
	fn remove_item(&self, key: &str) -> Result<(), StoreError>;

	/// Registers `listener` for change notifications.
	fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;

	/// Drops a listener registered with [`KeyValueBackend::subscribe`].
	fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Handle returned by [`KeyValueBackend::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Change applied to a single key.
///
/// Backends hand it to their listeners; [`KeyStorage`] also emits it on its event bus so other
/// execution contexts can refresh their caches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
	/// Affected key.
	pub key: String,
	/// Raw value before the change.
	pub old_value: Option<String>,
	/// Raw value after the change; `None` when the key was removed.
	pub new_value: Option<String>,
}

/// Converts typed values to and from their stored string form.
pub trait Serializer<T>
where
	Self: Send + Sync,
{
	/// Encodes `value`.
	fn serialize(&self, value: &T) -> Result<String, StoreError>;

	/// Decodes a stored string.
	fn deserialize(&self, raw: &str) -> Result<T, StoreError>;
}

/// JSON [`Serializer`] for any serde type.
pub struct JsonSerializer<T>(PhantomData<fn() -> T>);
impl<T> Clone for JsonSerializer<T> {
	fn clone(&self) -> Self {
		*self
	}
}
impl<T> Copy for JsonSerializer<T> {}
impl<T> Debug for JsonSerializer<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("JsonSerializer")
	}
}
impl<T> Default for JsonSerializer<T> {
	fn default() -> Self {
		Self(PhantomData)
	}
}
impl<T> Serializer<T> for JsonSerializer<T>
where
	T: Serialize + DeserializeOwned,
{
	fn serialize(&self, value: &T) -> Result<String, StoreError> {
		serde_json::to_string(value)
			.map_err(|e| StoreError::Serialization { message: format!("Failed to encode: {e}") })
	}

	fn deserialize(&self, raw: &str) -> Result<T, StoreError> {
		serde_json::from_str(raw)
			.map_err(|e| StoreError::Serialization { message: format!("Failed to decode: {e}") })
	}
}

/// Stores strings verbatim.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringSerializer;
impl Serializer<String> for StringSerializer {
	fn serialize(&self, value: &String) -> Result<String, StoreError> {
		Ok(value.clone())
	}

	fn deserialize(&self, raw: &str) -> Result<String, StoreError> {
		Ok(raw.to_owned())
	}
}

/// Error type produced by storage backends and serializers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// A value could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Listener bookkeeping shared by the built-in backends.
#[derive(Default)]
pub(crate) struct Listeners {
	next: AtomicU64,
	entries: Mutex<Vec<(SubscriptionId, ChangeListener)>>,
}
impl Listeners {
	pub(crate) fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
		let id = SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed));

		self.entries.lock().push((id, listener));

		id
	}

	pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut entries = self.entries.lock();
		let before = entries.len();

		entries.retain(|(existing, _)| *existing != id);

		entries.len() != before
	}

	/// Invokes every listener outside the registry lock so listeners may (un)subscribe.
	pub(crate) fn notify(&self, event: &StorageEvent) {
		let listeners: Vec<_> =
			self.entries.lock().iter().map(|(_, listener)| listener.clone()).collect();

		for listener in listeners {
			listener(event);
		}
	}
}
impl Debug for Listeners {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Listeners").field("count", &self.entries.lock().len()).finish()
	}
}
