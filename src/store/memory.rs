//! Thread-safe in-memory [`KeyValueBackend`] shared by every context holding the same handle.

// self
use crate::{
	_prelude::*,
	store::{ChangeListener, KeyValueBackend, Listeners, StorageEvent, StoreError, SubscriptionId},
};

/// Process-local backend that keeps values in a map and notifies subscribers on every change.
#[derive(Debug, Default)]
pub struct MemoryBackend {
	items: RwLock<HashMap<String, String>>,
	listeners: Listeners,
}
impl MemoryBackend {
	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.items.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.items.read().is_empty()
	}
}
impl KeyValueBackend for MemoryBackend {
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.items.read().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let old_value = self.items.write().insert(key.to_owned(), value.to_owned());

		if old_value.as_deref() != Some(value) {
			self.listeners.notify(&StorageEvent {
				key: key.to_owned(),
				old_value,
				new_value: Some(value.to_owned()),
			});
		}

		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StoreError> {
		let old_value = self.items.write().remove(key);

		if old_value.is_some() {
			let event = StorageEvent { key: key.to_owned(), old_value, new_value: None };

			self.listeners.notify(&event);
		}

		Ok(())
	}

	fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
		self.listeners.subscribe(listener)
	}

	fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.listeners.unsubscribe(id)
	}
}
