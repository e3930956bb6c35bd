//! Typed, cached view over a single backend key.

// self
use crate::{
	_prelude::*,
	bus::{EventHandler, TypedEventBus},
	id,
	obs::{self, FlowKind},
	store::{KeyValueBackend, Serializer, StorageEvent, StoreError, SubscriptionId},
};

const HANDLER_SUFFIX_LEN: usize = 8;

/// Event bus carrying [`StorageEvent`]s between storages that watch the same keys.
pub type StorageEventBus = Arc<dyn TypedEventBus<StorageEvent>>;

/// Caches the decoded value of one key and keeps the cache coherent with other writers.
///
/// The cache is dropped whenever the backend or the event bus reports a change to the key; when
/// the change carries the new raw value the cache is refilled on the spot, otherwise on the next
/// [`KeyStorage::get`]. Cloning yields another handle to the same cache.
pub struct KeyStorage<T> {
	inner: Arc<Inner<T>>,
}
impl<T> KeyStorage<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Starts configuring a storage for `key`.
	pub fn builder(
		key: impl Into<String>,
		backend: Arc<dyn KeyValueBackend>,
		serializer: impl 'static + Serializer<T>,
	) -> KeyStorageBuilder<T> {
		KeyStorageBuilder { key: key.into(), backend, serializer: Arc::new(serializer), bus: None }
	}

	/// Storage for `key` without an event bus.
	pub fn new(
		key: impl Into<String>,
		backend: Arc<dyn KeyValueBackend>,
		serializer: impl 'static + Serializer<T>,
	) -> Self {
		Self::builder(key, backend, serializer).build()
	}

	/// Key this storage watches.
	pub fn key(&self) -> &str {
		&self.inner.key
	}

	/// Returns the cached value, loading it from the backend on a cache miss.
	///
	/// Unreadable or undecodable values are logged and reported as absent.
	pub fn get(&self) -> Option<T> {
		loop {
			let version = {
				let slot = self.inner.cache.read();

				if let Cache::Loaded(value) = &slot.entry {
					return value.clone();
				}

				slot.version
			};
			let value = match self.inner.load() {
				Ok(value) => value,
				Err(e) => {
					obs::log_isolated_failure(FlowKind::Storage, &self.inner.key, "load", &e);

					None
				},
			};
			let mut slot = self.inner.cache.write();

			// A change landed while the backend was read; the cached entry is newer.
			if slot.version != version {
				if let Cache::Loaded(value) = &slot.entry {
					return value.clone();
				}

				continue;
			}

			slot.entry = Cache::Loaded(value.clone());

			return value;
		}
	}

	/// Writes `value`, updates the cache, and announces the change on the event bus.
	pub async fn set(&self, value: T) -> Result<(), StoreError> {
		let raw = self.inner.serializer.serialize(&value)?;
		let old_value = self.inner.backend.get_item(&self.inner.key)?;

		self.inner.backend.set_item(&self.inner.key, &raw)?;
		self.inner.replace(Cache::Loaded(Some(value)));
		self.announce(old_value, Some(raw)).await;

		Ok(())
	}

	/// Deletes the key, clears the cache, and announces the removal on the event bus.
	pub async fn remove(&self) -> Result<(), StoreError> {
		let old_value = self.inner.backend.get_item(&self.inner.key)?;

		self.inner.backend.remove_item(&self.inner.key)?;
		self.inner.replace(Cache::Loaded(None));
		self.announce(old_value, None).await;

		Ok(())
	}

	/// Stops watching the backend and the event bus; the cache is dropped.
	pub fn destroy(&self) {
		if let Some(id) = self.inner.subscription.lock().take() {
			self.inner.backend.unsubscribe(id);
		}
		if let Some(bus) = &self.inner.bus {
			bus.off(&self.inner.handler_name);
		}

		self.inner.replace(Cache::Unloaded);
	}

	async fn announce(&self, old_value: Option<String>, new_value: Option<String>) {
		if let Some(bus) = &self.inner.bus {
			bus.emit(StorageEvent { key: self.inner.key.clone(), old_value, new_value }).await;
		}
	}
}
impl<T> Clone for KeyStorage<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<T> Debug for KeyStorage<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyStorage")
			.field("key", &self.inner.key)
			.field("has_bus", &self.inner.bus.is_some())
			.finish()
	}
}

/// Configures and wires a [`KeyStorage`].
pub struct KeyStorageBuilder<T> {
	key: String,
	backend: Arc<dyn KeyValueBackend>,
	serializer: Arc<dyn Serializer<T>>,
	bus: Option<StorageEventBus>,
}
impl<T> KeyStorageBuilder<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Announces writes on `bus` and listens on it for changes made elsewhere.
	pub fn event_bus(mut self, bus: StorageEventBus) -> Self {
		self.bus = Some(bus);

		self
	}

	/// Subscribes to the backend (and the bus, when configured) and returns the storage.
	pub fn build(self) -> KeyStorage<T> {
		let handler_name =
			format!("key-storage:{}:{}", self.key, id::random_id(HANDLER_SUFFIX_LEN));
		let inner = Arc::new(Inner {
			key: self.key,
			backend: self.backend,
			serializer: self.serializer,
			bus: self.bus,
			handler_name,
			cache: RwLock::new(CacheSlot { entry: Cache::Unloaded, version: 0 }),
			subscription: Mutex::new(None),
		});
		let weak = Arc::downgrade(&inner);
		let id = inner.backend.subscribe(Arc::new(move |event: &StorageEvent| {
			if let Some(inner) = weak.upgrade() {
				inner.apply(event);
			}
		}));

		*inner.subscription.lock() = Some(id);

		if let Some(bus) = &inner.bus {
			let weak = Arc::downgrade(&inner);

			bus.on(EventHandler::new(
				inner.handler_name.clone(),
				0,
				move |event: StorageEvent| {
					if let Some(inner) = weak.upgrade() {
						inner.apply(&event);
					}

					async { Ok(()) }
				},
			));
		}

		KeyStorage { inner }
	}
}
impl<T> Debug for KeyStorageBuilder<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyStorageBuilder").field("key", &self.key).finish()
	}
}

enum Cache<T> {
	Unloaded,
	Loaded(Option<T>),
}

/// Cache entry plus a counter bumped by every write, so a slow load never clobbers a newer value.
struct CacheSlot<T> {
	entry: Cache<T>,
	version: u64,
}

struct Inner<T> {
	key: String,
	backend: Arc<dyn KeyValueBackend>,
	serializer: Arc<dyn Serializer<T>>,
	bus: Option<StorageEventBus>,
	handler_name: String,
	cache: RwLock<CacheSlot<T>>,
	subscription: Mutex<Option<SubscriptionId>>,
}
impl<T> Inner<T> {
	fn load(&self) -> Result<Option<T>, StoreError> {
		self.backend
			.get_item(&self.key)?
			.map(|raw| self.serializer.deserialize(&raw))
			.transpose()
	}

	fn apply(&self, event: &StorageEvent) {
		if event.key != self.key {
			return;
		}

		let next = match &event.new_value {
			None => Cache::Loaded(None),
			Some(raw) => match self.serializer.deserialize(raw) {
				Ok(value) => Cache::Loaded(Some(value)),
				Err(e) => {
					obs::log_isolated_failure(FlowKind::Storage, &self.key, "change", &e);

					Cache::Unloaded
				},
			},
		};

		self.replace(next);
	}

	fn replace(&self, entry: Cache<T>) {
		let mut slot = self.cache.write();

		slot.entry = entry;
		slot.version = slot.version.wrapping_add(1);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicBool, Ordering};
	// self
	use super::*;
	use crate::{
		bus::SequentialTypedEventBus,
		store::{ChangeListener, JsonSerializer, MemoryBackend, StringSerializer},
	};

	/// Lets another writer land between the first read and its return.
	#[derive(Default)]
	struct InterleavedWriteBackend {
		items: MemoryBackend,
		interleaved: AtomicBool,
	}
	impl KeyValueBackend for InterleavedWriteBackend {
		fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
			let value = self.items.get_item(key)?;

			if !self.interleaved.swap(true, Ordering::SeqCst) {
				self.items.set_item(key, "new")?;
			}

			Ok(value)
		}

		fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
			self.items.set_item(key, value)
		}

		fn remove_item(&self, key: &str) -> Result<(), StoreError> {
			self.items.remove_item(key)
		}

		fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
			self.items.subscribe(listener)
		}

		fn unsubscribe(&self, id: SubscriptionId) -> bool {
			self.items.unsubscribe(id)
		}
	}

	#[tokio::test]
	async fn set_get_remove_round_trip_through_the_cache() {
		let backend = Arc::new(MemoryBackend::default());
		let storage = KeyStorage::new("counter", backend.clone(), JsonSerializer::<u32>::default());

		assert_eq!(storage.get(), None);

		storage.set(7).await.expect("Memory writes should succeed.");

		assert_eq!(storage.get(), Some(7));
		assert_eq!(backend.get_item("counter"), Ok(Some("7".into())));

		storage.remove().await.expect("Memory removals should succeed.");

		assert_eq!(storage.get(), None);
		assert!(backend.is_empty());
	}

	#[tokio::test]
	async fn backend_changes_refresh_other_handles() {
		let backend = Arc::new(MemoryBackend::default());
		let writer = KeyStorage::new("name", backend.clone(), StringSerializer);
		let reader = KeyStorage::new("name", backend.clone(), StringSerializer);

		assert_eq!(reader.get(), None);

		writer.set("ada".into()).await.expect("Memory writes should succeed.");

		assert_eq!(reader.get().as_deref(), Some("ada"));

		backend.remove_item("name").expect("Memory removals should succeed.");

		assert_eq!(reader.get(), None);
		assert_eq!(writer.get(), None);
	}

	#[tokio::test]
	async fn undecodable_values_read_as_absent() {
		let backend = Arc::new(MemoryBackend::default());
		let storage = KeyStorage::new("counter", backend.clone(), JsonSerializer::<u32>::default());

		backend.set_item("counter", "not-a-number").expect("Memory writes should succeed.");

		assert_eq!(storage.get(), None);

		backend.set_item("counter", "3").expect("Memory writes should succeed.");

		assert_eq!(storage.get(), Some(3));
	}

	#[test]
	fn change_during_load_is_not_overwritten_by_the_stale_read() {
		let backend = Arc::new(InterleavedWriteBackend::default());

		backend.items.set_item("k", "old").expect("Memory writes should succeed.");

		let storage = KeyStorage::new("k", backend.clone(), StringSerializer);

		assert_eq!(storage.get().as_deref(), Some("new"));
		assert_eq!(storage.get().as_deref(), Some("new"));
		assert_eq!(backend.get_item("k"), Ok(Some("new".into())));
	}

	#[tokio::test]
	async fn bus_events_update_caches_over_separate_backends() {
		let bus: StorageEventBus = Arc::new(SequentialTypedEventBus::new("storage"));
		let a = KeyStorage::builder("name", Arc::new(MemoryBackend::default()), StringSerializer)
			.event_bus(bus.clone())
			.build();
		let b = KeyStorage::builder("name", Arc::new(MemoryBackend::default()), StringSerializer)
			.event_bus(bus.clone())
			.build();

		assert_eq!(bus.handlers().len(), 2);

		a.set("grace".into()).await.expect("Memory writes should succeed.");

		assert_eq!(b.get().as_deref(), Some("grace"));

		b.destroy();
		a.set("hopper".into()).await.expect("Memory writes should succeed.");

		assert_eq!(bus.handlers().len(), 1);
		assert_eq!(b.get(), None, "A destroyed storage reads its own backend again.");
	}
}
