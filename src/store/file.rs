//! File-backed [`KeyValueBackend`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{ChangeListener, KeyValueBackend, Listeners, StorageEvent, StoreError, SubscriptionId},
};

/// Persists every key to a single JSON object after each mutation.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the target, so a crash
/// never leaves a half-written snapshot behind.
#[derive(Debug)]
pub struct FileBackend {
	path: PathBuf,
	items: RwLock<BTreeMap<String, String>>,
	listeners: Listeners,
}
impl FileBackend {
	/// Opens (or creates) a backend at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let items = load_snapshot(&path)?;

		Ok(Self { path, items: RwLock::new(items), listeners: Listeners::default() })
	}

	/// Location of the JSON snapshot.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist(&self, contents: &BTreeMap<String, String>) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize storage snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl KeyValueBackend for FileBackend {
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.items.read().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let old_value = {
			let mut items = self.items.write();
			let old_value = items.insert(key.to_owned(), value.to_owned());

			if old_value.as_deref() == Some(value) {
				return Ok(());
			}
			if let Err(e) = self.persist(&items) {
				match &old_value {
					Some(previous) => items.insert(key.to_owned(), previous.clone()),
					None => items.remove(key),
				};

				return Err(e);
			}

			old_value
		};

		self.listeners.notify(&StorageEvent {
			key: key.to_owned(),
			old_value,
			new_value: Some(value.to_owned()),
		});

		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StoreError> {
		let old_value = {
			let mut items = self.items.write();
			let Some(old_value) = items.remove(key) else {
				return Ok(());
			};

			if let Err(e) = self.persist(&items) {
				items.insert(key.to_owned(), old_value);

				return Err(e);
			}

			old_value
		};

		self.listeners.notify(&StorageEvent {
			key: key.to_owned(),
			old_value: Some(old_value),
			new_value: None,
		});

		Ok(())
	}

	fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
		self.listeners.subscribe(listener)
	}

	fn unsubscribe(&self, id: SubscriptionId) -> bool {
		self.listeners.unsubscribe(id)
	}
}

fn load_snapshot(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
	if !path.exists() {
		return Ok(BTreeMap::new());
	}

	let bytes = fs::read(path).map_err(|e| StoreError::Backend {
		message: format!("Failed to read {}: {e}", path.display()),
	})?;

	if bytes.is_empty() {
		return Ok(BTreeMap::new());
	}

	serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {}: {e}", path.display()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create storage directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}
