//! Name-unique, order-sorted registry shared by interceptor stages and event handlers.

// self
use crate::_prelude::*;

/// Entry that can live in an [`OrderedRegistry`].
pub(crate) trait Ordered {
	fn name(&self) -> &str;

	fn order(&self) -> i32;
}

/// Entries sorted by ascending order; ties keep registration order.
#[derive(Debug)]
pub(crate) struct OrderedRegistry<T> {
	state: RwLock<RegistryState<T>>,
}
impl<T> OrderedRegistry<T>
where
	T: Clone + Ordered,
{
	/// Inserts `entry` unless its name is already taken.
	pub(crate) fn insert(&self, entry: T) -> bool {
		let mut state = self.state.write();

		if state.names.contains(entry.name()) {
			return false;
		}

		let position = state.entries.partition_point(|existing| existing.order() <= entry.order());

		state.names.insert(entry.name().to_owned());
		state.entries.insert(position, entry);

		true
	}

	/// Removes the entry called `name`.
	pub(crate) fn remove(&self, name: &str) -> bool {
		let mut state = self.state.write();

		if !state.names.remove(name) {
			return false;
		}

		state.entries.retain(|entry| entry.name() != name);

		true
	}

	/// Removes every entry `matches` selects and frees its name.
	pub(crate) fn remove_if(&self, mut matches: impl FnMut(&T) -> bool) {
		let mut state = self.state.write();
		let RegistryState { entries, names } = &mut *state;

		entries.retain(|entry| {
			if !matches(entry) {
				return true;
			}

			names.remove(entry.name());

			false
		});
	}

	/// Ordered copy of the current entries.
	pub(crate) fn snapshot(&self) -> Vec<T> {
		self.state.read().entries.clone()
	}

	pub(crate) fn clear(&self) {
		let mut state = self.state.write();

		state.entries.clear();
		state.names.clear();
	}

	pub(crate) fn len(&self) -> usize {
		self.state.read().entries.len()
	}
}
impl<T> Default for OrderedRegistry<T> {
	fn default() -> Self {
		Self { state: RwLock::new(RegistryState { entries: Vec::new(), names: HashSet::new() }) }
	}
}

#[derive(Debug)]
struct RegistryState<T> {
	entries: Vec<T>,
	names: HashSet<String>,
}
