//! Typed event buses with three delivery semantics.
//!
//! - [`SequentialTypedEventBus`] awaits each handler before starting the next.
//! - [`ConcurrentTypedEventBus`] starts every handler at once and waits for all of them.
//! - [`BroadcastTypedEventBus`] wraps either of the above and mirrors emitted events to other
//!   execution contexts through a [`BroadcastTransport`].
//!
//! Handler failures (errors and panics) are logged and isolated; they never reach the emitter
//! and never stop delivery to sibling handlers.

pub mod broadcast;
pub mod concurrent;
pub mod sequential;

pub use broadcast::*;
pub use concurrent::*;
pub use sequential::*;

// std
use std::panic::AssertUnwindSafe;
// crates.io
use futures::FutureExt;
// self
use crate::{
	_prelude::*,
	error::BoxError,
	obs::{self, FlowKind},
	registry::Ordered,
};

/// Failure returned by an event handler.
pub type HandlerError = BoxError;

/// Future returned by an event handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// Future returned by [`TypedEventBus::emit`].
pub type BusFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

type HandleFn<E> = dyn Fn(E) -> HandlerFuture + Send + Sync;

/// Named, ordered event handler registration.
pub struct EventHandler<E> {
	name: String,
	order: i32,
	once: bool,
	handle: Arc<HandleFn<E>>,
}
impl<E> EventHandler<E>
where
	E: 'static,
{
	/// Registers `handle` under `name`, delivered in ascending `order`.
	pub fn new<F, Fut>(name: impl Into<String>, order: i32, handle: F) -> Self
	where
		F: 'static + Send + Sync + Fn(E) -> Fut,
		Fut: 'static + Send + Future<Output = Result<(), HandlerError>>,
	{
		Self {
			name: name.into(),
			order,
			once: false,
			handle: Arc::new(move |event| Box::pin(handle(event))),
		}
	}

	/// Marks the handler for removal after its first invocation.
	pub fn once(mut self) -> Self {
		self.once = true;

		self
	}

	/// Unique handler name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Delivery order (ascending).
	pub fn order(&self) -> i32 {
		self.order
	}

	/// Whether the handler is removed after one invocation.
	pub fn is_once(&self) -> bool {
		self.once
	}

	/// Returns `true` when `other` is this registration rather than a handler reusing its name.
	pub fn is_same(&self, other: &Self) -> bool {
		self.name == other.name && Arc::ptr_eq(&self.handle, &other.handle)
	}

	/// Invokes the handler with `event`.
	pub fn handle(&self, event: E) -> HandlerFuture {
		(self.handle)(event)
	}
}
impl<E> Clone for EventHandler<E> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			order: self.order,
			once: self.once,
			handle: Arc::clone(&self.handle),
		}
	}
}
impl<E> Debug for EventHandler<E> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EventHandler")
			.field("name", &self.name)
			.field("order", &self.order)
			.field("once", &self.once)
			.finish()
	}
}
impl<E> Ordered for EventHandler<E> {
	fn name(&self) -> &str {
		&self.name
	}

	fn order(&self) -> i32 {
		self.order
	}
}

/// Common contract shared by every bus variant.
pub trait TypedEventBus<E>
where
	Self: Send + Sync,
{
	/// Event type label; broadcast buses derive their channel name from it.
	fn event_type(&self) -> &str;

	/// Ordered snapshot of the registered handlers.
	fn handlers(&self) -> Vec<EventHandler<E>>;

	/// Registers `handler`; returns `false` (and changes nothing) if its name is taken.
	fn on(&self, handler: EventHandler<E>) -> bool;

	/// Removes the handler called `name`.
	fn off(&self, name: &str) -> bool;

	/// Delivers `event` to every handler.
	fn emit(&self, event: E) -> BusFuture<'_>;

	/// Removes every handler and releases any held resources.
	fn destroy(&self);
}

/// Runs one handler, converting errors and panics into a logged `false`.
pub(crate) async fn invoke_isolated<E>(
	event_type: &str,
	handler: &EventHandler<E>,
	event: E,
) -> bool
where
	E: 'static,
{
	match AssertUnwindSafe(async { handler.handle(event).await }).catch_unwind().await {
		Ok(Ok(())) => true,
		Ok(Err(e)) => {
			obs::log_isolated_failure(FlowKind::Emit, event_type, handler.name(), &e);

			false
		},
		Err(panic) => {
			let reason = panic
				.downcast_ref::<&str>()
				.map(|s| (*s).to_owned())
				.or_else(|| panic.downcast_ref::<String>().cloned())
				.unwrap_or_else(|| "handler panicked".into());

			obs::log_isolated_failure(FlowKind::Emit, event_type, handler.name(), &reason);

			false
		},
	}
}

#[cfg(test)]
pub(crate) mod test_support {
	// self
	use super::*;

	/// Shared log of `(handler, event)` deliveries.
	pub(crate) type Deliveries = Arc<Mutex<Vec<(String, u32)>>>;

	pub(crate) fn recorder(name: &str, order: i32, log: &Deliveries) -> EventHandler<u32> {
		let log = log.clone();
		let label = name.to_owned();

		EventHandler::new(name, order, move |event: u32| {
			let log = log.clone();
			let label = label.clone();

			async move {
				log.lock().push((label, event));

				Ok(())
			}
		})
	}

	pub(crate) fn failing(name: &str, order: i32) -> EventHandler<u32> {
		EventHandler::new(name, order, |_event: u32| async {
			Err::<(), HandlerError>("handler rejected the event".into())
		})
	}

	pub(crate) fn names(log: &Deliveries) -> Vec<String> {
		log.lock().iter().map(|(name, _)| name.clone()).collect()
	}
}
