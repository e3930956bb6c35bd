//! Bus that delivers to one handler at a time, in order.

// self
use crate::{
	_prelude::*,
	bus::{BusFuture, EventHandler, TypedEventBus, invoke_isolated},
	obs::{FlowKind, FlowSpan},
	registry::OrderedRegistry,
};

/// Awaits each handler to completion before invoking the next one.
///
/// Use it when side effects depend on each other (e.g. "persist, then notify").
#[derive(Debug)]
pub struct SequentialTypedEventBus<E> {
	event_type: String,
	registry: OrderedRegistry<EventHandler<E>>,
}
impl<E> SequentialTypedEventBus<E> {
	/// Creates an empty bus for events labeled `event_type`.
	pub fn new(event_type: impl Into<String>) -> Self {
		Self { event_type: event_type.into(), registry: OrderedRegistry::default() }
	}
}
impl<E> TypedEventBus<E> for SequentialTypedEventBus<E>
where
	E: 'static + Clone + Send + Sync,
{
	fn event_type(&self) -> &str {
		&self.event_type
	}

	fn handlers(&self) -> Vec<EventHandler<E>> {
		self.registry.snapshot()
	}

	fn on(&self, handler: EventHandler<E>) -> bool {
		self.registry.insert(handler)
	}

	fn off(&self, name: &str) -> bool {
		self.registry.remove(name)
	}

	fn emit(&self, event: E) -> BusFuture<'_> {
		let span = FlowSpan::new(FlowKind::Emit, "sequential");

		Box::pin(span.instrument(async move {
			for handler in self.registry.snapshot() {
				invoke_isolated(&self.event_type, &handler, event.clone()).await;

				if handler.is_once() {
					self.registry.remove_if(|entry| entry.is_same(&handler));
				}
			}
		}))
	}

	fn destroy(&self) {
		self.registry.clear();
	}
}
