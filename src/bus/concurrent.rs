//! Bus that starts every handler at once and waits for all of them.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	bus::{BusFuture, EventHandler, TypedEventBus, invoke_isolated},
	obs::{FlowKind, FlowSpan},
	registry::OrderedRegistry,
};

/// Invokes handlers without waiting between them; `emit` resolves once every handler settled.
///
/// Handlers start in ascending order but may finish in any order. `once` handlers are removed
/// only after the whole round completes.
#[derive(Debug)]
pub struct ConcurrentTypedEventBus<E> {
	event_type: String,
	registry: OrderedRegistry<EventHandler<E>>,
}
impl<E> ConcurrentTypedEventBus<E> {
	/// Creates an empty bus for events labeled `event_type`.
	pub fn new(event_type: impl Into<String>) -> Self {
		Self { event_type: event_type.into(), registry: OrderedRegistry::default() }
	}
}
impl<E> TypedEventBus<E> for ConcurrentTypedEventBus<E>
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
		let span = FlowSpan::new(FlowKind::Emit, "concurrent");

		Box::pin(span.instrument(async move {
			let handlers = self.registry.snapshot();

			future::join_all(
				handlers
					.iter()
					.map(|handler| invoke_isolated(&self.event_type, handler, event.clone())),
			)
			.await;

			let once = handlers.into_iter().filter(EventHandler::is_once).collect::<Vec<_>>();

			if !once.is_empty() {
				self.registry.remove_if(|entry| once.iter().any(|handler| handler.is_same(entry)));
			}
		}))
	}

	fn destroy(&self) {
		self.registry.clear();
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Instant;
	// self
	use super::*;
	use crate::bus::test_support::*;

	fn delayed(
		name: &'static str,
		order: i32,
		delay_ms: u64,
		log: &Deliveries,
	) -> EventHandler<u32> {
		let log = log.clone();

		EventHandler::new(name, order, move |event: u32| {
			let log = log.clone();

			async move {
				tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
				log.lock().push((name.to_owned(), event));

				Ok(())
			}
		})
	}

	#[tokio::test]
	async fn emit_waits_for_all_handlers_in_parallel() {
		let bus = ConcurrentTypedEventBus::<u32>::new("counter");
		let log = Deliveries::default();

		bus.on(delayed("slow", 1, 100, &log));
		bus.on(delayed("fast", 2, 10, &log));

		let started = Instant::now();

		bus.emit(3).await;

		let elapsed = started.elapsed();

		assert_eq!(names(&log), ["fast", "slow"]);
		assert!(elapsed >= std::time::Duration::from_millis(100));
		assert!(elapsed < std::time::Duration::from_millis(180), "took {elapsed:?}");
	}

	#[tokio::test]
	async fn failures_are_isolated() {
		let bus = ConcurrentTypedEventBus::<u32>::new("counter");
		let log = Deliveries::default();

		bus.on(failing("bad", 0));
		bus.on(recorder("good", 1, &log));
		bus.emit(9).await;

		assert_eq!(*log.lock(), [("good".to_owned(), 9)]);
	}

	#[tokio::test]
	async fn once_handlers_are_removed_after_the_round() {
		let bus = Arc::new(ConcurrentTypedEventBus::<u32>::new("counter"));
		let seen = Arc::new(Mutex::new(Vec::<usize>::new()));
		let log = Deliveries::default();
		let observer_bus = bus.clone();
		let observer_seen = seen.clone();

		bus.on(recorder("once", 0, &log).once());
		bus.on(EventHandler::new("observer", 1, move |_event: u32| {
			let bus = observer_bus.clone();
			let seen = observer_seen.clone();

			async move {
				seen.lock().push(bus.handlers().len());

				Ok(())
			}
		}));
		bus.emit(1).await;
		bus.emit(2).await;

		// The observer still sees the once handler during the first round.
		assert_eq!(*seen.lock(), [2, 1]);
		assert_eq!(*log.lock(), [("once".to_owned(), 1)]);

		bus.destroy();

		assert!(bus.handlers().is_empty());
	}

	#[tokio::test]
	async fn replacement_registered_during_the_round_survives_once_cleanup() {
		let bus = Arc::new(ConcurrentTypedEventBus::<u32>::new("counter"));
		let log = Deliveries::default();
		let swapper_bus = bus.clone();
		let swapper_log = log.clone();

		bus.on(recorder("slot", 0, &log).once());
		bus.on(EventHandler::new("swapper", 1, move |_event: u32| {
			let bus = swapper_bus.clone();
			let log = swapper_log.clone();

			async move {
				bus.off("slot");
				bus.on(recorder("slot", 0, &log));

				Ok(())
			}
		}));
		bus.emit(1).await;

		assert!(bus.handlers().iter().any(|handler| handler.name() == "slot"));

		bus.off("swapper");
		bus.emit(2).await;

		assert_eq!(*log.lock(), [("slot".to_owned(), 1), ("slot".to_owned(), 2)]);

		bus.destroy();
	}
}
