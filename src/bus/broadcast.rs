//! Cross-context event delivery layered over a local bus.
//!
//! A [`BroadcastTypedEventBus`] delivers every emitted event to its local delegate first and
//! then publishes it on a named channel. Events arriving on that channel from other contexts
//! are handed to the delegate only, never published again, so two contexts can never bounce
//! an event back and forth.

// crates.io
use tokio::{
	runtime::Handle,
	sync::broadcast::{self, Receiver, Sender, error::RecvError},
	task::JoinHandle,
};
// self
use crate::{
	_prelude::*,
	bus::{BusFuture, EventHandler, TypedEventBus},
	error::ConfigError,
	id,
	obs::{self, FlowKind, FlowSpan},
};

const ORIGIN_ID_LEN: usize = 16;

/// Message exchanged over a broadcast channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
	/// Identifier of the bus instance that published the message.
	pub origin: String,
	/// JSON-encoded event.
	pub payload: String,
}

/// Named publish/subscribe primitive connecting execution contexts.
pub trait BroadcastTransport
where
	Self: Send + Sync,
{
	/// Publishes `message` to every subscriber of `channel`.
	fn publish(&self, channel: &str, message: ChannelMessage);

	/// Subscribes to `channel`.
	fn subscribe(&self, channel: &str) -> Receiver<ChannelMessage>;
}

/// In-process [`BroadcastTransport`] with one Tokio broadcast channel per name.
#[derive(Debug)]
pub struct LocalBroadcastHub {
	capacity: usize,
	channels: Mutex<HashMap<String, Sender<ChannelMessage>>>,
}
impl LocalBroadcastHub {
	/// Default per-channel buffer size.
	pub const DEFAULT_CAPACITY: usize = 256;

	/// Creates a hub whose channels buffer up to `capacity` messages per subscriber.
	pub fn with_capacity(capacity: usize) -> Self {
		Self { capacity: capacity.max(1), channels: Default::default() }
	}

	fn sender(&self, channel: &str) -> Sender<ChannelMessage> {
		self.channels
			.lock()
			.entry(channel.to_owned())
			.or_insert_with(|| broadcast::channel(self.capacity).0)
			.clone()
	}
}
impl Default for LocalBroadcastHub {
	fn default() -> Self {
		Self::with_capacity(Self::DEFAULT_CAPACITY)
	}
}
impl BroadcastTransport for LocalBroadcastHub {
	fn publish(&self, channel: &str, message: ChannelMessage) {
		// No subscribers is not an error for a fire-and-forget channel.
		let _ = self.sender(channel).send(message);
	}

	fn subscribe(&self, channel: &str) -> Receiver<ChannelMessage> {
		self.sender(channel).subscribe()
	}
}

/// Wraps a local bus and mirrors its events to other contexts.
pub struct BroadcastTypedEventBus<E> {
	delegate: Arc<dyn TypedEventBus<E>>,
	transport: Arc<dyn BroadcastTransport>,
	channel: String,
	origin: String,
	listener: Mutex<Option<JoinHandle<()>>>,
}
impl<E> BroadcastTypedEventBus<E>
where
	E: 'static + Clone + Send + Sync + Serialize + DeserializeOwned,
{
	/// Wraps `delegate`, using its event type as the channel name.
	///
	/// Must be called from within a Tokio runtime; the inbound listener runs as a task.
	pub fn new(
		delegate: Arc<dyn TypedEventBus<E>>,
		transport: Arc<dyn BroadcastTransport>,
	) -> Result<Self> {
		let channel = delegate.event_type().to_owned();

		Self::with_channel(delegate, transport, channel)
	}

	/// Wraps `delegate`, publishing on an explicit `channel`.
	pub fn with_channel(
		delegate: Arc<dyn TypedEventBus<E>>,
		transport: Arc<dyn BroadcastTransport>,
		channel: impl Into<String>,
	) -> Result<Self> {
		let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;
		let channel = channel.into();
		let origin = id::random_id(ORIGIN_ID_LEN);
		let inbound = transport.subscribe(&channel);
		let listener =
			runtime.spawn(listen(inbound, delegate.clone(), channel.clone(), origin.clone()));

		Ok(Self { delegate, transport, channel, origin, listener: Mutex::new(Some(listener)) })
	}

	/// Channel this bus publishes on.
	pub fn channel(&self) -> &str {
		&self.channel
	}

	/// Identifier stamped on messages published by this bus.
	pub fn origin(&self) -> &str {
		&self.origin
	}

	fn stop_listener(&self) {
		if let Some(listener) = self.listener.lock().take() {
			listener.abort();
		}
	}
}
impl<E> TypedEventBus<E> for BroadcastTypedEventBus<E>
where
	E: 'static + Clone + Send + Sync + Serialize + DeserializeOwned,
{
	fn event_type(&self) -> &str {
		self.delegate.event_type()
	}

	fn handlers(&self) -> Vec<EventHandler<E>> {
		self.delegate.handlers()
	}

	fn on(&self, handler: EventHandler<E>) -> bool {
		self.delegate.on(handler)
	}

	fn off(&self, name: &str) -> bool {
		self.delegate.off(name)
	}

	fn emit(&self, event: E) -> BusFuture<'_> {
		let span = FlowSpan::new(FlowKind::Broadcast, "publish");

		Box::pin(span.instrument(async move {
			let payload = serde_json::to_string(&event);

			self.delegate.emit(event).await;

			match payload {
				Ok(payload) => self.transport.publish(
					&self.channel,
					ChannelMessage { origin: self.origin.clone(), payload },
				),
				Err(e) =>
					obs::log_isolated_failure(FlowKind::Broadcast, &self.channel, "publish", &e),
			}
		}))
	}

	fn destroy(&self) {
		self.stop_listener();
		self.delegate.destroy();
	}
}
impl<E> Debug for BroadcastTypedEventBus<E> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BroadcastTypedEventBus")
			.field("channel", &self.channel)
			.field("origin", &self.origin)
			.finish()
	}
}
impl<E> Drop for BroadcastTypedEventBus<E> {
	fn drop(&mut self) {
		if let Some(listener) = self.listener.get_mut().take() {
			listener.abort();
		}
	}
}

async fn listen<E>(
	mut inbound: Receiver<ChannelMessage>,
	delegate: Arc<dyn TypedEventBus<E>>,
	channel: String,
	origin: String,
) where
	E: 'static + Clone + Send + Sync + DeserializeOwned,
{
	loop {
		let message = match inbound.recv().await {
			Ok(message) => message,
			Err(RecvError::Lagged(skipped)) => {
				obs::log_isolated_failure(
					FlowKind::Broadcast,
					&channel,
					"listener",
					&format_args!("Skipped {skipped} lagging messages."),
				);

				continue;
			},
			Err(RecvError::Closed) => break,
		};

		if message.origin == origin {
			continue;
		}

		match serde_json::from_str::<E>(&message.payload) {
			Ok(event) => {
				let span = FlowSpan::new(FlowKind::Broadcast, "deliver");

				span.instrument(delegate.emit(event)).await;
			},
			Err(e) => obs::log_isolated_failure(FlowKind::Broadcast, &channel, "decode", &e),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::bus::{SequentialTypedEventBus, test_support::*};

	async fn settle() {
		for _ in 0..20 {
			tokio::task::yield_now().await;
		}

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	}

	fn context(
		hub: &Arc<LocalBroadcastHub>,
		log: &Deliveries,
		name: &str,
	) -> BroadcastTypedEventBus<u32> {
		let delegate: Arc<dyn TypedEventBus<u32>> =
			Arc::new(SequentialTypedEventBus::new("counter"));

		delegate.on(recorder(name, 0, log));

		BroadcastTypedEventBus::new(delegate, hub.clone())
			.expect("Broadcast bus should build inside a Tokio runtime.")
	}

	#[tokio::test]
	async fn emit_reaches_local_and_remote_contexts_without_echo() {
		let hub = Arc::new(LocalBroadcastHub::default());
		let log = Deliveries::default();
		let x = context(&hub, &log, "x");
		let y = context(&hub, &log, "y");
		let mut tap = hub.subscribe("counter");

		x.emit(42).await;

		// Local delivery has completed by the time emit resolves.
		assert_eq!(*log.lock(), [("x".to_owned(), 42)]);

		settle().await;

		assert_eq!(*log.lock(), [("x".to_owned(), 42), ("y".to_owned(), 42)]);

		let published = tap.try_recv().expect("Exactly one message should be published.");

		assert_eq!(published.origin, x.origin());
		assert!(tap.try_recv().is_err(), "Remote delivery must not be re-broadcast.");

		drop(y);
	}

	#[tokio::test]
	async fn malformed_remote_payloads_are_dropped() {
		let hub = Arc::new(LocalBroadcastHub::default());
		let log = Deliveries::default();
		let bus = context(&hub, &log, "local");

		hub.publish(
			"counter",
			ChannelMessage { origin: "elsewhere".into(), payload: "not-json".into() },
		);
		hub.publish("counter", ChannelMessage { origin: "elsewhere".into(), payload: "5".into() });
		settle().await;

		assert_eq!(*log.lock(), [("local".to_owned(), 5)]);

		bus.destroy();
	}

	#[tokio::test]
	async fn destroy_stops_inbound_delivery_and_clears_handlers() {
		let hub = Arc::new(LocalBroadcastHub::default());
		let log = Deliveries::default();
		let bus = context(&hub, &log, "local");

		bus.destroy();
		settle().await;
		hub.publish("counter", ChannelMessage { origin: "elsewhere".into(), payload: "1".into() });
		settle().await;

		assert!(log.lock().is_empty());
		assert!(bus.handlers().is_empty());
	}

	#[tokio::test]
	async fn explicit_channel_overrides_event_type() {
		let hub = Arc::new(LocalBroadcastHub::default());
		let delegate: Arc<dyn TypedEventBus<u32>> =
			Arc::new(SequentialTypedEventBus::new("counter"));
		let bus = BroadcastTypedEventBus::with_channel(delegate, hub.clone(), "custom")
			.expect("Broadcast bus should build inside a Tokio runtime.");
		let mut tap = hub.subscribe("custom");

		bus.emit(1).await;

		assert_eq!(bus.channel(), "custom");
		assert_eq!(bus.event_type(), "counter");
		assert_eq!(tap.try_recv().map(|m| m.payload).ok().as_deref(), Some("1"));
	}

	#[test]
	fn construction_outside_a_runtime_fails() {
		let hub = Arc::new(LocalBroadcastHub::default());
		let delegate: Arc<dyn TypedEventBus<u32>> =
			Arc::new(SequentialTypedEventBus::new("counter"));

		assert!(matches!(
			BroadcastTypedEventBus::new(delegate, hub),
			Err(Error::Config(ConfigError::MissingRuntime))
		));
	}
}
