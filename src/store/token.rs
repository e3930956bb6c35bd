//! Persistent home of the signed-in credential pair.

// self
use crate::{
	_prelude::*,
	auth::{
		Clock, CompositeToken, JwtCompositeToken, JwtCompositeTokenSerializer, JwtPayload,
		SystemClock,
	},
	store::{KeyStorage, KeyValueBackend, StorageEventBus, StoreError},
};

/// Backend key holding the credential pair unless configured otherwise.
pub const DEFAULT_TOKEN_KEY: &str = "cosec-token";

/// Cached, change-aware storage for the current [`JwtCompositeToken`].
///
/// Both halves of the pair are always written and removed together.
#[derive(Clone, Debug)]
pub struct TokenStorage {
	storage: KeyStorage<JwtCompositeToken>,
	early_period: Duration,
	clock: Arc<dyn Clock>,
}
impl TokenStorage {
	/// Token storage under [`DEFAULT_TOKEN_KEY`] using the wall clock and no event bus.
	pub fn new(backend: Arc<dyn KeyValueBackend>, early_period: Duration) -> Self {
		Self::builder(backend).early_period(early_period).build()
	}

	/// Starts configuring a token storage over `backend`.
	pub fn builder(backend: Arc<dyn KeyValueBackend>) -> TokenStorageBuilder {
		TokenStorageBuilder {
			backend,
			key: DEFAULT_TOKEN_KEY.into(),
			early_period: Duration::ZERO,
			clock: Arc::new(SystemClock),
			bus: None,
		}
	}

	/// Backend key in use.
	pub fn key(&self) -> &str {
		self.storage.key()
	}

	/// Early expiry margin applied to both tokens.
	pub fn early_period(&self) -> Duration {
		self.early_period
	}

	/// Clock used for expiry decisions.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}

	/// Current credential pair, if any.
	pub fn get(&self) -> Option<JwtCompositeToken> {
		self.storage.get()
	}

	/// Replaces the stored pair.
	pub async fn set(&self, token: JwtCompositeToken) -> Result<(), StoreError> {
		self.storage.set(token).await
	}

	/// Decodes and stores a pair freshly issued by the server.
	pub async fn sign_in(&self, token: CompositeToken) -> Result<JwtCompositeToken, StoreError> {
		let token = JwtCompositeToken::new(token, self.early_period);

		self.storage.set(token.clone()).await?;

		Ok(token)
	}

	/// Deletes the stored pair.
	pub async fn remove(&self) -> Result<(), StoreError> {
		self.storage.remove().await
	}

	/// Signs the user out by deleting the stored pair.
	pub async fn sign_out(&self) -> Result<(), StoreError> {
		self.remove().await
	}

	/// Returns `true` while a pair is stored and its refresh token is still usable.
	pub fn authenticated(&self) -> bool {
		self.get().is_some_and(|token| token.is_refreshable(self.clock.as_ref()))
	}

	/// Claims of the stored access token.
	pub fn current_user(&self) -> Option<JwtPayload> {
		self.get().and_then(|token| token.current_user().cloned())
	}

	/// Stops listening for changes made by other writers.
	pub fn destroy(&self) {
		self.storage.destroy();
	}
}

/// Configures a [`TokenStorage`].
pub struct TokenStorageBuilder {
	backend: Arc<dyn KeyValueBackend>,
	key: String,
	early_period: Duration,
	clock: Arc<dyn Clock>,
	bus: Option<StorageEventBus>,
}
impl TokenStorageBuilder {
	/// Overrides [`DEFAULT_TOKEN_KEY`].
	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();

		self
	}

	/// Treats tokens as expired this long before their `exp` claim.
	pub fn early_period(mut self, early_period: Duration) -> Self {
		self.early_period = early_period.max(Duration::ZERO);

		self
	}

	/// Uses `clock` for expiry decisions.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Announces changes on `bus` and follows changes announced by other contexts.
	pub fn event_bus(mut self, bus: StorageEventBus) -> Self {
		self.bus = Some(bus);

		self
	}

	/// Wires the storage.
	pub fn build(self) -> TokenStorage {
		let mut builder = KeyStorage::builder(
			self.key,
			self.backend,
			JwtCompositeTokenSerializer::new(self.early_period),
		);

		if let Some(bus) = self.bus {
			builder = builder.event_bus(bus);
		}

		TokenStorage {
			storage: builder.build(),
			early_period: self.early_period,
			clock: self.clock,
		}
	}
}
impl Debug for TokenStorageBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStorageBuilder")
			.field("key", &self.key)
			.field("early_period", &self.early_period)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{FixedClock, test_backend, test_composite_token};

	#[tokio::test]
	async fn sign_in_then_sign_out() {
		let now = time::macros::datetime!(2025-06-01 12:00 UTC);
		let clock = Arc::new(FixedClock::new(now));
		let backend = test_backend();
		let storage = TokenStorage::builder(backend.clone()).clock(clock.clone()).build();
		let issued = test_composite_token(now.unix_timestamp() + 60, now.unix_timestamp() + 600);

		assert!(!storage.authenticated());

		storage.sign_in(issued.clone()).await.expect("Signing in should persist the pair.");

		assert!(storage.authenticated());
		assert_eq!(storage.get().map(|token| token.to_composite()), Some(issued));
		assert_eq!(
			storage.current_user().and_then(|user| user.tenant_id),
			Some("tenant-1".into())
		);
		assert!(
			backend
				.get_item(DEFAULT_TOKEN_KEY)
				.expect("Memory reads should succeed.")
				.is_some_and(|raw| raw.contains("accessToken"))
		);

		clock.advance(Duration::seconds(601));

		assert!(!storage.authenticated(), "An expired refresh token is not a session.");

		storage.sign_out().await.expect("Signing out should delete the pair.");

		assert!(storage.get().is_none());
		assert!(storage.current_user().is_none());
	}

	#[test]
	fn builder_clamps_negative_early_period_and_keeps_custom_key() {
		let storage = TokenStorage::builder(test_backend())
			.key("custom-token")
			.early_period(Duration::seconds(-5))
			.build();

		assert_eq!(storage.key(), "custom-token");
		assert_eq!(storage.early_period(), Duration::ZERO);
	}
}
