//! Credential lifecycle: refresh decisions and a single-flight refresh shared by every caller.
//!
//! [`TokenManager::refresh`] installs at most one refresh future at a time. Callers that arrive
//! while it is in flight join it and observe the same outcome. The installed future clears the
//! manager state before any waiter sees its output, and again if every waiter is dropped, so a
//! settled refresh is never handed to a late caller.

mod metrics;
mod refresher;

pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
pub use refresher::*;

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Instant,
};
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
// self
use crate::{
	_prelude::*,
	auth::JwtCompositeToken,
	error::RefreshTokenError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStorage,
};

type RefreshOutput = std::result::Result<JwtCompositeToken, RefreshTokenError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutput>>;

enum RefreshState {
	Idle,
	Refreshing { generation: u64, future: WeakShared<BoxFuture<'static, RefreshOutput>> },
}

/// Returns the manager to [`RefreshState::Idle`] when the refresh future settles or is dropped.
struct SettleGuard {
	state: Arc<Mutex<RefreshState>>,
	generation: u64,
}
impl Drop for SettleGuard {
	fn drop(&mut self) {
		let mut state = self.state.lock();

		let settled = matches!(
			*state,
			RefreshState::Refreshing { generation, .. } if generation == self.generation
		);

		if settled {
			*state = RefreshState::Idle;
		}
	}
}

/// Decides when the stored credential needs a refresh and runs refreshes single-flight.
#[derive(Clone)]
pub struct TokenManager {
	inner: Arc<ManagerInner>,
}
struct ManagerInner {
	storage: TokenStorage,
	refresher: Arc<dyn TokenRefresher>,
	metrics: Arc<RefreshMetrics>,
	state: Arc<Mutex<RefreshState>>,
	next_generation: AtomicU64,
}
impl TokenManager {
	/// Manager refreshing the pair held by `storage` through `refresher`.
	pub fn new(storage: TokenStorage, refresher: Arc<dyn TokenRefresher>) -> Self {
		Self {
			inner: Arc::new(ManagerInner {
				storage,
				refresher,
				metrics: Default::default(),
				state: Arc::new(Mutex::new(RefreshState::Idle)),
				next_generation: AtomicU64::new(0),
			}),
		}
	}

	/// Credential store this manager writes to.
	pub fn storage(&self) -> &TokenStorage {
		&self.inner.storage
	}

	/// Refresh counters for this manager.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.inner.metrics
	}

	/// Current credential pair, if any.
	pub fn current_token(&self) -> Option<JwtCompositeToken> {
		self.inner.storage.get()
	}

	/// Returns `true` when a pair is stored and its access token is stale.
	pub fn is_refresh_needed(&self) -> bool {
		let clock = self.inner.storage.clock();

		self.current_token().is_some_and(|token| token.is_refresh_needed(clock.as_ref()))
	}

	/// Returns `true` when a pair is stored and its refresh token is still usable.
	pub fn is_refreshable(&self) -> bool {
		let clock = self.inner.storage.clock();

		self.current_token().is_some_and(|token| token.is_refreshable(clock.as_ref()))
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(*self.inner.state.lock(), RefreshState::Refreshing { .. })
	}

	/// Refreshes the stored pair, joining the refresh already in flight if there is one.
	///
	/// On failure the stored pair is removed and [`Error::RefreshFailed`] is returned to every
	/// caller sharing the attempt.
	pub async fn refresh(&self) -> Result<JwtCompositeToken> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "token_manager_refresh");

		span.instrument(async move {
			let shared = self.join_or_start()?;

			shared.await.map_err(Error::from)
		})
		.await
	}

	/// Joins the installed refresh or installs a new one, under a single state lock.
	fn join_or_start(&self) -> Result<SharedRefresh> {
		let inner = &self.inner;
		let mut state = inner.state.lock();
		let joined = match &*state {
			RefreshState::Refreshing { future, .. } => future.upgrade(),
			RefreshState::Idle => None,
		};

		if let Some(shared) = joined {
			inner.metrics.record_joined();
			obs::log_flow_event(
				FlowKind::Refresh,
				inner.storage.key(),
				"Joined in-flight refresh.",
			);

			return Ok(shared);
		}

		let token = inner.storage.get().ok_or(Error::NoCredential)?;
		let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
		let guard = SettleGuard { state: inner.state.clone(), generation };
		let shared = run_refresh(
			token,
			inner.storage.clone(),
			inner.refresher.clone(),
			inner.metrics.clone(),
			guard,
		)
		.boxed()
		.shared();

		if let Some(future) = shared.downgrade() {
			*state = RefreshState::Refreshing { generation, future };
		}

		Ok(shared)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("storage", &self.inner.storage)
			.field("refreshing", &self.is_refreshing())
			.field("metrics", &self.inner.metrics)
			.finish()
	}
}

async fn run_refresh(
	token: JwtCompositeToken,
	storage: TokenStorage,
	refresher: Arc<dyn TokenRefresher>,
	metrics: Arc<RefreshMetrics>,
	guard: SettleGuard,
) -> RefreshOutput {
	const KIND: FlowKind = FlowKind::Refresh;

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
	metrics.record_attempt();

	let started = Instant::now();

	let current = token.to_composite();
	let outcome = match refresher.refresh(&current).await {
		Ok(fresh) => {
			let fresh = JwtCompositeToken::new(fresh, storage.early_period());

			storage.set(fresh.clone()).await.map(|()| fresh).map_err(Error::from)
		},
		Err(e) => Err(e),
	};

	if outcome.is_err() {
		let removed = storage.remove().await;

		if let Err(remove_err) = removed {
			obs::log_isolated_failure(KIND, storage.key(), "remove", &remove_err);
		}
	}

	// Settle before any waiter observes the output.
	drop(guard);

	let elapsed = started.elapsed();

	match outcome {
		Ok(fresh) => {
			metrics.record_success();
			obs::record_flow_outcome(KIND, FlowOutcome::Success);
			obs::record_flow_duration(KIND, FlowOutcome::Success, elapsed);
			obs::log_flow_event(KIND, storage.key(), "Credential refreshed.");

			Ok(fresh)
		},
		Err(e) => {
			metrics.record_failure();
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			obs::record_flow_duration(KIND, FlowOutcome::Failure, elapsed);
			obs::log_isolated_failure(KIND, storage.key(), "refresh", &e);

			Err(RefreshTokenError::new(current, e))
		},
	}
}
