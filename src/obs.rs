//! Optional observability helpers for exchanges, refreshes, and event delivery.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `cosec_fetcher.flow` with the `flow` and
//!   `stage` (call site) fields, plus warning events for isolated failures.
//! - Enable `metrics` to increment the `cosec_fetcher_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// A request driven through the interceptor pipeline.
	Exchange,
	/// A credential refresh round trip.
	Refresh,
	/// Local delivery of an event to bus handlers.
	Emit,
	/// Cross-context publish or inbound delivery.
	Broadcast,
	/// Cached key-value reads and change notifications.
	Storage,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Exchange => "exchange",
			FlowKind::Refresh => "refresh",
			FlowKind::Emit => "emit",
			FlowKind::Broadcast => "broadcast",
			FlowKind::Storage => "storage",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller (or isolated, for handlers).
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
