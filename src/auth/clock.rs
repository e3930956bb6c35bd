//! Time source used for expiry comparisons.

// self
use crate::_prelude::*;

/// Supplies the current instant to expiry checks.
pub trait Clock
where
	Self: Send + Sync + Debug,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}
