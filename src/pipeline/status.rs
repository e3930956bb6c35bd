//! Response stage rejecting unexpected HTTP statuses.

// crates.io
use futures::future;
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	exchange::Exchange,
	pipeline::{InterceptFuture, Interceptor},
};

/// Runs last among the built-in response stages.
pub const VALIDATE_STATUS_ORDER: i32 = i32::MAX - 10_000;

type StatusPredicate = dyn Fn(StatusCode) -> bool + Send + Sync;

/// Turns responses whose status fails the predicate into [`Error::HttpStatus`].
///
/// The default predicate accepts 2xx.
#[derive(Clone)]
pub struct ValidateStatusInterceptor {
	accept: Arc<StatusPredicate>,
}
impl ValidateStatusInterceptor {
	/// Registry name.
	pub const NAME: &'static str = "ValidateStatusInterceptor";

	/// Accepts exactly the statuses for which `accept` returns `true`.
	pub fn with_predicate(accept: impl 'static + Send + Sync + Fn(StatusCode) -> bool) -> Self {
		Self { accept: Arc::new(accept) }
	}

	fn check(&self, exchange: &Exchange) -> Result<()> {
		let Some(response) = &exchange.response else {
			return Ok(());
		};

		if (self.accept)(response.status) {
			return Ok(());
		}

		let url =
			exchange.resolved_url().map(String::from).unwrap_or_else(|_| exchange.url.clone());

		Err(Error::HttpStatus { status: response.status, url })
	}
}
impl Default for ValidateStatusInterceptor {
	fn default() -> Self {
		Self::with_predicate(|status| status.is_success())
	}
}
impl Debug for ValidateStatusInterceptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ValidateStatusInterceptor")
	}
}
impl Interceptor for ValidateStatusInterceptor {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn order(&self) -> i32 {
		VALIDATE_STATUS_ORDER
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		Box::pin(future::ready(self.check(exchange)))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::Method;
	// self
	use super::*;
	use crate::_preludet::json_response;

	fn answered(status: u16) -> Exchange {
		let mut exchange = Exchange::new(Method::GET, "https://api.example.com/items");

		exchange.response = Some(json_response(status, serde_json::json!({})));

		exchange
	}

	#[tokio::test]
	async fn non_success_statuses_become_errors() {
		let stage = ValidateStatusInterceptor::default();

		stage.intercept(&mut answered(204)).await.expect("2xx should pass.");

		let err = stage.intercept(&mut answered(404)).await.expect_err("404 should fail.");

		assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
		assert_eq!(
			err.to_string(),
			"Request to https://api.example.com/items failed with HTTP status 404 Not Found."
		);
	}

	#[tokio::test]
	async fn custom_predicate_and_missing_response() {
		let stage = ValidateStatusInterceptor::with_predicate(|status| status.as_u16() < 500);

		stage.intercept(&mut answered(404)).await.expect("404 is accepted here.");
		stage
			.intercept(&mut Exchange::new(Method::GET, "https://a.b"))
			.await
			.expect("Nothing to validate without a response.");

		assert!(stage.intercept(&mut answered(502)).await.is_err());
	}
}
