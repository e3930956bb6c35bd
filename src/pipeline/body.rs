//! Request stage declaring the payload's content type.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	exchange::{self, Exchange},
	pipeline::{InterceptFuture, Interceptor},
};

/// Runs first among the built-in request stages.
pub const REQUEST_BODY_ORDER: i32 = i32::MIN + 10_000;

/// Sets `Content-Type` from the body variant unless the caller chose one.
///
/// JSON bodies are declared as `application/json` and text bodies as UTF-8 plain text; raw
/// bytes are left undeclared.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestBodyInterceptor;
impl RequestBodyInterceptor {
	/// Registry name.
	pub const NAME: &'static str = "RequestBodyInterceptor";
}
impl Interceptor for RequestBodyInterceptor {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn order(&self) -> i32 {
		REQUEST_BODY_ORDER
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		if let Some(content_type) = exchange.body.as_ref().and_then(|body| body.content_type()) {
			exchange::set_content_type_if_missing(&mut exchange.headers, content_type);
		}

		Box::pin(future::ready(Ok(())))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::{HeaderValue, Method, header::CONTENT_TYPE};
	// self
	use super::*;
	use crate::exchange::Body;

	async fn content_type_after(exchange: Exchange) -> Option<HeaderValue> {
		let mut exchange = exchange;

		RequestBodyInterceptor
			.intercept(&mut exchange)
			.await
			.expect("Body stage never fails.");

		exchange.headers.get(CONTENT_TYPE).cloned()
	}

	#[tokio::test]
	async fn json_and_text_bodies_are_declared() {
		let json =
			Exchange::new(Method::POST, "https://a.b").body(Body::Json(serde_json::json!(1)));
		let text = Exchange::new(Method::POST, "https://a.b").body(Body::Text("hi".into()));
		let bytes = Exchange::new(Method::POST, "https://a.b").body(Body::Bytes(vec![1]));

		assert_eq!(
			content_type_after(json).await,
			Some(HeaderValue::from_static("application/json"))
		);
		assert_eq!(
			content_type_after(text).await,
			Some(HeaderValue::from_static("text/plain; charset=utf-8"))
		);
		assert_eq!(content_type_after(bytes).await, None);
	}

	#[tokio::test]
	async fn caller_content_type_is_kept() {
		let exchange = Exchange::new(Method::POST, "https://a.b")
			.header(CONTENT_TYPE, HeaderValue::from_static("application/merge-patch+json"))
			.body(Body::Json(serde_json::json!({})));

		assert_eq!(
			content_type_after(exchange).await,
			Some(HeaderValue::from_static("application/merge-patch+json"))
		);
	}
}
