//! The network half of a credential refresh.

// crates.io
use http::{HeaderValue, Method, header::CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	auth::CompositeToken,
	exchange::Exchange,
	transport::Transport,
};

/// Future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<CompositeToken>> + 'a + Send>>;

/// Exchanges a credential pair for a fresh one.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Returns the pair that replaces `token`.
	fn refresh<'a>(&'a self, token: &'a CompositeToken) -> RefreshFuture<'a>;
}

/// POSTs the current pair as JSON to a refresh endpoint and reads the new pair from the reply.
///
/// The request bypasses the interceptor pipeline so a refresh can never trigger another one.
pub struct EndpointTokenRefresher {
	endpoint: Url,
	transport: Arc<dyn Transport>,
}
impl EndpointTokenRefresher {
	/// Refresher posting to `endpoint` through `transport`.
	pub fn new(endpoint: Url, transport: Arc<dyn Transport>) -> Self {
		Self { endpoint, transport }
	}

	/// Refresh endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn exchange(&self, token: &CompositeToken) -> Result<CompositeToken> {
		let exchange = Exchange::new(Method::POST, self.endpoint.as_str())
			.header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.json(token)?;
		let response = self.transport.send(&exchange).await?;

		if !response.is_success() {
			return Err(Error::HttpStatus {
				status: response.status,
				url: self.endpoint.to_string(),
			});
		}

		response.json()
	}
}
impl Debug for EndpointTokenRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EndpointTokenRefresher").field("endpoint", &self.endpoint.as_str()).finish()
	}
}
impl TokenRefresher for EndpointTokenRefresher {
	fn refresh<'a>(&'a self, token: &'a CompositeToken) -> RefreshFuture<'a> {
		Box::pin(self.exchange(token))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, json_response};

	fn endpoint() -> Url {
		Url::parse("https://auth.example.com/token/refresh")
			.expect("Endpoint fixture should parse.")
	}

	#[tokio::test]
	async fn posts_the_pair_and_decodes_the_reply() {
		let transport = Arc::new(ScriptedTransport::new(|exchange| {
			let sent = exchange.body.clone().expect("Refresh request should carry a body.");

			assert_eq!(
				sent.to_bytes().expect("Body should encode."),
				br#"{"accessToken":"old-a","refreshToken":"old-r"}"#.to_vec()
			);

			Ok(json_response(
				200,
				serde_json::json!({ "accessToken": "new-a", "refreshToken": "new-r" }),
			))
		}));
		let refresher = EndpointTokenRefresher::new(endpoint(), transport.clone());
		let fresh = refresher
			.refresh(&CompositeToken::new("old-a", "old-r"))
			.await
			.expect("Refresh should succeed.");
		let calls = transport.calls();

		assert_eq!(fresh, CompositeToken::new("new-a", "new-r"));
		assert_eq!(calls[0].method, Method::POST);
		assert_eq!(calls[0].url, endpoint());
		assert_eq!(calls[0].header("content-type"), Some("application/json"));
		assert!(calls[0].header("authorization").is_none());
	}

	#[tokio::test]
	async fn rejected_refresh_reports_the_status() {
		let transport =
			ScriptedTransport::new(|_| Ok(json_response(401, serde_json::json!({}))));
		let refresher = EndpointTokenRefresher::new(endpoint(), Arc::new(transport));
		let err = refresher
			.refresh(&CompositeToken::new("a", "r"))
			.await
			.expect_err("401 should fail the refresh.");

		assert_eq!(err.status(), Some(http::StatusCode::UNAUTHORIZED));
	}
}
