//! Transport seam between the interceptor pipeline and an HTTP stack.
//!
//! The pipeline depends only on [`Transport`]. The crate ships [`ReqwestTransport`] behind the
//! `reqwest` feature; tests and embedders can plug in anything that turns an [`Exchange`] into
//! an [`ExchangeResponse`].

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
#[cfg(feature = "reqwest")] use crate::error::TransportError;
use crate::{
	_prelude::*,
	exchange::{Exchange, ExchangeResponse},
};

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ExchangeResponse>> + 'a + Send>>;

/// Sends a fully prepared exchange and captures the response.
///
/// Implementations resolve the URL with [`Exchange::resolved_url`], send the method, headers,
/// and encoded body as-is, and honor [`Exchange::timeout`]. Non-2xx statuses are responses,
/// not errors; status policy belongs to the pipeline.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends `exchange` and returns the raw response.
	fn send<'a>(&'a self, exchange: &'a Exchange) -> TransportFuture<'a>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send<'a>(&'a self, exchange: &'a Exchange) -> TransportFuture<'a> {
		Box::pin(async move {
			let url = exchange.resolved_url()?;
			let mut request =
				self.0.request(exchange.method.clone(), url).headers(exchange.headers.clone());

			if let Some(body) = &exchange.body {
				request = request.body(body.to_bytes()?);
			}
			if let Some(timeout) = exchange.timeout {
				request = request.timeout(timeout);
			}

			let response = request.send().await.map_err(TransportError::from)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(ExchangeResponse { status, headers, body })
		})
	}
}
