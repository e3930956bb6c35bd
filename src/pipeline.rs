//! Ordered interceptor pipeline driving an [`Exchange`] through request, transport, response,
//! and error stages.
//!
//! # Flow
//!
//! 1. Request stages run in ascending order. A stage may short-circuit the transport by
//!    setting [`Exchange::response`].
//! 2. The [`Transport`] sends the request unless a response is already present.
//! 3. Response stages run in ascending order.
//! 4. Any failure in steps 1-3 is stored in [`Exchange::error`] and the error stages run. If
//!    they clear the error and a response is present, the exchange succeeds; otherwise the
//!    (possibly replaced) error is returned.

pub mod body;
pub mod status;

pub use body::*;
pub use status::*;

// std
use std::time::Instant;
// crates.io
use futures::future;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
// self
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	exchange::{Body, Exchange, ExchangeResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	registry::{Ordered, OrderedRegistry},
	transport::Transport,
};

/// Future returned by [`Interceptor::intercept`].
pub type InterceptFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// A named, ordered pipeline stage.
pub trait Interceptor
where
	Self: Send + Sync,
{
	/// Unique name within its registry.
	fn name(&self) -> &str;

	/// Position within its registry (ascending).
	fn order(&self) -> i32;

	/// Reads or edits `exchange`; an error aborts the remaining stages of the same kind.
	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a>;
}
impl Ordered for Arc<dyn Interceptor> {
	fn name(&self) -> &str {
		Interceptor::name(self.as_ref())
	}

	fn order(&self) -> i32 {
		Interceptor::order(self.as_ref())
	}
}

/// Synchronous stage built from a closure.
pub struct FnInterceptor<F> {
	name: String,
	order: i32,
	intercept: F,
}
impl<F> FnInterceptor<F>
where
	F: 'static + Send + Sync + Fn(&mut Exchange) -> Result<()>,
{
	/// Wraps `intercept` as a stage called `name`.
	pub fn new(name: impl Into<String>, order: i32, intercept: F) -> Self {
		Self { name: name.into(), order, intercept }
	}
}
impl<F> Interceptor for FnInterceptor<F>
where
	F: 'static + Send + Sync + Fn(&mut Exchange) -> Result<()>,
{
	fn name(&self) -> &str {
		&self.name
	}

	fn order(&self) -> i32 {
		self.order
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		Box::pin(future::ready((self.intercept)(exchange)))
	}
}
impl<F> Debug for FnInterceptor<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FnInterceptor")
			.field("name", &self.name)
			.field("order", &self.order)
			.finish()
	}
}

/// Stages of one kind, unique by name and sorted by order.
#[derive(Default)]
pub struct InterceptorRegistry {
	registry: OrderedRegistry<Arc<dyn Interceptor>>,
}
impl InterceptorRegistry {
	/// Registers `interceptor`; returns `false` (and changes nothing) if its name is taken.
	pub fn use_interceptor(&self, interceptor: impl 'static + Interceptor) -> bool {
		self.use_shared(Arc::new(interceptor))
	}

	/// Registers an already shared stage.
	pub fn use_shared(&self, interceptor: Arc<dyn Interceptor>) -> bool {
		self.registry.insert(interceptor)
	}

	/// Removes the stage called `name`.
	pub fn eject(&self, name: &str) -> bool {
		self.registry.remove(name)
	}

	/// Ordered snapshot of the registered stages.
	pub fn interceptors(&self) -> Vec<Arc<dyn Interceptor>> {
		self.registry.snapshot()
	}

	/// Names of the registered stages, in execution order.
	pub fn names(&self) -> Vec<String> {
		self.registry.snapshot().iter().map(|stage| stage.name().to_owned()).collect()
	}

	/// Number of registered stages.
	pub fn len(&self) -> usize {
		self.registry.len()
	}

	/// Returns `true` when no stage is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Removes every stage.
	pub fn clear(&self) {
		self.registry.clear();
	}

	/// Runs every stage against `exchange` in ascending order, stopping at the first error.
	///
	/// A stage that replays the exchange also ends the loop: the replay already ran the
	/// remaining stages against the new response.
	pub async fn apply(&self, exchange: &mut Exchange) -> Result<()> {
		let pass = exchange.passes();

		for stage in self.registry.snapshot() {
			stage.intercept(exchange).await?;

			if exchange.passes() != pass {
				break;
			}
		}

		Ok(())
	}
}
impl Debug for InterceptorRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_list().entries(self.names()).finish()
	}
}

/// The three stage registries of a [`Fetcher`].
#[derive(Debug, Default)]
pub struct InterceptorManager {
	/// Stages run before the transport.
	pub request: InterceptorRegistry,
	/// Stages run after the transport.
	pub response: InterceptorRegistry,
	/// Stages run when any earlier step failed.
	pub error: InterceptorRegistry,
}

/// Entry point that drives exchanges through the interceptor pipeline.
///
/// Cloning is cheap; clones share the transport and the stage registries.
#[derive(Clone)]
pub struct Fetcher {
	inner: Arc<FetcherInner>,
}
impl Fetcher {
	/// Starts configuring a fetcher.
	pub fn builder() -> FetcherBuilder {
		FetcherBuilder::default()
	}

	/// Base URL relative templates are resolved against.
	pub fn base_url(&self) -> Option<&Url> {
		self.inner.base_url.as_ref()
	}

	/// Stage registries; stages may be added or ejected at any time.
	pub fn interceptors(&self) -> &InterceptorManager {
		&self.inner.interceptors
	}

	/// Drives `exchange` through the pipeline and returns it with its response.
	pub async fn exchange(&self, mut exchange: Exchange) -> Result<Exchange> {
		self.run(&mut exchange).await?;

		Ok(exchange)
	}

	/// Drives `exchange` through the pipeline and returns its response.
	pub async fn fetch(&self, exchange: Exchange) -> Result<ExchangeResponse> {
		self.exchange(exchange).await?.into_response()
	}

	/// Re-runs request, transport, and response stages for an exchange already in flight.
	///
	/// The previous response and error are discarded first. Failures are returned to the
	/// caller (typically a response stage) rather than handed to the error stages, which run
	/// once for the outer exchange. The stage registry that called `replay` stops after the
	/// calling stage, so every stage sees the replayed response once.
	pub fn replay<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		exchange.response = None;
		exchange.error = None;

		self.run_stages(exchange)
	}

	/// Starts an exchange bound to this fetcher.
	pub fn request(&self, method: Method, url: impl Into<String>) -> FetchRequest {
		FetchRequest { fetcher: self.clone(), exchange: Exchange::new(method, url) }
	}

	/// `GET url`.
	pub async fn get(&self, url: impl Into<String>) -> Result<ExchangeResponse> {
		self.fetch(Exchange::new(Method::GET, url)).await
	}

	/// `DELETE url`.
	pub async fn delete(&self, url: impl Into<String>) -> Result<ExchangeResponse> {
		self.fetch(Exchange::new(Method::DELETE, url)).await
	}

	/// `POST url` with `body`.
	pub async fn post(&self, url: impl Into<String>, body: Body) -> Result<ExchangeResponse> {
		self.fetch(Exchange::new(Method::POST, url).body(body)).await
	}

	/// `PUT url` with `body`.
	pub async fn put(&self, url: impl Into<String>, body: Body) -> Result<ExchangeResponse> {
		self.fetch(Exchange::new(Method::PUT, url).body(body)).await
	}

	/// `PATCH url` with `body`.
	pub async fn patch(&self, url: impl Into<String>, body: Body) -> Result<ExchangeResponse> {
		self.fetch(Exchange::new(Method::PATCH, url).body(body)).await
	}

	async fn run(&self, exchange: &mut Exchange) -> Result<()> {
		let span = FlowSpan::new(FlowKind::Exchange, "exchange");

		obs::record_flow_outcome(FlowKind::Exchange, FlowOutcome::Attempt);

		let started = Instant::now();
		let result = span
			.instrument(async {
				let Err(e) = self.run_stages(exchange).await else {
					return Ok(());
				};

				exchange.error = Some(e);
				self.inner.interceptors.error.apply(exchange).await?;

				if let Some(e) = exchange.error.take() {
					return Err(e);
				}
				if exchange.response.is_none() {
					return Err(TransportError::NoResponse.into());
				}

				Ok(())
			})
			.await;
		let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

		obs::record_flow_outcome(FlowKind::Exchange, outcome);
		obs::record_flow_duration(FlowKind::Exchange, outcome, started.elapsed());

		result
	}

	fn run_stages<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		Box::pin(async move {
			self.prepare(exchange);
			self.inner.interceptors.request.apply(exchange).await?;

			if exchange.response.is_none() {
				let response = self.inner.transport.send(exchange).await?;

				exchange.response = Some(response);
			}

			self.inner.interceptors.response.apply(exchange).await
		})
	}

	fn prepare(&self, exchange: &mut Exchange) {
		exchange.bind(self.clone(), self.inner.base_url.clone());

		for (name, value) in &self.inner.default_headers {
			if !exchange.headers.contains_key(name) {
				exchange.headers.insert(name.clone(), value.clone());
			}
		}

		if exchange.timeout.is_none() {
			exchange.timeout = self.inner.timeout;
		}
	}
}
impl Debug for Fetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Fetcher")
			.field("base_url", &self.inner.base_url)
			.field("interceptors", &self.inner.interceptors)
			.finish()
	}
}

/// An [`Exchange`] under construction, bound to the [`Fetcher`] that will drive it.
#[derive(Debug)]
pub struct FetchRequest {
	fetcher: Fetcher,
	exchange: Exchange,
}
impl FetchRequest {
	/// Binds the `{name}` placeholder.
	pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.exchange = self.exchange.path_param(name, value);

		self
	}

	/// Appends a query pair.
	pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.exchange = self.exchange.query_param(name, value);

		self
	}

	/// Sets a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.exchange = self.exchange.header(name, value);

		self
	}

	/// Sets the payload.
	pub fn body(mut self, body: Body) -> Self {
		self.exchange = self.exchange.body(body);

		self
	}

	/// Serializes `value` as the JSON payload.
	pub fn json<T>(mut self, value: &T) -> Result<Self>
	where
		T: Serialize,
	{
		self.exchange = self.exchange.json(value)?;

		Ok(self)
	}

	/// Sets an exchange attribute read by the stages.
	pub fn attribute(
		mut self,
		name: impl Into<String>,
		value: impl Into<serde_json::Value>,
	) -> Self {
		self.exchange = self.exchange.attribute(name, value);

		self
	}

	/// Sets the per-request timeout.
	pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
		self.exchange = self.exchange.timeout(timeout);

		self
	}

	/// Drives the exchange and returns it with its response.
	pub async fn exchange(self) -> Result<Exchange> {
		self.fetcher.exchange(self.exchange).await
	}

	/// Drives the exchange and returns its response.
	pub async fn send(self) -> Result<ExchangeResponse> {
		self.fetcher.fetch(self.exchange).await
	}
}

struct FetcherInner {
	base_url: Option<Url>,
	transport: Arc<dyn Transport>,
	default_headers: HeaderMap,
	timeout: Option<std::time::Duration>,
	interceptors: InterceptorManager,
}

/// Configures a [`Fetcher`].
///
/// Unless disabled, [`RequestBodyInterceptor`] and [`ValidateStatusInterceptor`] are installed
/// at build time (a stage registered earlier under the same name wins).
pub struct FetcherBuilder {
	base_url: Option<String>,
	transport: Option<Arc<dyn Transport>>,
	default_headers: HeaderMap,
	timeout: Option<std::time::Duration>,
	interceptors: InterceptorManager,
	default_interceptors: bool,
}
impl FetcherBuilder {
	/// Resolves relative templates against `base_url`.
	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());

		self
	}

	/// Sends requests through `transport`.
	pub fn transport(self, transport: impl Transport) -> Self {
		self.shared_transport(Arc::new(transport))
	}

	/// Sends requests through an already shared transport.
	pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Adds a header to every exchange that does not set it already.
	pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.default_headers.insert(name, value);

		self
	}

	/// Timeout applied to exchanges that do not set one.
	pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Registers a request stage.
	pub fn request_interceptor(self, interceptor: impl 'static + Interceptor) -> Self {
		self.interceptors.request.use_interceptor(interceptor);

		self
	}

	/// Registers a response stage.
	pub fn response_interceptor(self, interceptor: impl 'static + Interceptor) -> Self {
		self.interceptors.response.use_interceptor(interceptor);

		self
	}

	/// Registers an error stage.
	pub fn error_interceptor(self, interceptor: impl 'static + Interceptor) -> Self {
		self.interceptors.error.use_interceptor(interceptor);

		self
	}

	/// Skips the built-in body and status stages.
	pub fn without_default_interceptors(mut self) -> Self {
		self.default_interceptors = false;

		self
	}

	/// Validates the configuration and builds the fetcher.
	pub fn build(self) -> Result<Fetcher> {
		let base_url = self.base_url.map(|raw| parse_base_url(&raw)).transpose()?;
		let transport = match self.transport {
			Some(transport) => transport,
			None => default_transport()?,
		};

		if self.default_interceptors {
			self.interceptors.request.use_interceptor(RequestBodyInterceptor);
			self.interceptors.response.use_interceptor(ValidateStatusInterceptor::default());
		}

		Ok(Fetcher {
			inner: Arc::new(FetcherInner {
				base_url,
				transport,
				default_headers: self.default_headers,
				timeout: self.timeout,
				interceptors: self.interceptors,
			}),
		})
	}
}
impl Default for FetcherBuilder {
	fn default() -> Self {
		Self {
			base_url: None,
			transport: None,
			default_headers: HeaderMap::new(),
			timeout: None,
			interceptors: InterceptorManager::default(),
			default_interceptors: true,
		}
	}
}
impl Debug for FetcherBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FetcherBuilder")
			.field("base_url", &self.base_url)
			.field("interceptors", &self.interceptors)
			.finish()
	}
}

fn parse_base_url(raw: &str) -> Result<Url> {
	let mut url =
		Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { value: raw.into(), source })?;

	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	Ok(url)
}

#[cfg(feature = "reqwest")]
pub(crate) fn default_transport() -> Result<Arc<dyn Transport>> {
	Ok(Arc::new(ReqwestTransport::default()))
}

#[cfg(not(feature = "reqwest"))]
pub(crate) fn default_transport() -> Result<Arc<dyn Transport>> {
	Err(ConfigError::MissingTransport.into())
}
