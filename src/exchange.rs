//! The mutable request/response record every pipeline stage reads and edits.

// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
	pipeline::Fetcher,
};

/// Path and query parameters applied to the URL template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlParams {
	/// Values substituted for `{name}` placeholders.
	pub path: BTreeMap<String, String>,
	/// Query pairs appended to the resolved URL.
	pub query: BTreeMap<String, String>,
}

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
	/// JSON document, encoded by the request body stage.
	Json(Value),
	/// UTF-8 text.
	Text(String),
	/// Raw bytes.
	Bytes(Vec<u8>),
}
impl Body {
	/// Encodes the payload for the wire.
	pub fn to_bytes(&self) -> Result<Vec<u8>> {
		Ok(match self {
			Self::Json(value) => serde_json::to_vec(value).map_err(ConfigError::from)?,
			Self::Text(text) => text.clone().into_bytes(),
			Self::Bytes(bytes) => bytes.clone(),
		})
	}

	/// Content type implied by the variant, if any.
	pub fn content_type(&self) -> Option<&'static str> {
		match self {
			Self::Json(_) => Some("application/json"),
			Self::Text(_) => Some("text/plain; charset=utf-8"),
			Self::Bytes(_) => None,
		}
	}
}

/// Response captured by the transport.
#[derive(Clone, Debug)]
pub struct ExchangeResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body.
	pub body: Vec<u8>,
}
impl ExchangeResponse {
	/// Response with `status`, `body`, and no headers.
	pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
		Self { status, headers: HeaderMap::new(), body }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Body decoded as JSON; failures carry the path of the offending field.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			TransportError::ResponseParse { source, status: self.status.as_u16() }.into()
		})
	}
}

/// One request/response round trip flowing through the interceptor pipeline.
///
/// Request stages edit the request fields; the transport fills in `response`; response stages
/// read it; error stages see `error` and may clear it to recover.
#[derive(Debug)]
pub struct Exchange {
	/// URL template, absolute or relative to the fetcher's base URL.
	pub url: String,
	/// HTTP method.
	pub method: Method,
	/// Request headers.
	pub headers: HeaderMap,
	/// Path and query parameters.
	pub url_params: UrlParams,
	/// Request payload.
	pub body: Option<Body>,
	/// Free-form per-exchange flags and values shared between stages.
	pub attributes: HashMap<String, Value>,
	/// Per-request timeout; the fetcher default applies when unset.
	pub timeout: Option<std::time::Duration>,
	/// Response, once received.
	pub response: Option<ExchangeResponse>,
	/// Failure recorded by a stage or the transport.
	pub error: Option<Error>,
	base_url: Option<Url>,
	fetcher: Option<Fetcher>,
	passes: u32,
}
impl Exchange {
	/// Exchange for `method` on the `url` template.
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			method,
			headers: HeaderMap::new(),
			url_params: UrlParams::default(),
			body: None,
			attributes: HashMap::new(),
			timeout: None,
			response: None,
			error: None,
			base_url: None,
			fetcher: None,
			passes: 0,
		}
	}

	/// Sets a `{name}` placeholder value.
	pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.url_params.path.insert(name.into(), value.into());

		self
	}

	/// Adds a query pair.
	pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.url_params.query.insert(name.into(), value.into());

		self
	}

	/// Sets a typed header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a header from strings, validating both halves.
	pub fn try_header(mut self, name: &str, value: &str) -> Result<Self> {
		let (name, value) = parse_header(name, value)?;

		self.headers.insert(name, value);

		Ok(self)
	}

	/// Sets the payload.
	pub fn body(mut self, body: Body) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `value` as the JSON payload.
	pub fn json<T>(self, value: &T) -> Result<Self>
	where
		T: Serialize,
	{
		let value = serde_json::to_value(value).map_err(ConfigError::from)?;

		Ok(self.body(Body::Json(value)))
	}

	/// Sets an attribute.
	pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attributes.insert(name.into(), value.into());

		self
	}

	/// Sets the per-request timeout.
	pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Returns `true` when the attribute `name` holds boolean `true`.
	pub fn has_flag(&self, name: &str) -> bool {
		matches!(self.attributes.get(name), Some(Value::Bool(true)))
	}

	/// Fetcher driving this exchange, once it entered a pipeline.
	pub fn fetcher(&self) -> Option<&Fetcher> {
		self.fetcher.as_ref()
	}

	/// Number of times the exchange entered the request stages; a replay adds one.
	pub fn passes(&self) -> u32 {
		self.passes
	}

	/// Names of the `{name}` placeholders in the URL template, in order of appearance.
	pub fn path_placeholders(&self) -> Vec<&str> {
		placeholders(&self.url).collect()
	}

	/// Expands the template, joins it onto the base URL, and appends the query pairs.
	///
	/// Relative templates always extend the base path: `/users` on `https://h/api/` yields
	/// `https://h/api/users`.
	pub fn resolved_url(&self) -> Result<Url> {
		let expanded = expand_template(&self.url, &self.url_params.path)?;
		let parsed = match &self.base_url {
			Some(base) if Url::parse(&expanded).is_err() =>
				base.join(expanded.trim_start_matches('/')),
			_ => Url::parse(&expanded),
		};
		let mut url =
			parsed.map_err(|source| ConfigError::InvalidUrl { value: expanded.clone(), source })?;

		if !self.url_params.query.is_empty() {
			let mut pairs = url.query_pairs_mut();

			for (name, value) in &self.url_params.query {
				pairs.append_pair(name, value);
			}
		}

		Ok(url)
	}

	/// Consumes the exchange, yielding its response or its error.
	pub fn into_response(self) -> Result<ExchangeResponse> {
		if let Some(e) = self.error {
			return Err(e);
		}

		self.response.ok_or_else(|| TransportError::NoResponse.into())
	}

	pub(crate) fn bind(&mut self, fetcher: Fetcher, base_url: Option<Url>) {
		self.fetcher = Some(fetcher);
		self.base_url = base_url;
		self.passes += 1;
	}
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
	let invalid = || ConfigError::InvalidHeader { name: name.to_owned() };
	let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
	let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

	Ok((header_name, header_value))
}

pub(crate) fn set_content_type_if_missing(headers: &mut HeaderMap, content_type: &'static str) {
	if !headers.contains_key(CONTENT_TYPE) {
		headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
	}
}

fn placeholders(template: &str) -> impl Iterator<Item = &str> {
	let mut rest = template;

	std::iter::from_fn(move || {
		loop {
			let open = rest.find('{')?;
			let close = open + rest[open..].find('}')?;
			let name = &rest[open + 1..close];

			rest = &rest[close + 1..];

			if !name.is_empty() {
				return Some(name);
			}
		}
	})
}

fn expand_template(template: &str, values: &BTreeMap<String, String>) -> Result<String> {
	let mut expanded = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(open) = rest.find('{') {
		let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
			break;
		};
		let name = &rest[open + 1..close];

		expanded.push_str(&rest[..open]);

		match values.get(name) {
			Some(value) => expanded.push_str(&urlencoding::encode(value)),
			None => return Err(ConfigError::UnresolvedPathParam { name: name.to_owned() }.into()),
		}

		rest = &rest[close + 1..];
	}

	expanded.push_str(rest);

	Ok(expanded)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn template_expansion_encodes_values_and_appends_query() {
		let mut exchange = Exchange::new(Method::GET, "/tenant/{tenantId}/files/{name}")
			.path_param("tenantId", "t-1")
			.path_param("name", "a b/c")
			.query_param("page", "2");

		exchange.base_url =
			Some(Url::parse("https://api.example.com/").expect("Base URL fixture should parse."));

		let url = exchange.resolved_url().expect("Template should resolve.");

		assert_eq!(url.as_str(), "https://api.example.com/tenant/t-1/files/a%20b%2Fc?page=2");
		assert_eq!(exchange.path_placeholders(), ["tenantId", "name"]);
	}

	#[test]
	fn unresolved_placeholders_are_reported() {
		let exchange = Exchange::new(Method::GET, "https://api.example.com/owner/{ownerId}");

		assert!(matches!(
			exchange.resolved_url(),
			Err(Error::Config(ConfigError::UnresolvedPathParam { name })) if name == "ownerId"
		));
	}

	#[test]
	fn relative_url_without_base_is_invalid() {
		let exchange = Exchange::new(Method::GET, "/relative");

		assert!(matches!(
			exchange.resolved_url(),
			Err(Error::Config(ConfigError::InvalidUrl { .. }))
		));
	}

	#[test]
	fn response_json_reports_the_failing_path() {
		#[derive(Debug, Deserialize)]
		struct Reply {
			#[allow(dead_code)]
			count: u32,
		}

		let response = ExchangeResponse::new(StatusCode::OK, br#"{"count":"many"}"#.to_vec());
		let err = response.json::<Reply>().expect_err("A string is not a count.");

		match err {
			Error::Transport(TransportError::ResponseParse { source, status }) => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "count");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
		assert_eq!(response.text(), r#"{"count":"many"}"#);
	}

	#[test]
	fn builders_fill_request_fields() {
		let exchange = Exchange::new(Method::POST, "https://api.example.com/items")
			.json(&serde_json::json!({ "name": "x" }))
			.expect("JSON body should encode.")
			.try_header("X-Trace", "abc")
			.expect("Header should be valid.")
			.attribute("Ignore-Refresh-Token", true)
			.timeout(std::time::Duration::from_secs(3));

		assert!(exchange.has_flag("Ignore-Refresh-Token"));
		assert!(!exchange.has_flag("missing"));
		assert_eq!(exchange.headers.get("x-trace").map(|v| v.as_bytes()), Some(&b"abc"[..]));
		assert_eq!(
			exchange.body.as_ref().map(Body::to_bytes).transpose().ok().flatten(),
			Some(br#"{"name":"x"}"#.to_vec())
		);
		assert!(matches!(
			Exchange::new(Method::GET, "https://a.b").try_header("bad header", "v"),
			Err(Error::Config(ConfigError::InvalidHeader { .. }))
		));
		assert!(matches!(
			Exchange::new(Method::GET, "https://a.b").into_response(),
			Err(Error::Transport(TransportError::NoResponse))
		));
	}
}
