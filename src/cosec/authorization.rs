//! Bearer credential stages: attach before sending, refresh and replay once on 401.

// crates.io
use http::{HeaderValue, StatusCode, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	cosec::{
		AUTHORIZATION_ATTACHED_ATTRIBUTE, AUTHORIZATION_REQUEST_ORDER,
		AUTHORIZATION_RESPONSE_ORDER, IGNORE_REFRESH_TOKEN_ATTRIBUTE, REPLAYED_ATTRIBUTE,
	},
	error::ConfigError,
	exchange::Exchange,
	obs::{self, FlowKind},
	pipeline::{InterceptFuture, Interceptor},
	refresh::TokenManager,
};

/// Attaches `Authorization: Bearer <access token>` unless the caller set one.
///
/// A stale access token is refreshed first when the refresh token is still usable and the
/// exchange does not carry the [`IGNORE_REFRESH_TOKEN_ATTRIBUTE`] flag. Without a stored
/// credential the exchange is sent anonymously.
#[derive(Clone, Debug)]
pub struct AuthorizationRequestInterceptor {
	manager: TokenManager,
}
impl AuthorizationRequestInterceptor {
	/// Registry name.
	pub const NAME: &'static str = "AuthorizationRequestInterceptor";

	/// Stage reading credentials from `manager`.
	pub fn new(manager: TokenManager) -> Self {
		Self { manager }
	}

	async fn authorize(&self, exchange: &mut Exchange) -> Result<()> {
		if exchange.headers.contains_key(AUTHORIZATION) {
			return Ok(());
		}

		let Some(mut token) = self.manager.current_token() else {
			return Ok(());
		};
		let clock = self.manager.storage().clock().clone();

		if token.is_refresh_needed(clock.as_ref())
			&& token.is_refreshable(clock.as_ref())
			&& !exchange.has_flag(IGNORE_REFRESH_TOKEN_ATTRIBUTE)
		{
			token = self.manager.refresh().await?;
		}

		let bearer = format!("Bearer {}", token.access().token().expose());
		let mut value = HeaderValue::from_str(&bearer)
			.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

		value.set_sensitive(true);
		exchange.headers.insert(AUTHORIZATION, value);
		exchange.attributes.insert(AUTHORIZATION_ATTACHED_ATTRIBUTE.into(), true.into());

		Ok(())
	}
}
impl Interceptor for AuthorizationRequestInterceptor {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn order(&self) -> i32 {
		AUTHORIZATION_REQUEST_ORDER
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		Box::pin(self.authorize(exchange))
	}
}

/// Turns a 401 into one refresh followed by one replay of the whole exchange.
///
/// The replay drops the header attached by [`AuthorizationRequestInterceptor`] so the fresh
/// access token is attached instead; a caller-supplied header is replayed as-is. A failed
/// refresh surfaces as [`Error::RefreshFailed`] with the credential already cleared.
#[derive(Clone, Debug)]
pub struct AuthorizationResponseInterceptor {
	manager: TokenManager,
}
impl AuthorizationResponseInterceptor {
	/// Registry name.
	pub const NAME: &'static str = "AuthorizationResponseInterceptor";

	/// Stage refreshing through `manager`.
	pub fn new(manager: TokenManager) -> Self {
		Self { manager }
	}

	async fn recover(&self, exchange: &mut Exchange) -> Result<()> {
		let unauthorized = exchange
			.response
			.as_ref()
			.is_some_and(|response| response.status == StatusCode::UNAUTHORIZED);

		if !unauthorized
			|| exchange.has_flag(REPLAYED_ATTRIBUTE)
			|| exchange.has_flag(IGNORE_REFRESH_TOKEN_ATTRIBUTE)
			|| !self.manager.is_refreshable()
		{
			return Ok(());
		}

		let Some(fetcher) = exchange.fetcher().cloned() else {
			return Ok(());
		};

		self.manager.refresh().await?;

		if exchange.attributes.remove(AUTHORIZATION_ATTACHED_ATTRIBUTE).is_some() {
			exchange.headers.remove(AUTHORIZATION);
		}

		exchange.attributes.insert(REPLAYED_ATTRIBUTE.into(), true.into());
		obs::log_flow_event(FlowKind::Exchange, &exchange.url, "Replaying after refresh.");

		fetcher.replay(exchange).await
	}
}
impl Interceptor for AuthorizationResponseInterceptor {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn order(&self) -> i32 {
		AUTHORIZATION_RESPONSE_ORDER
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		Box::pin(self.recover(exchange))
	}
}
