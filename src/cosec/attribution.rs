//! Request stage filling tenant and owner placeholders from the signed-in user's claims.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	cosec::{ATTRIBUTION_REQUEST_ORDER, CoSecConfig},
	exchange::Exchange,
	pipeline::{InterceptFuture, Interceptor},
	store::TokenStorage,
};

/// Claim read for the tenant placeholder.
pub const TENANT_ID_CLAIM: &str = "tenantId";
/// Claim read for the owner placeholder.
pub const OWNER_ID_CLAIM: &str = "sub";

/// Fills `{tenantId}` and `{ownerId}` (names configurable) from the access token's claims.
///
/// Only placeholders present in the URL template are filled, and path parameters supplied by
/// the caller are never overwritten.
#[derive(Clone, Debug)]
pub struct ResourceAttributionRequestInterceptor {
	storage: TokenStorage,
	tenant_id_param: String,
	owner_id_param: String,
}
impl ResourceAttributionRequestInterceptor {
	/// Registry name.
	pub const NAME: &'static str = "ResourceAttributionRequestInterceptor";

	/// Stage reading claims from `storage` with the default placeholder names.
	pub fn new(storage: TokenStorage) -> Self {
		Self {
			storage,
			tenant_id_param: CoSecConfig::DEFAULT_TENANT_ID_PARAM.into(),
			owner_id_param: CoSecConfig::DEFAULT_OWNER_ID_PARAM.into(),
		}
	}

	/// Overrides the tenant placeholder name.
	pub fn tenant_id_param(mut self, name: impl Into<String>) -> Self {
		self.tenant_id_param = name.into();

		self
	}

	/// Overrides the owner placeholder name.
	pub fn owner_id_param(mut self, name: impl Into<String>) -> Self {
		self.owner_id_param = name.into();

		self
	}

	fn attribute(&self, exchange: &mut Exchange) {
		let Some(user) = self.storage.current_user() else {
			return;
		};
		let wanted = [
			(self.tenant_id_param.as_str(), TENANT_ID_CLAIM),
			(self.owner_id_param.as_str(), OWNER_ID_CLAIM),
		]
		.into_iter()
		.filter(|(param, _)| {
			!exchange.url_params.path.contains_key(*param)
				&& exchange.path_placeholders().contains(param)
		})
		.collect::<Vec<_>>();

		for (param, claim) in wanted {
			if let Some(value) = user.claim(claim) {
				exchange.url_params.path.insert(param.to_owned(), value);
			}
		}
	}
}
impl Interceptor for ResourceAttributionRequestInterceptor {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn order(&self) -> i32 {
		ATTRIBUTION_REQUEST_ORDER
	}

	fn intercept<'a>(&'a self, exchange: &'a mut Exchange) -> InterceptFuture<'a> {
		self.attribute(exchange);

		Box::pin(future::ready(Ok(())))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::Method;
	// self
	use super::*;
	use crate::{
		_preludet::{encode_test_jwt, test_backend, test_composite_token},
		auth::CompositeToken,
	};

	const FAR_FUTURE: i64 = 4_000_000_000;

	async fn signed_in_storage() -> TokenStorage {
		let storage = TokenStorage::new(test_backend(), Duration::ZERO);

		storage
			.sign_in(test_composite_token(FAR_FUTURE, FAR_FUTURE))
			.await
			.expect("Signing in should succeed.");

		storage
	}

	#[tokio::test]
	async fn fills_only_declared_and_missing_placeholders() {
		let stage = ResourceAttributionRequestInterceptor::new(signed_in_storage().await);
		let mut exchange = Exchange::new(Method::GET, "/tenant/{tenantId}/owner/{ownerId}/orders")
			.path_param("ownerId", "someone-else");

		stage.intercept(&mut exchange).await.expect("Attribution never fails.");

		assert_eq!(
			exchange.url_params.path.get("tenantId").map(String::as_str),
			Some("tenant-1")
		);
		assert_eq!(
			exchange.url_params.path.get("ownerId").map(String::as_str),
			Some("someone-else")
		);

		let mut untouched = Exchange::new(Method::GET, "/orders");

		stage.intercept(&mut untouched).await.expect("Attribution never fails.");

		assert!(untouched.url_params.path.is_empty());
	}

	#[tokio::test]
	async fn custom_placeholder_names_and_missing_claims() {
		let storage = TokenStorage::new(test_backend(), Duration::ZERO);

		storage
			.sign_in(CompositeToken::new(
				encode_test_jwt(serde_json::json!({ "sub": "owner-9" })),
				encode_test_jwt(serde_json::json!({ "sub": "owner-9" })),
			))
			.await
			.expect("Signing in should succeed.");

		let stage = ResourceAttributionRequestInterceptor::new(storage)
			.tenant_id_param("tenant")
			.owner_id_param("owner");
		let mut exchange = Exchange::new(Method::GET, "/t/{tenant}/o/{owner}");

		stage.intercept(&mut exchange).await.expect("Attribution never fails.");

		assert_eq!(exchange.url_params.path.get("owner").map(String::as_str), Some("owner-9"));
		assert!(!exchange.url_params.path.contains_key("tenant"));
	}

	#[tokio::test]
	async fn anonymous_exchanges_are_left_alone() {
		let storage = TokenStorage::new(test_backend(), Duration::ZERO);
		let stage = ResourceAttributionRequestInterceptor::new(storage);
		let mut exchange = Exchange::new(Method::GET, "/tenant/{tenantId}");

		stage.intercept(&mut exchange).await.expect("Attribution never fails.");

		assert!(exchange.url_params.path.is_empty());
	}
}
