//! Access/refresh token pairs and their storage serializer.

// self
use crate::{
	_prelude::*,
	auth::{Clock, JwtPayload, JwtToken, TokenSecret},
	store::{Serializer, StoreError},
};

/// Server-issued access/refresh pair as it travels over the wire and into storage.
///
/// The two halves are always persisted and replaced together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeToken {
	/// Bearer token attached to requests.
	pub access_token: TokenSecret,
	/// Token exchanged for a new pair once the access token goes stale.
	pub refresh_token: TokenSecret,
}
impl CompositeToken {
	/// Pairs an access token with its refresh token.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
		}
	}

	/// Loggable digest identifying this pair (derived from the refresh token).
	pub fn fingerprint(&self) -> String {
		self.refresh_token.fingerprint()
	}
}
impl Debug for CompositeToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CompositeToken")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("fingerprint", &self.fingerprint())
			.finish()
	}
}

/// Decoded view over a [`CompositeToken`].
#[derive(Clone, Debug)]
pub struct JwtCompositeToken {
	access: JwtToken,
	refresh: JwtToken,
}
impl JwtCompositeToken {
	/// Decodes both halves of `token` with the same early expiry margin.
	pub fn new(token: CompositeToken, early_period: Duration) -> Self {
		let CompositeToken { access_token, refresh_token } = token;

		Self {
			access: JwtToken::new(access_token.expose(), early_period),
			refresh: JwtToken::new(refresh_token.expose(), early_period),
		}
	}

	/// Decoded access token.
	pub fn access(&self) -> &JwtToken {
		&self.access
	}

	/// Decoded refresh token.
	pub fn refresh(&self) -> &JwtToken {
		&self.refresh
	}

	/// Claims of the access token, i.e. the signed-in user.
	pub fn current_user(&self) -> Option<&JwtPayload> {
		self.access.payload()
	}

	/// Returns `true` when the access token is stale at `now`.
	pub fn is_refresh_needed_at(&self, now: OffsetDateTime) -> bool {
		self.access.is_expired_at(now)
	}

	/// Returns `true` when the refresh token is still usable at `now`.
	pub fn is_refreshable_at(&self, now: OffsetDateTime) -> bool {
		!self.refresh.is_expired_at(now)
	}

	/// [`Self::is_refresh_needed_at`] evaluated with `clock`.
	pub fn is_refresh_needed(&self, clock: &dyn Clock) -> bool {
		self.is_refresh_needed_at(clock.now())
	}

	/// [`Self::is_refreshable_at`] evaluated with `clock`.
	pub fn is_refreshable(&self, clock: &dyn Clock) -> bool {
		self.is_refreshable_at(clock.now())
	}

	/// Re-assembles the raw pair.
	pub fn to_composite(&self) -> CompositeToken {
		CompositeToken {
			access_token: self.access.token().clone(),
			refresh_token: self.refresh.token().clone(),
		}
	}
}

/// Stores [`JwtCompositeToken`] values as their camelCase JSON [`CompositeToken`] form.
#[derive(Clone, Copy, Debug, Default)]
pub struct JwtCompositeTokenSerializer {
	early_period: Duration,
}
impl JwtCompositeTokenSerializer {
	/// Creates a serializer that decodes tokens with the given early expiry margin.
	pub fn new(early_period: Duration) -> Self {
		Self { early_period }
	}
}
impl Serializer<JwtCompositeToken> for JwtCompositeTokenSerializer {
	fn serialize(&self, value: &JwtCompositeToken) -> Result<String, StoreError> {
		serde_json::to_string(&value.to_composite()).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize composite token: {e}"),
		})
	}

	fn deserialize(&self, raw: &str) -> Result<JwtCompositeToken, StoreError> {
		let token: CompositeToken =
			serde_json::from_str(raw).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse composite token: {e}"),
			})?;

		Ok(JwtCompositeToken::new(token, self.early_period))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{encode_test_jwt, test_composite_token};

	#[test]
	fn refresh_flags_follow_each_half() {
		let now = time::macros::datetime!(2025-06-01 12:00 UTC);
		let now_secs = now.unix_timestamp();
		let stale_but_refreshable = JwtCompositeToken::new(
			test_composite_token(now_secs - 10, now_secs + 3_600),
			Duration::ZERO,
		);

		assert!(stale_but_refreshable.is_refresh_needed_at(now));
		assert!(stale_but_refreshable.is_refreshable_at(now));

		let dead = JwtCompositeToken::new(
			test_composite_token(now_secs - 10, now_secs - 5),
			Duration::ZERO,
		);

		assert!(dead.is_refresh_needed_at(now));
		assert!(!dead.is_refreshable_at(now));

		let fresh = JwtCompositeToken::new(
			test_composite_token(now_secs + 600, now_secs + 3_600),
			Duration::ZERO,
		);

		assert!(!fresh.is_refresh_needed_at(now));
	}

	#[test]
	fn early_period_applies_to_both_halves() {
		let now = time::macros::datetime!(2025-06-01 12:00 UTC);
		let now_secs = now.unix_timestamp();
		let token = JwtCompositeToken::new(
			test_composite_token(now_secs + 30, now_secs + 30),
			Duration::minutes(1),
		);

		assert!(token.is_refresh_needed_at(now));
		assert!(!token.is_refreshable_at(now));
	}

	#[test]
	fn serializer_round_trip_preserves_raw_tokens_and_claims() {
		let original = CompositeToken::new(
			encode_test_jwt(serde_json::json!({
				"sub": "owner-7",
				"exp": 1_900_000_000_i64,
				"tenantId": "tenant-7",
				"policies": ["read"],
			})),
			encode_test_jwt(serde_json::json!({ "sub": "owner-7", "exp": 1_990_000_000_i64 })),
		);
		let serializer = JwtCompositeTokenSerializer::new(Duration::seconds(15));
		let decoded = JwtCompositeToken::new(original.clone(), Duration::seconds(15));
		let raw = serializer.serialize(&decoded).expect("Composite token should serialize.");

		assert!(raw.contains("\"accessToken\""));
		assert!(raw.contains("\"refreshToken\""));

		let restored = serializer.deserialize(&raw).expect("Composite token should deserialize.");

		assert_eq!(restored.to_composite(), original);
		assert_eq!(restored.access().payload(), decoded.access().payload());
		assert_eq!(restored.refresh().payload(), decoded.refresh().payload());
		assert_eq!(restored.access().early_period(), Duration::seconds(15));
	}

	#[test]
	fn serializer_rejects_garbage() {
		let serializer = JwtCompositeTokenSerializer::default();

		assert!(matches!(
			serializer.deserialize("{\"accessToken\":1}"),
			Err(StoreError::Serialization { .. })
		));
	}

	#[test]
	fn debug_redacts_both_halves() {
		let token = CompositeToken::new("access-raw", "refresh-raw");
		let rendered = format!("{token:?}");

		assert!(!rendered.contains("access-raw"));
		assert!(!rendered.contains("refresh-raw"));
		assert!(rendered.contains(&token.fingerprint()));
	}
}
