//! JWT claim decoding and expiry arithmetic.
//!
//! Tokens are decoded, never verified: the server that issued them is the only party that
//! checks signatures. A token whose payload cannot be decoded is treated as expired so a
//! corrupted credential is never attached to a request.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Claims carried by an access or refresh token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtPayload {
	/// Subject (the owner of the credential).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Expiry, in unix seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// Issued-at, in unix seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iat: Option<i64>,
	/// Not-before, in unix seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nbf: Option<i64>,
	/// Token identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jti: Option<String>,
	/// Issuer.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iss: Option<String>,
	/// Audience (string or array).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub aud: Option<serde_json::Value>,
	/// Tenant the credential belongs to.
	#[serde(default, rename = "tenantId", skip_serializing_if = "Option::is_none")]
	pub tenant_id: Option<String>,
	/// Every other claim, keyed by claim name.
	#[serde(flatten)]
	pub custom: BTreeMap<String, serde_json::Value>,
}
impl JwtPayload {
	/// Looks up a claim by its wire name and renders it as a string.
	///
	/// Strings are returned verbatim; numbers and booleans are formatted; objects, arrays,
	/// and nulls yield `None`.
	pub fn claim(&self, name: &str) -> Option<String> {
		match name {
			"sub" => self.sub.clone(),
			"tenantId" => self.tenant_id.clone(),
			"jti" => self.jti.clone(),
			"iss" => self.iss.clone(),
			"exp" => self.exp.map(|v| v.to_string()),
			"iat" => self.iat.map(|v| v.to_string()),
			"nbf" => self.nbf.map(|v| v.to_string()),
			_ => match self.custom.get(name)? {
				serde_json::Value::String(s) => Some(s.clone()),
				serde_json::Value::Number(n) => Some(n.to_string()),
				serde_json::Value::Bool(b) => Some(b.to_string()),
				_ => None,
			},
		}
	}

	/// Expiry as an instant, when the claim is present and representable.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.exp.and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
	}
}

/// Decodes the payload segment of a compact JWT.
///
/// Returns `None` unless the token has exactly three segments and the middle one is
/// base64url-encoded JSON (padding and the standard alphabet are tolerated).
pub fn parse_jwt_payload(token: &str) -> Option<JwtPayload> {
	let mut segments = token.split('.');
	let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);

	if segments.next().is_some() || payload.is_empty() {
		return None;
	}

	let normalized: String = payload
		.trim_end_matches('=')
		.chars()
		.map(|c| match c {
			'+' => '-',
			'/' => '_',
			other => other,
		})
		.collect();
	let bytes = URL_SAFE_NO_PAD.decode(normalized).ok()?;

	serde_json::from_slice(&bytes).ok()
}

/// A single signed credential with its decoded claims.
#[derive(Clone, Debug)]
pub struct JwtToken {
	token: TokenSecret,
	payload: Option<JwtPayload>,
	early_period: Duration,
}
impl JwtToken {
	/// Decodes `token`, treating it as stale `early_period` before its real expiry.
	///
	/// Negative periods are clamped to zero.
	pub fn new(token: impl Into<String>, early_period: Duration) -> Self {
		let token = TokenSecret::new(token);
		let payload = parse_jwt_payload(token.expose());
		let early_period = if early_period.is_negative() { Duration::ZERO } else { early_period };

		Self { token, payload, early_period }
	}

	/// Raw token secret.
	pub fn token(&self) -> &TokenSecret {
		&self.token
	}

	/// Decoded claims, or `None` when the token is malformed.
	pub fn payload(&self) -> Option<&JwtPayload> {
		self.payload.as_ref()
	}

	/// Margin subtracted from the real expiry.
	pub fn early_period(&self) -> Duration {
		self.early_period
	}

	/// Returns `true` once `now >= exp - early_period`.
	///
	/// Malformed tokens are always expired; tokens without an `exp` claim never are.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		let Some(payload) = &self.payload else {
			return true;
		};
		let Some(exp) = payload.exp else {
			return false;
		};

		now.unix_timestamp() >= exp.saturating_sub(self.early_period.whole_seconds())
	}

	/// Convenience helper that checks expiry against the current UTC instant.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::encode_test_jwt;

	const MARGIN: Duration = Duration::seconds(30);

	fn token_expiring_at(exp: i64) -> JwtToken {
		JwtToken::new(encode_test_jwt(serde_json::json!({ "sub": "u-1", "exp": exp })), MARGIN)
	}

	#[test]
	fn expiry_honors_early_margin_boundaries() {
		let now = OffsetDateTime::now_utc();
		let now_secs = now.unix_timestamp();
		let margin = MARGIN.whole_seconds();

		assert!(token_expiring_at(now_secs + margin - 1).is_expired_at(now));
		assert!(token_expiring_at(now_secs + margin).is_expired_at(now));
		assert!(!token_expiring_at(now_secs + margin + 1).is_expired_at(now));
	}

	#[test]
	fn tokens_without_exp_never_expire() {
		let token = JwtToken::new(encode_test_jwt(serde_json::json!({ "sub": "u-1" })), MARGIN);

		assert!(token.payload().is_some());
		assert!(!token.is_expired_at(OffsetDateTime::now_utc() + Duration::days(3650)));
	}

	#[test]
	fn malformed_tokens_are_always_expired() {
		for raw in ["", "not-a-jwt", "a.b", "a.!!!.c", "a.b.c.d", "aGVhZGVy.bm90LWpzb24.c2ln"] {
			let token = JwtToken::new(raw, Duration::ZERO);

			assert!(token.payload().is_none(), "`{raw}` should not decode.");
			assert!(token.is_expired_at(macros_epoch()), "`{raw}` should be expired.");
		}
	}

	#[test]
	fn payload_decodes_standard_and_custom_claims() {
		let raw = encode_test_jwt(serde_json::json!({
			"sub": "owner-9",
			"exp": 1_900_000_000_i64,
			"tenantId": "tenant-9",
			"roles": ["admin"],
			"level": 3,
		}));
		let payload = parse_jwt_payload(&raw).expect("Fixture JWT should decode.");

		assert_eq!(payload.sub.as_deref(), Some("owner-9"));
		assert_eq!(payload.tenant_id.as_deref(), Some("tenant-9"));
		assert_eq!(payload.claim("tenantId").as_deref(), Some("tenant-9"));
		assert_eq!(payload.claim("level").as_deref(), Some("3"));
		assert_eq!(payload.claim("roles"), None);
		assert_eq!(payload.expires_at().map(OffsetDateTime::unix_timestamp), Some(1_900_000_000));
	}

	#[test]
	fn padded_payloads_are_tolerated() {
		let raw = encode_test_jwt(serde_json::json!({ "sub": "x" }));
		let mut parts: Vec<String> = raw.split('.').map(str::to_owned).collect();

		parts[1].push_str("==");

		assert!(parse_jwt_payload(&parts.join(".")).is_some());
	}

	#[test]
	fn negative_margin_is_clamped() {
		let token = JwtToken::new("a.b.c", Duration::seconds(-5));

		assert_eq!(token.early_period(), Duration::ZERO);
	}

	fn macros_epoch() -> OffsetDateTime {
		time::macros::datetime!(2025-01-01 00:00 UTC)
	}
}
