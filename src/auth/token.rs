use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Decode the claims segment of a JWT without verifying its signature.
///
/// Returns `None` when the token is not a three-part JWT or its payload is
/// not a JSON object.
pub fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// The `exp` claim as a timestamp, if present.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token)?.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Whether `token` can still be presented to the backend at `now`.
///
/// A token with an undecodable or empty claims object is never valid; a
/// token without `exp` never expires.
pub fn is_token_valid(token: &str, now: DateTime<Utc>) -> bool {
    if token.trim().is_empty() {
        return false;
    }
    let Some(claims) = decode_claims(token) else {
        return false;
    };
    if claims.is_empty() {
        return false;
    }
    match claims.get("exp").and_then(Value::as_i64) {
        Some(exp) => exp > now.timestamp(),
        None => true,
    }
}

#[cfg(test)]
pub(crate) fn test_jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn token_with_future_exp_is_valid() {
        let now = Utc::now();
        let token = test_jwt(json!({"id": "u1", "exp": (now + Duration::hours(1)).timestamp()}));
        assert!(is_token_valid(&token, now));
        assert_eq!(
            expires_at(&token).map(|t| t.timestamp()),
            Some((now + Duration::hours(1)).timestamp())
        );
    }

    #[test]
    fn token_with_past_exp_is_invalid() {
        let now = Utc::now();
        let token = test_jwt(json!({"id": "u1", "exp": (now - Duration::seconds(5)).timestamp()}));
        assert!(!is_token_valid(&token, now));
    }

    #[test]
    fn token_without_exp_never_expires() {
        let token = test_jwt(json!({"id": "u1"}));
        assert!(is_token_valid(&token, Utc::now()));
    }

    #[test]
    fn garbage_and_empty_claims_are_invalid() {
        assert!(!is_token_valid("", Utc::now()));
        assert!(!is_token_valid("not-a-jwt", Utc::now()));
        assert!(!is_token_valid(&test_jwt(json!({})), Utc::now()));
        assert!(!is_token_valid(&test_jwt(json!([1, 2])), Utc::now()));
    }
}
