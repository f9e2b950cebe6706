use hmac::{ Hmac, Mac };
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Signed timestamps older or newer than this are refused.
pub const SIGNATURE_WINDOW_SECS: i64 = 300;

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingSignature,
    TimestampOutOfRange,
    BadSignature,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingSignature => write!(f, "missing ts/sig"),
            AuthError::TimestampOutOfRange => write!(f, "timestamp out of range"),
            AuthError::BadSignature => write!(f, "bad signature"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Hex HMAC-SHA256 of the timestamp, keyed by the shared secret.
pub fn sign(secret: &str, ts: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(secret: &str, ts: &str, sig: &str, now: i64) -> Result<(), AuthError> {
    let ts_i: i64 = ts.parse().map_err(|_| AuthError::TimestampOutOfRange)?;
    if (now - ts_i).abs() > SIGNATURE_WINDOW_SECS {
        return Err(AuthError::TimestampOutOfRange);
    }
    let expected = hex::decode(sig).map_err(|_| AuthError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&expected).map_err(|_| AuthError::BadSignature)
}

/// Checks `ts`/`sig` (or `X-Api-Ts`/`X-Api-Sign`) query parameters.
pub fn verify_query(secret: &str, query: &str, now: i64) -> Result<(), AuthError> {
    let params: HashMap<String, String> = form_urlencoded
        ::parse(query.as_bytes())
        .into_owned()
        .collect();
    let ts = params.get("ts").or_else(|| params.get("X-Api-Ts"));
    let sig = params.get("sig").or_else(|| params.get("X-Api-Sign"));
    match (ts, sig) {
        (Some(ts), Some(sig)) => verify_signature(secret, ts, sig, now),
        _ => Err(AuthError::MissingSignature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fresh_signature() {
        let sig = sign("secret", "1700000000").unwrap();
        let query = format!("ts=1700000000&sig={}", sig);
        assert_eq!(verify_query("secret", &query, 1_700_000_100), Ok(()));
    }

    #[test]
    fn rejects_stale_or_forged_requests() {
        let sig = sign("secret", "1700000000").unwrap();
        assert_eq!(
            verify_signature("secret", "1700000000", &sig, 1_700_000_301),
            Err(AuthError::TimestampOutOfRange)
        );
        assert_eq!(
            verify_signature("other", "1700000000", &sig, 1_700_000_000),
            Err(AuthError::BadSignature)
        );
        assert_eq!(verify_signature("secret", "1700000000", "zz", 1_700_000_000), Err(AuthError::BadSignature));
        assert_eq!(verify_query("secret", "ts=1700000000", 1_700_000_000), Err(AuthError::MissingSignature));
    }

    #[test]
    fn accepts_header_style_parameter_names() {
        let sig = sign("k", "42").unwrap();
        let query = format!("X-Api-Ts=42&X-Api-Sign={}", sig);
        assert_eq!(verify_query("k", &query, 42), Ok(()));
    }
}
