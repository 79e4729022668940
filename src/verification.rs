use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew, in either direction, between the signed timestamp and now.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Split a `t=<ts>,v1=<hex>` style header into its key/value pairs.
/// Each element is split on its first `=`; elements without one are dropped.
/// A key that appears twice keeps its last value.
pub fn parse_signature_header(header: &str) -> HashMap<&str, &str> {
    header
        .split(',')
        .filter_map(|element| element.split_once('='))
        .collect()
}

/// Build a signature header for `payload` as the payment provider would.
pub fn sign(payload: &str, secret: &str, timestamp: i64) -> Option<String> {
    let timestamp = timestamp.to_string();
    let digest = compute_signature(payload, secret, &timestamp)?;
    Some(format!("t={timestamp},v1={}", hex::encode(digest)))
}

/// Verify a payment-provider webhook against the current clock.
/// Header format: "t=<unix-seconds>,v1=<hex hmac-sha256>".
/// Signed payload: "<t>.<body>"
pub fn verify(payload: &str, signature_header: &str, secret: &str) -> bool {
    verify_at(payload, signature_header, secret, chrono::Utc::now().timestamp())
}

/// Same as [`verify`] with an explicit "now" in Unix seconds.
///
/// Every failure collapses to `false`. A stale timestamp and a bad digest are
/// deliberately indistinguishable to the caller.
pub fn verify_at(payload: &str, signature_header: &str, secret: &str, now_secs: i64) -> bool {
    let parts = parse_signature_header(signature_header);

    let (timestamp, provided_hex) = match (parts.get("t"), parts.get("v1")) {
        (Some(t), Some(v1)) => (*t, *v1),
        _ => {
            tracing::debug!("signature header missing t or v1");
            return false;
        }
    };

    let signed_at: i64 = match timestamp.parse() {
        Ok(t) => t,
        Err(_) => {
            tracing::debug!("signature timestamp is not an integer");
            return false;
        }
    };

    if now_secs.abs_diff(signed_at) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        tracing::debug!(signed_at, now_secs, "signature timestamp outside tolerance");
        return false;
    }

    let provided = match hex::decode(provided_hex) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::debug!("signature v1 is not valid hex");
            return false;
        }
    };

    let expected = match compute_signature(payload, secret, timestamp) {
        Some(digest) => digest,
        None => return false,
    };

    // Slices of differing length compare unequal without inspecting contents.
    let matched: bool = expected.as_slice().ct_eq(provided.as_slice()).into();
    if !matched {
        tracing::debug!("signature digest mismatch");
    }
    matched
}

/// HMAC-SHA256 over "<timestamp>.<payload>", using the timestamp text as sent.
fn compute_signature(payload: &str, secret: &str, timestamp: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn accepts_fresh_signature() {
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign(payload, SECRET, NOW).unwrap();
        assert!(verify_at(payload, &header, SECRET, NOW));
        assert!(verify_at(payload, &header, SECRET, NOW + SIGNATURE_TOLERANCE_SECS));
        assert!(verify_at(payload, &header, SECRET, NOW - SIGNATURE_TOLERANCE_SECS));
    }

    #[test]
    fn rejects_skew_beyond_tolerance_either_direction() {
        let payload = "{}";
        let header = sign(payload, SECRET, NOW).unwrap();
        assert!(!verify_at(payload, &header, SECRET, NOW + SIGNATURE_TOLERANCE_SECS + 1));
        assert!(!verify_at(payload, &header, SECRET, NOW - SIGNATURE_TOLERANCE_SECS - 1));
    }

    #[test]
    fn verify_uses_wall_clock() {
        let payload = "hello";
        let header = sign(payload, SECRET, chrono::Utc::now().timestamp()).unwrap();
        assert!(verify(payload, &header, SECRET));

        let stale = sign(payload, SECRET, chrono::Utc::now().timestamp() - 3600).unwrap();
        assert!(!verify(payload, &stale, SECRET));
    }

    #[test]
    fn rejects_malformed_headers() {
        let v1 = hex::encode(compute_signature("{}", SECRET, &NOW.to_string()).unwrap());
        let cases = [
            String::new(),
            format!("t={NOW}"),
            format!("v1={v1}"),
            format!("t=soon,v1={v1}"),
            format!("t={NOW},v1=not-hex"),
            format!("t={NOW},v1=abc"),
            "garbage".to_string(),
        ];
        for header in &cases {
            assert!(!verify_at("{}", header, SECRET, NOW), "accepted {header:?}");
        }
    }

    #[test]
    fn single_bit_flip_in_payload_fails() {
        let payload = "amount=4200";
        let header = sign(payload, SECRET, NOW).unwrap();

        let mut bytes = payload.as_bytes().to_vec();
        bytes[0] ^= 0x01;
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(verify_at(payload, &header, SECRET, NOW));
        assert!(!verify_at(&tampered, &header, SECRET, NOW));
    }

    #[test]
    fn wrong_secret_fails() {
        let header = sign("{}", "other", NOW).unwrap();
        assert!(!verify_at("{}", &header, SECRET, NOW));
    }

    #[test]
    fn keys_of_any_length_sign_and_verify() {
        let long_key = "k".repeat(1024);
        for secret in ["", "short", long_key.as_str()] {
            let header = sign("{}", secret, NOW).unwrap();
            assert!(verify_at("{}", &header, secret, NOW), "secret len {}", secret.len());
        }
    }

    #[test]
    fn parse_keeps_last_duplicate_and_ignores_bare_elements() {
        let parts = parse_signature_header("t=1,v0=old,junk,t=2,v1=a=b");
        assert_eq!(parts.get("t"), Some(&"2"));
        assert_eq!(parts.get("v0"), Some(&"old"));
        assert_eq!(parts.get("v1"), Some(&"a=b"));
        assert!(!parts.contains_key("junk"));
    }

    #[test]
    fn extra_pairs_are_tolerated() {
        let payload = "{}";
        let header = format!("{},v0=deadbeef,scheme=test", sign(payload, SECRET, NOW).unwrap());
        assert!(verify_at(payload, &header, SECRET, NOW));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let payload = "{}";
        let v1 = hex::encode_upper(compute_signature(payload, SECRET, &NOW.to_string()).unwrap());
        let header = format!("t={NOW},v1={v1}");
        assert!(verify_at(payload, &header, SECRET, NOW));
    }
}
