use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Clearance lifetime in seconds (token and cookie alike).
pub const CLEARANCE_TTL_SECS: u64 = 3600;

/// Fallback key used when `AEGISEDGE_SECRET` is unset. Fine for local
/// development, useless in production.
const DEV_DEFAULT_SECRET: &str = "dev-default-secret-key-change-me";

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Mints and verifies `"<unix-seconds>.<hex-hmac-sha256>"` clearance
/// tokens, keyed by a process-wide secret.
pub struct ClearanceSigner {
    secret: Vec<u8>,
}

impl ClearanceSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Build a signer from `AEGISEDGE_SECRET`, falling back (loudly) to
    /// the development default.
    pub fn from_env() -> Self {
        match std::env::var("AEGISEDGE_SECRET") {
            Ok(secret) if !secret.is_empty() => Self::new(&secret),
            _ => {
                warn!(
                    "AEGISEDGE_SECRET is not set; using the built-in development \
                     secret. Clearance cookies are forgeable until a real secret \
                     is configured."
                );
                Self::new(DEV_DEFAULT_SECRET)
            }
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Mint a token stamped with the current time.
    pub fn mint(&self) -> String {
        self.mint_at(unix_now())
    }

    pub fn mint_at(&self, unix_seconds: u64) -> String {
        let ts = unix_seconds.to_string();
        let sig = self.sign(&ts);
        format!("{ts}.{sig}")
    }

    /// Verify a token: the signature must match (constant-time compare)
    /// and the timestamp must lie within the clearance window.
    pub fn verify(&self, token: &str) -> bool {
        self.verify_at(token, unix_now())
    }

    pub fn verify_at(&self, token: &str, now: u64) -> bool {
        let Some((ts_str, sig_hex)) = token.split_once('.') else {
            return false;
        };
        let Ok(ts) = ts_str.parse::<u64>() else {
            return false;
        };
        let Ok(sig) = hex::decode(sig_hex) else {
            return false;
        };

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any size");
        mac.update(ts_str.as_bytes());
        if mac.verify_slice(&sig).is_err() {
            debug!("clearance token signature mismatch");
            return false;
        }

        if now < ts || now > ts + CLEARANCE_TTL_SECS {
            debug!(ts, now, "clearance token outside validity window");
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify() {
        let signer = ClearanceSigner::new("unit-test-secret");
        let token = signer.mint();
        assert!(signer.verify(&token));
    }

    #[test]
    fn valid_through_the_whole_window() {
        let signer = ClearanceSigner::new("unit-test-secret");
        let token = signer.mint_at(1_000_000);
        assert!(signer.verify_at(&token, 1_000_000));
        assert!(signer.verify_at(&token, 1_000_000 + CLEARANCE_TTL_SECS));
        assert!(!signer.verify_at(&token, 1_000_000 + CLEARANCE_TTL_SECS + 1));
    }

    #[test]
    fn future_tokens_rejected() {
        let signer = ClearanceSigner::new("unit-test-secret");
        let token = signer.mint_at(2_000_000);
        assert!(!signer.verify_at(&token, 1_999_999));
    }

    #[test]
    fn wrong_secret_rejected() {
        let minter = ClearanceSigner::new("secret-a");
        let verifier = ClearanceSigner::new("secret-b");
        let token = minter.mint();
        assert!(!verifier.verify(&token));
    }

    #[test]
    fn malformed_tokens_rejected() {
        let signer = ClearanceSigner::new("unit-test-secret");
        for bad in [
            "",
            "no-dot",
            "123.",
            ".abcdef",
            "notanumber.abcdef",
            "123.not-hex!",
            "123.deadbeef.extra",
        ] {
            assert!(!signer.verify_at(bad, 123), "{bad:?} must not verify");
        }
    }

    #[test]
    fn tampered_timestamp_rejected() {
        let signer = ClearanceSigner::new("unit-test-secret");
        let token = signer.mint_at(1_000_000);
        let sig = token.split_once('.').unwrap().1;
        let forged = format!("1000001.{sig}");
        assert!(!signer.verify_at(&forged, 1_000_001));
    }
}
