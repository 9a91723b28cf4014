use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Headers that make up the client signature, in fixed evaluation order.
const CANONICAL_HEADERS: [&str; 10] = [
    "User-Agent",
    "Accept",
    "Accept-Language",
    "Accept-Encoding",
    "Connection",
    "Upgrade-Insecure-Requests",
    "Sec-Fetch-Dest",
    "Sec-Fetch-Mode",
    "Sec-Fetch-Site",
    "Sec-Fetch-User",
];

/// Placeholder contributed by an absent header, so that presence/absence
/// itself is part of the signature.
const MISSING: &str = "missing";

/// Cumulative score at which a signature is promoted to the deny set.
const BLOCK_THRESHOLD: i64 = 4;

struct FingerprintRecord {
    score: i64,
    blocked: bool,
}

/// Result of running a request through the fingerprinter.
#[derive(Debug)]
pub struct FingerprintObservation {
    /// Hex digest identifying the client signature.
    pub hash: String,
    /// Score this single request contributed.
    pub request_score: i64,
    /// The signature is on the deny set; the request must be rejected.
    pub denied: bool,
    /// This request pushed the signature over the threshold. The caller
    /// may want to issue an auto block for the source.
    pub promoted: bool,
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Compute the 128-bit client signature: the first 16 bytes of SHA-256
/// over `"Header:Value|Header:Value|…"` across the canonical header list.
pub fn compute_fingerprint(headers: &[(String, String)]) -> String {
    let mut material = String::with_capacity(256);
    for (i, name) in CANONICAL_HEADERS.iter().enumerate() {
        if i > 0 {
            material.push('|');
        }
        material.push_str(name);
        material.push(':');
        material.push_str(header_value(headers, name).unwrap_or(MISSING));
    }

    let digest = Sha256::digest(material.as_bytes());
    hex::encode(&digest[..16])
}

/// Per-request bot score from header absence. Real browsers send all of
/// these; minimal HTTP clients send few or none.
pub fn request_score(headers: &[(String, String)]) -> i64 {
    let mut score = 0;
    if header_value(headers, "Accept").is_none() {
        score += 2;
    }
    for name in ["Accept-Language", "Accept-Encoding", "Sec-Fetch-Site", "Connection"] {
        if header_value(headers, name).is_none() {
            score += 1;
        }
    }
    score
}

/// Header-based client signature tracker.
///
/// Scores accumulate per signature across requests; a signature whose
/// cumulative score reaches the threshold is denied for the remaining
/// process lifetime. Records are never reaped, which bounds memory at the
/// number of distinct header sets observed.
#[derive(Default)]
pub struct Fingerprinter {
    records: DashMap<String, FingerprintRecord>,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the deny set and, for not-yet-denied signatures, accumulate
    /// this request's score. Promotion happens on the transition past the
    /// threshold and affects subsequent requests, not this one.
    pub fn observe(&self, headers: &[(String, String)]) -> FingerprintObservation {
        let hash = compute_fingerprint(headers);
        let score = request_score(headers);

        let mut record = self
            .records
            .entry(hash.clone())
            .or_insert_with(|| FingerprintRecord {
                score: 0,
                blocked: false,
            });

        if record.blocked {
            return FingerprintObservation {
                hash,
                request_score: score,
                denied: true,
                promoted: false,
            };
        }

        record.score += score;
        let promoted = record.score >= BLOCK_THRESHOLD;
        if promoted {
            record.blocked = true;
            warn!(
                fingerprint = %hash,
                score = record.score,
                "fingerprint promoted to deny set"
            );
        }

        FingerprintObservation {
            hash,
            request_score: score,
            denied: false,
            promoted,
        }
    }

    /// Manually add a signature to the deny set (management plane).
    pub fn block_fingerprint(&self, hash: &str) {
        let mut record = self
            .records
            .entry(hash.to_string())
            .or_insert_with(|| FingerprintRecord {
                score: 0,
                blocked: false,
            });
        record.blocked = true;
        info!(fingerprint = hash, "fingerprint manually denied");
    }

    pub fn is_denied(&self, hash: &str) -> bool {
        self.records.get(hash).map(|r| r.blocked).unwrap_or(false)
    }

    pub fn tracked_signatures(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser_headers() -> Vec<(String, String)> {
        vec![
            ("User-Agent".into(), "Mozilla/5.0 (X11; Linux x86_64) Chrome/120.0".into()),
            ("Accept".into(), "text/html,application/xhtml+xml".into()),
            ("Accept-Language".into(), "en-US,en;q=0.9".into()),
            ("Accept-Encoding".into(), "gzip, deflate, br".into()),
            ("Connection".into(), "keep-alive".into()),
            ("Upgrade-Insecure-Requests".into(), "1".into()),
            ("Sec-Fetch-Dest".into(), "document".into()),
            ("Sec-Fetch-Mode".into(), "navigate".into()),
            ("Sec-Fetch-Site".into(), "none".into()),
            ("Sec-Fetch-User".into(), "?1".into()),
        ]
    }

    fn bare_headers() -> Vec<(String, String)> {
        vec![("User-Agent".into(), "curl/8.4.0".into())]
    }

    #[test]
    fn hash_is_128_bits_hex() {
        let hash = compute_fingerprint(&browser_headers());
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_stable_and_case_insensitive() {
        let mut lowered = browser_headers();
        for (k, _) in lowered.iter_mut() {
            *k = k.to_lowercase();
        }
        assert_eq!(
            compute_fingerprint(&browser_headers()),
            compute_fingerprint(&lowered)
        );
    }

    #[test]
    fn missing_headers_change_the_hash() {
        assert_ne!(
            compute_fingerprint(&browser_headers()),
            compute_fingerprint(&bare_headers())
        );
    }

    #[test]
    fn browser_scores_zero() {
        assert_eq!(request_score(&browser_headers()), 0);
    }

    #[test]
    fn bare_client_scores_high() {
        // Missing Accept (+2), Accept-Language, Accept-Encoding,
        // Sec-Fetch-Site, Connection (+1 each).
        assert_eq!(request_score(&bare_headers()), 6);
    }

    #[test]
    fn empty_header_value_counts_as_missing() {
        let headers = vec![("Accept".into(), "".into())];
        assert_eq!(request_score(&headers), 6);
    }

    #[test]
    fn promotion_denies_subsequent_requests() {
        let fingerprinter = Fingerprinter::new();
        // Each bare request scores 6, crossing the threshold immediately;
        // the promoting request itself still passes.
        let first = fingerprinter.observe(&bare_headers());
        assert!(!first.denied);
        assert!(first.promoted);
        assert!(fingerprinter.is_denied(&first.hash));

        let second = fingerprinter.observe(&bare_headers());
        assert!(second.denied);
    }

    #[test]
    fn slow_accumulation_crosses_threshold() {
        let fingerprinter = Fingerprinter::new();
        // Missing Connection only: +1 per request.
        let mut headers = browser_headers();
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case("connection"));

        for _ in 0..4 {
            assert!(!fingerprinter.observe(&headers).denied);
        }
        // Fifth request from the same signature is denied.
        assert!(fingerprinter.observe(&headers).denied);
    }

    #[test]
    fn clean_browser_is_never_promoted() {
        let fingerprinter = Fingerprinter::new();
        for _ in 0..100 {
            assert!(!fingerprinter.observe(&browser_headers()).denied);
        }
    }

    #[test]
    fn manual_block_takes_effect() {
        let fingerprinter = Fingerprinter::new();
        let hash = compute_fingerprint(&browser_headers());
        fingerprinter.block_fingerprint(&hash);
        assert!(fingerprinter.observe(&browser_headers()).denied);
    }
}
