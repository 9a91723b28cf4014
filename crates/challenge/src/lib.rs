//! Signed browser-challenge protocol.
//!
//! Proof that a client runs JavaScript and accepts HttpOnly cookies, in
//! one round trip: requests without clearance get a 503 interstitial whose
//! script reloads with a signed `ae_token` query parameter; the gateway
//! verifies it, sets the `ae_clearance` cookie server-side, and redirects
//! to the cleaned URL. Subsequent requests ride on the cookie.

pub mod page;
pub mod token;

pub use token::{ClearanceSigner, CLEARANCE_TTL_SECS};

use tracing::info;

/// Name of the clearance cookie.
pub const COOKIE_NAME: &str = "ae_clearance";

/// Name of the query parameter carrying a solved challenge token.
pub const TOKEN_PARAM: &str = "ae_token";

/// What the challenge stage should do with a request.
#[derive(Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Valid clearance cookie: forward to the next stage.
    Cleared,
    /// Valid token in the query string: set the cookie and redirect to the
    /// cleaned URL.
    Promote { location: String, set_cookie: String },
    /// No clearance: serve the 503 interstitial.
    Serve { html: String },
}

/// The browser-challenge state machine.
pub struct ChallengeGate {
    signer: ClearanceSigner,
}

impl ChallengeGate {
    pub fn new(signer: ClearanceSigner) -> Self {
        Self { signer }
    }

    /// Decide the challenge state for a request.
    pub fn evaluate(
        &self,
        path: &str,
        raw_query: &str,
        cookie_header: Option<&str>,
    ) -> ChallengeOutcome {
        if let Some(cookie) = cookie_header.and_then(extract_clearance_cookie) {
            if self.signer.verify(cookie) {
                return ChallengeOutcome::Cleared;
            }
        }

        if let Some(token) = query_param(raw_query, TOKEN_PARAM) {
            if self.signer.verify(token) {
                info!(path, "challenge token accepted, promoting to cookie");
                return ChallengeOutcome::Promote {
                    location: redirect_target(path, raw_query),
                    set_cookie: clearance_cookie(token),
                };
            }
        }

        let mut challenge_url = format!("{path}?{TOKEN_PARAM}={}", self.signer.mint());
        let cleaned = strip_token_param(raw_query);
        if !cleaned.is_empty() {
            challenge_url.push('&');
            challenge_url.push_str(&cleaned);
        }
        ChallengeOutcome::Serve {
            html: page::challenge_page(&challenge_url),
        }
    }
}

/// `Set-Cookie` value carrying the clearance token.
fn clearance_cookie(token: &str) -> String {
    format!("{COOKIE_NAME}={token}; Path=/; Max-Age={CLEARANCE_TTL_SECS}; HttpOnly; SameSite=Lax")
}

/// Pull the clearance cookie value out of a `Cookie` header.
pub fn extract_clearance_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(COOKIE_NAME).and_then(|rest| rest.strip_prefix('=')))
}

/// Find a query parameter's value without decoding (tokens are plain
/// `digits.hex`, never percent-encoded).
fn query_param<'a>(raw_query: &'a str, name: &str) -> Option<&'a str> {
    raw_query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// The original query string with the token parameter removed.
fn strip_token_param(raw_query: &str) -> String {
    raw_query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
            key != TOKEN_PARAM
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Where to send the client after promoting a token to a cookie.
fn redirect_target(path: &str, raw_query: &str) -> String {
    let cleaned = strip_token_param(raw_query);
    if cleaned.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{cleaned}")
    }
}
