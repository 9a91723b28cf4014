use pingora_core::Result;
use pingora_http::ResponseHeader;

/// Headers stamped on every response, denial and proxied alike.
pub const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("X-Frame-Options", "DENY"),
    ("X-Content-Type-Options", "nosniff"),
    ("X-XSS-Protection", "1; mode=block"),
    ("Content-Security-Policy", "default-src 'self';"),
    (
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains",
    ),
];

pub fn apply_security_headers(resp: &mut ResponseHeader) -> Result<()> {
    for (name, value) in SECURITY_HEADERS {
        resp.insert_header(name, value)?;
    }
    Ok(())
}
