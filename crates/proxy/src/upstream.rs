use aegisedge_common::{AegisError, AegisResult};

/// The single configured origin behind the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Origin {
    /// Parse an upstream address like `http://127.0.0.1:3000`,
    /// `https://origin.internal`, or a bare `host:port`.
    pub fn parse(addr: &str) -> AegisResult<Self> {
        let (tls, rest) = if let Some(rest) = addr.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = addr.strip_prefix("http://") {
            (false, rest)
        } else {
            (false, addr)
        };

        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(AegisError::Upstream(format!(
                "upstream address {addr:?} has no host"
            )));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) if !host.contains(':') || host.starts_with('[') => {
                let port = port_str.parse::<u16>().map_err(|_| {
                    AegisError::Upstream(format!("invalid upstream port in {addr:?}"))
                })?;
                (host.trim_matches(['[', ']']).to_string(), port)
            }
            _ => (
                rest.trim_matches(['[', ']']).to_string(),
                if tls { 443 } else { 80 },
            ),
        };

        Ok(Self { host, port, tls })
    }

    /// `host:port` form for peer construction.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// SNI name for TLS origins.
    pub fn sni(&self) -> String {
        if self.tls {
            self.host.clone()
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_with_port() {
        let origin = Origin::parse("http://127.0.0.1:3000").unwrap();
        assert_eq!(origin.host, "127.0.0.1");
        assert_eq!(origin.port, 3000);
        assert!(!origin.tls);
        assert_eq!(origin.address(), "127.0.0.1:3000");
    }

    #[test]
    fn default_ports_by_scheme() {
        assert_eq!(Origin::parse("http://origin.internal").unwrap().port, 80);
        let tls = Origin::parse("https://origin.internal").unwrap();
        assert_eq!(tls.port, 443);
        assert!(tls.tls);
        assert_eq!(tls.sni(), "origin.internal");
    }

    #[test]
    fn bare_host_port() {
        let origin = Origin::parse("10.1.2.3:8080").unwrap();
        assert_eq!(origin.host, "10.1.2.3");
        assert_eq!(origin.port, 8080);
        assert!(!origin.tls);
    }

    #[test]
    fn trailing_slash_tolerated() {
        let origin = Origin::parse("http://127.0.0.1:3000/").unwrap();
        assert_eq!(origin.port, 3000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Origin::parse("http://").is_err());
        assert!(Origin::parse("http://host:notaport").is_err());
    }
}
