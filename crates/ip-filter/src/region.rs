use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;
use tracing::{debug, error, warn};

/// Minimal struct for deserializing the country ISO code from MaxMind DB.
#[derive(serde::Deserialize)]
struct CountryRecord {
    country: Option<CountryInfo>,
}

#[derive(serde::Deserialize)]
struct CountryInfo {
    iso_code: Option<String>,
}

/// Region filter over CIDR ranges and/or an IP-to-country database.
///
/// An IP is blocked when any configured range contains it, or when its
/// country (per the MaxMind database) is in the deny set. If the database
/// cannot be opened the country check is bypassed with a warning; a broken
/// geo database must not take traffic down with it.
pub struct RegionFilter {
    ranges: Vec<IpNet>,
    denied_countries: HashSet<String>,
    reader: Option<maxminddb::Reader<Vec<u8>>>,
}

impl RegionFilter {
    pub fn new(ranges: &[String], denied_countries: &[String], db_path: &str) -> Self {
        let ranges = ranges
            .iter()
            .filter_map(|raw| match parse_range(raw) {
                Some(net) => Some(net),
                None => {
                    error!(range = %raw, "failed to parse blocked range, skipping");
                    None
                }
            })
            .collect();

        let denied_countries: HashSet<String> = denied_countries
            .iter()
            .map(|c| c.to_uppercase())
            .collect();

        let reader = if db_path.is_empty() || denied_countries.is_empty() {
            None
        } else {
            match maxminddb::Reader::open_readfile(db_path) {
                Ok(reader) => Some(reader),
                Err(e) => {
                    warn!(path = db_path, error = %e, "failed to open GeoIP database, country filtering bypassed");
                    None
                }
            }
        };

        Self {
            ranges,
            denied_countries,
            reader,
        }
    }

    /// Look up the ISO 3166-1 alpha-2 country code for an IP address.
    pub fn lookup_country(&self, addr: IpAddr) -> Option<String> {
        let reader = self.reader.as_ref()?;
        match reader.lookup::<CountryRecord>(addr) {
            Ok(record) => record.country.and_then(|c| c.iso_code),
            Err(e) => {
                debug!(addr = %addr, error = %e, "GeoIP lookup failed");
                None
            }
        }
    }

    /// Whether `addr` falls in a blocked range or a denied country.
    pub fn is_blocked_region(&self, addr: IpAddr) -> bool {
        if self.ranges.iter().any(|net| net.contains(&addr)) {
            return true;
        }

        if let Some(country) = self.lookup_country(addr) {
            return self.denied_countries.contains(&country.to_uppercase());
        }

        false
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn has_country_db(&self) -> bool {
        self.reader.is_some()
    }
}

/// Parse a CIDR block, normalizing bare addresses to /32 (IPv4) or /128
/// (IPv6).
fn parse_range(raw: &str) -> Option<IpNet> {
    if raw.contains('/') {
        raw.parse().ok()
    } else {
        let addr: IpAddr = raw.parse().ok()?;
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        IpNet::new(addr, prefix).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(ranges: &[&str]) -> RegionFilter {
        let ranges: Vec<String> = ranges.iter().map(|s| s.to_string()).collect();
        RegionFilter::new(&ranges, &[], "")
    }

    #[test]
    fn cidr_containment() {
        let filter = filter(&["198.51.100.0/24"]);
        assert!(filter.is_blocked_region("198.51.100.25".parse().unwrap()));
        assert!(!filter.is_blocked_region("198.51.101.25".parse().unwrap()));
    }

    #[test]
    fn bare_ipv4_normalized_to_slash_32() {
        let filter = filter(&["203.0.113.7"]);
        assert_eq!(filter.range_count(), 1);
        assert!(filter.is_blocked_region("203.0.113.7".parse().unwrap()));
        assert!(!filter.is_blocked_region("203.0.113.8".parse().unwrap()));
    }

    #[test]
    fn bare_ipv6_normalized_to_slash_128() {
        let filter = filter(&["2001:db8::1"]);
        assert!(filter.is_blocked_region("2001:db8::1".parse().unwrap()));
        assert!(!filter.is_blocked_region("2001:db8::2".parse().unwrap()));
    }

    #[test]
    fn unparseable_ranges_are_skipped() {
        let filter = filter(&["not-an-ip", "10.0.0.0/8"]);
        assert_eq!(filter.range_count(), 1);
        assert!(filter.is_blocked_region("10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn missing_database_bypasses_country_check() {
        let filter = RegionFilter::new(
            &[],
            &["XX".to_string()],
            "/nonexistent/GeoLite2-Country.mmdb",
        );
        assert!(!filter.has_country_db());
        // No ranges, no database: nothing can match.
        assert!(!filter.is_blocked_region("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn no_country_list_skips_database_open() {
        let filter = RegionFilter::new(&[], &[], "/nonexistent/db.mmdb");
        assert!(!filter.has_country_db());
        assert_eq!(filter.lookup_country("8.8.8.8".parse().unwrap()), None);
    }
}
