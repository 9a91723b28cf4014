use std::collections::HashSet;
use std::sync::RwLock;

use crate::strip_port;

/// O(1) membership test over a configured set of literal IPs.
///
/// CIDR matching lives in [`RegionFilter`](crate::RegionFilter); this set
/// is for exact addresses only. Reads happen on every request, writes only
/// through the management plane.
pub struct StaticBlacklist {
    ips: RwLock<HashSet<String>>,
}

impl StaticBlacklist {
    pub fn new(ips: &[String]) -> Self {
        Self {
            ips: RwLock::new(ips.iter().cloned().collect()),
        }
    }

    /// Membership test. Accepts either a bare host or `host:port`.
    pub fn is_blacklisted(&self, addr: &str) -> bool {
        let host = strip_port(addr);
        self.ips.read().expect("blacklist lock poisoned").contains(host)
    }

    pub fn add_ip(&self, ip: &str) {
        self.ips
            .write()
            .expect("blacklist lock poisoned")
            .insert(ip.to_string());
    }

    pub fn len(&self) -> usize {
        self.ips.read().expect("blacklist lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
