use std::sync::RwLock;

use crate::config::FeatureFlags;

/// Names of the toggleable pipeline features.
pub const TOGGLE_NAMES: [&str; 5] = ["waf", "geoip", "challenge", "anomaly", "stats"];

/// Runtime feature flag registry, safe for concurrent reads and writes.
///
/// The pipeline reads toggle state on every request, so a change applied
/// through [`set`](LiveToggles::set) takes effect on the very next request
/// with no restart or propagation delay.
pub struct LiveToggles {
    flags: RwLock<FeatureFlags>,
}

impl LiveToggles {
    pub fn new(flags: FeatureFlags) -> Self {
        Self {
            flags: RwLock::new(flags),
        }
    }

    /// Whether the named feature is currently enabled. Unknown names are
    /// treated as enabled so that an ungated stage never silently drops out.
    pub fn is_enabled(&self, feature: &str) -> bool {
        let flags = self.flags.read().expect("toggle lock poisoned");
        match feature {
            "waf" => flags.waf,
            "geoip" => flags.geoip,
            "challenge" => flags.challenge,
            "anomaly" => flags.anomaly,
            "stats" => flags.stats,
            _ => true,
        }
    }

    /// Set a feature flag. Unknown names are ignored and reported back as
    /// `false` so the management API can surface them.
    pub fn set(&self, feature: &str, enabled: bool) -> bool {
        let mut flags = self.flags.write().expect("toggle lock poisoned");
        match feature {
            "waf" => flags.waf = enabled,
            "geoip" => flags.geoip = enabled,
            "challenge" => flags.challenge = enabled,
            "anomaly" => flags.anomaly = enabled,
            "stats" => flags.stats = enabled,
            _ => return false,
        }
        true
    }

    /// A point-in-time copy of all flags, for status reporting.
    pub fn snapshot(&self) -> FeatureFlags {
        self.flags.read().expect("toggle lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_takes_effect_immediately() {
        let toggles = LiveToggles::new(FeatureFlags::default());
        assert!(toggles.is_enabled("waf"));

        assert!(toggles.set("waf", false));
        assert!(!toggles.is_enabled("waf"));

        assert!(toggles.set("waf", true));
        assert!(toggles.is_enabled("waf"));
    }

    #[test]
    fn unknown_feature_reads_enabled_but_rejects_writes() {
        let toggles = LiveToggles::new(FeatureFlags::default());
        assert!(toggles.is_enabled("nonexistent"));
        assert!(!toggles.set("nonexistent", false));
        assert!(toggles.is_enabled("nonexistent"));
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let toggles = LiveToggles::new(FeatureFlags::default());
        toggles.set("challenge", false);
        toggles.set("stats", false);

        let snap = toggles.snapshot();
        assert!(!snap.challenge);
        assert!(!snap.stats);
        assert!(snap.waf);
    }
}
