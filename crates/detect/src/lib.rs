//! Behavioral detection: header fingerprinting, per-key anomaly counters,
//! and the global volumetric detector.

pub mod anomaly;
pub mod fingerprint;
pub mod volumetric;

pub use anomaly::{AnomalyDetector, AnomalyVerdict};
pub use fingerprint::{compute_fingerprint, request_score, Fingerprinter};
pub use volumetric::{VolumetricDetector, VolumetricEvent};
