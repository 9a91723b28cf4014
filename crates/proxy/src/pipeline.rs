use std::sync::Arc;
use std::time::Duration;

use aegisedge_challenge::{ChallengeGate, ChallengeOutcome};
use aegisedge_common::LiveToggles;
use aegisedge_detect::{
    AnomalyDetector, AnomalyVerdict, Fingerprinter, VolumetricDetector, VolumetricEvent,
};
use aegisedge_ip_filter::{RegionFilter, StaticBlacklist};
use aegisedge_rate_limit::IpRateLimiter;
use aegisedge_store::{BlockType, CounterStore};
use aegisedge_waf::PatternEngine;
use tracing::{info, warn};

use crate::gate::{ConnectionGate, GateDecision};
use crate::notifier::WebhookNotifier;

/// Latency penalty applied to UA-less clients.
pub const TARPIT_DELAY: Duration = Duration::from_secs(2);

/// Lifetime of store blocks issued by fingerprint auto-promotion.
const AUTO_BLOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The security chain, outermost to innermost. The composer walks this
/// list in order for every request; a denial at any stage short-circuits
/// the rest.
const STAGES: [Stage; 9] = [
    Stage::Challenge,
    Stage::RateLimit,
    Stage::Fingerprint,
    Stage::Region,
    Stage::Volumetric,
    Stage::Anomaly,
    Stage::Waf,
    Stage::Tarpit,
    Stage::DenyEarly,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Challenge,
    RateLimit,
    Fingerprint,
    Region,
    Volumetric,
    Anomaly,
    Waf,
    Tarpit,
    DenyEarly,
}

impl Stage {
    /// The feature flag gating this stage, if any. A disabled toggle turns
    /// the stage into a pass-through, never a denial.
    fn toggle(&self) -> Option<&'static str> {
        match self {
            Stage::Challenge => Some("challenge"),
            Stage::Region => Some("geoip"),
            Stage::Volumetric => Some("stats"),
            Stage::Anomaly => Some("anomaly"),
            Stage::Waf => Some("waf"),
            Stage::RateLimit | Stage::Fingerprint | Stage::Tarpit | Stage::DenyEarly => None,
        }
    }
}

/// Everything the pipeline needs to know about a request, extracted once
/// at the head of the request filter.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Bare client IP.
    pub client_ip: String,
    /// Socket address as observed (`ip:port`).
    pub remote_addr: String,
    pub method: String,
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: String,
    /// All request headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Raw `Cookie` header, if present.
    pub cookie: Option<String>,
}

impl RequestInfo {
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// A terminal stage rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub status: u16,
    /// Metrics label: which mitigation layer fired.
    pub layer: &'static str,
    /// Metrics label: why.
    pub reason: &'static str,
    /// Short non-diagnostic body for the client.
    pub body: &'static str,
}

/// What the composer decided to do with the request.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Passed every stage; hand off to the upstream proxy.
    Forward,
    Deny(Denial),
    /// Serve the 503 browser-challenge interstitial.
    Interstitial { html: String },
    /// Challenge token accepted: set the clearance cookie and redirect.
    Redirect {
        location: String,
        set_cookie: String,
    },
}

#[derive(Debug)]
pub struct PipelineDecision {
    pub action: Action,
    /// Tarpit delay to apply before acting on `action`.
    pub delay: Option<Duration>,
    /// The connection gate counted this request and must be released when
    /// the connection closes.
    pub gate_acquired: bool,
}

enum StageVerdict {
    Next,
    Done(Action),
}

/// The assembled security pipeline (everything between the listener and
/// the upstream proxy).
pub struct Pipeline {
    pub store: Arc<dyn CounterStore>,
    pub blacklist: Arc<StaticBlacklist>,
    pub conn_gate: Arc<ConnectionGate>,
    pub limiter: Arc<IpRateLimiter>,
    pub region: Arc<RegionFilter>,
    pub waf: Arc<PatternEngine>,
    pub fingerprinter: Arc<Fingerprinter>,
    pub anomaly: Arc<AnomalyDetector>,
    pub volumetric: Arc<VolumetricDetector>,
    pub challenge: Arc<ChallengeGate>,
    pub toggles: Arc<LiveToggles>,
    pub notifier: Arc<WebhookNotifier>,
}

impl Pipeline {
    /// Run the request through every enabled stage in declared order.
    pub async fn decide(&self, req: &RequestInfo) -> PipelineDecision {
        let mut delay = None;
        let mut gate_acquired = false;

        for stage in STAGES {
            let enabled = match stage.toggle() {
                // The challenge stage is forced on while the volumetric
                // detector reports an active attack, toggle or no toggle.
                Some("challenge") => {
                    self.toggles.is_enabled("challenge") || self.volumetric.is_under_attack()
                }
                Some(name) => self.toggles.is_enabled(name),
                None => true,
            };
            if !enabled {
                continue;
            }

            let verdict = match stage {
                Stage::Challenge => self.challenge_stage(req),
                Stage::RateLimit => self.rate_limit_stage(req, &mut delay),
                Stage::Fingerprint => self.fingerprint_stage(req).await,
                Stage::Region => self.region_stage(req),
                Stage::Volumetric => self.volumetric_stage(),
                Stage::Anomaly => self.anomaly_stage(req).await,
                Stage::Waf => self.waf_stage(req),
                Stage::Tarpit => self.tarpit_stage(req, &mut delay),
                Stage::DenyEarly => self.deny_early_stage(req, &mut gate_acquired).await,
            };

            if let StageVerdict::Done(action) = verdict {
                return PipelineDecision {
                    action,
                    delay,
                    gate_acquired,
                };
            }
        }

        PipelineDecision {
            action: Action::Forward,
            delay,
            gate_acquired,
        }
    }

    fn challenge_stage(&self, req: &RequestInfo) -> StageVerdict {
        match self
            .challenge
            .evaluate(&req.path, &req.query, req.cookie.as_deref())
        {
            ChallengeOutcome::Cleared => StageVerdict::Next,
            ChallengeOutcome::Promote {
                location,
                set_cookie,
            } => StageVerdict::Done(Action::Redirect {
                location,
                set_cookie,
            }),
            ChallengeOutcome::Serve { html } => {
                info!(client_ip = %req.client_ip, path = %req.path, "serving browser challenge");
                StageVerdict::Done(Action::Interstitial { html })
            }
        }
    }

    fn rate_limit_stage(&self, req: &RequestInfo, delay: &mut Option<Duration>) -> StageVerdict {
        if !self.limiter.allow(&req.client_ip) {
            warn!(client_ip = %req.client_ip, "rate limit exceeded");
            return StageVerdict::Done(Action::Deny(Denial {
                status: 429,
                layer: "L7",
                reason: "rate_limit",
                body: "Rate limit exceeded\n",
            }));
        }

        // Terminal gate for clients that send no User-Agent at all. They
        // pay the tarpit penalty on the way out.
        if req.user_agent().is_none() {
            *delay = Some(TARPIT_DELAY);
            return StageVerdict::Done(Action::Deny(Denial {
                status: 403,
                layer: "L7",
                reason: "no_user_agent",
                body: "Access denied\n",
            }));
        }

        StageVerdict::Next
    }

    async fn fingerprint_stage(&self, req: &RequestInfo) -> StageVerdict {
        let observation = self.fingerprinter.observe(&req.headers);

        if observation.denied {
            warn!(
                client_ip = %req.client_ip,
                fingerprint = %observation.hash,
                "blocked known malicious fingerprint"
            );
            return StageVerdict::Done(Action::Deny(Denial {
                status: 403,
                layer: "L7",
                reason: "fingerprint",
                body: "Access denied\n",
            }));
        }

        if observation.promoted {
            // The signature just crossed the threshold; record an auto
            // block for the source so the fleet sees it too.
            self.store
                .block(&req.client_ip, AUTO_BLOCK_TTL, BlockType::Auto)
                .await;
        }

        StageVerdict::Next
    }

    fn region_stage(&self, req: &RequestInfo) -> StageVerdict {
        let Ok(addr) = req.client_ip.parse() else {
            return StageVerdict::Next;
        };
        if self.region.is_blocked_region(addr) {
            warn!(client_ip = %req.client_ip, "blocked request from restricted region");
            return StageVerdict::Done(Action::Deny(Denial {
                status: 403,
                layer: "L7",
                reason: "geoip",
                body: "Access denied\n",
            }));
        }
        StageVerdict::Next
    }

    fn volumetric_stage(&self) -> StageVerdict {
        match self.volumetric.observe() {
            Some(VolumetricEvent::AttackStarted) => {
                self.notifier
                    .alert("Volumetric attack detected, challenge mode forced", "critical");
            }
            Some(VolumetricEvent::AttackCleared) => {
                self.notifier.alert("Volumetric attack cleared", "info");
            }
            None => {}
        }
        StageVerdict::Next
    }

    async fn anomaly_stage(&self, req: &RequestInfo) -> StageVerdict {
        match self.anomaly.check(&req.client_ip, &req.path).await {
            Some(AnomalyVerdict::HeavyUrl) => StageVerdict::Done(Action::Deny(Denial {
                status: 429,
                layer: "L7",
                reason: "anomaly_heavy_url",
                body: "Anomalous traffic detected\n",
            })),
            Some(AnomalyVerdict::LowEntropy) => StageVerdict::Done(Action::Deny(Denial {
                status: 403,
                layer: "L7",
                reason: "low_entropy",
                body: "Access denied\n",
            })),
            None => StageVerdict::Next,
        }
    }

    fn waf_stage(&self, req: &RequestInfo) -> StageVerdict {
        match self.waf.inspect(&req.query, &req.path) {
            Some(class) => {
                warn!(
                    client_ip = %req.client_ip,
                    class = class.as_str(),
                    query = %req.query,
                    "blocked request matching attack pattern"
                );
                StageVerdict::Done(Action::Deny(Denial {
                    status: 400,
                    layer: "L7",
                    reason: class.as_str(),
                    body: "Malicious request detected\n",
                }))
            }
            None => StageVerdict::Next,
        }
    }

    fn tarpit_stage(&self, req: &RequestInfo, delay: &mut Option<Duration>) -> StageVerdict {
        if req.user_agent().is_none() {
            warn!(client_ip = %req.client_ip, "tarpitting request with no user-agent");
            *delay = Some(TARPIT_DELAY);
        }
        StageVerdict::Next
    }

    async fn deny_early_stage(
        &self,
        req: &RequestInfo,
        gate_acquired: &mut bool,
    ) -> StageVerdict {
        if self.store.is_blocked(&req.client_ip).await {
            return StageVerdict::Done(Action::Deny(Denial {
                status: 403,
                layer: "L3",
                reason: "active_block",
                body: "Access denied\n",
            }));
        }

        if self.blacklist.is_blacklisted(&req.client_ip) {
            return StageVerdict::Done(Action::Deny(Denial {
                status: 403,
                layer: "L3",
                reason: "blacklist",
                body: "Access denied\n",
            }));
        }

        match self.conn_gate.acquire(&req.remote_addr).await {
            GateDecision::Denied => StageVerdict::Done(Action::Deny(Denial {
                status: 503,
                layer: "L4",
                reason: "conn_limit",
                body: "Too many connections\n",
            })),
            GateDecision::Allowed => {
                *gate_acquired = true;
                StageVerdict::Next
            }
            GateDecision::AllowedUntracked => StageVerdict::Next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegisedge_challenge::ClearanceSigner;
    use aegisedge_common::FeatureFlags;
    use aegisedge_store::LocalStore;
    use std::time::Instant;

    const SECRET: &str = "pipeline-test-secret";
    const WINDOW: Duration = Duration::from_secs(60);

    struct PipelineOptions {
        rate: f64,
        burst: u64,
        threshold: i64,
        blacklist: Vec<String>,
        ranges: Vec<String>,
    }

    impl Default for PipelineOptions {
        fn default() -> Self {
            Self {
                rate: 1000.0,
                burst: 1000,
                threshold: 1000,
                blacklist: Vec::new(),
                ranges: Vec::new(),
            }
        }
    }

    fn build_pipeline(opts: PipelineOptions) -> Pipeline {
        let store: Arc<dyn CounterStore> = Arc::new(LocalStore::new());
        Pipeline {
            store: store.clone(),
            blacklist: Arc::new(StaticBlacklist::new(&opts.blacklist)),
            conn_gate: Arc::new(ConnectionGate::new(
                store.clone(),
                1000,
                Duration::from_secs(300),
            )),
            limiter: Arc::new(IpRateLimiter::new(opts.rate, opts.burst)),
            region: Arc::new(RegionFilter::new(&opts.ranges, &[], "")),
            waf: Arc::new(PatternEngine::new().unwrap()),
            fingerprinter: Arc::new(Fingerprinter::new()),
            anomaly: Arc::new(AnomalyDetector::new(
                &["/search".to_string()],
                opts.threshold,
                store.clone(),
            )),
            volumetric: Arc::new(VolumetricDetector::new(WINDOW)),
            challenge: Arc::new(ChallengeGate::new(ClearanceSigner::new(SECRET))),
            toggles: Arc::new(LiveToggles::new(FeatureFlags::default())),
            notifier: Arc::new(WebhookNotifier::from_env()),
        }
    }

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

    fn clearance_cookie() -> String {
        format!("ae_clearance={}", ClearanceSigner::new(SECRET).mint())
    }

    fn request(ip: &str, path: &str, query: &str, cookie: Option<String>) -> RequestInfo {
        RequestInfo {
            client_ip: ip.to_string(),
            remote_addr: format!("{ip}:50000"),
            method: "GET".to_string(),
            path: path.to_string(),
            query: query.to_string(),
            headers: browser_headers(),
            cookie,
        }
    }

    fn cleared(ip: &str, path: &str, query: &str) -> RequestInfo {
        request(ip, path, query, Some(clearance_cookie()))
    }

    fn denial(decision: &PipelineDecision) -> &Denial {
        match &decision.action {
            Action::Deny(denial) => denial,
            other => panic!("expected Deny, got {other:?}"),
        }
    }

    /// Drive the volumetric detector into the under-attack state through
    /// real window rollovers.
    fn force_attack(volumetric: &VolumetricDetector) {
        let mut t = Instant::now();
        for _ in 0..3 {
            for _ in 0..599 {
                volumetric.observe_at(t);
            }
            t += WINDOW;
            volumetric.observe_at(t); // 600 requests => 10 rps baseline
        }
        for _ in 0..12_000 {
            volumetric.observe_at(t);
        }
        t += WINDOW;
        volumetric.observe_at(t); // 200 rps burst window
        assert!(volumetric.is_under_attack());
    }

    /// Scenario: a clean browser takes interstitial -> redirect -> pass.
    #[tokio::test]
    async fn challenge_round_trip() {
        let pipeline = build_pipeline(PipelineOptions::default());

        // First request: no clearance, interstitial with an embedded token.
        let first = pipeline.decide(&request("10.1.1.1", "/", "", None)).await;
        let html = match first.action {
            Action::Interstitial { html } => html,
            other => panic!("expected Interstitial, got {other:?}"),
        };
        let token_start = html.find("ae_token=").expect("token in page") + "ae_token=".len();
        let token = html[token_start..]
            .split('"')
            .next()
            .unwrap()
            .to_string();

        // Second request: token in the query, promoted to a cookie.
        let second = pipeline
            .decide(&request("10.1.1.1", "/", &format!("ae_token={token}"), None))
            .await;
        let set_cookie = match second.action {
            Action::Redirect {
                location,
                set_cookie,
            } => {
                assert_eq!(location, "/");
                set_cookie
            }
            other => panic!("expected Redirect, got {other:?}"),
        };
        assert!(set_cookie.contains("HttpOnly"));

        // Third request: clearance cookie, straight through.
        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let third = pipeline
            .decide(&request("10.1.1.1", "/", "", Some(cookie)))
            .await;
        assert_eq!(third.action, Action::Forward);
        assert!(third.gate_acquired);
    }

    /// Scenario: SQL injection in the query with valid clearance.
    #[tokio::test]
    async fn sqli_query_denied() {
        let pipeline = build_pipeline(PipelineOptions::default());
        let decision = pipeline
            .decide(&cleared("10.1.1.2", "/", "id=1' OR '1'='1"))
            .await;
        let denial = denial(&decision);
        assert_eq!(denial.status, 400);
        assert_eq!(denial.layer, "L7");
        assert_eq!(denial.reason, "sqli");
    }

    /// Scenario: a flood from one IP against rate=10, burst=20.
    #[tokio::test]
    async fn rate_limit_flood() {
        let pipeline = build_pipeline(PipelineOptions {
            rate: 10.0,
            burst: 20,
            ..Default::default()
        });

        let mut forwarded = 0;
        let mut limited = 0;
        for _ in 0..200 {
            let decision = pipeline.decide(&cleared("10.1.1.3", "/", "")).await;
            match decision.action {
                Action::Forward => forwarded += 1,
                Action::Deny(denial) => {
                    assert_eq!(denial.status, 429);
                    assert_eq!(denial.reason, "rate_limit");
                    limited += 1;
                }
                other => panic!("unexpected action {other:?}"),
            }
        }
        // The burst admits ~20; a few more may trickle in from refill
        // while the loop runs.
        assert!((20..=30).contains(&forwarded), "forwarded = {forwarded}");
        assert_eq!(forwarded + limited, 200);
    }

    /// Scenario: request with no User-Agent and valid clearance is
    /// tarpitted, then turned away.
    #[tokio::test]
    async fn missing_user_agent_tarpitted_then_denied() {
        let pipeline = build_pipeline(PipelineOptions::default());
        let mut req = cleared("10.1.1.4", "/", "");
        req.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("user-agent"));

        let decision = pipeline.decide(&req).await;
        let denial = denial(&decision);
        assert_eq!(denial.status, 403);
        assert_eq!(denial.reason, "no_user_agent");
        assert_eq!(decision.delay, Some(TARPIT_DELAY));
    }

    /// Scenario: a signature scoring +1 per request is cut off once its
    /// cumulative score crosses the threshold.
    #[tokio::test]
    async fn fingerprint_escalation() {
        let pipeline = build_pipeline(PipelineOptions::default());
        let mut req = cleared("10.1.1.5", "/", "");
        // Missing Connection header: +1 per request, threshold 4.
        req.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("connection"));

        for i in 0..3 {
            let decision = pipeline.decide(&req).await;
            assert_eq!(decision.action, Action::Forward, "request {i}");
            req.cookie = Some(clearance_cookie());
        }

        // Fourth request crosses the threshold; the promotion also issues
        // an auto block for the source IP, which the deny-early check
        // picks up within the same request.
        let fourth = pipeline.decide(&req).await;
        let fourth_denial = denial(&fourth);
        assert_eq!(fourth_denial.reason, "active_block");
        assert!(pipeline.store.is_blocked("10.1.1.5").await);

        // Fifth request dies at the fingerprint stage itself.
        let fifth = pipeline.decide(&req).await;
        let fifth_denial = denial(&fifth);
        assert_eq!(fifth_denial.status, 403);
        assert_eq!(fifth_denial.reason, "fingerprint");
    }

    /// Scenario: volumetric escalation forces the challenge even with the
    /// toggle off; clearance holders still pass.
    #[tokio::test]
    async fn under_attack_forces_challenge() {
        let pipeline = build_pipeline(PipelineOptions::default());
        pipeline.toggles.set("challenge", false);

        // Challenge disabled and no attack: an uncleared request sails
        // through.
        let calm = pipeline.decide(&request("10.1.1.6", "/", "", None)).await;
        assert_eq!(calm.action, Action::Forward);

        force_attack(&pipeline.volumetric);

        let challenged = pipeline.decide(&request("10.1.1.6", "/", "", None)).await;
        assert!(matches!(challenged.action, Action::Interstitial { .. }));

        let with_clearance = pipeline.decide(&cleared("10.1.1.6", "/", "")).await;
        assert_eq!(with_clearance.action, Action::Forward);
    }

    /// Invariant: a disabled toggle makes its stage a pass-through.
    #[tokio::test]
    async fn disabled_waf_passes_attack_query() {
        let pipeline = build_pipeline(PipelineOptions::default());
        pipeline.toggles.set("waf", false);

        let decision = pipeline
            .decide(&cleared("10.1.1.7", "/", "id=1' OR '1'='1"))
            .await;
        assert_eq!(decision.action, Action::Forward);
    }

    /// Invariant: denial at a stage short-circuits everything after it.
    #[tokio::test]
    async fn waf_denies_before_deny_early_sees_blacklist() {
        let pipeline = build_pipeline(PipelineOptions {
            blacklist: vec!["10.1.1.8".to_string()],
            ..Default::default()
        });

        // WAF runs before the deny-early block, so the 400 wins.
        let decision = pipeline
            .decide(&cleared("10.1.1.8", "/", "q=<script>x</script>"))
            .await;
        assert_eq!(denial(&decision).status, 400);

        // With the WAF off, the blacklist denial surfaces.
        pipeline.toggles.set("waf", false);
        let decision = pipeline
            .decide(&cleared("10.1.1.8", "/", "q=<script>x</script>"))
            .await;
        let d = denial(&decision);
        assert_eq!(d.status, 403);
        assert_eq!(d.layer, "L3");
        assert_eq!(d.reason, "blacklist");
    }

    #[tokio::test]
    async fn blocked_range_denied_and_toggleable() {
        let pipeline = build_pipeline(PipelineOptions {
            ranges: vec!["10.9.0.0/16".to_string()],
            ..Default::default()
        });

        let decision = pipeline.decide(&cleared("10.9.1.1", "/", "")).await;
        assert_eq!(denial(&decision).reason, "geoip");

        pipeline.toggles.set("geoip", false);
        let decision = pipeline.decide(&cleared("10.9.1.1", "/", "")).await;
        assert_eq!(decision.action, Action::Forward);
    }

    #[tokio::test]
    async fn heavy_path_anomaly_denied() {
        let pipeline = build_pipeline(PipelineOptions {
            threshold: 2,
            ..Default::default()
        });

        for _ in 0..2 {
            let decision = pipeline.decide(&cleared("10.1.1.9", "/search", "q=x")).await;
            assert_eq!(decision.action, Action::Forward);
        }
        let decision = pipeline.decide(&cleared("10.1.1.9", "/search", "q=x")).await;
        let d = denial(&decision);
        assert_eq!(d.status, 429);
        assert_eq!(d.reason, "anomaly_heavy_url");
    }

    #[tokio::test]
    async fn lock_on_entropy_denied() {
        let pipeline = build_pipeline(PipelineOptions {
            threshold: 2,
            ..Default::default()
        });

        // Entropy limit is 3 * threshold = 6 requests per minute.
        for _ in 0..6 {
            let decision = pipeline.decide(&cleared("10.1.2.1", "/home", "")).await;
            assert_eq!(decision.action, Action::Forward);
        }
        let decision = pipeline.decide(&cleared("10.1.2.1", "/home", "")).await;
        let d = denial(&decision);
        assert_eq!(d.status, 403);
        assert_eq!(d.reason, "low_entropy");
    }

    /// Management-style block/unblock round trip observed by deny-early.
    #[tokio::test]
    async fn store_block_round_trip() {
        let pipeline = build_pipeline(PipelineOptions::default());

        pipeline
            .store
            .block("10.1.2.2", Duration::from_secs(3600), BlockType::Temp)
            .await;
        let decision = pipeline.decide(&cleared("10.1.2.2", "/", "")).await;
        assert_eq!(denial(&decision).reason, "active_block");

        pipeline.store.unblock("10.1.2.2").await.unwrap();
        let decision = pipeline.decide(&cleared("10.1.2.2", "/", "")).await;
        assert_eq!(decision.action, Action::Forward);
    }

    #[tokio::test]
    async fn tarpit_delays_but_forwards_when_ua_check_is_upstream() {
        // A UA-less request that somehow passes the rate-limit stage's
        // check would still pick up the tarpit delay; here we verify the
        // delay rides along with denials issued after the tarpit stage.
        let pipeline = build_pipeline(PipelineOptions {
            blacklist: vec!["10.1.2.3".to_string()],
            ..Default::default()
        });
        let decision = pipeline.decide(&cleared("10.1.2.3", "/", "")).await;
        let d = denial(&decision);
        assert_eq!(d.reason, "blacklist");
        // Full browser headers: no tarpit.
        assert_eq!(decision.delay, None);
    }
}
