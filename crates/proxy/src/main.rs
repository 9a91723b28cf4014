mod context;
mod gate;
mod metrics;
mod notifier;
mod pipeline;
mod security;
mod service;
mod upstream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pingora_core::server::{Server, ShutdownWatch};
use pingora_core::services::background::{background_service, BackgroundService};
use pingora_proxy::http_proxy_service;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use aegisedge_admin::{build_management_router, build_metrics_router, new_shared_state, AdminState};
use aegisedge_challenge::{ChallengeGate, ClearanceSigner};
use aegisedge_common::{Config, LiveToggles};
use aegisedge_detect::{AnomalyDetector, Fingerprinter, VolumetricDetector};
use aegisedge_ip_filter::{RegionFilter, StaticBlacklist};
use aegisedge_rate_limit::IpRateLimiter;
use aegisedge_store::{CounterStore, LocalStore, RedisStore};
use aegisedge_waf::PatternEngine;

use crate::gate::ConnectionGate;
use crate::metrics::ProxyMetrics;
use crate::notifier::WebhookNotifier;
use crate::pipeline::Pipeline;
use crate::service::GatewayService;
use crate::upstream::Origin;

/// Safety-net TTL on connection counters if a release is ever missed.
const GATE_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Volumetric detection window.
const VOLUMETRIC_WINDOW: Duration = Duration::from_secs(60);

/// Cadence of the background sweeps.
const REAPER_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    info!(config_path = %config_path, "starting AegisEdge");

    let config = Config::load(&config_path)?;
    let origin = Origin::parse(&config.upstream_addr)?;
    info!(
        listen_ports = ?config.listen_ports,
        upstream = %origin.address(),
        "configuration loaded"
    );

    // Storage: local by default, Redis when configured.
    let local_store = Arc::new(LocalStore::new());
    let store: Arc<dyn CounterStore> = if config.redis_addr.is_empty() {
        info!("in-memory state initialized (local backend)");
        local_store.clone()
    } else {
        info!(addr = %config.redis_addr, "distributed state initialized (redis backend)");
        Arc::new(RedisStore::new(&config.redis_addr, &config.redis_password)?)
    };
    // The sweeper only has work to do for the in-process backend.
    let sweepable_store = config.redis_addr.is_empty().then(|| local_store.clone());

    // A pattern battery that does not compile is a startup failure, not a
    // degraded mode.
    let waf = Arc::new(PatternEngine::new()?);

    let toggles = Arc::new(LiveToggles::new(config.toggles.clone()));
    let limiter = Arc::new(IpRateLimiter::new(
        config.l7_rate_limit,
        config.l7_burst_limit,
    ));
    let metrics = Arc::new(ProxyMetrics::new());

    let notifier = Arc::new(WebhookNotifier::from_env());
    if notifier.is_enabled() {
        info!("webhook alerting enabled");
    }

    let pipeline = Arc::new(Pipeline {
        store: store.clone(),
        blacklist: Arc::new(StaticBlacklist::new(&config.l3_blacklist)),
        conn_gate: Arc::new(ConnectionGate::new(
            store.clone(),
            config.l4_conn_limit,
            GATE_IDLE_TIMEOUT,
        )),
        limiter: limiter.clone(),
        region: Arc::new(RegionFilter::new(
            &config.blocked_ranges,
            &config.blocked_countries,
            &config.geoip_db_path,
        )),
        waf,
        fingerprinter: Arc::new(Fingerprinter::new()),
        anomaly: Arc::new(AnomalyDetector::new(
            &config.anomaly_heavy_paths,
            config.anomaly_threshold,
            store.clone(),
        )),
        volumetric: Arc::new(VolumetricDetector::new(VOLUMETRIC_WINDOW)),
        challenge: Arc::new(ChallengeGate::new(ClearanceSigner::from_env())),
        toggles: toggles.clone(),
        notifier,
    });

    let mut server = Server::new(None)?;
    server.bootstrap();

    let gateway = GatewayService {
        pipeline: pipeline.clone(),
        origin,
        metrics: metrics.clone(),
    };
    let mut proxy_service = http_proxy_service(&server.configuration, gateway);
    for port in &config.listen_ports {
        let addr = format!("0.0.0.0:{port}");
        info!(addr = %addr, "adding listener");
        proxy_service.add_tcp(&addr);
    }
    server.add_service(proxy_service);

    // Control plane: management API + metrics exposition.
    let admin_state = new_shared_state(AdminState::new(
        store.clone(),
        toggles.clone(),
        metrics.registry.clone(),
    ));
    server.add_service(background_service(
        "control plane",
        ControlPlaneService {
            management_listen: config.management_listen.clone(),
            metrics_listen: config.metrics_listen.clone(),
            state: admin_state,
        },
    ));

    // Background sweeps for counter expiry and idle limiter entries.
    server.add_service(background_service(
        "reaper",
        ReaperService {
            local_store: sweepable_store,
            limiter,
        },
    ));

    info!("AegisEdge started");
    server.run_forever();
}

/// Runs the management API and the metrics listener next to the data plane.
struct ControlPlaneService {
    management_listen: String,
    metrics_listen: String,
    state: aegisedge_admin::state::SharedState,
}

#[async_trait::async_trait]
impl BackgroundService for ControlPlaneService {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        info!(
            management = %self.management_listen,
            metrics = %self.metrics_listen,
            "starting control plane"
        );

        let management = aegisedge_admin::run_server(
            build_management_router(self.state.clone()),
            &self.management_listen,
        );
        let metrics = aegisedge_admin::run_server(
            build_metrics_router(self.state.clone()),
            &self.metrics_listen,
        );

        tokio::select! {
            result = management => {
                if let Err(e) = result {
                    error!(error = %e, "management API server error");
                }
            }
            result = metrics => {
                if let Err(e) = result {
                    error!(error = %e, "metrics server error");
                }
            }
            _ = shutdown.changed() => {
                info!("control plane shutting down");
            }
        }
    }
}

/// Periodic sweeps: expired counters and blocks in the local store, idle
/// entries in the rate-limiter map.
struct ReaperService {
    local_store: Option<Arc<LocalStore>>,
    limiter: Arc<IpRateLimiter>,
}

#[async_trait::async_trait]
impl BackgroundService for ReaperService {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        let mut ticker = tokio::time::interval(REAPER_INTERVAL);
        // The immediate first tick is a no-op sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(store) = &self.local_store {
                        store.sweep();
                    }
                    self.limiter.sweep();
                    debug!(tracked_ips = self.limiter.tracked_ips(), "reaper tick complete");
                }
                _ = shutdown.changed() => {
                    info!("reaper shutting down");
                    return;
                }
            }
        }
    }
}
