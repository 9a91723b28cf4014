use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Gateway-wide Prometheus metrics. The registry is shared with the
/// metrics listener for exposition.
pub struct ProxyMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub blocked_requests: IntCounterVec,
    pub active_connections: IntGauge,
    pub request_duration: HistogramVec,
}

impl ProxyMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "aegisedge_requests_total",
            "Total requests entering the security pipeline",
        ))
        .expect("failed to create requests_total counter");

        let blocked_requests = IntCounterVec::new(
            Opts::new(
                "aegisedge_blocked_requests_total",
                "Requests denied by a mitigation layer",
            ),
            &["layer", "reason"],
        )
        .expect("failed to create blocked_requests counter");

        let active_connections = IntGauge::with_opts(Opts::new(
            "aegisedge_active_connections",
            "Currently active proxied connections",
        ))
        .expect("failed to create active_connections gauge");

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "aegisedge_request_duration_seconds",
                "Time taken to process and proxy the request",
            ),
            &["method", "path"],
        )
        .expect("failed to create request_duration histogram");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("failed to register requests_total");
        registry
            .register(Box::new(blocked_requests.clone()))
            .expect("failed to register blocked_requests");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("failed to register active_connections");
        registry
            .register(Box::new(request_duration.clone()))
            .expect("failed to register request_duration");

        Self {
            registry,
            requests_total,
            blocked_requests,
            active_connections,
            request_duration,
        }
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}
