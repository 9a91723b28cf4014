use std::time::Instant;

/// Per-request context carried through the pingora proxy lifecycle.
pub struct RequestContext {
    /// Bare client IP (no port).
    pub client_ip: String,

    /// HTTP method (cached for logging and the duration histogram).
    pub method: String,

    /// Request path (cached for logging and the duration histogram).
    pub path: String,

    /// Request start time for latency measurement.
    pub request_start: Instant,

    /// The connection gate counted this request; it must be released in
    /// the logging hook.
    pub gate_acquired: bool,

    /// Request was forwarded upstream (active-connections accounting).
    pub forwarded: bool,

    /// Layer and reason labels when a stage denied the request.
    pub denial: Option<(&'static str, &'static str)>,

    /// Status written to the client (denial or upstream).
    pub response_status: u16,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            client_ip: String::new(),
            method: String::new(),
            path: String::new(),
            request_start: Instant::now(),
            gate_acquired: false,
            forwarded: false,
            denial: None,
            response_status: 0,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
