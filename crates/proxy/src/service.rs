use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use pingora_core::prelude::*;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};
use tracing::info;

use aegisedge_ip_filter::strip_port;

use crate::context::RequestContext;
use crate::metrics::ProxyMetrics;
use crate::pipeline::{Action, Pipeline, RequestInfo};
use crate::security::apply_security_headers;
use crate::upstream::Origin;

/// The data-plane service: builds a [`RequestInfo`], lets the pipeline
/// decide, and either writes the terminal response or hands the request to
/// the configured origin.
pub struct GatewayService {
    pub pipeline: Arc<Pipeline>,
    pub origin: Origin,
    pub metrics: Arc<ProxyMetrics>,
}

impl GatewayService {
    fn extract_request_info(session: &Session) -> RequestInfo {
        let header = session.req_header();

        let remote_addr = session
            .client_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let client_ip = strip_port(&remote_addr).to_string();

        let headers: Vec<(String, String)> = header
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        let cookie = header
            .headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        RequestInfo {
            client_ip,
            remote_addr,
            method: header.method.as_str().to_string(),
            path: header.uri.path().to_string(),
            query: header.uri.query().unwrap_or("").to_string(),
            headers,
            cookie,
        }
    }

    async fn write_local_response(
        session: &mut Session,
        status: StatusCode,
        extra_headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<()> {
        let mut resp = ResponseHeader::build(status, Some(8))?;
        apply_security_headers(&mut resp)?;
        for (name, value) in extra_headers {
            resp.insert_header(name.to_string(), value.to_string())?;
        }
        session.set_keepalive(None);
        session.write_response_header(Box::new(resp), false).await?;
        session.write_response_body(Some(body), true).await?;
        Ok(())
    }
}

#[async_trait]
impl ProxyHttp for GatewayService {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        self.metrics.requests_total.inc();

        let req = Self::extract_request_info(session);
        ctx.client_ip = req.client_ip.clone();
        ctx.method = req.method.clone();
        ctx.path = req.path.clone();

        let decision = self.pipeline.decide(&req).await;
        ctx.gate_acquired = decision.gate_acquired;

        if let Some(delay) = decision.delay {
            tokio::time::sleep(delay).await;
        }

        match decision.action {
            Action::Forward => {
                ctx.forwarded = true;
                self.metrics.active_connections.inc();
                Ok(false)
            }
            Action::Deny(denial) => {
                self.metrics
                    .blocked_requests
                    .with_label_values(&[denial.layer, denial.reason])
                    .inc();
                ctx.denial = Some((denial.layer, denial.reason));
                ctx.response_status = denial.status;

                let status = StatusCode::from_u16(denial.status)
                    .unwrap_or(StatusCode::FORBIDDEN);
                Self::write_local_response(
                    session,
                    status,
                    &[("content-type", "text/plain; charset=utf-8")],
                    Bytes::from_static(denial.body.as_bytes()),
                )
                .await?;
                Ok(true)
            }
            Action::Interstitial { html } => {
                ctx.response_status = 503;
                Self::write_local_response(
                    session,
                    StatusCode::SERVICE_UNAVAILABLE,
                    &[
                        ("content-type", "text/html; charset=utf-8"),
                        ("cache-control", "no-store"),
                    ],
                    Bytes::from(html),
                )
                .await?;
                Ok(true)
            }
            Action::Redirect {
                location,
                set_cookie,
            } => {
                ctx.response_status = 302;
                Self::write_local_response(
                    session,
                    StatusCode::FOUND,
                    &[
                        ("location", location.as_str()),
                        ("set-cookie", set_cookie.as_str()),
                    ],
                    Bytes::new(),
                )
                .await?;
                Ok(true)
            }
        }
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let peer = HttpPeer::new(self.origin.address(), self.origin.tls, self.origin.sni());
        Ok(Box::new(peer))
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        if !ctx.client_ip.is_empty() {
            upstream_request.insert_header("x-real-ip", &ctx.client_ip)?;
        }
        Ok(())
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        ctx.response_status = upstream_response.status.as_u16();
        apply_security_headers(upstream_response)?;
        Ok(())
    }

    async fn logging(
        &self,
        _session: &mut Session,
        _error: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let duration = ctx.request_start.elapsed();

        self.metrics
            .request_duration
            .with_label_values(&[&ctx.method, &ctx.path])
            .observe(duration.as_secs_f64());

        if ctx.forwarded {
            self.metrics.active_connections.dec();
        }

        if ctx.gate_acquired {
            self.pipeline.conn_gate.release(&ctx.client_ip).await;
        }

        info!(
            client_ip = %ctx.client_ip,
            method = %ctx.method,
            path = %ctx.path,
            status = ctx.response_status,
            duration_ms = duration.as_millis() as u64,
            blocked = ctx.denial.is_some(),
            layer = ctx.denial.map(|(layer, _)| layer),
            reason = ctx.denial.map(|(_, reason)| reason),
            "request completed"
        );
    }
}
