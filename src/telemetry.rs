// src/telemetry.rs
//! Process-wide tracing subscriber and the optional Prometheus listener.

use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "hazard_ingest=info,ingest=info,warn";

/// `RUST_LOG` wins over the default filter; `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // already-installed subscriber is fine (tests, embedding)
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

/// Install the global recorder and serve `/metrics` on `addr`. Needs a tokio runtime.
pub fn install_prometheus(addr: &str) -> anyhow::Result<SocketAddr> {
    let socket: SocketAddr = addr
        .trim()
        .parse()
        .with_context(|| format!("invalid metrics listen address {addr:?}"))?;
    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .context("prometheus: install recorder")?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_listen_address_is_rejected_before_install() {
        let err = install_prometheus("not-an-addr").unwrap_err();
        assert!(err.to_string().contains("not-an-addr"));
    }
}
