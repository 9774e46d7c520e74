use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{CcaFetcher, Fetcher, HistoryFetcher, InfoFetcher};
use crate::clock::Clock;
use crate::config::Config;

/// Where panel readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSource {
    /// Tigo CCA gateway on the local network
    Cca,
    /// Built-in simulated gateway, no hardware needed
    #[cfg(feature = "sim")]
    Sim,
}

impl Default for DeviceSource {
    fn default() -> Self {
        #[cfg(feature = "sim")]
        {
            DeviceSource::Sim
        }
        #[cfg(not(feature = "sim"))]
        {
            DeviceSource::Cca
        }
    }
}

/// Fetchers for the configured device
pub struct DeviceHandles {
    pub fetcher: Arc<dyn Fetcher>,
    /// Only gateways that keep a daily production history provide one
    pub history: Option<Arc<dyn HistoryFetcher>>,
    /// Layout and system info, for gateways that expose them
    pub info: Option<Arc<dyn InfoFetcher>>,
}

pub fn build_device(cfg: &Config, clock: Arc<dyn Clock>) -> Result<DeviceHandles> {
    let tz = cfg.energy.tz()?;

    match cfg.device.source {
        DeviceSource::Cca => {
            let mut headers = HeaderMap::new();
            headers.insert(
                USER_AGENT,
                HeaderValue::from_static(concat!("panel-energy-monitor/", env!("CARGO_PKG_VERSION"))),
            );
            headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
            let client = reqwest::Client::builder()
                .timeout(cfg.device.fetch_timeout())
                .connect_timeout(cfg.device.fetch_timeout())
                .default_headers(headers)
                .build()
                .context("failed to build gateway HTTP client")?;

            let cca = Arc::new(CcaFetcher::new(
                client,
                format!("http://{}", cfg.device.host),
                cfg.device.username.clone(),
                cfg.device.password.clone(),
                cfg.device.fetch_timeout(),
                tz,
                clock,
            ));
            tracing::info!(host = %cfg.device.host, "using CCA gateway");
            Ok(DeviceHandles {
                fetcher: cca.clone(),
                history: Some(cca.clone()),
                info: Some(cca),
            })
        }
        #[cfg(feature = "sim")]
        DeviceSource::Sim => {
            tracing::warn!("using simulated gateway, no hardware is polled");
            Ok(DeviceHandles {
                fetcher: Arc::new(super::SimulatedGateway::new(8, 380.0, tz, clock)),
                history: None,
                info: None,
            })
        }
    }
}
