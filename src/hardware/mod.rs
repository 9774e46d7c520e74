//! # Gateway access
//!
//! A [`Fetcher`] performs exactly one round trip to the gateway and returns a
//! complete [`Snapshot`] or a classified [`FetchError`]. Fetchers never retry;
//! timing and retry policy live in the polling scheduler.

pub mod cca;
pub mod factory;
pub mod scripted;
#[cfg(feature = "sim")]
pub mod simulated;

pub use cca::CcaFetcher;
pub use factory::{build_device, DeviceHandles, DeviceSource};
pub use scripted::ScriptedFetcher;
#[cfg(feature = "sim")]
pub use simulated::SimulatedGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::Display;
use thiserror::Error;

use crate::domain::{GatewayLayout, Snapshot, SystemInfo};
use crate::energy::DailyEnergy;

/// Why a fetch failed. Every variant means "device not available right now".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("gateway did not answer within {0:?}")]
    Timeout(Duration),
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    ConnectionFailure,
    MalformedResponse,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::ConnectionFailure(_) => FetchErrorKind::ConnectionFailure,
            FetchError::MalformedResponse(_) => FetchErrorKind::MalformedResponse,
        }
    }
}

/// Source of live per-panel readings
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, FetchError>;

    /// Short label for logs, e.g. `cca 192.168.1.50`
    fn describe(&self) -> String;
}

/// Source of the gateway's own daily production history
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn fetch_history(&self) -> Result<Vec<DailyEnergy>, FetchError>;
}

/// Source of the installation layout and the gateway's own system information.
///
/// Both change rarely and are refreshed on a slow cadence of their own.
#[async_trait]
pub trait InfoFetcher: Send + Sync {
    async fn fetch_layout(&self) -> Result<GatewayLayout, FetchError>;

    async fn fetch_system_info(&self) -> Result<SystemInfo, FetchError>;
}
