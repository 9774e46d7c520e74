//! Tigo CCA gateway over its local CGI endpoints.
//!
//! Per-panel values come from `summary_data`, one request per metric. Each
//! response holds blocks of rows; a block that declares an `order` maps the
//! positions of its rows' `d` arrays to panel ids.
//!
//! The installation tree comes from `summary_config`: a flat list of objects
//! linked by `children` ids, inverters (type 4) over strings (type 3) over
//! panels (type 2).

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{FetchError, Fetcher, HistoryFetcher, InfoFetcher};
use crate::clock::Clock;
use crate::domain::{local_date, GatewayLayout, PanelLayout, PanelReading, Snapshot, SystemInfo};
use crate::energy::DailyEnergy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Power,
    Voltage,
    Rssi,
}

impl Metric {
    fn query(&self) -> &'static str {
        match self {
            Metric::Power => "pin",
            Metric::Voltage => "vin",
            Metric::Rssi => "rssi",
        }
    }

    fn assign(&self, reading: &mut PanelReading, value: Option<f64>) {
        match self {
            Metric::Power => reading.power_w = value,
            Metric::Voltage => reading.voltage_v = value,
            Metric::Rssi => reading.rssi_dbm = value,
        }
    }
}

const PANEL: u64 = 2;
const STRING: u64 = 3;
const INVERTER: u64 = 4;

/// CGI endpoint of the gateway's system information
const SYSTEM_INFO_PATH: &str = "summary_sysinfo";

type Object = serde_json::Map<String, serde_json::Value>;

#[derive(Clone)]
pub struct CcaFetcher {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
    timeout: Duration,
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl CcaFetcher {
    /// `client` is owned by the fetcher; build it once with its own pool.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
        tz: Tz,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            client,
            timeout,
            tz,
            clock,
        }
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if e.is_decode() {
            FetchError::MalformedResponse(e.to_string())
        } else {
            FetchError::ConnectionFailure(e.to_string())
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}/cgi-bin/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::ConnectionFailure(format!("{path}: HTTP {status}")));
        }

        let body = resp.text().await.map_err(|e| self.classify(e))?;
        serde_json::from_str(&body)
            .map_err(|e| FetchError::MalformedResponse(format!("{path}: {e}")))
    }

    async fn fetch_metric(
        &self,
        metric: Metric,
        date: &str,
        cache_buster: i64,
    ) -> Result<Option<Vec<(String, Option<f64>)>>, FetchError> {
        let data: SummaryData = self
            .get_json(
                "summary_data",
                &[
                    ("date", date.to_string()),
                    ("temp", metric.query().to_string()),
                    ("_", cache_buster.to_string()),
                ],
            )
            .await?;
        Ok(data.latest_values())
    }
}

#[async_trait]
impl Fetcher for CcaFetcher {
    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        // capture time before the round trips, not after
        let taken_at = self.clock.now();
        let date = local_date(taken_at, &self.tz).format("%Y-%m-%d").to_string();
        let cache_buster = taken_at.timestamp();

        let (power, voltage, rssi) = tokio::try_join!(
            self.fetch_metric(Metric::Power, &date, cache_buster),
            self.fetch_metric(Metric::Voltage, &date, cache_buster),
            self.fetch_metric(Metric::Rssi, &date, cache_buster),
        )?;
        // before the first sample of the day the gateway answers with an empty dataset
        let power = power.ok_or_else(|| {
            FetchError::MalformedResponse(format!("summary_data: no power rows for {date}"))
        })?;
        let voltage = voltage.unwrap_or_default();
        let rssi = rssi.unwrap_or_default();

        let mut panels: BTreeMap<String, PanelReading> = BTreeMap::new();
        let metrics = [(Metric::Power, power), (Metric::Voltage, voltage), (Metric::Rssi, rssi)];
        for (metric, values) in metrics {
            for (panel_id, value) in values {
                let reading = panels
                    .entry(panel_id)
                    .or_insert_with(|| PanelReading::empty(taken_at));
                metric.assign(reading, value);
            }
        }
        for reading in panels.values_mut() {
            reading.derive_current();
        }

        debug!(panels = panels.len(), date = %date, "cca snapshot fetched");
        Ok(Snapshot::new(taken_at, panels))
    }

    fn describe(&self) -> String {
        format!("cca {}", self.base_url)
    }
}

#[async_trait]
impl HistoryFetcher for CcaFetcher {
    async fn fetch_history(&self) -> Result<Vec<DailyEnergy>, FetchError> {
        let rows: Vec<serde_json::Value> = self.get_json("summary_energy", &[]).await?;
        Ok(rows.iter().filter_map(parse_history_row).collect())
    }
}

#[async_trait]
impl InfoFetcher for CcaFetcher {
    async fn fetch_layout(&self) -> Result<GatewayLayout, FetchError> {
        let objects: Vec<serde_json::Value> = self.get_json("summary_config", &[]).await?;
        let layout = parse_layout(&objects);
        debug!(panels = layout.panels.len(), "cca layout fetched");
        Ok(layout)
    }

    async fn fetch_system_info(&self) -> Result<SystemInfo, FetchError> {
        let info: Object = self.get_json(SYSTEM_INFO_PATH, &[]).await?;
        Ok(SystemInfo {
            serial: text(&info, "serial"),
            software: text(&info, "software"),
            kernel: text(&info, "kernel"),
            discovery: text(&info, "discovery"),
            last_data_sync: text(&info, "last_data_sync"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SummaryData {
    #[serde(default)]
    dataset: Vec<DataBlock>,
}

#[derive(Debug, Deserialize)]
struct DataBlock {
    order: Option<Vec<String>>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    #[serde(default)]
    d: Vec<serde_json::Value>,
}

impl SummaryData {
    /// Values of the newest non-empty row of the newest block that declares an order.
    fn latest_values(&self) -> Option<Vec<(String, Option<f64>)>> {
        self.dataset.iter().rev().find_map(|block| {
            let order = block.order.as_ref().filter(|o| !o.is_empty())?;
            let row = block.data.iter().rev().find(|r| !r.d.is_empty())?;
            Some(
                order
                    .iter()
                    .zip(row.d.iter())
                    .map(|(id, v)| (id.clone(), cell_value(v)))
                    .collect(),
            )
        })
    }
}

fn cell_value(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text(obj: &Object, key: &str) -> Option<String> {
    obj.get(key).and_then(scalar_string)
}

fn object_type(obj: &Object) -> Option<u64> {
    obj.get("type")?.as_u64()
}

/// Children of `parent` that exist in `by_id` and have the given type
fn children<'a>(
    parent: &Object,
    by_id: &BTreeMap<String, &'a Object>,
    kind: u64,
) -> Vec<&'a Object> {
    parent
        .get("children")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|id| by_id.get(&scalar_string(id)?).copied())
        .filter(|child| object_type(child) == Some(kind))
        .collect()
}

fn parse_layout(objects: &[serde_json::Value]) -> GatewayLayout {
    let by_id: BTreeMap<String, &Object> = objects
        .iter()
        .filter_map(|o| {
            let obj = o.as_object()?;
            Some((scalar_string(obj.get("id")?)?, obj))
        })
        .collect();

    let mut panels = Vec::new();
    let inverters = by_id.values().filter(|o| object_type(o) == Some(INVERTER));
    for inverter in inverters {
        let inverter_label = text(inverter, "label").unwrap_or_else(|| "Inverter".to_string());
        for string in children(inverter, &by_id, STRING) {
            let string_label = text(string, "label").unwrap_or_else(|| "String".to_string());
            for panel in children(string, &by_id, PANEL) {
                let Some(object_id) = text(panel, "id") else {
                    continue;
                };
                panels.push(PanelLayout {
                    object_id,
                    label: text(panel, "label"),
                    serial: text(panel, "serial"),
                    channel: text(panel, "channel"),
                    mp: text(panel, "MP"),
                    string: Some(string_label.clone()),
                    inverter: Some(inverter_label.clone()),
                });
            }
        }
    }
    GatewayLayout { panels }
}

fn parse_history_row(row: &serde_json::Value) -> Option<DailyEnergy> {
    let [date, wh] = row.as_array()?.as_slice() else {
        return None;
    };
    Some(DailyEnergy {
        date: NaiveDate::parse_from_str(date.as_str()?, "%Y-%m-%d").ok()?,
        energy_wh: cell_value(wh)?,
    })
}
