use serde::{Deserialize, Serialize};

/// Where one panel sits in the installation, as configured on the gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelLayout {
    /// Gateway object id
    pub object_id: String,
    pub label: Option<String>,
    /// Optimizer serial number
    pub serial: Option<String>,
    pub channel: Option<String>,
    /// The gateway's `MP` attribute, passed through as is
    pub mp: Option<String>,
    /// Label of the parent string
    pub string: Option<String>,
    /// Label of the inverter the string feeds
    pub inverter: Option<String>,
}

/// Panels of every inverter and string the gateway knows about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayLayout {
    pub panels: Vec<PanelLayout>,
}

impl GatewayLayout {
    /// Look a panel up by object id, falling back to its label.
    ///
    /// Live readings are keyed by whatever the gateway puts in its `order`
    /// lists, which depending on firmware is either of the two.
    pub fn panel(&self, panel_id: &str) -> Option<&PanelLayout> {
        self.panels
            .iter()
            .find(|p| p.object_id == panel_id)
            .or_else(|| {
                self.panels
                    .iter()
                    .find(|p| p.label.as_deref() == Some(panel_id))
            })
    }
}

/// Identity and sync state reported by the gateway itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub serial: Option<String>,
    pub software: Option<String>,
    pub kernel: Option<String>,
    pub discovery: Option<String>,
    pub last_data_sync: Option<String>,
}
