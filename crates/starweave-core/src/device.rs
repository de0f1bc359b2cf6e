//! Device information types.

use crate::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Information about a device in the dispatch pool.
///
/// Surfaced to the planner as creation context and recorded on tasks as the
/// assigned-device reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Unique device identifier.
    pub device_id: DeviceId,

    /// Human-readable device name.
    pub name: String,

    /// Device-level labels (platform, region, tenant, etc.).
    pub labels: HashMap<String, String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo.
    pub fn new(device_id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            device_id,
            name: name.into(),
            labels: HashMap::new(),
        }
    }

    /// Builder method to add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
