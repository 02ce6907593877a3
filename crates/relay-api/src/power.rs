use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Live power state of the switched device. Never persisted; always read
/// back from the backend when observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
            PowerState::Unknown => "unknown",
        }
    }
}

/// Contract for an external switching device. The core only ever needs these
/// two operations plus a shutdown notification; how a backend drives the
/// relay is its own business.
///
/// Errors are not caught by the core — a failing relay should surface to the
/// caller, not be masked.
pub trait PowerBackend: Send + Sync {
    /// Human-readable backend name for `list_apis`.
    fn name(&self) -> &str;

    fn get_power(&self) -> Result<PowerState>;

    fn set_power(&self, enable: bool) -> Result<()>;

    /// Host process is terminating. Default: nothing to do.
    fn on_shutdown(&self) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendInfo {
    pub identifier: String,
    pub name: String,
}

/// Explicit registration/lookup for power backends. The selected backend is
/// resolved by identifier on every decision; an unknown or empty identifier
/// simply resolves to none.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Mutex<HashMap<String, Arc<dyn PowerBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, identifier: &str, backend: Arc<dyn PowerBackend>) {
        let mut map = self.backends.lock().unwrap();
        if map.insert(identifier.to_string(), backend).is_some() {
            tracing::warn!("backend {} registered twice, replacing", identifier);
        }
    }

    pub fn resolve(&self, identifier: &str) -> Option<Arc<dyn PowerBackend>> {
        if identifier.is_empty() {
            return None;
        }
        self.backends.lock().unwrap().get(identifier).cloned()
    }

    pub fn list(&self) -> Vec<BackendInfo> {
        let map = self.backends.lock().unwrap();
        let mut out: Vec<BackendInfo> = map
            .iter()
            .map(|(id, b)| BackendInfo {
                identifier: id.clone(),
                name: b.name().to_string(),
            })
            .collect();
        out.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        out
    }
}
