use crate::config::RuntimeSyncConfig;
use crate::manifest::{fetch_workbook_manifest, WorkbookManifest};
use crate::probe::{probe_runtime_health, ProbeOutcome};
use crate::target::RuntimeTarget;
use std::time::Duration;

pub trait RuntimeClient: Send + Sync {
    fn probe_health(&self, target: &RuntimeTarget) -> ProbeOutcome;
    fn fetch_manifest(&self, target: &RuntimeTarget) -> Option<WorkbookManifest>;
}

pub struct HttpRuntimeClient {
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpRuntimeClient {
    pub fn new(config: &RuntimeSyncConfig) -> Self {
        Self {
            probe_timeout: config.normalized_probe_timeout(),
            fetch_timeout: config.normalized_fetch_timeout(),
        }
    }
}

impl RuntimeClient for HttpRuntimeClient {
    fn probe_health(&self, target: &RuntimeTarget) -> ProbeOutcome {
        probe_runtime_health(target.port, self.probe_timeout)
    }

    fn fetch_manifest(&self, target: &RuntimeTarget) -> Option<WorkbookManifest> {
        fetch_workbook_manifest(target.port, self.fetch_timeout)
    }
}
