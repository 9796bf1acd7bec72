use crate::manifest::{manifest_changed, WorkbookManifest};
use crate::target::RuntimeTarget;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Ready,
    Error,
}

impl ConnectionState {
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub target: Option<RuntimeTarget>,
    pub manifest: Option<WorkbookManifest>,
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTelemetrySnapshot {
    pub sessions_started: u64,
    pub cycles_run: u64,
    pub probe_failures: u64,
    pub fetch_failures: u64,
    pub manifests_accepted: u64,
    pub notifications_sent: u64,
    pub stale_proposals_discarded: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnhealthyReason {
    ProbeFailed,
    FetchFailed,
}

struct StoreState {
    epoch: u64,
    state: ConnectionState,
    target: Option<RuntimeTarget>,
    manifest: Option<WorkbookManifest>,
    last_error: Option<String>,
    telemetry: ConnectionTelemetrySnapshot,
}

struct Subscriber {
    id: SubscriptionId,
    callback: Arc<dyn Fn(&ConnectionSnapshot) + Send + Sync>,
}

pub struct ConnectionStore {
    state: Mutex<StoreState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription_id: AtomicU64,
}

impl Default for ConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                epoch: 0,
                state: ConnectionState::Idle,
                target: None,
                manifest: None,
                last_error: None,
                telemetry: ConnectionTelemetrySnapshot::default(),
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.lock_state();
        snapshot_of(&state)
    }

    pub fn telemetry_snapshot(&self) -> ConnectionTelemetrySnapshot {
        self.lock_state().telemetry.clone()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&ConnectionSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::SeqCst));
        self.lock_subscribers().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    pub(crate) fn begin_session(&self, target: RuntimeTarget) -> u64 {
        let (epoch, snapshot) = {
            let mut state = self.lock_state();
            state.epoch = state.epoch.saturating_add(1);
            state.state = ConnectionState::Connecting;
            state.target = Some(target);
            state.manifest = None;
            state.last_error = None;
            state.telemetry.sessions_started = state.telemetry.sessions_started.saturating_add(1);
            state.telemetry.notifications_sent =
                state.telemetry.notifications_sent.saturating_add(1);
            (state.epoch, snapshot_of(&state))
        };
        self.notify(&snapshot);
        epoch
    }

    pub(crate) fn reset_to_idle(&self) {
        let snapshot = {
            let mut state = self.lock_state();
            // Bump the epoch even when already idle so any straggler cycle is
            // guaranteed to be discarded.
            state.epoch = state.epoch.saturating_add(1);
            let was_idle = state.state == ConnectionState::Idle
                && state.target.is_none()
                && state.manifest.is_none()
                && state.last_error.is_none();
            state.state = ConnectionState::Idle;
            state.target = None;
            state.manifest = None;
            state.last_error = None;
            if was_idle {
                None
            } else {
                state.telemetry.notifications_sent =
                    state.telemetry.notifications_sent.saturating_add(1);
                Some(snapshot_of(&state))
            }
        };
        if let Some(snapshot) = snapshot {
            self.notify(&snapshot);
        }
    }

    pub(crate) fn record_cycle(&self, epoch: u64) -> bool {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            state.telemetry.stale_proposals_discarded =
                state.telemetry.stale_proposals_discarded.saturating_add(1);
            return false;
        }
        state.telemetry.cycles_run = state.telemetry.cycles_run.saturating_add(1);
        true
    }

    pub(crate) fn report_unhealthy(
        &self,
        epoch: u64,
        reason: UnhealthyReason,
        detail: String,
        retain_manifest: bool,
    ) -> bool {
        let snapshot = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                state.telemetry.stale_proposals_discarded =
                    state.telemetry.stale_proposals_discarded.saturating_add(1);
                log::debug!("discarding health result from superseded epoch {epoch}");
                return false;
            }
            match reason {
                UnhealthyReason::ProbeFailed => {
                    state.telemetry.probe_failures =
                        state.telemetry.probe_failures.saturating_add(1);
                }
                UnhealthyReason::FetchFailed => {
                    state.telemetry.fetch_failures =
                        state.telemetry.fetch_failures.saturating_add(1);
                }
            }
            let state_changed = state.state != ConnectionState::Connecting;
            state.state = ConnectionState::Connecting;
            state.last_error = Some(detail);
            if !retain_manifest {
                state.manifest = None;
            }
            if state_changed {
                state.telemetry.notifications_sent =
                    state.telemetry.notifications_sent.saturating_add(1);
                Some(snapshot_of(&state))
            } else {
                None
            }
        };
        if let Some(snapshot) = snapshot.as_ref() {
            self.notify(snapshot);
        }
        true
    }

    pub(crate) fn report_manifest(&self, epoch: u64, manifest: WorkbookManifest) -> bool {
        let snapshot = {
            let mut state = self.lock_state();
            if state.epoch != epoch {
                state.telemetry.stale_proposals_discarded =
                    state.telemetry.stale_proposals_discarded.saturating_add(1);
                log::debug!("discarding manifest result from superseded epoch {epoch}");
                return false;
            }
            let changed = manifest_changed(state.manifest.as_ref(), &manifest);
            let state_changed = state.state != ConnectionState::Ready;
            state.state = ConnectionState::Ready;
            state.last_error = None;
            if changed {
                state.manifest = Some(manifest);
                state.telemetry.manifests_accepted =
                    state.telemetry.manifests_accepted.saturating_add(1);
            }
            if state_changed || changed {
                state.telemetry.notifications_sent =
                    state.telemetry.notifications_sent.saturating_add(1);
                Some(snapshot_of(&state))
            } else {
                None
            }
        };
        if let Some(snapshot) = snapshot.as_ref() {
            self.notify(snapshot);
        }
        true
    }

    fn notify(&self, snapshot: &ConnectionSnapshot) {
        let callbacks: Vec<Arc<dyn Fn(&ConnectionSnapshot) + Send + Sync>> = self
            .lock_subscribers()
            .iter()
            .map(|subscriber| Arc::clone(&subscriber.callback))
            .collect();
        for callback in callbacks {
            (*callback)(snapshot);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn snapshot_of(state: &StoreState) -> ConnectionSnapshot {
    ConnectionSnapshot {
        state: state.state,
        target: state.target.clone(),
        manifest: state.manifest.clone(),
        last_error: state.last_error.clone(),
    }
}
