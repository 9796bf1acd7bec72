use crate::client::{HttpRuntimeClient, RuntimeClient};
use crate::config::RuntimeSyncConfig;
use crate::connection::{
    ConnectionSnapshot, ConnectionState, ConnectionStore, ConnectionTelemetrySnapshot,
    SubscriptionId,
};
use crate::poll::{spawn_poll_loop, PollHandle};
use crate::target::{RuntimeTarget, TargetError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

const READY_WAIT_TICK: Duration = Duration::from_millis(25);

pub struct RuntimeConnection {
    store: Arc<ConnectionStore>,
    client: Arc<dyn RuntimeClient>,
    config: RuntimeSyncConfig,
    active: Mutex<Option<PollHandle>>,
}

impl RuntimeConnection {
    pub fn new(config: RuntimeSyncConfig) -> Self {
        let client = Arc::new(HttpRuntimeClient::new(&config));
        Self::with_client(config, client)
    }

    pub fn with_client(config: RuntimeSyncConfig, client: Arc<dyn RuntimeClient>) -> Self {
        Self {
            store: Arc::new(ConnectionStore::new()),
            client,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn connect(&self, target: RuntimeTarget) -> Result<(), TargetError> {
        target.validate()?;
        let mut active = self.lock_active();
        if let Some(handle) = active.as_ref() {
            if handle.target() == &target {
                return Ok(());
            }
        }
        if let Some(previous) = active.take() {
            previous.stop();
        }
        // begin_session invalidates the previous epoch before the new loop
        // spawns, so a superseded loop can never apply a late result.
        let epoch = self.store.begin_session(target.clone());
        *active = Some(spawn_poll_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.client),
            self.config.clone(),
            target,
            epoch,
        ));
        Ok(())
    }

    pub fn disconnect(&self) {
        let mut active = self.lock_active();
        if let Some(handle) = active.take() {
            handle.stop();
        }
        self.store.reset_to_idle();
    }

    pub fn refetch_now(&self) -> bool {
        let active = self.lock_active();
        match active.as_ref() {
            Some(handle) => handle.kick(),
            None => false,
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.store.snapshot()
    }

    pub fn telemetry_snapshot(&self) -> ConnectionTelemetrySnapshot {
        self.store.telemetry_snapshot()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&ConnectionSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.store.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.store.snapshot().state == ConnectionState::Ready {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(READY_WAIT_TICK.min(remaining));
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<PollHandle>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for RuntimeConnection {
    fn drop(&mut self) {
        let mut active = self.lock_active();
        if let Some(handle) = active.take() {
            handle.stop();
        }
    }
}
