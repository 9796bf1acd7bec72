use crate::client::RuntimeClient;
use crate::config::RuntimeSyncConfig;
use crate::connection::{ConnectionStore, UnhealthyReason};
use crate::probe::ProbeOutcome;
use crate::target::RuntimeTarget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub(crate) struct PollKick;

pub(crate) struct PollHandle {
    stop: Arc<AtomicBool>,
    kick_tx: Sender<PollKick>,
    target: RuntimeTarget,
}

impl PollHandle {
    pub(crate) fn target(&self) -> &RuntimeTarget {
        &self.target
    }

    pub(crate) fn kick(&self) -> bool {
        self.kick_tx.send(PollKick).is_ok()
    }

    pub(crate) fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        // Dropping the kick sender wakes the loop thread out of its wait; the
        // thread exits at its next stop check. State safety does not depend on
        // the thread being gone: its epoch is already invalidated by the store.
    }
}

pub(crate) fn spawn_poll_loop(
    store: Arc<ConnectionStore>,
    client: Arc<dyn RuntimeClient>,
    config: RuntimeSyncConfig,
    target: RuntimeTarget,
    epoch: u64,
) -> PollHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let (kick_tx, kick_rx) = mpsc::channel();

    let loop_stop = Arc::clone(&stop);
    let loop_target = target.clone();
    thread::spawn(move || {
        run_poll_loop(store, client, config, loop_target, epoch, loop_stop, kick_rx);
    });

    PollHandle {
        stop,
        kick_tx,
        target,
    }
}

fn run_poll_loop(
    store: Arc<ConnectionStore>,
    client: Arc<dyn RuntimeClient>,
    config: RuntimeSyncConfig,
    target: RuntimeTarget,
    epoch: u64,
    stop: Arc<AtomicBool>,
    kick_rx: Receiver<PollKick>,
) {
    let interval = config.normalized_poll_interval();
    let tick = config.normalized_stop_check_interval().min(interval);

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if !run_cycle(
            store.as_ref(),
            client.as_ref(),
            &config,
            &target,
            epoch,
            stop.as_ref(),
        ) {
            break;
        }
        match wait_for_next_cycle(&kick_rx, interval, tick, stop.as_ref()) {
            LoopWake::Interval | LoopWake::Kick => {}
            LoopWake::Stop => break,
        }
    }
    log::debug!(
        "poll loop for workbook {} (epoch {epoch}) exited",
        target.workbook_id
    );
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopWake {
    Interval,
    Kick,
    Stop,
}

fn wait_for_next_cycle(
    kick_rx: &Receiver<PollKick>,
    interval: Duration,
    tick: Duration,
    stop: &AtomicBool,
) -> LoopWake {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::SeqCst) {
            return LoopWake::Stop;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return LoopWake::Interval;
        }
        match kick_rx.recv_timeout(remaining.min(tick)) {
            Ok(PollKick) => return LoopWake::Kick,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return LoopWake::Stop,
        }
    }
}

// One probe-then-fetch cycle. Returns false once this loop's epoch has been
// superseded, so the loop can exit instead of polling a dead target.
pub(crate) fn run_cycle(
    store: &ConnectionStore,
    client: &dyn RuntimeClient,
    config: &RuntimeSyncConfig,
    target: &RuntimeTarget,
    epoch: u64,
    stop: &AtomicBool,
) -> bool {
    if stop.load(Ordering::SeqCst) {
        return false;
    }
    if !store.record_cycle(epoch) {
        return false;
    }

    let probe = client.probe_health(target);
    if stop.load(Ordering::SeqCst) {
        return false;
    }
    let retain = config.retain_manifest_while_reconnecting;
    match probe {
        ProbeOutcome::Ready => {}
        ProbeOutcome::NotReady { failure, detail } => {
            return store.report_unhealthy(
                epoch,
                UnhealthyReason::ProbeFailed,
                format!("health probe failed ({}): {detail}", failure.as_tag()),
                retain,
            );
        }
    }

    let Some(manifest) = client.fetch_manifest(target) else {
        return store.report_unhealthy(
            epoch,
            UnhealthyReason::FetchFailed,
            "manifest fetch returned no data".to_string(),
            retain,
        );
    };
    // A result that raced a stop lands here with a dead epoch and is dropped
    // (and counted) by the store.
    store.report_manifest(epoch, manifest)
}
