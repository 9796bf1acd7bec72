use scribe_core::config::RuntimeSyncConfig;
use scribe_core::connection::ConnectionState;
use scribe_core::engine::RuntimeConnection;
use scribe_core::target::RuntimeTarget;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

struct StubRuntime {
    child: Child,
    port: u16,
    // Held open: the stub exits when its stdin closes.
    _stdin: ChildStdin,
}

impl StubRuntime {
    fn spawn(envs: &[(&str, &str)]) -> Self {
        let mut command = Command::new("cargo");
        command
            .args(["run", "-q", "-p", "scribe-runtime-stub"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for (key, value) in envs {
            command.env(key, value);
        }

        let mut child = command.spawn().expect("spawn runtime stub");
        let stdin = child.stdin.take().expect("stub stdin");
        let stdout = child.stdout.take().expect("stub stdout");

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let port = loop {
            line.clear();
            let read = reader.read_line(&mut line).expect("read stub stdout");
            assert!(read > 0, "stub exited before announcing its port");
            if let Some(raw) = line.trim().strip_prefix("SCRIBE_RUNTIME_STUB_PORT=") {
                break raw.parse::<u16>().expect("parse stub port");
            }
        };

        Self {
            child,
            port,
            _stdin: stdin,
        }
    }

    fn target(&self) -> RuntimeTarget {
        RuntimeTarget::new("wb-stub", self.port).expect("valid stub target")
    }

    fn set_pages(&self, csv: &str) {
        ureq::get(&format!(
            "http://127.0.0.1:{}/__test/pages/{csv}",
            self.port
        ))
        .call()
        .expect("set stub pages");
    }

    fn set_status(&self, status: &str) {
        ureq::get(&format!(
            "http://127.0.0.1:{}/__test/status/{status}",
            self.port
        ))
        .call()
        .expect("set stub status");
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for StubRuntime {
    fn drop(&mut self) {
        self.kill();
    }
}

fn integration_config() -> RuntimeSyncConfig {
    RuntimeSyncConfig {
        poll_interval_ms: 100,
        stop_check_interval_ms: 10,
        ..RuntimeSyncConfig::default()
    }
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn engine_reaches_ready_against_live_stub() {
    let stub = StubRuntime::spawn(&[]);
    let engine = RuntimeConnection::new(integration_config());

    engine.connect(stub.target()).expect("connect");
    assert!(
        engine.wait_until_ready(Duration::from_secs(30)),
        "engine never reached ready against the stub"
    );

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Ready);
    let manifest = snapshot.manifest.expect("manifest present");
    assert_eq!(manifest.session_id, "wb-stub");
    assert_eq!(manifest.pages.len(), 1);
    assert!(!manifest.is_empty);

    engine.disconnect();
    assert_eq!(engine.snapshot().state, ConnectionState::Idle);
}

#[test]
fn manifest_change_is_detected_live() {
    let stub = StubRuntime::spawn(&[]);
    let engine = RuntimeConnection::new(integration_config());

    engine.connect(stub.target()).expect("connect");
    assert!(engine.wait_until_ready(Duration::from_secs(30)));

    stub.set_pages("a,b");

    assert!(wait_until(Duration::from_secs(10), || {
        engine
            .snapshot()
            .manifest
            .as_ref()
            .is_some_and(|manifest| manifest.pages.len() == 2)
    }));
    assert_eq!(engine.snapshot().state, ConnectionState::Ready);
}

#[test]
fn not_ready_runtime_keeps_engine_connecting() {
    let stub = StubRuntime::spawn(&[("SCRIBE_RUNTIME_STUB_STATUS", "starting")]);
    let engine = RuntimeConnection::new(integration_config());

    engine.connect(stub.target()).expect("connect");
    assert!(!engine.wait_until_ready(Duration::from_secs(2)));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connecting);
    assert!(snapshot.manifest.is_none());
}

#[test]
fn malformed_manifest_is_absorbed_as_transient() {
    let stub = StubRuntime::spawn(&[("SCRIBE_RUNTIME_STUB_MALFORMED_MANIFEST", "1")]);
    let engine = RuntimeConnection::new(integration_config());

    engine.connect(stub.target()).expect("connect");
    assert!(!engine.wait_until_ready(Duration::from_secs(2)));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connecting);
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|detail| detail.contains("manifest")));
}

#[test]
fn runtime_death_demotes_engine_to_connecting() {
    let mut stub = StubRuntime::spawn(&[]);
    let engine = RuntimeConnection::new(integration_config());

    engine.connect(stub.target()).expect("connect");
    assert!(engine.wait_until_ready(Duration::from_secs(30)));

    stub.kill();

    assert!(wait_until(Duration::from_secs(10), || {
        engine.snapshot().state == ConnectionState::Connecting
    }));
    // Stale-while-revalidate: the last manifest is retained for the UI.
    assert!(engine.snapshot().manifest.is_some());
}

#[test]
fn demotion_and_recovery_round_trip_live() {
    let stub = StubRuntime::spawn(&[]);
    let engine = RuntimeConnection::new(integration_config());

    engine.connect(stub.target()).expect("connect");
    assert!(engine.wait_until_ready(Duration::from_secs(30)));

    stub.set_status("draining");
    assert!(wait_until(Duration::from_secs(10), || {
        engine.snapshot().state == ConnectionState::Connecting
    }));

    stub.set_status("ready");
    assert!(wait_until(Duration::from_secs(10), || {
        engine.snapshot().state == ConnectionState::Ready
    }));
    assert!(engine.snapshot().manifest.is_some());
}
