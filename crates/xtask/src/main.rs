use anyhow::{bail, Context as _, Result};
use scribe_core::config::RuntimeSyncConfig;
use scribe_core::engine::RuntimeConnection;
use scribe_core::target::RuntimeTarget;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(cmd) = args.next() else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "gate" => cmd_gate(),
        "probe" => cmd_probe(args.collect()),
        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            print_help();
            bail!("unknown xtask command: {other}");
        }
    }
}

fn print_help() {
    eprintln!(
        r#"xtask (Scribe)

Commands:
  gate    Run the baseline gate (core tests + member checks)
  probe   Connect to a live workbook runtime and print its snapshot

Examples:
  cargo run -p xtask -- gate
  cargo run -p xtask -- probe --port 55001 --workbook wb-local --wait-secs 5
"#
    );
}

fn cmd_gate() -> Result<()> {
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .canonicalize()
        .context("resolve workspace root")?;

    run_command_step(
        "core-tests",
        &workspace_root,
        "cargo",
        &["test", "-p", "scribe-core"],
    )?;
    run_command_step(
        "stub-check",
        &workspace_root,
        "cargo",
        &["check", "-p", "scribe-runtime-stub"],
    )?;
    run_command_step(
        "xtask-check",
        &workspace_root,
        "cargo",
        &["check", "-p", "xtask"],
    )?;

    eprintln!("gate: OK");
    Ok(())
}

struct ProbeArgs {
    workbook_id: String,
    port: u16,
    wait_secs: u64,
}

fn cmd_probe(args: Vec<String>) -> Result<()> {
    let args = parse_probe_args(args)?;
    let target = RuntimeTarget::new(args.workbook_id.as_str(), args.port)?;

    let engine = RuntimeConnection::new(RuntimeSyncConfig::default());
    engine.subscribe(|snapshot| {
        eprintln!("probe: state -> {}", snapshot.state.as_tag());
    });

    engine.connect(target)?;
    let ready = engine.wait_until_ready(Duration::from_secs(args.wait_secs));

    let snapshot = engine.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?
    );
    eprintln!(
        "probe: telemetry {}",
        serde_json::to_string(&engine.telemetry_snapshot()).context("serialize telemetry")?
    );

    engine.disconnect();
    if !ready {
        bail!(
            "runtime on port {} did not become ready within {}s",
            args.port,
            args.wait_secs
        );
    }
    Ok(())
}

fn parse_probe_args(args: Vec<String>) -> Result<ProbeArgs> {
    let mut workbook_id = "wb-local".to_string();
    let mut port: Option<u16> = None;
    let mut wait_secs: u64 = 10;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--workbook" => workbook_id = it.next().context("--workbook requires a value")?,
            "--port" => {
                let raw = it.next().context("--port requires a value")?;
                port = Some(raw.parse().with_context(|| format!("invalid --port: {raw}"))?);
            }
            "--wait-secs" => {
                let raw = it.next().context("--wait-secs requires a value")?;
                wait_secs = raw
                    .parse()
                    .with_context(|| format!("invalid --wait-secs: {raw}"))?;
            }
            other => bail!("unknown probe arg: {other}"),
        }
    }

    Ok(ProbeArgs {
        workbook_id,
        port: port.context("--port is required")?,
        wait_secs: wait_secs.max(1),
    })
}

fn run_command_step(name: &str, cwd: &std::path::Path, program: &str, args: &[&str]) -> Result<()> {
    eprintln!("\n==> [{name}] {program} {}", args.join(" "));
    let status = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .status()
        .with_context(|| format!("spawn step failed: {name}"))?;
    if !status.success() {
        bail!("step failed: {name}");
    }
    Ok(())
}
