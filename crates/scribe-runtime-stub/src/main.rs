use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

struct StubState {
    status: String,
    session_id: String,
    pages: Vec<String>,
    manifest_status_code: Option<u16>,
    malformed_manifest: bool,
}

impl StubState {
    fn from_env() -> Self {
        let status = std::env::var("SCRIBE_RUNTIME_STUB_STATUS")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "ready".to_string());
        let session_id = std::env::var("SCRIBE_RUNTIME_STUB_SESSION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "wb-stub".to_string());
        let pages = std::env::var("SCRIBE_RUNTIME_STUB_PAGES")
            .ok()
            .map(|raw| parse_csv(&raw))
            .unwrap_or_else(|| vec!["a".to_string()]);
        let manifest_status_code = std::env::var("SCRIBE_RUNTIME_STUB_MANIFEST_STATUS_CODE")
            .ok()
            .and_then(|v| v.parse::<u16>().ok());
        let malformed_manifest = std::env::var("SCRIBE_RUNTIME_STUB_MALFORMED_MANIFEST")
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Self {
            status,
            session_id,
            pages,
            manifest_status_code,
            malformed_manifest,
        }
    }

    fn manifest_body(&self) -> Value {
        json!({
            "sessionId": self.session_id,
            "rootPath": format!("/workbooks/{}", self.session_id),
            "pages": self
                .pages
                .iter()
                .map(|page| json!({"id": page, "title": page.to_uppercase()}))
                .collect::<Vec<_>>(),
            "blocks": [],
            "sources": [],
            "tables": [],
            "isEmpty": self.pages.is_empty(),
        })
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn main() {
    let listener = match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("stub bind failed: {err}");
            std::process::exit(1);
        }
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(err) => {
            eprintln!("stub local_addr failed: {err}");
            std::process::exit(1);
        }
    };

    println!("SCRIBE_RUNTIME_STUB_PORT={port}");
    let _ = std::io::stdout().flush();

    // Exit when stdin closes so a dead parent cannot leak this process.
    thread::spawn(|| {
        let mut sink = Vec::new();
        let _ = std::io::stdin().lock().read_to_end(&mut sink);
        std::process::exit(0);
    });

    let state = Arc::new(Mutex::new(StubState::from_env()));
    for stream in listener.incoming() {
        let Ok(stream) = stream else { continue };
        let state = Arc::clone(&state);
        thread::spawn(move || handle_connection(stream, &state));
    }
}

fn handle_connection(stream: TcpStream, state: &Mutex<StubState>) {
    let Some(path) = read_request_path(&stream) else {
        return;
    };
    let mut stream = stream;

    if path == "/health" {
        let status = match state.lock() {
            Ok(state) => state.status.clone(),
            Err(_) => return,
        };
        write_json(&mut stream, 200, &json!({"status": status}));
        return;
    }

    if path == "/manifest" {
        let (status_code, body) = match state.lock() {
            Ok(state) => {
                if let Some(code) = state.manifest_status_code {
                    (code, json!({"error": "forced status"}))
                } else if state.malformed_manifest {
                    (200, json!({"unexpected": true}))
                } else {
                    (200, state.manifest_body())
                }
            }
            Err(_) => return,
        };
        write_json(&mut stream, status_code, &body);
        return;
    }

    // Test-control endpoints so integration tests can mutate the stub while
    // it keeps serving.
    if let Some(raw) = path.strip_prefix("/__test/pages/") {
        if let Ok(mut state) = state.lock() {
            state.pages = parse_csv(raw);
        }
        write_json(&mut stream, 200, &json!({"ok": true}));
        return;
    }
    if let Some(raw) = path.strip_prefix("/__test/status/") {
        if let Ok(mut state) = state.lock() {
            state.status = raw.to_string();
        }
        write_json(&mut stream, 200, &json!({"ok": true}));
        return;
    }

    write_json(&mut stream, 404, &json!({"error": "not found"}));
}

fn read_request_path(stream: &TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    if method != "GET" {
        return None;
    }

    // Drain headers so the client sees a well-formed exchange.
    loop {
        let mut header = String::new();
        let read = reader.read_line(&mut header).ok()?;
        if read == 0 || header.trim().is_empty() {
            break;
        }
    }

    Some(path.to_string())
}

fn write_json(stream: &mut TcpStream, status_code: u16, body: &Value) {
    let payload = body.to_string();
    let reason = match status_code {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {status_code} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
