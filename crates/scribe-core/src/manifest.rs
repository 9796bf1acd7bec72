use crate::target::manifest_endpoint;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookManifest {
    pub session_id: String,
    pub root_path: String,
    pub pages: Vec<Value>,
    pub blocks: Vec<Value>,
    #[serde(default)]
    pub sources: Option<Vec<Value>>,
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    pub is_empty: bool,
}

impl WorkbookManifest {
    // serde_json backs objects with a sorted map, so this string is stable
    // regardless of key order in the runtime's reply.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn manifest_changed(previous: Option<&WorkbookManifest>, next: &WorkbookManifest) -> bool {
    match previous {
        Some(previous) => previous.fingerprint() != next.fingerprint(),
        None => true,
    }
}

pub fn parse_manifest(body: &str) -> Result<WorkbookManifest> {
    serde_json::from_str(body).context("manifest body does not match the workbook manifest shape")
}

pub fn fetch_workbook_manifest(port: u16, timeout: Duration) -> Option<WorkbookManifest> {
    let endpoint = manifest_endpoint(port);
    match request_manifest(endpoint.as_str(), timeout) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            log::debug!("manifest unavailable this tick: {err:#}");
            None
        }
    }
}

fn request_manifest(endpoint: &str, timeout: Duration) -> Result<WorkbookManifest> {
    let response = ureq::get(endpoint)
        .timeout(timeout)
        .set("Accept", "application/json")
        .call()
        .with_context(|| format!("request {endpoint}"))?;
    let body = response
        .into_string()
        .with_context(|| format!("read response body {endpoint}"))?;
    parse_manifest(body.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest_json() -> &'static str {
        r#"{
            "sessionId": "wb-1",
            "rootPath": "/workbooks/wb-1",
            "pages": [{"id": "a", "title": "Alpha"}],
            "blocks": [],
            "sources": [{"id": "db", "kind": "postgres"}],
            "tables": ["users"],
            "isEmpty": false
        }"#
    }

    #[test]
    fn parse_accepts_full_camel_case_body() {
        let manifest = parse_manifest(sample_manifest_json()).expect("parse manifest");
        assert_eq!(manifest.session_id, "wb-1");
        assert_eq!(manifest.root_path, "/workbooks/wb-1");
        assert_eq!(manifest.pages.len(), 1);
        assert_eq!(manifest.tables, Some(vec!["users".to_string()]));
        assert!(!manifest.is_empty);
    }

    #[test]
    fn parse_defaults_optional_collections_to_none() {
        let manifest = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":[],"blocks":[],"isEmpty":true}"#,
        )
        .expect("parse manifest");
        assert!(manifest.sources.is_none());
        assert!(manifest.tables.is_none());
        assert!(manifest.is_empty);
    }

    #[test]
    fn parse_fails_closed_on_missing_required_field() {
        let result = parse_manifest(r#"{"sessionId":"wb-1","pages":[],"blocks":[],"isEmpty":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn parse_fails_closed_on_wrong_field_type() {
        let result = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":"a","blocks":[],"isEmpty":true}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn parse_fails_closed_on_junk_body() {
        assert!(parse_manifest("not json").is_err());
    }

    #[test]
    fn fingerprint_ignores_key_order_inside_items() {
        let first = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":[{"id":"a","title":"Alpha"}],"blocks":[],"isEmpty":false}"#,
        )
        .expect("parse first");
        let second = parse_manifest(
            r#"{"isEmpty":false,"blocks":[],"pages":[{"title":"Alpha","id":"a"}],"rootPath":"/w","sessionId":"wb-1"}"#,
        )
        .expect("parse second");

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert!(!manifest_changed(Some(&first), &second));
    }

    #[test]
    fn fingerprint_preserves_page_order() {
        let first = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":["a","b"],"blocks":[],"isEmpty":false}"#,
        )
        .expect("parse first");
        let second = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":["b","a"],"blocks":[],"isEmpty":false}"#,
        )
        .expect("parse second");

        assert!(manifest_changed(Some(&first), &second));
    }

    #[test]
    fn change_detector_reports_added_page() {
        let first = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":["a"],"blocks":[],"isEmpty":false}"#,
        )
        .expect("parse first");
        let second = parse_manifest(
            r#"{"sessionId":"wb-1","rootPath":"/w","pages":["a","b"],"blocks":[],"isEmpty":false}"#,
        )
        .expect("parse second");

        assert!(manifest_changed(Some(&first), &second));
    }

    #[test]
    fn change_detector_treats_first_manifest_as_changed() {
        let manifest = parse_manifest(sample_manifest_json()).expect("parse manifest");
        assert!(manifest_changed(None, &manifest));
    }

    #[test]
    fn fetch_against_unbound_port_returns_none() {
        assert!(fetch_workbook_manifest(1, Duration::from_millis(200)).is_none());
    }
}
