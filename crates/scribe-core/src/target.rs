use serde::{Deserialize, Serialize};

pub const HEALTH_PATH: &str = "/health";
pub const MANIFEST_PATH: &str = "/manifest";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeTarget {
    pub workbook_id: String,
    pub port: u16,
}

impl RuntimeTarget {
    pub fn new(workbook_id: impl Into<String>, port: u16) -> Result<Self, TargetError> {
        let target = Self {
            workbook_id: workbook_id.into(),
            port,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), TargetError> {
        if self.workbook_id.trim().is_empty() {
            return Err(TargetError::new(
                TargetErrorCode::EmptyWorkbookId,
                "workbook id is required",
            ));
        }
        if self.port == 0 {
            return Err(TargetError::new(
                TargetErrorCode::InvalidPort,
                "runtime port must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn health_endpoint(&self) -> String {
        health_endpoint(self.port)
    }

    pub fn manifest_endpoint(&self) -> String {
        manifest_endpoint(self.port)
    }
}

pub fn health_endpoint(port: u16) -> String {
    format!("http://127.0.0.1:{port}{HEALTH_PATH}")
}

pub fn manifest_endpoint(port: u16) -> String {
    format!("http://127.0.0.1:{port}{MANIFEST_PATH}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetErrorCode {
    EmptyWorkbookId,
    InvalidPort,
}

impl TargetErrorCode {
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::EmptyWorkbookId => "empty_workbook_id",
            Self::InvalidPort => "invalid_port",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetError {
    pub code: TargetErrorCode,
    pub detail: String,
}

impl TargetError {
    pub fn new(code: TargetErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_tag(), self.detail)
    }
}

impl std::error::Error for TargetError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_valid_target() {
        let target = RuntimeTarget::new("wb-1", 55001).expect("valid target");
        assert_eq!(target.workbook_id, "wb-1");
        assert_eq!(target.port, 55001);
    }

    #[test]
    fn new_rejects_zero_port() {
        let err = RuntimeTarget::new("wb-1", 0).expect_err("port 0 is invalid");
        assert_eq!(err.code, TargetErrorCode::InvalidPort);
    }

    #[test]
    fn new_rejects_blank_workbook_id() {
        let err = RuntimeTarget::new("   ", 55001).expect_err("blank id is invalid");
        assert_eq!(err.code, TargetErrorCode::EmptyWorkbookId);
    }

    #[test]
    fn endpoints_are_loopback_urls() {
        let target = RuntimeTarget::new("wb-1", 55001).expect("valid target");
        assert_eq!(target.health_endpoint(), "http://127.0.0.1:55001/health");
        assert_eq!(target.manifest_endpoint(), "http://127.0.0.1:55001/manifest");
    }

    #[test]
    fn validate_catches_directly_constructed_invalid_target() {
        let target = RuntimeTarget {
            workbook_id: "wb-1".to_string(),
            port: 0,
        };
        assert!(target.validate().is_err());
    }
}
