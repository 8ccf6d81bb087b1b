use serde::Serialize;
use thiserror::Error;

/// Failures reported by the accessibility engine or an element handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Element is detached from the active window: {0}")]
    ElementDetached(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

}

/// Failures reported by the telephony collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelephonyError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("USSD request failed")]
    ReturnFailure,

    #[error("USSD service unavailable")]
    ServiceUnavailable,

    #[error("Unknown error occurred (code: {0})")]
    Failure(i32),

    #[error("Unsupported API: {0}")]
    UnsupportedApi(String),

    #[error("Dial failed: {0}")]
    DialFailed(String),
}

/// Errors that cross the public interface. Each kind has a stable string code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UssdError {
    #[error("Please enable accessibility service for USSD Launcher")]
    AccessibilityNotEnabled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    UssdFailed(String),

    #[error("Unsupported API: {0}")]
    UnsupportedApi(String),

    #[error("Reply classification map must contain KEY_ERROR and KEY_LOGIN")]
    BadMappingStructure,

    #[error("USSD code is empty")]
    EmptyUssdCode,

    #[error("Failed to dial USSD code: {0}")]
    DialError(String),

    #[error("Failed to send option: {0}")]
    SendOptionError(String),

    #[error("Failed to end session: {0}")]
    SessionEndError(String),

    #[error("No USSD session is currently active")]
    NoActiveSession,

    #[error("Error cancelling session: {0}")]
    CancelError(String),
}

impl UssdError {
    pub fn code(&self) -> &'static str {
        match self {
            UssdError::AccessibilityNotEnabled => "ACCESSIBILITY_NOT_ENABLED",
            UssdError::InvalidArgument(_) => "INVALID_ARGUMENT",
            UssdError::PermissionDenied(_) => "PERMISSION_DENIED",
            UssdError::UssdFailed(_) => "USSD_FAILED",
            UssdError::UnsupportedApi(_) => "UNSUPPORTED_API",
            UssdError::BadMappingStructure => "BAD_MAPPING_STRUCTURE",
            UssdError::EmptyUssdCode => "EMPTY_USSD_CODE",
            UssdError::DialError(_) => "DIAL_ERROR",
            UssdError::SendOptionError(_) => "SEND_OPTION_ERROR",
            UssdError::SessionEndError(_) => "SESSION_END_ERROR",
            UssdError::NoActiveSession => "NO_ACTIVE_SESSION",
            UssdError::CancelError(_) => "CANCEL_ERROR",
        }
    }
}

impl From<TelephonyError> for UssdError {
    fn from(err: TelephonyError) -> Self {
        match err {
            TelephonyError::PermissionDenied(msg) => UssdError::PermissionDenied(msg),
            TelephonyError::UnsupportedApi(msg) => UssdError::UnsupportedApi(msg),
            TelephonyError::DialFailed(msg) => UssdError::DialError(msg),
            other => UssdError::UssdFailed(other.to_string()),
        }
    }
}

/// Wire form of an error: stable code plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{code}: {message}")]
pub struct BridgeError {
    pub code: String,
    pub message: String,
}

impl BridgeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_implemented(method: &str) -> Self {
        Self::new("NOT_IMPLEMENTED", format!("Method '{method}' is not implemented"))
    }
}

impl From<UssdError> for BridgeError {
    fn from(err: UssdError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(UssdError::EmptyUssdCode.code(), "EMPTY_USSD_CODE");
        assert_eq!(UssdError::NoActiveSession.code(), "NO_ACTIVE_SESSION");
        assert_eq!(
            UssdError::DialError("boom".into()).code(),
            "DIAL_ERROR"
        );
    }

    #[test]
    fn test_telephony_errors_map_to_public_kinds() {
        let denied: UssdError = TelephonyError::PermissionDenied("CALL_PHONE".into()).into();
        assert_eq!(denied.code(), "PERMISSION_DENIED");

        let unavailable: UssdError = TelephonyError::ServiceUnavailable.into();
        assert_eq!(unavailable.code(), "USSD_FAILED");
        assert_eq!(unavailable.to_string(), "USSD service unavailable");
    }

    #[test]
    fn test_bridge_error_serializes_code_and_message() {
        let err: BridgeError = UssdError::AccessibilityNotEnabled.into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "ACCESSIBILITY_NOT_ENABLED");
        assert!(json["message"].as_str().unwrap().contains("accessibility"));
    }
}
