//! Session timing and reply-classification settings.
//!
//! Every duration is stored in milliseconds so the structs round-trip through
//! JSON unchanged. Missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::errors::UssdError;

pub const KEY_ERROR: &str = "KEY_ERROR";
pub const KEY_LOGIN: &str = "KEY_LOGIN";

/// Progressive backoff: `min(base + retry_count * increment, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub increment_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 500,
            increment_ms: 500,
            max_ms: 3000,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let grown = self
            .base_ms
            .saturating_add(self.increment_ms.saturating_mul(u64::from(retry_count)));
        Duration::from_millis(grown.min(self.max_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Dial to first readiness check.
    pub initial_delay_ms: u64,
    /// Confirm click to the next readiness check.
    pub option_delay_ms: u64,
    pub backoff: BackoffPolicy,
    /// Attempts allowed for one reply before it is skipped.
    pub max_retries: u32,
    /// A dialog must show the same content this long before we act on it.
    pub stability_window_ms: u64,
    /// Wait after the last reply so the final dialog can be captured.
    pub completion_grace_ms: u64,
    /// Pause between focus, clear and set on the input field.
    pub input_settle_ms: u64,
    /// Pause between a verified injection and the confirm click.
    pub confirm_settle_ms: u64,
    /// Close the final dialog once the session completes.
    pub dismiss_on_complete: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3500,
            option_delay_ms: 2000,
            backoff: BackoffPolicy::default(),
            max_retries: 8,
            stability_window_ms: 400,
            completion_grace_ms: 1500,
            input_settle_ms: 40,
            confirm_settle_ms: 300,
            dismiss_on_complete: true,
        }
    }
}

impl SessionConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn option_delay(&self) -> Duration {
        Duration::from_millis(self.option_delay_ms)
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }

    pub fn input_settle(&self) -> Duration {
        Duration::from_millis(self.input_settle_ms)
    }

    pub fn confirm_settle(&self) -> Duration {
        Duration::from_millis(self.confirm_settle_ms)
    }

    pub fn with_overrides(mut self, overrides: &TimingOverrides) -> Self {
        if let Some(ms) = overrides.initial_delay_ms {
            self.initial_delay_ms = ms;
        }
        if let Some(ms) = overrides.option_delay_ms {
            self.option_delay_ms = ms;
        }
        self
    }

    pub fn validate(&self) -> Result<(), UssdError> {
        if self.max_retries == 0 {
            return Err(UssdError::InvalidArgument(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.backoff.max_ms < self.backoff.base_ms {
            return Err(UssdError::InvalidArgument(
                "backoff max_ms must not be below base_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-request timing overrides accepted from the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_delay_ms: Option<u64>,
}

/// Category name to keyword set. Must carry `KEY_ERROR` and `KEY_LOGIN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyClassification(pub HashMap<String, HashSet<String>>);

impl Default for ReplyClassification {
    fn default() -> Self {
        let set = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<HashSet<_>>();
        let mut map = HashMap::new();
        map.insert(
            KEY_ERROR.to_string(),
            set(&["error", "failed", "invalid", "échec", "erreur"]),
        );
        map.insert(
            KEY_LOGIN.to_string(),
            set(&["login", "password", "pin", "code"]),
        );
        Self(map)
    }
}

impl ReplyClassification {
    pub fn validate(&self) -> Result<(), UssdError> {
        if self.0.contains_key(KEY_ERROR) && self.0.contains_key(KEY_LOGIN) {
            Ok(())
        } else {
            Err(UssdError::BadMappingStructure)
        }
    }
}
