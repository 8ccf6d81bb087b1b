use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use ussd_launcher::platforms::memory::Screen;
use ussd_launcher::{ReplyClassification, SessionConfig, SimCard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenKind {
    /// Message, input field, Cancel and Send.
    Prompt,
    /// Message and an OK button.
    Notice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenScript {
    pub kind: ScreenKind,
    pub message: String,
    #[serde(default)]
    pub rejects_text: bool,
    #[serde(default)]
    pub input_error: Option<String>,
}

impl ScreenScript {
    pub fn build(&self) -> Screen {
        let mut screen = match self.kind {
            ScreenKind::Prompt => Screen::prompt(&self.message),
            ScreenKind::Notice => Screen::notice(&self.message),
        };
        if self.rejects_text {
            screen = screen.rejecting_text();
        }
        if let Some(reason) = &self.input_error {
            screen = screen.failing_input(reason);
        }
        screen
    }
}

/// A scripted USSD exchange: what to dial, what to answer and which dialogs
/// the simulated network shows in response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub code: String,
    #[serde(default)]
    pub slot: i32,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub screens: Vec<ScreenScript>,
    #[serde(default)]
    pub overlay_message: Option<String>,
    #[serde(default)]
    pub classification: Option<ReplyClassification>,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub sims: Vec<SimCard>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn screens(&self) -> Vec<Screen> {
        self.screens.iter().map(ScreenScript::build).collect()
    }

    /// Same checks a session start performs, without dialing anything.
    pub fn check(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            bail!("Scenario has an empty USSD code");
        }
        if let Some(classification) = &self.classification {
            classification
                .validate()
                .context("Invalid classification map")?;
        }
        self.config.validate().context("Invalid session config")?;

        let prompts = self
            .screens
            .iter()
            .filter(|s| s.kind == ScreenKind::Prompt)
            .count();
        if prompts < self.options.len() {
            tracing::warn!(
                "{} options but only {} prompt screens; the extra replies will be skipped",
                self.options.len(),
                prompts
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_scenario(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_scenario() {
        let file = write_scenario(r#"{"code": "*123#"}"#);
        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.code, "*123#");
        assert_eq!(scenario.slot, 0);
        assert!(scenario.options.is_empty());
        assert_eq!(scenario.config, SessionConfig::default());
        scenario.check().unwrap();
    }

    #[test]
    fn test_load_full_scenario() {
        let file = write_scenario(
            r#"{
                "code": "*123#",
                "slot": 1,
                "options": ["1", "0000"],
                "screens": [
                    {"kind": "prompt", "message": "1. Balance"},
                    {"kind": "prompt", "message": "Enter PIN", "rejectsText": true},
                    {"kind": "notice", "message": "Balance: 10"}
                ],
                "config": {"initial_delay_ms": 500, "max_retries": 2},
                "sims": [{
                    "subscriptionId": 7, "displayName": "Main", "carrierName": "Orange",
                    "number": null, "slotIndex": 0, "countryIso": "sn"
                }]
            }"#,
        );
        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.screens().len(), 3);
        assert!(scenario.screens[1].rejects_text);
        assert_eq!(scenario.config.initial_delay_ms, 500);
        assert_eq!(scenario.config.max_retries, 2);
        assert_eq!(scenario.config.option_delay_ms, 2000);
        assert_eq!(scenario.sims[0].subscription_id, 7);
        scenario.check().unwrap();
    }

    #[test]
    fn test_check_rejects_bad_input() {
        let file = write_scenario(r#"{"code": "  "}"#);
        let err = Scenario::load(file.path()).unwrap().check().unwrap_err();
        assert!(err.to_string().contains("empty USSD code"));

        let file = write_scenario(r#"{"code": "*1#", "classification": {"KEY_LOGIN": ["pin"]}}"#);
        let err = Scenario::load(file.path()).unwrap().check().unwrap_err();
        assert_eq!(err.to_string(), "Invalid classification map");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scenario::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read scenario"));
    }
}
