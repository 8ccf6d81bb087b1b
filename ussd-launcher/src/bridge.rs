//! JSON method-call surface for a host application.
//!
//! Each call names a method and passes its arguments as a JSON object. Results
//! come back as JSON, errors as a [`BridgeError`] carrying a stable code.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::{ReplyClassification, TimingOverrides};
use crate::errors::BridgeError;
use crate::UssdLauncher;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UssdRequestArgs {
    ussd_code: String,
    #[serde(default)]
    subscription_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultisessionArgs {
    ussd_code: String,
    #[serde(default)]
    slot_index: i32,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    initial_delay_ms: Option<u64>,
    #[serde(default)]
    option_delay_ms: Option<u64>,
    #[serde(default)]
    overlay_message: Option<String>,
    #[serde(default)]
    classification: Option<ReplyClassification>,
}

#[derive(Debug, Deserialize)]
struct MessageArgs {
    message: String,
}

fn parse<T: DeserializeOwned>(method: &str, args: Value) -> Result<T, BridgeError> {
    serde_json::from_value(args).map_err(|e| {
        BridgeError::new(
            "INVALID_ARGUMENT",
            format!("Invalid arguments for '{method}': {e}"),
        )
    })
}

pub struct MethodCallBridge {
    launcher: UssdLauncher,
}

impl MethodCallBridge {
    pub fn new(launcher: UssdLauncher) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &UssdLauncher {
        &self.launcher
    }

    #[instrument(skip(self, args))]
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, BridgeError> {
        debug!("Bridge call {}", method);
        match method {
            "sendUssdRequest" => {
                let args: UssdRequestArgs = parse(method, args)?;
                let response = self
                    .launcher
                    .send_ussd_request(&args.ussd_code, args.subscription_id)
                    .await?;
                Ok(Value::String(response.as_str().to_string()))
            }
            "multisessionUssd" => {
                let args: MultisessionArgs = parse(method, args)?;
                let overrides = TimingOverrides {
                    initial_delay_ms: args.initial_delay_ms,
                    option_delay_ms: args.option_delay_ms,
                };
                let mut request = self
                    .launcher
                    .request(&args.ussd_code, args.slot_index, args.options);
                request.config = request.config.with_overrides(&overrides);
                if let Some(classification) = args.classification {
                    request = request.with_classification(classification);
                }
                if let Some(message) = args.overlay_message.as_deref() {
                    request = request.with_overlay(message);
                }

                let handle = self.launcher.multisession_ussd(request).await?;
                let report = handle.wait().await?;
                Ok(json!({
                    "status": report.state,
                    "finalMessage": report.final_message,
                    "stepsDelivered": report.steps_delivered,
                    "skipped": report.skipped,
                }))
            }
            "cancelSession" => {
                self.launcher.cancel_session().await?;
                Ok(Value::Bool(true))
            }
            "sendMessage" => {
                let args: MessageArgs = parse(method, args)?;
                self.launcher.send_message(&args.message).await?;
                Ok(Value::Bool(true))
            }
            "isAccessibilityEnabled" => Ok(Value::Bool(self.launcher.is_accessibility_enabled())),
            "isOverlayPermissionGranted" => {
                Ok(Value::Bool(self.launcher.is_overlay_permission_granted()))
            }
            "openAccessibilitySettings" => {
                self.launcher.open_accessibility_settings();
                Ok(Value::Null)
            }
            "openOverlaySettings" => {
                self.launcher.open_overlay_settings();
                Ok(Value::Null)
            }
            "getSimCards" => {
                let cards = self.launcher.get_sim_cards()?;
                serde_json::to_value(cards)
                    .map_err(|e| BridgeError::new("INTERNAL", e.to_string()))
            }
            other => Err(BridgeError::not_implemented(other)),
        }
    }
}
