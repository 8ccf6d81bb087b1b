//! Data exchanged with the telephony collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra keys different manufacturers read the SIM slot from.
pub const SLOT_EXTRA_KEYS: &[&str] = &[
    "extra_asus_dial_use_dualsim",
    "com.android.phone.extra.slot",
    "slot",
    "simslot",
    "sim_slot",
    "Subscription",
    "phone",
    "com.android.phone.DialingMode",
    "simSlot",
    "slot_id",
    "simId",
    "simnum",
    "phone_type",
    "slotId",
    "slotIdx",
];

/// Result string for requests dialed through the call path, whose response
/// only arrives later as a dialog.
pub const LEGACY_INITIATED: &str = "USSD_INITIATED_LEGACY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Int(i32),
    Bool(bool),
}

/// Everything needed to place the call that opens the first dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialIntent {
    pub code: String,
    /// SIM slot forced through the extras; `None` lets the dialer pick.
    pub slot: Option<i32>,
    pub uri: String,
    pub extras: BTreeMap<String, ExtraValue>,
}

impl DialIntent {
    pub fn new(code: &str, slot: i32) -> Self {
        let mut extras = BTreeMap::new();
        extras.insert(
            "com.android.phone.force.slot".to_string(),
            ExtraValue::Bool(true),
        );
        extras.insert("Cdma_Supp".to_string(), ExtraValue::Bool(true));
        for key in SLOT_EXTRA_KEYS {
            extras.insert(key.to_string(), ExtraValue::Int(slot));
        }
        Self {
            code: code.to_string(),
            slot: Some(slot),
            uri: tel_uri(code),
            extras,
        }
    }

    /// Plain dial of `code` with no slot extras.
    pub fn unrouted(code: &str) -> Self {
        Self {
            code: code.to_string(),
            slot: None,
            uri: tel_uri(code),
            extras: BTreeMap::new(),
        }
    }
}

/// `tel:` URI with `#` percent-encoded, as dialers otherwise cut the code short.
pub fn tel_uri(code: &str) -> String {
    format!("tel:{}", code.replace('#', "%23"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimCard {
    pub subscription_id: i32,
    pub display_name: Option<String>,
    pub carrier_name: Option<String>,
    pub number: Option<String>,
    pub slot_index: i32,
    pub country_iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_embedded: Option<bool>,
    #[serde(default)]
    pub icc_id: Option<String>,
}

/// Outcome of a single-shot request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UssdResponse {
    /// Raw network response, read directly from the telephony API.
    Response(String),
    /// The code was dialed; its dialog will surface through notifications.
    InitiatedLegacy,
}

impl UssdResponse {
    pub fn as_str(&self) -> &str {
        match self {
            UssdResponse::Response(text) => text,
            UssdResponse::InitiatedLegacy => LEGACY_INITIATED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tel_uri_encodes_hash() {
        assert_eq!(tel_uri("*123#"), "tel:*123%23");
        assert_eq!(tel_uri("*144*1*2#"), "tel:*144*1*2%23");
    }

    #[test]
    fn test_dial_intent_carries_every_slot_key() {
        let intent = DialIntent::new("*123#", 1);
        for key in SLOT_EXTRA_KEYS {
            assert_eq!(intent.extras.get(*key), Some(&ExtraValue::Int(1)));
        }
        assert_eq!(
            intent.extras.get("com.android.phone.force.slot"),
            Some(&ExtraValue::Bool(true))
        );
    }

    #[test]
    fn test_unrouted_intent_has_no_extras() {
        let intent = DialIntent::unrouted("*100#");
        assert_eq!(intent.slot, None);
        assert_eq!(intent.uri, "tel:*100%23");
        assert!(intent.extras.is_empty());
    }

    #[test]
    fn test_sim_card_json_shape() {
        let card = SimCard {
            subscription_id: 3,
            display_name: Some("Orange".into()),
            carrier_name: Some("Orange CI".into()),
            number: None,
            slot_index: 0,
            country_iso: Some("ci".into()),
            carrier_id: None,
            is_embedded: Some(false),
            icc_id: None,
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["subscriptionId"], 3);
        assert_eq!(json["slotIndex"], 0);
        assert!(json.get("carrierId").is_none());
        assert_eq!(json["isEmbedded"], false);
    }
}
