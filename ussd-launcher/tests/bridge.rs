mod common;

use common::Harness;
use serde_json::json;
use ussd_launcher::platforms::memory::Screen;
use ussd_launcher::{MethodCallBridge, SimCard};

fn bridge(h: &Harness) -> MethodCallBridge {
    MethodCallBridge::new(h.launcher.clone())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_method() {
    let h = Harness::new(vec![]);
    let err = bridge(&h).call("hideDialogs", json!({})).await.unwrap_err();
    assert_eq!(err.code, "NOT_IMPLEMENTED");
    assert!(err.message.contains("hideDialogs"));
}

#[tokio::test(start_paused = true)]
async fn test_permission_queries() {
    let h = Harness::new(vec![]);
    let bridge = bridge(&h);
    assert_eq!(
        bridge.call("isAccessibilityEnabled", json!(null)).await.unwrap(),
        json!(true)
    );

    h.memory.settings.set_overlay_granted(false);
    assert_eq!(
        bridge
            .call("isOverlayPermissionGranted", json!(null))
            .await
            .unwrap(),
        json!(false)
    );
    assert_eq!(
        bridge.call("openOverlaySettings", json!(null)).await.unwrap(),
        json!(null)
    );
    assert_eq!(h.memory.settings.opened(), vec!["overlay"]);
}

#[tokio::test(start_paused = true)]
async fn test_send_ussd_request() {
    let h = Harness::new(vec![Screen::notice("Balance: 12")]);
    let bridge = bridge(&h);

    let value = bridge
        .call("sendUssdRequest", json!({ "ussdCode": "*100#", "subscriptionId": 1 }))
        .await
        .unwrap();
    assert_eq!(value, json!("USSD_INITIATED_LEGACY"));
    let dialed = h.memory.telephony.dialed();
    assert_eq!(dialed.len(), 1);
    assert!(dialed[0].extras.is_empty());

    h.memory
        .telephony
        .respond_with(Ok("Balance: 1000 XOF".to_string()));
    let value = bridge
        .call("sendUssdRequest", json!({ "ussdCode": "*100#" }))
        .await
        .unwrap();
    assert_eq!(value, json!("Balance: 1000 XOF"));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_arguments() {
    let h = Harness::new(vec![]);
    let bridge = bridge(&h);

    let err = bridge
        .call("sendUssdRequest", json!({ "subscriptionId": 1 }))
        .await
        .unwrap_err();
    assert_eq!(err.code, "INVALID_ARGUMENT");

    let err = bridge
        .call("sendMessage", json!({ "message": 42 }))
        .await
        .unwrap_err();
    assert_eq!(err.code, "INVALID_ARGUMENT");
}

#[tokio::test(start_paused = true)]
async fn test_multisession_round_trip() {
    let h = Harness::new(vec![
        Screen::prompt("1. Balance\n2. Recharge"),
        Screen::notice("Your balance is 1500 FCFA"),
    ]);
    let value = bridge(&h)
        .call(
            "multisessionUssd",
            json!({
                "ussdCode": "*123#",
                "slotIndex": 0,
                "options": ["1"],
                "initialDelayMs": 2000,
                "optionDelayMs": 1000,
            }),
        )
        .await
        .unwrap();

    assert_eq!(value["status"], json!("COMPLETED"));
    assert_eq!(value["stepsDelivered"], json!(1));
    assert_eq!(value["finalMessage"], json!("Your balance is 1500 FCFA"));
    assert_eq!(value["skipped"], json!([]));
}

#[tokio::test(start_paused = true)]
async fn test_multisession_error_codes() {
    let h = Harness::new(vec![]);
    let bridge = bridge(&h);

    let err = bridge
        .call("multisessionUssd", json!({ "ussdCode": "", "options": ["1"] }))
        .await
        .unwrap_err();
    assert_eq!(err.code, "EMPTY_USSD_CODE");

    let err = bridge
        .call(
            "multisessionUssd",
            json!({ "ussdCode": "*123#", "classification": { "KEY_ERROR": ["x"] } }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, "BAD_MAPPING_STRUCTURE");

    let err = bridge.call("cancelSession", json!(null)).await.unwrap_err();
    assert_eq!(err.code, "NO_ACTIVE_SESSION");
}

#[tokio::test(start_paused = true)]
async fn test_sim_cards() {
    let h = Harness::new(vec![]);
    h.memory.telephony.set_sim_cards(vec![SimCard {
        subscription_id: 3,
        display_name: Some("Work".into()),
        carrier_name: Some("Orange".into()),
        number: None,
        slot_index: 1,
        country_iso: Some("sn".into()),
        carrier_id: None,
        is_embedded: Some(false),
        icc_id: None,
    }]);

    let value = bridge(&h).call("getSimCards", json!(null)).await.unwrap();
    assert_eq!(value[0]["subscriptionId"], json!(3));
    assert_eq!(value[0]["carrierName"], json!("Orange"));
    assert_eq!(value[0]["slotIndex"], json!(1));
    assert_eq!(value[0]["isEmbedded"], json!(false));
    assert!(value[0].get("carrierId").is_none());
}
