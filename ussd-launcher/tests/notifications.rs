mod common;

use common::{drain, options, received_texts, settle, Harness};
use ussd_launcher::platforms::memory::{MemoryPlatform, Screen};
use ussd_launcher::{
    SessionConfig, SessionState, SurfaceEvent, SurfaceEventKind, TelephonyError, UssdError,
    UssdEvent, UssdLauncher, UssdResponse,
};

fn phone_event(kind: SurfaceEventKind) -> SurfaceEvent {
    SurfaceEvent::new(kind, Some("com.android.phone"))
}

#[tokio::test(start_paused = true)]
async fn test_legacy_request_pushes_dialog_once() {
    let h = Harness::new(vec![Screen::notice("Your balance is 250 MB")]);
    let mut events = h.launcher.subscribe();

    let response = h.launcher.send_ussd_request("*131#", Some(2)).await.unwrap();
    assert_eq!(response, UssdResponse::InitiatedLegacy);
    assert_eq!(response.as_str(), "USSD_INITIATED_LEGACY");
    let dialed = h.memory.telephony.dialed();
    assert_eq!(dialed[0].uri, "tel:*131%23");
    assert_eq!(dialed[0].slot, None);
    assert!(dialed[0].extras.is_empty());

    for _ in 0..3 {
        h.launcher
            .notify(phone_event(SurfaceEventKind::WindowContentChanged));
    }
    settle(10).await;

    let events = drain(&mut events);
    assert_eq!(received_texts(&events), vec!["Your balance is 250 MB"]);
    assert!(matches!(
        &events[0],
        UssdEvent::MessageReceived { session_id: None, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_direct_api_response() {
    let h = Harness::new(vec![]);
    h.memory
        .telephony
        .respond_with(Ok("Balance: 1000 XOF".to_string()));

    let response = h.launcher.send_ussd_request("*100#", None).await.unwrap();
    assert_eq!(response, UssdResponse::Response("Balance: 1000 XOF".into()));
    assert!(h.memory.telephony.dialed().is_empty());

    h.memory
        .telephony
        .respond_with(Err(TelephonyError::ServiceUnavailable));
    let err = h.launcher.send_ussd_request("*100#", None).await.unwrap_err();
    assert_eq!(err.code(), "USSD_FAILED");
    assert_eq!(err.to_string(), "USSD service unavailable");

    h.memory
        .telephony
        .respond_with(Err(TelephonyError::ReturnFailure));
    let err = h.launcher.send_ussd_request("*100#", None).await.unwrap_err();
    assert_eq!(err.code(), "USSD_FAILED");
    assert_eq!(err.to_string(), "USSD request failed");

    h.memory
        .telephony
        .respond_with(Err(TelephonyError::Failure(-1)));
    let err = h.launcher.send_ussd_request("*100#", None).await.unwrap_err();
    assert_eq!(err.code(), "USSD_FAILED");
    assert_eq!(err.to_string(), "Unknown error occurred (code: -1)");
    assert!(h.memory.telephony.dialed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_request_preconditions() {
    let h = Harness::new(vec![]);
    let err = h.launcher.send_ussd_request("  ", None).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");

    h.memory.settings.set_accessibility_enabled(false);
    let err = h.launcher.send_ussd_request("*100#", None).await.unwrap_err();
    assert_eq!(err, UssdError::AccessibilityNotEnabled);
    assert_eq!(h.memory.settings.opened(), vec!["accessibility"]);
    assert!(h.memory.telephony.dialed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_foreign_and_irrelevant_events_are_ignored() {
    // No forwarding: only the notifications sent below reach the launcher.
    let memory = MemoryPlatform::new(vec![Screen::notice("Your balance is 250 MB")]);
    let launcher = UssdLauncher::new(memory.platform(), SessionConfig::default());
    memory.engine.show_next();
    let mut events = launcher.subscribe();

    launcher.notify(SurfaceEvent::new(
        SurfaceEventKind::WindowStateChanged,
        Some("com.whatsapp"),
    ));
    launcher.notify(SurfaceEvent::new(SurfaceEventKind::Other, Some("com.android.phone")));
    launcher.notify(SurfaceEvent::new(SurfaceEventKind::WindowStateChanged, None));
    settle(10).await;
    assert!(drain(&mut events).is_empty());

    launcher.notify(SurfaceEvent::new(
        SurfaceEventKind::WindowStateChanged,
        Some("com.samsung.android.dialer"),
    ));
    settle(10).await;
    assert_eq!(
        received_texts(&drain(&mut events)),
        vec!["Your balance is 250 MB"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_filler_text_is_not_reported() {
    let h = Harness::new(vec![
        Screen::notice("Open Google Play to update"),
        Screen::notice("ok"),
    ]);
    let mut events = h.launcher.subscribe();

    h.memory.engine.show_next();
    settle(10).await;
    h.memory.engine.show_next();
    settle(10).await;
    assert!(received_texts(&drain(&mut events)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_notifications_during_session_are_deduplicated() {
    let h = Harness::new(vec![
        Screen::prompt("1. Balance\n2. Transfer"),
        Screen::notice("Balance: 42"),
    ]);
    let mut handle = h
        .launcher
        .multisession_ussd(h.launcher.request("*123#", 0, options(&["1"])))
        .await
        .unwrap();

    for _ in 0..5 {
        h.launcher
            .notify(phone_event(SurfaceEventKind::WindowContentChanged));
        settle(50).await;
    }

    let mut messages = Vec::new();
    while let Some(message) = handle.next_message().await {
        messages.push(message);
    }
    assert_eq!(messages, vec!["1. Balance\n2. Transfer", "Balance: 42"]);
    assert!(messages.windows(2).all(|pair| pair[0] != pair[1]));
    assert_eq!(handle.wait().await.unwrap().state, SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_late_dialog_is_still_answered() {
    let h = Harness::new(vec![]);
    let handle = h
        .launcher
        .multisession_ussd(h.launcher.request("*123#", 0, options(&["1"])))
        .await
        .unwrap();

    // Past the initial delay; the first readiness checks found nothing.
    settle(5000).await;
    h.memory.engine.push_screen(Screen::prompt("Welcome\n1. Offers"));
    h.memory.engine.push_screen(Screen::notice("Offer activated"));
    h.memory.engine.show_next();

    let report = handle.wait().await.unwrap();
    assert_eq!(report.steps_delivered, 1);
    assert!(report.skipped.is_empty());
    assert_eq!(report.final_message.as_deref(), Some("Offer activated"));
    assert_eq!(h.memory.engine.submitted_values(), vec!["1"]);
}
