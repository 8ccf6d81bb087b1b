//! Keyword sets used to classify buttons, filter dialog text and recognise
//! the packages that host USSD dialogs.

/// Labels of controls that submit the input field. Matched as lowercase substrings.
pub const CONFIRM_KEYWORDS: &[&str] = &[
    "send", "ok", "submit", "yes", "confirm", "continue", "reply",
    // French
    "envoyer", "confirmer", "oui", "valider", "continuer", "répondre",
    // Spanish
    "enviar", "aceptar", "sí", "confirmar", "continuar", "responder",
    // German
    "senden", "ja", "bestätigen", "weiter", "antworten",
];

/// Labels of controls that abandon the dialog. Never auto-selected as confirm.
pub const CANCEL_KEYWORDS: &[&str] = &[
    "cancel", "dismiss", "close",
    // French
    "annuler", "fermer", "ignorer",
    // Spanish
    "cancelar", "cerrar", "descartar",
    // German
    "abbrechen", "schließen", "verwerfen",
];

/// Text that shows up in the window tree but is never dialog content.
pub const NON_CONTENT_PATTERNS: &[&str] = &[
    "play store",
    "google play",
    "raccourci",
    "shortcut",
    "services téléchargés",
    "downloaded services",
    "volume",
    "settings",
    "paramètres",
    "notification",
    "battery",
    "batterie",
    "wifi",
    "bluetooth",
    "airplane",
    "avion",
];

/// View ids of the positive button on stock and vendor dialogs.
pub const CONFIRM_VIEW_IDS: &[&str] = &[
    "android:id/button1",
    "com.android.phone:id/button1",
    "com.samsung.android.phone:id/button1",
    "com.android.phone:id/send",
    "com.android.phone:id/ok",
];

/// View ids of the negative button, used for best-effort dismissal.
pub const CANCEL_VIEW_IDS: &[&str] = &["android:id/button2", "com.android.phone:id/button2"];

/// Packages that can display USSD dialogs.
pub const USSD_PACKAGES: &[&str] = &[
    "com.android.phone",
    "com.samsung.android.phone",
    "com.android.server.telecom",
    "com.android.dialer",
    "com.google.android.dialer",
    "com.sec.android.app.telephonyui",
    "com.huawei.systemmanager",
    "com.miui.securitycenter",
    "com.coloros.phonemanager",
    "com.oppo.usercenter",
];

/// How a button label reads against the confirm and cancel keyword sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LabelClass {
    Confirm,
    Unclassified,
    Cancel,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Cancel wins over confirm so that labels like "Don't send" are never submitted.
pub fn classify_label(label: &str) -> LabelClass {
    let lower = label.to_lowercase();
    if contains_any(&lower, CANCEL_KEYWORDS) {
        LabelClass::Cancel
    } else if contains_any(&lower, CONFIRM_KEYWORDS) {
        LabelClass::Confirm
    } else {
        LabelClass::Unclassified
    }
}

/// True when the whole label is a bare button caption such as "OK" or "Annuler".
pub fn is_button_caption(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    CONFIRM_KEYWORDS.contains(&lower.as_str()) || CANCEL_KEYWORDS.contains(&lower.as_str())
}

pub fn is_non_content(text: &str) -> bool {
    contains_any(&text.to_lowercase(), NON_CONTENT_PATTERNS)
}

pub fn is_ussd_package(package_name: Option<&str>) -> bool {
    let Some(package_name) = package_name else {
        return false;
    };
    let lower = package_name.to_lowercase();
    USSD_PACKAGES.iter().any(|pkg| lower.contains(pkg))
        || lower.contains("phone")
        || lower.contains("dialer")
        || lower.contains("telecom")
}
