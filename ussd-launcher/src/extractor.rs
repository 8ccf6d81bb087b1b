use std::collections::VecDeque;
use tracing::debug;

use crate::element::{roles, UIElement};
use crate::keywords;

/// Shortest message that is worth reporting.
const MIN_REPORTABLE_CHARS: usize = 3;

/// Collects the dialog text from a tree snapshot.
///
/// Leaf elements carrying text are visited in breadth-first order, except
/// input fields (whose value is what we type, not what the network said) and
/// buttons (captions are not content). Text on containers is ignored. Each
/// text is trimmed and anything of one character or less is dropped.
/// Survivors are joined with newlines.
pub fn extract_message(root: &UIElement) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut queue: VecDeque<UIElement> = VecDeque::new();
    queue.push_back(root.clone());

    while let Some(node) = queue.pop_front() {
        let attrs = node.attributes();
        if attrs.role == roles::INPUT {
            continue;
        }
        match node.children() {
            Ok(children) if !children.is_empty() => {
                queue.extend(children);
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Text walk skipped a subtree: {}", e);
                continue;
            }
        }
        if attrs.role == roles::BUTTON {
            continue;
        }
        if let Some(text) = attrs.text.as_deref().map(str::trim) {
            if text.chars().count() > 1 && !keywords::is_button_caption(text) {
                parts.push(text.to_string());
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Presence/absence filter only; the text itself is never interpreted.
pub fn is_reportable(message: &str) -> bool {
    if message.chars().count() < MIN_REPORTABLE_CHARS {
        return false;
    }
    !keywords::is_non_content(message)
}

/// Remembers the last message forwarded upward so the same dialog is never
/// reported twice in a row.
#[derive(Debug, Default, Clone)]
pub struct MessageDeduplicator {
    last: Option<String>,
}

impl MessageDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `message` differs from the last forwarded one. The
    /// new value is recorded before returning, so a re-entrant call made while
    /// the caller is still forwarding sees it as a duplicate.
    pub fn offer(&mut self, message: &str) -> bool {
        if self.last.as_deref() == Some(message) {
            return false;
        }
        self.last = Some(message.to_string());
        true
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::UINode;
    use crate::platforms::memory::MemoryEngine;
    use crate::platforms::AccessibilityEngine;

    #[test]
    fn test_extract_skips_inputs_buttons_and_short_text() {
        let tree = UINode::new(roles::FRAME).with_children(vec![
            UINode::text_view("  Your balance is 1500 FCFA  "),
            UINode::text_view("x"),
            UINode::text_view("OK"),
            {
                let mut input = UINode::input();
                input.attributes.text = Some("1234".to_string());
                input
            },
            UINode::new(roles::LAYOUT).with_children(vec![
                UINode::text_view("1. Recharge"),
                UINode::button("Send", None),
            ]),
        ]);
        let engine = MemoryEngine::with_tree(tree);
        let root = engine.root_in_active_window().unwrap();
        assert_eq!(
            extract_message(&root).as_deref(),
            Some("Your balance is 1500 FCFA\n1. Recharge")
        );
    }

    #[test]
    fn test_extract_ignores_container_text() {
        let mut panel = UINode::new(roles::LAYOUT).with_children(vec![
            UINode::text_view("1. Balance"),
            UINode::text_view("2. Transfer"),
        ]);
        panel.attributes.text = Some("1. Balance 2. Transfer".to_string());
        let mut frame = UINode::new(roles::FRAME).with_children(vec![panel]);
        frame.attributes.text = Some("USSD code running".to_string());

        let engine = MemoryEngine::with_tree(frame);
        let root = engine.root_in_active_window().unwrap();
        assert_eq!(
            extract_message(&root).as_deref(),
            Some("1. Balance\n2. Transfer")
        );
    }

    #[test]
    fn test_extract_empty_tree() {
        let engine = MemoryEngine::with_tree(UINode::new(roles::FRAME));
        let root = engine.root_in_active_window().unwrap();
        assert_eq!(extract_message(&root), None);
    }

    #[test]
    fn test_is_reportable() {
        assert!(is_reportable("1. Balance\n2. Transfer"));
        assert!(is_reportable("Hello"));
        assert!(!is_reportable("ab"));
        assert!(!is_reportable("Open Google Play"));
        assert!(!is_reportable("Battery saver is on"));
    }

    #[test]
    fn test_dedup_never_forwards_consecutive_duplicates() {
        let stream = ["menu", "menu", "pin", "pin", "pin", "menu", "done", "done"];
        let mut dedup = MessageDeduplicator::new();
        let forwarded: Vec<&str> = stream.iter().copied().filter(|m| dedup.offer(m)).collect();
        assert_eq!(forwarded, vec!["menu", "pin", "menu", "done"]);
        assert!(forwarded.windows(2).all(|w| w[0] != w[1]));
        assert_eq!(dedup.last(), Some("done"));

        dedup.reset();
        assert!(dedup.offer("done"));
    }
}
