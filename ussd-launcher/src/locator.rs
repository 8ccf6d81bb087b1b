use std::collections::VecDeque;
use tracing::{debug, instrument};

use crate::element::{roles, UIElement};
use crate::keywords::{self, LabelClass};
use crate::selector::Selector;

/// Breadth-first search over a tree snapshot.
///
/// Matches are collected into a caller-owned `Vec`; every handle that is
/// visited but not returned is dropped (and therefore released) as soon as
/// the traversal moves past it. Breadth-first order means elements closer to
/// the root win ties.
#[derive(Debug, Clone)]
pub struct Locator {
    selector: Selector,
}

impl Locator {
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }

    pub fn all(&self, root: &UIElement) -> Vec<UIElement> {
        self.search(root, usize::MAX)
    }

    pub fn first(&self, root: &UIElement) -> Option<UIElement> {
        self.search(root, 1).into_iter().next()
    }

    fn search(&self, root: &UIElement, limit: usize) -> Vec<UIElement> {
        let mut found = Vec::new();
        if self.selector.matches(&root.attributes()) {
            found.push(root.clone());
            if found.len() >= limit {
                return found;
            }
        }

        let mut queue: VecDeque<UIElement> = VecDeque::new();
        enqueue_children(root, &mut queue);

        while let Some(node) = queue.pop_front() {
            enqueue_children(&node, &mut queue);
            if self.selector.matches(&node.attributes()) {
                found.push(node);
                if found.len() >= limit {
                    break;
                }
            }
        }
        found
    }
}

fn enqueue_children(node: &UIElement, queue: &mut VecDeque<UIElement>) {
    match node.children() {
        Ok(children) => queue.extend(children),
        // The tree can change under us; a vanished subtree is simply skipped.
        Err(e) => debug!("Skipping children of {:?}: {}", node.object_id(), e),
    }
}

/// All elements with the given class name, in breadth-first order.
pub fn find_by_type(root: &UIElement, role: &str) -> Vec<UIElement> {
    Locator::new(Selector::Role(role.to_string())).all(root)
}

pub fn find_first_input(root: &UIElement) -> Option<UIElement> {
    Locator::new(Selector::input()).first(root)
}

pub fn find_by_view_id(root: &UIElement, view_id: &str) -> Option<UIElement> {
    Locator::new(Selector::ViewId(view_id.to_string())).first(root)
}

pub fn find_clickable_buttons(root: &UIElement) -> Vec<UIElement> {
    Locator::new(Selector::clickable_button()).all(root)
}

/// True when at least one text view carries non-blank text.
pub fn has_text_content(root: &UIElement) -> bool {
    Locator::new(Selector::Role(roles::TEXT.to_string()))
        .all(root)
        .iter()
        .any(|e| !e.label().is_empty())
}

/// Clickable buttons ordered confirm-keyword matches first, unclassified
/// second, cancel-keyword matches last. Order within a class is traversal order.
pub fn rank_buttons(root: &UIElement) -> Vec<(LabelClass, UIElement)> {
    let mut ranked: Vec<(LabelClass, UIElement)> = find_clickable_buttons(root)
        .into_iter()
        .map(|button| (keywords::classify_label(&button.label()), button))
        .collect();
    // Stable sort keeps breadth-first order as the tie-break.
    ranked.sort_by_key(|(class, _)| *class);
    ranked
}

/// The control that submits the input field.
///
/// The first confirm-keyword button wins; without one the first unclassified
/// button is used. Cancel-keyword buttons are never returned.
#[instrument(level = "debug", skip(root))]
pub fn find_confirm_control(root: &UIElement) -> Option<UIElement> {
    let choice = rank_buttons(root)
        .into_iter()
        .find(|(class, _)| *class != LabelClass::Cancel);
    if let Some((class, button)) = &choice {
        debug!("Confirm control {:?} ({:?})", button.label(), class);
    }
    choice.map(|(_, button)| button)
}

/// A control that abandons the dialog: a cancel-keyword button, else a known
/// negative-button view id.
pub fn find_cancel_control(root: &UIElement) -> Option<UIElement> {
    let by_label = find_clickable_buttons(root)
        .into_iter()
        .find(|b| keywords::classify_label(&b.label()) == LabelClass::Cancel);
    by_label.or_else(|| {
        keywords::CANCEL_VIEW_IDS
            .iter()
            .find_map(|id| find_by_view_id(root, id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::UINode;
    use crate::platforms::memory::MemoryEngine;
    use crate::platforms::AccessibilityEngine;

    fn dialog(buttons: Vec<UINode>) -> UINode {
        let mut children = vec![UINode::text_view("1. Balance\n2. Transfer"), UINode::input()];
        children.push(UINode::new(roles::LAYOUT).with_children(buttons));
        UINode::new(roles::FRAME).with_children(children)
    }

    #[test]
    fn test_find_by_type_is_breadth_first() {
        let tree = UINode::new(roles::FRAME).with_children(vec![
            UINode::new(roles::LAYOUT).with_children(vec![UINode::text_view("deep")]),
            UINode::text_view("shallow"),
        ]);
        let engine = MemoryEngine::with_tree(tree);
        let root = engine.root_in_active_window().unwrap();
        let labels: Vec<String> = find_by_type(&root, roles::TEXT)
            .iter()
            .map(|e| e.label())
            .collect();
        assert_eq!(labels, vec!["shallow", "deep"]);
    }

    #[test]
    fn test_confirm_control_prefers_keyword_match() {
        let engine = MemoryEngine::with_tree(dialog(vec![
            UINode::button("Cancel", Some("android:id/button2")),
            UINode::button("More", None),
            UINode::button("Send", Some("android:id/button1")),
        ]));
        let root = engine.root_in_active_window().unwrap();
        let confirm = find_confirm_control(&root).unwrap();
        assert_eq!(confirm.label(), "Send");
    }

    #[test]
    fn test_confirm_control_falls_back_to_unclassified() {
        let engine = MemoryEngine::with_tree(dialog(vec![
            UINode::button("Annuler", None),
            UINode::button("→", None),
        ]));
        let root = engine.root_in_active_window().unwrap();
        assert_eq!(find_confirm_control(&root).unwrap().label(), "→");
    }

    #[test]
    fn test_confirm_control_never_picks_cancel() {
        let engine = MemoryEngine::with_tree(dialog(vec![UINode::button("Dismiss", None)]));
        let root = engine.root_in_active_window().unwrap();
        assert!(find_confirm_control(&root).is_none());
        assert_eq!(find_cancel_control(&root).unwrap().label(), "Dismiss");
    }

    #[test]
    fn test_tie_break_is_traversal_order() {
        let engine = MemoryEngine::with_tree(dialog(vec![
            UINode::button("OK", Some("first")),
            UINode::button("Send", Some("second")),
        ]));
        let root = engine.root_in_active_window().unwrap();
        let confirm = find_confirm_control(&root).unwrap();
        assert_eq!(confirm.view_id().as_deref(), Some("first"));
    }

    #[test]
    fn test_unused_handles_are_released() {
        let engine = MemoryEngine::with_tree(dialog(vec![
            UINode::button("Cancel", None),
            UINode::button("Send", None),
        ]));
        {
            let root = engine.root_in_active_window().unwrap();
            let _input = find_first_input(&root).unwrap();
            let _confirm = find_confirm_control(&root).unwrap();
            assert_eq!(engine.live_handles(), 3);
        }
        assert_eq!(engine.live_handles(), 0);
    }
}
