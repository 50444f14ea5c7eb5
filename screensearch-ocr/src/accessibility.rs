//! Read-only accessibility-tree text collection.
//!
//! Uses `uiautomation` (`UIAutomation::new`, `get_focused_element`,
//! property-based element search) for a bounded-depth walk of the focused
//! window's subtree, collecting non-empty name/value/help text. Never
//! clicks or types anything.

use crate::{OcrError, Result};
use async_trait::async_trait;
use uiautomation::types::UIProperty;
use uiautomation::UIAutomation;
use uiautomation::UIElement;

/// Maximum tree depth the walk will descend to - deep enough for
/// realistic app chrome, shallow enough that a pathological tree can't
/// hang the walk.
const MAX_WALK_DEPTH: usize = 15;

#[async_trait]
pub trait AccessibilityProvider: Send + Sync {
    /// Text snippets pulled from the currently focused window's
    /// accessibility tree, in document order. Empty on permission denial or
    /// when nothing is focused - callers treat that the same as "no
    /// accessibility text available" and fall back to OCR alone.
    async fn focused_window_text(&self) -> Result<Vec<String>>;
}

pub struct UiAutomationProvider;

impl UiAutomationProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UiAutomationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessibilityProvider for UiAutomationProvider {
    async fn focused_window_text(&self) -> Result<Vec<String>> {
        // `uiautomation`'s COM types aren't Send; the whole walk runs on one
        // blocking thread, same pattern as the OCR recognizer.
        tokio::task::spawn_blocking(walk_focused_window)
            .await
            .map_err(|e| OcrError::AccessibilityError(format!("walk task panicked: {}", e)))?
    }
}

fn walk_focused_window() -> Result<Vec<String>> {
    let automation = UIAutomation::new().map_err(classify)?;
    let focused = automation.get_focused_element().map_err(classify)?;

    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    collect_text(&focused, 0, &mut out, &mut seen);
    Ok(out)
}

/// Recursive walk reading `Name`/`ValueValue`/`HelpText` off each node via
/// `get_property_value` - never calls a click/type/pattern-setter method,
/// so the walk can't mutate anything.
fn collect_text(
    element: &UIElement,
    depth: usize,
    out: &mut Vec<String>,
    seen: &mut std::collections::HashSet<String>,
) {
    if depth > MAX_WALK_DEPTH {
        return;
    }

    for property in [UIProperty::Name, UIProperty::ValueValue, UIProperty::HelpText] {
        if let Ok(value) = element.get_property_value(property) {
            if let Ok(text) = value.get_string() {
                push_unique(out, seen, text);
            }
        }
    }

    if let Ok(children) = element.get_cached_children() {
        for child in children {
            collect_text(&child, depth + 1, out, seen);
        }
    }
}

fn push_unique(out: &mut Vec<String>, seen: &mut std::collections::HashSet<String>, text: String) {
    let trimmed = text.trim();
    if trimmed.is_empty() || !seen.insert(trimmed.to_string()) {
        return;
    }
    out.push(trimmed.to_string());
}

fn classify(err: impl std::fmt::Display) -> OcrError {
    let message = err.to_string();
    if message.to_lowercase().contains("access is denied") {
        OcrError::PermissionDenied
    } else {
        OcrError::AccessibilityError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_unique_dedupes_and_trims() {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        push_unique(&mut out, &mut seen, "  hello  ".to_string());
        push_unique(&mut out, &mut seen, "hello".to_string());
        push_unique(&mut out, &mut seen, "   ".to_string());
        push_unique(&mut out, &mut seen, "world".to_string());
        assert_eq!(out, vec!["hello".to_string(), "world".to_string()]);
    }
}
