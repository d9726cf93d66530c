//! Agent context: items kept visible in every prompt.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Extension point the prompt builder calls once per cycle.
pub trait ContextProvider: Send + Sync {
    /// Markdown body for the `## Context` section, or `None` to omit it.
    fn render(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Where the content came from, e.g. a workspace path
    pub source: String,
    pub content: String,
}

/// Numbered context items, shared between the context commands and the
/// prompt builder.
#[derive(Debug, Default)]
pub struct AgentContext {
    items: Mutex<Vec<ContextItem>>,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ContextItem>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an item. Returns `false` if its source is already open.
    pub fn add(&self, source: impl Into<String>, content: impl Into<String>) -> bool {
        let source = source.into();
        let mut items = self.lock();
        if items.iter().any(|i| i.source == source) {
            return false;
        }
        items.push(ContextItem {
            source,
            content: content.into(),
        });
        true
    }

    /// Remove the item with 1-based `number`.
    pub fn close(&self, number: usize) -> Option<ContextItem> {
        let mut items = self.lock();
        if number == 0 || number > items.len() {
            return None;
        }
        Some(items.remove(number - 1))
    }

    pub fn items(&self) -> Vec<ContextItem> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl ContextProvider for AgentContext {
    fn render(&self) -> Option<String> {
        let items = self.lock();
        if items.is_empty() {
            return None;
        }
        let mut out = String::from(
            "These are the items currently open in your context. \
             Use `close_context_item` with an item's number when you no longer need it.\n",
        );
        for (i, item) in items.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {}\n```\n{}\n```\n",
                i + 1,
                item.source,
                item.content.trim_end()
            ));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_renders_nothing() {
        assert!(AgentContext::new().render().is_none());
    }

    #[test]
    fn add_is_idempotent_per_source() {
        let ctx = AgentContext::new();
        assert!(ctx.add("notes.md", "one"));
        assert!(!ctx.add("notes.md", "two"));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.items()[0].content, "one");
    }

    #[test]
    fn close_uses_one_based_numbers() {
        let ctx = AgentContext::new();
        ctx.add("a.txt", "A");
        ctx.add("b.txt", "B");
        assert!(ctx.close(0).is_none());
        assert!(ctx.close(3).is_none());
        assert_eq!(ctx.close(1).unwrap().source, "a.txt");
        assert_eq!(ctx.items()[0].source, "b.txt");
    }

    #[test]
    fn render_numbers_items() {
        let ctx = AgentContext::new();
        ctx.add("a.txt", "alpha\n");
        ctx.add("b.txt", "beta");
        let text = ctx.render().unwrap();
        assert!(text.contains("1. a.txt\n```\nalpha\n```"));
        assert!(text.contains("2. b.txt"));
        assert!(text.contains("close_context_item"));
    }
}
