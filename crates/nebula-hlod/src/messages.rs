//! User-facing HLOD message list.
//!
//! Every entry is mirrored to `tracing` at the matching level, so the log
//! and the message list never disagree.

use std::fmt;

use crate::node::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What part of the pipeline produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    Configuration,
    Clustering,
    ProxyBuild,
    IndexBudget,
    Coordinator,
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageCategory::Configuration => "configuration",
            MessageCategory::Clustering => "clustering",
            MessageCategory::ProxyBuild => "proxy-build",
            MessageCategory::IndexBudget => "index-budget",
            MessageCategory::Coordinator => "coordinator",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HlodMessage {
    pub severity: Severity,
    pub category: MessageCategory,
    /// Node the message is about, if any.
    pub node: Option<NodeId>,
    pub text: String,
}

/// Ordered list of messages produced by builds and drains.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<HlodMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and emits the matching `tracing` event.
    pub fn push(&mut self, message: HlodMessage) {
        let node = message.node.map(|n| n.to_string()).unwrap_or_default();
        match message.severity {
            Severity::Info => {
                tracing::info!(category = %message.category, node = %node, "{}", message.text)
            }
            Severity::Warning => {
                tracing::warn!(category = %message.category, node = %node, "{}", message.text)
            }
            Severity::Error => {
                tracing::error!(category = %message.category, node = %node, "{}", message.text)
            }
        }
        self.entries.push(message);
    }

    pub fn info(&mut self, category: MessageCategory, node: Option<NodeId>, text: impl Into<String>) {
        self.push_with(Severity::Info, category, node, text.into());
    }

    pub fn warn(&mut self, category: MessageCategory, node: Option<NodeId>, text: impl Into<String>) {
        self.push_with(Severity::Warning, category, node, text.into());
    }

    pub fn error(&mut self, category: MessageCategory, node: Option<NodeId>, text: impl Into<String>) {
        self.push_with(Severity::Error, category, node, text.into());
    }

    fn push_with(
        &mut self,
        severity: Severity,
        category: MessageCategory,
        node: Option<NodeId>,
        text: String,
    ) {
        self.push(HlodMessage {
            severity,
            category,
            node,
            text,
        });
    }

    pub fn entries(&self) -> &[HlodMessage] {
        &self.entries
    }

    /// Messages of one category, oldest first.
    pub fn by_category(&self, category: MessageCategory) -> impl Iterator<Item = &HlodMessage> {
        self.entries.iter().filter(move |m| m.category == category)
    }

    /// Messages referencing `node`, oldest first.
    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &HlodMessage> {
        self.entries.iter().filter(move |m| m.node == Some(node))
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|m| m.severity == Severity::Error)
    }

    /// Takes every message, leaving the log empty.
    pub fn drain(&mut self) -> Vec<HlodMessage> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Messages can be filtered by category and node.
    #[test]
    fn test_query_by_category_and_node() {
        let mut log = MessageLog::new();
        log.warn(MessageCategory::Configuration, None, "disabled");
        log.error(MessageCategory::ProxyBuild, Some(NodeId(4)), "no mesh");
        log.warn(MessageCategory::IndexBudget, Some(NodeId(4)), "too many vertices");

        assert_eq!(log.len(), 3);
        assert_eq!(log.by_category(MessageCategory::ProxyBuild).count(), 1);
        assert_eq!(log.for_node(NodeId(4)).count(), 2);
        assert!(log.has_errors());
    }

    /// Draining returns messages in order and empties the log.
    #[test]
    fn test_drain_empties_log() {
        let mut log = MessageLog::new();
        log.info(MessageCategory::Clustering, None, "first");
        log.info(MessageCategory::Clustering, None, "second");
        let drained = log.drain();
        assert_eq!(drained[0].text, "first");
        assert_eq!(drained[1].text, "second");
        assert!(log.is_empty());
        assert!(!log.has_errors());
    }
}
