//! Non-fatal diagnostics collected during one shortcode compilation

use serde::Serialize;

/// Ordered, append-only list of human-readable problems for one invocation.
///
/// A fresh accumulator is created for every `[osmap]` shortcode; its text is only shown to
/// viewers who can edit the page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorAccumulator {
    entries: Vec<String>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(message.into());
    }

    /// Append every message of `other`, preserving order
    pub fn append(&mut self, other: ErrorAccumulator) {
        self.entries.extend(other.entries);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// All messages joined one per line
    pub fn text(&self) -> String {
        self.entries.join("\n")
    }
}

/// A value together with the warnings raised while producing it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: ErrorAccumulator,
}

impl<T> Resolved<T> {
    /// Move the warnings into `sink` and return the bare value
    pub fn drain_into(self, sink: &mut ErrorAccumulator) -> T {
        sink.append(self.warnings);
        self.value
    }
}
