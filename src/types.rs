//! Core types used throughout the extraction pipeline.
//!
//! This module defines the canonical document model, the pass state machine
//! vocabulary, and the error taxonomy shared by the locator, canonicalizer,
//! and emission pipeline.

use serde::{Deserialize, Serialize};

/// Logical slot a region is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionSlot {
    /// The question/prompt region
    Prompt,
    /// The answer options region
    Options,
}

impl RegionSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionSlot::Prompt => "prompt",
            RegionSlot::Options => "options",
        }
    }
}

impl std::fmt::Display for RegionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a canonical text segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Table,
    ImageDescription,
    AnswerItem,
}

/// A typed segment of normalized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl CanonicalBlock {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Ordered sequence of canonical blocks; immutable, recomputed each pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDocument {
    blocks: Vec<CanonicalBlock>,
}

impl CanonicalDocument {
    pub fn new(blocks: Vec<CanonicalBlock>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[CanonicalBlock] {
        &self.blocks
    }

    /// Number of answer item blocks in the document
    pub fn answer_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockKind::AnswerItem)
            .count()
    }

    /// Serialize the document to its plain-text form.
    ///
    /// Prompt blocks are joined by a blank line under a `QUESTION:` header;
    /// answer items are newline-joined under an `OPTIONS:` header.
    pub fn render(&self) -> String {
        let mut question: Vec<&str> = Vec::new();
        let mut answers: Vec<&str> = Vec::new();

        for block in &self.blocks {
            if block.kind == BlockKind::AnswerItem {
                answers.push(&block.text);
            } else {
                question.push(&block.text);
            }
        }

        let mut out = String::from("QUESTION:\n");
        out.push_str(&question.join("\n\n"));
        if !answers.is_empty() {
            out.push_str("\n\nOPTIONS:\n");
            out.push_str(&answers.join("\n"));
        }
        out
    }
}

/// States of the per-pass extraction state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Waiting for a scheduling trigger
    Idle,
    /// A trigger fired; locating regions
    PassPending,
    /// Both regions resolved and canonicalized
    Extracted,
    /// Fingerprint matched the emission record; nothing delivered
    Suppressed,
    /// Fingerprint differed; document handed to the sink
    Emitted,
}

/// Why a pass produced no document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A region slot had no matching subtree; expected and frequent
    RegionMissing(RegionSlot),
    /// Canonicalization yielded nothing usable (e.g. zero surviving options)
    ExtractionEmpty,
    /// Raw region text identical to the last emission's snapshot
    RawUnchanged,
}

/// Outcome of a single extraction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// No document was produced; no side effects
    Skipped(SkipReason),
    /// Document produced but identical to the last emission
    Suppressed,
    /// Document handed to the sink; `delivered` reports the sink result
    Emitted { delivered: bool },
}

/// Errors raised by the output sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_question_and_options() {
        let doc = CanonicalDocument::new(vec![
            CanonicalBlock::new(BlockKind::Paragraph, "What is the capital of France?"),
            CanonicalBlock::new(BlockKind::AnswerItem, "A.) Paris"),
            CanonicalBlock::new(BlockKind::AnswerItem, "B.) Lyon"),
        ]);

        assert_eq!(
            doc.render(),
            "QUESTION:\nWhat is the capital of France?\n\nOPTIONS:\nA.) Paris\nB.) Lyon"
        );
    }

    #[test]
    fn test_render_multi_paragraph_prompt() {
        let doc = CanonicalDocument::new(vec![
            CanonicalBlock::new(BlockKind::Paragraph, "First."),
            CanonicalBlock::new(BlockKind::Paragraph, "Second."),
            CanonicalBlock::new(BlockKind::AnswerItem, "A.) Yes"),
        ]);

        assert_eq!(
            doc.render(),
            "QUESTION:\nFirst.\n\nSecond.\n\nOPTIONS:\nA.) Yes"
        );
    }

    #[test]
    fn test_answer_count() {
        let doc = CanonicalDocument::new(vec![
            CanonicalBlock::new(BlockKind::Paragraph, "Q"),
            CanonicalBlock::new(BlockKind::Table, "| a |"),
            CanonicalBlock::new(BlockKind::AnswerItem, "A.) x"),
        ]);
        assert_eq!(doc.answer_count(), 1);
    }
}
