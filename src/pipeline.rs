//! The per-pass extraction sequence.
//!
//! A pass resolves both regions, bails early when the raw region text has
//! not moved since the last emission, canonicalizes, and hands the document
//! to the emission pipeline. Every failure short of a sink error is a silent
//! no-op; the next trigger simply tries again.

use crate::canonicalizer::Canonicalizer;
use crate::config::Config;
use crate::emission::{DeliverySink, EmissionPipeline};
use crate::locator::RegionLocator;
use crate::notify::Notifier;
use crate::selector::SelectorError;
use crate::tree::{DocumentTree, NodeId};
use crate::types::{CanonicalDocument, PassOutcome, PassState, RegionSlot, SkipReason};
use tracing::{debug, trace};

/// Runs the locate/canonicalize/emit sequence for one pass at a time
pub struct ExtractionPipeline<S> {
    locator: RegionLocator,
    canonicalizer: Canonicalizer,
    emission: EmissionPipeline<S>,
    state: PassState,
}

impl<S: DeliverySink> ExtractionPipeline<S> {
    pub fn from_config(config: &Config, sink: S, notifier: Notifier) -> Result<Self, SelectorError> {
        Ok(Self {
            locator: RegionLocator::from_config(&config.selectors)?,
            canonicalizer: Canonicalizer::from_config(&config.selectors)?,
            emission: EmissionPipeline::new(sink, notifier),
            state: PassState::Idle,
        })
    }

    /// State left behind by the most recent pass
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Drop cached raw text after a same-document navigation
    pub fn invalidate(&mut self) {
        self.emission.invalidate_raw();
    }

    /// The narrowest node worth observing: the common ancestor of both
    /// resolved regions, or the tree root while either is unresolved.
    pub fn observation_root(&self, tree: &DocumentTree) -> NodeId {
        let prompt = self.locator.locate(tree, RegionSlot::Prompt);
        let options = self.locator.locate(tree, RegionSlot::Options);
        match (prompt, options) {
            (Some(p), Some(o)) => common_ancestor(tree, p, o),
            _ => tree.root(),
        }
    }

    /// Execute one pass against the current tree
    pub fn run_pass(&mut self, tree: &DocumentTree) -> PassOutcome {
        self.state = PassState::PassPending;
        let outcome = self.execute(tree);
        self.state = match outcome {
            PassOutcome::Skipped(_) => PassState::Idle,
            PassOutcome::Suppressed => PassState::Suppressed,
            PassOutcome::Emitted { .. } => PassState::Emitted,
        };
        outcome
    }

    fn execute(&mut self, tree: &DocumentTree) -> PassOutcome {
        let prompt = match self.locator.locate(tree, RegionSlot::Prompt) {
            Some(node) => node,
            None => {
                trace!("prompt region unresolved, pass skipped");
                return PassOutcome::Skipped(SkipReason::RegionMissing(RegionSlot::Prompt));
            }
        };
        let options = match self.locator.locate(tree, RegionSlot::Options) {
            Some(node) => node,
            None => {
                trace!("options region unresolved, pass skipped");
                return PassOutcome::Skipped(SkipReason::RegionMissing(RegionSlot::Options));
            }
        };

        // cheap exit before any canonicalization work
        let raw = format!(
            "{}\u{0}{}",
            tree.text_content(prompt),
            tree.text_content(options)
        );
        if self.emission.raw_unchanged(&raw) {
            trace!("raw region text unchanged, pass skipped");
            return PassOutcome::Skipped(SkipReason::RawUnchanged);
        }

        let mut blocks = self.canonicalizer.canonicalize_prompt(tree, prompt);
        let answers = self.canonicalizer.canonicalize_options(tree, options);
        if answers.is_empty() {
            debug!("no surviving answer items, pass aborted");
            return PassOutcome::Skipped(SkipReason::ExtractionEmpty);
        }
        blocks.extend(answers);
        self.state = PassState::Extracted;

        self.emission.submit(&CanonicalDocument::new(blocks), &raw)
    }
}

/// Nearest node that is an ancestor-or-self of both `a` and `b`
fn common_ancestor(tree: &DocumentTree, a: NodeId, b: NodeId) -> NodeId {
    let mut cur = Some(a);
    while let Some(node) = cur {
        if tree.is_ancestor_or_self(node, b) {
            return node;
        }
        cur = tree.parent(node);
    }
    tree.root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::notification_channel;
    use crate::types::SinkError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingSink {
        delivered: Rc<RefCell<Vec<String>>>,
    }

    impl DeliverySink for RecordingSink {
        fn deliver(&mut self, text: &str) -> Result<(), SinkError> {
            self.delivered.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    fn pipeline() -> (ExtractionPipeline<RecordingSink>, Rc<RefCell<Vec<String>>>) {
        let sink = RecordingSink::default();
        let delivered = sink.delivered.clone();
        let (notifier, _rx) = notification_channel();
        let pipeline = ExtractionPipeline::from_config(&Config::default(), sink, notifier).unwrap();
        (pipeline, delivered)
    }

    fn quiz_tree() -> (DocumentTree, NodeId, NodeId) {
        let mut tree = DocumentTree::new("html");
        let body = tree.append_element(tree.root(), "body");
        let prompt = tree.append_element(body, "div");
        tree.add_class(prompt, "question-body");
        let p = tree.append_element(prompt, "p");
        tree.append_text(p, "What is the capital of France?");
        let options = tree.append_element(body, "ul");
        tree.add_class(options, "multiple-choice-answer-fields");
        for city in ["Paris", "Lyon"] {
            let li = tree.append_element(options, "li");
            tree.append_text(li, city);
        }
        (tree, prompt, options)
    }

    #[test]
    fn test_full_pass_emits_rendered_document() {
        let (mut pipeline, delivered) = pipeline();
        let (tree, _, _) = quiz_tree();

        let outcome = pipeline.run_pass(&tree);
        assert_eq!(outcome, PassOutcome::Emitted { delivered: true });
        assert_eq!(pipeline.state(), PassState::Emitted);
        assert_eq!(
            delivered.borrow()[0],
            "QUESTION:\nWhat is the capital of France?\n\nOPTIONS:\nA.) Paris\nB.) Lyon"
        );
    }

    #[test]
    fn test_unchanged_tree_skips_on_raw_snapshot() {
        let (mut pipeline, delivered) = pipeline();
        let (tree, _, _) = quiz_tree();

        pipeline.run_pass(&tree);
        let outcome = pipeline.run_pass(&tree);
        assert_eq!(outcome, PassOutcome::Skipped(SkipReason::RawUnchanged));
        assert_eq!(delivered.borrow().len(), 1);
    }

    #[test]
    fn test_missing_region_is_silent() {
        let (mut pipeline, delivered) = pipeline();
        let tree = DocumentTree::new("html");

        let outcome = pipeline.run_pass(&tree);
        assert_eq!(
            outcome,
            PassOutcome::Skipped(SkipReason::RegionMissing(RegionSlot::Prompt))
        );
        assert_eq!(pipeline.state(), PassState::Idle);
        assert!(delivered.borrow().is_empty());
    }

    #[test]
    fn test_zero_surviving_options_aborts_pass() {
        let (mut pipeline, delivered) = pipeline();
        let (mut tree, _, options) = quiz_tree();
        for &li in &tree.children(options).to_vec() {
            tree.add_class(li, "rationale-item");
        }

        let outcome = pipeline.run_pass(&tree);
        assert_eq!(outcome, PassOutcome::Skipped(SkipReason::ExtractionEmpty));
        assert!(delivered.borrow().is_empty());
    }

    #[test]
    fn test_options_mutation_reemits_with_same_prompt() {
        let (mut pipeline, delivered) = pipeline();
        let (mut tree, _, options) = quiz_tree();

        pipeline.run_pass(&tree);
        let li = tree.append_element(options, "li");
        tree.append_text(li, "Nice");

        let outcome = pipeline.run_pass(&tree);
        assert_eq!(outcome, PassOutcome::Emitted { delivered: true });
        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 2);
        assert_eq!(
            delivered[1],
            "QUESTION:\nWhat is the capital of France?\n\nOPTIONS:\nA.) Paris\nB.) Lyon\nC.) Nice"
        );
    }

    #[test]
    fn test_observation_root_narrows_when_resolved() {
        let (pipeline, _) = pipeline();
        let (tree, prompt, _) = quiz_tree();

        let root = pipeline.observation_root(&tree);
        // both regions live under body
        assert_eq!(root, tree.parent(prompt).unwrap());

        let empty = DocumentTree::new("html");
        assert_eq!(pipeline.observation_root(&empty), empty.root());
    }
}
