//! Region resolution from selector policy.
//!
//! Regions are re-resolved on every pass; absence is a normal outcome, not
//! an error. The first selector in the slot's ordered list that yields a
//! non-empty match wins, and among that selector's matches the first in
//! document order is chosen. There is no partial-match fallback.

use crate::config::SelectorConfig;
use crate::selector::{SelectorError, SelectorList};
use crate::tree::{DocumentTree, NodeId};
use crate::types::RegionSlot;
use tracing::trace;

/// Resolves live region references from the selector policy
pub struct RegionLocator {
    prompt: Vec<SelectorList>,
    options: Vec<SelectorList>,
}

impl RegionLocator {
    pub fn from_config(config: &SelectorConfig) -> Result<Self, SelectorError> {
        Ok(Self {
            prompt: parse_all(&config.prompt)?,
            options: parse_all(&config.options)?,
        })
    }

    /// Resolve the region for `slot`, if any
    pub fn locate(&self, tree: &DocumentTree, slot: RegionSlot) -> Option<NodeId> {
        let candidates = match slot {
            RegionSlot::Prompt => &self.prompt,
            RegionSlot::Options => &self.options,
        };
        for list in candidates {
            if let Some(node) = list.query_first(tree, tree.root()) {
                return Some(node);
            }
        }
        trace!("no region resolved for {slot} slot");
        None
    }
}

fn parse_all(patterns: &[String]) -> Result<Vec<SelectorList>, SelectorError> {
    patterns.iter().map(|p| SelectorList::parse(p)).collect()
}
