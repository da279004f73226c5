//! Selector parsing and matching over the document tree.
//!
//! Supports the subset the selector policies actually use: tag names, `#id`,
//! `.class` (combinable, e.g. `ul.answer-fields`), descendant chains
//! separated by whitespace, and comma-separated alternatives. Matches are
//! always returned in document order.

use crate::tree::{DocumentTree, NodeId};

/// Errors raised while parsing a selector pattern
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("invalid selector `{0}`")]
    Invalid(String),
}

/// A compound selector: tag, id, and class constraints on a single node
#[derive(Debug, Clone, PartialEq, Eq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SimpleSelector {
    fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut tag = None;
        let mut id = None;
        let mut classes = Vec::new();

        let mut rest = input;
        if !rest.starts_with(['#', '.']) {
            let end = rest.find(['#', '.']).unwrap_or(rest.len());
            let name = &rest[..end];
            if name != "*" && !is_identifier(name) {
                return Err(SelectorError::Invalid(input.to_string()));
            }
            tag = Some(name.to_ascii_lowercase());
            rest = &rest[end..];
        }

        while !rest.is_empty() {
            let marker = rest.as_bytes()[0];
            rest = &rest[1..];
            let end = rest.find(['#', '.']).unwrap_or(rest.len());
            let name = &rest[..end];
            if !is_identifier(name) {
                return Err(SelectorError::Invalid(input.to_string()));
            }
            match marker {
                b'#' => id = Some(name.to_string()),
                b'.' => classes.push(name.to_string()),
                _ => return Err(SelectorError::Invalid(input.to_string())),
            }
            rest = &rest[end..];
        }

        if tag.is_none() && id.is_none() && classes.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { tag, id, classes })
    }

    fn matches(&self, tree: &DocumentTree, node: NodeId) -> bool {
        if tree.is_text_node(node) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if tag != "*" && tree.tag(node) != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if tree.element_id(node) != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| tree.has_class(node, c))
    }
}

/// A descendant chain of compound selectors, e.g. `.question-body .question`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    parts: Vec<SimpleSelector>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let parts: Vec<SimpleSelector> = input
            .split_whitespace()
            .map(SimpleSelector::parse)
            .collect::<Result<_, _>>()?;
        if parts.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { parts })
    }

    /// Whether `node` matches, considering ancestor constraints
    pub fn matches(&self, tree: &DocumentTree, node: NodeId) -> bool {
        let (last, rest) = match self.parts.split_last() {
            Some(split) => split,
            None => return false,
        };
        if !last.matches(tree, node) {
            return false;
        }
        // each remaining part must match some strictly higher ancestor,
        // right to left
        let mut idx = rest.len();
        let mut cur = tree.parent(node);
        while idx > 0 {
            let ancestor = match cur {
                Some(a) => a,
                None => return false,
            };
            if rest[idx - 1].matches(tree, ancestor) {
                idx -= 1;
            }
            cur = tree.parent(ancestor);
        }
        true
    }
}

/// Comma-separated selector alternatives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Selector>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let selectors: Vec<Selector> = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Selector::parse)
            .collect::<Result<_, _>>()?;
        if selectors.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { selectors })
    }

    pub fn matches(&self, tree: &DocumentTree, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(tree, node))
    }

    /// First descendant of `from` matching any alternative, in document order
    pub fn query_first(&self, tree: &DocumentTree, from: NodeId) -> Option<NodeId> {
        tree.descendants(from)
            .into_iter()
            .find(|&n| self.matches(tree, n))
    }

    /// All matching descendants of `from`, in document order
    pub fn query_all(&self, tree: &DocumentTree, from: NodeId) -> Vec<NodeId> {
        tree.descendants(from)
            .into_iter()
            .filter(|&n| self.matches(tree, n))
            .collect()
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DocumentTree;

    fn sample_tree() -> (DocumentTree, NodeId, NodeId, NodeId) {
        let mut tree = DocumentTree::new("html");
        let body = tree.append_element(tree.root(), "body");
        let outer = tree.append_element(body, "div");
        tree.add_class(outer, "question-body");
        let inner = tree.append_element(outer, "div");
        tree.add_class(inner, "question");
        let list = tree.append_element(body, "ul");
        tree.add_class(list, "answer-fields");
        tree.set_id(list, "answers");
        (tree, body, inner, list)
    }

    #[test]
    fn test_class_selector() {
        let (tree, body, inner, _) = sample_tree();
        let sel = SelectorList::parse(".question").unwrap();
        assert_eq!(sel.query_first(&tree, body), Some(inner));
    }

    #[test]
    fn test_descendant_chain() {
        let (tree, body, inner, _) = sample_tree();
        let sel = SelectorList::parse(".question-body .question").unwrap();
        assert_eq!(sel.query_first(&tree, body), Some(inner));

        let miss = SelectorList::parse(".answer-fields .question").unwrap();
        assert_eq!(miss.query_first(&tree, body), None);
    }

    #[test]
    fn test_tag_class_and_id() {
        let (tree, body, _, list) = sample_tree();
        let sel = SelectorList::parse("ul.answer-fields").unwrap();
        assert_eq!(sel.query_first(&tree, body), Some(list));

        let by_id = SelectorList::parse("#answers").unwrap();
        assert_eq!(by_id.query_first(&tree, body), Some(list));
    }

    #[test]
    fn test_alternatives_take_document_order() {
        let (tree, body, inner, _) = sample_tree();
        let sel = SelectorList::parse(".answer-fields, .question").unwrap();
        // .question appears first in document order even though it is the
        // second alternative
        assert_eq!(sel.query_first(&tree, body), Some(inner));
    }

    #[test]
    fn test_invalid_selector() {
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse(".bad space.").is_err());
        assert!(SelectorList::parse("div[attr]").is_err());
    }
}
