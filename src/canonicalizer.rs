//! Region canonicalization.
//!
//! Rewrites a region subtree into normalized text blocks. All rewriting
//! happens on an isolated clone of the region; the live tree is never
//! touched. Steps, in order: strip noise subtrees, replace described images
//! with inline markers, render tables as pipe grids, convert explicit breaks
//! and paragraph boundaries to newlines, collapse newline runs, and (for the
//! options slot) segment into labeled answer items.

use crate::config::SelectorConfig;
use crate::selector::{SelectorError, SelectorList};
use crate::tree::{DocumentTree, NodeId};
use crate::types::{BlockKind, CanonicalBlock};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

lazy_static! {
    static ref IMG: SelectorList = SelectorList::parse("img").unwrap();
    static ref TABLE: SelectorList = SelectorList::parse("table").unwrap();
    static ref ROW: SelectorList = SelectorList::parse("tr").unwrap();
    static ref CELL: SelectorList = SelectorList::parse("td, th").unwrap();
    static ref PARA: SelectorList = SelectorList::parse("p").unwrap();
    static ref BREAK: SelectorList = SelectorList::parse("br").unwrap();
    static ref ITEM: SelectorList = SelectorList::parse("li").unwrap();

    // leading "A.)" / "b." style label echoes at the start of an item
    static ref LABEL_PREFIX: Regex = Regex::new(r"^\s*([A-Za-z])[.)]+\s*").unwrap();
    static ref IMAGE_MARKER: Regex = Regex::new(r"^\[Image: .+\]$").unwrap();
}

/// Rewrites region subtrees into canonical blocks
pub struct Canonicalizer {
    strip: Vec<SelectorList>,
    item_text: Vec<SelectorList>,
    rationale_class: String,
}

impl Canonicalizer {
    pub fn from_config(config: &SelectorConfig) -> Result<Self, SelectorError> {
        Ok(Self {
            strip: config
                .strip
                .iter()
                .map(|p| SelectorList::parse(p))
                .collect::<Result<_, _>>()?,
            item_text: config
                .item_text
                .iter()
                .map(|p| SelectorList::parse(p))
                .collect::<Result<_, _>>()?,
            rationale_class: config.rationale_class.clone(),
        })
    }

    /// Canonicalize the prompt region into typed blocks
    pub fn canonicalize_prompt(
        &self,
        tree: &DocumentTree,
        region: NodeId,
    ) -> Vec<CanonicalBlock> {
        segment_blocks(&self.clean_text(tree, region))
    }

    /// Canonicalize the options region into one labeled block per surviving
    /// item. Rationale items and items with no usable text do not consume a
    /// label.
    pub fn canonicalize_options(
        &self,
        tree: &DocumentTree,
        region: NodeId,
    ) -> Vec<CanonicalBlock> {
        let mut blocks = Vec::new();
        let mut survivor = 0usize;

        for item in ITEM.query_all(tree, region) {
            if tree.has_class(item, &self.rationale_class) {
                trace!("skipping rationale item");
                continue;
            }
            let text_node = self
                .item_text
                .iter()
                .find_map(|list| list.query_first(tree, item))
                .unwrap_or(item);
            let text = self.clean_text(tree, text_node);
            if text.is_empty() {
                continue;
            }
            let label = survivor_label(survivor);
            let text = strip_label_echo(&text, &label);
            blocks.push(CanonicalBlock::new(
                BlockKind::AnswerItem,
                format!("{label}.) {text}"),
            ));
            survivor += 1;
        }
        blocks
    }

    /// Produce the normalized plain text of a node, working on a clone
    fn clean_text(&self, tree: &DocumentTree, node: NodeId) -> String {
        let mut copy = tree.clone_subtree(node);
        let root = copy.root();

        // 1. noise subtrees
        for list in &self.strip {
            for n in list.query_all(&copy, root) {
                if copy.is_attached(n) {
                    copy.remove(n);
                }
            }
        }

        // 2. images: described ones become inline markers, the rest vanish
        for img in IMG.query_all(&copy, root) {
            if !copy.is_attached(img) {
                continue;
            }
            match copy.attr(img, "alt").map(str::trim) {
                Some(alt) if !alt.is_empty() => {
                    let marker = format!("[Image: {alt}] ");
                    copy.replace_with_text(img, marker);
                }
                _ => copy.remove(img),
            }
        }

        // 3. tables become pipe grids
        for table in TABLE.query_all(&copy, root) {
            if !copy.is_attached(table) {
                continue;
            }
            let grid = render_table(&copy, table);
            copy.replace_with_text(table, format!("\n\n{grid}\n\n"));
        }

        // 4. paragraph boundaries and explicit breaks
        for p in PARA.query_all(&copy, root) {
            if copy.is_attached(p) {
                copy.append_text(p, "\n\n");
            }
        }
        for br in BREAK.query_all(&copy, root) {
            if copy.is_attached(br) {
                copy.replace_with_text(br, "\n");
            }
        }

        normalize_newlines(&copy.text_content(root))
    }
}

/// Render a table node as a pipe-delimited grid: header row, one `---` cell
/// per column, then data rows.
fn render_table(tree: &DocumentTree, table: NodeId) -> String {
    let mut lines = Vec::new();
    for (i, row) in ROW.query_all(tree, table).into_iter().enumerate() {
        let cells: Vec<String> = CELL
            .query_all(tree, row)
            .into_iter()
            .map(|c| flatten_cell(&tree.text_content(c)))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            let separator: Vec<&str> = cells.iter().map(|_| "---").collect();
            lines.push(format!("| {} |", separator.join(" | ")));
        }
    }
    lines.join("\n")
}

/// Cell text is flattened onto one line
fn flatten_cell(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim and collapse any run of blank lines to exactly one blank line
fn normalize_newlines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut pending_blank = false;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            pending_blank = true;
            continue;
        }
        if pending_blank && !out.is_empty() {
            out.push("");
        }
        pending_blank = false;
        out.push(line);
    }
    out.join("\n")
}

/// Split normalized text into typed blocks at blank-line boundaries
fn segment_blocks(text: &str) -> Vec<CanonicalBlock> {
    text.split("\n\n")
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| {
            let kind = if chunk.lines().all(|l| l.starts_with('|')) {
                BlockKind::Table
            } else if IMAGE_MARKER.is_match(chunk) {
                BlockKind::ImageDescription
            } else {
                BlockKind::Paragraph
            };
            CanonicalBlock::new(kind, chunk)
        })
        .collect()
}

/// Label for the n-th surviving item: `A`–`Z`, then the 1-based position
fn survivor_label(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        (index + 1).to_string()
    }
}

/// Strip a redundant copy of the item's own label from the start of its text
fn strip_label_echo(text: &str, label: &str) -> String {
    let mut out = text;
    while let Some(caps) = LABEL_PREFIX.captures(out) {
        let echoed = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        if !echoed.eq_ignore_ascii_case(label) {
            break;
        }
        out = &out[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
    }
    out.to_string()
}
