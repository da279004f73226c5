//! In-memory document tree collaborator.
//!
//! This module provides the mutable tree the extraction pipeline observes:
//! selector-based lookup runs over it, the scheduler subscribes to its
//! mutation events, and the canonicalizer clones subtrees out of it so the
//! live tree is never mutated during a pass.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::trace;

/// Arena index of a node within its tree
pub type NodeId = usize;

/// Identifier of a mutation subscription
pub type SubscriptionId = u64;

/// Tag used for text nodes
pub const TEXT_TAG: &str = "#text";

/// Kind of a tree mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// One or more child nodes were appended or inserted
    ChildAdded,
    /// A text node's content changed
    TextChanged,
    /// A node was detached from its parent
    NodeRemoved,
    /// Same-document navigation; delivered to every subscriber
    Navigated,
}

/// A mutation notification delivered to subscribers
#[derive(Debug, Clone)]
pub struct MutationEvent {
    /// Node the mutation was observed at (the parent for child changes)
    pub target: NodeId,
    /// Nodes added by this mutation
    pub added: Vec<NodeId>,
    pub kind: MutationKind,
}

/// A single element or text node
#[derive(Debug, Clone)]
pub struct Node {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: HashMap<String, String>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    detached: bool,
}

impl Node {
    /// Create an element node
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            id: None,
            classes: Vec::new(),
            attrs: HashMap::new(),
            text: None,
            parent: None,
            children: Vec::new(),
            detached: false,
        }
    }

    /// Create a text node
    pub fn text(content: impl Into<String>) -> Self {
        let mut node = Self::element(TEXT_TAG);
        node.text = Some(content.into());
        node
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    /// Shallow copy without parent/children links
    fn clone_shallow(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            id: self.id.clone(),
            classes: self.classes.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            parent: None,
            children: Vec::new(),
            detached: false,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    root: NodeId,
    tx: mpsc::UnboundedSender<MutationEvent>,
}

/// Serde-loadable description of a subtree.
///
/// `text` is shorthand for a leading text child; further children follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attrs: HashMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

/// The mutable document tree
pub struct DocumentTree {
    nodes: Vec<Node>,
    root: NodeId,
    subscriptions: Vec<Subscription>,
    next_subscription: SubscriptionId,
}

impl DocumentTree {
    /// Create a tree holding a single root element
    pub fn new(root_tag: impl Into<String>) -> Self {
        Self::with_root(Node::element(root_tag))
    }

    fn with_root(root: Node) -> Self {
        Self {
            nodes: vec![root],
            root: 0,
            subscriptions: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Build a tree from a serde-loaded spec
    pub fn from_spec(spec: &NodeSpec) -> Self {
        let mut root = Node::element(&spec.tag);
        root.id = spec.id.clone();
        root.classes = spec.classes.clone();
        root.attrs = spec.attrs.clone();
        let mut tree = Self::with_root(root);
        if let Some(text) = &spec.text {
            tree.append_text(tree.root, text);
        }
        for child in &spec.children {
            tree.append_spec(tree.root, child);
        }
        tree
    }

    /// Append a spec-described subtree under `parent`
    pub fn append_spec(&mut self, parent: NodeId, spec: &NodeSpec) -> NodeId {
        let id = self.append_element(parent, &spec.tag);
        if let Some(node_id) = &spec.id {
            self.set_id(id, node_id);
        }
        for class in &spec.classes {
            self.add_class(id, class);
        }
        for (key, value) in &spec.attrs {
            self.set_attr(id, key, value);
        }
        if let Some(text) = &spec.text {
            self.append_text(id, text);
        }
        for child in &spec.children {
            self.append_spec(id, child);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    // --- accessors ---

    pub fn tag(&self, id: NodeId) -> &str {
        &self.node(id).tag
    }

    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.node(id).id.as_deref()
    }

    pub fn classes(&self, id: NodeId) -> &[String] {
        &self.node(id).classes
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.node(id).classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).attrs.get(name).map(String::as_str)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).text.as_deref()
    }

    pub fn is_text_node(&self, id: NodeId) -> bool {
        self.node(id).is_text()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Whether the node is still reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if self.nodes[cur].detached {
                return false;
            }
            match self.nodes[cur].parent {
                Some(p) => cur = p,
                None => return cur == self.root,
            }
        }
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.nodes[n].parent;
        }
        false
    }

    /// All descendants of `from` in document (preorder) order, excluding `from`
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(from, &mut out);
        out
    }

    fn collect_descendants(&self, from: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[from].children {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Concatenated text of all text nodes under `id`, in document order
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(text) = &self.nodes[id].text {
            out.push_str(text);
        }
        for &child in &self.nodes[id].children {
            self.collect_text(child, out);
        }
    }

    // --- mutation ---

    fn insert_node(&mut self, mut node: Node, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn append_element(&mut self, parent: NodeId, tag: impl Into<String>) -> NodeId {
        let id = self.insert_node(Node::element(tag), parent);
        self.emit(MutationEvent {
            target: parent,
            added: vec![id],
            kind: MutationKind::ChildAdded,
        });
        id
    }

    pub fn append_text(&mut self, parent: NodeId, content: impl Into<String>) -> NodeId {
        let id = self.insert_node(Node::text(content), parent);
        self.emit(MutationEvent {
            target: parent,
            added: vec![id],
            kind: MutationKind::TextChanged,
        });
        id
    }

    pub fn set_id(&mut self, id: NodeId, value: impl Into<String>) {
        self.nodes[id].id = Some(value.into());
    }

    pub fn add_class(&mut self, id: NodeId, class: impl Into<String>) {
        self.nodes[id].classes.push(class.into());
    }

    pub fn set_attr(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.nodes[id].attrs.insert(name.into(), value.into());
    }

    /// Replace a text node's content
    pub fn set_text(&mut self, id: NodeId, content: impl Into<String>) {
        self.nodes[id].text = Some(content.into());
        let target = self.nodes[id].parent.unwrap_or(id);
        self.emit(MutationEvent {
            target,
            added: Vec::new(),
            kind: MutationKind::TextChanged,
        });
    }

    /// Detach a node (and implicitly its subtree) from the tree
    pub fn remove(&mut self, id: NodeId) {
        let parent = self.nodes[id].parent;
        if let Some(p) = parent {
            self.nodes[p].children.retain(|&c| c != id);
        }
        self.nodes[id].parent = None;
        self.nodes[id].detached = true;
        self.emit(MutationEvent {
            target: parent.unwrap_or(id),
            added: Vec::new(),
            kind: MutationKind::NodeRemoved,
        });
    }

    /// Replace a node with a text node at the same position
    pub fn replace_with_text(&mut self, id: NodeId, content: impl Into<String>) -> NodeId {
        let parent = match self.nodes[id].parent {
            Some(p) => p,
            None => return id, // cannot replace the root
        };
        let new_id = self.nodes.len();
        let mut node = Node::text(content);
        node.parent = Some(parent);
        self.nodes.push(node);
        if let Some(pos) = self.nodes[parent].children.iter().position(|&c| c == id) {
            self.nodes[parent].children[pos] = new_id;
        }
        self.nodes[id].parent = None;
        self.nodes[id].detached = true;
        self.emit(MutationEvent {
            target: parent,
            added: vec![new_id],
            kind: MutationKind::ChildAdded,
        });
        new_id
    }

    /// Signal a same-document navigation to every subscriber
    pub fn navigate(&mut self) {
        trace!("same-document navigation signalled");
        self.emit(MutationEvent {
            target: self.root,
            added: Vec::new(),
            kind: MutationKind::Navigated,
        });
    }

    /// Clone the subtree rooted at `id` into a fresh, unsubscribed tree
    pub fn clone_subtree(&self, id: NodeId) -> DocumentTree {
        let mut tree = DocumentTree::with_root(self.nodes[id].clone_shallow());
        self.copy_children(id, &mut tree, 0);
        tree
    }

    fn copy_children(&self, from: NodeId, into: &mut DocumentTree, target: NodeId) {
        for &child in &self.nodes[from].children {
            let copy = into.insert_node(self.nodes[child].clone_shallow(), target);
            self.copy_children(child, into, copy);
        }
    }

    // --- subscriptions ---

    /// Subscribe to mutations within the subtree rooted at `root`.
    /// Navigation events are delivered regardless of scope.
    pub fn subscribe(
        &mut self,
        root: NodeId,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<MutationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscriptions.push(Subscription { id, root, tx });
        trace!(subscription = id, root, "subscribed to mutations");
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.retain(|s| s.id != id);
    }

    fn emit(&mut self, event: MutationEvent) {
        self.subscriptions.retain(|s| !s.tx.is_closed());
        for sub in &self.subscriptions {
            if event.kind == MutationKind::Navigated
                || self.subscription_in_scope(sub.root, event.target)
            {
                let _ = sub.tx.send(event.clone());
            }
        }
    }

    fn subscription_in_scope(&self, root: NodeId, target: NodeId) -> bool {
        self.is_ancestor_or_self(root, target)
    }
}
