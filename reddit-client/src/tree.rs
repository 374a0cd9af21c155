//! Arena representation of a post's comment forest.
//!
//! Reddit delivers comments as nested listings in which some subtrees are collapsed
//! behind `more` placeholders. The arena keeps every node addressable by index so a
//! placeholder can be swapped for the comments it stands for without rebuilding the
//! nesting.

use crate::api::{MorePlaceholder, RawCommentData};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

pub type NodeId = usize;

/// One entry of a listing, detached from its nesting. `parent_id` carries the links.
#[derive(Debug, Clone, PartialEq)]
pub enum RawThing {
    Comment(RawCommentData),
    More(MorePlaceholder),
    /// A `t1` whose data could not be decoded at all.
    Malformed {
        name: Option<String>,
        parent_id: Option<String>,
    },
}

impl RawThing {
    fn parent_id(&self) -> Option<&str> {
        match self {
            RawThing::Comment(data) => data.parent_id.as_deref(),
            RawThing::More(more) => Some(more.parent_id.as_str()),
            RawThing::Malformed { parent_id, .. } => parent_id.as_deref(),
        }
    }

    fn name(&self) -> Option<String> {
        match self {
            RawThing::Comment(data) => data
                .name
                .clone()
                .or_else(|| data.id.as_ref().map(|id| format!("t1_{}", id))),
            RawThing::More(_) => None,
            RawThing::Malformed { name, .. } => name.clone(),
        }
    }
}

/// Walks a comment listing depth first, emitting every thing before its replies.
pub fn things_from_listing(listing: Value) -> Vec<RawThing> {
    let mut out = Vec::new();
    collect_listing(listing, &mut out);
    out
}

/// Same walk over the flat `things` array returned by `morechildren`.
pub fn things_from_values(values: Vec<Value>) -> Vec<RawThing> {
    let mut out = Vec::new();
    for value in values {
        collect_thing(value, &mut out);
    }
    out
}

fn collect_listing(listing: Value, out: &mut Vec<RawThing>) {
    let children = match listing {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(mut data)) => data.remove("children"),
            _ => None,
        },
        _ => None,
    };

    if let Some(Value::Array(children)) = children {
        for child in children {
            collect_thing(child, out);
        }
    }
}

fn collect_thing(thing: Value, out: &mut Vec<RawThing>) {
    let Value::Object(mut thing) = thing else {
        return;
    };
    let kind = thing
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let Some(Value::Object(mut data)) = thing.remove("data") else {
        return;
    };

    match kind.as_str() {
        "t1" => {
            let replies = data.remove("replies");
            let name = data.get("name").and_then(Value::as_str).map(str::to_string);
            let parent_id = data
                .get("parent_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            match serde_json::from_value::<RawCommentData>(Value::Object(data)) {
                Ok(comment) => out.push(RawThing::Comment(comment)),
                Err(e) => {
                    debug!("Undecodable comment {:?}: {}", name, e);
                    out.push(RawThing::Malformed { name, parent_id });
                }
            }

            // `replies` is "" when there are none
            if let Some(replies @ Value::Object(_)) = replies {
                collect_listing(replies, out);
            }
        }
        "more" => match serde_json::from_value::<MorePlaceholder>(Value::Object(data)) {
            Ok(more) => out.push(RawThing::More(more)),
            Err(e) => debug!("Dropping undecodable placeholder: {}", e),
        },
        other => debug!("Ignoring listing entry of kind '{}'", other),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Comment(RawCommentData),
    More(MorePlaceholder),
    Malformed,
}

#[derive(Debug, Clone)]
struct Slot {
    node: TreeNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    detached: bool,
}

/// The comment forest of one post.
#[derive(Debug, Clone)]
pub struct CommentTree {
    link_fullname: String,
    slots: Vec<Slot>,
    roots: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
}

impl CommentTree {
    pub fn new(post_id: &str) -> Self {
        Self {
            link_fullname: format!("t3_{}", post_id.trim_start_matches("t3_")),
            slots: Vec::new(),
            roots: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn from_listing(post_id: &str, listing: Value) -> Self {
        let mut tree = Self::new(post_id);
        for thing in things_from_listing(listing) {
            tree.append(thing);
        }
        tree
    }

    /// `t3_` fullname of the post the tree belongs to.
    pub fn link_fullname(&self) -> &str {
        &self.link_fullname
    }

    pub fn post_id(&self) -> &str {
        self.link_fullname.trim_start_matches("t3_")
    }

    /// Attaches a thing under its parent. Things whose parent is unknown are dropped.
    pub fn append(&mut self, thing: RawThing) -> Option<NodeId> {
        let parent = self.resolve_parent(&thing)?;
        let id = self.insert_slot(thing, parent);
        match parent {
            Some(parent) => self.slots[parent].children.push(id),
            None => self.roots.push(id),
        }
        Some(id)
    }

    /// Swaps a placeholder for the things it expanded into.
    ///
    /// Things parented like the placeholder take its position among its siblings, in
    /// the order given; deeper things attach to whichever node they name as parent.
    pub fn replace_placeholder(&mut self, placeholder: NodeId, things: Vec<RawThing>) {
        let Some(slot) = self.slots.get(placeholder) else {
            return;
        };
        let parent = slot.parent;
        let mut position = self.sibling_position(placeholder);
        self.detach(placeholder);

        for thing in things {
            // A focused re-fetch repeats the comment it is rooted at
            if let Some(name) = thing.name() {
                if self.by_name.contains_key(&name) {
                    continue;
                }
            }
            let Some(target) = self.resolve_parent(&thing) else {
                continue;
            };
            let id = self.insert_slot(thing, target);
            if target == parent {
                let siblings = match parent {
                    Some(p) => &mut self.slots[p].children,
                    None => &mut self.roots,
                };
                let at = position.unwrap_or(siblings.len()).min(siblings.len());
                siblings.insert(at, id);
                position = Some(at + 1);
            } else {
                match target {
                    Some(p) => self.slots[p].children.push(id),
                    None => self.roots.push(id),
                }
            }
        }
    }

    /// Removes a placeholder without expanding it.
    pub fn discard(&mut self, id: NodeId) {
        self.detach(id);
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.slots.get(id).filter(|s| !s.detached).map(|s| &s.node)
    }

    pub fn placeholder(&self, id: NodeId) -> Option<&MorePlaceholder> {
        match self.node(id) {
            Some(TreeNode::More(more)) => Some(more),
            _ => None,
        }
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.slots.get(id).map(|s| s.depth).unwrap_or_default()
    }

    /// Number of direct replies that are real comments.
    pub fn reply_count(&self, id: NodeId) -> usize {
        self.slots
            .get(id)
            .map(|s| {
                s.children
                    .iter()
                    .filter(|child| matches!(self.slots[**child].node, TreeNode::Comment(_)))
                    .count()
            })
            .unwrap_or_default()
    }

    /// Every attached node, parents before children, siblings in listing order.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.slots[id].children.iter().rev().copied());
        }
        order
    }

    /// Placeholders still in the tree, in depth-first order.
    pub fn pending_placeholders(&self) -> Vec<NodeId> {
        self.depth_first()
            .into_iter()
            .filter(|id| matches!(self.slots[*id].node, TreeNode::More(_)))
            .collect()
    }

    pub fn comment_count(&self) -> usize {
        self.depth_first()
            .into_iter()
            .filter(|id| matches!(self.slots[*id].node, TreeNode::Comment(_)))
            .count()
    }

    fn resolve_parent(&self, thing: &RawThing) -> Option<Option<NodeId>> {
        match thing.parent_id() {
            None => Some(None),
            Some(parent) if parent.starts_with("t3_") => Some(None),
            Some(parent) => match self.by_name.get(parent) {
                Some(id) => Some(Some(*id)),
                None => {
                    debug!("Dropping orphan under unknown parent {}", parent);
                    None
                }
            },
        }
    }

    fn insert_slot(&mut self, thing: RawThing, parent: Option<NodeId>) -> NodeId {
        let id = self.slots.len();
        if let Some(name) = thing.name() {
            self.by_name.insert(name, id);
        }
        let depth = parent.map(|p| self.slots[p].depth + 1).unwrap_or(0);
        let node = match thing {
            RawThing::Comment(data) => TreeNode::Comment(data),
            RawThing::More(more) => TreeNode::More(more),
            RawThing::Malformed { .. } => TreeNode::Malformed,
        };
        self.slots.push(Slot {
            node,
            parent,
            children: Vec::new(),
            depth,
            detached: false,
        });
        id
    }

    fn sibling_position(&self, id: NodeId) -> Option<usize> {
        let siblings = match self.slots[id].parent {
            Some(p) => &self.slots[p].children,
            None => &self.roots,
        };
        siblings.iter().position(|sibling| *sibling == id)
    }

    fn detach(&mut self, id: NodeId) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        slot.detached = true;
        let parent = slot.parent;
        let siblings = match parent {
            Some(p) => &mut self.slots[p].children,
            None => &mut self.roots,
        };
        siblings.retain(|sibling| *sibling != id);
    }
}
