//! Arena storage for symbolic message sets.
//!
//! Set expressions are trees of [`MessageSet`] nodes addressed by [`SetId`].
//! Rewriting a node in place goes through [`MessageSetArena::replace`], so
//! every holder of the index observes the new form.

use indexmap::IndexMap;

use crate::contract::Message;

/// Index of a node in a [`MessageSetArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct SetId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SetOp {
    Union,
    Intersection,
    Difference,
}

impl std::fmt::Display for SetOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SetOp::Union => "union",
            SetOp::Intersection => "inter",
            SetOp::Difference => "diff",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageSet {
    /// Every event of the target.
    Universe,
    /// The events of the listed messages; empty list is the empty set.
    Extensional(Vec<Message>),
    /// Indirection through a named definition of the same arena.
    NamedRef(String),
    Binary { lhs: SetId, op: SetOp, rhs: SetId },
}

impl MessageSet {
    pub fn empty() -> Self {
        MessageSet::Extensional(Vec::new())
    }

    pub fn is_extensional(&self) -> bool {
        matches!(self, MessageSet::Extensional(_))
    }
}

/// Owned tree view of a set expression, for comparison and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetTerm {
    Universe,
    Extensional(Vec<Message>),
    NamedRef(String),
    Binary(Box<SetTerm>, SetOp, Box<SetTerm>),
    /// An index that is out of range or revisits one of its ancestors.
    Broken(SetId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageSetArena {
    nodes: Vec<MessageSet>,
    definitions: IndexMap<String, SetId>,
}

impl MessageSetArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, node: MessageSet) -> SetId {
        let id = SetId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: SetId) -> Option<&MessageSet> {
        self.nodes.get(id.0)
    }

    /// Overwrite the node at `id`, returning the previous node.
    pub fn replace(&mut self, id: SetId, node: MessageSet) -> Option<MessageSet> {
        let slot = self.nodes.get_mut(id.0)?;
        Some(std::mem::replace(slot, node))
    }

    pub fn universe(&mut self) -> SetId {
        self.push(MessageSet::Universe)
    }

    pub fn empty(&mut self) -> SetId {
        self.push(MessageSet::empty())
    }

    pub fn extensional(&mut self, messages: Vec<Message>) -> SetId {
        self.push(MessageSet::Extensional(messages))
    }

    pub fn named(&mut self, name: impl Into<String>) -> SetId {
        self.push(MessageSet::NamedRef(name.into()))
    }

    pub fn binary(&mut self, lhs: SetId, op: SetOp, rhs: SetId) -> SetId {
        self.push(MessageSet::Binary { lhs, op, rhs })
    }

    pub fn union(&mut self, lhs: SetId, rhs: SetId) -> SetId {
        self.binary(lhs, SetOp::Union, rhs)
    }

    pub fn intersection(&mut self, lhs: SetId, rhs: SetId) -> SetId {
        self.binary(lhs, SetOp::Intersection, rhs)
    }

    pub fn difference(&mut self, lhs: SetId, rhs: SetId) -> SetId {
        self.binary(lhs, SetOp::Difference, rhs)
    }

    /// Bind `name` to the set rooted at `id`, replacing any earlier binding.
    pub fn define(&mut self, name: impl Into<String>, id: SetId) {
        self.definitions.insert(name.into(), id);
    }

    pub fn lookup(&self, name: &str) -> Option<SetId> {
        self.definitions.get(name).copied()
    }

    /// Named definitions in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = (&str, SetId)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Snapshot the tree rooted at `id`.
    pub fn term(&self, id: SetId) -> SetTerm {
        let mut ancestors = Vec::new();
        self.term_inner(id, &mut ancestors)
    }

    fn term_inner(&self, id: SetId, ancestors: &mut Vec<SetId>) -> SetTerm {
        if ancestors.contains(&id) {
            return SetTerm::Broken(id);
        }
        let Some(node) = self.get(id) else {
            return SetTerm::Broken(id);
        };
        match node {
            MessageSet::Universe => SetTerm::Universe,
            MessageSet::Extensional(ms) => SetTerm::Extensional(ms.clone()),
            MessageSet::NamedRef(name) => SetTerm::NamedRef(name.clone()),
            MessageSet::Binary { lhs, op, rhs } => {
                ancestors.push(id);
                let l = self.term_inner(*lhs, ancestors);
                let r = self.term_inner(*rhs, ancestors);
                ancestors.pop();
                SetTerm::Binary(Box::new(l), *op, Box::new(r))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_is_visible_through_existing_ids() {
        let mut arena = MessageSetArena::new();
        let u = arena.universe();
        let e = arena.empty();
        let root = arena.union(u, e);
        let old = arena.replace(root, MessageSet::Universe);
        assert!(matches!(old, Some(MessageSet::Binary { .. })));
        assert_eq!(arena.term(root), SetTerm::Universe);
    }

    #[test]
    fn replace_out_of_range_is_none() {
        let mut arena = MessageSetArena::new();
        assert!(arena.replace(SetId(3), MessageSet::Universe).is_none());
    }

    #[test]
    fn definitions_keep_declaration_order() {
        let mut arena = MessageSetArena::new();
        let a = arena.universe();
        let b = arena.empty();
        arena.define("Zeta", a);
        arena.define("Alpha", b);
        let names: Vec<_> = arena.definitions().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
        assert_eq!(arena.lookup("Alpha"), Some(b));
        assert_eq!(arena.lookup("Beta"), None);
    }

    #[test]
    fn self_referencing_index_is_broken_not_infinite() {
        let mut arena = MessageSetArena::new();
        let root = arena.push(MessageSet::Binary {
            lhs: SetId(0),
            op: SetOp::Union,
            rhs: SetId(7),
        });
        assert_eq!(
            arena.term(root),
            SetTerm::Binary(
                Box::new(SetTerm::Broken(SetId(0))),
                SetOp::Union,
                Box::new(SetTerm::Broken(SetId(7)))
            )
        );
    }
}
