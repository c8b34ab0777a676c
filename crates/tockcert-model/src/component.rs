//! The component model contracts are checked against.
//!
//! The compiler only ever talks to the model through [`ComponentModel`]; the
//! semantics of each node is an opaque process with a known event universe.
//! [`ComponentGraph`] is the in-memory implementation used by front-ends and
//! tests.

use crate::expr::{Expr, Type};

/// Index of a node in the component model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct NodeId(pub usize);

/// Index of a constant declaration. Identity is by declaration, never name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct ConstId(pub usize);

/// Index of a state-variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct VariableId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentKind {
    Module,
    Platform,
    Controller,
    StateMachine,
    Operation,
}

impl ComponentKind {
    /// Kinds whose inside can be targeted as a collection.
    pub fn is_collection_scope(self) -> bool {
        matches!(self, ComponentKind::Module | ComponentKind::Controller)
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComponentKind::Module => "module",
            ComponentKind::Platform => "platform",
            ComponentKind::Controller => "controller",
            ComponentKind::StateMachine => "state machine",
            ComponentKind::Operation => "operation",
        };
        write!(f, "{s}")
    }
}

/// An event a node can communicate on. Events carry at most one value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventDecl {
    pub name: String,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct OperationDecl {
    pub name: String,
    pub params: Vec<Parameter>,
}

/// A connection between two event endpoints inside a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Connection {
    pub from: NodeId,
    pub from_event: String,
    pub to: NodeId,
    pub to_event: String,
    pub is_async: bool,
    pub bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstantDecl {
    pub name: String,
    pub ty: Type,
    pub owner: NodeId,
    /// Value fixed by the component model itself.
    pub initial: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
    pub owner: NodeId,
    pub initial: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentNode {
    pub name: String,
    pub kind: ComponentKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub constants: Vec<ConstId>,
    /// Variables declared (and owned) by this node.
    pub variables: Vec<VariableId>,
    /// Variables this node expects its enclosing scope to provide.
    pub required_variables: Vec<VariableId>,
    pub events: Vec<EventDecl>,
    pub operations: Vec<OperationDecl>,
    pub connections: Vec<Connection>,
    /// File holding this node's process-algebra semantics, if separate.
    pub include: Option<String>,
}

impl ComponentNode {
    pub fn new(name: impl Into<String>, kind: ComponentKind, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            kind,
            parent,
            children: Vec::new(),
            constants: Vec::new(),
            variables: Vec::new(),
            required_variables: Vec::new(),
            events: Vec::new(),
            operations: Vec::new(),
            connections: Vec::new(),
            include: None,
        }
    }

    pub fn find_event(&self, name: &str) -> Option<&EventDecl> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn find_operation(&self, name: &str) -> Option<&OperationDecl> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// Read access to a component model.
///
/// Lookups return `None` for indices the model does not know; the default
/// naming methods derive canonical process-algebra names from the containment
/// path.
pub trait ComponentModel {
    fn node(&self, id: NodeId) -> Option<&ComponentNode>;
    fn constant(&self, id: ConstId) -> Option<&ConstantDecl>;
    fn variable(&self, id: VariableId) -> Option<&VariableDecl>;

    /// Containment chain from the root down to `id` (inclusive).
    fn path(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if chain.contains(&node_id) {
                break;
            }
            let node = self.node(node_id)?;
            chain.push(node_id);
            current = node.parent;
        }
        chain.reverse();
        Some(chain)
    }

    /// `::`-joined containment path, e.g. `Mod::Ctrl::SM`.
    fn namespace(&self, id: NodeId) -> Option<String> {
        let names = self
            .path(id)?
            .into_iter()
            .map(|n| self.node(n).map(|node| node.name.clone()))
            .collect::<Option<Vec<_>>>()?;
        Some(names.join("::"))
    }

    fn process_name(&self, id: NodeId) -> Option<String> {
        self.namespace(id).map(|ns| format!("{ns}::D__"))
    }

    fn universe_name(&self, id: NodeId) -> Option<String> {
        self.namespace(id).map(|ns| format!("{ns}::sem__events"))
    }

    fn include_path(&self, id: NodeId) -> Option<String> {
        self.node(id).and_then(|n| n.include.clone())
    }

    /// Canonical name of a constant: `const_<path>_<name>`.
    fn constant_name(&self, id: ConstId) -> Option<String> {
        let decl = self.constant(id)?;
        let ns = self.namespace(decl.owner)?;
        Some(format!("const_{}_{}", ns.replace("::", "_"), decl.name))
    }

    /// Memory channels `(get, set)` of a state variable.
    fn variable_channels(&self, id: VariableId) -> Option<(String, String)> {
        let decl = self.variable(id)?;
        let ns = self.namespace(decl.owner)?;
        Some((
            format!("{ns}::get_{}", decl.name),
            format!("{ns}::set_{}", decl.name),
        ))
    }

    /// Every constant declared at or below `id`, parents first, without
    /// duplicates.
    fn constants_in_scope(&self, id: NodeId) -> Vec<ConstId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        let mut seen = Vec::new();
        while let Some(node_id) = stack.pop() {
            if seen.contains(&node_id) {
                continue;
            }
            seen.push(node_id);
            let Some(node) = self.node(node_id) else {
                continue;
            };
            for c in &node.constants {
                if !out.contains(c) {
                    out.push(*c);
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }
}

/// In-memory component model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentGraph {
    pub nodes: Vec<ComponentNode>,
    pub constants: Vec<ConstantDecl>,
    pub variables: Vec<VariableDecl>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, registering it as a child of `parent`.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: ComponentKind,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ComponentNode::new(name, kind, parent));
        if let Some(p) = parent {
            if let Some(parent_node) = self.nodes.get_mut(p.0) {
                parent_node.children.push(id);
            }
        }
        id
    }

    pub fn add_constant(
        &mut self,
        owner: NodeId,
        name: impl Into<String>,
        ty: Type,
        initial: Option<Expr>,
    ) -> ConstId {
        let id = ConstId(self.constants.len());
        self.constants.push(ConstantDecl {
            name: name.into(),
            ty,
            owner,
            initial,
        });
        if let Some(node) = self.nodes.get_mut(owner.0) {
            node.constants.push(id);
        }
        id
    }

    pub fn add_variable(
        &mut self,
        owner: NodeId,
        name: impl Into<String>,
        ty: Type,
        initial: Option<Expr>,
    ) -> VariableId {
        let id = VariableId(self.variables.len());
        self.variables.push(VariableDecl {
            name: name.into(),
            ty,
            owner,
            initial,
        });
        if let Some(node) = self.nodes.get_mut(owner.0) {
            node.variables.push(id);
        }
        id
    }

    /// Record that `node` needs `var` from its enclosing scope.
    pub fn require_variable(&mut self, node: NodeId, var: VariableId) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            if !n.required_variables.contains(&var) {
                n.required_variables.push(var);
            }
        }
    }

    pub fn add_event(&mut self, node: NodeId, name: impl Into<String>, ty: Option<Type>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.events.push(EventDecl {
                name: name.into(),
                ty,
            });
        }
    }

    pub fn add_operation(&mut self, node: NodeId, name: impl Into<String>, params: Vec<Parameter>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.operations.push(OperationDecl {
                name: name.into(),
                params,
            });
        }
    }

    /// Record a connection on the scope node that owns it.
    pub fn connect(&mut self, scope: NodeId, connection: Connection) {
        if let Some(n) = self.nodes.get_mut(scope.0) {
            n.connections.push(connection);
        }
    }

    pub fn set_include(&mut self, node: NodeId, path: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.include = Some(path.into());
        }
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }
}

impl ComponentModel for ComponentGraph {
    fn node(&self, id: NodeId) -> Option<&ComponentNode> {
        self.nodes.get(id.0)
    }

    fn constant(&self, id: ConstId) -> Option<&ConstantDecl> {
        self.constants.get(id.0)
    }

    fn variable(&self, id: VariableId) -> Option<&VariableDecl> {
        self.variables.get(id.0)
    }
}
