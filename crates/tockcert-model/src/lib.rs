#![doc = include_str!("../README.md")]

//! Abstract contract-language and component-model types.
//!
//! Every cross-reference is an opaque arena index (`NodeId`, `ConstId`,
//! `VariableId`, `ActorId`, `SlotId`, `FragmentId`, `SetId`), never a name, so
//! two declarations that share a textual name in different scopes stay
//! distinct.

pub mod component;
pub mod contract;
pub mod expr;
pub mod message_set;

pub use component::{
    ComponentGraph, ComponentKind, ComponentModel, ComponentNode, ConstId, ConstantDecl,
    Connection, EventDecl, NodeId, OperationDecl, Parameter, VariableDecl, VariableId,
};
pub use contract::*;
pub use expr::{BinOp, Expr, SlotId, Type, UnOp};
pub use message_set::{MessageSet, MessageSetArena, SetId, SetOp, SetTerm};
