//! Value expressions and types shared by contracts and the component model.

use std::fmt;

use crate::component::ConstId;

/// Index of a memory slot (interaction variable) within its interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct SlotId(pub usize);

/// Value types carried by events, operation parameters, constants and slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Int,
    Nat,
    Bool,
    /// A datatype defined by the component model's own semantics.
    Named(String),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Nat => write!(f, "nat"),
            Type::Bool => write!(f, "bool"),
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Whether the operator yields a boolean.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
                | BinOp::And
                | BinOp::Or
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum UnOp {
    Neg,
    Not,
}

/// A contract-language value expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Int(i64),
    Bool(bool),
    /// Reference to a component-model constant, by declaration.
    Constant(ConstId),
    /// Reference to a memory slot of the enclosing interaction.
    Slot(SlotId),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Whether this is the literal `0`.
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Int(0))
    }

    /// Slots read by this expression, in first-occurrence order.
    pub fn slots(&self) -> Vec<SlotId> {
        let mut out = Vec::new();
        self.collect_slots(&mut out);
        out
    }

    fn collect_slots(&self, out: &mut Vec<SlotId>) {
        match self {
            Expr::Slot(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_slots(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_slots(out);
                rhs.collect_slots(out);
            }
            Expr::Int(_) | Expr::Bool(_) | Expr::Constant(_) => {}
        }
    }

    /// Constants referenced by this expression, in first-occurrence order.
    pub fn constants(&self) -> Vec<ConstId> {
        let mut out = Vec::new();
        self.collect_constants(&mut out);
        out
    }

    fn collect_constants(&self, out: &mut Vec<ConstId>) {
        match self {
            Expr::Constant(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_constants(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_constants(out);
                rhs.collect_constants(out);
            }
            Expr::Int(_) | Expr::Bool(_) | Expr::Slot(_) => {}
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}
