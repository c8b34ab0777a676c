//! The interaction-contract language, in arena form.
//!
//! A [`Package`] holds [`Group`]s. Each group names a [`Target`] in the
//! component model, fixes some of its constants through an
//! [`Instantiation`], declares the [`Actor`]s its interactions use, and owns
//! the message-set arena its interactions and named sets point into.

use crate::component::{ConstId, NodeId};
use crate::expr::{Expr, SlotId, Type};
use crate::message_set::{MessageSetArena, SetId};

/// Index of a group within its package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct GroupId(pub usize);

/// Index of an actor within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct ActorId(pub usize);

/// Index of a fragment within its interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct FragmentId(pub usize);

/// Top-level compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Package {
    pub name: String,
    /// Other packages this one refers to; each becomes an include.
    pub imports: Vec<String>,
    pub groups: Vec<Group>,
    pub assertions: Vec<Assertion>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_group(&mut self, group: Group) -> GroupId {
        self.groups.push(group);
        GroupId(self.groups.len() - 1)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0)
    }
}

/// Whether a target is one component or the inside of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetKind {
    /// The node seen from outside, as a single process.
    Component,
    /// Everything inside a module or controller boundary except the platform.
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Target {
    pub node: NodeId,
    pub kind: TargetKind,
}

impl Target {
    pub fn component(node: NodeId) -> Self {
        Self {
            node,
            kind: TargetKind::Component,
        }
    }

    pub fn collection(node: NodeId) -> Self {
        Self {
            node,
            kind: TargetKind::Collection,
        }
    }
}

/// `const a, b := value`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstAssignment {
    pub constants: Vec<ConstId>,
    pub value: Expr,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Instantiation {
    pub assignments: Vec<ConstAssignment>,
}

impl Instantiation {
    /// The value assigned to `constant`, if any. Lookup is by declaration.
    pub fn value_of(&self, constant: ConstId) -> Option<&Expr> {
        self.assignments
            .iter()
            .find(|a| a.constants.contains(&constant))
            .map(|a| &a.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ActorKind {
    /// The system under test.
    Target,
    /// The implicit environment of the target.
    World,
    /// An explicit component inside a collection target.
    Component(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Actor {
    pub name: String,
    pub kind: ActorKind,
}

impl Actor {
    pub fn new(name: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_world(&self) -> bool {
        matches!(self.kind, ActorKind::World)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub name: String,
    pub target: Target,
    pub instantiation: Instantiation,
    pub actors: Vec<Actor>,
    pub interactions: Vec<Interaction>,
    /// Message sets of this group: named definitions and every set an
    /// interaction of this group refers to.
    pub sets: MessageSetArena,
}

impl Group {
    pub fn new(name: impl Into<String>, target: Target) -> Self {
        Self {
            name: name.into(),
            target,
            instantiation: Instantiation::default(),
            actors: Vec::new(),
            interactions: Vec::new(),
            sets: MessageSetArena::new(),
        }
    }

    pub fn add_actor(&mut self, actor: Actor) -> ActorId {
        self.actors.push(actor);
        ActorId(self.actors.len() - 1)
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id.0)
    }

    pub fn add_interaction(&mut self, interaction: Interaction) -> usize {
        self.interactions.push(interaction);
        self.interactions.len() - 1
    }
}

/// A memory slot of an interaction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Slot {
    pub name: String,
    /// Declared type; when absent it is taken from the slot's first use.
    pub ty: Option<Type>,
    pub initial: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Interaction {
    pub name: String,
    /// Participating actors of the owning group.
    pub actors: Vec<ActorId>,
    pub slots: Vec<Slot>,
    pub fragments: Vec<Fragment>,
    pub body: Vec<FragmentId>,
}

impl Interaction {
    pub fn new(name: impl Into<String>, actors: Vec<ActorId>) -> Self {
        Self {
            name: name.into(),
            actors,
            slots: Vec::new(),
            fragments: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn add_slot(&mut self, name: impl Into<String>, ty: Option<Type>) -> SlotId {
        self.slots.push(Slot {
            name: name.into(),
            ty,
            initial: None,
        });
        SlotId(self.slots.len() - 1)
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(id.0)
    }

    /// Allocate a fragment without attaching it anywhere.
    pub fn add_fragment(&mut self, fragment: Fragment) -> FragmentId {
        self.fragments.push(fragment);
        FragmentId(self.fragments.len() - 1)
    }

    /// Allocate a fragment and append it to the top-level body.
    pub fn push(&mut self, fragment: Fragment) -> FragmentId {
        let id = self.add_fragment(fragment);
        self.body.push(id);
        id
    }

    pub fn fragment(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.get(id.0)
    }

    /// Fragments reachable from the body, parents before children.
    ///
    /// Dangling ids are listed but not descended into; a fragment reachable
    /// twice is listed once.
    pub fn preorder(&self) -> Vec<FragmentId> {
        let mut out = Vec::new();
        let mut stack: Vec<FragmentId> = self.body.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if out.contains(&id) {
                continue;
            }
            out.push(id);
            if let Some(fragment) = self.fragment(id) {
                for list in fragment.children().into_iter().rev() {
                    stack.extend(list.iter().rev().copied());
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Temperature {
    /// The message must occur.
    Hot,
    /// The message may be withdrawn.
    Cold,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Occurrence {
    Message {
        message: Message,
        temperature: Temperature,
    },
    /// Let `units` time units pass on `actor`'s lifeline.
    Wait { actor: ActorId, units: Expr },
    /// `actor`'s lifeline stops.
    Deadlock { actor: ActorId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BranchKind {
    /// Internal choice.
    Alt,
    /// External choice.
    XAlt,
    /// Interleaving.
    Par,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Guard {
    Empty,
    Expr(Expr),
    /// Holds when the sibling guards of the same branch do not.
    Else,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Operand {
    pub guard: Guard,
    pub body: Vec<FragmentId>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopBound {
    Infinite,
    AtLeast(Expr),
    Exactly(Expr),
    Between(Expr, Expr),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DurationBound {
    pub lower: Expr,
    pub upper: Expr,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Fragment {
    Occurrence(Occurrence),
    Branch {
        kind: BranchKind,
        operands: Vec<Operand>,
    },
    Loop {
        bound: LoopBound,
        body: Vec<FragmentId>,
    },
    Deadline {
        units: Expr,
        body: Vec<FragmentId>,
    },
    Duration {
        bound: DurationBound,
        body: Vec<FragmentId>,
    },
    /// Run `body`, letting messages in `intra` happen until it starts.
    Until {
        intra: SetId,
        body: Vec<FragmentId>,
    },
    /// Optionally run `body`.
    Opt {
        guard: Guard,
        body: Vec<FragmentId>,
    },
}

impl Fragment {
    pub fn hot(message: Message) -> Self {
        Fragment::Occurrence(Occurrence::Message {
            message,
            temperature: Temperature::Hot,
        })
    }

    pub fn cold(message: Message) -> Self {
        Fragment::Occurrence(Occurrence::Message {
            message,
            temperature: Temperature::Cold,
        })
    }

    /// Short construct name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Fragment::Occurrence(Occurrence::Message { .. }) => "message occurrence",
            Fragment::Occurrence(Occurrence::Wait { .. }) => "wait occurrence",
            Fragment::Occurrence(Occurrence::Deadlock { .. }) => "deadlock occurrence",
            Fragment::Branch {
                kind: BranchKind::Alt,
                ..
            } => "alt",
            Fragment::Branch {
                kind: BranchKind::XAlt,
                ..
            } => "xalt",
            Fragment::Branch {
                kind: BranchKind::Par,
                ..
            } => "par",
            Fragment::Loop { .. } => "loop",
            Fragment::Deadline { .. } => "deadline",
            Fragment::Duration { .. } => "duration",
            Fragment::Until { .. } => "until",
            Fragment::Opt { .. } => "opt",
        }
    }

    /// Directly nested fragment lists, in order.
    pub fn children(&self) -> Vec<&[FragmentId]> {
        match self {
            Fragment::Occurrence(_) => Vec::new(),
            Fragment::Branch { operands, .. } => {
                operands.iter().map(|o| o.body.as_slice()).collect()
            }
            Fragment::Loop { body, .. }
            | Fragment::Deadline { body, .. }
            | Fragment::Duration { body, .. }
            | Fragment::Until { body, .. }
            | Fragment::Opt { body, .. } => vec![body.as_slice()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// From the target to the world.
    Outbound,
    /// From the world to the target.
    Inbound,
}

/// The (from, to) role pair of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Edge {
    Explicit { from: ActorId, to: ActorId },
    /// Target and world, oriented by the direction.
    Directional { direction: Direction },
    /// Both roles follow from the topic.
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Topic {
    Event { name: String },
    Operation { name: String },
}

impl Topic {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Topic::Event { .. } => "event",
            Topic::Operation { .. } => "operation",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Topic::Event { name } | Topic::Operation { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Argument {
    Expr(Expr),
    /// Matches any value; a named wildcard stores the value in a slot.
    Wildcard { binding: Option<SlotId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    pub edge: Edge,
    pub topic: Topic,
    pub arguments: Vec<Argument>,
}

impl Message {
    pub fn event(edge: Edge, name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            edge,
            topic: Topic::Event { name: name.into() },
            arguments,
        }
    }

    pub fn operation(edge: Edge, name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            edge,
            topic: Topic::Operation { name: name.into() },
            arguments,
        }
    }
}

/// A process an assertion talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ProcessRef {
    /// The closed instance of a group's target.
    Target(GroupId),
    Interaction { group: GroupId, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SemanticModel {
    Traces,
    Failures,
    FailuresDivergences,
    /// Failures refinement with tock prioritised, for timed checks.
    TickTock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Property {
    /// `spec` is refined by `implementation`.
    Refines {
        spec: ProcessRef,
        implementation: ProcessRef,
    },
    DeadlockFree(ProcessRef),
    DivergenceFree(ProcessRef),
    Deterministic(ProcessRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Assertion {
    pub name: String,
    pub property: Property,
    pub model: SemanticModel,
    pub negated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiation_lookup_is_by_declaration() {
        let inst = Instantiation {
            assignments: vec![ConstAssignment {
                constants: vec![ConstId(1), ConstId(3)],
                value: Expr::Int(5),
            }],
        };
        assert_eq!(inst.value_of(ConstId(3)), Some(&Expr::Int(5)));
        assert_eq!(inst.value_of(ConstId(2)), None);
    }

    #[test]
    fn push_attaches_to_body_but_add_fragment_does_not() {
        let mut s = Interaction::new("S", vec![ActorId(0)]);
        let inner = s.add_fragment(Fragment::Occurrence(Occurrence::Deadlock {
            actor: ActorId(0),
        }));
        let outer = s.push(Fragment::Loop {
            bound: LoopBound::Infinite,
            body: vec![inner],
        });
        assert_eq!(s.body, vec![outer]);
        assert_eq!(s.fragments.len(), 2);
        assert_eq!(s.fragment(outer).map(Fragment::kind_name), Some("loop"));
    }

    #[test]
    fn preorder_visits_parents_first() {
        let mut s = Interaction::new("S", vec![ActorId(0)]);
        let deadlock = Fragment::Occurrence(Occurrence::Deadlock { actor: ActorId(0) });
        let a = s.add_fragment(deadlock.clone());
        let b = s.add_fragment(deadlock.clone());
        let branch = s.push(Fragment::Branch {
            kind: BranchKind::Par,
            operands: vec![
                Operand {
                    guard: Guard::Empty,
                    body: vec![a],
                },
                Operand {
                    guard: Guard::Empty,
                    body: vec![b, FragmentId(99)],
                },
            ],
        });
        let last = s.push(deadlock);
        assert_eq!(s.preorder(), vec![branch, a, b, FragmentId(99), last]);
    }

    #[test]
    fn branch_children_follow_operands() {
        let f = Fragment::Branch {
            kind: BranchKind::XAlt,
            operands: vec![
                Operand {
                    guard: Guard::Empty,
                    body: vec![FragmentId(1)],
                },
                Operand {
                    guard: Guard::Else,
                    body: vec![FragmentId(2), FragmentId(3)],
                },
            ],
        };
        let children = f.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], &[FragmentId(2), FragmentId(3)]);
    }

    #[test]
    fn group_registers_actors_in_order() {
        let mut g = Group::new("G", Target::component(NodeId(0)));
        let t = g.add_actor(Actor::new("T", ActorKind::Target));
        let w = g.add_actor(Actor::new("W", ActorKind::World));
        assert_eq!((t, w), (ActorId(0), ActorId(1)));
        assert!(g.actor(w).is_some_and(Actor::is_world));
    }
}
