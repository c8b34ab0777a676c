//! Actor and target resolution.
//!
//! Maps the roles of a group (target, world, explicit components) onto
//! component-model nodes, and picks the channel a message travels on.

use indexmap::IndexSet;

use tockcert_model::{
    ActorId, ActorKind, ComponentKind, ComponentModel, Direction, Edge, Group, Message, NodeId,
    TargetKind, Topic,
};

use crate::errors::{CompileError, CompileResult, Site};
use crate::render::EventChannel;

/// Whether an actor plays (part of) the system under test.
pub fn is_target_role(kind: &ActorKind) -> bool {
    matches!(kind, ActorKind::Target | ActorKind::Component(_))
}

pub struct ActorResolver<'a, M: ComponentModel + ?Sized> {
    model: &'a M,
    group: &'a Group,
}

impl<'a, M: ComponentModel + ?Sized> ActorResolver<'a, M> {
    pub fn new(model: &'a M, group: &'a Group) -> Self {
        Self { model, group }
    }

    pub fn group(&self) -> &'a Group {
        self.group
    }

    fn find_actor(
        &self,
        wanted: fn(&ActorKind) -> bool,
        role: &str,
        site: &Site,
    ) -> CompileResult<ActorId> {
        self.group
            .actors
            .iter()
            .position(|a| wanted(&a.kind))
            .map(ActorId)
            .ok_or_else(|| site.missing(format!("{role} actor of group {}", self.group.name)))
    }

    pub fn target_actor(&self, site: &Site) -> CompileResult<ActorId> {
        self.find_actor(|k| matches!(k, ActorKind::Target), "target", site)
    }

    pub fn world_actor(&self, site: &Site) -> CompileResult<ActorId> {
        self.find_actor(|k| matches!(k, ActorKind::World), "world", site)
    }

    pub fn actor_kind(&self, id: ActorId, site: &Site) -> CompileResult<&'a ActorKind> {
        self.group
            .actor(id)
            .map(|a| &a.kind)
            .ok_or_else(|| site.dangling("actor", id.0))
    }

    /// `(from, to)` of a message's edge.
    pub fn resolve_pair(
        &self,
        message: &Message,
        site: &Site,
    ) -> CompileResult<(ActorId, ActorId)> {
        match message.edge {
            Edge::Explicit { from, to } => {
                self.actor_kind(from, site)?;
                self.actor_kind(to, site)?;
                Ok((from, to))
            }
            Edge::Directional { direction } => {
                let target = self.target_actor(site)?;
                let world = self.world_actor(site)?;
                Ok(match direction {
                    Direction::Outbound => (target, world),
                    Direction::Inbound => (world, target),
                })
            }
            Edge::Implicit => match &message.topic {
                Topic::Operation { .. } => {
                    Ok((self.target_actor(site)?, self.world_actor(site)?))
                }
                topic @ Topic::Event { .. } => Err(CompileError::NoTopicRule {
                    node: site.to_string(),
                    topic: topic.kind_name().to_string(),
                }),
            },
        }
    }

    pub fn resolve_from(&self, message: &Message, site: &Site) -> CompileResult<ActorId> {
        self.resolve_pair(message, site).map(|(from, _)| from)
    }

    pub fn resolve_to(&self, message: &Message, site: &Site) -> CompileResult<ActorId> {
        self.resolve_pair(message, site).map(|(_, to)| to)
    }

    /// Component-model nodes an actor stands for.
    pub fn resolve_nodes(&self, actor: ActorId, site: &Site) -> CompileResult<Vec<NodeId>> {
        match self.actor_kind(actor, site)? {
            ActorKind::Target => self.target_nodes(site),
            ActorKind::Component(node) => Ok(vec![*node]),
            ActorKind::World => self.world_nodes(self.group.target.node, site),
        }
    }

    /// The target as a set of processes: the node itself, or every
    /// non-platform child of a collection scope.
    pub fn target_nodes(&self, site: &Site) -> CompileResult<Vec<NodeId>> {
        let target = self.group.target;
        let node = self
            .model
            .node(target.node)
            .ok_or_else(|| site.dangling("component", target.node.0))?;
        match target.kind {
            TargetKind::Component => Ok(vec![target.node]),
            TargetKind::Collection => {
                if !node.kind.is_collection_scope() {
                    return Err(
                        site.unsupported(format!("collection target over a {}", node.kind))
                    );
                }
                let mut out = Vec::new();
                for child in &node.children {
                    let c = self
                        .model
                        .node(*child)
                        .ok_or_else(|| site.dangling("component", child.0))?;
                    if c.kind != ComponentKind::Platform {
                        out.push(*child);
                    }
                }
                Ok(out)
            }
        }
    }

    /// Everything visible from `node` except itself, up the containment chain.
    pub fn world_nodes(&self, node: NodeId, site: &Site) -> CompileResult<Vec<NodeId>> {
        let mut out = IndexSet::new();
        let mut visited = Vec::new();
        self.world_inner(node, site, &mut out, &mut visited)?;
        Ok(out.into_iter().collect())
    }

    fn world_inner(
        &self,
        id: NodeId,
        site: &Site,
        out: &mut IndexSet<NodeId>,
        visited: &mut Vec<NodeId>,
    ) -> CompileResult<()> {
        if visited.contains(&id) {
            return Ok(());
        }
        visited.push(id);
        let node = self
            .model
            .node(id)
            .ok_or_else(|| site.dangling("component", id.0))?;
        if node.kind == ComponentKind::Module {
            for child in &node.children {
                let is_platform = self
                    .model
                    .node(*child)
                    .is_some_and(|c| c.kind == ComponentKind::Platform);
                if is_platform {
                    out.insert(*child);
                }
            }
            return Ok(());
        }
        let Some(parent_id) = node.parent else {
            return Ok(());
        };
        let parent = self
            .model
            .node(parent_id)
            .ok_or_else(|| site.dangling("component", parent_id.0))?;
        for sibling in &parent.children {
            if *sibling != id {
                out.insert(*sibling);
            }
        }
        self.world_inner(parent_id, site, out, visited)
    }

    /// Namespace of the node a target-side actor stands for.
    fn actor_namespace(&self, kind: &ActorKind, site: &Site) -> CompileResult<(NodeId, String)> {
        let node = match kind {
            ActorKind::Target => self.group.target.node,
            ActorKind::Component(node) => *node,
            ActorKind::World => {
                return Err(site.unsupported("world actor as a channel owner"));
            }
        };
        let ns = self
            .model
            .namespace(node)
            .ok_or_else(|| site.dangling("component", node.0))?;
        Ok((node, ns))
    }

    /// The node whose declarations type the message, and the direction the
    /// message takes relative to it.
    pub fn endpoint(
        &self,
        message: &Message,
        site: &Site,
    ) -> CompileResult<(NodeId, String, &'static str)> {
        let (from, to) = self.resolve_pair(message, site)?;
        let from_kind = self.actor_kind(from, site)?;
        let to_kind = self.actor_kind(to, site)?;
        match (from_kind, to_kind) {
            // Fused channel between two components: the sender's output.
            (ActorKind::Component(_), ActorKind::Component(_)) => {
                let (node, ns) = self.actor_namespace(from_kind, site)?;
                Ok((node, ns, "out"))
            }
            (f, t) if is_target_role(f) && !is_target_role(t) => {
                let (node, ns) = self.actor_namespace(f, site)?;
                Ok((node, ns, "out"))
            }
            (f, t) if !is_target_role(f) && is_target_role(t) => {
                let (node, ns) = self.actor_namespace(t, site)?;
                Ok((node, ns, "in"))
            }
            (f, _) => Err(CompileError::AmbiguousTarget {
                node: site.to_string(),
                reason: if is_target_role(f) {
                    "both ends of the edge are target roles".to_string()
                } else {
                    "neither end of the edge is a target role".to_string()
                },
            }),
        }
    }

    pub fn channel(&self, message: &Message, site: &Site) -> CompileResult<EventChannel> {
        let (_, ns, dir) = self.endpoint(message, site)?;
        let base = match &message.topic {
            Topic::Event { name } => format!("{ns}::{name}.{dir}"),
            Topic::Operation { name } => format!("{ns}::{name}Call"),
        };
        Ok(EventChannel { base })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tockcert_model::{Actor, ComponentGraph, Target};

    struct World {
        model: ComponentGraph,
        module: NodeId,
        ctrl: NodeId,
        other: NodeId,
        platform: NodeId,
        sm: NodeId,
    }

    fn world() -> World {
        let mut model = ComponentGraph::new();
        let module = model.add_node("M", ComponentKind::Module, None);
        let platform = model.add_node("P", ComponentKind::Platform, Some(module));
        let ctrl = model.add_node("C", ComponentKind::Controller, Some(module));
        let other = model.add_node("D", ComponentKind::Controller, Some(module));
        let sm = model.add_node("S", ComponentKind::StateMachine, Some(ctrl));
        World {
            model,
            module,
            ctrl,
            other,
            platform,
            sm,
        }
    }

    fn group(target: Target) -> (Group, ActorId, ActorId) {
        let mut g = Group::new("G", target);
        let t = g.add_actor(Actor::new("T", ActorKind::Target));
        let w = g.add_actor(Actor::new("W", ActorKind::World));
        (g, t, w)
    }

    fn site() -> Site {
        Site::group("G")
    }

    #[test]
    fn directional_pairs_follow_direction() {
        let w = world();
        let (g, t, wa) = group(Target::component(w.ctrl));
        let r = ActorResolver::new(&w.model, &g);
        let out = Message::event(
            Edge::Directional {
                direction: Direction::Outbound,
            },
            "e",
            vec![],
        );
        assert_eq!(r.resolve_from(&out, &site()).unwrap(), t);
        assert_eq!(r.resolve_to(&out, &site()).unwrap(), wa);
        let inb = Message::event(
            Edge::Directional {
                direction: Direction::Inbound,
            },
            "e",
            vec![],
        );
        assert_eq!(r.resolve_pair(&inb, &site()).unwrap(), (wa, t));
        assert_eq!(r.channel(&inb, &site()).unwrap().base, "M::C::e.in");
    }

    #[test]
    fn implicit_operations_flow_to_the_world() {
        let w = world();
        let (g, t, wa) = group(Target::component(w.ctrl));
        let r = ActorResolver::new(&w.model, &g);
        let op = Message::operation(Edge::Implicit, "move", vec![]);
        assert_eq!(r.resolve_pair(&op, &site()).unwrap(), (t, wa));
        assert_eq!(r.channel(&op, &site()).unwrap().base, "M::C::moveCall");
    }

    #[test]
    fn implicit_events_have_no_rule() {
        let w = world();
        let (g, ..) = group(Target::component(w.ctrl));
        let r = ActorResolver::new(&w.model, &g);
        let ev = Message::event(Edge::Implicit, "e", vec![]);
        assert!(matches!(
            r.resolve_pair(&ev, &site()),
            Err(CompileError::NoTopicRule { .. })
        ));
    }

    #[test]
    fn two_target_ends_are_ambiguous() {
        let w = world();
        let (mut g, t, wa) = group(Target::collection(w.module));
        let c = g.add_actor(Actor::new("C", ActorKind::Component(w.ctrl)));
        let r = ActorResolver::new(&w.model, &g);
        let both = Message::event(Edge::Explicit { from: t, to: c }, "e", vec![]);
        let err = r.channel(&both, &site()).unwrap_err();
        assert!(matches!(err, CompileError::AmbiguousTarget { .. }));
        let neither = Message::event(Edge::Explicit { from: wa, to: wa }, "e", vec![]);
        let err = r.channel(&neither, &site()).unwrap_err();
        assert!(err.to_string().contains("neither end"));
    }

    #[test]
    fn component_to_component_uses_sender_output() {
        let w = world();
        let (mut g, ..) = group(Target::collection(w.module));
        let c = g.add_actor(Actor::new("C", ActorKind::Component(w.ctrl)));
        let d = g.add_actor(Actor::new("D", ActorKind::Component(w.other)));
        let r = ActorResolver::new(&w.model, &g);
        let m = Message::event(Edge::Explicit { from: d, to: c }, "ping", vec![]);
        assert_eq!(r.channel(&m, &site()).unwrap().base, "M::D::ping.out");
    }

    #[test]
    fn world_of_module_is_its_platform() {
        let w = world();
        let (g, _, wa) = group(Target::collection(w.module));
        let r = ActorResolver::new(&w.model, &g);
        assert_eq!(r.resolve_nodes(wa, &site()).unwrap(), vec![w.platform]);
        let (_, t, _) = group(Target::collection(w.module));
        assert_eq!(
            r.resolve_nodes(t, &site()).unwrap(),
            vec![w.ctrl, w.other]
        );
    }

    #[test]
    fn world_of_nested_node_excludes_self_at_every_level() {
        let w = world();
        let (g, _, wa) = group(Target::component(w.sm));
        let r = ActorResolver::new(&w.model, &g);
        // Siblings of C inside M, plus the platform of M; never S or C.
        assert_eq!(
            r.resolve_nodes(wa, &site()).unwrap(),
            vec![w.platform, w.other]
        );
    }

    #[test]
    fn missing_world_actor_is_reported() {
        let w = world();
        let mut g = Group::new("G", Target::component(w.ctrl));
        g.add_actor(Actor::new("T", ActorKind::Target));
        let r = ActorResolver::new(&w.model, &g);
        let out = Message::event(
            Edge::Directional {
                direction: Direction::Outbound,
            },
            "e",
            vec![],
        );
        assert!(matches!(
            r.resolve_pair(&out, &site()),
            Err(CompileError::MissingData { .. })
        ));
    }
}
