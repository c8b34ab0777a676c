//! Open and closed forms of a group's target.
//!
//! The open module is parametrised over every constant in the target's scope
//! that is not fixed, either by the group's instantiation or by an initial
//! value in the component model. The closed instance applies the open module
//! to references into the external definitions unit.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use tockcert_model::{ComponentKind, ComponentModel, ConstId, Group, NodeId, TargetKind};

use crate::actors::ActorResolver;
use crate::errors::{CompileError, CompileResult, Site};
use crate::render::{self, ExprScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    /// Bound to a value; `text` carries a comment naming the source.
    Fixed { name: String, text: String },
    /// Left open; a parameter of the open module.
    Unfixed { name: String },
}

/// Constant resolution of one group.
#[derive(Debug, Clone)]
pub struct Instantiated {
    external: String,
    constants: IndexMap<ConstId, ConstantValue>,
}

/// Values inside instantiations refer to other constants externally.
struct ExternalScope<'a, M: ?Sized> {
    model: &'a M,
    external: &'a str,
}

impl<M: ComponentModel + ?Sized> ExprScope for ExternalScope<'_, M> {
    fn constant(&self, id: ConstId, site: &Site) -> CompileResult<String> {
        let name = self
            .model
            .constant_name(id)
            .ok_or_else(|| site.dangling("constant", id.0))?;
        Ok(format!("{}::{name}", self.external))
    }
}

impl Instantiated {
    pub fn resolve<M: ComponentModel + ?Sized>(
        model: &M,
        group: &Group,
        external: &str,
        site: &Site,
    ) -> CompileResult<Self> {
        let values = ExternalScope { model, external };
        let mut assigned: IndexMap<ConstId, &tockcert_model::Expr> = IndexMap::new();
        for assignment in &group.instantiation.assignments {
            for constant in &assignment.constants {
                let name = model
                    .constant_name(*constant)
                    .ok_or_else(|| site.dangling("constant", constant.0))?;
                if assigned.insert(*constant, &assignment.value).is_some() {
                    return Err(CompileError::DuplicateInstantiation {
                        group: group.name.clone(),
                        constant: name,
                    });
                }
            }
        }

        let mut constants = IndexMap::new();
        for id in model.constants_in_scope(group.target.node) {
            let decl = model
                .constant(id)
                .ok_or_else(|| site.dangling("constant", id.0))?;
            let name = model
                .constant_name(id)
                .ok_or_else(|| site.dangling("constant", id.0))?;
            let value = match (assigned.get(&id), &decl.initial) {
                (Some(_), Some(_)) => {
                    return Err(CompileError::ConflictingInstantiation {
                        group: group.name.clone(),
                        constant: name,
                    });
                }
                (Some(value), None) => {
                    let v = render::render_expr(value, &values, site)?;
                    ConstantValue::Fixed {
                        text: format!("{{- {name} -}} {v}"),
                        name,
                    }
                }
                (None, Some(initial)) => {
                    let v = render::render_expr(initial, &values, site)?;
                    ConstantValue::Fixed {
                        text: format!("{{- initial value of {name} -}} {v}"),
                        name,
                    }
                }
                (None, None) => {
                    warn!(
                        group = %group.name,
                        constant = %name,
                        "Constant is not instantiated; using {external}::{name}"
                    );
                    ConstantValue::Unfixed { name }
                }
            };
            constants.insert(id, value);
        }

        // Assignments to constants outside the target scope still fix them
        // for the interactions of the group.
        for (id, value) in assigned {
            if constants.contains_key(&id) {
                continue;
            }
            let name = model
                .constant_name(id)
                .ok_or_else(|| site.dangling("constant", id.0))?;
            debug!(
                group = %group.name,
                constant = %name,
                "Instantiating out-of-scope constant"
            );
            let v = render::render_expr(value, &values, site)?;
            constants.insert(
                id,
                ConstantValue::Fixed {
                    text: format!("{{- {name} -}} {v}"),
                    name,
                },
            );
        }

        Ok(Self {
            external: external.to_string(),
            constants,
        })
    }

    pub fn get(&self, id: ConstId) -> Option<&ConstantValue> {
        self.constants.get(&id)
    }

    /// Formal parameters of the open module, in scope order.
    pub fn parameters(&self) -> Vec<&str> {
        self.constants
            .values()
            .filter_map(|c| match c {
                ConstantValue::Unfixed { name } => Some(name.as_str()),
                ConstantValue::Fixed { .. } => None,
            })
            .collect()
    }

    /// Actual parameters of the closed instance.
    pub fn closed_arguments(&self) -> Vec<String> {
        self.parameters()
            .into_iter()
            .map(|name| self.external_ref(name))
            .collect()
    }

    fn external_ref(&self, name: &str) -> String {
        format!("{}::{name}", self.external)
    }

    /// Resolution inside the open module: unfixed constants are parameters.
    pub fn open_scope<'a, M: ComponentModel + ?Sized>(
        &'a self,
        model: &'a M,
    ) -> ConstantScope<'a, M> {
        ConstantScope {
            inst: self,
            model,
            closed: false,
        }
    }

    /// Resolution outside the open module: unfixed constants are external.
    pub fn closed_scope<'a, M: ComponentModel + ?Sized>(
        &'a self,
        model: &'a M,
    ) -> ConstantScope<'a, M> {
        ConstantScope {
            inst: self,
            model,
            closed: true,
        }
    }
}

pub struct ConstantScope<'a, M: ?Sized> {
    inst: &'a Instantiated,
    model: &'a M,
    closed: bool,
}

impl<M: ComponentModel + ?Sized> ExprScope for ConstantScope<'_, M> {
    fn constant(&self, id: ConstId, site: &Site) -> CompileResult<String> {
        match self.inst.get(id) {
            Some(ConstantValue::Fixed { text, .. }) => Ok(text.clone()),
            Some(ConstantValue::Unfixed { name }) if self.closed => {
                Ok(self.inst.external_ref(name))
            }
            Some(ConstantValue::Unfixed { name }) => Ok(name.clone()),
            None => {
                let name = self
                    .model
                    .constant_name(id)
                    .ok_or_else(|| site.dangling("constant", id.0))?;
                Ok(self.inst.external_ref(&name))
            }
        }
    }
}

/// `name(args)`, or just `name` when there are no arguments.
fn apply(name: &str, args: &[String]) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{name}({})", args.join(", "))
    }
}

/// The semantic process of one component node, with its constants passed
/// in scope order.
fn component_process<M: ComponentModel + ?Sized>(
    model: &M,
    node: NodeId,
    scope: &dyn ExprScope,
    site: &Site,
) -> CompileResult<String> {
    let name = model
        .process_name(node)
        .ok_or_else(|| site.dangling("component", node.0))?;
    let args = model
        .constants_in_scope(node)
        .into_iter()
        .map(|c| scope.constant(c, site))
        .collect::<CompileResult<Vec<_>>>()?;
    Ok(apply(&name, &args))
}

/// Body of the open module: the target process and its event universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetForm {
    pub process: String,
    pub universe: String,
}

pub fn target_form<M: ComponentModel + ?Sized>(
    model: &M,
    resolver: &ActorResolver<'_, M>,
    inst: &Instantiated,
    site: &Site,
) -> CompileResult<TargetForm> {
    let group = resolver.group();
    let scope = inst.open_scope(model);
    match group.target.kind {
        TargetKind::Component => {
            let node = group.target.node;
            Ok(TargetForm {
                process: component_process(model, node, &scope, site)?,
                universe: model
                    .universe_name(node)
                    .ok_or_else(|| site.dangling("component", node.0))?,
            })
        }
        TargetKind::Collection => collection_form(model, resolver, &scope, site),
    }
}

/// One renaming clause applied to a component process.
fn renaming<M: ComponentModel + ?Sized>(
    model: &M,
    node: NodeId,
    event: &str,
    from: &str,
    onto: &str,
    site: &Site,
) -> CompileResult<String> {
    let decl = model
        .node(node)
        .ok_or_else(|| site.dangling("component", node.0))?;
    let ev = decl
        .find_event(event)
        .ok_or_else(|| site.missing(format!("declaration of event {event} in {}", decl.name)))?;
    Ok(match &ev.ty {
        Some(ty) => format!(
            "[[ {from}.x__ <- {onto}.x__ | x__ <- {} ]]",
            render::csp_type(ty)
        ),
        None => format!("[[ {from} <- {onto} ]]"),
    })
}

struct Member {
    node: NodeId,
    process: String,
    renamings: Vec<String>,
    chans: IndexSet<String>,
}

fn collection_form<M: ComponentModel + ?Sized>(
    model: &M,
    resolver: &ActorResolver<'_, M>,
    scope: &dyn ExprScope,
    site: &Site,
) -> CompileResult<TargetForm> {
    let group = resolver.group();
    let scope_id = group.target.node;
    let scope_node = model
        .node(scope_id)
        .ok_or_else(|| site.dangling("component", scope_id.0))?;
    let scope_ns = model
        .namespace(scope_id)
        .ok_or_else(|| site.dangling("component", scope_id.0))?;
    let ns = |id: NodeId| {
        model
            .namespace(id)
            .ok_or_else(|| site.dangling("component", id.0))
    };

    let mut members = Vec::new();
    for node in resolver.target_nodes(site)? {
        let decl = model
            .node(node)
            .ok_or_else(|| site.dangling("component", node.0))?;
        let prefix = ns(node)?;
        let chans = decl
            .events
            .iter()
            .flat_map(|e| {
                [
                    format!("{prefix}::{}.in", e.name),
                    format!("{prefix}::{}.out", e.name),
                ]
            })
            .collect();
        members.push(Member {
            node,
            process: component_process(model, node, scope, site)?,
            renamings: Vec::new(),
            chans,
        });
    }
    let is_boundary = |id: NodeId| {
        id == scope_id
            || model
                .node(id)
                .is_some_and(|n| n.kind == ComponentKind::Platform)
    };

    // Events of the scope itself that member ports are renamed onto.
    let mut boundary = IndexSet::new();
    for conn in &scope_node.connections {
        let from_ns = ns(conn.from)?;
        let to_ns = ns(conn.to)?;
        let out_port = format!("{from_ns}::{}.out", conn.from_event);
        let in_port = format!("{to_ns}::{}.in", conn.to_event);
        match (member_index(&members, conn.from), member_index(&members, conn.to)) {
            (Some(a), Some(b)) => {
                let kind = |id: NodeId| model.node(id).map(|n| n.kind);
                let same_kind = kind(conn.from) == kind(conn.to);
                if conn.is_async || !same_kind {
                    debug!(from = %out_port, to = %in_port, "Connection is not fused");
                    continue;
                }
                let clause = renaming(model, conn.to, &conn.to_event, &in_port, &out_port, site)?;
                members[b].renamings.push(clause);
                members[b].chans.shift_remove(&in_port);
                members[b].chans.insert(out_port.clone());
                if conn.bidirectional {
                    let back_out = format!("{to_ns}::{}.out", conn.to_event);
                    let back_in = format!("{from_ns}::{}.in", conn.from_event);
                    let clause =
                        renaming(model, conn.from, &conn.from_event, &back_in, &back_out, site)?;
                    members[a].renamings.push(clause);
                    members[a].chans.shift_remove(&back_in);
                    members[a].chans.insert(back_out);
                }
            }
            // Output of a component onto the boundary of the scope.
            (Some(a), None) if is_boundary(conn.to) => {
                let onto = format!("{scope_ns}::{}.out", conn.to_event);
                let clause = renaming(model, conn.from, &conn.from_event, &out_port, &onto, site)?;
                members[a].renamings.push(clause);
                members[a].chans.shift_remove(&out_port);
                boundary.insert(onto);
            }
            // Input of a component from the boundary of the scope.
            (None, Some(b)) if is_boundary(conn.from) => {
                let onto = format!("{scope_ns}::{}.in", conn.from_event);
                let clause = renaming(model, conn.to, &conn.to_event, &in_port, &onto, site)?;
                members[b].renamings.push(clause);
                members[b].chans.shift_remove(&in_port);
                boundary.insert(onto);
            }
            _ => {
                debug!(from = %out_port, to = %in_port, "Connection does not touch the collection");
            }
        }
    }

    let composed = compose(&members);

    // Memory of the scope: its own variables and those its parts require.
    let mut vars = IndexSet::new();
    vars.extend(scope_node.variables.iter().copied());
    for m in &members {
        if let Some(n) = model.node(m.node) {
            vars.extend(n.required_variables.iter().copied());
        }
    }
    let body = if vars.is_empty() {
        composed
    } else {
        let mut cells = Vec::new();
        let mut chans = Vec::new();
        for v in vars {
            let decl = model
                .variable(v)
                .ok_or_else(|| site.dangling("variable", v.0))?;
            let (get, set) = model
                .variable_channels(v)
                .ok_or_else(|| site.dangling("variable", v.0))?;
            let initial = match &decl.initial {
                Some(e) => render::render_expr(e, scope, site)?,
                None => render::default_value(&decl.ty)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        site.missing(format!("initial value of variable {}", decl.name))
                    })?,
            };
            cells.push(format!("Cert_var({get}, {set}, {initial})"));
            chans.push(get);
            chans.push(set);
        }
        format!(
            "Cert_with_memory({composed}, ({}), {})",
            cells.join(" ||| "),
            render::channel_set(chans)
        )
    };

    let mut universes = members
        .iter()
        .map(|m| {
            model
                .universe_name(m.node)
                .ok_or_else(|| site.dangling("component", m.node.0))
        })
        .collect::<CompileResult<Vec<_>>>()?;
    if !boundary.is_empty() {
        universes.push(render::channel_set(boundary));
    }
    let universe = match universes.as_slice() {
        [] => "{}".to_string(),
        [single] => single.clone(),
        many => format!("Union({{{}}})", many.join(", ")),
    };

    Ok(TargetForm {
        process: format!("Cert_hide_termination({body})"),
        universe,
    })
}

fn member_index(members: &[Member], node: NodeId) -> Option<usize> {
    members.iter().position(|m| m.node == node)
}

/// Channels `members[i]` shares with anyone else.
fn external_sync(members: &[Member], i: usize) -> IndexSet<String> {
    let others: IndexSet<&String> = members
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .flat_map(|(_, m)| m.chans.iter())
        .collect();
    members[i]
        .chans
        .iter()
        .filter(|c| others.contains(c))
        .cloned()
        .collect()
}

/// `P_i [| sync_i |] (P_i+1 [| ... |] P_n)`, where `sync_i` is the part of
/// the external channels of `P_i` that later members use.
fn compose(members: &[Member]) -> String {
    fn go(members: &[Member], i: usize) -> String {
        let m = &members[i];
        let process = if m.renamings.is_empty() {
            m.process.clone()
        } else {
            format!("{} {}", m.process, m.renamings.join(" "))
        };
        if i + 1 == members.len() {
            return process;
        }
        let later: IndexSet<&String> = members[i + 1..]
            .iter()
            .flat_map(|m| m.chans.iter())
            .collect();
        let sync: Vec<String> = external_sync(members, i)
            .into_iter()
            .filter(|c| later.contains(c))
            .collect();
        let rest = go(members, i + 1);
        if sync.is_empty() {
            format!("({process} ||| {rest})")
        } else {
            format!("({process} [| {} |] {rest})", render::channel_set(sync))
        }
    }
    if members.is_empty() {
        return "SKIP".to_string();
    }
    go(members, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tockcert_model::{
        Actor, ActorKind, ComponentGraph, ConstAssignment, Connection, Expr, Target, Type,
    };

    fn site() -> Site {
        Site::group("G")
    }

    fn module_with_constants() -> (ComponentGraph, NodeId, ConstId, ConstId, ConstId) {
        let mut model = ComponentGraph::new();
        let m = model.add_node("M", ComponentKind::Module, None);
        let c = model.add_node("C", ComponentKind::Controller, Some(m));
        let free = model.add_constant(m, "k", Type::Int, None);
        let init = model.add_constant(c, "j", Type::Bool, Some(Expr::Bool(true)));
        let assigned = model.add_constant(c, "k", Type::Int, None);
        (model, m, free, init, assigned)
    }

    fn group_over(node: NodeId, assignments: Vec<ConstAssignment>) -> Group {
        let mut g = Group::new("G", Target::component(node));
        g.instantiation.assignments = assignments;
        g.add_actor(Actor::new("T", ActorKind::Target));
        g.add_actor(Actor::new("W", ActorKind::World));
        g
    }

    #[test]
    fn unfixed_constants_become_parameters() {
        let (model, m, _, _, assigned) = module_with_constants();
        let g = group_over(
            m,
            vec![ConstAssignment {
                constants: vec![assigned],
                value: Expr::Int(4),
            }],
        );
        let inst = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap();
        assert_eq!(inst.parameters(), vec!["const_M_k"]);
        assert_eq!(
            inst.closed_arguments(),
            vec!["instantiations::const_M_k".to_string()]
        );
        let open = inst.open_scope(&model);
        let closed = inst.closed_scope(&model);
        assert_eq!(open.constant(ConstId(0), &site()).unwrap(), "const_M_k");
        assert_eq!(
            closed.constant(ConstId(0), &site()).unwrap(),
            "instantiations::const_M_k"
        );
        assert_eq!(
            closed.constant(assigned, &site()).unwrap(),
            "{- const_M_C_k -} 4"
        );
        assert_eq!(
            closed.constant(ConstId(1), &site()).unwrap(),
            "{- initial value of const_M_C_j -} true"
        );
    }

    #[test]
    fn same_name_in_other_scope_is_not_fixed() {
        let (model, m, free, _, assigned) = module_with_constants();
        let g = group_over(
            m,
            vec![ConstAssignment {
                constants: vec![assigned],
                value: Expr::Int(4),
            }],
        );
        let inst = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap();
        assert!(matches!(
            inst.get(free),
            Some(ConstantValue::Unfixed { .. })
        ));
    }

    #[test]
    fn initial_value_and_instantiation_conflict() {
        let (model, m, _, init, _) = module_with_constants();
        let g = group_over(
            m,
            vec![ConstAssignment {
                constants: vec![init],
                value: Expr::Bool(false),
            }],
        );
        let err = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap_err();
        assert_eq!(
            err,
            CompileError::ConflictingInstantiation {
                group: "G".into(),
                constant: "const_M_C_j".into(),
            }
        );
    }

    #[test]
    fn duplicate_assignment_is_rejected() {
        let (model, m, free, ..) = module_with_constants();
        let g = group_over(
            m,
            vec![
                ConstAssignment {
                    constants: vec![free],
                    value: Expr::Int(1),
                },
                ConstAssignment {
                    constants: vec![free],
                    value: Expr::Int(2),
                },
            ],
        );
        assert!(matches!(
            Instantiated::resolve(&model, &g, "instantiations", &site()),
            Err(CompileError::DuplicateInstantiation { .. })
        ));
    }

    #[test]
    fn component_target_passes_constants_in_scope_order() {
        let (model, m, ..) = module_with_constants();
        let g = group_over(m, Vec::new());
        let resolver = ActorResolver::new(&model, &g);
        let inst = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap();
        let form = target_form(&model, &resolver, &inst, &site()).unwrap();
        assert_eq!(
            form.process,
            "M::D__(const_M_k, {- initial value of const_M_C_j -} true, const_M_C_k)"
        );
        assert_eq!(form.universe, "M::sem__events");
    }

    fn collection_fixture(is_async: bool) -> (ComponentGraph, NodeId) {
        let mut model = ComponentGraph::new();
        let m = model.add_node("M", ComponentKind::Module, None);
        let p = model.add_node("P", ComponentKind::Platform, Some(m));
        let a = model.add_node("A", ComponentKind::Controller, Some(m));
        let b = model.add_node("B", ComponentKind::Controller, Some(m));
        model.add_event(a, "req", Some(Type::Int));
        model.add_event(a, "go", None);
        model.add_event(b, "req", Some(Type::Int));
        model.add_event(p, "start", None);
        model.connect(
            m,
            Connection {
                from: a,
                from_event: "req".into(),
                to: b,
                to_event: "req".into(),
                is_async,
                bidirectional: false,
            },
        );
        model.connect(
            m,
            Connection {
                from: p,
                from_event: "start".into(),
                to: a,
                to_event: "go".into(),
                is_async: true,
                bidirectional: false,
            },
        );
        let v = model.add_variable(m, "x", Type::Int, None);
        model.require_variable(b, v);
        (model, m)
    }

    #[test]
    fn collection_fuses_sync_connections_and_adds_memory() {
        let (model, m) = collection_fixture(false);
        let mut g = group_over(m, Vec::new());
        g.target = Target::collection(m);
        let resolver = ActorResolver::new(&model, &g);
        let inst = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap();
        let form = target_form(&model, &resolver, &inst, &site()).unwrap();
        assert_eq!(
            form.process,
            "Cert_hide_termination(Cert_with_memory(\
             (M::A::D__ [[ M::A::go.in <- M::start.in ]] \
             [| {| M::A::req.out |} |] \
             M::B::D__ [[ M::B::req.in.x__ <- M::A::req.out.x__ | x__ <- Int ]]), \
             (Cert_var(M::get_x, M::set_x, 0)), {| M::get_x, M::set_x |}))"
        );
        assert_eq!(
            form.universe,
            "Union({M::A::sem__events, M::B::sem__events, {| M::start.in |}})"
        );
    }

    #[test]
    fn async_connections_interleave() {
        let (model, m) = collection_fixture(true);
        let mut g = group_over(m, Vec::new());
        g.target = Target::collection(m);
        let resolver = ActorResolver::new(&model, &g);
        let inst = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap();
        let form = target_form(&model, &resolver, &inst, &site()).unwrap();
        assert!(form
            .process
            .contains("(M::A::D__ [[ M::A::go.in <- M::start.in ]] ||| M::B::D__)"));
    }

    #[test]
    fn boundary_renamings_extend_the_universe() {
        let mut model = ComponentGraph::new();
        let m = model.add_node("M", ComponentKind::Module, None);
        let p = model.add_node("P", ComponentKind::Platform, Some(m));
        let a = model.add_node("A", ComponentKind::Controller, Some(m));
        model.add_event(a, "go", None);
        model.add_event(a, "done", Some(Type::Bool));
        model.add_event(p, "go", None);
        for (from, from_event, to, to_event) in [(p, "go", a, "go"), (a, "done", m, "done")] {
            model.connect(
                m,
                Connection {
                    from,
                    from_event: from_event.into(),
                    to,
                    to_event: to_event.into(),
                    is_async: false,
                    bidirectional: false,
                },
            );
        }
        let mut g = group_over(m, Vec::new());
        g.target = Target::collection(m);
        let resolver = ActorResolver::new(&model, &g);
        let inst = Instantiated::resolve(&model, &g, "instantiations", &site()).unwrap();
        let form = target_form(&model, &resolver, &inst, &site()).unwrap();
        assert_eq!(
            form.process,
            "Cert_hide_termination(M::A::D__ [[ M::A::go.in <- M::go.in ]] \
             [[ M::A::done.out.x__ <- M::done.out.x__ | x__ <- Bool ]])"
        );
        assert_eq!(
            form.universe,
            "Union({M::A::sem__events, {| M::go.in, M::done.out |}})"
        );
    }
}
