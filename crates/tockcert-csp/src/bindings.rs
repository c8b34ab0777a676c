//! Bindings, interaction memory and guards.
//!
//! A slot written by a wildcard argument is *stored* right after the event
//! that binds it; a slot read by an argument, bound, guard or time expression
//! is *loaded* in front of the fragment that reads it. Every interaction
//! with slots gets one memory cell per slot, reached over a get/set channel
//! pair of its own.
//!
//! When several processes of one interaction share the memory, each reaches
//! it through its own port: the channels carry the port number first, so
//! lifelines composed by alphabetised parallel never synchronise on memory
//! access.

use tockcert_model::{
    Argument, ComponentModel, Fragment, Guard, Interaction, LoopBound, Occurrence, Operand,
    SlotId, Topic, Type,
};

use crate::actors::ActorResolver;
use crate::errors::{CompileError, CompileResult, Site};
use crate::render::{self, ExprScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obligation {
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub slot: SlotId,
    pub obligation: Obligation,
}

impl Binding {
    fn load(slot: SlotId) -> Self {
        Self {
            slot,
            obligation: Obligation::Load,
        }
    }

    fn store(slot: SlotId) -> Self {
        Self {
            slot,
            obligation: Obligation::Store,
        }
    }
}

fn push_unique(out: &mut Vec<Binding>, binding: Binding) {
    if !out.contains(&binding) {
        out.push(binding);
    }
}

fn loads_of(expr: &tockcert_model::Expr, out: &mut Vec<Binding>) {
    for slot in expr.slots() {
        push_unique(out, Binding::load(slot));
    }
}

fn loads_of_guard(guard: &Guard, out: &mut Vec<Binding>) {
    if let Guard::Expr(e) = guard {
        loads_of(e, out);
    }
}

/// Bindings used directly by `fragment`, in first-use order.
///
/// Nested fragments are not visited; they collect their own bindings when
/// they are compiled.
pub fn collect_bindings(fragment: &Fragment) -> Vec<Binding> {
    let mut out = Vec::new();
    match fragment {
        Fragment::Occurrence(Occurrence::Message { message, .. }) => {
            for arg in &message.arguments {
                match arg {
                    Argument::Expr(e) => loads_of(e, &mut out),
                    Argument::Wildcard {
                        binding: Some(slot),
                    } => push_unique(&mut out, Binding::store(*slot)),
                    Argument::Wildcard { binding: None } => {}
                }
            }
        }
        Fragment::Occurrence(Occurrence::Wait { units, .. }) => loads_of(units, &mut out),
        Fragment::Occurrence(Occurrence::Deadlock { .. }) => {}
        Fragment::Branch { operands, .. } => {
            for operand in operands {
                loads_of_guard(&operand.guard, &mut out);
            }
        }
        Fragment::Loop { bound, .. } => match bound {
            LoopBound::Infinite => {}
            LoopBound::AtLeast(n) | LoopBound::Exactly(n) => loads_of(n, &mut out),
            LoopBound::Between(n, m) => {
                loads_of(n, &mut out);
                loads_of(m, &mut out);
            }
        },
        Fragment::Deadline { units, .. } => loads_of(units, &mut out),
        Fragment::Duration { bound, .. } => {
            loads_of(&bound.lower, &mut out);
            loads_of(&bound.upper, &mut out);
        }
        Fragment::Opt { guard, .. } => loads_of_guard(guard, &mut out),
        Fragment::Until { .. } => {}
    }
    out
}

/// One memory cell of an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCell {
    pub slot: SlotId,
    pub binding: String,
    pub get: String,
    pub set: String,
    pub ty: Type,
    pub initial: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<MemoryCell>,
    /// Number of ports when the memory is shared.
    ports: Option<usize>,
    /// Port this view reads and writes through.
    port: Option<usize>,
}

impl Memory {
    pub fn build<M: ComponentModel + ?Sized>(
        resolver: &ActorResolver<'_, M>,
        model: &M,
        interaction: &Interaction,
        constants: &dyn ExprScope,
        site: &Site,
    ) -> CompileResult<Self> {
        let group = &resolver.group().name;
        let mut cells = Vec::with_capacity(interaction.slots.len());
        for (index, decl) in interaction.slots.iter().enumerate() {
            let slot = SlotId(index);
            let slot_site = site.detail(format!("memory slot {}", decl.name));
            let ty = slot_type(resolver, model, interaction, slot, &slot_site)?;
            let initial = match &decl.initial {
                Some(e) => render::render_expr(e, constants, &slot_site)?,
                None => render::default_value(&ty)
                    .map(str::to_string)
                    .ok_or_else(|| slot_site.missing(format!("initial value of type {ty}")))?,
            };
            let (get, set) = render::memory_channels(group, &interaction.name, &decl.name);
            cells.push(MemoryCell {
                slot,
                binding: render::binding_name(&decl.name, index),
                get,
                set,
                ty,
                initial,
            });
        }
        Ok(Self {
            cells,
            ports: None,
            port: None,
        })
    }

    /// Share the memory between `ports` processes.
    pub fn shared(mut self, ports: usize) -> Self {
        self.ports = Some(ports);
        self
    }

    /// View of a shared memory as seen through `port`.
    pub fn through(&self, port: usize) -> Self {
        Self {
            port: Some(port),
            ..self.clone()
        }
    }

    fn access(&self, channel: &str) -> String {
        match self.port {
            Some(k) => format!("{channel}.{k}"),
            None => channel.to_string(),
        }
    }

    /// Memory events of this view's port, for lifeline alphabets.
    pub fn port_events(&self) -> Vec<String> {
        self.cells
            .iter()
            .flat_map(|c| [self.access(&c.get), self.access(&c.set)])
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[MemoryCell] {
        &self.cells
    }

    pub fn cell(&self, slot: SlotId, site: &Site) -> CompileResult<&MemoryCell> {
        self.cells
            .get(slot.0)
            .ok_or_else(|| site.dangling("slot", slot.0))
    }

    pub fn binding(&self, slot: SlotId, site: &Site) -> CompileResult<String> {
        self.cell(slot, site).map(|c| c.binding.clone())
    }

    /// `get?Bnd -> ` for every slot `bindings` must load.
    pub fn emit_loads(&self, bindings: &[Binding], site: &Site) -> CompileResult<String> {
        let mut out = String::new();
        let mut seen = Vec::new();
        for b in bindings {
            if b.obligation != Obligation::Load || seen.contains(&b.slot) {
                continue;
            }
            seen.push(b.slot);
            let cell = self.cell(b.slot, site)?;
            out.push_str(&format!("{}?{} -> ", self.access(&cell.get), cell.binding));
        }
        Ok(out)
    }

    /// `set!Bnd -> ` for every slot `bindings` must store.
    pub fn emit_stores(&self, bindings: &[Binding], site: &Site) -> CompileResult<String> {
        let mut out = String::new();
        for b in bindings {
            if b.obligation == Obligation::Store {
                let cell = self.cell(b.slot, site)?;
                out.push_str(&format!("{}!{} -> ", self.access(&cell.set), cell.binding));
            }
        }
        Ok(out)
    }

    /// Run `body` against the memory; every port of a shared memory reaches
    /// the same cells.
    pub fn wrap(&self, body: String) -> String {
        if self.cells.is_empty() {
            return body;
        }
        let var = if self.ports.is_some() {
            "Cert_shared_var"
        } else {
            "Cert_var"
        };
        let vars: Vec<String> = self
            .cells
            .iter()
            .map(|c| format!("{var}({}, {}, {})", c.get, c.set, c.initial))
            .collect();
        let chans = render::channel_set(
            self.cells
                .iter()
                .flat_map(|c| [c.get.clone(), c.set.clone()]),
        );
        format!("Cert_with_memory({body}, ({}), {chans})", vars.join(" ||| "))
    }

    pub fn channel_declarations(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|c| {
                let ty = render::csp_type(&c.ty);
                match self.ports {
                    Some(n) => format!("channel {}, {} : {{0..{}}}.{ty}", c.get, c.set, n - 1),
                    None => format!("channel {}, {} : {ty}", c.get, c.set),
                }
            })
            .collect()
    }
}

/// Type of a slot: declared, or taken from its first wildcard use.
pub fn slot_type<M: ComponentModel + ?Sized>(
    resolver: &ActorResolver<'_, M>,
    model: &M,
    interaction: &Interaction,
    slot: SlotId,
    site: &Site,
) -> CompileResult<Type> {
    let decl = interaction
        .slot(slot)
        .ok_or_else(|| site.dangling("slot", slot.0))?;
    if let Some(ty) = &decl.ty {
        return Ok(ty.clone());
    }
    for id in interaction.preorder() {
        let Some(Fragment::Occurrence(Occurrence::Message { message, .. })) =
            interaction.fragment(id)
        else {
            continue;
        };
        let Some(position) = message.arguments.iter().position(|a| {
            matches!(a, Argument::Wildcard { binding: Some(s) } if *s == slot)
        }) else {
            continue;
        };
        let (node_id, ..) = resolver.endpoint(message, site)?;
        let node = model
            .node(node_id)
            .ok_or_else(|| site.dangling("component", node_id.0))?;
        return match &message.topic {
            Topic::Event { name } => {
                let event = node
                    .find_event(name)
                    .ok_or_else(|| site.missing(format!("declaration of event {name}")))?;
                if position != 0 {
                    return Err(site.missing(format!("value {position} of event {name}")));
                }
                event
                    .ty
                    .clone()
                    .ok_or_else(|| site.missing(format!("type of event {name}")))
            }
            Topic::Operation { name } => {
                let op = node
                    .find_operation(name)
                    .ok_or_else(|| site.missing(format!("declaration of operation {name}")))?;
                op.params
                    .get(position)
                    .map(|p| p.ty.clone())
                    .ok_or_else(|| {
                        site.missing(format!("parameter {position} of operation {name}"))
                    })
            }
        };
    }
    Err(site.missing(format!("type of memory slot {}", decl.name)))
}

/// Reject `else` operands whose meaning is not determined by their siblings.
pub fn validate_guards(operands: &[Operand], site: &Site) -> CompileResult<()> {
    let elses = operands
        .iter()
        .filter(|o| matches!(o.guard, Guard::Else))
        .count();
    let exprs = operands
        .iter()
        .filter(|o| matches!(o.guard, Guard::Expr(_)))
        .count();
    if elses > 1 {
        return Err(CompileError::IllFormedGuards {
            node: site.to_string(),
            reason: format!("{elses} else operands in one branch"),
        });
    }
    if elses == 1 && exprs == 0 {
        return Err(CompileError::IllFormedGuards {
            node: site.to_string(),
            reason: "else operand without guarded siblings".to_string(),
        });
    }
    Ok(())
}

/// Guard prefix of one operand: nothing, `g & `, or the negated
/// conjunction of the sibling guards for `else`.
pub fn compile_guard(
    guard: &Guard,
    siblings: &[Operand],
    scope: &dyn ExprScope,
    site: &Site,
) -> CompileResult<String> {
    match guard {
        Guard::Empty => Ok(String::new()),
        Guard::Expr(e) => Ok(format!("{} & ", render::render_expr(e, scope, site)?)),
        Guard::Else => {
            let rendered = siblings
                .iter()
                .filter_map(|o| match &o.guard {
                    Guard::Expr(e) => Some(render::render_expr(e, scope, site)),
                    _ => None,
                })
                .collect::<CompileResult<Vec<_>>>()?;
            let conjunction = match rendered.as_slice() {
                [] => {
                    return Err(CompileError::IllFormedGuards {
                        node: site.to_string(),
                        reason: "else operand without guarded siblings".to_string(),
                    })
                }
                [single] => single.clone(),
                many => format!("({})", many.join(" and ")),
            };
            Ok(format!("not {conjunction} & "))
        }
    }
}
