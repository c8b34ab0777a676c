//! Fragment compiler.
//!
//! Every interaction becomes one named process inside its group module.
//! Interactions with several (non-world) lifelines are compiled once per
//! lifeline and composed by alphabetised parallel; top-level `until`
//! fragments are then run by a shared process the lifelines hand off to.
//! The interaction memory is one process around the whole composition, which
//! every lifeline and `until` runner reaches through a port of its own.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use tockcert_model::{
    ActorId, ActorKind, BranchKind, ComponentModel, Expr, Fragment, FragmentId, Guard,
    Interaction, LoopBound, Message, Occurrence, SetId, SlotId, Temperature,
};

use crate::actors::ActorResolver;
use crate::bindings::{collect_bindings, compile_guard, validate_guards, Memory};
use crate::errors::{CompileError, CompileResult, Site};
use crate::render::{self, ExprScope, SetRendering};

/// How interactions refer to the event universe of their target.
pub const CLOSED_UNIVERSE: &str = "closed::Universe";

/// Which part of an interaction is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Every event of the interaction.
    Global,
    /// Only the events one actor takes part in.
    Lifeline(ActorId),
}

/// Shared instance ids of the top-level `until` fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntilTable {
    ids: IndexMap<FragmentId, usize>,
}

impl UntilTable {
    /// Number `until` fragments in body order, without entering their bodies.
    pub fn collect(interaction: &Interaction) -> Self {
        fn walk(
            interaction: &Interaction,
            ids: &[FragmentId],
            out: &mut IndexMap<FragmentId, usize>,
        ) {
            for id in ids {
                if out.contains_key(id) {
                    continue;
                }
                match interaction.fragment(*id) {
                    Some(Fragment::Until { .. }) => {
                        let next = out.len();
                        out.insert(*id, next);
                    }
                    Some(fragment) => {
                        for list in fragment.children() {
                            walk(interaction, list, out);
                        }
                    }
                    None => {}
                }
            }
        }
        let mut ids = IndexMap::new();
        walk(interaction, &interaction.body, &mut ids);
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, id: FragmentId) -> Option<usize> {
        self.ids.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FragmentId, usize)> + '_ {
        self.ids.iter().map(|(f, k)| (*f, *k))
    }
}

/// Constants resolve through the group; slots through the memory bindings.
struct SlotScope<'a> {
    constants: &'a dyn ExprScope,
    memory: &'a Memory,
}

impl ExprScope for SlotScope<'_> {
    fn constant(&self, id: tockcert_model::ConstId, site: &Site) -> CompileResult<String> {
        self.constants.constant(id, site)
    }

    fn slot(&self, id: SlotId, site: &Site) -> CompileResult<String> {
        self.memory.binding(id, site)
    }
}

/// Output of one interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInteraction {
    pub name: String,
    /// Channel declarations the definition relies on; these go to the top
    /// level of the output.
    pub channels: Vec<String>,
    /// Definition lines, placed inside the group module.
    pub definition: Vec<String>,
}

struct FragmentCompiler<'a, M: ComponentModel + ?Sized> {
    resolver: &'a ActorResolver<'a, M>,
    interaction: &'a Interaction,
    memory: &'a Memory,
    scope: SlotScope<'a>,
    /// Present when lifelines hand `until` fragments to shared processes.
    untils: Option<&'a UntilTable>,
    sync: &'a str,
    stop: &'static str,
    site: &'a Site,
}

impl<'a, M: ComponentModel + ?Sized> FragmentCompiler<'a, M> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        resolver: &'a ActorResolver<'a, M>,
        interaction: &'a Interaction,
        memory: &'a Memory,
        constants: &'a dyn ExprScope,
        untils: Option<&'a UntilTable>,
        sync: &'a str,
        stop: &'static str,
        site: &'a Site,
    ) -> Self {
        Self {
            resolver,
            interaction,
            memory,
            scope: SlotScope { constants, memory },
            untils,
            sync,
            stop,
            site,
        }
    }

    fn fragment(&self, id: FragmentId) -> CompileResult<&'a Fragment> {
        self.interaction
            .fragment(id)
            .ok_or_else(|| self.site.dangling("fragment", id.0))
    }

    fn expr(&self, expr: &Expr, site: &Site) -> CompileResult<String> {
        render::render_expr(expr, &self.scope, site)
    }

    fn loads(&self, fragment: &Fragment, site: &Site) -> CompileResult<String> {
        self.memory.emit_loads(&collect_bindings(fragment), site)
    }

    /// Sequential composition of `ids`, built back to front: a cold
    /// occurrence takes the rest of the sequence with it, so withdrawing the
    /// message withdraws everything after it.
    fn body(&self, ids: &[FragmentId], view: View) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(ids.len());
        for id in ids.iter().rev() {
            let fragment = self.fragment(*id)?;
            if let Fragment::Occurrence(Occurrence::Message {
                message,
                temperature: Temperature::Cold,
            }) = fragment
            {
                let site = self.site.fragment(id.0, fragment.kind_name());
                if self.participates(message, view, &site)? {
                    parts.reverse();
                    let rest = render::seq(&parts);
                    let text = self.occurrence(fragment, message, &rest, &site)?;
                    parts = vec![format!("Cert_cold({text})")];
                    continue;
                }
            }
            parts.push(self.compile(*id, view)?);
        }
        parts.reverse();
        Ok(render::seq(&parts))
    }

    /// `(loads prefix -> stores then)`.
    fn occurrence(
        &self,
        fragment: &Fragment,
        message: &Message,
        then: &str,
        site: &Site,
    ) -> CompileResult<String> {
        let channel = self.resolver.channel(message, site)?;
        let bindings = collect_bindings(fragment);
        let loads = self.memory.emit_loads(&bindings, site)?;
        let stores = self.memory.emit_stores(&bindings, site)?;
        let names = |slot: SlotId, s: &Site| self.memory.binding(slot, s);
        let prefix = channel.prefix(message, &self.scope, &names, site)?;
        Ok(format!("({loads}{prefix} -> {stores}{then})"))
    }

    fn on_lifeline(&self, actor: ActorId, view: View, site: &Site) -> CompileResult<bool> {
        self.resolver.actor_kind(actor, site)?;
        Ok(match view {
            View::Global => true,
            View::Lifeline(a) => a == actor,
        })
    }

    fn participates(&self, message: &Message, view: View, site: &Site) -> CompileResult<bool> {
        let (from, to) = self.resolver.resolve_pair(message, site)?;
        Ok(match view {
            View::Global => true,
            View::Lifeline(a) => a == from || a == to,
        })
    }

    fn closure(&self, message: &Message, site: &Site) -> CompileResult<String> {
        self.resolver
            .channel(message, site)?
            .closure(message, &self.scope, site)
    }

    fn render_set(&self, id: SetId, site: &Site) -> CompileResult<String> {
        let message = |m: &Message, s: &Site| self.closure(m, s);
        let how = SetRendering {
            group: &self.resolver.group().name,
            universe: CLOSED_UNIVERSE,
            message: &message,
        };
        render::render_set(&self.resolver.group().sets, id, &how, site)
    }

    /// Events the body of an `until` offers first.
    fn initials(&self, body: &[FragmentId], site: &Site) -> CompileResult<String> {
        let Some(first) = body.first() else {
            return Ok("{}".to_string());
        };
        let fragment = self.fragment(*first)?;
        let site = site.detail(format!("first fragment #{}", first.0));
        match fragment {
            Fragment::Occurrence(Occurrence::Message { message, .. }) => {
                Ok(render::channel_set([self.closure(message, &site)?]))
            }
            Fragment::Occurrence(Occurrence::Wait { .. }) => Ok("{tock}".to_string()),
            Fragment::Occurrence(Occurrence::Deadlock { .. }) => Ok("{}".to_string()),
            other => {
                Err(site.unsupported(format!("until body starting with {}", other.kind_name())))
            }
        }
    }

    fn until(&self, intra: SetId, body: &[FragmentId], site: &Site) -> CompileResult<String> {
        let p = self.body(body, View::Global)?;
        let intra = self.render_set(intra, &site.detail("intra set"))?;
        let initials = self.initials(body, site)?;
        Ok(format!("Cert_until({p}, {intra}, {initials})"))
    }

    fn compile(&self, id: FragmentId, view: View) -> CompileResult<String> {
        let fragment = self.fragment(id)?;
        let site = self.site.fragment(id.0, fragment.kind_name());
        match fragment {
            Fragment::Occurrence(Occurrence::Message {
                message,
                temperature,
            }) => {
                if !self.participates(message, view, &site)? {
                    return Ok("SKIP".to_string());
                }
                let event = self.occurrence(fragment, message, "SKIP", &site)?;
                Ok(match temperature {
                    Temperature::Hot => event,
                    Temperature::Cold => format!("Cert_cold({event})"),
                })
            }
            Fragment::Occurrence(Occurrence::Wait { actor, units }) => {
                if !self.on_lifeline(*actor, view, &site)? {
                    return Ok("SKIP".to_string());
                }
                let loads = self.loads(fragment, &site)?;
                let n = self.expr(units, &site)?;
                Ok(render::with_loads(&loads, format!("WAIT({n})")))
            }
            Fragment::Occurrence(Occurrence::Deadlock { actor }) => {
                if !self.on_lifeline(*actor, view, &site)? {
                    return Ok("SKIP".to_string());
                }
                Ok(self.stop.to_string())
            }
            Fragment::Branch { kind, operands } => {
                validate_guards(operands, &site)?;
                let op = match kind {
                    BranchKind::Alt => "|~|",
                    BranchKind::XAlt => "[]",
                    BranchKind::Par => "|||",
                };
                let mut rendered = operands
                    .iter()
                    .map(|o| -> CompileResult<String> {
                        let guard = compile_guard(&o.guard, operands, &self.scope, &site)?;
                        let body = self.body(&o.body, view)?;
                        Ok(format!("({guard}{body})"))
                    })
                    .collect::<CompileResult<Vec<_>>>()?;
                let choice = match rendered.len() {
                    0 => "SKIP".to_string(),
                    1 => rendered.remove(0),
                    _ => format!("({})", rendered.join(&format!(" {op} "))),
                };
                Ok(render::with_loads(&self.loads(fragment, &site)?, choice))
            }
            Fragment::Loop { bound, body } => {
                let p = self.body(body, view)?;
                let text = match bound {
                    LoopBound::Infinite => format!("Cert_loop({p})"),
                    LoopBound::AtLeast(n) => {
                        format!("Cert_loop_atleast({}, {p})", self.expr(n, &site)?)
                    }
                    LoopBound::Exactly(n) => {
                        format!("Cert_loop_exactly({}, {p})", self.expr(n, &site)?)
                    }
                    LoopBound::Between(n, m) => format!(
                        "Cert_loop_between({}, {}, {p})",
                        self.expr(n, &site)?,
                        self.expr(m, &site)?
                    ),
                };
                Ok(render::with_loads(&self.loads(fragment, &site)?, text))
            }
            Fragment::Deadline { units, body } => {
                let p = self.body(body, view)?;
                let text = format!("Cert_deadline({}, {p})", self.expr(units, &site)?);
                Ok(render::with_loads(&self.loads(fragment, &site)?, text))
            }
            Fragment::Duration { bound, body } => {
                let p = self.body(body, view)?;
                let upper = self.expr(&bound.upper, &site)?;
                let text = if bound.lower.is_zero() {
                    format!("Cert_duration_ub({upper}, {p})")
                } else {
                    let lower = self.expr(&bound.lower, &site)?;
                    format!("Cert_duration({lower}, {upper}, {p})")
                };
                Ok(render::with_loads(&self.loads(fragment, &site)?, text))
            }
            Fragment::Opt { guard, body } => {
                if matches!(guard, Guard::Else) {
                    return Err(CompileError::IllFormedGuards {
                        node: site.to_string(),
                        reason: "else guard on an opt fragment".to_string(),
                    });
                }
                let guard = compile_guard(guard, &[], &self.scope, &site)?;
                let p = self.body(body, view)?;
                let text = format!("Cert_opt({guard}{p})");
                Ok(render::with_loads(&self.loads(fragment, &site)?, text))
            }
            Fragment::Until { intra, body } => match (view, self.untils.and_then(|t| t.get(id))) {
                (View::Lifeline(_), Some(k)) => {
                    Ok(format!("({sync}.{k} -> {sync}.{k} -> SKIP)", sync = self.sync))
                }
                _ => self.until(*intra, body, &site),
            },
        }
    }

    /// Event channels of the messages a lifeline takes part in, outside
    /// shared `until` bodies.
    fn alphabet(
        &self,
        ids: &[FragmentId],
        actor: ActorId,
        out: &mut IndexSet<String>,
    ) -> CompileResult<()> {
        for id in ids {
            let fragment = self.fragment(*id)?;
            let site = self.site.fragment(id.0, fragment.kind_name());
            match fragment {
                Fragment::Occurrence(Occurrence::Message { message, .. }) => {
                    if self.participates(message, View::Lifeline(actor), &site)? {
                        out.insert(self.resolver.channel(message, &site)?.base);
                    }
                }
                Fragment::Until { .. } if self.untils.is_some_and(|t| t.get(*id).is_some()) => {}
                _ => {
                    for list in fragment.children() {
                        self.alphabet(list, actor, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Reject fragment trees that contain themselves.
fn check_acyclic(interaction: &Interaction, site: &Site) -> CompileResult<()> {
    fn visit(
        interaction: &Interaction,
        id: FragmentId,
        path: &mut Vec<FragmentId>,
        done: &mut Vec<FragmentId>,
        site: &Site,
    ) -> CompileResult<()> {
        if done.contains(&id) {
            return Ok(());
        }
        let Some(fragment) = interaction.fragment(id) else {
            return Ok(());
        };
        if path.contains(&id) {
            return Err(site
                .fragment(id.0, fragment.kind_name())
                .unsupported("fragment nested inside itself"));
        }
        path.push(id);
        for list in fragment.children() {
            for child in list {
                visit(interaction, *child, path, done, site)?;
            }
        }
        path.pop();
        done.push(id);
        Ok(())
    }
    let mut done = Vec::new();
    for id in &interaction.body {
        visit(interaction, *id, &mut Vec::new(), &mut done, site)?;
    }
    Ok(())
}

/// Compile one interaction of the resolver's group.
///
/// `constants` resolves constants as seen from inside the group module.
pub fn compile_interaction<M: ComponentModel + ?Sized>(
    model: &M,
    resolver: &ActorResolver<'_, M>,
    interaction: &Interaction,
    constants: &dyn ExprScope,
    timed: bool,
    site: &Site,
) -> CompileResult<CompiledInteraction> {
    let group = resolver.group();
    let site = site.interaction(&interaction.name);
    check_acyclic(interaction, &site)?;

    let mut lifelines = Vec::new();
    for actor in &interaction.actors {
        let kind = resolver.actor_kind(*actor, &site)?;
        if !matches!(kind, ActorKind::World) && !lifelines.contains(actor) {
            lifelines.push(*actor);
        }
    }
    debug!(
        group = %group.name,
        interaction = %interaction.name,
        lifelines = lifelines.len(),
        "Compiling interaction"
    );

    let untils = UntilTable::collect(interaction);
    let shared = lifelines.len() > 1 && !untils.is_empty();
    let memory = Memory::build(resolver, model, interaction, constants, &site)?;
    let memory = if lifelines.len() > 1 {
        // One port per lifeline, plus one the `until` runners share.
        memory.shared(lifelines.len() + usize::from(shared))
    } else {
        memory
    };
    let sync = render::until_channel(&group.name, &interaction.name);
    let stop = if timed { "TSTOP" } else { "STOP" };
    let handoff = shared.then_some(&untils);

    let name = &interaction.name;
    let mut channels = memory.channel_declarations();
    let mut definition = Vec::new();
    match lifelines.as_slice() {
        [] => definition.push(format!("{name} = {stop}")),
        [only] => {
            let compiler = FragmentCompiler::new(
                resolver,
                interaction,
                &memory,
                constants,
                handoff,
                &sync,
                stop,
                &site,
            );
            let body = compiler.body(&interaction.body, View::Lifeline(*only))?;
            definition.push(format!("{name} = {} ; {stop}", memory.wrap(body)));
        }
        many => {
            let datatype = render::actors_datatype(name);
            let mut constructors = Vec::new();
            let mut processes = Vec::new();
            let mut alphabets = Vec::new();
            for (port, actor) in many.iter().enumerate() {
                let actor_name = &group
                    .actor(*actor)
                    .ok_or_else(|| site.dangling("actor", actor.0))?
                    .name;
                let ctor = render::actor_constructor(name, actor_name);
                debug!(interaction = %name, lifeline = %actor_name, port, "Compiling lifeline");
                let view = memory.through(port);
                let compiler = FragmentCompiler::new(
                    resolver,
                    interaction,
                    &view,
                    constants,
                    handoff,
                    &sync,
                    stop,
                    &site,
                );
                let body = compiler.body(&interaction.body, View::Lifeline(*actor))?;
                processes.push(format!("L({ctor}) = {body}"));
                let mut alpha = IndexSet::new();
                compiler.alphabet(&interaction.body, *actor, &mut alpha)?;
                alpha.extend(view.port_events());
                if shared {
                    alpha.insert(sync.clone());
                }
                if timed {
                    alpha.insert("tock".to_string());
                }
                alphabets.push(format!("alpha({ctor}) = {}", render::channel_set(alpha)));
                constructors.push(ctor);
            }
            definition.push(format!("datatype {datatype} = {}", constructors.join(" | ")));

            let lifelines = format!("(|| a : {datatype} @ [alpha(a)] L(a))");
            let mut locals: Vec<String> = processes.into_iter().chain(alphabets).collect();
            let composed = if shared {
                let done = untils.len();
                let runner_view = memory.through(many.len());
                let runner = FragmentCompiler::new(
                    resolver,
                    interaction,
                    &runner_view,
                    constants,
                    handoff,
                    &sync,
                    stop,
                    &site,
                );
                let mut shared_names = Vec::new();
                for (fragment_id, k) in untils.iter() {
                    let fragment = runner.fragment(fragment_id)?;
                    let fsite = site.fragment(fragment_id.0, fragment.kind_name());
                    let Fragment::Until { intra, body } = fragment else {
                        continue;
                    };
                    let run = runner.until(*intra, body, &fsite)?;
                    locals.push(format!(
                        "Until_{k} = ({sync}.{k} -> ({run} ; {sync}.{k} -> Until_{k})) \
                         [] ({sync}.{done} -> SKIP)"
                    ));
                    shared_names.push(format!("Until_{k}"));
                }
                channels.push(format!("channel {sync} : {{0..{done}}}"));
                let runners = if shared_names.len() == 1 {
                    shared_names.remove(0)
                } else {
                    format!("({})", shared_names.join(&format!(" [| {{{sync}.{done}}} |] ")))
                };
                format!(
                    "((({lifelines} ; {sync}.{done} -> SKIP) [| {{| {sync} |}} |] {runners}) \
                     \\ {{| {sync} |}})"
                )
            } else {
                lifelines
            };
            definition.push(format!("{name} ="));
            definition.push("  let".to_string());
            definition.extend(locals.into_iter().map(|l| format!("    {l}")));
            definition.push("  within".to_string());
            definition.push(format!("    {} ; {stop}", memory.wrap(composed)));
        }
    }

    Ok(CompiledInteraction {
        name: name.clone(),
        channels,
        definition,
    })
}
