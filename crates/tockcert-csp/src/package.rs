//! Package driver: lays out one CSP-M file per package.

use std::fmt::Write;

use indexmap::IndexSet;
use tracing::{debug, info};

use tockcert_model::{
    Assertion, ComponentModel, Group, Message, Package, ProcessRef, Property, SemanticModel,
    TargetKind,
};

use crate::actors::ActorResolver;
use crate::algebra;
use crate::errors::{CompileResult, Site};
use crate::fragments::{compile_interaction, CompiledInteraction};
use crate::instantiation::{target_form, Instantiated};
use crate::library::LIBRARY;
use crate::render::{self, ExprScope, SetRendering};
use crate::{GeneratorOptions, LibraryMode, Provenance};

/// Everything one group contributes to the output.
struct GroupOutput {
    channels: Vec<String>,
    module: String,
    msg_sets: Option<String>,
    includes: Vec<String>,
}

fn include_line(path: &str) -> String {
    format!("include \"{path}\"")
}

pub(crate) fn generate_package<M: ComponentModel + ?Sized>(
    package: &mut Package,
    model: &M,
    options: &GeneratorOptions,
    provenance: &Provenance,
) -> CompileResult<String> {
    let interaction_count: usize = package.groups.iter().map(|g| g.interactions.len()).sum();
    info!(
        package = %package.name,
        groups = package.groups.len(),
        interactions = interaction_count,
        "Generating CSP-M"
    );

    for group in &mut package.groups {
        algebra::optimise_group(group);
    }

    let mut outputs = Vec::with_capacity(package.groups.len());
    for group in &package.groups {
        outputs.push(render_group(group, model, options)?);
    }

    let mut includes = IndexSet::new();
    if let LibraryMode::Include(path) = &options.library {
        includes.insert(include_line(path));
    }
    includes.insert(include_line(&options.external_definitions.file));
    for import in &package.imports {
        includes.insert(include_line(&format!("{import}.csp")));
    }
    for output in &outputs {
        includes.extend(output.includes.iter().cloned());
    }

    let mut out = String::new();
    writeln!(out, "-- Generated by {} {}", provenance.tool, provenance.version).unwrap();
    writeln!(out, "-- Generated at {}", provenance.timestamp).unwrap();
    writeln!(out).unwrap();

    for include in &includes {
        writeln!(out, "{include}").unwrap();
    }
    writeln!(out).unwrap();

    if options.library == LibraryMode::Embed {
        writeln!(out, "{}", LIBRARY.trim_end()).unwrap();
        writeln!(out).unwrap();
    }

    let channels: IndexSet<&String> = outputs.iter().flat_map(|o| o.channels.iter()).collect();
    if !channels.is_empty() {
        for channel in channels {
            writeln!(out, "{channel}").unwrap();
        }
        writeln!(out).unwrap();
    }

    for output in &outputs {
        writeln!(out, "{}", output.module).unwrap();
    }
    for output in &outputs {
        if let Some(sets) = &output.msg_sets {
            writeln!(out, "{sets}").unwrap();
        }
    }

    if !package.assertions.is_empty() {
        for assertion in &package.assertions {
            let text = render_assertion(package, assertion)?;
            writeln!(out, "-- {}", assertion.name).unwrap();
            writeln!(out, "{text}").unwrap();
        }
    }

    info!(
        package = %package.name,
        bytes = out.len(),
        "CSP-M generation complete"
    );
    Ok(out)
}

fn render_group<M: ComponentModel + ?Sized>(
    group: &Group,
    model: &M,
    options: &GeneratorOptions,
) -> CompileResult<GroupOutput> {
    let site = Site::group(&group.name);
    debug!(group = %group.name, "Compiling group");
    let resolver = ActorResolver::new(model, group);
    let inst = Instantiated::resolve(model, group, &options.external_definitions.module, &site)?;
    let form = target_form(model, &resolver, &inst, &site)?;
    let closed = inst.closed_scope(model);

    let interactions = group
        .interactions
        .iter()
        .map(|s| compile_interaction(model, &resolver, s, &closed, options.timed, &site))
        .collect::<CompileResult<Vec<CompiledInteraction>>>()?;

    let mut module = String::new();
    writeln!(module, "module {}", group.name).unwrap();
    writeln!(module, "exports").unwrap();
    writeln!(module, "  module open({})", inst.parameters().join(", ")).unwrap();
    writeln!(module, "  exports").unwrap();
    writeln!(module, "    Target = {}", form.process).unwrap();
    writeln!(module, "    Universe = {}", form.universe).unwrap();
    if options.timed {
        writeln!(module, "    TockUniverse = union(Universe, {{tock}})").unwrap();
    }
    writeln!(module, "  endmodule").unwrap();
    writeln!(
        module,
        "  instance closed = open({})",
        inst.closed_arguments().join(", ")
    )
    .unwrap();
    for compiled in &interactions {
        writeln!(module).unwrap();
        for line in &compiled.definition {
            writeln!(module, "  {line}").unwrap();
        }
    }
    writeln!(module, "endmodule").unwrap();

    let msg_sets = render_msg_sets(group, &resolver, &closed, &site)?;

    let mut includes = Vec::new();
    let mut scope_nodes = vec![group.target.node];
    if group.target.kind == TargetKind::Collection {
        scope_nodes.extend(resolver.target_nodes(&site)?);
    }
    for node in scope_nodes {
        if let Some(path) = model.include_path(node) {
            includes.push(include_line(&path));
        }
    }

    Ok(GroupOutput {
        channels: interactions.into_iter().flat_map(|c| c.channels).collect(),
        module,
        msg_sets,
        includes,
    })
}

/// `<Group>_MsgSets`, holding the named sets of a group.
fn render_msg_sets<M: ComponentModel + ?Sized>(
    group: &Group,
    resolver: &ActorResolver<'_, M>,
    constants: &dyn ExprScope,
    site: &Site,
) -> CompileResult<Option<String>> {
    let definitions: Vec<_> = group.sets.definitions().collect();
    if definitions.is_empty() {
        return Ok(None);
    }
    let message = |m: &Message, s: &Site| -> CompileResult<String> {
        resolver.channel(m, s)?.closure(m, constants, s)
    };
    let how = SetRendering {
        group: &group.name,
        universe: "Universe",
        message: &message,
    };
    let mut out = String::new();
    writeln!(out, "module {}", render::msg_sets_module(&group.name)).unwrap();
    writeln!(out, "exports").unwrap();
    writeln!(out, "  Universe = {}::closed::Universe", group.name).unwrap();
    for (name, id) in definitions {
        let set_site = site.detail(format!("message set {name}"));
        let text = render::render_set(&group.sets, id, &how, &set_site)?;
        writeln!(out, "  {name} = {text}").unwrap();
    }
    writeln!(out, "endmodule").unwrap();
    Ok(Some(out))
}

fn process_ref(package: &Package, process: ProcessRef, site: &Site) -> CompileResult<String> {
    match process {
        ProcessRef::Target(g) => {
            let group = package
                .group(g)
                .ok_or_else(|| site.dangling("group", g.0))?;
            Ok(format!("{}::closed::Target", group.name))
        }
        ProcessRef::Interaction { group: g, index } => {
            let group = package
                .group(g)
                .ok_or_else(|| site.dangling("group", g.0))?;
            let interaction = group
                .interactions
                .get(index)
                .ok_or_else(|| site.dangling("interaction", index))?;
            Ok(format!("{}::{}", group.name, interaction.name))
        }
    }
}

fn render_assertion(package: &Package, assertion: &Assertion) -> CompileResult<String> {
    let site = Site::group(&package.name).detail(format!("assertion {}", assertion.name));
    let not = if assertion.negated { "not " } else { "" };
    let checked = |p: ProcessRef| process_ref(package, p, &site);
    let divergences = assertion.model == SemanticModel::FailuresDivergences;
    Ok(match assertion.property {
        Property::Refines {
            spec,
            implementation,
        } => {
            let (op, suffix) = match assertion.model {
                SemanticModel::Traces => ("[T=", ""),
                SemanticModel::Failures => ("[F=", ""),
                SemanticModel::FailuresDivergences => ("[FD=", ""),
                SemanticModel::TickTock => ("[F=", " :[tau priority]: {tock}"),
            };
            format!(
                "assert {not}{} {op} {}{suffix}",
                checked(spec)?,
                checked(implementation)?
            )
        }
        Property::DeadlockFree(p) => {
            let m = if divergences { "FD" } else { "F" };
            format!("assert {not}{} :[deadlock free [{m}]]", checked(p)?)
        }
        Property::Deterministic(p) => {
            let m = if divergences { "FD" } else { "F" };
            format!("assert {not}{} :[deterministic [{m}]]", checked(p)?)
        }
        Property::DivergenceFree(p) => {
            format!("assert {not}{} :[divergence free]", checked(p)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tockcert_model::{GroupId, Interaction, Target};

    fn package() -> Package {
        let mut p = Package::new("P");
        let mut g = Group::new("G", Target::component(tockcert_model::NodeId(0)));
        g.add_interaction(Interaction::new("S", vec![]));
        p.add_group(g);
        p
    }

    fn assertion(property: Property, model: SemanticModel, negated: bool) -> Assertion {
        Assertion {
            name: "a".into(),
            property,
            model,
            negated,
        }
    }

    #[test]
    fn refinement_assertions_pick_the_model_operator() {
        let p = package();
        let refines = Property::Refines {
            spec: ProcessRef::Interaction {
                group: GroupId(0),
                index: 0,
            },
            implementation: ProcessRef::Target(GroupId(0)),
        };
        assert_eq!(
            render_assertion(&p, &assertion(refines.clone(), SemanticModel::Traces, false))
                .unwrap(),
            "assert G::S [T= G::closed::Target"
        );
        assert_eq!(
            render_assertion(&p, &assertion(refines, SemanticModel::TickTock, true)).unwrap(),
            "assert not G::S [F= G::closed::Target :[tau priority]: {tock}"
        );
    }

    #[test]
    fn property_assertions() {
        let p = package();
        let target = ProcessRef::Target(GroupId(0));
        assert_eq!(
            render_assertion(
                &p,
                &assertion(
                    Property::DeadlockFree(target),
                    SemanticModel::FailuresDivergences,
                    false
                )
            )
            .unwrap(),
            "assert G::closed::Target :[deadlock free [FD]]"
        );
        assert_eq!(
            render_assertion(
                &p,
                &assertion(Property::Deterministic(target), SemanticModel::Failures, false)
            )
            .unwrap(),
            "assert G::closed::Target :[deterministic [F]]"
        );
        assert_eq!(
            render_assertion(
                &p,
                &assertion(Property::DivergenceFree(target), SemanticModel::Traces, false)
            )
            .unwrap(),
            "assert G::closed::Target :[divergence free]"
        );
    }

    #[test]
    fn dangling_process_references_are_reported() {
        let p = package();
        let bad = Property::DeadlockFree(ProcessRef::Interaction {
            group: GroupId(0),
            index: 3,
        });
        let err = render_assertion(&p, &assertion(bad, SemanticModel::Failures, false))
            .unwrap_err();
        assert!(err.to_string().contains("Dangling interaction reference #3"));
    }
}
