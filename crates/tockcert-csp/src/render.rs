//! CSP-M rendering helpers shared by every compilation stage.

use indexmap::IndexSet;

use tockcert_model::{
    Argument, ConstId, Expr, Message, MessageSet, MessageSetArena, SetId, SlotId, Type, UnOp,
};

use crate::errors::{CompileResult, Site};

/// Resolves the free names of an expression.
pub trait ExprScope {
    fn constant(&self, id: ConstId, site: &Site) -> CompileResult<String>;

    fn slot(&self, id: SlotId, site: &Site) -> CompileResult<String> {
        Err(site.unsupported(format!("memory slot #{} outside an interaction", id.0)))
    }
}

/// Render an expression; compound expressions are fully parenthesised.
pub fn render_expr(expr: &Expr, scope: &dyn ExprScope, site: &Site) -> CompileResult<String> {
    Ok(match expr {
        Expr::Int(n) if *n < 0 => format!("({n})"),
        Expr::Int(n) => n.to_string(),
        Expr::Bool(b) => b.to_string(),
        Expr::Constant(id) => scope.constant(*id, site)?,
        Expr::Slot(id) => scope.slot(*id, site)?,
        Expr::Unary { op, operand } => {
            let inner = render_expr(operand, scope, site)?;
            match op {
                UnOp::Neg => format!("(-{inner})"),
                UnOp::Not => format!("(not {inner})"),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = render_expr(lhs, scope, site)?;
            let r = render_expr(rhs, scope, site)?;
            format!("({l} {op} {r})")
        }
    })
}

pub fn csp_type(ty: &Type) -> String {
    match ty {
        Type::Int => "Int".to_string(),
        Type::Nat => "Nat".to_string(),
        Type::Bool => "Bool".to_string(),
        Type::Named(name) => name.clone(),
    }
}

/// Value a memory cell starts from when nothing else is given.
pub fn default_value(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Int | Type::Nat => Some("0"),
        Type::Bool => Some("false"),
        Type::Named(_) => None,
    }
}

pub fn binding_name(slot: &str, index: usize) -> String {
    format!("Bnd__{slot}__{index}")
}

pub fn memory_channels(group: &str, interaction: &str, slot: &str) -> (String, String) {
    (
        format!("{group}__{interaction}__get__{slot}"),
        format!("{group}__{interaction}__set__{slot}"),
    )
}

pub fn until_channel(group: &str, interaction: &str) -> String {
    format!("{group}__{interaction}__until_sync")
}

pub fn msg_sets_module(group: &str) -> String {
    format!("{group}_MsgSets")
}

pub fn actors_datatype(interaction: &str) -> String {
    format!("{interaction}_Actors")
}

pub fn actor_constructor(interaction: &str, actor: &str) -> String {
    format!("{interaction}_{actor}")
}

/// `P1 ; P2 ; ...`, or `SKIP` for nothing.
pub fn seq(parts: &[String]) -> String {
    if parts.is_empty() {
        "SKIP".to_string()
    } else {
        parts.join(" ; ")
    }
}

/// Prefix `body` with memory loads, parenthesising only when needed.
pub fn with_loads(loads: &str, body: String) -> String {
    if loads.is_empty() {
        body
    } else {
        format!("({loads}{body})")
    }
}

/// `{| a, b |}` over channel expressions, `{}` when there are none.
pub fn channel_set<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let items: IndexSet<String> = items.into_iter().map(Into::into).collect();
    if items.is_empty() {
        "{}".to_string()
    } else {
        let joined: Vec<&str> = items.iter().map(String::as_str).collect();
        format!("{{| {} |}}", joined.join(", "))
    }
}

/// Channel part of a message (`ns::e.out`, `ns::opCall`), without arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventChannel {
    pub base: String,
}

impl EventChannel {
    /// Full prefix for a process: values as `.v`, wildcards as inputs.
    pub fn prefix(
        &self,
        message: &Message,
        scope: &dyn ExprScope,
        slot_names: &dyn Fn(SlotId, &Site) -> CompileResult<String>,
        site: &Site,
    ) -> CompileResult<String> {
        let mut out = self.base.clone();
        for (i, arg) in message.arguments.iter().enumerate() {
            let arg_site = site.detail(format!("argument {i}"));
            match arg {
                Argument::Expr(e) => {
                    out.push('.');
                    out.push_str(&render_expr(e, scope, &arg_site)?);
                }
                Argument::Wildcard { binding: Some(slot) } => {
                    out.push('?');
                    out.push_str(&slot_names(*slot, &arg_site)?);
                }
                Argument::Wildcard { binding: None } => out.push_str("?_"),
            }
        }
        Ok(out)
    }

    /// Prefix closure up to the first argument that is not a fixed value.
    pub fn closure(
        &self,
        message: &Message,
        scope: &dyn ExprScope,
        site: &Site,
    ) -> CompileResult<String> {
        let mut out = self.base.clone();
        for arg in &message.arguments {
            match arg {
                Argument::Expr(e) if e.slots().is_empty() => {
                    out.push('.');
                    out.push_str(&render_expr(e, scope, site)?);
                }
                _ => break,
            }
        }
        Ok(out)
    }
}

/// How the non-structural parts of a message set are spelled.
pub struct SetRendering<'a> {
    pub group: &'a str,
    pub universe: &'a str,
    pub message: &'a dyn Fn(&Message, &Site) -> CompileResult<String>,
}

pub fn render_set(
    arena: &MessageSetArena,
    id: SetId,
    how: &SetRendering<'_>,
    site: &Site,
) -> CompileResult<String> {
    let mut stack = Vec::new();
    render_set_inner(arena, id, how, site, &mut stack)
}

fn render_set_inner(
    arena: &MessageSetArena,
    id: SetId,
    how: &SetRendering<'_>,
    site: &Site,
    stack: &mut Vec<SetId>,
) -> CompileResult<String> {
    if stack.contains(&id) {
        return Err(site.unsupported(format!("cyclic message set #{}", id.0)));
    }
    let node = arena
        .get(id)
        .ok_or_else(|| site.dangling("message set", id.0))?;
    Ok(match node {
        MessageSet::Universe => how.universe.to_string(),
        MessageSet::Extensional(messages) => {
            let rendered = messages
                .iter()
                .map(|m| (how.message)(m, site))
                .collect::<CompileResult<Vec<_>>>()?;
            channel_set(rendered)
        }
        MessageSet::NamedRef(name) => format!("{}::{name}", msg_sets_module(how.group)),
        MessageSet::Binary { lhs, op, rhs } => {
            stack.push(id);
            let l = render_set_inner(arena, *lhs, how, site, stack)?;
            let r = render_set_inner(arena, *rhs, how, site, stack)?;
            stack.pop();
            format!("{op}({l}, {r})")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tockcert_model::{BinOp, Edge};

    struct Names;

    impl ExprScope for Names {
        fn constant(&self, id: ConstId, _site: &Site) -> CompileResult<String> {
            Ok(format!("k{}", id.0))
        }
    }

    fn site() -> Site {
        Site::group("G")
    }

    #[test]
    fn expressions_are_parenthesised() {
        let e = Expr::binary(
            BinOp::And,
            Expr::binary(BinOp::Lt, Expr::Constant(ConstId(1)), Expr::Int(-2)),
            Expr::unary(UnOp::Not, Expr::Bool(false)),
        );
        assert_eq!(
            render_expr(&e, &Names, &site()).unwrap(),
            "((k1 < (-2)) and (not false))"
        );
    }

    #[test]
    fn slots_need_an_interaction_scope() {
        let err = render_expr(&Expr::Slot(SlotId(0)), &Names, &site()).unwrap_err();
        assert!(err.to_string().contains("memory slot #0"));
    }

    #[test]
    fn prefix_and_closure() {
        let chan = EventChannel {
            base: "M::e.in".into(),
        };
        let m = Message::event(
            Edge::Implicit,
            "e",
            vec![
                Argument::Expr(Expr::Int(3)),
                Argument::Wildcard {
                    binding: Some(SlotId(0)),
                },
                Argument::Wildcard { binding: None },
            ],
        );
        let names = |slot: SlotId, _: &Site| -> CompileResult<String> {
            Ok(binding_name("x", slot.0))
        };
        assert_eq!(
            chan.prefix(&m, &Names, &names, &site()).unwrap(),
            "M::e.in.3?Bnd__x__0?_"
        );
        assert_eq!(chan.closure(&m, &Names, &site()).unwrap(), "M::e.in.3");
    }

    #[test]
    fn sets_render_structurally() {
        let mut arena = MessageSetArena::new();
        let u = arena.universe();
        let e = arena.empty();
        let n = arena.named("Calls");
        let d = arena.difference(u, n);
        let root = arena.union(d, e);
        let message = |_: &Message, _: &Site| -> CompileResult<String> {
            Ok(String::from("M::e.in"))
        };
        let how = SetRendering {
            group: "G",
            universe: "closed::Universe",
            message: &message,
        };
        assert_eq!(
            render_set(&arena, root, &how, &site()).unwrap(),
            "union(diff(closed::Universe, G_MsgSets::Calls), {})"
        );
        assert!(render_set(&arena, SetId(42), &how, &site()).is_err());
    }

    #[test]
    fn channel_sets_deduplicate() {
        assert_eq!(channel_set(["a", "b", "a"]), "{| a, b |}");
        assert_eq!(channel_set(Vec::<String>::new()), "{}");
        assert_eq!(seq(&[]), "SKIP");
    }
}
