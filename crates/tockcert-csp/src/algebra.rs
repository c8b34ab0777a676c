//! Conservative membership predicates and the message-set optimiser.
//!
//! `active` ("maybe non-empty") and `universal` ("maybe everything") are
//! computed structurally. Named references defer to their referent; a
//! missing or cyclic referent is neither active nor universal.
//!
//! The optimiser only trusts *visible* predicates, evaluated in three-valued
//! logic that yields `None` as soon as a named reference is crossed, so a
//! later change to a named definition is still observed through the
//! reference.

use tracing::trace;

use tockcert_model::{Fragment, Group, MessageSet, MessageSetArena, SetId, SetOp};

/// `(active, universal)` of the set rooted at `id`.
pub fn predicates(arena: &MessageSetArena, id: SetId) -> (bool, bool) {
    let mut resolving = Vec::new();
    predicates_inner(arena, id, &mut resolving, &mut Vec::new())
}

pub fn active(arena: &MessageSetArena, id: SetId) -> bool {
    predicates(arena, id).0
}

pub fn universal(arena: &MessageSetArena, id: SetId) -> bool {
    predicates(arena, id).1
}

// Reference cycles are cut by name, so a reference evaluates the same
// wherever it sits in a tree. `ids` only guards against malformed arenas.
fn predicates_inner<'a>(
    arena: &'a MessageSetArena,
    id: SetId,
    resolving: &mut Vec<&'a str>,
    ids: &mut Vec<SetId>,
) -> (bool, bool) {
    if ids.contains(&id) {
        return (false, false);
    }
    let Some(node) = arena.get(id) else {
        return (false, false);
    };
    match node {
        MessageSet::Universe => (true, true),
        MessageSet::Extensional(messages) => (!messages.is_empty(), false),
        MessageSet::NamedRef(name) => {
            if resolving.contains(&name.as_str()) {
                return (false, false);
            }
            let Some(referent) = arena.lookup(name) else {
                return (false, false);
            };
            resolving.push(name.as_str());
            let result = predicates_inner(arena, referent, resolving, &mut Vec::new());
            resolving.pop();
            result
        }
        MessageSet::Binary { lhs, op, rhs } => {
            ids.push(id);
            let (al, ul) = predicates_inner(arena, *lhs, resolving, ids);
            let (ar, ur) = predicates_inner(arena, *rhs, resolving, ids);
            ids.pop();
            match op {
                SetOp::Union => (al || ar, ul || ur),
                SetOp::Intersection => (al && ar, ul && ur),
                SetOp::Difference => (al && !ur, ul && !ar),
            }
        }
    }
}

/// Predicates decidable without crossing a named reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visible {
    pub active: Option<bool>,
    pub universal: Option<bool>,
}

impl Visible {
    const OPAQUE: Visible = Visible {
        active: None,
        universal: None,
    };

    fn known(active: bool, universal: bool) -> Self {
        Visible {
            active: Some(active),
            universal: Some(universal),
        }
    }

    pub fn inactive(self) -> bool {
        self.active == Some(false)
    }

    pub fn is_universal(self) -> bool {
        self.universal == Some(true)
    }
}

fn kleene_and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn kleene_or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn kleene_not(a: Option<bool>) -> Option<bool> {
    a.map(|v| !v)
}

pub fn visible(arena: &MessageSetArena, id: SetId) -> Visible {
    let mut stack = Vec::new();
    visible_inner(arena, id, &mut stack)
}

fn visible_inner(arena: &MessageSetArena, id: SetId, stack: &mut Vec<SetId>) -> Visible {
    if stack.contains(&id) {
        return Visible::known(false, false);
    }
    let Some(node) = arena.get(id) else {
        return Visible::known(false, false);
    };
    match node {
        MessageSet::Universe => Visible::known(true, true),
        MessageSet::Extensional(messages) => Visible::known(!messages.is_empty(), false),
        MessageSet::NamedRef(_) => Visible::OPAQUE,
        MessageSet::Binary { lhs, op, rhs } => {
            stack.push(id);
            let l = visible_inner(arena, *lhs, stack);
            let r = visible_inner(arena, *rhs, stack);
            stack.pop();
            match op {
                SetOp::Union => Visible {
                    active: kleene_or(l.active, r.active),
                    universal: kleene_or(l.universal, r.universal),
                },
                SetOp::Intersection => Visible {
                    active: kleene_and(l.active, r.active),
                    universal: kleene_and(l.universal, r.universal),
                },
                SetOp::Difference => Visible {
                    active: kleene_and(l.active, kleene_not(r.universal)),
                    universal: kleene_and(l.universal, kleene_not(r.active)),
                },
            }
        }
    }
}

/// Optimise the set rooted at `id`, returning the root of the optimised form.
///
/// New nodes are appended to the arena; existing nodes are never modified.
pub fn optimise(arena: &mut MessageSetArena, id: SetId) -> SetId {
    let mut stack = Vec::new();
    optimise_inner(arena, id, &mut stack)
}

fn optimise_inner(arena: &mut MessageSetArena, id: SetId, stack: &mut Vec<SetId>) -> SetId {
    if stack.contains(&id) {
        return id;
    }
    let Some(node) = arena.get(id).cloned() else {
        return id;
    };
    if matches!(node, MessageSet::NamedRef(_)) {
        return id;
    }
    let vis = visible(arena, id);
    if vis.inactive() {
        return ensure_empty(arena, id, &node);
    }
    if vis.is_universal() {
        return ensure_universe(arena, id, &node);
    }
    match node {
        MessageSet::Universe | MessageSet::Extensional(_) | MessageSet::NamedRef(_) => id,
        MessageSet::Binary { lhs, op, rhs } => {
            stack.push(id);
            let l = optimise_inner(arena, lhs, stack);
            let r = optimise_inner(arena, rhs, stack);
            stack.pop();
            simplify(arena, op, l, r)
        }
    }
}

fn ensure_empty(arena: &mut MessageSetArena, id: SetId, node: &MessageSet) -> SetId {
    match node {
        MessageSet::Extensional(ms) if ms.is_empty() => id,
        _ => {
            trace!(set = id.0, "message set is inactive; rewriting to empty");
            arena.empty()
        }
    }
}

fn ensure_universe(arena: &mut MessageSetArena, id: SetId, node: &MessageSet) -> SetId {
    match node {
        MessageSet::Universe => id,
        _ => {
            trace!(set = id.0, "message set is universal; rewriting to universe");
            arena.universe()
        }
    }
}

/// Local rewrite of `l op r` over already optimised operands.
fn simplify(arena: &mut MessageSetArena, op: SetOp, l: SetId, r: SetId) -> SetId {
    let vl = visible(arena, l);
    let vr = visible(arena, r);
    match op {
        SetOp::Union => {
            if vl.is_universal() || vr.is_universal() {
                return arena.universe();
            }
            if vl.inactive() {
                return r;
            }
            if vr.inactive() {
                return l;
            }
            if let (Some(MessageSet::Extensional(a)), Some(MessageSet::Extensional(b))) =
                (arena.get(l), arena.get(r))
            {
                let mut merged = a.clone();
                for m in b {
                    if !merged.contains(m) {
                        merged.push(m.clone());
                    }
                }
                trace!(lhs = l.0, rhs = r.0, "merged extensional union");
                return arena.extensional(merged);
            }
            arena.union(l, r)
        }
        SetOp::Intersection => {
            if vl.inactive() || vr.inactive() {
                return arena.empty();
            }
            if vl.is_universal() && vr.is_universal() {
                return arena.universe();
            }
            if vl.is_universal() {
                return r;
            }
            if vr.is_universal() {
                return l;
            }
            arena.intersection(l, r)
        }
        SetOp::Difference => simplify_difference(arena, l, r),
    }
}

/// `l \ r`, with `(x \ y) \ z` flattened to `x \ (y ∪ z)` first.
fn simplify_difference(arena: &mut MessageSetArena, mut l: SetId, mut r: SetId) -> SetId {
    let mut flattened = Vec::new();
    while let Some(MessageSet::Binary {
        lhs: x,
        op: SetOp::Difference,
        rhs: y,
    }) = arena.get(l).cloned()
    {
        if flattened.contains(&l) {
            break;
        }
        trace!(set = l.0, "flattened nested difference");
        flattened.push(l);
        r = simplify(arena, SetOp::Union, y, r);
        l = x;
    }
    let vl = visible(arena, l);
    let vr = visible(arena, r);
    if vl.inactive() || vr.is_universal() {
        return arena.empty();
    }
    if vr.inactive() {
        return l;
    }
    arena.difference(l, r)
}

/// Optimise the set at `id` and store the result at `id` itself.
///
/// Every holder of `id` observes the optimised form afterwards.
pub fn optimise_in_place(arena: &mut MessageSetArena, id: SetId) {
    let optimised = optimise(arena, id);
    if optimised == id {
        return;
    }
    if let Some(node) = arena.get(optimised).cloned() {
        arena.replace(id, node);
    }
}

/// Optimise every named definition and every `Until` intra set of a group.
pub fn optimise_group(group: &mut Group) {
    let definitions: Vec<SetId> = group.sets.definitions().map(|(_, id)| id).collect();
    for id in definitions {
        optimise_in_place(&mut group.sets, id);
    }
    let intra: Vec<SetId> = group
        .interactions
        .iter()
        .flat_map(|interaction| interaction.fragments.iter())
        .filter_map(|fragment| match fragment {
            Fragment::Until { intra, .. } => Some(*intra),
            _ => None,
        })
        .collect();
    for id in intra {
        optimise_in_place(&mut group.sets, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proptest_generators::arb_message_set;
    use proptest::prelude::*;
    use tockcert_model::{Edge, Message, SetTerm};

    fn msg(name: &str) -> Message {
        Message::event(Edge::Implicit, name, Vec::new())
    }

    struct Fixture {
        arena: MessageSetArena,
        e: SetId,
        u: SetId,
        s: SetId,
    }

    fn fixture() -> Fixture {
        let mut arena = MessageSetArena::new();
        let e = arena.empty();
        let u = arena.universe();
        let s = arena.extensional(vec![msg("m")]);
        Fixture { arena, e, u, s }
    }

    #[test]
    fn truth_tables() {
        let Fixture { mut arena, e, u, s } = fixture();
        let union_ue = arena.union(u, e);
        let inter_se = arena.intersection(s, e);
        let diff_us = arena.difference(u, s);
        let diff_su = arena.difference(s, u);
        assert!(active(&arena, union_ue));
        assert!(universal(&arena, union_ue));
        assert!(!active(&arena, inter_se));
        assert!(!universal(&arena, inter_se));
        assert!(active(&arena, diff_us));
        assert!(!universal(&arena, diff_us));
        assert!(!active(&arena, diff_su));
    }

    #[test]
    fn extensional_is_never_universal() {
        let Fixture { arena, s, .. } = fixture();
        assert_eq!(predicates(&arena, s), (true, false));
    }

    #[test]
    fn absent_and_cyclic_named_refs_are_inert() {
        let mut arena = MessageSetArena::new();
        let missing = arena.named("Nope");
        let a = arena.named("A");
        let u = arena.universe();
        let body = arena.union(a, u);
        arena.define("A", a);
        assert_eq!(predicates(&arena, missing), (false, false));
        assert_eq!(predicates(&arena, a), (false, false));
        assert_eq!(predicates(&arena, body), (true, true));
    }

    #[test]
    fn named_refs_defer_to_referent() {
        let mut arena = MessageSetArena::new();
        let u = arena.universe();
        arena.define("All", u);
        let r = arena.named("All");
        assert_eq!(predicates(&arena, r), (true, true));
        assert_eq!(visible(&arena, r), Visible::OPAQUE);
    }

    #[test]
    fn named_refs_are_opaque_to_the_optimiser() {
        let mut arena = MessageSetArena::new();
        let e = arena.empty();
        arena.define("Nothing", e);
        let r = arena.named("Nothing");
        assert_eq!(optimise(&mut arena, r), r);
        // A union with a reference keeps the reference even though it is empty.
        let s = arena.extensional(vec![msg("m")]);
        let root = arena.union(r, s);
        let out = optimise(&mut arena, root);
        assert_eq!(
            arena.term(out),
            SetTerm::Binary(
                Box::new(SetTerm::NamedRef("Nothing".into())),
                SetOp::Union,
                Box::new(SetTerm::Extensional(vec![msg("m")]))
            )
        );
    }

    #[test]
    fn union_of_extensionals_merges_without_duplicates() {
        let mut arena = MessageSetArena::new();
        let a = arena.extensional(vec![msg("a"), msg("b")]);
        let b = arena.extensional(vec![msg("b"), msg("c")]);
        let root = arena.union(a, b);
        let out = optimise(&mut arena, root);
        assert_eq!(
            arena.term(out),
            SetTerm::Extensional(vec![msg("a"), msg("b"), msg("c")])
        );
    }

    #[test]
    fn inactive_and_universal_collapse() {
        let Fixture { mut arena, e, u, s } = fixture();
        let inter = arena.intersection(s, e);
        let out = optimise(&mut arena, inter);
        assert_eq!(arena.term(out), SetTerm::Extensional(Vec::new()));
        let union = arena.union(s, u);
        let out = optimise(&mut arena, union);
        assert_eq!(arena.term(out), SetTerm::Universe);
    }

    #[test]
    fn nested_difference_is_flattened() {
        let mut arena = MessageSetArena::new();
        let x = arena.named("X");
        let y = arena.extensional(vec![msg("y")]);
        let z = arena.extensional(vec![msg("z")]);
        let inner = arena.difference(x, y);
        let outer = arena.difference(inner, z);
        let out = optimise(&mut arena, outer);
        assert_eq!(
            arena.term(out),
            SetTerm::Binary(
                Box::new(SetTerm::NamedRef("X".into())),
                SetOp::Difference,
                Box::new(SetTerm::Extensional(vec![msg("y"), msg("z")]))
            )
        );
    }

    #[test]
    fn in_place_rewrite_is_visible_through_the_original_id() {
        let Fixture { mut arena, e, s, .. } = fixture();
        let root = arena.union(s, e);
        optimise_in_place(&mut arena, root);
        assert_eq!(arena.term(root), SetTerm::Extensional(vec![msg("m")]));
    }

    #[test]
    fn dangling_indices_are_left_alone() {
        let mut arena = MessageSetArena::new();
        assert_eq!(optimise(&mut arena, SetId(9)), SetId(9));
        assert!(arena.is_empty());
    }

    proptest! {
        #[test]
        fn optimise_is_idempotent((mut arena, root) in arb_message_set()) {
            let once = optimise(&mut arena, root);
            let twice = optimise(&mut arena, once);
            prop_assert_eq!(arena.term(once), arena.term(twice));
        }

        #[test]
        fn optimise_preserves_predicates((mut arena, root) in arb_message_set()) {
            let before = predicates(&arena, root);
            let out = optimise(&mut arena, root);
            prop_assert_eq!(predicates(&arena, out), before);
        }

        #[test]
        fn visible_predicates_agree_with_full_predicates((arena, root) in arb_message_set()) {
            let (a, u) = predicates(&arena, root);
            let vis = visible(&arena, root);
            if let Some(va) = vis.active {
                prop_assert_eq!(va, a);
            }
            if let Some(vu) = vis.universal {
                prop_assert_eq!(vu, u);
            }
        }

        #[test]
        fn universal_implies_active((arena, root) in arb_message_set()) {
            let (a, u) = predicates(&arena, root);
            prop_assert!(!u || a);
        }
    }
}
