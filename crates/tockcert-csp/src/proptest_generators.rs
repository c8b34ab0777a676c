//! Proptest strategies for message-set trees.

use proptest::prelude::*;

use tockcert_model::{Edge, Message, MessageSetArena, SetId, SetOp};

const NAMES: [&str; 3] = ["A", "B", "C"];

#[derive(Debug, Clone)]
enum Shape {
    Universe,
    Extensional(Vec<u8>),
    Named(usize),
    Binary(Box<Shape>, SetOp, Box<Shape>),
}

fn arb_op() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        Just(SetOp::Union),
        Just(SetOp::Intersection),
        Just(SetOp::Difference),
    ]
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        Just(Shape::Universe),
        proptest::collection::vec(0..4u8, 0..3).prop_map(Shape::Extensional),
        (0..NAMES.len()).prop_map(Shape::Named),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        (inner.clone(), arb_op(), inner)
            .prop_map(|(l, op, r)| Shape::Binary(Box::new(l), op, Box::new(r)))
    })
}

fn build(arena: &mut MessageSetArena, shape: &Shape) -> SetId {
    match shape {
        Shape::Universe => arena.universe(),
        Shape::Extensional(ids) => arena.extensional(
            ids.iter()
                .map(|i| Message::event(Edge::Implicit, format!("m{i}"), Vec::new()))
                .collect(),
        ),
        Shape::Named(i) => arena.named(NAMES[*i]),
        Shape::Binary(l, op, r) => {
            let l = build(arena, l);
            let r = build(arena, r);
            arena.binary(l, *op, r)
        }
    }
}

/// Strategy for an arena plus the root of one set expression in it.
///
/// `A` and `B` may be defined (`A` possibly as the root itself, which makes
/// references to it cyclic); `C` is never defined.
pub fn arb_message_set() -> impl Strategy<Value = (MessageSetArena, SetId)> {
    (
        arb_shape(),
        proptest::option::of(arb_shape()),
        proptest::option::of(arb_shape()),
        any::<bool>(),
    )
        .prop_map(|(root, def_a, def_b, a_is_root)| {
            let mut arena = MessageSetArena::new();
            let root = build(&mut arena, &root);
            if a_is_root {
                arena.define(NAMES[0], root);
            } else if let Some(shape) = &def_a {
                let id = build(&mut arena, shape);
                arena.define(NAMES[0], id);
            }
            if let Some(shape) = &def_b {
                let id = build(&mut arena, shape);
                arena.define(NAMES[1], id);
            }
            (arena, root)
        })
}
