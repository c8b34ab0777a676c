#![no_main]
use libfuzzer_sys::fuzz_target;
use tockcert_model::{MessageSetArena, SetId};

fuzz_target!(|data: &[u8]| {
    if let Ok(mut arena) = serde_json::from_slice::<MessageSetArena>(data) {
        for i in 0..arena.len() {
            tockcert_csp::algebra::optimise_in_place(&mut arena, SetId(i));
            let _ = arena.term(SetId(i));
        }
    }
});
