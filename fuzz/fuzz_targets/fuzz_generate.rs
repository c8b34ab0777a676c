#![no_main]
use libfuzzer_sys::fuzz_target;
use tockcert_model::{ComponentGraph, Package};

#[derive(serde::Deserialize)]
struct Document {
    components: ComponentGraph,
    package: Package,
}

fuzz_target!(|data: &[u8]| {
    if let Ok(mut doc) = serde_json::from_slice::<Document>(data) {
        let options = tockcert_csp::GeneratorOptions {
            timestamp: Some("fuzz".into()),
            ..Default::default()
        };
        let _ = tockcert_csp::generate(&mut doc.package, &doc.components, &options);
    }
});
