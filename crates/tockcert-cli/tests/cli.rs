//! End-to-end tests driving the `tockcert` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const COMPONENTS: &str = r#"{
    "nodes": [
        {
            "name": "M", "kind": "Module", "parent": null, "children": [1],
            "constants": [], "variables": [], "required_variables": [],
            "events": [], "operations": [], "connections": [], "include": null
        },
        {
            "name": "C", "kind": "Controller", "parent": 0, "children": [],
            "constants": [0], "variables": [], "required_variables": [],
            "events": [{"name": "e", "ty": "Int"}, {"name": "f", "ty": null}],
            "operations": [], "connections": [], "include": null
        }
    ],
    "constants": [{"name": "k", "ty": "Int", "owner": 1, "initial": null}],
    "variables": []
}"#;

fn document(assertion_group: usize) -> String {
    format!(
        r#"{{
    "components": {COMPONENTS},
    "package": {{
        "name": "P",
        "imports": [],
        "groups": [{{
            "name": "G",
            "target": {{"node": 1, "kind": "Component"}},
            "instantiation": {{"assignments": []}},
            "actors": [{{"name": "T", "kind": "Target"}}, {{"name": "W", "kind": "World"}}],
            "interactions": [{{
                "name": "S",
                "actors": [0, 1],
                "slots": [],
                "fragments": [{{"Occurrence": {{"Message": {{
                    "message": {{
                        "edge": {{"Directional": {{"direction": "Inbound"}}}},
                        "topic": {{"Event": {{"name": "e"}}}},
                        "arguments": [{{"Expr": {{"Int": 3}}}}]
                    }},
                    "temperature": "Hot"
                }}}}}}],
                "body": [0]
            }}],
            "sets": {{"nodes": [], "definitions": {{}}}}
        }}],
        "assertions": [{{
            "name": "S holds",
            "property": {{"Refines": {{
                "spec": {{"Interaction": {{"group": {assertion_group}, "index": 0}}}},
                "implementation": {{"Target": 0}}
            }}}},
            "model": "Traces",
            "negated": false
        }}]
    }}
}}"#
    )
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tockcert_cli_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn run_tockcert(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tockcert"))
        .args(args)
        .output()
        .expect("failed to execute tockcert")
}

fn write_document(dir: &Path, text: &str) -> String {
    let path = dir.join("contracts.json");
    std::fs::write(&path, text).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn generate_writes_csp_to_stdout() {
    let dir = scratch_dir("stdout");
    let input = write_document(&dir, &document(0));
    let output = run_tockcert(&["generate", &input, "--timestamp", "2024-05-01T12:00:00+00:00"]);
    let _ = std::fs::remove_dir_all(&dir);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "generate failed: {stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = env!("CARGO_PKG_VERSION");
    assert!(stdout.starts_with(&format!(
        "-- Generated by tockcert {version}\n-- Generated at 2024-05-01T12:00:00+00:00\n"
    )));
    assert!(stdout.contains("    Target = M::C::D__(const_M_C_k)\n"));
    assert!(stdout.contains("  S = (M::C::e.in.3 -> SKIP) ; TSTOP\n"));
    assert!(stdout.ends_with("-- S holds\nassert G::S [T= G::closed::Target\n"));
}

#[test]
fn generate_honours_output_and_library_flags() {
    let dir = scratch_dir("output");
    let input = write_document(&dir, &document(0));
    let target = dir.join("out").join("contracts.csp");
    let output = run_tockcert(&[
        "generate",
        &input,
        "-o",
        target.to_str().unwrap(),
        "--timestamp",
        "T",
        "--untimed",
        "--library-path",
        "lib/defs.csp",
        "--definitions-module",
        "defs",
        "--definitions-file",
        "defs.csp",
    ]);
    let written = std::fs::read_to_string(&target);
    let _ = std::fs::remove_dir_all(&dir);

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let written = written.expect("output file missing");
    assert!(written.contains("include \"lib/defs.csp\"\ninclude \"defs.csp\"\n"));
    assert!(written.contains("instance closed = open(defs::const_M_C_k)"));
    assert!(written.contains("  S = (M::C::e.in.3 -> SKIP) ; STOP\n"));
    assert!(!written.contains("TockUniverse"));
}

#[test]
fn generate_reports_compile_errors() {
    let dir = scratch_dir("dangling");
    let input = write_document(&dir, &document(5));
    let output = run_tockcert(&["generate", &input]);
    let _ = std::fs::remove_dir_all(&dir);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Dangling group reference #5"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn generate_rejects_malformed_documents() {
    let dir = scratch_dir("malformed");
    let input = write_document(&dir, "{\"components\": []}");
    let output = run_tockcert(&["generate", &input]);
    let _ = std::fs::remove_dir_all(&dir);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is not a valid contract document"));
}

#[test]
fn library_prints_definitions() {
    let output = run_tockcert(&["library"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cert_with_memory(P, M, A) ="));

    let output = run_tockcert(&["library", "--names"]);
    assert!(output.status.success());
    let names = String::from_utf8_lossy(&output.stdout);
    assert_eq!(names.lines().next(), Some("tock"));
    assert!(names.lines().any(|l| l == "Cert_until"));
}
