//! The CSP-M combinator library generated files rely on.

/// Library text, as written to [`LIBRARY_FILE`] or embedded in the output.
pub const LIBRARY: &str = include_str!("tockcert_defs.csp");

/// Default name generated files include the library by.
pub const LIBRARY_FILE: &str = "tockcert_defs.csp";

/// Names the library defines: channels, then processes and sets, in order.
pub fn defined_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    for line in LIBRARY.lines() {
        if let Some(channel) = line.strip_prefix("channel ") {
            names.extend(channel.split(',').map(str::trim));
            continue;
        }
        if line.starts_with(|c: char| c.is_ascii_uppercase()) {
            let end = line
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(line.len());
            let name = &line[..end];
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_emitted_combinator_is_defined() {
        let names = defined_names();
        for wanted in [
            "tock",
            "terminate",
            "Nat",
            "TSTOP",
            "WAIT",
            "Cert_loop",
            "Cert_loop_atleast",
            "Cert_loop_exactly",
            "Cert_loop_between",
            "Cert_cold",
            "Cert_opt",
            "Cert_deadline",
            "Cert_duration",
            "Cert_duration_ub",
            "Cert_until",
            "Cert_var",
            "Cert_shared_var",
            "Cert_with_memory",
            "Cert_hide_termination",
        ] {
            assert!(names.contains(&wanted), "library does not define {wanted}");
        }
    }

    #[test]
    fn names_are_listed_once() {
        let names = defined_names();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
        assert_eq!(names.first(), Some(&"tock"));
    }

    #[test]
    fn termination_is_hidden_not_refused() {
        assert!(LIBRARY
            .lines()
            .any(|l| l == "Cert_hide_termination(P) = P \\ {terminate}"));
    }
}
