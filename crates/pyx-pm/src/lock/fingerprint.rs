use sha2::{Digest, Sha256};

use crate::requirement::Requirement;

/// Canonical lines of a requirement set: normalized, sorted and
/// deduplicated, so declaration order and spelling do not matter.
pub fn canonical_requirements(requirements: &[Requirement]) -> Vec<String> {
    let mut lines: Vec<String> = requirements
        .iter()
        .map(|requirement| {
            let normalized = requirement.normalize();
            match &normalized.source {
                Some(source) => format!("{} @ {}", normalized, source),
                None => normalized.to_string(),
            }
        })
        .collect();
    lines.sort();
    lines.dedup();
    lines
}

/// Fingerprint of a requirement set, written `sha256:<hex>`
pub fn fingerprint(requirements: &[Requirement]) -> String {
    let mut hasher = Sha256::new();
    for line in canonical_requirements(requirements) {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(input: &[&str]) -> Vec<Requirement> {
        input.iter().map(|r| Requirement::parse(r).unwrap()).collect()
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint(&reqs(&["requests>=2"]));
        assert!(fp.starts_with("sha256:"));
        assert_eq!(fp.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_order_and_spelling_do_not_matter() {
        let a = fingerprint(&reqs(&["Requests>=2,<3", "flask"]));
        let b = fingerprint(&reqs(&["flask", "requests<3,>=2", "flask"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_constraints_change_fingerprint() {
        let a = fingerprint(&reqs(&["requests>=2"]));
        let b = fingerprint(&reqs(&["requests>=2.1"]));
        assert_ne!(a, b);

        let pinned = vec![Requirement::parse("requests>=2").unwrap().with_source("internal")];
        assert_ne!(a, fingerprint(&pinned));
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(
            fingerprint(&[]),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
