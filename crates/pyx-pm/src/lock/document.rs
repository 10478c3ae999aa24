use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;
use pyx_pep440::Version;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::fingerprint::fingerprint;
use crate::hash::{ArtifactHash, HashAlgorithm};
use crate::requirement::{MarkerTree, PackageName, Requirement};
use crate::solver::{Pin, ResolutionGraph};
use crate::{Error, Result};

/// Lock schema written by this version
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHeader {
    /// Fingerprint of the requirement set the lock was resolved from
    pub fingerprint: String,
    pub schema_version: u32,
}

/// One locked package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: String,
    pub version: String,
    pub source: String,
    /// Artifact digests, sorted by algorithm
    pub hashes: Vec<ArtifactHash>,
    /// Environments in which the package is needed; absent means always
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<BTreeSet<String>>,
}

impl LockEntry {
    /// Hashes recorded for one algorithm
    pub fn hashes_for(&self, algorithm: HashAlgorithm) -> impl Iterator<Item = &ArtifactHash> {
        self.hashes.iter().filter(move |hash| hash.algorithm == algorithm)
    }
}

/// A resolved dependency set as persisted on disk.
///
/// Documents are only ever built from a complete resolution or read back
/// whole; there is no API for patching entries in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDocument {
    pub header: LockHeader,
    pub entries: Vec<LockEntry>,
}

impl LockDocument {
    /// Build the document for a resolved graph.
    ///
    /// Entries follow the normalized name order of the graph; hashes are
    /// sorted and deduplicated.
    pub fn from_graph(graph: &ResolutionGraph, requirements: &[Requirement]) -> Self {
        let entries = graph
            .packages()
            .map(|candidate| {
                let mut hashes = candidate.hashes().to_vec();
                hashes.sort();
                hashes.dedup();

                LockEntry {
                    name: candidate.name.to_string(),
                    version: candidate.version.to_string(),
                    source: candidate.source.clone(),
                    hashes,
                    markers: graph.markers_for(&candidate.name).map(|marker| marker.to_string()),
                    extras: if candidate.extras.is_empty() {
                        None
                    } else {
                        Some(candidate.extras.clone())
                    },
                }
            })
            .collect();

        Self {
            header: LockHeader {
                fingerprint: fingerprint(requirements),
                schema_version: SCHEMA_VERSION,
            },
            entries,
        }
    }

    /// Parse and validate a lock document.
    ///
    /// The schema version is checked before the rest of the structure so
    /// a document from another schema is reported as such.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|err| Error::Format(err.to_string()))?;

        let schema_version = value
            .get("header")
            .and_then(|header| header.get("schema_version"))
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| Error::Format("missing header.schema_version".to_string()))?;
        if schema_version != u64::from(SCHEMA_VERSION) {
            return Err(Error::Format(format!(
                "unsupported schema version {} (expected {})",
                schema_version, SCHEMA_VERSION
            )));
        }

        let document: LockDocument = serde_json::from_value(value).map_err(|err| Error::Format(err.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    /// Pretty JSON with a trailing newline
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Check the structure beyond what the JSON shape enforces.
    ///
    /// Entries must be in normalized name order and hashes sorted without
    /// duplicates, the layout [`LockDocument::from_graph`] writes, so that a
    /// document read back serializes to the same bytes.
    pub fn validate(&self) -> Result<()> {
        if self.header.schema_version != SCHEMA_VERSION {
            return Err(Error::Format(format!(
                "unsupported schema version {} (expected {})",
                self.header.schema_version, SCHEMA_VERSION
            )));
        }
        ArtifactHash::parse(&self.header.fingerprint)
            .map_err(|err| Error::Format(format!("invalid fingerprint: {}", err)))?;

        let mut seen = BTreeSet::new();
        let mut previous: Option<PackageName> = None;
        for entry in &self.entries {
            let name = PackageName::new(&entry.name)
                .map_err(|err| Error::Format(format!("invalid package name \"{}\": {}", entry.name, err)))?;
            if !seen.insert(name.clone()) {
                return Err(Error::Format(format!("duplicate entry for {}", name)));
            }
            if previous.as_ref().is_some_and(|previous| previous > &name) {
                return Err(Error::Format(format!("entry {} is out of name order", name)));
            }
            previous = Some(name.clone());

            entry
                .version
                .parse::<Version>()
                .map_err(|err| Error::Format(format!("invalid version for {}: {}", name, err)))?;

            if entry.source.trim().is_empty() {
                return Err(Error::Format(format!("missing source for {}", name)));
            }

            for hash in &entry.hashes {
                hash.validate()
                    .map_err(|err| Error::Format(format!("{} {}: {}", name, entry.version, err)))?;
            }
            if entry.hashes.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(Error::Format(format!(
                    "hashes of {} {} are not sorted or repeat",
                    name, entry.version
                )));
            }

            if let Some(markers) = &entry.markers {
                MarkerTree::parse(markers)
                    .map_err(|err| Error::Format(format!("invalid markers for {}: {}", name, err)))?;
            }
        }
        Ok(())
    }

    /// Whether the lock was resolved from this requirement set
    pub fn is_up_to_date(&self, requirements: &[Requirement]) -> bool {
        self.header.fingerprint == fingerprint(requirements)
    }

    /// Entry for a package, by any spelling of its name
    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        let name = PackageName::new(name).ok()?;
        self.entries
            .iter()
            .find(|entry| PackageName::new(&entry.name).is_ok_and(|entry_name| entry_name == name))
    }

    /// Locked versions as soft preferences for the next resolution
    pub fn pins(&self) -> BTreeMap<PackageName, Pin> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let name = PackageName::new(&entry.name).ok()?;
                let version = entry.version.parse::<Version>().ok()?;
                Some((name, Pin::from_source(version, entry.source.clone())))
            })
            .collect()
    }

    /// Read and validate a lock file
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Replace the file at `path` with this document.
    ///
    /// The content goes to a temporary file in the same directory first and
    /// is then renamed over the target, so readers see either the old lock
    /// or the new one.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;

        debug!("Wrote {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::requirement::MarkerEnvironment;
    use crate::solver::{Request, Resolver};
    use crate::ResolverConfig;
    use tempfile::TempDir;
    use tokio_test::block_on;

    const SHA_A: &str = "sha256:ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb";
    const MD5_A: &str = "md5:0cc175b9c0f1b6a831c399e269772661";

    fn resolved(requirements: &[&str]) -> (LockDocument, Vec<Requirement>) {
        let index = InMemoryProvider::builder()
            .release("Flask", "3.0.0", &["click>=8", "colorama; platform_system == 'Windows'"])
            .hashes(&[SHA_A, MD5_A])
            .release("click", "8.1.7", &[])
            .hashes(&[SHA_A])
            .release("colorama", "0.4.6", &[])
            .release("requests", "2.31.0", &["PySocks; extra == 'socks'"])
            .release("pysocks", "1.7.1", &[])
            .build()
            .unwrap();

        let request = Request::parse(requirements, MarkerEnvironment::cpython("3.11.4")).unwrap();
        let graph = block_on(Resolver::new(&index, ResolverConfig::default()).resolve(&request)).unwrap();
        let document = LockDocument::from_graph(&graph, request.requirements());
        (document, request.requirements().to_vec())
    }

    #[test]
    fn test_from_graph() {
        let (document, requirements) = resolved(&["flask", "requests[socks]"]);

        assert_eq!(document.header.schema_version, SCHEMA_VERSION);
        assert!(document.is_up_to_date(&requirements));

        let names: Vec<&str> = document.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["click", "flask", "pysocks", "requests"]);

        let flask = document.get("Flask").unwrap();
        let algorithms: Vec<HashAlgorithm> = flask.hashes.iter().map(|h| h.algorithm).collect();
        assert_eq!(algorithms, vec![HashAlgorithm::Md5, HashAlgorithm::Sha256]);
        assert_eq!(flask.source, "pypi");
        assert!(flask.markers.is_none());

        let requests = document.get("requests").unwrap();
        assert_eq!(requests.extras.as_ref().unwrap().len(), 1);
        assert!(document.get("colorama").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let (document, _) = resolved(&["flask", "requests[socks]"]);
        let json = document.to_json().unwrap();
        assert!(json.ends_with("}\n"));

        let parsed = LockDocument::from_slice(json.as_bytes()).unwrap();
        assert_eq!(parsed, document);
        assert_eq!(parsed.to_json().unwrap(), json);
    }

    #[test]
    fn test_identical_runs_produce_identical_bytes() {
        let (first, _) = resolved(&["requests[socks]", "flask"]);
        let (second, _) = resolved(&["requests[socks]", "flask"]);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_pins() {
        let (document, _) = resolved(&["flask"]);
        let pins = document.pins();
        let flask = pins.get("flask").unwrap();
        assert_eq!(flask.version.to_string(), "3.0.0");
        assert_eq!(flask.source.as_deref(), Some("pypi"));
    }

    #[test]
    fn test_stale_fingerprint() {
        let (document, _) = resolved(&["flask"]);
        let changed = vec![Requirement::parse("flask>=3").unwrap()];
        assert!(!document.is_up_to_date(&changed));
    }

    fn document_json(entries: &str) -> String {
        format!(
            r#"{{"header": {{"fingerprint": "sha256:{}", "schema_version": 1}}, "entries": {}}}"#,
            "0".repeat(64),
            entries
        )
    }

    fn format_error(json: &str) -> String {
        match LockDocument::from_slice(json.as_bytes()) {
            Err(Error::Format(message)) => message,
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_other_schema() {
        let json = r#"{"header": {"fingerprint": "sha256:00", "schema_version": 2}, "packages": {}}"#;
        assert!(format_error(json).contains("schema version 2"));
    }

    #[test]
    fn test_rejects_corruption() {
        assert!(!format_error("{not json").is_empty());
        assert!(!format_error(r#"{"header": {"schema_version": 1}, "entries": []}"#).is_empty());
        assert!(!format_error(&document_json(r#"[{"name": "a", "version": "1.0"}]"#)).is_empty());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let entries = r#"[
            {"name": "foo-bar", "version": "1.0", "source": "pypi", "hashes": []},
            {"name": "Foo_Bar", "version": "2.0", "source": "pypi", "hashes": []}
        ]"#;
        assert!(format_error(&document_json(entries)).contains("duplicate"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_version = r#"[{"name": "a", "version": "one", "source": "pypi", "hashes": []}]"#;
        assert!(format_error(&document_json(bad_version)).contains("invalid version"));

        let bad_algorithm = r#"[{"name": "a", "version": "1.0", "source": "pypi",
            "hashes": [{"algorithm": "crc32", "digest": "00"}]}]"#;
        assert!(!format_error(&document_json(bad_algorithm)).is_empty());

        let empty_digest = r#"[{"name": "a", "version": "1.0", "source": "pypi",
            "hashes": [{"algorithm": "sha256", "digest": ""}]}]"#;
        assert!(format_error(&document_json(empty_digest)).contains("Invalid sha256 digest"));
    }

    #[test]
    fn test_rejects_non_canonical_order() {
        let unordered = r#"[
            {"name": "flask", "version": "3.0.0", "source": "pypi", "hashes": []},
            {"name": "click", "version": "8.1.7", "source": "pypi", "hashes": []}
        ]"#;
        assert!(format_error(&document_json(unordered)).contains("out of name order"));

        let hashes = format!(
            r#"[{{"name": "a", "version": "1.0", "source": "pypi", "hashes": [
                {{"algorithm": "sha256", "digest": "{}"}},
                {{"algorithm": "md5", "digest": "{}"}}
            ]}}]"#,
            SHA_A.trim_start_matches("sha256:"),
            MD5_A.trim_start_matches("md5:")
        );
        assert!(format_error(&document_json(&hashes)).contains("not sorted"));
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pyx.lock");
        std::fs::write(&path, "old").unwrap();

        let (document, _) = resolved(&["flask"]);
        document.write_to(&path).unwrap();

        let read = LockDocument::read_from(&path).unwrap();
        assert_eq!(read, document);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
