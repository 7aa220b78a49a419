#![forbid(unsafe_code)]

//! Durable cache of component outputs.
//!
//! Each state of an output bundle lands in `{scenario}-{descriptor}-{index}.cache`
//! (a JSON document with NPY-encoded numeric payloads). A sibling
//! `{scenario}-{descriptor}.manifest.json` fixes the tuple order and the file
//! digests. Caches without a manifest are discovered by lexical file-name order.

pub mod document;
pub mod npy;

use gdh_state::{OutputBundle, PhysicalState, StateError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use document::{CacheDocument, CachedPayload, CachedVariable};

pub const CACHE_FILE_EXTENSION: &str = "cache";
pub const MANIFEST_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    Io { path: PathBuf, detail: String },
    Json { path: PathBuf, detail: String },
    Encoding(String),
    PayloadInvalid(&'static str),
    DigestMismatch { subject: String, expected: String, actual: String },
    ManifestInvalid(String),
    SchemaVersion(u8),
    State { name: String, cause: StateError },
}

impl CacheError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "cache_io_failed",
            Self::Json { .. } => "cache_json_invalid",
            Self::Encoding(_) => "cache_encoding_invalid",
            Self::PayloadInvalid(_) => "cache_payload_invalid",
            Self::DigestMismatch { .. } => "cache_digest_mismatch",
            Self::ManifestInvalid(_) => "cache_manifest_invalid",
            Self::SchemaVersion(_) => "cache_schema_version_unsupported",
            Self::State { .. } => "cache_state_invalid",
        }
    }

    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            detail: err.to_string(),
        }
    }

    fn json(path: &Path, err: &serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            detail: err.to_string(),
        }
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, detail } => write!(f, "cache i/o failed for {}: {detail}", path.display()),
            Self::Json { path, detail } => {
                write!(f, "invalid cache json {}: {detail}", path.display())
            }
            Self::Encoding(msg) => write!(f, "{msg}"),
            Self::PayloadInvalid(msg) => write!(f, "{msg}"),
            Self::DigestMismatch {
                subject,
                expected,
                actual,
            } => write!(
                f,
                "sha256 mismatch for {subject}: expected={expected} actual={actual}"
            ),
            Self::ManifestInvalid(msg) => write!(f, "{msg}"),
            Self::SchemaVersion(version) => write!(f, "unsupported cache schema version {version}"),
            Self::State { name, cause } => write!(f, "cached variable {name} is invalid: {cause}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::State { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub sha256: String,
}

/// Explicit tuple order for one `(scenario, descriptor)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub schema_version: u8,
    pub scenario: String,
    pub descriptor: String,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn cache_file_name(scenario: &str, descriptor: &str, index: usize) -> String {
        format!("{scenario}-{descriptor}-{index}.{CACHE_FILE_EXTENSION}")
    }

    #[must_use]
    pub fn manifest_file_name(scenario: &str, descriptor: &str) -> String {
        format!("{scenario}-{descriptor}.manifest.json")
    }

    /// Writes one file per bundle element plus the manifest and returns the
    /// cache file paths in tuple order.
    pub fn save(
        &self,
        outputs: &OutputBundle,
        scenario: &str,
        descriptor: &str,
    ) -> Result<Vec<PathBuf>, CacheError> {
        fs::create_dir_all(&self.root).map_err(|err| CacheError::io(&self.root, &err))?;

        let mut written = Vec::with_capacity(outputs.arity());
        let mut entries = Vec::with_capacity(outputs.arity());
        for (index, state) in outputs.states().iter().enumerate() {
            let file = Self::cache_file_name(scenario, descriptor, index);
            let path = self.root.join(&file);
            let document = CacheDocument::from_state(state, scenario, descriptor, index)?;
            let raw = serde_json::to_string_pretty(&document)
                .map_err(|err| CacheError::json(&path, &err))?;
            fs::write(&path, raw.as_bytes()).map_err(|err| CacheError::io(&path, &err))?;

            entries.push(ManifestEntry {
                file,
                sha256: sha256_hex(raw.as_bytes()),
            });
            written.push(path);
        }

        let manifest = CacheManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            scenario: scenario.to_string(),
            descriptor: descriptor.to_string(),
            entries,
        };
        let manifest_path = self.root.join(Self::manifest_file_name(scenario, descriptor));
        let raw = serde_json::to_string_pretty(&manifest)
            .map_err(|err| CacheError::json(&manifest_path, &err))?;
        fs::write(&manifest_path, raw).map_err(|err| CacheError::io(&manifest_path, &err))?;

        Ok(written)
    }

    /// `None` when nothing is cached; `Single` for one file; `Tuple` otherwise.
    pub fn load(&self, scenario: &str, descriptor: &str) -> Result<Option<OutputBundle>, CacheError> {
        let states = match self.read_manifest(scenario, descriptor)? {
            Some(manifest) => self.load_from_manifest(&manifest)?,
            None => self
                .discover(scenario, descriptor)?
                .iter()
                .map(|path| {
                    let bytes = fs::read(path).map_err(|err| CacheError::io(path, &err))?;
                    parse_state(path, &bytes)
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(OutputBundle::from_states(states))
    }

    /// Lexically sorted `{scenario}-{descriptor}-{digits}.cache` files under the root.
    pub fn discover(&self, scenario: &str, descriptor: &str) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CacheError::io(&self.root, &err)),
        };

        let prefix = format!("{scenario}-{descriptor}-");
        let suffix = format!(".{CACHE_FILE_EXTENSION}");
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                name.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(&suffix))
                    .is_some_and(|index| {
                        !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
                    })
            })
            .collect();
        names.sort();
        Ok(names.into_iter().map(|name| self.root.join(name)).collect())
    }

    fn read_manifest(
        &self,
        scenario: &str,
        descriptor: &str,
    ) -> Result<Option<CacheManifest>, CacheError> {
        let path = self.root.join(Self::manifest_file_name(scenario, descriptor));
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(&path, &err)),
        };
        let manifest: CacheManifest =
            serde_json::from_str(&raw).map_err(|err| CacheError::json(&path, &err))?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(CacheError::SchemaVersion(manifest.schema_version));
        }
        if manifest.scenario != scenario || manifest.descriptor != descriptor {
            return Err(CacheError::ManifestInvalid(format!(
                "{} names {}-{} instead of {scenario}-{descriptor}",
                path.display(),
                manifest.scenario,
                manifest.descriptor
            )));
        }
        Ok(Some(manifest))
    }

    fn load_from_manifest(&self, manifest: &CacheManifest) -> Result<Vec<PhysicalState>, CacheError> {
        let mut states = Vec::with_capacity(manifest.entries.len());
        for (index, entry) in manifest.entries.iter().enumerate() {
            if entry.file.contains(['/', '\\']) || entry.file.starts_with('.') {
                return Err(CacheError::ManifestInvalid(format!(
                    "manifest entry {index} must be a plain file name, got {}",
                    entry.file
                )));
            }
            let path = self.root.join(&entry.file);
            let bytes = fs::read(&path).map_err(|err| CacheError::io(&path, &err))?;
            let actual = sha256_hex(&bytes);
            if actual != entry.sha256 {
                return Err(CacheError::DigestMismatch {
                    subject: entry.file.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            states.push(parse_state(&path, &bytes)?);
        }
        Ok(states)
    }
}

fn parse_state(path: &Path, bytes: &[u8]) -> Result<PhysicalState, CacheError> {
    let document: CacheDocument =
        serde_json::from_slice(bytes).map_err(|err| CacheError::json(path, &err))?;
    document.into_state()
}

#[cfg(test)]
mod tests {
    use super::{CacheError, CacheStore};
    use gdh_state::{
        ArrayData, AttrValue, LabeledArray, OutputBundle, PhysicalState, Timestamp,
    };
    use std::fs;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        std::env::temp_dir().join(format!("gdh_cache_{name}_{ts}"))
    }

    fn sample_state(offset: f64) -> PhysicalState {
        let mut state = PhysicalState::new();
        state.insert(
            "time",
            Timestamp::parse("2020-01-01T00:00:00").expect("timestamp"),
        );
        state.insert(
            "air_temperature",
            LabeledArray::from_f64(
                &["mid_levels"],
                &[30],
                (0..30u8).map(|k| 290.0 - f64::from(k) + offset).collect(),
            )
            .expect("temperature")
            .with_attr("units", "degK")
            .with_attr("long_name", "air temperature")
            .with_attr("scale", 1.5)
            .with_attr("version", 3_i64)
            .with_attr("positive_down", false)
            .with_attr("bounds", vec![150.0, 330.0])
            .with_attr("flags", vec![0_i64, 1]),
        );
        state.insert(
            "level_labels",
            LabeledArray::new(
                vec!["mid_levels".to_string()],
                vec![2],
                ArrayData::Text(vec!["top".to_string(), "bottom".to_string()]),
            )
            .expect("labels"),
        );
        state
    }

    #[test]
    fn single_state_round_trips_exactly() {
        let root = temp_dir("single");
        let store = CacheStore::new(&root);
        let bundle = OutputBundle::Single(sample_state(0.0));

        let written = store.save(&bundle, "TestDycore", "column").expect("save");
        assert_eq!(written, vec![root.join("TestDycore-column-0.cache")]);

        let loaded = store
            .load("TestDycore", "column")
            .expect("load")
            .expect("cache present");
        assert_eq!(loaded, bundle);
        let t = loaded.states()[0].array("air_temperature").expect("t");
        assert_eq!(t.attrs().get("positive_down"), Some(&AttrValue::Bool(false)));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn float_attributes_round_trip_bit_exact() {
        let root = temp_dir("float_attrs");
        let store = CacheStore::new(&root);
        let mut state = sample_state(0.0);
        let t = state.array("air_temperature").expect("t").clone();
        let ratios: Vec<f64> = (1..=200u8).map(|k| 287.04 / f64::from(k)).collect();
        state.insert(
            "air_temperature",
            t.with_attr("gas_constant_ratio", 287.04 / 104.0)
                .with_attr("tiny", 2.3716419286150862e-23)
                .with_attr("valid_max", f64::INFINITY)
                .with_attr("valid_min", f64::NEG_INFINITY)
                .with_attr("fill_value", f64::NAN)
                .with_attr("ratios", ratios.clone())
                .with_attr("open_range", vec![f64::NEG_INFINITY, 0.1, f64::INFINITY]),
        );
        store
            .save(&OutputBundle::Single(state), "TestDycore", "column")
            .expect("save");

        let loaded = store
            .load("TestDycore", "column")
            .expect("non-finite floats load")
            .expect("cache present");
        let attrs = loaded.states()[0]
            .array("air_temperature")
            .expect("t")
            .attrs()
            .clone();
        let float = |key: &str| match attrs.get(key) {
            Some(AttrValue::Float(value)) => *value,
            other => panic!("{key}: {other:?}"),
        };
        assert_eq!(float("gas_constant_ratio").to_bits(), (287.04 / 104.0f64).to_bits());
        assert_eq!(float("tiny").to_bits(), 2.3716419286150862e-23f64.to_bits());
        assert_eq!(float("valid_max"), f64::INFINITY);
        assert_eq!(float("valid_min"), f64::NEG_INFINITY);
        assert!(float("fill_value").is_nan());
        assert_eq!(attrs.get("ratios"), Some(&AttrValue::FloatList(ratios)));
        assert_eq!(
            attrs.get("open_range"),
            Some(&AttrValue::FloatList(vec![f64::NEG_INFINITY, 0.1, f64::INFINITY]))
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn tuple_order_is_preserved() {
        let root = temp_dir("tuple");
        let store = CacheStore::new(&root);
        let bundle = OutputBundle::Tuple(vec![sample_state(0.0), sample_state(1.0)]);
        store.save(&bundle, "TestDycore", "3d").expect("save");

        let loaded = store.load("TestDycore", "3d").expect("load").expect("present");
        assert_eq!(loaded, bundle);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_cache_is_none_not_empty() {
        let root = temp_dir("missing");
        let store = CacheStore::new(&root);
        assert!(store.load("TestDycore", "column").expect("load").is_none());
        fs::create_dir_all(&root).expect("mkdir");
        assert!(store.load("TestDycore", "column").expect("load").is_none());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn discovery_without_manifest_is_lexical_and_exact() {
        let root = temp_dir("discover");
        let store = CacheStore::new(&root);
        let bundle = OutputBundle::Tuple(vec![sample_state(0.0), sample_state(1.0)]);
        store.save(&bundle, "TestDycore", "3d").expect("save");
        store
            .save(&OutputBundle::Single(sample_state(5.0)), "TestDycore", "3d_stepping")
            .expect("save stepping");
        fs::remove_file(root.join(CacheStore::manifest_file_name("TestDycore", "3d")))
            .expect("drop manifest");

        let files = store.discover("TestDycore", "3d").expect("discover");
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, ["TestDycore-3d-0.cache", "TestDycore-3d-1.cache"]);

        let loaded = store.load("TestDycore", "3d").expect("load").expect("present");
        assert_eq!(loaded, bundle);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn tampered_file_fails_digest_check() {
        let root = temp_dir("tamper");
        let store = CacheStore::new(&root);
        let written = store
            .save(&OutputBundle::Single(sample_state(0.0)), "TestDycore", "column")
            .expect("save");
        let raw = fs::read_to_string(&written[0]).expect("read");
        fs::write(&written[0], raw.replace("degK", "degC")).expect("tamper");

        let err = store.load("TestDycore", "column").expect_err("digest mismatch");
        assert!(matches!(err, CacheError::DigestMismatch { .. }));
        assert_eq!(err.reason_code(), "cache_digest_mismatch");
        let _ = fs::remove_dir_all(root);
    }
}
