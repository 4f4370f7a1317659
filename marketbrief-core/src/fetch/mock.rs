//! Deterministic mock store for simulation mode.
//!
//! Recorded responses live in one directory, one file per
//! (provider, endpoint, parameters) key:
//!
//! ```text
//! {provider}_{endpoint}_{sanitized-sorted-params}.{json|csv|mock}
//! ```
//!
//! The parameter segment joins `key-value` pairs in key order so the
//! same logical query always resolves to the same file; a segment
//! longer than 100 characters is replaced by a blake3 hash prefix to
//! bound the file name. A missing file is "no data", never a fault.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use super::FetchError;

/// Parameter segments longer than this are content-hashed.
const MAX_PARAM_SEGMENT: usize = 100;

/// Hex characters of the blake3 hash kept when hashing a long segment.
const HASH_PREFIX_LEN: usize = 16;

/// Extensions probed in order; `.mock` is the format-agnostic fallback
/// and is parsed as JSON.
const EXTENSIONS: [&str; 3] = ["json", "csv", "mock"];

/// Directory of recorded provider responses.
#[derive(Debug, Clone)]
pub struct MockStore {
    root: PathBuf,
}

impl MockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic file stem for a query.
    pub fn key(provider: &str, endpoint: &str, params: &BTreeMap<String, String>) -> String {
        let joined = params
            .iter()
            .map(|(k, v)| format!("{k}-{v}"))
            .collect::<Vec<_>>()
            .join("_");
        let sanitized = sanitize(&joined);
        let segment = if sanitized.len() > MAX_PARAM_SEGMENT {
            blake3::hash(sanitized.as_bytes()).to_hex()[..HASH_PREFIX_LEN].to_string()
        } else {
            sanitized
        };
        if segment.is_empty() {
            format!("{provider}_{endpoint}")
        } else {
            format!("{provider}_{endpoint}_{segment}")
        }
    }

    /// Look up the recorded response for a query.
    ///
    /// Returns `Ok(None)` when no file matches the key — logged and
    /// treated as a valid "no data" outcome by callers. A file that
    /// exists but cannot be read or parsed is a fault: the recording
    /// is malformed and silently skipping it would hide that.
    pub fn lookup<T: DeserializeOwned>(
        &self,
        provider: &str,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Option<Vec<T>>, FetchError> {
        let key = Self::key(provider, endpoint, params);
        for ext in EXTENSIONS {
            let path = self.root.join(format!("{key}.{ext}"));
            if path.exists() {
                debug!(provider, endpoint, path = %path.display(), "mock store hit");
                let records = match ext {
                    "csv" => read_csv(provider, &path)?,
                    _ => read_json(provider, &path)?,
                };
                return Ok(Some(records));
            }
        }
        debug!(provider, endpoint, key, "mock store miss");
        Ok(None)
    }
}

/// Restrict a parameter segment to `[A-Za-z0-9._-]`, replacing anything
/// else with `_`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn read_json<T: DeserializeOwned>(provider: &str, path: &Path) -> Result<Vec<T>, FetchError> {
    let content = std::fs::read_to_string(path).map_err(|e| FetchError::Decode {
        provider: provider.to_string(),
        message: format!("read mock file {}: {e}", path.display()),
    })?;
    serde_json::from_str(&content).map_err(|e| FetchError::Decode {
        provider: provider.to_string(),
        message: format!("parse mock file {}: {e}", path.display()),
    })
}

fn read_csv<T: DeserializeOwned>(provider: &str, path: &Path) -> Result<Vec<T>, FetchError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| FetchError::Decode {
        provider: provider.to_string(),
        message: format!("read mock file {}: {e}", path.display()),
    })?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| FetchError::Decode {
            provider: provider.to_string(),
            message: format!("parse mock file {}: {e}", path.display()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        symbol: String,
        close: f64,
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn key_sorts_and_sanitizes_params() {
        let key = MockStore::key(
            "yahoo",
            "chart",
            &params(&[("symbol", "^VIX"), ("end", "2023-01-31"), ("start", "2023-01-01")]),
        );
        // BTreeMap iterates in key order: end, start, symbol.
        assert_eq!(key, "yahoo_chart_end-2023-01-31_start-2023-01-01_symbol-_VIX");
    }

    #[test]
    fn key_without_params_has_no_trailing_separator() {
        let key = MockStore::key("fred", "observations", &BTreeMap::new());
        assert_eq!(key, "fred_observations");
    }

    #[test]
    fn long_param_segment_is_hashed() {
        let long = "x".repeat(200);
        let key = MockStore::key("yahoo", "chart", &params(&[("symbol", &long)]));
        let stem = key.strip_prefix("yahoo_chart_").unwrap();
        assert_eq!(stem.len(), HASH_PREFIX_LEN);
        // Deterministic across invocations.
        assert_eq!(
            key,
            MockStore::key("yahoo", "chart", &params(&[("symbol", &long)]))
        );
    }

    #[test]
    fn lookup_miss_is_none_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = MockStore::new(dir.path());
        let found: Option<Vec<Row>> = store
            .lookup("yahoo", "chart", &params(&[("symbol", "SPY")]))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn lookup_reads_json_payload() {
        let dir = TempDir::new().unwrap();
        let p = params(&[("symbol", "SPY")]);
        let key = MockStore::key("yahoo", "chart", &p);
        std::fs::write(
            dir.path().join(format!("{key}.json")),
            r#"[{"symbol":"SPY","close":470.5}]"#,
        )
        .unwrap();

        let store = MockStore::new(dir.path());
        let rows: Vec<Row> = store.lookup("yahoo", "chart", &p).unwrap().unwrap();
        assert_eq!(
            rows,
            vec![Row {
                symbol: "SPY".into(),
                close: 470.5
            }]
        );
    }

    #[test]
    fn lookup_falls_back_to_mock_extension() {
        let dir = TempDir::new().unwrap();
        let p = params(&[("symbol", "SPY")]);
        let key = MockStore::key("yahoo", "chart", &p);
        std::fs::write(
            dir.path().join(format!("{key}.mock")),
            r#"[{"symbol":"SPY","close":471.0}]"#,
        )
        .unwrap();

        let store = MockStore::new(dir.path());
        let rows: Vec<Row> = store.lookup("yahoo", "chart", &p).unwrap().unwrap();
        assert_eq!(rows[0].close, 471.0);
    }

    #[test]
    fn lookup_reads_csv_payload() {
        let dir = TempDir::new().unwrap();
        let p = params(&[("symbol", "SPY")]);
        let key = MockStore::key("yahoo", "chart", &p);
        std::fs::write(
            dir.path().join(format!("{key}.csv")),
            "symbol,close\nSPY,470.5\nSPY,471.25\n",
        )
        .unwrap();

        let store = MockStore::new(dir.path());
        let rows: Vec<Row> = store.lookup("yahoo", "chart", &p).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].close, 471.25);
    }

    #[test]
    fn malformed_recording_is_a_fault() {
        let dir = TempDir::new().unwrap();
        let p = params(&[("symbol", "SPY")]);
        let key = MockStore::key("yahoo", "chart", &p);
        std::fs::write(dir.path().join(format!("{key}.json")), "not json").unwrap();

        let store = MockStore::new(dir.path());
        let err = store.lookup::<Row>("yahoo", "chart", &p).unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
