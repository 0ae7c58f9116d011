use chrono::{DateTime, Utc};
use sc_types::{CacheError, Calibration, ScResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current on-disk calibration record version.
pub const FORMAT_VERSION: u32 = 1;

/// Scheme identifiers a calibration was computed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeIds {
    pub compute_service_scheme: Option<String>,
    pub storage_service_scheme: Option<String>,
    pub network_topology_scheme: Option<String>,
}

impl SchemeIds {
    pub fn new(
        compute_service_scheme: Option<String>,
        storage_service_scheme: Option<String>,
        network_topology_scheme: Option<String>,
    ) -> Self {
        Self {
            compute_service_scheme,
            storage_service_scheme,
            network_topology_scheme,
        }
    }

    /// First scheme that differs, as `(kind, cached, current)`.
    pub fn first_mismatch(&self, current: &SchemeIds) -> Option<(&'static str, String, String)> {
        let pairs = [
            (
                "compute_service_scheme",
                &self.compute_service_scheme,
                &current.compute_service_scheme,
            ),
            (
                "storage_service_scheme",
                &self.storage_service_scheme,
                &current.storage_service_scheme,
            ),
            (
                "network_topology_scheme",
                &self.network_topology_scheme,
                &current.network_topology_scheme,
            ),
        ];
        pairs
            .into_iter()
            .find(|(_, cached, current)| cached != current)
            .map(|(kind, cached, current)| {
                (
                    kind,
                    cached.clone().unwrap_or_default(),
                    current.clone().unwrap_or_default(),
                )
            })
    }
}

/// What to do when a stored calibration was computed under other schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeCheck {
    #[default]
    Fail,
    Warn,
}

/// One persisted calibration, keyed by training-set `ivhash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub format_version: u32,
    pub ivhash: String,
    pub calibration: Calibration,
    pub loss: f64,
    #[serde(flatten)]
    pub schemes: SchemeIds,
    pub created_at: DateTime<Utc>,
}

impl CalibrationRecord {
    pub fn new(ivhash: impl Into<String>, calibration: Calibration, loss: f64, schemes: SchemeIds) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            ivhash: ivhash.into(),
            calibration,
            loss,
            schemes,
            created_at: Utc::now(),
        }
    }
}

/// Content-addressed JSON store: one `<ivhash>.json` per calibration.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    pub data_root: PathBuf,
    scheme_check: SchemeCheck,
}

impl CalibrationStore {
    pub fn new<P: AsRef<Path>>(data_root: P) -> ScResult<Self> {
        let data_root = data_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_root)?;

        Ok(Self {
            data_root,
            scheme_check: SchemeCheck::default(),
        })
    }

    /// `<data dir>/simcal/calibrations`, falling back to the working directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("simcal")
            .join("calibrations")
    }

    pub fn with_scheme_check(mut self, check: SchemeCheck) -> Self {
        self.scheme_check = check;
        self
    }

    pub fn scheme_check(&self) -> SchemeCheck {
        self.scheme_check
    }

    fn get_storage_path(&self, ivhash: &str) -> PathBuf {
        self.data_root.join(format!("{ivhash}.json"))
    }

    pub fn contains(&self, ivhash: &str) -> bool {
        self.get_storage_path(ivhash).is_file()
    }

    pub async fn save(&self, record: &CalibrationRecord) -> ScResult<PathBuf> {
        let path = self.get_storage_path(&record.ivhash);
        let text = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, text).await?;
        info!(ivhash = %record.ivhash, path = %path.display(), "saved calibration");
        Ok(path)
    }

    /// Load the record for `ivhash`, if any, and check it was computed under
    /// `current` schemes.
    pub async fn load(&self, ivhash: &str, current: &SchemeIds) -> ScResult<Option<CalibrationRecord>> {
        let path = self.get_storage_path(ivhash);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(ivhash, "no stored calibration");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let raw: serde_json::Value = serde_json::from_str(&text)?;
        let found = raw
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found != FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        let record: CalibrationRecord = serde_json::from_value(raw)?;

        if let Some((kind, cached, now)) = record.schemes.first_mismatch(current) {
            match self.scheme_check {
                SchemeCheck::Fail => {
                    return Err(CacheError::InconsistentCalibrationScheme {
                        scheme_kind: kind.to_string(),
                        cached,
                        current: now,
                    }
                    .into());
                }
                SchemeCheck::Warn => {
                    warn!(
                        ivhash,
                        scheme = kind,
                        cached = %cached,
                        current = %now,
                        "stored calibration was computed under a different scheme; using it anyway"
                    );
                }
            }
        }

        Ok(Some(record))
    }

    pub async fn remove(&self, ivhash: &str) -> ScResult<bool> {
        match tokio::fs::remove_file(self.get_storage_path(ivhash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_types::{CalibratedValue, SampleValue, ScError, Scale};
    use tempfile::TempDir;

    fn schemes(storage: &str) -> SchemeIds {
        SchemeIds::new(
            Some("all_bare_metal".into()),
            Some(storage.into()),
            Some("one_link".into()),
        )
    }

    fn record(ivhash: &str) -> CalibrationRecord {
        let mut calibration = Calibration::new();
        calibration.values.insert(
            "storage-BUFFER_SIZE".into(),
            CalibratedValue {
                raw: SampleValue::Choice("infinity".into()),
                path: vec!["storage".into(), "BUFFER_SIZE".into()],
                scale: Some(Scale::Log2),
                unit: Some("B".into()),
                conditional: true,
            },
        );
        calibration.values.insert(
            "storage-bandwidth".into(),
            CalibratedValue {
                raw: SampleValue::Int(8),
                path: vec!["storage".into(), "bandwidth".into()],
                scale: Some(Scale::Log2),
                unit: Some("MBps".into()),
                conditional: false,
            },
        );
        CalibrationRecord::new(ivhash, calibration, 0.0125, schemes("submit_only"))
    }

    #[tokio::test]
    async fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path()).unwrap();
        let original = record("abc123");

        let path = store.save(&original).await.unwrap();
        assert!(path.ends_with("abc123.json"));
        assert!(store.contains("abc123"));

        let loaded = store
            .load("abc123", &schemes("submit_only"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.calibration.get("storage-bandwidth").unwrap().realize(), "256MBps");
        assert_eq!(loaded.calibration.get("storage-BUFFER_SIZE").unwrap().realize(), "infinity");
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path()).unwrap();
        assert!(store.load("nope", &SchemeIds::default()).await.unwrap().is_none());
        assert!(!store.remove("nope").await.unwrap());
    }

    #[tokio::test]
    async fn scheme_mismatch_is_fatal_by_default() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path()).unwrap();
        store.save(&record("h")).await.unwrap();

        let err = store.load("h", &schemes("submit_and_compute_hosts")).await.unwrap_err();
        match err {
            ScError::Cache(CacheError::InconsistentCalibrationScheme { scheme_kind, cached, current }) => {
                assert_eq!(scheme_kind, "storage_service_scheme");
                assert_eq!(cached, "submit_only");
                assert_eq!(current, "submit_and_compute_hosts");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn scheme_mismatch_can_be_downgraded_to_warning() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path())
            .unwrap()
            .with_scheme_check(SchemeCheck::Warn);
        store.save(&record("h")).await.unwrap();

        let loaded = store.load("h", &schemes("submit_and_compute_hosts")).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn unknown_versions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path()).unwrap();
        let mut future = serde_json::to_value(record("v")).unwrap();
        future["format_version"] = serde_json::json!(2);
        std::fs::write(dir.path().join("v.json"), future.to_string()).unwrap();

        let err = store.load("v", &schemes("submit_only")).await.unwrap_err();
        assert!(matches!(
            err,
            ScError::Cache(CacheError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn record_layout_is_flat() {
        let value = serde_json::to_value(record("x")).unwrap();
        assert_eq!(value["format_version"], 1);
        assert_eq!(value["storage_service_scheme"], "submit_only");
        assert!(value.get("schemes").is_none());
    }
}
