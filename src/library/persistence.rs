use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::config::LibraryConfig;
use crate::library::catalog::Catalog;
use crate::library::record::{SampleRecord, FEATURE_VECTOR_LEN};
use crate::utils::file_lock::FileLock;
use crate::{LibraryError, Result};

const PROPERTY_TITLE: &str = "Title";
const PROPERTY_LENGTH: &str = "Length";
const PROPERTY_LOUDNESS_DECIBEL: &str = "LoudnessDecibel";
const PROPERTY_LOUDNESS_LUFS: &str = "LoudnessLUFS";
const PROPERTY_TEMPO: &str = "Tempo";
const PROPERTY_KEY: &str = "Key";
const FEATURE_PREFIX: &str = "FV";

const TEMPO_UNKNOWN: i64 = 0;
const KEY_UNKNOWN: i64 = -1;

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(rename = "SampleLibrary")]
    library: LibraryEntry,
}

#[derive(Debug, Serialize, Deserialize)]
struct LibraryEntry {
    #[serde(rename = "LibraryPath")]
    library_path: PathBuf,
    #[serde(rename = "SampleItems", default)]
    sample_items: Vec<SampleEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SampleEntry {
    #[serde(rename = "FilePath")]
    file_path: PathBuf,
    #[serde(rename = "SampleProperties", default)]
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Preferences {
    #[serde(rename = "LastOpenedDirectory")]
    last_opened_directory: PathBuf,
}

fn feature_name(dimension: usize) -> String {
    format!("{}{}", FEATURE_PREFIX, dimension)
}

impl SampleEntry {
    fn from_record(record: &SampleRecord) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(PROPERTY_TITLE.to_string(), Value::from(record.title()));
        properties.insert(PROPERTY_LENGTH.to_string(), Value::from(record.length()));
        properties.insert(
            PROPERTY_LOUDNESS_DECIBEL.to_string(),
            Value::from(record.loudness_db()),
        );
        properties.insert(
            PROPERTY_LOUDNESS_LUFS.to_string(),
            Value::from(record.loudness_lufs()),
        );
        properties.insert(
            PROPERTY_TEMPO.to_string(),
            Value::from(record.tempo().map_or(TEMPO_UNKNOWN, i64::from)),
        );
        properties.insert(
            PROPERTY_KEY.to_string(),
            Value::from(record.key().map_or(KEY_UNKNOWN, i64::from)),
        );
        for (d, value) in record.feature_vector().iter().enumerate() {
            properties.insert(feature_name(d), Value::from(*value));
        }

        Self {
            file_path: record.path().to_path_buf(),
            properties,
        }
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.properties.get(name).and_then(Value::as_f64)
    }

    fn integer(&self, name: &str) -> Option<i64> {
        self.properties.get(name).and_then(Value::as_i64)
    }

    fn into_record(self) -> SampleRecord {
        let mut record = SampleRecord::from_path(self.file_path.clone());
        if let Some(title) = self.properties.get(PROPERTY_TITLE).and_then(Value::as_str) {
            record.set_title(title);
        }
        if let Some(length) = self.number(PROPERTY_LENGTH) {
            record.set_length(length);
        }
        if let Some(db) = self.number(PROPERTY_LOUDNESS_DECIBEL) {
            record.set_loudness_db(db);
        }
        if let Some(lufs) = self.number(PROPERTY_LOUDNESS_LUFS) {
            record.set_loudness_lufs(lufs);
        }
        record.set_tempo(
            self.integer(PROPERTY_TEMPO)
                .filter(|t| *t > TEMPO_UNKNOWN)
                .and_then(|t| u32::try_from(t).ok()),
        );
        record.set_key(
            self.integer(PROPERTY_KEY)
                .and_then(|k| u8::try_from(k).ok()),
        );

        let analyzed = self
            .properties
            .keys()
            .any(|name| name.starts_with(FEATURE_PREFIX));
        if analyzed {
            let feature_vector = (0..FEATURE_VECTOR_LEN)
                .map(|d| self.number(&feature_name(d)).unwrap_or(0.0) as f32)
                .collect();
            record.set_feature_vector(feature_vector);
        }
        record
    }
}

/// Reads and writes catalog files and the preference file under the data directory.
#[derive(Debug, Clone)]
pub struct LibraryStore {
    config: LibraryConfig,
}

impl LibraryStore {
    pub fn new(config: LibraryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn catalog_file(&self, library_dir: &Path) -> PathBuf {
        self.config.catalog_file(library_dir)
    }

    /// Write every record of `catalog` to the catalog file of `library_dir`.
    pub fn save_catalog(&self, library_dir: &Path, catalog: &Catalog) -> Result<PathBuf> {
        let document = CatalogDocument {
            library: LibraryEntry {
                library_path: library_dir.to_path_buf(),
                sample_items: catalog.all().map(SampleEntry::from_record).collect(),
            },
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let path = self.catalog_file(library_dir);
        let _lock = self.lock()?;
        self.replace_file(&path, &bytes)?;
        info!("Saved {} samples to {}", catalog.len(), path.display());
        Ok(path)
    }

    /// Records stored for `library_dir`, or `None` when there is no usable catalog file.
    pub fn load_catalog(&self, library_dir: &Path) -> Result<Option<Vec<SampleRecord>>> {
        let path = self.catalog_file(library_dir);
        let bytes = {
            let _lock = self.lock()?;
            if !path.is_file() {
                debug!("No catalog file at {}", path.display());
                return Ok(None);
            }
            fs::read(&path)?
        };

        let document = match parse_catalog(&bytes) {
            Ok(document) => document,
            Err(e) => {
                warn!("Ignoring {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if document.library.library_path.as_path() != library_dir {
            warn!(
                "Catalog {} belongs to {}, not {}",
                path.display(),
                document.library.library_path.display(),
                library_dir.display()
            );
            return Ok(None);
        }

        let records: Vec<SampleRecord> = document
            .library
            .sample_items
            .into_iter()
            .map(SampleEntry::into_record)
            .collect();
        info!("Loaded {} samples from {}", records.len(), path.display());
        Ok(Some(records))
    }

    pub fn last_opened_directory(&self) -> Result<Option<PathBuf>> {
        let path = self.config.preferences_file();
        let bytes = {
            let _lock = self.lock()?;
            if !path.is_file() {
                return Ok(None);
            }
            fs::read(&path)?
        };

        match serde_json::from_slice::<Preferences>(&bytes) {
            Ok(preferences) => Ok(Some(preferences.last_opened_directory)),
            Err(e) => {
                warn!("Ignoring {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn store_last_opened_directory(&self, library_dir: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&Preferences {
            last_opened_directory: library_dir.to_path_buf(),
        })?;
        let _lock = self.lock()?;
        self.replace_file(&self.config.preferences_file(), &bytes)
    }

    fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(self.config.lock_file(), self.config.lock_timeout)
    }

    /// Replace `path` with `bytes` in one rename so readers never see a partial file.
    fn replace_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.config.data_dir);
        fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| LibraryError::Io(e.error))?;
        Ok(())
    }
}

fn parse_catalog(bytes: &[u8]) -> Result<CatalogDocument> {
    serde_json::from_slice(bytes).map_err(|e| LibraryError::CorruptCatalog(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::record::Analysis;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, LibraryStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = LibraryConfig::with_data_dir(dir.path().join("data"));
        (dir, LibraryStore::new(config))
    }

    fn analysed(path: &str, seed: f32) -> SampleRecord {
        let mut record = SampleRecord::from_path(path);
        record.apply_analysis(Analysis {
            length: 1.234_567_891 * seed as f64,
            loudness_db: -3.141_592_6,
            loudness_lufs: -17.777_777,
            tempo: Some(124),
            key: Some(14),
            feature_vector: (0..FEATURE_VECTOR_LEN)
                .map(|d| seed / (d as f32 + 3.0))
                .collect(),
        });
        record
    }

    fn snapshot(record: &SampleRecord) -> (String, String, f64, f64, f64, Option<u32>, Option<u8>, Vec<f32>) {
        (
            record.path().display().to_string(),
            record.title().to_string(),
            record.length(),
            record.loudness_db(),
            record.loudness_lufs(),
            record.tempo(),
            record.key(),
            record.feature_vector().to_vec(),
        )
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let (_dir, store) = store();
        let library = Path::new("/music/Samples");
        let mut catalog = Catalog::new();
        catalog.add(analysed("/music/Samples/a.wav", 1.0)).unwrap();
        catalog.add(analysed("/music/Samples/sub/b.mp3", 2.5)).unwrap();
        catalog.add(SampleRecord::from_path("/music/Samples/broken.m4a")).unwrap();

        store.save_catalog(library, &catalog).unwrap();
        let loaded = store.load_catalog(library).unwrap().unwrap();

        let expected: Vec<_> = catalog.all().map(snapshot).collect();
        let actual: Vec<_> = loaded.iter().map(snapshot).collect();
        assert_eq!(actual, expected);
        assert!(!loaded[1].is_analyzed());
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let (_dir, store) = store();
        assert!(store.load_catalog(Path::new("/music/None")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let (_dir, store) = store();
        let library = Path::new("/music/Samples");
        let path = store.catalog_file(library);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{\"SampleLibrary\": [1, 2").unwrap();

        assert!(store.load_catalog(library).unwrap().is_none());
        assert!(matches!(
            parse_catalog(b"not json"),
            Err(LibraryError::CorruptCatalog(_))
        ));
    }

    #[test]
    fn test_catalog_of_other_directory_is_ignored() {
        let (_dir, store) = store();
        let mut catalog = Catalog::new();
        catalog.add(analysed("/old/Samples/a.wav", 1.0)).unwrap();
        store.save_catalog(Path::new("/old/Samples"), &catalog).unwrap();

        assert!(store.load_catalog(Path::new("/new/Samples")).unwrap().is_none());
    }

    #[test]
    fn test_missing_dimensions_read_as_zero() {
        let (_dir, store) = store();
        let library = Path::new("/music/Samples");
        let path = store.catalog_file(library);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let json = serde_json::json!({
            "SampleLibrary": {
                "LibraryPath": "/music/Samples",
                "SampleItems": [{
                    "FilePath": "/music/Samples/a.wav",
                    "SampleProperties": {
                        "Title": "a", "Length": 2.0, "LoudnessDecibel": -1.0,
                        "LoudnessLUFS": -9.0, "Tempo": 0, "Key": -1,
                        "FV0": 0.5, "FV3": 0.25
                    }
                }]
            }
        });
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let loaded = store.load_catalog(library).unwrap().unwrap();
        let record = &loaded[0];
        assert_eq!(record.tempo(), None);
        assert_eq!(record.key(), None);
        assert_eq!(record.feature_vector().len(), FEATURE_VECTOR_LEN);
        assert_eq!(record.feature_vector()[0], 0.5);
        assert_eq!(record.feature_vector()[1], 0.0);
        assert_eq!(record.feature_vector()[3], 0.25);
    }

    #[test]
    fn test_saved_document_layout() {
        let (_dir, store) = store();
        let library = Path::new("/music/Samples");
        let mut catalog = Catalog::new();
        catalog.add(analysed("/music/Samples/a.wav", 1.0)).unwrap();
        let path = store.save_catalog(library, &catalog).unwrap();

        let json: Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        let item = &json["SampleLibrary"]["SampleItems"][0];
        assert_eq!(item["FilePath"], "/music/Samples/a.wav");
        assert_eq!(item["SampleProperties"]["Tempo"], 124);
        assert_eq!(item["SampleProperties"]["Key"], 14);
        let last = feature_name(FEATURE_VECTOR_LEN - 1);
        assert!(item["SampleProperties"][last.as_str()].is_number());
    }

    #[test]
    fn test_last_opened_directory() {
        let (_dir, store) = store();
        assert_eq!(store.last_opened_directory().unwrap(), None);

        store
            .store_last_opened_directory(Path::new("/music/Samples"))
            .unwrap();
        assert_eq!(
            store.last_opened_directory().unwrap(),
            Some(PathBuf::from("/music/Samples"))
        );
    }

    #[test]
    fn test_save_waits_for_lock() {
        let (_dir, store) = store();
        let store = LibraryStore::new(
            store
                .config()
                .clone()
                .lock_timeout(std::time::Duration::from_millis(30)),
        );
        let _held = FileLock::acquire(
            store.config().lock_file(),
            std::time::Duration::from_millis(30),
        )
        .unwrap();

        let err = store
            .save_catalog(Path::new("/music/Samples"), &Catalog::new())
            .unwrap_err();
        assert!(matches!(err, LibraryError::LockContention(_)));
    }

    #[test]
    fn test_leftover_lock_file_from_crashed_process() {
        let (_dir, store) = store();
        let lock_file = store.config().lock_file();
        fs::create_dir_all(lock_file.parent().unwrap()).unwrap();
        fs::write(&lock_file, "99999").unwrap();

        let mut catalog = Catalog::new();
        catalog.add(analysed("/music/Samples/kick.wav", 1.0)).unwrap();
        for _ in 0..3 {
            store
                .save_catalog(Path::new("/music/Samples"), &catalog)
                .unwrap();
        }
        let records = store
            .load_catalog(Path::new("/music/Samples"))
            .unwrap()
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
