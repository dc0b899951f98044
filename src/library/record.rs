use std::path::{Path, PathBuf};

pub const NUM_CHROMA: usize = 12;
pub const NUM_SPECTRAL_BANDS: usize = 8;
pub const NUM_SCALAR_FEATURES: usize = 4;
pub const FEATURE_VECTOR_LEN: usize = NUM_CHROMA + NUM_SPECTRAL_BANDS + NUM_SCALAR_FEATURES;

/// Floor used for silent or unmeasurable loudness values.
pub const MIN_DECIBEL: f64 = -100.0;

pub const NUM_KEYS: u8 = 24;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Display name for a key code: 0-11 are major keys from C, 12-23 minor keys from C.
pub fn key_name(key: u8) -> Option<String> {
    if key >= NUM_KEYS {
        return None;
    }
    let mode = if key < 12 { "major" } else { "minor" };
    Some(format!("{} {}", PITCH_CLASSES[(key % 12) as usize], mode))
}

/// Complete output of one analyzer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub length: f64,
    pub loudness_db: f64,
    pub loudness_lufs: f64,
    pub tempo: Option<u32>,
    pub key: Option<u8>,
    pub feature_vector: Vec<f32>,
}

/// One catalog entry describing a single audio file.
///
/// A record with an empty feature vector is unanalyzed and carries sentinel
/// descriptor values.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    path: PathBuf,
    title: String,
    length: f64,
    loudness_db: f64,
    loudness_lufs: f64,
    tempo: Option<u32>,
    key: Option<u8>,
    feature_vector: Vec<f32>,
}

impl SampleRecord {
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            length: 0.0,
            loudness_db: MIN_DECIBEL,
            loudness_lufs: MIN_DECIBEL,
            tempo: None,
            key: None,
            feature_vector: Vec::new(),
        }
    }

    /// New unanalyzed record titled after the file name without extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(path, title)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn set_length(&mut self, length: f64) {
        self.length = length;
    }

    pub fn loudness_db(&self) -> f64 {
        self.loudness_db
    }

    pub fn set_loudness_db(&mut self, loudness_db: f64) {
        self.loudness_db = loudness_db;
    }

    pub fn loudness_lufs(&self) -> f64 {
        self.loudness_lufs
    }

    pub fn set_loudness_lufs(&mut self, loudness_lufs: f64) {
        self.loudness_lufs = loudness_lufs;
    }

    pub fn tempo(&self) -> Option<u32> {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: Option<u32>) {
        self.tempo = tempo;
    }

    pub fn key(&self) -> Option<u8> {
        self.key
    }

    pub fn set_key(&mut self, key: Option<u8>) {
        self.key = key.filter(|k| *k < NUM_KEYS);
    }

    pub fn feature_vector(&self) -> &[f32] {
        &self.feature_vector
    }

    pub fn set_feature_vector(&mut self, feature_vector: Vec<f32>) {
        self.feature_vector = feature_vector;
    }

    pub fn is_analyzed(&self) -> bool {
        !self.feature_vector.is_empty()
    }

    /// Overwrite every descriptor field at once.
    pub fn apply_analysis(&mut self, analysis: Analysis) {
        self.length = analysis.length;
        self.loudness_db = analysis.loudness_db;
        self.loudness_lufs = analysis.loudness_lufs;
        self.tempo = analysis.tempo;
        self.set_key(analysis.key);
        self.feature_vector = analysis.feature_vector;
    }

    /// Reset all descriptors to their sentinels, keeping path and title.
    pub fn mark_unanalyzed(&mut self) {
        let title = std::mem::take(&mut self.title);
        *self = Self::new(std::mem::take(&mut self.path), title);
    }
}

impl PartialEq for SampleRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for SampleRecord {}
