use std::path::Path;

use log::debug;

use crate::analyzers::key::estimate_key;
use crate::analyzers::loudness::{integrated_loudness, peak_decibels};
use crate::analyzers::spectral::{zero_crossing_rate, SpectralFeatures};
use crate::analyzers::tempo::estimate_tempo;
use crate::audio::decoder::{AudioDecoder, DecodedAudio};
use crate::library::record::{Analysis, SampleRecord, FEATURE_VECTOR_LEN};
use crate::Result;

/// Produces descriptors for one audio file.
pub trait Analyze: Send + Sync {
    fn analyze(&self, path: &Path) -> Result<Analysis>;

    /// Analyze into an existing record. Without `force_analysis`, a record that
    /// already carries a feature vector is left alone and `Ok(false)` returned.
    /// On failure the record is reset to unanalyzed sentinels.
    fn analyze_record(&self, record: &mut SampleRecord, force_analysis: bool) -> Result<bool> {
        if !force_analysis && record.is_analyzed() {
            debug!("Skipping analysed sample: {}", record.path().display());
            return Ok(false);
        }
        match self.analyze(record.path()) {
            Ok(analysis) => {
                record.apply_analysis(analysis);
                Ok(true)
            }
            Err(e) => {
                record.mark_unanalyzed();
                Err(e)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SampleAnalyzer;

impl SampleAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_audio(audio: &DecodedAudio) -> Result<Analysis> {
        let mono = audio.to_mono();
        let spectral = SpectralFeatures::compute(&mono, audio.sample_rate);

        let mut feature_vector = Vec::with_capacity(FEATURE_VECTOR_LEN);
        feature_vector.extend_from_slice(&spectral.chroma);
        feature_vector.extend_from_slice(&spectral.band_energies);
        feature_vector.extend_from_slice(&[
            zero_crossing_rate(&mono),
            spectral.centroid,
            spectral.rolloff,
            spectral.flatness,
        ]);
        debug_assert_eq!(feature_vector.len(), FEATURE_VECTOR_LEN);

        Ok(Analysis {
            length: audio.duration_secs(),
            loudness_db: peak_decibels(&audio.samples),
            loudness_lufs: integrated_loudness(&audio.samples, audio.channels, audio.sample_rate)?,
            tempo: estimate_tempo(&spectral.onset_envelope, spectral.frame_rate),
            key: estimate_key(&spectral.chroma),
            feature_vector,
        })
    }
}

impl Analyze for SampleAnalyzer {
    fn analyze(&self, path: &Path) -> Result<Analysis> {
        let audio = AudioDecoder::decode_file(path)?;
        let analysis = Self::analyze_audio(&audio)?;
        debug!(
            "Analysed {}: {:.2}s, {:.1} dB, {:.1} LUFS, tempo {:?}, key {:?}",
            path.display(),
            analysis.length,
            analysis.loudness_db,
            analysis.loudness_lufs,
            analysis.tempo,
            analysis.key
        );
        Ok(analysis)
    }
}
