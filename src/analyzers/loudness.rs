use ebur128::{EbuR128, Mode};

use crate::library::record::MIN_DECIBEL;
use crate::{LibraryError, Result};

pub fn gain_to_decibels(gain: f64) -> f64 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(MIN_DECIBEL)
    } else {
        MIN_DECIBEL
    }
}

/// Peak level in dBFS over all channels of interleaved samples.
pub fn peak_decibels(samples: &[f32]) -> f64 {
    let peak = samples
        .iter()
        .fold(0.0f32, |max, &sample| max.max(sample.abs()));
    gain_to_decibels(peak as f64)
}

/// Integrated loudness (EBU R128 / BS.1770) of interleaved samples.
///
/// Gated loudness is undefined for silence and for material shorter than one
/// 400 ms block; both report the silence floor.
pub fn integrated_loudness(samples: &[f32], channels: usize, sample_rate: u32) -> Result<f64> {
    let mut meter = EbuR128::new(channels as u32, sample_rate, Mode::I)
        .map_err(|e| LibraryError::Analysis(format!("Failed to create loudness meter: {}", e)))?;

    meter
        .add_frames_f32(samples)
        .map_err(|e| LibraryError::Analysis(format!("Failed to measure loudness: {}", e)))?;

    let lufs = meter
        .loudness_global()
        .map_err(|e| LibraryError::Analysis(format!("Failed to measure loudness: {}", e)))?;

    Ok(if lufs.is_finite() {
        lufs.max(MIN_DECIBEL)
    } else {
        MIN_DECIBEL
    })
}
