use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::library::record::{NUM_CHROMA, NUM_SPECTRAL_BANDS};

pub const FRAME_SIZE: usize = 2048;
pub const HOP_SIZE: usize = 512;

const CHROMA_MIN_HZ: f32 = 55.0;
const CHROMA_MAX_HZ: f32 = 5000.0;
const ROLLOFF_FRACTION: f32 = 0.85;
const SILENT_FRAME_POWER: f32 = 1e-10;

/// Upper edges of the spectral bands; the last band runs to Nyquist.
const BAND_EDGES_HZ: [f32; NUM_SPECTRAL_BANDS - 1] =
    [100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0];

/// Frame-averaged spectral descriptors of a mono signal.
#[derive(Debug, Clone)]
pub struct SpectralFeatures {
    /// Pitch-class magnitudes, summing to 1 (all zero for silence).
    pub chroma: [f32; NUM_CHROMA],
    /// Fractions of total power per band, summing to 1 (all zero for silence).
    pub band_energies: [f32; NUM_SPECTRAL_BANDS],
    /// Mean spectral centroid divided by Nyquist.
    pub centroid: f32,
    /// Mean 85% roll-off frequency divided by Nyquist.
    pub rolloff: f32,
    /// Mean spectral flatness (geometric over arithmetic mean of power).
    pub flatness: f32,
    /// Half-wave rectified spectral flux, one value per hop.
    pub onset_envelope: Vec<f32>,
    /// Envelope values per second.
    pub frame_rate: f64,
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()
        })
        .collect()
}

fn pitch_class(freq: f32) -> Option<usize> {
    if !(CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&freq) {
        return None;
    }
    let midi = (69.0 + 12.0 * (freq / 440.0).log2()).round() as i32;
    Some(midi.rem_euclid(12) as usize)
}

fn band_index(freq: f32) -> usize {
    BAND_EDGES_HZ
        .iter()
        .position(|&edge| freq < edge)
        .unwrap_or(NUM_SPECTRAL_BANDS - 1)
}

fn normalize<const N: usize>(values: &mut [f32; N]) {
    let total: f32 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

impl SpectralFeatures {
    pub fn compute(mono: &[f32], sample_rate: u32) -> Self {
        let bins = FRAME_SIZE / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let bin_hz = sample_rate as f32 / FRAME_SIZE as f32;

        let window = hann_window(FRAME_SIZE);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(FRAME_SIZE);
        let chroma_map: Vec<Option<usize>> =
            (0..bins).map(|k| pitch_class(k as f32 * bin_hz)).collect();
        let band_map: Vec<usize> = (0..bins).map(|k| band_index(k as f32 * bin_hz)).collect();

        let frame_count = if mono.len() <= FRAME_SIZE {
            1
        } else {
            1 + (mono.len() - FRAME_SIZE) / HOP_SIZE
        };

        let mut chroma = [0.0f32; NUM_CHROMA];
        let mut band_energies = [0.0f32; NUM_SPECTRAL_BANDS];
        let mut centroid_sum = 0.0f32;
        let mut rolloff_sum = 0.0f32;
        let mut flatness_sum = 0.0f32;
        let mut voiced_frames = 0usize;
        let mut onset_envelope = Vec::with_capacity(frame_count);

        let mut buffer = vec![Complex::new(0.0f32, 0.0); FRAME_SIZE];
        let mut magnitudes = vec![0.0f32; bins];
        let mut previous = vec![0.0f32; bins];
        let mut power = vec![0.0f32; bins];

        for frame in 0..frame_count {
            let start = frame * HOP_SIZE;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = mono.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * window[i], 0.0);
            }
            fft.process(&mut buffer);

            let mut flux = 0.0f32;
            for k in 0..bins {
                let magnitude = buffer[k].norm();
                flux += (magnitude - previous[k]).max(0.0);
                magnitudes[k] = magnitude;
                power[k] = magnitude * magnitude;
            }
            onset_envelope.push(flux);
            std::mem::swap(&mut magnitudes, &mut previous);

            let total_power: f32 = power.iter().sum();
            if total_power <= SILENT_FRAME_POWER {
                continue;
            }
            voiced_frames += 1;

            let mut weighted = 0.0f32;
            let mut log_sum = 0.0f32;
            for k in 0..bins {
                let freq = k as f32 * bin_hz;
                weighted += freq * power[k];
                log_sum += (power[k] + f32::EPSILON).ln();
                band_energies[band_map[k]] += power[k];
                if let Some(pc) = chroma_map[k] {
                    chroma[pc] += previous[k];
                }
            }
            centroid_sum += weighted / total_power / nyquist;

            let threshold = total_power * ROLLOFF_FRACTION;
            let mut cumulative = 0.0f32;
            let rolloff_bin = power
                .iter()
                .position(|&p| {
                    cumulative += p;
                    cumulative >= threshold
                })
                .unwrap_or(bins - 1);
            rolloff_sum += rolloff_bin as f32 * bin_hz / nyquist;

            let geometric = (log_sum / bins as f32).exp();
            let arithmetic = total_power / bins as f32;
            flatness_sum += (geometric / (arithmetic + f32::EPSILON)).min(1.0);
        }

        normalize(&mut chroma);
        normalize(&mut band_energies);

        let average = |sum: f32| {
            if voiced_frames > 0 {
                sum / voiced_frames as f32
            } else {
                0.0
            }
        };

        Self {
            chroma,
            band_energies,
            centroid: average(centroid_sum),
            rolloff: average(rolloff_sum),
            flatness: average(flatness_sum),
            onset_envelope,
            frame_rate: sample_rate as f64 / HOP_SIZE as f64,
        }
    }
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(mono: &[f32]) -> f32 {
    if mono.len() < 2 {
        return 0.0;
    }
    let crossings = mono
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (mono.len() - 1) as f32
}
