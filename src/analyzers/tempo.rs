pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 200.0;

/// Normalized autocorrelation the best lag must reach to count as a tempo.
const MIN_PERIODICITY: f64 = 0.1;
const MIN_ENVELOPE_SECS: f64 = 2.0;

/// Estimate tempo from an onset strength envelope sampled at `frame_rate`.
///
/// Returns `None` when the envelope is too short, flat, or shows no clear
/// periodicity between `MIN_BPM` and `MAX_BPM`.
pub fn estimate_tempo(envelope: &[f32], frame_rate: f64) -> Option<u32> {
    if frame_rate <= 0.0 || (envelope.len() as f64) < frame_rate * MIN_ENVELOPE_SECS {
        return None;
    }

    let mean = envelope.iter().map(|&v| v as f64).sum::<f64>() / envelope.len() as f64;
    let centered: Vec<f64> = envelope.iter().map(|&v| v as f64 - mean).collect();
    let energy: f64 = centered.iter().map(|v| v * v).sum();
    if energy <= f64::EPSILON {
        return None;
    }

    let min_lag = ((frame_rate * 60.0 / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((frame_rate * 60.0 / MIN_BPM).ceil() as usize).min(centered.len() - 1);
    if min_lag >= max_lag {
        return None;
    }

    let autocorrelation = |lag: usize| -> f64 {
        centered
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / energy
    };

    let scores: Vec<f64> = (min_lag..=max_lag).map(autocorrelation).collect();
    let (best, best_score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, s)| if s > acc.1 { (i, s) } else { acc });

    if best_score < MIN_PERIODICITY {
        return None;
    }

    // Parabolic interpolation around the peak for sub-frame lag precision.
    let mut lag = (min_lag + best) as f64;
    if best > 0 && best + 1 < scores.len() {
        let (left, right) = (scores[best - 1], scores[best + 1]);
        let denominator = left - 2.0 * best_score + right;
        if denominator.abs() > f64::EPSILON {
            lag += (0.5 * (left - right) / denominator).clamp(-0.5, 0.5);
        }
    }

    let bpm = (60.0 * frame_rate / lag).round();
    Some(bpm.clamp(MIN_BPM, MAX_BPM) as u32)
}
