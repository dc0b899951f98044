use crate::library::record::NUM_CHROMA;

// Krumhansl-Kessler probe tone profiles, tonic first.
const MAJOR_PROFILE: [f32; NUM_CHROMA] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; NUM_CHROMA] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len() as f32;
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;
    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f32::EPSILON || var_b <= f32::EPSILON {
        return 0.0;
    }
    covariance / (var_a * var_b).sqrt()
}

fn rotated(profile: &[f32; NUM_CHROMA], tonic: usize) -> [f32; NUM_CHROMA] {
    let mut out = [0.0; NUM_CHROMA];
    for (pc, slot) in out.iter_mut().enumerate() {
        *slot = profile[(pc + NUM_CHROMA - tonic) % NUM_CHROMA];
    }
    out
}

/// Best-correlated key code for a chroma histogram: 0-11 major, 12-23 minor.
/// A flat histogram (silence, noise with no pitch content) has no key.
pub fn estimate_key(chroma: &[f32; NUM_CHROMA]) -> Option<u8> {
    let mean = chroma.iter().sum::<f32>() / NUM_CHROMA as f32;
    let spread: f32 = chroma.iter().map(|c| (c - mean).abs()).sum();
    if spread <= f32::EPSILON {
        return None;
    }

    let mut best: Option<(u8, f32)> = None;
    for tonic in 0..NUM_CHROMA {
        let candidates = [
            (tonic as u8, correlation(chroma, &rotated(&MAJOR_PROFILE, tonic))),
            ((tonic + NUM_CHROMA) as u8, correlation(chroma, &rotated(&MINOR_PROFILE, tonic))),
        ];
        for (key, score) in candidates {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((key, score));
            }
        }
    }
    best.map(|(key, _)| key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_profile_rotation() {
        assert_eq!(estimate_key(&rotated(&MAJOR_PROFILE, 0)), Some(0));
        assert_eq!(estimate_key(&rotated(&MAJOR_PROFILE, 7)), Some(7));
    }

    #[test]
    fn test_minor_profile_rotation() {
        assert_eq!(estimate_key(&rotated(&MINOR_PROFILE, 9)), Some(21));
    }

    #[test]
    fn test_triad_detection() {
        // C, E, G
        let mut chroma = [0.0; NUM_CHROMA];
        chroma[0] = 0.4;
        chroma[4] = 0.3;
        chroma[7] = 0.3;
        assert_eq!(estimate_key(&chroma), Some(0));
    }

    #[test]
    fn test_flat_chroma_has_no_key() {
        assert_eq!(estimate_key(&[0.0; NUM_CHROMA]), None);
        assert_eq!(estimate_key(&[1.0 / 12.0; NUM_CHROMA]), None);
    }
}
