#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

pub const SAMPLE_RATE: u32 = 44100;

fn write_wav(path: &Path, channels: u16, frames: impl Iterator<Item = f32>) {
    let spec = WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for value in frames {
        let sample = (value.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Stereo sine wave with both channels identical.
pub fn write_sine_wav(path: &Path, seconds: f32, frequency: f32, amplitude: f32) {
    let frames = (SAMPLE_RATE as f32 * seconds) as usize;
    write_wav(
        path,
        2,
        (0..frames).map(|i| amplitude * (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin()),
    );
}

/// Mono train of short decaying 1 kHz bursts, one every `60 / bpm` seconds.
pub fn write_click_wav(path: &Path, seconds: f32, bpm: f32) {
    let frames = (SAMPLE_RATE as f32 * seconds) as usize;
    let period = (SAMPLE_RATE as f32 * 60.0 / bpm) as usize;
    let burst = (SAMPLE_RATE as f32 * 0.01) as usize;
    write_wav(
        path,
        1,
        (0..frames).map(|i| {
            let offset = i % period;
            if offset < burst {
                let t = offset as f32 / SAMPLE_RATE as f32;
                0.8 * (-t / 0.002).exp() * (2.0 * PI * 1000.0 * t).sin()
            } else {
                0.0
            }
        }),
    );
}
