pub mod key;
pub mod loudness;
pub mod sample;
pub mod spectral;
pub mod tempo;
