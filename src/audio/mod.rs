pub mod decoder;

pub use decoder::{is_supported_audio_file, AudioDecoder, DecodedAudio, SUPPORTED_EXTENSIONS};
