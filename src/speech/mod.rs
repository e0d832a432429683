//! Speech ports — platform-abstracted voice output and audio input.

pub mod input;
pub mod output;

pub use input::{AudioCapture, InputEvent, SpeechInput, UnsupportedCapture};
pub use output::{SpeechOutput, SynthesisEvent, Synthesizer, UnsupportedSynthesizer, Voice};
