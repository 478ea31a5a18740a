//! AES67/RTP audio test stream generator.
//!
//! Derives a transmit pipeline description from stream parameters (codec,
//! channel count, sample rate, packet time, network destination), activates
//! it on a media engine and supervises the run until end-of-stream, a fatal
//! error or an interrupt.
//!
//! Audio format notes:
//! - Streams carry 16-bit or 24-bit big-endian linear PCM
//! - The test source generates 32-bit float internally
//! - The RTP payloader converts float to the wire format
//!
//! The engine is reached only through the [`engine::Engine`] boundary; the
//! bundled [`engine::TransmitEngine`] realizes descriptions into a paced
//! multicast RTP transmitter.

pub mod cli;
pub mod controller;
pub mod engine;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod sap;

pub use controller::{Controller, PipelineState, RunOutcome};
pub use error::{ActivationError, ConstructionError, StreamError};
pub use params::{Codec, SampleRate, StreamParameters};
pub use pipeline::{build, GraphDescription};

/// RTP payload type asserted by the rtp-caps stage.
pub const RTP_PAYLOAD_TYPE: u8 = 98;

/// Differentiated-services code point for outgoing media packets (AF41).
pub const QOS_DSCP: u8 = 34;
