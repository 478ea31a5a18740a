//! Stream parameter model.

use std::net::Ipv4Addr;

use clap::ValueEnum;
use thiserror::Error;

/// Audio codec for the generated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Codec {
    /// 16-bit big-endian linear PCM.
    L16,
    /// 24-bit big-endian linear PCM.
    L24,
}

/// Sample rates supported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SampleRate {
    /// 48 kHz.
    #[value(name = "48000")]
    Hz48000,
    /// 96 kHz.
    #[value(name = "96000")]
    Hz96000,
}

impl SampleRate {
    /// Rate in Hz.
    pub fn as_hz(self) -> u32 {
        match self {
            Self::Hz48000 => 48_000,
            Self::Hz96000 => 96_000,
        }
    }
}

/// Smallest accepted channel count.
pub const MIN_CHANNELS: u16 = 1;
/// Largest accepted channel count.
pub const MAX_CHANNELS: u16 = 64;

/// Immutable configuration for one streaming run.
///
/// Once validated, the parameters fully determine the pipeline description,
/// up to the randomized frequency fallback which is drawn once per build.
#[derive(Debug, Clone)]
pub struct StreamParameters {
    pub codec: Codec,
    /// Packet duration in milliseconds; fixed for the whole run.
    pub packet_time_ms: f64,
    pub channels: u16,
    pub sample_rate: SampleRate,
    pub udp_port: u16,
    /// Destination group address for the transmission sink.
    pub multicast_address: Ipv4Addr,
    /// Egress interface: device name or interface IPv4 address.
    pub multicast_iface: String,
    /// Free-form test-source tuning; empty selects a randomized frequency.
    pub source_params: String,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            codec: Codec::L24,
            packet_time_ms: 1.0,
            channels: 8,
            sample_rate: SampleRate::Hz48000,
            udp_port: 5004,
            multicast_address: Ipv4Addr::new(239, 69, 0, 121),
            multicast_iface: "en7".to_string(),
            source_params: String::new(),
        }
    }
}

/// Parameter rejected at the configuration boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidParameter {
    /// Channel count outside the accepted range.
    #[error("channel count {channels} outside [1, 64]")]
    Channels { channels: u16 },
    /// Packet time not a positive finite duration.
    #[error("packet time must be positive, got {ms} ms")]
    PacketTime { ms: f64 },
}

impl StreamParameters {
    /// Check the range constraints the pipeline builder relies on.
    ///
    /// The command-line layer enforces these while parsing; callers that
    /// assemble parameters programmatically go through here instead.
    pub fn validate(&self) -> Result<(), InvalidParameter> {
        if self.channels < MIN_CHANNELS || self.channels > MAX_CHANNELS {
            return Err(InvalidParameter::Channels {
                channels: self.channels,
            });
        }
        if !self.packet_time_ms.is_finite() || self.packet_time_ms <= 0.0 {
            return Err(InvalidParameter::PacketTime {
                ms: self.packet_time_ms,
            });
        }
        Ok(())
    }
}
