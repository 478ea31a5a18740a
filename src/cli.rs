//! Command-line surface.

use std::net::Ipv4Addr;

use clap::Parser;

use crate::params::{Codec, SampleRate, StreamParameters};

/// Generate an AES67/RTP audio test stream.
#[derive(Debug, Clone, Parser)]
#[command(name = "aes67-gen")]
#[command(about = "Generate RTP audio test streams")]
pub struct Cli {
    /// Audio codec.
    #[arg(long, value_enum, default_value_t = Codec::L24)]
    pub codec: Codec,

    /// Packet time in milliseconds.
    #[arg(long, value_parser = parse_packet_time, default_value = "1")]
    pub packettime: f64,

    /// Number of audio channels.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=64), default_value_t = 8)]
    pub channels: u16,

    /// Sample rate in Hz.
    #[arg(long, value_enum, default_value_t = SampleRate::Hz48000)]
    pub samplerate: SampleRate,

    /// UDP destination port.
    #[arg(long = "udp-port", default_value_t = 5004)]
    pub udp_port: u16,

    /// UDP multicast destination address.
    #[arg(long = "multicast-address", default_value = "239.69.0.121")]
    pub multicast_address: Ipv4Addr,

    /// Egress network interface: device name, or the interface's IPv4 address.
    #[arg(long = "multicast-iface", default_value = "en7")]
    pub multicast_iface: String,

    /// Additional test-source tuning (e.g. 'freq=480 volume=0.1').
    #[arg(long = "audiotestsrc-params", default_value = "")]
    pub audiotestsrc_params: String,

    /// Announce the stream over SAP/SDP while it plays.
    #[arg(long = "sap-announce")]
    pub sap_announce: bool,
}

fn parse_packet_time(raw: &str) -> Result<f64, String> {
    let ms: f64 = raw
        .parse()
        .map_err(|err| format!("invalid packet time '{raw}': {err}"))?;
    if !ms.is_finite() || ms <= 0.0 {
        return Err(format!("packet time must be positive, got {ms}"));
    }
    Ok(ms)
}

impl Cli {
    /// Convert parsed arguments into validated stream parameters.
    pub fn stream_parameters(&self) -> StreamParameters {
        StreamParameters {
            codec: self.codec,
            packet_time_ms: self.packettime,
            channels: self.channels,
            sample_rate: self.samplerate,
            udp_port: self.udp_port,
            multicast_address: self.multicast_address,
            multicast_iface: self.multicast_iface.clone(),
            source_params: self.audiotestsrc_params.clone(),
        }
    }
}
