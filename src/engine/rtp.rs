//! RTP packetizer for L16/L24 linear PCM payloads.

use crate::pipeline::SampleFormat;

/// Fixed RTP header size: no CSRCs, no extensions.
pub const RTP_HEADER_LEN: usize = 12;

/// RTP packetizer for one outgoing stream.
///
/// Owns the sequence and timestamp counters and a reusable packet buffer;
/// one call per packet window returns the finished wire bytes.
pub struct RtpPacketizer {
    /// Synchronization source identifier, random per stream.
    ssrc: u32,
    /// Sequence number, wraps at 65535.
    sequence: u16,
    /// Media timestamp in frames at the stream clock rate.
    timestamp: u32,
    payload_type: u8,
    format: SampleFormat,
    packet: Vec<u8>,
}

impl RtpPacketizer {
    pub fn new(ssrc: u32, payload_type: u8, format: SampleFormat) -> Self {
        Self {
            ssrc,
            sequence: 0,
            timestamp: 0,
            payload_type,
            format,
            packet: Vec::with_capacity(RTP_HEADER_LEN + 1500),
        }
    }

    /// Packetize one window of interleaved float samples.
    ///
    /// `samples.len()` must be a multiple of `channels`. The returned slice
    /// borrows the internal buffer and stays valid until the next call.
    pub fn packetize(&mut self, samples: &[f32], channels: u16) -> &[u8] {
        let frames = samples.len() / channels as usize;
        let packet_len = RTP_HEADER_LEN + samples.len() * self.format.bytes_per_sample();

        self.packet.clear();
        self.packet.reserve(packet_len);
        // V=2, no padding, no extension, zero CSRCs
        self.packet.push(0x80);
        // M=0 plus the payload type
        self.packet.push(self.payload_type & 0x7F);
        self.packet.extend_from_slice(&self.sequence.to_be_bytes());
        self.packet.extend_from_slice(&self.timestamp.to_be_bytes());
        self.packet.extend_from_slice(&self.ssrc.to_be_bytes());

        encode_payload(samples, self.format, &mut self.packet);
        debug_assert_eq!(self.packet.len(), packet_len);

        self.sequence = self.sequence.wrapping_add(1);
        // The media clock advances in frames, not interleaved samples
        self.timestamp = self.timestamp.wrapping_add(frames as u32);

        &self.packet
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }
}

/// Append big-endian PCM for `samples` to `out`.
///
/// Floats are clamped to [-1.0, 1.0] and scaled to the full positive range
/// of the target width; only the top bytes of the scaled value go on the
/// wire, so negative values rely on two's-complement truncation.
pub fn encode_payload(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    match format {
        SampleFormat::S16Be => {
            for &sample in samples {
                let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                out.extend_from_slice(&value.to_be_bytes());
            }
        }
        SampleFormat::S24Be => {
            for &sample in samples {
                let value = (f64::from(sample.clamp(-1.0, 1.0)) * 8_388_607.0) as i32;
                let wire = (value as u32) & 0x00FF_FFFF;
                out.extend_from_slice(&[(wire >> 16) as u8, (wire >> 8) as u8, wire as u8]);
            }
        }
    }
}
