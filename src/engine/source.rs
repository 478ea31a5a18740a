//! Sine test source standing in for a capture device.

use std::f64::consts::TAU;

/// Outcome of one fill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Buffer filled; the stream continues.
    Filled,
    /// Buffer budget exhausted; nothing was written.
    Finished,
}

/// Sine wave generator producing interleaved float frames.
///
/// An optional buffer budget bounds the stream: once the configured number
/// of buffers has been delivered the source reports end of stream.
pub struct TestSource {
    frequency_hz: f64,
    volume: f32,
    sample_rate: u32,
    channels: u16,
    phase: f64,
    remaining_buffers: Option<u64>,
}

impl TestSource {
    pub fn new(
        frequency_hz: f64,
        volume: f64,
        sample_rate: u32,
        channels: u16,
        num_buffers: Option<u64>,
    ) -> Self {
        Self {
            frequency_hz,
            volume: volume as f32,
            sample_rate,
            channels,
            phase: 0.0,
            remaining_buffers: num_buffers,
        }
    }

    /// Fill one interleaved packet buffer.
    ///
    /// The same tone goes to every channel. Phase carries across calls, so
    /// consecutive buffers form a continuous waveform.
    pub fn fill(&mut self, buffer: &mut [f32]) -> SourceStatus {
        if let Some(remaining) = self.remaining_buffers.as_mut() {
            if *remaining == 0 {
                return SourceStatus::Finished;
            }
            *remaining -= 1;
        }

        let step = TAU * self.frequency_hz / f64::from(self.sample_rate);
        for frame in buffer.chunks_mut(self.channels as usize) {
            let value = self.phase.sin() as f32 * self.volume;
            frame.fill(value);
            self.phase += step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
        SourceStatus::Filled
    }
}
