//! Transmit engine: realizes pipeline descriptions into a paced RTP
//! transmitter.
//!
//! Instantiation distills a description into a validated runtime
//! configuration; activation opens the transmit socket and spawns the
//! transmitter thread. The thread reads one packet window from the test
//! source per tick, packetizes it and sends it at precise intervals, and
//! posts terminal signals on the status bus.

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::rtp::RtpPacketizer;
use super::sink::{self, IfaceSpec, SinkConfig};
use super::source::{SourceStatus, TestSource};
use super::{Engine, StateChangeError, StatusMessage, TargetState};
use crate::error::ConstructionError;
use crate::pipeline::{GraphDescription, PropValue, SampleFormat, Stage, StageKind};

/// Validated runtime configuration distilled from a description.
#[derive(Debug, Clone)]
struct RuntimeConfig {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
    packet_time_ns: u64,
    frames_per_packet: usize,
    payload_type: u8,
    sink: SinkConfig,
    frequency_hz: f64,
    volume: f64,
    num_buffers: Option<u64>,
}

/// Lock-free transmit statistics shared with the worker thread.
#[derive(Debug, Default)]
pub struct TxStats {
    packets_sent: AtomicU64,
    frames_sent: AtomicU64,
    send_errors: AtomicU64,
}

impl TxStats {
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }
}

/// Media engine backing the transmit pipeline.
///
/// Create one instance per process and hand it to the controller; all
/// per-run state lives in the handles it produces.
#[derive(Debug, Default)]
pub struct TransmitEngine;

impl TransmitEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Runtime graph: validated configuration, status bus and worker state.
pub struct TransmitHandle {
    config: RuntimeConfig,
    bus_tx: Sender<StatusMessage>,
    bus_rx: Receiver<StatusMessage>,
    running: Arc<AtomicBool>,
    stats: Arc<TxStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransmitHandle {
    /// Transmit statistics, readable while the graph runs.
    pub fn stats(&self) -> &TxStats {
        &self.stats
    }

    fn activate(&self) -> Result<(), StateChangeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(StateChangeError("pipeline is already playing".to_string()));
        }

        let socket = match sink::open_socket(&self.config.sink) {
            Ok(socket) => socket,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(StateChangeError(format!(
                    "cannot open transmit socket for {}: {err}",
                    self.config.sink.dest()
                )));
            }
        };

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let bus = self.bus_tx.clone();
        let worker = thread::spawn(move || transmitter_loop(config, socket, running, stats, bus));

        *self.worker.lock() = Some(worker);
        Ok(())
    }

    /// Stop the worker and release the socket. Safe to call repeatedly and
    /// on a graph that never reached the playing state.
    fn deactivate(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("transmitter thread panicked during shutdown");
            }
            debug!(
                "transmitter stopped: {} packets, {} frames, {} send errors",
                self.stats.packets_sent(),
                self.stats.frames_sent(),
                self.stats.send_errors()
            );
        }
    }
}

impl Drop for TransmitHandle {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl Engine for TransmitEngine {
    type Handle = TransmitHandle;

    fn instantiate(
        &self,
        description: &GraphDescription,
    ) -> Result<TransmitHandle, ConstructionError> {
        let config = RuntimeConfig::from_description(description)?;
        let (bus_tx, bus_rx) = bounded(16);
        Ok(TransmitHandle {
            config,
            bus_tx,
            bus_rx,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(TxStats::default()),
            worker: Mutex::new(None),
        })
    }

    fn bus(&self, handle: &TransmitHandle) -> Receiver<StatusMessage> {
        handle.bus_rx.clone()
    }

    fn set_state(
        &self,
        handle: &TransmitHandle,
        target: TargetState,
    ) -> Result<(), StateChangeError> {
        match target {
            TargetState::Playing => handle.activate(),
            TargetState::Null => {
                handle.deactivate();
                Ok(())
            }
        }
    }
}

/// Paced transmit loop: coarse sleep, then spin to each packet deadline.
fn transmitter_loop(
    config: RuntimeConfig,
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    stats: Arc<TxStats>,
    bus: Sender<StatusMessage>,
) {
    let mut source = TestSource::new(
        config.frequency_hz,
        config.volume,
        config.sample_rate,
        config.channels,
        config.num_buffers,
    );
    let mut packetizer = RtpPacketizer::new(rand::random(), config.payload_type, config.format);
    let mut buffer = vec![0.0f32; config.frames_per_packet * config.channels as usize];

    let dest = config.sink.dest();
    let interval = Duration::from_nanos(config.packet_time_ns);
    let mut next_tx = Instant::now() + interval;

    while running.load(Ordering::SeqCst) {
        wait_until(next_tx);

        if source.fill(&mut buffer) == SourceStatus::Finished {
            debug!("test source delivered its final buffer");
            let _ = bus.send(StatusMessage::EndOfStream);
            return;
        }

        let packet = packetizer.packetize(&buffer, config.channels);
        match socket.send_to(packet, dest) {
            Ok(_) => {
                stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                stats
                    .frames_sent
                    .fetch_add(config.frames_per_packet as u64, Ordering::Relaxed);
            }
            Err(err) if is_transient(&err) => {
                // Dropped packet; the pacing clock keeps running.
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
                let _ = bus.send(StatusMessage::Error {
                    message: format!("transmit to {dest} failed: {err}"),
                    debug: Some(format!(
                        "{} packets sent before the fault",
                        stats.packets_sent()
                    )),
                });
                return;
            }
        }

        // Schedule the next window off the previous deadline so pacing does
        // not drift with per-packet jitter. If filling or sending left us
        // more than one window late, resynchronize rather than burst.
        next_tx += interval;
        let now = Instant::now();
        if now > next_tx + interval {
            next_tx = now + interval;
        }
    }
}

/// Sleep coarsely toward a deadline, then spin out the tail. OS sleep
/// granularity is too coarse for millisecond packet windows on its own.
fn wait_until(deadline: Instant) {
    let now = Instant::now();
    if deadline <= now {
        return;
    }
    if deadline - now > Duration::from_millis(2) {
        thread::sleep(deadline - now - Duration::from_millis(1));
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl RuntimeConfig {
    /// Distill and validate a description.
    ///
    /// Rejects anything the transmitter cannot execute: wrong stage order,
    /// unknown stages or properties, unparseable values, and cross-stage
    /// inconsistencies such as an rtp-caps clock rate that contradicts the
    /// raw caps.
    fn from_description(description: &GraphDescription) -> Result<Self, ConstructionError> {
        let stages = description.stages();
        if stages.len() != 6 {
            return Err(ConstructionError(format!(
                "unsupported pipeline layout: expected 6 stages, found {}",
                stages.len()
            )));
        }

        let (frequency_hz, volume, num_buffers) = parse_source(expect_stage(
            &stages[0],
            StageKind::TestSource,
        )?)?;
        expect_bare(expect_stage(&stages[1], StageKind::AudioConvert)?)?;
        let (format, channels, sample_rate) =
            parse_format_caps(expect_stage(&stages[2], StageKind::FormatCaps)?)?;
        let packet_time_ns = parse_payloader(&stages[3], format)?;
        let payload_type = parse_rtp_caps(&stages[4], sample_rate, channels)?;
        let sink = parse_sink(expect_stage(&stages[5], StageKind::UdpSink)?)?;

        let frames_per_packet =
            (u64::from(sample_rate) * packet_time_ns / 1_000_000_000) as usize;
        if frames_per_packet == 0 {
            return Err(ConstructionError(format!(
                "invalid packet time: {packet_time_ns} ns yields no frames per packet at {sample_rate} Hz"
            )));
        }

        Ok(Self {
            format,
            channels,
            sample_rate,
            packet_time_ns,
            frames_per_packet,
            payload_type,
            sink,
            frequency_hz,
            volume,
            num_buffers,
        })
    }
}

fn expect_stage(stage: &Stage, kind: StageKind) -> Result<&Stage, ConstructionError> {
    if stage.kind() != kind {
        return Err(ConstructionError(format!(
            "unsupported pipeline layout: expected {}, found {}",
            kind.as_str(),
            stage.kind().as_str()
        )));
    }
    Ok(stage)
}

fn expect_bare(stage: &Stage) -> Result<(), ConstructionError> {
    if let Some((name, _)) = stage.props().first() {
        return Err(unknown_property(stage.kind(), name));
    }
    Ok(())
}

fn unknown_property(kind: StageKind, name: &str) -> ConstructionError {
    ConstructionError(format!("{} has no property '{name}'", kind.as_str()))
}

fn bad_value(kind: StageKind, name: &str, value: &PropValue) -> ConstructionError {
    ConstructionError(format!(
        "{} property '{name}' has invalid value '{value}'",
        kind.as_str()
    ))
}

fn missing_property(kind: StageKind, name: &str) -> ConstructionError {
    ConstructionError(format!("{} is missing property '{name}'", kind.as_str()))
}

fn parse_source(stage: &Stage) -> Result<(f64, f64, Option<u64>), ConstructionError> {
    let mut frequency_hz = 440.0;
    let mut volume = 0.8;
    let mut num_buffers = None;

    for (name, value) in stage.props() {
        match name.as_str() {
            "freq" => {
                frequency_hz = value
                    .as_f64()
                    .filter(|freq| *freq > 0.0)
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
            }
            "volume" => {
                volume = value
                    .as_f64()
                    .filter(|vol| (0.0..=1.0).contains(vol))
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
            }
            "num-buffers" => {
                num_buffers = Some(
                    value
                        .as_u64()
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            _ => return Err(unknown_property(stage.kind(), name)),
        }
    }

    Ok((frequency_hz, volume, num_buffers))
}

fn parse_format_caps(stage: &Stage) -> Result<(SampleFormat, u16, u32), ConstructionError> {
    let mut format = None;
    let mut channels = None;
    let mut rate = None;

    for (name, value) in stage.props() {
        match name.as_str() {
            "format" => {
                format = Some(
                    value
                        .as_str()
                        .and_then(SampleFormat::from_caps)
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            "channels" => {
                channels = Some(
                    value
                        .as_u64()
                        .and_then(|count| u16::try_from(count).ok())
                        .filter(|count| (1..=64).contains(count))
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            "rate" => {
                rate = Some(
                    value
                        .as_u64()
                        .and_then(|hz| u32::try_from(hz).ok())
                        .filter(|hz| *hz > 0)
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            _ => return Err(unknown_property(stage.kind(), name)),
        }
    }

    Ok((
        format.ok_or_else(|| missing_property(stage.kind(), "format"))?,
        channels.ok_or_else(|| missing_property(stage.kind(), "channels"))?,
        rate.ok_or_else(|| missing_property(stage.kind(), "rate"))?,
    ))
}

fn parse_payloader(stage: &Stage, format: SampleFormat) -> Result<u64, ConstructionError> {
    let expected = match stage.kind() {
        StageKind::RtpL16Pay => SampleFormat::S16Be,
        StageKind::RtpL24Pay => SampleFormat::S24Be,
        other => {
            return Err(ConstructionError(format!(
                "unsupported pipeline layout: {} cannot payload raw audio",
                other.as_str()
            )))
        }
    };
    if format != expected {
        return Err(ConstructionError(format!(
            "{} cannot take upstream format {}",
            stage.kind().as_str(),
            format.as_caps()
        )));
    }

    let mut min_ptime = None;
    let mut max_ptime = None;
    for (name, value) in stage.props() {
        match name.as_str() {
            "min-ptime" => {
                min_ptime = Some(
                    value
                        .as_u64()
                        .filter(|ns| *ns > 0)
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            "max-ptime" => {
                max_ptime = Some(
                    value
                        .as_u64()
                        .filter(|ns| *ns > 0)
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            _ => return Err(unknown_property(stage.kind(), name)),
        }
    }

    let min_ptime = min_ptime.ok_or_else(|| missing_property(stage.kind(), "min-ptime"))?;
    let max_ptime = max_ptime.ok_or_else(|| missing_property(stage.kind(), "max-ptime"))?;
    if min_ptime != max_ptime {
        // Adaptive packet windows are not supported; the duration is fixed.
        return Err(ConstructionError(format!(
            "{} requires min-ptime == max-ptime, got {min_ptime} and {max_ptime}",
            stage.kind().as_str()
        )));
    }
    Ok(min_ptime)
}

fn parse_rtp_caps(
    stage: &Stage,
    sample_rate: u32,
    channels: u16,
) -> Result<u8, ConstructionError> {
    expect_stage(stage, StageKind::RtpCaps)?;

    let mut payload_type = None;
    for (name, value) in stage.props() {
        match name.as_str() {
            "clock-rate" => {
                let clock_rate = value
                    .as_u64()
                    .and_then(|hz| u32::try_from(hz).ok())
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
                if clock_rate != sample_rate {
                    return Err(ConstructionError(format!(
                        "rtp-caps clock-rate {clock_rate} contradicts upstream rate {sample_rate}"
                    )));
                }
            }
            "channels" => {
                let count = value
                    .as_u64()
                    .and_then(|count| u16::try_from(count).ok())
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
                if count != channels {
                    return Err(ConstructionError(format!(
                        "rtp-caps channels {count} contradicts upstream channels {channels}"
                    )));
                }
            }
            "payload" => {
                payload_type = Some(
                    value
                        .as_u64()
                        .and_then(|pt| u8::try_from(pt).ok())
                        .filter(|pt| *pt <= 127)
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            _ => return Err(unknown_property(stage.kind(), name)),
        }
    }

    payload_type.ok_or_else(|| missing_property(stage.kind(), "payload"))
}

fn parse_sink(stage: &Stage) -> Result<SinkConfig, ConstructionError> {
    let mut host = None;
    let mut port = None;
    let mut iface = None;
    let mut qos = false;
    let mut dscp = crate::QOS_DSCP;

    for (name, value) in stage.props() {
        match name.as_str() {
            "host" => {
                host = Some(
                    value
                        .as_str()
                        .and_then(|addr| addr.parse::<Ipv4Addr>().ok())
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            "port" => {
                port = Some(
                    value
                        .as_u64()
                        .and_then(|port| u16::try_from(port).ok())
                        .ok_or_else(|| bad_value(stage.kind(), name, value))?,
                );
            }
            "qos" => {
                qos = value
                    .as_bool()
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
            }
            "qos-dscp" => {
                dscp = value
                    .as_u64()
                    .and_then(|dscp| u8::try_from(dscp).ok())
                    .filter(|dscp| *dscp <= 63)
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
            }
            "multicast-iface" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| bad_value(stage.kind(), name, value))?;
                if !raw.is_empty() {
                    iface = Some(IfaceSpec::parse(raw));
                }
            }
            _ => return Err(unknown_property(stage.kind(), name)),
        }
    }

    Ok(SinkConfig {
        host: host.ok_or_else(|| missing_property(stage.kind(), "host"))?,
        port: port.ok_or_else(|| missing_property(stage.kind(), "port"))?,
        iface,
        qos,
        dscp,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::params::{Codec, StreamParameters};
    use crate::pipeline::build;

    fn loopback_params(port: u16) -> StreamParameters {
        StreamParameters {
            codec: Codec::L16,
            channels: 2,
            udp_port: port,
            multicast_address: Ipv4Addr::LOCALHOST,
            multicast_iface: String::new(),
            source_params: "freq=480 num-buffers=5".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn built_description_distills_into_a_runtime_config() {
        let config =
            RuntimeConfig::from_description(&build(&StreamParameters::default())).unwrap();
        assert_eq!(config.format, SampleFormat::S24Be);
        assert_eq!(config.channels, 8);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.packet_time_ns, 1_000_000);
        assert_eq!(config.frames_per_packet, 48);
        assert_eq!(config.payload_type, 98);
        assert!(config.sink.qos);
        assert_eq!(config.sink.dscp, 34);
        assert_eq!(config.sink.port, 5004);
        assert_eq!(
            config.sink.iface,
            Some(IfaceSpec::Name("en7".to_string()))
        );
        assert_eq!(config.num_buffers, None);
    }

    #[test]
    fn source_tuning_reaches_the_config() {
        let params = StreamParameters {
            source_params: "freq=480 volume=0.1 num-buffers=100".to_string(),
            ..Default::default()
        };
        let config = RuntimeConfig::from_description(&build(&params)).unwrap();
        assert_eq!(config.frequency_hz, 480.0);
        assert_eq!(config.volume, 0.1);
        assert_eq!(config.num_buffers, Some(100));
    }

    #[test]
    fn unknown_source_property_is_a_construction_error() {
        let params = StreamParameters {
            source_params: "wave=square".to_string(),
            ..Default::default()
        };
        let err = RuntimeConfig::from_description(&build(&params)).unwrap_err();
        assert!(err.0.contains("no property 'wave'"), "{}", err.0);
    }

    #[test]
    fn reordered_stages_are_rejected() {
        let description = build(&StreamParameters::default());
        let mut stages: Vec<Stage> = description.stages().to_vec();
        stages.swap(0, 1);
        let err = RuntimeConfig::from_description(&GraphDescription::new(stages)).unwrap_err();
        assert!(err.0.contains("unsupported pipeline layout"), "{}", err.0);
    }

    #[test]
    fn truncated_description_is_rejected() {
        let description = build(&StreamParameters::default());
        let stages: Vec<Stage> = description.stages()[..5].to_vec();
        assert!(RuntimeConfig::from_description(&GraphDescription::new(stages)).is_err());
    }

    #[test]
    fn payloader_must_match_the_asserted_format() {
        let stages = vec![
            Stage::new(StageKind::TestSource).with("freq", 480i64),
            Stage::new(StageKind::AudioConvert),
            Stage::new(StageKind::FormatCaps)
                .with("format", "S24BE")
                .with("channels", 2i64)
                .with("rate", 48_000i64),
            Stage::new(StageKind::RtpL16Pay)
                .with("min-ptime", 1_000_000i64)
                .with("max-ptime", 1_000_000i64),
            Stage::new(StageKind::RtpCaps)
                .with("clock-rate", 48_000i64)
                .with("channels", 2i64)
                .with("payload", 98i64),
            Stage::new(StageKind::UdpSink)
                .with("host", "239.69.0.121")
                .with("port", 5004i64),
        ];
        let err = RuntimeConfig::from_description(&GraphDescription::new(stages)).unwrap_err();
        assert!(err.0.contains("cannot take upstream format"), "{}", err.0);
    }

    #[test]
    fn mismatched_clock_rate_is_rejected() {
        let stages = vec![
            Stage::new(StageKind::TestSource).with("freq", 480i64),
            Stage::new(StageKind::AudioConvert),
            Stage::new(StageKind::FormatCaps)
                .with("format", "S16BE")
                .with("channels", 2i64)
                .with("rate", 48_000i64),
            Stage::new(StageKind::RtpL16Pay)
                .with("min-ptime", 1_000_000i64)
                .with("max-ptime", 1_000_000i64),
            Stage::new(StageKind::RtpCaps)
                .with("clock-rate", 96_000i64)
                .with("channels", 2i64)
                .with("payload", 98i64),
            Stage::new(StageKind::UdpSink)
                .with("host", "239.69.0.121")
                .with("port", 5004i64),
        ];
        let err = RuntimeConfig::from_description(&GraphDescription::new(stages)).unwrap_err();
        assert!(err.0.contains("contradicts upstream rate"), "{}", err.0);
    }

    #[test]
    fn adaptive_packet_windows_are_rejected() {
        let stages = vec![
            Stage::new(StageKind::TestSource).with("freq", 480i64),
            Stage::new(StageKind::AudioConvert),
            Stage::new(StageKind::FormatCaps)
                .with("format", "S16BE")
                .with("channels", 2i64)
                .with("rate", 48_000i64),
            Stage::new(StageKind::RtpL16Pay)
                .with("min-ptime", 500_000i64)
                .with("max-ptime", 1_000_000i64),
            Stage::new(StageKind::RtpCaps)
                .with("clock-rate", 48_000i64)
                .with("channels", 2i64)
                .with("payload", 98i64),
            Stage::new(StageKind::UdpSink)
                .with("host", "239.69.0.121")
                .with("port", 5004i64),
        ];
        let err = RuntimeConfig::from_description(&GraphDescription::new(stages)).unwrap_err();
        assert!(err.0.contains("min-ptime == max-ptime"), "{}", err.0);
    }

    #[test]
    fn sub_frame_packet_time_is_rejected() {
        // 0.001 ms at 48 kHz is less than one frame per packet
        let params = StreamParameters {
            packet_time_ms: 0.001,
            ..Default::default()
        };
        let err = RuntimeConfig::from_description(&build(&params)).unwrap_err();
        assert!(err.0.contains("no frames per packet"), "{}", err.0);
    }

    #[test]
    fn transmits_packets_and_posts_end_of_stream() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("receiver socket");
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let description = build(&loopback_params(port));
        let engine = TransmitEngine::new();
        let handle = engine.instantiate(&description).unwrap();
        let bus = engine.bus(&handle);
        engine.set_state(&handle, TargetState::Playing).unwrap();

        let mut packet = [0u8; 2048];
        let len = receiver.recv(&mut packet).expect("first packet");
        // 12-byte header plus 48 frames of 2-channel 16-bit PCM
        assert_eq!(len, 12 + 48 * 2 * 2);
        assert_eq!(packet[0], 0x80);
        assert_eq!(packet[1], 98);

        let message = bus.recv_timeout(Duration::from_secs(2)).expect("bus signal");
        assert_eq!(message, StatusMessage::EndOfStream);

        engine.set_state(&handle, TargetState::Null).unwrap();
        let sent = handle.stats().packets_sent();
        assert!((1..=5).contains(&sent), "sent {sent} packets");
    }

    #[test]
    fn activation_fails_when_the_interface_is_unusable() {
        let params = StreamParameters {
            multicast_iface: "no-such-interface-0".to_string(),
            ..loopback_params(5004)
        };
        let engine = TransmitEngine::new();
        let handle = engine.instantiate(&build(&params)).unwrap();
        let err = engine
            .set_state(&handle, TargetState::Playing)
            .unwrap_err();
        assert!(err.0.contains("cannot open transmit socket"), "{}", err.0);
        // A failed activation leaves the graph stoppable.
        engine.set_state(&handle, TargetState::Null).unwrap();
    }

    #[test]
    fn teardown_is_idempotent() {
        let engine = TransmitEngine::new();
        let handle = engine
            .instantiate(&build(&loopback_params(5004)))
            .unwrap();

        // Never activated: stopping twice must not fault.
        engine.set_state(&handle, TargetState::Null).unwrap();
        engine.set_state(&handle, TargetState::Null).unwrap();

        engine.set_state(&handle, TargetState::Playing).unwrap();
        engine.set_state(&handle, TargetState::Null).unwrap();
        engine.set_state(&handle, TargetState::Null).unwrap();
    }

    #[test]
    fn double_activation_is_rejected() {
        let engine = TransmitEngine::new();
        let handle = engine
            .instantiate(&build(&loopback_params(5004)))
            .unwrap();
        engine.set_state(&handle, TargetState::Playing).unwrap();
        assert!(engine.set_state(&handle, TargetState::Playing).is_err());
        engine.set_state(&handle, TargetState::Null).unwrap();
    }
}
