//! SAP/SDP stream announcement.
//!
//! Makes the transmitted stream visible to session directories: an SDP
//! document describing the RTP session is wrapped in a SAP packet and
//! multicast to 239.255.255.255:9875 once at startup, again every 30
//! seconds while the stream runs, and once more with the deletion flag set
//! at shutdown. Announcements are best-effort; failures are logged and
//! never affect the run.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, warn};

use crate::engine::sink::{self, IfaceSpec, SinkConfig};
use crate::params::{Codec, StreamParameters};
use crate::RTP_PAYLOAD_TYPE;

/// Well-known SAP multicast group and port.
const SAP_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 255), 9875);

/// Re-announce interval while the stream is up.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

/// Poll granularity for the announcer's stop flag.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Build the SDP document describing a stream.
pub fn build_sdp(params: &StreamParameters, origin: Ipv4Addr, session_id: u64) -> String {
    let codec = match params.codec {
        Codec::L16 => "L16",
        Codec::L24 => "L24",
    };
    format!(
        "v=0\r\n\
         o=- {session_id} 0 IN IP4 {origin}\r\n\
         s=AES67 test stream {group}:{port}\r\n\
         c=IN IP4 {group}/32\r\n\
         t=0 0\r\n\
         m=audio {port} RTP/AVP {pt}\r\n\
         a=rtpmap:{pt} {codec}/{rate}/{channels}\r\n\
         a=ptime:{ptime}\r\n",
        group = params.multicast_address,
        port = params.udp_port,
        pt = RTP_PAYLOAD_TYPE,
        rate = params.sample_rate.as_hz(),
        channels = params.channels,
        ptime = format_ptime(params.packet_time_ms),
    )
}

/// Render a packet time without a trailing fraction when it is integral.
fn format_ptime(ms: f64) -> String {
    if ms.fract() == 0.0 {
        format!("{}", ms as u64)
    } else {
        format!("{ms}")
    }
}

/// Frame an SDP document into a SAP packet.
///
/// Header layout: version/flags byte (`0x20`, deletion adds `0x04`), zero
/// authentication length, 16-bit message-id hash, originating source
/// address, then the `application/sdp` content type and the SDP body.
pub fn build_packet(sdp: &str, origin: Ipv4Addr, msg_id_hash: u16, deletion: bool) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + 16 + sdp.len());
    packet.push(if deletion { 0x20 | 0x04 } else { 0x20 });
    packet.push(0);
    packet.extend_from_slice(&msg_id_hash.to_le_bytes());
    packet.extend_from_slice(&origin.octets());
    packet.extend_from_slice(b"application/sdp\0");
    packet.extend_from_slice(sdp.as_bytes());
    packet
}

/// Periodic SAP announcer for one stream.
pub struct SapAnnouncer {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SapAnnouncer {
    /// Open the announcement socket, send the first announcement and start
    /// the periodic worker.
    pub fn start(params: &StreamParameters) -> io::Result<Self> {
        let trimmed = params.multicast_iface.trim();
        let iface = (!trimmed.is_empty()).then(|| IfaceSpec::parse(trimmed));
        let origin = match &iface {
            Some(IfaceSpec::Addr(addr)) => *addr,
            _ => Ipv4Addr::UNSPECIFIED,
        };
        let socket = sink::open_socket(&SinkConfig {
            host: *SAP_GROUP.ip(),
            port: SAP_GROUP.port(),
            iface,
            qos: false,
            dscp: 0,
        })?;

        let session_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let msg_id_hash: u16 = rand::thread_rng().gen();
        let sdp = build_sdp(params, origin, session_id);
        let announcement = build_packet(&sdp, origin, msg_id_hash, false);
        let deletion = build_packet(&sdp, origin, msg_id_hash, true);

        send_announcement(&socket, &announcement);
        debug!("announced stream over SAP to {SAP_GROUP}");

        let running = Arc::new(AtomicBool::new(true));
        let worker = thread::spawn({
            let running = Arc::clone(&running);
            move || {
                let mut since_announce = Duration::ZERO;
                while running.load(Ordering::SeqCst) {
                    thread::sleep(STOP_POLL);
                    since_announce += STOP_POLL;
                    if since_announce >= ANNOUNCE_INTERVAL {
                        since_announce = Duration::ZERO;
                        send_announcement(&socket, &announcement);
                    }
                }
                // Tell listeners the session is gone.
                send_announcement(&socket, &deletion);
            }
        });

        Ok(Self {
            running,
            worker: Some(worker),
        })
    }

    /// Stop the worker; the deletion announcement goes out on the way down.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SapAnnouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn send_announcement(socket: &UdpSocket, packet: &[u8]) {
    if let Err(err) = socket.send_to(packet, SAP_GROUP) {
        warn!("SAP announcement failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StreamParameters {
        StreamParameters::default()
    }

    #[test]
    fn packet_header_layout() {
        let origin = Ipv4Addr::new(192, 168, 60, 102);
        let packet = build_packet("v=0\r\n", origin, 0xBEEF, false);

        assert_eq!(packet[0], 0x20);
        assert_eq!(packet[1], 0);
        assert_eq!(u16::from_le_bytes([packet[2], packet[3]]), 0xBEEF);
        assert_eq!(&packet[4..8], &[192, 168, 60, 102]);
        assert_eq!(&packet[8..24], b"application/sdp\0");
        assert_eq!(&packet[24..], b"v=0\r\n");
    }

    #[test]
    fn deletion_sets_the_flag_bit() {
        let packet = build_packet("v=0\r\n", Ipv4Addr::UNSPECIFIED, 1, true);
        assert_eq!(packet[0], 0x24);
    }

    #[test]
    fn sdp_describes_the_stream() {
        let sdp = build_sdp(&params(), Ipv4Addr::new(10, 0, 0, 1), 1234);
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 1234 0 IN IP4 10.0.0.1\r\n"));
        assert!(sdp.contains("c=IN IP4 239.69.0.121/32\r\n"));
        assert!(sdp.contains("m=audio 5004 RTP/AVP 98\r\n"));
        assert!(sdp.contains("a=rtpmap:98 L24/48000/8\r\n"));
        assert!(sdp.contains("a=ptime:1\r\n"));
    }

    #[test]
    fn sdp_reflects_codec_and_packet_time() {
        let custom = StreamParameters {
            codec: Codec::L16,
            channels: 2,
            packet_time_ms: 0.5,
            ..params()
        };
        let sdp = build_sdp(&custom, Ipv4Addr::UNSPECIFIED, 0);
        assert!(sdp.contains("a=rtpmap:98 L16/48000/2\r\n"));
        assert!(sdp.contains("a=ptime:0.5\r\n"));
    }
}
