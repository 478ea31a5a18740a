//! Transmit socket setup for the UDP sink stage.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// Multicast TTL for transmitted streams.
const MULTICAST_TTL: u32 = 8;

/// Egress interface selection for the transmit socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfaceSpec {
    /// Interface identified by its IPv4 address.
    Addr(Ipv4Addr),
    /// Interface identified by OS device name.
    Name(String),
}

impl IfaceSpec {
    /// Interpret an interface argument: IPv4 literal, or device name.
    pub fn parse(raw: &str) -> IfaceSpec {
        match raw.parse::<Ipv4Addr>() {
            Ok(addr) => IfaceSpec::Addr(addr),
            Err(_) => IfaceSpec::Name(raw.to_string()),
        }
    }
}

/// Transmit socket configuration carried by the sink stage.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Destination address (multicast group or unicast host).
    pub host: Ipv4Addr,
    /// Destination UDP port.
    pub port: u16,
    /// Egress interface; `None` lets the OS route.
    pub iface: Option<IfaceSpec>,
    /// Mark outgoing datagrams with a DSCP.
    pub qos: bool,
    /// Differentiated-services code point written into the IP TOS field.
    pub dscp: u8,
}

impl SinkConfig {
    pub fn dest(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.host, self.port)
    }
}

/// Create and configure the transmit socket.
pub fn open_socket(config: &SinkConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // Binding to the interface address pins the source address; the port
    // stays ephemeral.
    let bind_addr = match &config.iface {
        Some(IfaceSpec::Addr(addr)) => *addr,
        _ => Ipv4Addr::UNSPECIFIED,
    };
    socket.bind(&SockAddr::from(SocketAddrV4::new(bind_addr, 0)))?;

    if config.host.is_multicast() {
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    }

    match &config.iface {
        Some(IfaceSpec::Addr(addr)) => socket.set_multicast_if_v4(addr)?,
        Some(IfaceSpec::Name(name)) => bind_to_device(&socket, name)?,
        None => {}
    }

    if config.qos {
        // DSCP occupies the upper six bits of the TOS octet
        socket.set_tos(u32::from(config.dscp) << 2)?;
    }

    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &Socket, name: &str) -> io::Result<()> {
    socket.bind_device(Some(name.as_bytes()))
}

#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &Socket, name: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("interface '{name}' must be given as an IPv4 address on this platform"),
    ))
}
