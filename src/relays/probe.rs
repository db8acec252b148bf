//! Single-packet ICMP latency probe
//!
//! Each probe opens its own socket, sends one echo request and waits for the
//! matching reply until the timeout expires. Probes share no state, so the
//! driver can run as many of them at once as it likes.
//!
//! Socket strategy:
//! - Windows has no unprivileged ICMP sockets, so a raw socket is used.
//! - Elsewhere a datagram ICMP socket is tried first (Linux with
//!   `net.ipv4.ping_group_range`, macOS), then a raw socket.

use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpTypes, MutableIcmpPacket};
use pnet::packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::catalog::EndpointDescriptor;
use super::rank::MeasuredEndpoint;
use crate::config::SocketMode;
use crate::error::ProbeError;

/// ICMP echo header: type, code, checksum, identifier, sequence
const ECHO_HEADER_LEN: usize = 8;

const ECHO_PAYLOAD: &[u8; 16] = b"best-relay-probe";

const RECV_BUF_LEN: usize = 1500;

/// Smallest read timeout handed to the socket. A zero timeval means "block
/// forever" on most platforms.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Measures the round trip to one relay.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, relay: &EndpointDescriptor) -> Result<Duration, ProbeError>;
}

/// Probe `relay` and wrap the result. A zero round trip is reported as
/// [`ProbeError::InvalidPing`].
pub async fn measure<P>(prober: &P, relay: EndpointDescriptor) -> Result<MeasuredEndpoint, ProbeError>
where
    P: Prober + ?Sized,
{
    let rtt = prober.probe(&relay).await?;
    log::debug!(
        "Added server latency: {} ({}) rtt={:?}",
        relay.hostname,
        relay.ipv4_addr_in,
        rtt
    );
    MeasuredEndpoint::new(relay, rtt).ok_or(ProbeError::InvalidPing)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    /// `SOCK_DGRAM` + ICMP; the kernel owns the identifier
    Datagram,
    /// `SOCK_RAW` + ICMP; sees every ICMP packet for the host
    Raw,
}

/// ICMP echo prober backed by a fresh socket per probe.
#[derive(Debug, Clone)]
pub struct IcmpProber {
    timeout: Duration,
    mode: SocketMode,
}

impl IcmpProber {
    pub fn new(timeout: Duration, mode: SocketMode) -> Self {
        Self { timeout, mode }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, relay: &EndpointDescriptor) -> Result<Duration, ProbeError> {
        let addr: Ipv4Addr = relay
            .ipv4_addr_in
            .trim()
            .parse()
            .map_err(|_| ProbeError::InvalidAddress(relay.ipv4_addr_in.clone()))?;

        let timeout = self.timeout;
        let mode = self.mode;
        tokio::task::spawn_blocking(move || ping_once(addr, timeout, mode))
            .await
            .map_err(|e| ProbeError::Socket(std::io::Error::other(e)))?
    }
}

fn new_socket(kind: SocketKind) -> std::io::Result<Socket> {
    let ty = match kind {
        SocketKind::Datagram => Type::DGRAM,
        SocketKind::Raw => Type::RAW,
    };
    Socket::new(Domain::IPV4, ty, Some(Protocol::ICMPV4))
}

fn open_socket(mode: SocketMode) -> Result<(Socket, SocketKind), ProbeError> {
    let open = |kind| new_socket(kind).map(|s| (s, kind)).map_err(ProbeError::Socket);

    match mode {
        SocketMode::Privileged => open(SocketKind::Raw),
        SocketMode::Unprivileged => open(SocketKind::Datagram),
        SocketMode::Auto if cfg!(windows) => open(SocketKind::Raw),
        SocketMode::Auto => open(SocketKind::Datagram).or_else(|e| {
            log::debug!("Datagram ICMP socket unavailable ({}), trying raw socket", e);
            open(SocketKind::Raw)
        }),
    }
}

/// Blocking: send one echo request to `addr` and wait for its reply.
fn ping_once(addr: Ipv4Addr, timeout: Duration, mode: SocketMode) -> Result<Duration, ProbeError> {
    let (socket, kind) = open_socket(mode)?;

    let identifier = rand::random::<u16>();
    let sequence = rand::random::<u16>();
    let request = build_echo_request(identifier, sequence);
    let target = SockAddr::from(SocketAddrV4::new(addr, 0));

    let start = Instant::now();
    socket.send_to(&request, &target).map_err(ProbeError::Send)?;
    let deadline = start + timeout;

    let mut buf = [MaybeUninit::<u8>::uninit(); RECV_BUF_LEN];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ProbeError::Timeout(timeout));
        }
        socket
            .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))
            .map_err(ProbeError::Receive)?;

        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ProbeError::Timeout(timeout));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProbeError::Receive(e)),
        };
        let rtt = within_deadline(start.elapsed(), timeout)?;

        if from.as_socket_ipv4().map(|a| *a.ip()) != Some(addr) {
            continue;
        }

        // SAFETY: recv_from initialised the first `len` bytes.
        let data: Vec<u8> = buf[..len]
            .iter()
            .map(|b| unsafe { b.assume_init() })
            .collect();

        if let Some((reply_id, reply_seq)) = parse_echo_reply(&data) {
            if reply_matches(kind, identifier, sequence, reply_id, reply_seq) {
                return Ok(rtt);
            }
        }
    }
}

/// A reply read after the deadline counts as no reply at all.
fn within_deadline(rtt: Duration, timeout: Duration) -> Result<Duration, ProbeError> {
    if rtt > timeout {
        return Err(ProbeError::Timeout(timeout));
    }
    Ok(rtt)
}

/// Build an ICMP echo request with a valid checksum.
fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buf = vec![0u8; ECHO_HEADER_LEN + ECHO_PAYLOAD.len()];

    if let Some(mut request) = MutableEchoRequestPacket::new(&mut buf) {
        request.set_icmp_type(IcmpTypes::EchoRequest);
        request.set_icmp_code(IcmpCode::new(0));
        request.set_identifier(identifier);
        request.set_sequence_number(sequence);
        request.set_payload(ECHO_PAYLOAD);
    }

    if let Some(mut packet) = MutableIcmpPacket::new(&mut buf) {
        let checksum = icmp::checksum(&packet.to_immutable());
        packet.set_checksum(checksum);
    }

    buf
}

/// Raw sockets (and datagram sockets on macOS) deliver the IPv4 header too.
fn strip_ipv4_header(data: &[u8]) -> &[u8] {
    if data.first().map(|b| b >> 4) != Some(4) {
        return data;
    }
    match Ipv4Packet::new(data) {
        Some(ip) => {
            let header_len = ip.get_header_length() as usize * 4;
            if header_len >= 20 && header_len <= data.len() {
                &data[header_len..]
            } else {
                data
            }
        }
        None => data,
    }
}

/// Returns `(identifier, sequence)` when `data` holds an echo reply.
fn parse_echo_reply(data: &[u8]) -> Option<(u16, u16)> {
    let reply = EchoReplyPacket::new(strip_ipv4_header(data))?;
    if reply.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }
    Some((reply.get_identifier(), reply.get_sequence_number()))
}

fn reply_matches(kind: SocketKind, identifier: u16, sequence: u16, reply_id: u16, reply_seq: u16) -> bool {
    match kind {
        // Linux rewrites the identifier to the socket's local port.
        SocketKind::Datagram => reply_seq == sequence,
        SocketKind::Raw => reply_id == identifier && reply_seq == sequence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relays::catalog::tests::descriptor;
    use pnet::packet::icmp::echo_reply::MutableEchoReplyPacket;
    use pnet::packet::icmp::echo_request::EchoRequestPacket;
    use pnet::packet::icmp::IcmpPacket;

    fn echo_reply(identifier: u16, sequence: u16) -> Vec<u8> {
        let mut buf = vec![0u8; ECHO_HEADER_LEN + ECHO_PAYLOAD.len()];
        let mut reply = MutableEchoReplyPacket::new(&mut buf).unwrap();
        reply.set_icmp_type(IcmpTypes::EchoReply);
        reply.set_icmp_code(IcmpCode::new(0));
        reply.set_identifier(identifier);
        reply.set_sequence_number(sequence);
        reply.set_payload(ECHO_PAYLOAD);
        buf
    }

    fn with_ipv4_header(icmp: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[9] = 1;
        packet.extend_from_slice(icmp);
        packet
    }

    struct FixedProber(Duration);

    #[async_trait]
    impl Prober for FixedProber {
        async fn probe(&self, _relay: &EndpointDescriptor) -> Result<Duration, ProbeError> {
            Ok(self.0)
        }
    }

    #[test]
    fn echo_request_is_well_formed() {
        let buf = build_echo_request(0x1234, 7);
        let request = EchoRequestPacket::new(&buf).unwrap();
        assert_eq!(request.get_icmp_type(), IcmpTypes::EchoRequest);
        assert_eq!(request.get_identifier(), 0x1234);
        assert_eq!(request.get_sequence_number(), 7);

        let packet = IcmpPacket::new(&buf).unwrap();
        assert_ne!(packet.get_checksum(), 0);
        assert_eq!(packet.get_checksum(), icmp::checksum(&packet));
    }

    #[test]
    fn parses_bare_and_ip_wrapped_replies() {
        let bare = echo_reply(42, 9);
        assert_eq!(parse_echo_reply(&bare), Some((42, 9)));
        assert_eq!(parse_echo_reply(&with_ipv4_header(&bare)), Some((42, 9)));
    }

    #[test]
    fn ignores_non_reply_icmp() {
        let request = build_echo_request(1, 1);
        assert_eq!(parse_echo_reply(&request), None);
        assert_eq!(parse_echo_reply(&with_ipv4_header(&request)), None);
        assert_eq!(parse_echo_reply(&[0u8; 3]), None);
    }

    #[test]
    fn raw_replies_must_match_identifier() {
        assert!(reply_matches(SocketKind::Raw, 5, 6, 5, 6));
        assert!(!reply_matches(SocketKind::Raw, 5, 6, 99, 6));
        assert!(!reply_matches(SocketKind::Raw, 5, 6, 5, 7));

        assert!(reply_matches(SocketKind::Datagram, 5, 6, 99, 6));
        assert!(!reply_matches(SocketKind::Datagram, 5, 6, 5, 7));
    }

    #[test]
    fn own_echo_request_is_not_a_reply() {
        // Raw sockets on loopback see the outgoing request before the reply.
        let request = with_ipv4_header(&build_echo_request(0xbeef, 0x0102));
        assert_eq!(parse_echo_reply(&request), None);

        let reply = with_ipv4_header(&echo_reply(0xbeef, 0x0102));
        let (id, seq) = parse_echo_reply(&reply).unwrap();
        assert!(reply_matches(SocketKind::Raw, 0xbeef, 0x0102, id, seq));
    }

    #[test]
    fn late_reply_is_timeout() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            within_deadline(Duration::from_millis(999), timeout).unwrap(),
            Duration::from_millis(999)
        );
        assert_eq!(within_deadline(timeout, timeout).unwrap(), timeout);

        let err = within_deadline(timeout + Duration::from_micros(1), timeout).unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(t) if t == timeout));
    }

    #[test]
    fn loopback_answers_with_positive_rtt() {
        match ping_once(Ipv4Addr::LOCALHOST, Duration::from_secs(1), SocketMode::Auto) {
            Ok(rtt) => {
                assert!(rtt > Duration::ZERO);
                assert!(rtt <= Duration::from_secs(1));
            }
            // No ICMP rights in this environment.
            Err(ProbeError::Socket(_)) => {}
            Err(e) => panic!("loopback ping failed: {}", e),
        }
    }

    #[test]
    fn silent_target_hits_deadline() {
        // TEST-NET-1 never answers.
        let timeout = Duration::from_millis(50);
        let started = Instant::now();
        match ping_once(Ipv4Addr::new(192, 0, 2, 1), timeout, SocketMode::Auto) {
            Err(ProbeError::Timeout(t)) => {
                assert_eq!(t, timeout);
                assert!(started.elapsed() >= timeout);
            }
            // No ICMP rights, or the network reports the host unreachable.
            Err(ProbeError::Socket(_)) | Err(ProbeError::Send(_)) | Err(ProbeError::Receive(_)) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_address_fails_without_socket() {
        let mut relay = descriptor("broken", "se", true);
        relay.ipv4_addr_in = "not-an-ip".to_string();

        let prober = IcmpProber::new(Duration::from_secs(1), SocketMode::Auto);
        let err = prober.probe(&relay).await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn zero_rtt_becomes_invalid_ping() {
        let relay = descriptor("instant", "se", true);
        let err = measure(&FixedProber(Duration::ZERO), relay).await.unwrap_err();
        assert!(err.is_invalid_ping());
    }

    #[tokio::test]
    async fn positive_rtt_is_measured() {
        let relay = descriptor("normal", "se", true);
        let measured = measure(&FixedProber(Duration::from_millis(23)), relay.clone())
            .await
            .unwrap();
        assert_eq!(measured.relay, relay);
        assert_eq!(measured.rtt, Duration::from_millis(23));
    }
}
