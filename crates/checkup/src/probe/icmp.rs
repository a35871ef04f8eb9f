//! ICMP echo prober.
//!
//! Uses unprivileged datagram ICMP sockets (`SOCK_DGRAM` + `IPPROTO_ICMP`) so
//! the agent does not need raw socket capabilities. On Linux the allowed
//! groups are controlled by `net.ipv4.ping_group_range`. Failing to open the
//! socket is an agent problem and therefore an error, not a failed check.

use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, UdpSocket};
use tokio_util::sync::CancellationToken;

use super::{race, Clock, ProbeResult};

const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

const ECHO_PAYLOAD: &[u8] = b"uppe-checkup-ping";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpResponse {
    /// Address the echo request was sent to
    pub address: IpAddr,
    pub bytes_sent: usize,
    pub bytes_received: usize,
}

#[derive(Debug, Clone)]
pub struct IcmpProber {
    address: String,
    timeout: Duration,
}

impl IcmpProber {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self { address: address.into(), timeout }
    }

    pub async fn probe(&self, token: &CancellationToken) -> Result<ProbeResult<IcmpResponse>> {
        let clock = Clock::start(self.timeout);
        let deadline = clock.deadline();

        let ip = match self.address.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                let host = self.address.clone();
                let resolve = async move {
                    lookup_host((host.as_str(), 0)).await?.next().map(|addr| addr.ip()).ok_or_else(
                        || io::Error::new(io::ErrorKind::NotFound, "no address resolved"),
                    )
                };
                match race(token, deadline, resolve).await?.settle("resolve") {
                    Ok(ip) => ip,
                    Err(interrupt) => return clock.interrupted(interrupt),
                }
            }
        };

        let socket = ping_socket(&ip).context("cannot open ICMP socket")?;
        let socket = Arc::new(UdpSocket::from_std(socket).context("cannot register ICMP socket")?);
        let ipv6 = ip.is_ipv6();
        let packet = echo_request(ipv6, rand::random(), 1, ECHO_PAYLOAD);
        let bytes_sent = packet.len();

        let sender = Arc::clone(&socket);
        let send = async move { sender.send_to(&packet, SocketAddr::new(ip, 0)).await };
        if let Err(interrupt) = race(token, deadline, send).await?.settle("send") {
            return clock.interrupted(interrupt);
        }

        let receiver = Arc::clone(&socket);
        let receive = async move {
            let mut buf = vec![0; 1500];
            loop {
                let (read, _) = receiver.recv_from(&mut buf).await?;
                if is_echo_reply(ipv6, &buf[..read]) {
                    return Ok::<_, io::Error>(read);
                }
            }
        };
        match race(token, deadline, receive).await?.settle("receive") {
            Ok(bytes_received) => {
                Ok(clock.finish(IcmpResponse { address: ip, bytes_sent, bytes_received }))
            }
            Err(interrupt) => clock.interrupted(interrupt),
        }
    }
}

/// Encode an echo request. The kernel rewrites the identifier with the
/// socket's port and, for IPv6, fills in the checksum.
pub(crate) fn echo_request(ipv6: bool, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let kind = if ipv6 { ICMPV6_ECHO_REQUEST } else { ICMPV4_ECHO_REQUEST };

    let mut packet = Vec::with_capacity(8 + payload.len());
    packet.extend_from_slice(&[kind, 0, 0, 0]);
    packet.extend_from_slice(&identifier.to_be_bytes());
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(payload);

    if !ipv6 {
        let sum = checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

/// Internet checksum (RFC 1071)
pub(crate) fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [high, low] => u32::from(u16::from_be_bytes([*high, *low])),
            [high] => u32::from(u16::from_be_bytes([*high, 0])),
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Some platforms hand IPv4 replies over with the IP header still attached
pub(crate) fn is_echo_reply(ipv6: bool, packet: &[u8]) -> bool {
    if ipv6 {
        return packet.first() == Some(&ICMPV6_ECHO_REPLY);
    }

    let icmp = match packet.first() {
        Some(first) if first >> 4 == 4 => {
            let header_len = usize::from(first & 0x0f) * 4;
            packet.get(header_len..).unwrap_or_default()
        }
        _ => packet,
    };
    icmp.first() == Some(&ICMPV4_ECHO_REPLY)
}

/// Unprivileged datagram ICMP socket
fn ping_socket(ip: &IpAddr) -> io::Result<std::net::UdpSocket> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_echo_request_checksum() {
        let packet = echo_request(false, 0, 0, &[]);
        assert_eq!(packet, vec![8, 0, 0xf7, 0xff, 0, 0, 0, 0]);
    }

    #[test]
    fn checksummed_packets_verify_to_zero() {
        let packet = echo_request(false, 0x1234, 7, ECHO_PAYLOAD);
        assert_eq!(checksum(&packet), 0);
    }

    #[test]
    fn ipv6_requests_leave_the_checksum_to_the_kernel() {
        let packet = echo_request(true, 1, 1, b"x");
        assert_eq!(&packet[..4], &[ICMPV6_ECHO_REQUEST, 0, 0, 0]);
    }

    #[test]
    fn replies_are_recognised_with_or_without_ip_header() {
        assert!(is_echo_reply(false, &[0, 0, 0, 0]));

        let mut with_header = vec![0x45];
        with_header.extend_from_slice(&[0; 19]);
        with_header.extend_from_slice(&[0, 0, 0, 0]);
        assert!(is_echo_reply(false, &with_header));

        assert!(!is_echo_reply(false, &[3, 1, 0, 0]));
        assert!(is_echo_reply(true, &[ICMPV6_ECHO_REPLY, 0]));
    }

    #[tokio::test]
    #[ignore = "needs permission to open ICMP sockets"]
    async fn pings_localhost() {
        let prober = IcmpProber::new("127.0.0.1", Duration::from_secs(1));
        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        assert!(result.response().is_some());
    }
}
