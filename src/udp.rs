use crate::error::TransportError;
use crate::payload::{PAYLOAD_SIZE, PingpongPayload};
use crate::transport::{PacketRx, PacketTx, Poll};
use spdlog::warn;
use std::hint::spin_loop;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

/// Plain-socket reference transport. Non-blocking on both halves; socket
/// tuning beyond that (hardware timestamping and friends) is the caller's
/// business.
pub struct UdpTransport {
    socket: UdpSocket,
    connected: bool,
}

impl UdpTransport {
    /// Client end: bound to `bind` and connected to the server.
    pub fn client(bind: SocketAddr, peer: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind)?;
        socket.connect(peer)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            connected: true,
        })
    }

    /// Server end: bound to `bind`, locking onto the first peer that sends.
    pub fn server(bind: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            connected: false,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Splits into independently owned transmit and receive halves over the
    /// same underlying socket.
    pub fn into_split(self) -> Result<(UdpTx, UdpRx), TransportError> {
        let tx = UdpTx {
            socket: self.socket.try_clone()?,
        };
        let rx = UdpRx {
            socket: self.socket,
            connected: self.connected,
        };
        Ok((tx, rx))
    }
}

pub struct UdpTx {
    socket: UdpSocket,
}

impl PacketTx for UdpTx {
    fn send(&mut self, payload: &PingpongPayload) -> Result<(), TransportError> {
        loop {
            match self.socket.send(payload.as_bytes()) {
                Ok(_) => return Ok(()),
                // A full send buffer drains within microseconds.
                Err(e) if e.kind() == ErrorKind::WouldBlock => spin_loop(),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

pub struct UdpRx {
    socket: UdpSocket,
    connected: bool,
}

impl PacketRx for UdpRx {
    fn poll(&mut self) -> Result<Poll, TransportError> {
        // One spare byte so an oversized datagram is distinguishable from an
        // exact-size one after kernel truncation.
        let mut frame = [0u8; PAYLOAD_SIZE + 1];
        let (len, src) = match self.socket.recv_from(&mut frame) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Poll::NotReady),
            Err(e) => return Err(e.into()),
        };

        if !self.connected {
            // Both halves are clones of one socket, so connecting here also
            // directs the transmit half at this peer.
            self.socket.connect(src)?;
            self.connected = true;
        }

        if len != PAYLOAD_SIZE {
            warn!("dropping malformed {len}-byte datagram from {src}");
            return Ok(Poll::NotReady);
        }

        match PingpongPayload::read_from(&frame) {
            Some(payload) if payload.is_valid() => Ok(Poll::Ready(payload)),
            _ => {
                warn!("dropping {len}-byte datagram from {src} without a payload marker");
                Ok(Poll::NotReady)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn poll_until_ready(rx: &mut UdpRx) -> Option<PingpongPayload> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            match rx.poll().unwrap() {
                Poll::Ready(p) => return Some(p),
                Poll::NotReady => std::hint::spin_loop(),
                Poll::Closed => return None,
            }
        }
        None
    }

    fn local_pair() -> ((UdpTx, UdpRx), (UdpTx, UdpRx)) {
        let server = UdpTransport::server("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = server.local_addr().unwrap();
        let client =
            UdpTransport::client("127.0.0.1:0".parse().unwrap(), server_addr).unwrap();
        (client.into_split().unwrap(), server.into_split().unwrap())
    }

    #[test]
    fn test_roundtrip_and_server_lock_on() {
        let ((mut ctx, mut crx), (mut stx, mut srx)) = local_pair();

        let mut ping = PingpongPayload::new(1);
        ping.ts[0] = 100;
        ctx.send(&ping).unwrap();

        let mut received = poll_until_ready(&mut srx).expect("server never saw the ping");
        assert_eq!(received, ping);

        received.phase = 2;
        stx.send(&received).unwrap();

        let echoed = poll_until_ready(&mut crx).expect("client never saw the pong");
        assert_eq!(echoed.phase, 2);
        assert_eq!(echoed.id, 1);
    }

    #[test]
    fn test_malformed_frames_dropped() {
        let (_, (_, mut srx)) = local_pair();
        let server_addr = srx.socket.local_addr().unwrap();

        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        probe.send_to(&[0xab; 3], server_addr).unwrap();
        // Right length, but no payload marker.
        probe.send_to(&[0u8; PAYLOAD_SIZE], server_addr).unwrap();

        assert!(poll_until_ready(&mut srx).is_none());
    }
}
