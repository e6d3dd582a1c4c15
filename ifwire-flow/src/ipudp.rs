//! IPv4/UDP encapsulation for DHCP client traffic.
//!
//! [`IpUdpEncoder`] sits between a payload producer and a downstream
//! consumer. When the downstream lends a buffer it reserves room for the
//! headers and forwards the tail of the same buffer upstream, so the
//! payload is written in place and never copied.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bytes::BytesMut;
use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::{
    IpAddress, IpProtocol, Ipv4Address, Ipv4Packet, Ipv4Repr, UdpPacket, UdpRepr,
};

use crate::channel::{recv_channel, RecvReceiver, RecvSender};
use crate::error::FlowError;
use crate::pending::PendingQueue;

/// IPv4 header length without options.
pub const IPV4_HEADER_LEN: usize = 20;
/// UDP header length.
pub const UDP_HEADER_LEN: usize = 8;
/// Bytes the encoder prepends to every payload.
pub const HEADER_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN;

pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DEFAULT_TTL: u8 = 64;

/// Unconfigured client address.
pub const SOURCE_ADDR: Ipv4Address = Ipv4Address::UNSPECIFIED;
/// Limited broadcast.
pub const DEST_ADDR: Ipv4Address = Ipv4Address::BROADCAST;

/// Total length is a 16-bit field.
const MAX_DATAGRAM: usize = u16::MAX as usize;

/// Wraps payloads from an upstream receive channel in IPv4/UDP headers
/// addressed from `0.0.0.0:68` to `255.255.255.255:67`.
pub struct IpUdpEncoder {
    inner: Rc<Inner>,
}

struct Inner {
    upstream: RecvReceiver,
    output: RecvSender,
    /// Header region of the downstream buffer while the payload is upstream.
    header: RefCell<Option<BytesMut>>,
}

impl IpUdpEncoder {
    /// Build an encoder over `upstream`, returning it together with the
    /// consumer end of its output channel.
    ///
    /// The output MTU is the upstream MTU plus [`HEADER_LEN`].
    pub fn new(
        upstream: RecvReceiver,
        queue: &PendingQueue,
    ) -> Result<(Self, RecvReceiver), FlowError> {
        let payload_mtu = upstream.mtu();
        let mtu = payload_mtu
            .checked_add(HEADER_LEN)
            .filter(|&mtu| mtu <= MAX_DATAGRAM)
            .ok_or(FlowError::MtuOverflow {
                mtu: payload_mtu,
                overhead: HEADER_LEN,
                limit: MAX_DATAGRAM,
            })?;

        let (output, downstream) = recv_channel(mtu, queue);
        let inner = Rc::new(Inner {
            upstream,
            output,
            header: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        inner.output.on_request(move |buf| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.handle_request(buf);
            }
        });

        let weak = Rc::downgrade(&inner);
        inner.upstream.on_acknowledge(move |payload| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.handle_payload(payload);
            }
        });

        tracing::debug!(payload_mtu, mtu, "ip/udp encoder ready");
        Ok((Self { inner }, downstream))
    }

    /// MTU of the output channel.
    pub fn mtu(&self) -> usize {
        self.inner.output.mtu()
    }
}

impl Inner {
    fn handle_request(&self, mut buf: BytesMut) {
        buf.resize(HEADER_LEN, 0);
        let payload = buf.split_off(HEADER_LEN);
        *self.header.borrow_mut() = Some(buf);
        self.upstream.request_receive(payload);
    }

    fn handle_payload(&self, payload: BytesMut) {
        let header = self.header.borrow_mut().take();
        let Some(mut packet) = header else {
            panic!("channel protocol violation: payload without a pending request");
        };

        // Contiguous with the header when the payload was written in place
        packet.unsplit(payload);
        write_headers(&mut packet);
        self.output.acknowledge(packet);
    }
}

/// Fill the first [`HEADER_LEN`] bytes of `datagram`; the rest is the
/// payload, which both checksums cover.
pub fn write_headers(datagram: &mut [u8]) {
    debug_assert!(datagram.len() >= HEADER_LEN);
    let payload_len = datagram.len() - HEADER_LEN;
    let (ip, udp) = datagram.split_at_mut(IPV4_HEADER_LEN);

    let ip_repr = Ipv4Repr {
        src_addr: SOURCE_ADDR,
        dst_addr: DEST_ADDR,
        next_header: IpProtocol::Udp,
        payload_len: UDP_HEADER_LEN + payload_len,
        hop_limit: DEFAULT_TTL,
    };
    let mut ip_packet = Ipv4Packet::new_unchecked(ip);
    ip_repr.emit(&mut ip_packet, &ChecksumCapabilities::default());
    // Flags and fragment offset go out as zero
    ip_packet.set_dont_frag(false);
    ip_packet.fill_checksum();

    let udp_repr = UdpRepr {
        src_port: DHCP_CLIENT_PORT,
        dst_port: DHCP_SERVER_PORT,
    };
    let mut udp_packet = UdpPacket::new_unchecked(udp);
    udp_repr.emit_header(&mut udp_packet, payload_len);
    // A computed zero goes out as 0xFFFF
    udp_packet.fill_checksum(&IpAddress::Ipv4(SOURCE_ADDR), &IpAddress::Ipv4(DEST_ADDR));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Upstream that answers every request with `payload`.
    fn fixed_upstream(mtu: usize, payload: Vec<u8>, queue: &PendingQueue) -> RecvReceiver {
        let (tx, rx) = recv_channel(mtu, queue);
        let tx = Rc::new(tx);
        // The handler owns the sender, keeping it alive for the test
        let owned = tx.clone();
        tx.on_request(move |mut buf| {
            buf.extend_from_slice(&payload);
            owned.acknowledge(buf);
        });
        rx
    }

    fn encode_with_mtu(payload: &[u8], mtu: usize) -> Vec<u8> {
        let queue = PendingQueue::new();
        let upstream = fixed_upstream(mtu, payload.to_vec(), &queue);
        let (encoder, downstream) = IpUdpEncoder::new(upstream, &queue).unwrap();

        let out: Rc<RefCell<Option<BytesMut>>> = Rc::default();
        let slot = out.clone();
        downstream.on_acknowledge(move |buf| *slot.borrow_mut() = Some(buf));
        downstream.request_receive(BytesMut::with_capacity(encoder.mtu()));
        queue.drain();

        let packet = out.borrow_mut().take().expect("no datagram produced");
        packet.to_vec()
    }

    fn encode(payload: &[u8]) -> Vec<u8> {
        encode_with_mtu(payload, payload.len().max(1) + 16)
    }

    fn ipv4_verifies(packet: &[u8]) -> bool {
        // The checked view wants the whole datagram, total length included
        Ipv4Packet::new_checked(packet)
            .map(|ip| ip.verify_checksum())
            .unwrap_or(false)
    }

    fn udp_verifies(packet: &[u8]) -> bool {
        UdpPacket::new_checked(&packet[IPV4_HEADER_LEN..])
            .map(|udp| {
                udp.verify_checksum(&IpAddress::Ipv4(SOURCE_ADDR), &IpAddress::Ipv4(DEST_ADDR))
            })
            .unwrap_or(false)
    }

    fn udp_checksum_field(packet: &[u8]) -> u16 {
        u16::from_be_bytes([packet[26], packet[27]])
    }

    #[test]
    fn test_encode_header_fields() {
        let packet = encode(b"hello");

        assert_eq!(packet.len(), HEADER_LEN + 5);
        assert_eq!(packet[0], 0x45);
        assert_eq!(packet[1], 0);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 33);
        assert_eq!(&packet[4..8], &[0, 0, 0, 0]);
        assert_eq!(packet[8], 64);
        assert_eq!(packet[9], 17);
        assert_eq!(&packet[12..16], &[0, 0, 0, 0]);
        assert_eq!(&packet[16..20], &[255, 255, 255, 255]);

        assert_eq!(u16::from_be_bytes([packet[20], packet[21]]), 68);
        assert_eq!(u16::from_be_bytes([packet[22], packet[23]]), 67);
        assert_eq!(u16::from_be_bytes([packet[24], packet[25]]), 13);
        assert_ne!(udp_checksum_field(&packet), 0);
        assert_eq!(&packet[28..], b"hello");
    }

    #[test]
    fn test_encode_checksums_verify() {
        let packet = encode(b"DHCPDISCOVER payload");
        assert!(ipv4_verifies(&packet));
        assert!(udp_verifies(&packet));
    }

    #[test]
    fn test_encode_empty_payload() {
        let packet = encode(b"");
        assert_eq!(packet.len(), HEADER_LEN);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 28);
        assert_eq!(u16::from_be_bytes([packet[24], packet[25]]), 8);
        assert!(ipv4_verifies(&packet));
        assert!(udp_verifies(&packet));
    }

    #[test]
    fn test_encode_odd_payload() {
        let packet = encode(b"abc");
        assert_eq!(packet.len(), HEADER_LEN + 3);
        assert!(udp_verifies(&packet));
    }

    #[test]
    fn test_encode_payload_filling_mtu() {
        let payload = vec![0x5a; 548];
        let packet = encode_with_mtu(&payload, 548);
        assert_eq!(packet.len(), 576);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 576);
        assert!(ipv4_verifies(&packet));
        assert!(udp_verifies(&packet));
    }

    #[test]
    fn test_udp_zero_checksum_sent_as_ffff() {
        // Appending the complement of the current sum as one more word makes
        // the one's complement sum 0xFFFF, whose checksum is zero
        let base = encode(&[0, 0]);
        let cancel = udp_checksum_field(&base);
        let packet = encode(&cancel.to_be_bytes());

        assert_eq!(udp_checksum_field(&packet), 0xFFFF);
        assert!(udp_verifies(&packet));
    }

    #[test]
    fn test_output_mtu() {
        let queue = PendingQueue::new();
        let (_tx, rx) = recv_channel(548, &queue);
        let (encoder, downstream) = IpUdpEncoder::new(rx, &queue).unwrap();
        assert_eq!(encoder.mtu(), 576);
        assert_eq!(downstream.mtu(), 576);
    }

    #[test]
    fn test_largest_allowed_mtu() {
        let queue = PendingQueue::new();
        let (_tx, rx) = recv_channel(MAX_DATAGRAM - HEADER_LEN, &queue);
        let (encoder, _downstream) = IpUdpEncoder::new(rx, &queue).unwrap();
        assert_eq!(encoder.mtu(), MAX_DATAGRAM);
    }

    #[test]
    fn test_mtu_overflow() {
        let queue = PendingQueue::new();
        let (_tx, rx) = recv_channel(MAX_DATAGRAM - HEADER_LEN + 1, &queue);
        match IpUdpEncoder::new(rx, &queue) {
            Err(FlowError::MtuOverflow { mtu, overhead, .. }) => {
                assert_eq!(mtu, MAX_DATAGRAM - HEADER_LEN + 1);
                assert_eq!(overhead, HEADER_LEN);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected MTU overflow"),
        }
    }

    #[test]
    fn test_payload_written_in_place() {
        let queue = PendingQueue::new();
        let upstream = fixed_upstream(64, b"in place".to_vec(), &queue);
        let (encoder, downstream) = IpUdpEncoder::new(upstream, &queue).unwrap();

        let out: Rc<RefCell<Option<BytesMut>>> = Rc::default();
        let slot = out.clone();
        downstream.on_acknowledge(move |buf| *slot.borrow_mut() = Some(buf));

        let lent = BytesMut::with_capacity(encoder.mtu());
        let base = lent.as_ptr();
        downstream.request_receive(lent);
        queue.drain();

        let packet = out.borrow_mut().take().unwrap();
        assert_eq!(packet.as_ptr(), base);
        assert_eq!(&packet[HEADER_LEN..], b"in place");
    }

    #[test]
    fn test_repeated_requests() {
        let queue = PendingQueue::new();
        let upstream = fixed_upstream(16, b"again".to_vec(), &queue);
        let (encoder, downstream) = IpUdpEncoder::new(upstream, &queue).unwrap();

        let count = Rc::new(std::cell::Cell::new(0));
        let seen = count.clone();
        downstream.on_acknowledge(move |buf| {
            assert_eq!(buf.len(), HEADER_LEN + 5);
            seen.set(seen.get() + 1);
        });

        for _ in 0..3 {
            downstream.request_receive(BytesMut::with_capacity(encoder.mtu()));
            queue.drain();
        }
        assert_eq!(count.get(), 3);
    }

    fn arb_payload() -> impl Strategy<Value = (usize, Vec<u8>)> {
        (1usize..=1500).prop_flat_map(|mtu| {
            (Just(mtu), proptest::collection::vec(any::<u8>(), 0..=mtu))
        })
    }

    proptest! {
        #[test]
        fn encoded_datagram_is_well_formed((mtu, payload) in arb_payload()) {
            let packet = encode_with_mtu(&payload, mtu);
            let len = payload.len();

            prop_assert_eq!(packet.len(), HEADER_LEN + len);
            prop_assert_eq!(
                usize::from(u16::from_be_bytes([packet[2], packet[3]])),
                HEADER_LEN + len
            );
            prop_assert_eq!(
                usize::from(u16::from_be_bytes([packet[24], packet[25]])),
                UDP_HEADER_LEN + len
            );
            prop_assert_ne!(udp_checksum_field(&packet), 0);
            prop_assert!(ipv4_verifies(&packet));
            prop_assert!(udp_verifies(&packet));
            prop_assert_eq!(&packet[HEADER_LEN..], &payload[..]);
        }
    }
}
