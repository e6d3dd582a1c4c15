//! Packet flow plumbing for ifwire.
//!
//! Pipeline stages are connected by single-credit channels and talk to each
//! other only through a [`PendingQueue`] that the event loop drains, so no
//! stage is ever reentered from inside its own call. Everything here is
//! single-threaded (`!Send`).
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use ifwire_flow::{recv_channel, IpUdpEncoder, PendingQueue};
//! use std::rc::Rc;
//!
//! let queue = PendingQueue::new();
//! let (payload_tx, payload_rx) = recv_channel(548, &queue);
//! let payload_tx = Rc::new(payload_tx);
//! let producer = payload_tx.clone();
//! payload_tx.on_request(move |mut buf| {
//!     buf.extend_from_slice(b"DHCPDISCOVER");
//!     producer.acknowledge(buf);
//! });
//!
//! let (encoder, datagrams) = IpUdpEncoder::new(payload_rx, &queue).unwrap();
//! datagrams.on_acknowledge(|packet| assert_eq!(packet.len(), 28 + 12));
//! datagrams.request_receive(BytesMut::with_capacity(encoder.mtu()));
//! queue.drain();
//! ```

mod channel;
mod error;
pub mod ipudp;
mod line_buffer;
mod pending;

pub use channel::{
    pass_channel, recv_channel, PassReceiver, PassSender, RecvReceiver, RecvSender,
};
pub use error::FlowError;
pub use ipudp::IpUdpEncoder;
pub use line_buffer::LineBuffer;
pub use pending::PendingQueue;
