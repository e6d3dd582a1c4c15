//! `ifwire encode`: one payload through the DHCP IPv4/UDP encoder.

use std::cell::RefCell;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use ifwire_flow::{recv_channel, IpUdpEncoder, PendingQueue};

use crate::args::EncodeArgs;

/// Encode the payload named by `args` and print the datagram.
pub fn run(args: EncodeArgs) -> Result<i32> {
    let payload = read_payload(args.input.as_deref())?;
    let datagram = encode(&payload, args.mtu)?;

    tracing::info!(payload = payload.len(), datagram = datagram.len(), "encoded");
    print!("{}", to_hex(&datagram));
    Ok(0)
}

fn read_payload(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut payload = Vec::new();
            std::io::stdin()
                .read_to_end(&mut payload)
                .context("failed to read stdin")?;
            Ok(payload)
        }
    }
}

/// Run `payload` through an encoder whose upstream MTU is `mtu`.
pub fn encode(payload: &[u8], mtu: usize) -> Result<BytesMut> {
    if payload.len() > mtu {
        bail!("payload of {} bytes exceeds MTU {}", payload.len(), mtu);
    }

    let queue = PendingQueue::new();
    let (source, payloads) = recv_channel(mtu, &queue);
    let source = Rc::new(source);

    let data = payload.to_vec();
    let weak = Rc::downgrade(&source);
    source.on_request(move |mut buf| {
        buf.extend_from_slice(&data);
        if let Some(source) = weak.upgrade() {
            source.acknowledge(buf);
        }
    });

    let (encoder, datagrams) =
        IpUdpEncoder::new(payloads, &queue).context("failed to build encoder")?;

    let output: Rc<RefCell<Option<BytesMut>>> = Rc::default();
    let slot = Rc::clone(&output);
    datagrams.on_acknowledge(move |datagram| *slot.borrow_mut() = Some(datagram));
    datagrams.request_receive(BytesMut::with_capacity(encoder.mtu()));
    queue.drain();

    let datagram = output.borrow_mut().take();
    datagram.context("encoder produced no datagram")
}

/// Hex dump, 16 space-separated bytes per line.
fn to_hex(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|line| {
            let octets: Vec<String> = line.chunks(1).map(hex::encode).collect();
            octets.join(" ") + "\n"
        })
        .collect()
}
