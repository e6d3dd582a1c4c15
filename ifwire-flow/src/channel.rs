//! Single-credit data channels.
//!
//! A channel connects exactly one producer to one consumer and carries at
//! most one buffer at a time. Two shapes exist:
//!
//! - **pass** channels push filled buffers from producer to consumer
//!   ([`PassSender::offer`] then [`PassReceiver::acknowledge`]);
//! - **receive** channels let the consumer lend an empty buffer that the
//!   producer fills ([`RecvReceiver::request_receive`] then
//!   [`RecvSender::acknowledge`]).
//!
//! Every notification goes through the [`PendingQueue`], never inline.
//! Buffer ownership travels with each message, so whoever holds the
//! `BytesMut` is the only one who can touch it. Using an endpoint out of
//! turn is a programming error and panics.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bytes::BytesMut;

use crate::pending::PendingQueue;

type Handler = Box<dyn FnMut(BytesMut)>;

/// Where the single credit currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credit {
    /// Nothing in flight; the initiating side may start a hand-off.
    Idle,
    /// A hand-off is queued for delivery to the far side.
    Posted,
    /// The far side holds the buffer.
    Held,
    /// The acknowledgment is queued for delivery back.
    Returning,
}

#[derive(Default)]
struct Slot {
    handler: RefCell<Option<Handler>>,
    closed: Cell<bool>,
}

impl Slot {
    fn install(&self, handler: Handler) {
        *self.handler.borrow_mut() = Some(handler);
    }

    fn close(&self) {
        self.closed.set(true);
        self.handler.borrow_mut().take();
    }

    fn deliver(&self, buf: BytesMut, what: &str) {
        if self.closed.get() {
            tracing::trace!(what, "dropping delivery to a closed endpoint");
            return;
        }

        // Take the handler out so it may replace itself while running
        let handler = self.handler.borrow_mut().take();
        let Some(mut handler) = handler else {
            panic!("channel protocol violation: no {what} handler installed");
        };
        handler(buf);

        let mut slot = self.handler.borrow_mut();
        if slot.is_none() && !self.closed.get() {
            *slot = Some(handler);
        }
    }
}

/// State shared by both endpoints of one channel.
struct Link {
    mtu: usize,
    queue: PendingQueue,
    credit: Cell<Credit>,
    /// Consumer side of a pass channel, producer side of a receive channel.
    forward: Slot,
    /// The side that started the hand-off and gets the acknowledgment.
    backward: Slot,
}

impl Link {
    fn new(mtu: usize, queue: &PendingQueue) -> Rc<Self> {
        Rc::new(Self {
            mtu,
            queue: queue.clone(),
            credit: Cell::new(Credit::Idle),
            forward: Slot::default(),
            backward: Slot::default(),
        })
    }

    fn expect_credit(&self, expected: Credit, op: &str) {
        let actual = self.credit.get();
        if actual != expected {
            panic!("channel protocol violation: {op} while credit is {actual:?}");
        }
    }

    fn start(self: &Rc<Self>, buf: BytesMut) {
        self.credit.set(Credit::Posted);
        let link = Rc::downgrade(self);
        self.queue.post(move || {
            if let Some(link) = Weak::upgrade(&link) {
                link.credit.set(Credit::Held);
                link.forward.deliver(buf, "forward");
            }
        });
    }

    fn finish(self: &Rc<Self>, buf: BytesMut) {
        self.credit.set(Credit::Returning);
        let link = Rc::downgrade(self);
        self.queue.post(move || {
            if let Some(link) = Weak::upgrade(&link) {
                // Credit is back before the handler runs, so it may start
                // the next hand-off right away.
                link.credit.set(Credit::Idle);
                link.backward.deliver(buf, "acknowledge");
            }
        });
    }
}

/// Create a pass channel carrying packets of at most `mtu` bytes.
pub fn pass_channel(mtu: usize, queue: &PendingQueue) -> (PassSender, PassReceiver) {
    let link = Link::new(mtu, queue);
    (
        PassSender { link: link.clone() },
        PassReceiver { link },
    )
}

/// Create a receive channel whose consumer lends buffers of at least `mtu`
/// bytes of capacity.
pub fn recv_channel(mtu: usize, queue: &PendingQueue) -> (RecvSender, RecvReceiver) {
    let link = Link::new(mtu, queue);
    (
        RecvSender { link: link.clone() },
        RecvReceiver { link },
    )
}

// ============================================================================
// Pass channel
// ============================================================================

/// Producer end of a pass channel.
pub struct PassSender {
    link: Rc<Link>,
}

impl PassSender {
    /// Largest packet the channel carries.
    pub fn mtu(&self) -> usize {
        self.link.mtu
    }

    /// Whether a new packet may be offered.
    pub fn is_idle(&self) -> bool {
        self.link.credit.get() == Credit::Idle
    }

    /// Install the handler that receives offered buffers back once the
    /// consumer is done with them.
    pub fn on_acknowledge(&self, handler: impl FnMut(BytesMut) + 'static) {
        self.link.backward.install(Box::new(handler));
    }

    /// Hand a filled buffer to the consumer.
    ///
    /// # Panics
    ///
    /// If a previous offer has not been acknowledged yet, or the packet is
    /// larger than the MTU.
    pub fn offer(&self, packet: BytesMut) {
        self.link.expect_credit(Credit::Idle, "offer");
        if packet.len() > self.link.mtu {
            panic!(
                "channel protocol violation: offered {} bytes over MTU {}",
                packet.len(),
                self.link.mtu
            );
        }
        self.link.start(packet);
    }
}

impl Drop for PassSender {
    fn drop(&mut self) {
        self.link.backward.close();
    }
}

/// Consumer end of a pass channel.
pub struct PassReceiver {
    link: Rc<Link>,
}

impl PassReceiver {
    /// Largest packet the channel carries.
    pub fn mtu(&self) -> usize {
        self.link.mtu
    }

    /// Install the handler that receives offered packets.
    pub fn on_offer(&self, handler: impl FnMut(BytesMut) + 'static) {
        self.link.forward.install(Box::new(handler));
    }

    /// Return the offered buffer, finishing the hand-off.
    ///
    /// # Panics
    ///
    /// If no offered packet is being held.
    pub fn acknowledge(&self, packet: BytesMut) {
        self.link.expect_credit(Credit::Held, "acknowledge");
        self.link.finish(packet);
    }
}

impl Drop for PassReceiver {
    fn drop(&mut self) {
        self.link.forward.close();
    }
}

// ============================================================================
// Receive channel
// ============================================================================

/// Producer end of a receive channel: fills buffers lent by the consumer.
pub struct RecvSender {
    link: Rc<Link>,
}

impl RecvSender {
    /// Largest packet the producer may write.
    pub fn mtu(&self) -> usize {
        self.link.mtu
    }

    /// Install the handler that receives empty buffers to fill.
    pub fn on_request(&self, handler: impl FnMut(BytesMut) + 'static) {
        self.link.forward.install(Box::new(handler));
    }

    /// Return a lent buffer holding one packet.
    ///
    /// # Panics
    ///
    /// If no request is being held, or the packet is larger than the MTU.
    pub fn acknowledge(&self, packet: BytesMut) {
        self.link.expect_credit(Credit::Held, "acknowledge");
        if packet.len() > self.link.mtu {
            panic!(
                "channel protocol violation: wrote {} bytes over MTU {}",
                packet.len(),
                self.link.mtu
            );
        }
        self.link.finish(packet);
    }
}

impl Drop for RecvSender {
    fn drop(&mut self) {
        self.link.forward.close();
    }
}

/// Consumer end of a receive channel.
pub struct RecvReceiver {
    link: Rc<Link>,
}

impl RecvReceiver {
    /// Largest packet the producer may write.
    pub fn mtu(&self) -> usize {
        self.link.mtu
    }

    /// Whether a new request may be made.
    pub fn is_idle(&self) -> bool {
        self.link.credit.get() == Credit::Idle
    }

    /// Install the handler that receives filled buffers.
    pub fn on_acknowledge(&self, handler: impl FnMut(BytesMut) + 'static) {
        self.link.backward.install(Box::new(handler));
    }

    /// Lend `buf` to the producer. It is cleared first and must have room
    /// for a full MTU.
    ///
    /// # Panics
    ///
    /// If a previous request is still outstanding, or `buf` is too small.
    pub fn request_receive(&self, mut buf: BytesMut) {
        self.link.expect_credit(Credit::Idle, "request");
        buf.clear();
        if buf.capacity() < self.link.mtu {
            panic!(
                "channel protocol violation: lent {} bytes of capacity for MTU {}",
                buf.capacity(),
                self.link.mtu
            );
        }
        self.link.start(buf);
    }
}

impl Drop for RecvReceiver {
    fn drop(&mut self) {
        self.link.backward.close();
    }
}

macro_rules! impl_debug {
    ($($ty:ident),*) => {$(
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("mtu", &self.link.mtu)
                    .field("credit", &self.link.credit.get())
                    .finish()
            }
        }
    )*};
}

impl_debug!(PassSender, PassReceiver, RecvSender, RecvReceiver);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Log = Rc<RefCell<Vec<Vec<u8>>>>;

    fn recorder() -> (Log, impl FnMut(BytesMut) + 'static) {
        let log: Log = Rc::default();
        let sink = log.clone();
        (log, move |buf: BytesMut| sink.borrow_mut().push(buf.to_vec()))
    }

    #[test]
    fn test_offer_is_delivered_on_drain() {
        let queue = PendingQueue::new();
        let (tx, rx) = pass_channel(16, &queue);
        let (offers, handler) = recorder();
        rx.on_offer(handler);

        tx.offer(BytesMut::from(&b"abc"[..]));
        assert!(offers.borrow().is_empty());
        assert!(!tx.is_idle());

        queue.drain();
        assert_eq!(*offers.borrow(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_acknowledge_returns_buffer() {
        let queue = PendingQueue::new();
        let (tx, rx) = pass_channel(16, &queue);
        let (acks, handler) = recorder();
        tx.on_acknowledge(handler);

        let held: Rc<RefCell<Option<BytesMut>>> = Rc::default();
        let slot = held.clone();
        rx.on_offer(move |buf| *slot.borrow_mut() = Some(buf));

        tx.offer(BytesMut::from(&b"xyz"[..]));
        queue.drain();

        let buf = held.borrow_mut().take().unwrap();
        rx.acknowledge(buf);
        assert!(!tx.is_idle());
        queue.drain();

        assert!(tx.is_idle());
        assert_eq!(*acks.borrow(), vec![b"xyz".to_vec()]);
    }

    #[test]
    fn test_offer_from_acknowledge_handler() {
        let queue = PendingQueue::new();
        let tx = Rc::new(pass_channel(16, &queue));
        let (sender, receiver) = &*tx;

        // Consumer acknowledges everything immediately
        let weak = Rc::downgrade(&tx);
        let (offers, mut record) = recorder();
        receiver.on_offer(move |buf| {
            record(buf.clone());
            if let Some(tx) = weak.upgrade() {
                tx.1.acknowledge(buf);
            }
        });

        // Producer re-offers from its acknowledgment handler, three times
        let weak = Rc::downgrade(&tx);
        let remaining = Rc::new(Cell::new(2));
        let left = remaining.clone();
        sender.on_acknowledge(move |mut buf| {
            if left.get() == 0 {
                return;
            }
            left.set(left.get() - 1);
            buf.clear();
            buf.extend_from_slice(b"again");
            if let Some(tx) = weak.upgrade() {
                tx.0.offer(buf);
            }
        });

        sender.offer(BytesMut::from(&b"first"[..]));
        queue.drain();

        assert_eq!(
            *offers.borrow(),
            vec![b"first".to_vec(), b"again".to_vec(), b"again".to_vec()]
        );
        assert_eq!(remaining.get(), 0);
        assert!(sender.is_idle());
    }

    #[test]
    #[should_panic(expected = "channel protocol violation")]
    fn test_double_offer_panics() {
        let queue = PendingQueue::new();
        let (tx, _rx) = pass_channel(16, &queue);
        tx.offer(BytesMut::from(&b"one"[..]));
        tx.offer(BytesMut::from(&b"two"[..]));
    }

    #[test]
    #[should_panic(expected = "channel protocol violation")]
    fn test_offer_before_ack_delivered_panics() {
        let queue = PendingQueue::new();
        let (tx, rx) = pass_channel(16, &queue);
        let held: Rc<RefCell<Option<BytesMut>>> = Rc::default();
        let slot = held.clone();
        rx.on_offer(move |buf| *slot.borrow_mut() = Some(buf));
        tx.on_acknowledge(|_| {});

        tx.offer(BytesMut::from(&b"one"[..]));
        queue.drain();
        rx.acknowledge(held.borrow_mut().take().unwrap());

        // Acknowledgment still queued: the credit has not come back yet
        tx.offer(BytesMut::from(&b"two"[..]));
    }

    #[test]
    #[should_panic(expected = "channel protocol violation")]
    fn test_acknowledge_without_offer_panics() {
        let queue = PendingQueue::new();
        let (_tx, rx) = pass_channel(16, &queue);
        rx.acknowledge(BytesMut::new());
    }

    #[test]
    #[should_panic(expected = "channel protocol violation")]
    fn test_offer_over_mtu_panics() {
        let queue = PendingQueue::new();
        let (tx, _rx) = pass_channel(2, &queue);
        tx.offer(BytesMut::from(&b"toolong"[..]));
    }

    #[test]
    fn test_request_is_cleared_and_filled() {
        let queue = PendingQueue::new();
        let (tx, rx) = recv_channel(8, &queue);
        let tx = Rc::new(tx);

        let weak = Rc::downgrade(&tx);
        tx.on_request(move |mut buf| {
            assert!(buf.is_empty());
            assert!(buf.capacity() >= 8);
            buf.extend_from_slice(b"filled");
            if let Some(tx) = weak.upgrade() {
                tx.acknowledge(buf);
            }
        });
        let (acks, handler) = recorder();
        rx.on_acknowledge(handler);

        let mut buf = BytesMut::with_capacity(8);
        buf.extend_from_slice(b"stale");
        rx.request_receive(buf);
        queue.drain();

        assert_eq!(*acks.borrow(), vec![b"filled".to_vec()]);
        assert!(rx.is_idle());
    }

    #[test]
    #[should_panic(expected = "channel protocol violation")]
    fn test_request_with_small_buffer_panics() {
        let queue = PendingQueue::new();
        let (_tx, rx) = recv_channel(64, &queue);
        rx.request_receive(BytesMut::with_capacity(4));
    }

    #[test]
    #[should_panic(expected = "channel protocol violation")]
    fn test_double_request_panics() {
        let queue = PendingQueue::new();
        let (_tx, rx) = recv_channel(4, &queue);
        rx.request_receive(BytesMut::with_capacity(4));
        rx.request_receive(BytesMut::with_capacity(4));
    }

    #[test]
    fn test_dropped_receiver_discards_pending_offer() {
        let queue = PendingQueue::new();
        let (tx, rx) = pass_channel(16, &queue);
        let (offers, handler) = recorder();
        rx.on_offer(handler);

        tx.offer(BytesMut::from(&b"lost"[..]));
        drop(rx);
        queue.drain();

        assert!(offers.borrow().is_empty());
    }

    #[test]
    fn test_dropped_channel_cancels_jobs() {
        let queue = PendingQueue::new();
        let (tx, rx) = pass_channel(16, &queue);
        rx.on_offer(|_| panic!("delivered after drop"));

        tx.offer(BytesMut::from(&b"lost"[..]));
        drop(tx);
        drop(rx);

        assert_eq!(queue.drain(), 1);
    }

    #[test]
    fn test_handler_can_replace_itself() {
        let queue = PendingQueue::new();
        let pair = Rc::new(pass_channel(16, &queue));
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();

        let weak = Rc::downgrade(&pair);
        let first_log = log.clone();
        pair.1.on_offer(move |buf| {
            first_log.borrow_mut().push("first");
            if let Some(pair) = weak.upgrade() {
                let second_log = first_log.clone();
                pair.1.on_offer(move |_| second_log.borrow_mut().push("second"));
                pair.1.acknowledge(buf);
            }
        });
        let weak = Rc::downgrade(&pair);
        pair.0.on_acknowledge(move |buf| {
            if let Some(pair) = weak.upgrade() {
                if pair.0.is_idle() {
                    pair.0.offer(buf);
                }
            }
        });

        pair.0.offer(BytesMut::from(&b"a"[..]));
        queue.drain();

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Offer(u8),
        Acknowledge,
        Drain,
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            any::<u8>().prop_map(Step::Offer),
            Just(Step::Acknowledge),
            Just(Step::Drain),
        ]
    }

    proptest! {
        #[test]
        fn consumer_never_holds_two_buffers(
            steps in proptest::collection::vec(arb_step(), 0..64),
        ) {
            let queue = PendingQueue::new();
            let (tx, rx) = pass_channel(4, &queue);

            let held: Rc<RefCell<Vec<BytesMut>>> = Rc::default();
            let most_held = Rc::new(Cell::new(0usize));
            let sink = held.clone();
            let peak = most_held.clone();
            rx.on_offer(move |buf| {
                sink.borrow_mut().push(buf);
                peak.set(peak.get().max(sink.borrow().len()));
            });

            let acked = Rc::new(Cell::new(0usize));
            let count = acked.clone();
            tx.on_acknowledge(move |_| count.set(count.get() + 1));

            let mut offered = 0usize;
            for step in steps {
                match step {
                    Step::Offer(byte) if tx.is_idle() => {
                        tx.offer(BytesMut::from(&[byte][..]));
                        offered += 1;
                    }
                    Step::Offer(_) => {}
                    Step::Acknowledge => {
                        let buf = held.borrow_mut().pop();
                        if let Some(buf) = buf {
                            rx.acknowledge(buf);
                        }
                    }
                    Step::Drain => {
                        queue.drain();
                    }
                }
                prop_assert!(held.borrow().len() <= 1);
                prop_assert!(offered - acked.get() <= 1);
            }

            queue.drain();
            prop_assert!(most_held.get() <= 1);
        }
    }
}
