//! Packet queue shared between a producer and a consumer task
//!
//! The queue never blocks waiting for data. Consumers that want to sleep until
//! something arrives pair the queue with a [`Signal`](crate::signal::Signal).

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::packet::Packet;

/// FIFO of owned packets guarded by one lock
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: Mutex<VecDeque<Packet>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a packet onto the tail
    pub fn push(&self, packet: Packet) {
        self.packets.lock().push_back(packet);
    }

    /// Take the head packet, if any
    pub fn pop(&self) -> Option<Packet> {
        self.packets.lock().pop_front()
    }

    /// Inspect the head packet without taking it
    pub fn peek_with<R>(&self, f: impl FnOnce(&Packet) -> R) -> Option<R> {
        self.packets.lock().front().map(f)
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    /// Release every queued packet, returning how many were dropped
    pub fn drain(&self) -> usize {
        let drained = std::mem::take(&mut *self.packets.lock());
        drained.len()
    }

    /// Swap the whole contents for `packets` under one lock
    ///
    /// Returns how many packets were dropped. A concurrent `push` lands either
    /// before the swap and is dropped, or after it and queues behind `packets`.
    pub fn replace<I: IntoIterator<Item = Packet>>(&self, packets: I) -> usize {
        let fresh: VecDeque<Packet> = packets.into_iter().collect();
        let dropped = std::mem::replace(&mut *self.packets.lock(), fresh);
        dropped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(n: u8) -> Packet {
        Packet::new(2, 1, vec![n])
    }

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new();
        assert!(queue.pop().is_none());

        for n in 0..5 {
            queue.push(packet(n));
        }
        assert_eq!(queue.len(), 5);
        for n in 0..5 {
            assert_eq!(queue.pop().unwrap().payload(), &[n]);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_releases_everything() {
        let queue = PacketQueue::new();
        queue.push(packet(1));
        queue.push(packet(2));
        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_peek_leaves_head_in_place() {
        let queue = PacketQueue::new();
        assert_eq!(queue.peek_with(|p| p.payload().to_vec()), None);

        queue.push(packet(7));
        queue.push(packet(8));
        assert_eq!(queue.peek_with(|p| p.payload()[0]), Some(7));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().payload(), &[7]);
    }

    #[test]
    fn test_replace_puts_new_packets_ahead_of_later_pushes() {
        let queue = PacketQueue::new();
        queue.push(packet(1));
        queue.push(packet(2));

        assert_eq!(queue.replace(vec![packet(10), packet(11)]), 2);
        queue.push(packet(3));

        let order: Vec<u8> = std::iter::from_fn(|| queue.pop()).map(|p| p.payload()[0]).collect();
        assert_eq!(order, vec![10, 11, 3]);
    }
}
