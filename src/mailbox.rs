/*!
 * A bounded, multi-producer/multi-consumer mailbox with lifecycle
 * broadcasts.
 *
 * This is the sole concurrency primitive used by the find-fire pipeline; it
 * replaces direct use of mutex+condvar/thread APIs at each pipeline stage
 * with one uniform registration/send/receive/deregistration contract.
 */

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State<T> {
    queue: VecDeque<T>,
    capacity: usize,
    num_senders: usize,
    num_receivers: usize,
}

/// A bounded FIFO of opaque items shared by parallel workers.
///
/// Senders and receivers register before use and deregister when done. Every
/// transition that might unblock a waiter signals the matching condvar.
pub struct Mailbox<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    senders_registered: Condvar,
    receivers_registered: Condvar,
}

impl<T> Mailbox<T> {
    /// Create a mailbox with the given capacity. A power of two (16 is a
    /// reasonable default) keeps the queue's memory footprint predictable,
    /// though any positive capacity works.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "mailbox capacity must be positive");
        Mailbox {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                num_senders: 0,
                num_receivers: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            senders_registered: Condvar::new(),
            receivers_registered: Condvar::new(),
        }
    }

    /// Register as a sender. Broadcasts `receivers_registered` waiters so
    /// any blocked `wait_until_ready_to_receive` callers can re-check.
    pub fn register_sender(&self) {
        let mut state = self.state.lock().unwrap();
        state.num_senders += 1;
        if state.num_senders == 1 {
            self.receivers_registered.notify_all();
        }
    }

    /// Register as a receiver. Broadcasts `senders_registered` waiters so
    /// any blocked `wait_until_ready_to_send` callers can re-check.
    pub fn register_receiver(&self) {
        let mut state = self.state.lock().unwrap();
        state.num_receivers += 1;
        if state.num_receivers == 1 {
            self.senders_registered.notify_all();
        }
    }

    /// Block until at least one receiver is registered.
    pub fn wait_until_ready_to_send(&self) {
        let mut state = self.state.lock().unwrap();
        while state.num_receivers == 0 {
            state = self.senders_registered.wait(state).unwrap();
        }
    }

    /// Block until at least one sender is registered or the queue is
    /// non-empty.
    pub fn wait_until_ready_to_receive(&self) {
        let mut state = self.state.lock().unwrap();
        while state.num_senders == 0 && state.queue.is_empty() {
            state = self.receivers_registered.wait(state).unwrap();
        }
    }

    /// Enqueue `item`. Fails immediately (an invariant violation — no
    /// sender is registered) if called without registering first. Blocks
    /// while the queue is full and at least one receiver remains; if the
    /// last receiver deregisters while waiting, returns `false` without
    /// enqueuing.
    pub fn send(&self, item: T) -> bool {
        let mut state = self.state.lock().unwrap();
        assert!(state.num_senders > 0, "send() called with no senders registered");

        while state.queue.len() >= state.capacity && state.num_receivers > 0 {
            state = self.not_full.wait(state).unwrap();
        }

        if state.num_receivers == 0 {
            return false;
        }

        let was_empty = state.queue.is_empty();
        state.queue.push_back(item);
        if was_empty {
            self.not_empty.notify_one();
        }

        true
    }

    /// Dequeue the next item. Blocks while the queue is empty and at least
    /// one sender remains; returns `None` once the queue is empty and no
    /// senders remain.
    pub fn receive(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();

        while state.queue.is_empty() && state.num_senders > 0 {
            state = self.not_empty.wait(state).unwrap();
        }

        if state.queue.is_empty() {
            return None;
        }

        let was_full = state.queue.len() >= state.capacity;
        let item = state.queue.pop_front();
        if was_full {
            self.not_full.notify_one();
        }

        item
    }

    /// Deregister as a sender. When the last sender deregisters, broadcasts
    /// `not_empty` so blocked receivers observe the shutdown and drain the
    /// remaining queue before returning `None`.
    pub fn deregister_sender(&self) {
        let mut state = self.state.lock().unwrap();
        state.num_senders -= 1;
        if state.num_senders == 0 {
            self.not_empty.notify_all();
        }
    }

    /// Deregister as a receiver. When the last receiver deregisters,
    /// broadcasts `not_full` so blocked senders observe the shutdown and
    /// return `false` instead of blocking forever.
    pub fn deregister_receiver(&self) {
        let mut state = self.state.lock().unwrap();
        state.num_receivers -= 1;
        if state.num_receivers == 0 {
            self.not_full.notify_all();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_sender_single_receiver_round_trip() {
        let mbox: Arc<Mailbox<i32>> = Arc::new(Mailbox::new(4));
        mbox.register_sender();
        mbox.register_receiver();

        for i in 0..10 {
            assert!(mbox.send(i));
        }
        mbox.deregister_sender();

        let mut received = Vec::new();
        while let Some(v) = mbox.receive() {
            received.push(v);
        }
        mbox.deregister_receiver();

        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn no_item_is_dropped_with_multiple_senders_and_receivers() {
        let mbox: Arc<Mailbox<i32>> = Arc::new(Mailbox::new(4));

        let n_senders = 4;
        let n_receivers = 3;
        let per_sender = 200;

        for _ in 0..n_senders {
            mbox.register_sender();
        }
        for _ in 0..n_receivers {
            mbox.register_receiver();
        }

        let senders: Vec<_> = (0..n_senders)
            .map(|_| {
                let mbox = Arc::clone(&mbox);
                thread::spawn(move || {
                    for i in 0..per_sender {
                        mbox.send(i);
                    }
                    mbox.deregister_sender();
                })
            })
            .collect();

        let receivers: Vec<_> = (0..n_receivers)
            .map(|_| {
                let mbox = Arc::clone(&mbox);
                thread::spawn(move || {
                    let mut count = 0;
                    while mbox.receive().is_some() {
                        count += 1;
                    }
                    mbox.deregister_receiver();
                    count
                })
            })
            .collect();

        for s in senders {
            s.join().unwrap();
        }

        let total: usize = receivers.into_iter().map(|r| r.join().unwrap()).sum();
        assert_eq!(total, n_senders * per_sender);
    }

    #[test]
    fn send_returns_false_once_receivers_are_gone() {
        let mbox: Arc<Mailbox<i32>> = Arc::new(Mailbox::new(1));
        mbox.register_sender();
        mbox.register_receiver();
        mbox.deregister_receiver();

        assert!(!mbox.send(1));
    }
}
