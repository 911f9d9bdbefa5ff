//! Broadcast distribution of audio frames
//!
//! A bounded ring with one producer and any number of consumers, each
//! holding a private [`Cursor`]. The producer never blocks: when the
//! ring is full the oldest frame is evicted, and every cursor that had
//! not yet read it records the loss in a monotonically increasing skip
//! counter. The skip is surfaced to the consumer on its next read as an
//! explicit discontinuity, so a decoder knows to resynchronize rather
//! than decode across the gap.
//!
//! Delivery is in order per cursor. There is no ordering guarantee
//! *between* consumers; a slow consumer only ever harms itself.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Result of one [`Cursor::read`]
#[derive(Clone, Debug, PartialEq)]
pub enum CursorRead<T> {
    /// The next frame, in order, with no loss since the last read
    Frame(T),

    /// Frames were evicted before this cursor could read them
    ///
    /// `frame` is the oldest frame still buffered; `skipped` is how
    /// many frames were lost since the previous read.
    Skipped {
        /// The frame following the gap
        frame: T,
        /// Frames lost since the last successful read
        skipped: u64,
    },

    /// No frame arrived within the timeout
    Timeout,

    /// The distributor is closed and fully drained
    Closed,
}

#[derive(Clone, Debug, Default)]
struct CursorState {
    // sequence number of the next frame this cursor wants
    next: u64,
    // total frames evicted unread, over the cursor's lifetime
    skipped: u64,
}

#[derive(Debug)]
struct Ring<T> {
    buf: VecDeque<(u64, T)>,
    capacity: usize,
    // sequence number of the next frame to be produced
    next_seq: u64,
    cursors: HashMap<usize, CursorState>,
    next_cursor_id: usize,
    closed: bool,
}

impl<T> Ring<T> {
    // sequence number of the oldest buffered frame
    fn front_seq(&self) -> u64 {
        self.next_seq - self.buf.len() as u64
    }
}

#[derive(Debug)]
struct Shared<T> {
    ring: Mutex<Ring<T>>,
    readable: Condvar,
}

/// Handle for subscribing consumers and inspecting the ring
#[derive(Debug)]
pub struct Distributor<T> {
    shared: Arc<Shared<T>>,
}

/// The write side of a [`Distributor`]
///
/// Dropping the producer closes the distributor.
#[derive(Debug)]
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// A private read position into a [`Distributor`]
#[derive(Debug)]
pub struct Cursor<T> {
    shared: Arc<Shared<T>>,
    id: usize,
    reported_skips: u64,
}

impl<T: Clone> Distributor<T> {
    /// Create a ring holding at most `capacity` frames
    ///
    /// Returns the single producer and the subscription handle.
    pub fn new(capacity: usize) -> (Producer<T>, Distributor<T>) {
        assert!(capacity > 0);
        let shared = Arc::new(Shared {
            ring: Mutex::new(Ring {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                next_seq: 0,
                cursors: HashMap::new(),
                next_cursor_id: 0,
                closed: false,
            }),
            readable: Condvar::new(),
        });
        (
            Producer {
                shared: Arc::clone(&shared),
            },
            Distributor { shared },
        )
    }

    /// Create a new cursor, positioned at the oldest buffered frame
    pub fn subscribe(&self) -> Cursor<T> {
        let mut ring = self.shared.ring.lock().unwrap();
        let id = ring.next_cursor_id;
        ring.next_cursor_id += 1;
        let next = ring.front_seq();
        ring.cursors.insert(id, CursorState { next, skipped: 0 });
        Cursor {
            shared: Arc::clone(&self.shared),
            id,
            reported_skips: 0,
        }
    }

    /// Frames currently buffered and the ring capacity
    pub fn occupancy(&self) -> (usize, usize) {
        let ring = self.shared.ring.lock().unwrap();
        (ring.buf.len(), ring.capacity)
    }

    /// Close the distributor, waking every blocked cursor
    ///
    /// Buffered frames remain readable; cursors see
    /// [`CursorRead::Closed`] once drained.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl<T> Shared<T> {
    fn close(&self) {
        self.ring.lock().unwrap().closed = true;
        self.readable.notify_all();
    }
}

impl<T: Clone> Producer<T> {
    /// Append a frame; never blocks
    ///
    /// A full ring evicts its oldest frame and charges the skip to
    /// every cursor that had not read it.
    pub fn push(&mut self, frame: T) {
        let mut ring = self.shared.ring.lock().unwrap();
        if ring.buf.len() == ring.capacity {
            let (evicted_seq, _) = ring.buf.pop_front().expect("non-empty at capacity");
            for cursor in ring.cursors.values_mut() {
                if cursor.next <= evicted_seq {
                    cursor.skipped += evicted_seq + 1 - cursor.next;
                    cursor.next = evicted_seq + 1;
                }
            }
        }
        let seq = ring.next_seq;
        ring.next_seq += 1;
        ring.buf.push_back((seq, frame));
        drop(ring);
        self.shared.readable.notify_all();
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T: Clone> Cursor<T> {
    /// Read the next frame, waiting up to `timeout`
    pub fn read(&mut self, timeout: Duration) -> CursorRead<T> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.shared.ring.lock().unwrap();

        loop {
            let state = ring.cursors[&self.id].clone();
            let front = ring.front_seq();
            debug_assert!(state.next >= front);
            let index = (state.next - front) as usize;

            if index < ring.buf.len() {
                let frame = ring.buf[index].1.clone();
                let entry = ring.cursors.get_mut(&self.id).expect("live cursor");
                entry.next += 1;
                let newly_skipped = state.skipped - self.reported_skips;
                self.reported_skips = state.skipped;
                return if newly_skipped > 0 {
                    CursorRead::Skipped {
                        frame,
                        skipped: newly_skipped,
                    }
                } else {
                    CursorRead::Frame(frame)
                };
            }

            if ring.closed {
                return CursorRead::Closed;
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(rem) if !rem.is_zero() => rem,
                _ => return CursorRead::Timeout,
            };
            let (guard, wait) = self
                .shared
                .readable
                .wait_timeout(ring, remaining)
                .unwrap();
            ring = guard;
            if wait.timed_out() {
                // re-check once; a frame may have raced the timeout
                continue;
            }
        }
    }

    /// Total frames this cursor has ever lost to eviction
    pub fn total_skipped(&self) -> u64 {
        let ring = self.shared.ring.lock().unwrap();
        ring.cursors[&self.id].skipped
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        if let Ok(mut ring) = self.shared.ring.lock() {
            ring.cursors.remove(&self.id);
        }
    }
}
