//! # Receive Ring Buffer
//!
//! A fixed-capacity byte ring shared between the UART receive interrupt
//! (single producer) and the foreground client (single consumer).
//!
//! Every access runs inside a critical section, so the producer can call
//! [`RxBuffer::push`] from interrupt context while the foreground copies,
//! consumes or clears. No lock is ever held across I/O or a sleep: each
//! method copies what it needs and returns.
//!
//! When the ring is full the **oldest** byte is discarded to make room for
//! the new one. Freshness wins over completeness because the producer must
//! never block.
//!
//! ```ignore
//! static RX: RxBuffer<1024> = RxBuffer::new();
//!
//! #[interrupt]
//! fn UART1_IRQ() {
//!     while let Some(byte) = uart.read_byte() {
//!         RX.push(byte);
//!     }
//! }
//! ```

use core::cell::RefCell;
use core::ops::{Deref, Range};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

/// Default ring capacity, matching the modem's largest burst of output.
pub const DEFAULT_RX_CAPACITY: usize = 1024;

struct Ring<const N: usize> {
    buf: [u8; N],
    /// Index of the oldest unconsumed byte.
    read: usize,
    /// Number of unconsumed bytes.
    len: usize,
    /// Bytes ever retired from the front (consumed, cleared or overwritten).
    /// Wraps; only differences are meaningful.
    retired: usize,
    /// Bytes discarded by the overflow policy.
    dropped: usize,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        Self {
            buf: [0; N],
            read: 0,
            len: 0,
            retired: 0,
            dropped: 0,
        }
    }

    fn write_index(&self) -> usize {
        (self.read + self.len) % N
    }

    fn push(&mut self, byte: u8) {
        if self.len == N {
            self.read = (self.read + 1) % N;
            self.len -= 1;
            self.retired = self.retired.wrapping_add(1);
            self.dropped = self.dropped.wrapping_add(1);
        }
        let w = self.write_index();
        self.buf[w] = byte;
        self.len += 1;
    }

    fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        self.read = (self.read + n) % N;
        self.len -= n;
        self.retired = self.retired.wrapping_add(n);
        n
    }

    fn at(&self, offset: usize) -> u8 {
        self.buf[(self.read + offset) % N]
    }

    /// Removes `count` bytes starting `start` bytes past the read index,
    /// closing the gap by shifting the newer bytes down.
    fn remove(&mut self, start: usize, count: usize) {
        for i in start..self.len - count {
            let src = (self.read + i + count) % N;
            let dst = (self.read + i) % N;
            self.buf[dst] = self.buf[src];
        }
        self.len -= count;
    }
}

/// A copy of the unconsumed bytes, tagged with the stream position it was
/// taken at.
///
/// Offsets into a snapshot can be handed back to [`RxBuffer::release`] or
/// [`RxBuffer::excise`]; the buffer corrects them for anything the producer
/// overwrote in the meantime. A snapshot stays valid until the next
/// consumer-side mutation.
#[derive(Debug, Clone)]
pub struct Snapshot<const N: usize> {
    data: Vec<u8, N>,
    origin: usize,
}

impl<const N: usize> Snapshot<N> {
    /// The copied bytes, oldest first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Deref for Snapshot<N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

/// Interrupt-safe receive buffer. See the module docs.
pub struct RxBuffer<const N: usize = DEFAULT_RX_CAPACITY> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Ring<N>>>,
}

impl<const N: usize> RxBuffer<N> {
    /// Creates an empty buffer. Usable in a `static`.
    pub const fn new() -> Self {
        const { assert!(N > 0, "RxBuffer capacity must be non-zero") };
        Self {
            inner: Mutex::new(RefCell::new(Ring::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Ring<N>) -> R) -> R {
        self.inner.lock(|ring| f(&mut ring.borrow_mut()))
    }

    /// Appends one received byte. Never blocks; O(1).
    ///
    /// Intended for the receive interrupt. Overwrites the oldest byte when
    /// the buffer is full.
    pub fn push(&self, byte: u8) {
        self.with(|ring| ring.push(byte));
    }

    /// Appends a chunk of received bytes under a single critical section.
    pub fn push_slice(&self, bytes: &[u8]) {
        self.with(|ring| {
            for &b in bytes {
                ring.push(b);
            }
        });
    }

    /// Copies all unconsumed bytes without changing the buffer.
    pub fn snapshot(&self) -> Snapshot<N> {
        self.with(|ring| {
            let mut data = Vec::new();
            for i in 0..ring.len {
                // Cannot overflow: `len <= N`.
                let _ = data.push(ring.at(i));
            }
            Snapshot {
                data,
                origin: ring.retired,
            }
        })
    }

    /// Advances the read index by `n`, clamped to the available data.
    ///
    /// Returns how many bytes were actually consumed.
    pub fn consume(&self, n: usize) -> usize {
        self.with(|ring| ring.consume(n))
    }

    /// Consumes everything up to offset `end` of `snapshot`.
    ///
    /// Bytes of that prefix already overwritten by the producer are not
    /// counted twice, so bytes received after the snapshot survive.
    pub fn release(&self, snapshot: &Snapshot<N>, end: usize) -> usize {
        self.with(|ring| {
            let gone = ring.retired.wrapping_sub(snapshot.origin);
            ring.consume(end.saturating_sub(gone))
        })
    }

    /// Removes the bytes at `range` of `snapshot`, leaving whatever comes
    /// before and after it in place.
    ///
    /// Returns how many bytes were removed, which is less than
    /// `range.len()` if the producer overwrote part of the range.
    pub fn excise(&self, snapshot: &Snapshot<N>, range: Range<usize>) -> usize {
        self.with(|ring| {
            let gone = ring.retired.wrapping_sub(snapshot.origin);
            if range.end <= gone {
                return 0;
            }
            let start = range.start.saturating_sub(gone);
            let end = (range.end - gone).min(ring.len);
            if start >= end {
                return 0;
            }
            if start == 0 {
                return ring.consume(end);
            }
            ring.remove(start, end - start);
            end - start
        })
    }

    /// Drops everything received so far.
    pub fn clear(&self) {
        self.with(|ring| {
            let len = ring.len;
            ring.consume(len);
        });
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.with(|ring| ring.len)
    }

    /// Returns `true` if there is nothing to consume.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes discarded by the overflow policy since creation.
    pub fn dropped(&self) -> usize {
        self.with(|ring| ring.dropped)
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
