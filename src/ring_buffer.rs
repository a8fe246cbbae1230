//! Sample ring buffer between the library's stream callback (producer) and
//! [`Rsp::work`][crate::Rsp::work] (consumer).
//!
//! Samples are numbered by two monotonic 64 bit counters: `head` is the
//! number of samples written, `tail` the number of samples read. The
//! invariants are `tail <= head` and `head - tail <= capacity`. The
//! producer blocks while there isn't enough room, the consumer blocks while
//! the buffer is empty.

use parking_lot::{
    Condvar,
    Mutex,
};

use crate::{
    Error,
    Sample,
};

/// default capacity of a ring buffer, in samples
pub const DEFAULT_RING_BUFFER_SIZE: usize = 0x10000;

#[derive(derive_more::Debug)]
struct Storage {
    #[debug(skip)]
    xi: Box<[i16]>,
    #[debug(skip)]
    xq: Box<[i16]>,
}

#[derive(Debug)]
struct State {
    /// sample arrays. these only exist between `allocate` and `release`.
    storage: Option<Storage>,

    /// number of samples written
    head: u64,

    /// number of samples read
    tail: u64,
}

#[derive(Debug)]
pub(crate) struct RingBuffer {
    state: Mutex<State>,

    /// notified by the producer after it wrote samples
    not_empty: Condvar,

    /// notified by the consumer after it read samples
    not_full: Condvar,

    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring buffer capacity must be a power of two"
        );

        Self {
            state: Mutex::new(State {
                storage: None,
                head: 0,
                tail: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn mask(&self) -> u64 {
        self.capacity as u64 - 1
    }

    /// Allocates the sample arrays and resets the counters.
    pub fn allocate(&self) -> Result<(), Error> {
        let allocate = || -> Option<Box<[i16]>> {
            let mut samples = Vec::new();
            samples.try_reserve_exact(self.capacity).ok()?;
            samples.resize(self.capacity, 0);
            Some(samples.into_boxed_slice())
        };

        let xi = allocate();
        let xq = allocate();
        let (Some(xi), Some(xq)) = (xi, xq)
        else {
            tracing::error!(capacity = self.capacity, "ring buffer allocation failed");
            return Err(Error::BufferAllocation {
                capacity: self.capacity,
            });
        };

        let mut state = self.state.lock();
        state.storage = Some(Storage { xi, xq });
        state.head = 0;
        state.tail = 0;
        Ok(())
    }

    /// Releases the sample arrays.
    ///
    /// A producer blocked in [`write`][Self::write] is woken up and returns
    /// without writing. A blocked consumer returns 0. The counters are kept,
    /// with `tail` advanced to `head`.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.tail = state.head;
        state.storage = None;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_allocated(&self) -> bool {
        self.state.lock().storage.is_some()
    }

    /// `(head, tail)`
    pub fn counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.head, state.tail)
    }

    /// Writes a burst of samples, blocking until there is room for them.
    ///
    /// Bursts larger than the capacity are written in chunks. Returns
    /// `false` if the buffer was released before all samples were written.
    pub fn write(&self, xi: &[i16], xq: &[i16]) -> bool {
        debug_assert_eq!(xi.len(), xq.len());
        let count = xi.len().min(xq.len());
        let mut written = 0;

        let mut state = self.state.lock();

        while written < count {
            let chunk = (count - written).min(self.capacity);

            while state.storage.is_some()
                && state.tail + ((self.capacity - chunk) as u64) < state.head
            {
                self.not_full.wait(&mut state);
            }

            let start = (state.head & self.mask()) as usize;
            let Some(storage) = &mut state.storage
            else {
                return false;
            };
            copy_in(&mut storage.xi, start, &xi[written..][..chunk]);
            copy_in(&mut storage.xq, start, &xq[written..][..chunk]);

            state.head += chunk as u64;
            written += chunk;
            self.not_empty.notify_one();
        }

        true
    }

    /// Reads up to `output.len()` samples, blocking until at least one is
    /// available.
    ///
    /// Returns the number of samples read, which is 0 if the buffer is
    /// released.
    pub fn read<S: Sample>(&self, output: &mut [S]) -> usize {
        if output.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();

        while state.storage.is_some() && state.tail >= state.head {
            self.not_empty.wait(&mut state);
        }

        let available = state.head - state.tail;
        let start = (state.tail & self.mask()) as usize;
        let Some(storage) = &state.storage
        else {
            return 0;
        };

        // available <= capacity, so this fits into usize
        let n = output.len().min(available as usize);
        copy_out(&storage.xi, &storage.xq, start, &mut output[..n]);

        state.tail += n as u64;
        self.not_full.notify_one();

        n
    }

    #[cfg(test)]
    fn seek(&self, position: u64) {
        let mut state = self.state.lock();
        assert_eq!(state.head, state.tail);
        state.head = position;
        state.tail = position;
    }
}

/// Copies `source` into `buffer` at `start`, wrapping around at the end.
fn copy_in(buffer: &mut [i16], start: usize, source: &[i16]) {
    let first = source.len().min(buffer.len() - start);
    buffer[start..][..first].copy_from_slice(&source[..first]);
    buffer[..source.len() - first].copy_from_slice(&source[first..]);
}

fn copy_out<S: Sample>(xi: &[i16], xq: &[i16], start: usize, output: &mut [S]) {
    let first = output.len().min(xi.len() - start);
    let (output_first, output_second) = output.split_at_mut(first);

    for (sample, (i, q)) in output_first
        .iter_mut()
        .zip(xi[start..].iter().zip(&xq[start..]))
    {
        *sample = S::from_iq(*i, *q);
    }

    for (sample, (i, q)) in output_second.iter_mut().zip(xi.iter().zip(xq)) {
        *sample = S::from_iq(*i, *q);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{
                AtomicBool,
                Ordering,
            },
        },
        thread,
        time::Duration,
    };

    use num_complex::Complex;

    use crate::{
        Sc16,
        ring_buffer::RingBuffer,
    };

    /// a burst of `count` samples numbered from `first`, with q = !i
    fn burst(first: u64, count: usize) -> (Vec<i16>, Vec<i16>) {
        let xi: Vec<i16> = (0..count as u64)
            .map(|n| (first + n) as u16 as i16)
            .collect();
        let xq = xi.iter().map(|i| !*i).collect();
        (xi, xq)
    }

    fn check_burst(first: u64, samples: &[Sc16]) {
        for (n, sample) in samples.iter().enumerate() {
            let expected = (first + n as u64) as u16 as i16;
            assert_eq!(sample.i, expected, "sample {} out of order", first + n as u64);
            assert_eq!(sample.q, !expected);
        }
    }

    #[test]
    fn reads_what_was_written() {
        let buffer = RingBuffer::new(16);
        buffer.allocate().unwrap();

        let (xi, xq) = burst(0, 10);
        assert!(buffer.write(&xi, &xq));

        let mut output = [Sc16::default(); 4];
        assert_eq!(buffer.read(&mut output), 4);
        check_burst(0, &output);

        let mut output = [Sc16::default(); 16];
        assert_eq!(buffer.read(&mut output), 6);
        check_burst(4, &output[..6]);

        assert_eq!(buffer.counters(), (10, 10));
    }

    #[test]
    fn converts_to_fc32() {
        let buffer = RingBuffer::new(16);
        buffer.allocate().unwrap();
        buffer.write(&[16384, -32768], &[-16384, 0]);

        let mut output = [Complex::<f32>::default(); 2];
        assert_eq!(buffer.read(&mut output), 2);
        assert_eq!(output[0], Complex::new(0.5, -0.5));
        assert_eq!(output[1], Complex::new(-1.0, 0.0));
    }

    #[test]
    fn conserves_samples_across_threads() {
        const TOTAL: u64 = 200_000;

        let buffer = Arc::new(RingBuffer::new(1024));
        buffer.allocate().unwrap();

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut sent = 0;
                // burst sizes that don't divide the capacity, some larger than it
                let sizes = [1, 7, 300, 1023, 1500, 64, 3];
                for size in sizes.iter().cycle() {
                    if sent >= TOTAL {
                        break;
                    }
                    let size = (*size as u64).min(TOTAL - sent) as usize;
                    let (xi, xq) = burst(sent, size);
                    assert!(buffer.write(&xi, &xq));
                    sent += size as u64;
                }
            })
        };

        let mut received = 0;
        let mut output = vec![Sc16::default(); 777];
        while received < TOTAL {
            let n = buffer.read(&mut output);
            assert!(n > 0);
            check_burst(received, &output[..n]);
            received += n as u64;
            let (head, tail) = buffer.counters();
            assert!(tail <= head);
            assert!(head - tail <= 1024);
        }

        producer.join().unwrap();
        assert_eq!(buffer.counters(), (TOTAL, TOTAL));
    }

    #[test]
    fn producer_blocks_when_full() {
        let buffer = Arc::new(RingBuffer::new(8));
        buffer.allocate().unwrap();

        let (xi, xq) = burst(0, 6);
        assert!(buffer.write(&xi, &xq));

        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let buffer = buffer.clone();
            let done = done.clone();
            thread::spawn(move || {
                let (xi, xq) = burst(6, 4);
                assert!(buffer.write(&xi, &xq));
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::SeqCst), "producer overflowed the buffer");
        assert_eq!(buffer.counters(), (6, 0));

        let mut output = [Sc16::default(); 3];
        assert_eq!(buffer.read(&mut output), 3);
        check_burst(0, &output);

        producer.join().unwrap();
        assert!(done.load(Ordering::SeqCst));

        let mut output = [Sc16::default(); 8];
        assert_eq!(buffer.read(&mut output), 7);
        check_burst(3, &output[..7]);
    }

    #[test]
    fn release_unblocks_producer_without_writing() {
        let buffer = Arc::new(RingBuffer::new(8));
        buffer.allocate().unwrap();

        let (xi, xq) = burst(0, 8);
        assert!(buffer.write(&xi, &xq));

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let (xi, xq) = burst(8, 4);
                buffer.write(&xi, &xq)
            })
        };

        thread::sleep(Duration::from_millis(50));
        buffer.release();

        assert!(!producer.join().unwrap());
        assert_eq!(buffer.counters(), (8, 8));
        assert!(!buffer.is_allocated());
    }

    #[test]
    fn release_unblocks_consumer() {
        let buffer = Arc::new(RingBuffer::new(8));
        buffer.allocate().unwrap();

        let consumer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut output = [Sc16::default(); 4];
                buffer.read(&mut output)
            })
        };

        thread::sleep(Duration::from_millis(50));
        buffer.release();
        assert_eq!(consumer.join().unwrap(), 0);
    }

    #[test]
    fn wraps_around_past_2_pow_33() {
        let buffer = RingBuffer::new(4096);
        buffer.allocate().unwrap();

        let start = (1u64 << 33) - 10_000;
        buffer.seek(start);

        let mut position = start;
        let mut output = vec![Sc16::default(); 4096];
        for size in [1000usize, 3001, 4095, 17, 2500].iter().cycle() {
            if position > (1 << 33) + 20_000 {
                break;
            }
            let (xi, xq) = burst(position, *size);
            assert!(buffer.write(&xi, &xq));
            let n = buffer.read(&mut output[..*size]);
            assert_eq!(n, *size);
            check_burst(position, &output[..n]);
            position += n as u64;
        }

        let (head, tail) = buffer.counters();
        assert_eq!(head, tail);
        assert!(head > 1 << 33);
    }
}
