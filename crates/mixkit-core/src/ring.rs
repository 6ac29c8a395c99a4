//! Two-phase ring buffers for sample transport.
//!
//! Every buffer in the pipeline is a fixed-capacity ring with a
//! reserve/commit protocol on both ends: `request_write` hands out a
//! contiguous free region, `finish_write` commits however much of it was
//! actually produced. Reads mirror this with `request_read`/`finish_read`,
//! which also lets in-place segments mutate committed data before deciding
//! how much of it to consume.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-capacity ring with two-phase access on both ends.
///
/// Cursors are monotonic; the occupied region is `read..write` taken modulo
/// the capacity. At most one read and one write reservation may be
/// outstanding at a time.
#[derive(Debug)]
pub struct Ring<T> {
    data: Box<[T]>,
    read: u64,
    write: u64,
    read_reserved: Option<u32>,
    write_reserved: Option<u32>,
}

impl<T: Copy + Default> Ring<T> {
    /// Create a ring holding up to `capacity` elements.
    pub fn new(capacity: u32) -> Self {
        Self {
            data: vec![T::default(); capacity as usize].into_boxed_slice(),
            read: 0,
            write: 0,
            read_reserved: None,
            write_reserved: None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    /// Number of committed elements waiting to be read.
    pub fn available_read(&self) -> u32 {
        (self.write - self.read) as u32
    }

    /// Number of free elements that can still be committed.
    pub fn available_write(&self) -> u32 {
        self.capacity() - self.available_read()
    }

    /// Reserve up to `size` elements for writing.
    ///
    /// Grants the largest contiguous free run, which may be shorter than
    /// both `size` and [`available_write`](Self::available_write) when the
    /// free region wraps. Fails with [`Error::BufferFull`] when nothing can
    /// be granted or a write reservation is already outstanding.
    pub fn request_write(&mut self, size: u32) -> Result<&mut [T]> {
        if self.write_reserved.is_some() {
            return Err(Error::BufferFull);
        }
        let cap = self.capacity();
        if cap == 0 {
            return Err(Error::BufferFull);
        }
        let start = (self.write % cap as u64) as u32;
        let granted = size.min(self.available_write()).min(cap - start);
        if granted == 0 {
            return Err(Error::BufferFull);
        }
        self.write_reserved = Some(granted);
        let start = start as usize;
        Ok(&mut self.data[start..start + granted as usize])
    }

    /// Commit `size` elements of the outstanding write reservation.
    ///
    /// Committing more than was reserved fails with
    /// [`Error::BufferOvercommit`] and leaves all state, including the
    /// reservation, unchanged. Committing less releases the remainder.
    pub fn finish_write(&mut self, size: u32) -> Result<()> {
        let reserved = self.write_reserved.unwrap_or(0);
        if size > reserved {
            return Err(Error::BufferOvercommit);
        }
        self.write += size as u64;
        self.write_reserved = None;
        Ok(())
    }

    /// Reserve up to `size` committed elements for reading.
    ///
    /// The slice is mutable so in-place segments can transform data where
    /// it sits. Fails with [`Error::BufferEmpty`] when nothing is committed
    /// or a read reservation is already outstanding.
    pub fn request_read(&mut self, size: u32) -> Result<&mut [T]> {
        if self.read_reserved.is_some() {
            return Err(Error::BufferEmpty);
        }
        let cap = self.capacity();
        if cap == 0 {
            return Err(Error::BufferEmpty);
        }
        let start = (self.read % cap as u64) as u32;
        let granted = size.min(self.available_read()).min(cap - start);
        if granted == 0 {
            return Err(Error::BufferEmpty);
        }
        self.read_reserved = Some(granted);
        let start = start as usize;
        Ok(&mut self.data[start..start + granted as usize])
    }

    /// Consume `size` elements of the outstanding read reservation.
    ///
    /// `finish_read(0)` releases the reservation without consuming
    /// anything. Consuming more than was reserved fails with
    /// [`Error::BufferOvercommit`] and changes nothing.
    pub fn finish_read(&mut self, size: u32) -> Result<()> {
        let reserved = self.read_reserved.unwrap_or(0);
        if size > reserved {
            return Err(Error::BufferOvercommit);
        }
        self.read += size as u64;
        self.read_reserved = None;
        Ok(())
    }

    /// Reset the ring to empty, dropping any outstanding reservations.
    pub fn clear(&mut self) {
        self.data.fill(T::default());
        self.read = 0;
        self.write = 0;
        self.read_reserved = None;
        self.write_reserved = None;
    }

    /// Grow or shrink the ring, preserving unread content.
    ///
    /// Fails with [`Error::InvalidValue`] if the committed content does not
    /// fit the new capacity. Reservations are dropped.
    pub fn resize(&mut self, capacity: u32) -> Result<()> {
        let unread = self.available_read();
        if capacity < unread {
            return Err(Error::InvalidValue("capacity"));
        }
        let mut data = vec![T::default(); capacity as usize].into_boxed_slice();
        let cap = self.capacity() as u64;
        for i in 0..unread as u64 {
            data[i as usize] = self.data[((self.read + i) % cap) as usize];
        }
        self.data = data;
        self.read = 0;
        self.write = unread as u64;
        self.read_reserved = None;
        self.write_reserved = None;
        Ok(())
    }

    /// Move as many elements as possible from `from` to `to`, consuming
    /// the source. Performs one reserve/commit cycle on each end and
    /// returns the number of elements moved; zero when either end has no
    /// room to make progress.
    pub fn transfer(from: &mut Self, to: &mut Self) -> Result<u32> {
        Self::shuttle(from, to, true)
    }

    /// Like [`transfer`](Self::transfer), but leaves the source intact.
    pub fn copy(from: &mut Self, to: &mut Self) -> Result<u32> {
        Self::shuttle(from, to, false)
    }

    fn shuttle(from: &mut Self, to: &mut Self, consume: bool) -> Result<u32> {
        if from.available_read() == 0 || to.available_write() == 0 {
            return Ok(0);
        }
        let src = from.request_read(u32::MAX)?;
        let mut failed = None;
        let moved = match to.request_write(src.len() as u32) {
            Ok(dst) => {
                let n = dst.len().min(src.len());
                dst[..n].copy_from_slice(&src[..n]);
                n as u32
            }
            Err(err) => {
                failed = Some(err);
                0
            }
        };
        from.finish_read(if consume { moved } else { 0 })?;
        if let Some(err) = failed {
            return Err(err);
        }
        to.finish_write(moved)?;
        Ok(moved)
    }
}

/// Ring of `f32` samples, the currency between segments.
pub type SampleBuffer = Ring<f32>;

/// Shared handle to a sample buffer.
///
/// Wiring the same handle to an input and an output port expresses
/// in-place processing; there is no separate non-owning buffer mode.
pub type SharedBuffer = Arc<Mutex<SampleBuffer>>;

/// Allocate a fresh shared sample buffer.
pub fn shared_buffer(capacity: u32) -> SharedBuffer {
    Arc::new(Mutex::new(SampleBuffer::new(capacity)))
}

/// Apply `f` to every readable input sample, writing results to `output`.
///
/// Handles the aliased case: when `input` and `output` are the same
/// buffer the samples are transformed in place and remain committed.
/// Returns the number of samples processed in this pass.
pub fn map_samples<F>(input: &SharedBuffer, output: &SharedBuffer, f: F) -> Result<u32>
where
    F: FnMut(f32) -> f32,
{
    if Arc::ptr_eq(input, output) {
        transform_in_place(input, f)
    } else {
        let mut f = f;
        let mut src = input.lock();
        let mut dst = output.lock();
        if src.available_read() == 0 || dst.available_write() == 0 {
            return Ok(0);
        }
        let samples = src.request_read(u32::MAX)?;
        let mut failed = None;
        let n = match dst.request_write(samples.len() as u32) {
            Ok(out) => {
                let n = out.len().min(samples.len());
                for i in 0..n {
                    out[i] = f(samples[i]);
                }
                n as u32
            }
            Err(err) => {
                failed = Some(err);
                0
            }
        };
        src.finish_read(n)?;
        if let Some(err) = failed {
            return Err(err);
        }
        dst.finish_write(n)?;
        Ok(n)
    }
}

/// Transform every committed sample of `buffer` where it sits.
///
/// The data stays committed; the read reservation is released at zero.
pub fn transform_in_place<F>(buffer: &SharedBuffer, mut f: F) -> Result<u32>
where
    F: FnMut(f32) -> f32,
{
    let mut buf = buffer.lock();
    if buf.available_read() == 0 {
        return Ok(0);
    }
    let samples = buf.request_read(u32::MAX)?;
    for s in samples.iter_mut() {
        *s = f(*s);
    }
    let n = samples.len() as u32;
    buf.finish_read(0)?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn write_then_read_round_trip() {
        let mut ring = SampleBuffer::new(8);
        let chunk = ring.request_write(4).unwrap();
        chunk.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        ring.finish_write(4).unwrap();
        assert_eq!(ring.available_read(), 4);

        let out = ring.request_read(u32::MAX).unwrap();
        assert_eq!(out, &[1.0, 2.0, 3.0, 4.0]);
        ring.finish_read(4).unwrap();
        assert_eq!(ring.available_read(), 0);
    }

    #[test]
    fn empty_read_fails() {
        let mut ring = SampleBuffer::new(8);
        assert_eq!(ring.request_read(1).unwrap_err(), Error::BufferEmpty);
    }

    #[test]
    fn full_write_fails() {
        let mut ring = SampleBuffer::new(4);
        ring.request_write(4).unwrap();
        ring.finish_write(4).unwrap();
        assert_eq!(ring.request_write(1).unwrap_err(), Error::BufferFull);
    }

    #[test]
    fn double_reservation_fails() {
        let mut ring = SampleBuffer::new(8);
        ring.request_write(2).unwrap();
        assert_eq!(ring.request_write(2).unwrap_err(), Error::BufferFull);
        ring.finish_write(2).unwrap();
        ring.request_read(1).unwrap();
        assert_eq!(ring.request_read(1).unwrap_err(), Error::BufferEmpty);
    }

    #[test]
    fn overcommit_leaves_state_unchanged() {
        let mut ring = SampleBuffer::new(8);
        ring.request_write(4).unwrap();
        assert_eq!(ring.finish_write(5).unwrap_err(), Error::BufferOvercommit);
        // The reservation survives and can still be committed.
        ring.finish_write(4).unwrap();
        assert_eq!(ring.available_read(), 4);
    }

    #[test]
    fn partial_commit_releases_remainder() {
        let mut ring = SampleBuffer::new(8);
        ring.request_write(6).unwrap();
        ring.finish_write(2).unwrap();
        assert_eq!(ring.available_read(), 2);
        assert_eq!(ring.available_write(), 6);
        // The released region is immediately reservable again.
        let chunk = ring.request_write(6).unwrap();
        assert_eq!(chunk.len(), 6);
    }

    #[test]
    fn wrapping_grants_shorter_runs() {
        let mut ring = SampleBuffer::new(8);
        ring.request_write(6).unwrap();
        ring.finish_write(6).unwrap();
        ring.request_read(6).unwrap();
        ring.finish_read(6).unwrap();
        // Free space wraps: only 2 contiguous elements to the end.
        let chunk = ring.request_write(8).unwrap();
        assert_eq!(chunk.len(), 2);
        ring.finish_write(2).unwrap();
        let chunk = ring.request_write(8).unwrap();
        assert_eq!(chunk.len(), 6);
    }

    #[test]
    fn transfer_consumes_source() {
        let mut a = SampleBuffer::new(8);
        let mut b = SampleBuffer::new(8);
        a.request_write(3).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        a.finish_write(3).unwrap();

        let moved = SampleBuffer::transfer(&mut a, &mut b).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(a.available_read(), 0);
        assert_eq!(b.request_read(u32::MAX).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn copy_preserves_source() {
        let mut a = SampleBuffer::new(8);
        let mut b = SampleBuffer::new(8);
        a.request_write(3).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        a.finish_write(3).unwrap();

        let moved = SampleBuffer::copy(&mut a, &mut b).unwrap();
        assert_eq!(moved, 3);
        assert_eq!(a.available_read(), 3);
        assert_eq!(b.available_read(), 3);
    }

    #[test]
    fn resize_preserves_unread_across_wrap() {
        let mut ring = SampleBuffer::new(4);
        ring.request_write(4).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        ring.finish_write(4).unwrap();
        ring.request_read(2).unwrap();
        ring.finish_read(2).unwrap();
        ring.request_write(2).unwrap().copy_from_slice(&[5.0, 6.0]);
        ring.finish_write(2).unwrap();

        ring.resize(8).unwrap();
        assert_eq!(ring.capacity(), 8);
        let out = ring.request_read(u32::MAX).unwrap();
        assert_eq!(out, &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn resize_refuses_truncation() {
        let mut ring = SampleBuffer::new(8);
        ring.request_write(6).unwrap();
        ring.finish_write(6).unwrap();
        assert!(matches!(ring.resize(4), Err(Error::InvalidValue(_))));
        assert_eq!(ring.available_read(), 6);
    }

    #[test]
    fn map_samples_aliased_keeps_data_committed() {
        let buffer = shared_buffer(8);
        {
            let mut b = buffer.lock();
            b.request_write(4).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
            b.finish_write(4).unwrap();
        }
        let n = map_samples(&buffer, &buffer, |s| s * 2.0).unwrap();
        assert_eq!(n, 4);
        let mut b = buffer.lock();
        assert_eq!(b.request_read(u32::MAX).unwrap(), &[2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn map_samples_distinct_consumes_input() {
        let input = shared_buffer(8);
        let output = shared_buffer(8);
        {
            let mut b = input.lock();
            b.request_write(3).unwrap().copy_from_slice(&[1.0, -1.0, 0.5]);
            b.finish_write(3).unwrap();
        }
        let n = map_samples(&input, &output, |s| -s).unwrap();
        assert_eq!(n, 3);
        assert_eq!(input.lock().available_read(), 0);
        let mut out = output.lock();
        assert_eq!(out.request_read(u32::MAX).unwrap(), &[-1.0, 1.0, -0.5]);
    }

    proptest! {
        // Arbitrary interleavings of the two-phase protocol never let the
        // committed count exceed capacity or go negative.
        #[test]
        fn protocol_invariants_hold(ops in prop::collection::vec((0u8..4, 0u32..24), 1..200)) {
            let mut ring = SampleBuffer::new(16);
            let mut write_grant: Option<u32> = None;
            let mut read_grant: Option<u32> = None;
            for (op, size) in ops {
                match op {
                    0 => {
                        if let Ok(chunk) = ring.request_write(size) {
                            write_grant = Some(chunk.len() as u32);
                        }
                    }
                    1 => {
                        let grant = write_grant.take().unwrap_or(0);
                        let commit = size.min(grant);
                        prop_assert!(ring.finish_write(commit).is_ok());
                    }
                    2 => {
                        if let Ok(chunk) = ring.request_read(size) {
                            read_grant = Some(chunk.len() as u32);
                        }
                    }
                    _ => {
                        let grant = read_grant.take().unwrap_or(0);
                        let consume = size.min(grant);
                        prop_assert!(ring.finish_read(consume).is_ok());
                    }
                }
                prop_assert!(ring.available_read() <= ring.capacity());
                prop_assert_eq!(
                    ring.available_read() + ring.available_write(),
                    ring.capacity()
                );
            }
        }

        // Overcommit is always rejected and never moves a cursor.
        #[test]
        fn overcommit_never_corrupts(reserve in 1u32..16, excess in 1u32..16) {
            let mut ring = SampleBuffer::new(16);
            let granted = ring.request_write(reserve).unwrap().len() as u32;
            let before = ring.available_read();
            prop_assert_eq!(
                ring.finish_write(granted + excess).unwrap_err(),
                Error::BufferOvercommit
            );
            prop_assert_eq!(ring.available_read(), before);
            prop_assert!(ring.finish_write(granted).is_ok());
        }
    }
}
