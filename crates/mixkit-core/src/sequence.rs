//! Ordered pipelines of segments.

use crate::error::{Error, Result};
use crate::segment::{MixStatus, Segment};

/// An ordered group of owned segments mixed front to back.
///
/// The sequence is `Idle` until [`start`](Sequence::start) succeeds and
/// returns to idle on [`end`](Sequence::end). Members that do not
/// implement `start`/`end` are skipped; any other error aborts.
#[derive(Default)]
pub struct Sequence {
    segments: Vec<Box<dyn Segment>>,
    started: bool,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment at the back of the pipeline.
    pub fn add(&mut self, segment: Box<dyn Segment>) {
        self.segments.push(segment);
    }

    /// Remove and return the segment at `index`.
    pub fn remove_at(&mut self, index: u32) -> Result<Box<dyn Segment>> {
        if (index as usize) < self.segments.len() {
            Ok(self.segments.remove(index as usize))
        } else {
            Err(Error::InvalidLocation(index))
        }
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Borrow the segment at `index`, e.g. to adjust fields mid-run.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Segment + 'static)> {
        self.segments.get_mut(index).map(|s| &mut **s)
    }

    /// Start every member in order.
    ///
    /// If a member fails, the ones already started are ended best-effort
    /// and the sequence stays idle.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        for i in 0..self.segments.len() {
            match self.segments[i].start() {
                Ok(()) | Err(Error::NotImplemented) => {}
                Err(err) => {
                    for segment in &mut self.segments[..i] {
                        let _ = segment.end();
                    }
                    return Err(err);
                }
            }
        }
        self.started = true;
        Ok(())
    }

    /// Mix every member in order.
    ///
    /// The first error aborts the pass; the first [`MixStatus::Done`]
    /// stops it and is returned, since nothing downstream will ever see
    /// new input again.
    pub fn mix(&mut self) -> Result<MixStatus> {
        if !self.started {
            return Err(Error::NotInitialized);
        }
        for segment in &mut self.segments {
            match segment.mix()? {
                MixStatus::Continue => {}
                MixStatus::Done => return Ok(MixStatus::Done),
            }
        }
        Ok(MixStatus::Continue)
    }

    /// End every member in order and return the sequence to idle.
    ///
    /// All members are ended even when one fails; the first failure is
    /// reported.
    pub fn end(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::AlreadyEnded);
        }
        self.started = false;
        let mut first_error = None;
        for segment in &mut self.segments {
            match segment.end() {
                Ok(()) | Err(Error::NotImplemented) => {}
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
