//! Packed byte channels at the edges of the pipeline.
//!
//! A [`PackBuffer`] is the interchange format with the outside world:
//! interleaved frames of a fixed [`Encoding`], tagged with a channel count
//! and sample rate. Internally it is the same two-phase ring as
//! [`SampleBuffer`](crate::SampleBuffer), just byte-granular.

use crate::error::{Error, Result};
use crate::ring::Ring;
use parking_lot::Mutex;
use std::sync::Arc;

/// Sample encodings understood by the pack converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    I8 = 1,
    U8 = 2,
    I16 = 3,
    U16 = 4,
    I24 = 5,
    U24 = 6,
    I32 = 7,
    U32 = 8,
    F32 = 9,
    F64 = 10,
}

impl Encoding {
    /// Width of one sample in bytes. 24-bit samples occupy three bytes.
    pub fn sample_size(self) -> u32 {
        match self {
            Encoding::I8 | Encoding::U8 => 1,
            Encoding::I16 | Encoding::U16 => 2,
            Encoding::I24 | Encoding::U24 => 3,
            Encoding::I32 | Encoding::U32 | Encoding::F32 => 4,
            Encoding::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::I8 => "int8",
            Encoding::U8 => "uint8",
            Encoding::I16 => "int16",
            Encoding::U16 => "uint16",
            Encoding::I24 => "int24",
            Encoding::U24 => "uint24",
            Encoding::I32 => "int32",
            Encoding::U32 => "uint32",
            Encoding::F32 => "float32",
            Encoding::F64 => "float64",
        }
    }
}

impl TryFrom<u8> for Encoding {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Encoding::I8),
            2 => Ok(Encoding::U8),
            3 => Ok(Encoding::I16),
            4 => Ok(Encoding::U16),
            5 => Ok(Encoding::I24),
            6 => Ok(Encoding::U24),
            7 => Ok(Encoding::I32),
            8 => Ok(Encoding::U32),
            9 => Ok(Encoding::F32),
            10 => Ok(Encoding::F64),
            other => Err(Error::UnknownEncoding(other)),
        }
    }
}

/// Byte ring of interleaved frames in a fixed encoding.
#[derive(Debug)]
pub struct PackBuffer {
    ring: Ring<u8>,
    encoding: Encoding,
    channels: u8,
    samplerate: u32,
}

impl PackBuffer {
    /// Allocate a pack holding up to `frames` interleaved frames.
    pub fn new(frames: u32, encoding: Encoding, channels: u8, samplerate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::BadChannelConfiguration(0));
        }
        if samplerate == 0 {
            return Err(Error::InvalidValue("samplerate"));
        }
        let frame = channels as u32 * encoding.sample_size();
        Ok(Self {
            ring: Ring::new(frames * frame),
            encoding,
            channels,
            samplerate,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    /// Bytes per interleaved frame.
    pub fn frame_size(&self) -> u32 {
        self.channels as u32 * self.encoding.sample_size()
    }

    pub fn capacity(&self) -> u32 {
        self.ring.capacity()
    }

    pub fn available_read(&self) -> u32 {
        self.ring.available_read()
    }

    pub fn available_write(&self) -> u32 {
        self.ring.available_write()
    }

    pub fn request_write(&mut self, size: u32) -> Result<&mut [u8]> {
        self.ring.request_write(size)
    }

    pub fn finish_write(&mut self, size: u32) -> Result<()> {
        self.ring.finish_write(size)
    }

    pub fn request_read(&mut self, size: u32) -> Result<&mut [u8]> {
        self.ring.request_read(size)
    }

    pub fn finish_read(&mut self, size: u32) -> Result<()> {
        self.ring.finish_read(size)
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

/// Shared handle to a pack buffer.
pub type SharedPack = Arc<Mutex<PackBuffer>>;

/// Allocate a fresh shared pack.
pub fn shared_pack(
    frames: u32,
    encoding: Encoding,
    channels: u8,
    samplerate: u32,
) -> Result<SharedPack> {
    Ok(Arc::new(Mutex::new(PackBuffer::new(
        frames, encoding, channels, samplerate,
    )?)))
}
