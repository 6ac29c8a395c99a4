//! Core mixing substrate for mixkit.
//!
//! This crate provides the transport and contract layers every other part
//! of the engine builds on:
//!
//! - [`Ring`] / [`SampleBuffer`]: fixed-capacity rings with a two-phase
//!   reserve/commit protocol on both ends, shared between segments as
//!   [`SharedBuffer`] handles.
//! - [`PackBuffer`]: byte-granular rings of interleaved frames in one of
//!   ten sample [`Encoding`]s, converted by the [`Unpacker`] and
//!   [`Packer`] segments.
//! - [`Segment`]: the capability contract a processing stage implements,
//!   with typed field access and introspection.
//! - [`Sequence`]: an ordered pipeline of segments with a shared
//!   start/mix/end lifecycle.
//! - [`Registry`]: name-indexed segment construction with typed
//!   positional arguments.
//!
//! Mixing is single-stepped: each [`Segment::mix`] call moves whatever
//! the wired buffers permit, so a host drives the pipeline by filling
//! source packs, calling `mix` on a [`Sequence`], and draining sink
//! packs.

pub mod convert;
pub mod error;
pub mod pack;
pub mod registry;
pub mod ring;
pub mod segment;
pub mod sequence;

pub use convert::{Packer, Unpacker};
pub use error::{Error, Result};
pub use pack::{shared_pack, Encoding, PackBuffer, SharedPack};
pub use registry::{ArgInfo, Registry};
pub use ring::{
    map_samples, shared_buffer, transform_in_place, Ring, SampleBuffer, SharedBuffer,
};
pub use segment::{
    Attenuation, AttenuationFn, Field, FieldFlags, FieldInfo, MixStatus, Segment, SegmentFlags,
    SegmentInfo, Value, ValueType,
};
pub use sequence::Sequence;
