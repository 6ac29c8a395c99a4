//! mixkit: a real-time audio mixing engine.
//!
//! Audio flows through pipelines of [`Segment`]s connected by shared
//! ring buffers. Packed interleaved audio enters through an
//! [`Unpacker`], is processed per channel by DSP segments, and leaves
//! through a [`Packer`]. A [`Sequence`] drives the whole pipeline with
//! one `start`/`mix`/`end` lifecycle, and a [`Registry`] constructs
//! segments by name so hosts and plugins stay decoupled from the
//! concrete types.
//!
//! ```no_run
//! use mixkit::{shared_buffer, shared_pack, Encoding, Field, Sequence, Value};
//!
//! # fn main() -> mixkit::Result<()> {
//! let source = shared_pack(512, Encoding::I16, 1, 44100)?;
//! let sink = shared_pack(512, Encoding::I16, 1, 44100)?;
//! let channel = shared_buffer(512);
//!
//! let registry = mixkit::standard_registry()?;
//! let mut unpacker = registry.make("unpacker", &[Value::Pack(source.clone())])?;
//! unpacker.set_out(Field::Buffer, 0, &Value::Buffer(channel.clone()))?;
//! let mut gate = registry.make("gate", &[Value::UInt(44100)])?;
//! gate.set_in(Field::Buffer, 0, &Value::Buffer(channel.clone()))?;
//! gate.set_out(Field::Buffer, 0, &Value::Buffer(channel.clone()))?;
//! let mut packer = registry.make("packer", &[Value::Pack(sink.clone())])?;
//! packer.set_in(Field::Buffer, 0, &Value::Buffer(channel))?;
//!
//! let mut pipeline = Sequence::new();
//! pipeline.add(unpacker);
//! pipeline.add(gate);
//! pipeline.add(packer);
//! pipeline.start()?;
//! loop {
//!     // ... fill `source`, then:
//!     pipeline.mix()?;
//!     // ... drain `sink`.
//! }
//! # }
//! ```

pub use mixkit_core as core;
pub use mixkit_dsp as dsp;
pub use mixkit_plugin as plugin;

pub use mixkit_core::{
    map_samples, shared_buffer, shared_pack, transform_in_place, ArgInfo, Attenuation, Encoding,
    Error, Field, FieldFlags, FieldInfo, MixStatus, PackBuffer, Packer, Registry, Result, Ring,
    SampleBuffer, Segment, SegmentFlags, SegmentInfo, Sequence, SharedBuffer, SharedPack,
    Unpacker, Value, ValueType,
};
pub use mixkit_dsp::{Gate, GateState, PhaseVocoder, PitchShift, SpaceMixer};
pub use mixkit_plugin::{LadspaLibrary, PluginHost};

/// A registry with every built-in segment type registered:
/// `unpacker`, `packer`, `pitch`, `gate` and `space_mixer`.
pub fn standard_registry() -> Result<Registry> {
    let registry = Registry::new();
    mixkit_core::convert::register_segments(&registry)?;
    mixkit_dsp::register_segments(&registry)?;
    Ok(registry)
}
