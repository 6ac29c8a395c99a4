//! The segment capability contract.
//!
//! A segment is one processing stage in a pipeline: it owns its parameters,
//! is wired to shared buffers on its input and output ports, and advances
//! the stream one step per [`mix`](Segment::mix) call. Capabilities a
//! segment does not support default to [`Error::NotImplemented`], which
//! callers treat as "absent", not as a failure.

use crate::error::{Error, Result};
use crate::pack::SharedPack;
use crate::ring::SharedBuffer;

/// Outcome of a successful mix step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixStatus {
    /// The segment can produce more output when fed more input.
    Continue,
    /// The segment will never produce output again, e.g. a finite source
    /// ran dry. Terminal, but not an error.
    Done,
}

/// Keys for segment parameters and port wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The buffer wired to an input or output port.
    Buffer,
    Bypass,
    SampleRate,
    Volume,
    /// Pitch ratio of the pitch shifter.
    PitchShift,
    GateOpenThreshold,
    GateCloseThreshold,
    GateAttack,
    GateHold,
    GateRelease,
    SpaceLocation,
    SpaceVelocity,
    SpaceDirection,
    SpaceUp,
    SpaceSoundspeed,
    SpaceDopplerFactor,
    SpaceMinDistance,
    SpaceMaxDistance,
    SpaceRolloff,
    SpaceAttenuation,
}

/// Distance attenuation law used by the spatial mixer.
///
/// The presets take `(min, max, distance, rolloff)` with the distance
/// already clamped to `[min, max]`; `Custom` supplies the same signature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attenuation {
    None,
    Inverse,
    Linear,
    Exponential,
    Custom(AttenuationFn),
}

/// Signature of a custom attenuation law.
pub type AttenuationFn = fn(min: f32, max: f32, distance: f32, rolloff: f32) -> f32;

/// Type tag for a [`Value`], used by field introspection and the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Float,
    UInt,
    Vector,
    Buffer,
    Pack,
    Attenuation,
}

/// A typed parameter value, replacing the untyped pointer of old field
/// interfaces. `None` on a buffer field disconnects the port.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Float(f32),
    UInt(u32),
    Vector([f32; 3]),
    Buffer(SharedBuffer),
    Pack(SharedPack),
    Attenuation(Attenuation),
}

impl Value {
    pub fn ty(&self) -> Option<ValueType> {
        match self {
            Value::None => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Float(_) => Some(ValueType::Float),
            Value::UInt(_) => Some(ValueType::UInt),
            Value::Vector(_) => Some(ValueType::Vector),
            Value::Buffer(_) => Some(ValueType::Buffer),
            Value::Pack(_) => Some(ValueType::Pack),
            Value::Attenuation(_) => Some(ValueType::Attenuation),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric access; unsigned values coerce to float.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            Value::UInt(u) => Some(*u as f32),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Value::UInt(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<[f32; 3]> {
        match self {
            Value::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&SharedBuffer> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_pack(&self) -> Option<&SharedPack> {
        match self {
            Value::Pack(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_attenuation(&self) -> Option<Attenuation> {
        match self {
            Value::Attenuation(a) => Some(*a),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<[f32; 3]> for Value {
    fn from(v: [f32; 3]) -> Self {
        Value::Vector(v)
    }
}

impl From<SharedBuffer> for Value {
    fn from(v: SharedBuffer) -> Self {
        Value::Buffer(v)
    }
}

impl From<SharedPack> for Value {
    fn from(v: SharedPack) -> Self {
        Value::Pack(v)
    }
}

impl From<Attenuation> for Value {
    fn from(v: Attenuation) -> Self {
        Value::Attenuation(v)
    }
}

/// Where and how a field may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFlags(u8);

impl FieldFlags {
    /// Applies to input ports via `set_in`/`get_in`.
    pub const IN: FieldFlags = FieldFlags(0x01);
    /// Applies to output ports via `set_out`/`get_out`.
    pub const OUT: FieldFlags = FieldFlags(0x02);
    /// Applies to the segment itself via `set`/`get`.
    pub const SEGMENT: FieldFlags = FieldFlags(0x04);
    pub const SET: FieldFlags = FieldFlags(0x08);
    pub const GET: FieldFlags = FieldFlags(0x10);

    pub fn contains(self, flags: FieldFlags) -> bool {
        self.0 & flags.0 == flags.0
    }
}

impl core::ops::BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

/// Behavioral properties of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFlags(u8);

impl SegmentFlags {
    pub const NONE: SegmentFlags = SegmentFlags(0);
    /// The segment tolerates the same buffer on an input and an output.
    pub const INPLACE: SegmentFlags = SegmentFlags(0x01);
    /// The segment mutates its input buffers while mixing.
    pub const MODIFIES_INPUT: SegmentFlags = SegmentFlags(0x02);

    pub fn contains(self, flags: SegmentFlags) -> bool {
        self.0 & flags.0 == flags.0
    }
}

impl core::ops::BitOr for SegmentFlags {
    type Output = SegmentFlags;

    fn bitor(self, rhs: SegmentFlags) -> SegmentFlags {
        SegmentFlags(self.0 | rhs.0)
    }
}

/// Description of one field a segment exposes.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub field: Field,
    pub description: &'static str,
    pub flags: FieldFlags,
    pub ty: ValueType,
    /// Number of elements for array-valued fields, 1 otherwise.
    pub count: u32,
}

/// Self-description of a segment type.
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub flags: SegmentFlags,
    pub min_inputs: u32,
    pub max_inputs: u32,
    pub outputs: u32,
    pub fields: Vec<FieldInfo>,
}

/// One processing stage of a mixing pipeline.
pub trait Segment {
    /// Describe this segment: name, port counts, supported fields.
    fn info(&self) -> SegmentInfo;

    /// Prepare for mixing. Buffers must be wired before this is called.
    fn start(&mut self) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /// Advance the stream by one step, consuming and producing whatever
    /// the wired buffers permit.
    fn mix(&mut self) -> Result<MixStatus> {
        Err(Error::NotImplemented)
    }

    /// Tear down after mixing. The segment may be started again.
    fn end(&mut self) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /// Set a segment-wide field.
    fn set(&mut self, field: Field, value: &Value) -> Result<()> {
        let _ = (field, value);
        Err(Error::NotImplemented)
    }

    /// Get a segment-wide field.
    fn get(&self, field: Field) -> Result<Value> {
        let _ = field;
        Err(Error::NotImplemented)
    }

    /// Set a field on the input port at `location`.
    fn set_in(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        let _ = (field, location, value);
        Err(Error::NotImplemented)
    }

    /// Get a field of the input port at `location`.
    fn get_in(&self, field: Field, location: u32) -> Result<Value> {
        let _ = (field, location);
        Err(Error::NotImplemented)
    }

    /// Set a field on the output port at `location`.
    fn set_out(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        let _ = (field, location, value);
        Err(Error::NotImplemented)
    }

    /// Get a field of the output port at `location`.
    fn get_out(&self, field: Field, location: u32) -> Result<Value> {
        let _ = (field, location);
        Err(Error::NotImplemented)
    }
}

impl core::fmt::Debug for dyn Segment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.info().name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl Segment for Bare {
        fn info(&self) -> SegmentInfo {
            SegmentInfo {
                name: "bare",
                description: "does nothing",
                flags: SegmentFlags::NONE,
                min_inputs: 0,
                max_inputs: 0,
                outputs: 0,
                fields: Vec::new(),
            }
        }
    }

    #[test]
    fn unimplemented_capabilities_report_not_implemented() {
        let mut bare = Bare;
        assert_eq!(bare.start().unwrap_err(), Error::NotImplemented);
        assert_eq!(bare.mix().unwrap_err(), Error::NotImplemented);
        assert_eq!(bare.end().unwrap_err(), Error::NotImplemented);
        assert_eq!(
            bare.set(Field::Volume, &Value::Float(1.0)).unwrap_err(),
            Error::NotImplemented
        );
        assert_eq!(bare.get(Field::Volume).unwrap_err(), Error::NotImplemented);
        assert_eq!(
            bare.get_in(Field::Buffer, 0).unwrap_err(),
            Error::NotImplemented
        );
    }

    #[test]
    fn field_flags_compose() {
        let flags = FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET;
        assert!(flags.contains(FieldFlags::SET));
        assert!(flags.contains(FieldFlags::SEGMENT | FieldFlags::GET));
        assert!(!flags.contains(FieldFlags::IN));
    }

    #[test]
    fn value_accessors_are_typed() {
        assert_eq!(Value::Float(0.5).as_float(), Some(0.5));
        assert_eq!(Value::UInt(44100).as_float(), Some(44100.0));
        assert_eq!(Value::UInt(7).as_uint(), Some(7));
        assert_eq!(Value::Float(0.5).as_uint(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert!(Value::None.ty().is_none());
    }
}
