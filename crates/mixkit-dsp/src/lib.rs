//! DSP segments for mixkit.
//!
//! The three algorithmic workhorses of the engine:
//!
//! - [`PitchShift`]: phase-vocoder pitch shifting with a 2048-sample
//!   frame and 4x overlap.
//! - [`Gate`]: a noise gate with an attack/hold/release envelope.
//! - [`SpaceMixer`]: positional mixing of mono sources to stereo with
//!   distance attenuation, equal-power panning and Doppler shift.
//!
//! All three implement [`mixkit_core::Segment`] and can be constructed
//! through a [`Registry`] via [`register_segments`].

pub mod gate;
pub mod pitch;
pub mod space;
pub mod util;

pub use gate::{Gate, GateState};
pub use pitch::{PhaseVocoder, PitchShift};
pub use space::{attenuate, Listener, SpaceMixer};

use mixkit_core::{ArgInfo, Error, Registry, Result, ValueType};

/// Register the DSP segment types: `pitch`, `gate` and `space_mixer`.
pub fn register_segments(registry: &Registry) -> Result<()> {
    registry.register(
        "pitch",
        vec![
            ArgInfo {
                name: "pitch",
                ty: ValueType::Float,
            },
            ArgInfo {
                name: "samplerate",
                ty: ValueType::UInt,
            },
        ],
        |args| {
            let pitch = args[0].as_float().ok_or(Error::InvalidValue("pitch"))?;
            let samplerate = args[1].as_uint().ok_or(Error::InvalidValue("samplerate"))?;
            Ok(Box::new(PitchShift::new(pitch, samplerate)?))
        },
    )?;
    registry.register(
        "gate",
        vec![ArgInfo {
            name: "samplerate",
            ty: ValueType::UInt,
        }],
        |args| {
            let samplerate = args[0].as_uint().ok_or(Error::InvalidValue("samplerate"))?;
            Ok(Box::new(Gate::new(samplerate)?))
        },
    )?;
    registry.register("space_mixer", Vec::new(), |_| {
        Ok(Box::new(SpaceMixer::new()))
    })?;
    Ok(())
}
