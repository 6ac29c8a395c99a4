//! Noise gate with an attack/hold/release envelope.

use crate::util::{db_to_linear, linear_to_db};
use mixkit_core::{
    map_samples, Error, Field, FieldFlags, FieldInfo, MixStatus, Result, SampleBuffer, Segment,
    SegmentFlags, SegmentInfo, SharedBuffer, Value, ValueType,
};

/// Envelope state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Attacking,
    Open,
    Holding,
    Releasing,
}

/// Mono noise gate.
///
/// The gate opens when the input magnitude reaches the open threshold and
/// closes once it has stayed below the close threshold through the hold
/// period. Volume ramps linearly over the attack and release times. Each
/// sample evaluates exactly one state; a transition consumes the tick.
pub struct Gate {
    input: Option<SharedBuffer>,
    output: Option<SharedBuffer>,
    /// Thresholds are stored as linear amplitudes.
    open_threshold: f32,
    close_threshold: f32,
    attack: f32,
    hold: f32,
    release: f32,
    samplerate: u32,
    state: GateState,
    /// Position within the current ramp or hold period, in seconds.
    time: f32,
    bypass: bool,
}

impl Gate {
    pub fn new(samplerate: u32) -> Result<Self> {
        if samplerate == 0 {
            return Err(Error::InvalidValue("samplerate"));
        }
        Ok(Self {
            input: None,
            output: None,
            open_threshold: db_to_linear(-24.0),
            close_threshold: db_to_linear(-32.0),
            attack: 0.025,
            hold: 0.2,
            release: 0.15,
            samplerate,
            state: GateState::Closed,
            time: 0.0,
            bypass: false,
        })
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Gate one sample, returning it scaled by the envelope volume.
    #[inline]
    fn tick(&mut self, sample: f32) -> f32 {
        let level = sample.abs();
        let dt = 1.0 / self.samplerate as f32;
        let volume = match self.state {
            GateState::Closed => {
                if level >= self.open_threshold {
                    self.time = 0.0;
                    self.state = GateState::Attacking;
                }
                0.0
            }
            GateState::Attacking => {
                if level < self.close_threshold {
                    // Resume the release ramp from the current volume.
                    let volume = self.ramp_up();
                    self.time = self.release * volume;
                    self.state = GateState::Releasing;
                    volume
                } else if self.time < self.attack {
                    self.time += dt;
                    self.ramp_up()
                } else {
                    self.state = GateState::Open;
                    1.0
                }
            }
            GateState::Open => {
                if level < self.close_threshold {
                    self.time = self.hold;
                    self.state = GateState::Holding;
                }
                1.0
            }
            GateState::Holding => {
                if level >= self.open_threshold {
                    self.state = GateState::Open;
                } else if self.time > 0.0 {
                    self.time -= dt;
                } else {
                    self.time = self.release;
                    self.state = GateState::Releasing;
                }
                1.0
            }
            GateState::Releasing => {
                if level >= self.open_threshold {
                    // Resume the attack ramp from the current volume.
                    let volume = self.ramp_down();
                    self.time = self.attack * volume;
                    self.state = GateState::Attacking;
                    volume
                } else if self.time > 0.0 {
                    self.time -= dt;
                    self.ramp_down()
                } else {
                    self.time = 0.0;
                    self.state = GateState::Closed;
                    0.0
                }
            }
        };
        sample * volume
    }

    #[inline]
    fn ramp_up(&self) -> f32 {
        if self.attack > 0.0 {
            (self.time / self.attack).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    #[inline]
    fn ramp_down(&self) -> f32 {
        if self.release > 0.0 {
            (self.time / self.release).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Segment for Gate {
    fn info(&self) -> SegmentInfo {
        let param = |field, description| FieldInfo {
            field,
            description,
            flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
            ty: ValueType::Float,
            count: 1,
        };
        SegmentInfo {
            name: "gate",
            description: "mutes the signal while it stays below a threshold",
            flags: SegmentFlags::INPLACE,
            min_inputs: 1,
            max_inputs: 1,
            outputs: 1,
            fields: vec![
                FieldInfo {
                    field: Field::Buffer,
                    description: "the buffer of an input or output port",
                    flags: FieldFlags::IN | FieldFlags::OUT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Buffer,
                    count: 1,
                },
                param(Field::GateOpenThreshold, "opening threshold in dB"),
                param(Field::GateCloseThreshold, "closing threshold in dB"),
                param(Field::GateAttack, "attack ramp time in seconds"),
                param(Field::GateHold, "hold time in seconds"),
                param(Field::GateRelease, "release ramp time in seconds"),
                FieldInfo {
                    field: Field::SampleRate,
                    description: "sample rate of the stream",
                    flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::UInt,
                    count: 1,
                },
                FieldInfo {
                    field: Field::Bypass,
                    description: "pass the signal through unchanged",
                    flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Bool,
                    count: 1,
                },
            ],
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.input.is_none() || self.output.is_none() {
            return Err(Error::BufferMissing);
        }
        self.state = GateState::Closed;
        self.time = 0.0;
        Ok(())
    }

    fn mix(&mut self) -> Result<MixStatus> {
        let input = self.input.clone().ok_or(Error::BufferMissing)?;
        let output = self.output.clone().ok_or(Error::BufferMissing)?;
        if self.bypass {
            if !std::sync::Arc::ptr_eq(&input, &output) {
                SampleBuffer::transfer(&mut input.lock(), &mut output.lock())?;
            }
        } else {
            map_samples(&input, &output, |s| self.tick(s))?;
        }
        Ok(MixStatus::Continue)
    }

    fn set(&mut self, field: Field, value: &Value) -> Result<()> {
        match field {
            Field::GateOpenThreshold => {
                let db = value.as_float().ok_or(Error::InvalidValue("threshold"))?;
                self.open_threshold = db_to_linear(db);
            }
            Field::GateCloseThreshold => {
                let db = value.as_float().ok_or(Error::InvalidValue("threshold"))?;
                self.close_threshold = db_to_linear(db);
            }
            Field::GateAttack => {
                self.attack = positive_time(value)?;
            }
            Field::GateHold => {
                self.hold = positive_time(value)?;
            }
            Field::GateRelease => {
                self.release = positive_time(value)?;
            }
            Field::SampleRate => {
                let rate = value.as_uint().ok_or(Error::InvalidValue("samplerate"))?;
                if rate == 0 {
                    return Err(Error::InvalidValue("samplerate"));
                }
                self.samplerate = rate;
            }
            Field::Bypass => {
                self.bypass = value.as_bool().ok_or(Error::InvalidValue("bypass"))?;
            }
            other => return Err(Error::InvalidField(other)),
        }
        Ok(())
    }

    fn get(&self, field: Field) -> Result<Value> {
        match field {
            Field::GateOpenThreshold => Ok(Value::Float(linear_to_db(self.open_threshold))),
            Field::GateCloseThreshold => Ok(Value::Float(linear_to_db(self.close_threshold))),
            Field::GateAttack => Ok(Value::Float(self.attack)),
            Field::GateHold => Ok(Value::Float(self.hold)),
            Field::GateRelease => Ok(Value::Float(self.release)),
            Field::SampleRate => Ok(Value::UInt(self.samplerate)),
            Field::Bypass => Ok(Value::Bool(self.bypass)),
            other => Err(Error::InvalidField(other)),
        }
    }

    fn set_in(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        port_set(field, location, value, &mut self.input)
    }

    fn get_in(&self, field: Field, location: u32) -> Result<Value> {
        port_get(field, location, &self.input)
    }

    fn set_out(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        port_set(field, location, value, &mut self.output)
    }

    fn get_out(&self, field: Field, location: u32) -> Result<Value> {
        port_get(field, location, &self.output)
    }
}

fn positive_time(value: &Value) -> Result<f32> {
    let time = value.as_float().ok_or(Error::InvalidValue("time"))?;
    if time < 0.0 {
        return Err(Error::InvalidValue("time"));
    }
    Ok(time)
}

/// Shared single-port plumbing for the one-in one-out segments.
pub(crate) fn port_set(
    field: Field,
    location: u32,
    value: &Value,
    slot: &mut Option<SharedBuffer>,
) -> Result<()> {
    match field {
        Field::Buffer => {
            if location != 0 {
                return Err(Error::InvalidLocation(location));
            }
            *slot = match value {
                Value::None => None,
                Value::Buffer(buffer) => Some(buffer.clone()),
                _ => return Err(Error::InvalidValue("buffer")),
            };
            Ok(())
        }
        other => Err(Error::InvalidField(other)),
    }
}

pub(crate) fn port_get(field: Field, location: u32, slot: &Option<SharedBuffer>) -> Result<Value> {
    match field {
        Field::Buffer => {
            if location != 0 {
                return Err(Error::InvalidLocation(location));
            }
            Ok(slot.clone().map_or(Value::None, Value::Buffer))
        }
        other => Err(Error::InvalidField(other)),
    }
}
