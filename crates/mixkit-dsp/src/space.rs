//! Positional audio: many mono sources mixed to stereo for one listener.
//!
//! Each source carries a location and velocity. Per mix step a source's
//! contribution is shaped by distance attenuation, an equal-power stereo
//! pan against the listener's orientation, and Doppler-driven linear
//! resampling. Units are caller-defined but must be consistent; defaults
//! assume centimeters and seconds.

use crate::gate::{port_get, port_set};
use mixkit_core::{
    Attenuation, Error, Field, FieldFlags, FieldInfo, MixStatus, Result, Segment, SegmentFlags,
    SegmentInfo, SharedBuffer, Value, ValueType,
};

type Vec3 = [f32; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn length(a: Vec3) -> f32 {
    dot(a, a).sqrt()
}

fn normalize(a: Vec3) -> Vec3 {
    let len = length(a);
    if len == 0.0 {
        [0.0, 0.0, 0.0]
    } else {
        [a[0] / len, a[1] / len, a[2] / len]
    }
}

pub fn attenuation_none(_min: f32, _max: f32, _distance: f32, _rolloff: f32) -> f32 {
    1.0
}

pub fn attenuation_inverse(min: f32, _max: f32, distance: f32, rolloff: f32) -> f32 {
    min / (min + rolloff * (distance - min))
}

pub fn attenuation_linear(min: f32, max: f32, distance: f32, rolloff: f32) -> f32 {
    (1.0 - rolloff * (distance - min) / (max - min)).clamp(0.0, 1.0)
}

pub fn attenuation_exponential(min: f32, _max: f32, distance: f32, rolloff: f32) -> f32 {
    (distance / min).powf(-rolloff)
}

/// Evaluate an attenuation law. `distance` should already be clamped to
/// `[min, max]`.
pub fn attenuate(law: Attenuation, min: f32, max: f32, distance: f32, rolloff: f32) -> f32 {
    match law {
        Attenuation::None => attenuation_none(min, max, distance, rolloff),
        Attenuation::Inverse => attenuation_inverse(min, max, distance, rolloff),
        Attenuation::Linear => attenuation_linear(min, max, distance, rolloff),
        Attenuation::Exponential => attenuation_exponential(min, max, distance, rolloff),
        Attenuation::Custom(f) => f(min, max, distance, rolloff),
    }
}

/// The listener's pose and propagation parameters.
#[derive(Debug, Clone, Copy)]
pub struct Listener {
    pub location: Vec3,
    pub velocity: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub soundspeed: f32,
    pub doppler_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
    pub attenuation: Attenuation,
}

impl Default for Listener {
    fn default() -> Self {
        // Speed of sound in air in cm/s.
        Self {
            location: [0.0, 0.0, 0.0],
            velocity: [0.0, 0.0, 0.0],
            direction: [0.0, 0.0, 1.0],
            up: [0.0, 1.0, 0.0],
            soundspeed: 34330.0,
            doppler_factor: 1.0,
            min_distance: 10.0,
            max_distance: 100000.0,
            rolloff: 0.5,
            attenuation: Attenuation::Exponential,
        }
    }
}

impl Listener {
    fn gain(&self, distance: f32) -> f32 {
        let distance = distance.clamp(self.min_distance, self.max_distance);
        attenuate(
            self.attenuation,
            self.min_distance,
            self.max_distance,
            distance,
            self.rolloff,
        )
    }

    /// Equal-power stereo gains for a source at `location`.
    fn pan(&self, location: Vec3) -> (f32, f32) {
        let to_source = sub(location, self.location);
        if length(to_source) == 0.0 {
            let center = 0.5_f32.sqrt();
            return (center, center);
        }
        let right = normalize(cross(self.direction, self.up));
        let pan = dot(normalize(to_source), right).clamp(-1.0, 1.0);
        (((1.0 - pan) / 2.0).sqrt(), ((1.0 + pan) / 2.0).sqrt())
    }

    /// Doppler playback ratio for a source, `(c - f*v_l) / (c - f*v_s)`
    /// with the velocities projected on the source-to-listener axis.
    /// Clamped to [0.25, 4].
    fn doppler(&self, location: Vec3, velocity: Vec3) -> f32 {
        let axis = sub(self.location, location);
        if self.doppler_factor <= 0.0 || length(axis) == 0.0 {
            return 1.0;
        }
        let axis = normalize(axis);
        let v_listener = dot(self.velocity, axis);
        let v_source = dot(velocity, axis);
        let c = self.soundspeed;
        let denominator = c - self.doppler_factor * v_source;
        if denominator <= f32::EPSILON {
            return 4.0;
        }
        let ratio = (c - self.doppler_factor * v_listener) / denominator;
        ratio.clamp(0.25, 4.0)
    }
}

struct Source {
    buffer: SharedBuffer,
    location: Vec3,
    velocity: Vec3,
    /// Fractional resampling position into the source buffer.
    position: f32,
}

/// Mixes any number of located mono sources down to stereo.
pub struct SpaceMixer {
    sources: Vec<Source>,
    left: Option<SharedBuffer>,
    right: Option<SharedBuffer>,
    listener: Listener,
}

impl SpaceMixer {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            left: None,
            right: None,
            listener: Listener::default(),
        }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SpaceMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Segment for SpaceMixer {
    fn info(&self) -> SegmentInfo {
        let listener_vector = |field, description| FieldInfo {
            field,
            description,
            flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
            ty: ValueType::Vector,
            count: 1,
        };
        let listener_float = |field, description| FieldInfo {
            field,
            description,
            flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
            ty: ValueType::Float,
            count: 1,
        };
        SegmentInfo {
            name: "space_mixer",
            description: "mixes located mono sources to stereo for one listener",
            flags: SegmentFlags::NONE,
            min_inputs: 0,
            max_inputs: u32::MAX,
            outputs: 2,
            fields: vec![
                FieldInfo {
                    field: Field::Buffer,
                    description: "the buffer of a source or output port",
                    flags: FieldFlags::IN | FieldFlags::OUT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Buffer,
                    count: 1,
                },
                FieldInfo {
                    field: Field::SpaceLocation,
                    description: "location of a source or the listener",
                    flags: FieldFlags::IN
                        | FieldFlags::SEGMENT
                        | FieldFlags::SET
                        | FieldFlags::GET,
                    ty: ValueType::Vector,
                    count: 1,
                },
                FieldInfo {
                    field: Field::SpaceVelocity,
                    description: "velocity of a source or the listener",
                    flags: FieldFlags::IN
                        | FieldFlags::SEGMENT
                        | FieldFlags::SET
                        | FieldFlags::GET,
                    ty: ValueType::Vector,
                    count: 1,
                },
                listener_vector(Field::SpaceDirection, "facing direction of the listener"),
                listener_vector(Field::SpaceUp, "up vector of the listener"),
                listener_float(Field::SpaceSoundspeed, "speed of sound in units per second"),
                listener_float(Field::SpaceDopplerFactor, "strength of the doppler effect"),
                listener_float(Field::SpaceMinDistance, "distance below which gain is flat"),
                listener_float(Field::SpaceMaxDistance, "distance beyond which gain stops falling"),
                listener_float(Field::SpaceRolloff, "attenuation curve steepness in [0, 1]"),
                FieldInfo {
                    field: Field::SpaceAttenuation,
                    description: "distance attenuation law",
                    flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Attenuation,
                    count: 1,
                },
            ],
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.left.is_none() || self.right.is_none() {
            return Err(Error::BufferMissing);
        }
        for source in &mut self.sources {
            source.position = 0.0;
        }
        Ok(())
    }

    fn mix(&mut self) -> Result<MixStatus> {
        let left = self.left.clone().ok_or(Error::BufferMissing)?;
        let right = self.right.clone().ok_or(Error::BufferMissing)?;
        let listener = self.listener;

        let mut left_guard = left.lock();
        let mut right_guard = right.lock();

        // Probe the common contiguous output run, then reserve exactly it.
        let mut n = 0u32;
        match left_guard.request_write(u32::MAX) {
            Ok(chunk) => n = chunk.len() as u32,
            Err(Error::BufferFull) => {}
            Err(err) => return Err(err),
        }
        left_guard.finish_write(0)?;
        if n > 0 {
            let mut m = 0u32;
            match right_guard.request_write(u32::MAX) {
                Ok(chunk) => m = chunk.len() as u32,
                Err(Error::BufferFull) => {}
                Err(err) => return Err(err),
            }
            right_guard.finish_write(0)?;
            n = n.min(m);
        }
        if n == 0 {
            return Ok(MixStatus::Continue);
        }

        let left_out = left_guard.request_write(n)?;
        let right_out = right_guard.request_write(n)?;
        left_out.fill(0.0);
        right_out.fill(0.0);

        for source in &mut self.sources {
            let axis = sub(source.location, listener.location);
            let gain = listener.gain(length(axis));
            let (left_gain, right_gain) = listener.pan(source.location);
            let ratio = listener.doppler(source.location, source.velocity);

            let mut guard = source.buffer.lock();
            let chunk = match guard.request_read(u32::MAX) {
                Ok(chunk) => chunk,
                // Starved sources contribute silence without stalling.
                Err(Error::BufferEmpty) => continue,
                Err(err) => return Err(err),
            };
            let mut position = source.position;
            let mut produced = 0usize;
            while produced < n as usize {
                let index = position as usize;
                // Linear interpolation needs one sample of lookahead.
                if index + 1 >= chunk.len() {
                    break;
                }
                let frac = position - index as f32;
                let sample = chunk[index] + (chunk[index + 1] - chunk[index]) * frac;
                left_out[produced] += sample * gain * left_gain;
                right_out[produced] += sample * gain * right_gain;
                position += ratio;
                produced += 1;
            }
            let consumed = (position as usize).min(chunk.len());
            source.position = position - consumed as f32;
            guard.finish_read(consumed as u32)?;
        }

        left_guard.finish_write(n)?;
        right_guard.finish_write(n)?;
        Ok(MixStatus::Continue)
    }

    fn set(&mut self, field: Field, value: &Value) -> Result<()> {
        match field {
            Field::SpaceLocation => {
                self.listener.location =
                    value.as_vector().ok_or(Error::InvalidValue("location"))?;
            }
            Field::SpaceVelocity => {
                self.listener.velocity =
                    value.as_vector().ok_or(Error::InvalidValue("velocity"))?;
            }
            Field::SpaceDirection => {
                let direction = value.as_vector().ok_or(Error::InvalidValue("direction"))?;
                if length(direction) == 0.0 {
                    return Err(Error::InvalidValue("direction"));
                }
                self.listener.direction = direction;
            }
            Field::SpaceUp => {
                let up = value.as_vector().ok_or(Error::InvalidValue("up"))?;
                if length(up) == 0.0 {
                    return Err(Error::InvalidValue("up"));
                }
                self.listener.up = up;
            }
            Field::SpaceSoundspeed => {
                let soundspeed = value.as_float().ok_or(Error::InvalidValue("soundspeed"))?;
                if soundspeed <= 0.0 {
                    return Err(Error::InvalidValue("soundspeed"));
                }
                self.listener.soundspeed = soundspeed;
            }
            Field::SpaceDopplerFactor => {
                let factor = value
                    .as_float()
                    .ok_or(Error::InvalidValue("doppler factor"))?;
                if factor < 0.0 {
                    return Err(Error::InvalidValue("doppler factor"));
                }
                self.listener.doppler_factor = factor;
            }
            Field::SpaceMinDistance => {
                let min = value.as_float().ok_or(Error::InvalidValue("min distance"))?;
                if min <= 0.0 || min > self.listener.max_distance {
                    return Err(Error::InvalidValue("min distance"));
                }
                self.listener.min_distance = min;
            }
            Field::SpaceMaxDistance => {
                let max = value.as_float().ok_or(Error::InvalidValue("max distance"))?;
                if max < self.listener.min_distance {
                    return Err(Error::InvalidValue("max distance"));
                }
                self.listener.max_distance = max;
            }
            Field::SpaceRolloff => {
                let rolloff = value.as_float().ok_or(Error::InvalidValue("rolloff"))?;
                if !(0.0..=1.0).contains(&rolloff) {
                    return Err(Error::InvalidValue("rolloff"));
                }
                self.listener.rolloff = rolloff;
            }
            Field::SpaceAttenuation => {
                self.listener.attenuation = value
                    .as_attenuation()
                    .ok_or(Error::InvalidValue("attenuation"))?;
            }
            other => return Err(Error::InvalidField(other)),
        }
        Ok(())
    }

    fn get(&self, field: Field) -> Result<Value> {
        match field {
            Field::SpaceLocation => Ok(Value::Vector(self.listener.location)),
            Field::SpaceVelocity => Ok(Value::Vector(self.listener.velocity)),
            Field::SpaceDirection => Ok(Value::Vector(self.listener.direction)),
            Field::SpaceUp => Ok(Value::Vector(self.listener.up)),
            Field::SpaceSoundspeed => Ok(Value::Float(self.listener.soundspeed)),
            Field::SpaceDopplerFactor => Ok(Value::Float(self.listener.doppler_factor)),
            Field::SpaceMinDistance => Ok(Value::Float(self.listener.min_distance)),
            Field::SpaceMaxDistance => Ok(Value::Float(self.listener.max_distance)),
            Field::SpaceRolloff => Ok(Value::Float(self.listener.rolloff)),
            Field::SpaceAttenuation => Ok(Value::Attenuation(self.listener.attenuation)),
            other => Err(Error::InvalidField(other)),
        }
    }

    fn set_in(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        let index = location as usize;
        match field {
            Field::Buffer => match value {
                Value::Buffer(buffer) if index == self.sources.len() => {
                    self.sources.push(Source {
                        buffer: buffer.clone(),
                        location: [0.0, 0.0, 0.0],
                        velocity: [0.0, 0.0, 0.0],
                        position: 0.0,
                    });
                    Ok(())
                }
                Value::Buffer(buffer) if index < self.sources.len() => {
                    self.sources[index].buffer = buffer.clone();
                    self.sources[index].position = 0.0;
                    Ok(())
                }
                Value::None if index < self.sources.len() => {
                    self.sources.remove(index);
                    Ok(())
                }
                Value::Buffer(_) | Value::None => Err(Error::InvalidLocation(location)),
                _ => Err(Error::InvalidValue("buffer")),
            },
            Field::SpaceLocation => {
                let source = self
                    .sources
                    .get_mut(index)
                    .ok_or(Error::InvalidLocation(location))?;
                source.location = value.as_vector().ok_or(Error::InvalidValue("location"))?;
                Ok(())
            }
            Field::SpaceVelocity => {
                let source = self
                    .sources
                    .get_mut(index)
                    .ok_or(Error::InvalidLocation(location))?;
                source.velocity = value.as_vector().ok_or(Error::InvalidValue("velocity"))?;
                Ok(())
            }
            other => Err(Error::InvalidField(other)),
        }
    }

    fn get_in(&self, field: Field, location: u32) -> Result<Value> {
        let source = self
            .sources
            .get(location as usize)
            .ok_or(Error::InvalidLocation(location))?;
        match field {
            Field::Buffer => Ok(Value::Buffer(source.buffer.clone())),
            Field::SpaceLocation => Ok(Value::Vector(source.location)),
            Field::SpaceVelocity => Ok(Value::Vector(source.velocity)),
            other => Err(Error::InvalidField(other)),
        }
    }

    fn set_out(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        match location {
            0 => port_set(field, 0, value, &mut self.left),
            1 => port_set(field, 0, value, &mut self.right),
            other => Err(Error::InvalidLocation(other)),
        }
    }

    fn get_out(&self, field: Field, location: u32) -> Result<Value> {
        match location {
            0 => port_get(field, 0, &self.left),
            1 => port_get(field, 0, &self.right),
            other => Err(Error::InvalidLocation(other)),
        }
    }
}
