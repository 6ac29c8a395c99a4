//! Pack converters: format translation at the pipeline edges.
//!
//! [`Unpacker`] turns interleaved packed bytes into one float buffer per
//! channel; [`Packer`] is the reverse. Both translate between the pack's
//! [`Encoding`] and normalized `f32` in [-1, 1], applying a volume scale.
//! Sample-rate conversion is not performed here; the pack and the buffers
//! are taken to run at the same rate.

use crate::error::{Error, Result};
use crate::pack::{Encoding, SharedPack};
use crate::ring::SharedBuffer;
use crate::segment::{
    Field, FieldFlags, FieldInfo, MixStatus, Segment, SegmentFlags, SegmentInfo, Value, ValueType,
};

const I24_SCALE: f32 = 8388608.0;

/// Decode one sample at the head of `bytes` (little-endian).
fn decode_sample(encoding: Encoding, bytes: &[u8]) -> f32 {
    match encoding {
        Encoding::I8 => bytes[0] as i8 as f32 / 128.0,
        Encoding::U8 => (bytes[0] as f32 - 128.0) / 128.0,
        Encoding::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        Encoding::U16 => {
            (u16::from_le_bytes([bytes[0], bytes[1]]) as f32 - 32768.0) / 32768.0
        }
        Encoding::I24 => {
            let fill = ((bytes[2] as i8) >> 7) as u8;
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], fill]) as f32 / I24_SCALE
        }
        Encoding::U24 => {
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            (v as f32 - I24_SCALE) / I24_SCALE
        }
        Encoding::I32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2147483648.0
        }
        Encoding::U32 => {
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            ((v as f64 - 2147483648.0) / 2147483648.0) as f32
        }
        Encoding::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        Encoding::F64 => f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) as f32,
    }
}

/// Encode `value` into the head of `bytes` (little-endian), clamping to
/// the encoding's range.
fn encode_sample(encoding: Encoding, value: f32, bytes: &mut [u8]) {
    match encoding {
        Encoding::I8 => {
            bytes[0] = (value * 128.0).round().clamp(-128.0, 127.0) as i8 as u8;
        }
        Encoding::U8 => {
            bytes[0] = (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8;
        }
        Encoding::I16 => {
            let v = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            bytes[..2].copy_from_slice(&v.to_le_bytes());
        }
        Encoding::U16 => {
            let v = (value * 32768.0 + 32768.0).round().clamp(0.0, 65535.0) as u16;
            bytes[..2].copy_from_slice(&v.to_le_bytes());
        }
        Encoding::I24 => {
            let v = (value * I24_SCALE).round().clamp(-I24_SCALE, I24_SCALE - 1.0) as i32;
            bytes[..3].copy_from_slice(&v.to_le_bytes()[..3]);
        }
        Encoding::U24 => {
            let v = (value * I24_SCALE + I24_SCALE)
                .round()
                .clamp(0.0, 2.0 * I24_SCALE - 1.0) as u32;
            bytes[..3].copy_from_slice(&v.to_le_bytes()[..3]);
        }
        Encoding::I32 => {
            let v = ((value as f64) * 2147483648.0)
                .round()
                .clamp(-2147483648.0, 2147483647.0) as i32;
            bytes[..4].copy_from_slice(&v.to_le_bytes());
        }
        Encoding::U32 => {
            let v = ((value as f64) * 2147483648.0 + 2147483648.0)
                .round()
                .clamp(0.0, 4294967295.0) as u32;
            bytes[..4].copy_from_slice(&v.to_le_bytes());
        }
        Encoding::F32 => {
            bytes[..4].copy_from_slice(&value.to_le_bytes());
        }
        Encoding::F64 => {
            bytes[..8].copy_from_slice(&(value as f64).to_le_bytes());
        }
    }
}

fn volume_field() -> FieldInfo {
    FieldInfo {
        field: Field::Volume,
        description: "linear volume scale applied during conversion",
        flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
        ty: ValueType::Float,
        count: 1,
    }
}

/// Packed bytes in, one float buffer per channel out.
pub struct Unpacker {
    pack: SharedPack,
    outputs: Vec<Option<SharedBuffer>>,
    volume: f32,
}

impl Unpacker {
    pub fn new(pack: SharedPack) -> Self {
        let channels = pack.lock().channels() as usize;
        Self {
            pack,
            outputs: vec![None; channels],
            volume: 1.0,
        }
    }
}

impl Segment for Unpacker {
    fn info(&self) -> SegmentInfo {
        SegmentInfo {
            name: "unpacker",
            description: "decodes packed interleaved audio into per-channel sample buffers",
            flags: SegmentFlags::NONE,
            min_inputs: 0,
            max_inputs: 0,
            outputs: self.outputs.len() as u32,
            fields: vec![
                FieldInfo {
                    field: Field::Buffer,
                    description: "the sample buffer receiving a channel",
                    flags: FieldFlags::OUT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Buffer,
                    count: 1,
                },
                volume_field(),
            ],
        }
    }

    fn mix(&mut self) -> Result<MixStatus> {
        let handles: Vec<SharedBuffer> = self
            .outputs
            .iter()
            .map(|b| b.clone().ok_or(Error::BufferMissing))
            .collect::<Result<_>>()?;

        let mut pack = self.pack.lock();
        let encoding = pack.encoding();
        let channels = handles.len();
        let frame = pack.frame_size() as usize;
        let sample = encoding.sample_size() as usize;

        let mut guards: Vec<_> = handles.iter().map(|b| b.lock()).collect();

        // First pass: probe how many whole frames both ends can move.
        let mut n = 0;
        match pack.request_read(u32::MAX) {
            Ok(bytes) => n = bytes.len() / frame,
            Err(Error::BufferEmpty) => {}
            Err(err) => return Err(err),
        }
        pack.finish_read(0)?;
        for guard in guards.iter_mut() {
            if n == 0 {
                break;
            }
            match guard.request_write(n as u32) {
                Ok(chunk) => {
                    n = n.min(chunk.len());
                    guard.finish_write(0)?;
                }
                Err(Error::BufferFull) => n = 0,
                Err(err) => return Err(err),
            }
        }
        if n == 0 {
            return Ok(MixStatus::Continue);
        }

        // Second pass: the probed count is guaranteed under the held locks.
        let bytes = pack.request_read((n * frame) as u32)?;
        let mut slices: Vec<&mut [f32]> = Vec::with_capacity(channels);
        for guard in guards.iter_mut() {
            slices.push(guard.request_write(n as u32)?);
        }
        for f in 0..n {
            for (c, out) in slices.iter_mut().enumerate() {
                let offset = f * frame + c * sample;
                out[f] = decode_sample(encoding, &bytes[offset..offset + sample]) * self.volume;
            }
        }
        drop(slices);
        for guard in guards.iter_mut() {
            guard.finish_write(n as u32)?;
        }
        pack.finish_read((n * frame) as u32)?;
        Ok(MixStatus::Continue)
    }

    fn set(&mut self, field: Field, value: &Value) -> Result<()> {
        match field {
            Field::Volume => {
                let volume = value.as_float().ok_or(Error::InvalidValue("volume"))?;
                if volume < 0.0 {
                    return Err(Error::InvalidValue("volume"));
                }
                self.volume = volume;
                Ok(())
            }
            other => Err(Error::InvalidField(other)),
        }
    }

    fn get(&self, field: Field) -> Result<Value> {
        match field {
            Field::Volume => Ok(Value::Float(self.volume)),
            other => Err(Error::InvalidField(other)),
        }
    }

    fn set_out(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        match field {
            Field::Buffer => {
                let slot = self
                    .outputs
                    .get_mut(location as usize)
                    .ok_or(Error::InvalidLocation(location))?;
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

    fn get_out(&self, field: Field, location: u32) -> Result<Value> {
        match field {
            Field::Buffer => {
                let slot = self
                    .outputs
                    .get(location as usize)
                    .ok_or(Error::InvalidLocation(location))?;
                Ok(slot.clone().map_or(Value::None, Value::Buffer))
            }
            other => Err(Error::InvalidField(other)),
        }
    }
}

/// One float buffer per channel in, packed bytes out.
pub struct Packer {
    pack: SharedPack,
    inputs: Vec<Option<SharedBuffer>>,
    volume: f32,
}

impl Packer {
    pub fn new(pack: SharedPack) -> Self {
        let channels = pack.lock().channels() as usize;
        Self {
            pack,
            inputs: vec![None; channels],
            volume: 1.0,
        }
    }
}

impl Segment for Packer {
    fn info(&self) -> SegmentInfo {
        SegmentInfo {
            name: "packer",
            description: "encodes per-channel sample buffers into packed interleaved audio",
            flags: SegmentFlags::NONE,
            min_inputs: self.inputs.len() as u32,
            max_inputs: self.inputs.len() as u32,
            outputs: 0,
            fields: vec![
                FieldInfo {
                    field: Field::Buffer,
                    description: "the sample buffer feeding a channel",
                    flags: FieldFlags::IN | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Buffer,
                    count: 1,
                },
                volume_field(),
            ],
        }
    }

    fn mix(&mut self) -> Result<MixStatus> {
        let handles: Vec<SharedBuffer> = self
            .inputs
            .iter()
            .map(|b| b.clone().ok_or(Error::BufferMissing))
            .collect::<Result<_>>()?;

        let mut pack = self.pack.lock();
        let encoding = pack.encoding();
        let frame = pack.frame_size() as usize;
        let sample = encoding.sample_size() as usize;

        let mut guards: Vec<_> = handles.iter().map(|b| b.lock()).collect();

        let mut n = 0;
        match pack.request_write(u32::MAX) {
            Ok(bytes) => n = bytes.len() / frame,
            Err(Error::BufferFull) => {}
            Err(err) => return Err(err),
        }
        pack.finish_write(0)?;
        for guard in guards.iter_mut() {
            if n == 0 {
                break;
            }
            match guard.request_read(n as u32) {
                Ok(chunk) => {
                    n = n.min(chunk.len());
                    guard.finish_read(0)?;
                }
                Err(Error::BufferEmpty) => n = 0,
                Err(err) => return Err(err),
            }
        }
        if n == 0 {
            return Ok(MixStatus::Continue);
        }

        let bytes = pack.request_write((n * frame) as u32)?;
        let mut slices: Vec<&mut [f32]> = Vec::with_capacity(guards.len());
        for guard in guards.iter_mut() {
            slices.push(guard.request_read(n as u32)?);
        }
        for f in 0..n {
            for (c, chunk) in slices.iter().enumerate() {
                let offset = f * frame + c * sample;
                encode_sample(
                    encoding,
                    chunk[f] * self.volume,
                    &mut bytes[offset..offset + sample],
                );
            }
        }
        drop(slices);
        for guard in guards.iter_mut() {
            guard.finish_read(n as u32)?;
        }
        pack.finish_write((n * frame) as u32)?;
        Ok(MixStatus::Continue)
    }

    fn set(&mut self, field: Field, value: &Value) -> Result<()> {
        match field {
            Field::Volume => {
                let volume = value.as_float().ok_or(Error::InvalidValue("volume"))?;
                if volume < 0.0 {
                    return Err(Error::InvalidValue("volume"));
                }
                self.volume = volume;
                Ok(())
            }
            other => Err(Error::InvalidField(other)),
        }
    }

    fn get(&self, field: Field) -> Result<Value> {
        match field {
            Field::Volume => Ok(Value::Float(self.volume)),
            other => Err(Error::InvalidField(other)),
        }
    }

    fn set_in(&mut self, field: Field, location: u32, value: &Value) -> Result<()> {
        match field {
            Field::Buffer => {
                let slot = self
                    .inputs
                    .get_mut(location as usize)
                    .ok_or(Error::InvalidLocation(location))?;
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

    fn get_in(&self, field: Field, location: u32) -> Result<Value> {
        match field {
            Field::Buffer => {
                let slot = self
                    .inputs
                    .get(location as usize)
                    .ok_or(Error::InvalidLocation(location))?;
                Ok(slot.clone().map_or(Value::None, Value::Buffer))
            }
            other => Err(Error::InvalidField(other)),
        }
    }
}

/// Register the pack converter segment types.
pub fn register_segments(registry: &crate::registry::Registry) -> Result<()> {
    use crate::registry::ArgInfo;

    registry.register(
        "unpacker",
        vec![ArgInfo {
            name: "pack",
            ty: ValueType::Pack,
        }],
        |args| {
            let pack = args[0].as_pack().ok_or(Error::InvalidValue("pack"))?;
            Ok(Box::new(Unpacker::new(pack.clone())))
        },
    )?;
    registry.register(
        "packer",
        vec![ArgInfo {
            name: "pack",
            ty: ValueType::Pack,
        }],
        |args| {
            let pack = args[0].as_pack().ok_or(Error::InvalidValue("pack"))?;
            Ok(Box::new(Packer::new(pack.clone())))
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::shared_pack;
    use crate::ring::shared_buffer;
    use approx::assert_abs_diff_eq;

    fn fill_pack(pack: &SharedPack, bytes: &[u8]) {
        let mut p = pack.lock();
        let chunk = p.request_write(bytes.len() as u32).unwrap();
        chunk.copy_from_slice(bytes);
        p.finish_write(bytes.len() as u32).unwrap();
    }

    fn drain_pack(pack: &SharedPack) -> Vec<u8> {
        let mut p = pack.lock();
        let n = p.available_read();
        let out = p.request_read(n).unwrap().to_vec();
        p.finish_read(n).unwrap();
        out
    }

    #[test]
    fn decode_covers_signed_extremes() {
        assert_abs_diff_eq!(decode_sample(Encoding::I8, &[0x80]), -1.0);
        assert_abs_diff_eq!(decode_sample(Encoding::I16, &[0x00, 0x80]), -1.0);
        assert_abs_diff_eq!(decode_sample(Encoding::I24, &[0x00, 0x00, 0x80]), -1.0);
        assert_abs_diff_eq!(decode_sample(Encoding::I24, &[0xFF, 0xFF, 0x7F]), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(decode_sample(Encoding::U8, &[0x00]), -1.0);
        assert_abs_diff_eq!(decode_sample(Encoding::U8, &[0x80]), 0.0);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let mut bytes = [0u8; 2];
        encode_sample(Encoding::I16, 2.0, &mut bytes);
        assert_eq!(i16::from_le_bytes(bytes), i16::MAX);
        encode_sample(Encoding::I16, -2.0, &mut bytes);
        assert_eq!(i16::from_le_bytes(bytes), i16::MIN);
    }

    #[test]
    fn float_encodings_are_bit_exact() {
        let mut bytes = [0u8; 4];
        encode_sample(Encoding::F32, 0.123456, &mut bytes);
        assert_eq!(decode_sample(Encoding::F32, &bytes), 0.123456);
    }

    #[test]
    fn stereo_i16_round_trip_is_byte_exact() {
        let frames = 64u32;
        let pack_in = shared_pack(frames, Encoding::I16, 2, 44100).unwrap();
        let pack_out = shared_pack(frames, Encoding::I16, 2, 44100).unwrap();
        let left = shared_buffer(frames);
        let right = shared_buffer(frames);

        // Deterministic pseudo-random 16-bit payload.
        let mut bytes = Vec::new();
        let mut state = 0x2545u32;
        for _ in 0..frames * 4 {
            state = state.wrapping_mul(48271) % 0x7fffffff;
            bytes.push((state >> 7) as u8);
        }
        fill_pack(&pack_in, &bytes);

        let mut unpacker = Unpacker::new(pack_in);
        unpacker
            .set_out(Field::Buffer, 0, &Value::Buffer(left.clone()))
            .unwrap();
        unpacker
            .set_out(Field::Buffer, 1, &Value::Buffer(right.clone()))
            .unwrap();
        let mut packer = Packer::new(pack_out.clone());
        packer
            .set_in(Field::Buffer, 0, &Value::Buffer(left))
            .unwrap();
        packer
            .set_in(Field::Buffer, 1, &Value::Buffer(right))
            .unwrap();

        assert_eq!(unpacker.mix().unwrap(), MixStatus::Continue);
        assert_eq!(packer.mix().unwrap(), MixStatus::Continue);
        assert_eq!(drain_pack(&pack_out), bytes);
    }

    #[test]
    fn unpacker_deinterleaves_channels() {
        let pack = shared_pack(4, Encoding::I16, 2, 44100).unwrap();
        let left = shared_buffer(4);
        let right = shared_buffer(4);
        // Two frames: (0.5, -0.5), (0.25, -0.25) roughly.
        let mut bytes = Vec::new();
        for v in [16384i16, -16384, 8192, -8192] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        fill_pack(&pack, &bytes);

        let mut unpacker = Unpacker::new(pack);
        unpacker
            .set_out(Field::Buffer, 0, &Value::Buffer(left.clone()))
            .unwrap();
        unpacker
            .set_out(Field::Buffer, 1, &Value::Buffer(right.clone()))
            .unwrap();
        unpacker.mix().unwrap();

        let mut l = left.lock();
        let l = l.request_read(u32::MAX).unwrap();
        assert_abs_diff_eq!(l[0], 0.5);
        assert_abs_diff_eq!(l[1], 0.25);
        let mut r = right.lock();
        let r = r.request_read(u32::MAX).unwrap();
        assert_abs_diff_eq!(r[0], -0.5);
        assert_abs_diff_eq!(r[1], -0.25);
    }

    #[test]
    fn unwired_channel_is_buffer_missing() {
        let pack = shared_pack(4, Encoding::I16, 2, 44100).unwrap();
        let mut unpacker = Unpacker::new(pack);
        unpacker
            .set_out(Field::Buffer, 0, &Value::Buffer(shared_buffer(4)))
            .unwrap();
        assert_eq!(unpacker.mix().unwrap_err(), Error::BufferMissing);
    }

    #[test]
    fn out_of_range_port_is_invalid_location() {
        let pack = shared_pack(4, Encoding::I16, 2, 44100).unwrap();
        let mut unpacker = Unpacker::new(pack);
        assert_eq!(
            unpacker
                .set_out(Field::Buffer, 2, &Value::Buffer(shared_buffer(4)))
                .unwrap_err(),
            Error::InvalidLocation(2)
        );
    }

    #[test]
    fn packer_applies_volume() {
        let pack = shared_pack(4, Encoding::F32, 1, 44100).unwrap();
        let input = shared_buffer(4);
        {
            let mut b = input.lock();
            b.request_write(2).unwrap().copy_from_slice(&[0.5, -0.5]);
            b.finish_write(2).unwrap();
        }
        let mut packer = Packer::new(pack.clone());
        packer
            .set_in(Field::Buffer, 0, &Value::Buffer(input))
            .unwrap();
        packer.set(Field::Volume, &Value::Float(0.5)).unwrap();
        packer.mix().unwrap();

        let bytes = drain_pack(&pack);
        assert_abs_diff_eq!(decode_sample(Encoding::F32, &bytes[0..4]), 0.25);
        assert_abs_diff_eq!(decode_sample(Encoding::F32, &bytes[4..8]), -0.25);
    }
}
