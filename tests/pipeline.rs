//! End-to-end pipeline tests over the public API.

use mixkit::{
    shared_buffer, shared_pack, Encoding, Field, MixStatus, Sequence, SharedPack, Value,
};

fn fill_pack(pack: &SharedPack, bytes: &[u8]) {
    let mut p = pack.lock();
    p.request_write(bytes.len() as u32)
        .unwrap()
        .copy_from_slice(bytes);
    p.finish_write(bytes.len() as u32).unwrap();
}

fn drain_pack(pack: &SharedPack) -> Vec<u8> {
    let mut p = pack.lock();
    let available = p.available_read();
    if available == 0 {
        return Vec::new();
    }
    let bytes = p.request_read(available).unwrap().to_vec();
    p.finish_read(available).unwrap();
    bytes
}

fn sine_i16(frames: usize, period: usize, amplitude: f32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let phase = 2.0 * std::f32::consts::PI * (i % period) as f32 / period as f32;
        let sample = (phase.sin() * amplitude * 32767.0) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[test]
fn identity_pitch_pipeline_round_trips_bytes() {
    let frames = 256u32;
    let source = shared_pack(frames, Encoding::I16, 1, 44100).unwrap();
    let sink = shared_pack(frames, Encoding::I16, 1, 44100).unwrap();
    let upstream = shared_buffer(frames);
    let downstream = shared_buffer(frames);

    let registry = mixkit::standard_registry().unwrap();
    let mut unpacker = registry
        .make("unpacker", &[Value::Pack(source.clone())])
        .unwrap();
    unpacker
        .set_out(Field::Buffer, 0, &Value::Buffer(upstream.clone()))
        .unwrap();
    let mut pitch = registry
        .make("pitch", &[Value::Float(1.0), Value::UInt(44100)])
        .unwrap();
    pitch
        .set_in(Field::Buffer, 0, &Value::Buffer(upstream))
        .unwrap();
    pitch
        .set_out(Field::Buffer, 0, &Value::Buffer(downstream.clone()))
        .unwrap();
    let mut packer = registry
        .make("packer", &[Value::Pack(sink.clone())])
        .unwrap();
    packer
        .set_in(Field::Buffer, 0, &Value::Buffer(downstream))
        .unwrap();

    let mut pipeline = Sequence::new();
    pipeline.add(unpacker);
    pipeline.add(pitch);
    pipeline.add(packer);

    let bytes = sine_i16(frames as usize, 32, 0.8);
    fill_pack(&source, &bytes);

    pipeline.start().unwrap();
    assert_eq!(pipeline.mix().unwrap(), MixStatus::Continue);
    pipeline.end().unwrap();

    assert_eq!(drain_pack(&sink), bytes);
}

#[test]
fn gate_pipeline_mutes_quiet_audio() {
    let frames = 128u32;
    let source = shared_pack(frames, Encoding::I16, 1, 44100).unwrap();
    let sink = shared_pack(frames, Encoding::I16, 1, 44100).unwrap();
    let channel = shared_buffer(frames);

    let registry = mixkit::standard_registry().unwrap();
    let mut unpacker = registry
        .make("unpacker", &[Value::Pack(source.clone())])
        .unwrap();
    unpacker
        .set_out(Field::Buffer, 0, &Value::Buffer(channel.clone()))
        .unwrap();
    let mut gate = registry.make("gate", &[Value::UInt(44100)]).unwrap();
    // In-place: the gate reads and writes the same channel buffer.
    gate.set_in(Field::Buffer, 0, &Value::Buffer(channel.clone()))
        .unwrap();
    gate.set_out(Field::Buffer, 0, &Value::Buffer(channel.clone()))
        .unwrap();
    let mut packer = registry
        .make("packer", &[Value::Pack(sink.clone())])
        .unwrap();
    packer
        .set_in(Field::Buffer, 0, &Value::Buffer(channel))
        .unwrap();

    let mut pipeline = Sequence::new();
    pipeline.add(unpacker);
    pipeline.add(gate);
    pipeline.add(packer);

    // Well below the -24 dB open threshold.
    let bytes = sine_i16(frames as usize, 16, 0.01);
    fill_pack(&source, &bytes);

    pipeline.start().unwrap();
    pipeline.mix().unwrap();
    pipeline.end().unwrap();

    let out = drain_pack(&sink);
    assert_eq!(out.len(), bytes.len());
    assert!(out.iter().all(|&b| b == 0), "quiet input leaked through");
}

#[test]
fn space_mixer_feeds_a_stereo_packer() {
    let frames = 64u32;
    let mono = shared_pack(frames, Encoding::I16, 1, 44100).unwrap();
    let stereo = shared_pack(frames, Encoding::I16, 2, 44100).unwrap();
    let voice = shared_buffer(frames);
    let left = shared_buffer(frames);
    let right = shared_buffer(frames);

    let registry = mixkit::standard_registry().unwrap();
    let mut unpacker = registry
        .make("unpacker", &[Value::Pack(mono.clone())])
        .unwrap();
    unpacker
        .set_out(Field::Buffer, 0, &Value::Buffer(voice.clone()))
        .unwrap();
    let mut mixer = registry.make("space_mixer", &[]).unwrap();
    mixer
        .set_in(Field::Buffer, 0, &Value::Buffer(voice))
        .unwrap();
    mixer
        .set_in(Field::SpaceLocation, 0, &Value::Vector([0.0, 0.0, 50.0]))
        .unwrap();
    mixer
        .set_out(Field::Buffer, 0, &Value::Buffer(left.clone()))
        .unwrap();
    mixer
        .set_out(Field::Buffer, 1, &Value::Buffer(right.clone()))
        .unwrap();
    let mut packer = registry
        .make("packer", &[Value::Pack(stereo.clone())])
        .unwrap();
    packer
        .set_in(Field::Buffer, 0, &Value::Buffer(left))
        .unwrap();
    packer
        .set_in(Field::Buffer, 1, &Value::Buffer(right))
        .unwrap();

    let mut pipeline = Sequence::new();
    pipeline.add(unpacker);
    pipeline.add(mixer);
    pipeline.add(packer);

    fill_pack(&mono, &sine_i16(frames as usize, 16, 0.8));
    pipeline.start().unwrap();
    pipeline.mix().unwrap();
    pipeline.end().unwrap();

    let out = drain_pack(&stereo);
    assert!(!out.is_empty());
    // A source straight ahead lands with equal energy on both channels.
    let mut left_energy = 0i64;
    let mut right_energy = 0i64;
    for frame in out.chunks_exact(4) {
        let l = i16::from_le_bytes([frame[0], frame[1]]) as i64;
        let r = i16::from_le_bytes([frame[2], frame[3]]) as i64;
        left_energy += l * l;
        right_energy += r * r;
    }
    assert!(left_energy > 0);
    let balance = left_energy as f64 / right_energy as f64;
    assert!((0.95..1.05).contains(&balance), "balance {balance}");
}

#[test]
fn standard_registry_knows_the_builtins() {
    let registry = mixkit::standard_registry().unwrap();
    for name in ["unpacker", "packer", "pitch", "gate", "space_mixer"] {
        assert!(registry.contains(name), "missing {name}");
    }
}
