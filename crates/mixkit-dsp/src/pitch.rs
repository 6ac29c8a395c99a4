//! Pitch shifting with a phase vocoder.
//!
//! The vocoder slides a Hann-windowed analysis frame over the input with
//! 4x overlap, unwraps each bin's phase to its true frequency, remaps the
//! spectrum by the pitch ratio and resynthesizes with accumulated phases
//! and overlap-add. Output lags the input by one frame.

use crate::gate::{port_get, port_set};
use mixkit_core::{
    map_samples, Error, Field, FieldFlags, FieldInfo, MixStatus, Result, SampleBuffer, Segment,
    SegmentFlags, SegmentInfo, SharedBuffer, Value, ValueType,
};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const FRAMESIZE: usize = 2048;
const OVERSAMPLING: usize = 4;

/// Streaming phase-vocoder pitch shifter over a fixed frame size.
pub struct PhaseVocoder {
    framesize: usize,
    oversampling: usize,
    samplerate: u32,
    step: usize,
    latency: usize,
    rover: usize,
    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    window: Vec<f32>,
    workspace: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    last_phase: Vec<f32>,
    phase_sum: Vec<f32>,
    analyzed_magn: Vec<f32>,
    analyzed_freq: Vec<f32>,
    synth_magn: Vec<f32>,
    synth_freq: Vec<f32>,
    accumulator: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl PhaseVocoder {
    pub fn new(framesize: usize, oversampling: usize, samplerate: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(framesize);
        let ifft = planner.plan_fft_inverse(framesize);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let half = framesize / 2;
        let step = framesize / oversampling;
        let latency = framesize - step;
        let window = (0..framesize)
            .map(|k| 0.5 - 0.5 * (2.0 * PI * k as f32 / framesize as f32).cos())
            .collect();
        Self {
            framesize,
            oversampling,
            samplerate,
            step,
            latency,
            rover: latency,
            in_fifo: vec![0.0; framesize],
            out_fifo: vec![0.0; framesize],
            window,
            workspace: vec![Complex::new(0.0, 0.0); framesize],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            last_phase: vec![0.0; half + 1],
            phase_sum: vec![0.0; half + 1],
            analyzed_magn: vec![0.0; half + 1],
            analyzed_freq: vec![0.0; half + 1],
            synth_magn: vec![0.0; half + 1],
            synth_freq: vec![0.0; half + 1],
            accumulator: vec![0.0; framesize],
            fft,
            ifft,
        }
    }

    pub fn framesize(&self) -> usize {
        self.framesize
    }

    /// Push one input sample and pull the sample one frame behind it.
    #[inline]
    pub fn tick(&mut self, pitch: f32, input: f32) -> f32 {
        self.in_fifo[self.rover] = input;
        let output = self.out_fifo[self.rover - self.latency];
        self.rover += 1;
        if self.rover >= self.framesize {
            self.rover = self.latency;
            self.process_frame(pitch);
        }
        output
    }

    /// Drop all buffered state, e.g. on a seek.
    pub fn reset(&mut self) {
        self.rover = self.latency;
        self.in_fifo.fill(0.0);
        self.out_fifo.fill(0.0);
        self.last_phase.fill(0.0);
        self.phase_sum.fill(0.0);
        self.accumulator.fill(0.0);
    }

    fn process_frame(&mut self, pitch: f32) {
        let n = self.framesize;
        let half = n / 2;
        let step = self.step;
        let oversampling = self.oversampling as f32;
        let freq_per_bin = self.samplerate as f32 / n as f32;
        let expected = 2.0 * PI * step as f32 / n as f32;

        for k in 0..n {
            self.workspace[k] = Complex::new(self.in_fifo[k] * self.window[k], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.workspace, &mut self.scratch);

        // Analysis: per-bin magnitude and true frequency from the phase
        // difference against the previous frame.
        for k in 0..=half {
            let bin = self.workspace[k];
            let magnitude = 2.0 * bin.norm();
            let phase = bin.arg();
            let mut delta = phase - self.last_phase[k];
            self.last_phase[k] = phase;
            delta -= k as f32 * expected;
            // Map the deviation into [-PI, PI].
            let mut wraps = (delta / PI) as i32;
            if wraps >= 0 {
                wraps += wraps & 1;
            } else {
                wraps -= wraps & 1;
            }
            delta -= PI * wraps as f32;
            self.analyzed_magn[k] = magnitude;
            self.analyzed_freq[k] =
                k as f32 * freq_per_bin + delta * oversampling * freq_per_bin / (2.0 * PI);
        }

        // Remap bins by the pitch ratio, accumulating magnitudes that
        // land on the same target bin.
        self.synth_magn.fill(0.0);
        self.synth_freq.fill(0.0);
        for k in 0..=half {
            let target = (k as f32 * pitch) as usize;
            if target <= half {
                self.synth_magn[target] += self.analyzed_magn[k];
                self.synth_freq[target] = self.analyzed_freq[k] * pitch;
            }
        }

        // Synthesis: accumulate each bin's phase at its shifted frequency.
        for k in 0..=half {
            let deviation = self.synth_freq[k] - k as f32 * freq_per_bin;
            self.phase_sum[k] +=
                2.0 * PI * deviation / (freq_per_bin * oversampling) + k as f32 * expected;
            self.workspace[k] = Complex::from_polar(self.synth_magn[k], self.phase_sum[k]);
        }
        for k in half + 1..n {
            self.workspace[k] = Complex::new(0.0, 0.0);
        }
        self.ifft
            .process_with_scratch(&mut self.workspace, &mut self.scratch);

        let norm = 2.0 / (half as f32 * oversampling);
        for k in 0..n {
            self.accumulator[k] += self.window[k] * self.workspace[k].re * norm;
        }

        self.out_fifo[..step].copy_from_slice(&self.accumulator[..step]);
        self.accumulator.copy_within(step.., 0);
        self.accumulator[n - step..].fill(0.0);
        self.in_fifo.copy_within(step.., 0);
    }
}

/// Pitch-shifting segment around a [`PhaseVocoder`].
pub struct PitchShift {
    input: Option<SharedBuffer>,
    output: Option<SharedBuffer>,
    vocoder: PhaseVocoder,
    pitch: f32,
    samplerate: u32,
    bypass: bool,
}

impl core::fmt::Debug for PitchShift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PitchShift")
            .field("pitch", &self.pitch)
            .field("samplerate", &self.samplerate)
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}

impl PitchShift {
    pub fn new(pitch: f32, samplerate: u32) -> Result<Self> {
        if pitch <= 0.0 {
            return Err(Error::InvalidValue("pitch"));
        }
        if samplerate == 0 {
            return Err(Error::InvalidValue("samplerate"));
        }
        Ok(Self {
            input: None,
            output: None,
            vocoder: PhaseVocoder::new(FRAMESIZE, OVERSAMPLING, samplerate),
            pitch,
            samplerate,
            bypass: false,
        })
    }
}

impl Segment for PitchShift {
    fn info(&self) -> SegmentInfo {
        SegmentInfo {
            name: "pitch",
            description: "shifts the pitch of the signal by a ratio",
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
                FieldInfo {
                    field: Field::PitchShift,
                    description: "pitch ratio, 1.0 passes through unchanged",
                    flags: FieldFlags::SEGMENT | FieldFlags::SET | FieldFlags::GET,
                    ty: ValueType::Float,
                    count: 1,
                },
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

    fn mix(&mut self) -> Result<MixStatus> {
        let input = self.input.clone().ok_or(Error::BufferMissing)?;
        let output = self.output.clone().ok_or(Error::BufferMissing)?;
        if self.bypass || self.pitch == 1.0 {
            // Bit-exact shortcut; aliased ports already hold the data.
            if !Arc::ptr_eq(&input, &output) {
                SampleBuffer::transfer(&mut input.lock(), &mut output.lock())?;
            }
        } else {
            let pitch = self.pitch;
            let vocoder = &mut self.vocoder;
            map_samples(&input, &output, |s| vocoder.tick(pitch, s))?;
        }
        Ok(MixStatus::Continue)
    }

    fn set(&mut self, field: Field, value: &Value) -> Result<()> {
        match field {
            Field::PitchShift => {
                let pitch = value.as_float().ok_or(Error::InvalidValue("pitch"))?;
                if pitch <= 0.0 {
                    return Err(Error::InvalidValue("pitch"));
                }
                self.pitch = pitch;
            }
            Field::SampleRate => {
                let rate = value.as_uint().ok_or(Error::InvalidValue("samplerate"))?;
                if rate == 0 {
                    return Err(Error::InvalidValue("samplerate"));
                }
                self.samplerate = rate;
                self.vocoder = PhaseVocoder::new(FRAMESIZE, OVERSAMPLING, rate);
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
            Field::PitchShift => Ok(Value::Float(self.pitch)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use mixkit_core::shared_buffer;

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
            .count()
    }

    #[test]
    fn unshifted_vocoder_is_near_identity_in_frequency() {
        let rate = 8000;
        let mut vocoder = PhaseVocoder::new(2048, 4, rate);
        let freq = 100.0;
        let mut output = Vec::new();
        for i in 0..16384 {
            let t = i as f32 / rate as f32;
            output.push(vocoder.tick(1.0, (2.0 * PI * freq * t).sin()));
        }
        // Ignore the warm-up; compare crossing rates over the tail.
        let tail = &output[8192..];
        let expected = zero_crossings(
            &(8192..16384)
                .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin())
                .collect::<Vec<_>>(),
        );
        let got = zero_crossings(tail);
        let ratio = got as f32 / expected as f32;
        assert!((0.9..1.1).contains(&ratio), "crossing ratio {ratio}");
    }

    #[test]
    fn doubling_the_ratio_doubles_the_frequency() {
        let rate = 8000;
        let mut vocoder = PhaseVocoder::new(2048, 4, rate);
        let freq = 100.0;
        let mut output = Vec::new();
        for i in 0..16384 {
            let t = i as f32 / rate as f32;
            output.push(vocoder.tick(2.0, (2.0 * PI * freq * t).sin()));
        }
        let tail = &output[8192..];
        let input_crossings = zero_crossings(
            &(8192..16384)
                .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin())
                .collect::<Vec<_>>(),
        );
        let got = zero_crossings(tail);
        let ratio = got as f32 / input_crossings as f32;
        assert!((1.7..2.3).contains(&ratio), "crossing ratio {ratio}");
    }

    #[test]
    fn output_lags_by_roughly_one_frame() {
        let mut vocoder = PhaseVocoder::new(2048, 4, 44100);
        let mut output = Vec::with_capacity(6144);
        output.push(vocoder.tick(1.0, 1.0));
        for _ in 1..6144 {
            output.push(vocoder.tick(1.0, 0.0));
        }
        // Nothing can surface before the first processed hop, and the
        // bulk of the impulse arrives about one frame late.
        assert!(output[..512].iter().all(|&s| s == 0.0));
        let peak = output
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert!((1024..3072).contains(&peak), "impulse peaked at {peak}");
    }

    #[test]
    fn unity_pitch_transfers_bit_exact() {
        let input = shared_buffer(16);
        let output = shared_buffer(16);
        let mut shift = PitchShift::new(1.0, 44100).unwrap();
        shift
            .set_in(Field::Buffer, 0, &Value::Buffer(input.clone()))
            .unwrap();
        shift
            .set_out(Field::Buffer, 0, &Value::Buffer(output.clone()))
            .unwrap();

        let samples = [0.1, -0.9, 0.33333, 1.0e-7];
        {
            let mut b = input.lock();
            b.request_write(4).unwrap().copy_from_slice(&samples);
            b.finish_write(4).unwrap();
        }
        shift.mix().unwrap();
        assert_eq!(input.lock().available_read(), 0);
        let mut out = output.lock();
        assert_eq!(out.request_read(u32::MAX).unwrap(), &samples);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(
            PitchShift::new(0.0, 44100).unwrap_err(),
            Error::InvalidValue("pitch")
        );
        assert_eq!(
            PitchShift::new(1.0, 0).unwrap_err(),
            Error::InvalidValue("samplerate")
        );
        let mut shift = PitchShift::new(1.0, 44100).unwrap();
        assert_eq!(
            shift
                .set(Field::PitchShift, &Value::Float(-0.5))
                .unwrap_err(),
            Error::InvalidValue("pitch")
        );
    }

    #[test]
    fn missing_buffers_fail() {
        let mut shift = PitchShift::new(1.2, 44100).unwrap();
        assert_eq!(shift.mix().unwrap_err(), Error::BufferMissing);
    }
}
