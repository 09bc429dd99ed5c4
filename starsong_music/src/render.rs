// Audio renderer: piece -> mono PCM16 sample buffer.
//
// A pure function of the event list. Melody and harmony events render as
// band-limited tones (up to three harmonics below Nyquist) with short linear
// attack/release ramps; rhythm events render as exponentially decaying tone
// bursts with a two-sample click. The mix is peak-normalized to 0.9 full
// scale when it would clip, then quantized to i16.
//
// **Critical constraint: byte-identical output.** Frequencies come from a
// constant equal-tempered ratio table with exact octave doubling, and sine
// values come from `sine`, a polynomial approximation, so the buffer never
// depends on the platform's libm. Only IEEE-754 add/mul/div/round are used.

use crate::event::{Event, Piece, Role};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_SAMPLE_RATE: u32 = 8_000;

/// Peak level after normalization, as a fraction of full scale.
const HEADROOM: f64 = 0.9;

/// Per-event gain before mixing.
const EVENT_GAIN: f64 = 0.3;

/// Attack/release ramp length for tones, in seconds.
const RAMP_SECS: f64 = 0.01;

/// Longest rhythm burst, in seconds.
const BURST_SECS: f64 = 0.12;

/// Equal-tempered ratios 2^(k/12) for k = 0..12.
const SEMITONE_RATIOS: [f64; 12] = [
    1.0,
    1.059_463_094_359_295_3,
    1.122_462_048_309_373,
    1.189_207_115_002_721,
    1.259_921_049_894_873_2,
    1.334_839_854_170_034_4,
    1.414_213_562_373_095_1,
    1.498_307_076_876_681_5,
    1.587_401_051_968_199_4,
    1.681_792_830_507_429,
    1.781_797_436_280_678_6,
    1.887_748_625_363_386_9,
];

/// Harmonic amplitudes for tones.
const HARMONICS: [f64; 3] = [1.0, 0.5, 0.25];

/// Rendered audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl AudioBuffer {
    /// Samples as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// SHA-256 of `to_le_bytes()`, hex encoded.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(self.to_le_bytes()))
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Frequency in Hz of a MIDI pitch (A4 = 69 = 440 Hz).
pub fn midi_to_hz(pitch: u8) -> f64 {
    let offset = pitch as i32 - 69;
    let mut hz = 440.0 * SEMITONE_RATIOS[offset.rem_euclid(12) as usize];
    let octaves = offset.div_euclid(12);
    for _ in 0..octaves.abs() {
        if octaves > 0 {
            hz *= 2.0;
        } else {
            hz /= 2.0;
        }
    }
    hz
}

/// sin(2 pi x) for any x, via the Bhaskara-style parabolic approximation
/// with one refinement pass (max error about 0.001).
pub fn sine(x: f64) -> f64 {
    let frac = x - x.floor();
    // t in [-1, 1): sin(pi * t) == -sin(2 pi * frac)
    let t = 2.0 * frac - 1.0;
    let y = 4.0 * t * (1.0 - t.abs());
    let y = 0.225 * (y * y.abs() - y) + y;
    -y
}

/// Render the whole piece. The buffer length is `ceil(duration * rate)`.
pub fn render(piece: &Piece, sample_rate: u32) -> AudioBuffer {
    let rate = sample_rate as f64;
    let len = (piece.duration * rate).ceil() as usize;
    let mut mix = vec![0.0f64; len];

    for event in piece.events() {
        match event.role {
            Role::Melody | Role::Harmony => render_tone(event, rate, &mut mix),
            Role::Rhythm => render_burst(event, rate, &mut mix),
        }
    }

    let peak = mix.iter().fold(0.0f64, |m, s| m.max(s.abs()));
    let scale = if peak > HEADROOM { HEADROOM / peak } else { 1.0 };
    let samples = mix
        .iter()
        .map(|s| {
            (s * scale * i16::MAX as f64)
                .round()
                .clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect();

    AudioBuffer {
        sample_rate,
        samples,
    }
}

/// Sample range `[start, end)` an event covers, clipped to the buffer.
fn sample_span(event: &Event, max_secs: f64, rate: f64, len: usize) -> (usize, usize) {
    let start = (event.onset * rate).round() as usize;
    let count = (event.duration.min(max_secs) * rate).round() as usize;
    (start.min(len), (start + count).min(len))
}

fn render_tone(event: &Event, rate: f64, mix: &mut [f64]) {
    let (start, end) = sample_span(event, f64::INFINITY, rate, mix.len());
    if end <= start {
        return;
    }
    let freq = midi_to_hz(event.pitch);
    let nyquist = rate / 2.0;
    let partials: Vec<(f64, f64)> = HARMONICS
        .iter()
        .enumerate()
        .map(|(i, &amp)| (freq * (i + 1) as f64, amp))
        .filter(|(f, _)| *f < nyquist)
        .collect();
    let norm: f64 = partials.iter().map(|(_, a)| a).sum();
    if norm <= 0.0 {
        return;
    }

    let n = end - start;
    let ramp = ((RAMP_SECS * rate) as usize).clamp(1, n.div_ceil(2));
    let gain = EVENT_GAIN * event.intensity / norm;
    for (k, slot) in mix[start..end].iter_mut().enumerate() {
        let env = if k < ramp {
            k as f64 / ramp as f64
        } else if n - k <= ramp {
            (n - k) as f64 / ramp as f64
        } else {
            1.0
        };
        let t = k as f64 / rate;
        let value: f64 = partials.iter().map(|(f, a)| a * sine(f * t)).sum();
        *slot += gain * env * value;
    }
}

fn render_burst(event: &Event, rate: f64, mix: &mut [f64]) {
    let (start, end) = sample_span(event, BURST_SECS, rate, mix.len());
    if end <= start {
        return;
    }
    let freq = midi_to_hz(event.pitch);
    let decay_per_sample = 1.0 - 50.0 / rate;
    let mut amp = EVENT_GAIN * event.intensity;
    for (k, slot) in mix[start..end].iter_mut().enumerate() {
        let t = k as f64 / rate;
        let click = match k {
            0 => 0.5,
            1 => -0.5,
            _ => 0.0,
        };
        *slot += amp * (sine(freq * t) + click);
        amp *= decay_per_sample;
    }
}
