use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::time::ms_to_frames;

/// Owned, interleaved PCM used as a mix target.
///
/// The offline renderer allocates one of these per loop and overlays samples
/// onto it; nothing else writes to it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// A silent buffer of `duration_ms`.
    pub fn silence(duration_ms: f64, sample_rate: u32, channels: u16) -> Self {
        let frames = ms_to_frames(duration_ms, sample_rate);
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Mix `source` into this buffer starting at `offset_frame`.
    ///
    /// Samples are summed with whatever is already there. Anything past the
    /// end of this buffer is dropped, the buffer never grows. Channels are
    /// mapped with `ch % source_channels`, so a mono source feeds every
    /// output channel. `source` must already be at this buffer's sample rate.
    pub fn overlay(&mut self, source: &AudioArc, offset_frame: usize) {
        let output_channels = self.channels as usize;
        let source_channels = source.channels() as usize;
        let total_frames = self.frames();
        if offset_frame >= total_frames {
            return;
        }

        let frames = source.frames().min(total_frames - offset_frame);
        let src = source.samples();

        for frame_idx in 0..frames {
            let dst_frame = offset_frame + frame_idx;
            for ch in 0..output_channels {
                let src_idx = frame_idx * source_channels + ch % source_channels;
                self.samples[dst_frame * output_channels + ch] += src[src_idx];
            }
        }
    }

    /// Like [`AudioBuffer::overlay`] with the position given in milliseconds.
    pub fn overlay_at_ms(&mut self, source: &AudioArc, offset_ms: f64) {
        let offset_frame = ms_to_frames(offset_ms, self.sample_rate);
        self.overlay(source, offset_frame);
    }

    /// Concatenate `times` copies of this buffer.
    pub fn repeat(&self, times: usize) -> Self {
        Self {
            samples: self.samples.repeat(times),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Shared, immutable audio sample data.
///
/// Decoded samples are stored in an `Arc<[f32]>` so the live scheduler can
/// hand the same sample to the output device on every trigger without
/// copying it.
#[derive(Clone, PartialEq)]
pub struct AudioArc {
    /// Raw interleaved samples, [L, R, L, R, ...] for stereo.
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// Create a new `AudioArc` from owned interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The inner `Arc`, mostly useful for checking reference counts.
    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Keep only the first `end_ms` of the audio.
    ///
    /// Returns a cheap clone when the audio is already shorter than that.
    pub fn slice_ms(&self, end_ms: f64) -> Self {
        let frames = ms_to_frames(end_ms, self.sample_rate);
        if frames >= self.frames() {
            return self.clone();
        }
        let end = frames * self.channels as usize;
        Self::new(self.samples[..end].to_vec(), self.sample_rate, self.channels)
    }

    /// Resample to `target_sample_rate`, or clone if already there.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }

        resample_audio_arc(self, target_sample_rate)
    }

    pub fn from_audio_buffer(buffer: AudioBuffer) -> Self {
        Self::new(buffer.samples, buffer.sample_rate, buffer.channels)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_ms", &self.duration_ms())
            .finish()
    }
}

/// Resample an `AudioArc` with sinc interpolation.
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    if audio.is_empty() {
        return Ok(AudioArc::new(Vec::new(), target_sample_rate, audio.channels));
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();

    let resample_ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let output_frames = (input_frames as f64 * resample_ratio).ceil() as usize;

    // rubato wants one Vec per channel
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame_idx in 0..input_frames {
        for (ch, input) in input_channels.iter_mut().enumerate() {
            input.push(audio.samples()[frame_idx * channels + ch]);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;

    let output_channels = resampler.process(&input_channels, None)?;

    let mut output_samples = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_channels[0].len() {
        for output in &output_channels {
            output_samples.push(output[frame_idx]);
        }
    }

    Ok(AudioArc::new(
        output_samples,
        target_sample_rate,
        audio.channels,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// 100 ms of a stereo 440 Hz tone.
    fn tone(sample_rate: u32) -> AudioArc {
        let frames = sample_rate as usize / 10;
        let samples = (0..frames)
            .flat_map(|i| {
                let v = (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin();
                [v, v]
            })
            .collect();
        AudioArc::new(samples, sample_rate, 2)
    }

    #[test]
    fn test_audio_arc_new() {
        let audio = AudioArc::new(vec![0.0, 0.1, 0.2, 0.3], 44100, 2);

        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 2);
        assert_eq!(audio.len(), 4);
        assert!(!audio.is_empty());
    }

    #[test]
    fn test_audio_arc_clone_is_cheap() {
        let audio = AudioArc::new(vec![0.0; 100000], 44100, 2);
        let audio2 = audio.clone();

        assert_eq!(Arc::strong_count(audio.samples_arc()), 2);
        assert_eq!(Arc::strong_count(audio2.samples_arc()), 2);
    }

    #[test]
    fn test_silence_length() {
        let buffer = AudioBuffer::silence(16000.0, 1000, 2);
        assert_eq!(buffer.frames(), 16000);
        assert_eq!(buffer.samples.len(), 32000);
        assert_eq!(buffer.duration_ms(), 16000.0);
        assert!(buffer.samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_overlay_sums_instead_of_replacing() {
        let mut buffer = AudioBuffer::silence(10.0, 1000, 1);
        let hit = AudioArc::new(vec![0.5, 0.25], 1000, 1);

        buffer.overlay(&hit, 3);
        buffer.overlay(&hit, 3);
        buffer.overlay(&hit, 4);

        assert_eq!(buffer.samples[3], 1.0);
        assert_eq!(buffer.samples[4], 0.25 + 0.25 + 0.5);
        assert_eq!(buffer.samples[5], 0.25);
        assert_eq!(buffer.samples[2], 0.0);
    }

    #[test]
    fn test_overlay_truncates_at_end() {
        let mut buffer = AudioBuffer::silence(4.0, 1000, 1);
        let long = AudioArc::new(vec![1.0; 10], 1000, 1);

        buffer.overlay(&long, 2);
        assert_eq!(buffer.samples, vec![0.0, 0.0, 1.0, 1.0]);

        // entirely past the end
        buffer.overlay(&long, 4);
        assert_eq!(buffer.frames(), 4);
    }

    #[test]
    fn test_overlay_mono_into_stereo() {
        let mut buffer = AudioBuffer::silence(2.0, 1000, 2);
        let mono = AudioArc::new(vec![0.5, -0.5], 1000, 1);

        buffer.overlay(&mono, 0);
        assert_eq!(buffer.samples, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_overlay_is_order_independent() {
        let a = AudioArc::new(vec![0.1, 0.2, 0.3], 1000, 1);
        let b = AudioArc::new(vec![0.7, 0.6], 1000, 1);

        let mut ab = AudioBuffer::silence(8.0, 1000, 1);
        ab.overlay(&a, 1);
        ab.overlay(&b, 2);

        let mut ba = AudioBuffer::silence(8.0, 1000, 1);
        ba.overlay(&b, 2);
        ba.overlay(&a, 1);

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_repeat() {
        let mut buffer = AudioBuffer::silence(3.0, 1000, 1);
        buffer.samples[0] = 1.0;

        let repeated = buffer.repeat(4);
        assert_eq!(repeated.frames(), 12);
        assert_eq!(repeated.samples[0], 1.0);
        assert_eq!(repeated.samples[3], 1.0);
        assert_eq!(repeated.samples[9], 1.0);
        assert_eq!(repeated.samples[10], 0.0);
    }

    #[test]
    fn test_slice_ms() {
        let audio = AudioArc::new(vec![0.0; 2000 * 2], 1000, 2);

        let sliced = audio.slice_ms(1250.0);
        assert_eq!(sliced.frames(), 1250);
        assert_eq!(sliced.channels(), 2);

        // longer than the audio: shares the same data
        let whole = audio.slice_ms(5000.0);
        assert_eq!(whole.frames(), 2000);
        assert!(Arc::ptr_eq(whole.samples_arc(), audio.samples_arc()));
    }

    #[test]
    fn test_resample_same_rate_is_clone() {
        let audio = tone(44100);
        let resampled = audio.resample(44100).unwrap();

        assert_eq!(resampled.len(), audio.len());
        assert_eq!(Arc::strong_count(audio.samples_arc()), 2);
    }

    #[test]
    fn test_resample_upsampling() {
        let audio = tone(44100);
        let original_frames = audio.frames();

        let resampled = audio.resample(48000).unwrap();

        assert_eq!(resampled.sample_rate(), 48000);
        assert_eq!(resampled.channels(), 2);

        let expected_frames = (original_frames as f64 * 48000.0 / 44100.0) as usize;
        let tolerance = (expected_frames as f64 * 0.03) as i64;
        let diff = resampled.frames() as i64 - expected_frames as i64;
        assert!(
            diff.abs() <= tolerance,
            "expected ~{} frames, got {}",
            expected_frames,
            resampled.frames()
        );
    }

    #[test]
    fn test_resample_empty() {
        let audio = AudioArc::new(vec![], 22050, 1);
        let resampled = audio.resample(44100).unwrap();
        assert!(resampled.is_empty());
        assert_eq!(resampled.sample_rate(), 44100);
    }
}
