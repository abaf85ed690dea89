//! Offline rendering of a pattern to a WAV file.
//!
//! The renderer lays one loop of the grid into a silent buffer, overlaying
//! each triggered sample at its step offset, then repeats the loop for the
//! requested number of bars. Offsets come from [`Tempo`], the same source the
//! live scheduler uses, so the file matches what was heard.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use seq_decode::{SampleLibrary, SampleResolver};
use seq_transport::{
    AudioBuffer, InstrumentMode, Pattern, Tempo, TempoError, Track, ms_to_frames,
};

/// Most 32-bit samples a WAV data chunk can hold.
const MAX_WAV_SAMPLES: usize = u32::MAX as usize / 4;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    InvalidTempo(#[from] TempoError),

    #[error("invalid export parameters: {0}")]
    InvalidExportParameters(String),

    #[error("failed to encode WAV: {0}")]
    Encode(#[from] hound::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub sample_rate: u32,
    pub channels: u16,
    /// Also render PianoRoll tracks. Off by default: the exported mix then
    /// contains the drum grid only.
    pub include_piano_roll: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            include_piano_roll: false,
        }
    }
}

/// Check tempo, bar count and output format before any audio work happens.
pub fn validate(bpm: i64, bars: i64, options: &RenderOptions) -> Result<(Tempo, usize), RenderError> {
    let tempo = Tempo::new(bpm)?;
    if bars <= 0 {
        return Err(RenderError::InvalidExportParameters(format!(
            "bar count must be at least 1, got {bars}"
        )));
    }
    if options.sample_rate == 0 {
        return Err(RenderError::InvalidExportParameters(
            "sample rate must be greater than zero".to_string(),
        ));
    }
    if options.channels == 0 {
        return Err(RenderError::InvalidExportParameters(
            "channel count must be greater than zero".to_string(),
        ));
    }

    let too_long = || {
        RenderError::InvalidExportParameters(format!(
            "{bars} bars at {tempo} do not fit in a WAV file"
        ))
    };
    let bars = usize::try_from(bars).map_err(|_| too_long())?;
    let total = ms_to_frames(tempo.loop_duration_ms(), options.sample_rate)
        .checked_mul(options.channels as usize)
        .and_then(|samples| samples.checked_mul(bars))
        .ok_or_else(too_long)?;
    if total > MAX_WAV_SAMPLES {
        return Err(too_long());
    }
    Ok((tempo, bars))
}

/// Render a single loop of the pattern.
///
/// Tracks whose sample cannot be resolved are left silent; everything else
/// still renders.
pub fn render_loop(
    pattern: &Pattern,
    tempo: Tempo,
    resolver: &mut SampleResolver,
    options: &RenderOptions,
) -> AudioBuffer {
    let mut buffer = AudioBuffer::silence(
        tempo.loop_duration_ms(),
        resolver.sample_rate(),
        options.channels,
    );
    resolver.preload(pattern, options.include_piano_roll);

    for (index, track) in pattern.tracks().iter().enumerate() {
        if track.muted {
            continue;
        }
        match track.mode {
            InstrumentMode::DrumPad => overlay_drum_track(&mut buffer, index, track, tempo, resolver),
            InstrumentMode::PianoRoll if options.include_piano_roll => {
                overlay_piano_track(&mut buffer, index, track, tempo, resolver)
            }
            InstrumentMode::PianoRoll => {}
        }
    }

    buffer
}

fn overlay_drum_track(
    buffer: &mut AudioBuffer,
    index: usize,
    track: &Track,
    tempo: Tempo,
    resolver: &mut SampleResolver,
) {
    if track.active_steps().next().is_none() {
        return;
    }
    let sample = match resolver.resolve_drum_sample(track) {
        Ok(sample) => sample,
        Err(err) => {
            tracing::warn!(track = index, name = %track.name, "skipping track in export: {err}");
            return;
        }
    };

    for col in track.active_steps() {
        buffer.overlay_at_ms(&sample, tempo.step_offset_ms(col));
    }
}

fn overlay_piano_track(
    buffer: &mut AudioBuffer,
    index: usize,
    track: &Track,
    tempo: Tempo,
    resolver: &mut SampleResolver,
) {
    for note in track.notes() {
        let sample = match resolver.resolve_piano_sample(note.pitch, &track.sample.folder) {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!(track = index, pitch = note.pitch, "skipping note in export: {err}");
                continue;
            }
        };
        let clipped = sample.slice_ms(tempo.note_sample_ms(note.start, note.end));
        buffer.overlay_at_ms(&clipped, tempo.step_offset_ms(note.start));
    }
}

/// Render `bars` loops of the pattern into one buffer.
pub fn render_pattern(
    pattern: &Pattern,
    bpm: i64,
    bars: i64,
    library: &SampleLibrary,
    options: &RenderOptions,
) -> Result<AudioBuffer, RenderError> {
    let (tempo, bars) = validate(bpm, bars, options)?;

    let mut resolver = SampleResolver::new(library.clone(), options.sample_rate);
    let one_loop = render_loop(pattern, tempo, &mut resolver, options);
    Ok(one_loop.repeat(bars))
}

/// Render the pattern and encode it as WAV bytes.
pub fn render_wav(
    pattern: &Pattern,
    bpm: i64,
    bars: i64,
    library: &SampleLibrary,
    options: &RenderOptions,
) -> Result<Vec<u8>, RenderError> {
    let buffer = render_pattern(pattern, bpm, bars, library, options)?;
    Ok(encode_wav(&buffer)?)
}

/// Render and write `<output_dir>/<filename>`, replacing any existing file.
///
/// The directory is created if needed. Returns the written path.
pub fn export(
    pattern: &Pattern,
    bpm: i64,
    bars: i64,
    library: &SampleLibrary,
    options: &RenderOptions,
    output_dir: &Path,
    filename: &str,
) -> Result<PathBuf, RenderError> {
    if filename.trim().is_empty() {
        return Err(RenderError::InvalidExportParameters(
            "output filename is empty".to_string(),
        ));
    }
    let buffer = render_pattern(pattern, bpm, bars, library, options)?;

    let path = output_dir.join(filename);
    write_wav(&buffer, &path)?;

    tracing::info!(path = %path.display(), bpm, bars, "exported pattern");
    Ok(path)
}

fn wav_spec(buffer: &AudioBuffer) -> hound::WavSpec {
    hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}

pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(buffer))?;
        for &sample in &buffer.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode `buffer` and write it to `path`, creating parent directories.
pub fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<(), RenderError> {
    let bytes = encode_wav(buffer)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
