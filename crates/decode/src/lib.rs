mod cache;
mod library;
mod notes;

use std::fs::File;
use std::path::{Path, PathBuf};

use seq_transport::AudioBuffer;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub use cache::{AudioCache, SampleResolver, load_sample};
pub use library::{AUDIO_EXTENSIONS, DEFAULT_SOUNDS_DIR, SampleLibrary};
pub use notes::{midi_to_note_name, piano_sample_file_name};

/// Why a sample could not be turned into PCM.
///
/// Callers treat every variant as "this step is silent" and carry on.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("sample not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("track '{0}' has no sample selected")]
    NoSelection(String),

    #[error("failed to decode '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        source: anyhow::Error,
    },
}

/// Decode an audio file, reporting a missing file separately from a bad one.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, SampleError> {
    if !path.is_file() {
        return Err(SampleError::NotFound(path.to_path_buf()));
    }
    decode_file_direct(path).map_err(|source| SampleError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn decode_file_direct(path: &Path) -> anyhow::Result<AudioBuffer> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    tracing::debug!(
        path = %path.display(),
        frames = samples.len() / channels.max(1) as usize,
        sample_rate,
        channels,
        "decoded sample"
    );

    Ok(AudioBuffer {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;

    /// Write a 16-bit WAV with the given per-channel frames.
    pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: &[i16]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in frames {
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
}
