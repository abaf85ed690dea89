use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use seq_transport::{AudioArc, InstrumentMode, Pattern, Track};

use crate::library::SampleLibrary;
use crate::{SampleError, decode_file};

/// Decoded samples keyed by path and the sample rate they were converted to.
///
/// Failures are not cached, so a sample dropped into the folder later is
/// picked up the next time it is asked for.
#[derive(Debug, Default)]
pub struct AudioCache {
    entries: HashMap<(PathBuf, u32), AudioArc>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode `path` (once) and resample it to `sample_rate`.
    pub fn get_or_load(&mut self, path: &Path, sample_rate: u32) -> Result<AudioArc, SampleError> {
        let key = (path.to_path_buf(), sample_rate);
        if let Some(audio) = self.entries.get(&key) {
            tracing::trace!(path = %path.display(), "sample cache hit");
            return Ok(audio.clone());
        }

        let audio = load_sample(path, sample_rate)?;
        self.entries.insert(key, audio.clone());
        Ok(audio)
    }

    /// Decode every path not already cached, in parallel.
    ///
    /// Returns how many new entries were added. Paths that fail are left out
    /// and will report their error when asked for individually.
    pub fn preload(&mut self, paths: &[PathBuf], sample_rate: u32) -> usize {
        let missing: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| !self.entries.contains_key(&(p.to_path_buf(), sample_rate)))
            .collect();

        let loaded: Vec<(PathBuf, AudioArc)> = missing
            .par_iter()
            .filter_map(|path| match load_sample(path, sample_rate) {
                Ok(audio) => Some((path.to_path_buf(), audio)),
                Err(e) => {
                    tracing::debug!("preload skipped: {e}");
                    None
                }
            })
            .collect();

        let count = loaded.len();
        for (path, audio) in loaded {
            self.entries.insert((path, sample_rate), audio);
        }
        count
    }
}

/// Decode `path` and convert it to `sample_rate`, bypassing any cache.
pub fn load_sample(path: &Path, sample_rate: u32) -> Result<AudioArc, SampleError> {
    let buffer = decode_file(path)?;
    AudioArc::from_audio_buffer(buffer)
        .resample(sample_rate)
        .map_err(|source| SampleError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Turns track selections into playable PCM at one fixed sample rate.
///
/// The live scheduler and the offline renderer each own one of these, so
/// they never share decode state.
#[derive(Debug)]
pub struct SampleResolver {
    library: SampleLibrary,
    cache: AudioCache,
    sample_rate: u32,
}

impl SampleResolver {
    pub fn new(library: SampleLibrary, sample_rate: u32) -> Self {
        Self {
            library,
            cache: AudioCache::new(),
            sample_rate,
        }
    }

    pub fn library(&self) -> &SampleLibrary {
        &self.library
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The sample a DrumPad track fires on each set step.
    pub fn resolve_drum_sample(&mut self, track: &Track) -> Result<AudioArc, SampleError> {
        let path = self
            .library
            .drum_sample_path(&track.sample)
            .ok_or_else(|| SampleError::NoSelection(track.name.clone()))?;
        self.cache.get_or_load(&path, self.sample_rate)
    }

    /// The per-note sample for piano-roll `row` in `instrument_folder`.
    pub fn resolve_piano_sample(
        &mut self,
        row: u8,
        instrument_folder: &str,
    ) -> Result<AudioArc, SampleError> {
        let path = self.library.piano_sample_path(instrument_folder, row);
        self.cache.get_or_load(&path, self.sample_rate)
    }

    /// Decode every sample an audible track of `pattern` can trigger.
    ///
    /// PianoRoll tracks are included only when `include_piano_roll` is set.
    pub fn preload(&mut self, pattern: &Pattern, include_piano_roll: bool) -> usize {
        let mut paths = Vec::new();
        for track in pattern.tracks().iter().filter(|t| !t.muted) {
            match track.mode {
                InstrumentMode::DrumPad => {
                    if track.active_steps().next().is_some() {
                        paths.extend(self.library.drum_sample_path(&track.sample));
                    }
                }
                InstrumentMode::PianoRoll if include_piano_roll => {
                    for note in track.notes() {
                        paths.push(self.library.piano_sample_path(&track.sample.folder, note.pitch));
                    }
                }
                InstrumentMode::PianoRoll => {}
            }
        }
        paths.sort();
        paths.dedup();
        self.cache.preload(&paths, self.sample_rate)
    }
}
