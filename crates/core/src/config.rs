use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use seq_decode::{DEFAULT_SOUNDS_DIR, SampleLibrary};
use seq_render::RenderOptions;
use seq_transport::{InstrumentMode, Pattern, SampleSelector, Track};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sounds_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_filename: String,
    pub bpm: i64,
    pub bars: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub include_piano_roll: bool,
    pub tracks: Vec<TrackPreset>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sounds_dir: PathBuf::from(DEFAULT_SOUNDS_DIR),
            output_dir: PathBuf::from("zoutputs"),
            output_filename: "test.wav".to_string(),
            bpm: 120,
            bars: 4,
            sample_rate: 44100,
            channels: 2,
            include_piano_roll: false,
            tracks: vec![
                TrackPreset::drum("Kick", "kicks", "basicKick.wav"),
                TrackPreset::drum("Snare", "claps", "snap.wav"),
                TrackPreset::drum("Hat", "hats", "highhat.wav"),
                TrackPreset::drum("Misc", "misc", "juiceknock.wav"),
                TrackPreset::drum("Misc", "misc", "juiceknock.wav"),
            ],
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stepseq").join("config.toml"))
    }

    /// Load from the user config directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), "ignoring invalid config: {err:#}");
                Self::default()
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), "could not read config: {err}");
                Self::default()
            }
        }
    }

    /// Load an explicitly named file. Any failure is an error.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject output formats no WAV file can have.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.sample_rate > 0, "sample_rate must be greater than zero");
        anyhow::ensure!(self.channels > 0, "channels must be greater than zero");
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().context("no config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn library(&self) -> SampleLibrary {
        SampleLibrary::new(&self.sounds_dir)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            sample_rate: self.sample_rate,
            channels: self.channels,
            include_piano_roll: self.include_piano_roll,
        }
    }

    /// The pattern the presets describe.
    pub fn build_pattern(&self) -> Result<Pattern, SessionError> {
        let tracks = self
            .tracks
            .iter()
            .map(TrackPreset::to_track)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Pattern::from_tracks(tracks))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetMode {
    #[default]
    DrumPad,
    PianoRoll,
}

impl From<PresetMode> for InstrumentMode {
    fn from(mode: PresetMode) -> Self {
        match mode {
            PresetMode::DrumPad => InstrumentMode::DrumPad,
            PresetMode::PianoRoll => InstrumentMode::PianoRoll,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePreset {
    pub pitch: u8,
    pub start: usize,
    pub end: usize,
}

/// Starting state of one track.
///
/// `steps` is written as text, one character per column: `x` is on, `.` or
/// `-` is off. Spaces and `|` can be used to group bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPreset {
    pub name: String,
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub mode: PresetMode,
    #[serde(default)]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub steps: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<NotePreset>,
}

impl TrackPreset {
    pub fn drum(name: &str, folder: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            folder: folder.to_string(),
            file: Some(file.to_string()),
            mode: PresetMode::DrumPad,
            muted: false,
            steps: String::new(),
            notes: Vec::new(),
        }
    }

    pub fn to_track(&self) -> Result<Track, SessionError> {
        let sample = match &self.file {
            Some(file) => SampleSelector::new(&self.folder, file),
            None => SampleSelector::folder(&self.folder),
        };
        let mut track = Track::new(&self.name, sample);
        track.mode = self.mode.into();
        track.muted = self.muted;

        let cells = self
            .steps
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '|');
        for (col, cell) in cells.enumerate() {
            let on = match cell {
                'x' | 'X' => true,
                '.' | '-' => false,
                other => {
                    tracing::warn!(track = %self.name, col, "unknown step character '{other}', treating as off");
                    false
                }
            };
            track.set_step(col, on)?;
        }

        for note in &self.notes {
            if !track.add_note_span(note.pitch, note.start, note.end)?.is_applied() {
                tracing::warn!(
                    track = %self.name,
                    pitch = note.pitch,
                    start = note.start,
                    "overlapping note in preset skipped"
                );
            }
        }
        Ok(track)
    }
}
