//! Step timing shared by the live scheduler and the offline renderer.
//!
//! Every duration in the engine is derived from [`Tempo::step_duration_ms`],
//! so an exported file lines up with what was heard during playback.

/// Number of steps in one loop of the pattern.
pub const STEP_COUNT: usize = 64;

/// Grid resolution: each step is an eighth note.
pub const STEPS_PER_BEAT: f64 = 2.0;

/// Extra audio kept after a piano-roll note so its release is not cut off.
pub const NOTE_TAIL_MS: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TempoError {
    #[error("invalid tempo: {0} bpm (must be greater than zero)")]
    NonPositive(i64),

    #[error("invalid tempo: '{0}' is not a whole number of beats per minute")]
    NotANumber(String),
}

/// A validated, strictly positive tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tempo(u32);

impl Tempo {
    pub fn new(bpm: i64) -> Result<Self, TempoError> {
        if bpm <= 0 {
            return Err(TempoError::NonPositive(bpm));
        }
        u32::try_from(bpm)
            .map(Self)
            .map_err(|_| TempoError::NotANumber(bpm.to_string()))
    }

    /// Parse a tempo typed by the user, e.g. the contents of a BPM text field.
    pub fn parse(text: &str) -> Result<Self, TempoError> {
        let bpm = text
            .trim()
            .parse::<i64>()
            .map_err(|_| TempoError::NotANumber(text.to_string()))?;
        Self::new(bpm)
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    /// Duration of one step: `60000 / bpm / 2`.
    pub fn step_duration_ms(self) -> f64 {
        60000.0 / self.0 as f64 / STEPS_PER_BEAT
    }

    /// Time from the start of the loop to the beginning of `col`.
    pub fn step_offset_ms(self, col: usize) -> f64 {
        col as f64 * self.step_duration_ms()
    }

    /// Length of one full traversal of the grid.
    pub fn loop_duration_ms(self) -> f64 {
        self.step_duration_ms() * STEP_COUNT as f64
    }

    /// Sounding length of a note spanning `start..=end`.
    pub fn note_duration_ms(self, start: usize, end: usize) -> f64 {
        (end.saturating_sub(start) + 1) as f64 * self.step_duration_ms()
    }

    /// How much of the instrument sample a note plays: its length plus the tail.
    pub fn note_sample_ms(self, start: usize, end: usize) -> f64 {
        self.note_duration_ms(start, end) + NOTE_TAIL_MS
    }
}

impl std::fmt::Display for Tempo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bpm", self.0)
    }
}

/// Step duration for a raw bpm value.
pub fn step_duration_ms(bpm: i64) -> Result<f64, TempoError> {
    Tempo::new(bpm).map(Tempo::step_duration_ms)
}

/// Convert milliseconds to a whole number of frames (truncating).
pub fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    if ms <= 0.0 {
        return 0;
    }
    (ms * sample_rate as f64 / 1000.0) as usize
}
