//! The pattern store: tracks, their step grids and piano-roll notes.
//!
//! Both playback paths only ever read a [`Pattern`]; all mutation goes
//! through the methods here so the note invariants hold at every point.

use crate::time::STEP_COUNT;

/// Rows in the piano roll: a full 88-key piano, A0 through C8.
pub const PITCH_ROWS: u8 = 88;

/// MIDI number of piano-roll row 0.
pub const HIGHEST_MIDI_NOTE: u8 = 108;

/// MIDI note number for a piano-roll row (row 0 is C8, rows descend).
pub fn row_to_midi(row: u8) -> u8 {
    HIGHEST_MIDI_NOTE.saturating_sub(row)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentMode {
    #[default]
    DrumPad,
    PianoRoll,
}

/// Which sample a track plays.
///
/// DrumPad tracks play `folder/file`. PianoRoll tracks only use `folder`,
/// which holds one file per note (`c4.wav`, `c#4.wav`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampleSelector {
    pub folder: String,
    pub file: Option<String>,
}

impl SampleSelector {
    pub fn new(folder: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file: Some(file.into()),
        }
    }

    pub fn folder(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(pub u64);

/// A held note on one piano-roll row, covering columns `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteInterval {
    pub id: NoteId,
    pub pitch: u8,
    pub start: usize,
    pub end: usize,
}

impl NoteInterval {
    pub fn covers(&self, col: usize) -> bool {
        self.start <= col && col <= self.end
    }

    pub fn overlaps(&self, pitch: u8, start: usize, end: usize) -> bool {
        self.pitch == pitch && start <= self.end && end >= self.start
    }

    pub fn len_steps(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Edge of a note being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEdge {
    Start,
    End,
}

/// Result of a piano-roll edit. A rejected edit changed nothing.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied(NoteId),
    Rejected,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }

    pub fn note_id(&self) -> Option<NoteId> {
        match self {
            EditOutcome::Applied(id) => Some(*id),
            EditOutcome::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("no track at index {0}")]
    NoSuchTrack(usize),

    #[error("step {0} is outside the grid")]
    StepOutOfRange(usize),

    #[error("pitch row {0} is outside the piano roll")]
    PitchOutOfRange(u8),

    #[error("no note with id {0:?}")]
    NoSuchNote(NoteId),
}

#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub mode: InstrumentMode,
    pub sample: SampleSelector,
    pub muted: bool,
    steps: [bool; STEP_COUNT],
    /// Never contains two overlapping intervals on the same pitch.
    notes: Vec<NoteInterval>,
    next_note_id: u64,
}

impl Track {
    pub fn new(name: impl Into<String>, sample: SampleSelector) -> Self {
        Self {
            name: name.into(),
            mode: InstrumentMode::DrumPad,
            sample,
            muted: false,
            steps: [false; STEP_COUNT],
            notes: Vec::new(),
            next_note_id: 0,
        }
    }

    pub fn piano_roll(name: impl Into<String>, instrument_folder: impl Into<String>) -> Self {
        let mut track = Self::new(name, SampleSelector::folder(instrument_folder));
        track.mode = InstrumentMode::PianoRoll;
        track
    }

    pub fn is_piano_roll(&self) -> bool {
        self.mode == InstrumentMode::PianoRoll
    }

    pub fn steps(&self) -> &[bool; STEP_COUNT] {
        &self.steps
    }

    pub fn notes(&self) -> &[NoteInterval] {
        &self.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&NoteInterval> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn is_step_set(&self, col: usize) -> bool {
        self.steps.get(col).copied().unwrap_or(false)
    }

    pub fn toggle_step(&mut self, col: usize) -> Result<(), PatternError> {
        let step = self
            .steps
            .get_mut(col)
            .ok_or(PatternError::StepOutOfRange(col))?;
        *step = !*step;
        Ok(())
    }

    pub fn set_step(&mut self, col: usize, on: bool) -> Result<(), PatternError> {
        let step = self
            .steps
            .get_mut(col)
            .ok_or(PatternError::StepOutOfRange(col))?;
        *step = on;
        Ok(())
    }

    pub fn clear_steps(&mut self) {
        self.steps = [false; STEP_COUNT];
    }

    /// Columns with a set step, in order.
    pub fn active_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(col, on)| on.then_some(col))
    }

    /// The note on `pitch` covering `col`, if any.
    pub fn note_at(&self, pitch: u8, col: usize) -> Option<&NoteInterval> {
        self.notes.iter().find(|n| n.pitch == pitch && n.covers(col))
    }

    /// Place a one-step note at `col`. Rejected if the cell is already taken.
    pub fn add_note(&mut self, pitch: u8, col: usize) -> Result<EditOutcome, PatternError> {
        self.add_note_span(pitch, col, col)
    }

    /// Place a note covering `start..=end`. Rejected on overlap.
    pub fn add_note_span(
        &mut self,
        pitch: u8,
        start: usize,
        end: usize,
    ) -> Result<EditOutcome, PatternError> {
        check_pitch(pitch)?;
        check_col(start)?;
        check_col(end)?;
        let (start, end) = (start.min(end), start.max(end));

        if self.has_overlap(pitch, start, end, None) {
            return Ok(EditOutcome::Rejected);
        }

        let id = NoteId(self.next_note_id);
        self.next_note_id += 1;
        self.notes.push(NoteInterval {
            id,
            pitch,
            start,
            end,
        });
        Ok(EditOutcome::Applied(id))
    }

    /// Drag one edge of a note to `col`.
    ///
    /// The dragged start edge is clamped to the note's end and the dragged
    /// end edge to its start, so the other edge never moves. An update that
    /// would run into a neighbour on the same row is rejected.
    pub fn resize_note(
        &mut self,
        id: NoteId,
        edge: NoteEdge,
        col: usize,
    ) -> Result<EditOutcome, PatternError> {
        check_col(col)?;
        let note = *self.note(id).ok_or(PatternError::NoSuchNote(id))?;

        let (start, end) = match edge {
            NoteEdge::Start => (col.min(note.end), note.end),
            NoteEdge::End => (note.start, col.max(note.start)),
        };

        if self.has_overlap(note.pitch, start, end, Some(id)) {
            return Ok(EditOutcome::Rejected);
        }

        if let Some(n) = self.notes.iter_mut().find(|n| n.id == id) {
            n.start = start;
            n.end = end;
        }
        Ok(EditOutcome::Applied(id))
    }

    /// Move a whole note to a new row and start column, keeping its length.
    pub fn move_note(
        &mut self,
        id: NoteId,
        pitch: u8,
        start: usize,
    ) -> Result<EditOutcome, PatternError> {
        check_pitch(pitch)?;
        check_col(start)?;
        let note = *self.note(id).ok_or(PatternError::NoSuchNote(id))?;

        let end = start + note.len_steps() - 1;
        if end >= STEP_COUNT || self.has_overlap(pitch, start, end, Some(id)) {
            return Ok(EditOutcome::Rejected);
        }

        if let Some(n) = self.notes.iter_mut().find(|n| n.id == id) {
            n.pitch = pitch;
            n.start = start;
            n.end = end;
        }
        Ok(EditOutcome::Applied(id))
    }

    /// Delete every note on `pitch` that covers `col`. Returns how many went.
    pub fn remove_notes_at(&mut self, pitch: u8, col: usize) -> usize {
        let before = self.notes.len();
        self.notes.retain(|n| !(n.pitch == pitch && n.covers(col)));
        before - self.notes.len()
    }

    pub fn clear_notes(&mut self) {
        self.notes.clear();
    }

    /// Notes that begin exactly at `col`.
    pub fn notes_starting_at(&self, col: usize) -> impl Iterator<Item = &NoteInterval> + '_ {
        self.notes.iter().filter(move |n| n.start == col)
    }

    fn has_overlap(&self, pitch: u8, start: usize, end: usize, exclude: Option<NoteId>) -> bool {
        self.notes
            .iter()
            .filter(|n| Some(n.id) != exclude)
            .any(|n| n.overlaps(pitch, start, end))
    }
}

fn check_col(col: usize) -> Result<(), PatternError> {
    if col < STEP_COUNT {
        Ok(())
    } else {
        Err(PatternError::StepOutOfRange(col))
    }
}

fn check_pitch(pitch: u8) -> Result<(), PatternError> {
    if pitch < PITCH_ROWS {
        Ok(())
    } else {
        Err(PatternError::PitchOutOfRange(pitch))
    }
}

/// All tracks of the session, addressed by index.
///
/// Indices shift down when a track is removed.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    tracks: Vec<Track>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Result<&Track, PatternError> {
        self.tracks.get(index).ok_or(PatternError::NoSuchTrack(index))
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track, PatternError> {
        self.tracks
            .get_mut(index)
            .ok_or(PatternError::NoSuchTrack(index))
    }

    /// Append a track and return its index.
    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn remove_track(&mut self, index: usize) -> Result<Track, PatternError> {
        if index >= self.tracks.len() {
            return Err(PatternError::NoSuchTrack(index));
        }
        Ok(self.tracks.remove(index))
    }

    pub fn set_muted(&mut self, index: usize, muted: bool) -> Result<(), PatternError> {
        self.track_mut(index)?.muted = muted;
        Ok(())
    }

    pub fn set_instrument_mode(
        &mut self,
        index: usize,
        mode: InstrumentMode,
    ) -> Result<(), PatternError> {
        self.track_mut(index)?.mode = mode;
        Ok(())
    }

    pub fn set_sample(&mut self, index: usize, sample: SampleSelector) -> Result<(), PatternError> {
        self.track_mut(index)?.sample = sample;
        Ok(())
    }

    pub fn toggle_step(&mut self, index: usize, col: usize) -> Result<(), PatternError> {
        self.track_mut(index)?.toggle_step(col)
    }

    pub fn add_note(
        &mut self,
        index: usize,
        pitch: u8,
        col: usize,
    ) -> Result<EditOutcome, PatternError> {
        self.track_mut(index)?.add_note(pitch, col)
    }

    pub fn resize_note(
        &mut self,
        index: usize,
        id: NoteId,
        edge: NoteEdge,
        col: usize,
    ) -> Result<EditOutcome, PatternError> {
        self.track_mut(index)?.resize_note(id, edge, col)
    }

    pub fn move_note(
        &mut self,
        index: usize,
        id: NoteId,
        pitch: u8,
        start: usize,
    ) -> Result<EditOutcome, PatternError> {
        self.track_mut(index)?.move_note(id, pitch, start)
    }

    pub fn remove_notes_at(
        &mut self,
        index: usize,
        pitch: u8,
        col: usize,
    ) -> Result<usize, PatternError> {
        Ok(self.track_mut(index)?.remove_notes_at(pitch, col))
    }
}
