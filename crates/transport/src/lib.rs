mod audio;
mod pattern;
mod time;

pub use audio::{AudioArc, AudioBuffer, resample_audio_arc};
pub use pattern::{
    EditOutcome, HIGHEST_MIDI_NOTE, InstrumentMode, NoteEdge, NoteId, NoteInterval, PITCH_ROWS,
    Pattern, PatternError, SampleSelector, Track, row_to_midi,
};
pub use time::{
    NOTE_TAIL_MS, STEP_COUNT, STEPS_PER_BEAT, Tempo, TempoError, ms_to_frames, step_duration_ms,
};

/// Real-time "play now" capability.
///
/// Implementations must not block: the live scheduler calls `play_now` from
/// inside a timer tick and expects it to return immediately. Triggers are
/// fire-and-forget and may layer on top of one another.
pub trait TriggerSink: Send {
    /// Sample rate the sink expects triggered audio to be in.
    fn sample_rate(&self) -> u32;

    /// Start playing `audio` immediately.
    fn play_now(&mut self, audio: AudioArc);
}
