pub mod config;
pub mod error;
pub mod scheduler;
pub mod session;

pub use config::{NotePreset, PresetMode, Settings, TrackPreset};
pub use error::SessionError;
pub use scheduler::{LiveScheduler, PlaybackEvent, PlaybackSnapshot, PlaybackState, step_interval};
pub use session::Session;

pub use seq_decode::{SampleLibrary, decode_file};
pub use seq_render::{RenderError, RenderOptions, render_pattern};
pub use seq_transport::{
    EditOutcome, InstrumentMode, NoteEdge, NoteId, Pattern, PatternError, STEP_COUNT,
    SampleSelector, Tempo, TempoError, Track, TriggerSink,
};
