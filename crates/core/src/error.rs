use seq_render::RenderError;
use seq_transport::{PatternError, TempoError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidTempo(#[from] TempoError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("no audio output is attached to this session")]
    NoOutput,

    #[error("audio output failed: {0}")]
    Audio(anyhow::Error),
}
