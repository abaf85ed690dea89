use std::path::{Path, PathBuf};

use seq_decode::{SampleLibrary, SampleResolver};
use seq_engine::AudioEngineHandle;
use seq_transport::{Pattern, Tempo, TriggerSink};

use crate::config::Settings;
use crate::error::SessionError;
use crate::scheduler::{LiveScheduler, PlaybackEvent, PlaybackSnapshot, PlaybackState};

/// One editing session: the pattern, its tempo, live playback and export.
pub struct Session {
    pattern: Pattern,
    settings: Settings,
    library: SampleLibrary,
    bpm: i64,
    scheduler: Option<LiveScheduler>,
    engine: Option<AudioEngineHandle>,
    current_step: Option<usize>,
}

impl Session {
    /// A session without audio output. Export works, playback does not.
    pub fn new(pattern: Pattern, settings: Settings) -> Self {
        Self {
            library: settings.library(),
            bpm: settings.bpm,
            pattern,
            settings,
            scheduler: None,
            engine: None,
            current_step: None,
        }
    }

    pub fn from_settings(settings: Settings) -> Result<Self, SessionError> {
        let pattern = settings.build_pattern()?;
        Ok(Self::new(pattern, settings))
    }

    /// Route live playback to `sink`.
    pub fn with_sink(mut self, sink: Box<dyn TriggerSink>) -> Self {
        self.stop();
        self.scheduler = Some(LiveScheduler::new(sink));
        self
    }

    /// Open the default audio device and play through it.
    pub fn open_audio_output(&mut self) -> Result<(), SessionError> {
        self.stop();
        let (engine, triggers) = seq_engine::start().map_err(SessionError::Audio)?;
        self.scheduler = Some(LiveScheduler::new(Box::new(triggers)));
        self.engine = Some(engine);
        Ok(())
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.pattern
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn library(&self) -> &SampleLibrary {
        &self.library
    }

    /// The tempo as entered. Only checked when playback or export starts.
    pub fn bpm(&self) -> i64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: i64) {
        self.bpm = bpm;
    }

    /// Take a tempo typed by the user. On error the previous value is kept.
    pub fn set_bpm_text(&mut self, text: &str) -> Result<Tempo, SessionError> {
        let tempo = Tempo::parse(text)?;
        self.bpm = i64::from(tempo.bpm());
        Ok(tempo)
    }

    pub fn set_bars(&mut self, bars: i64) {
        self.settings.bars = bars;
    }

    pub fn set_include_piano_roll(&mut self, include: bool) {
        self.settings.include_piano_roll = include;
    }

    /// Start looping the pattern from step 0.
    ///
    /// The pattern is copied at this point; later edits are heard after the
    /// next stop and play. Calling this while playing does nothing.
    pub fn play(&mut self) -> Result<(), SessionError> {
        let scheduler = self.scheduler.as_mut().ok_or(SessionError::NoOutput)?;
        if scheduler.state().is_playing() {
            return Ok(());
        }

        let tempo = Tempo::new(self.bpm)?;
        let mut resolver = SampleResolver::new(self.library.clone(), scheduler.sample_rate());
        let snapshot = PlaybackSnapshot::build(&self.pattern, tempo, &mut resolver);
        if snapshot.is_silent() {
            tracing::info!("nothing to play yet, starting anyway");
        }

        scheduler.start(snapshot)?;
        self.current_step = Some(0);
        tracing::info!(%tempo, tracks = self.pattern.len(), "playback started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut()
            && scheduler.stop()
        {
            tracing::info!("playback stopped");
        }
        self.current_step = None;
    }

    /// Drain playback events. Returns the newest step if the cursor moved.
    pub fn poll(&mut self) -> Option<usize> {
        if let Some(engine) = self.engine.as_mut() {
            engine.collect();
        }

        let scheduler = self.scheduler.as_ref()?;
        let mut moved = None;
        while let Ok(event) = scheduler.events().try_recv() {
            match event {
                PlaybackEvent::Step(col) => moved = Some(col),
            }
        }
        if moved.is_some() && scheduler.state().is_playing() {
            self.current_step = moved;
        }
        moved
    }

    /// Column to highlight, `None` when stopped.
    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.scheduler
            .as_ref()
            .map_or(PlaybackState::Stopped, LiveScheduler::state)
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state().is_playing()
    }

    /// Render to the configured output directory and file name.
    pub fn export(&self) -> Result<PathBuf, SessionError> {
        let dir = self.settings.output_dir.clone();
        let filename = self.settings.output_filename.clone();
        self.export_to(&dir, &filename)
    }

    pub fn export_to(&self, output_dir: &Path, filename: &str) -> Result<PathBuf, SessionError> {
        let path = seq_render::export(
            &self.pattern,
            self.bpm,
            self.settings.bars,
            &self.library,
            &self.settings.render_options(),
            output_dir,
            filename,
        )?;
        Ok(path)
    }

    pub fn list_folders(&self) -> anyhow::Result<Vec<String>> {
        self.library.list_folders()
    }

    pub fn list_files(&self, folder: &str) -> anyhow::Result<Vec<String>> {
        self.library.list_files(folder)
    }
}
