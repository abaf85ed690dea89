//! Live playback: a timer thread walks the grid and fires triggers.
//!
//! The pattern is copied into a [`PlaybackSnapshot`] when playback starts, with
//! every sample already decoded, so a tick only looks things up and hands
//! audio to the [`TriggerSink`]. Edits made while playing are heard on the
//! next start.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use seq_decode::SampleResolver;
use seq_transport::{AudioArc, InstrumentMode, Pattern, STEP_COUNT, Tempo, TriggerSink};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Published by the timer thread, drained by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Column `col` has just been triggered.
    Step(usize),
}

struct DrumLane {
    steps: [bool; STEP_COUNT],
    sample: AudioArc,
}

struct NoteTrigger {
    sample: AudioArc,
    length_ms: f64,
}

/// Immutable copy of everything a tick needs.
pub struct PlaybackSnapshot {
    tempo: Tempo,
    drums: Vec<DrumLane>,
    /// Piano-roll notes, indexed by start column.
    notes: Vec<Vec<NoteTrigger>>,
}

impl PlaybackSnapshot {
    /// Resolve the samples of every audible track in `pattern`.
    ///
    /// Tracks or notes whose sample is missing are logged and left out.
    pub fn build(pattern: &Pattern, tempo: Tempo, resolver: &mut SampleResolver) -> Self {
        resolver.preload(pattern, true);

        let mut drums = Vec::new();
        let mut notes: Vec<Vec<NoteTrigger>> = (0..STEP_COUNT).map(|_| Vec::new()).collect();

        for (index, track) in pattern.tracks().iter().enumerate() {
            if track.muted {
                continue;
            }
            match track.mode {
                InstrumentMode::DrumPad => {
                    if track.active_steps().next().is_none() {
                        continue;
                    }
                    match resolver.resolve_drum_sample(track) {
                        Ok(sample) => drums.push(DrumLane {
                            steps: *track.steps(),
                            sample,
                        }),
                        Err(err) => {
                            tracing::warn!(track = index, name = %track.name, "track will be silent: {err}")
                        }
                    }
                }
                InstrumentMode::PianoRoll => {
                    for note in track.notes() {
                        match resolver.resolve_piano_sample(note.pitch, &track.sample.folder) {
                            Ok(sample) => notes[note.start].push(NoteTrigger {
                                sample,
                                length_ms: tempo.note_sample_ms(note.start, note.end),
                            }),
                            Err(err) => {
                                tracing::warn!(track = index, pitch = note.pitch, "note will be silent: {err}")
                            }
                        }
                    }
                }
            }
        }

        Self {
            tempo,
            drums,
            notes,
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Audio to fire when the cursor reaches `col`.
    pub fn triggers_at(&self, col: usize) -> Vec<AudioArc> {
        let mut out: Vec<AudioArc> = self
            .drums
            .iter()
            .filter(|lane| lane.steps[col])
            .map(|lane| lane.sample.clone())
            .collect();

        if let Some(notes) = self.notes.get(col) {
            out.extend(notes.iter().map(|n| n.sample.slice_ms(n.length_ms)));
        }
        out
    }

    pub fn is_silent(&self) -> bool {
        self.drums.is_empty() && self.notes.iter().all(Vec::is_empty)
    }
}

/// Walks the snapshot one column per tick.
struct StepClock {
    snapshot: PlaybackSnapshot,
    cursor: usize,
}

impl StepClock {
    fn new(snapshot: PlaybackSnapshot) -> Self {
        Self {
            snapshot,
            cursor: 0,
        }
    }

    /// Fire the current column and advance. Returns the column fired.
    fn tick(&mut self, sink: &mut dyn TriggerSink) -> usize {
        let col = self.cursor;
        for audio in self.snapshot.triggers_at(col) {
            sink.play_now(audio);
        }
        self.cursor = (self.cursor + 1) % STEP_COUNT;
        col
    }
}

/// Wall-clock length of one step.
pub fn step_interval(tempo: Tempo) -> Duration {
    Duration::from_secs_f64(tempo.step_duration_ms() / 1000.0)
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<Box<dyn TriggerSink>>,
}

/// Stopped/Playing state machine around the timer thread.
///
/// The sink moves into the thread while playing and comes back on stop.
pub struct LiveScheduler {
    sink: Option<Box<dyn TriggerSink>>,
    worker: Option<Worker>,
    sample_rate: u32,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl LiveScheduler {
    pub fn new(sink: Box<dyn TriggerSink>) -> Self {
        // one loop of cursor positions; older ones are dropped when full
        let (events_tx, events_rx) = crossbeam_channel::bounded(STEP_COUNT);
        Self {
            sample_rate: sink.sample_rate(),
            sink: Some(sink),
            worker: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.worker.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    /// Rate the sink wants its audio in.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn events(&self) -> &Receiver<PlaybackEvent> {
        &self.events_rx
    }

    /// Begin ticking from column 0. Does nothing if already playing.
    pub fn start(&mut self, snapshot: PlaybackSnapshot) -> Result<(), SessionError> {
        if self.worker.is_some() {
            tracing::debug!("start ignored, already playing");
            return Ok(());
        }
        let mut sink = self.sink.take().ok_or_else(|| {
            SessionError::Audio(anyhow::anyhow!("trigger sink was lost by a crashed scheduler"))
        })?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let events = self.events_tx.clone();
        let backlog = self.events_rx.clone();
        let interval = step_interval(snapshot.tempo());
        let clock = StepClock::new(snapshot);

        let handle = thread::spawn(move || {
            run_timer(clock, sink.as_mut(), interval, stop_rx, events, backlog);
            sink
        });

        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Cancel the pending tick. Triggers already fired keep sounding.
    ///
    /// Returns `true` if playback was running.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };

        let _ = worker.stop_tx.send(());
        match worker.handle.join() {
            Ok(sink) => self.sink = Some(sink),
            Err(_) => tracing::error!("scheduler thread panicked"),
        }

        // stale cursor updates from before the stop
        while self.events_rx.try_recv().is_ok() {}
        true
    }
}

impl Drop for LiveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_timer(
    mut clock: StepClock,
    sink: &mut dyn TriggerSink,
    interval: Duration,
    stop_rx: Receiver<()>,
    events: Sender<PlaybackEvent>,
    backlog: Receiver<PlaybackEvent>,
) {
    let started = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        let col = clock.tick(sink);
        publish(&events, &backlog, PlaybackEvent::Step(col));
        tracing::trace!(col, "tick");

        // deadlines are measured from the start so timing does not drift
        ticks += 1;
        let deadline = started + interval.mul_f64(ticks as f64);
        match stop_rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Queue `event` without blocking. A full queue loses its oldest entry.
fn publish(events: &Sender<PlaybackEvent>, backlog: &Receiver<PlaybackEvent>, event: PlaybackEvent) {
    if let Err(TrySendError::Full(event)) = events.try_send(event) {
        let _ = backlog.try_recv();
        let _ = events.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingSink, write_wav};
    use seq_decode::SampleLibrary;
    use seq_transport::{SampleSelector, Track};
    use tempfile::{TempDir, tempdir};

    fn sounds() -> TempDir {
        let dir = tempdir().unwrap();
        write_wav(&dir.path().join("kicks/kick.wav"), 1000, 1, &[16384; 10]);
        write_wav(&dir.path().join("hats/hat.wav"), 1000, 1, &[8192; 4]);
        write_wav(&dir.path().join("synth/c8.wav"), 1000, 1, &[8192; 3000]);
        dir
    }

    fn resolver(dir: &TempDir) -> SampleResolver {
        SampleResolver::new(SampleLibrary::new(dir.path()), 1000)
    }

    fn drum(name: &str, folder: &str, file: &str, steps: &[usize]) -> Track {
        let mut track = Track::new(name, SampleSelector::new(folder, file));
        for &col in steps {
            track.set_step(col, true).unwrap();
        }
        track
    }

    #[test]
    fn test_snapshot_triggers_set_steps() {
        let dir = sounds();
        let pattern = Pattern::from_tracks(vec![
            drum("Kick", "kicks", "kick.wav", &[0, 4]),
            drum("Hat", "hats", "hat.wav", &[4, 6]),
        ]);
        let tempo = Tempo::new(120).unwrap();
        let snapshot = PlaybackSnapshot::build(&pattern, tempo, &mut resolver(&dir));

        assert_eq!(snapshot.triggers_at(0).len(), 1);
        assert_eq!(snapshot.triggers_at(1).len(), 0);
        assert_eq!(snapshot.triggers_at(4).len(), 2);
        assert_eq!(snapshot.triggers_at(6)[0].frames(), 4);
    }

    #[test]
    fn test_snapshot_skips_muted_and_missing() {
        let dir = sounds();
        let mut muted = drum("Kick", "kicks", "kick.wav", &[0]);
        muted.muted = true;
        let pattern = Pattern::from_tracks(vec![
            muted,
            drum("Snare", "claps", "nowhere.wav", &[0]),
            Track::new("Unselected", SampleSelector::folder("claps")),
        ]);
        let snapshot =
            PlaybackSnapshot::build(&pattern, Tempo::new(120).unwrap(), &mut resolver(&dir));
        assert!(snapshot.is_silent());
        assert!(snapshot.triggers_at(0).is_empty());
    }

    #[test]
    fn test_piano_note_sliced_to_duration_plus_tail() {
        let dir = sounds();
        let mut lead = Track::piano_roll("Lead", "synth");
        assert!(lead.add_note_span(0, 2, 5).unwrap().is_applied());
        // no b7.wav in the folder
        assert!(lead.add_note(1, 2).unwrap().is_applied());
        let pattern = Pattern::from_tracks(vec![lead]);

        let snapshot =
            PlaybackSnapshot::build(&pattern, Tempo::new(120).unwrap(), &mut resolver(&dir));
        let fired = snapshot.triggers_at(2);
        assert_eq!(fired.len(), 1);
        // (5 - 2 + 1) * 250 ms + 1000 ms at 1 kHz
        assert_eq!(fired[0].frames(), 2000);
        assert!(snapshot.triggers_at(3).is_empty());
    }

    #[test]
    fn test_clock_wraps_after_last_step() {
        let dir = sounds();
        let pattern = Pattern::from_tracks(vec![drum("Kick", "kicks", "kick.wav", &[0])]);
        let snapshot =
            PlaybackSnapshot::build(&pattern, Tempo::new(120).unwrap(), &mut resolver(&dir));

        let mut sink = RecordingSink::default();
        let mut clock = StepClock::new(snapshot);
        let fired: Vec<usize> = (0..STEP_COUNT + 2).map(|_| clock.tick(&mut sink)).collect();

        assert_eq!(fired[0], 0);
        assert_eq!(fired[STEP_COUNT - 1], STEP_COUNT - 1);
        assert_eq!(fired[STEP_COUNT], 0);
        assert_eq!(fired[STEP_COUNT + 1], 1);
        // column 0 came round twice
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn test_live_offsets_match_render_offsets() {
        for bpm in [60, 97, 120, 174] {
            let tempo = Tempo::new(bpm).unwrap();
            let interval = step_interval(tempo);
            for col in [0, 1, 4, 33, STEP_COUNT - 1] {
                let live_ms = interval.mul_f64(col as f64).as_secs_f64() * 1000.0;
                assert!((live_ms - tempo.step_offset_ms(col)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_start_stop_state_machine() {
        let dir = sounds();
        let pattern = Pattern::from_tracks(vec![drum("Kick", "kicks", "kick.wav", &[0, 1, 2, 3])]);
        // 6000 bpm: 5 ms steps
        let tempo = Tempo::new(6000).unwrap();

        let sink = RecordingSink::default();
        let mut scheduler = LiveScheduler::new(Box::new(sink.clone()));
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        assert!(!scheduler.stop());

        let snapshot = PlaybackSnapshot::build(&pattern, tempo, &mut resolver(&dir));
        scheduler.start(snapshot).unwrap();
        assert!(scheduler.state().is_playing());

        // a second start while playing changes nothing
        let again = PlaybackSnapshot::build(&pattern, tempo, &mut resolver(&dir));
        scheduler.start(again).unwrap();

        let first = scheduler
            .events()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(first, PlaybackEvent::Step(0));
        let second = scheduler
            .events()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(second, PlaybackEvent::Step(1));

        assert!(scheduler.stop());
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        assert!(scheduler.events().try_recv().is_err());

        let fired = sink.count();
        assert!(fired >= 2);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.count(), fired);

        // the sink came back, so playback can resume
        let snapshot = PlaybackSnapshot::build(&pattern, tempo, &mut resolver(&dir));
        scheduler.start(snapshot).unwrap();
        let restart = scheduler
            .events()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(restart, PlaybackEvent::Step(0));
        scheduler.stop();
    }

    #[test]
    fn test_full_event_queue_keeps_newest() {
        let (tx, rx) = crossbeam_channel::bounded(2);
        for col in 0..5 {
            publish(&tx, &rx, PlaybackEvent::Step(col));
        }
        let queued: Vec<_> = rx.try_iter().collect();
        assert_eq!(queued, vec![PlaybackEvent::Step(3), PlaybackEvent::Step(4)]);
    }

    #[test]
    fn test_unpolled_events_stay_bounded() {
        let dir = sounds();
        let pattern = Pattern::from_tracks(vec![drum("Kick", "kicks", "kick.wav", &[0])]);
        let tempo = Tempo::new(6000).unwrap();

        let mut scheduler = LiveScheduler::new(Box::new(RecordingSink::default()));
        let snapshot = PlaybackSnapshot::build(&pattern, tempo, &mut resolver(&dir));
        scheduler.start(snapshot).unwrap();

        // 5 ms steps: well over a full loop goes by without a poll
        std::thread::sleep(Duration::from_millis(500));
        assert!(scheduler.events().len() <= STEP_COUNT);
        assert!(scheduler.state().is_playing());

        assert!(scheduler.stop());
        assert!(scheduler.events().is_empty());
    }
}
