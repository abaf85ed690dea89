//! Real-time output for triggered samples.
//!
//! The scheduler hands samples to [`EngineTriggers::play_now`]; they cross
//! into the device callback through a lock-free ring as `basedrop::Shared`
//! handles, so the callback never allocates or frees. Finished voices are
//! reclaimed on the host side by [`AudioEngineHandle::collect`].

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use seq_transport::{AudioArc, TriggerSink};

/// Voices that can sound at once. Triggers beyond this are dropped.
pub const MAX_VOICES: usize = 32;

const TRIGGER_QUEUE_LEN: usize = 256;

pub enum Command {
    Trigger(Shared<AudioArc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A trigger arrived while every voice was busy.
    VoiceDropped,
}

struct Voice {
    audio: Shared<AudioArc>,
    frame: usize,
}

/// Fixed pool of sample voices summed into output frames.
pub struct VoiceMixer {
    voices: Vec<Option<Voice>>,
}

impl Default for VoiceMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceMixer {
    pub fn new() -> Self {
        Self {
            voices: (0..MAX_VOICES).map(|_| None).collect(),
        }
    }

    /// Start a voice. Returns `false` if the pool is full.
    pub fn trigger(&mut self, audio: Shared<AudioArc>) -> bool {
        if audio.is_empty() {
            return true;
        }
        match self.voices.iter_mut().find(|v| v.is_none()) {
            Some(slot) => {
                *slot = Some(Voice { audio, frame: 0 });
                true
            }
            None => false,
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }

    /// Sum one frame of every voice into `out` (one entry per channel) and
    /// advance them.
    pub fn mix_frame(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for slot in &mut self.voices {
            let Some(voice) = slot else {
                continue;
            };

            let channels = voice.audio.channels() as usize;
            let samples = voice.audio.samples();
            let base = voice.frame * channels;
            for (ch, sample) in out.iter_mut().enumerate() {
                *sample += samples[base + ch % channels];
            }

            voice.frame += 1;
            if voice.frame >= voice.audio.frames() {
                *slot = None;
            }
        }
    }
}

/// Host-side half of the running output stream.
pub struct AudioEngineHandle {
    pub status: rtrb::Consumer<Status>,
    pub collector: Collector,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl AudioEngineHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Free voices the callback has finished with and report dropped triggers.
    pub fn collect(&mut self) {
        let mut dropped = 0usize;
        while let Ok(status) = self.status.pop() {
            match status {
                Status::VoiceDropped => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "voice pool full, triggers dropped");
        }
        self.collector.collect();
    }
}

/// Sending half used by the scheduler. Safe to move to the timer thread.
pub struct EngineTriggers {
    commands: rtrb::Producer<Command>,
    handle: Handle,
    sample_rate: u32,
}

impl TriggerSink for EngineTriggers {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play_now(&mut self, audio: AudioArc) {
        let shared = Shared::new(&self.handle, audio);
        if self.commands.push(Command::Trigger(shared)).is_err() {
            tracing::warn!("trigger queue full, dropping trigger");
        }
    }
}

/// Open the default output device and start streaming.
pub fn start() -> anyhow::Result<(AudioEngineHandle, EngineTriggers)> {
    let collector = Collector::new();
    let handle = collector.handle();

    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(TRIGGER_QUEUE_LEN);
    let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(64);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, command_rx, status_tx)?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, command_rx, status_tx)?
        }
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;

    tracing::info!(
        device = device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        "audio output started"
    );

    Ok((
        AudioEngineHandle {
            status: status_rx,
            collector,
            sample_rate,
            channels,
            _stream: stream,
        },
        EngineTriggers {
            commands: command_tx,
            handle,
            sample_rate,
        },
    ))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut command_rx: rtrb::Consumer<Command>,
    mut status_tx: rtrb::Producer<Status>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;
    let mut mixer = VoiceMixer::new();
    let mut mixed = vec![0.0f32; output_channels];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            while let Ok(cmd) = command_rx.pop() {
                match cmd {
                    Command::Trigger(audio) => {
                        if !mixer.trigger(audio) {
                            let _ = status_tx.push(Status::VoiceDropped);
                        }
                    }
                }
            }

            for frame in data.chunks_mut(output_channels) {
                mixer.mix_frame(&mut mixed);
                for (sample, value) in frame.iter_mut().zip(&mixed) {
                    *sample = T::from_sample(*value);
                }
            }
        },
        |err| tracing::error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
