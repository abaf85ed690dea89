//! Note naming for per-note instrument samples.
//!
//! An instrument folder holds one file per key, named after the note in
//! lower case: `a0.wav`, `c#4.wav`, `c8.wav`. Playback and export both go
//! through [`piano_sample_file_name`] so they always load the same file.

use seq_transport::row_to_midi;

const NOTE_NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// `60` -> `"c4"`, `61` -> `"c#4"`, `108` -> `"c8"`.
pub fn midi_to_note_name(midi: u8) -> String {
    let name = NOTE_NAMES[(midi % 12) as usize];
    let octave = midi as i32 / 12 - 1;
    format!("{name}{octave}")
}

/// File name of the sample for a piano-roll row.
pub fn piano_sample_file_name(row: u8) -> String {
    format!("{}.wav", midi_to_note_name(row_to_midi(row)))
}
