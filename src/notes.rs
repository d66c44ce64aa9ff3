//! Note names, MIDI numbers and frequencies in twelve-tone equal temperament
//! with A4 = 440 Hz.

use serde::Serialize;

pub const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

const NATURAL_NOTES: [&str; 7] = ["C", "D", "E", "F", "G", "A", "B"];

const A4_HZ: f64 = 440.0;
const A4_MIDI: i32 = 69;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    /// e.g. "C4", "F#5"
    pub name: String,
    pub frequency: f64,
    pub midi_number: i32,
}

/// Which notes of a range to keep.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteFilter {
    Chromatic,
    /// White keys only.
    Natural,
    /// Listed notes, in any spelling ("Bb4" matches "A#4").
    Custom(Vec<String>),
}

/// MIDI number of a name like "C4", "A#3" or "Bb5" (single-digit octave).
/// Accidentals may cross the octave boundary, so "Cb4" is B3.
pub fn note_to_midi(name: &str) -> Option<i32> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base = NOTE_NAMES.iter().position(|n| n.len() == 1 && n.starts_with(letter))? as i32;

    let rest: Vec<char> = chars.collect();
    let (shift, octave) = match rest.as_slice() {
        [o] => (0, *o),
        ['#', o] => (1, *o),
        ['b', o] => (-1, *o),
        _ => return None,
    };
    let octave = octave.to_digit(10)? as i32;

    Some((octave + 1) * 12 + base + shift)
}

pub fn midi_to_frequency(midi: i32) -> f64 {
    A4_HZ * 2f64.powf(f64::from(midi - A4_MIDI) / 12.0)
}

/// ```
/// use undercut_fem::notes::note_to_frequency;
///
/// assert_eq!(note_to_frequency("A4"), Some(440.0));
/// assert!(note_to_frequency("H2").is_none());
/// ```
pub fn note_to_frequency(name: &str) -> Option<f64> {
    note_to_midi(name).map(midi_to_frequency)
}

/// Name with sharps, e.g. 61 -> "C#4".
pub fn midi_to_note(midi: i32) -> String {
    let index = midi.rem_euclid(12) as usize;
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[index], octave)
}

/// Nearest note to a frequency in Hz.
pub fn frequency_to_note(frequency: f64) -> String {
    let midi = (f64::from(A4_MIDI) + 12.0 * (frequency / A4_HZ).log2()).round() as i32;
    midi_to_note(midi)
}

/// Notes between two names, inclusive and in either order, lowest first.
/// Unparseable bounds give an empty list.
pub fn generate_notes_in_range(start: &str, end: &str, filter: &NoteFilter) -> Vec<NoteInfo> {
    let (Some(a), Some(b)) = (note_to_midi(start), note_to_midi(end)) else {
        return Vec::new();
    };

    let custom: Vec<i32> = match filter {
        NoteFilter::Custom(names) => names.iter().filter_map(|n| note_to_midi(n.trim())).collect(),
        _ => Vec::new(),
    };

    (a.min(b)..=a.max(b))
        .filter(|&midi| match filter {
            NoteFilter::Chromatic => true,
            NoteFilter::Natural => NATURAL_NOTES.contains(&NOTE_NAMES[midi.rem_euclid(12) as usize]),
            NoteFilter::Custom(_) => custom.contains(&midi),
        })
        .map(|midi| NoteInfo {
            name: midi_to_note(midi),
            frequency: midi_to_frequency(midi),
            midi_number: midi,
        })
        .collect()
}

/// Every note from C2 to B7 that lies in 20 Hz..=4 kHz.
pub fn generate_note_list() -> Vec<NoteInfo> {
    generate_notes_in_range("C2", "B7", &NoteFilter::Chromatic)
        .into_iter()
        .filter(|n| (20.0..=4000.0).contains(&n.frequency))
        .collect()
}

/// Fewer decimals for higher frequencies.
pub fn format_frequency(frequency: f64) -> String {
    if frequency >= 1000.0 {
        format!("{frequency:.1}")
    } else if frequency >= 100.0 {
        format!("{frequency:.2}")
    } else {
        format!("{frequency:.3}")
    }
}

/// Signed error in cents, positive when sharp. 0 for non-positive inputs.
pub fn frequency_error_cents(computed: f64, target: f64) -> f64 {
    if target <= 0.0 || computed <= 0.0 {
        return 0.0;
    }
    1200.0 * (computed / target).log2()
}
