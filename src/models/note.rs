use serde::{Deserialize, Serialize};

/// Terminal state a note can be linked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteState {
    Skipped,
    Aborted,
}

impl NoteState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "skipped" => Some(Self::Skipped),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// Free text attached to any addressable element of the form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NoteState>,
    pub text: String,
}

/// Prefix of generated note ids
pub const NOTE_ID_PREFIX: &str = "n";

/// Numeric suffix of a note id (`n12` -> 12)
#[must_use]
pub fn note_sequence(id: &str) -> Option<u64> {
    let digits = id.chars().rev().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    id[id.len() - digits..].parse().ok()
}

/// Next note id after the highest suffix currently present, skipping ids already taken
///
/// Derived from the notes alone, so two forms in the same state always hand out the
/// same id. Once the suffix space is exhausted the search wraps around to `n1`.
#[must_use]
pub fn next_note_id(notes: &[Note], is_taken: impl Fn(&str) -> bool) -> String {
    let mut sequence = notes
        .iter()
        .filter_map(|n| note_sequence(&n.id))
        .max()
        .and_then(|max| max.checked_add(1))
        .unwrap_or(1);
    loop {
        let candidate = format!("{NOTE_ID_PREFIX}{sequence}");
        if !is_taken(&candidate) && !notes.iter().any(|n| n.id == candidate) {
            return candidate;
        }
        sequence = sequence.checked_add(1).unwrap_or(1);
    }
}

/// Order notes by id suffix; notes without one keep their relative order at the end
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by_key(|n| note_sequence(&n.id).unwrap_or(u64::MAX));
}
