//! History entries as returned by the external history/groups API.
//!
//! Audio notes are stored as plain strings carrying an `[AUDIO: <filename>]`
//! marker; display layers resolve the filename to a downloadable resource.

use std::fmt;

const MARKER_OPEN: &str = "[audio:";

/// One entry of a conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    Text(String),
    Audio(AudioAttachment),
}

impl HistoryEntry {
    /// Classify an entry. The tag is matched case-insensitively; a marker
    /// with an empty filename is treated as text.
    pub fn parse(entry: &str) -> Self {
        match AudioAttachment::find(entry) {
            Some(attachment) => Self::Audio(attachment),
            None => Self::Text(entry.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    pub filename: String,
}

impl AudioAttachment {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    /// First marker found in `entry`, if any.
    pub fn find(entry: &str) -> Option<Self> {
        // ASCII lowercasing keeps byte offsets aligned with `entry`.
        let lowered = entry.to_ascii_lowercase();
        let mut search_from = 0;
        while let Some(pos) = lowered[search_from..].find(MARKER_OPEN) {
            let start = search_from + pos + MARKER_OPEN.len();
            let end = start + entry[start..].find(']')?;
            let filename = entry[start..end].trim();
            if !filename.is_empty() {
                return Some(Self::new(filename));
            }
            search_from = end;
        }
        None
    }

    /// The marker text stored in history for this attachment.
    pub fn marker(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AudioAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[AUDIO: {}]", self.filename)
    }
}
