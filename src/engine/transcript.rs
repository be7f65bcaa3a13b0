//! Append-only output log and line classification.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    System,
    EchoInput,
    ProgramOutput,
    Error,
    Success,
    Debug,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineKind::System => "system",
            LineKind::EchoInput => "echo-input",
            LineKind::ProgramOutput => "program-output",
            LineKind::Error => "error",
            LineKind::Success => "success",
            LineKind::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// Classify a raw line by prefix and substring.
pub fn classify(text: &str) -> LineKind {
    if text.starts_with("//") {
        LineKind::Debug
    } else if text.contains("Error") || text.contains("error") {
        LineKind::Error
    } else if text.contains("completed successfully") {
        LineKind::Success
    } else if text.starts_with('>') {
        LineKind::System
    } else {
        LineKind::ProgramOutput
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputLine {
    /// Arrival number, strictly increasing for the lifetime of the transcript.
    pub seq: u64,
    pub text: String,
    /// Kind assigned by the engine; `None` falls back to [`classify`].
    pub kind: Option<LineKind>,
}

impl OutputLine {
    pub fn effective_kind(&self) -> LineKind {
        self.kind.unwrap_or_else(|| classify(&self.text))
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<OutputLine>,
    next_seq: u64,
    epoch: u64,
    mirror: bool,
}

impl Transcript {
    pub fn new(mirror: bool) -> Self {
        Self { mirror, ..Self::default() }
    }

    pub fn append(&mut self, text: impl Into<String>, kind: Option<LineKind>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let line = OutputLine { seq, text: text.into(), kind };
        if self.mirror {
            tracing::debug!(target: "promptrun::transcript", seq, kind = %line.effective_kind(), "{}", line.text);
        }
        self.lines.push(line);
        seq
    }

    pub fn push(&mut self, kind: LineKind, text: impl Into<String>) -> u64 {
        self.append(text, Some(kind))
    }

    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    /// Drop every line and start a new epoch. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.epoch += 1;
    }
}

/// Incremental reader over a [`Transcript`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptCursor {
    epoch: u64,
    index: usize,
}

#[derive(Debug)]
pub struct CursorRead<'a> {
    /// The transcript was cleared since the previous read.
    pub reset: bool,
    pub lines: &'a [OutputLine],
}

impl TranscriptCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<'a>(&mut self, transcript: &'a Transcript) -> CursorRead<'a> {
        let reset = self.epoch != transcript.epoch;
        if reset {
            self.epoch = transcript.epoch;
            self.index = 0;
        }
        let start = self.index.min(transcript.lines.len());
        self.index = transcript.lines.len();
        CursorRead { reset, lines: &transcript.lines[start..] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_prefix_and_substring() {
        assert_eq!(classify("// Output cleared"), LineKind::Debug);
        assert_eq!(classify("TypeError: boom"), LineKind::Error);
        assert_eq!(classify("an error happened"), LineKind::Error);
        assert_eq!(classify("Program completed successfully"), LineKind::Success);
        assert_eq!(classify("> ready"), LineKind::System);
        assert_eq!(classify("hello"), LineKind::ProgramOutput);
    }

    #[test]
    fn stored_kind_takes_precedence() {
        let line = OutputLine { seq: 0, text: "Error in input".into(), kind: Some(LineKind::ProgramOutput) };
        assert_eq!(line.effective_kind(), LineKind::ProgramOutput);
    }

    #[test]
    fn cursor_reads_incrementally_and_detects_reset() {
        let mut transcript = Transcript::new(false);
        let mut cursor = TranscriptCursor::new();
        transcript.push(LineKind::System, "a");
        transcript.push(LineKind::ProgramOutput, "b");

        let read = cursor.read(&transcript);
        assert!(!read.reset);
        assert_eq!(read.lines.len(), 2);
        assert!(cursor.read(&transcript).lines.is_empty());

        transcript.clear();
        transcript.push(LineKind::Debug, "c");
        let read = cursor.read(&transcript);
        assert!(read.reset);
        assert_eq!(read.lines.len(), 1);
        assert_eq!(read.lines[0].text, "c");
        assert_eq!(read.lines[0].seq, 2);
    }
}
