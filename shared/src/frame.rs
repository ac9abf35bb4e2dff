/// One message on the wire: a run of non-blank `KEY:VALUE` lines.
///
/// Raw lines are kept in order because the state snapshot carries sections
/// (`PLAYERS_START` .. `PLAYERS_END`) whose lines are not plain key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    lines: Vec<String>,
}

impl Frame {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Trimmed value of the first line whose key matches.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .filter_map(|line| split_key_value(line))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Like [`Frame::get`] but treats a blank value as absent.
    pub fn get_non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn message_type(&self) -> Option<&str> {
        self.get("TYPE")
    }

    /// Wire text without the terminating blank line.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Splits `KEY:VALUE` at the first colon. Lines without a key are not pairs.
pub fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    if idx == 0 {
        return None;
    }
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[idx + 1..].trim()))
}

/// Collects incoming text lines into frames.
///
/// A blank line terminates the frame being built. Blank lines that arrive
/// while nothing is buffered are skipped.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    current: Frame,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            if self.current.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.current));
        }
        self.current.push(line);
        None
    }

    /// Flushes whatever was buffered when the stream ended.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }

    pub fn has_partial(&self) -> bool {
        !self.current.is_empty()
    }
}

/// Parses a complete text block into its first frame, if it has one.
pub fn parse_frame(block: &str) -> Option<Frame> {
    let mut assembler = FrameAssembler::new();
    for line in block.lines() {
        if let Some(frame) = assembler.push_line(line) {
            return Some(frame);
        }
    }
    assembler.finish()
}
