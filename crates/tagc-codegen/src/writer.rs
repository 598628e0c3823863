//! Indenting source writer with line-map recording.

use crate::source_map::LineMap;

const INDENT: &str = "  ";

/// Accumulates generated source text.
///
/// Every line started while a location is set is recorded in the line map.
#[derive(Debug, Default)]
pub struct JavaWriter {
    buf: String,
    depth: usize,
    /// 1-based number of the line currently being written.
    line: u32,
    at_line_start: bool,
    location: Option<(String, u32)>,
    line_map: LineMap,
}

impl JavaWriter {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            depth: 0,
            line: 1,
            at_line_start: true,
            location: None,
            line_map: LineMap::new(),
        }
    }

    /// Attribute the following lines to `file:line`.
    pub fn set_location(&mut self, file: &str, line: u32) {
        self.location = Some((file.to_string(), line));
    }

    pub fn clear_location(&mut self) {
        self.location = None;
    }

    pub fn push_depth(&mut self) {
        self.depth += 1;
    }

    pub fn pop_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Write text without ending the line. Embedded newlines are honoured.
    pub fn print(&mut self, text: &str) {
        let mut segments = text.split('\n').peekable();
        while let Some(segment) = segments.next() {
            if !segment.is_empty() {
                self.start_line();
                self.buf.push_str(segment);
            }
            if segments.peek().is_some() {
                self.newline();
            }
        }
    }

    /// Write text and end the line.
    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.newline();
    }

    /// Write an empty line.
    pub fn blank(&mut self) {
        self.newline();
    }

    /// `header {`, then indent.
    pub fn open(&mut self, header: &str) {
        if header.is_empty() {
            self.println("{");
        } else {
            self.println(&format!("{header} {{"));
        }
        self.push_depth();
    }

    /// Dedent, then `}` followed by `trailer`.
    pub fn close(&mut self, trailer: &str) {
        self.pop_depth();
        self.println(&format!("}}{trailer}"));
    }

    fn start_line(&mut self) {
        if !self.at_line_start {
            return;
        }
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        if let Some((file, line)) = &self.location {
            self.line_map.record(self.line, file, *line);
        }
        self.at_line_start = false;
    }

    fn newline(&mut self) {
        self.buf.push('\n');
        self.line += 1;
        self.at_line_start = true;
    }

    pub fn finish(self) -> (String, LineMap) {
        (self.buf, self.line_map)
    }
}
