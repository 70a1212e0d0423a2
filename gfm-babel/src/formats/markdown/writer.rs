//! Line-oriented output buffer for the serializer
//!
//! Containers (blockquotes, list items, footnote bodies) push a prefix that
//! is written at the start of every line inside them. Blocks never end with
//! a newline; the separator owed to the next block is written only once
//! that block starts.

#[derive(Debug, Default)]
pub struct MarkdownWriter {
    out: String,
    /// Prefix written at the start of each line
    delim: String,
    /// Newlines owed before the next write
    separator: usize,
    /// Whether the current line has nothing on it yet, prefix included
    at_line_start: bool,
}

impl MarkdownWriter {
    pub fn new() -> Self {
        MarkdownWriter {
            at_line_start: true,
            ..Self::default()
        }
    }

    /// Ask for `newlines` newlines before the next block.
    pub fn separate(&mut self, newlines: usize) {
        self.separator = newlines;
    }

    fn flush_separator(&mut self) {
        let newlines = std::mem::take(&mut self.separator);
        if newlines == 0 || self.out.is_empty() {
            return;
        }
        if !self.at_line_start {
            self.out.push('\n');
        }
        for _ in 1..newlines {
            self.out.push_str(self.delim.trim_end());
            self.out.push('\n');
        }
        self.at_line_start = true;
    }

    /// Write text, prefixing every line it starts.
    pub fn write(&mut self, text: &str) {
        self.flush_separator();
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                if self.at_line_start {
                    self.out.push_str(self.delim.trim_end());
                }
                self.out.push('\n');
                self.at_line_start = true;
            }
            if !line.is_empty() {
                if self.at_line_start {
                    self.out.push_str(&self.delim);
                    self.at_line_start = false;
                }
                self.out.push_str(line);
            }
        }
    }

    /// Open a container. The first line gets `first` after the current
    /// prefix, later lines get `delim`. Returns what [`Self::close`] needs.
    pub fn open(&mut self, delim: &str, first: &str) -> usize {
        self.flush_separator();
        if self.at_line_start {
            self.out.push_str(&self.delim);
        }
        self.out.push_str(first);
        self.at_line_start = false;

        let outer = self.delim.len();
        self.delim.push_str(delim);
        outer
    }

    pub fn close(&mut self, outer: usize) {
        self.delim.truncate(outer);
    }

    /// The markdown written so far, without trailing blanks
    pub fn finish(self) -> String {
        let mut out = self.out;
        let trimmed = out.trim_end_matches([' ', '\t']).len();
        out.truncate(trimmed);
        out
    }
}
