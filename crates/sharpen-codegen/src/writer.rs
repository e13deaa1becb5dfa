//! Indentation-aware text buffer.

const INDENT: &str = "    ";

pub struct CodeWriter {
    output: String,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    /// Write `text` at the current indentation. Embedded newlines start new
    /// lines at the same indentation; empty lines stay empty.
    pub fn line(&mut self, text: &str) {
        for line in text.split('\n') {
            if !line.is_empty() {
                for _ in 0..self.indent {
                    self.output.push_str(INDENT);
                }
                self.output.push_str(line);
            }
            self.output.push('\n');
        }
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }

    /// `{` on its own line, then indent.
    pub fn open(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    pub fn close(&mut self) {
        self.close_with("}");
    }

    /// Dedent, then write a closing line such as `}` or `};`.
    pub fn close_with(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn finish(self) -> String {
        self.output
    }

    /// Output without its final newline, for embedding in another writer.
    pub fn finish_trimmed(self) -> String {
        let mut output = self.output;
        while output.ends_with('\n') {
            output.pop();
        }
        output
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}
