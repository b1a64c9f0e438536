//! Fixed-capacity payload buffer.
//!
//! The buffer holds the serialized form of exactly one telemetry sample. It is
//! overwritten on every generation and never grows past its capacity: output
//! that does not fit is dropped, the same way `snprintf` truncates into a
//! fixed C array.

use std::fmt;

/// Reusable, size-bounded text buffer for one request body.
#[derive(Debug, Clone)]
pub struct PayloadBuffer {
    text: String,
    capacity: usize,
    truncated: bool,
}

impl PayloadBuffer {
    /// Create an empty buffer of `capacity` bytes.
    ///
    /// One byte is reserved for the terminator, so at most `capacity - 1`
    /// bytes of text are ever stored.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            capacity,
            truncated: false,
        }
    }

    /// Replace the contents with freshly formatted text.
    ///
    /// Returns `false` when the text had to be truncated.
    pub fn overwrite(&mut self, args: fmt::Arguments<'_>) -> bool {
        self.clear();
        // Truncation is reported through `truncated`, never as fmt::Error.
        let _ = fmt::Write::write_fmt(self, args);
        !self.truncated
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.truncated = false;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the last write lost output.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(1).saturating_sub(self.text.len())
    }
}

impl fmt::Write for PayloadBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }

        let room = self.remaining();
        if s.len() <= room {
            self.text.push_str(s);
            return Ok(());
        }

        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
        self.truncated = true;
        Ok(())
    }
}

impl fmt::Display for PayloadBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
