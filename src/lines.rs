/// Longest line kept while waiting for its terminator. Longer lines are dropped.
pub(crate) const MAX_LINE_LEN: usize = 1024 * 1024;

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    // bytes of `buf` already searched for a terminator
    scanned: usize,
    // set while skipping the rest of an oversized line
    discarding: bool,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Removes and returns the next complete line without its terminator (`\n` or `\r\n`).
    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                if self.buf.len() > MAX_LINE_LEN {
                    if !self.discarding {
                        log::debug!("dropping line longer than {} bytes", MAX_LINE_LEN);
                    }
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                return None;
            };

            let pos = self.scanned + offset;
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.scanned = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }

            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Some(line);
        }
    }

    /// Discards a partially received line.
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.discarding = false;
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
