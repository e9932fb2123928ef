use crate::stt::MAX_STT_INPUT_BYTES;
use std::time::Duration;

/// Default flush cadence for inbound audio.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// Inbound audio accumulated between two flushes.
///
/// Append-only until [`take`](Self::take) hands the bytes off and starts a
/// fresh window. Capped at the recognizer's input limit so a flood of frames
/// between ticks cannot grow without bound.
#[derive(Debug, Default)]
pub struct AudioWindow {
    buf: Vec<u8>,
}

impl AudioWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame. Returns `true` once the window has reached its cap and
    /// should be flushed early.
    pub fn append(&mut self, frame: &[u8]) -> bool {
        self.buf.extend_from_slice(frame);
        self.buf.len() >= MAX_STT_INPUT_BYTES
    }

    /// Takes the accumulated bytes, leaving an empty window behind.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_drains_in_order() {
        let mut window = AudioWindow::new();
        assert!(!window.append(b"ab"));
        assert!(!window.append(b"cd"));
        assert_eq!(window.len(), 4);
        assert_eq!(window.take(), b"abcd");
        assert!(window.is_empty());
        assert!(window.take().is_empty());
    }

    #[test]
    fn reports_full_at_cap() {
        let mut window = AudioWindow::new();
        assert!(!window.append(&vec![0u8; MAX_STT_INPUT_BYTES - 1]));
        assert!(window.append(&[0u8]));
    }
}
