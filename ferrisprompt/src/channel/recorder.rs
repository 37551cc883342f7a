//! Session recording: mirror every byte written to and read from the device.
//!
//! Recording is observation only. Sink failures are logged and swallowed;
//! they never fail the operation being recorded.

use std::fmt;
use std::io::Write;

use log::warn;

/// Direction of a recorded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes written to the device.
    Input,
    /// Bytes read from the device.
    Output,
}

/// Where recorded bytes go.
pub enum SessionRecorder {
    /// Raw device output appended to a writer (typically a file).
    ///
    /// Only [`Direction::Output`] is written, so the file replays as the
    /// terminal showed it. Inputs appear through the device echo.
    Writer(Box<dyn Write + Send>),

    /// Every chunk, both directions, handed to a callback.
    Callback(Box<dyn FnMut(Direction, &[u8]) + Send>),
}

impl SessionRecorder {
    /// Record to any writer.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        SessionRecorder::Writer(Box::new(writer))
    }

    /// Record through a callback.
    pub fn callback(f: impl FnMut(Direction, &[u8]) + Send + 'static) -> Self {
        SessionRecorder::Callback(Box::new(f))
    }

    pub(crate) fn record(&mut self, direction: Direction, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match self {
            SessionRecorder::Writer(w) => {
                if direction == Direction::Output {
                    if let Err(e) = w.write_all(data).and_then(|_| w.flush()) {
                        warn!("session recorder write failed: {}", e);
                    }
                }
            }
            SessionRecorder::Callback(f) => f(direction, data),
        }
    }
}

impl fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRecorder::Writer(_) => f.write_str("SessionRecorder::Writer"),
            SessionRecorder::Callback(_) => f.write_str("SessionRecorder::Callback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_records_output_only() {
        let sink = Shared::default();
        let mut recorder = SessionRecorder::writer(sink.clone());
        recorder.record(Direction::Input, b"show version\n");
        recorder.record(Direction::Output, b"show version\nVersion 1.0\n");
        assert_eq!(&*sink.0.lock().unwrap(), b"show version\nVersion 1.0\n");
    }

    #[test]
    fn test_callback_sees_both_directions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let mut recorder = SessionRecorder::callback(move |dir, data| {
            seen_cb.lock().unwrap().push((dir, data.to_vec()));
        });
        recorder.record(Direction::Input, b"a");
        recorder.record(Direction::Output, b"b");
        recorder.record(Direction::Output, b"");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Direction::Input, b"a".to_vec()));
        assert_eq!(seen[1], (Direction::Output, b"b".to_vec()));
    }
}
