//! Output sinks shared by every clone of a [`Logger`](super::Logger).
//!
//! A `SharedSink` owns the writer behind a single mutex. One log line is one
//! `write_all` + `flush` under the lock, so concurrent callers never interleave.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

type BoxedWriter = Box<dyn Write + Send>;

/// Mutex-guarded writer shared across activities.
#[derive(Clone)]
pub struct SharedSink {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl SharedSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Append to the file at `path`, creating it if needed.
    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }

    // A panic while holding the lock can at worst leave a partial line in
    // the writer; the writer itself stays usable.
    fn lock(&self) -> MutexGuard<'_, BoxedWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one complete line under the lock.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut writer = self.lock();
        writer.write_all(line)?;
        writer.flush()
    }
}

impl std::fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSink").finish_non_exhaustive()
    }
}

/// Writer handed to the tracing fmt layer; holds the sink lock while alive.
pub struct SinkGuard<'a> {
    writer: MutexGuard<'a, BoxedWriter>,
}

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedSink {
    type Writer = SinkGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkGuard {
            writer: self.lock(),
        }
    }
}

/// In-memory writer whose contents can be read back, for captured output.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn clear(&self) {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Write for BufferSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
