use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fsio;
use crate::instance::Instance;

const TRACE_PIPE: &str = "trace_pipe";
const TRACE: &str = "trace";

/// The live, consuming trace feed of an instance.
///
/// Reads block until the kernel has new records. Data handed out is consumed,
/// reopening the pipe does not replay it. The descriptor is released by
/// [`TracePipe::close`] or when the value is dropped.
#[derive(Debug)]
pub struct TracePipe {
    file: File,
    path: PathBuf,
}

impl TracePipe {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) {
        tracing::debug!("Closing {}", self.path.display());
    }
}

impl Read for TracePipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Instance {
    /// Open this instance's `trace_pipe`.
    pub fn trace_pipe(&self) -> Result<TracePipe> {
        let path = self.file(TRACE_PIPE);
        let file = fsio::open_read(&path)?;
        tracing::debug!("Opened {}", path.display());
        Ok(TracePipe { file, path })
    }

    /// Snapshot of the trace buffer. Unlike the pipe this does not consume.
    pub fn read_trace(&self) -> Result<Vec<u8>> {
        fsio::read(&self.file(TRACE))
    }

    /// Empty the trace buffer.
    pub fn clear_trace(&self) -> Result<()> {
        fsio::write(&self.file(TRACE), b"")
    }
}
