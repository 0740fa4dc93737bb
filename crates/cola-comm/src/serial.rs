//! Single-worker communicator.

use crate::{CommError, Communicator, Result};

/// The only worker of a serial run. Every collective is a local copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
        if outgoing.len() != 1 {
            return Err(CommError::BufferCount {
                expected: 1,
                actual: outgoing.len(),
            });
        }
        Ok(outgoing)
    }

    fn abort(&self, reason: &str) -> ! {
        tracing::error!(reason, "aborting");
        std::process::exit(1)
    }
}
