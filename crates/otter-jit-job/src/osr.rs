//! On-stack replacement entry point

use std::fmt;

use crate::error::{JobError, Result};
use crate::kind::JobKind;

/// Offset into a function's bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytecodeOffset(i32);

impl BytecodeOffset {
    /// Sentinel meaning "no offset"
    pub const NONE: Self = Self(-1);

    /// Offset `offset` bytes into the bytecode
    pub const fn new(offset: i32) -> Self {
        Self(offset)
    }

    /// Whether this is the [`NONE`](Self::NONE) sentinel
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    /// Raw value
    pub const fn to_int(self) -> i32 {
        self.0
    }
}

impl Default for BytecodeOffset {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for BytecodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

/// Suspended interpreter frame being replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsrFrame {
    frame_pointer: usize,
    register_count: u32,
}

impl OsrFrame {
    /// Frame at `frame_pointer` with `register_count` live interpreter registers
    pub const fn new(frame_pointer: usize, register_count: u32) -> Self {
        Self {
            frame_pointer,
            register_count,
        }
    }

    /// Frame pointer of the suspended frame
    pub const fn frame_pointer(&self) -> usize {
        self.frame_pointer
    }

    /// Interpreter registers to transfer into the optimized frame
    pub const fn register_count(&self) -> u32 {
        self.register_count
    }
}

/// Offset and frame, set together exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct OsrDescriptor {
    entry: Option<(BytecodeOffset, OsrFrame)>,
}

impl OsrDescriptor {
    pub(crate) fn configure(
        &mut self,
        kind: JobKind,
        offset: BytecodeOffset,
        frame: OsrFrame,
    ) -> Result<()> {
        if !kind.is_optimizing() {
            return Err(JobError::OsrRequiresOptimizing { kind });
        }
        if offset.is_none() {
            return Err(JobError::InvalidOsrOffset);
        }
        if self.entry.is_some() {
            return Err(JobError::OsrAlreadyConfigured);
        }
        self.entry = Some((offset, frame));
        Ok(())
    }

    pub(crate) fn is_osr(&self) -> bool {
        self.entry.is_some()
    }

    pub(crate) fn offset(&self) -> BytecodeOffset {
        self.entry.map_or(BytecodeOffset::NONE, |(offset, _)| offset)
    }

    pub(crate) fn frame(&self) -> Option<OsrFrame> {
        self.entry.map(|(_, frame)| frame)
    }
}
