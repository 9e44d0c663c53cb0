//! Sweep cursor
//!
//! Marks where the next batch of a table sweep starts. A cursor is only
//! meaningful for the sweep run that produced it; restarting from `Start` is
//! always safe, just redundant.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{AtlasError, Result};

/// Number of row-key bytes shown when a cursor is rendered for humans
pub const RENDERED_ROW_LEN: usize = 12;

/// Resumption point of a table sweep
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SweepCursor {
    /// Beginning of the table
    Start,

    /// First row the next batch inspects
    At(Bytes),

    /// The whole table has been swept
    Finished,
}

impl SweepCursor {
    /// Cursor positioned at `row`; an empty row means `Start`
    pub fn from_row(row: impl Into<Bytes>) -> Self {
        let row = row.into();
        if row.is_empty() {
            SweepCursor::Start
        } else {
            SweepCursor::At(row)
        }
    }

    /// Cursor positioned immediately after `row`: the smallest key greater
    /// than `row` is `row` followed by a zero byte
    pub fn after(row: &[u8]) -> Self {
        let mut next = BytesMut::with_capacity(row.len() + 1);
        next.put_slice(row);
        next.put_u8(0);
        SweepCursor::At(next.freeze())
    }

    /// Decode a hex-encoded start row
    pub fn parse_hex(encoded: &str) -> Result<Self> {
        let row = hex::decode(encoded)
            .map_err(|e| AtlasError::InvalidCursor(format!("'{}' is not hex: {}", encoded, e)))?;
        Ok(Self::from_row(row))
    }

    /// Row the next scan starts at, `None` once finished
    pub fn start_row(&self) -> Option<&[u8]> {
        match self {
            SweepCursor::Start => Some(&[]),
            SweepCursor::At(row) => Some(row),
            SweepCursor::Finished => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SweepCursor::Finished)
    }

    /// Hex of the first 12 row bytes, zero padded; `Finished` renders as
    /// twelve `0xFF` bytes
    pub fn render(&self) -> String {
        let mut buffer = [0u8; RENDERED_ROW_LEN];
        match self {
            SweepCursor::Start => {}
            SweepCursor::At(row) => {
                let len = row.len().min(RENDERED_ROW_LEN);
                buffer[..len].copy_from_slice(&row[..len]);
            }
            SweepCursor::Finished => buffer.fill(0xFF),
        }
        hex::encode_upper(buffer)
    }
}

impl Default for SweepCursor {
    fn default() -> Self {
        SweepCursor::Start
    }
}

impl fmt::Display for SweepCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
