//! Label slots on a four-up sheet.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when converting an index to a [`LabelSlot`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// The index is not between 0 and 3.
    #[error("label slot index must be 0-3, got {0}")]
    OutOfRange(usize),
}

/// Position of a label on the sheet.
///
/// Indices run row by row: top-left 0, top-right 1, bottom-left 2,
/// bottom-right 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSlot {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl LabelSlot {
    /// Number of label slots on a sheet.
    pub const COUNT: usize = 4;

    /// All slots in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];

    /// Slot index (0-3).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomLeft => 2,
            Self::BottomRight => 3,
        }
    }

    /// Slot for an index.
    ///
    /// # Errors
    ///
    /// Returns `SlotError::OutOfRange` for indices above 3.
    pub const fn from_index(index: usize) -> Result<Self, SlotError> {
        match index {
            0 => Ok(Self::TopLeft),
            1 => Ok(Self::TopRight),
            2 => Ok(Self::BottomLeft),
            3 => Ok(Self::BottomRight),
            _ => Err(SlotError::OutOfRange(index)),
        }
    }
}

impl TryFrom<usize> for LabelSlot {
    type Error = SlotError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}

impl fmt::Display for LabelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        };
        f.write_str(name)
    }
}
