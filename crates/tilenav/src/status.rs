//! Composite status codes
//!
//! Operations report a bitmask combining one high-level flag (success,
//! failure, in-progress) with detail bits. A success can still carry
//! details (for example `Status::success() | Status::PARTIAL_RESULT`), so
//! callers must inspect both halves.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Result type for navigation operations. Failures are themselves
/// [`Status`] values so detail bits survive propagation through `?`.
pub type Result<T> = std::result::Result<T, Status>;

/// Bitmask status for navigation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    /// Operation failed
    pub const FAILURE: u32 = 1u32 << 31;
    /// Operation succeeded
    pub const SUCCESS: u32 = 1u32 << 30;
    /// Operation still in progress (sliced queries)
    pub const IN_PROGRESS: u32 = 1u32 << 29;

    /// Mask covering every detail bit
    pub const DETAIL_MASK: u32 = 0x0ffffff;
    /// Input data is not recognized
    pub const WRONG_MAGIC: u32 = 1 << 0;
    /// Input data is in wrong version
    pub const WRONG_VERSION: u32 = 1 << 1;
    /// Operation ran out of memory
    pub const OUT_OF_MEMORY: u32 = 1 << 2;
    /// An input parameter was invalid
    pub const INVALID_PARAM: u32 = 1 << 3;
    /// Result buffer was too small to store all results
    pub const BUFFER_TOO_SMALL: u32 = 1 << 4;
    /// Query ran out of nodes during search
    pub const OUT_OF_NODES: u32 = 1 << 5;
    /// Query did not reach the end location, returning best guess
    pub const PARTIAL_RESULT: u32 = 1 << 6;
    /// A tile has already been assigned to the given (x, y, layer)
    pub const ALREADY_OCCUPIED: u32 = 1 << 7;
    /// Graph walk exceeded its iteration bound (malformed link cycle)
    pub const INVALID_CYCLE_PATH: u32 = 1 << 8;

    /// Creates a status from raw flags
    pub const fn new(flags: u32) -> Self {
        Self(flags)
    }

    /// Plain success
    pub const fn success() -> Self {
        Self(Self::SUCCESS)
    }

    /// Plain failure
    pub const fn failure() -> Self {
        Self(Self::FAILURE)
    }

    /// Failure with detail bits
    pub const fn failure_detail(detail: u32) -> Self {
        Self(Self::FAILURE | detail)
    }

    /// Success with detail bits
    pub const fn success_detail(detail: u32) -> Self {
        Self(Self::SUCCESS | detail)
    }

    /// In-progress status
    pub const fn in_progress() -> Self {
        Self(Self::IN_PROGRESS)
    }

    /// Shorthand for `failure_detail(INVALID_PARAM)`
    pub const fn invalid_param() -> Self {
        Self::failure_detail(Self::INVALID_PARAM)
    }

    /// Returns true if the success bit is set
    pub fn is_success(&self) -> bool {
        (self.0 & Self::SUCCESS) != 0
    }

    /// Returns true if the failure bit is set
    pub fn is_failure(&self) -> bool {
        (self.0 & Self::FAILURE) != 0
    }

    /// Returns true if the in-progress bit is set
    pub fn is_in_progress(&self) -> bool {
        (self.0 & Self::IN_PROGRESS) != 0
    }

    /// Returns true if the given detail bit is set
    pub fn has_detail(&self, detail: u32) -> bool {
        (self.0 & detail) != 0
    }

    /// Returns only the detail bits
    pub fn detail(&self) -> u32 {
        self.0 & Self::DETAIL_MASK
    }

    /// Copies the detail bits of `other` onto this status
    pub fn with_details_of(self, other: Status) -> Status {
        Status(self.0 | other.detail())
    }
}

impl BitOr<u32> for Status {
    type Output = Status;
    fn bitor(self, rhs: u32) -> Status {
        Status(self.0 | rhs)
    }
}

impl BitOrAssign<u32> for Status {
    fn bitor_assign(&mut self, rhs: u32) {
        self.0 |= rhs;
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            write!(f, "Success")?;
        } else if self.is_failure() {
            write!(f, "Failure")?;
        } else if self.is_in_progress() {
            write!(f, "In Progress")?;
        }

        let mut details = Vec::new();
        if self.has_detail(Self::WRONG_MAGIC) {
            details.push("Wrong Magic");
        }
        if self.has_detail(Self::WRONG_VERSION) {
            details.push("Wrong Version");
        }
        if self.has_detail(Self::OUT_OF_MEMORY) {
            details.push("Out of Memory");
        }
        if self.has_detail(Self::INVALID_PARAM) {
            details.push("Invalid Param");
        }
        if self.has_detail(Self::BUFFER_TOO_SMALL) {
            details.push("Buffer Too Small");
        }
        if self.has_detail(Self::OUT_OF_NODES) {
            details.push("Out of Nodes");
        }
        if self.has_detail(Self::PARTIAL_RESULT) {
            details.push("Partial Result");
        }
        if self.has_detail(Self::ALREADY_OCCUPIED) {
            details.push("Already Occupied");
        }
        if self.has_detail(Self::INVALID_CYCLE_PATH) {
            details.push("Invalid Cycle Path");
        }

        if !details.is_empty() {
            write!(f, " ({})", details.join(", "))?;
        }
        Ok(())
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl std::error::Error for Status {}

impl From<tilenav_common::Error> for Status {
    fn from(err: tilenav_common::Error) -> Self {
        use tilenav_common::Error;
        match err {
            Error::WrongMagic(_) => Status::failure_detail(Status::WRONG_MAGIC),
            Error::WrongVersion(_) => Status::failure_detail(Status::WRONG_VERSION),
            Error::InvalidParams(_) | Error::InvalidTileData(_) => Status::invalid_param(),
            Error::Query(_) | Error::Io(_) => Status::failure(),
        }
    }
}

/// Return early with `Status::invalid_param()` if the expression is `None`
#[macro_export]
macro_rules! nav_unwrap {
    ($expr:expr) => {
        match $expr {
            Some(val) => val,
            None => return Err($crate::status::Status::invalid_param()),
        }
    };
    ($expr:expr, $status:expr) => {
        match $expr {
            Some(val) => val,
            None => return Err($status),
        }
    };
}

/// Return early with a failure status if the expression is `false`
#[macro_export]
macro_rules! nav_ensure {
    ($expr:expr) => {
        if !$expr {
            return Err($crate::status::Status::failure());
        }
    };
    ($expr:expr, $status:expr) => {
        if !$expr {
            return Err($status);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_level_flags() {
        assert!(Status::success().is_success());
        assert!(!Status::success().is_failure());
        assert!(Status::failure().is_failure());
        assert!(Status::in_progress().is_in_progress());
    }

    #[test]
    fn success_carries_details() {
        let st = Status::success_detail(Status::PARTIAL_RESULT | Status::OUT_OF_NODES);
        assert!(st.is_success());
        assert!(st.has_detail(Status::PARTIAL_RESULT));
        assert!(st.has_detail(Status::OUT_OF_NODES));
        assert!(!st.has_detail(Status::BUFFER_TOO_SMALL));
    }

    #[test]
    fn detail_transfer() {
        let failed = Status::failure_detail(Status::OUT_OF_NODES);
        let merged = Status::success().with_details_of(failed);
        assert!(merged.is_success());
        assert!(merged.has_detail(Status::OUT_OF_NODES));
    }

    #[test]
    fn cycle_detail_displays() {
        let st = Status::failure_detail(Status::INVALID_CYCLE_PATH);
        assert_eq!(st.to_string(), "Failure (Invalid Cycle Path)");
    }
}
