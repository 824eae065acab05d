//! Backward bump allocation inside a guest physical window.

use crate::error::{Error, ImageKind, Result};
use crate::memory::{GuestAddr, GuestRange};

/// Free guest physical space `[floor, limit)`, handed out from the top down.
///
/// Every reservation lowers `limit`; a reservation that would start below
/// `floor` is an overlap with whatever owns the space under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeWindow {
    floor: GuestAddr,
    limit: GuestAddr,
}

impl FreeWindow {
    pub fn new(floor: GuestAddr, limit: GuestAddr) -> Self {
        Self { floor, limit }
    }

    pub fn floor(&self) -> GuestAddr {
        self.floor
    }

    pub fn limit(&self) -> GuestAddr {
        self.limit
    }

    /// Reserve `size` bytes directly below the limit, start aligned down to `align`.
    ///
    /// The returned range runs up to the old limit, so it may be longer than
    /// `size` by the alignment padding.
    pub fn reserve_top(&mut self, image: ImageKind, size: u64, align: u64) -> Result<GuestRange> {
        let start = self
            .limit
            .checked_sub(size)
            .map(|addr| addr.align_down(align))
            .filter(|start| *start >= self.floor)
            .ok_or_else(|| Error::Overlap {
                image,
                start: self.limit.raw().saturating_sub(size) & !(align - 1),
                kernel_end: self.floor.raw(),
            })?;

        let range = GuestRange::new(start, self.limit);
        self.limit = start;
        Ok(range)
    }
}
