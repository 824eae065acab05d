//! Host and guest address types.
//!
//! The two address spaces get distinct types so they cannot be mixed up; the
//! only way across is through [`GuestMemoryRegion`](super::GuestMemoryRegion).

use std::fmt;

/// Round `value` down to a multiple of `align` (a power of two).
pub const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align` (a power of two).
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// An address in the guest's physical address space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuestAddr(pub u64);

/// An address in this process's virtual address space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostAddr(pub u64);

macro_rules! impl_address {
    ($name:ident) => {
        impl $name {
            /// The raw integer value.
            pub const fn raw(self) -> u64 {
                self.0
            }

            pub fn checked_add(self, offset: u64) -> Option<Self> {
                self.0.checked_add(offset).map(Self)
            }

            pub fn checked_sub(self, offset: u64) -> Option<Self> {
                self.0.checked_sub(offset).map(Self)
            }

            /// Distance from `base` to `self`, if `self` is not below `base`.
            pub fn offset_from(self, base: Self) -> Option<u64> {
                self.0.checked_sub(base.0)
            }

            pub const fn align_down(self, align: u64) -> Self {
                Self(align_down(self.0, align))
            }

            pub const fn align_up(self, align: u64) -> Self {
                Self(align_up(self.0, align))
            }

            pub const fn is_aligned(self, align: u64) -> bool {
                self.0 & (align - 1) == 0
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

impl_address!(GuestAddr);
impl_address!(HostAddr);

impl HostAddr {
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    pub fn as_mut_ptr(self) -> *mut u8 {
        self.0 as usize as *mut u8
    }
}

/// Half-open guest physical range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuestRange {
    pub start: GuestAddr,
    pub end: GuestAddr,
}

impl GuestRange {
    pub fn new(start: GuestAddr, end: GuestAddr) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.0 - self.start.0
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, addr: GuestAddr) -> bool {
        addr >= self.start && addr < self.end
    }

    pub fn overlaps(&self, other: &GuestRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}
