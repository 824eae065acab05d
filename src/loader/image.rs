//! Boot image placement.
//!
//! The kernel goes at a fixed offset from the start of RAM so its
//! decompressor has room above it. The device tree and initrd are placed
//! backwards from the top of the lowmem window, where early boot code can
//! still reach them.
//!
//! ```text
//! base        base + kernel_offset      initrd          fdt        limit
//!  │──────────────│ kernel ...│   free   │ initrd │ pad │ fdt │ pad │
//! ```

use std::fs::File;
use std::io::{self, Read};

use log::info;

use crate::arch::BootLayout;
use crate::error::{Error, ImageKind, Result};
use crate::loader::window::FreeWindow;
use crate::memory::{GuestAddr, GuestMemoryRegion, GuestRange};

/// A boot image whose length is known before it is read.
pub trait ImageSource: Read {
    /// Bytes left to read.
    fn size(&mut self) -> io::Result<u64>;
}

impl ImageSource for File {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl<T: AsRef<[u8]>> ImageSource for io::Cursor<T> {
    fn size(&mut self) -> io::Result<u64> {
        let len = self.get_ref().as_ref().len() as u64;
        Ok(len.saturating_sub(self.position()))
    }
}

impl<S: ImageSource + ?Sized> ImageSource for &mut S {
    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }
}

/// Where the boot images ended up in guest physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPlacement {
    pub kernel_guest_start: GuestAddr,
    pub kernel_size: u64,
    pub dtb_guest_start: GuestAddr,
    pub initrd_guest_start: Option<GuestAddr>,
    pub initrd_size: u64,
}

impl KernelPlacement {
    pub fn kernel_range(&self) -> GuestRange {
        GuestRange::new(
            self.kernel_guest_start,
            GuestAddr(self.kernel_guest_start.raw() + self.kernel_size),
        )
    }

    pub fn initrd_range(&self) -> Option<GuestRange> {
        self.initrd_guest_start
            .map(|start| GuestRange::new(start, GuestAddr(start.raw() + self.initrd_size)))
    }
}

/// Read `src` to EOF into `dst`.
///
/// Fails with [`Error::ImageTooLarge`] if `dst` fills up before EOF. Bytes
/// already copied stay in `dst`.
pub fn read_bounded<R: Read + ?Sized>(image: ImageKind, src: &mut R, dst: &mut [u8]) -> Result<usize> {
    let io_err = |source| Error::ImageRead { image, source };

    let mut total = 0;
    while total < dst.len() {
        match src.read(&mut dst[total..]) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        }
    }

    let mut extra = [0u8; 1];
    loop {
        match src.read(&mut extra) {
            Ok(0) => return Ok(total),
            Ok(_) => return Err(Error::ImageTooLarge(image)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        }
    }
}

/// Copy the kernel and optional initrd into guest RAM and reserve the fdt.
///
/// A failure can leave a partially copied image behind; the VM is not
/// usable afterwards either way.
pub fn load_images<K, I>(
    region: &mut GuestMemoryRegion,
    layout: &BootLayout,
    kernel: &mut K,
    initrd: Option<&mut I>,
) -> Result<KernelPlacement>
where
    K: Read + ?Sized,
    I: ImageSource + ?Sized,
{
    // Linux wants the initrd and dtb inside lowmem, not at the top of RAM.
    let base = region.guest_base();
    let window = region.size().min(layout.lowmem_ceiling);
    let limit = GuestAddr(base.raw() + window - 1);

    let kernel_start = base
        .checked_add(layout.kernel_offset)
        .filter(|start| *start <= limit)
        .ok_or(Error::ImageTooLarge(ImageKind::Kernel))?;

    let dst = region.slice_mut(GuestRange::new(kernel_start, limit))?;
    let kernel_size = read_bounded(ImageKind::Kernel, kernel, dst)? as u64;
    let kernel_end = GuestAddr(kernel_start.raw() + kernel_size);
    info!("Loaded kernel to {} ({} bytes)", kernel_start, kernel_size);

    // Backwards from the end of lowmem, so the decompressor keeps its room.
    let mut free = FreeWindow::new(kernel_end, limit);
    let dtb = free.reserve_top(
        ImageKind::DeviceTree,
        layout.fdt_max_size + layout.fdt_align,
        layout.fdt_align,
    )?;
    info!("Placing fdt at {} - {}", dtb.start, dtb.end);

    let (initrd_guest_start, initrd_size) = match initrd {
        Some(src) => {
            let size = src.size().map_err(|source| Error::ImageRead {
                image: ImageKind::Initrd,
                source,
            })?;
            let span = free.reserve_top(
                ImageKind::Initrd,
                size.saturating_add(layout.initrd_align),
                layout.initrd_align,
            )?;

            let dst = region.slice_mut(span)?;
            let copied = read_bounded(ImageKind::Initrd, src, dst)? as u64;
            info!("Loaded initrd to {} ({} bytes)", span.start, copied);
            (Some(span.start), copied)
        }
        None => (None, 0),
    };

    Ok(KernelPlacement {
        kernel_guest_start: kernel_start,
        kernel_size,
        dtb_guest_start: dtb.start,
        initrd_guest_start,
        initrd_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{align_down, MemoryBacking};
    use std::io::Cursor;

    const MB: u64 = 1 << 20;

    fn region(size: u64) -> GuestMemoryRegion {
        GuestMemoryRegion::allocate(size, &MemoryBacking::Anonymous, &BootLayout::default())
            .unwrap()
    }

    fn image(len: u64, fill: u8) -> Cursor<Vec<u8>> {
        Cursor::new(vec![fill; len as usize])
    }

    /// Reads at most `chunk` bytes per call and is interrupted once.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_read_bounded_exact_fit() {
        let mut dst = [0u8; 8];
        let n = read_bounded(ImageKind::Kernel, &mut image(8, 1), &mut dst).unwrap();
        assert_eq!(n, 8);
    }

    #[test]
    fn test_read_bounded_too_large() {
        let mut dst = [0u8; 8];
        let err = read_bounded(ImageKind::Initrd, &mut image(9, 1), &mut dst).unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge(ImageKind::Initrd)));
        // Partial copy is kept.
        assert_eq!(dst, [1u8; 8]);
    }

    #[test]
    fn test_read_bounded_short_reads() {
        let mut src = Trickle {
            data: Cursor::new(b"abcdefg".to_vec()),
            chunk: 3,
            interrupted: false,
        };
        let mut dst = [0u8; 16];
        assert_eq!(read_bounded(ImageKind::Kernel, &mut src, &mut dst).unwrap(), 7);
        assert_eq!(&dst[..7], b"abcdefg");
    }

    #[test]
    fn test_read_bounded_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from_raw_os_error(libc::EIO))
            }
        }
        let mut dst = [0u8; 4];
        assert!(matches!(
            read_bounded(ImageKind::Kernel, &mut Broken, &mut dst),
            Err(Error::ImageRead { image: ImageKind::Kernel, .. })
        ));
    }

    #[test]
    fn test_kernel_only_256m() {
        let layout = BootLayout::default();
        let mut mem = region(256 * MB);
        let base = mem.guest_base().raw();

        let placement =
            load_images::<_, Cursor<Vec<u8>>>(&mut mem, &layout, &mut image(8 * MB, 0x5a), None)
                .unwrap();

        let limit = base + 256 * MB - 1;
        assert_eq!(placement.kernel_guest_start, GuestAddr(base + 0x80000));
        assert_eq!(placement.kernel_size, 8 * MB);
        assert_eq!(
            placement.dtb_guest_start,
            GuestAddr(align_down(limit - (layout.fdt_max_size + layout.fdt_align), 2 * MB))
        );
        assert!(placement.dtb_guest_start >= placement.kernel_range().end);
        assert!(placement.dtb_guest_start.raw() + layout.fdt_max_size < limit);
        assert_eq!(placement.initrd_guest_start, None);
        assert_eq!(placement.initrd_size, 0);

        let mut head = [0u8; 4];
        mem.read(placement.kernel_guest_start, &mut head).unwrap();
        assert_eq!(head, [0x5a; 4]);
    }

    #[test]
    fn test_kernel_largest_fit() {
        let layout = BootLayout::default();
        let mut mem = region(4 * MB);
        let size = 4 * MB - layout.kernel_offset - 1;

        // Fits, but leaves no room for the fdt.
        let err =
            load_images::<_, Cursor<Vec<u8>>>(&mut mem, &layout, &mut image(size, 1), None)
                .unwrap_err();
        assert!(matches!(err, Error::Overlap { image: ImageKind::DeviceTree, .. }));
    }

    #[test]
    fn test_kernel_too_large() {
        let layout = BootLayout::default();
        let mut mem = region(4 * MB);

        for size in [4 * MB - layout.kernel_offset, 4 * MB - 1] {
            let err =
                load_images::<_, Cursor<Vec<u8>>>(&mut mem, &layout, &mut image(size, 1), None)
                    .unwrap_err();
            assert!(matches!(err, Error::ImageTooLarge(ImageKind::Kernel)));
        }
    }

    #[test]
    fn test_lowmem_ceiling_applies() {
        let layout = BootLayout {
            lowmem_ceiling: 8 * MB,
            ..BootLayout::default()
        };
        let mut mem = region(32 * MB);
        let base = mem.guest_base().raw();

        let placement = load_images(
            &mut mem,
            &layout,
            &mut image(MB, 1),
            Some(&mut image(MB, 2)),
        )
        .unwrap();

        let initrd = placement.initrd_range().unwrap();
        assert!(placement.dtb_guest_start.raw() < base + 8 * MB);
        assert!(initrd.end <= placement.dtb_guest_start);
        assert!(initrd.start >= placement.kernel_range().end);
    }

    #[test]
    fn test_initrd_placed_below_fdt() {
        let layout = BootLayout::default();
        let mut mem = region(64 * MB);
        let mut initrd = image(3 * MB + 3, 0xa5);

        let placement =
            load_images(&mut mem, &layout, &mut image(4 * MB, 1), Some(&mut initrd)).unwrap();

        let start = placement.initrd_guest_start.unwrap();
        assert!(start.is_aligned(layout.initrd_align));
        assert_eq!(placement.initrd_size, 3 * MB + 3);
        assert!(start.raw() + placement.initrd_size <= placement.dtb_guest_start.raw());
        assert!(!placement.kernel_range().overlaps(&placement.initrd_range().unwrap()));

        let mut tail = [0u8; 3];
        mem.read(GuestAddr(start.raw() + 3 * MB), &mut tail).unwrap();
        assert_eq!(tail, [0xa5; 3]);
    }

    #[test]
    fn test_initrd_overlapping_kernel() {
        let layout = BootLayout::default();
        let mut mem = region(16 * MB);
        let base = mem.guest_base().raw();

        let err = load_images(
            &mut mem,
            &layout,
            &mut image(10 * MB, 1),
            Some(&mut image(2 * MB, 0xee)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Overlap { image: ImageKind::Initrd, .. }));

        // Nothing of the initrd was copied.
        let mut tail = [0u8; 16];
        mem.read(GuestAddr(base + 12 * MB - 16), &mut tail).unwrap();
        assert_eq!(tail, [0u8; 16]);
    }

    #[test]
    fn test_initrd_grew_after_stat() {
        struct Liar(Cursor<Vec<u8>>);
        impl Read for Liar {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.0.read(buf)
            }
        }
        impl ImageSource for Liar {
            fn size(&mut self) -> io::Result<u64> {
                Ok(16)
            }
        }

        let layout = BootLayout::default();
        let mut mem = region(16 * MB);
        let err = load_images(
            &mut mem,
            &layout,
            &mut image(MB, 1),
            Some(&mut Liar(image(MB, 2))),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge(ImageKind::Initrd)));
    }
}
