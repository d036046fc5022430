//! A single imported-image plane: an owned DMA-BUF fd plus its layout.

use std::os::fd::OwnedFd;

/// One plane of an imported image. Planes only ever travel together, as a
/// `PlaneSet` of up to four, matching the number of planes KMS's `GETFB2`
/// can report for a single framebuffer.
#[derive(Debug)]
pub struct PlaneDescriptor {
    pub fd: OwnedFd,
    pub offset: u32,
    pub pitch: u32,
    pub modifier: u64,
}

pub const MAX_PLANES: usize = 4;

/// Up to four plane descriptors describing one imported image.
#[derive(Debug, Default)]
pub struct PlaneSet {
    planes: Vec<PlaneDescriptor>,
}

impl PlaneSet {
    pub fn new() -> Self {
        Self { planes: Vec::with_capacity(MAX_PLANES) }
    }

    pub fn push(&mut self, plane: PlaneDescriptor) {
        assert!(self.planes.len() < MAX_PLANES, "PlaneSet holds at most {MAX_PLANES} planes");
        self.planes.push(plane);
    }

    pub fn as_slice(&self) -> &[PlaneDescriptor] {
        &self.planes
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    fn dummy_fd() -> OwnedFd {
        // Duplicate stdin's fd so the test owns a valid, closeable descriptor
        // without touching any device.
        unsafe { OwnedFd::from_raw_fd(libc::dup(0)) }
    }

    #[test]
    fn plane_set_enforces_max_four_planes() {
        let mut set = PlaneSet::new();
        for _ in 0..MAX_PLANES {
            set.push(PlaneDescriptor { fd: dummy_fd(), offset: 0, pitch: 0, modifier: 0 });
        }
        assert_eq!(set.len(), MAX_PLANES);
    }

    #[test]
    #[should_panic]
    fn plane_set_panics_on_fifth_plane() {
        let mut set = PlaneSet::new();
        for _ in 0..=MAX_PLANES {
            set.push(PlaneDescriptor { fd: dummy_fd(), offset: 0, pitch: 0, modifier: 0 });
        }
    }
}
