//! Ownership of a resource handle and its backing device memory.
//!
//! [`ResourceHandles`] is the piece that [`Buffer`](crate::buffer::Buffer) and
//! [`Image`](crate::image::Image) share: a handle and its `vk::DeviceMemory`
//! that are either both live or both null. Releasing goes through
//! [`ResourceHandles::take`], which hands the pair out exactly once, so a
//! second `destroy()` or the `Drop` of an already destroyed resource does
//! nothing.
//!
//! Moving a resource out with `std::mem::take` leaves a null pair behind,
//! which is the same state a destroyed resource is in.

use ash::vk::{self, Handle};

/// A handle/memory pair with single-release semantics.
#[derive(Debug, PartialEq, Eq)]
pub struct ResourceHandles<H: Handle + Copy> {
    handle: H,
    memory: vk::DeviceMemory,
}

impl<H: Handle + Copy> ResourceHandles<H> {
    /// Pairs a live handle with the memory bound to it.
    pub fn new(handle: H, memory: vk::DeviceMemory) -> Self {
        debug_assert_eq!(
            handle.as_raw() == 0,
            memory == vk::DeviceMemory::null(),
            "handle and memory must be both valid or both null"
        );
        Self { handle, memory }
    }

    /// A pair that owns nothing.
    pub fn null() -> Self {
        Self {
            handle: H::from_raw(0),
            memory: vk::DeviceMemory::null(),
        }
    }

    /// Returns the handle, or a null handle once released.
    #[inline]
    pub fn handle(&self) -> H {
        self.handle
    }

    /// Returns the memory, or a null handle once released.
    #[inline]
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Returns true while the pair still owns live objects.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.handle.as_raw() != 0
    }

    /// Gives up ownership of both objects.
    ///
    /// Returns the pair the first time and `None` afterwards. The caller is
    /// responsible for destroying the handle and then freeing the memory.
    pub fn take(&mut self) -> Option<(H, vk::DeviceMemory)> {
        if !self.is_live() {
            return None;
        }
        let pair = (self.handle, self.memory);
        *self = Self::null();
        Some(pair)
    }
}

impl<H: Handle + Copy> Default for ResourceHandles<H> {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_buffer() -> ResourceHandles<vk::Buffer> {
        ResourceHandles::new(vk::Buffer::from_raw(7), vk::DeviceMemory::from_raw(11))
    }

    #[test]
    fn test_take_releases_once() {
        let mut handles = live_buffer();
        assert!(handles.is_live());

        let released = handles.take();
        assert_eq!(
            released,
            Some((vk::Buffer::from_raw(7), vk::DeviceMemory::from_raw(11)))
        );

        // Second release is a no-op
        assert_eq!(handles.take(), None);
        assert!(!handles.is_live());
        assert_eq!(handles.handle(), vk::Buffer::null());
        assert_eq!(handles.memory(), vk::DeviceMemory::null());
    }

    #[test]
    fn test_move_out_voids_source() {
        let mut source = live_buffer();
        let mut moved = std::mem::take(&mut source);

        assert_eq!(source, ResourceHandles::null());
        assert_eq!(source.take(), None);

        assert_eq!(moved.handle(), vk::Buffer::from_raw(7));
        assert_eq!(moved.memory(), vk::DeviceMemory::from_raw(11));
        assert!(moved.take().is_some());
    }

    #[test]
    fn test_null_pair_owns_nothing() {
        let mut handles = ResourceHandles::<vk::Image>::default();
        assert!(!handles.is_live());
        assert_eq!(handles.take(), None);
    }
}
