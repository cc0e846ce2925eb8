//! Ordered release of the handles a resource owns.
//!
//! A buffer owns a buffer handle and its memory. A texture owns an image,
//! its memory and optionally a view and a sampler. Releasing goes view,
//! sampler, image or buffer, memory, and happens exactly once because
//! [`ImageHandles::release`] and [`BufferHandles::release`] consume the
//! handle set.
//!
//! The [`HandleReleaser`] trait is the seam between resources and the
//! device. [`Device`](crate::device::Device) implements it with real Vulkan
//! calls; tests implement it with a counter of outstanding handles.

use ash::vk;

/// Destroys raw handles. Implemented by the device.
pub trait HandleReleaser {
    /// Memory backing an image or buffer.
    type Memory;

    fn destroy_image_view(&self, view: vk::ImageView);
    fn destroy_sampler(&self, sampler: vk::Sampler);
    fn destroy_image(&self, image: vk::Image);
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn free_memory(&self, memory: Self::Memory);
}

/// Handles owned by one image.
#[derive(Debug)]
pub struct ImageHandles<M> {
    pub image: vk::Image,
    pub memory: M,
    pub view: Option<vk::ImageView>,
    pub sampler: Option<vk::Sampler>,
}

impl<M> ImageHandles<M> {
    /// Number of handles this set releases.
    pub fn handle_count(&self) -> usize {
        2 + usize::from(self.view.is_some()) + usize::from(self.sampler.is_some())
    }

    /// Releases view, sampler, image and memory in that order.
    pub fn release<R: HandleReleaser<Memory = M> + ?Sized>(self, releaser: &R) {
        if let Some(view) = self.view {
            releaser.destroy_image_view(view);
        }
        if let Some(sampler) = self.sampler {
            releaser.destroy_sampler(sampler);
        }
        releaser.destroy_image(self.image);
        releaser.free_memory(self.memory);
    }
}

/// Handles owned by one buffer.
#[derive(Debug)]
pub struct BufferHandles<M> {
    pub buffer: vk::Buffer,
    pub memory: M,
}

impl<M> BufferHandles<M> {
    /// Releases the buffer, then its memory.
    pub fn release<R: HandleReleaser<Memory = M> + ?Sized>(self, releaser: &R) {
        releaser.destroy_buffer(self.buffer);
        releaser.free_memory(self.memory);
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Counts handles handed out and released, and records release order.
    #[derive(Default)]
    pub struct CountingReleaser {
        pub outstanding: Cell<i64>,
        pub log: RefCell<Vec<&'static str>>,
    }

    impl CountingReleaser {
        /// Registers `count` handles as allocated.
        pub fn allocate(&self, count: usize) {
            self.outstanding.set(self.outstanding.get() + count as i64);
        }

        fn released(&self, what: &'static str) {
            self.outstanding.set(self.outstanding.get() - 1);
            self.log.borrow_mut().push(what);
        }
    }

    impl HandleReleaser for CountingReleaser {
        type Memory = u32;

        fn destroy_image_view(&self, _view: vk::ImageView) {
            self.released("view");
        }

        fn destroy_sampler(&self, _sampler: vk::Sampler) {
            self.released("sampler");
        }

        fn destroy_image(&self, _image: vk::Image) {
            self.released("image");
        }

        fn destroy_buffer(&self, _buffer: vk::Buffer) {
            self.released("buffer");
        }

        fn free_memory(&self, _memory: u32) {
            self.released("memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::mock::CountingReleaser;
    use super::*;

    #[test]
    fn test_texture_release_frees_all_four_handles() {
        let releaser = CountingReleaser::default();
        let handles = ImageHandles {
            image: vk::Image::from_raw(1),
            memory: 7u32,
            view: Some(vk::ImageView::from_raw(2)),
            sampler: Some(vk::Sampler::from_raw(3)),
        };
        releaser.allocate(handles.handle_count());
        assert_eq!(releaser.outstanding.get(), 4);

        handles.release(&releaser);

        assert_eq!(releaser.outstanding.get(), 0);
        assert_eq!(
            *releaser.log.borrow(),
            vec!["view", "sampler", "image", "memory"]
        );
    }

    #[test]
    fn test_storage_only_image_has_no_view() {
        let releaser = CountingReleaser::default();
        let handles = ImageHandles {
            image: vk::Image::from_raw(1),
            memory: 0u32,
            view: None,
            sampler: None,
        };
        releaser.allocate(handles.handle_count());
        handles.release(&releaser);

        assert_eq!(releaser.outstanding.get(), 0);
        assert_eq!(*releaser.log.borrow(), vec!["image", "memory"]);
    }

    #[test]
    fn test_buffer_release_order() {
        let releaser = CountingReleaser::default();
        releaser.allocate(2);
        BufferHandles {
            buffer: vk::Buffer::from_raw(9),
            memory: 1u32,
        }
        .release(&releaser);

        assert_eq!(releaser.outstanding.get(), 0);
        assert_eq!(*releaser.log.borrow(), vec!["buffer", "memory"]);
    }
}
