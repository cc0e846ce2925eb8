//! Descriptor set management for shader resource binding.
//!
//! Binding happens in three steps:
//! 1. Declare every slot with [`DescriptorManager::set_descriptor`]
//! 2. Build the layout, then the pool, then the sets
//! 3. Stage writes on a [`DescriptorSet`] and commit them with
//!    [`DescriptorSet::update`]
//!
//! Re-declaring a slot replaces the earlier declaration. Staging the same
//! slot twice before an update keeps only the last write.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use multipass_rhi::device::Device;
//! use multipass_rhi::descriptor::DescriptorManager;
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), multipass_rhi::RhiError> {
//! let mut manager = DescriptorManager::new(device.clone());
//! manager.set_descriptor(0, vk::DescriptorType::UNIFORM_BUFFER, 1)?;
//! manager.create_layout()?;
//! manager.create_pool()?;
//! let mut sets = manager.create_descriptor_sets(1)?;
//! sets[0].set_buffer(0, ubo, 64);
//! sets[0].update(device.as_ref());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{ResourceKind, RhiError, RhiResult};

/// Number of sets a pool created by [`DescriptorManager::create_pool`] can hold.
pub const DEFAULT_MAX_SETS: u32 = 4;

/// One declared binding slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotDecl {
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
}

/// The declared slots of one layout, ordered by binding index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorLayoutDecl {
    slots: BTreeMap<u32, SlotDecl>,
}

impl DescriptorLayoutDecl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `binding`. A second declaration of the same index replaces
    /// the first and is returned.
    pub fn set_descriptor(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
    ) -> Option<SlotDecl> {
        let previous = self.slots.insert(
            binding,
            SlotDecl {
                descriptor_type,
                count,
            },
        );
        if let Some(previous) = previous {
            warn!(
                "Descriptor binding {} re-declared: {:?}x{} replaced by {:?}x{}",
                binding, previous.descriptor_type, previous.count, descriptor_type, count
            );
        }
        previous
    }

    pub fn slot(&self, binding: u32) -> Option<SlotDecl> {
        self.slots.get(&binding).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Layout bindings, visible to every shader stage.
    pub fn layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.slots
            .iter()
            .map(|(&binding, slot)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(slot.descriptor_type)
                    .descriptor_count(slot.count)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect()
    }

    /// Pool sizes for `max_sets` sets: each descriptor type's total count
    /// across all slots, times `max_sets`.
    pub fn pool_sizes(&self, max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut totals: Vec<(vk::DescriptorType, u32)> = Vec::new();
        for slot in self.slots.values() {
            match totals
                .iter_mut()
                .find(|(ty, _)| *ty == slot.descriptor_type)
            {
                Some((_, total)) => *total += slot.count,
                None => totals.push((slot.descriptor_type, slot.count)),
            }
        }

        totals
            .into_iter()
            .map(|(ty, total)| {
                vk::DescriptorPoolSize::default()
                    .ty(ty)
                    .descriptor_count(total * max_sets)
            })
            .collect()
    }
}

/// Owner of a `VkDescriptorSetLayout`.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)
        }
        .map_err(RhiError::creation(ResourceKind::DescriptorSetLayout))?;

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Owner of a fixed-size `VkDescriptorPool`. Sets are freed with the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::DescriptorPool))?;

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) }
            .map_err(RhiError::creation(ResourceKind::DescriptorSet))?;

        debug!("Allocated {} descriptor set(s)", sets.len());
        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Builds the layout, pool and sets for one declared slot table.
pub struct DescriptorManager {
    device: Arc<Device>,
    decl: DescriptorLayoutDecl,
    pool: Option<DescriptorPool>,
    layout: Option<DescriptorSetLayout>,
    max_sets: u32,
    allocated: u32,
}

impl DescriptorManager {
    pub fn new(device: Arc<Device>) -> Self {
        Self::with_max_sets(device, DEFAULT_MAX_SETS)
    }

    pub fn with_max_sets(device: Arc<Device>, max_sets: u32) -> Self {
        Self {
            device,
            decl: DescriptorLayoutDecl::new(),
            pool: None,
            layout: None,
            max_sets,
            allocated: 0,
        }
    }

    /// Declares a binding slot. Must come before [`Self::create_layout`].
    pub fn set_descriptor(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
    ) -> RhiResult<()> {
        if self.layout.is_some() {
            return Err(RhiError::InvalidState(format!(
                "binding {binding} declared after the layout was created"
            )));
        }
        self.decl.set_descriptor(binding, descriptor_type, count);
        Ok(())
    }

    /// Builds the immutable layout from every declared slot.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidState`] when nothing was declared or the layout
    /// already exists.
    pub fn create_layout(&mut self) -> RhiResult<vk::DescriptorSetLayout> {
        if self.layout.is_some() {
            return Err(RhiError::InvalidState(
                "descriptor set layout already created".to_string(),
            ));
        }
        if self.decl.is_empty() {
            return Err(RhiError::InvalidState(
                "no descriptor bindings declared".to_string(),
            ));
        }
        let layout = DescriptorSetLayout::new(self.device.clone(), &self.decl.layout_bindings())?;
        let handle = layout.handle();
        self.layout = Some(layout);
        Ok(handle)
    }

    /// Sizes the pool from the declared slots.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidState`] before [`Self::create_layout`] or on a
    /// second call.
    pub fn create_pool(&mut self) -> RhiResult<()> {
        if self.layout.is_none() {
            return Err(RhiError::InvalidState(
                "descriptor pool requested before the layout".to_string(),
            ));
        }
        if self.pool.is_some() {
            return Err(RhiError::InvalidState(
                "descriptor pool already created".to_string(),
            ));
        }
        let sizes = self.decl.pool_sizes(self.max_sets);
        self.pool = Some(DescriptorPool::new(
            self.device.clone(),
            self.max_sets,
            &sizes,
        )?);
        Ok(())
    }

    /// Allocates `count` sets with the layout.
    pub fn create_descriptor_sets(&mut self, count: u32) -> RhiResult<Vec<DescriptorSet>> {
        let (Some(layout), Some(pool)) = (&self.layout, &self.pool) else {
            return Err(RhiError::InvalidState(
                "descriptor sets requested before layout and pool".to_string(),
            ));
        };
        if self.allocated + count > self.max_sets {
            return Err(RhiError::InvalidState(format!(
                "pool holds {} sets, {} already allocated, {} requested",
                self.max_sets, self.allocated, count
            )));
        }

        let layouts = vec![layout.handle(); count as usize];
        let sets = pool.allocate(&layouts)?;
        self.allocated += count;
        Ok(sets.into_iter().map(DescriptorSet::new).collect())
    }

    #[inline]
    pub fn layout(&self) -> Option<vk::DescriptorSetLayout> {
        self.layout.as_ref().map(DescriptorSetLayout::handle)
    }

    #[inline]
    pub fn declaration(&self) -> &DescriptorLayoutDecl {
        &self.decl
    }
}

/// Commits descriptor writes. Implemented by the device.
pub trait DescriptorUpdater {
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]);
}

impl DescriptorUpdater for Device {
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        unsafe { self.handle().update_descriptor_sets(writes, &[]) };
    }
}

/// A write waiting for [`DescriptorSet::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StagedWrite {
    UniformBuffer {
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

/// A descriptor set plus its pending writes.
#[derive(Debug)]
pub struct DescriptorSet {
    handle: vk::DescriptorSet,
    staged: BTreeMap<u32, StagedWrite>,
}

impl DescriptorSet {
    pub fn new(handle: vk::DescriptorSet) -> Self {
        Self {
            handle,
            staged: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    /// Stages a uniform buffer for `slot`, replacing any pending write.
    pub fn set_buffer(&mut self, slot: u32, buffer: vk::Buffer, range: vk::DeviceSize) {
        self.staged
            .insert(slot, StagedWrite::UniformBuffer { buffer, range });
    }

    /// Stages a combined image sampler for `slot`, replacing any pending write.
    pub fn set_image(
        &mut self,
        slot: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        self.staged.insert(
            slot,
            StagedWrite::CombinedImageSampler {
                view,
                sampler,
                layout,
            },
        );
    }

    /// Number of slots with a pending write.
    pub fn pending(&self) -> usize {
        self.staged.len()
    }

    /// Commits every staged write in one call and returns how many were
    /// written. With nothing staged the updater is not called at all.
    pub fn update<U: DescriptorUpdater + ?Sized>(&mut self, updater: &U) -> usize {
        if self.staged.is_empty() {
            return 0;
        }

        let buffer_infos: Vec<vk::DescriptorBufferInfo> = self
            .staged
            .values()
            .filter_map(|write| match *write {
                StagedWrite::UniformBuffer { buffer, range } => Some(
                    vk::DescriptorBufferInfo::default()
                        .buffer(buffer)
                        .offset(0)
                        .range(range),
                ),
                StagedWrite::CombinedImageSampler { .. } => None,
            })
            .collect();
        let image_infos: Vec<vk::DescriptorImageInfo> = self
            .staged
            .values()
            .filter_map(|write| match *write {
                StagedWrite::CombinedImageSampler {
                    view,
                    sampler,
                    layout,
                } => Some(
                    vk::DescriptorImageInfo::default()
                        .image_view(view)
                        .sampler(sampler)
                        .image_layout(layout),
                ),
                StagedWrite::UniformBuffer { .. } => None,
            })
            .collect();

        let mut buffers = buffer_infos.iter();
        let mut images = image_infos.iter();
        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .staged
            .iter()
            .filter_map(|(&slot, write)| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(self.handle)
                    .dst_binding(slot)
                    .dst_array_element(0);
                match write {
                    StagedWrite::UniformBuffer { .. } => buffers.next().map(|info| {
                        base.descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                            .buffer_info(std::slice::from_ref(info))
                    }),
                    StagedWrite::CombinedImageSampler { .. } => images.next().map(|info| {
                        base.descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                            .image_info(std::slice::from_ref(info))
                    }),
                }
            })
            .collect();

        updater.update_descriptor_sets(&writes);
        let written = writes.len();
        self.staged.clear();
        debug!("Committed {} descriptor write(s)", written);
        written
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use ash::vk::Handle;

    use super::*;

    /// Records (binding, type, resource handle) for every committed write.
    #[derive(Default)]
    struct RecordingUpdater {
        calls: RefCell<usize>,
        writes: RefCell<Vec<(u32, vk::DescriptorType, u64)>>,
    }

    impl DescriptorUpdater for RecordingUpdater {
        fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
            *self.calls.borrow_mut() += 1;
            for write in writes {
                let resource = if write.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER {
                    unsafe { (*write.p_buffer_info).buffer.as_raw() }
                } else {
                    unsafe { (*write.p_image_info).image_view.as_raw() }
                };
                self.writes
                    .borrow_mut()
                    .push((write.dst_binding, write.descriptor_type, resource));
            }
        }
    }

    #[test]
    fn test_update_with_nothing_staged_is_noop() {
        let updater = RecordingUpdater::default();
        let mut set = DescriptorSet::new(vk::DescriptorSet::null());

        assert_eq!(set.update(&updater), 0);
        assert_eq!(*updater.calls.borrow(), 0);
        assert!(updater.writes.borrow().is_empty());
    }

    #[test]
    fn test_same_slot_twice_writes_once_last_wins() {
        let updater = RecordingUpdater::default();
        let mut set = DescriptorSet::new(vk::DescriptorSet::null());

        set.set_buffer(2, vk::Buffer::from_raw(10), 64);
        set.set_buffer(2, vk::Buffer::from_raw(20), 64);
        assert_eq!(set.pending(), 1);

        assert_eq!(set.update(&updater), 1);
        assert_eq!(
            *updater.writes.borrow(),
            vec![(2, vk::DescriptorType::UNIFORM_BUFFER, 20)]
        );
    }

    #[test]
    fn test_mixed_writes_committed_in_one_batch() {
        let updater = RecordingUpdater::default();
        let mut set = DescriptorSet::new(vk::DescriptorSet::null());

        set.set_image(
            0,
            vk::ImageView::from_raw(1),
            vk::Sampler::from_raw(5),
            vk::ImageLayout::GENERAL,
        );
        set.set_image(
            1,
            vk::ImageView::from_raw(2),
            vk::Sampler::from_raw(5),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );
        set.set_buffer(2, vk::Buffer::from_raw(3), 64);

        assert_eq!(set.update(&updater), 3);
        assert_eq!(*updater.calls.borrow(), 1);
        assert_eq!(
            *updater.writes.borrow(),
            vec![
                (0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
                (1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
                (2, vk::DescriptorType::UNIFORM_BUFFER, 3),
            ]
        );

        // Staging is cleared after a commit.
        assert_eq!(set.pending(), 0);
        assert_eq!(set.update(&updater), 0);
        assert_eq!(*updater.calls.borrow(), 1);
    }

    #[test]
    fn test_redeclared_binding_last_write_wins() {
        let mut decl = DescriptorLayoutDecl::new();
        assert!(
            decl.set_descriptor(0, vk::DescriptorType::UNIFORM_BUFFER, 1)
                .is_none()
        );
        let previous = decl.set_descriptor(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);

        assert_eq!(
            previous.map(|slot| slot.descriptor_type),
            Some(vk::DescriptorType::UNIFORM_BUFFER)
        );
        assert_eq!(decl.len(), 1);
        assert_eq!(
            decl.slot(0).map(|slot| slot.descriptor_type),
            Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        );

        // Pool sizes follow the final declaration only.
        let sizes = decl.pool_sizes(4);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 4);
    }

    #[test]
    fn test_pool_sizes_aggregate_per_type() {
        let mut decl = DescriptorLayoutDecl::new();
        decl.set_descriptor(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);
        decl.set_descriptor(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);
        decl.set_descriptor(2, vk::DescriptorType::UNIFORM_BUFFER, 1);

        let sizes = decl.pool_sizes(DEFAULT_MAX_SETS);
        let images = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .map(|s| s.descriptor_count);
        let buffers = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .map(|s| s.descriptor_count);
        assert_eq!(images, Some(8));
        assert_eq!(buffers, Some(4));
    }

    #[test]
    fn test_layout_bindings_sorted_and_visible_everywhere() {
        let mut decl = DescriptorLayoutDecl::new();
        decl.set_descriptor(2, vk::DescriptorType::UNIFORM_BUFFER, 1);
        decl.set_descriptor(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1);

        let bindings = decl.layout_bindings();
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[1].binding, 2);
        assert!(
            bindings
                .iter()
                .all(|b| b.stage_flags == vk::ShaderStageFlags::ALL)
        );
    }
}
