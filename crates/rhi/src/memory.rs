//! Device memory type selection.
//!
//! Allocation itself goes through `gpu-allocator`. Before an allocation is
//! requested, the resource's requirement mask is checked against the physical
//! device's memory-type table with [`find_memory_type_index`]. A resource
//! that no memory type can back fails with
//! [`RhiError::NoCompatibleMemoryType`] up front, and no null handle is
//! ever produced.

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::error::{RhiError, RhiResult};

/// Finds the first memory type allowed by `type_bits` whose property flags
/// contain every bit of `required`.
///
/// There is no fallback: when nothing matches, the caller gets
/// [`RhiError::NoCompatibleMemoryType`].
pub fn find_memory_type_index(
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    properties: &vk::PhysicalDeviceMemoryProperties,
) -> RhiResult<u32> {
    let count = properties
        .memory_type_count
        .min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&index| {
            type_bits & (1 << index) != 0
                && properties.memory_types[index as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RhiError::NoCompatibleMemoryType {
            type_bits,
            required,
        })
}

/// Property flags a memory location must provide.
///
/// Buffers written from the CPU need host-visible memory. Render targets
/// and sampled images need device-local memory.
pub fn required_flags(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu => {
            vk::MemoryPropertyFlags::HOST_VISIBLE
        }
        MemoryLocation::Unknown => vk::MemoryPropertyFlags::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (index, flag) in flags.iter().enumerate() {
            properties.memory_types[index] = vk::MemoryType {
                property_flags: *flag,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn test_selects_only_matching_type() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::empty(),
            host,
        ]);

        let index = find_memory_type_index(
            0b1000,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            &properties,
        )
        .unwrap();
        assert_eq!(index, 3);
    }

    #[test]
    fn test_no_match_is_typed_error() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        // Type 1 is host visible but the mask only allows type 0.
        let result =
            find_memory_type_index(0b01, vk::MemoryPropertyFlags::HOST_VISIBLE, &properties);
        match result {
            Err(RhiError::NoCompatibleMemoryType {
                type_bits,
                required,
            }) => {
                assert_eq!(type_bits, 0b01);
                assert_eq!(required, vk::MemoryPropertyFlags::HOST_VISIBLE);
            }
            other => panic!("expected NoCompatibleMemoryType, got {other:?}"),
        }
    }

    #[test]
    fn test_flags_must_be_superset() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type_index(0b11, wanted, &properties).unwrap(), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(
            find_memory_type_index(0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL, &properties)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_type_bits_beyond_count_ignored() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(
            find_memory_type_index(0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL, &properties)
                .is_err()
        );
    }

    #[test]
    fn test_required_flags_per_location() {
        assert_eq!(
            required_flags(MemoryLocation::GpuOnly),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            required_flags(MemoryLocation::CpuToGpu),
            vk::MemoryPropertyFlags::HOST_VISIBLE
        );
    }
}
