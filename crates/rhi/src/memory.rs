//! Device memory type selection.

use ash::vk;

use crate::error::{RhiError, RhiResult};

/// Finds the lowest memory type index allowed by `type_bits` whose property
/// flags contain every flag in `required`.
///
/// `type_bits` is the `memory_type_bits` field of a resource's
/// `vk::MemoryRequirements`.
///
/// # Errors
///
/// Returns [`RhiError::NoCompatibleMemoryType`] when no type qualifies. This
/// means the platform cannot back the resource at all.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&index| {
            type_bits & (1 << index) != 0
                && memory_properties.memory_types[index as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RhiError::NoCompatibleMemoryType {
            type_bits,
            properties: required,
        })
}

/// Returns true if the memory type at `index` is host visible.
pub fn is_host_visible(memory_properties: &vk::PhysicalDeviceMemoryProperties, index: u32) -> bool {
    memory_properties
        .memory_types
        .get(index as usize)
        .is_some_and(|ty| {
            ty.property_flags
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;

    /// Typical discrete GPU layout: VRAM, system RAM, BAR.
    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    fn discrete() -> vk::PhysicalDeviceMemoryProperties {
        properties(&[
            DEVICE_LOCAL,
            HOST_VISIBLE | HOST_COHERENT,
            DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT,
        ])
    }

    #[test]
    fn test_lowest_matching_index_wins() {
        let props = discrete();
        assert_eq!(find_memory_type(&props, 0b111, DEVICE_LOCAL).unwrap(), 0);
        assert_eq!(
            find_memory_type(&props, 0b111, HOST_VISIBLE | HOST_COHERENT).unwrap(),
            1
        );
    }

    #[test]
    fn test_type_bits_exclude_candidates() {
        let props = discrete();
        // Type 0 masked out, so the next device-local type is chosen
        assert_eq!(find_memory_type(&props, 0b110, DEVICE_LOCAL).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b100, HOST_VISIBLE | HOST_COHERENT).unwrap(),
            2
        );
    }

    #[test]
    fn test_all_requested_flags_must_be_present() {
        // Type 0 has only one of the two requested flags
        let props = properties(&[HOST_VISIBLE, HOST_VISIBLE | HOST_COHERENT]);
        assert_eq!(
            find_memory_type(&props, 0b11, HOST_VISIBLE | HOST_COHERENT).unwrap(),
            1
        );
    }

    #[test]
    fn test_no_match_is_error() {
        let props = discrete();
        let err = find_memory_type(&props, 0b001, HOST_VISIBLE).unwrap_err();
        match err {
            RhiError::NoCompatibleMemoryType {
                type_bits,
                properties,
            } => {
                assert_eq!(type_bits, 0b001);
                assert_eq!(properties, HOST_VISIBLE);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(find_memory_type(&props, 0, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn test_bits_beyond_type_count_ignored() {
        let props = properties(&[HOST_VISIBLE]);
        assert!(find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn test_is_host_visible() {
        let props = discrete();
        assert!(!is_host_visible(&props, 0));
        assert!(is_host_visible(&props, 1));
        assert!(!is_host_visible(&props, 64));
    }
}
