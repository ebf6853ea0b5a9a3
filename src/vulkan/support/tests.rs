use {
    crate::vulkan::support::{
        MemoryTypes, is_external_memory_supported, memory_type_mask, select_memory_types,
    },
    ash::vk::{
        ExternalMemoryFeatureFlags, ExternalMemoryHandleTypeFlags, ExternalMemoryProperties,
        MemoryPropertyFlags, MemoryType,
    },
};

const DEVICE_LOCAL: MemoryPropertyFlags = MemoryPropertyFlags::DEVICE_LOCAL;
const HOST_VISIBLE: MemoryPropertyFlags = MemoryPropertyFlags::HOST_VISIBLE;
const HOST_COHERENT: MemoryPropertyFlags = MemoryPropertyFlags::HOST_COHERENT;
const HOST_CACHED: MemoryPropertyFlags = MemoryPropertyFlags::HOST_CACHED;

fn ty(property_flags: MemoryPropertyFlags) -> MemoryType {
    MemoryType {
        property_flags,
        heap_index: 0,
    }
}

fn types() -> Vec<MemoryType> {
    vec![
        ty(DEVICE_LOCAL),
        ty(HOST_VISIBLE | HOST_COHERENT),
        ty(HOST_VISIBLE | HOST_CACHED),
        ty(DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT),
    ]
}

#[test]
fn mask_contains_supersets() {
    let types = types();
    assert_eq!(memory_type_mask(&types, MemoryPropertyFlags::empty()), 0b1111);
    assert_eq!(memory_type_mask(&types, DEVICE_LOCAL), 0b1001);
    assert_eq!(memory_type_mask(&types, HOST_VISIBLE), 0b1110);
    assert_eq!(memory_type_mask(&types, HOST_VISIBLE | HOST_COHERENT), 0b1010);
    assert_eq!(memory_type_mask(&types, MemoryPropertyFlags::PROTECTED), 0);
}

#[test]
fn coherent_types_are_preferred() {
    let types = types();
    let mt = select_memory_types(&types, HOST_VISIBLE | HOST_COHERENT);
    assert_eq!(
        mt,
        MemoryTypes {
            mask: 0b1010,
            coherent: true,
        }
    );
}

#[test]
fn coherence_is_dropped_if_unavailable() {
    let types = types();
    let mt = select_memory_types(&types, HOST_VISIBLE | HOST_COHERENT | HOST_CACHED);
    assert_eq!(
        mt,
        MemoryTypes {
            mask: 0b0100,
            coherent: false,
        }
    );
}

#[test]
fn host_visibility_is_never_dropped() {
    let types = [ty(DEVICE_LOCAL)];
    let mt = select_memory_types(&types, HOST_VISIBLE | HOST_COHERENT);
    assert!(mt.is_empty());
    assert!(!mt.coherent);
}

fn props(
    features: ExternalMemoryFeatureFlags,
    export_from_imported: ExternalMemoryHandleTypeFlags,
    compatible: ExternalMemoryHandleTypeFlags,
) -> ExternalMemoryProperties {
    ExternalMemoryProperties {
        external_memory_features: features,
        export_from_imported_handle_types: export_from_imported,
        compatible_handle_types: compatible,
    }
}

#[test]
fn external_memory_needs_both_directions() {
    let dma_buf = ExternalMemoryHandleTypeFlags::DMA_BUF_EXT;
    let both = ExternalMemoryFeatureFlags::EXPORTABLE | ExternalMemoryFeatureFlags::IMPORTABLE;
    assert!(is_external_memory_supported(&props(both, dma_buf, dma_buf)));
    assert!(!is_external_memory_supported(&props(
        ExternalMemoryFeatureFlags::IMPORTABLE,
        dma_buf,
        dma_buf,
    )));
    assert!(!is_external_memory_supported(&props(
        ExternalMemoryFeatureFlags::EXPORTABLE,
        dma_buf,
        dma_buf,
    )));
}

#[test]
fn external_memory_needs_dma_buf_handles() {
    let dma_buf = ExternalMemoryHandleTypeFlags::DMA_BUF_EXT;
    let opaque = ExternalMemoryHandleTypeFlags::OPAQUE_FD;
    let both = ExternalMemoryFeatureFlags::EXPORTABLE | ExternalMemoryFeatureFlags::IMPORTABLE;
    assert!(!is_external_memory_supported(&props(both, opaque, dma_buf)));
    assert!(!is_external_memory_supported(&props(both, dma_buf, opaque)));
    assert!(is_external_memory_supported(&props(
        both,
        dma_buf | opaque,
        dma_buf | opaque,
    )));
}
