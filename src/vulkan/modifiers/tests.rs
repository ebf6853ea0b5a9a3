use {
    crate::{
        video::LINEAR_MODIFIER,
        vulkan::modifiers::{ModifierProperties, filter_modifiers},
    },
    ash::vk::{Format, FormatFeatureFlags},
};

fn props(modifier: u64, plane_count: usize) -> ModifierProperties {
    ModifierProperties {
        modifier,
        plane_count,
        features: FormatFeatureFlags::TRANSFER_SRC | FormatFeatureFlags::TRANSFER_DST,
    }
}

#[test]
fn too_many_planes_are_filtered() {
    let input = [
        props(LINEAR_MODIFIER, 1),
        props(0x0100000000000001, 2),
        props(0x0200000000000002, 5),
        props(0x0300000000000003, 4),
    ];
    let res = filter_modifiers(Format::B8G8R8A8_UNORM, input);
    assert_eq!(res, vec![input[0], input[1], input[3]]);
    assert!(res.iter().all(|p| p.plane_count <= 4));
}

#[test]
fn order_is_preserved() {
    let input = [props(3, 1), props(1, 1), props(2, 1)];
    let res = filter_modifiers(Format::R8_UNORM, input);
    let modifiers: Vec<_> = res.iter().map(|p| p.modifier).collect();
    assert_eq!(modifiers, [3, 1, 2]);
}

#[test]
fn empty_catalog() {
    let none: [ModifierProperties; 0] = [];
    assert!(filter_modifiers(Format::R8_UNORM, none).is_empty());
}
