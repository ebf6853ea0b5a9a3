use {
    ahash::AHashMap,
    ash::vk,
    std::{
        fmt::{Debug, Display, Formatter},
        sync::LazyLock,
    },
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Subsampling {
    None,
    Yuv422,
    Yuv420,
}

#[derive(Copy, Clone, Debug)]
pub struct FormatPlane {
    pub aspect: vk::ImageAspectFlags,
    pub bpp: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct Format {
    pub name: &'static str,
    pub drm: u32,
    /// `UNDEFINED` if there is no Vulkan format with the exact same memory layout.
    pub vk_format: vk::Format,
    pub subsampling: Subsampling,
    pub planes: &'static [FormatPlane],
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        self.drm == other.drm
    }
}

impl Eq for Format {}

impl Format {
    /// Returns the extent of a plane of an image of the given size.
    pub fn plane_extent(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 {
            return (width, height);
        }
        match self.subsampling {
            Subsampling::None => (width, height),
            Subsampling::Yuv422 => (width / 2, height),
            Subsampling::Yuv420 => (width / 2, height / 2),
        }
    }
}

static FORMATS_MAP: LazyLock<AHashMap<u32, &'static Format>> = LazyLock::new(|| {
    let mut map = AHashMap::new();
    for format in FORMATS {
        assert!(map.insert(format.drm, *format).is_none());
    }
    map
});

pub fn formats() -> &'static AHashMap<u32, &'static Format> {
    &FORMATS_MAP
}

/// Looks up a format by its name or by its fourcc code.
///
/// Fourcc codes shorter than four characters are padded with spaces.
pub fn format_by_name(name: &str) -> Option<&'static Format> {
    if let Some(format) = FORMATS.iter().copied().find(|f| f.name.eq_ignore_ascii_case(name)) {
        return Some(format);
    }
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 4 {
        return None;
    }
    let mut code = [b' '; 4];
    code[..bytes.len()].copy_from_slice(bytes);
    formats().get(&u32::from_le_bytes(code)).copied()
}

const fn fourcc_code(a: char, b: char, c: char, d: char) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

pub struct FourCc(pub u32);

impl Display for FourCc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for shift in [0, 8, 16, 24] {
            write!(f, "{}", (self.0 >> shift) as u8 as char)?;
        }
        Ok(())
    }
}

impl Debug for FourCc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

const fn default() -> Format {
    Format {
        name: "",
        drm: 0,
        vk_format: vk::Format::UNDEFINED,
        subsampling: Subsampling::None,
        planes: &[],
    }
}

const fn color(bpp: u32) -> FormatPlane {
    FormatPlane {
        aspect: vk::ImageAspectFlags::COLOR,
        bpp,
    }
}

const COLOR_8: &[FormatPlane] = &[color(8)];
const COLOR_16: &[FormatPlane] = &[color(16)];
const COLOR_24: &[FormatPlane] = &[color(24)];
const COLOR_32: &[FormatPlane] = &[color(32)];
const COLOR_64: &[FormatPlane] = &[color(64)];

const fn plane(idx: usize, bpp: u32) -> FormatPlane {
    let aspect = [
        vk::ImageAspectFlags::PLANE_0,
        vk::ImageAspectFlags::PLANE_1,
        vk::ImageAspectFlags::PLANE_2,
    ][idx];
    FormatPlane { aspect, bpp }
}

const TWO_PLANES_8_16: &[FormatPlane] = &[plane(0, 8), plane(1, 16)];
const TWO_PLANES_16_32: &[FormatPlane] = &[plane(0, 16), plane(1, 32)];
const THREE_PLANES_8: &[FormatPlane] = &[plane(0, 8), plane(1, 8), plane(2, 8)];

pub static BGR565: &Format = &Format {
    name: "bgr565",
    drm: fourcc_code('B', 'G', '1', '6'),
    vk_format: vk::Format::B5G6R5_UNORM_PACK16,
    planes: COLOR_16,
    ..default()
};

pub static RGB565: &Format = &Format {
    name: "rgb565",
    drm: fourcc_code('R', 'G', '1', '6'),
    vk_format: vk::Format::R5G6B5_UNORM_PACK16,
    planes: COLOR_16,
    ..default()
};

pub static R8: &Format = &Format {
    name: "r8",
    drm: fourcc_code('R', '8', ' ', ' '),
    vk_format: vk::Format::R8_UNORM,
    planes: COLOR_8,
    ..default()
};

pub static GR88: &Format = &Format {
    name: "gr88",
    drm: fourcc_code('G', 'R', '8', '8'),
    vk_format: vk::Format::R8G8_UNORM,
    planes: COLOR_16,
    ..default()
};

pub static BGR888: &Format = &Format {
    name: "bgr888",
    drm: fourcc_code('B', 'G', '2', '4'),
    vk_format: vk::Format::R8G8B8_UNORM,
    planes: COLOR_24,
    ..default()
};

pub static RGB888: &Format = &Format {
    name: "rgb888",
    drm: fourcc_code('R', 'G', '2', '4'),
    vk_format: vk::Format::B8G8R8_UNORM,
    planes: COLOR_24,
    ..default()
};

pub static ABGR8888: &Format = &Format {
    name: "abgr8888",
    drm: fourcc_code('A', 'B', '2', '4'),
    vk_format: vk::Format::R8G8B8A8_UNORM,
    planes: COLOR_32,
    ..default()
};

pub static XBGR8888: &Format = &Format {
    name: "xbgr8888",
    drm: fourcc_code('X', 'B', '2', '4'),
    planes: COLOR_32,
    ..default()
};

pub static ARGB8888: &Format = &Format {
    name: "argb8888",
    drm: fourcc_code('A', 'R', '2', '4'),
    vk_format: vk::Format::B8G8R8A8_UNORM,
    planes: COLOR_32,
    ..default()
};

pub static XRGB8888: &Format = &Format {
    name: "xrgb8888",
    drm: fourcc_code('X', 'R', '2', '4'),
    planes: COLOR_32,
    ..default()
};

pub static ABGR2101010: &Format = &Format {
    name: "abgr2101010",
    drm: fourcc_code('A', 'B', '3', '0'),
    vk_format: vk::Format::A2B10G10R10_UNORM_PACK32,
    planes: COLOR_32,
    ..default()
};

pub static XBGR2101010: &Format = &Format {
    name: "xbgr2101010",
    drm: fourcc_code('X', 'B', '3', '0'),
    planes: COLOR_32,
    ..default()
};

pub static ARGB2101010: &Format = &Format {
    name: "argb2101010",
    drm: fourcc_code('A', 'R', '3', '0'),
    vk_format: vk::Format::A2R10G10B10_UNORM_PACK32,
    planes: COLOR_32,
    ..default()
};

pub static XRGB2101010: &Format = &Format {
    name: "xrgb2101010",
    drm: fourcc_code('X', 'R', '3', '0'),
    planes: COLOR_32,
    ..default()
};

pub static R16: &Format = &Format {
    name: "r16",
    drm: fourcc_code('R', '1', '6', ' '),
    vk_format: vk::Format::R16_UNORM,
    planes: COLOR_16,
    ..default()
};

pub static ABGR16161616F: &Format = &Format {
    name: "abgr16161616f",
    drm: fourcc_code('A', 'B', '4', 'H'),
    vk_format: vk::Format::R16G16B16A16_SFLOAT,
    planes: COLOR_64,
    ..default()
};

pub static YUYV: &Format = &Format {
    name: "yuyv",
    drm: fourcc_code('Y', 'U', 'Y', 'V'),
    vk_format: vk::Format::G8B8G8R8_422_UNORM,
    subsampling: Subsampling::Yuv422,
    planes: COLOR_32,
};

pub static UYVY: &Format = &Format {
    name: "uyvy",
    drm: fourcc_code('U', 'Y', 'V', 'Y'),
    vk_format: vk::Format::B8G8R8G8_422_UNORM,
    subsampling: Subsampling::Yuv422,
    planes: COLOR_32,
};

pub static NV12: &Format = &Format {
    name: "nv12",
    drm: fourcc_code('N', 'V', '1', '2'),
    vk_format: vk::Format::G8_B8R8_2PLANE_420_UNORM,
    subsampling: Subsampling::Yuv420,
    planes: TWO_PLANES_8_16,
};

pub static NV21: &Format = &Format {
    name: "nv21",
    drm: fourcc_code('N', 'V', '2', '1'),
    vk_format: vk::Format::UNDEFINED,
    subsampling: Subsampling::Yuv420,
    planes: TWO_PLANES_8_16,
};

pub static YUV420: &Format = &Format {
    name: "yuv420",
    drm: fourcc_code('Y', 'U', '1', '2'),
    vk_format: vk::Format::G8_B8_R8_3PLANE_420_UNORM,
    subsampling: Subsampling::Yuv420,
    planes: THREE_PLANES_8,
};

pub static YVU420: &Format = &Format {
    name: "yvu420",
    drm: fourcc_code('Y', 'V', '1', '2'),
    vk_format: vk::Format::UNDEFINED,
    subsampling: Subsampling::Yuv420,
    planes: THREE_PLANES_8,
};

pub static P010: &Format = &Format {
    name: "p010",
    drm: fourcc_code('P', '0', '1', '0'),
    vk_format: vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16,
    subsampling: Subsampling::Yuv420,
    planes: TWO_PLANES_16_32,
};

pub static P016: &Format = &Format {
    name: "p016",
    drm: fourcc_code('P', '0', '1', '6'),
    vk_format: vk::Format::G16_B16R16_2PLANE_420_UNORM,
    subsampling: Subsampling::Yuv420,
    planes: TWO_PLANES_16_32,
};

pub static FORMATS: &[&Format] = &[
    BGR565,
    RGB565,
    R8,
    GR88,
    BGR888,
    RGB888,
    ABGR8888,
    XBGR8888,
    ARGB8888,
    XRGB8888,
    ABGR2101010,
    XBGR2101010,
    ARGB2101010,
    XRGB2101010,
    R16,
    ABGR16161616F,
    YUYV,
    UYVY,
    NV12,
    NV21,
    YUV420,
    YVU420,
    P010,
    P016,
];

#[test]
fn formats_dont_panic() {
    formats();
}

#[test]
fn plane_counts() {
    for format in FORMATS {
        assert!(!format.planes.is_empty(), "{}", format.name);
        assert!(format.planes.len() <= 3, "{}", format.name);
        if format.planes.len() == 1 {
            assert_eq!(format.planes[0].aspect, vk::ImageAspectFlags::COLOR);
        }
    }
}

#[test]
fn fourcc_display() {
    assert_eq!(FourCc(NV12.drm).to_string(), "NV12");
    assert_eq!(FourCc(ARGB8888.drm).to_string(), "AR24");
    assert_eq!(formats()[&fourcc_code('P', '0', '1', '0')].name, "p010");
}

#[test]
fn lookup_by_name() {
    assert_eq!(format_by_name("nv12"), Some(NV12));
    assert_eq!(format_by_name("ABGR16161616F"), Some(ABGR16161616F));
    assert_eq!(format_by_name("AR24"), Some(ARGB8888));
    assert_eq!(format_by_name("R8"), Some(R8));
    assert_eq!(format_by_name("nope"), None);
    assert_eq!(format_by_name(""), None);
}

#[test]
fn subsampled_extents() {
    assert_eq!(ARGB8888.plane_extent(0, 300, 300), (300, 300));
    assert_eq!(YUYV.plane_extent(0, 300, 300), (300, 300));
    assert_eq!(NV12.plane_extent(0, 300, 300), (300, 300));
    assert_eq!(NV12.plane_extent(1, 300, 300), (150, 150));
    assert_eq!(YUV420.plane_extent(2, 300, 300), (150, 150));
    assert_eq!(YUYV.plane_extent(1, 300, 300), (150, 300));
}
