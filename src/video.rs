use arrayvec::ArrayVec;

pub type Modifier = u64;

pub const LINEAR_MODIFIER: Modifier = 0;

/// The maximum number of memory planes of an externally shareable image.
///
/// Limited by the number of `MEMORY_PLANE_*_EXT` aspects.
pub const MAX_PLANES: usize = 4;

pub type PlaneVec<T> = ArrayVec<T, MAX_PLANES>;

/// The byte offset and row pitch of a memory plane.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PlaneLayout {
    pub offset: u64,
    pub pitch: u64,
}
