//! Re-alignment of multi-plane image layouts.
//!
//! Drivers choose plane offsets and row pitches on their own. External consumers such
//! as display controllers often require both to be multiples of some alignment. The
//! functions in this module compute an explicit layout that satisfies such
//! constraints, starting from the layout the driver chose.
//!
//! When planes share a single allocation and an early plane grows, all following
//! planes have to move. The size of a plane is not known for the explicit layout, so
//! it is guessed from the size and pitch the driver reported for the original layout.
//! There is no way to verify the guess before the image has been recreated.

#[cfg(test)]
mod tests;

use smallvec::SmallVec;

/// The largest offset alignment that is ever guessed.
pub const MAX_GUESSED_OFFSET_ALIGN: u64 = 4096;

pub type PlaneLayouts = SmallVec<[PlaneLayout; 4]>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PlaneLayout {
    pub offset: u64,
    pub pitch: u64,
    /// The byte size of the plane. Only used as input.
    pub size: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Alignment {
    pub offset: u64,
    pub pitch: u64,
}

impl Alignment {
    pub const NONE: Self = Self {
        offset: 1,
        pitch: 1,
    };

    pub fn is_none(&self) -> bool {
        self.offset <= 1 && self.pitch <= 1
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::NONE
    }
}

pub fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.next_multiple_of(align)
}

/// Guesses the number of rows of a plane from its size and pitch.
pub fn guess_plane_height(plane: &PlaneLayout) -> u64 {
    if plane.pitch == 0 {
        return 0;
    }
    plane.size.div_ceil(plane.pitch)
}

/// Guesses the offset alignment the driver uses for planes.
///
/// `offset_bits` is the bitwise or of all offsets reported by the driver.
pub fn guess_offset_align(offset_bits: u64) -> u64 {
    if offset_bits == 0 {
        return MAX_GUESSED_OFFSET_ALIGN;
    }
    (1u64 << offset_bits.trailing_zeros()).min(MAX_GUESSED_OFFSET_ALIGN)
}

/// Returns the least common multiple of two alignments.
pub fn lcm(a: u64, b: u64) -> u64 {
    let (mut x, mut y) = (a.max(1), b.max(1));
    while y != 0 {
        (x, y) = (y, x % y);
    }
    a.max(1) / x * b.max(1)
}

/// Computes a layout that satisfies `align`.
///
/// Returns `None` if the driver layout already satisfies the alignment. Otherwise
/// returns the layout that the image should be recreated with. The sizes in the
/// returned layout are always 0.
///
/// `mem_count` is the number of separate allocations backing the planes. If it is
/// larger than 1, every plane is bound on its own and only offsets and pitches of
/// individual planes are adjusted.
pub fn align_layout(
    planes: &[PlaneLayout],
    mem_count: usize,
    align: Alignment,
) -> Option<PlaneLayouts> {
    if align.is_none() {
        return None;
    }
    let mut aligned = PlaneLayouts::new();
    let mut first_unaligned = None;
    let mut requested_offset_align = None;
    let mut offset_bits = 0;
    for (idx, plane) in planes.iter().enumerate() {
        let offset = align_up(plane.offset, align.offset);
        let pitch = align_up(plane.pitch, align.pitch);
        if offset != plane.offset || pitch != plane.pitch {
            if first_unaligned.is_none() {
                first_unaligned = Some(idx);
            }
            if offset != plane.offset {
                requested_offset_align = Some(align.offset);
            }
        }
        offset_bits |= plane.offset;
        aligned.push(PlaneLayout {
            offset,
            pitch,
            size: 0,
        });
    }
    let first_unaligned = first_unaligned?;
    if first_unaligned + 1 < planes.len() && mem_count == 1 {
        let guessed = requested_offset_align.unwrap_or_else(|| guess_offset_align(offset_bits));
        let offset_align = lcm(guessed, align.offset);
        for idx in first_unaligned..planes.len() - 1 {
            let height = guess_plane_height(&planes[idx]);
            let size = aligned[idx].pitch * height;
            aligned[idx + 1].offset = align_up(aligned[idx].offset + size, offset_align);
        }
    }
    Some(aligned)
}
