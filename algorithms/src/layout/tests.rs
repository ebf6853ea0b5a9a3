use crate::layout::{
    Alignment, MAX_GUESSED_OFFSET_ALIGN, PlaneLayout, align_layout, align_up, guess_offset_align,
    guess_plane_height, lcm,
};

fn plane(offset: u64, pitch: u64, size: u64) -> PlaneLayout {
    PlaneLayout {
        offset,
        pitch,
        size,
    }
}

fn offsets_and_pitches(planes: &[PlaneLayout]) -> Vec<(u64, u64)> {
    planes.iter().map(|p| (p.offset, p.pitch)).collect()
}

fn nv12_like(plane1_offset: u64) -> [PlaneLayout; 2] {
    [plane(0, 256, 65536), plane(plane1_offset, 128, 32768)]
}

#[test]
fn already_aligned_4096() {
    let align = Alignment {
        offset: 4096,
        pitch: 64,
    };
    assert_eq!(align_layout(&nv12_like(65536), 1, align), None);
}

#[test]
fn already_aligned_8192() {
    let align = Alignment {
        offset: 8192,
        pitch: 64,
    };
    assert_eq!(align_layout(&nv12_like(65536), 1, align), None);
}

#[test]
fn unaligned_last_plane_offset() {
    let align = Alignment {
        offset: 8192,
        pitch: 64,
    };
    let res = align_layout(&nv12_like(65537), 1, align).unwrap();
    assert_eq!(offsets_and_pitches(&res), [(0, 256), (73728, 128)]);
    assert!(res.iter().all(|p| p.size == 0));
}

#[test]
fn no_alignment_is_noop() {
    let planes = [plane(3, 301, 1000), plane(1001, 7, 13), plane(1017, 5, 11)];
    assert_eq!(align_layout(&planes, 1, Alignment::NONE), None);
    assert_eq!(align_layout(&planes, 3, Alignment::NONE), None);
}

#[test]
fn early_plane_moves_following_planes() {
    let planes = [plane(0, 300, 90000), plane(90000, 160, 24000)];
    let align = Alignment {
        offset: 256,
        pitch: 64,
    };
    let res = align_layout(&planes, 1, align).unwrap();
    // 300 rows of 320 bytes, rounded up to the requested offset alignment
    assert_eq!(offsets_and_pitches(&res), [(0, 320), (96000, 192)]);
}

#[test]
fn three_planes_are_chained() {
    let planes = [
        plane(0, 300, 90000),
        plane(90000, 150, 22500),
        plane(112500, 150, 22500),
    ];
    let align = Alignment {
        offset: 1,
        pitch: 64,
    };
    let res = align_layout(&planes, 1, align).unwrap();
    // offsets guessed with the lowest bit of 90000 | 112500 = 4
    let p1 = align_up(320 * 300, 4);
    let p2 = align_up(p1 + 192 * 150, 4);
    assert_eq!(offsets_and_pitches(&res), [(0, 320), (p1, 192), (p2, 192)]);
}

#[test]
fn guessed_offset_align_is_capped() {
    let planes = [plane(0, 300, 90000), plane(90112, 160, 24000)];
    let align = Alignment {
        offset: 1,
        pitch: 64,
    };
    let res = align_layout(&planes, 1, align).unwrap();
    // 90112 is a multiple of 8192 which is capped to 4096
    assert_eq!(offsets_and_pitches(&res), [(0, 320), (98304, 192)]);
}

#[test]
fn guessed_offset_align_without_offsets() {
    let planes = [plane(0, 300, 90000), plane(0, 160, 24000)];
    let align = Alignment {
        offset: 1,
        pitch: 64,
    };
    let res = align_layout(&planes, 1, align).unwrap();
    assert_eq!(offsets_and_pitches(&res), [(0, 320), (98304, 192)]);
}

#[test]
fn disjoint_planes_are_aligned_independently() {
    let planes = [plane(0, 300, 90000), plane(0, 160, 24000)];
    let align = Alignment {
        offset: 1,
        pitch: 64,
    };
    let res = align_layout(&planes, 2, align).unwrap();
    assert_eq!(offsets_and_pitches(&res), [(0, 320), (0, 192)]);
}

#[test]
fn guessed_offset_align_keeps_requested_align() {
    let planes = [plane(0, 300, 72000), plane(81920, 160, 24000)];
    let align = Alignment {
        offset: 8192,
        pitch: 64,
    };
    let res = align_layout(&planes, 1, align).unwrap();
    // 240 rows of 320 bytes end at 76800. the guessed 4096 would give 77824
    assert_eq!(offsets_and_pitches(&res), [(0, 320), (81920, 192)]);
    assert!(res.iter().all(|p| p.offset % 8192 == 0));
}

#[test]
fn least_common_multiple() {
    assert_eq!(lcm(4096, 8192), 8192);
    assert_eq!(lcm(4, 6), 12);
    assert_eq!(lcm(1, 3), 3);
    assert_eq!(lcm(0, 5), 5);
}

#[test]
fn idempotent() {
    for align in [
        Alignment {
            offset: 256,
            pitch: 64,
        },
        Alignment {
            offset: 8192,
            pitch: 64,
        },
    ] {
        check_idempotent(align);
    }
}

fn check_idempotent(align: Alignment) {
    let layouts: [&[PlaneLayout]; 4] = [
        &[plane(0, 300, 90000), plane(90000, 160, 24000)],
        &nv12_like(65537),
        &[
            plane(0, 300, 90000),
            plane(90000, 150, 22500),
            plane(112500, 150, 22500),
        ],
        &[plane(0, 300, 72000), plane(81920, 160, 24000)],
    ];
    for planes in layouts {
        let first = align_layout(planes, 1, align).unwrap();
        let second: Vec<_> = first
            .iter()
            .zip(planes)
            .map(|(a, p)| plane(a.offset, a.pitch, a.pitch * guess_plane_height(p)))
            .collect();
        assert_eq!(align_layout(&second, 1, align), None);
    }
}

#[test]
fn plane_height_rounds_up() {
    assert_eq!(guess_plane_height(&plane(0, 256, 65536)), 256);
    assert_eq!(guess_plane_height(&plane(0, 256, 65537)), 257);
    assert_eq!(guess_plane_height(&plane(0, 0, 65537)), 0);
}

#[test]
fn offset_align_guesses() {
    assert_eq!(guess_offset_align(0), MAX_GUESSED_OFFSET_ALIGN);
    assert_eq!(guess_offset_align(0x600), 0x200);
    assert_eq!(guess_offset_align(0x10000), MAX_GUESSED_OFFSET_ALIGN);
    assert_eq!(guess_offset_align(1), 1);
}
