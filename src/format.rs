use std::fmt::{Debug, Formatter};

pub const fn fourcc_code(a: char, b: char, c: char, d: char) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Format {
    pub name: &'static str,
    pub drm: u32,
    pub bpp: u32,
    pub has_alpha: bool,
}

impl Debug for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

pub static ARGB8888: &Format = &Format {
    name: "argb8888",
    drm: fourcc_code('A', 'R', '2', '4'),
    bpp: 32,
    has_alpha: true,
};

pub static XRGB8888: &Format = &Format {
    name: "xrgb8888",
    drm: fourcc_code('X', 'R', '2', '4'),
    bpp: 32,
    has_alpha: false,
};

/// The formats that can back a dumb framebuffer.
pub static DUMB_FORMATS: &[&Format] = &[ARGB8888, XRGB8888];

pub fn dumb_format(drm: u32) -> Option<&'static Format> {
    DUMB_FORMATS.iter().copied().find(|f| f.drm == drm)
}

/// Picks the first format from `preference` that `supported` contains.
pub fn pick_format(supported: &[u32], preference: &[&'static Format]) -> Option<&'static Format> {
    preference
        .iter()
        .copied()
        .find(|f| supported.contains(&f.drm))
}

pub fn fourcc_name(drm: u32) -> String {
    drm.to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}
