// palette.rs — per-plate tint tables for the rubix overlay

use std::io::{self, Write};

use crate::globe::MAX_PLATES;

/// Tint value meaning "leave the pixel alone".
pub const NO_TINT: u8 = 255;

// one distinct hue per plate slot
const TINTS: [[i32; 3]; MAX_PLATES] = [
    [255, 255, 255], // white
    [0, 0, 255],     // blue
    [255, 0, 0],     // red
    [255, 255, 0],   // yellow
    [255, 0, 255],   // magenta
    [0, 255, 255],   // cyan
];

/// Find the palette index closest to an RGB color.
pub fn find_closest_pal_index(palette: &[u8; 768], r: i32, g: i32, b: i32) -> u8 {
    let mut mindist = 256 * 256 * 256;
    let mut minindex = 0;
    for i in 0..256 {
        let dr = palette[i * 3] as i32 - r;
        let dg = palette[i * 3 + 1] as i32 - g;
        let db = palette[i * 3 + 2] as i32 - b;
        let dist = dr * dr + dg * dg + db * db;
        if dist < mindist {
            mindist = dist;
            minindex = i;
        }
    }
    minindex as u8
}

/// Build one 256 -> 256 remap table per plate slot, pulling every palette
/// color partway toward that slot's tint.
pub fn build_tint_tables(palette: &[u8; 768]) -> [[u8; 256]; MAX_PLATES] {
    let percent = 256 / 6;
    let mut tables = [[0u8; 256]; MAX_PLATES];

    for (j, table) in tables.iter_mut().enumerate() {
        let tint = TINTS[j];
        for i in 0..256 {
            let mut r = palette[i * 3] as i32;
            let mut g = palette[i * 3 + 1] as i32;
            let mut b = palette[i * 3 + 2] as i32;

            r += percent * (tint[0] - r) >> 8;
            g += percent * (tint[1] - g) >> 8;
            b += percent * (tint[2] - b) >> 8;

            r = r.clamp(0, 255);
            g = g.clamp(0, 255);
            b = b.clamp(0, 255);

            table[i] = find_closest_pal_index(palette, r, g, b);
        }
    }

    tables
}

/// Write the palette as "r, g, b," lines (the dumppal command).
pub fn dump_palette(palette: &[u8; 768], writer: &mut dyn Write) -> io::Result<()> {
    for i in 0..256 {
        writeln!(
            writer,
            "{}, {}, {},",
            palette[i * 3],
            palette[i * 3 + 1],
            palette[i * 3 + 2]
        )?;
    }
    Ok(())
}
