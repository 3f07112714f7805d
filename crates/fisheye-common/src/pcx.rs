// pcx.rs — 8-bit paletted PCX encode/decode

/// PCX header size in bytes
pub const PCX_HEADER_SIZE: usize = 128;
/// PCX palette size in bytes (at end of file)
pub const PCX_PALETTE_SIZE: usize = 768;

/// Largest dimension accepted by the decoder.
const PCX_MAX_SIZE: u32 = 4096;

#[derive(Debug, Clone)]
#[repr(C)]
pub struct Pcx {
    pub manufacturer: u8,
    pub version: u8,
    pub encoding: u8,
    pub bits_per_pixel: u8,
    pub xmin: u16,
    pub ymin: u16,
    pub xmax: u16,
    pub ymax: u16,
    pub hres: u16,
    pub vres: u16,
    pub palette: [u8; 48],
    pub reserved: u8,
    pub color_planes: u8,
    pub bytes_per_line: u16,
    pub palette_type: u16,
    pub filler: [u8; 58],
    // data follows (variable length)
}

/// Result of decoding a PCX image
pub struct PcxDecodeResult {
    /// Palette-indexed pixel data (1 byte per pixel)
    pub pixels: Vec<u8>,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// 768-byte RGB palette (256 colors * 3 bytes)
    pub palette: [u8; PCX_PALETTE_SIZE],
}

fn push_le16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Encode a palette-indexed image as a PCX file.
///
/// Every pixel is written as a run of length one; bytes in the RLE marker
/// range (>= 0xC0) get a 0xC1 count prefix. The 768-byte palette is appended
/// after a 0x0C marker byte.
pub fn pcx_encode(
    pixels: &[u8],
    width: usize,
    height: usize,
    rowbytes: usize,
    palette: &[u8; PCX_PALETTE_SIZE],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(PCX_HEADER_SIZE + width * height * 2 + PCX_PALETTE_SIZE + 1);

    // header
    out.push(0x0a); // PCX id
    out.push(5); // 256 color
    out.push(1); // rle
    out.push(8); // 256 color
    push_le16(&mut out, 0); // xmin
    push_le16(&mut out, 0); // ymin
    push_le16(&mut out, (width - 1) as u16);
    push_le16(&mut out, (height - 1) as u16);
    push_le16(&mut out, width as u16); // hres
    push_le16(&mut out, height as u16); // vres
    out.extend_from_slice(&[0u8; 48]); // ega palette
    out.push(0); // reserved
    out.push(1); // chunky image
    push_le16(&mut out, width as u16); // bytes per line
    push_le16(&mut out, 2); // not a grey scale
    out.extend_from_slice(&[0u8; 58]); // filler
    debug_assert_eq!(out.len(), PCX_HEADER_SIZE);

    // pack the image
    for y in 0..height {
        let row = &pixels[y * rowbytes..y * rowbytes + width];
        for &col in row {
            if (col & 0xc0) == 0xc0 {
                out.push(0xc1);
            }
            out.push(col);
        }
    }

    // append the palette
    out.push(0x0c);
    out.extend_from_slice(palette);

    out
}

/// Decode an 8-bit single-plane PCX file, the format [`pcx_encode`] emits.
/// The tests use this to check screenshots written by the engine; anything
/// other than a simple 256-color image is rejected with `None`.
pub fn pcx_decode(raw: &[u8]) -> Option<PcxDecodeResult> {
    // header, at least one data byte, palette marker, palette
    if raw.len() < PCX_HEADER_SIZE + 1 + 1 + PCX_PALETTE_SIZE {
        return None;
    }

    let header = &raw[..PCX_HEADER_SIZE];
    let le16 = |at: usize| u16::from_le_bytes([header[at], header[at + 1]]) as u32;

    // id / version 5 / rle / 8 bpp / one plane
    if header[0] != 0x0a || header[1] != 5 || header[2] != 1 || header[3] != 8 || header[65] != 1 {
        return None;
    }

    let (xmin, xmax) = (le16(4), le16(8));
    let (ymin, ymax) = (le16(6), le16(10));
    if xmax < xmin || ymax < ymin || xmax >= PCX_MAX_SIZE || ymax >= PCX_MAX_SIZE {
        return None;
    }
    let width = xmax - xmin + 1;
    let height = ymax - ymin + 1;
    let expected = (width * height) as usize;

    // the palette closes out the file, preceded by its marker byte
    let pal_at = raw.len() - PCX_PALETTE_SIZE;
    if raw[pal_at - 1] != 0x0c {
        return None;
    }
    let mut palette = [0u8; PCX_PALETTE_SIZE];
    palette.copy_from_slice(&raw[pal_at..]);

    // expand the run-length stream between header and palette
    let mut pixels = Vec::with_capacity(expected);
    let mut stream = raw[PCX_HEADER_SIZE..pal_at - 1].iter();
    while pixels.len() < expected {
        let &byte = stream.next()?;
        if byte & 0xc0 == 0xc0 {
            let count = (byte & 0x3f) as usize;
            let &value = stream.next()?;
            pixels.resize(pixels.len() + count, value);
        } else {
            pixels.push(byte);
        }
    }
    // a run crossing the end of the image means a malformed stream
    if pixels.len() != expected {
        return None;
    }

    Some(PcxDecodeResult {
        pixels,
        width,
        height,
        palette,
    })
}
