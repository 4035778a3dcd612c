//! Terminal color palettes

/// The 16 standard colors (xterm defaults): 8 normal, 8 bright.
const BASE16: [(u8, u8, u8); 16] = [
    (0, 0, 0),       // black
    (205, 0, 0),     // red
    (0, 205, 0),     // green
    (205, 205, 0),   // yellow
    (0, 0, 238),     // blue
    (205, 0, 205),   // magenta
    (0, 205, 205),   // cyan
    (229, 229, 229), // white
    (127, 127, 127), // bright black
    (255, 0, 0),     // bright red
    (0, 255, 0),     // bright green
    (255, 255, 0),   // bright yellow
    (92, 92, 255),   // bright blue
    (255, 0, 255),   // bright magenta
    (0, 255, 255),   // bright cyan
    (255, 255, 255), // bright white
];

/// Resolve one of the 16 standard colors.
pub fn standard(index: u8) -> (u8, u8, u8) {
    BASE16[(index & 0x0f) as usize]
}

/// Resolve a 256-color palette index.
///
/// Layout: 0–15 standard colors, 16–231 a 6×6×6 RGB cube where each channel
/// step maps to `0` or `55 + 40 × step`, 232–255 a 24-step grayscale ramp
/// at `8 + 10 × (index − 232)`.
pub fn indexed(index: u8) -> (u8, u8, u8) {
    match index {
        0..=15 => standard(index),
        16..=231 => {
            let n = index - 16;
            let r = n / 36;
            let g = (n / 6) % 6;
            let b = n % 6;
            (cube_channel(r), cube_channel(g), cube_channel(b))
        }
        232..=255 => {
            let v = 8 + 10 * (index - 232);
            (v, v, v)
        }
    }
}

fn cube_channel(step: u8) -> u8 {
    if step == 0 {
        0
    } else {
        55 + 40 * step
    }
}
