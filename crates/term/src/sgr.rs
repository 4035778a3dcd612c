//! SGR escape sequence decoder
//!
//! Recognizes the CSI SGR pattern `ESC [ <params> m` with semicolon-separated
//! integer parameters. Other CSI sequences (cursor movement etc) are removed
//! from the output without affecting style state. Unrecognized SGR codes are
//! skipped without aborting the scan.

use crate::palette;
use crate::span::{Rgba, TextSpan};

/// Alpha applied to the foreground when the dim attribute is set.
const DIM_ALPHA: u8 = 153;

const ESC: char = '\u{1b}';

/// Default colors used to resolve spans that carry no explicit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub foreground: Rgba,
    pub background: Rgba,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            foreground: Rgba::opaque(255, 255, 255),
            background: Rgba::opaque(0, 0, 0),
        }
    }
}

/// A color as written by an SGR parameter, before theme resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ColorSpec {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Current style state. Opaque to callers; hold one across chunked
/// [`decode_with`] calls so styles opened in one chunk survive into the
/// next. Reversal is stored as a flag and resolved when a span is emitted,
/// so clearing it restores the pre-reverse colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SgrAttributes {
    fg: ColorSpec,
    bg: ColorSpec,
    bold: bool,
    dim: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    reversed: bool,
    hidden: bool,
}

impl SgrAttributes {
    fn resolve(&self, text: String, theme: &Theme) -> TextSpan {
        let mut fg = match self.fg {
            ColorSpec::Default => theme.foreground,
            ColorSpec::Indexed(i) => {
                let (r, g, b) = palette::indexed(i);
                Rgba::opaque(r, g, b)
            }
            ColorSpec::Rgb(r, g, b) => Rgba::opaque(r, g, b),
        };
        let mut bg = match self.bg {
            ColorSpec::Default => None,
            ColorSpec::Indexed(i) => {
                let (r, g, b) = palette::indexed(i);
                Some(Rgba::opaque(r, g, b))
            }
            ColorSpec::Rgb(r, g, b) => Some(Rgba::opaque(r, g, b)),
        };

        if self.reversed {
            let swapped_fg = bg.unwrap_or(theme.background);
            bg = Some(fg);
            fg = swapped_fg;
        }

        // Hidden keeps layout width but renders nothing; dim keeps the
        // color and lowers opacity.
        if self.hidden {
            fg = fg.with_alpha(0);
        } else if self.dim {
            fg = fg.with_alpha(DIM_ALPHA);
        }

        TextSpan {
            text,
            foreground: fg,
            background: bg,
            bold: self.bold,
            italic: self.italic,
            underline: self.underline,
            strikethrough: self.strikethrough,
            dim: self.dim,
            hidden: self.hidden,
        }
    }

    fn apply(&mut self, params: &str) {
        let codes: Vec<u16> = if params.is_empty() {
            vec![0]
        } else {
            params
                .split(';')
                .map(|p| p.parse().unwrap_or(0))
                .collect()
        };

        let mut i = 0;
        while i < codes.len() {
            match codes[i] {
                0 => *self = SgrAttributes::default(),
                1 => self.bold = true,
                2 => self.dim = true,
                3 => self.italic = true,
                4 => self.underline = true,
                7 => self.reversed = true,
                8 => self.hidden = true,
                9 => self.strikethrough = true,
                21 => self.bold = false,
                22 => self.dim = false,
                23 => self.italic = false,
                24 => self.underline = false,
                27 => self.reversed = false,
                28 => self.hidden = false,
                29 => self.strikethrough = false,
                30..=37 => self.fg = ColorSpec::Indexed((codes[i] - 30) as u8),
                39 => self.fg = ColorSpec::Default,
                40..=47 => self.bg = ColorSpec::Indexed((codes[i] - 40) as u8),
                49 => self.bg = ColorSpec::Default,
                90..=97 => self.fg = ColorSpec::Indexed((codes[i] - 90 + 8) as u8),
                100..=107 => self.bg = ColorSpec::Indexed((codes[i] - 100 + 8) as u8),
                38 | 48 => {
                    let target_bg = codes[i] == 48;
                    match extended_color(&codes[i + 1..]) {
                        Some((color, consumed)) => {
                            if target_bg {
                                self.bg = color;
                            } else {
                                self.fg = color;
                            }
                            i += consumed;
                        }
                        // Malformed tail. The remaining parameters belong
                        // to the broken introducer, not to us; reading them
                        // as standalone codes would corrupt the state.
                        None => return,
                    }
                }
                _ => {} // unrecognized code, keep scanning
            }
            i += 1;
        }
    }
}

/// Parse the tail of a `38`/`48` extended color introducer. Returns the
/// color and the number of extra parameters consumed.
fn extended_color(rest: &[u16]) -> Option<(ColorSpec, usize)> {
    match rest.first() {
        Some(5) => {
            let index = *rest.get(1)?;
            Some((ColorSpec::Indexed(index.min(255) as u8), 2))
        }
        Some(2) => {
            let r = *rest.get(1)?;
            let g = *rest.get(2)?;
            let b = *rest.get(3)?;
            Some((
                ColorSpec::Rgb(r.min(255) as u8, g.min(255) as u8, b.min(255) as u8),
                4,
            ))
        }
        _ => None,
    }
}

/// Decode one chunk of terminal output into styled spans, starting from
/// default attributes. Style state does not carry into the next call; for
/// streamed output use [`decode_with`].
pub fn decode(text: &str, theme: &Theme) -> Vec<TextSpan> {
    let mut attrs = SgrAttributes::default();
    decode_with(text, theme, &mut attrs)
}

/// Decode one chunk of terminal output, carrying style state in `attrs`
/// across calls so a color opened in an earlier chunk stays active.
pub fn decode_with(text: &str, theme: &Theme, attrs: &mut SgrAttributes) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut buf = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ESC && chars.peek() == Some(&'[') {
            chars.next();
            let mut params = String::new();
            while let Some(&p) = chars.peek() {
                if p.is_ascii_digit() || p == ';' {
                    params.push(p);
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                Some('m') => {
                    chars.next();
                    if !buf.is_empty() {
                        spans.push(attrs.resolve(std::mem::take(&mut buf), theme));
                    }
                    attrs.apply(&params);
                }
                Some(&final_byte) if ('\u{40}'..='\u{7e}').contains(&final_byte) => {
                    // Non-SGR CSI sequence: drop it, style state untouched.
                    chars.next();
                }
                _ => {
                    // Truncated sequence, keep it as literal text.
                    buf.push(ESC);
                    buf.push('[');
                    buf.push_str(&params);
                }
            }
        } else {
            buf.push(c);
        }
    }

    if !buf.is_empty() {
        spans.push(attrs.resolve(buf, theme));
    }
    spans
}

/// Remove all recognized escape sequences, leaving plain text.
pub fn strip(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ESC && chars.peek() == Some(&'[') {
            chars.next();
            let mut params = String::new();
            while let Some(&p) = chars.peek() {
                if p.is_ascii_digit() || p == ';' {
                    params.push(p);
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.peek() {
                Some(&final_byte) if ('\u{40}'..='\u{7e}').contains(&final_byte) => {
                    chars.next();
                }
                _ => {
                    out.push(ESC);
                    out.push('[');
                    out.push_str(&params);
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether the text contains at least one complete SGR sequence.
pub fn contains_escape_codes(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ESC || chars.peek() != Some(&'[') {
            continue;
        }
        chars.next();
        while let Some(&p) = chars.peek() {
            if p.is_ascii_digit() || p == ';' {
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek() == Some(&'m') {
            return true;
        }
    }
    false
}
