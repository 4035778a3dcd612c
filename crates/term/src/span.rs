//! Styled span output types

use serde::{Deserialize, Serialize};

/// An RGBA color. Alpha is 0–255; spans use it for the dim and hidden
/// attributes rather than changing the palette color itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

/// One run of text with uniform styling. Spans cover the decoded input with
/// no gaps or overlaps, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    /// Resolved foreground. Alpha already reflects dim/hidden.
    pub foreground: Rgba,
    /// Resolved background; `None` means transparent.
    pub background: Option<Rgba>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub dim: bool,
    pub hidden: bool,
}
