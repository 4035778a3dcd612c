//! Codedeck Term
//!
//! Decodes terminal output containing ANSI SGR escape sequences
//! (`ESC [ <params> m`) into styled text spans. The decoder understands the
//! 16-color, 256-color, and direct-RGB forms, and can carry attribute state
//! across chunked decode calls so a color opened in one streamed chunk
//! survives into the next.

pub mod palette;
pub mod sgr;
pub mod span;

pub use sgr::{contains_escape_codes, decode, decode_with, strip, SgrAttributes, Theme};
pub use span::{Rgba, TextSpan};
