//! Object Header - Size, Color and Tag of a heap object
//!
//! Header Layout (one 64-bit word):
//! ┌──────────────────────────────────────┬────────┬──────────┐
//! │            wosize (54 bits)          │ color  │   tag    │
//! │               63-10                  │  9-8   │   7-0    │
//! └──────────────────────────────────────┴────────┴──────────┘
//!
//! `wosize` is the number of fields. The color records an object's
//! life-cycle state; the runtime core only distinguishes fresh private
//! objects, promoted private objects and shared-heap objects.

pub const TAG_BITS: u32 = 8;
pub const COLOR_SHIFT: u32 = TAG_BITS;
pub const COLOR_BITS: u32 = 2;
pub const WOSIZE_SHIFT: u32 = COLOR_SHIFT + COLOR_BITS;

pub const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
pub const COLOR_MASK: u64 = ((1 << COLOR_BITS) - 1) << COLOR_SHIFT;

/// Largest field count a header can describe
pub const MAX_WOSIZE: usize = ((1u64 << (64 - WOSIZE_SHIFT)) - 1) as usize;

/// Tag of opaque objects whose fields are not program values
///
/// A context's self value is an abstract object holding the context id.
pub const ABSTRACT_TAG: u8 = 251;

/// Object color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u8)]
pub enum Color {
    /// Fresh private object
    White = 0,
    /// Reserved for collectors
    Gray = 1,
    /// Private object that has a shared-heap copy
    Promoted = 2,
    /// Shared-heap object
    Black = 3,
}

impl Color {
    #[inline]
    fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Color::White,
            1 => Color::Gray,
            2 => Color::Promoted,
            _ => Color::Black,
        }
    }
}

/// Header - packed object metadata
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header(u64);

impl Header {
    /// Build a header
    ///
    /// Callers check `wosize <= MAX_WOSIZE` (allocation does).
    #[inline]
    pub fn new(wosize: usize, color: Color, tag: u8) -> Self {
        debug_assert!(wosize <= MAX_WOSIZE, "wosize {} too large", wosize);
        Header(((wosize as u64) << WOSIZE_SHIFT) | ((color as u64) << COLOR_SHIFT) | tag as u64)
    }

    /// Rebuild from a raw header word
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Header(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Number of fields
    #[inline]
    pub fn wosize(self) -> usize {
        (self.0 >> WOSIZE_SHIFT) as usize
    }

    #[inline]
    pub fn color(self) -> Color {
        Color::from_bits((self.0 & COLOR_MASK) >> COLOR_SHIFT)
    }

    #[inline]
    pub fn tag(self) -> u8 {
        (self.0 & TAG_MASK) as u8
    }

    /// Same header with a different color
    #[inline]
    pub fn with_color(self, color: Color) -> Self {
        Header((self.0 & !COLOR_MASK) | ((color as u64) << COLOR_SHIFT))
    }

    #[inline]
    pub fn is_promoted(self) -> bool {
        self.color() == Color::Promoted
    }
}

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("wosize", &self.wosize())
            .field("color", &self.color())
            .field("tag", &self.tag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fields() {
        let header = Header::new(3, Color::White, 7);
        assert_eq!(header.wosize(), 3);
        assert_eq!(header.color(), Color::White);
        assert_eq!(header.tag(), 7);
        assert!(!header.is_promoted());
    }

    #[test]
    fn test_recolor_keeps_size_and_tag() {
        let header = Header::new(MAX_WOSIZE, Color::White, ABSTRACT_TAG);
        let promoted = header.with_color(Color::Promoted);
        assert!(promoted.is_promoted());
        assert_eq!(promoted.wosize(), MAX_WOSIZE);
        assert_eq!(promoted.tag(), ABSTRACT_TAG);
        assert_eq!(promoted.with_color(Color::Black).color(), Color::Black);
    }

    #[test]
    fn test_bits_roundtrip() {
        let header = Header::new(12, Color::Gray, 0);
        assert_eq!(Header::from_bits(header.bits()), header);
    }
}
