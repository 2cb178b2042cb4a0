//! Input document model.
//!
//! A [`DocumentBlock`] is the unit the engine consumes: a styled paragraph of
//! text or an atomic image. Blocks are produced externally (document
//! acquisition is out of scope for this crate) and are never mutated once
//! handed to the engine.

use serde::{Deserialize, Serialize};

/// Horizontal text alignment for a text block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    /// Flush left (or start, for the purposes of this crate).
    Start,
    /// Centered.
    Center,
    /// Flush right (or end).
    End,
}

/// Canonical font weight, indexing the 100-900 sequence used by the on-disk
/// schema (`None` means "inherit the platform default").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontWeight(pub u16);

impl Default for FontWeight {
    fn default() -> Self {
        FontWeight(400)
    }
}

/// Italic/normal toggle for a text block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontStyle {
    /// Upright glyphs.
    Normal,
    /// Slanted/oblique glyphs.
    Italic,
}

/// Resolved text style carried by a [`DocumentBlock::TextBlock`] and, after
/// pagination, by the [`crate::page::TextPageBlock`] it produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStyle {
    /// Font family name, if any is pinned; `None` defers to the platform
    /// default family.
    pub font_family: Option<String>,
    /// Font size in pixels.
    pub size_px: f32,
    /// Line height as a multiplier of `size_px`.
    pub line_height: f32,
    /// Additional letter spacing in pixels.
    pub letter_spacing: f32,
    /// Canonical weight.
    pub weight: FontWeight,
    /// Upright or italic.
    pub style: FontStyle,
    /// Optional ARGB color override.
    pub color: Option<u32>,
}

impl ResolvedStyle {
    /// A reasonable default body-text style: 16px, 1.4 line height, normal
    /// weight, no letter spacing, no family/color pinned.
    pub fn body_default() -> Self {
        ResolvedStyle {
            font_family: None,
            size_px: 16.0,
            line_height: 1.4,
            letter_spacing: 0.0,
            weight: FontWeight::default(),
            style: FontStyle::Normal,
            color: None,
        }
    }
}

/// One document unit in reading order: a styled paragraph of text, or an
/// atomic image that is never split across pages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DocumentBlock {
    /// A non-empty logical paragraph of text.
    TextBlock {
        /// Chapter this block belongs to, assigned by the caller.
        chapter_index: u32,
        /// Full paragraph text, already normalized (unified line endings,
        /// decoded entities) by the caller.
        text: String,
        /// Base resolved style for the whole paragraph.
        base_style: ResolvedStyle,
        /// Horizontal alignment.
        text_align: TextAlign,
        /// Multiplicative scale applied to `base_style.size_px`.
        font_scale: f32,
        /// Weight override; falls back to `base_style.weight` if absent.
        font_weight: Option<FontWeight>,
        /// Style override; falls back to `base_style.style` if absent.
        font_style: Option<FontStyle>,
        /// Vertical space before the block, applied once at block start.
        spacing_before: f32,
        /// Vertical space after the block, applied once at block end.
        spacing_after: f32,
    },
    /// An atomic, pre-decoded image.
    ImageBlock {
        /// Chapter this block belongs to.
        chapter_index: u32,
        /// Raw, pre-decoded image bytes.
        bytes: Vec<u8>,
        /// Intrinsic width in pixels, if known.
        intrinsic_width: Option<f32>,
        /// Intrinsic height in pixels, if known.
        intrinsic_height: Option<f32>,
        /// Vertical space before the image.
        spacing_before: f32,
        /// Vertical space after the image.
        spacing_after: f32,
    },
}

impl DocumentBlock {
    /// The chapter this block belongs to, regardless of variant.
    pub fn chapter_index(&self) -> u32 {
        match self {
            DocumentBlock::TextBlock { chapter_index, .. } => *chapter_index,
            DocumentBlock::ImageBlock { chapter_index, .. } => *chapter_index,
        }
    }

    /// Spacing applied before the block.
    pub fn spacing_before(&self) -> f32 {
        match self {
            DocumentBlock::TextBlock { spacing_before, .. } => *spacing_before,
            DocumentBlock::ImageBlock { spacing_before, .. } => *spacing_before,
        }
    }

    /// Spacing applied after the block.
    pub fn spacing_after(&self) -> f32 {
        match self {
            DocumentBlock::TextBlock { spacing_after, .. } => *spacing_after,
            DocumentBlock::ImageBlock { spacing_after, .. } => *spacing_after,
        }
    }

    /// `true` for `ImageBlock`.
    pub fn is_image(&self) -> bool {
        matches!(self, DocumentBlock::ImageBlock { .. })
    }
}
