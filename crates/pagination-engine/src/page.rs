//! Page content: the engine's output type.
//!
//! Pages are created monotonically (append-only); once emitted and observed,
//! a page is never modified or removed.

use crate::document::{FontStyle, FontWeight, ResolvedStyle, TextAlign};
use serde::{Deserialize, Serialize};

/// One block within a page: either a slice of styled text, or a single
/// image. A page never mixes a text slice with an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PageBlock {
    /// A contiguous slice of text from one `DocumentBlock::TextBlock`.
    TextPageBlock {
        /// The accepted text slice.
        text: String,
        /// Style to render the slice with.
        style: ResolvedStyle,
        /// Horizontal alignment.
        align: TextAlign,
        /// Spacing applied before this block on the page.
        spacing_before: f32,
        /// Spacing applied after this block on the page (only non-zero if
        /// this page ends the source block).
        spacing_after: f32,
    },
    /// A single image, laid out at its fitted height.
    ImagePageBlock {
        /// Raw image bytes, verbatim from the source `ImageBlock`.
        bytes: Vec<u8>,
        /// Height the image was fitted to, in pixels.
        rendered_height: f32,
        /// Spacing before the image.
        spacing_before: f32,
        /// Spacing after the image.
        spacing_after: f32,
    },
}

impl PageBlock {
    /// Canonical weight for the tagged on-disk schema; `None` for image
    /// blocks.
    pub fn font_weight(&self) -> Option<FontWeight> {
        match self {
            PageBlock::TextPageBlock { style, .. } => Some(style.weight),
            PageBlock::ImagePageBlock { .. } => None,
        }
    }

    /// Upright/italic, for image blocks this has no meaning.
    pub fn font_style(&self) -> Option<FontStyle> {
        match self {
            PageBlock::TextPageBlock { style, .. } => Some(style.style),
            PageBlock::ImagePageBlock { .. } => None,
        }
    }
}

/// One emitted page: a contiguous run of the document's global character
/// index, consisting of blocks from at most one source block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// The page's blocks (in practice exactly one, per `spec.md` §3).
    pub blocks: Vec<PageBlock>,
    /// Chapter the page's content belongs to.
    pub chapter_index: u32,
    /// Global character index of the page's first character.
    pub start_char: u64,
    /// Global character index of the page's last character (inclusive).
    pub end_char: u64,
    /// Global token (word) index of the page's first token.
    pub start_word: u64,
    /// Global token (word) index of the page's last token (inclusive), or
    /// `start_word - 1` if the page contains zero tokens (image pages).
    pub end_word: u64,
}

impl PageContent {
    /// Number of characters the page covers.
    pub fn char_len(&self) -> u64 {
        self.end_char - self.start_char + 1
    }
}
