//! Cache Store: persists `{pages, cursor, totals, complete}` per
//! `(book_id, layout_key)`, atomically (write-temp-then-rename).
//!
//! A failing load is always treated as a cache miss (`CacheUnreadable`); a
//! failing save is swallowed after an optional diagnostic hook fires
//! (`CacheUnwritable`). Neither ever surfaces as an `Err` on the public
//! [`crate::engine::PaginationEngine`] API.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::document::{FontStyle, FontWeight, TextAlign};
use crate::error::PaginationError;
use crate::layout_key::LayoutKey;
use crate::page::{PageBlock, PageContent};

/// On-disk schema version tag. Bumped whenever the serialized shape changes
/// in a way that isn't forward-compatible.
pub const SCHEMA_VERSION: &str = "v2";

/// One cached page block, the tagged-union counterpart of [`PageBlock`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CachedPageBlock {
    /// A text slice.
    Text {
        /// The accepted text.
        text: String,
        /// Spacing before, in pixels.
        spacing_before: f32,
        /// Spacing after, in pixels.
        spacing_after: f32,
        /// Index into the canonical alignment enum.
        text_align: u8,
        /// Font size in pixels.
        font_size: f32,
        /// Line height multiplier.
        line_height: f32,
        /// ARGB color override, if any.
        color: Option<u32>,
        /// Canonical 100-900 weight index, if any.
        font_weight: Option<u16>,
        /// `"normal"` or `"italic"`.
        font_style: String,
        /// Pinned font family, if any.
        font_family: Option<String>,
    },
    /// An image.
    Image {
        /// Spacing before, in pixels.
        spacing_before: f32,
        /// Spacing after, in pixels.
        spacing_after: f32,
        /// Height the image was fitted to.
        image_height: f32,
        /// Raw image bytes, base64-encoded in the textual JSON encoding this
        /// store uses (serde handles the `Vec<u8>` <-> base64 round trip via
        /// the `serde_bytes`-less default, which is why we encode manually
        /// below to keep the schema explicit and round-trip byte-for-byte).
        #[serde(with = "base64_bytes")]
        image_bytes: Vec<u8>,
    },
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn text_align_index(align: TextAlign) -> u8 {
    match align {
        TextAlign::Start => 0,
        TextAlign::Center => 1,
        TextAlign::End => 2,
    }
}

fn text_align_from_index(idx: u8) -> TextAlign {
    match idx {
        1 => TextAlign::Center,
        2 => TextAlign::End,
        _ => TextAlign::Start,
    }
}

impl From<&PageBlock> for CachedPageBlock {
    fn from(block: &PageBlock) -> Self {
        match block {
            PageBlock::TextPageBlock {
                text,
                style,
                align,
                spacing_before,
                spacing_after,
            } => CachedPageBlock::Text {
                text: text.clone(),
                spacing_before: *spacing_before,
                spacing_after: *spacing_after,
                text_align: text_align_index(*align),
                font_size: style.size_px,
                line_height: style.line_height,
                color: style.color,
                font_weight: Some(style.weight.0),
                font_style: match style.style {
                    FontStyle::Normal => "normal".to_string(),
                    FontStyle::Italic => "italic".to_string(),
                },
                font_family: style.font_family.clone(),
            },
            PageBlock::ImagePageBlock {
                bytes,
                rendered_height,
                spacing_before,
                spacing_after,
            } => CachedPageBlock::Image {
                spacing_before: *spacing_before,
                spacing_after: *spacing_after,
                image_height: *rendered_height,
                image_bytes: bytes.clone(),
            },
        }
    }
}

impl From<&CachedPageBlock> for PageBlock {
    fn from(cached: &CachedPageBlock) -> Self {
        match cached {
            CachedPageBlock::Text {
                text,
                spacing_before,
                spacing_after,
                text_align,
                font_size,
                line_height,
                color,
                font_weight,
                font_style,
                font_family,
            } => PageBlock::TextPageBlock {
                text: text.clone(),
                style: crate::document::ResolvedStyle {
                    font_family: font_family.clone(),
                    size_px: *font_size,
                    line_height: *line_height,
                    letter_spacing: 0.0,
                    weight: FontWeight(font_weight.unwrap_or(400)),
                    style: if font_style == "italic" {
                        FontStyle::Italic
                    } else {
                        FontStyle::Normal
                    },
                    color: *color,
                },
                align: text_align_from_index(*text_align),
                spacing_before: *spacing_before,
                spacing_after: *spacing_after,
            },
            CachedPageBlock::Image {
                spacing_before,
                spacing_after,
                image_height,
                image_bytes,
            } => PageBlock::ImagePageBlock {
                bytes: image_bytes.clone(),
                rendered_height: *image_height,
                spacing_before: *spacing_before,
                spacing_after: *spacing_after,
            },
        }
    }
}

/// One cached page, the on-disk counterpart of [`PageContent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    /// Chapter the page belongs to.
    pub chapter_index: u32,
    /// First token index.
    pub start_word_index: u64,
    /// Last token index (inclusive).
    pub end_word_index: u64,
    /// First character index.
    pub start_char_index: u64,
    /// Last character index (inclusive).
    pub end_char_index: u64,
    /// The page's blocks.
    pub blocks: Vec<CachedPageBlock>,
}

impl From<&PageContent> for CachedPage {
    fn from(page: &PageContent) -> Self {
        CachedPage {
            chapter_index: page.chapter_index,
            start_word_index: page.start_word,
            end_word_index: page.end_word,
            start_char_index: page.start_char,
            end_char_index: page.end_char,
            blocks: page.blocks.iter().map(CachedPageBlock::from).collect(),
        }
    }
}

impl From<&CachedPage> for PageContent {
    fn from(cached: &CachedPage) -> Self {
        PageContent {
            blocks: cached.blocks.iter().map(PageBlock::from).collect(),
            chapter_index: cached.chapter_index,
            start_char: cached.start_char_index,
            end_char: cached.end_char_index,
            start_word: cached.start_word_index,
            end_word: cached.end_word_index,
        }
    }
}

/// The full persisted record for one `(book_id, layout_key)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Schema version tag, always [`SCHEMA_VERSION`] for entries this crate
    /// writes.
    pub version: String,
    /// `true` once pagination reached the end of the document.
    pub is_complete: bool,
    /// Total characters produced so far (or in total, if complete).
    pub total_characters: u64,
    /// Resumable cursor; absent when `is_complete`.
    pub cursor: Option<Cursor>,
    /// Cached pages, in order.
    pub pages: Vec<CachedPage>,
}

impl CacheEntry {
    /// Builds an entry from the engine's live state.
    pub fn new(pages: &[PageContent], is_complete: bool, total_characters: u64, cursor: Option<Cursor>) -> Self {
        CacheEntry {
            version: SCHEMA_VERSION.to_string(),
            is_complete,
            total_characters,
            cursor: if is_complete { None } else { cursor },
            pages: pages.iter().map(CachedPage::from).collect(),
        }
    }
}

/// Storage hooks for pagination caches, keyed by `(book_id, layout_key)`.
///
/// Implementations must never panic; I/O failures should surface as `None`
/// from `load` (treated as a cache miss) and are otherwise silent from
/// `save`.
pub trait CacheStore: Send + Sync {
    /// Reads the cache entry for `(book_id, layout_key)`, or `None` on any
    /// I/O or parse failure (treated as a cache miss).
    fn load(&self, book_id: &str, layout_key: &LayoutKey) -> Option<CacheEntry>;

    /// Writes `entry` for `(book_id, layout_key)`, atomically. Errors are
    /// swallowed; `on_error`, if supplied, is invoked with a description.
    fn save(&self, book_id: &str, layout_key: &LayoutKey, entry: &CacheEntry);
}

/// A [`CacheStore`] backed by one JSON file per `(book_id, layout_key)`
/// under a root directory, written via write-temp-then-rename for atomicity.
pub struct FsCacheStore {
    root: PathBuf,
    on_write_error: Option<Box<dyn Fn(&str, &io::Error) + Send + Sync>>,
}

impl FsCacheStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first `save`; a missing directory at `load` time is simply a miss.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsCacheStore {
            root: root.into(),
            on_write_error: None,
        }
    }

    /// Attaches a hook invoked with `(book_id, error)` whenever a `save`
    /// fails (`CacheUnwritable`, per `spec.md` §7).
    pub fn with_write_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &io::Error) + Send + Sync + 'static,
    {
        self.on_write_error = Some(Box::new(hook));
        self
    }

    fn path_for(&self, book_id: &str, layout_key: &LayoutKey) -> PathBuf {
        let safe_book = sanitize_component(book_id);
        let file_name = format!("{safe_book}__{}.json", layout_key.as_str());
        self.root.join(file_name)
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = target.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, target)?;
        Ok(())
    }
}

/// Replaces path-hostile characters in a book id so it's safe as a file-name
/// component; collisions across distinct ids are accepted as out of scope
/// (book ids are expected to already be stable, opaque identifiers).
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl CacheStore for FsCacheStore {
    fn load(&self, book_id: &str, layout_key: &LayoutKey) -> Option<CacheEntry> {
        let path = self.path_for(book_id, layout_key);
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                // A missing file is an ordinary cache miss, not worth logging.
                if err.kind() != io::ErrorKind::NotFound {
                    let err = PaginationError::CacheUnreadable {
                        book_id: book_id.to_string(),
                        source: err,
                    };
                    log::debug!("{err}");
                }
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(parse_err) => {
                let err = PaginationError::CacheUnreadable {
                    book_id: book_id.to_string(),
                    source: io::Error::new(io::ErrorKind::InvalidData, parse_err),
                };
                log::warn!("{err}");
                None
            }
        }
    }

    fn save(&self, book_id: &str, layout_key: &LayoutKey, entry: &CacheEntry) {
        let path = self.path_for(book_id, layout_key);
        let bytes = match serde_json::to_vec(entry) {
            Ok(b) => b,
            Err(_) => return,
        };
        if let Err(io_err) = self.write_atomic(&path, &bytes) {
            if let Some(hook) = &self.on_write_error {
                hook(book_id, &io_err);
            } else {
                let err = PaginationError::CacheUnwritable {
                    book_id: book_id.to_string(),
                    source: io_err,
                };
                log::warn!("{err}");
            }
        }
    }
}
