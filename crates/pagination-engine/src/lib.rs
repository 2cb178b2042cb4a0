//! Lazy pagination engine for `epub_source`.
//!
//! Converts a linear, styled document (a sequence of [`document::DocumentBlock`]s)
//! into a stable, indexable sequence of fixed-size pages under a given
//! layout configuration: producing only the pages needed for the current
//! reading window, continuing pagination in the background, and persisting
//! results so reopening a book under the same layout is near-instant.
//!
//! This crate has no dependency on `epub_source` or any concrete document
//! format -- it depends only on the [`measure::TextMeasurer`] contract and
//! its own [`document::DocumentBlock`] input type.

pub mod block_state;
pub mod cache;
pub mod cursor;
pub mod document;
pub mod engine;
pub mod error;
pub mod layout_key;
pub mod measure;
pub mod page;
pub mod page_builder;
pub mod token_span;

pub use block_state::{BlockState, TextCursorState};
pub use cache::{CacheEntry, CacheStore, CachedPage, CachedPageBlock, FsCacheStore};
pub use cursor::Cursor;
pub use document::{DocumentBlock, FontStyle, FontWeight, ResolvedStyle, TextAlign};
pub use engine::{LayoutOptions, PaginationEngine};
pub use error::PaginationError;
pub use layout_key::{LayoutFingerprintInputs, LayoutKey};
pub use measure::{FixedWidthMeasurer, LaidOutText, LineMetric, TextMeasurer};
pub use page::{PageBlock, PageContent};
pub use page_builder::PageBuilder;
pub use token_span::{build_token_spans, TokenSpan};
