//! The Pagination Engine: orchestrates the Page Builder, owns the produced
//! page vector, and exposes the demand APIs that drive it under the
//! single-logical-writer concurrency discipline of `spec.md` §5.
//!
//! Two locks split the engine's state along the read/write seam the
//! discipline implies: `shared` (an `RwLock` over the append-only page
//! vector plus atomics for `is_complete`/`total_characters`) answers
//! synchronous reads without contending with production, while
//! `production` (a `tokio::sync::Mutex`) is the virtual serial queue itself
//! -- every page-production step and the cache save that follows it runs
//! with that lock held, one at a time, whether it was requested by a demand
//! call or the background producer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::block_state::BlockState;
use crate::cache::{CacheEntry, CacheStore};
use crate::cursor::Cursor;
use crate::document::DocumentBlock;
use crate::layout_key::{self, LayoutFingerprintInputs, LayoutKey};
use crate::measure::TextMeasurer;
use crate::page::PageContent;
use crate::page_builder::{self, PageBuilder};

/// The layout-material inputs that can change page boundaries. Constructed
/// by the hosting UI from its font/viewport/scaler configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutOptions {
    /// Font family, or `None` for the platform default.
    pub font_family: Option<String>,
    /// Font size in pixels.
    pub font_size: f64,
    /// Line height multiplier.
    pub line_height: f64,
    /// Page width in pixels.
    pub max_width: f64,
    /// Page height in pixels.
    pub max_height: f64,
    /// Whether the height budget includes the first line's ascent.
    pub apply_height_first_ascent: bool,
    /// Whether the height budget includes the last line's descent.
    pub apply_height_last_descent: bool,
    /// Stable, opaque identifier for the active text scaler/shaper.
    pub scaler_fingerprint: String,
}

impl LayoutOptions {
    /// Computes this configuration's [`LayoutKey`].
    pub fn layout_key(&self) -> LayoutKey {
        layout_key::compute(&LayoutFingerprintInputs {
            font_family: self.font_family.as_deref(),
            font_size: self.font_size,
            line_height: self.line_height,
            max_width: self.max_width,
            max_height: self.max_height,
            apply_height_first_ascent: self.apply_height_first_ascent,
            apply_height_last_descent: self.apply_height_last_descent,
            scaler_fingerprint: &self.scaler_fingerprint,
        })
    }

    /// `true` if two configurations agree on every layout-material field
    /// within the 0.5px dimension epsilon `matches` uses.
    fn approx_eq(&self, other: &LayoutOptions) -> bool {
        const EPS: f64 = 0.5;
        self.font_family == other.font_family
            && (self.font_size - other.font_size).abs() < 0.005
            && (self.line_height - other.line_height).abs() < 0.005
            && (self.max_width - other.max_width).abs() < EPS
            && (self.max_height - other.max_height).abs() < EPS
            && self.apply_height_first_ascent == other.apply_height_first_ascent
            && self.apply_height_last_descent == other.apply_height_last_descent
            && self.scaler_fingerprint == other.scaler_fingerprint
    }

    fn reference_line_height(&self) -> f64 {
        self.font_size * self.line_height
    }
}

struct Shared {
    pages: RwLock<Vec<PageContent>>,
    is_complete: AtomicBool,
    total_characters: AtomicU64,
}

struct Production {
    block_states: Vec<Option<BlockState>>,
    cursor: Cursor,
}

/// The lazy pagination engine for one `(book, layout)` pair.
///
/// Owns its block states, produced pages, and cursor; the background
/// producer (if started) is a task bound to the engine's lifetime and is
/// cancelled when the engine is dropped.
pub struct PaginationEngine {
    /// Borrowed (by shared ownership) document blocks; never mutated after
    /// `open`. `Arc` rather than a lifetime parameter because the
    /// background producer is a `'static` tokio task that must be able to
    /// read them independently of the caller's stack frame.
    blocks: Arc<Vec<DocumentBlock>>,
    shared: Arc<Shared>,
    production: Arc<AsyncMutex<Production>>,
    measurer: Arc<dyn TextMeasurer>,
    layout: LayoutOptions,
    layout_key: LayoutKey,
    book_id: Arc<str>,
    cache: Option<Arc<dyn CacheStore>>,
    degenerate: bool,
    background: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PaginationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationEngine")
            .field("book_id", &self.book_id)
            .field("layout_key", &self.layout_key)
            .field("pages", &self.shared.pages.read().unwrap().len())
            .field("is_complete", &self.shared.is_complete.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl PaginationEngine {
    /// Opens an engine for `book_id`/`blocks` under `layout`. If `cache` is
    /// supplied, a prior entry for `(book_id, layout.layout_key())` is
    /// loaded and rehydrated (`CacheUnreadable` is silently treated as a
    /// miss); otherwise pagination starts from the zero cursor.
    pub fn open(
        book_id: impl Into<String>,
        blocks: Vec<DocumentBlock>,
        layout: LayoutOptions,
        measurer: Arc<dyn TextMeasurer>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        let book_id: Arc<str> = Arc::from(book_id.into());
        let layout_key = layout.layout_key();
        let blocks = Arc::new(blocks);

        let degenerate = page_builder::effective_max_height(
            layout.max_height,
            layout.reference_line_height(),
            0.0,
        ) <= 0.0
            || layout.max_height <= 0.0
            || layout.reference_line_height() <= 0.0;

        let loaded = if degenerate {
            None
        } else {
            cache.as_ref().and_then(|c| c.load(&book_id, &layout_key))
        };

        let (pages, cursor, is_complete, total_characters) = match loaded {
            Some(entry) => {
                let pages: Vec<PageContent> = entry.pages.iter().map(PageContent::from).collect();
                let cursor = entry.cursor.unwrap_or_else(|| {
                    let mut c = Cursor::zero();
                    c.block_index = blocks.len() as u32;
                    c.global_char_index = entry.total_characters;
                    c.global_word_index = pages.last().map(|p| p.end_word + 1).unwrap_or(0);
                    c
                });
                (pages, cursor, entry.is_complete, entry.total_characters)
            }
            None => (Vec::new(), Cursor::zero(), degenerate || blocks.is_empty(), 0),
        };

        PaginationEngine {
            blocks,
            shared: Arc::new(Shared {
                pages: RwLock::new(pages),
                is_complete: AtomicBool::new(is_complete),
                total_characters: AtomicU64::new(total_characters),
            }),
            production: Arc::new(AsyncMutex::new(Production {
                block_states: Vec::new(),
                cursor,
            })),
            measurer,
            layout,
            layout_key,
            book_id,
            cache,
            degenerate,
            background: std::sync::Mutex::new(None),
        }
    }

    /// Returns `pages[i]`, or `None` if `i` is out of range.
    pub fn page(&self, i: usize) -> Option<PageContent> {
        self.shared.pages.read().unwrap().get(i).cloned()
    }

    /// `true` if a page follows index `i`: either already produced, or
    /// pagination hasn't reached completion yet.
    pub fn has_next(&self, i: usize) -> bool {
        let len = self.shared.pages.read().unwrap().len();
        i + 1 < len || !self.is_complete()
    }

    /// `true` if a page precedes index `i`.
    pub fn has_prev(&self, i: usize) -> bool {
        i > 0
    }

    /// `true` once pagination has reached the end of the document.
    pub fn is_complete(&self) -> bool {
        self.shared.is_complete.load(Ordering::Acquire)
    }

    /// Number of pages produced so far.
    pub fn page_count(&self) -> usize {
        self.shared.pages.read().unwrap().len()
    }

    /// Loose estimate of the document's total page count: the exact count
    /// once complete, otherwise a lower bound one past what's been produced.
    pub fn estimated_total_pages(&self) -> usize {
        let len = self.shared.pages.read().unwrap().len();
        if self.is_complete() {
            len
        } else {
            (len + 1).max(len)
        }
    }

    /// Drives the Page Builder serially until `pages.len() > center + radius`
    /// or pagination is complete. Persists the cache after each new page.
    pub async fn ensure_window(&self, center: usize, radius: usize) {
        loop {
            if self.is_complete() {
                return;
            }
            if self.shared.pages.read().unwrap().len() > center + radius {
                return;
            }
            if self.produce_one_page().await.is_none() {
                return;
            }
        }
    }

    /// Extends pages until `pages.last().end_char >= char_index` or
    /// pagination is complete, then returns the page index containing
    /// `char_index`.
    pub async fn ensure_for_character(&self, char_index: u64) -> usize {
        loop {
            let reached = {
                let pages = self.shared.pages.read().unwrap();
                pages.last().map(|p| p.end_char >= char_index).unwrap_or(false)
            };
            if reached || self.is_complete() {
                break;
            }
            if self.produce_one_page().await.is_none() {
                break;
            }
        }
        self.find_by_character(char_index)
    }

    /// Binary search over already-produced pages' `[start_char, end_char]`
    /// ranges. Returns the last page if `char_index` is past it, or `0` if
    /// no pages exist yet.
    pub fn find_by_character(&self, char_index: u64) -> usize {
        let pages = self.shared.pages.read().unwrap();
        if pages.is_empty() {
            return 0;
        }
        match pages.binary_search_by(|p| {
            if char_index < p.start_char {
                std::cmp::Ordering::Greater
            } else if char_index > p.end_char {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        }) {
            Ok(i) => i,
            Err(_) => pages.len() - 1,
        }
    }

    /// Linear scan for the first page belonging to `chapter_index`. If not
    /// found and pagination isn't complete, paginates to completion and
    /// scans again.
    pub async fn find_by_chapter(&self, chapter_index: u32) -> Option<usize> {
        if let Some(i) = self.scan_for_chapter(chapter_index) {
            return Some(i);
        }
        if self.is_complete() {
            return None;
        }
        while !self.is_complete() {
            if self.produce_one_page().await.is_none() {
                break;
            }
        }
        self.scan_for_chapter(chapter_index)
    }

    fn scan_for_chapter(&self, chapter_index: u32) -> Option<usize> {
        self.shared
            .pages
            .read()
            .unwrap()
            .iter()
            .position(|p| p.chapter_index == chapter_index)
    }

    /// A shared handle to this engine's document blocks, for callers that
    /// want to retain block identity across engine rebuilds (see
    /// [`Self::matches`]).
    pub fn blocks_handle(&self) -> Arc<Vec<DocumentBlock>> {
        Arc::clone(&self.blocks)
    }

    /// `true` iff `blocks` is the same document (by identity) this engine
    /// was opened with and `layout` agrees with this engine's layout within
    /// epsilon, i.e. the hosting UI can skip rebuilding a fresh engine.
    pub fn matches(&self, blocks: &Arc<Vec<DocumentBlock>>, layout: &LayoutOptions) -> bool {
        Arc::ptr_eq(&self.blocks, blocks) && self.layout.approx_eq(layout)
    }

    /// If not already complete and not already running, spawns a task that
    /// repeatedly produces the next page, yielding ~8ms between pages so it
    /// never starves concurrent demand calls. Cancelled when the engine is
    /// dropped.
    pub async fn start_background(self: &Arc<Self>) {
        if self.is_complete() {
            return;
        }
        let mut guard = self.background.lock().unwrap();
        if guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if engine.is_complete() {
                    return;
                }
                if engine.produce_one_page().await.is_none() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(8)).await;
            }
        });
        *guard = Some(handle);
    }

    /// Produces and appends exactly one page, persisting the cache
    /// afterward (fire-and-forget). Returns `None` once pagination is
    /// complete (including the degenerate-layout case, which completes
    /// with zero pages on the very first call).
    async fn produce_one_page(&self) -> Option<PageContent> {
        if self.degenerate {
            self.shared.is_complete.store(true, Ordering::Release);
            return None;
        }

        let mut production = self.production.lock().await;
        let builder = PageBuilder::new(&*self.measurer, self.layout.max_width, self.layout.max_height);
        let produced = builder.build_next_page(&self.blocks, &mut production.block_states, &mut production.cursor);
        let cursor_snapshot = production.cursor;
        drop(production);

        match produced {
            Some(page) => {
                let mut pages = self.shared.pages.write().unwrap();
                pages.push(page.clone());
                self.shared
                    .total_characters
                    .store(cursor_snapshot.global_char_index, Ordering::Release);
                let snapshot_pages = pages.clone();
                drop(pages);
                self.persist(snapshot_pages, false, cursor_snapshot.global_char_index, Some(cursor_snapshot));
                Some(page)
            }
            None => {
                self.shared.is_complete.store(true, Ordering::Release);
                let total = cursor_snapshot.global_char_index;
                self.shared.total_characters.store(total, Ordering::Release);
                let snapshot_pages = self.shared.pages.read().unwrap().clone();
                self.persist(snapshot_pages, true, total, None);
                None
            }
        }
    }

    fn persist(&self, pages: Vec<PageContent>, is_complete: bool, total_characters: u64, cursor: Option<Cursor>) {
        let Some(cache) = self.cache.clone() else {
            return;
        };
        let book_id = Arc::clone(&self.book_id);
        let layout_key = self.layout_key.clone();
        tokio::spawn(async move {
            let entry = CacheEntry::new(&pages, is_complete, total_characters, cursor);
            let _ = tokio::task::spawn_blocking(move || cache.save(&book_id, &layout_key, &entry)).await;
        });
    }
}

impl Drop for PaginationEngine {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.background.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsCacheStore;
    use crate::document::{DocumentBlock, ResolvedStyle, TextAlign};
    use crate::measure::FixedWidthMeasurer;

    fn layout(max_width: f64, max_height: f64) -> LayoutOptions {
        LayoutOptions {
            font_family: Some("Georgia".to_string()),
            font_size: 16.0,
            line_height: 1.4,
            max_width,
            max_height,
            apply_height_first_ascent: true,
            apply_height_last_descent: false,
            scaler_fingerprint: "fixed-width".to_string(),
        }
    }

    fn text_block(text: &str) -> DocumentBlock {
        DocumentBlock::TextBlock {
            chapter_index: 0,
            text: text.to_string(),
            base_style: ResolvedStyle::body_default(),
            text_align: TextAlign::Start,
            font_scale: 1.0,
            font_weight: None,
            font_style: None,
            spacing_before: 0.0,
            spacing_after: 0.0,
        }
    }

    #[tokio::test]
    async fn empty_document_completes_with_no_pages() {
        let engine = PaginationEngine::open(
            "book-1",
            vec![],
            layout(2000.0, 2000.0),
            Arc::new(FixedWidthMeasurer),
            None,
        );
        engine.ensure_window(0, 0).await;
        assert_eq!(engine.page_count(), 0);
        assert!(engine.is_complete());
        assert_eq!(engine.find_by_character(0), 0);
    }

    #[tokio::test]
    async fn single_short_paragraph_is_one_page_and_complete() {
        let engine = PaginationEngine::open(
            "book-1",
            vec![text_block("Hello, world.")],
            layout(2000.0, 2000.0),
            Arc::new(FixedWidthMeasurer),
            None,
        );
        engine.ensure_window(0, 0).await;
        assert_eq!(engine.page_count(), 1);
        let page = engine.page(0).unwrap();
        assert_eq!(page.start_char, 0);
        assert_eq!(page.end_char, 12);
        assert!(engine.is_complete());
    }

    #[tokio::test]
    async fn ensure_for_character_locates_the_right_page() {
        let engine = PaginationEngine::open(
            "book-1",
            vec![text_block(&"a ".repeat(2000))],
            layout(300.0, 400.0),
            Arc::new(FixedWidthMeasurer),
            None,
        );
        let idx = engine.ensure_for_character(3990).await;
        let page = engine.page(idx).unwrap();
        assert!(page.start_char <= 3990 && 3990 <= page.end_char);
    }

    #[tokio::test]
    async fn degenerate_layout_completes_immediately_with_no_pages() {
        let engine = PaginationEngine::open(
            "book-1",
            vec![text_block("Hello, world.")],
            layout(2000.0, 1.0),
            Arc::new(FixedWidthMeasurer),
            None,
        );
        engine.ensure_window(0, 0).await;
        assert_eq!(engine.page_count(), 0);
        assert!(engine.is_complete());
    }

    #[tokio::test]
    async fn resume_from_cache_reproduces_uninterrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache: Arc<dyn CacheStore> = Arc::new(FsCacheStore::new(dir.path()));
        let blocks = vec![text_block(&"a ".repeat(2000))];
        let lay = layout(300.0, 400.0);

        let reference = PaginationEngine::open(
            "book-1",
            blocks.clone(),
            lay.clone(),
            Arc::new(FixedWidthMeasurer),
            None,
        );
        reference.ensure_window(0, usize::MAX / 2).await;
        let mut reference_pages = Vec::new();
        let mut i = 0;
        while let Some(p) = reference.page(i) {
            reference_pages.push(p);
            i += 1;
        }

        let first = PaginationEngine::open(
            "book-1",
            blocks.clone(),
            lay.clone(),
            Arc::new(FixedWidthMeasurer),
            Some(Arc::clone(&cache)),
        );
        first.ensure_window(0, 0).await;
        // allow the fire-and-forget save to land
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);

        let resumed = PaginationEngine::open(
            "book-1",
            blocks,
            lay,
            Arc::new(FixedWidthMeasurer),
            Some(cache),
        );
        resumed.ensure_window(0, usize::MAX / 2).await;
        let mut resumed_pages = Vec::new();
        let mut i = 0;
        while let Some(p) = resumed.page(i) {
            resumed_pages.push(p);
            i += 1;
        }

        assert_eq!(resumed_pages, reference_pages);
    }
}
