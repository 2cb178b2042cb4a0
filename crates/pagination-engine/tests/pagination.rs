//! End-to-end scenarios (S1-S6) and the cross-cutting invariants of
//! the lazy pagination engine: coverage, contiguity, no-split tokens, fit,
//! determinism, cache round-trip, resume, monotonicity under growth, and
//! find-by-character correctness.

use std::sync::Arc;
use std::time::Duration;

use pagination_engine::{
    CacheStore, DocumentBlock, FixedWidthMeasurer, FontStyle, FontWeight, LayoutOptions,
    PaginationEngine, ResolvedStyle, TextAlign, TextMeasurer,
};

fn layout(max_width: f64, max_height: f64) -> LayoutOptions {
    LayoutOptions {
        font_family: Some("Georgia".to_string()),
        font_size: 16.0,
        line_height: 1.4,
        max_width,
        max_height,
        apply_height_first_ascent: true,
        apply_height_last_descent: false,
        scaler_fingerprint: "fixed-width-v1".to_string(),
    }
}

fn text_block(chapter: u32, text: &str) -> DocumentBlock {
    DocumentBlock::TextBlock {
        chapter_index: chapter,
        text: text.to_string(),
        base_style: ResolvedStyle {
            font_family: Some("Georgia".to_string()),
            size_px: 16.0,
            line_height: 1.4,
            letter_spacing: 0.0,
            weight: FontWeight(400),
            style: FontStyle::Normal,
            color: None,
        },
        text_align: TextAlign::Start,
        font_scale: 1.0,
        font_weight: None,
        font_style: None,
        spacing_before: 4.0,
        spacing_after: 8.0,
    }
}

fn image_block(chapter: u32, w: f32, h: f32) -> DocumentBlock {
    DocumentBlock::ImageBlock {
        chapter_index: chapter,
        bytes: vec![0x89, 0x50, 0x4E, 0x47, 1, 2, 3, 4],
        intrinsic_width: Some(w),
        intrinsic_height: Some(h),
        spacing_before: 4.0,
        spacing_after: 4.0,
    }
}

async fn paginate_to_completion(engine: &PaginationEngine) -> Vec<pagination_engine::PageContent> {
    engine.ensure_window(0, usize::MAX / 4).await;
    let mut pages = Vec::new();
    let mut i = 0;
    while let Some(p) = engine.page(i) {
        pages.push(p);
        i += 1;
    }
    pages
}

// S1: empty document.
#[tokio::test]
async fn s1_empty_document() {
    let engine = PaginationEngine::open("book", vec![], layout(400.0, 600.0), Arc::new(FixedWidthMeasurer), None);
    engine.ensure_window(0, 0).await;
    assert!(engine.page(0).is_none());
    assert!(engine.is_complete());
    assert_eq!(engine.find_by_character(0), 0);
}

// S2: single short paragraph fits on one page.
#[tokio::test]
async fn s2_single_short_paragraph_no_overflow() {
    let engine = PaginationEngine::open(
        "book",
        vec![text_block(3, "Hello, world.")],
        layout(2000.0, 2000.0),
        Arc::new(FixedWidthMeasurer),
        None,
    );
    engine.ensure_window(0, 0).await;
    let page = engine.page(0).expect("one page");
    assert_eq!(page.start_char, 0);
    assert_eq!(page.end_char, 12);
    assert_eq!(page.chapter_index, 3);
    assert!(engine.is_complete());
    assert!(engine.page(1).is_none());
}

// S3: a long paragraph needs several pages, each ending on a token boundary.
#[tokio::test]
async fn s3_paragraph_needing_several_pages() {
    let text = "a ".repeat(2000);
    let engine = PaginationEngine::open(
        "book",
        vec![text_block(0, &text)],
        layout(300.0, 400.0),
        Arc::new(FixedWidthMeasurer),
        None,
    );
    let pages = paginate_to_completion(&engine).await;
    assert!(pages.len() >= 2);
    for w in pages.windows(2) {
        assert_eq!(w[1].start_char, w[0].end_char + 1);
    }
    assert_eq!(pages.last().unwrap().end_char, text.len() as u64 - 1);
    for page in &pages {
        let accepted = match &page.blocks[0] {
            pagination_engine::PageBlock::TextPageBlock { text, .. } => text.clone(),
            _ => panic!("expected text block"),
        };
        // every page's accepted text ends at a token boundary: either the
        // whole text, or a trailing space (the "a " token separator).
        if (page.end_char as usize) < text.len() - 1 {
            assert!(accepted.ends_with(' '), "page should end on a token boundary: {accepted:?}");
        }
    }
}

// S4: image between paragraphs advances the character index by exactly 1.
#[tokio::test]
async fn s4_image_between_paragraphs() {
    let engine = PaginationEngine::open(
        "book",
        vec![
            text_block(0, "before the picture"),
            image_block(0, 300.0, 100.0),
            text_block(0, "after the picture"),
        ],
        layout(300.0, 400.0),
        Arc::new(FixedWidthMeasurer),
        None,
    );
    let pages = paginate_to_completion(&engine).await;
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[1].start_char, pages[1].end_char);
    assert_eq!(pages[1].start_char, pages[0].end_char + 1);
    assert_eq!(pages[2].start_char, pages[1].end_char + 1);
    assert!(matches!(pages[1].blocks[0], pagination_engine::PageBlock::ImagePageBlock { .. }));
}

// S5 / property 7 (resume): running to a cursor, reopening from cache, and
// finishing produces the same page sequence as an uninterrupted run.
#[tokio::test]
async fn s5_resume_from_cursor_matches_uninterrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheStore> = Arc::new(pagination_engine::FsCacheStore::new(dir.path()));
    let blocks = vec![text_block(0, &"word ".repeat(1500)), text_block(1, &"more ".repeat(1500))];
    let lay = layout(320.0, 420.0);

    let reference = PaginationEngine::open("res-book", blocks.clone(), lay.clone(), Arc::new(FixedWidthMeasurer), None);
    let reference_pages = paginate_to_completion(&reference).await;

    let partial = PaginationEngine::open(
        "res-book",
        blocks.clone(),
        lay.clone(),
        Arc::new(FixedWidthMeasurer),
        Some(Arc::clone(&cache)),
    );
    partial.ensure_window(0, 4).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    drop(partial);

    let resumed = PaginationEngine::open("res-book", blocks, lay, Arc::new(FixedWidthMeasurer), Some(cache));
    let resumed_pages = paginate_to_completion(&resumed).await;

    assert_eq!(resumed_pages, reference_pages);
}

// S6: changing the font size changes the layout key, so the same book under
// a new layout starts fresh rather than reusing the old cache entry.
#[tokio::test]
async fn s6_layout_change_invalidates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheStore> = Arc::new(pagination_engine::FsCacheStore::new(dir.path()));
    let blocks = vec![text_block(0, "Hello, world.")];

    let mut small = layout(320.0, 420.0);
    small.font_size = 16.0;
    let engine_small = PaginationEngine::open(
        "s6-book",
        blocks.clone(),
        small.clone(),
        Arc::new(FixedWidthMeasurer),
        Some(Arc::clone(&cache)),
    );
    engine_small.ensure_window(0, 0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.load("s6-book", &small.layout_key()).is_some());

    let mut large = small.clone();
    large.font_size = 18.0;
    assert_ne!(small.layout_key(), large.layout_key());
    assert!(cache.load("s6-book", &large.layout_key()).is_none());

    let engine_large = PaginationEngine::open("s6-book", blocks, large.clone(), Arc::new(FixedWidthMeasurer), Some(Arc::clone(&cache)));
    engine_large.ensure_window(0, 0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Original entry under the old key is untouched.
    let original = cache.load("s6-book", &small.layout_key()).expect("original entry preserved");
    assert!(original.is_complete);
}

// Property 1 + 2: coverage and contiguity over a mixed document.
#[tokio::test]
async fn coverage_and_contiguity_over_mixed_document() {
    let blocks = vec![
        text_block(0, "Chapter one opening line."),
        text_block(0, &"filler text ".repeat(400)),
        image_block(0, 200.0, 300.0),
        text_block(1, "Chapter two begins here."),
    ];
    let total_chars: u64 = blocks
        .iter()
        .map(|b| match b {
            DocumentBlock::TextBlock { text, .. } => text.len() as u64,
            DocumentBlock::ImageBlock { .. } => 1,
        })
        .sum();

    let engine = PaginationEngine::open("cov-book", blocks, layout(320.0, 420.0), Arc::new(FixedWidthMeasurer), None);
    let pages = paginate_to_completion(&engine).await;

    assert_eq!(pages.last().unwrap().end_char, total_chars - 1);
    for w in pages.windows(2) {
        assert_eq!(w[1].start_char, w[0].end_char + 1);
    }
}

// Property 4: fit -- every page's measured height stays within budget.
#[tokio::test]
async fn every_page_fits_the_effective_height_budget() {
    let measurer = FixedWidthMeasurer;
    let blocks = vec![text_block(0, &"supercalifragilistic ".repeat(200))];
    let max_width = 280.0;
    let max_height = 360.0;
    let engine = PaginationEngine::open(
        "fit-book",
        blocks,
        layout(max_width, max_height),
        Arc::new(measurer),
        None,
    );
    let pages = paginate_to_completion(&engine).await;

    for page in &pages {
        let pagination_engine::PageBlock::TextPageBlock { text, spacing_before, spacing_after, style, .. } =
            &page.blocks[0]
        else {
            panic!("expected a text page block");
        };
        let measured = measurer.measure(text, style, max_width);
        let line_height = style.size_px as f64 * style.line_height as f64;
        let eff = pagination_engine::page_builder::effective_max_height(max_height, line_height, *spacing_after as f64);
        let total = (*spacing_before as f64 + measured.total_height() + *spacing_after as f64).ceil();
        assert!(total <= eff + 1.0, "page exceeded its height budget: {total} > {eff}");
    }
}

// Property 3: no-split tokens -- every page's text starts/ends at a token
// boundary of its source block.
#[tokio::test]
async fn pages_never_split_a_token() {
    let text = "the quick brown fox jumps over the lazy dog ".repeat(60);
    let tokens = pagination_engine::build_token_spans(&text);
    let blocks = vec![text_block(0, &text)];
    let engine = PaginationEngine::open("tok-book", blocks, layout(260.0, 320.0), Arc::new(FixedWidthMeasurer), None);
    let pages = paginate_to_completion(&engine).await;

    // A page boundary never falls strictly inside a token; it may land on a
    // token's own end, or anywhere in the whitespace run carried onto the
    // page after it (up to the next token's start).
    let inside_a_token = |pos: usize| tokens.iter().any(|t| t.start < pos && pos < t.end);

    let mut offset = 0usize;
    for page in &pages {
        let pagination_engine::PageBlock::TextPageBlock { text: slice, .. } = &page.blocks[0] else {
            panic!("expected text block");
        };
        let start = offset;
        let end = offset + slice.len();
        assert!(!inside_a_token(start), "page start {start} splits a token");
        assert!(!inside_a_token(end), "page end {end} splits a token");
        offset = end;
    }
}

// Property 9: find_by_character returns the unique containing page for every
// character in range, including the boundary characters of each page.
#[tokio::test]
async fn find_by_character_is_correct_at_every_boundary() {
    let text = "b ".repeat(1200);
    let blocks = vec![text_block(0, &text)];
    let engine = PaginationEngine::open("find-book", blocks, layout(280.0, 360.0), Arc::new(FixedWidthMeasurer), None);
    let pages = paginate_to_completion(&engine).await;

    for (i, page) in pages.iter().enumerate() {
        assert_eq!(engine.find_by_character(page.start_char), i);
        assert_eq!(engine.find_by_character(page.end_char), i);
    }
}

// Property 5: determinism -- two engines built from the same inputs produce
// byte-identical page sequences and cache entries.
#[tokio::test]
async fn determinism_across_independent_engines() {
    let blocks = vec![text_block(0, &"determinism check ".repeat(300))];
    let lay = layout(300.0, 400.0);

    let e1 = PaginationEngine::open("det-book", blocks.clone(), lay.clone(), Arc::new(FixedWidthMeasurer), None);
    let e2 = PaginationEngine::open("det-book", blocks, lay, Arc::new(FixedWidthMeasurer), None);

    let p1 = paginate_to_completion(&e1).await;
    let p2 = paginate_to_completion(&e2).await;
    assert_eq!(p1, p2);
}

// Property 8: monotonicity -- pages.len() observed during background
// production never shrinks, and previously-observed pages never change.
#[tokio::test]
async fn background_growth_is_monotonic_and_stable() {
    let text = "growth monotonic check ".repeat(400);
    let blocks = vec![text_block(0, &text)];
    let engine = Arc::new(PaginationEngine::open(
        "grow-book",
        blocks,
        layout(300.0, 400.0),
        Arc::new(FixedWidthMeasurer),
        None,
    ));

    engine.start_background().await;

    let mut last_len = 0usize;
    let mut first_page_snapshot = None;
    for _ in 0..50 {
        let len = engine.page_count();
        assert!(len >= last_len, "pages.len() must never shrink");
        last_len = len;
        if len > 0 {
            let p0 = engine.page(0).unwrap();
            match &first_page_snapshot {
                None => first_page_snapshot = Some(p0),
                Some(prev) => assert_eq!(prev, &p0, "an observed page must never change"),
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        if engine.is_complete() {
            break;
        }
    }
    assert!(engine.is_complete());
}

// Property 6: cache round-trip for an entry containing binary image bytes.
#[tokio::test]
async fn cache_round_trip_with_image_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let cache = pagination_engine::FsCacheStore::new(dir.path());
    let blocks = vec![text_block(0, "intro"), image_block(0, 200.0, 150.0)];
    let lay = layout(300.0, 400.0);
    let key = lay.layout_key();

    let engine = PaginationEngine::open("img-book", blocks, lay, Arc::new(FixedWidthMeasurer), None);
    let pages = paginate_to_completion(&engine).await;
    let entry = pagination_engine::CacheEntry::new(&pages, true, pages.last().unwrap().end_char + 1, None);
    cache.save("img-book", &key, &entry);

    let loaded = cache.load("img-book", &key).expect("entry should round-trip");
    assert_eq!(loaded, entry);
}

#[tokio::test]
async fn find_by_chapter_paginates_to_completion_when_not_yet_found() {
    let blocks = vec![
        text_block(0, &"chapter zero text ".repeat(200)),
        text_block(1, "chapter one, much shorter"),
    ];
    let engine = PaginationEngine::open("chap-book", blocks, layout(300.0, 400.0), Arc::new(FixedWidthMeasurer), None);

    // Chapter 1 isn't among the first page(s), so this must paginate ahead.
    let idx = engine.find_by_chapter(1).await.expect("chapter 1 exists");
    let page = engine.page(idx).unwrap();
    assert_eq!(page.chapter_index, 1);
    assert!(engine.find_by_chapter(99).await.is_none());
}

// Property 10: layout key stability.
#[tokio::test]
async fn matches_and_layout_key_stability() {
    let blocks = vec![text_block(0, "identity check")];
    let lay = layout(300.0, 400.0);
    let engine = PaginationEngine::open("m-book", blocks.clone(), lay.clone(), Arc::new(FixedWidthMeasurer), None);
    let handle = engine.blocks_handle();

    assert!(engine.matches(&handle, &lay));
    assert_eq!(lay.layout_key(), lay.clone().layout_key());

    let mut different = lay.clone();
    different.max_width = lay.max_width + 5.0;
    assert!(!engine.matches(&handle, &different));
    assert_ne!(different.layout_key(), lay.layout_key());

    let other_blocks = Arc::new(blocks);
    assert!(!engine.matches(&other_blocks, &lay));
}
