//! Adapter from the parser's styled-content stream to
//! `pagination_engine::DocumentBlock`s.
//!
//! This is the only module in `epub_source` that depends on
//! `pagination_engine`: it converts a [`crate::render_prep::StyledChapter`]
//! (the event/run stream `chapter_styled_runs` already produces) into the
//! ordered block list the engine's `open` expects. Paragraph-like spans --
//! delimited by `ParagraphStart`/`HeadingStart`/`ListItemStart` and their
//! matching `*End` events -- become one `TextBlock` each, concatenating the
//! text of every run inside the span and taking the span's style from its
//! first run (runs inside one block in practice share a style; mid-block
//! style changes are not reflected in the resulting single `base_style`,
//! matching `spec.md` §3's one-style-per-text-block shape).

use alloc::vec::Vec;

use pagination_engine::document::{DocumentBlock, FontStyle, FontWeight, ResolvedStyle, TextAlign};

use crate::render_prep::{BlockRole, StyledChapter, StyledEvent, StyledEventOrRun, StyledRun};

fn resolved_style(run: &StyledRun) -> ResolvedStyle {
    ResolvedStyle {
        font_family: if run.resolved_family.is_empty() {
            None
        } else {
            Some(run.resolved_family.clone())
        },
        size_px: run.style.size_px,
        line_height: run.style.line_height,
        letter_spacing: run.style.letter_spacing,
        weight: FontWeight(run.style.weight),
        style: if run.style.italic {
            FontStyle::Italic
        } else {
            FontStyle::Normal
        },
        color: None,
    }
}

fn block_role_spacing(role: BlockRole) -> (f32, f32) {
    match role {
        BlockRole::Heading(_) => (16.0, 8.0),
        BlockRole::ListItem => (2.0, 2.0),
        BlockRole::Paragraph | BlockRole::Body => (0.0, 12.0),
    }
}

struct OpenSpan {
    text: alloc::string::String,
    style: Option<ResolvedStyle>,
    role: BlockRole,
}

/// Converts one chapter's styled event/run stream into document blocks,
/// assigning `chapter_index` to every produced block.
///
/// Structural events with no matching run inside them (an empty paragraph,
/// for instance) are dropped -- they would produce an empty text block,
/// which `spec.md` §3's "non-empty logical paragraph" invariant excludes.
pub fn chapter_document_blocks(chapter: &StyledChapter, chapter_index: u32) -> Vec<DocumentBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<OpenSpan> = None;

    for item in chapter.iter() {
        match item {
            StyledEventOrRun::Event(StyledEvent::ParagraphStart) => {
                open = Some(OpenSpan {
                    text: alloc::string::String::new(),
                    style: None,
                    role: BlockRole::Paragraph,
                });
            }
            StyledEventOrRun::Event(StyledEvent::HeadingStart(level)) => {
                open = Some(OpenSpan {
                    text: alloc::string::String::new(),
                    style: None,
                    role: BlockRole::Heading(*level),
                });
            }
            StyledEventOrRun::Event(StyledEvent::ListItemStart) => {
                open = Some(OpenSpan {
                    text: alloc::string::String::new(),
                    style: None,
                    role: BlockRole::ListItem,
                });
            }
            StyledEventOrRun::Event(
                StyledEvent::ParagraphEnd | StyledEvent::HeadingEnd(_) | StyledEvent::ListItemEnd,
            ) => {
                if let Some(span) = open.take() {
                    push_block(&mut blocks, span, chapter_index);
                }
            }
            StyledEventOrRun::Event(StyledEvent::LineBreak) => {
                if let Some(span) = open.as_mut() {
                    span.text.push('\n');
                }
            }
            StyledEventOrRun::Run(run) => {
                if let Some(span) = open.as_mut() {
                    span.text.push_str(&run.text);
                    if span.style.is_none() {
                        span.style = Some(resolved_style(run));
                    }
                } else {
                    // A bare run outside any structural event: treat it as
                    // its own one-run paragraph rather than dropping text.
                    push_block(
                        &mut blocks,
                        OpenSpan {
                            text: run.text.clone(),
                            style: Some(resolved_style(run)),
                            role: BlockRole::Body,
                        },
                        chapter_index,
                    );
                }
            }
        }
    }
    if let Some(span) = open.take() {
        push_block(&mut blocks, span, chapter_index);
    }

    blocks
}

fn push_block(blocks: &mut Vec<DocumentBlock>, span: OpenSpan, chapter_index: u32) {
    if span.text.is_empty() {
        return;
    }
    let style = span.style.unwrap_or_else(ResolvedStyle::body_default);
    let (spacing_before, spacing_after) = block_role_spacing(span.role);
    blocks.push(DocumentBlock::TextBlock {
        chapter_index,
        text: span.text,
        base_style: style,
        text_align: TextAlign::Start,
        font_scale: 1.0,
        font_weight: None,
        font_style: None,
        spacing_before,
        spacing_after,
    });
}

/// Runs [`chapter_document_blocks`] over every chapter already extracted via
/// [`crate::book::EpubBook::chapter_styled_runs`], in spine order.
pub fn book_document_blocks(chapters: &[StyledChapter]) -> Vec<DocumentBlock> {
    chapters
        .iter()
        .enumerate()
        .flat_map(|(i, chapter)| chapter_document_blocks(chapter, i as u32))
        .collect()
}
