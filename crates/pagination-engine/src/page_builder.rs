//! Page Builder: the fit/shrink algorithm.
//!
//! Consumes block states in order and emits one [`PageContent`] per call,
//! never splitting a token, shrinking a candidate page by whole tokens
//! until it fits the effective height budget, and forcing progress when a
//! single token cannot fit on its own.

use crate::block_state::{BlockState, TextCursorState};
use crate::cursor::Cursor;
use crate::document::{DocumentBlock, ResolvedStyle, TextAlign};
use crate::measure::TextMeasurer;
use crate::page::{PageBlock, PageContent};
use crate::token_span::TokenSpan;

fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi.max(lo))
}

/// `max_height` minus the dynamic page-bottom margin: the true vertical
/// budget the algorithm targets.
pub fn effective_max_height(max_height: f64, line_height: f64, spacing_after: f64) -> f64 {
    max_height - page_bottom_margin(line_height, spacing_after, max_height)
}

fn page_bottom_margin(line_height: f64, spacing_after: f64, max_height: f64) -> f64 {
    clamp(line_height + spacing_after, 48.0, (max_height * 0.18).max(48.0))
}

/// Vertical padding above a candidate break line used to query the measurer
/// for a text offset.
pub fn break_point_margin(line_height: f64) -> f64 {
    clamp(line_height * 0.75, 24.0, 80.0)
}

fn effective_style(block: &DocumentBlock) -> ResolvedStyle {
    match block {
        DocumentBlock::TextBlock {
            base_style,
            font_scale,
            font_weight,
            font_style,
            ..
        } => ResolvedStyle {
            size_px: base_style.size_px * font_scale,
            weight: font_weight.unwrap_or(base_style.weight),
            style: font_style.unwrap_or(base_style.style),
            ..base_style.clone()
        },
        DocumentBlock::ImageBlock { .. } => unreachable!("effective_style called on an image block"),
    }
}

fn block_text(block: &DocumentBlock) -> &str {
    match block {
        DocumentBlock::TextBlock { text, .. } => text,
        DocumentBlock::ImageBlock { .. } => unreachable!("block_text called on an image block"),
    }
}

fn block_align(block: &DocumentBlock) -> TextAlign {
    match block {
        DocumentBlock::TextBlock { text_align, .. } => *text_align,
        DocumentBlock::ImageBlock { .. } => unreachable!("block_align called on an image block"),
    }
}

/// Builds pages one at a time from an ordered list of [`DocumentBlock`]s.
pub struct PageBuilder<'m> {
    measurer: &'m dyn TextMeasurer,
    max_width: f64,
    max_height: f64,
}

impl<'m> PageBuilder<'m> {
    /// Creates a builder targeting `max_width` x `max_height` pixels.
    pub fn new(measurer: &'m dyn TextMeasurer, max_width: f64, max_height: f64) -> Self {
        PageBuilder {
            measurer,
            max_width,
            max_height,
        }
    }

    /// Produces the next page starting at `cursor`, or `None` once every
    /// block has been consumed.
    pub fn build_next_page(
        &self,
        blocks: &[DocumentBlock],
        states: &mut Vec<Option<BlockState>>,
        cursor: &mut Cursor,
    ) -> Option<PageContent> {
        loop {
            let block_idx = cursor.block_index as usize;
            if block_idx >= blocks.len() {
                return None;
            }
            let block = &blocks[block_idx];

            if block.is_image() {
                return Some(self.build_image_page(block, block_idx == 0, cursor));
            }

            if states.len() <= block_idx {
                states.resize_with(block_idx + 1, || None);
            }
            if states[block_idx].is_none() {
                let style = effective_style(block);
                let text = block_text(block);
                states[block_idx] = Some(BlockState::build(text, &style, self.max_width, self.measurer));
            }
            if let Some(ts) = cursor.text_state.take() {
                states[block_idx].as_mut().unwrap().apply_cursor(ts);
            }

            if states[block_idx].as_ref().unwrap().at_end() {
                cursor.block_index += 1;
                cursor.text_state = None;
                continue;
            }

            return Some(self.build_text_page(block, block_idx, states, cursor));
        }
    }

    fn build_image_page(&self, block: &DocumentBlock, is_leading: bool, cursor: &mut Cursor) -> PageContent {
        let (bytes, intrinsic_width, intrinsic_height, spacing_before_raw, spacing_after) = match block {
            DocumentBlock::ImageBlock {
                bytes,
                intrinsic_width,
                intrinsic_height,
                spacing_before,
                spacing_after,
                ..
            } => (
                bytes.clone(),
                intrinsic_width.unwrap_or(self.max_width as f32),
                intrinsic_height.unwrap_or(0.0),
                *spacing_before,
                *spacing_after,
            ),
            _ => unreachable!(),
        };

        let spacing_before = if is_leading { 0.0 } else { spacing_before_raw };
        let scale = if intrinsic_width > 0.0 {
            self.max_width as f32 / intrinsic_width
        } else {
            1.0
        };
        let fitted_height_raw = intrinsic_height * scale;
        // Clamp to the available room when it fits; otherwise force
        // emission at intrinsic size clamped to the full page height
        // (visual overflow accepted, per the image-page policy).
        let available = (self.max_height as f32 - spacing_before - spacing_after).max(0.0);
        let rendered_height = if spacing_before + fitted_height_raw + spacing_after <= self.max_height as f32 && available > 0.0 {
            fitted_height_raw.min(available)
        } else {
            fitted_height_raw.min(self.max_height as f32).max(0.0)
        };

        let chapter_index = block.chapter_index();
        let start_char = cursor.global_char_index;
        let end_char = start_char;
        let start_word = cursor.global_word_index;
        let end_word = start_word.saturating_sub(1);

        cursor.block_index += 1;
        cursor.global_char_index += 1;
        cursor.text_state = None;

        PageContent {
            blocks: vec![PageBlock::ImagePageBlock {
                bytes,
                rendered_height,
                spacing_before,
                spacing_after,
            }],
            chapter_index,
            start_char,
            end_char,
            start_word,
            end_word,
        }
    }

    fn build_text_page(
        &self,
        block: &DocumentBlock,
        block_idx: usize,
        states: &mut Vec<Option<BlockState>>,
        cursor: &mut Cursor,
    ) -> PageContent {
        let style = effective_style(block);
        let align = block_align(block);
        let text = block_text(block).to_string();
        let spacing_before_raw = block.spacing_before();
        let spacing_after_raw = block.spacing_after() as f64;
        let is_leading_block = block_idx == 0;

        let state = states[block_idx].as_ref().unwrap();
        let start_line_index = state.cursor.line_index as usize;
        let start_of_page_char = state.cursor.text_offset as usize;
        let start_token_pointer = state.cursor.token_pointer as usize;
        let at_block_start = start_of_page_char == 0;
        let spacing_before = if at_block_start && !is_leading_block {
            spacing_before_raw as f64
        } else {
            0.0
        };

        let num_lines = state.lines.lines.len();
        let mut current_height = spacing_before;
        let mut line_index = start_line_index;

        let overflow_line = loop {
            if line_index >= num_lines {
                break None;
            }
            let line = &state.lines.lines[line_index];
            let is_last_line = line_index + 1 == num_lines;
            let spacing_after_test = if is_last_line { spacing_after_raw } else { 0.0 };
            let eff_max_h = effective_max_height(self.max_height, line.height, spacing_after_test);

            if line_index > start_line_index
                && current_height + line.height + spacing_after_test > eff_max_h
            {
                break Some(line_index);
            }
            current_height += line.height;
            line_index += 1;
        };

        let (accepted_end, final_token_ptr, ends_block) = match overflow_line {
            None => {
                // Step 8: reached the block's last line without overflowing.
                let (end, ptr) = self.shrink_or_force(
                    state,
                    &text,
                    &style,
                    start_of_page_char,
                    text.len(),
                    start_token_pointer,
                    spacing_before,
                    spacing_after_raw,
                    true,
                );
                (end, ptr, end >= text.len())
            }
            Some(overflow_idx) => {
                let line = &state.lines.lines[overflow_idx];
                let bp_margin = break_point_margin(line.height);
                let line_top = line.baseline_y - line.ascent;
                let break_y = (line_top - bp_margin).max(0.0);
                let break_offset = state.lines.position_at_offset(line.left, break_y);
                let target = break_offset.max(state.line_start_char[overflow_idx]);

                let mut token_ptr_excl = start_token_pointer;
                for k in start_token_pointer..=state.tokens.len() {
                    if k == 0 {
                        continue;
                    }
                    token_ptr_excl = k;
                    if state.tokens[k - 1].end >= target {
                        break;
                    }
                }

                let mut safe_break = if token_ptr_excl > start_token_pointer {
                    break_after_token(&state.tokens, token_ptr_excl, text.len())
                } else {
                    state.line_start_char[overflow_idx]
                };

                if safe_break <= start_of_page_char {
                    token_ptr_excl = start_token_pointer + 1;
                    safe_break = break_after_token(&state.tokens, token_ptr_excl, text.len());
                }

                let (end, ptr) = self.shrink_or_force(
                    state,
                    &text,
                    &style,
                    start_of_page_char,
                    safe_break,
                    start_token_pointer,
                    spacing_before,
                    0.0,
                    false,
                );
                (end, ptr, end >= text.len())
            }
        };

        let spacing_after_applied = if ends_block { block.spacing_after() } else { 0.0 };
        let accepted = &text[start_of_page_char..accepted_end];
        let accepted_len = (accepted_end - start_of_page_char) as u64;
        let tokens_in_page = final_token_ptr.saturating_sub(start_token_pointer) as u64;

        let chapter_index = block.chapter_index();
        let start_char = cursor.global_char_index;
        let end_char = start_char + accepted_len.saturating_sub(1);
        let start_word = cursor.global_word_index;
        let end_word = if tokens_in_page == 0 {
            start_word.saturating_sub(1)
        } else {
            start_word + tokens_in_page - 1
        };

        cursor.global_char_index += accepted_len;
        cursor.global_word_index += tokens_in_page;

        let state_mut = states[block_idx].as_mut().unwrap();
        if ends_block {
            state_mut.completed = true;
            cursor.block_index += 1;
            cursor.text_state = None;
        } else {
            let line_index = state_mut.line_index_for_offset(accepted_end);
            let text_state = TextCursorState {
                line_index: line_index as u32,
                text_offset: accepted_end as u32,
                token_pointer: final_token_ptr as u32,
            };
            state_mut.cursor = text_state;
            cursor.text_state = Some(text_state);
        }

        PageContent {
            blocks: vec![PageBlock::TextPageBlock {
                text: accepted.to_string(),
                style,
                align,
                spacing_before: spacing_before as f32,
                spacing_after: spacing_after_applied,
            }],
            chapter_index,
            start_char,
            end_char,
            start_word,
            end_word,
        }
    }

    /// Shrinks `[start, candidate_end)` by whole tokens until it fits, or
    /// forces progress by emitting a single token if even that overflows.
    fn shrink_or_force(
        &self,
        state: &BlockState,
        text: &str,
        style: &ResolvedStyle,
        start: usize,
        mut candidate_end: usize,
        start_token_pointer: usize,
        spacing_before: f64,
        spacing_after_raw: f64,
        is_end_of_block_candidate: bool,
    ) -> (usize, usize) {
        let mut token_ptr_excl = token_ptr_excl_for_end(state, start_token_pointer, candidate_end);

        loop {
            let slice = &text[start..candidate_end];
            let measured = self.measurer.measure(slice, style, self.max_width);
            let is_last_line = is_end_of_block_candidate && candidate_end >= text.len();
            let spacing_after_test = if is_last_line { spacing_after_raw } else { 0.0 };
            let eff_max_h = effective_max_height(self.max_height, measured.preferred_line_height, spacing_after_test);
            let total = (spacing_before + measured.total_height() + spacing_after_test).ceil();

            if total <= eff_max_h {
                return (candidate_end, token_ptr_excl);
            }
            if token_ptr_excl <= start_token_pointer {
                let forced_end = break_after_token(&state.tokens, start_token_pointer + 1, text.len());
                return (forced_end, start_token_pointer + 1);
            }
            token_ptr_excl -= 1;
            candidate_end = if token_ptr_excl > start_token_pointer {
                break_after_token(&state.tokens, token_ptr_excl, text.len())
            } else {
                start
            };
        }
    }
}

fn token_ptr_excl_for_end(state: &BlockState, start_token_pointer: usize, end: usize) -> usize {
    let mut ptr = start_token_pointer;
    for (i, tok) in state.tokens.iter().enumerate().skip(start_token_pointer) {
        if tok.end <= end {
            ptr = i + 1;
        } else {
            break;
        }
    }
    ptr
}

/// Break point after accepting `token_ptr_excl` tokens, carrying the
/// trailing whitespace run onto the page: the legal break lands at the
/// start of the next token (or end of text, if this was the last one),
/// per the "whitespace belongs to the preceding token" rule.
fn break_after_token(tokens: &[TokenSpan], token_ptr_excl: usize, text_len: usize) -> usize {
    tokens
        .get(token_ptr_excl)
        .map(|t| t.start)
        .unwrap_or(text_len)
}
