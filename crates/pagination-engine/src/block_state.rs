//! Block State.
//!
//! Per text block: the measurer's output cached at the block's full width,
//! its token spans, and a mutable cursor tracking how far the block has
//! been consumed. Built lazily on first visit; lives until the engine that
//! owns it is dropped.

use crate::measure::{LaidOutText, TextMeasurer};
use crate::token_span::{build_token_spans, TokenSpan};
use serde::{Deserialize, Serialize};

/// The block-local cursor: where, inside one block, pagination has reached.
/// `text_offset` always lands on a legal break point: `0`, the text's full
/// length, or some `tokens[k].end` carried forward across the trailing
/// whitespace run up to `tokens[k+1].start` -- never inside a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCursorState {
    /// Index into `BlockState::lines` of the line containing `char_offset`.
    pub line_index: u32,
    /// Byte offset into the block's text already consumed.
    pub text_offset: u32,
    /// Index into `BlockState::tokens` of the next unconsumed token.
    pub token_pointer: u32,
}

/// Lazily-built, per-block measurement cache plus consumption cursor.
pub struct BlockState {
    /// Lines from the Text Measurer, laid out at the block's max width.
    pub lines: LaidOutText,
    /// `line_start_char[i] == lines.lines[i].first_char`, kept as a separate
    /// vector for fast binary search when re-deriving `line_index`.
    pub line_start_char: Vec<usize>,
    /// Token spans for the block's text.
    pub tokens: Vec<TokenSpan>,
    /// Mutable, in-block consumption cursor.
    pub cursor: TextCursorState,
    /// `true` once every character of the block has been emitted onto a
    /// page.
    pub completed: bool,
}

impl BlockState {
    /// Builds a fresh `BlockState` for `text`, measured at `max_width`.
    pub fn build(text: &str, style: &crate::document::ResolvedStyle, max_width: f64, measurer: &dyn TextMeasurer) -> Self {
        let lines = measurer.measure(text, style, max_width);
        let line_start_char = lines.lines.iter().map(|l| l.first_char).collect();
        let tokens = build_token_spans(text);
        BlockState {
            lines,
            line_start_char,
            tokens,
            cursor: TextCursorState::default(),
            completed: text.is_empty(),
        }
    }

    /// Re-derives `line_index` for a given `char_offset`: the last line
    /// whose `first_char <= char_offset`, via binary search over
    /// `line_start_char`.
    pub fn line_index_for_offset(&self, char_offset: usize) -> usize {
        match self.line_start_char.binary_search(&char_offset) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        }
    }

    /// Applies a previously-serialized in-block cursor, e.g. when resuming
    /// from a cache entry.
    pub fn apply_cursor(&mut self, state: TextCursorState) {
        self.cursor = state;
        self.completed = false;
    }

    /// `true` once the cursor has consumed the whole block.
    pub fn at_end(&self) -> bool {
        self.completed || self.cursor.text_offset as usize >= self.text_len()
    }

    fn text_len(&self) -> usize {
        self.lines
            .lines
            .last()
            .map(|l| l.last_char + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ResolvedStyle;
    use crate::measure::FixedWidthMeasurer;

    #[test]
    fn line_index_for_offset_matches_binary_search_semantics() {
        let style = ResolvedStyle::body_default();
        let measurer = FixedWidthMeasurer;
        let text = "a ".repeat(500);
        let state = BlockState::build(&text, &style, 300.0, &measurer);
        assert!(state.lines.lines.len() > 1);
        for (i, l) in state.lines.lines.iter().enumerate() {
            assert_eq!(state.line_index_for_offset(l.first_char), i);
        }
    }

    #[test]
    fn empty_text_is_completed_immediately() {
        let style = ResolvedStyle::body_default();
        let measurer = FixedWidthMeasurer;
        let state = BlockState::build("", &style, 300.0, &measurer);
        assert!(state.completed);
    }
}
