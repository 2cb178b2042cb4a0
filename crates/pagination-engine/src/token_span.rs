//! Token Span Builder.
//!
//! Splits a text block into an ordered sequence of break-legal spans. A break
//! is legal at any span boundary and never inside a span; the default
//! tokenizer is language-agnostic (a token is a maximal run of non-whitespace
//! characters), except that ideographic code points are tokenized one
//! codepoint at a time so that a break is legal between any two ideographs.

use serde::{Deserialize, Serialize};

/// A `[start, end)` byte range within a text block's string that must never
/// be split when paginating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl TokenSpan {
    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// `true` if the span is empty (never produced by [`build_token_spans`],
    /// kept for symmetry with `len`).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Returns `true` if `ch` belongs to a script this builder treats as
/// ideographic (each codepoint is its own token, so breaks are legal between
/// any two of them). Covers the CJK Unified Ideographs block and the
/// Hiragana/Katakana/Hangul Syllables blocks, which is sufficient for the
/// common case without pulling in a full Unicode script database.
fn is_ideographic(ch: char) -> bool {
    let c = ch as u32;
    matches!(c,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x309F // Hiragana
        | 0x30A0..=0x30FF // Katakana
        | 0xAC00..=0xD7A3 // Hangul Syllables
        | 0x3400..=0x4DBF // CJK Extension A
    )
}

/// Builds the ordered, non-overlapping token spans for `text`, deterministic
/// and a pure function of its input.
pub fn build_token_spans(text: &str) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut run_start: Option<usize> = None;

    let flush = |spans: &mut Vec<TokenSpan>, run_start: &mut Option<usize>, end: usize| {
        if let Some(start) = run_start.take() {
            if end > start {
                spans.push(TokenSpan { start, end });
            }
        }
    };

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            flush(&mut spans, &mut run_start, idx);
            continue;
        }
        if is_ideographic(ch) {
            flush(&mut spans, &mut run_start, idx);
            spans.push(TokenSpan {
                start: idx,
                end: idx + ch.len_utf8(),
            });
            continue;
        }
        if run_start.is_none() {
            run_start = Some(idx);
        }
    }
    flush(&mut spans, &mut run_start, text.len());

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let spans = build_token_spans("hello world");
        assert_eq!(spans, vec![
            TokenSpan { start: 0, end: 5 },
            TokenSpan { start: 6, end: 11 },
        ]);
    }

    #[test]
    fn ignores_leading_trailing_and_repeated_whitespace() {
        let spans = build_token_spans("  a   b  ");
        assert_eq!(spans, vec![
            TokenSpan { start: 2, end: 3 },
            TokenSpan { start: 6, end: 7 },
        ]);
    }

    #[test]
    fn covers_all_non_whitespace_and_is_ordered() {
        let text = "the quick brown fox";
        let spans = build_token_spans(text);
        assert_eq!(spans.len(), 4);
        for w in spans.windows(2) {
            assert!(w[0].start < w[1].start);
            assert!(w[0].end <= w[1].start);
        }
        assert_eq!(&text[spans[0].start..spans[0].end], "the");
        assert_eq!(&text[spans[3].start..spans[3].end], "fox");
    }

    #[test]
    fn ideographs_are_tokenized_per_codepoint() {
        let spans = build_token_spans("你好 world");
        // 你, 好 are each their own token, then "world".
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].len(), "你".len());
        assert_eq!(spans[1].len(), "好".len());
    }

    #[test]
    fn empty_text_has_no_spans() {
        assert!(build_token_spans("").is_empty());
        assert!(build_token_spans("   ").is_empty());
    }
}
