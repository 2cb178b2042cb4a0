//! Text Measurer contract.
//!
//! The engine depends only on this contract, never on a concrete shaper: a
//! pure, total, deterministic function from `(text, style, max_width)` to
//! per-line metrics. Platform implementations (a harfbuzz+ICU pipeline, a
//! native text-layout API, a headless shaper) live outside this crate;
//! [`FixedWidthMeasurer`] is a deterministic reference implementation
//! usable directly, or as a template for a real one.

use crate::document::ResolvedStyle;
use serde::{Deserialize, Serialize};

/// Per-line output of a single `measure` call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineMetric {
    /// Left edge of the line's text, in pixels.
    pub left: f64,
    /// Baseline y offset from the top of the laid-out block, in pixels.
    pub baseline_y: f64,
    /// Ascent above the baseline, in pixels.
    pub ascent: f64,
    /// Descent below the baseline, in pixels.
    pub descent: f64,
    /// Total line height (ascent + descent + any leading), in pixels.
    pub height: f64,
    /// First character index (into the measured text) covered by this line.
    pub first_char: usize,
    /// Last character index (inclusive) covered by this line.
    pub last_char: usize,
}

/// The result of laying out a string at a fixed width.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaidOutText {
    /// The line-height the measurer would prefer if given a single,
    /// non-overflowing line (used by callers estimating without measuring).
    pub preferred_line_height: f64,
    /// Lines in order; together they cover the entire input text, and
    /// `first_char` is monotonically non-decreasing across lines.
    pub lines: Vec<LineMetric>,
}

impl LaidOutText {
    /// Sum of `height` across all lines.
    pub fn total_height(&self) -> f64 {
        self.lines.iter().map(|l| l.height).sum()
    }

    /// Maps a local pixel offset `(x, y)` to a character index in the
    /// originally-measured text. `y` selects the line (clamped to the first
    /// or last line if out of range); `x` is interpolated within that line's
    /// character range.
    pub fn position_at_offset(&self, x: f64, y: f64) -> usize {
        if self.lines.is_empty() {
            return 0;
        }
        let mut cum_top = 0.0f64;
        let mut chosen = &self.lines[0];
        for line in &self.lines {
            let top = cum_top;
            let bottom = top + line.height;
            chosen = line;
            if y < bottom {
                break;
            }
            cum_top = bottom;
        }
        if chosen.last_char < chosen.first_char {
            return chosen.first_char;
        }
        let span = (chosen.last_char - chosen.first_char + 1) as f64;
        let line_width = (x - chosen.left).max(0.0);
        // Without real glyph widths we assume uniform advance across the
        // line; this is sufficient for the deterministic reference measurer
        // and exercises the same call shape a real shaper would serve.
        // `LaidOutText` doesn't retain the originating style, so this uses
        // `ResolvedStyle::body_default()`'s advance (16px * 0.55 = 8.8).
        let estimated_width = span * 8.8;
        let fraction = if estimated_width > 0.0 {
            (line_width / estimated_width).min(1.0)
        } else {
            0.0
        };
        chosen.first_char + ((span - 1.0) * fraction).round() as usize
    }
}

/// Platform text measurement contract. Implementations must be deterministic
/// and total for fixed inputs: no observable failure mode.
pub trait TextMeasurer: Send + Sync {
    /// Lays out `text` in `style` constrained to `max_width` pixels.
    fn measure(&self, text: &str, style: &ResolvedStyle, max_width: f64) -> LaidOutText;
}

fn width_factor(style: &ResolvedStyle) -> f32 {
    match (style.weight.0 >= 600, style.style) {
        (true, crate::document::FontStyle::Italic) => 0.64,
        (true, _) => 0.62,
        (false, crate::document::FontStyle::Italic) => 0.58,
        (false, _) => 0.55,
    }
}

/// Per-character advance width for `style`, the same heuristic used
/// throughout this measurer: `size_px * width_factor(style)`.
fn char_advance(style: &ResolvedStyle) -> f64 {
    (style.size_px * width_factor(style)) as f64 + style.letter_spacing as f64
}

/// A deterministic reference [`TextMeasurer`] with no font-file dependency.
/// Lays out text by greedy word-wrap using a fixed per-character advance
/// width derived from the style's size and weight/italic. Not
/// pixel-accurate against any real font, but total, deterministic, and
/// sufficient for tests and for callers with no shaper wired up yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedWidthMeasurer;

impl TextMeasurer for FixedWidthMeasurer {
    fn measure(&self, text: &str, style: &ResolvedStyle, max_width: f64) -> LaidOutText {
        let advance = char_advance(style).max(0.5);
        let line_height = (style.size_px * style.line_height) as f64;
        let chars: Vec<(usize, char)> = text.char_indices().collect();

        if chars.is_empty() {
            return LaidOutText {
                preferred_line_height: line_height,
                lines: vec![LineMetric {
                    left: 0.0,
                    baseline_y: line_height * 0.8,
                    ascent: line_height * 0.8,
                    descent: line_height * 0.2,
                    height: line_height,
                    first_char: 0,
                    last_char: 0,
                }],
            };
        }

        let max_chars_per_line = ((max_width / advance).floor() as usize).max(1);
        let mut lines = Vec::new();
        let mut line_start_idx = 0usize; // index into `chars`
        let mut cursor_top = 0.0f64;

        while line_start_idx < chars.len() {
            // Greedy word-wrap: extend to max_chars_per_line, then back off
            // to the last whitespace boundary if one exists past the start.
            let mut line_end_idx = (line_start_idx + max_chars_per_line).min(chars.len());
            if line_end_idx < chars.len() {
                let mut break_idx = None;
                for i in (line_start_idx..line_end_idx).rev() {
                    if chars[i].1.is_whitespace() {
                        break_idx = Some(i);
                        break;
                    }
                }
                if let Some(b) = break_idx {
                    if b > line_start_idx {
                        line_end_idx = b + 1;
                    }
                }
            }
            let first_char = chars[line_start_idx].0;
            let last_pos = line_end_idx.saturating_sub(1).min(chars.len() - 1);
            let last_char = chars[last_pos].0;

            lines.push(LineMetric {
                left: 0.0,
                baseline_y: cursor_top + line_height * 0.8,
                ascent: line_height * 0.8,
                descent: line_height * 0.2,
                height: line_height,
                first_char,
                last_char,
            });
            cursor_top += line_height;
            line_start_idx = line_end_idx;
        }

        LaidOutText {
            preferred_line_height: line_height,
            lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ResolvedStyle;

    #[test]
    fn single_short_line_fits_in_one_line() {
        let m = FixedWidthMeasurer;
        let style = ResolvedStyle::body_default();
        let out = m.measure("Hello, world.", &style, 1000.0);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.lines[0].first_char, 0);
    }

    #[test]
    fn long_text_wraps_into_multiple_lines() {
        let m = FixedWidthMeasurer;
        let style = ResolvedStyle::body_default();
        let text = "a ".repeat(2000);
        let out = m.measure(&text, &style, 300.0);
        assert!(out.lines.len() > 1);
        // first_char is monotonic across lines
        for w in out.lines.windows(2) {
            assert!(w[0].first_char <= w[1].first_char);
        }
        // lines cover the entire text
        assert_eq!(out.lines.last().unwrap().last_char, text.len() - 1);
    }

    #[test]
    fn position_at_offset_is_within_line_bounds() {
        let m = FixedWidthMeasurer;
        let style = ResolvedStyle::body_default();
        let out = m.measure("hello world", &style, 1000.0);
        let idx = out.position_at_offset(0.0, 0.0);
        assert_eq!(idx, out.lines[0].first_char);
    }
}
