//! The serializable global Cursor.
//!
//! Identifies "where the next page starts": which block, and the global
//! character/word indices reached so far, plus an optional inner text
//! cursor when pagination stopped mid-block.

use crate::block_state::TextCursorState;
use serde::{Deserialize, Serialize};

/// The engine's serializable global position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Index of the block pagination is currently inside (or about to
    /// enter).
    pub block_index: u32,
    /// `sum over finished pages of (length of emitted characters)`; equals
    /// `pages.last().end_char + 1` once any page exists.
    pub global_char_index: u64,
    /// Same invariant as `global_char_index`, counted in tokens.
    pub global_word_index: u64,
    /// Present iff pagination stopped partway through `block_index`'s text;
    /// absent when the engine is cleanly between blocks.
    pub text_state: Option<TextCursorState>,
}

impl Cursor {
    /// The zero cursor: before the first block, before any character.
    pub fn zero() -> Self {
        Cursor::default()
    }
}
