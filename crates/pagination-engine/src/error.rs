//! Ambient error vocabulary for internal failure modes.
//!
//! None of these ever cross the public `PaginationEngine` API as a
//! `Result::Err` for a spec-defined condition: `LayoutDegenerate` and
//! `CacheUnreadable` are absorbed into ordinary `is_complete`/cache-miss
//! states, `MeasurementInconsistency` is handled by the forced-progress
//! rule, and `CacheUnwritable` is only ever logged. This type exists so
//! those internal code paths have a typed vocabulary instead of bare
//! strings, and so the `CacheUnwritable` log line carries a structured
//! cause.
use thiserror::Error;

/// Internal pagination failure modes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PaginationError {
    /// `max_height` is too small to fit any line with its spacing; the
    /// block (and the document) is treated as immediately complete.
    #[error("layout degenerate: max_height {max_height} too small for line height {line_height}")]
    LayoutDegenerate {
        /// The configured max height.
        max_height: f64,
        /// The line height that didn't fit.
        line_height: f64,
    },

    /// A candidate page failed shrink-to-fit even at a single token; the
    /// forced-progress rule handles this locally and the document keeps
    /// going, but the event is recorded.
    #[error("measurement inconsistency: token at offset {offset} still overflows after shrink-to-fit")]
    MeasurementInconsistency {
        /// Byte offset of the offending token.
        offset: usize,
    },

    /// The cache entry for a `(book_id, layout_key)` could not be read or
    /// parsed; treated as a cache miss.
    #[error("cache unreadable for book {book_id:?}: {source}")]
    CacheUnreadable {
        /// The book the cache lookup was for.
        book_id: String,
        /// Underlying I/O or deserialization error.
        #[source]
        source: std::io::Error,
    },

    /// A cache entry could not be written; logged, the engine continues and
    /// retries implicitly on the next page.
    #[error("cache unwritable for book {book_id:?}: {source}")]
    CacheUnwritable {
        /// The book the cache write was for.
        book_id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
