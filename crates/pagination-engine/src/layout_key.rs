//! Layout Key: a stable fingerprint of every input that can change page
//! boundaries. Two engines with equal keys must produce identical page
//! sequences from equal inputs; the cache is keyed by `(book_id,
//! layout_key)`.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Stable fingerprint of a [`crate::engine::LayoutOptions`], used as the
/// cache key alongside a book identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutKey(String);

impl LayoutKey {
    /// The encoded fingerprint string, suitable for use as a filesystem-safe
    /// cache key component.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayoutKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The layout-material inputs fingerprinted by [`compute`]. Every field here
/// is load-bearing for pagination; nothing else about a `LayoutOptions`
/// (margins, justification, etc. in the hosting config) affects this key.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutFingerprintInputs<'a> {
    /// Font family, or `None` for the platform default.
    pub font_family: Option<&'a str>,
    /// Font size in pixels.
    pub font_size: f64,
    /// Line height multiplier.
    pub line_height: f64,
    /// Page width in pixels.
    pub max_width: f64,
    /// Page height in pixels.
    pub max_height: f64,
    /// Whether the page height budget includes the first line's ascent.
    pub apply_height_first_ascent: bool,
    /// Whether the page height budget includes the last line's descent.
    pub apply_height_last_descent: bool,
    /// A stable, opaque identifier for the active text scaler/shaper;
    /// two scalers producing identical measurements must map to the same
    /// fingerprint.
    pub scaler_fingerprint: &'a str,
}

/// Computes the `v2`-tagged layout key for `inputs`, per the exact formula:
/// `v2 | family | size.2 | line_height.2 | width.1 | height.1 | bits |
/// scaler`, base64url-encoded (no padding).
pub fn compute(inputs: &LayoutFingerprintInputs<'_>) -> LayoutKey {
    let family = inputs.font_family.unwrap_or("default");
    let bits = format!(
        "{}{}",
        inputs.apply_height_first_ascent as u8,
        inputs.apply_height_last_descent as u8
    );
    let raw = format!(
        "v2|{family}|{:.2}|{:.2}|{:.1}|{:.1}|{bits}|{}",
        inputs.font_size, inputs.line_height, inputs.max_width, inputs.max_height,
        inputs.scaler_fingerprint,
    );
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw.as_bytes());
    LayoutKey(encoded)
}
