//! CSS subset parser for EPUB styling
//!
//! Parses a minimal subset of CSS sufficient for EPUB rendering:
//! - Font properties: `font-size`, `font-family`, `font-weight`, `font-style`
//! - Text: `text-align`, `line-height`
//! - Spacing: `margin-top`, `margin-bottom`
//! - Selectors: tag, class, and inline `style` attributes
//!
//! Complex selectors, floats, positioning, and grid are out of scope.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EpubError;

/// Line height value
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum LineHeight {
    /// Absolute height in pixels
    Px(f32),
    /// Multiplier relative to font size (e.g., 1.5 = 1.5x)
    Multiplier(f32),
}

/// Font size value
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum FontSize {
    /// Absolute size in pixels
    Px(f32),
    /// Relative size in em units
    Em(f32),
}

/// Font weight
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[non_exhaustive]
pub enum FontWeight {
    /// Normal weight (400)
    #[default]
    Normal,
    /// Bold weight (700)
    Bold,
}

/// Font style
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[non_exhaustive]
pub enum FontStyle {
    /// Upright text
    #[default]
    Normal,
    /// Italic text
    Italic,
}

/// Text alignment
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[non_exhaustive]
pub enum TextAlign {
    /// Left-aligned (default for LTR)
    #[default]
    Left,
    /// Centered
    Center,
    /// Right-aligned
    Right,
    /// Justified
    Justify,
}

/// A set of CSS property values
///
/// All fields are optional — `None` means "not specified" (inherit from parent
/// or use default).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CssStyle {
    /// Font size
    pub font_size: Option<FontSize>,
    /// Font family name
    pub font_family: Option<String>,
    /// Font weight (normal or bold)
    pub font_weight: Option<FontWeight>,
    /// Font style (normal or italic)
    pub font_style: Option<FontStyle>,
    /// Text alignment
    pub text_align: Option<TextAlign>,
    /// Line height
    pub line_height: Option<LineHeight>,
    /// Top margin in pixels
    pub margin_top: Option<f32>,
    /// Bottom margin in pixels
    pub margin_bottom: Option<f32>,
}

impl CssStyle {
    /// Create an empty style (all properties unset)
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any property is set
    pub fn is_empty(&self) -> bool {
        self.font_size.is_none()
            && self.font_family.is_none()
            && self.font_weight.is_none()
            && self.font_style.is_none()
            && self.text_align.is_none()
            && self.line_height.is_none()
            && self.margin_top.is_none()
            && self.margin_bottom.is_none()
    }

    /// Merge another style into this one (other's values take precedence)
    pub fn merge(&mut self, other: &CssStyle) {
        if other.font_size.is_some() {
            self.font_size = other.font_size;
        }
        if other.font_family.is_some() {
            self.font_family = other.font_family.clone();
        }
        if other.font_weight.is_some() {
            self.font_weight = other.font_weight;
        }
        if other.font_style.is_some() {
            self.font_style = other.font_style;
        }
        if other.text_align.is_some() {
            self.text_align = other.text_align;
        }
        if other.line_height.is_some() {
            self.line_height = other.line_height.clone();
        }
        if other.margin_top.is_some() {
            self.margin_top = other.margin_top;
        }
        if other.margin_bottom.is_some() {
            self.margin_bottom = other.margin_bottom;
        }
    }
}

/// A CSS selector (subset)
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum CssSelector {
    /// Tag selector (e.g., `p`, `h1`)
    Tag(String),
    /// Class selector (e.g., `.chapter-title`)
    Class(String),
    /// Tag + class selector (e.g., `p.intro`)
    TagClass(String, String),
}

impl CssSelector {
    /// Check if this selector matches a given tag name and class list
    pub fn matches(&self, tag: &str, classes: &[&str]) -> bool {
        match self {
            CssSelector::Tag(t) => t == tag,
            CssSelector::Class(c) => classes.contains(&c.as_str()),
            CssSelector::TagClass(t, c) => t == tag && classes.contains(&c.as_str()),
        }
    }
}

/// A single CSS rule (selector + declarations)
#[derive(Clone, Debug, PartialEq)]
pub struct CssRule {
    /// The selector for this rule
    pub selector: CssSelector,
    /// The style declarations
    pub style: CssStyle,
}

/// A parsed CSS stylesheet
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stylesheet {
    /// All rules in document order
    pub rules: Vec<CssRule>,
}

impl Stylesheet {
    /// Create an empty stylesheet
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the computed style for an element given its tag and classes
    ///
    /// Applies matching rules in document order (later rules override).
    pub fn resolve(&self, tag: &str, classes: &[&str]) -> CssStyle {
        let mut style = CssStyle::new();
        for rule in &self.rules {
            if rule.selector.matches(tag, classes) {
                style.merge(&rule.style);
            }
        }
        style
    }

    /// Get the number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the stylesheet is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parse a CSS stylesheet string into a `Stylesheet`
///
/// Handles the v1 subset: tag selectors, class selectors, tag.class selectors,
/// and the supported property set.
pub fn parse_stylesheet(css: &str) -> Result<Stylesheet, EpubError> {
    let mut stylesheet = Stylesheet::new();
    let mut pos = 0;
    let bytes = css.as_bytes();

    while pos < bytes.len() {
        // Skip whitespace and comments
        pos = skip_whitespace_and_comments(css, pos);
        if pos >= bytes.len() {
            break;
        }

        // Find selector (everything up to '{')
        let brace_start = match css[pos..].find('{') {
            Some(i) => pos + i,
            None => break, // No more rules
        };
        let selector_str = css[pos..brace_start].trim();
        if selector_str.is_empty() {
            pos = brace_start + 1;
            continue;
        }

        // Parse selector
        let selector = parse_selector(selector_str)?;

        // Find closing brace
        let brace_end = match css[brace_start + 1..].find('}') {
            Some(i) => brace_start + 1 + i,
            None => return Err(EpubError::Css("Unclosed CSS rule block".into())),
        };

        // Parse declarations
        let declarations = &css[brace_start + 1..brace_end];
        let style = parse_declarations(declarations)?;

        if !style.is_empty() {
            stylesheet.rules.push(CssRule { selector, style });
        }

        pos = brace_end + 1;
    }

    Ok(stylesheet)
}

/// Parse an inline `style` attribute value into a `CssStyle`
///
/// Example: `"font-weight: bold; margin-top: 10px"`
pub fn parse_inline_style(style_attr: &str) -> Result<CssStyle, EpubError> {
    parse_declarations(style_attr)
}

// -- Internal parsing helpers -------------------------------------------------

/// Skip whitespace and CSS comments (`/* ... */`)
fn skip_whitespace_and_comments(css: &str, mut pos: usize) -> usize {
    let bytes = css.as_bytes();
    while pos < bytes.len() {
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
        } else if pos + 1 < bytes.len() && bytes[pos] == b'/' && bytes[pos + 1] == b'*' {
            // Skip comment
            match css[pos + 2..].find("*/") {
                Some(end) => pos = pos + 2 + end + 2,
                None => return bytes.len(), // Unterminated comment
            }
        } else {
            break;
        }
    }
    pos
}

/// Parse a single CSS selector string
fn parse_selector(s: &str) -> Result<CssSelector, EpubError> {
    let s = s.trim();

    if let Some(class) = s.strip_prefix('.') {
        // Class selector
        if class.is_empty() {
            return Err(EpubError::Css("Empty class selector".into()));
        }
        Ok(CssSelector::Class(class.into()))
    } else if let Some(dot_pos) = s.find('.') {
        // Tag.class selector
        let tag = &s[..dot_pos];
        let class = &s[dot_pos + 1..];
        if tag.is_empty() || class.is_empty() {
            return Err(EpubError::Css(alloc::format!("Invalid selector: {}", s)));
        }
        Ok(CssSelector::TagClass(tag.into(), class.into()))
    } else {
        // Tag selector
        if s.is_empty() {
            return Err(EpubError::Css("Empty selector".into()));
        }
        Ok(CssSelector::Tag(s.into()))
    }
}

/// Parse CSS declarations (the part inside `{ ... }`)
fn parse_declarations(declarations: &str) -> Result<CssStyle, EpubError> {
    let mut style = CssStyle::new();

    for decl in declarations.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }

        let colon_pos = match decl.find(':') {
            Some(pos) => pos,
            None => continue, // Malformed declaration, skip
        };

        let property = decl[..colon_pos].trim().to_lowercase();
        let value = decl[colon_pos + 1..].trim();

        match property.as_str() {
            "font-size" => {
                style.font_size = parse_font_size(value);
            }
            "font-family" => {
                // Strip quotes from font family name
                let family = value.trim_matches(|c| c == '\'' || c == '"');
                if !family.is_empty() {
                    style.font_family = Some(family.into());
                }
            }
            "font-weight" => {
                style.font_weight = match value.to_lowercase().as_str() {
                    "bold" | "700" | "800" | "900" => Some(FontWeight::Bold),
                    "normal" | "400" => Some(FontWeight::Normal),
                    _ => None,
                };
            }
            "font-style" => {
                style.font_style = match value.to_lowercase().as_str() {
                    "italic" | "oblique" => Some(FontStyle::Italic),
                    "normal" => Some(FontStyle::Normal),
                    _ => None,
                };
            }
            "text-align" => {
                style.text_align = match value.to_lowercase().as_str() {
                    "left" => Some(TextAlign::Left),
                    "center" => Some(TextAlign::Center),
                    "right" => Some(TextAlign::Right),
                    "justify" => Some(TextAlign::Justify),
                    _ => None,
                };
            }
            "line-height" => {
                style.line_height = parse_line_height(value);
            }
            "margin-top" => {
                style.margin_top = parse_px_value(value);
            }
            "margin-bottom" => {
                style.margin_bottom = parse_px_value(value);
            }
            "margin" => {
                // Shorthand: only handle single-value case for now
                if let Some(val) = parse_px_value(value) {
                    style.margin_top = Some(val);
                    style.margin_bottom = Some(val);
                }
            }
            _ => {
                // Unsupported property — silently ignored
            }
        }
    }

    Ok(style)
}

/// Parse a font-size value (px or em)
fn parse_font_size(value: &str) -> Option<FontSize> {
    let value = value.trim().to_lowercase();
    if let Some(px_str) = value.strip_suffix("px") {
        px_str.trim().parse::<f32>().ok().map(FontSize::Px)
    } else if let Some(em_str) = value.strip_suffix("em") {
        em_str.trim().parse::<f32>().ok().map(FontSize::Em)
    } else {
        None
    }
}

/// Parse a line-height value (px or unitless multiplier)
fn parse_line_height(value: &str) -> Option<LineHeight> {
    let value = value.trim().to_lowercase();
    if let Some(px_str) = value.strip_suffix("px") {
        px_str.trim().parse::<f32>().ok().map(LineHeight::Px)
    } else if value == "normal" {
        None // Use default
    } else {
        // Bare number = multiplier
        value.parse::<f32>().ok().map(LineHeight::Multiplier)
    }
}

/// Parse a pixel value (e.g., "10px" -> Some(10.0))
fn parse_px_value(value: &str) -> Option<f32> {
    let value = value.trim().to_lowercase();
    if let Some(px_str) = value.strip_suffix("px") {
        px_str.trim().parse::<f32>().ok()
    } else if value == "0" {
        Some(0.0)
    } else {
        // Try bare number
        value.parse::<f32>().ok()
    }
}
