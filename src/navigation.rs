//! EPUB navigation parsing (TOC, page list, landmarks)
//!
//! Supports both EPUB 3.x XHTML navigation documents (`epub:type="toc"`)
//! and EPUB 2.0 NCX fallback (`toc.ncx`).
//!
//! # Usage
//!
//! ```rust,no_run
//! use epub_source::navigation::{parse_nav_xhtml, parse_ncx, Navigation};
//!
//! # fn example() -> Result<(), epub_source::error::EpubError> {
//! // EPUB 3.x: parse the XHTML nav document
//! let nav_xhtml_bytes = b"<html>...</html>";
//! let nav = parse_nav_xhtml(nav_xhtml_bytes)?;
//!
//! // EPUB 2.0 fallback: parse the NCX
//! let ncx_bytes = b"<ncx>...</ncx>";
//! let nav = parse_ncx(ncx_bytes)?;
//! # Ok(())
//! # }
//! ```

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::EpubError;

/// A single navigation point (table of contents entry)
///
/// Navigation points can be nested to represent hierarchical structures
/// (e.g., chapters containing sections).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavPoint {
    /// Display label for this navigation point
    pub label: String,
    /// Content href (relative path, possibly with fragment)
    pub href: String,
    /// Child navigation points (for hierarchical TOC)
    pub children: Vec<NavPoint>,
}

/// Complete navigation structure for an EPUB
///
/// Contains table of contents, page list, and landmarks extracted
/// from either the EPUB 3.x nav document or EPUB 2.0 NCX.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Table of contents entries
    pub toc: Vec<NavPoint>,
    /// Page list entries (mapping to page numbers)
    pub page_list: Vec<NavPoint>,
    /// Landmark entries (structural navigation: cover, toc, bodymatter, etc.)
    pub landmarks: Vec<NavPoint>,
}

impl Navigation {
    /// Create an empty navigation structure
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the navigation has any TOC entries
    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    /// Check if the navigation has a page list
    pub fn has_page_list(&self) -> bool {
        !self.page_list.is_empty()
    }

    /// Check if the navigation has landmarks
    pub fn has_landmarks(&self) -> bool {
        !self.landmarks.is_empty()
    }

    /// Get total number of TOC entries (including nested)
    pub fn toc_count(&self) -> usize {
        count_nav_points(&self.toc)
    }

    /// Flatten the TOC into a linear list of (depth, NavPoint) pairs
    pub fn toc_flat(&self) -> Vec<(usize, &NavPoint)> {
        let mut result = Vec::new();
        flatten_nav_points(&self.toc, 0, &mut result);
        result
    }
}

/// Count all navigation points recursively
fn count_nav_points(points: &[NavPoint]) -> usize {
    points
        .iter()
        .map(|p| 1 + count_nav_points(&p.children))
        .sum()
}

/// Flatten navigation points into a list with depth info
fn flatten_nav_points<'a>(
    points: &'a [NavPoint],
    depth: usize,
    result: &mut Vec<(usize, &'a NavPoint)>,
) {
    for point in points {
        result.push((depth, point));
        flatten_nav_points(&point.children, depth + 1, result);
    }
}

/// Partial nav point being built during parsing
struct PartialNavPoint {
    href: Option<String>,
    label: Option<String>,
    children: Vec<NavPoint>,
}

impl PartialNavPoint {
    fn new() -> Self {
        Self {
            href: None,
            label: None,
            children: Vec::new(),
        }
    }

    fn into_nav_point(self) -> Option<NavPoint> {
        match (self.href, self.label) {
            (Some(href), Some(label)) => Some(NavPoint {
                label,
                href,
                children: self.children,
            }),
            _ => None,
        }
    }
}

/// Parse an EPUB 3.x XHTML navigation document
///
/// Extracts TOC (`epub:type="toc"`), page list (`epub:type="page-list"`),
/// and landmarks (`epub:type="landmarks"`) from the nav XHTML.
///
/// The nav document uses nested `<ol>/<li>/<a>` structures within
/// `<nav>` elements identified by `epub:type` attributes.
pub fn parse_nav_xhtml(content: &[u8]) -> Result<Navigation, EpubError> {
    let mut reader = quick_xml::reader::Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut nav = Navigation::new();
    let mut buf = alloc::vec::Vec::new();

    // State: which nav section we're inside (None = outside any nav)
    let mut current_nav_type: Option<NavType> = None;
    // Stack of list items being built (one per <li> nesting level)
    let mut item_stack: Vec<PartialNavPoint> = Vec::new();
    // Completed top-level results for the current nav section
    let mut results: Vec<NavPoint> = Vec::new();
    // Whether we're inside an <a> tag (collecting label text)
    let mut in_anchor = false;

    use quick_xml::events::Event;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = reader
                    .decoder()
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                match name.as_str() {
                    "nav" => {
                        for attr in e.attributes().flatten() {
                            let key = reader
                                .decoder()
                                .decode(attr.key.as_ref())
                                .unwrap_or_default();
                            if key == "epub:type" || key.ends_with(":type") {
                                let value = reader
                                    .decoder()
                                    .decode(&attr.value)
                                    .unwrap_or_default()
                                    .to_string();
                                current_nav_type = NavType::from_str(&value);
                                results.clear();
                            }
                        }
                    }
                    "li" if current_nav_type.is_some() => {
                        item_stack.push(PartialNavPoint::new());
                    }
                    "a" if current_nav_type.is_some() => {
                        in_anchor = true;
                        for attr in e.attributes().flatten() {
                            let key = reader
                                .decoder()
                                .decode(attr.key.as_ref())
                                .unwrap_or_default();
                            if key == "href" {
                                let href = reader
                                    .decoder()
                                    .decode(&attr.value)
                                    .unwrap_or_default()
                                    .to_string();
                                if let Some(item) = item_stack.last_mut() {
                                    item.href = Some(href);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if in_anchor && current_nav_type.is_some() {
                    let text = reader.decoder().decode(&e).unwrap_or_default().to_string();
                    if let Some(item) = item_stack.last_mut() {
                        match &mut item.label {
                            Some(existing) => {
                                // Add space separator when concatenating text segments
                                // from formatted anchors (e.g. "Part <em>One</em>")
                                if !existing.is_empty()
                                    && !existing.ends_with(' ')
                                    && !text.starts_with(' ')
                                {
                                    existing.push(' ');
                                }
                                existing.push_str(&text);
                            }
                            None => item.label = Some(text),
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = reader
                    .decoder()
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                match name.as_str() {
                    "a" => {
                        in_anchor = false;
                    }
                    "li" if current_nav_type.is_some() => {
                        // Pop the current item and finalize it
                        if let Some(partial) = item_stack.pop() {
                            if let Some(point) = partial.into_nav_point() {
                                if let Some(parent) = item_stack.last_mut() {
                                    // Nested: add as child of parent item
                                    parent.children.push(point);
                                } else {
                                    // Top-level: add to results
                                    results.push(point);
                                }
                            }
                        }
                    }
                    "nav" if current_nav_type.is_some() => {
                        // Assign collected results to the appropriate nav section
                        let completed = core::mem::take(&mut results);
                        match current_nav_type.as_ref().unwrap() {
                            NavType::Toc => nav.toc = completed,
                            NavType::PageList => nav.page_list = completed,
                            NavType::Landmarks => nav.landmarks = completed,
                        }
                        current_nav_type = None;
                        item_stack.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = reader
                    .decoder()
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                // Handle self-closing <a href="..."/> (rare but valid)
                if name == "a" && current_nav_type.is_some() {
                    for attr in e.attributes().flatten() {
                        let key = reader
                            .decoder()
                            .decode(attr.key.as_ref())
                            .unwrap_or_default();
                        if key == "href" {
                            let href = reader
                                .decoder()
                                .decode(&attr.value)
                                .unwrap_or_default()
                                .to_string();
                            if let Some(item) = item_stack.last_mut() {
                                item.href = Some(href);
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EpubError::Navigation(alloc::format!(
                    "Nav XML parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nav)
}

/// Parse an EPUB 2.0 NCX navigation document
///
/// Extracts the navigation map (`<navMap>`) and optional page list
/// (`<pageList>`) from the NCX XML.
pub fn parse_ncx(content: &[u8]) -> Result<Navigation, EpubError> {
    let mut reader = quick_xml::reader::Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut nav = Navigation::new();
    let mut buf = alloc::vec::Vec::new();

    // State tracking
    let mut in_nav_map = false;
    let mut in_page_list = false;
    let mut nav_point_stack: Vec<NavPoint> = Vec::new();
    let mut current_label: Option<String> = None;
    let mut current_src: Option<String> = None;
    let mut in_text = false;
    let mut in_page_target = false;

    use quick_xml::events::Event;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = reader
                    .decoder()
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                match name.as_str() {
                    "navMap" => {
                        in_nav_map = true;
                    }
                    "pageList" => {
                        in_page_list = true;
                    }
                    "navPoint" if in_nav_map => {
                        nav_point_stack.push(NavPoint {
                            label: String::new(),
                            href: String::new(),
                            children: Vec::new(),
                        });
                    }
                    "pageTarget" if in_page_list => {
                        in_page_target = true;
                        current_label = None;
                        current_src = None;
                    }
                    "text" => {
                        in_text = true;
                    }
                    "content" => {
                        for attr in e.attributes().flatten() {
                            let key = reader
                                .decoder()
                                .decode(attr.key.as_ref())
                                .unwrap_or_default();
                            if key == "src" {
                                let src = reader
                                    .decoder()
                                    .decode(&attr.value)
                                    .unwrap_or_default()
                                    .to_string();
                                if in_page_target {
                                    current_src = Some(src);
                                } else if let Some(point) = nav_point_stack.last_mut() {
                                    point.href = src;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = reader.decoder().decode(&e).unwrap_or_default().to_string();
                    if in_page_target {
                        match &mut current_label {
                            Some(existing) => existing.push_str(&text),
                            None => current_label = Some(text),
                        }
                    } else if let Some(point) = nav_point_stack.last_mut() {
                        if point.label.is_empty() {
                            point.label = text;
                        } else {
                            point.label.push_str(&text);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = reader
                    .decoder()
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                match name.as_str() {
                    "text" => {
                        in_text = false;
                    }
                    "navPoint" => {
                        if let Some(completed) = nav_point_stack.pop() {
                            if let Some(parent) = nav_point_stack.last_mut() {
                                parent.children.push(completed);
                            } else {
                                nav.toc.push(completed);
                            }
                        }
                    }
                    "pageTarget" => {
                        if let (Some(label), Some(src)) = (current_label.take(), current_src.take())
                        {
                            nav.page_list.push(NavPoint {
                                label,
                                href: src,
                                children: Vec::new(),
                            });
                        }
                        in_page_target = false;
                    }
                    "navMap" => {
                        in_nav_map = false;
                    }
                    "pageList" => {
                        in_page_list = false;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EpubError::Navigation(alloc::format!(
                    "NCX parse error: {:?}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nav)
}

/// Internal enum for tracking which nav section we're in
#[derive(Clone, Debug, PartialEq)]
enum NavType {
    Toc,
    PageList,
    Landmarks,
}

impl NavType {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "toc" => Some(NavType::Toc),
            "page-list" => Some(NavType::PageList),
            "landmarks" => Some(NavType::Landmarks),
            _ => None,
        }
    }
}
