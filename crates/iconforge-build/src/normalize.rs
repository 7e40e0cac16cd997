//! SVG normalization
//!
//! Reduces an authored icon to a canonical `<symbol>` so that formatting-only
//! differences (whitespace, comments, attribute order, quoting, editor
//! metadata) never change a bundle hash, while any structural or visual
//! difference does.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Elements dropped together with their subtree.
const STRIPPED_ELEMENTS: &[&str] = &["metadata", "title", "desc"];

/// Namespace prefixes written by vector editors.
const EDITOR_PREFIXES: &[&str] = &["sodipodi:", "inkscape:", "sketch:", "serif:"];

/// Attributes of the root `<svg>` that have no meaning on a `<symbol>`.
const ROOT_ONLY_ATTRIBUTES: &[&str] = &["version", "width", "height", "x", "y", "id", "xml:space"];

/// An icon reduced to its canonical parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIcon {
    /// Root attributes kept on the symbol (e.g. `viewBox`, `fill`), sorted
    pub attributes: BTreeMap<String, String>,
    /// Canonical serialization of the root's children
    pub body: String,
}

impl NormalizedIcon {
    /// Render as `<symbol id="{id}" ...>body</symbol>`
    #[must_use]
    pub fn to_symbol(&self, id: &str) -> String {
        let mut out = format!("<symbol id=\"{id}\"");
        write_attributes(&mut out, &self.attributes);
        out.push('>');
        out.push_str(&self.body);
        out.push_str("</symbol>");
        out
    }
}

/// Structural problems found while normalizing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// XML could not be parsed
    #[error("malformed markup: {0}")]
    Malformed(String),

    /// No root element at all
    #[error("document has no root element")]
    MissingRoot,

    /// Root element is not `<svg>`
    #[error("root element is <{0}>, expected <svg>")]
    NotSvg(String),

    /// Root element never closed
    #[error("root <svg> is not closed")]
    Unclosed,

    /// Content after the root element
    #[error("unexpected content after root element")]
    TrailingContent,
}

/// Normalize one authored icon
///
/// # Errors
/// Returns [`NormalizeError`] when the markup is not a single well-formed
/// `<svg>` element.
pub fn normalize(raw: &str) -> Result<NormalizedIcon, NormalizeError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut attributes = BTreeMap::new();
    let mut body = String::new();
    let mut root_seen = false;
    let mut root_closed = false;
    let mut depth = 0usize;
    let mut skip_from: Option<usize> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| NormalizeError::Malformed(e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                let name = element_name(e)?;
                if root_closed {
                    return Err(NormalizeError::TrailingContent);
                }
                if !root_seen {
                    if name != "svg" {
                        return Err(NormalizeError::NotSvg(name));
                    }
                    root_seen = true;
                    attributes = collect_attributes(e, true)?;
                    if empty {
                        root_closed = true;
                    } else {
                        depth = 1;
                    }
                    continue;
                }
                if skip_from.is_none() && is_stripped(&name) && !empty {
                    skip_from = Some(depth);
                }
                if !empty {
                    depth += 1;
                }
                if skip_from.is_some() || is_stripped(&name) {
                    continue;
                }
                body.push('<');
                body.push_str(&name);
                write_attributes(&mut body, &collect_attributes(e, false)?);
                body.push_str(if empty { "/>" } else { ">" });
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    root_closed = true;
                    continue;
                }
                if let Some(from) = skip_from {
                    if depth == from {
                        skip_from = None;
                    }
                    continue;
                }
                let name = std::str::from_utf8(e.name().as_ref())
                    .map_err(|e| NormalizeError::Malformed(e.to_string()))?
                    .to_string();
                body.push_str("</");
                body.push_str(&name);
                body.push('>');
            }
            Event::Text(ref t) => {
                let text =
                    std::str::from_utf8(t).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
                if text.trim().is_empty() {
                    continue;
                }
                if !root_seen || root_closed {
                    return Err(NormalizeError::TrailingContent);
                }
                if skip_from.is_none() {
                    body.push_str(&collapse_whitespace(text));
                }
            }
            Event::CData(ref c) => {
                if root_seen && !root_closed && skip_from.is_none() {
                    let text = std::str::from_utf8(c)
                        .map_err(|e| NormalizeError::Malformed(e.to_string()))?;
                    body.push_str("<![CDATA[");
                    body.push_str(text.trim());
                    body.push_str("]]>");
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes
            _ => {}
        }
    }

    if !root_seen {
        return Err(NormalizeError::MissingRoot);
    }
    if !root_closed {
        return Err(NormalizeError::Unclosed);
    }
    Ok(NormalizedIcon { attributes, body })
}

fn element_name(e: &BytesStart<'_>) -> Result<String, NormalizeError> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|err| NormalizeError::Malformed(err.to_string()))
}

fn is_stripped(name: &str) -> bool {
    STRIPPED_ELEMENTS.contains(&name) || has_editor_prefix(name)
}

fn has_editor_prefix(name: &str) -> bool {
    EDITOR_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn collect_attributes(
    e: &BytesStart<'_>,
    root: bool,
) -> Result<BTreeMap<String, String>, NormalizeError> {
    let mut out = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| NormalizeError::Malformed(err.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| NormalizeError::Malformed(err.to_string()))?;
        if has_editor_prefix(key) || key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        if root && ROOT_ONLY_ATTRIBUTES.contains(&key) {
            continue;
        }
        let value = std::str::from_utf8(&attr.value)
            .map_err(|err| NormalizeError::Malformed(err.to_string()))?;
        out.insert(key.to_string(), collapse_whitespace(value).replace('"', "&quot;"));
    }
    Ok(out)
}

fn write_attributes(out: &mut String, attributes: &BTreeMap<String, String>) {
    for (key, value) in attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
