//! Injected page scripts
//!
//! Element lookups and interactions run as small scripts evaluated in the
//! execution context of the current document: the top-level page, or an
//! isolated world created inside an entered frame. Located elements are
//! tagged with [`REF_ATTR`] so later calls can find them again.
//!
//! Every script returns a value (never `null`/`undefined`): an empty string
//! stands for "not found". [`frame_element`] is the exception; it returns
//! the element itself so the caller can resolve it to a DOM node.

use crate::config::Selector;

/// Attribute used to tag located elements
pub const REF_ATTR: &str = "data-capture-ref";

/// Outline applied to captured fields
pub const HIGHLIGHT_STYLE: &str = "3px solid #ff0000";

/// Quote a Rust string as a JavaScript string literal
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression locating the first match of `selector` in `document`
fn locate(selector: &Selector) -> String {
    match selector {
        Selector::Css(query) => format!("document.querySelector({})", js_str(query)),
        Selector::XPath(expr) => format!(
            // 9 = XPathResult.FIRST_ORDERED_NODE_TYPE
            "document.evaluate({}, document, null, 9, null).singleNodeValue",
            js_str(expr)
        ),
    }
}

/// Statements resolving a tagged element into `el`
fn resolve(element_id: &str) -> String {
    format!(
        r#"var el = document.querySelector('[{REF_ATTR}="' + {id} + '"]');
        if (!el) {{ throw new Error('element ' + {id} + ' is not in the current document'); }}"#,
        id = js_str(element_id)
    )
}

const REQUIRE_FRAME: &str = r#"if (el.tagName !== 'IFRAME' && el.tagName !== 'FRAME') {
            throw new Error('element is not a frame: ' + el.tagName);
        }"#;

fn wrap(body: String) -> String {
    format!("(function() {{\n{body}\n}})()")
}

/// Statements tagging `el` (if untagged) and returning its reference
fn tag(candidate_id: &str) -> String {
    format!(
        r#"if (!el.getAttribute('{REF_ATTR}')) {{ el.setAttribute('{REF_ATTR}', {id}); }}
        return el.getAttribute('{REF_ATTR}');"#,
        id = js_str(candidate_id)
    )
}

/// Find an element and tag it. Returns its reference, or `""` when absent.
pub fn find_element(selector: &Selector, candidate_id: &str) -> String {
    wrap(format!(
        "var el = {locate};\nif (!el) {{ return ''; }}\n{tag}",
        locate = locate(selector),
        tag = tag(candidate_id),
    ))
}

/// Find a frame element and tag it. Returns its reference, or `""` when
/// absent; throws when the match is not a frame.
pub fn locate_frame(selector: &Selector, candidate_id: &str) -> String {
    wrap(format!(
        "var el = {locate};\nif (!el) {{ return ''; }}\n{REQUIRE_FRAME}\n{tag}",
        locate = locate(selector),
        tag = tag(candidate_id),
    ))
}

/// The tagged frame element itself, evaluated without `returnByValue`
pub fn frame_element(element_id: &str) -> String {
    wrap(format!(
        "{resolve}\n{REQUIRE_FRAME}\nreturn el;",
        resolve = resolve(element_id),
    ))
}

/// Viewport offset of a frame's content box inside its parent document
pub fn frame_offset(element_id: &str) -> String {
    wrap(format!(
        r#"{resolve}
        var r = el.getBoundingClientRect();
        return {{ x: r.left + el.clientLeft, y: r.top + el.clientTop }};"#,
        resolve = resolve(element_id),
    ))
}

/// Whether the document has finished parsing
pub fn document_ready() -> String {
    "document.readyState !== 'loading'".to_string()
}

pub fn document_source() -> String {
    "document.documentElement ? document.documentElement.outerHTML : ''".to_string()
}

/// Scroll position of the document, as `{x, y}`
pub fn scroll_offset() -> String {
    "({ x: window.scrollX, y: window.scrollY })".to_string()
}

pub fn scroll_into_view(element_id: &str) -> String {
    element_action(
        element_id,
        "el.scrollIntoView({block: 'center', inline: 'center'});",
    )
}

pub fn highlight(element_id: &str) -> String {
    element_action(
        element_id,
        &format!("el.style.outline = {};", js_str(HIGHLIGHT_STYLE)),
    )
}

pub fn focus_and_clear(element_id: &str) -> String {
    element_action(element_id, "el.focus(); if ('value' in el) { el.value = ''; }")
}

pub fn click(element_id: &str) -> String {
    element_action(element_id, "el.click();")
}

/// Visible, displayed and not disabled
pub fn is_clickable(element_id: &str) -> String {
    wrap(format!(
        r#"{resolve}
        var rect = el.getBoundingClientRect();
        var style = window.getComputedStyle(el);
        return rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden'
            && style.display !== 'none'
            && !el.disabled;"#,
        resolve = resolve(element_id),
    ))
}

/// Element box relative to its own document's viewport, as
/// `{x, y, width, height}`
pub fn element_rect(element_id: &str) -> String {
    wrap(format!(
        r#"{resolve}
        var b = el.getBoundingClientRect();
        return {{ x: b.left, y: b.top, width: b.width, height: b.height }};"#,
        resolve = resolve(element_id),
    ))
}

fn element_action(element_id: &str, action: &str) -> String {
    wrap(format!(
        "{resolve}\n{action}\nreturn true;",
        resolve = resolve(element_id),
    ))
}
