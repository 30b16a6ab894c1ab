use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "noscript", "template", "title"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "option", "p", "pre", "section", "table",
    "tbody", "tfoot", "thead", "tr", "ul",
];

/// Selects every match for `css`, or nothing when the selector does not parse.
pub fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(e) => {
            debug!("Selector {} failed: {}", css, e);
            Vec::new()
        }
    }
}

pub fn select_within<'a>(element: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => element.select(&selector).collect(),
        Err(e) => {
            debug!("Selector {} failed: {}", css, e);
            Vec::new()
        }
    }
}

fn inline_hidden(element: ElementRef) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    match value.attr("style") {
        Some(style) => {
            let style: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        }
        None => false,
    }
}

/// Best static approximation of "displayed and enabled".
pub fn is_usable(element: ElementRef) -> bool {
    let value = element.value();
    if value.name() == "input" && effective_type(element) == "hidden" {
        return false;
    }
    if value.attr("disabled").is_some() {
        return false;
    }
    if inline_hidden(element) {
        return false;
    }
    !element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(inline_hidden)
}

/// The `type` a browser reports for form controls: inputs default to `text`,
/// buttons to `submit`.
pub fn effective_type(element: ElementRef) -> String {
    match element.value().attr("type") {
        Some(t) if !t.trim().is_empty() => t.trim().to_lowercase(),
        _ => match element.value().name() {
            "button" => "submit".to_string(),
            "input" => "text".to_string(),
            _ => String::new(),
        },
    }
}

pub fn attr<'a>(element: ElementRef<'a>, name: &str) -> &'a str {
    element.value().attr(name).unwrap_or("")
}

/// A structural `nth-of-type` path from `<html>` down to `element`. The live
/// page serializes to the same tree, so the path addresses the same node
/// there.
pub fn css_path(element: ElementRef) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        let tag = el.value().name();
        let position = 1 + el
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|sibling| sibling.value().name() == tag)
            .count();
        segments.push(format!("{}:nth-of-type({})", tag, position));
        current = el.parent().and_then(ElementRef::wrap);
    }

    segments.reverse();
    segments.join(" > ")
}

struct LineBuilder {
    lines: Vec<String>,
    current: String,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            current: String::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.current.push_str(text);
    }

    fn flush(&mut self) {
        let line = self.current.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            self.lines.push(line);
        }
        self.current.clear();
    }

    fn walk(&mut self, element: ElementRef) {
        let tag = element.value().name();
        if SKIPPED_TAGS.contains(&tag) || inline_hidden(element) {
            return;
        }

        let block = BLOCK_TAGS.contains(&tag);
        if block {
            self.flush();
        }
        if tag == "td" || tag == "th" {
            self.push(" ");
        }

        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        if child_el.value().name() == "br" {
                            self.flush();
                        } else {
                            self.walk(child_el);
                        }
                    }
                }
                _ => {}
            }
        }

        if tag == "td" || tag == "th" {
            self.push(" ");
        }
        if block {
            self.flush();
        }
    }
}

/// Rendered text of an element split into lines, roughly what `innerText`
/// gives: blocks and `<br>` break lines, table cells share their row's line.
pub fn element_lines(element: ElementRef) -> Vec<String> {
    let mut builder = LineBuilder::new();
    builder.walk(element);
    builder.flush();
    builder.lines
}

pub fn element_text(element: ElementRef) -> String {
    element_lines(element).join("\n")
}

pub fn visible_lines(document: &Html) -> Vec<String> {
    element_lines(document.root_element())
}

/// Text from the element's direct text children only.
pub fn own_text(element: ElementRef) -> String {
    element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(text.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
