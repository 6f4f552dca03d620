//! HTML section extraction
//!
//! Walks an article's HTML tree and groups paragraph and list-item text
//! under the most recent heading. Headings h1-h6 open a section whose
//! `pow` is the heading level; text before the first heading lands in an
//! untitled prologue section. Tables, style/script blocks, math markup,
//! reference superscripts and external-link list items are skipped.

use crate::storage::{NewArticle, NewSection};

use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::collections::HashMap;

/// Extract a sectioned article from raw HTML. Returns `None` when no
/// usable text is found.
pub fn extract_article(html: &str, id: i64, title: &str, entity: &str) -> Option<NewArticle> {
    let document = Html::parse_document(html);

    let mut state = ExtractState::default();
    walk(document.root_element(), &mut state);

    let sections: Vec<NewSection> = state
        .sections
        .into_iter()
        .filter(|section| !section.content.is_empty())
        .collect();

    if sections.is_empty() {
        return None;
    }

    Some(NewArticle {
        id,
        title: title.to_string(),
        entity: entity.to_string(),
        sections,
    })
}

#[derive(Default)]
struct ExtractState {
    heading: String,
    pow: i64,
    sections: Vec<NewSection>,
    by_heading: HashMap<String, usize>,
}

impl ExtractState {
    fn push_text(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == self.heading {
            return;
        }

        let index = match self.by_heading.get(&self.heading) {
            Some(&index) => index,
            None => {
                self.by_heading.insert(self.heading.clone(), self.sections.len());
                self.sections.push(NewSection {
                    title: self.heading.clone(),
                    pow: self.pow,
                    content: String::new(),
                });
                self.sections.len() - 1
            }
        };

        let content = &mut self.sections[index].content;
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(trimmed);
    }
}

fn walk(element: ElementRef, state: &mut ExtractState) {
    match element.value().name() {
        "table" | "style" | "script" | "math" => return,
        "sup" if has_class(element, "reference") => return,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = collect_text(element);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                state.heading = trimmed.to_string();
                state.pow = heading_level(element.value().name());
            }
            return;
        }
        "p" => {
            let text = collect_text(element);
            state.push_text(&text);
            return;
        }
        "li" => {
            if has_external_link(element) || in_reference_list(element) {
                return;
            }
            let text = collect_text(element);
            if !text.trim().is_empty() {
                state.push_text(&format!("\u{2022} {}", text.trim()));
            }
            return;
        }
        _ => {}
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            walk(child_element, state);
        }
    }
}

fn heading_level(tag: &str) -> i64 {
    tag.strip_prefix('h')
        .and_then(|digit| digit.parse().ok())
        .unwrap_or(0)
}

fn has_class(element: ElementRef, class: &str) -> bool {
    element
        .value()
        .attr("class")
        .is_some_and(|value| value.contains(class))
}

fn has_external_link(element: ElementRef) -> bool {
    descendant_elements(element).any(|el| el.value().name() == "a" && has_class(el, "external"))
}

fn in_reference_list(element: ElementRef) -> bool {
    element
        .parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|parent| {
            matches!(parent.value().name(), "ul" | "ol") && has_class(parent, "references")
        })
}

fn descendant_elements(element: ElementRef) -> impl Iterator<Item = ElementRef> {
    element.descendants().filter_map(ElementRef::wrap)
}

/// Gather the visible text of a subtree, skipping markup that never
/// carries prose.
fn collect_text(element: ElementRef) -> String {
    let mut out = String::new();
    collect_into(element, &mut out);
    out
}

fn collect_into(element: ElementRef, out: &mut String) {
    match element.value().name() {
        "style" | "script" | "math" | "table" => return,
        "sup" if has_class(element, "reference") => return,
        _ => {}
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_into(child_element, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic_sections() {
        let html = r#"
            <html><body>
                <p>Intro paragraph.</p>
                <h2>History</h2>
                <p>First history paragraph.</p>
                <p>Second history paragraph.</p>
                <h3>Modern era</h3>
                <p>Recent events.</p>
            </body></html>
        "#;

        let article = extract_article(html, 1, "Subject", "Q1").unwrap();
        assert_eq!(article.id, 1);
        assert_eq!(article.title, "Subject");
        assert_eq!(article.sections.len(), 3);

        assert_eq!(article.sections[0].title, "");
        assert_eq!(article.sections[0].pow, 0);
        assert_eq!(article.sections[0].content, "Intro paragraph.");

        assert_eq!(article.sections[1].title, "History");
        assert_eq!(article.sections[1].pow, 2);
        assert_eq!(
            article.sections[1].content,
            "First history paragraph.\nSecond history paragraph."
        );

        assert_eq!(article.sections[2].title, "Modern era");
        assert_eq!(article.sections[2].pow, 3);
    }

    #[test]
    fn test_extract_skips_noise() {
        let html = r#"
            <html><body>
                <h2>Data</h2>
                <p>Kept paragraph.<sup class="reference">[1]</sup></p>
                <table><tr><td>dropped cell</td></tr></table>
                <script>dropped();</script>
                <ul class="references"><li>dropped reference</li></ul>
                <ul><li>kept item</li><li><a class="external" href="x">dropped link</a></li></ul>
            </body></html>
        "#;

        let article = extract_article(html, 1, "Subject", "Q1").unwrap();
        assert_eq!(article.sections.len(), 1);
        let content = &article.sections[0].content;
        assert_eq!(content, "Kept paragraph.\n\u{2022} kept item");
    }

    #[test]
    fn test_extract_empty_returns_none() {
        assert!(extract_article("<html><body></body></html>", 1, "T", "Q").is_none());
        assert!(extract_article("<html><body><table><tr><td>x</td></tr></table></body></html>", 1, "T", "Q").is_none());
    }

    #[test]
    fn test_heading_text_not_duplicated_into_content() {
        let html = r#"
            <html><body>
                <h2>Geography</h2>
                <p>Geography</p>
                <p>Actual content.</p>
            </body></html>
        "#;

        let article = extract_article(html, 1, "Subject", "Q1").unwrap();
        assert_eq!(article.sections.len(), 1);
        assert_eq!(article.sections[0].content, "Actual content.");
    }
}
