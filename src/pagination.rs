use pulldown_cmark::{Event, Parser, TagEnd};
use serde::{Deserialize, Serialize};

pub const WORDS_PER_PAGE: u32 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChapterMetrics {
    pub word_count: u32,
    pub page_count: u32,
}

/// Word and page counts for one chapter. Never reports fewer than one page.
pub fn compute_metrics(content: &str) -> ChapterMetrics {
    let word_count = count_words(content);
    ChapterMetrics {
        word_count,
        page_count: pages_for_words(word_count),
    }
}

pub fn pages_for_words(word_count: u32) -> u32 {
    word_count.div_ceil(WORDS_PER_PAGE).max(1)
}

pub fn total_pages<'a>(metrics: impl IntoIterator<Item = &'a ChapterMetrics>) -> u32 {
    metrics.into_iter().map(|m| m.page_count).sum()
}

fn count_words(content: &str) -> u32 {
    let text = plain_text(content);
    let count = text.split(char::is_whitespace).filter(|t| !t.is_empty()).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn plain_text(content: &str) -> String {
    let mut text = String::with_capacity(content.len());
    for event in Parser::new(content) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::Html(html) | Event::InlineHtml(html) => {
                text.push(' ');
                strip_tags_into(&html, &mut text);
                text.push(' ');
            }
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            Event::End(
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link,
            ) => {}
            Event::End(_) => text.push(' '),
            _ => {}
        }
    }
    text
}

/// Drops anything between `<` and `>`; each tag becomes a word break.
fn strip_tags_into(html: &str, out: &mut String) {
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if in_tag => {}
            _ => out.push(ch),
        }
    }
    if out.contains("&nbsp;") {
        *out = out.replace("&nbsp;", " ");
    }
}
