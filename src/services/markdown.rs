//! Markdown rendering for post bodies
//!
//! Uses pulldown-cmark with tables, strikethrough, task lists and smart
//! punctuation. Raw HTML in the source is escaped, since post bodies end up
//! inside public pages.

use pulldown_cmark::{html, Event, Options, Parser};

/// Words per minute used for reading time estimates
pub const WORDS_PER_MINUTE: usize = 200;

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options
}

/// Render markdown to HTML.
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

/// Reading time label, e.g. "3 min read". Never below one minute.
pub fn estimate_read_time(content: &str) -> String {
    let words = content.split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    format!("{} min read", minutes)
}
