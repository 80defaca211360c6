//! Review markup rendering and sanitisation
//!
//! Review frames come from a remote process and are treated as untrusted:
//! raw HTML inside the markdown is demoted to text (and so escaped), and
//! links with script-capable schemes are neutralised. The result is wrapped
//! in a page shell whose Content-Security-Policy forbids scripts outright.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

use pairbot_core::InboundMessage;

/// Title of the review display surface
pub const PANEL_TITLE: &str = "Code Review";

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; style-src 'unsafe-inline'; img-src data: https:;";

const PAGE_STYLE: &str = "body { font-family: sans-serif; margin: 1.5em; line-height: 1.5; }\n\
pre, code { font-family: monospace; }\n\
pre { padding: 0.75em; overflow-x: auto; background: rgba(127, 127, 127, 0.1); }";

/// The lightweight markup shown for one review frame
pub fn review_markdown(message: &InboundMessage) -> String {
    format!("**{}**\n\n{}", message.filename, message.comment)
}

/// Convert markdown to an HTML fragment with raw HTML escaped
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(markdown, options).map(sanitize_event);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if is_unsafe_url(&dest_url) => Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if is_unsafe_url(&dest_url) => Event::Start(Tag::Image {
            link_type,
            dest_url: CowStr::Borrowed(""),
            title,
            id,
        }),
        other => other,
    }
}

fn is_unsafe_url(url: &str) -> bool {
    let lowered: String = url
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect::<String>()
        .to_ascii_lowercase();
    ["javascript:", "vbscript:", "data:text/html"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
}

/// Wrap an HTML fragment in the full panel page
pub fn page(body_html: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"UTF-8\">\n\
<meta http-equiv=\"Content-Security-Policy\" content=\"{csp}\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
<title>{title}</title>\n\
<style>\n{style}\n</style>\n\
</head>\n\
<body>\n{body}</body>\n\
</html>\n",
        csp = CONTENT_SECURITY_POLICY,
        title = PANEL_TITLE,
        style = PAGE_STYLE,
        body = body_html,
    )
}

/// The page a freshly created surface shows before any review arrives
pub fn empty_page() -> String {
    page("")
}

/// Full page for one review frame
pub fn review_page(message: &InboundMessage) -> String {
    page(&markdown_to_html(&review_markdown(message)))
}
