use pulldown_cmark::escape::{escape_href, escape_html};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use std::io;

/// Converts markdown to HTML.
///
/// * `markdown` is the markdown source.
/// * `heading_offset` is added to every heading level (clamped at `h6`) so
///   the post's headings sit below the site and post titles in the page
///   outline.
/// * `footnote_prefix` is the prefix to prepend onto footnote links. Passing
///   the post URL makes the links work from listing pages too, where a
///   footnote reference can appear in an excerpt while its definition lives
///   on the post page.
pub fn to_html(
    markdown: &str,
    heading_offset: u32,
    footnote_prefix: &str,
) -> io::Result<String> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let converter = EventConverter {
        heading_offset,
        footnote_prefix,
    };
    let events = Parser::new_ext(markdown, options)
        .map(|ev| converter.convert(ev))
        .collect::<io::Result<Vec<Event>>>()?;

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    Ok(out)
}

struct EventConverter<'a> {
    heading_offset: u32,
    footnote_prefix: &'a str,
}

impl EventConverter<'_> {
    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Tag<'b> {
        match tag {
            Tag::Heading(level) => {
                Tag::Heading((level + self.heading_offset).min(6))
            }
            _ => tag,
        }
    }

    fn convert<'b>(&self, ev: Event<'b>) -> io::Result<Event<'b>> {
        Ok(match ev {
            Event::Start(tag) => Event::Start(self.convert_tag(tag)),
            Event::End(tag) => Event::End(self.convert_tag(tag)),
            Event::FootnoteReference(name) => {
                let mut html = String::new();
                html.push_str(r#"<sup class="footnote-reference"><a href=""#);
                escape_href(&mut html, self.footnote_prefix)?;
                html.push('#');
                escape_html(&mut html, &name)?;
                html.push_str(r#"">"#);
                escape_html(&mut html, &name)?;
                html.push_str("</a></sup>");
                Event::Html(CowStr::from(html))
            }
            _ => ev,
        })
    }
}
