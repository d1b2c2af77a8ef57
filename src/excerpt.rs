//! Excerpt derivation. An excerpt is either everything before an explicit
//! marker in the markdown source, or a word-boundary truncation of the
//! rendered body that keeps the markup well formed.

use serde::Deserialize;

/// The marker used when the project file doesn't name one.
pub const DEFAULT_MARKER: &str = "<!-- more -->";

/// The cutoff used when the project file doesn't name one.
pub const DEFAULT_LENGTH: usize = 200;

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Excerpt settings from the project file.
#[derive(Clone, Debug, Deserialize)]
pub struct ExcerptConfig {
    /// Maximum number of characters in a truncated excerpt, markup included.
    #[serde(default = "default_length")]
    pub length: usize,

    /// The explicit excerpt break.
    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_length() -> usize {
    DEFAULT_LENGTH
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_owned()
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        ExcerptConfig {
            length: DEFAULT_LENGTH,
            marker: DEFAULT_MARKER.to_owned(),
        }
    }
}

/// A post's excerpt as rendered HTML.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Excerpt {
    pub html: String,

    /// Whether the excerpt is shorter than the post, i.e., whether listing
    /// pages should offer a "read more" link.
    pub truncated: bool,
}

/// Returns the markdown before `marker`, if the marker occurs in `markdown`.
pub fn split_at_marker<'a>(markdown: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    markdown.find(marker).map(|i| &markdown[..i])
}

/// Truncates rendered HTML to at most `limit` characters. The cut happens
/// only outside of tags and only where a word ends (before whitespace, or
/// after a closing tag that the word doesn't continue past), and every element
/// still open at the cut is closed again. The appended closing tags count
/// toward `limit`.
pub fn truncate(html: &str, limit: usize) -> Excerpt {
    if html.chars().count() <= limit {
        return Excerpt {
            html: html.to_owned(),
            truncated: false,
        };
    }

    let mut open: Vec<&str> = Vec::new();
    // (byte offset of the cut, open elements at the cut)
    let mut best: Option<(usize, Vec<&str>)> = None;
    let mut chars = 0;
    let mut rest = html.char_indices().peekable();

    while let Some((i, c)) = rest.next() {
        if c == '<' {
            let end = match html[i..].find('>') {
                Some(end) => i + end,
                None => break,
            };
            let tag = &html[i..=end];
            if let Some(name) = closing_name(tag) {
                if let Some(pos) = open.iter().rposition(|n| *n == name) {
                    open.truncate(pos);
                }
            } else if let Some(name) = opening_name(tag) {
                open.push(name);
            }
            chars += tag.chars().count();
            while let Some(&(j, _)) = rest.peek() {
                if j > end {
                    break;
                }
                rest.next();
            }

            if tag.starts_with("</") && fits(chars, &open, limit) && ends_word(html, end + 1) {
                best = Some((end + 1, open.clone()));
            }
        } else {
            if c.is_whitespace() && i > 0 && fits(chars, &open, limit) {
                let previous = html[..i].chars().last();
                if previous.map_or(false, |p| !p.is_whitespace() && p != '>') {
                    best = Some((i, open.clone()));
                }
            }
            chars += 1;
        }

        if chars > limit {
            break;
        }
    }

    let mut out = match &best {
        Some((cut, _)) => html[..*cut].trim_end().to_owned(),
        None => String::new(),
    };
    if let Some((_, open)) = best {
        for name in open.iter().rev() {
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
    Excerpt {
        html: out,
        truncated: true,
    }
}

/// Reports whether no word continues at byte offset `at`: the next character
/// outside of a tag is whitespace, or there is none.
fn ends_word(html: &str, at: usize) -> bool {
    let mut rest = &html[at..];
    loop {
        match rest.chars().next() {
            None => return true,
            Some('<') => match rest.find('>') {
                Some(end) => rest = &rest[end + 1..],
                None => return true,
            },
            Some(c) => return c.is_whitespace(),
        }
    }
}

fn fits(chars: usize, open: &[&str], limit: usize) -> bool {
    let closing: usize = open.iter().map(|name| name.len() + 3).sum();
    chars + closing <= limit
}

fn closing_name(tag: &str) -> Option<&str> {
    tag.strip_prefix("</").map(element_name)
}

/// Returns the element name of an opening tag that needs a matching closing
/// tag. Comments, doctypes, void elements and self-closing tags return
/// `None`.
fn opening_name(tag: &str) -> Option<&str> {
    if tag.starts_with("<!") || tag.starts_with("<?") || tag.ends_with("/>") {
        return None;
    }
    let name = element_name(&tag[1..]);
    if name.is_empty() || VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(name)
}

fn element_name(tag: &str) -> &str {
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(tag.len());
    &tag[..end]
}

#[cfg(test)]
mod test {
    use super::*;

    fn plain_text(len: usize) -> String {
        let mut text = String::new();
        let mut i = 0;
        while text.len() < len {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(["lorem", "ipsum", "dolor", "sit", "amet"][i % 5]);
            i += 1;
        }
        text.truncate(len);
        text
    }

    #[test]
    fn test_split_at_marker() {
        assert_eq!(
            Some("intro\n\n"),
            split_at_marker("intro\n\n<!-- more -->\n\nrest", DEFAULT_MARKER)
        );
        assert_eq!(None, split_at_marker("no marker here", DEFAULT_MARKER));
        assert_eq!(None, split_at_marker("anything", ""));
    }

    #[test]
    fn test_short_body_is_kept_whole() {
        let excerpt = truncate("<p>short</p>\n", 200);
        assert_eq!("<p>short</p>\n", excerpt.html);
        assert!(!excerpt.truncated);
    }

    #[test]
    fn test_plain_text_cut_at_word_boundary() {
        let text = plain_text(500);
        assert_eq!(500, text.chars().count());
        let html = format!("<p>{}</p>\n", text);

        let excerpt = truncate(&html, 200);
        assert!(excerpt.truncated);
        assert!(excerpt.html.chars().count() <= 200);
        assert!(excerpt.html.starts_with("<p>"));
        assert!(excerpt.html.ends_with("</p>"));

        // The visible text is a whole-word prefix of the original.
        let visible = excerpt
            .html
            .trim_start_matches("<p>")
            .trim_end_matches("</p>");
        assert!(text.starts_with(visible));
        assert_eq!(Some(' '), text[visible.len()..].chars().next());
        assert!(visible.len() > 150);
    }

    #[test]
    fn test_never_cuts_inside_a_tag() {
        let html = format!(
            r#"<p>{} <a href="https://example.com/a/very/long/url/that/crosses/the/limit">link text</a> tail words here</p>"#,
            plain_text(40)
        );
        let excerpt = truncate(&html, 80);
        assert!(excerpt.html.chars().count() <= 80);
        // Every `<` is matched by a `>` after it.
        assert_eq!(
            excerpt.html.matches('<').count(),
            excerpt.html.matches('>').count()
        );
        assert!(!excerpt.html.contains("<a"));
        assert!(excerpt.html.ends_with("</p>"));
    }

    #[test]
    fn test_closes_nested_elements() {
        let html = "<ul><li><em>one two three four five six seven eight nine ten</em></li></ul>";
        let excerpt = truncate(html, 50);
        assert!(excerpt.html.chars().count() <= 50);
        assert!(excerpt.html.ends_with("</em></li></ul>"));
        assert!(excerpt.html.starts_with("<ul><li><em>one"));
    }

    #[test]
    fn test_void_elements_are_not_closed() {
        let html = format!("<p>a<br />b <img src=\"x.png\"> {}</p>", plain_text(300));
        let excerpt = truncate(&html, 100);
        assert!(!excerpt.html.contains("</br>"));
        assert!(!excerpt.html.contains("</img>"));
        assert!(excerpt.html.ends_with("</p>"));
    }

    #[test]
    fn test_never_cuts_word_split_by_inline_element() {
        let html = "<p>so un<em>believ</em>able word word word word word</p>";
        let excerpt = truncate(html, 30);
        assert_eq!("<p>so</p>", excerpt.html);
        assert!(excerpt.truncated);

        let html = "<p>un<em>believ</em>able word word word word word</p>";
        assert_eq!("", truncate(html, 25).html);
    }

    #[test]
    fn test_cut_after_inline_element_ending_a_word() {
        let html = "<p>an <em>unbelievable</em> story with many more words after it</p>";
        assert_eq!("<p>an <em>unbelievable</em></p>", truncate(html, 32).html);
    }

    #[test]
    fn test_cut_after_closing_block() {
        let html = format!("<p>first paragraph</p>\n<p>{}</p>", "x".repeat(300));
        let excerpt = truncate(&html, 100);
        assert_eq!("<p>first paragraph</p>", excerpt.html);
    }
}
