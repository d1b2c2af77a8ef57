//! Expands permalink patterns like `:year/:month/:day/:title` into post
//! slugs.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::Deserialize;

/// The pattern used when the project file doesn't name one.
pub const DEFAULT_PATTERN: &str = ":year/:month/:day/:title";

/// A permalink pattern. Each `/`-separated segment is either a literal or one
/// of the placeholders `:year`, `:month`, `:day`, `:hour`, `:minute`,
/// `:second`, or `:title`. Empty segments are dropped, so leading and
/// trailing slashes in the pattern don't matter.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(from = "String")]
pub struct Permalink(String);

impl Default for Permalink {
    fn default() -> Self {
        Permalink(DEFAULT_PATTERN.to_owned())
    }
}

impl From<String> for Permalink {
    fn from(pattern: String) -> Self {
        Permalink(pattern)
    }
}

impl Permalink {
    /// Expands the pattern for a post. Returns `None` if the title slugifies
    /// to nothing, since such a slug would identify the date rather than the
    /// post.
    pub fn expand(&self, date: &DateTime<FixedOffset>, title: &str) -> Option<String> {
        let title = slug::slugify(title);
        if title.is_empty() {
            return None;
        }

        let segments: Vec<String> = self
            .0
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment {
                ":year" => format!("{:04}", date.year()),
                ":month" => format!("{:02}", date.month()),
                ":day" => format!("{:02}", date.day()),
                ":hour" => format!("{:02}", date.hour()),
                ":minute" => format!("{:02}", date.minute()),
                ":second" => format!("{:02}", date.second()),
                ":title" => title.clone(),
                literal => slug::slugify(literal),
            })
            .filter(|segment| !segment.is_empty())
            .collect();
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_default_pattern() {
        assert_eq!(
            Some("2021/04/06/hello-world".to_owned()),
            Permalink::default().expand(&date("2021-04-06T10:00:00+08:00"), "Hello, World!"),
        );
    }

    #[test]
    fn test_uses_local_date_of_the_offset() {
        // 23:30 at -05:00 is already the next day in UTC; the slug follows
        // the date the author wrote.
        assert_eq!(
            Some("2021/04/06/late".to_owned()),
            Permalink::default().expand(&date("2021-04-06T23:30:00-05:00"), "Late"),
        );
    }

    #[test]
    fn test_custom_pattern_with_literal() {
        let permalink = Permalink::from("/blog/:year/:title/".to_owned());
        assert_eq!(
            Some("blog/2020/rust-is-fun".to_owned()),
            permalink.expand(&date("2020-01-01T00:00:00Z"), "Rust  is -- fun"),
        );
    }

    #[test]
    fn test_empty_title_slug() {
        assert_eq!(None, Permalink::default().expand(&date("2020-01-01T00:00:00Z"), "?!"));
    }
}
