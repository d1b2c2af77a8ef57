//! Defines the [`Post`], [`Builder`], [`Collection`], and [`Error`] types.
//! A [`Builder`] turns a parsed [`Document`] into a [`Post`]: it validates
//! the date, derives the slug and URL, renders the markdown body, and cuts
//! the excerpt. A [`Collection`] holds every post of a run and rejects
//! duplicate slugs.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::document::Document;
use crate::excerpt::{self, Excerpt, ExcerptConfig};
use crate::markdown;
use crate::permalink::Permalink;

/// Date-time formats that carry their own UTC offset.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M %z"];

/// Date-time formats interpreted in the configured timezone.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Date-only format, interpreted as midnight in the configured timezone.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Represents a blog post.
#[derive(Clone, Debug)]
pub struct Post {
    /// The path of the source file.
    pub source: PathBuf,

    /// The title of the post.
    pub title: String,

    /// The publication date of the post.
    pub published_at: DateTime<FixedOffset>,

    /// The tags as written in the frontmatter. See [`crate::tag::Label`] for
    /// the normalized form.
    pub tags: BTreeSet<String>,

    /// The categories as written in the frontmatter.
    pub categories: BTreeSet<String>,

    /// The post's image, resolved against the site URL.
    pub hero_image: Option<Url>,

    pub description: Option<String>,

    /// A free-form summary for social cards (the `summary` key).
    pub social_summary: Option<String>,

    /// The unique path fragment for the post, e.g. `2021/04/16/hello-world`.
    pub slug: String,

    /// The URL of the post page, `{site_url}/{slug}/`.
    pub url: Url,

    /// The rendered HTML body.
    pub body: String,

    pub excerpt: Excerpt,
}

impl Post {
    /// Orders posts for the chronological feed: newest first, ties broken by
    /// slug so the order is total.
    pub fn feed_order(a: &Post, b: &Post) -> Ordering {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.slug.cmp(&b.slug))
    }

    /// Serializes the post's structured fields back into a frontmatter block
    /// (fences included). Parsing the block again yields the same fields.
    pub fn frontmatter(&self) -> std::result::Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(&Frontmatter {
            title: &self.title,
            date: self.published_at.to_rfc3339(),
            tags: &self.tags,
            categories: &self.categories,
            image: self.hero_image.as_ref().map(Url::as_str),
            description: self.description.as_deref(),
            summary: self.social_summary.as_deref(),
        })?;
        let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
        Ok(match yaml.ends_with('\n') {
            true => format!("---\n{}---\n", yaml),
            false => format!("---\n{}\n---\n", yaml),
        })
    }
}

#[derive(Serialize)]
struct Frontmatter<'a> {
    title: &'a str,
    date: String,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    tags: &'a BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    categories: &'a BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
}

/// Builds [`Post`] objects from [`Document`]s.
pub struct Builder<'a> {
    /// `site_url` is the base URL of the site. Post URLs are
    /// `{site_url}/{slug}/` and relative images are resolved against it.
    site_url: &'a Url,

    /// `permalink` is the pattern from which slugs are derived.
    permalink: &'a Permalink,

    /// `excerpt` holds the excerpt marker and cutoff.
    excerpt: &'a ExcerptConfig,

    /// `timezone` is the offset for dates written without one.
    timezone: FixedOffset,

    /// `heading_offset` demotes headings in post bodies.
    heading_offset: u32,
}

impl<'a> Builder<'a> {
    /// Constructs a new builder. See fields on [`Builder`] for argument
    /// descriptions.
    pub fn new(
        site_url: &'a Url,
        permalink: &'a Permalink,
        excerpt: &'a ExcerptConfig,
        timezone: FixedOffset,
        heading_offset: u32,
    ) -> Builder<'a> {
        Builder {
            site_url,
            permalink,
            excerpt,
            timezone,
            heading_offset,
        }
    }

    /// Converts a [`Document`] into a [`Post`]. Slug uniqueness is not
    /// checked here since it depends on the whole run; see
    /// [`Collection::insert`].
    pub fn build(&self, document: Document) -> Result<Post> {
        let title = document.required("title").map_err(missing)?.to_owned();
        let date = document.required("date").map_err(missing)?;
        let published_at = parse_date(date, &self.timezone).ok_or_else(|| Error::InvalidDate {
            document: document.source.clone(),
            value: date.to_owned(),
        })?;

        let slug = self
            .permalink
            .expand(&published_at, &title)
            .ok_or_else(|| Error::EmptySlug {
                document: document.source.clone(),
                title: title.clone(),
            })?;
        let url = self
            .site_url
            .join(&format!("{}/", slug))
            .map_err(|err| Error::Url {
                document: document.source.clone(),
                err,
            })?;

        let hero_image = match document.scalar("image") {
            None => None,
            Some(image) => Some(self.site_url.join(image).map_err(|err| Error::InvalidImage {
                document: document.source.clone(),
                value: image.to_owned(),
                err,
            })?),
        };

        let to_html = |markdown: &str| {
            markdown::to_html(markdown, self.heading_offset, url.as_str()).map_err(|err| {
                Error::Markdown {
                    document: document.source.clone(),
                    err,
                }
            })
        };
        let body = to_html(&document.body)?;
        let excerpt = match excerpt::split_at_marker(&document.body, &self.excerpt.marker) {
            Some(before) => Excerpt {
                html: to_html(before)?,
                truncated: true,
            },
            None => excerpt::truncate(&body, self.excerpt.length),
        };

        Ok(Post {
            title,
            published_at,
            tags: document.list(&["tags"]),
            categories: document.list(&["categories", "category"]),
            hero_image,
            description: document.scalar("description").map(str::to_owned),
            social_summary: document.scalar("summary").map(str::to_owned),
            slug,
            url,
            body,
            excerpt,
            source: document.source,
        })
    }
}

// `Document::parse` already checks required fields, but documents can be
// constructed directly.
fn missing(err: crate::document::Error) -> Error {
    Error::Document(Box::new(err))
}

/// Parses a frontmatter date. See the module constants for the accepted
/// formats; dates without an offset are interpreted in `timezone`.
pub fn parse_date(value: &str, timezone: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date);
    }
    for format in OFFSET_FORMATS {
        if let Ok(date) = DateTime::parse_from_str(value, format) {
            return Some(date);
        }
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    timezone.from_local_datetime(&naive).single()
}

/// The posts of a run, in insertion order, with unique slugs.
#[derive(Debug, Default)]
pub struct Collection {
    posts: Vec<Post>,
    slugs: HashMap<String, usize>,
}

impl Collection {
    pub fn new() -> Collection {
        Collection::default()
    }

    /// Adds a post, failing with [`Error::DuplicateSlug`] if another post
    /// already resolves to the same slug.
    pub fn insert(&mut self, post: Post) -> Result<()> {
        if let Some(&i) = self.slugs.get(&post.slug) {
            return Err(Error::DuplicateSlug {
                slug: post.slug,
                first: self.posts[i].source.clone(),
                second: post.source,
            });
        }
        self.slugs.insert(post.slug.clone(), self.posts.len());
        self.posts.push(post);
        Ok(())
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Represents the result of a [`Post`]-build operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error building a [`Post`].
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the `date` field matches none of the accepted formats.
    #[error("document `{}` has an invalid date `{value}`", .document.display())]
    InvalidDate { document: PathBuf, value: String },

    /// Returned when two posts resolve to the same slug (e.g., same title
    /// and same day).
    #[error(
        "duplicate slug `{slug}`: `{}` and `{}` resolve to the same page",
        .first.display(),
        .second.display()
    )]
    DuplicateSlug {
        slug: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Returned when the title slugifies to nothing.
    #[error("document `{}`: title `{title}` produces an empty slug", .document.display())]
    EmptySlug { document: PathBuf, title: String },

    /// Returned when the `image` field can't be resolved to a URL.
    #[error("document `{}` has an invalid image `{value}`: {err}", .document.display())]
    InvalidImage {
        document: PathBuf,
        value: String,
        #[source]
        err: url::ParseError,
    },

    /// Returned when the post URL can't be derived from the slug.
    #[error("document `{}`: deriving post URL: {err}", .document.display())]
    Url {
        document: PathBuf,
        #[source]
        err: url::ParseError,
    },

    /// Returned when rendering the markdown body fails.
    #[error("document `{}`: rendering markdown: {err}", .document.display())]
    Markdown {
        document: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when a required field is missing from a document that
    /// bypassed [`Document::parse`].
    #[error(transparent)]
    Document(Box<crate::document::Error>),
}


#[cfg(test)]
mod test {
    use super::*;

    struct Fixture {
        site_url: Url,
        permalink: Permalink,
        excerpt: ExcerptConfig,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                site_url: Url::parse("https://example.com/blog/").unwrap(),
                permalink: Permalink::default(),
                excerpt: ExcerptConfig::default(),
            }
        }

        fn builder(&self) -> Builder {
            Builder::new(
                &self.site_url,
                &self.permalink,
                &self.excerpt,
                FixedOffset::east_opt(0).unwrap(),
                0,
            )
        }

        fn build(&self, input: &str) -> Result<Post> {
            self.builder()
                .build(Document::parse("post.md", input).map_err(|e| Error::Document(Box::new(e)))?)
        }
    }

    #[test]
    fn test_build_post() -> Result<()> {
        let post = Fixture::new().build(
            "---\ntitle: Hello, World!\ndate: 2021-04-16 10:30:00 +0800\ntags: [Rust, web]\ncategory: Tech\nimage: /img/hero.png\ndescription: A greeting\nsummary: Say hi\n---\n# Hi\n\nThere\n",
        )?;
        assert_eq!("Hello, World!", post.title);
        assert_eq!("2021/04/16/hello-world", post.slug);
        assert_eq!("https://example.com/blog/2021/04/16/hello-world/", post.url.as_str());
        assert_eq!(
            Some("https://example.com/img/hero.png"),
            post.hero_image.as_ref().map(Url::as_str)
        );
        assert_eq!(Some("A greeting"), post.description.as_deref());
        assert_eq!(Some("Say hi"), post.social_summary.as_deref());
        assert!(post.tags.contains("Rust"));
        assert!(post.categories.contains("Tech"));
        assert_eq!("<h1>Hi</h1>\n<p>There</p>\n", post.body);
        assert_eq!(post.body, post.excerpt.html);
        assert!(!post.excerpt.truncated);
        assert_eq!(8 * 3600, post.published_at.offset().local_minus_utc());
        Ok(())
    }

    #[test]
    fn test_date_formats() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        let wanted = DateTime::parse_from_rfc3339("2021-04-16T10:30:00+08:00").unwrap();

        for value in &[
            "2021-04-16T10:30:00+08:00",
            "2021-04-16 10:30:00 +0800",
            "2021-04-16 10:30 +0800",
        ] {
            assert_eq!(Some(wanted), parse_date(value, &utc), "{}", value);
        }
        for value in &["2021-04-16T10:30:00", "2021-04-16 10:30:00", "2021-04-16 10:30"] {
            assert_eq!(Some(wanted), parse_date(value, &plus8), "{}", value);
        }
        assert_eq!(
            DateTime::parse_from_rfc3339("2021-04-16T00:00:00+00:00").ok(),
            parse_date("2021-04-16", &utc)
        );
        assert_eq!(None, parse_date("April 16th", &utc));
        assert_eq!(None, parse_date("2021-02-30", &utc));
    }

    #[test]
    fn test_invalid_date() {
        match Fixture::new().build("---\ntitle: T\ndate: yesterday\n---\n") {
            Err(Error::InvalidDate { document, value }) => {
                assert_eq!(PathBuf::from("post.md"), document);
                assert_eq!("yesterday", value);
            }
            other => panic!("expected InvalidDate, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_slug() {
        assert!(matches!(
            Fixture::new().build("---\ntitle: '???'\ndate: 2021-04-16\n---\n"),
            Err(Error::EmptySlug { .. })
        ));
    }

    #[test]
    fn test_excerpt_marker() -> Result<()> {
        let post = Fixture::new().build(
            "---\ntitle: T\ndate: 2021-04-16\n---\nIntro *text*.\n\n<!-- more -->\n\nThe rest.\n",
        )?;
        assert_eq!("<p>Intro <em>text</em>.</p>\n", post.excerpt.html);
        assert!(post.excerpt.truncated);
        assert!(post.body.contains("The rest."));
        Ok(())
    }

    #[test]
    fn test_excerpt_cutoff_without_marker() -> Result<()> {
        let words = vec!["word"; 100].join(" ");
        let post = Fixture::new().build(&format!("---\ntitle: T\ndate: 2021-04-16\n---\n{}\n", words))?;
        assert!(post.excerpt.truncated);
        assert!(post.excerpt.html.chars().count() <= excerpt::DEFAULT_LENGTH);
        assert!(post.excerpt.html.ends_with("word</p>"));
        Ok(())
    }

    #[test]
    fn test_frontmatter_round_trip() -> Result<()> {
        let fixture = Fixture::new();
        let original = fixture.build(
            "---\ntitle: 'Colons: a story'\ndate: 2021-04-16 10:30 +0200\ntags:\n  - Rust\n  - '2021'\ncategories: [Notes]\nimage: https://cdn.example.com/a.png\ndescription: Desc\nsummary: Social\n---\nBody\n",
        )?;

        let frontmatter = original.frontmatter().expect("serializing frontmatter");
        let rebuilt = fixture.build(&format!("{}{}", frontmatter, "Body\n"))?;

        assert_eq!(original.title, rebuilt.title);
        assert_eq!(original.published_at, rebuilt.published_at);
        assert_eq!(
            original.published_at.offset(),
            rebuilt.published_at.offset()
        );
        assert_eq!(original.tags, rebuilt.tags);
        assert_eq!(original.categories, rebuilt.categories);
        assert_eq!(original.hero_image, rebuilt.hero_image);
        assert_eq!(original.description, rebuilt.description);
        assert_eq!(original.social_summary, rebuilt.social_summary);
        assert_eq!(original.slug, rebuilt.slug);
        Ok(())
    }

    #[test]
    fn test_duplicate_slug() -> Result<()> {
        let fixture = Fixture::new();
        let input = "---\ntitle: Same\ndate: 2021-04-16\n---\n";
        let first = fixture.builder().build(Document::parse("a.md", input).unwrap())?;
        let second = fixture.builder().build(Document::parse("b.md", input).unwrap())?;

        let mut collection = Collection::new();
        collection.insert(first)?;
        match collection.insert(second) {
            Err(Error::DuplicateSlug { slug, first, second }) => {
                assert_eq!("2021/04/16/same", slug);
                assert_eq!(PathBuf::from("a.md"), first);
                assert_eq!(PathBuf::from("b.md"), second);
            }
            other => panic!("expected DuplicateSlug, got {:?}", other),
        }
        assert_eq!(1, collection.len());
        Ok(())
    }

    #[test]
    fn test_feed_order_ties_broken_by_slug() {
        let a = testing::post("a", "2021-01-01T00:00:00Z", &[]);
        let b = testing::post("b", "2021-01-01T00:00:00Z", &[]);
        let newer = testing::post("z", "2021-01-02T00:00:00Z", &[]);
        assert_eq!(Ordering::Less, Post::feed_order(&a, &b));
        assert_eq!(Ordering::Less, Post::feed_order(&newer, &a));
    }
}
