//! Support for creating Atom feeds from a list of posts.

use std::string::FromUtf8Error;

use atom_syndication::{
    Category, CategoryBuilder, Entry, EntryBuilder, Error as AtomError, Feed, FeedBuilder,
    FixedDateTime, Link, LinkBuilder, Person, PersonBuilder, Text,
};
use thiserror::Error;
use url::Url;

use crate::config::Author;
use crate::page::FEED_FILE;
use crate::post::Post;
use crate::tag::Label;

/// Bundled configuration for creating a feed.
pub struct FeedConfig<'a> {
    pub title: &'a str,
    pub site_url: &'a Url,
    pub author: Option<&'a Author>,

    /// The maximum number of entries.
    pub feed_size: usize,

    /// Used as the feed's `updated` date when there are no posts.
    pub build_time: FixedDateTime,
}

/// Creates an Atom document from the newest `config.feed_size` of `posts`,
/// which must already be in feed order.
pub fn write_feed(config: &FeedConfig, posts: &[&Post]) -> Result<String> {
    let out = feed(config, posts).write_to(Vec::new())?;
    Ok(String::from_utf8(out)?)
}

fn feed(config: &FeedConfig, posts: &[&Post]) -> Feed {
    let posts = &posts[..posts.len().min(config.feed_size)];
    let updated = posts
        .first()
        .map(|post| post.published_at)
        .unwrap_or(config.build_time);

    let self_link = config
        .site_url
        .join(FEED_FILE)
        .map(|url| link(url.as_str(), "self"))
        .ok();
    let links: Vec<Link> = std::iter::once(link(config.site_url.as_str(), "alternate"))
        .chain(self_link)
        .collect();

    FeedBuilder::default()
        .title(Text::plain(config.title))
        .id(config.site_url.as_str())
        .updated(updated)
        .authors(authors(config.author))
        .links(links)
        .entries(
            posts
                .iter()
                .map(|post| entry(post, config.author))
                .collect::<Vec<Entry>>(),
        )
        .build()
}

fn entry(post: &Post, author: Option<&Author>) -> Entry {
    let categories: Vec<Category> = post
        .tags
        .iter()
        .filter_map(|raw| Label::new(raw))
        .map(|label| {
            CategoryBuilder::default()
                .term(label.name)
                .label(Some(label.display))
                .build()
        })
        .collect();

    EntryBuilder::default()
        .title(Text::plain(post.title.as_str()))
        .id(post.url.as_str())
        .updated(post.published_at)
        .published(Some(post.published_at))
        .authors(authors(author))
        .links(vec![link(post.url.as_str(), "alternate")])
        .summary(Some(Text::html(post.excerpt.html.as_str())))
        .categories(categories)
        .build()
}

fn link(href: &str, rel: &str) -> Link {
    LinkBuilder::default()
        .href(href)
        .rel(rel)
        .build()
}

fn authors(author: Option<&Author>) -> Vec<Person> {
    match author {
        Some(author) => vec![PersonBuilder::default()
            .name(author.name.as_str())
            .email(author.email.clone())
            .build()],
        None => Vec::new(),
    }
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem serializing a feed.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when there is an Atom-related error.
    #[error("serializing Atom feed: {0}")]
    Atom(#[from] AtomError),

    /// Returned when the serialized feed isn't valid UTF-8.
    #[error("serializing Atom feed: {0}")]
    Utf8(#[from] FromUtf8Error),
}
