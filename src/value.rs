//! Converts posts, labels, and listing pages into the [`Value`]s and
//! [`Context`]s handed to the template renderer. Every optional field is
//! always present in the output, so templates never see a missing key.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use gtmpl_value::Value;
use url::Url;

use crate::config::Site;
use crate::index::{Pagination, Taxonomy};
use crate::post::Post;
use crate::render::Context;
use crate::tag::Label;

/// The kinds of listing page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingKind {
    Index,
    Tag,
    Category,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Index => "index",
            ListingKind::Tag => "tag",
            ListingKind::Category => "category",
        }
    }

    /// The directory under the site root holding pages of this kind.
    pub fn directory(&self) -> &'static str {
        match self {
            ListingKind::Index => "page",
            ListingKind::Tag => "tag",
            ListingKind::Category => "category",
        }
    }
}

/// Builds template contexts. Holds everything that isn't specific to one
/// page, including the build time, which is passed in rather than read from
/// the clock so that output is reproducible.
pub struct Contexts<'a> {
    site: Value,
    site_url: &'a Url,
    date_format: &'a str,
    default_image: Option<&'a Url>,

    /// Display spellings of tags and categories, keyed by normalized name.
    tags: BTreeMap<String, String>,
    categories: BTreeMap<String, String>,
}

impl<'a> Contexts<'a> {
    pub fn new(
        site: &'a Site,
        date_format: &'a str,
        default_image: Option<&'a Url>,
        build_time: &DateTime<FixedOffset>,
    ) -> Contexts<'a> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), string(&site.title));
        m.insert("url".to_owned(), string(site.url.as_str()));
        m.insert(
            "description".to_owned(),
            string(site.description.as_deref().unwrap_or_default()),
        );
        m.insert(
            "author".to_owned(),
            string(site.author.as_ref().map(|a| a.name.as_str()).unwrap_or_default()),
        );
        m.insert(
            "build_time".to_owned(),
            string(&build_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        Contexts {
            site: Value::Object(m),
            site_url: &site.url,
            date_format,
            default_image,
            tags: BTreeMap::new(),
            categories: BTreeMap::new(),
        }
    }

    /// Uses the display spelling of each indexed bucket when labelling a
    /// post's tags and categories, so that a link reads the same as the
    /// listing it points to.
    pub fn with_labels(mut self, tags: &Taxonomy, categories: &Taxonomy) -> Contexts<'a> {
        let displays = |taxonomy: &Taxonomy| -> BTreeMap<String, String> {
            taxonomy
                .iter()
                .map(|(name, bucket)| (name.clone(), bucket.label.display.clone()))
                .collect()
        };
        self.tags = displays(tags);
        self.categories = displays(categories);
        self
    }

    /// The URL of a listing page. Page 1 of the main index is the site root.
    pub fn listing_url(&self, kind: ListingKind, name: Option<&str>, page: usize) -> Url {
        let path = match (kind, name) {
            (ListingKind::Index, _) => format!("{}/{}/", kind.directory(), page),
            (_, Some(name)) => format!("{}/{}/", kind.directory(), name),
            (_, None) => format!("{}/", kind.directory()),
        };
        join(self.site_url, &path)
    }

    /// The context for a post page. `prev` and `next` are the neighbouring
    /// posts in feed order (newer and older respectively).
    pub fn post(&self, post: &Post, prev: Option<&Post>, next: Option<&Post>) -> Context {
        let mut context = Context::new().with("site", self.site.clone());
        for (key, value) in self.post_fields(post) {
            context.insert(key, value);
        }
        context.insert("slug", string(&post.slug));
        context.insert("body", string(&post.body));
        context.insert("prev", prev.map_or(Value::Nil, link));
        context.insert("next", next.map_or(Value::Nil, link));
        context
    }

    /// The context for a listing page.
    pub fn listing(
        &self,
        kind: ListingKind,
        label: Option<&Label>,
        page: &Pagination<&Post>,
    ) -> Context {
        let name = label.map(|l| l.name.as_str());
        let title = match label {
            Some(label) => label.display.clone(),
            None => self.site_title(),
        };
        let url = match kind {
            ListingKind::Index if page.number == 1 => self.site_url.clone(),
            _ => self.listing_url(kind, name, page.number),
        };

        let page_url = |number: usize| string(self.listing_url(kind, name, number).as_str());
        let mut pager: HashMap<String, Value> = HashMap::new();
        pager.insert("number".to_owned(), Value::from(page.number as u64));
        pager.insert("total".to_owned(), Value::from(page.total as u64));
        pager.insert(
            "prev".to_owned(),
            match page.has_prev() {
                true => page_url(page.number - 1),
                false => Value::Nil,
            },
        );
        pager.insert(
            "next".to_owned(),
            match page.has_next() {
                true => page_url(page.number + 1),
                false => Value::Nil,
            },
        );

        Context::new()
            .with("site", self.site.clone())
            .with("kind", string(kind.as_str()))
            .with("title", string(&title))
            .with("label", string(label.map(|l| l.display.as_str()).unwrap_or_default()))
            .with("url", string(url.as_str()))
            .with(
                "items",
                Value::Array(page.items.iter().map(|post| self.summary(post)).collect()),
            )
            .with("page", Value::Object(pager))
    }

    /// A post as it appears in a listing.
    pub fn summary(&self, post: &Post) -> Value {
        Value::Object(self.post_fields(post).into_iter().collect())
    }

    /// The fields shared by post pages and listing items.
    fn post_fields(&self, post: &Post) -> Vec<(String, Value)> {
        let description = post.description.as_deref().unwrap_or_default();
        let image = post
            .hero_image
            .as_ref()
            .or(self.default_image)
            .map(Url::as_str)
            .unwrap_or_default();
        vec![
            ("title".to_owned(), string(&post.title)),
            ("url".to_owned(), string(post.url.as_str())),
            (
                "date".to_owned(),
                string(&post.published_at.format(self.date_format).to_string()),
            ),
            ("date_iso".to_owned(), string(&post.published_at.to_rfc3339())),
            ("excerpt".to_owned(), string(&post.excerpt.html)),
            ("truncated".to_owned(), Value::Bool(post.excerpt.truncated)),
            ("image".to_owned(), string(image)),
            ("description".to_owned(), string(description)),
            (
                "summary".to_owned(),
                string(post.social_summary.as_deref().unwrap_or(description)),
            ),
            (
                "tags".to_owned(),
                self.labels(ListingKind::Tag, post.tags.iter()),
            ),
            (
                "categories".to_owned(),
                self.labels(ListingKind::Category, post.categories.iter()),
            ),
        ]
    }

    /// Normalizes a post's raw labels and converts them to an array of
    /// `{name, label, url}` sorted by name. `label` is the bucket's display
    /// spelling when known.
    fn labels<'b>(&self, kind: ListingKind, raw: impl Iterator<Item = &'b String>) -> Value {
        let displays = match kind {
            ListingKind::Category => &self.categories,
            _ => &self.tags,
        };
        let labels: BTreeMap<String, Label> = raw
            .filter_map(|raw| Label::new(raw))
            .map(|label| (label.name.clone(), label))
            .collect();
        Value::Array(
            labels
                .values()
                .map(|label| {
                    let mut m: HashMap<String, Value> = HashMap::new();
                    m.insert("name".to_owned(), string(&label.name));
                    let display = displays.get(&label.name).unwrap_or(&label.display);
                    m.insert("label".to_owned(), string(display));
                    m.insert(
                        "url".to_owned(),
                        string(self.listing_url(kind, Some(&label.name), 1).as_str()),
                    );
                    Value::Object(m)
                })
                .collect(),
        )
    }

    fn site_title(&self) -> String {
        match &self.site {
            Value::Object(m) => match m.get("title") {
                Some(Value::String(title)) => title.clone(),
                _ => String::new(),
            },
            _ => String::new(),
        }
    }
}

fn link(post: &Post) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("title".to_owned(), string(&post.title));
    m.insert("url".to_owned(), string(post.url.as_str()));
    Value::Object(m)
}

fn string(s: &str) -> Value {
    Value::String(s.to_owned())
}

// Listing paths are built from slugified labels and numbers, which always
// form a valid relative reference.
fn join(base: &Url, path: &str) -> Url {
    base.join(path).unwrap_or_else(|_| base.clone())
}
