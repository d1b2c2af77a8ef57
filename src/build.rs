//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: parsing and building posts in
//! parallel ([`crate::document`], [`crate::post`]), indexing them
//! ([`crate::index`]), rendering post and listing pages ([`crate::render`])
//! and the Atom feed ([`crate::feed`]), and writing the result
//! ([`crate::write`]).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Config;
use crate::document::{Document, Error as DocumentError};
use crate::feed::{write_feed, Error as FeedError, FeedConfig};
use crate::index::{paginate, Index, Pagination};
use crate::page::{self, RenderedPage, FEED_FILE};
use crate::post::{Builder as PostBuilder, Collection, Error as PostError, Post};
use crate::render::{
    default_required_fields, Context, Error as RenderError, Renderer, LISTING_LAYOUT, POST_LAYOUT,
};
use crate::value::{Contexts, ListingKind};
use crate::write::{Error as WriteError, Writer};

/// The extension of post source files.
const SOURCE_EXTENSION: &str = "md";

/// A flag shared between the caller and a running build. Once set, the build
/// stops at the next check and returns [`Error::Cancelled`] without touching
/// the output directory.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Cancellation {
        Cancellation::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        match self.is_cancelled() {
            true => Err(Error::Cancelled),
            false => Ok(()),
        }
    }
}

/// Per-run values that don't come from the project configuration.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    /// Exposed to templates as `site.build_time`, and used as the feed's
    /// `updated` date when there are no posts.
    pub build_time: DateTime<FixedOffset>,
}

/// A summary of a completed build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// The number of source documents found.
    pub documents: usize,

    /// The number of posts published.
    pub posts: usize,

    /// The number of drafts skipped.
    pub drafts: usize,

    /// The number of files written, including the feed.
    pub pages: usize,
}

/// Builds the site described by `config` into `config.output_directory`. The
/// output directory is only replaced if every step succeeds.
pub fn build_site(config: &Config, info: &BuildInfo, cancellation: &Cancellation) -> Result<Report> {
    let renderer = load_renderer(config)?;

    let sources = discover(&config.posts_source_directory)?;
    info!(
        documents = sources.len(),
        directory = %config.posts_source_directory.display(),
        "Discovered documents"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.unwrap_or(0))
        .build()?;
    let builder = PostBuilder::new(
        &config.site.url,
        &config.permalink,
        &config.excerpt,
        config.timezone,
        config.heading_offset,
    );
    // Collected in source order so the reported error doesn't depend on
    // scheduling.
    let results: Vec<Result<Option<Post>>> = pool.install(|| {
        sources
            .par_iter()
            .map(|source| {
                load_post(
                    &builder,
                    &config.posts_source_directory,
                    source,
                    config.include_drafts,
                    cancellation,
                )
            })
            .collect()
    });
    cancellation.check()?;

    let mut collection = Collection::new();
    let mut drafts = 0;
    for result in results {
        match result? {
            Some(post) => collection.insert(post)?,
            None => drafts += 1,
        }
    }
    info!(posts = collection.len(), drafts, "Built posts");

    let index = Index::new(collection.posts());
    let contexts = Contexts::new(
        &config.site,
        &config.date_format,
        config.default_image.as_ref(),
        &info.build_time,
    )
    .with_labels(&index.tags, &index.categories);
    let mut pages = render_pages(&renderer, &contexts, &index, config.page_size, cancellation)?;
    pages.push(RenderedPage {
        path: PathBuf::from(FEED_FILE),
        markup: write_feed(
            &FeedConfig {
                title: &config.site.title,
                site_url: &config.site.url,
                author: config.site.author.as_ref(),
                feed_size: config.feed_size,
                build_time: info.build_time,
            },
            &index.feed,
        )?,
    });
    check_collisions(&pages)?;
    cancellation.check()?;

    Writer {
        output_directory: &config.output_directory,
        cancellation,
    }
    .write_pages(&pages)?;
    info!(
        pages = pages.len(),
        directory = %config.output_directory.display(),
        "Wrote site"
    );

    Ok(Report {
        documents: sources.len(),
        posts: collection.len(),
        drafts,
        pages: pages.len(),
    })
}

/// Registers every layout the theme declares.
fn load_renderer(config: &Config) -> Result<Renderer> {
    let mut renderer = Renderer::new();
    for layout in &config.layouts {
        let required = layout
            .required
            .clone()
            .unwrap_or_else(|| default_required_fields(&layout.name));
        renderer.load(&layout.name, &layout.templates, required)?;
        debug!(layout = %layout.name, "Loaded layout");
    }
    Ok(renderer)
}

/// Finds every post source under `dir`, sorted by path.
fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().map_or(false, |ext| ext == SOURCE_EXTENSION)
        {
            sources.push(path.to_owned());
        }
    }
    Ok(sources)
}

/// Reads, parses, and builds one post. Returns `None` for skipped drafts.
/// The document is identified by its path relative to `posts_directory`.
fn load_post(
    builder: &PostBuilder,
    posts_directory: &Path,
    source: &Path,
    include_drafts: bool,
    cancellation: &Cancellation,
) -> Result<Option<Post>> {
    cancellation.check()?;
    let input = fs::read_to_string(source).map_err(|err| Error::Io {
        path: source.to_owned(),
        err,
    })?;
    let identity = source.strip_prefix(posts_directory).unwrap_or(source);
    let document = Document::parse(identity, &input)?;
    if document.is_draft() && !include_drafts {
        debug!(document = %source.display(), "Skipping draft");
        return Ok(None);
    }
    let post = builder.build(document)?;
    debug!(document = %source.display(), slug = %post.slug, "Built post");
    Ok(Some(post))
}

/// Renders one page per post, tag, category, and feed page, plus the site
/// root.
fn render_pages(
    renderer: &Renderer,
    contexts: &Contexts,
    index: &Index,
    page_size: usize,
    cancellation: &Cancellation,
) -> Result<Vec<RenderedPage>> {
    let mut pages = Vec::new();

    for (i, post) in index.feed.iter().enumerate() {
        cancellation.check()?;
        let prev = match i {
            0 => None,
            _ => index.feed.get(i - 1).copied(),
        };
        let next = index.feed.get(i + 1).copied();
        pages.push(render(
            renderer,
            POST_LAYOUT,
            &contexts.post(post, prev, next),
            page::post_path(&post.slug),
        )?);
    }

    let feed_pages = paginate(&index.feed, page_size);
    for feed_page in &feed_pages {
        let context = contexts.listing(ListingKind::Index, None, feed_page);
        if feed_page.number == 1 {
            pages.push(render(renderer, LISTING_LAYOUT, &context, page::root_path())?);
        }
        pages.push(render(
            renderer,
            LISTING_LAYOUT,
            &context,
            page::listing_path(ListingKind::Index, None, feed_page.number),
        )?);
    }
    if feed_pages.is_empty() {
        let empty: Pagination<&Post> = Pagination {
            number: 1,
            total: 1,
            items: &[],
        };
        pages.push(render(
            renderer,
            LISTING_LAYOUT,
            &contexts.listing(ListingKind::Index, None, &empty),
            page::root_path(),
        )?);
    }

    for (kind, taxonomy) in [
        (ListingKind::Tag, &index.tags),
        (ListingKind::Category, &index.categories),
    ] {
        for (name, bucket) in taxonomy {
            cancellation.check()?;
            let listing = Pagination {
                number: 1,
                total: 1,
                items: &bucket.posts[..],
            };
            pages.push(render(
                renderer,
                LISTING_LAYOUT,
                &contexts.listing(kind, Some(&bucket.label), &listing),
                page::listing_path(kind, Some(name.as_str()), 1),
            )?);
        }
    }

    info!(pages = pages.len(), "Rendered pages");
    Ok(pages)
}

fn render(
    renderer: &Renderer,
    layout: &str,
    context: &Context,
    path: PathBuf,
) -> Result<RenderedPage> {
    match renderer.render(layout, context) {
        Ok(markup) => {
            debug!(path = %path.display(), layout, "Rendered page");
            Ok(RenderedPage { path, markup })
        }
        Err(err) => Err(Error::Render { path, err }),
    }
}

/// Two pages claiming one path can only come from a permalink pattern that
/// shadows the listing directories (e.g., `tag/:title`).
fn check_collisions(pages: &[RenderedPage]) -> Result<()> {
    let mut seen: HashSet<&Path> = HashSet::new();
    for page in pages {
        if !seen.insert(&page.path) {
            return Err(Error::OutputCollision {
                path: page.path.clone(),
            });
        }
    }
    Ok(())
}

/// The result of a fallible site build.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Every error is terminal: the run stops
/// and the output directory is left as it was.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for documents that can't be parsed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Returned for documents that can't be built into posts, and for slug
    /// collisions.
    #[error(transparent)]
    Post(#[from] PostError),

    /// Returned for errors loading the theme's layouts.
    #[error(transparent)]
    Layout(#[from] RenderError),

    /// Returned for errors rendering a page.
    #[error("rendering `{}`: {err}", .path.display())]
    Render {
        path: PathBuf,
        #[source]
        err: RenderError,
    },

    /// Returned for errors generating the feed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Returned for I/O problems reading source documents.
    #[error("reading `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// Returned for errors walking the posts directory.
    #[error("walking posts directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Returned when two pages would be written to the same path.
    #[error("more than one page would be written to `{}`", .path.display())]
    OutputCollision { path: PathBuf },

    /// Returned for errors writing the output directory.
    #[error(transparent)]
    Write(WriteError),

    /// Returned when the build was cancelled.
    #[error("build cancelled")]
    Cancelled,

    /// Returned when the worker pool can't be started.
    #[error("starting worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`], keeping cancellation
    /// distinguishable regardless of the stage it was noticed in.
    fn from(err: WriteError) -> Error {
        match err {
            WriteError::Cancelled => Error::Cancelled,
            err => Error::Write(err),
        }
    }
}
