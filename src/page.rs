//! Output pages and the paths they are written to, relative to the output
//! directory.

use std::path::PathBuf;

use crate::value::ListingKind;

/// The file every page directory is written as.
pub const PAGE_FILE: &str = "index.html";

/// The Atom feed's path relative to the output directory.
pub const FEED_FILE: &str = "feed.atom";

/// A fully rendered output file.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderedPage {
    /// The path relative to the output directory.
    pub path: PathBuf,

    pub markup: String,
}

/// `<slug>/index.html`. Slugs may contain `/` (e.g., `2021/04/16/hello`).
pub fn post_path(slug: &str) -> PathBuf {
    let mut path: PathBuf = slug.split('/').filter(|s| !s.is_empty()).collect();
    path.push(PAGE_FILE);
    path
}

/// `page/<n>/index.html`, `tag/<name>/index.html`, or
/// `category/<name>/index.html`.
pub fn listing_path(kind: ListingKind, name: Option<&str>, page: usize) -> PathBuf {
    let mut path = PathBuf::from(kind.directory());
    match (kind, name) {
        (ListingKind::Index, _) => path.push(page.to_string()),
        (_, Some(name)) => path.push(name),
        (_, None) => {}
    }
    path.push(PAGE_FILE);
    path
}

/// The site root's `index.html`.
pub fn root_path() -> PathBuf {
    PathBuf::from(PAGE_FILE)
}
