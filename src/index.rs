//! The collection indexer. Given every [`Post`] of a run, builds the
//! chronological feed and the tag and category indices, and splits listings
//! into pages. Indices borrow the posts; they are recomputed each run.

use std::collections::BTreeMap;

use crate::post::Post;
use crate::tag::Label;

/// The posts that share a normalized label, in feed order.
#[derive(Debug)]
pub struct Bucket<'a> {
    pub label: Label,
    pub posts: Vec<&'a Post>,
}

/// Buckets keyed by normalized label name.
pub type Taxonomy<'a> = BTreeMap<String, Bucket<'a>>;

/// The derived views over a post collection.
#[derive(Debug)]
pub struct Index<'a> {
    /// Every post, newest first, ties broken by slug.
    pub feed: Vec<&'a Post>,

    pub tags: Taxonomy<'a>,

    pub categories: Taxonomy<'a>,
}

impl<'a> Index<'a> {
    /// Indexes a list of [`Post`] objects. The result doesn't depend on the
    /// order of `posts`.
    pub fn new(posts: &'a [Post]) -> Index<'a> {
        let mut feed: Vec<&Post> = posts.iter().collect();
        feed.sort_by(|a, b| Post::feed_order(a, b));

        let tags = taxonomy(&feed, |post| post.tags.iter());
        let categories = taxonomy(&feed, |post| post.categories.iter());
        Index {
            feed,
            tags,
            categories,
        }
    }
}

/// Groups `feed` by normalized label. Since `feed` is already sorted, each
/// bucket comes out sorted too, and the first spelling seen for a label is the
/// one used by the newest post.
fn taxonomy<'a, F, I>(feed: &[&'a Post], labels: F) -> Taxonomy<'a>
where
    F: Fn(&'a Post) -> I,
    I: Iterator<Item = &'a String>,
{
    let mut taxonomy: Taxonomy = BTreeMap::new();
    for &post in feed {
        // A post tagged both `Tech` and `tech` belongs in the bucket once.
        let mut seen: Vec<String> = Vec::new();
        for raw in labels(post) {
            let label = match Label::new(raw) {
                Some(label) => label,
                None => continue,
            };
            if seen.contains(&label.name) {
                continue;
            }
            seen.push(label.name.clone());
            taxonomy
                .entry(label.name.clone())
                .or_insert_with(|| Bucket {
                    label,
                    posts: Vec::new(),
                })
                .posts
                .push(post);
        }
    }
    taxonomy
}

/// One page of a paginated listing.
#[derive(Debug, PartialEq, Eq)]
pub struct Pagination<'a, T> {
    /// The 1-based page number.
    pub number: usize,

    /// The total number of pages in the listing.
    pub total: usize,

    pub items: &'a [T],
}

impl<T> Pagination<'_, T> {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total
    }
}

/// Splits `items` into pages of `page_size` items; the last page may be
/// partial. Produces `ceil(items.len() / page_size)` pages, so an empty
/// listing has no pages.
///
/// # Panics
///
/// Panics if `page_size` is zero. The project configuration rejects a zero
/// page size.
pub fn paginate<T>(items: &[T], page_size: usize) -> Vec<Pagination<'_, T>> {
    let total = (items.len() + page_size - 1) / page_size;
    items
        .chunks(page_size)
        .enumerate()
        .map(|(i, chunk)| Pagination {
            number: i + 1,
            total,
            items: chunk,
        })
        .collect()
}
