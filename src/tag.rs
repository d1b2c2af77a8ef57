//! Defines the [`Label`] type, which represents a tag or a category of a
//! [`crate::post::Post`] once it has been normalized for indexing.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A normalized tag or category label. Posts keep their labels as written;
/// the indexer converts them to [`Label`]s so that spellings like `Tech` and
/// `tech` land in the same bucket and the same output directory.
#[derive(Clone, Debug)]
pub struct Label {
    /// The normalized form of the label. This is slugified so e.g., `macOS`
    /// and `MacOS` resolve to the same value, and also so the field can be
    /// dropped into a URL or a path.
    pub name: String,

    /// The label as written in a post's frontmatter. When several spellings
    /// merge into one label, the indexer picks the one used by the newest
    /// post.
    pub display: String,
}

impl Label {
    /// Normalizes a raw label. Returns `None` when nothing survives
    /// normalization (e.g., a label made only of punctuation).
    pub fn new(raw: &str) -> Option<Label> {
        let name = normalize(raw);
        match name.is_empty() {
            true => None,
            false => Some(Label {
                name,
                display: raw.trim().to_owned(),
            }),
        }
    }
}

/// Normalizes a raw label into the form used for bucket keys and paths.
pub fn normalize(raw: &str) -> String {
    slug::slugify(raw.trim())
}

impl Hash for Label {
    /// Implements [`Hash`] for [`Label`] by delegating directly to the `name`
    /// field.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl PartialEq for Label {
    /// Implements [`PartialEq`] and [`Eq`] for [`Label`] by delegating
    /// directly to the `name` field.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
