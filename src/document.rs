//! Defines the [`Document`] type and the logic for splitting a source file
//! into its YAML frontmatter and its markdown body. A [`Document`] is the raw,
//! unvalidated-beyond-syntax form of a post; see [`crate::post::Builder`] for
//! the conversion into a [`crate::post::Post`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde_yaml::Value as Yaml;
use thiserror::Error;

/// The frontmatter keys every document must carry.
pub const REQUIRED_FIELDS: [&str; 2] = ["title", "date"];

/// A single frontmatter value. Scalars of any YAML type are kept as their
/// string representation; sequences of scalars become [`FieldValue::List`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

/// A source file split into frontmatter and body.
#[derive(Clone, Debug)]
pub struct Document {
    /// The path of the source file. This is
    /// the document's identity in error messages.
    pub source: PathBuf,

    /// The frontmatter fields, keyed by their (case-sensitive) YAML key.
    pub metadata: BTreeMap<String, FieldValue>,

    /// Everything after the closing frontmatter fence.
    pub body: String,
}

impl Document {
    /// Parses a [`Document`] from the contents of a source file. The input
    /// must be structured as follows:
    ///
    /// 1. Initial frontmatter fence (`---`) on the first line
    /// 2. YAML frontmatter, a mapping with at least `title` and `date`
    /// 3. Terminal frontmatter fence (`---` or `...`) on a line of its own
    /// 4. Markdown body
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// title: Hello, world!
    /// date: 2021-04-16
    /// tags: [greet]
    /// ---
    /// # Hello
    ///
    /// World
    /// ```
    pub fn parse(source: impl Into<PathBuf>, input: &str) -> Result<Document> {
        let source = source.into();
        let (yaml, body) = split_frontmatter(input)
            .map_err(|reason| Error::malformed(&source, reason))?;

        let metadata = parse_metadata(yaml)
            .map_err(|reason| Error::malformed(&source, reason))?;

        let document = Document {
            source,
            metadata,
            body: body.to_owned(),
        };
        for field in REQUIRED_FIELDS.iter() {
            document.required(field)?;
        }
        Ok(document)
    }

    /// Returns the scalar value for `key`, if any. Blank strings count as
    /// absent.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(FieldValue::Scalar(s)) if !s.trim().is_empty() => {
                Some(s.trim())
            }
            _ => None,
        }
    }

    /// Returns the scalar value for `key` or fails with
    /// [`Error::MissingRequiredField`].
    pub fn required(&self, key: &str) -> Result<&str> {
        self.scalar(key).ok_or_else(|| Error::MissingRequiredField {
            document: self.source.clone(),
            field: key.to_owned(),
        })
    }

    /// Returns the set of items for a list-valued field. Inline lists
    /// (`[a, b]`), block lists (one `- a` per line), and comma-separated
    /// scalars (`a, b`) all produce the same set. Each of `keys` is consulted
    /// so aliases like `category`/`categories` merge.
    pub fn list(&self, keys: &[&str]) -> BTreeSet<String> {
        let mut items = BTreeSet::new();
        for key in keys {
            match self.metadata.get(*key) {
                Some(FieldValue::List(values)) => items.extend(
                    values
                        .iter()
                        .map(|v| v.trim())
                        .filter(|v| !v.is_empty())
                        .map(str::to_owned),
                ),
                Some(FieldValue::Scalar(value)) => items.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_owned),
                ),
                None => {}
            }
        }
        items
    }

    /// Reports whether the document is a draft: either `published: false` or
    /// `draft: true`.
    pub fn is_draft(&self) -> bool {
        self.scalar("published") == Some("false")
            || self.scalar("draft") == Some("true")
    }
}

/// Returns the YAML text between the fences and the body after the closing
/// fence. The fences must occupy whole lines.
fn split_frontmatter(input: &str) -> std::result::Result<(&str, &str), String> {
    const FENCE: &str = "---";
    const ALT_END_FENCE: &str = "...";

    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut lines = input.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == FENCE => {}
        _ => return Err(format!("document must begin with `{}`", FENCE)),
    }

    let yaml_start = input.find('\n').map(|i| i + 1).unwrap_or(input.len());
    let mut offset = yaml_start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == FENCE || trimmed == ALT_END_FENCE {
            return Ok((&input[yaml_start..offset], &input[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(format!("missing closing `{}`", FENCE))
}

fn parse_metadata(
    yaml: &str,
) -> std::result::Result<BTreeMap<String, FieldValue>, String> {
    if yaml.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let mapping = match serde_yaml::from_str::<Yaml>(yaml) {
        Ok(Yaml::Mapping(mapping)) => mapping,
        Ok(Yaml::Null) => return Ok(BTreeMap::new()),
        Ok(_) => return Err("frontmatter must be a key-value mapping".to_owned()),
        Err(err) => return Err(format!("invalid frontmatter: {}", err)),
    };

    let mut metadata = BTreeMap::new();
    for (key, value) in mapping.iter() {
        let key = match key {
            Yaml::String(key) => key.clone(),
            other => {
                return Err(format!(
                    "frontmatter keys must be strings, found `{}`",
                    scalar_to_string(other).unwrap_or_else(|| "?".to_owned())
                ))
            }
        };
        let value = match value {
            Yaml::Null => continue,
            Yaml::Sequence(items) => FieldValue::List(
                items
                    .iter()
                    .filter(|item| !matches!(item, Yaml::Null))
                    .map(|item| {
                        scalar_to_string(item).ok_or_else(|| {
                            format!("field `{}` must be a list of strings", key)
                        })
                    })
                    .collect::<std::result::Result<_, _>>()?,
            ),
            other => FieldValue::Scalar(scalar_to_string(other).ok_or_else(|| {
                format!("field `{}` must be a string or a list of strings", key)
            })?),
        };
        metadata.insert(key, value);
    }
    Ok(metadata)
}

fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Represents the result of a [`Document`]-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Document`].
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the frontmatter fences are missing or unterminated, or
    /// when the frontmatter isn't a YAML mapping of strings and string lists.
    #[error("malformed document `{}`: {reason}", .document.display())]
    MalformedDocument { document: PathBuf, reason: String },

    /// Returned when `title` or `date` is missing from the frontmatter.
    #[error("document `{}` is missing required field `{field}`", .document.display())]
    MissingRequiredField { document: PathBuf, field: String },
}

impl Error {
    fn malformed(source: &Path, reason: String) -> Error {
        Error::MalformedDocument {
            document: source.to_owned(),
            reason,
        }
    }
}
