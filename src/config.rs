use crate::excerpt::ExcerptConfig;
use crate::permalink::Permalink;
use anyhow::{anyhow, bail, Context, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file searched for in the project directory and
/// its ancestors.
pub const PROJECT_FILE: &str = "folio.yaml";

/// The name of the theme file inside the theme directory.
pub const THEME_FILE: &str = "theme.yaml";

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

#[derive(Deserialize)]
struct FeedSize(usize);
impl Default for FeedSize {
    fn default() -> Self {
        FeedSize(20)
    }
}

fn default_posts_directory() -> PathBuf {
    PathBuf::from("posts")
}

fn default_theme_directory() -> PathBuf {
    PathBuf::from("theme")
}

fn default_date_format() -> String {
    String::from("%B %-d, %Y")
}

/// Site-wide values made available to every template as `site`.
#[derive(Clone, Debug, Deserialize)]
pub struct Site {
    pub title: String,

    /// The base URL of the site. Always ends in a slash once loaded.
    pub url: Url,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct Project {
    site: Site,

    #[serde(default = "default_posts_directory")]
    posts_directory: PathBuf,

    #[serde(default = "default_theme_directory")]
    theme_directory: PathBuf,

    #[serde(default)]
    page_size: PageSize,

    #[serde(default)]
    permalink: Permalink,

    #[serde(default)]
    excerpt: ExcerptConfig,

    #[serde(default = "default_date_format")]
    date_format: String,

    #[serde(default)]
    timezone: Option<String>,

    #[serde(default)]
    heading_offset: u32,

    #[serde(default)]
    default_image: Option<String>,

    #[serde(default)]
    include_drafts: bool,

    #[serde(default)]
    feed_size: FeedSize,
}

#[derive(Deserialize)]
struct Theme {
    layouts: BTreeMap<String, ThemeLayout>,
}

#[derive(Deserialize)]
struct ThemeLayout {
    templates: Vec<PathBuf>,

    #[serde(default)]
    required: Option<Vec<String>>,
}

/// A layout as declared by the theme: the template files to concatenate and
/// the context fields the layout requires.
#[derive(Clone, Debug)]
pub struct Layout {
    pub name: String,
    pub templates: Vec<PathBuf>,

    /// `None` means the renderer's defaults for the layout name apply.
    pub required: Option<Vec<String>>,
}

/// The resolved configuration for one build.
#[derive(Clone, Debug)]
pub struct Config {
    pub site: Site,
    pub posts_source_directory: PathBuf,
    pub output_directory: PathBuf,
    pub layouts: Vec<Layout>,
    pub page_size: usize,
    pub permalink: Permalink,
    pub excerpt: ExcerptConfig,
    pub date_format: String,
    pub timezone: FixedOffset,
    pub heading_offset: u32,

    /// Substituted for posts without an `image`.
    pub default_image: Option<Url>,

    pub include_drafts: bool,

    /// The number of posts in the Atom feed.
    pub feed_size: usize,

    /// The number of parse/build workers; `None` lets the pool decide.
    pub threads: Option<usize>,
}

impl Config {
    /// Searches `dir` and then each of its ancestors for the project file and
    /// loads the first one found.
    pub fn from_directory(
        dir: &Path,
        output_directory: &Path,
        threads: Option<usize>,
    ) -> Result<Config> {
        for dir in dir.ancestors() {
            let path = dir.join(PROJECT_FILE);
            if path.exists() {
                return Config::from_project_file(&path, output_directory, threads)
                    .with_context(|| format!("Loading configuration `{}`", path.display()));
            }
        }
        Err(anyhow!(
            "Could not find `{}` in `{}` or any parent directory",
            PROJECT_FILE,
            dir.display()
        ))
    }

    pub fn from_project_file(
        path: &Path,
        output_directory: &Path,
        threads: Option<usize>,
    ) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)
            .with_context(|| format!("Parsing project file `{}`", path.display()))?;
        let project_root = path.parent().ok_or_else(|| {
            anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )
        })?;

        let theme_dir = project_root.join(&project.theme_directory);
        let theme_path = theme_dir.join(THEME_FILE);
        let theme: Theme = serde_yaml::from_reader(open(&theme_path, "theme")?)
            .with_context(|| format!("Parsing theme file `{}`", theme_path.display()))?;

        if project.page_size.0 == 0 {
            bail!("`page_size` must be at least 1");
        }
        if StrftimeItems::new(&project.date_format).any(|item| matches!(item, Item::Error)) {
            bail!("`date_format` is not a valid format: `{}`", project.date_format);
        }
        let timezone = match &project.timezone {
            None => utc(),
            Some(tz) => parse_offset(tz)
                .ok_or_else(|| anyhow!("`timezone` must look like `+08:00`, got `{}`", tz))?,
        };

        let mut site = project.site;
        if !site.url.path().ends_with('/') {
            let path = format!("{}/", site.url.path());
            site.url.set_path(&path);
        }
        let default_image = match &project.default_image {
            None => None,
            Some(image) => Some(
                site.url
                    .join(image)
                    .with_context(|| format!("Resolving `default_image` `{}`", image))?,
            ),
        };

        Ok(Config {
            posts_source_directory: project_root.join(&project.posts_directory),
            output_directory: output_directory.to_owned(),
            layouts: theme
                .layouts
                .into_iter()
                .map(|(name, layout)| Layout {
                    name,
                    templates: layout
                        .templates
                        .iter()
                        .map(|relpath| theme_dir.join(relpath))
                        .collect(),
                    required: layout.required,
                })
                .collect(),
            page_size: project.page_size.0,
            permalink: project.permalink,
            excerpt: project.excerpt,
            date_format: project.date_format,
            timezone,
            heading_offset: project.heading_offset,
            default_image,
            include_drafts: project.include_drafts,
            feed_size: project.feed_size.0,
            threads,
            site,
        })
    }
}

fn open(path: &Path, kind: &str) -> Result<File> {
    File::open(path).with_context(|| format!("Opening {} file `{}`", kind, path.display()))
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parses `Z`, `UTC`, or an offset like `+08:00` or `+0800`.
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Some(utc());
    }
    s.parse::<FixedOffset>().ok()
}
