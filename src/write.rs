//! Writes rendered pages to disk. The whole tree is written into a staging
//! directory beside the output directory and swapped into place only once
//! every file was written, so a failed or cancelled run never leaves a
//! partially written site behind.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::build::Cancellation;
use crate::page::RenderedPage;

/// Responsible for writing a set of [`RenderedPage`]s as the new output tree.
pub struct Writer<'a> {
    /// The directory that holds the site once the write completes. Its
    /// previous contents are replaced wholesale.
    pub output_directory: &'a Path,

    /// Checked between files; a cancelled write is rolled back.
    pub cancellation: &'a Cancellation,
}

impl Writer<'_> {
    /// Writes `pages` to a staging directory and then swaps it in for the
    /// output directory. On any error, the staging directory is removed and
    /// the previous output directory is left untouched.
    pub fn write_pages(&self, pages: &[RenderedPage]) -> Result<()> {
        let (staging, backup) = self.sibling_paths()?;
        remove_if_exists(&staging)?;
        remove_if_exists(&backup)?;

        let written = self
            .write_staging(&staging, pages)
            .and_then(|_| self.swap(&staging, &backup));
        if written.is_err() {
            // The original error is more useful than any cleanup failure.
            let _ = fs::remove_dir_all(&staging);
        }
        written
    }

    fn write_staging(&self, staging: &Path, pages: &[RenderedPage]) -> Result<()> {
        create_dir_all(staging)?;
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();
        for page in pages {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let path = staging.join(&page.path);
            if let Some(dir) = path.parent() {
                if seen_dirs.insert(dir.to_owned()) {
                    create_dir_all(dir)?;
                }
            }
            fs::write(&path, &page.markup).map_err(|err| Error::Io {
                path: path.clone(),
                err,
            })?;
            debug!(path = %page.path.display(), "Wrote page");
        }
        Ok(())
    }

    fn swap(&self, staging: &Path, backup: &Path) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let output = self.output_directory;
        let had_output = output.exists();
        if had_output {
            rename(output, backup)?;
        }
        if let Err(err) = rename(staging, output) {
            if had_output {
                let _ = fs::rename(backup, output);
            }
            return Err(err);
        }
        if had_output {
            fs::remove_dir_all(backup).map_err(|err| Error::Io {
                path: backup.to_owned(),
                err,
            })?;
        }
        Ok(())
    }

    /// The staging and backup directories live next to the output directory
    /// so the final renames stay on one filesystem.
    fn sibling_paths(&self) -> Result<(PathBuf, PathBuf)> {
        let output = self.output_directory;
        let name = output
            .file_name()
            .ok_or_else(|| Error::InvalidOutputDirectory {
                path: output.to_owned(),
            })?
            .to_string_lossy();
        let parent = output
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok((
            parent.join(format!(".{}.staging", name)),
            parent.join(format!(".{}.old", name)),
        ))
    }
}

fn create_dir_all(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| Error::Io {
        path: dir.to_owned(),
        err,
    })
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|err| Error::Io {
        path: from.to_owned(),
        err,
    })
}

fn remove_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::Io {
            path: dir.to_owned(),
            err,
        }),
    }
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned for I/O problems creating, writing, or moving output files.
    #[error("writing `{}`: {err}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when the output directory has no final path component (e.g.,
    /// `/` or `..`).
    #[error("`{}` can't be used as the output directory", .path.display())]
    InvalidOutputDirectory { path: PathBuf },

    /// Returned when the write was cancelled before it completed.
    #[error("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod test {
    use super::*;

    fn page(path: &str, markup: &str) -> RenderedPage {
        RenderedPage {
            path: PathBuf::from(path),
            markup: markup.to_owned(),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_write_replaces_previous_output() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("public");
        fs::create_dir_all(output.join("stale")).unwrap();
        fs::write(output.join("stale").join("index.html"), "old").unwrap();

        let cancellation = Cancellation::new();
        let writer = Writer {
            output_directory: &output,
            cancellation: &cancellation,
        };
        writer.write_pages(&[
            page("index.html", "root"),
            page("2021/04/16/hello/index.html", "hello"),
        ])?;

        assert_eq!("root", fs::read_to_string(output.join("index.html")).unwrap());
        assert_eq!(
            "hello",
            fs::read_to_string(output.join("2021/04/16/hello/index.html")).unwrap()
        );
        assert!(!output.join("stale").exists());
        assert_eq!(vec!["public"], entries(dir.path()));
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("public");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("index.html"), "old").unwrap();

        let cancellation = Cancellation::new();
        let writer = Writer {
            output_directory: &output,
            cancellation: &cancellation,
        };
        // The second page needs `a/index.html` to be a directory.
        let result = writer.write_pages(&[
            page("a/index.html", "a"),
            page("a/index.html/b/index.html", "b"),
        ]);

        assert!(matches!(result, Err(Error::Io { .. })));
        assert_eq!("old", fs::read_to_string(output.join("index.html")).unwrap());
        assert_eq!(vec!["public"], entries(dir.path()));
    }

    #[test]
    fn test_cancelled_write_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("public");
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let writer = Writer {
            output_directory: &output,
            cancellation: &cancellation,
        };

        let result = writer.write_pages(&[page("index.html", "root")]);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!output.exists());
        assert!(entries(dir.path()).is_empty());
    }
}
