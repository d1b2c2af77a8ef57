//! The library code for the `folio` static site generator. The architecture
//! can be generally broken down into a parallel phase and a sequential one:
//!
//! 1. Reading each markdown source file, splitting it into front matter and
//!    body ([`crate::document`]), and building a [`post::Post`] from it
//!    ([`crate::post`]). Documents are independent, so this runs on a worker
//!    pool.
//! 2. Once every post is built, checking slugs for uniqueness, indexing the
//!    posts by date, tag, and category ([`crate::index`]), rendering post and
//!    listing pages ([`crate::render`], [`crate::value`]) plus the Atom feed
//!    ([`crate::feed`]), and writing the result ([`crate::write`]).
//!
//! Of the two, the second step is the more involved. The main index is
//! paginated by the configured page size, while each tag and category gets a
//! single listing page holding all of its posts. Every page is rendered with
//! an explicit context: there is no state shared between templates, so the
//! same inputs always produce the same site.
//!
//! The output directory is replaced only when every page was rendered and
//! written; any error leaves the previous site in place.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod document;
pub mod excerpt;
pub mod feed;
pub mod index;
pub mod markdown;
pub mod page;
pub mod permalink;
pub mod post;
pub mod render;
pub mod tag;
pub mod value;
pub mod write;
