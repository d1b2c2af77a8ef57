//! The template renderer. Layouts are [`gtmpl`] (Go `text/template`)
//! templates registered by name; rendering binds an explicit [`Context`] to a
//! layout. Nothing outside the context reaches the template.
//!
//! Objects in a [`Value`] are hash maps with a per-process random key order,
//! which `range` and printing expose. Every page is therefore rendered a second
//! time with each object's keys in a different order, and a layout whose output
//! changes is rejected with [`Error::OrderDependent`]. Collections meant to be
//! iterated are passed as arrays.

use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use gtmpl::{Template, Value};
use thiserror::Error;

/// The layout for post pages.
pub const POST_LAYOUT: &str = "post";

/// The layout for index, tag, and category pages.
pub const LISTING_LAYOUT: &str = "listing";

/// Returns the fields a layout requires when the theme doesn't list them.
/// Every other documented field is optional and always filled in (with a
/// default if need be) by [`crate::value`].
pub fn default_required_fields(layout: &str) -> Vec<String> {
    let fields: &[&str] = match layout {
        POST_LAYOUT => &["site", "title", "date", "url", "body"],
        LISTING_LAYOUT => &["site", "title", "items", "page"],
        _ => &["site"],
    };
    fields.iter().map(|f| f.to_string()).collect()
}

/// The values a layout is rendered with. Keys are the top-level fields
/// available to the template (e.g., `{{.title}}`).
#[derive(Clone, Default)]
pub struct Context {
    fields: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Like [`Context::insert`], but chainable.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Context {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Converts the context into the object the template sees as `.`.
    fn to_value(&self) -> Value {
        let m: HashMap<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(m)
    }
}

struct Layout {
    template: Template,
    required: Vec<String>,
}

/// A registry of named layouts.
#[derive(Default)]
pub struct Renderer {
    layouts: BTreeMap<String, Layout>,
}

impl Renderer {
    pub fn new() -> Renderer {
        Renderer::default()
    }

    /// Registers a layout from template source. `required` lists the context
    /// fields the layout can't do without.
    pub fn register(&mut self, name: &str, source: &str, required: Vec<String>) -> Result<()> {
        let mut template = Template::default();
        template
            .parse(source)
            .map_err(|err| Error::ParseTemplate {
                layout: name.to_owned(),
                message: err.to_string(),
            })?;
        self.layouts
            .insert(name.to_owned(), Layout { template, required });
        Ok(())
    }

    /// Loads the template file contents, concatenates them (so one file can
    /// `define` blocks another uses), and registers the result under `name`.
    pub fn load<P: AsRef<Path>>(
        &mut self,
        name: &str,
        template_files: impl IntoIterator<Item = P>,
        required: Vec<String>,
    ) -> Result<()> {
        let mut contents = String::new();
        for template_file in template_files {
            let template_file = template_file.as_ref();
            File::open(template_file)
                .and_then(|mut file| file.read_to_string(&mut contents))
                .map_err(|err| Error::LoadTemplate {
                    path: template_file.to_owned(),
                    err,
                })?;
            contents.push(' ');
        }
        self.register(name, &contents, required)
    }

    pub fn has_layout(&self, name: &str) -> bool {
        self.layouts.contains_key(name)
    }

    /// Renders `context` with the layout registered as `layout`.
    pub fn render(&self, layout: &str, context: &Context) -> Result<String> {
        let definition = self.layouts.get(layout).ok_or_else(|| Error::UnknownLayout {
            layout: layout.to_owned(),
        })?;

        for field in &definition.required {
            match context.get(field) {
                None | Some(Value::Nil) | Some(Value::NoValue) => {
                    return Err(Error::MissingContextField {
                        layout: layout.to_owned(),
                        field: field.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let value = context.to_value();
        let markup = definition.execute(layout, value.clone())?;
        if markup != definition.execute(layout, reorder(&value))? {
            return Err(Error::OrderDependent {
                layout: layout.to_owned(),
            });
        }
        Ok(markup)
    }
}

impl Layout {
    fn execute(&self, layout: &str, value: Value) -> Result<String> {
        let context = gtmpl::Context::from(value)
            .map_err(|err| execution_error(layout, err.to_string()))?;
        let mut out: Vec<u8> = Vec::new();
        self.template
            .execute(&mut out, &context)
            .map_err(|err| execution_error(layout, err.to_string()))?;
        String::from_utf8(out).map_err(|err| Error::Template {
            layout: layout.to_owned(),
            message: err.to_string(),
        })
    }
}

/// A field lookup on an object without that key fails with `no field <name>
/// for <object>`; everything else is a generic template error.
fn execution_error(layout: &str, message: String) -> Error {
    let field = message
        .find(MISSING_FIELD)
        .and_then(|i| message[i + MISSING_FIELD.len()..].split_whitespace().next());
    match field {
        Some(field) => Error::MissingContextField {
            layout: layout.to_owned(),
            field: field.to_owned(),
        },
        None => Error::Template {
            layout: layout.to_owned(),
            message,
        },
    }
}

const MISSING_FIELD: &str = "no field ";

/// How many fresh hashers [`reorder_map`] tries before giving up on finding a
/// different key order.
const REORDER_ATTEMPTS: usize = 64;

/// Copies `value`, rebuilding every object so that its iteration order differs
/// from the original's whenever it has two or more keys.
fn reorder(value: &Value) -> Value {
    match value {
        Value::Object(m) => Value::Object(reorder_map(m)),
        Value::Map(m) => Value::Map(reorder_map(m)),
        Value::Array(items) => Value::Array(items.iter().map(reorder).collect()),
        other => other.clone(),
    }
}

fn reorder_map(m: &HashMap<String, Value>) -> HashMap<String, Value> {
    let entries: Vec<(String, Value)> = m.iter().map(|(k, v)| (k.clone(), reorder(v))).collect();
    let mut attempts = 0;
    loop {
        let mut out = HashMap::with_capacity_and_hasher(entries.len(), RandomState::new());
        out.extend(entries.iter().cloned());
        attempts += 1;
        if entries.len() < 2 || attempts == REORDER_ATTEMPTS || !out.keys().eq(m.keys()) {
            return out;
        }
    }
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error registering or rendering a layout.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when no layout is registered under the requested name.
    #[error("unknown layout `{layout}`")]
    UnknownLayout { layout: String },

    /// Returned when the context lacks a field the layout requires or
    /// references.
    #[error("layout `{layout}` requires context field `{field}`")]
    MissingContextField { layout: String, field: String },

    /// Returned when the layout's output depends on the iteration order of an
    /// object (e.g., `range` over an object, or printing one whole).
    #[error("layout `{layout}` output depends on object key order; iterate arrays instead")]
    OrderDependent { layout: String },

    /// Returned for errors during template execution.
    #[error("executing layout `{layout}`: {message}")]
    Template { layout: String, message: String },

    /// Returned for errors parsing template source.
    #[error("parsing layout `{layout}`: {message}")]
    ParseTemplate { layout: String, message: String },

    /// Returned for I/O problems while reading template files.
    #[error("reading template file `{}`: {err}", .path.display())]
    LoadTemplate {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    fn renderer() -> Renderer {
        let mut renderer = Renderer::new();
        renderer
            .register(
                POST_LAYOUT,
                "<h1>{{.title}}</h1><img src=\"{{.image}}\">{{range .tags}}<a href=\"{{.url}}\">{{.label}}</a>{{end}}",
                default_required_fields(POST_LAYOUT),
            )
            .unwrap();
        renderer
    }

    fn tag(label: &str, url: &str) -> Value {
        let mut m = HashMap::new();
        m.insert("label".to_owned(), Value::String(label.to_owned()));
        m.insert("url".to_owned(), Value::String(url.to_owned()));
        Value::Object(m)
    }

    fn context() -> Context {
        Context::new()
            .with("site", Value::Object(HashMap::new()))
            .with("title", Value::String("Hello".to_owned()))
            .with("date", Value::String("April 16, 2021".to_owned()))
            .with("url", Value::String("https://example.com/hello/".to_owned()))
            .with("body", Value::String("<p>Hi</p>".to_owned()))
            .with("image", Value::String("/default.png".to_owned()))
            .with(
                "tags",
                Value::Array(vec![tag("Rust", "/tag/rust/"), tag("Web", "/tag/web/")]),
            )
    }

    #[test]
    fn test_render() -> Result<()> {
        assert_eq!(
            "<h1>Hello</h1><img src=\"/default.png\"><a href=\"/tag/rust/\">Rust</a><a href=\"/tag/web/\">Web</a>",
            renderer().render(POST_LAYOUT, &context())?
        );
        Ok(())
    }

    #[test]
    fn test_render_is_deterministic() -> Result<()> {
        let renderer = renderer();
        // Independently built contexts hash their objects differently.
        assert_eq!(
            renderer.render(POST_LAYOUT, &context())?,
            renderer.render(POST_LAYOUT, &context())?
        );
        Ok(())
    }

    #[test]
    fn test_range_over_object_is_rejected() {
        let mut renderer = Renderer::new();
        renderer
            .register("keys", "{{range $k, $v := .site}}{{$k}},{{end}}", vec![])
            .unwrap();
        let mut site = HashMap::new();
        for key in &["title", "url", "description", "author", "build_time"] {
            site.insert(key.to_string(), Value::String(key.to_string()));
        }
        let context = Context::new().with("site", Value::Object(site));

        for _ in 0..5 {
            match renderer.render("keys", &context) {
                Err(Error::OrderDependent { layout }) => assert_eq!("keys", layout),
                other => panic!("expected OrderDependent, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_printing_object_is_rejected() {
        let mut renderer = Renderer::new();
        renderer.register("dump", "{{.tag}}", vec![]).unwrap();
        let context = Context::new().with("tag", tag("Rust", "/tag/rust/"));
        assert!(matches!(
            renderer.render("dump", &context),
            Err(Error::OrderDependent { .. })
        ));
    }

    #[test]
    fn test_range_over_array_of_objects_is_accepted() -> Result<()> {
        let mut renderer = Renderer::new();
        renderer.register("tags", "{{range .tags}}{{.label}}={{.url}};{{end}}", vec![])?;
        let context = Context::new().with(
            "tags",
            Value::Array(vec![tag("Rust", "/tag/rust/"), tag("Web", "/tag/web/")]),
        );
        assert_eq!(
            "Rust=/tag/rust/;Web=/tag/web/;",
            renderer.render("tags", &context)?
        );
        Ok(())
    }

    #[test]
    fn test_referenced_field_missing_from_context() {
        let mut renderer = Renderer::new();
        renderer
            .register(POST_LAYOUT, "[{{.title}}][{{.hero}}]", vec!["title".to_owned()])
            .unwrap();
        let context = Context::new().with("title", Value::String("T".to_owned()));
        match renderer.render(POST_LAYOUT, &context) {
            Err(Error::MissingContextField { layout, field }) => {
                assert_eq!(POST_LAYOUT, layout);
                assert_eq!("hero", field);
            }
            other => panic!("expected MissingContextField, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_layout() {
        match renderer().render("gallery", &context()) {
            Err(Error::UnknownLayout { layout }) => assert_eq!("gallery", layout),
            other => panic!("expected UnknownLayout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_required_field() {
        let mut context = context();
        context.insert("body", Value::Nil);
        match renderer().render(POST_LAYOUT, &context) {
            Err(Error::MissingContextField { layout, field }) => {
                assert_eq!(POST_LAYOUT, layout);
                assert_eq!("body", field);
            }
            other => panic!("expected MissingContextField, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_optional_fields_are_not_required() -> Result<()> {
        let mut renderer = Renderer::new();
        renderer.register("minimal", "{{.title}}", vec!["title".to_owned()])?;
        let context = Context::new().with("title", Value::String("T".to_owned()));
        assert_eq!("T", renderer.render("minimal", &context)?);
        Ok(())
    }

    #[test]
    fn test_load_concatenates_files() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.html");
        let page = dir.path().join("page.html");
        std::fs::write(&base, "{{define \"header\"}}<header>{{.title}}</header>{{end}}").unwrap();
        std::fs::write(&page, "{{template \"header\" .}}<main>{{.body}}</main>").unwrap();

        let mut renderer = Renderer::new();
        renderer.load("page", &[&base, &page], vec![])?;
        let out = renderer.render(
            "page",
            &Context::new()
                .with("title", Value::String("T".to_owned()))
                .with("body", Value::String("B".to_owned())),
        )?;
        assert_eq!("<header>T</header><main>B</main>", out.trim());
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let mut renderer = Renderer::new();
        assert!(matches!(
            renderer.load("page", &["/definitely/not/here.html"], vec![]),
            Err(Error::LoadTemplate { .. })
        ));
    }
}
