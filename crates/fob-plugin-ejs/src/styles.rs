//! Stylesheet inlining for templates
//!
//! Replaces every `<link rel="stylesheet" href="...">` tag in a template with a
//! `<style>` element holding the stylesheet's CSS.
//!
//! ## Architecture
//!
//! ```text
//! template text → scan <link> tags → resolve href → loader[ext] → <style>CSS</style>
//! ```
//!
//! Loaders are looked up by the lowercase extension of the resolved path:
//!
//! - `css` → file contents, verbatim
//! - `scss` / `sass` → compiled with grass; `@import`/`@use` resolve relative
//!   to the importing file, then against the configured load paths

use async_trait::async_trait;
use once_cell::sync::Lazy;
use path_clean::PathClean;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{EjsError, Result};

// Quoted attribute values may contain `>`, e.g. `href="<%= theme %>.css"`
static LINK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<link\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

/// Loads a stylesheet from disk and returns plain CSS
#[async_trait]
pub trait StyleLoader: Send + Sync + fmt::Debug {
    async fn load(&self, path: &Path) -> Result<String>;
}

/// Plain CSS, inlined byte for byte
#[derive(Debug, Clone, Copy, Default)]
pub struct CssLoader;

#[async_trait]
impl StyleLoader for CssLoader {
    async fn load(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| EjsError::StyleRead {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// SCSS and indented Sass, compiled with grass
#[derive(Debug, Clone, Default)]
pub struct ScssLoader {
    load_paths: Vec<PathBuf>,
}

impl ScssLoader {
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        Self { load_paths }
    }

    fn compile(path: &Path, load_paths: &[PathBuf]) -> Result<String> {
        let syntax = if path.extension().and_then(|s| s.to_str()) == Some("sass") {
            grass::InputSyntax::Sass
        } else {
            grass::InputSyntax::Scss
        };

        let options = grass::Options::default()
            .input_syntax(syntax)
            .style(grass::OutputStyle::Expanded)
            .load_paths(load_paths);

        grass::from_path(path, &options).map_err(|e| EjsError::StyleCompile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl StyleLoader for ScssLoader {
    async fn load(&self, path: &Path) -> Result<String> {
        let owned_path = path.to_path_buf();
        let load_paths = self.load_paths.clone();

        // grass reads imports synchronously
        tokio::task::spawn_blocking(move || Self::compile(&owned_path, &load_paths))
            .await
            .map_err(|e| EjsError::StyleCompile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
    }
}

/// A stylesheet referenced from a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleReference {
    /// Path of the template containing the link tag
    pub template: PathBuf,
    /// The raw `href` attribute value
    pub href: String,
}

impl StyleReference {
    /// Absolute (or cwd-relative) path of the stylesheet, normalized
    pub fn resolve(&self) -> PathBuf {
        let dir = match self.template.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        dir.join(&self.href).clean()
    }

    /// Lowercase extension used for loader dispatch
    pub fn extension(&self) -> String {
        self.resolve()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// What to do with one `<link>` tag
#[derive(Debug, PartialEq, Eq)]
enum LinkAction {
    /// Not a local stylesheet link
    Keep,
    /// Stylesheet link without an href
    Drop,
    /// Stylesheet link to inline
    Inline(String),
}

fn classify_link(tag: &str, template_tag: &str) -> LinkAction {
    // Template code decides the link at render time
    if tag.contains(template_tag) {
        return LinkAction::Keep;
    }

    // Skip the `<link` tag name
    let attributes = &tag[5..];

    let mut rel = None;
    let mut href = None;
    for caps in ATTRIBUTE.captures_iter(attributes) {
        let name = caps[1].to_ascii_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        match name.as_str() {
            "rel" => rel = Some(value.to_string()),
            "href" => href = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let is_stylesheet = rel
        .map(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("stylesheet"))
        })
        .unwrap_or(false);

    if !is_stylesheet {
        return LinkAction::Keep;
    }

    match href {
        None => LinkAction::Drop,
        Some(href) if href.is_empty() => LinkAction::Drop,
        Some(href) if is_remote(&href) => LinkAction::Keep,
        Some(href) => LinkAction::Inline(href),
    }
}

fn is_remote(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("//")
        || lower.starts_with("data:")
}

/// Replaces stylesheet links with inline `<style>` elements
#[derive(Debug, Clone)]
pub struct StyleInliner {
    loaders: FxHashMap<String, Arc<dyn StyleLoader>>,
    /// Opening template tag (`<%` by default); links containing it are kept
    template_tag: String,
}

impl StyleInliner {
    /// Create an inliner with the built-in CSS and Sass loaders
    pub fn new(load_paths: Vec<PathBuf>) -> Self {
        let scss: Arc<dyn StyleLoader> = Arc::new(ScssLoader::new(load_paths));
        let mut loaders: FxHashMap<String, Arc<dyn StyleLoader>> = FxHashMap::default();
        loaders.insert("css".to_string(), Arc::new(CssLoader));
        loaders.insert("scss".to_string(), scss.clone());
        loaders.insert("sass".to_string(), scss);
        Self {
            loaders,
            template_tag: "<%".to_string(),
        }
    }

    /// Set the opening template tag for custom delimiters
    pub fn with_template_tag(mut self, tag: impl Into<String>) -> Self {
        self.template_tag = tag.into();
        self
    }

    /// Register (or replace) the loader for an extension
    pub fn with_loader(mut self, extension: &str, loader: Arc<dyn StyleLoader>) -> Self {
        self.loaders.insert(extension.to_ascii_lowercase(), loader);
        self
    }

    /// Extensions with a registered loader
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }

    /// List the local stylesheets a template links to, in document order
    pub fn find_references(&self, source: &str, template: &Path) -> Vec<StyleReference> {
        LINK_TAG
            .find_iter(source)
            .filter_map(|m| match classify_link(m.as_str(), &self.template_tag) {
                LinkAction::Inline(href) => Some(StyleReference {
                    template: template.to_path_buf(),
                    href,
                }),
                _ => None,
            })
            .collect()
    }

    /// Inline every stylesheet link in `source`
    ///
    /// Scanning moves forward past each substitution, so inserted CSS is never
    /// rescanned and every tag is handled exactly once.
    pub async fn inline(&self, source: &str, template: &Path) -> Result<String> {
        let mut output = String::with_capacity(source.len());
        let mut cursor = 0;
        let mut inlined = 0usize;

        while let Some(m) = LINK_TAG.find_at(source, cursor) {
            output.push_str(&source[cursor..m.start()]);

            match classify_link(m.as_str(), &self.template_tag) {
                LinkAction::Keep => output.push_str(m.as_str()),
                LinkAction::Drop => {
                    trace!("[fob-ejs] Dropping stylesheet link without href in {}", template.display());
                }
                LinkAction::Inline(href) => {
                    let reference = StyleReference {
                        template: template.to_path_buf(),
                        href,
                    };
                    let css = self.load(&reference).await?;
                    output.push_str("<style>");
                    output.push_str(&css);
                    output.push_str("</style>");
                    inlined += 1;
                }
            }

            cursor = m.end();
        }
        output.push_str(&source[cursor..]);

        if inlined > 0 {
            debug!(
                "[fob-ejs] Inlined {} stylesheet(s) into {}",
                inlined,
                template.display()
            );
        }

        Ok(output)
    }

    async fn load(&self, reference: &StyleReference) -> Result<String> {
        let path = reference.resolve();
        let extension = reference.extension();

        let loader = self
            .loaders
            .get(&extension)
            .ok_or_else(|| {
                debug!(
                    "[fob-ejs] No loader for '.{}' (registered: {})",
                    extension,
                    self.extensions().join(", ")
                );
                EjsError::UnsupportedStyle {
                    extension: extension.clone(),
                    path: path.clone(),
                }
            })?;

        if let Err(source) = tokio::fs::metadata(&path).await {
            return Err(EjsError::StyleNotFound {
                template: reference.template.display().to_string(),
                href: reference.href.clone(),
                path,
                source,
            });
        }

        trace!("[fob-ejs] Loading stylesheet {} ({})", path.display(), extension);
        loader.load(&path).await
    }
}

impl Default for StyleInliner {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn classify(tag: &str) -> LinkAction {
        classify_link(tag, "<%")
    }

    #[test]
    fn test_classify_stylesheet_link() {
        assert_eq!(
            classify(r#"<link rel="stylesheet" href="a.css">"#),
            LinkAction::Inline("a.css".to_string())
        );
        // Attribute order and quoting do not matter
        assert_eq!(
            classify(r#"<LINK HREF='b.scss' REL=stylesheet />"#),
            LinkAction::Inline("b.scss".to_string())
        );
    }

    #[test]
    fn test_classify_non_stylesheet_link() {
        assert_eq!(
            classify(r#"<link rel="icon" href="favicon.ico">"#),
            LinkAction::Keep
        );
        assert_eq!(classify(r#"<link href="a.css">"#), LinkAction::Keep);
    }

    #[test]
    fn test_classify_empty_href() {
        assert_eq!(
            classify(r#"<link rel="stylesheet" href="">"#),
            LinkAction::Drop
        );
        assert_eq!(classify(r#"<link rel="stylesheet">"#), LinkAction::Drop);
    }

    #[test]
    fn test_classify_remote_href() {
        assert_eq!(
            classify(r#"<link rel="stylesheet" href="https://cdn.example.com/a.css">"#),
            LinkAction::Keep
        );
        assert_eq!(
            classify(r#"<link rel="stylesheet" href="//cdn.example.com/a.css">"#),
            LinkAction::Keep
        );
    }

    #[test]
    fn test_rel_token_list() {
        assert_eq!(
            classify(r#"<link rel="alternate stylesheet" href="alt.css">"#),
            LinkAction::Inline("alt.css".to_string())
        );
    }

    #[test]
    fn test_reference_resolution() {
        let reference = StyleReference {
            template: PathBuf::from("/site/views/page.ejs"),
            href: "../styles/./main.CSS".to_string(),
        };
        assert_eq!(reference.resolve(), PathBuf::from("/site/styles/main.CSS"));
        assert_eq!(reference.extension(), "css");
    }

    #[test]
    fn test_find_references() {
        let source = r#"<link rel="stylesheet" href="a.css"><link rel="icon" href="x.ico"><link rel="stylesheet" href="">"#;
        let refs = StyleInliner::default().find_references(source, Path::new("/t/page.ejs"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].href, "a.css");
    }

    #[test]
    fn test_link_tag_spans_quoted_gt() {
        let source = r#"<link rel="stylesheet" href="<%= theme %>.css"><p>x</p>"#;
        let tag = LINK_TAG.find(source).unwrap();
        assert_eq!(tag.as_str(), r#"<link rel="stylesheet" href="<%= theme %>.css">"#);
        assert_eq!(classify(tag.as_str()), LinkAction::Keep);
    }

    #[test]
    fn test_classify_custom_template_tag() {
        let tag = r#"<link rel="stylesheet" href="<?= theme ?>.css">"#;
        assert_eq!(classify_link(tag, "<?"), LinkAction::Keep);
        assert_eq!(
            classify_link(r#"<link rel="stylesheet" href="a.css">"#, "<?"),
            LinkAction::Inline("a.css".to_string())
        );
    }

    #[tokio::test]
    async fn test_inline_keeps_links_with_template_output() {
        let template = Path::new("/nowhere/page.ejs");
        let inliner = StyleInliner::default();

        let source = r#"<link rel="stylesheet" href="<%= theme %>.css"><p>x</p>"#;
        assert_eq!(inliner.inline(source, template).await.unwrap(), source);

        let source = r#"<link rel="stylesheet" <%- attrs %>><p>x</p>"#;
        assert_eq!(inliner.inline(source, template).await.unwrap(), source);
    }

    #[test]
    fn test_default_extensions() {
        assert_eq!(StyleInliner::default().extensions(), vec!["css", "sass", "scss"]);
    }

    #[tokio::test]
    async fn test_inline_css_verbatim() {
        let dir = TempDir::new().unwrap();
        let css = "body {\n  color: red;\n}\n";
        fs::write(dir.path().join("main.css"), css).unwrap();
        let template = dir.path().join("page.ejs");

        let out = StyleInliner::default()
            .inline(r#"<head><link rel="stylesheet" href="main.css"></head>"#, &template)
            .await
            .unwrap();

        assert_eq!(out, format!("<head><style>{}</style></head>", css));
    }

    #[tokio::test]
    async fn test_inline_empty_href_is_idempotent() {
        let template = Path::new("/nowhere/page.ejs");
        let inliner = StyleInliner::default();

        let once = inliner
            .inline(r#"<p>a</p><link rel="stylesheet" href=""><p>b</p>"#, template)
            .await
            .unwrap();
        assert_eq!(once, "<p>a</p><p>b</p>");

        let twice = inliner.inline(&once, template).await.unwrap();
        assert_eq!(twice, once);
    }

    #[tokio::test]
    async fn test_inline_missing_file() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("page.ejs");

        let err = StyleInliner::default()
            .inline(r#"<link rel="stylesheet" href="missing.css">"#, &template)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_inline_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("theme.less"), "@c: red;").unwrap();
        let template = dir.path().join("page.ejs");

        let err = StyleInliner::default()
            .inline(r#"<link rel="stylesheet" href="theme.less">"#, &template)
            .await
            .unwrap_err();

        match err {
            EjsError::UnsupportedStyle { extension, .. } => assert_eq!(extension, "less"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_inline_scss_with_nested_import() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("styles")).unwrap();
        fs::write(dir.path().join("styles/_vars.scss"), "$primary: #336699;").unwrap();
        fs::write(
            dir.path().join("styles/main.scss"),
            "@import 'vars';\n.nav { a { color: $primary; } }",
        )
        .unwrap();
        let template = dir.path().join("page.ejs");

        let out = StyleInliner::default()
            .inline(r#"<link rel="stylesheet" href="styles/main.scss">"#, &template)
            .await
            .unwrap();

        assert!(out.starts_with("<style>"));
        assert!(out.ends_with("</style>"));
        assert!(out.contains(".nav a"));
        assert!(out.contains("#336699"));
    }

    #[tokio::test]
    async fn test_inline_scss_compile_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.scss"), "body { color: $undefined; }").unwrap();
        let template = dir.path().join("page.ejs");

        let err = StyleInliner::default()
            .inline(r#"<link rel="stylesheet" href="broken.scss">"#, &template)
            .await
            .unwrap_err();

        assert!(matches!(err, EjsError::StyleCompile { .. }));
    }

    #[derive(Debug)]
    struct UpperLoader;

    #[async_trait]
    impl StyleLoader for UpperLoader {
        async fn load(&self, path: &Path) -> Result<String> {
            let text = tokio::fs::read_to_string(path).await.unwrap();
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_custom_loader() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.pcss"), "a{}").unwrap();
        let template = dir.path().join("page.ejs");

        let out = StyleInliner::default()
            .with_loader("PCSS", Arc::new(UpperLoader))
            .inline(r#"<link rel="stylesheet" href="x.pcss">"#, &template)
            .await
            .unwrap();

        assert_eq!(out, "<style>A{}</style>");
    }
}
