//! Build-time rendering
//!
//! Compiled templates are executed in an embedded JavaScript engine (Boa) with
//! the configured data, then optionally minified with minify-html. The engine
//! context lives only for the duration of one render call.

use boa_engine::{Context, Source};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{MinifierOptions, ResolvedCompilerOptions};
use crate::error::{EjsError, Result};
use crate::template::{is_identifier, CompiledTemplate, ESCAPE_FN, RETHROW_FN};

/// HTML comments, plus raw-text elements whose contents must not be touched
static COMMENT_OR_RAW_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<pre\b.*?</pre\s*>|<textarea\b.*?</textarea\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--(.*?)-->",
    )
    .unwrap()
});

/// Names that cannot be bound as template locals
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
    // generated function internals
    "__output", "__append", "__locals", "__line", "__lines", "__filename", "escapeFn",
    "include", "rethrow",
];

/// Top-level keys of `data` that can be bound as locals
///
/// Strict templates cannot use `with (locals)`, so when rendering at build
/// time the data's own keys are destructured instead. Keys that are not
/// plain identifiers, are reserved words, or shadow the locals object are
/// skipped and stay reachable through `locals`.
pub fn locals_from_data(data: &Value, options: &ResolvedCompilerOptions) -> Vec<String> {
    let Some(object) = data.as_object() else {
        return Vec::new();
    };

    object
        .keys()
        .filter(|key| is_identifier(key))
        .filter(|key| !RESERVED.contains(&key.as_str()))
        .filter(|key| **key != options.locals_name)
        .cloned()
        .collect()
}

/// Run a compiled template with `data` and return the produced string
pub(crate) fn execute(template: &CompiledTemplate, data: &Value) -> Result<String> {
    let data_literal = if data.is_null() {
        "{}".to_string()
    } else {
        data.to_string()
    };

    let script = format!(
        "(function () {{\n  var __escape = {};\n  var __rethrow = {};\n  var __template = ({});\n  try {{\n    return __template({}, __escape, undefined, __rethrow);\n  }} catch (e) {{\n    throw String(e);\n  }}\n}})()",
        ESCAPE_FN,
        RETHROW_FN,
        template.source(),
        data_literal
    );

    let mut context = Context::default();
    let value = context
        .eval(Source::from_bytes(script.as_bytes()))
        .map_err(|e| EjsError::render(template.filename(), e.to_string()))?;

    let rendered = value
        .to_string(&mut context)
        .map_err(|e| EjsError::render(template.filename(), e.to_string()))?
        .to_std_string_escaped();

    debug!(
        "[fob-ejs] Rendered {} ({} bytes)",
        template.filename(),
        rendered.len()
    );

    Ok(rendered)
}

/// Minify rendered HTML
///
/// minify-html always collapses whitespace, so it only runs when
/// `collapse_whitespace` is enabled. Without it, `remove_comments` is applied
/// on its own and CSS/JS minification is skipped with a warning.
pub fn minify(html: &str, options: &MinifierOptions, filename: &str) -> Result<String> {
    if !options.collapse_whitespace {
        return Ok(minify_without_collapse(html, options, filename));
    }

    let cfg = minify_html::Cfg {
        keep_comments: !options.remove_comments,
        keep_closing_tags: options.keep_closing_tags,
        keep_html_and_head_opening_tags: true,
        minify_css: options.minify_css,
        minify_js: options.minify_js,
        ..minify_html::Cfg::default()
    };

    let minified = minify_html::minify(html.as_bytes(), &cfg);
    let minified = String::from_utf8(minified).map_err(|e| EjsError::Minify {
        filename: filename.to_string(),
        message: e.to_string(),
    })?;

    debug!(
        "[fob-ejs] Minified {} ({} → {} bytes)",
        filename,
        html.len(),
        minified.len()
    );

    Ok(minified)
}

fn minify_without_collapse(html: &str, options: &MinifierOptions, filename: &str) -> String {
    let ignored: Vec<&str> = [
        (options.minify_css, "minifyCSS"),
        (options.minify_js, "minifyJS"),
    ]
    .into_iter()
    .filter_map(|(enabled, name)| enabled.then_some(name))
    .collect();

    if !ignored.is_empty() {
        warn!(
            "[fob-ejs] {} ignored for {}: requires collapseWhitespace",
            ignored.join(", "),
            filename
        );
    }

    if !options.remove_comments {
        return html.to_string();
    }

    let stripped = remove_comments(html);
    debug!(
        "[fob-ejs] Removed comments from {} ({} → {} bytes)",
        filename,
        html.len(),
        stripped.len()
    );
    stripped
}

/// Drop HTML comments outside `<pre>`, `<textarea>`, `<script>` and `<style>`
///
/// Conditional comments (`<!--[if IE]>`) and `<!--! ... -->` are kept.
fn remove_comments(html: &str) -> String {
    COMMENT_OR_RAW_TEXT
        .replace_all(html, |caps: &Captures| match caps.get(1) {
            Some(body) if !body.as_str().starts_with(['[', '!']) => String::new(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use serde_json::json;

    fn compile(template: &str, options: CompilerOptions) -> CompiledTemplate {
        CompiledTemplate::compile(template, "t.ejs", &options.resolve()).unwrap()
    }

    #[test]
    fn test_render_with_destructured_data() {
        let data = json!({ "test": "test" });
        let resolved = CompilerOptions::new().resolve();
        let options = CompilerOptions::new()
            .with_destructured_locals(locals_from_data(&data, &resolved));

        let html = compile("<div><%= test %></div>", options).render(&data).unwrap();
        assert_eq!(html, "<div>test</div>");
    }

    #[test]
    fn test_render_non_strict_with_block() {
        let html = compile("<p><%= name %></p>", CompilerOptions::new().with_strict(false))
            .render(&json!({ "name": "fob" }))
            .unwrap();
        assert_eq!(html, "<p>fob</p>");
    }

    #[test]
    fn test_render_escapes_output() {
        let html = compile("<%= locals.v %>|<%- locals.v %>", CompilerOptions::new())
            .render(&json!({ "v": "<a href=\"x\">&'</a>" }))
            .unwrap();
        assert_eq!(
            html,
            "&lt;a href=&#34;x&#34;&gt;&amp;&#39;&lt;/a&gt;|<a href=\"x\">&'</a>"
        );
    }

    #[test]
    fn test_render_control_flow() {
        let template = "<ul><% locals.items.forEach(function (item) { %><li><%= item %></li><% }) %></ul>";
        let html = compile(template, CompilerOptions::new())
            .render(&json!({ "items": ["a", "b"] }))
            .unwrap();
        assert_eq!(html, "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn test_render_null_data() {
        let html = compile("<p><%= typeof locals %></p>", CompilerOptions::new())
            .render(&Value::Null)
            .unwrap();
        assert_eq!(html, "<p>object</p>");
    }

    #[test]
    fn test_render_undefined_variable_fails() {
        let err = compile("<%= missing %>", CompilerOptions::new())
            .render(&json!({}))
            .unwrap_err();
        assert!(matches!(err, EjsError::Render { .. }));
    }

    #[test]
    fn test_render_error_with_compile_debug_has_location() {
        let err = compile(
            "line one\n<%= missing.value %>",
            CompilerOptions::new().with_compile_debug(true),
        )
        .render(&json!({}))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("t.ejs:2"), "got: {message}");
    }

    #[test]
    fn test_locals_from_data_filters_keys() {
        let data = json!({ "ok": 1, "not-valid": 2, "class": 3, "locals": 4, "escapeFn": 5 });
        let options = CompilerOptions::new().resolve();
        assert_eq!(locals_from_data(&data, &options), vec!["ok".to_string()]);
        assert!(locals_from_data(&json!([1, 2]), &options).is_empty());
    }

    #[test]
    fn test_minify_collapses_whitespace() {
        let html = "<div>\n  <p>a</p>\n  <p>b</p>\n</div>\n";
        let out = minify(
            html,
            &MinifierOptions::new().with_collapse_whitespace(true),
            "t.ejs",
        )
        .unwrap();
        assert!(out.contains("<p>a</p><p>b</p>"), "got: {out}");
        assert!(!out.contains('\n'));
        assert!(!out.contains("> <"));
    }

    #[test]
    fn test_remove_comments_without_collapse() {
        let html = "<div>\n  <!-- note -->\n  <p>a</p>\n</div>";
        let out = minify(
            html,
            &MinifierOptions::new().with_remove_comments(true),
            "t.ejs",
        )
        .unwrap();
        assert_eq!(out, "<div>\n  \n  <p>a</p>\n</div>");
    }

    #[test]
    fn test_remove_comments_skips_raw_text_and_conditionals() {
        let html = "<pre><!-- kept --></pre><script>var s = '<!-- kept -->';</script><!--[if IE]><p>ie</p><![endif]--><!-- gone -->";
        let out = remove_comments(html);
        assert_eq!(
            out,
            "<pre><!-- kept --></pre><script>var s = '<!-- kept -->';</script><!--[if IE]><p>ie</p><![endif]-->"
        );
    }

    #[test]
    fn test_minify_css_without_collapse_leaves_html() {
        let html = "<style>a { color: red; }</style>\n<p>a</p>";
        let out = minify(html, &MinifierOptions::new().with_minify_css(true), "t.ejs").unwrap();
        assert_eq!(out, html);
    }

    #[test]
    fn test_minify_disabled_keeps_whitespace() {
        let html = "<div>\n  <p>a</p>\n</div>";
        let out = minify(html, &MinifierOptions::new(), "t.ejs").unwrap();
        assert_eq!(out, html);
    }
}
