//! JavaScript generation for scanned templates
//!
//! The output is the source of a single function,
//! `function anonymous(locals, escapeFn, include, rethrow)`, that appends every
//! node to an output string and returns it.

use super::scanner::{Node, Spanned};
use super::is_identifier;
use crate::config::ResolvedCompilerOptions;
use crate::error::{EjsError, Result};

/// HTML escaping used by `<%= %>`
pub(crate) const ESCAPE_FN: &str = r#"function (markup) {
  return markup == undefined
    ? ''
    : String(markup).replace(/[&<>'"]/g, function (c) {
      return { '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&#34;', "'": '&#39;' }[c] || c;
    });
}"#;

/// Annotates a runtime error with the template location
pub(crate) const RETHROW_FN: &str = r#"function (err, str, flnm, lineno, esc) {
  var lines = str.split('\n');
  var start = Math.max(lineno - 3, 0);
  var end = Math.min(lines.length, lineno + 3);
  var filename = esc(flnm);
  var context = lines.slice(start, end).map(function (line, i) {
    var curr = i + start + 1;
    return (curr == lineno ? ' >> ' : '    ') + curr + '| ' + line;
  }).join('\n');
  err.path = filename;
  err.message = (filename || 'ejs') + ':' + lineno + '\n' + context + '\n\n' + err.message;
  throw err;
}"#;

/// Generate the complete function source
pub(crate) fn generate(
    nodes: &[Spanned],
    options: &ResolvedCompilerOptions,
    template: &str,
    filename: &str,
) -> Result<String> {
    let locals = &options.locals_name;
    if !is_identifier(locals) {
        return Err(EjsError::invalid_option(
            "locals_name",
            format!("'{}' is not a valid JS identifier", locals),
        ));
    }

    let mut prepended =
        String::from("var __output = \"\";\n  function __append(s) { if (s !== undefined && s !== null) __output += s }\n");
    let mut appended = String::new();

    if let Some(name) = &options.output_function_name {
        if !is_identifier(name) {
            return Err(EjsError::invalid_option(
                "output_function_name",
                format!("'{}' is not a valid JS identifier", name),
            ));
        }
        prepended.push_str(&format!("  var {} = __append;\n", name));
    }

    if let Some(names) = options.destructured_locals.as_deref().filter(|n| !n.is_empty()) {
        let mut destructuring = format!("  var __locals = ({} || {{}}),\n", locals);
        for (index, name) in names.iter().enumerate() {
            if !is_identifier(name) {
                return Err(EjsError::invalid_option(
                    "destructured_locals",
                    format!("'{}' is not a valid JS identifier", name),
                ));
            }
            if index > 0 {
                destructuring.push_str(",\n");
            }
            destructuring.push_str(&format!("    {} = __locals.{}", name, name));
        }
        destructuring.push_str(";\n");
        prepended.push_str(&destructuring);
    }

    if options.uses_with() {
        prepended.push_str(&format!("  with ({} || {{}}) {{\n", locals));
        appended.push_str("  }\n");
    }
    appended.push_str("  return __output;\n");

    let mut body = prepended;
    body.push_str(&generate_nodes(nodes, options.compile_debug));
    body.push_str(&appended);

    let mut src = if options.compile_debug {
        let filename = if filename.is_empty() {
            "undefined".to_string()
        } else {
            json_string(filename)
        };
        format!(
            "var __line = 1\n  , __lines = {}\n  , __filename = {};\ntry {{\n{}}} catch (e) {{\n  rethrow(e, __lines, __filename, __line, escapeFn);\n}}\n",
            json_string(template),
            filename,
            body
        )
    } else {
        body
    };

    if options.client {
        src = format!("escapeFn = escapeFn || {};\n{}", ESCAPE_FN, src);
        if options.compile_debug {
            src = format!("rethrow = rethrow || {};\n{}", RETHROW_FN, src);
        }
    }

    if options.strict {
        src = format!("\"use strict\";\n{}", src);
    }

    Ok(format!(
        "function anonymous({}, escapeFn, include, rethrow\n) {{\n{}\n}}",
        locals, src
    ))
}

fn generate_nodes(nodes: &[Spanned], compile_debug: bool) -> String {
    let mut out = String::new();
    let mut current_line = 1;

    for spanned in nodes {
        if compile_debug && spanned.line != current_line {
            current_line = spanned.line;
            out.push_str(&format!("    ; __line = {}\n", current_line));
        }

        match &spanned.node {
            Node::Text(text) => {
                out.push_str(&format!("    ; __append(\"{}\")\n", escape_text(text)));
            }
            Node::Scriptlet(code) => {
                out.push_str(&format!("    ; {}\n", code));
            }
            Node::Escaped(expr) => {
                out.push_str(&format!("    ; __append(escapeFn({}))\n", expr));
            }
            Node::Raw(expr) => {
                out.push_str(&format!("    ; __append({})\n", expr));
            }
        }
    }

    out
}

/// Escape text for a double-quoted JS string literal
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '"' => escaped.push_str("\\\""),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::template::scanner::scan;

    fn generate_with(template: &str, options: CompilerOptions) -> String {
        let resolved = options.resolve();
        let nodes = scan(template, &resolved, "t.ejs").unwrap();
        generate(&nodes, &resolved, template, "t.ejs").unwrap()
    }

    #[test]
    fn test_signature_and_strict_prologue() {
        let src = generate_with("<p>hi</p>", CompilerOptions::new());
        assert!(src.starts_with("function anonymous(locals, escapeFn, include, rethrow\n) {\n\"use strict\";\n"));
        assert!(src.ends_with("\n}"));
        assert!(!src.contains("with ("));
        assert!(src.contains("; __append(\"<p>hi</p>\")"));
    }

    #[test]
    fn test_client_mode_embeds_escape() {
        let src = generate_with("x", CompilerOptions::new());
        assert!(src.contains("escapeFn = escapeFn || function (markup)"));

        let src = generate_with("x", CompilerOptions::new().with_client(false));
        assert!(!src.contains("escapeFn = escapeFn ||"));
    }

    #[test]
    fn test_non_strict_uses_with() {
        let src = generate_with("<%= a %>", CompilerOptions::new().with_strict(false));
        assert!(!src.contains("\"use strict\""));
        assert!(src.contains("with (locals || {}) {"));
        assert!(src.contains("; __append(escapeFn( a ))"));
    }

    #[test]
    fn test_text_escaping() {
        let src = generate_with("a \"b\"\\c\nd", CompilerOptions::new());
        assert!(src.contains(r#"; __append("a \"b\"\\c\nd")"#));
    }

    #[test]
    fn test_destructured_locals() {
        let src = generate_with(
            "<%= a %>",
            CompilerOptions::new().with_destructured_locals(vec!["a".into(), "b".into()]),
        );
        assert!(src.contains("var __locals = (locals || {}),\n    a = __locals.a,\n    b = __locals.b;"));
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        let resolved = CompilerOptions::new().with_locals_name("1data").resolve();
        let nodes = scan("x", &resolved, "t.ejs").unwrap();
        assert!(matches!(
            generate(&nodes, &resolved, "x", "t.ejs"),
            Err(EjsError::InvalidOption { option: "locals_name", .. })
        ));

        let resolved = CompilerOptions::new()
            .with_destructured_locals(vec!["a-b".into()])
            .resolve();
        assert!(matches!(
            generate(&nodes, &resolved, "x", "t.ejs"),
            Err(EjsError::InvalidOption { option: "destructured_locals", .. })
        ));
    }

    #[test]
    fn test_output_function_name() {
        let src = generate_with("<% echo('x') %>", CompilerOptions::new().with_output_function_name("echo"));
        assert!(src.contains("var echo = __append;"));
    }

    #[test]
    fn test_compile_debug_tracks_lines() {
        let src = generate_with("a\n<%= b %>", CompilerOptions::new().with_compile_debug(true));
        assert!(src.contains("var __line = 1"));
        assert!(src.contains(r#", __lines = "a\n<%= b %>""#));
        assert!(src.contains(r#", __filename = "t.ejs";"#));
        assert!(src.contains("; __line = 2"));
        assert!(src.contains("rethrow = rethrow || function (err, str, flnm, lineno, esc)"));
        assert!(src.contains("rethrow(e, __lines, __filename, __line, escapeFn);"));
    }
}
