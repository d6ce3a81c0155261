//! EJS tag scanner
//!
//! Splits template text on tag delimiters and walks the pieces with a small
//! mode machine, producing the nodes code generation works from.

use regex::Regex;

use crate::config::ResolvedCompilerOptions;
use crate::error::{EjsError, Result};

/// A piece of template output
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// Literal text, appended as is
    Text(String),
    /// `<% code %>`
    Scriptlet(String),
    /// `<%= expr %>`, HTML-escaped
    Escaped(String),
    /// `<%- expr %>`
    Raw(String),
}

/// A node and the template line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub node: Node,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Eval,
    Escaped,
    Raw,
    Comment,
    Literal,
}

/// Tag spellings for a delimiter configuration
struct Tags {
    open: String,
    open_slurp: String,
    open_escaped: String,
    open_raw: String,
    open_comment: String,
    open_literal: String,
    close: String,
    close_trim: String,
    close_slurp: String,
    close_literal: String,
}

impl Tags {
    fn new(options: &ResolvedCompilerOptions) -> Self {
        let o = &options.open_delimiter;
        let d = &options.delimiter;
        let c = &options.close_delimiter;
        Self {
            open: format!("{o}{d}"),
            open_slurp: format!("{o}{d}_"),
            open_escaped: format!("{o}{d}="),
            open_raw: format!("{o}{d}-"),
            open_comment: format!("{o}{d}#"),
            open_literal: format!("{o}{d}{d}"),
            close: format!("{d}{c}"),
            close_trim: format!("-{d}{c}"),
            close_slurp: format!("_{d}{c}"),
            close_literal: format!("{d}{d}{c}"),
        }
    }

    /// Alternation in the order EJS tries them (leftmost-first)
    fn regex(&self) -> Result<Regex> {
        let alternatives = [
            &self.open_literal,
            &self.close_literal,
            &self.open_escaped,
            &self.open_raw,
            &self.open_slurp,
            &self.open_comment,
            &self.open,
            &self.close,
            &self.close_trim,
            &self.close_slurp,
        ]
        .iter()
        .map(|tag| regex::escape(tag))
        .collect::<Vec<_>>()
        .join("|");

        Regex::new(&format!("({alternatives})"))
            .map_err(|e| EjsError::invalid_option("delimiter", e.to_string()))
    }

    fn is_close(&self, token: &str) -> bool {
        token == self.close || token == self.close_trim || token == self.close_slurp
    }
}

/// Scan a template into output nodes
pub(crate) fn scan(
    template: &str,
    options: &ResolvedCompilerOptions,
    filename: &str,
) -> Result<Vec<Spanned>> {
    validate_delimiters(options)?;

    let tags = Tags::new(options);
    let text = preprocess(template, options, &tags)?;
    let tokens = tokenize(&text, &tags.regex()?);

    let mut scanner = Scanner {
        tags: &tags,
        mode: None,
        truncate: false,
        line: 1,
        nodes: Vec::new(),
    };

    for (index, token) in tokens.iter().enumerate() {
        if token.starts_with(&tags.open) && !token.starts_with(&tags.open_literal) {
            let closed = tokens
                .get(index + 2)
                .map(|closing| tags.is_close(closing))
                .unwrap_or(false);
            if !closed {
                return Err(EjsError::template_syntax(
                    filename,
                    format!("Could not find matching close tag for \"{}\".", token),
                ));
            }
        }

        scanner.scan_token(token);
    }

    Ok(scanner.nodes)
}

struct Scanner<'t> {
    tags: &'t Tags,
    mode: Option<Mode>,
    truncate: bool,
    line: usize,
    nodes: Vec<Spanned>,
}

impl Scanner<'_> {
    fn scan_token(&mut self, token: &str) {
        let tags = self.tags;

        if token == tags.open || token == tags.open_slurp {
            self.mode = Some(Mode::Eval);
        } else if token == tags.open_escaped {
            self.mode = Some(Mode::Escaped);
        } else if token == tags.open_raw {
            self.mode = Some(Mode::Raw);
        } else if token == tags.open_comment {
            self.mode = Some(Mode::Comment);
        } else if token == tags.open_literal {
            self.mode = Some(Mode::Literal);
            let literal = tags.open.clone();
            self.push(Node::Text(literal));
        } else if token == tags.close_literal {
            self.mode = Some(Mode::Literal);
            let literal = tags.close.clone();
            self.push(Node::Text(literal));
        } else if tags.is_close(token) {
            if self.mode == Some(Mode::Literal) {
                self.add_output(token);
            }
            self.mode = None;
            self.truncate = token.starts_with('-') || token.starts_with('_');
        } else {
            match self.mode {
                Some(Mode::Eval) => self.push(Node::Scriptlet(close_line_comment(token))),
                Some(Mode::Escaped) => {
                    self.push(Node::Escaped(strip_semi(&close_line_comment(token))))
                }
                Some(Mode::Raw) => self.push(Node::Raw(strip_semi(&close_line_comment(token)))),
                Some(Mode::Comment) => {}
                Some(Mode::Literal) | None => self.add_output(token),
            }
        }

        self.line += token.matches('\n').count();
    }

    fn add_output(&mut self, text: &str) {
        let mut text = text;
        if self.truncate {
            text = text
                .strip_prefix("\r\n")
                .or_else(|| text.strip_prefix('\n'))
                .or_else(|| text.strip_prefix('\r'))
                .unwrap_or(text);
            self.truncate = false;
        }
        if text.is_empty() {
            return;
        }
        self.push(Node::Text(text.to_string()));
    }

    fn push(&mut self, node: Node) {
        self.nodes.push(Spanned {
            node,
            line: self.line,
        });
    }
}

fn validate_delimiters(options: &ResolvedCompilerOptions) -> Result<()> {
    for (option, value) in [
        ("delimiter", &options.delimiter),
        ("open_delimiter", &options.open_delimiter),
        ("close_delimiter", &options.close_delimiter),
    ] {
        if value.is_empty() {
            return Err(EjsError::invalid_option(option, "must not be empty"));
        }
    }
    Ok(())
}

/// Apply `rm_whitespace` and the `<%_` / `_%>` whitespace slurping
fn preprocess(template: &str, options: &ResolvedCompilerOptions, tags: &Tags) -> Result<String> {
    let mut text = if options.rm_whitespace {
        template
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        template.to_string()
    };

    let slurp_before = Regex::new(&format!(r"[ \t]*{}", regex::escape(&tags.open_slurp)))
        .map_err(|e| EjsError::invalid_option("delimiter", e.to_string()))?;
    let slurp_after = Regex::new(&format!(r"{}[ \t]*", regex::escape(&tags.close_slurp)))
        .map_err(|e| EjsError::invalid_option("delimiter", e.to_string()))?;

    text = slurp_before
        .replace_all(&text, regex::NoExpand(&tags.open_slurp))
        .into_owned();
    text = slurp_after
        .replace_all(&text, regex::NoExpand(&tags.close_slurp))
        .into_owned();

    Ok(text)
}

/// Split text into alternating literal and tag tokens, dropping empty text
fn tokenize<'a>(text: &'a str, tag_regex: &Regex) -> Vec<&'a str> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in tag_regex.find_iter(text) {
        if m.start() > last {
            tokens.push(&text[last..m.start()]);
        }
        tokens.push(m.as_str());
        last = m.end();
    }
    if last < text.len() {
        tokens.push(&text[last..]);
    }
    tokens
}

/// A `//` comment on the tag's last line would swallow generated code
fn close_line_comment(code: &str) -> String {
    let last_comment = code.rfind("//");
    let last_newline = code.rfind('\n');
    match (last_comment, last_newline) {
        (Some(comment), Some(newline)) if comment > newline => format!("{code}\n"),
        (Some(_), None) => format!("{code}\n"),
        _ => code.to_string(),
    }
}

/// Drop a trailing `;` so the expression can be wrapped in a call
fn strip_semi(code: &str) -> String {
    let trimmed = code.trim_end();
    match trimmed.strip_suffix(';') {
        Some(without) => format!("{}{}", without, &code[trimmed.len()..]),
        None => code.to_string(),
    }
}
