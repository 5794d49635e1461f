//! Tera-backed implementation of the engine traits.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tera::{Context, Tera};

use stencil_core::{AttributeMap, Encoding};

use crate::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::engine::{TemplateEngine, TemplateHandle, TemplateInstance, WriteOptions};
use crate::error::{io_err, RenderError};
use crate::formatters::FormatterKind;
use crate::group_file;
use crate::source::{TemplateSource, GROUP_FILE_EXTENSION, TEMPLATE_FILE_EXTENSION};

/// Upper bound on attributes filled in for a single render.
const MAX_FILLED_ATTRIBUTES: usize = 64;

static FAILING_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Failed to parse '([^']+)'|Template '([^']+)' is inheriting|Template `([^`]+)` loads macros)")
        .expect("valid regex")
});

static MISSING_VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Variable `([^`]+)` not found in context").expect("valid regex"));

static SIMPLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// A template body waiting to be compiled, with where it came from.
struct Piece {
    name: String,
    body: String,
    origin: Option<PathBuf>,
    line_offset: usize,
}

impl Piece {
    fn compile_error(&self, message: String) -> Diagnostic {
        let d = Diagnostic::new(DiagnosticKind::Compile, message);
        match &self.origin {
            Some(path) => d.at(path, self.line_offset),
            None => d,
        }
    }
}

/// Tera engine with autoescaping disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraEngine;

impl TeraEngine {
    pub fn new() -> Self {
        TeraEngine
    }
}

impl TemplateEngine for TeraEngine {
    fn load(
        &self,
        source: &TemplateSource,
        encoding: Encoding,
        sink: &dyn DiagnosticSink,
    ) -> Result<Box<dyn TemplateHandle>, RenderError> {
        let mut pieces = Vec::new();
        match source {
            TemplateSource::Inline(text) => collect_group(text, "", None, sink, &mut pieces),
            TemplateSource::File(path) => {
                let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
                let text = encoding.decode(&bytes).map_err(|e| io_err(path, e))?;
                collect_group(&text, "", Some(path), sink, &mut pieces);
            }
            TemplateSource::Directory(dir) => {
                let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
                walk_dir(dir, dir, entries, encoding, sink, &mut pieces);
            }
        }
        let tera = compile(pieces, sink);
        Ok(Box::new(TeraHandle {
            tera: Arc::new(tera),
            listener: None,
            description: source.to_string(),
        }))
    }
}

fn collect_group(
    text: &str,
    prefix: &str,
    origin: Option<&Path>,
    sink: &dyn DiagnosticSink,
    out: &mut Vec<Piece>,
) {
    match group_file::parse(text) {
        Ok(defs) => out.extend(defs.into_iter().map(|def| Piece {
            name: format!("{prefix}{}", def.name),
            body: def.body,
            origin: origin.map(Path::to_path_buf),
            line_offset: def.body_line_offset,
        })),
        Err(e) => {
            let d = Diagnostic::new(DiagnosticKind::Compile, format!("group syntax error {e}"));
            sink.report(match origin {
                Some(path) => d.at(path, 0),
                None => d,
            });
        }
    }
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    entries: std::fs::ReadDir,
    encoding: Encoding,
    sink: &dyn DiagnosticSink,
    out: &mut Vec<Piece>,
) {
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => report_io(sink, dir, &e),
        }
    }
    paths.sort();

    for path in paths {
        if path.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(children) => walk_dir(root, &path, children, encoding, sink, out),
                Err(e) => report_io(sink, &path, &e),
            }
        } else {
            add_file(root, &path, encoding, sink, out);
        }
    }
}

fn add_file(
    root: &Path,
    path: &Path,
    encoding: Encoding,
    sink: &dyn DiagnosticSink,
    out: &mut Vec<Piece>,
) {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let is_template = ext.eq_ignore_ascii_case(TEMPLATE_FILE_EXTENSION);
    let is_group = ext.eq_ignore_ascii_case(GROUP_FILE_EXTENSION);
    if !is_template && !is_group {
        return;
    }

    let text = match std::fs::read(path).and_then(|bytes| encoding.decode(&bytes)) {
        Ok(text) => text,
        Err(e) => return report_io(sink, path, &e),
    };
    let name = template_name(root, path);
    if is_template {
        out.push(Piece {
            name,
            body: text,
            origin: Some(path.to_path_buf()),
            line_offset: 0,
        });
    } else {
        collect_group(&text, &format!("{name}/"), Some(path), sink, out);
    }
}

/// `root/a/b/c.tera` → `a/b/c`.
fn template_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path).with_extension("");
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn report_io(sink: &dyn DiagnosticSink, path: &Path, e: &std::io::Error) {
    sink.report(
        Diagnostic::new(DiagnosticKind::Io, format!("cannot read {}", path.display()))
            .with_cause(e.to_string()),
    );
}

/// Build a Tera instance from `pieces`, reporting and dropping definitions
/// that fail to compile until the rest compile together.
fn compile(pieces: Vec<Piece>, sink: &dyn DiagnosticSink) -> Tera {
    let mut seen = HashSet::new();
    let mut pending = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if seen.insert(piece.name.clone()) {
            pending.push(piece);
        } else {
            let message = format!("template '{}' is defined more than once", piece.name);
            sink.report(piece.compile_error(message));
        }
    }

    loop {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        let result = tera.add_raw_templates(
            pending.iter().map(|p| (p.name.as_str(), p.body.as_str())),
        );
        let e = match result {
            Ok(()) => return tera,
            Err(e) => e,
        };

        let message = error_chain(&e);
        let culprit = failing_template(&e.to_string())
            .and_then(|name| pending.iter().position(|p| p.name == name));
        match culprit {
            Some(idx) => {
                let piece = pending.remove(idx);
                sink.report(piece.compile_error(message));
            }
            None => {
                sink.report(Diagnostic::new(DiagnosticKind::Compile, message));
                let mut empty = Tera::default();
                empty.autoescape_on(vec![]);
                return empty;
            }
        }
    }
}

fn failing_template(message: &str) -> Option<String> {
    let caps = FAILING_TEMPLATE.captures(message)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().to_string())
}

/// The error and all its sources, joined with `: `.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Compiled templates of one group.
///
/// Formatters are registered copy-on-write, so instances created earlier keep
/// the filter set they were created with.
pub struct TeraHandle {
    tera: Arc<Tera>,
    listener: Option<Arc<dyn DiagnosticSink>>,
    description: String,
}

impl TemplateHandle for TeraHandle {
    fn set_listener(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.listener = Some(sink);
    }

    fn instantiate(&self, name: &str) -> Option<Box<dyn TemplateInstance>> {
        if self.tera.get_template_names().any(|n| n == name) {
            return Some(Box::new(TeraInstance {
                tera: Arc::clone(&self.tera),
                name: name.to_string(),
                attributes: AttributeMap::new(),
            }));
        }
        if let Some(listener) = &self.listener {
            listener.report(Diagnostic::new(
                DiagnosticKind::Runtime,
                format!("no template named '{name}' in {}", self.description),
            ));
        }
        None
    }

    fn register_formatter(&mut self, name: &str, kind: FormatterKind) -> Result<(), RenderError> {
        if !SIMPLE_NAME.is_match(name) {
            return Err(RenderError::InvalidFormatterName(name.to_string()));
        }
        Arc::make_mut(&mut self.tera).register_filter(name, kind.filter());
        Ok(())
    }

    fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tera.get_template_names().map(String::from).collect();
        names.sort();
        names
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

pub struct TeraInstance {
    tera: Arc<Tera>,
    name: String,
    attributes: AttributeMap,
}

impl TeraInstance {
    /// Render to a string, filling simple missing attributes with `""`.
    fn render(&self, sink: &dyn DiagnosticSink) -> Result<String, RenderError> {
        let mut context = Context::new();
        for (key, value) in &self.attributes {
            context.insert(key.as_str(), value);
        }

        let mut filled = 0;
        loop {
            let e = match self.tera.render(&self.name, &context) {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };
            let message = error_chain(&e);
            let missing = MISSING_VARIABLE
                .captures(&message)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());

            let Some(attribute) = missing else {
                sink.report(Diagnostic::new(DiagnosticKind::Runtime, message));
                return Err(RenderError::Failed { template: self.name.clone() });
            };
            sink.report(
                Diagnostic::new(
                    DiagnosticKind::MissingAttribute,
                    format!("attribute `{attribute}` is not defined in template '{}'", self.name),
                )
                .with_cause(message),
            );
            let fillable = SIMPLE_NAME.is_match(&attribute) && !context.contains_key(&attribute);
            if !fillable || filled >= MAX_FILLED_ATTRIBUTES {
                return Err(RenderError::Failed { template: self.name.clone() });
            }
            context.insert(attribute, "");
            filled += 1;
        }
    }
}

impl TemplateInstance for TeraInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    fn remove(&mut self, name: &str) {
        self.attributes.remove(name);
    }

    fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    fn write(
        &self,
        out: &mut dyn Write,
        sink: &dyn DiagnosticSink,
        options: &WriteOptions,
    ) -> Result<(), RenderError> {
        let rendered = self.render(sink)?;
        let text = if options.auto_indent {
            rendered
        } else {
            strip_indentation(&rendered)
        };
        out.write_all(text.as_bytes()).map_err(RenderError::Write)
    }
}

fn strip_indentation(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| line.trim_start_matches([' ', '\t']))
        .collect()
}
