//! Scripted template engine shared by the scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use stencil_core::{AttributeMap, Encoding, GroupConfig, GroupId, RunConfig, UnitConfig, UnitId};
use stencil_renderer::{
    Diagnostic, DiagnosticKind, DiagnosticSink, FormatterKind, RenderError, TemplateEngine,
    TemplateHandle, TemplateInstance, TemplateSource, WriteOptions,
};

/// Inline source that makes [`ScriptedEngine::load`] report a compile error.
pub const BROKEN_SOURCE: &str = "broken ::= <<>>";
pub const SCRIPTED_SOURCE: &str = "scripted ::= <<>>";

/// What a scripted template does when written.
#[derive(Debug, Clone)]
pub enum Behavior {
    Text(&'static str),
    /// Sleep, then write the text.
    Slow(Duration, &'static str),
    /// Write the text, then sleep before returning Ok.
    WriteThenStall(&'static str, Duration),
    /// Keep writing until the writer refuses (i.e. the token is cancelled).
    UntilCancelled,
    /// Report a runtime diagnostic and stop.
    Fail,
    /// Write part of the output, then fail with an I/O error.
    CrashMidWrite,
    /// Report a missing attribute, then write the text.
    MissingAttribute(&'static str),
    /// Write the instance's attributes as JSON.
    Attributes,
}

#[derive(Clone, Default)]
pub struct ScriptedEngine {
    behaviors: Arc<HashMap<String, Behavior>>,
    /// Template names in the order their renders started.
    pub started: Arc<Mutex<Vec<String>>>,
    pub loads: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new<'a>(behaviors: impl IntoIterator<Item = (&'a str, Behavior)>) -> Self {
        Self {
            behaviors: Arc::new(
                behaviors
                    .into_iter()
                    .map(|(name, b)| (name.to_string(), b))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl TemplateEngine for ScriptedEngine {
    fn load(
        &self,
        source: &TemplateSource,
        _encoding: Encoding,
        sink: &dyn DiagnosticSink,
    ) -> Result<Box<dyn TemplateHandle>, RenderError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if matches!(source, TemplateSource::Inline(text) if text == BROKEN_SOURCE) {
            sink.report(Diagnostic::new(DiagnosticKind::Compile, "unexpected end of template"));
        }
        Ok(Box::new(ScriptedHandle {
            engine: self.clone(),
            listener: None,
        }))
    }
}

struct ScriptedHandle {
    engine: ScriptedEngine,
    listener: Option<Arc<dyn DiagnosticSink>>,
}

impl TemplateHandle for ScriptedHandle {
    fn set_listener(&mut self, sink: Arc<dyn DiagnosticSink>) {
        self.listener = Some(sink);
    }

    fn instantiate(&self, name: &str) -> Option<Box<dyn TemplateInstance>> {
        let Some(behavior) = self.engine.behaviors.get(name) else {
            if let Some(listener) = &self.listener {
                listener.report(Diagnostic::new(
                    DiagnosticKind::Runtime,
                    format!("no template named '{name}'"),
                ));
            }
            return None;
        };
        Some(Box::new(ScriptedInstance {
            name: name.to_string(),
            behavior: behavior.clone(),
            attributes: AttributeMap::new(),
            started: Arc::clone(&self.engine.started),
        }))
    }

    fn register_formatter(&mut self, _name: &str, _kind: FormatterKind) -> Result<(), RenderError> {
        Ok(())
    }

    fn template_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.engine.behaviors.keys().cloned().collect();
        names.sort();
        names
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedInstance {
    name: String,
    behavior: Behavior,
    attributes: AttributeMap,
    started: Arc<Mutex<Vec<String>>>,
}

impl TemplateInstance for ScriptedInstance {
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
        _options: &WriteOptions,
    ) -> Result<(), RenderError> {
        self.started.lock().unwrap().push(self.name.clone());
        match &self.behavior {
            Behavior::Text(text) => out.write_all(text.as_bytes()).map_err(RenderError::Write),
            Behavior::Slow(delay, text) => {
                thread::sleep(*delay);
                out.write_all(text.as_bytes()).map_err(RenderError::Write)
            }
            Behavior::WriteThenStall(text, delay) => {
                out.write_all(text.as_bytes()).map_err(RenderError::Write)?;
                thread::sleep(*delay);
                Ok(())
            }
            Behavior::UntilCancelled => loop {
                out.write_all(b".").map_err(RenderError::Write)?;
                thread::sleep(Duration::from_millis(2));
            },
            Behavior::Fail => {
                sink.report(Diagnostic::new(DiagnosticKind::Runtime, "template blew up"));
                Err(RenderError::Failed {
                    template: self.name.clone(),
                })
            }
            Behavior::CrashMidWrite => {
                out.write_all(b"half of the new").map_err(RenderError::Write)?;
                Err(RenderError::Write(io::Error::new(io::ErrorKind::Other, "crashed")))
            }
            Behavior::MissingAttribute(text) => {
                sink.report(Diagnostic::new(
                    DiagnosticKind::MissingAttribute,
                    "Variable `name` not found in context",
                ));
                out.write_all(text.as_bytes()).map_err(RenderError::Write)
            }
            Behavior::Attributes => {
                let json = serde_json::to_string(&self.attributes)
                    .map_err(|e| RenderError::Write(io::Error::new(io::ErrorKind::Other, e)))?;
                out.write_all(json.as_bytes()).map_err(RenderError::Write)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config builders
// ---------------------------------------------------------------------------

pub fn run_config(base: &Path) -> RunConfig {
    RunConfig {
        base_dir: Some(base.to_path_buf()),
        ..RunConfig::default()
    }
}

pub fn group(id: &str) -> GroupConfig {
    GroupConfig {
        id: Some(GroupId::from(id)),
        source: Some(SCRIPTED_SOURCE.to_string()),
        ..GroupConfig::default()
    }
}

/// A unit of `group` rendering template `name` to `out/<id>.txt`.
pub fn unit(id: &str, group: &str, name: &str) -> UnitConfig {
    UnitConfig {
        id: Some(UnitId::from(id)),
        group_id: Some(GroupId::from(group)),
        name: Some(name.to_string()),
        target: Some(format!("out/{id}.txt")),
        ..UnitConfig::default()
    }
}
