//! Chat template autodetection.
//!
//! Documents may embed a chat template under `tokenizer.chat_template`. When
//! the catalog recognizes it, the matching template body is stored as an
//! extra `template` layer. Misses are logged and ignored.

use std::collections::HashMap;
use std::io::Cursor;

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::layer::{ImportedLayer, LayeredModel, MediaType};
use crate::materialize::LayerMaterializer;

/// A known template and its renderable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTemplate {
    pub name: String,
    pub body: String,
}

impl NamedTemplate {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Lookup of known templates by the identifier a document embeds.
pub trait TemplateCatalog: Send + Sync {
    fn lookup_by_name(&self, name: &str) -> Option<NamedTemplate>;
}

/// A fixed catalog keyed by exact identifier.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateCatalog {
    entries: HashMap<String, NamedTemplate>,
}

impl StaticTemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `template` under its own name.
    pub fn with_template(mut self, template: NamedTemplate) -> Self {
        self.entries.insert(template.name.clone(), template);
        self
    }

    /// Register `template` under an additional identifier, such as the exact
    /// text a converter embeds for it.
    pub fn with_alias(mut self, identifier: impl Into<String>, template: NamedTemplate) -> Self {
        self.entries.insert(identifier.into(), template);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TemplateCatalog for StaticTemplateCatalog {
    fn lookup_by_name(&self, name: &str) -> Option<NamedTemplate> {
        self.entries.get(name).cloned()
    }
}

/// Append one template layer per recognized embedded template.
///
/// Only layers present on entry are inspected. Existing layers are never
/// touched. Returns the number of layers appended.
pub fn detect_chat_template(
    layers: &mut LayeredModel,
    catalog: &dyn TemplateCatalog,
    materializer: &LayerMaterializer,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut found = Vec::new();
    for imported in layers.iter() {
        let Some(doc) = &imported.metadata else {
            continue;
        };
        let Some(embedded) = doc.chat_template().filter(|s| !s.is_empty()) else {
            continue;
        };
        match catalog.lookup_by_name(embedded) {
            Some(template) => found.push(template),
            None => debug!(
                "No catalog template matches the one embedded in layer {}",
                imported.layer.digest
            ),
        }
    }

    let added = found.len();
    for template in found {
        let layer = materializer
            .materialize(
                &mut Cursor::new(template.body.into_bytes()),
                MediaType::Template,
                cancel,
            )?
            .with_status(format!("using autodetected template {}", template.name));
        layers.push(ImportedLayer::new(layer));
    }
    Ok(added)
}
