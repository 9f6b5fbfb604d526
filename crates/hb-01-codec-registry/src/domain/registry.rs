//! # Codec Registry
//!
//! The live name -> codec table. Clones share the same table, so a codec
//! registered through one handle is visible through every other.

use crate::adapters::proto_schema::ProtoSchemaCompiler;
use crate::domain::codec::{NamedCodec, SharedCodec};
use crate::domain::errors::CodecError;
use crate::domain::system::SystemCodecs;
use crate::ports::outbound::SchemaCompiler;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where the initial application codecs come from.
#[derive(Debug, Clone, Default)]
pub enum CodecSource {
    /// No application codecs; every payload passes through raw.
    #[default]
    None,
    /// A precompiled registry. Its entries are copied.
    Registry(CodecRegistry),
    /// Schema text to compile.
    Schema(String),
}

/// A batch of codecs to merge into the registry.
#[derive(Clone)]
pub enum CodecBatch {
    /// Ordered `{name, codec}` pairs; later duplicates win.
    List(Vec<NamedCodec>),
    /// A name -> codec map.
    Map(HashMap<String, SharedCodec>),
}

impl fmt::Debug for CodecBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(list) => f.debug_tuple("List").field(list).finish(),
            Self::Map(map) => {
                let names: Vec<&String> = map.keys().collect();
                f.debug_tuple("Map").field(&names).finish()
            }
        }
    }
}

impl From<Vec<NamedCodec>> for CodecBatch {
    fn from(list: Vec<NamedCodec>) -> Self {
        Self::List(list)
    }
}

impl From<HashMap<String, SharedCodec>> for CodecBatch {
    fn from(map: HashMap<String, SharedCodec>) -> Self {
        Self::Map(map)
    }
}

/// Name -> codec table.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    table: Arc<RwLock<HashMap<String, SharedCodec>>>,
}

impl CodecRegistry {
    /// Create an empty registry (no system codecs).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for an emitter, compiling schema text with the
    /// protocol-buffer compiler.
    pub fn initialize(source: CodecSource) -> Result<Self, CodecError> {
        Self::initialize_with(source, &ProtoSchemaCompiler::new())
    }

    /// Build the registry for an emitter with a custom schema compiler.
    ///
    /// System codecs are merged last so that their names always resolve to
    /// the system wire shapes, whatever the source contained.
    pub fn initialize_with(
        source: CodecSource,
        compiler: &dyn SchemaCompiler,
    ) -> Result<Self, CodecError> {
        let registry = match source {
            CodecSource::None => Self::new(),
            CodecSource::Registry(precompiled) => precompiled.snapshot(),
            CodecSource::Schema(text) => {
                let registry = Self::new();
                registry.register_all(CodecBatch::List(compiler.compile(&text)?));
                registry
            }
        };

        for entry in SystemCodecs::CURRENT.entries() {
            registry.register(entry.name.clone(), entry.codec.clone());
        }

        debug!(codecs = registry.len(), "[hb-01] Codec registry initialized");
        Ok(registry)
    }

    /// Register (or replace) the codec for `name`.
    pub fn register(&self, name: impl Into<String>, codec: SharedCodec) {
        let name = name.into();
        debug!(name = %name, "[hb-01] Registering codec");
        self.table.write().insert(name, codec);
    }

    /// Merge a batch of codecs.
    pub fn register_all(&self, batch: impl Into<CodecBatch>) {
        let mut table = self.table.write();
        match batch.into() {
            CodecBatch::List(list) => {
                for entry in list {
                    table.insert(entry.name, entry.codec);
                }
            }
            CodecBatch::Map(map) => table.extend(map),
        }
    }

    /// Look up the codec for `name`. `None` means raw passthrough.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SharedCodec> {
        self.table.read().get(name).cloned()
    }

    /// Whether a codec is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered codecs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// An independent copy of the current table.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            table: Arc::new(RwLock::new(self.table.read().clone())),
        }
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("names", &self.names())
            .finish()
    }
}
