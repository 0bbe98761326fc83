//! Class providers
//!
//! A provider owns one class slot: the recipe for reproducing its
//! bytecode, a weak reference to the last parsed snapshot so unreferenced
//! trees can be collected, and the strong, pinned tree once any write has
//! touched the class.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, Weak};

use reweave_tree::{ModificationGate, Tree};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::types::ClassInfo;

/// Supplies classfile bytes for types not explicitly added to the
/// processor (used by the subtype oracle).
pub trait Platform: Send + Sync {
    /// Raw bytecode of the class with the given internal name
    fn class_bytecode(&self, internal_name: &str) -> Result<Vec<u8>>;
}

/// Parses classfile bytes into tree form.
///
/// `read_class` is invoked with the modification gate open so the
/// reader can fill children; `read_header` only extracts the facts the
/// subtype oracle needs.
pub trait TreeReader: Send + Sync {
    fn read_class(&self, bytecode: &[u8], gate: ModificationGate) -> Result<Tree>;
    fn read_header(&self, bytecode: &[u8]) -> Result<ClassInfo>;
}

/// Recipe for reproducing a class's original bytecode
pub(crate) enum BytecodeSource {
    Bytes(Arc<[u8]>),
    JarEntry { jar: PathBuf, entry: String },
}

impl BytecodeSource {
    fn load(&self) -> io::Result<Vec<u8>> {
        match self {
            BytecodeSource::Bytes(bytes) => Ok(bytes.to_vec()),
            BytecodeSource::JarEntry { jar, entry } => {
                let mut archive = ZipArchive::new(File::open(jar)?).map_err(io::Error::other)?;
                let mut file = archive.by_name(entry).map_err(io::Error::other)?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

/// Per-class slot holding the bytecode recipe and cached trees.
///
/// Not internally concurrent; the engine serializes access per provider.
pub(crate) struct ClassProvider {
    source: BytecodeSource,
    cached: Weak<RwLock<Tree>>,
    pub(crate) modified: Option<Arc<RwLock<Tree>>>,
}

impl ClassProvider {
    pub(crate) fn new(source: BytecodeSource) -> ClassProvider {
        ClassProvider {
            source,
            cached: Weak::new(),
            modified: None,
        }
    }

    /// The current tree: the pinned modified tree if a write touched
    /// this class, else the live weak snapshot, else a fresh reparse.
    pub(crate) fn get(
        &mut self,
        class_name: &str,
        reader: &dyn TreeReader,
        gate: &ModificationGate,
    ) -> Result<Arc<RwLock<Tree>>> {
        if let Some(modified) = &self.modified {
            return Ok(modified.clone());
        }
        if let Some(cached) = self.cached.upgrade() {
            return Ok(cached);
        }
        let bytecode = self.source.load().map_err(|source| Error::Io {
            class: class_name.to_string(),
            source,
        })?;
        let tree = {
            let _open = gate.open_scoped();
            reader.read_class(&bytecode, gate.clone())?
        };
        let tree = Arc::new(RwLock::new(tree));
        self.cached = Arc::downgrade(&tree);
        Ok(tree)
    }

    /// Pin the current tree as the class's modified tree; subsequent
    /// `get` calls return this exact instance.
    pub(crate) fn materialize(
        &mut self,
        class_name: &str,
        reader: &dyn TreeReader,
        gate: &ModificationGate,
    ) -> Result<Arc<RwLock<Tree>>> {
        let tree = self.get(class_name, reader, gate)?;
        self.modified = Some(tree.clone());
        Ok(tree)
    }
}
