//! Phase engine
//!
//! Drives APPLY, then for each scheduled round a parallel READ fan-out,
//! a class-request fixpoint, and a per-class WRITE fan-out. The
//! modification gate is closed outside the write phase and restored on
//! every exit path.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use tracing::{debug, info, instrument, trace, warn};
use zip::ZipArchive;

use reweave_tree::access::ACC_INTERFACE;
use reweave_tree::{ModificationGate, NodeId, NodeRef, Tree};

use crate::capture::{
    NodeCapture, NodeCaptureKind, RefCapture, RefNodeCapture, RefSliceCapture, SliceCapture,
    SliceCaptureKind,
};
use crate::error::{Error, Result};
use crate::provider::{BytecodeSource, ClassProvider, Platform, TreeReader};
use crate::schedule;
use crate::transformer::Transformer;
use crate::types::{ClassInfo, Phase, PhaseState};

/// Anchor marking the round in which untouched inputs have been read
pub const READ_VANILLA: &str = "READ_VANILLA";
/// Anchor marking the final round boundary before writing ends
pub const NO_WRITE: &str = "NO_WRITE";

/// Internal name of the root type
const OBJECT: &str = "java/lang/Object";

pub(crate) type ClassCallback =
    Box<dyn FnOnce(&Processor, NodeRef<'_>) -> Result<()> + Send>;

pub(crate) type ReplacementSupplier =
    Box<dyn FnOnce(&WriteContext<'_>) -> Result<Tree> + Send>;

/// A scheduled edit: who asked, where, and how to produce the
/// replacement once the write phase reaches the owning class.
pub(crate) struct Write {
    transformer_id: String,
    target: WriteTarget,
    supplier: ReplacementSupplier,
}

pub(crate) enum WriteTarget {
    Node(Arc<RefNodeCapture>),
    Slice(Arc<RefSliceCapture>),
}

/// Coordinates transformers over a corpus of classfile trees
pub struct Processor {
    platform: Box<dyn Platform>,
    reader: Box<dyn TreeReader>,
    transformers: Vec<Box<dyn Transformer>>,
    all_classes: BTreeMap<String, Mutex<ClassProvider>>,
    config: BTreeMap<String, String>,
    anchors: Vec<String>,
    gate: ModificationGate,
    phase: PhaseState,
    round_dependents: Mutex<IndexMap<String, Vec<String>>>,
    write_dependents: Mutex<IndexMap<String, Vec<String>>>,
    requested_classes: Mutex<IndexMap<String, Vec<ClassCallback>>>,
    reference_captures: Mutex<IndexMap<String, Vec<RefCapture>>>,
    writes: Mutex<IndexMap<String, Vec<Write>>>,
    modified_classes: IndexSet<String>,
    class_info_cache: DashMap<String, ClassInfo>,
    up_to_date: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("mutex poisoned")
}

impl Processor {
    pub fn new(platform: Box<dyn Platform>, reader: Box<dyn TreeReader>) -> Processor {
        Processor {
            platform,
            reader,
            transformers: Vec::new(),
            all_classes: BTreeMap::new(),
            config: BTreeMap::new(),
            anchors: vec![READ_VANILLA.to_string(), NO_WRITE.to_string()],
            gate: ModificationGate::new(),
            phase: PhaseState::default(),
            round_dependents: Mutex::new(IndexMap::new()),
            write_dependents: Mutex::new(IndexMap::new()),
            requested_classes: Mutex::new(IndexMap::new()),
            reference_captures: Mutex::new(IndexMap::new()),
            writes: Mutex::new(IndexMap::new()),
            modified_classes: IndexSet::new(),
            class_info_cache: DashMap::new(),
            up_to_date: true,
        }
    }

    // ----- inputs -----

    pub fn add_transformer(&mut self, transformer: Box<dyn Transformer>) {
        debug!(transformer = transformer.id(), "transformer registered");
        self.transformers.push(transformer);
    }

    /// Register every `.class` entry of a jar.
    ///
    /// Computes the SHA-1 of the jar, invalidates the cache when the
    /// base64 checksum differs from `old_checksum`, and returns the new
    /// checksum.
    pub fn add_jar(&mut self, jar: &Path, old_checksum: Option<&str>) -> Result<String> {
        let unreadable = |source: std::io::Error| Error::JarUnreadable {
            path: jar.to_path_buf(),
            source,
        };
        let bytes = std::fs::read(jar).map_err(unreadable)?;

        let mut digest = Sha1::new();
        digest.update(&bytes);
        let checksum = BASE64.encode(digest.finalize());

        let mut archive = ZipArchive::new(std::io::Cursor::new(&bytes))
            .map_err(|e| unreadable(std::io::Error::other(e)))?;
        let mut registered = 0usize;
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| unreadable(std::io::Error::other(e)))?;
            let entry_name = entry.name().to_string();
            if let Some(class_name) = entry_name.strip_suffix(".class") {
                let provider = ClassProvider::new(BytecodeSource::JarEntry {
                    jar: jar.to_path_buf(),
                    entry: entry_name.clone(),
                });
                self.all_classes
                    .insert(class_name.to_string(), Mutex::new(provider));
                registered += 1;
            }
        }
        info!(jar = %jar.display(), classes = registered, "jar registered");

        if old_checksum != Some(checksum.as_str()) {
            self.invalidate_cache();
        }
        Ok(checksum)
    }

    /// Register a single class; always invalidates the cache
    pub fn add_class(&mut self, name: &str, bytecode: Vec<u8>) {
        self.invalidate_cache();
        let provider = ClassProvider::new(BytecodeSource::Bytes(bytecode.into()));
        self.all_classes
            .insert(name.to_string(), Mutex::new(provider));
    }

    pub fn add_config(&mut self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Replace the anchor sequence
    pub fn set_anchors(&mut self, anchors: Vec<String>) {
        self.anchors = anchors;
    }

    pub fn invalidate_cache(&mut self) {
        self.up_to_date = false;
    }

    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date
    }

    /// Release the processor. Jar entries are reopened per access, so no
    /// file handles outlive this call.
    pub fn close(self) {}

    // ----- processing -----

    /// Run the full phase engine. A no-op while the cache is up to date.
    #[instrument(skip(self), fields(transformers = self.transformers.len()))]
    pub fn process(&mut self) -> Result<()> {
        if self.up_to_date {
            debug!("inputs unchanged, nothing to process");
            return Ok(());
        }

        // the gate is closed whenever no scope holds it open; apply and
        // read run without one
        self.phase.set(Some(Phase::Apply));
        let mut apply_result = Ok(());
        for transformer in &self.transformers {
            trace!(transformer = transformer.id(), "apply");
            if let Err(err) = transformer.apply(self) {
                apply_result = Err(err);
                break;
            }
        }
        self.phase.set(None);
        apply_result?;

        let transformer_ids: Vec<String> = self
            .transformers
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        let rounds = {
            let round_dependents = lock(&self.round_dependents);
            schedule::compute_rounds(&transformer_ids, &self.anchors, &round_dependents)?
        };
        info!(rounds = rounds.len(), "transformer rounds scheduled");

        for (index, round) in rounds.iter().enumerate() {
            self.run_round(index, round)?;
        }

        self.up_to_date = true;
        Ok(())
    }

    fn run_round(&mut self, index: usize, round: &[String]) -> Result<()> {
        debug!(round = index, members = ?round, "starting round");
        self.phase.set(Some(Phase::Read));
        let read_result = self.read_phase(round);
        let result = match read_result {
            Ok(()) => {
                self.phase.set(Some(Phase::Write));
                self.write_phase()
            }
            Err(err) => Err(err),
        };
        self.phase.set(None);
        result
    }

    #[instrument(skip_all, name = "read")]
    fn read_phase(&self, round: &[String]) -> Result<()> {
        // anchor ids in the round are virtual; only real transformers run
        let members: Vec<&dyn Transformer> = round
            .iter()
            .filter_map(|id| self.transformer_by_id(id))
            .collect();
        let results: Vec<Result<()>> = members
            .par_iter()
            .map(|transformer| {
                trace!(transformer = transformer.id(), "read");
                transformer.read(self)
            })
            .collect();
        for result in results {
            result?;
        }

        // class-request fixpoint: callbacks may request further classes
        loop {
            let wave: Vec<(String, Vec<ClassCallback>)> = {
                let mut requested = lock(&self.requested_classes);
                std::mem::take(&mut *requested).into_iter().collect()
            };
            if wave.is_empty() {
                break;
            }
            debug!(classes = wave.len(), "resolving requested classes");
            let results: Vec<Result<()>> = wave
                .into_par_iter()
                .map(|(class_name, callbacks)| self.run_class_callbacks(&class_name, callbacks))
                .collect();
            for result in results {
                result?;
            }
        }
        Ok(())
    }

    fn run_class_callbacks(&self, class_name: &str, callbacks: Vec<ClassCallback>) -> Result<()> {
        trace!(class = class_name, callbacks = callbacks.len(), "class requested");
        let tree = self.class_tree(class_name)?;
        let guard = tree.read().expect("class tree lock poisoned");
        for callback in callbacks {
            callback(self, guard.root_ref())?;
        }
        Ok(())
    }

    #[instrument(skip_all, name = "write")]
    fn write_phase(&mut self) -> Result<()> {
        let pending: Vec<(String, Vec<Write>)> = {
            let mut writes = lock(&self.writes);
            std::mem::take(&mut *writes).into_iter().collect()
        };
        if pending.is_empty() {
            lock(&self.reference_captures).clear();
            return Ok(());
        }
        let written: Vec<String> = pending.iter().map(|(name, _)| name.clone()).collect();
        info!(classes = written.len(), "applying writes");

        let write_depths = {
            let write_dependents = lock(&self.write_dependents);
            let ids: Vec<String> = self
                .transformers
                .iter()
                .map(|t| t.id().to_string())
                .collect();
            schedule::layer_depths(ids.iter(), &write_dependents)?
        };

        let results: Vec<Result<()>> = {
            let _open = self.gate.open_scoped();
            let this: &Processor = self;
            pending
                .into_par_iter()
                .map(|(class_name, writes)| this.write_class(&class_name, writes, &write_depths))
                .collect()
        };
        for result in results {
            result?;
        }

        for class_name in &written {
            self.class_info_cache.remove(class_name);
            self.modified_classes.insert(class_name.clone());
        }
        lock(&self.reference_captures).clear();
        Ok(())
    }

    /// Apply one class's writes on a single worker
    fn write_class(
        &self,
        class_name: &str,
        mut writes: Vec<Write>,
        depths: &IndexMap<String, usize>,
    ) -> Result<()> {
        trace!(class = class_name, writes = writes.len(), "writing class");
        let tree = {
            let provider = self
                .all_classes
                .get(class_name)
                .ok_or_else(|| Error::UnknownClass(class_name.to_string()))?;
            let mut provider = lock(provider);
            provider.materialize(class_name, self.reader.as_ref(), &self.gate)?
        };

        // resolve this class's reference captures before any write runs
        let captures = lock(&self.reference_captures)
            .swap_remove(class_name)
            .unwrap_or_default();
        {
            let guard = tree.read().expect("class tree lock poisoned");
            for capture in &captures {
                capture.resolve(&guard)?;
            }
        }

        // write-dependency order; submission order within a layer
        writes.sort_by_key(|write| depths.get(&write.transformer_id).copied().unwrap_or(0));

        // flag overlapping node targets; the later write wins
        let mut targets: HashSet<NodeId> = HashSet::new();
        for write in &writes {
            if let WriteTarget::Node(capture) = &write.target
                && !targets.insert(capture.resolved()?)
            {
                warn!(
                    class = class_name,
                    "multiple writes target the same node; the last write wins"
                );
            }
        }

        let context = WriteContext {
            processor: self,
            class_name,
            tree: &tree,
        };
        for write in writes {
            let replacement = (write.supplier)(&context)?;
            let mut guard = tree.write().expect("class tree lock poisoned");
            match &write.target {
                WriteTarget::Node(capture) => {
                    let target = capture.resolved()?;
                    guard.copy_from(target, &replacement, replacement.root())?;
                }
                WriteTarget::Slice(capture) => {
                    let resolved = capture.resolved()?;
                    guard.remove(resolved.list, resolved.start, resolved.end)?;
                    guard.insert_copy(
                        resolved.list,
                        resolved.start,
                        &replacement,
                        replacement.root(),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn class_tree(&self, class_name: &str) -> Result<Arc<RwLock<Tree>>> {
        let provider = self
            .all_classes
            .get(class_name)
            .ok_or_else(|| Error::UnknownClass(class_name.to_string()))?;
        let mut provider = lock(provider);
        provider.get(class_name, self.reader.as_ref(), &self.gate)
    }

    fn transformer_by_id(&self, id: &str) -> Option<&dyn Transformer> {
        self.transformers
            .iter()
            .find(|t| t.id() == id)
            .map(|t| t.as_ref())
    }

    /// The class's current tree, bypassing the request queue
    pub fn find_class_immediately(&self, name: &str) -> Result<Option<Arc<RwLock<Tree>>>> {
        match self.all_classes.get(name) {
            None => Ok(None),
            Some(provider) => {
                let mut provider = lock(provider);
                provider
                    .get(name, self.reader.as_ref(), &self.gate)
                    .map(Some)
            }
        }
    }

    /// Internal names of every class a write has touched
    pub fn modified_class_names(&self) -> impl Iterator<Item = &str> {
        self.modified_classes.iter().map(String::as_str)
    }

    /// Cached header facts, if the oracle has looked this class up
    pub fn cached_class_info(&self, name: &str) -> Option<ClassInfo> {
        self.class_info_cache
            .get(name)
            .map(|entry| entry.value().clone())
    }

    // ----- transformer-facing operations -----

    /// Run this transformer in a round after the other transformer
    pub fn add_round_dependency(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.check_phase(Phase::Apply, "add_round_dependency")?;
        lock(&self.round_dependents)
            .entry(other_id.to_string())
            .or_default()
            .push(self_id.to_string());
        Ok(())
    }

    /// Run this transformer in a round before the other transformer
    pub fn add_round_dependent(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.check_phase(Phase::Apply, "add_round_dependent")?;
        lock(&self.round_dependents)
            .entry(self_id.to_string())
            .or_default()
            .push(other_id.to_string());
        Ok(())
    }

    /// Order this transformer's writes as if after the other transformer's
    pub fn add_write_dependency(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.check_phase(Phase::Apply, "add_write_dependency")?;
        lock(&self.write_dependents)
            .entry(other_id.to_string())
            .or_default()
            .push(self_id.to_string());
        Ok(())
    }

    /// Order this transformer's writes as if before the other transformer's
    pub fn add_write_dependent(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.check_phase(Phase::Apply, "add_write_dependent")?;
        lock(&self.write_dependents)
            .entry(self_id.to_string())
            .or_default()
            .push(other_id.to_string());
        Ok(())
    }

    pub fn class_exists(&self, name: &str) -> bool {
        self.all_classes.contains_key(name)
    }

    /// Queue a callback on the named class's tree
    pub fn with_class<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: FnOnce(&Processor, NodeRef<'_>) -> Result<()> + Send + 'static,
    {
        self.check_phase(Phase::Read, "with_class")?;
        if !self.all_classes.contains_key(name) {
            return Err(Error::UnknownClass(name.to_string()));
        }
        lock(&self.requested_classes)
            .entry(name.to_string())
            .or_default()
            .push(Box::new(callback));
        Ok(())
    }

    /// Queue a callback on every class whose name satisfies the predicate
    pub fn with_classes<P, F>(&self, predicate: P, callback: F) -> Result<()>
    where
        P: Fn(&str) -> bool,
        F: Fn(&Processor, NodeRef<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.check_phase(Phase::Read, "with_classes")?;
        let shared = Arc::new(callback);
        let mut requested = lock(&self.requested_classes);
        for name in self.all_classes.keys().filter(|name| predicate(name)) {
            let callback = shared.clone();
            requested
                .entry(name.clone())
                .or_default()
                .push(Box::new(move |processor, class| callback(processor, class)));
        }
        Ok(())
    }

    /// Queue a callback on every class whose name starts with the prefix
    pub fn with_classes_prefixed<F>(&self, prefix: &str, callback: F) -> Result<()>
    where
        F: Fn(&Processor, NodeRef<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let prefix = prefix.to_string();
        self.with_classes(move |name| name.starts_with(&prefix), callback)
    }

    /// Queue a callback on every known class
    pub fn with_all_classes<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Processor, NodeRef<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.with_classes(|_| true, callback)
    }

    /// Snapshot a node now; the capture never sees later tree changes
    pub fn copy_capture(&self, node: NodeRef<'_>) -> Result<NodeCapture> {
        self.check_phase(Phase::Read, "copy_capture")?;
        Ok(NodeCapture::copy_of(node))
    }

    /// Record a lazy path to a node, resolved against the modified tree
    /// at write time
    pub fn ref_capture(&self, node: NodeRef<'_>) -> Result<NodeCapture> {
        self.check_phase(Phase::Read, "ref_capture")?;
        let (capture, inner) = NodeCapture::reference_to(node)?;
        lock(&self.reference_captures)
            .entry(inner.class_name().to_string())
            .or_default()
            .push(RefCapture::Node(inner));
        Ok(capture)
    }

    /// Snapshot the half-open range `[start, end)` of a list now
    pub fn copy_slice(&self, list: NodeRef<'_>, start: usize, end: usize) -> Result<SliceCapture> {
        self.check_phase(Phase::Read, "copy_slice")?;
        SliceCapture::copy_of(list, start, end)
    }

    /// Record a lazy path to a list range, with independent endpoint
    /// inclusivity
    pub fn ref_slice(
        &self,
        list: NodeRef<'_>,
        start_index: usize,
        end_index: usize,
        start_inclusive: bool,
        end_inclusive: bool,
    ) -> Result<SliceCapture> {
        self.check_phase(Phase::Read, "ref_slice")?;
        let (capture, inner) = SliceCapture::reference_to(
            list,
            start_index,
            end_index,
            start_inclusive,
            end_inclusive,
        )?;
        lock(&self.reference_captures)
            .entry(inner.class_name().to_string())
            .or_default()
            .push(RefCapture::Slice(inner));
        Ok(capture)
    }

    /// Schedule a node replacement. The target must be a reference
    /// capture; the supplier runs when the owning class is written.
    pub fn add_write<S>(
        &self,
        transformer_id: &str,
        target: &NodeCapture,
        supplier: S,
    ) -> Result<()>
    where
        S: FnOnce(&WriteContext<'_>) -> Result<Tree> + Send + 'static,
    {
        self.check_phase(Phase::Read, "add_write")?;
        let NodeCaptureKind::Ref(capture) = &target.kind else {
            return Err(Error::InvalidCaptureTarget);
        };
        lock(&self.writes)
            .entry(capture.class_name().to_string())
            .or_default()
            .push(Write {
                transformer_id: transformer_id.to_string(),
                target: WriteTarget::Node(capture.clone()),
                supplier: Box::new(supplier),
            });
        Ok(())
    }

    /// Schedule a slice replacement. The supplier's tree must be a list
    /// of the same element variant.
    pub fn add_slice_write<S>(
        &self,
        transformer_id: &str,
        target: &SliceCapture,
        supplier: S,
    ) -> Result<()>
    where
        S: FnOnce(&WriteContext<'_>) -> Result<Tree> + Send + 'static,
    {
        self.check_phase(Phase::Read, "add_slice_write")?;
        let SliceCaptureKind::Ref(capture) = &target.kind else {
            return Err(Error::InvalidCaptureTarget);
        };
        lock(&self.writes)
            .entry(capture.class_name().to_string())
            .or_default()
            .push(Write {
                transformer_id: transformer_id.to_string(),
                target: WriteTarget::Slice(capture.clone()),
                supplier: Box::new(supplier),
            });
        Ok(())
    }

    fn check_phase(&self, expected: Phase, operation: &'static str) -> Result<()> {
        let actual = self.phase.get();
        if actual != Some(expected) {
            return Err(Error::PhaseViolation {
                operation,
                expected,
                actual,
            });
        }
        Ok(())
    }

    // ----- subtype oracle -----

    fn class_info(&self, name: &str) -> Result<ClassInfo> {
        if let Some(info) = self.class_info_cache.get(name) {
            return Ok(info.value().clone());
        }
        let info = self.compute_class_info(name)?;
        self.class_info_cache.insert(name.to_string(), info.clone());
        Ok(info)
    }

    fn compute_class_info(&self, name: &str) -> Result<ClassInfo> {
        // a modified class answers from its live tree
        if let Some(provider) = self.all_classes.get(name) {
            let provider = lock(provider);
            if let Some(modified) = &provider.modified {
                let tree = modified.read().expect("class tree lock poisoned");
                let root = tree.root_ref();
                let is_interface = root
                    .modifiers()
                    .children()
                    .any(|modifier| modifier.as_int() == Some(ACC_INTERFACE));
                let super_class = root
                    .superclass()
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                return Ok(ClassInfo {
                    super_class,
                    is_interface,
                });
            }
        }
        let bytecode = self.platform.class_bytecode(name)?;
        self.reader.read_header(&bytecode)
    }

    /// Whether `subtype` has `supertype` among its proper superclasses.
    /// A revisited type means a malformed cycle; the walk gives up.
    fn is_derived_from(&self, subtype: &str, supertype: &str) -> Result<bool> {
        let mut current = self.class_info(subtype)?.super_class;
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                return Ok(false);
            }
            if name == supertype {
                return Ok(true);
            }
            current = self.class_info(&name)?.super_class;
        }
        Ok(false)
    }

    /// Least common ancestor in the single-inheritance superclass graph,
    /// falling back to the root type for null types, interfaces and
    /// disjoint chains.
    pub fn common_super_class(
        &self,
        type1: Option<&str>,
        type2: Option<&str>,
    ) -> Result<String> {
        let (Some(type1), Some(type2)) = (type1, type2) else {
            return Ok(OBJECT.to_string());
        };
        if self.is_derived_from(type1, type2)? {
            return Ok(type2.to_string());
        }
        if self.is_derived_from(type2, type1)? {
            return Ok(type1.to_string());
        }
        if self.class_info(type1)?.is_interface || self.class_info(type2)?.is_interface {
            return Ok(OBJECT.to_string());
        }
        let mut current = type1.to_string();
        loop {
            current = match self.class_info(&current)?.super_class {
                None => return Ok(OBJECT.to_string()),
                Some(super_class) => super_class,
            };
            if self.is_derived_from(type2, &current)? {
                return Ok(current);
            }
        }
    }
}

/// Per-class context handed to replacement suppliers during the write
/// phase. Resolves captures against the class currently being written.
pub struct WriteContext<'a> {
    processor: &'a Processor,
    class_name: &'a str,
    tree: &'a Arc<RwLock<Tree>>,
}

impl WriteContext<'_> {
    /// Internal name of the class being written
    pub fn class_name(&self) -> &str {
        self.class_name
    }

    /// Gate handle for building replacement trees
    pub fn gate(&self) -> ModificationGate {
        self.processor.gate.clone()
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.processor.config_value(key)
    }

    /// Replace `target` in the supplier's tree with the capture's content
    pub fn substitute(&self, tree: &mut Tree, target: NodeId, source: &NodeCapture) -> Result<()> {
        match &source.kind {
            NodeCaptureKind::Copy(snapshot) => {
                tree.copy_from(target, snapshot, snapshot.root())?;
            }
            NodeCaptureKind::Ref(capture) => {
                self.check_writing_class(capture.class_name())?;
                let live = self.tree.read().expect("class tree lock poisoned");
                tree.copy_from(target, &live, capture.resolved()?)?;
            }
        }
        Ok(())
    }

    /// Insert copies of the capture's range into the supplier's list at
    /// `index`
    pub fn substitute_slice(
        &self,
        tree: &mut Tree,
        list: NodeId,
        index: usize,
        source: &SliceCapture,
    ) -> Result<()> {
        match &source.kind {
            SliceCaptureKind::Copy(snapshot) => {
                tree.insert_copy(list, index, snapshot, snapshot.root())?;
            }
            SliceCaptureKind::Ref(capture) => {
                self.check_writing_class(capture.class_name())?;
                let resolved = capture.resolved()?;
                let slice = {
                    let live = self.tree.read().expect("class tree lock poisoned");
                    live.snapshot_slice(resolved.list, resolved.start, resolved.end)?
                };
                tree.insert_copy(list, index, &slice, slice.root())?;
            }
        }
        Ok(())
    }

    fn check_writing_class(&self, owner: &str) -> Result<()> {
        if owner != self.class_name {
            return Err(Error::WrongWritingClass {
                expected: self.class_name.to_string(),
                actual: owner.to_string(),
            });
        }
        Ok(())
    }
}
