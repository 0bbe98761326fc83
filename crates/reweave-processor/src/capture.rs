//! Capture system
//!
//! Captures quote a region of a class tree during the read phase so it
//! can be consumed when writes are applied. Copy captures snapshot
//! deeply at construction and never see later tree changes; reference
//! captures remember the owning class and the index path from its root,
//! and resolve lazily against the current modified tree at write time.

use std::sync::{Arc, OnceLock};

use reweave_tree::{NodeId, NodeRef, NodeTag, Tree, TreeError};

use crate::error::{Error, Result};

/// Handle to a single node of a class tree
#[derive(Clone)]
pub struct NodeCapture {
    pub(crate) kind: NodeCaptureKind,
}

#[derive(Clone)]
pub(crate) enum NodeCaptureKind {
    Copy(Arc<Tree>),
    Ref(Arc<RefNodeCapture>),
}

impl NodeCapture {
    pub(crate) fn copy_of(node: NodeRef<'_>) -> NodeCapture {
        NodeCapture {
            kind: NodeCaptureKind::Copy(Arc::new(node.tree().snapshot(node.id()))),
        }
    }

    pub(crate) fn reference_to(node: NodeRef<'_>) -> Result<(NodeCapture, Arc<RefNodeCapture>)> {
        let inner = Arc::new(RefNodeCapture::new(node)?);
        let capture = NodeCapture {
            kind: NodeCaptureKind::Ref(inner.clone()),
        };
        Ok((capture, inner))
    }

    /// Whether this capture resolves lazily against the live tree
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, NodeCaptureKind::Ref(_))
    }

    /// Owning class of a reference capture
    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            NodeCaptureKind::Copy(_) => None,
            NodeCaptureKind::Ref(inner) => Some(inner.class_name()),
        }
    }

    /// The detached snapshot of a copy capture
    pub fn snapshot(&self) -> Option<&Tree> {
        match &self.kind {
            NodeCaptureKind::Copy(snapshot) => Some(snapshot),
            NodeCaptureKind::Ref(_) => None,
        }
    }
}

/// Handle to a range within a list node of a class tree
#[derive(Clone)]
pub struct SliceCapture {
    pub(crate) kind: SliceCaptureKind,
}

#[derive(Clone)]
pub(crate) enum SliceCaptureKind {
    Copy(Arc<Tree>),
    Ref(Arc<RefSliceCapture>),
}

impl SliceCapture {
    pub(crate) fn copy_of(list: NodeRef<'_>, start: usize, end: usize) -> Result<SliceCapture> {
        let snapshot = list.tree().snapshot_slice(list.id(), start, end)?;
        Ok(SliceCapture {
            kind: SliceCaptureKind::Copy(Arc::new(snapshot)),
        })
    }

    pub(crate) fn reference_to(
        list: NodeRef<'_>,
        start_index: usize,
        end_index: usize,
        start_inclusive: bool,
        end_inclusive: bool,
    ) -> Result<(SliceCapture, Arc<RefSliceCapture>)> {
        let inner = Arc::new(RefSliceCapture::new(
            list,
            start_index,
            end_index,
            start_inclusive,
            end_inclusive,
        )?);
        let capture = SliceCapture {
            kind: SliceCaptureKind::Ref(inner.clone()),
        };
        Ok((capture, inner))
    }

    /// Whether this capture resolves lazily against the live tree
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, SliceCaptureKind::Ref(_))
    }

    /// Owning class of a reference capture
    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            SliceCaptureKind::Copy(_) => None,
            SliceCaptureKind::Ref(inner) => Some(inner.class_name()),
        }
    }

    /// The detached list snapshot of a copy capture
    pub fn snapshot(&self) -> Option<&Tree> {
        match &self.kind {
            SliceCaptureKind::Copy(snapshot) => Some(snapshot),
            SliceCaptureKind::Ref(_) => None,
        }
    }
}

/// Lazy path to a node, recorded at capture time
pub(crate) struct RefNodeCapture {
    class_name: String,
    path: Vec<usize>,
    resolved: OnceLock<NodeId>,
}

impl RefNodeCapture {
    fn new(node: NodeRef<'_>) -> Result<RefNodeCapture> {
        let class_name = owning_class(node)?;
        let path = node.tree().path_from_root(node.id());
        Ok(RefNodeCapture {
            class_name,
            path,
            resolved: OnceLock::new(),
        })
    }

    pub(crate) fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Walk the recorded path against the current tree and cache the hit
    pub(crate) fn resolve(&self, tree: &Tree) -> Result<NodeId> {
        if let Some(&id) = self.resolved.get() {
            return Ok(id);
        }
        let id = tree
            .node_at_path(&self.path)
            .ok_or_else(|| self.stale())?;
        Ok(*self.resolved.get_or_init(|| id))
    }

    /// The cached resolution; fails if the capture was never resolved
    pub(crate) fn resolved(&self) -> Result<NodeId> {
        self.resolved.get().copied().ok_or_else(|| self.stale())
    }

    fn stale(&self) -> Error {
        Error::StaleCapture {
            class: self.class_name.clone(),
        }
    }
}

/// Half-open resolution of a slice capture within the live tree
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResolvedSlice {
    pub(crate) list: NodeId,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

/// Lazy path to a list range, with independent endpoint inclusivity
pub(crate) struct RefSliceCapture {
    class_name: String,
    path: Vec<usize>,
    start_index: usize,
    end_index: usize,
    start_inclusive: bool,
    end_inclusive: bool,
    resolved: OnceLock<ResolvedSlice>,
}

impl RefSliceCapture {
    fn new(
        list: NodeRef<'_>,
        start_index: usize,
        end_index: usize,
        start_inclusive: bool,
        end_inclusive: bool,
    ) -> Result<RefSliceCapture> {
        if list.tag() != NodeTag::List {
            return Err(TreeError::NotAList { found: list.tag() }.into());
        }
        let class_name = owning_class(list)?;
        let capture = RefSliceCapture {
            class_name,
            path: list.tree().path_from_root(list.id()),
            start_index,
            end_index,
            start_inclusive,
            end_inclusive,
            resolved: OnceLock::new(),
        };
        let (start, end) = capture.normalized();
        let len = list.len();
        if start > end || end > len {
            return Err(TreeError::InvalidRange { start, end, len }.into());
        }
        Ok(capture)
    }

    pub(crate) fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Normalize the endpoints to the half-open form `[start, end)`
    fn normalized(&self) -> (usize, usize) {
        let start = self.start_index + usize::from(!self.start_inclusive);
        let end = self.end_index + usize::from(self.end_inclusive);
        (start, end)
    }

    /// Walk the recorded path and range against the current tree
    pub(crate) fn resolve(&self, tree: &Tree) -> Result<ResolvedSlice> {
        if let Some(&slice) = self.resolved.get() {
            return Ok(slice);
        }
        let list = tree
            .node_at_path(&self.path)
            .ok_or_else(|| self.stale())?;
        if tree.tag(list) != NodeTag::List {
            return Err(self.stale());
        }
        let (start, end) = self.normalized();
        let len = tree.children(list).len();
        if start > end || end > len {
            return Err(self.stale());
        }
        let slice = ResolvedSlice { list, start, end };
        Ok(*self.resolved.get_or_init(|| slice))
    }

    /// The cached resolution; fails if the capture was never resolved
    pub(crate) fn resolved(&self) -> Result<ResolvedSlice> {
        self.resolved.get().copied().ok_or_else(|| self.stale())
    }

    fn stale(&self) -> Error {
        Error::StaleCapture {
            class: self.class_name.clone(),
        }
    }
}

/// Reference capture of either shape, sharded by owning class
#[derive(Clone)]
pub(crate) enum RefCapture {
    Node(Arc<RefNodeCapture>),
    Slice(Arc<RefSliceCapture>),
}

impl RefCapture {
    pub(crate) fn resolve(&self, tree: &Tree) -> Result<()> {
        match self {
            RefCapture::Node(inner) => inner.resolve(tree).map(|_| ()),
            RefCapture::Slice(inner) => inner.resolve(tree).map(|_| ()),
        }
    }
}

/// Internal name of the class whose tree contains `node`
fn owning_class(node: NodeRef<'_>) -> Result<String> {
    let root = node.tree().root_ref();
    if root.tag() != NodeTag::Class {
        return Err(Error::CaptureOutsideClass);
    }
    root.name()
        .as_str()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or(Error::CaptureOutsideClass)
}
