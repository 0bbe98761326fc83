//! Class tree arena
//!
//! A `Tree` owns every node of one class (or of one detached subtree,
//! for snapshots and replacement trees) in a flat arena. Parents are
//! back-links by arena index; children are owned indices. Node ids stay
//! stable across in-place content replacement, so a resolved reference
//! survives later writes to sibling ranges.
//!
//! All mutators check the tree's modification gate and fail with
//! [`TreeError::ModificationForbidden`] while it is closed.

use crate::error::{Result, TreeError};
use crate::gate::ModificationGate;
use crate::node::{NodeData, NodeId, NodeKind, NodeTag, Value};

/// Fixed child layouts of the composite variants
pub(crate) mod slot {
    pub const NAMED_NAME: usize = 0;
    pub const NAMED_VALUE: usize = 1;

    pub const CLASS_NAME: usize = 0;
    pub const CLASS_SUPERCLASS: usize = 1;
    pub const CLASS_MODIFIERS: usize = 2;
    pub const CLASS_INTERFACES: usize = 3;
    pub const CLASS_FIELDS: usize = 4;
    pub const CLASS_METHODS: usize = 5;

    pub const FIELD_NAME: usize = 0;
    pub const FIELD_DESCRIPTOR: usize = 1;
    pub const FIELD_MODIFIERS: usize = 2;

    pub const METHOD_NAME: usize = 0;
    pub const METHOD_DESCRIPTOR: usize = 1;
    pub const METHOD_MODIFIERS: usize = 2;
    pub const METHOD_PARAMETERS: usize = 3;
    pub const METHOD_INSTRUCTIONS: usize = 4;

    pub const PARAMETER_NAME: usize = 0;
    pub const PARAMETER_MODIFIERS: usize = 1;

    pub const INSN_OPCODE: usize = 0;
    pub const INSN_OPERANDS: usize = 1;
}

/// Arena-backed node tree
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    gate: ModificationGate,
}

impl Tree {
    /// Create a tree whose root is a default node of the given variant.
    ///
    /// Composite roots come with their fixed children pre-allocated
    /// (empty names, empty lists). A `List` root gets `Value` elements;
    /// use [`Tree::new_list`] to pick a different element variant. The
    /// gate must be open.
    pub fn new(tag: NodeTag, gate: ModificationGate) -> Result<Tree> {
        if !gate.is_open() {
            return Err(TreeError::ModificationForbidden);
        }
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId::NONE,
            gate,
        };
        tree.root = tree.alloc_default(tag, NodeId::NONE);
        Ok(tree)
    }

    /// Create a tree rooted at an empty list with the given element variant
    pub fn new_list(elem: NodeTag, gate: ModificationGate) -> Result<Tree> {
        if !gate.is_open() {
            return Err(TreeError::ModificationForbidden);
        }
        let mut tree = Tree {
            nodes: Vec::new(),
            root: NodeId::NONE,
            gate,
        };
        tree.root = tree.alloc_list(elem, NodeId::NONE);
        Ok(tree)
    }

    /// Create a tree rooted at a value node holding `value`
    pub fn scalar(value: Value, gate: ModificationGate) -> Result<Tree> {
        let mut tree = Tree::new(NodeTag::Value, gate)?;
        let root = tree.root;
        tree.set_value(root, value)?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_ref(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root,
        }
    }

    /// Navigation handle for a node of this tree.
    ///
    /// Passing an id allocated by a different tree indexes into the wrong
    /// arena and may panic.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub fn gate(&self) -> &ModificationGate {
        &self.gate
    }

    pub fn tag(&self, id: NodeId) -> NodeTag {
        self.data(id).kind.tag()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.data(id).parent;
        (!parent.is_none()).then_some(parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.data(id).kind.children()
    }

    /// Scalar payload, if `id` is a value node
    pub fn value(&self, id: NodeId) -> Option<&Value> {
        match &self.data(id).kind {
            NodeKind::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Element variant, if `id` is a list node
    pub fn element_tag(&self, id: NodeId) -> Option<NodeTag> {
        match &self.data(id).kind {
            NodeKind::List { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Position of `id` within its parent's child list
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let index = self
            .children(parent)
            .iter()
            .position(|&c| c == id)
            .expect("child missing from its parent's child list");
        Some(index)
    }

    /// Child indices from the root down to `id`
    pub fn path_from_root(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(index) = self.child_index(current) {
            path.push(index);
            current = self.data(current).parent;
        }
        path.reverse();
        path
    }

    /// Walk child indices from the root; `None` if any step is out of range
    pub fn node_at_path(&self, path: &[usize]) -> Option<NodeId> {
        let mut current = self.root;
        for &index in path {
            current = *self.children(current).get(index)?;
        }
        Some(current)
    }

    /// Structural equality of two subtrees, ignoring node identity
    pub fn structurally_eq(&self, a: NodeId, other: &Tree, b: NodeId) -> bool {
        match (&self.data(a).kind, &other.data(b).kind) {
            (NodeKind::Value(x), NodeKind::Value(y)) => x == y,
            (
                NodeKind::List {
                    elem: ea,
                    children: ca,
                },
                NodeKind::List {
                    elem: eb,
                    children: cb,
                },
            ) => {
                ea == eb
                    && ca.len() == cb.len()
                    && ca
                        .iter()
                        .zip(cb)
                        .all(|(&x, &y)| self.structurally_eq(x, other, y))
            }
            (ka, kb) => {
                ka.tag() == kb.tag()
                    && ka
                        .children()
                        .iter()
                        .zip(kb.children())
                        .all(|(&x, &y)| self.structurally_eq(x, other, y))
            }
        }
    }

    // ----- mutators -----

    /// Replace the scalar payload of a value node
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.check_open()?;
        match &mut self.data_mut(id).kind {
            NodeKind::Value(v) => {
                *v = value;
                Ok(())
            }
            other => Err(TreeError::NotAValue { found: other.tag() }),
        }
    }

    /// Append a default node of the list's element variant, returning it
    pub fn append_new(&mut self, list: NodeId) -> Result<NodeId> {
        self.check_open()?;
        let (elem, _) = self.list_parts(list)?;
        let id = self.alloc_default(elem, list);
        match &mut self.data_mut(list).kind {
            NodeKind::List { children, .. } => children.push(id),
            _ => unreachable!("list_parts checked the variant"),
        }
        Ok(id)
    }

    /// Append a value node holding `value` to a list of value nodes
    pub fn append_value(&mut self, list: NodeId, value: Value) -> Result<NodeId> {
        let id = self.append_new(list)?;
        self.set_value(id, value)?;
        Ok(id)
    }

    /// Recursively replace this node's content with a structural deep
    /// copy of `src_node` from another tree.
    ///
    /// Variants must match. Fixed-slot composites recurse pairwise into
    /// their existing children, so slot node ids stay stable; lists drop
    /// their children and deep-copy the source's.
    pub fn copy_from(&mut self, dst: NodeId, src: &Tree, src_node: NodeId) -> Result<()> {
        self.check_open()?;
        self.copy_from_inner(dst, src, src_node)
    }

    fn copy_from_inner(&mut self, dst: NodeId, src: &Tree, src_node: NodeId) -> Result<()> {
        let dst_tag = self.tag(dst);
        let src_tag = src.tag(src_node);
        if dst_tag != src_tag {
            return Err(TreeError::VariantMismatch {
                expected: dst_tag,
                found: src_tag,
            });
        }
        match dst_tag {
            NodeTag::Value => {
                let value = src
                    .value(src_node)
                    .cloned()
                    .expect("value node without scalar payload");
                self.data_mut(dst).kind = NodeKind::Value(value);
            }
            NodeTag::List => {
                let (dst_elem, _) = self.list_parts(dst)?;
                let (src_elem, src_children) = src.list_parts(src_node)?;
                if dst_elem != src_elem {
                    return Err(TreeError::ElementMismatch {
                        expected: dst_elem,
                        found: src_elem,
                    });
                }
                let src_children = src_children.to_vec();
                let copies: Vec<NodeId> = src_children
                    .iter()
                    .map(|&c| self.deep_copy_into(dst, src, c))
                    .collect();
                match &mut self.data_mut(dst).kind {
                    NodeKind::List { children, .. } => *children = copies,
                    _ => unreachable!("list_parts checked the variant"),
                }
            }
            _ => {
                let dst_children = self.children(dst).to_vec();
                let src_children = src.children(src_node).to_vec();
                for (d, s) in dst_children.into_iter().zip(src_children) {
                    self.copy_from_inner(d, src, s)?;
                }
            }
        }
        Ok(())
    }

    /// Insert deep copies of another list's children at `index`,
    /// shifting existing children right. `index` may equal the length.
    pub fn insert_copy(
        &mut self,
        list: NodeId,
        index: usize,
        src: &Tree,
        src_list: NodeId,
    ) -> Result<()> {
        self.check_open()?;
        let (dst_elem, dst_children) = self.list_parts(list)?;
        let len = dst_children.len();
        let (src_elem, src_children) = src.list_parts(src_list)?;
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }
        if dst_elem != src_elem {
            return Err(TreeError::ElementMismatch {
                expected: dst_elem,
                found: src_elem,
            });
        }
        let src_children = src_children.to_vec();
        let copies: Vec<NodeId> = src_children
            .iter()
            .map(|&c| self.deep_copy_into(list, src, c))
            .collect();
        match &mut self.data_mut(list).kind {
            NodeKind::List { children, .. } => {
                children.splice(index..index, copies);
            }
            _ => unreachable!("list_parts checked the variant"),
        }
        Ok(())
    }

    /// Remove the half-open range `[start, end)` from a list.
    ///
    /// A no-op when `start == end`. Removed subtrees stay in the arena
    /// until the tree is dropped but are no longer reachable.
    pub fn remove(&mut self, list: NodeId, start: usize, end: usize) -> Result<()> {
        self.check_open()?;
        let (_, children) = self.list_parts(list)?;
        let len = children.len();
        if start > end || end > len {
            return Err(TreeError::InvalidRange { start, end, len });
        }
        if start == end {
            return Ok(());
        }
        match &mut self.data_mut(list).kind {
            NodeKind::List { children, .. } => {
                children.drain(start..end);
            }
            _ => unreachable!("list_parts checked the variant"),
        }
        Ok(())
    }

    // ----- detached copies -----

    /// Detached deep copy of a subtree.
    ///
    /// The snapshot shares no node identity with this tree and is not
    /// gated: producing it mutates nothing live. The returned tree
    /// carries the same gate handle, so later mutation of the snapshot
    /// follows the usual phase rules.
    pub fn snapshot(&self, node: NodeId) -> Tree {
        let mut out = Tree {
            nodes: Vec::new(),
            root: NodeId::NONE,
            gate: self.gate.clone(),
        };
        out.root = out.deep_copy_into(NodeId::NONE, self, node);
        out
    }

    /// Detached list holding deep copies of `[start, end)` of a list node
    pub fn snapshot_slice(&self, list: NodeId, start: usize, end: usize) -> Result<Tree> {
        let (elem, children) = self.list_parts(list)?;
        let len = children.len();
        if start > end || end > len {
            return Err(TreeError::InvalidRange { start, end, len });
        }
        let children = children[start..end].to_vec();
        let mut out = Tree {
            nodes: Vec::new(),
            root: NodeId::NONE,
            gate: self.gate.clone(),
        };
        let root = out.alloc_list(elem, NodeId::NONE);
        out.root = root;
        let copies: Vec<NodeId> = children
            .iter()
            .map(|&c| out.deep_copy_into(root, self, c))
            .collect();
        match &mut out.data_mut(root).kind {
            NodeKind::List { children, .. } => *children = copies,
            _ => unreachable!("root was allocated as a list"),
        }
        Ok(out)
    }

    // ----- internals -----

    fn check_open(&self) -> Result<()> {
        if self.gate.is_open() {
            Ok(())
        } else {
            Err(TreeError::ModificationForbidden)
        }
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0 as usize]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0 as usize]
    }

    fn list_parts(&self, id: NodeId) -> Result<(NodeTag, &[NodeId])> {
        match &self.data(id).kind {
            NodeKind::List { elem, children } => Ok((*elem, children)),
            other => Err(TreeError::NotAList { found: other.tag() }),
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("arena exceeds u32 indices"));
        self.nodes.push(NodeData { parent, kind });
        id
    }

    fn alloc_list(&mut self, elem: NodeTag, parent: NodeId) -> NodeId {
        self.push(
            parent,
            NodeKind::List {
                elem,
                children: Vec::new(),
            },
        )
    }

    fn alloc_value(&mut self, value: Value, parent: NodeId) -> NodeId {
        self.push(parent, NodeKind::Value(value))
    }

    /// Allocate a default subtree of the given variant under `parent`
    fn alloc_default(&mut self, tag: NodeTag, parent: NodeId) -> NodeId {
        match tag {
            NodeTag::Value => self.alloc_value(Value::Str(String::new()), parent),
            NodeTag::List => self.alloc_list(NodeTag::Value, parent),
            NodeTag::Named => {
                let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
                let name = self.alloc_value(Value::Str(String::new()), id);
                let value = self.alloc_default(NodeTag::Value, id);
                self.data_mut(id).kind = NodeKind::Named {
                    children: [name, value],
                };
                id
            }
            NodeTag::Class => {
                let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
                let name = self.alloc_value(Value::Str(String::new()), id);
                let superclass = self.alloc_value(Value::Str(String::new()), id);
                let modifiers = self.alloc_list(NodeTag::Value, id);
                let interfaces = self.alloc_list(NodeTag::Value, id);
                let fields = self.alloc_list(NodeTag::Field, id);
                let methods = self.alloc_list(NodeTag::Method, id);
                self.data_mut(id).kind = NodeKind::Class {
                    children: [name, superclass, modifiers, interfaces, fields, methods],
                };
                id
            }
            NodeTag::Field => {
                let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
                let name = self.alloc_value(Value::Str(String::new()), id);
                let descriptor = self.alloc_value(Value::Str(String::new()), id);
                let modifiers = self.alloc_list(NodeTag::Value, id);
                self.data_mut(id).kind = NodeKind::Field {
                    children: [name, descriptor, modifiers],
                };
                id
            }
            NodeTag::Method => {
                let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
                let name = self.alloc_value(Value::Str(String::new()), id);
                let descriptor = self.alloc_value(Value::Str(String::new()), id);
                let modifiers = self.alloc_list(NodeTag::Value, id);
                let parameters = self.alloc_list(NodeTag::Parameter, id);
                let instructions = self.alloc_list(NodeTag::Instruction, id);
                self.data_mut(id).kind = NodeKind::Method {
                    children: [name, descriptor, modifiers, parameters, instructions],
                };
                id
            }
            NodeTag::Parameter => {
                let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
                let name = self.alloc_value(Value::Str(String::new()), id);
                let modifiers = self.alloc_list(NodeTag::Value, id);
                self.data_mut(id).kind = NodeKind::Parameter {
                    children: [name, modifiers],
                };
                id
            }
            NodeTag::Instruction => {
                let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
                let opcode = self.alloc_value(Value::Int(0), id);
                let operands = self.alloc_list(NodeTag::Value, id);
                self.data_mut(id).kind = NodeKind::Instruction {
                    children: [opcode, operands],
                };
                id
            }
        }
    }

    /// Deep-copy a subtree from `src` into this arena under `parent`,
    /// returning the copy's root. Never touches existing nodes.
    fn deep_copy_into(&mut self, parent: NodeId, src: &Tree, src_node: NodeId) -> NodeId {
        let id = self.push(parent, NodeKind::Value(Value::Bool(false)));
        let kind = match &src.data(src_node).kind {
            NodeKind::Value(v) => NodeKind::Value(v.clone()),
            NodeKind::List { elem, children } => {
                let copies = children
                    .iter()
                    .map(|&c| self.deep_copy_into(id, src, c))
                    .collect();
                NodeKind::List {
                    elem: *elem,
                    children: copies,
                }
            }
            NodeKind::Named { children } => NodeKind::Named {
                children: self.copy_fixed(id, src, children),
            },
            NodeKind::Class { children } => NodeKind::Class {
                children: self.copy_fixed(id, src, children),
            },
            NodeKind::Field { children } => NodeKind::Field {
                children: self.copy_fixed(id, src, children),
            },
            NodeKind::Method { children } => NodeKind::Method {
                children: self.copy_fixed(id, src, children),
            },
            NodeKind::Parameter { children } => NodeKind::Parameter {
                children: self.copy_fixed(id, src, children),
            },
            NodeKind::Instruction { children } => NodeKind::Instruction {
                children: self.copy_fixed(id, src, children),
            },
        };
        self.data_mut(id).kind = kind;
        id
    }

    fn copy_fixed<const N: usize>(
        &mut self,
        parent: NodeId,
        src: &Tree,
        children: &[NodeId; N],
    ) -> [NodeId; N] {
        let mut out = [NodeId::NONE; N];
        for (slot, &child) in out.iter_mut().zip(children) {
            *slot = self.deep_copy_into(parent, src, child);
        }
        out
    }
}

/// Copyable navigation handle: a tree borrow plus a node id.
///
/// The typed accessors (`name`, `superclass`, `methods`, ...) follow the
/// fixed child layout of the composite variants and panic when invoked
/// on a node of the wrong variant; calling them on the wrong node is a
/// programming error, not a recoverable condition.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    pub fn tree(self) -> &'t Tree {
        self.tree
    }

    pub fn id(self) -> NodeId {
        self.id
    }

    pub fn tag(self) -> NodeTag {
        self.tree.tag(self.id)
    }

    pub fn parent(self) -> Option<NodeRef<'t>> {
        let parent = self.tree.parent(self.id)?;
        Some(NodeRef {
            tree: self.tree,
            id: parent,
        })
    }

    pub fn children(self) -> impl Iterator<Item = NodeRef<'t>> {
        let tree = self.tree;
        tree.children(self.id)
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    pub fn child(self, index: usize) -> Option<NodeRef<'t>> {
        let id = *self.tree.children(self.id).get(index)?;
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }

    pub fn len(self) -> usize {
        self.tree.children(self.id).len()
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn value(self) -> Option<&'t Value> {
        self.tree.value(self.id)
    }

    pub fn as_str(self) -> Option<&'t str> {
        self.value().and_then(Value::as_str)
    }

    pub fn as_int(self) -> Option<i64> {
        self.value().and_then(Value::as_int)
    }

    fn fixed(self, index: usize, accessor: &str, allowed: &[NodeTag]) -> NodeRef<'t> {
        let tag = self.tag();
        if !allowed.contains(&tag) {
            panic!("{accessor}() is not defined for {tag:?} nodes");
        }
        self.child(index)
            .expect("composite node missing a fixed child")
    }

    /// Name child of a named, class, field, method or parameter node
    pub fn name(self) -> NodeRef<'t> {
        use NodeTag::*;
        let index = match self.tag() {
            Named => slot::NAMED_NAME,
            Class => slot::CLASS_NAME,
            Field => slot::FIELD_NAME,
            Method => slot::METHOD_NAME,
            Parameter => slot::PARAMETER_NAME,
            tag => panic!("name() is not defined for {tag:?} nodes"),
        };
        self.child(index)
            .expect("composite node missing a fixed child")
    }

    /// Payload child of a named node
    pub fn named_value(self) -> NodeRef<'t> {
        self.fixed(slot::NAMED_VALUE, "named_value", &[NodeTag::Named])
    }

    pub fn superclass(self) -> NodeRef<'t> {
        self.fixed(slot::CLASS_SUPERCLASS, "superclass", &[NodeTag::Class])
    }

    pub fn modifiers(self) -> NodeRef<'t> {
        use NodeTag::*;
        let index = match self.tag() {
            Class => slot::CLASS_MODIFIERS,
            Field => slot::FIELD_MODIFIERS,
            Method => slot::METHOD_MODIFIERS,
            Parameter => slot::PARAMETER_MODIFIERS,
            tag => panic!("modifiers() is not defined for {tag:?} nodes"),
        };
        self.child(index)
            .expect("composite node missing a fixed child")
    }

    pub fn interfaces(self) -> NodeRef<'t> {
        self.fixed(slot::CLASS_INTERFACES, "interfaces", &[NodeTag::Class])
    }

    pub fn fields(self) -> NodeRef<'t> {
        self.fixed(slot::CLASS_FIELDS, "fields", &[NodeTag::Class])
    }

    pub fn methods(self) -> NodeRef<'t> {
        self.fixed(slot::CLASS_METHODS, "methods", &[NodeTag::Class])
    }

    pub fn descriptor(self) -> NodeRef<'t> {
        let index = match self.tag() {
            NodeTag::Field => slot::FIELD_DESCRIPTOR,
            NodeTag::Method => slot::METHOD_DESCRIPTOR,
            tag => panic!("descriptor() is not defined for {tag:?} nodes"),
        };
        self.child(index)
            .expect("composite node missing a fixed child")
    }

    pub fn parameters(self) -> NodeRef<'t> {
        self.fixed(slot::METHOD_PARAMETERS, "parameters", &[NodeTag::Method])
    }

    pub fn instructions(self) -> NodeRef<'t> {
        self.fixed(slot::METHOD_INSTRUCTIONS, "instructions", &[NodeTag::Method])
    }

    pub fn opcode(self) -> NodeRef<'t> {
        self.fixed(slot::INSN_OPCODE, "opcode", &[NodeTag::Instruction])
    }

    pub fn operands(self) -> NodeRef<'t> {
        self.fixed(slot::INSN_OPERANDS, "operands", &[NodeTag::Instruction])
    }
}
