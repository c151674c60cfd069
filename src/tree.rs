//! The lazily parsed value tree.
//!
//! A [`ValueTree`] sits on top of an immutable encoded buffer. Parsing it reads only the root's
//! header and walks over its body to find where it ends; children become nodes only when someone
//! asks for them by index, and values are only decoded when read. Writing a value into a node
//! marks it dirty, and [`ValueTree::get_changes`] turns the dirty nodes into a patch against the
//! original buffer.
//!
//! Nodes live in an arena owned by the tree and are addressed by [`NodeId`]. A `NodeId` is only
//! meaningful to the tree that handed it out; passing it to any other tree may panic.
//!
//! ```
//! # use std::sync::Arc;
//! # use cachepack::*;
//! # fn main() -> Result<()> {
//! let value = Value::UniformArray(TypeTag::I32, vec![10i32.into(), 20i32.into(), 30i32.into()]);
//! let original = encode(&value)?;
//!
//! let mut tree = ValueTree::parse(original.clone(), Arc::new(TypeContext::new()), 0)?;
//! let second = tree.get_child(tree.root(), 1)?;
//! assert_eq!(tree.get_value(second)?, &Value::I32(20));
//!
//! tree.set_value(second, 99i32)?;
//! let patch = tree.get_changes(tree.root())?.unwrap();
//! let updated = apply_patch(&original, &patch)?;
//! assert_eq!(
//!     updated,
//!     encode(&Value::UniformArray(TypeTag::I32, vec![10i32.into(), 99i32.into(), 30i32.into()]))?
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};

use crate::codec::{ScalarCodec, WireCodec};
use crate::context::TypeContext;
use crate::delta::{self, DeltaFormat};
use crate::encode::{encode_tagged, encode_untagged};
use crate::error::{Error, Result};
use crate::marker::TypeTag;
use crate::options::TreeOptions;
use crate::parse::{assemble, read_u32, Body, Head, Layout, Scanner, Shape};
use crate::patch::apply_patch;
use crate::registry::ReferenceRegistry;
use crate::value::Value;

/// Handle to one node of a [`ValueTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// A range of bytes in a tree's original buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    /// The position just past the end of the span.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Clone, Debug)]
enum NodeKind {
    Simple {
        payload: usize,
    },
    Complex {
        shape: Shape,
        /// Children resolved so far, by index.
        children: BTreeMap<usize, NodeId>,
    },
}

#[derive(Clone, Debug)]
struct Node {
    span: Span,
    tag: TypeTag,
    identity: Option<u32>,
    parent: Option<NodeId>,
    /// `None` until the value is first read or written.
    cached: Option<Value>,
    dirty: bool,
    kind: NodeKind,
}

/// A lazily parsed, mutable view over an encoded value.
#[derive(Clone, Debug)]
pub struct ValueTree<C = WireCodec> {
    buf: Arc<[u8]>,
    codec: C,
    context: Arc<TypeContext>,
    options: TreeOptions,
    nodes: Vec<Node>,
    registry: Option<ReferenceRegistry<Span>>,
    dirty_nodes: usize,
    dirty_bytes: usize,
    skipped: usize,
    /// Values the current read may still produce by expanding references.
    budget: usize,
}

impl ValueTree {
    /// Parse the value starting at `offset` in `buf`, using the default options.
    ///
    /// Only the root is parsed, but its whole body is walked over to find where it ends, so
    /// malformed structure anywhere in the value is caught here.
    pub fn parse(
        buf: impl Into<Arc<[u8]>>,
        context: Arc<TypeContext>,
        offset: usize,
    ) -> Result<Self> {
        Self::parse_with_options(buf, context, offset, TreeOptions::default())
    }

    pub fn parse_with_options(
        buf: impl Into<Arc<[u8]>>,
        context: Arc<TypeContext>,
        offset: usize,
        options: TreeOptions,
    ) -> Result<Self> {
        Self::with_codec(buf, context, offset, options, WireCodec)
    }
}

impl<C: ScalarCodec> ValueTree<C> {
    /// Parse a tree using a specific scalar codec.
    pub fn with_codec(
        buf: impl Into<Arc<[u8]>>,
        context: Arc<TypeContext>,
        offset: usize,
        options: TreeOptions,
        codec: C,
    ) -> Result<Self> {
        let mut tree = Self {
            buf: buf.into(),
            codec,
            context,
            options,
            nodes: Vec::new(),
            registry: None,
            dirty_nodes: 0,
            dirty_bytes: 0,
            skipped: 0,
            budget: 0,
        };
        let mut scanner = Scanner::new(
            &tree.buf,
            &tree.codec,
            &mut tree.registry,
            tree.options.max_depth,
        );
        let head = scanner.read_head(offset, None)?;
        let end = scanner.finish(&head)?;
        tree.push_node(head, end, None);
        Ok(tree)
    }

    fn push_node(&mut self, head: Head, end: usize, parent: Option<NodeId>) -> NodeId {
        let kind = match head.body {
            Body::Scalar { payload, .. } => NodeKind::Simple { payload },
            Body::Composite(shape) => NodeKind::Complex {
                shape,
                children: BTreeMap::new(),
            },
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            span: Span {
                offset: head.offset,
                len: end - head.offset,
            },
            tag: head.tag,
            identity: head.identity,
            parent,
            cached: None,
            dirty: false,
            kind,
        });
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// The type the node was encoded as.
    pub fn tag(&self, node: NodeId) -> TypeTag {
        self.nodes[node.0].tag
    }

    /// Where the node sits in the original buffer. This doesn't change when the node is written
    /// to.
    pub fn span(&self, node: NodeId) -> Span {
        self.nodes[node.0].span
    }

    /// The identity the node was encoded with, if it is a shared value.
    pub fn identity(&self, node: NodeId) -> Option<u32> {
        self.nodes[node.0].identity
    }

    pub fn is_dirty(&self, node: NodeId) -> bool {
        self.nodes[node.0].dirty
    }

    pub fn is_composite(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Complex { .. })
    }

    /// Number of children of a composite node. For maps, keys and values are counted separately.
    pub fn child_count(&self, node: NodeId) -> Result<usize> {
        match &self.nodes[node.0].kind {
            NodeKind::Complex { shape, .. } => Ok(shape.count),
            NodeKind::Simple { .. } => Err(Error::NotNavigable),
        }
    }

    /// Get child `index` of a composite node, parsing it if it hasn't been yet.
    ///
    /// Map children alternate between keys and values. Sparse array children are only the
    /// entries present, in order.
    ///
    /// Fails with [`Error::NotNavigable`] if the node is a scalar, or is a composite that has been
    /// overwritten.
    pub fn get_child(&mut self, node: NodeId, index: usize) -> Result<NodeId> {
        let parent = &self.nodes[node.0];
        if parent.dirty {
            return Err(Error::NotNavigable);
        }
        let (shape, children) = match &parent.kind {
            NodeKind::Complex { shape, children } => (*shape, children),
            NodeKind::Simple { .. } => return Err(Error::NotNavigable),
        };
        if index >= shape.count {
            return Err(Error::IndexOutOfRange {
                index,
                len: shape.count,
            });
        }
        if let Some(child) = children.get(&index) {
            return Ok(*child);
        }

        // Resume right after the closest resolved child before this one.
        let (mut current, mut pos) = match children.range(..index).next_back() {
            Some((i, child)) => (i + 1, self.nodes[child.0].span.end()),
            None => (0, shape.start),
        };
        trace!(
            offset = parent.span.offset,
            index,
            resume = pos,
            "scanning for child"
        );

        let mut scanner = Scanner::new(
            &self.buf,
            &self.codec,
            &mut self.registry,
            self.options.max_depth,
        );
        while current < index {
            pos = scanner.skip_entry(pos, &shape)?;
            current += 1;
            self.skipped += 1;
        }
        let start = scanner.entry_start(pos, &shape)?;
        let head = scanner.read_head(start, shape.element())?;
        let end = scanner.finish(&head)?;

        let child = self.push_node(head, end, Some(node));
        if let NodeKind::Complex { children, .. } = &mut self.nodes[node.0].kind {
            children.insert(index, child);
        }
        Ok(child)
    }

    /// Children that have been resolved so far, in index order.
    pub(crate) fn resolved_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let children = match &self.nodes[node.0].kind {
            NodeKind::Complex { children, .. } => Some(children.values().copied()),
            NodeKind::Simple { .. } => None,
        };
        children.into_iter().flatten()
    }

    /// Get the node's value, decoding it if it hasn't been read yet.
    ///
    /// Fails with [`Error::ParseLimit`] if expanding references inside the value would produce
    /// more than [`TreeOptions::max_expanded_values`] values.
    pub fn get_value(&mut self, node: NodeId) -> Result<&Value> {
        self.budget = self.options.max_expanded_values;
        self.read_value(node)
    }

    fn read_value(&mut self, node: NodeId) -> Result<&Value> {
        let value = match self.nodes[node.0].cached.take() {
            Some(value) => value,
            None => self.materialize(node)?,
        };
        Ok(self.nodes[node.0].cached.insert(value))
    }

    /// Get the node's value converted to `tag`. Conversions are never cached; only the node's
    /// own value is.
    pub fn get_value_as(&mut self, node: NodeId, tag: TypeTag) -> Result<Value> {
        self.get_value(node)?.coerce(tag)
    }

    /// The node's value, if it has already been read or written.
    pub fn cached_value(&self, node: NodeId) -> Option<&Value> {
        self.nodes[node.0].cached.as_ref()
    }

    fn materialize(&mut self, node: NodeId) -> Result<Value> {
        let (tag, span) = {
            let n = &self.nodes[node.0];
            (n.tag, n.span)
        };
        match self.nodes[node.0].kind {
            NodeKind::Simple { payload } => {
                let (value, _) = self.codec.decode(tag, &self.buf[payload..span.end()])?;
                match value {
                    Value::Reference(id) => self.resolve_reference(node, id),
                    value => Ok(value),
                }
            }
            NodeKind::Complex { shape, .. } => {
                let mut items = Vec::with_capacity(shape.count);
                let mut indices = Vec::new();
                for i in 0..shape.count {
                    let child = self.get_child(node, i)?;
                    if let Layout::Sparse(_) = shape.layout {
                        let child_offset = self.nodes[child.0].span.offset;
                        indices.push(read_u32(&self.buf, child_offset - 4, "read sparse index")?);
                    }
                    items.push(self.read_value(child)?.clone());
                }
                assemble(tag, shape.layout, items, indices)
            }
        }
    }

    fn resolve_reference(&mut self, node: NodeId, id: u32) -> Result<Value> {
        let target = *self
            .registry
            .as_ref()
            .ok_or(Error::UnknownIdentity(id))?
            .lookup(id)?;
        let offset = self.nodes[node.0].span.offset;
        if target.offset <= offset && offset < target.end() {
            // Points back at a value this node is part of.
            return Ok(Value::Reference(id));
        }
        let mut scanner = Scanner::new(
            &self.buf,
            &self.codec,
            &mut self.registry,
            self.options.max_depth,
        )
        .with_budget(self.budget);
        let (value, _) = scanner.decode_value(target.offset, None, &mut vec![id])?;
        self.budget = scanner.budget();
        Ok(value)
    }

    /// The element type, if `node` is an element of a uniform array.
    fn uniform_element(&self, node: NodeId) -> Option<TypeTag> {
        let parent = self.nodes[node.0].parent?;
        match &self.nodes[parent.0].kind {
            NodeKind::Complex { shape, .. } => shape.element(),
            NodeKind::Simple { .. } => None,
        }
    }

    /// Overwrite the node's value and mark it dirty.
    ///
    /// Elements of uniform arrays are converted to the array's element type here, failing with
    /// [`Error::TypeMismatch`] if they can't be. Nodes below an overwritten composite can no
    /// longer be written to, and fail with [`Error::Detached`].
    pub fn set_value(&mut self, node: NodeId, value: impl Into<Value>) -> Result<()> {
        let mut ancestor = self.nodes[node.0].parent;
        while let Some(id) = ancestor {
            if self.nodes[id.0].dirty {
                return Err(Error::Detached);
            }
            ancestor = self.nodes[id.0].parent;
        }

        let mut value = value.into();
        if let Some(element) = self.uniform_element(node) {
            value = value.coerce(element)?;
        }

        let n = &mut self.nodes[node.0];
        n.cached = Some(value);
        if !n.dirty {
            n.dirty = true;
            self.dirty_nodes += 1;
            self.dirty_bytes += n.span.len;
        }

        // Ancestors now hold stale values.
        let mut ancestor = self.nodes[node.0].parent;
        while let Some(id) = ancestor {
            self.nodes[id.0].cached = None;
            ancestor = self.nodes[id.0].parent;
        }
        Ok(())
    }

    /// Number of nodes that have been written to.
    pub fn dirty_node_count(&self) -> usize {
        self.dirty_nodes
    }

    /// Bytes of the original buffer covered by nodes that have been written to.
    pub fn dirty_byte_count(&self) -> usize {
        self.dirty_bytes
    }

    /// Encode the changes made since parsing as a patch against the original buffer, or `None`
    /// if nothing has changed. Only the root can do this.
    pub fn get_changes(&self, node: NodeId) -> Result<Option<Vec<u8>>> {
        if node != self.root() {
            return Err(Error::NotRoot);
        }
        if self.dirty_nodes == 0 {
            return Ok(None);
        }
        if self.registry.as_ref().map_or(false, |r| !r.is_empty()) {
            return Err(Error::ReferencesUnsupported);
        }
        let format = DeltaFormat::select(
            self.dirty_bytes,
            self.buf.len(),
            self.options.replace_threshold,
        );
        debug!(
            dirty_nodes = self.dirty_nodes,
            dirty_bytes = self.dirty_bytes,
            total_bytes = self.buf.len(),
            ?format,
            "encoding changes"
        );
        delta::encode(self, format).map(Some)
    }

    /// Produce the complete new buffer, with all changes applied.
    pub fn apply_changes(&self, node: NodeId) -> Result<Vec<u8>> {
        match self.get_changes(node)? {
            Some(patch) => apply_patch(&self.buf, &patch),
            None => Ok(self.buf.to_vec()),
        }
    }

    /// The node's encoding as it would now appear in the buffer. Nodes that haven't been written
    /// to return their original bytes.
    pub fn encode_node(&self, node: NodeId) -> Result<Vec<u8>> {
        let n = &self.nodes[node.0];
        let value = match &n.cached {
            Some(value) if n.dirty => value,
            _ => return Ok(self.buf[n.span.offset..n.span.end()].to_vec()),
        };
        let mut out = Vec::new();
        match self.uniform_element(node) {
            Some(element) => encode_untagged(&self.codec, element, value, &mut out)?,
            None => encode_tagged(&self.codec, value, &mut out)?,
        }
        Ok(out)
    }

    /// Read the node into any deserializable type.
    pub fn deserialize<T: DeserializeOwned>(&mut self, node: NodeId) -> Result<T> {
        let context = Arc::clone(&self.context);
        let value = self.get_value(node)?;
        crate::de::from_value(value, &context)
    }

    /// Write any serializable type into the node. Works like [`set_value`][Self::set_value]
    /// otherwise.
    pub fn set_serialized<T: Serialize + ?Sized>(&mut self, node: NodeId, value: &T) -> Result<()> {
        let value = crate::ser::to_value(value, &self.context)?;
        self.set_value(node, value)
    }

    /// The original buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn context(&self) -> &TypeContext {
        &self.context
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// The identities seen so far. Since parsing walks the whole root value, this holds every
    /// identity in it.
    pub fn registry(&self) -> Option<&ReferenceRegistry<Span>> {
        self.registry.as_ref()
    }

    /// Number of nodes parsed so far, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children walked over without being resolved, across all child lookups.
    pub(crate) fn children_skipped(&self) -> usize {
        self.skipped
    }
}
