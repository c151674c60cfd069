//! Turning a tree's dirty nodes into a patch against its original buffer.
//!
//! Both patch formats come out of the same walk: everything between dirty nodes is kept from the
//! original, and every dirty node is replaced by its new encoding. Only the sinks differ, one
//! writing copy/append operations and the other writing out the bytes themselves.

use tracing::trace;

use crate::codec::ScalarCodec;
use crate::error::Result;
use crate::patch::{write_append, write_extract, DIFF_FORMAT, REPLACE_FORMAT};
use crate::tree::{NodeId, ValueTree};

/// Which kind of patch to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaFormat {
    Diff,
    Replace,
}

impl DeltaFormat {
    /// Pick a format given how many bytes of the original are covered by dirty nodes. Once the
    /// dirty share reaches `threshold` percent, a full replacement is smaller or close enough.
    pub fn select(dirty_bytes: usize, total_bytes: usize, threshold: u8) -> Self {
        if total_bytes == 0 {
            return DeltaFormat::Replace;
        }
        let percent = dirty_bytes.saturating_mul(100) / total_bytes;
        if percent >= threshold as usize {
            DeltaFormat::Replace
        } else {
            DeltaFormat::Diff
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            DeltaFormat::Diff => DIFF_FORMAT,
            DeltaFormat::Replace => REPLACE_FORMAT,
        }
    }
}

trait DeltaSink {
    /// Keep `original[offset..offset+len]` unchanged.
    fn keep(&mut self, original: &[u8], offset: usize, len: usize) -> Result<()>;
    /// Emit new bytes.
    fn replace(&mut self, bytes: &[u8]) -> Result<()>;
    fn finish(self) -> Vec<u8>;
}

struct DiffSink(Vec<u8>);

impl DeltaSink for DiffSink {
    fn keep(&mut self, _: &[u8], offset: usize, len: usize) -> Result<()> {
        write_extract(&mut self.0, offset, len)
    }

    fn replace(&mut self, bytes: &[u8]) -> Result<()> {
        write_append(&mut self.0, bytes)
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

struct ReplaceSink(Vec<u8>);

impl DeltaSink for ReplaceSink {
    fn keep(&mut self, original: &[u8], offset: usize, len: usize) -> Result<()> {
        self.0.extend_from_slice(&original[offset..offset + len]);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> Result<()> {
        self.0.extend_from_slice(bytes);
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

/// Encode the changes made to `tree` as a patch in the given format.
pub(crate) fn encode<C: ScalarCodec>(tree: &ValueTree<C>, format: DeltaFormat) -> Result<Vec<u8>> {
    let len = tree.buffer().len();
    match format {
        DeltaFormat::Diff => {
            let mut buf = Vec::new();
            buf.push(DIFF_FORMAT);
            walk(tree, DiffSink(buf))
        }
        DeltaFormat::Replace => {
            let mut buf = Vec::with_capacity(len + 1);
            buf.push(REPLACE_FORMAT);
            walk(tree, ReplaceSink(buf))
        }
    }
}

fn walk<C: ScalarCodec, S: DeltaSink>(tree: &ValueTree<C>, mut sink: S) -> Result<Vec<u8>> {
    let original = tree.buffer();
    let mut pos = 0;
    visit(tree, tree.root(), &mut pos, &mut sink)?;
    if pos < original.len() {
        sink.keep(original, pos, original.len() - pos)?;
    }
    Ok(sink.finish())
}

fn visit<C: ScalarCodec, S: DeltaSink>(
    tree: &ValueTree<C>,
    node: NodeId,
    pos: &mut usize,
    sink: &mut S,
) -> Result<()> {
    if tree.is_dirty(node) {
        let span = tree.span(node);
        if *pos < span.offset {
            sink.keep(tree.buffer(), *pos, span.offset - *pos)?;
        }
        let bytes = tree.encode_node(node)?;
        trace!(
            offset = span.offset,
            old_len = span.len,
            new_len = bytes.len(),
            "replacing node"
        );
        sink.replace(&bytes)?;
        *pos = span.end();
    } else {
        for child in tree.resolved_children(node) {
            visit(tree, child, pos, sink)?;
        }
    }
    Ok(())
}
