//! The patch format produced by [`ValueTree::get_changes`][crate::ValueTree::get_changes].
//!
//! A patch starts with a format byte. A replacement patch ([`REPLACE_FORMAT`]) is followed by the
//! complete new buffer. A diff patch ([`DIFF_FORMAT`]) is followed by a sequence of operations,
//! each starting with its own op byte:
//!
//! - Extract (`0x01`): a 32-bit offset and 32-bit length into the original buffer, whose bytes are
//!   copied to the output.
//! - Append (`0x02`): a 32-bit length followed by that many literal bytes for the output.
//!
//! All integers are little-endian.

use std::convert::TryFrom;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

pub const DIFF_FORMAT: u8 = 0x01;
pub const REPLACE_FORMAT: u8 = 0x02;

const OP_EXTRACT: u8 = 0x01;
const OP_APPEND: u8 = 0x02;

/// One operation of a diff patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchOp<'a> {
    /// Copy a range of the original buffer.
    Extract { offset: usize, len: usize },
    /// Emit these bytes.
    Append(&'a [u8]),
}

/// A patch, split by format.
#[derive(Clone, Debug)]
pub enum Patch<'a> {
    Diff(PatchReader<'a>),
    Replace(&'a [u8]),
}

impl<'a> Patch<'a> {
    pub fn read(patch: &'a [u8]) -> Result<Self> {
        let (&format, rest) = patch
            .split_first()
            .ok_or_else(|| Error::BadPatch(String::from("Patch is empty")))?;
        match format {
            DIFF_FORMAT => Ok(Patch::Diff(PatchReader::new(rest))),
            REPLACE_FORMAT => Ok(Patch::Replace(rest)),
            n => Err(Error::BadPatch(format!("Unknown patch format 0x{:x}", n))),
        }
    }
}

/// Iterator over the operations in the body of a diff patch. Stops after the first error.
#[derive(Clone, Debug)]
pub struct PatchReader<'a> {
    data: &'a [u8],
    errored: bool,
}

impl<'a> PatchReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            errored: false,
        }
    }

    fn read_u32(&mut self, step: &str) -> Result<usize> {
        self.data
            .read_u32::<LittleEndian>()
            .map(|n| n as usize)
            .map_err(|_| Error::BadPatch(format!("Patch ended while reading {}", step)))
    }

    fn parse_op(&mut self, op: u8) -> Result<PatchOp<'a>> {
        match op {
            OP_EXTRACT => {
                let offset = self.read_u32("extract offset")?;
                let len = self.read_u32("extract length")?;
                Ok(PatchOp::Extract { offset, len })
            }
            OP_APPEND => {
                let len = self.read_u32("append length")?;
                if len > self.data.len() {
                    return Err(Error::BadPatch(format!(
                        "Append of {} bytes, but only {} remain",
                        len,
                        self.data.len()
                    )));
                }
                let (bytes, rest) = self.data.split_at(len);
                self.data = rest;
                Ok(PatchOp::Append(bytes))
            }
            n => Err(Error::BadPatch(format!("Unknown patch op 0x{:x}", n))),
        }
    }
}

impl<'a> Iterator for PatchReader<'a> {
    type Item = Result<PatchOp<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        let (&op, data) = self.data.split_first()?;
        self.data = data;
        let result = self.parse_op(op);
        if result.is_err() {
            self.errored = true;
        }
        Some(result)
    }
}

/// Apply a patch to the buffer it was produced from.
pub fn apply_patch(original: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    match Patch::read(patch)? {
        Patch::Replace(bytes) => Ok(bytes.to_vec()),
        Patch::Diff(ops) => {
            let mut out = Vec::with_capacity(original.len());
            for op in ops {
                match op? {
                    PatchOp::Extract { offset, len } => {
                        let range = offset
                            .checked_add(len)
                            .and_then(|end| original.get(offset..end))
                            .ok_or_else(|| {
                                Error::BadPatch(format!(
                                    "Extract of {} bytes at {} runs past the original {} bytes",
                                    len,
                                    offset,
                                    original.len()
                                ))
                            })?;
                        out.extend_from_slice(range);
                    }
                    PatchOp::Append(bytes) => out.extend_from_slice(bytes),
                }
            }
            Ok(out)
        }
    }
}

fn patch_u32(n: usize, what: &str) -> Result<[u8; 4]> {
    u32::try_from(n)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::BadPatch(format!("{} {} doesn't fit in a patch", what, n)))
}

pub(crate) fn write_extract(buf: &mut Vec<u8>, offset: usize, len: usize) -> Result<()> {
    buf.push(OP_EXTRACT);
    buf.extend_from_slice(&patch_u32(offset, "Offset")?);
    buf.extend_from_slice(&patch_u32(len, "Length")?);
    Ok(())
}

pub(crate) fn write_append(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    buf.push(OP_APPEND);
    buf.extend_from_slice(&patch_u32(bytes.len(), "Length")?);
    buf.extend_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diff() {
        let original = b"hello, world";
        let mut patch = vec![DIFF_FORMAT];
        write_extract(&mut patch, 0, 7).unwrap();
        write_append(&mut patch, b"there").unwrap();
        assert_eq!(apply_patch(original, &patch).unwrap(), b"hello, there");

        match Patch::read(&patch).unwrap() {
            Patch::Diff(ops) => {
                let ops: Vec<_> = ops.collect::<Result<_>>().unwrap();
                assert_eq!(
                    ops,
                    vec![
                        PatchOp::Extract { offset: 0, len: 7 },
                        PatchOp::Append(b"there")
                    ]
                );
            }
            Patch::Replace(_) => panic!("Expected a diff patch"),
        }
    }

    #[test]
    fn replace() {
        let patch = [REPLACE_FORMAT, 1, 2, 3];
        assert_eq!(apply_patch(b"anything", &patch).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn bad_patches() {
        assert!(apply_patch(b"abc", &[]).is_err());
        assert!(apply_patch(b"abc", &[0x07]).is_err());
        // Extract past the end
        let mut patch = vec![DIFF_FORMAT];
        write_extract(&mut patch, 2, 2).unwrap();
        assert!(matches!(apply_patch(b"abc", &patch), Err(Error::BadPatch(_))));
        // Truncated append
        let patch = [DIFF_FORMAT, OP_APPEND, 4, 0, 0, 0, 1];
        assert!(apply_patch(b"abc", &patch).is_err());
        // Unknown op
        let patch = [DIFF_FORMAT, 0x09];
        assert!(apply_patch(b"abc", &patch).is_err());
    }

    #[test]
    fn reader_stops_after_error() {
        let mut reader = PatchReader::new(&[0x09, OP_APPEND, 0, 0, 0, 0]);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
