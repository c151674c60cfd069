//! cachepack keeps encoded values in a binary format and lets them be read and edited in place,
//! without decoding or re-encoding any more of them than necessary. The goal is to make a
//! cache entry cheap to inspect and cheap to update, and to ship only what changed.
//!
//! To meet this goal, it provides:
//!
//! - A [`ValueTree`] over an immutable encoded buffer
//! 	- Only the root is parsed up front; children are parsed when first asked for by index
//! 	- Child lookups resume from the nearest already-parsed sibling, so walking a container
//! 		front to back costs one pass
//! 	- Values are decoded on first read and cached
//! - In-place mutation with dirty tracking
//! 	- Writing a value marks that node dirty and counts the original bytes it displaces
//! 	- [`ValueTree::get_changes`] produces a patch against the original buffer: either a diff of
//! 		copy/append operations, or a flat replacement once most of the bytes have changed
//! 	- [`apply_patch`] rebuilds the new buffer from the original and a patch
//! - Shared and cyclic values through integer identities and references
//! - A pluggable [`ScalarCodec`] for the payloads of scalar values
//! - Serde support for reading any node as a `Deserialize` type and writing any `Serialize` type
//! 	into a node, with user types resolved through a [`TypeContext`]

mod codec;
mod context;
mod delta;
mod depth_tracking;
mod encode;
mod error;
mod marker;
mod options;
mod parse;
mod registry;
mod tree;
mod value;

pub mod de;
pub mod patch;
pub mod ser;

pub use self::codec::{ScalarCodec, WireCodec};
pub use self::context::TypeContext;
pub use self::delta::DeltaFormat;
pub use self::encode::encode;
pub use self::error::{Error, Result};
pub use self::marker::{Marker, TypeTag};
pub use self::options::TreeOptions;
pub use self::patch::{apply_patch, Patch, PatchOp, PatchReader};
pub use self::registry::ReferenceRegistry;
pub use self::tree::{NodeId, Span, ValueTree};
pub use self::value::Value;

/// The maximum nesting depth of composite values accepted by default.
pub const MAX_DEPTH: usize = 100;

/// The maximum number of values a single read may produce by expanding references.
pub const MAX_EXPANDED_VALUES: usize = 1 << 20;

/// Default percentage of dirty bytes at which a patch becomes a flat replacement.
pub const DEFAULT_REPLACE_THRESHOLD: u8 = 67;
