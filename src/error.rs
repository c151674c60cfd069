use std::fmt;

use serde::{de, ser};

use crate::marker::TypeTag;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A child was requested from a terminal value, or from a composite that has been overwritten
    /// and is no longer backed by the original bytes.
    NotNavigable,
    /// A reference pointed at an identity that was never registered.
    UnknownIdentity(u32),
    /// An identity was registered a second time, bound to a different value.
    DuplicateIdentity(u32),
    /// A delta or apply operation was invoked on a node other than the root.
    NotRoot,
    /// Delta computation was requested on a tree whose graph uses shared or cyclic references.
    ReferencesUnsupported,
    /// A value could not be read as, or converted to, the requested type.
    TypeMismatch {
        expected: TypeTag,
        actual: TypeTag,
    },
    /// A child index past the end of its container was requested.
    IndexOutOfRange { index: usize, len: usize },
    /// A node below an overwritten ancestor was mutated. Its change could never reach the delta.
    Detached,
    /// Basic wire encoding failure
    BadEncode(String),
    /// Data ended before a value could be fully read.
    LengthTooShort {
        step: &'static str,
        actual: usize,
        expected: usize,
    },
    /// Parsing hit the nesting depth limit.
    ParseLimit(String),
    /// A patch was malformed, or referenced bytes outside the original buffer.
    BadPatch(String),
    /// Occurs when serde serialization or deserialization fails
    SerdeFail(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::NotNavigable => f.write_str("Value has no navigable children"),
            Error::UnknownIdentity(id) => write!(f, "No value registered for identity {}", id),
            Error::DuplicateIdentity(id) => {
                write!(f, "Identity {} is already bound to a different value", id)
            }
            Error::NotRoot => f.write_str("Operation is only valid on the root node"),
            Error::ReferencesUnsupported => {
                f.write_str("Delta computation is not supported for graphs with shared references")
            }
            Error::TypeMismatch { expected, actual } => {
                write!(f, "Expected a value of type {}, but found {}", expected, actual)
            }
            Error::IndexOutOfRange { index, len } => write!(
                f,
                "Child index {} is out of range for a container of {} children",
                index, len
            ),
            Error::Detached => f.write_str("Value lies below an overwritten ancestor"),
            Error::BadEncode(ref err) => write!(f, "Basic data encoding failure: {}", err),
            Error::LengthTooShort {
                step,
                actual,
                expected,
            } => write!(
                f,
                "Expected data length {}, but got {} on step [{}]",
                expected, actual, step
            ),
            Error::ParseLimit(ref err) => write!(f, "Hit parsing limit: {}", err),
            Error::BadPatch(ref err) => write!(f, "Malformed patch: {}", err),
            Error::SerdeFail(ref msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::SerdeFail(msg.to_string())
    }
}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::SerdeFail(msg.to_string())
    }
}
