//! Library error types.
//!
use std::fmt;

use crate::bigint::BigInt;

/// A clonewire `Result`, normally returning a clonewire [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A clonewire error. Encompasses any issue that can happen during encoding or decoding.
#[derive(Clone, Debug)]
pub enum Error {
    /// A raw host value was outside the value universe, and no registered extension's `accepts`
    /// claimed it. Carries a debug rendering of the offending value, since by definition it is
    /// not itself a [`Value`](crate::value::Value).
    NotSerializable(String),
    /// A big integer's magnitude exceeded 255 64-bit chunks (~2 kB).
    BigIntTooLarge(BigInt),
    /// A sequence had extra own keys or empty slots and can't be encoded.
    MalformedSequence,
    /// The decoder encountered an extension tag whose name isn't registered on this codec.
    IncompatibleCodec(String),
    /// The input was truncated, had an unrecognized tag, contained invalid UTF-8, or nested
    /// deeper than the recursion guard allows.
    CorruptInput(&'static str),
    /// More than 128 extensions were registered on one codec.
    TooManyExtensions,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotSerializable(v) => write!(f, "value is not serializable: {}", v),
            Error::BigIntTooLarge(v) => {
                write!(f, "big integer too large: {} 64-bit chunks", v.chunk_len())
            }
            Error::MalformedSequence => write!(f, "sequence has extraneous keys or empty slots"),
            Error::IncompatibleCodec(name) => {
                write!(f, "no extension named {:?} is registered on this codec", name)
            }
            Error::CorruptInput(reason) => write!(f, "corrupt input: {}", reason),
            Error::TooManyExtensions => {
                write!(f, "more than 128 extensions registered on one codec")
            }
        }
    }
}

impl std::error::Error for Error {}
