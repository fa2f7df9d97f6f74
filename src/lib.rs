//! A self-describing binary codec for dynamically typed value graphs.
//!
//! Values form the same universe a host structured-clone algorithm works over: primitives,
//! nested containers, typed byte views, errors, and regular expressions, all of which may share
//! structure or form cycles. [`encode`] and [`decode`] round-trip a [`Value`] through that format;
//! [`Codec`] adds a registry of pluggable extensions for application-defined types.
//!
//! ```
//! use clonewire::Value;
//!
//! let rec = Value::empty_record();
//! rec.set_field("name", Value::str("ada"));
//! let bytes = clonewire::encode(&rec).unwrap();
//! let back = clonewire::decode(&bytes).unwrap();
//! assert_eq!(rec, back);
//! ```

#![allow(clippy::type_complexity)]

extern crate byteorder;
extern crate regex;

mod bigint;
mod codec;
mod container;
mod depth;
pub mod error;
mod extension;
mod tag;
mod value;
mod varint;

pub use self::bigint::BigInt;
pub use self::codec::{decode, encode, Codec, CodecBuilder};
pub use self::container::{Ref, OrderedMap};
pub use self::error::{Error, Result};
pub use self::extension::{define_extension, Extension, ExtensionPayload, ExtensionSet, MAX_EXTENSIONS};
pub use self::value::{ElementKind, ElementView, ErrorKind, ErrorValue, ExtensionInstance, RegexValue, Value};
