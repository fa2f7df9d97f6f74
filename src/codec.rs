//! The recursive encoder and decoder: the wire format's tag table, varint-prefixed lengths, and
//! the reference table that gives the format structural sharing and cycles.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bigint::{self, BigInt};
use crate::container::new_ref;
use crate::depth::DepthGuard;
use crate::error::{Error, Result};
use crate::extension::{wrap_instance, Extension, ExtensionSet};
use crate::tag::Tag;
use crate::value::{ElementKind, ElementView, ErrorKind, ErrorValue, RegexValue, Value};
use crate::varint;

/// Cap on how much we'll eagerly reserve for a length-prefixed container before we've actually
/// read that many items. An attacker-controlled prefix of, say, `u32::MAX` should fail once the
/// input genuinely runs out, not after we've tried to allocate gigabytes up front.
const RESERVE_CAP: usize = 4096;

/// A configured set of extensions, ready to encode and decode against. `C` is the context type
/// threaded through every extension call; most users want the zero-sized `()` default via the
/// free [`encode`]/[`decode`] functions rather than building a `Codec` directly.
pub struct Codec<C = ()> {
    extensions: ExtensionSet<C>,
}

impl Codec<()> {
    pub fn builder() -> CodecBuilder<()> {
        CodecBuilder::new()
    }
}

impl<C> Codec<C> {
    pub fn encode_with(&self, value: &Value, context: &mut C) -> Result<Vec<u8>> {
        let mut enc = Encoder {
            out: Vec::new(),
            refs: Vec::new(),
            depth: 0,
            extensions: &self.extensions,
            context,
        };
        enc.encode_value(value)?;
        Ok(enc.out)
    }

    pub fn decode_with(&self, bytes: &[u8], context: &mut C) -> Result<Value> {
        let mut dec = Decoder {
            input: bytes,
            refs: Vec::new(),
            depth: 0,
            extensions: &self.extensions,
            context,
        };
        let value = dec.decode_value()?;
        Ok(value)
    }

    /// Lift a raw host value into the value universe by finding the first registered extension
    /// whose `accepts` claims it (§4.8: registration order is predicate priority).
    ///
    /// Fails with [`Error::NotSerializable`] if no registered extension accepts `raw` — the
    /// value is outside the universe this codec can represent. On success, `raw` is wrapped
    /// as-is as a [`Value::Extension`]; the accepting extension's `to_reduced` only runs when
    /// this value is actually encoded.
    pub fn lift<T: crate::extension::ExtensionPayload>(
        &self,
        raw: std::rc::Rc<T>,
    ) -> Result<Value> {
        let name = self
            .extensions
            .find_acceptor(raw.as_any())
            .map(|ext| ext.name().to_string())
            .ok_or_else(|| Error::NotSerializable(format!("{:?}", raw)))?;
        Ok(crate::extension::wrap_instance(name, raw as std::rc::Rc<dyn crate::extension::ExtensionPayload>))
    }
}

/// Builds a [`Codec`] by registering extensions in priority order.
pub struct CodecBuilder<C> {
    extensions: ExtensionSet<C>,
}

impl<C> CodecBuilder<C> {
    pub fn new() -> Self {
        CodecBuilder { extensions: ExtensionSet::new() }
    }

    /// Register an extension. Extensions are tried in registration order on encode; the first
    /// whose `accepts` matches wins.
    pub fn push(mut self, ext: Box<dyn Extension<C>>) -> Result<Self> {
        self.extensions.push(ext)?;
        Ok(self)
    }

    pub fn build(self) -> Codec<C> {
        Codec { extensions: self.extensions }
    }
}

impl<C> Default for CodecBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `value` with no extensions registered.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Codec::<()>::builder().build().encode_with(value, &mut ())
}

/// Decode a single value from `bytes`, with no extensions registered. Trailing bytes after the
/// value are ignored, matching the top-level entry point's "decode one value" contract.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    Codec::<()>::builder().build().decode_with(bytes, &mut ())
}

struct Encoder<'a, C> {
    out: Vec<u8>,
    refs: Vec<Value>,
    depth: usize,
    extensions: &'a ExtensionSet<C>,
    context: &'a mut C,
}

impl<C> Encoder<'_, C> {
    fn write_tag(&mut self, t: Tag) {
        self.out.push(t.into_u8());
    }

    fn write_str(&mut self, s: &str) {
        varint::write(&mut self.out, s.len() as u64);
        self.out.extend_from_slice(s.as_bytes());
    }

    /// Write `s` as a full tagged string: `Str` tag, then length-prefixed UTF-8. Every string
    /// position in the format (record keys, regex source/flags, error message/stack, extension
    /// names) uses this, per spec §4.3/§4.5/§4.8's identical "full tagged string" wording.
    fn write_tagged_str(&mut self, s: &str) {
        self.write_tag(Tag::Str);
        self.write_str(s);
    }

    fn find_backref(&self, v: &Value) -> Option<usize> {
        self.refs.iter().position(|r| r.same_identity(v))
    }

    fn encode_value(&mut self, v: &Value) -> Result<()> {
        if v.is_referrable() {
            if let Some(idx) = self.find_backref(v) {
                self.write_tag(Tag::BackReference);
                varint::write(&mut self.out, idx as u64);
                return Ok(());
            }
        }
        let _guard = DepthGuard::enter(&mut self.depth)?;
        match v {
            Value::Null => self.write_tag(Tag::Null),
            Value::Undefined => self.write_tag(Tag::Undefined),
            Value::Bool(true) => self.write_tag(Tag::True),
            Value::Bool(false) => self.write_tag(Tag::False),
            Value::Number(n) => {
                self.write_tag(Tag::Number);
                self.out.write_f64::<BigEndian>(*n).expect("writing to a Vec never fails");
            }
            Value::Date(t) => {
                self.write_tag(Tag::Date);
                self.out.write_f64::<BigEndian>(*t).expect("writing to a Vec never fails");
            }
            Value::Str(s) => {
                self.write_tag(Tag::Str);
                self.write_str(s);
            }
            Value::Regex(r) => {
                self.write_tag(Tag::Regex);
                self.write_tagged_str(&r.source);
                self.write_tagged_str(&r.flags);
            }
            Value::BigInt(n) => {
                let chunks = n.magnitude_chunks();
                if chunks.len() > bigint::MAX_CHUNKS {
                    return Err(Error::BigIntTooLarge(n.clone()));
                }
                self.write_tag(if n.is_negative() { Tag::BigIntNeg } else { Tag::BigIntPos });
                self.out.push(chunks.len() as u8);
                for c in chunks {
                    self.out.write_u64::<BigEndian>(*c).expect("writing to a Vec never fails");
                }
            }
            Value::Array(a) => {
                self.refs.push(v.clone());
                self.write_tag(Tag::Sequence);
                let items = a.borrow();
                varint::write(&mut self.out, items.len() as u64);
                for item in items.iter() {
                    self.encode_value(item)?;
                }
            }
            Value::Record(r) => {
                self.refs.push(v.clone());
                self.write_tag(Tag::Record);
                let map = r.borrow();
                varint::write(&mut self.out, map.len() as u64);
                for (k, val) in map.iter() {
                    self.write_tagged_str(k);
                    self.encode_value(val)?;
                }
            }
            Value::Set(s) => {
                self.refs.push(v.clone());
                self.write_tag(Tag::Set);
                let items = s.borrow();
                varint::write(&mut self.out, items.len() as u64);
                for item in items.iter() {
                    self.encode_value(item)?;
                }
            }
            Value::Mapping(m) => {
                self.refs.push(v.clone());
                self.write_tag(Tag::Mapping);
                let entries = m.borrow();
                varint::write(&mut self.out, entries.len() as u64);
                for (k, val) in entries.iter() {
                    self.encode_value(k)?;
                    self.encode_value(val)?;
                }
            }
            Value::Error(e) => {
                self.refs.push(v.clone());
                let (kind, message, stack, cause) = {
                    let err = e.borrow();
                    (err.kind, err.message.clone(), err.stack.clone(), err.cause.clone())
                };
                self.write_tag(error_kind_tag(kind));
                self.write_tagged_str(&message);
                self.write_tagged_str(&stack);
                self.encode_value(&cause)?;
            }
            Value::Buffer(b) => {
                self.refs.push(v.clone());
                self.write_tag(Tag::Buffer);
                let bytes = b.borrow();
                varint::write(&mut self.out, bytes.len() as u64);
                self.out.extend_from_slice(&bytes);
            }
            Value::View(view) => {
                self.refs.push(v.clone());
                let view_ref = view.borrow();
                self.write_tag(view_kind_tag(view_ref.kind));
                let buf = view_ref.buffer.borrow();
                varint::write(&mut self.out, buf.len() as u64);
                varint::write(&mut self.out, view_ref.offset as u64);
                varint::write(&mut self.out, view_ref.count as u64);
                self.out.extend_from_slice(&buf);
            }
            Value::Extension(ext) => {
                self.refs.push(v.clone());
                let ext_def = self
                    .extensions
                    .find_by_name(&ext.name)
                    .ok_or_else(|| Error::IncompatibleCodec(ext.name.clone()))?;
                let reduced = ext_def.to_reduced(ext.payload.as_any(), self.context)?;
                self.write_tag(Tag::Extension);
                self.write_tagged_str(&ext.name);
                self.encode_value(&reduced)?;
            }
        }
        Ok(())
    }
}

struct Decoder<'a, C> {
    input: &'a [u8],
    refs: Vec<Value>,
    depth: usize,
    extensions: &'a ExtensionSet<C>,
    context: &'a mut C,
}

impl<C> Decoder<'_, C> {
    fn read_u8(&mut self) -> Result<u8> {
        self.input.read_u8().map_err(|_| Error::CorruptInput("unexpected end of input"))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = varint::read_usize(&mut self.input)?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| Error::CorruptInput("string is not valid utf-8"))
    }

    /// Read a full tagged string: a leading `Str` tag byte, then length-prefixed UTF-8. The
    /// counterpart to [`Encoder::write_tagged_str`](Encoder::write_tagged_str) — used for record
    /// keys, regex source/flags, error message/stack, and extension names.
    fn read_tagged_str(&mut self) -> Result<String> {
        let tag_byte = self.read_u8()?;
        if tag_byte != Tag::Str.into_u8() {
            return Err(Error::CorruptInput("expected a tagged string"));
        }
        self.read_str()
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.input.len() < len {
            return Err(Error::CorruptInput("length prefix runs past end of input"));
        }
        let (head, tail) = self.input.split_at(len);
        let out = head.to_vec();
        self.input = tail;
        Ok(out)
    }

    fn decode_value(&mut self) -> Result<Value> {
        let tag_byte = self.read_u8()?;
        if tag_byte == Tag::BackReference.into_u8() {
            let idx = varint::read_usize(&mut self.input)?;
            return self
                .refs
                .get(idx)
                .cloned()
                .ok_or(Error::CorruptInput("back-reference index out of range"));
        }
        if Tag::is_error_byte(tag_byte) {
            return self.decode_error(tag_byte);
        }
        if Tag::is_buffer_byte(tag_byte) {
            return self.decode_buffer_or_view(tag_byte);
        }
        if Tag::is_extension_byte(tag_byte) {
            return self.decode_extension();
        }
        let tag = Tag::from_byte(tag_byte).ok_or(Error::CorruptInput("unrecognized tag byte"))?;
        let _guard = DepthGuard::enter(&mut self.depth)?;
        match tag {
            Tag::Null => Ok(Value::Null),
            Tag::Undefined => Ok(Value::Undefined),
            Tag::True => Ok(Value::Bool(true)),
            Tag::False => Ok(Value::Bool(false)),
            Tag::Number => {
                let n = self
                    .input
                    .read_f64::<BigEndian>()
                    .map_err(|_| Error::CorruptInput("number runs past end of input"))?;
                Ok(Value::Number(n))
            }
            // Never emitted by this encoder; accepted so peers that do emit the optimization
            // can still be read.
            Tag::SmallInt => {
                let n = varint::read(&mut self.input)?;
                Ok(Value::Number(n as f64))
            }
            Tag::Date => {
                let t = self
                    .input
                    .read_f64::<BigEndian>()
                    .map_err(|_| Error::CorruptInput("date runs past end of input"))?;
                Ok(Value::Date(t))
            }
            Tag::Str => Ok(Value::Str(self.read_str()?)),
            Tag::Regex => {
                let source = self.read_tagged_str()?;
                let flags = self.read_tagged_str()?;
                Ok(Value::Regex(RegexValue { source, flags }))
            }
            Tag::BigIntNeg => self.decode_bigint(true),
            Tag::BigIntPos => self.decode_bigint(false),
            Tag::Sequence => self.decode_sequence(),
            Tag::Record => self.decode_record(),
            Tag::Set => self.decode_set(),
            Tag::Mapping => self.decode_mapping(),
            _ => Err(Error::CorruptInput("tag byte is not valid in this position")),
        }
    }

    fn decode_bigint(&mut self, negative: bool) -> Result<Value> {
        let chunk_count = self.read_u8()? as usize;
        let mut chunks = Vec::with_capacity(chunk_count.min(bigint::MAX_CHUNKS));
        for _ in 0..chunk_count {
            let c = self
                .input
                .read_u64::<BigEndian>()
                .map_err(|_| Error::CorruptInput("bigint chunk runs past end of input"))?;
            chunks.push(c);
        }
        Ok(Value::BigInt(BigInt::from_chunks(negative, chunks)))
    }

    fn decode_sequence(&mut self) -> Result<Value> {
        let shell = new_ref(Vec::new());
        let value = Value::Array(shell.clone());
        self.refs.push(value.clone());
        let len = varint::read_usize(&mut self.input)?;
        let mut items = Vec::with_capacity(len.min(RESERVE_CAP));
        for _ in 0..len {
            items.push(self.decode_value()?);
        }
        *shell.borrow_mut() = items;
        Ok(value)
    }

    fn decode_record(&mut self) -> Result<Value> {
        let shell = new_ref(crate::container::OrderedMap::new());
        let value = Value::Record(shell.clone());
        self.refs.push(value.clone());
        let len = varint::read_usize(&mut self.input)?;
        for _ in 0..len {
            let key = self.read_tagged_str()?;
            let val = self.decode_value()?;
            if shell.borrow().get(&key).is_some() {
                return Err(Error::MalformedSequence);
            }
            shell.borrow_mut().insert(key, val);
        }
        Ok(value)
    }

    fn decode_set(&mut self) -> Result<Value> {
        let shell = new_ref(Vec::new());
        let value = Value::Set(shell.clone());
        self.refs.push(value.clone());
        let len = varint::read_usize(&mut self.input)?;
        let mut items = Vec::with_capacity(len.min(RESERVE_CAP));
        for _ in 0..len {
            items.push(self.decode_value()?);
        }
        *shell.borrow_mut() = items;
        Ok(value)
    }

    fn decode_mapping(&mut self) -> Result<Value> {
        let shell = new_ref(Vec::new());
        let value = Value::Mapping(shell.clone());
        self.refs.push(value.clone());
        let len = varint::read_usize(&mut self.input)?;
        let mut entries = Vec::with_capacity(len.min(RESERVE_CAP));
        for _ in 0..len {
            let k = self.decode_value()?;
            let v = self.decode_value()?;
            entries.push((k, v));
        }
        *shell.borrow_mut() = entries;
        Ok(value)
    }

    fn decode_error(&mut self, tag_byte: u8) -> Result<Value> {
        let kind = error_kind_from_tag(tag_byte)?;
        let shell = new_ref(ErrorValue {
            kind,
            message: String::new(),
            stack: String::new(),
            cause: Value::Undefined,
        });
        let value = Value::Error(shell.clone());
        self.refs.push(value.clone());
        let _guard = DepthGuard::enter(&mut self.depth)?;
        let message = self.read_tagged_str()?;
        let stack = self.read_tagged_str()?;
        let cause = self.decode_value()?;
        {
            let mut e = shell.borrow_mut();
            e.message = message;
            e.stack = stack;
            e.cause = cause;
        }
        Ok(value)
    }

    fn decode_buffer_or_view(&mut self, tag_byte: u8) -> Result<Value> {
        let _guard = DepthGuard::enter(&mut self.depth)?;
        if tag_byte == Tag::Buffer.into_u8() {
            let shell = new_ref(Vec::new());
            let value = Value::Buffer(shell.clone());
            self.refs.push(value.clone());
            let len = varint::read_usize(&mut self.input)?;
            let bytes = self.read_bytes(len)?;
            *shell.borrow_mut() = bytes;
            return Ok(value);
        }
        let kind = view_kind_from_tag(tag_byte)?;
        let shell = new_ref(ElementView {
            kind: ElementKind::Bytes,
            buffer: new_ref(Vec::new()),
            offset: 0,
            count: 0,
        });
        let value = Value::View(shell.clone());
        self.refs.push(value.clone());
        let buf_len = varint::read_usize(&mut self.input)?;
        let offset = varint::read_usize(&mut self.input)?;
        let count = varint::read_usize(&mut self.input)?;
        let bytes = self.read_bytes(buf_len)?;
        let span = count
            .checked_mul(kind.element_size())
            .ok_or(Error::CorruptInput("view element count overflows"))?;
        let end = offset.checked_add(span).ok_or(Error::CorruptInput("view bounds overflow"))?;
        if end > bytes.len() {
            return Err(Error::CorruptInput("view bounds exceed backing buffer"));
        }
        *shell.borrow_mut() = ElementView { kind, buffer: new_ref(bytes), offset, count };
        Ok(value)
    }

    /// Extensions are plain `Rc`, not `Rc<RefCell<_>>`, so unlike every other referrable variant
    /// there is no shell to fill in place. The slot is reserved up front to keep back-reference
    /// indices aligned with the encoder, but a back-reference into an extension's own still-being
    /// -decoded reduced form (a self-referential extension value) resolves to `Value::Undefined`
    /// rather than the finished extension.
    fn decode_extension(&mut self) -> Result<Value> {
        let _guard = DepthGuard::enter(&mut self.depth)?;
        self.refs.push(Value::Undefined);
        let idx = self.refs.len() - 1;
        let name = self.read_tagged_str()?;
        let reduced = self.decode_value()?;
        let ext_def = self
            .extensions
            .find_by_name(&name)
            .ok_or_else(|| Error::IncompatibleCodec(name.clone()))?;
        let payload = ext_def.from_reduced(reduced, self.context)?;
        let value = wrap_instance(name, payload);
        self.refs[idx] = value.clone();
        Ok(value)
    }
}

fn error_kind_tag(kind: ErrorKind) -> Tag {
    match kind {
        ErrorKind::Base => Tag::ErrorBase,
        ErrorKind::Eval => Tag::ErrorEval,
        ErrorKind::Range => Tag::ErrorRange,
        ErrorKind::Reference => Tag::ErrorReference,
        ErrorKind::Syntax => Tag::ErrorSyntax,
        ErrorKind::Type => Tag::ErrorType,
        ErrorKind::Uri => Tag::ErrorUri,
    }
}

fn error_kind_from_tag(b: u8) -> Result<ErrorKind> {
    Ok(match b {
        x if x == Tag::ErrorBase.into_u8() => ErrorKind::Base,
        x if x == Tag::ErrorEval.into_u8() => ErrorKind::Eval,
        x if x == Tag::ErrorRange.into_u8() => ErrorKind::Range,
        x if x == Tag::ErrorReference.into_u8() => ErrorKind::Reference,
        x if x == Tag::ErrorSyntax.into_u8() => ErrorKind::Syntax,
        x if x == Tag::ErrorType.into_u8() => ErrorKind::Type,
        x if x == Tag::ErrorUri.into_u8() => ErrorKind::Uri,
        _ => return Err(Error::CorruptInput("unrecognized error tag")),
    })
}

fn view_kind_tag(kind: ElementKind) -> Tag {
    match kind {
        ElementKind::Bytes => Tag::ViewBytes,
        ElementKind::I8 => Tag::ViewI8,
        ElementKind::U8 => Tag::ViewU8,
        ElementKind::U8Clamped => Tag::ViewU8Clamped,
        ElementKind::I16 => Tag::ViewI16,
        ElementKind::U16 => Tag::ViewU16,
        ElementKind::I32 => Tag::ViewI32,
        ElementKind::U32 => Tag::ViewU32,
        ElementKind::F32 => Tag::ViewF32,
        ElementKind::F64 => Tag::ViewF64,
        ElementKind::I64 => Tag::ViewI64,
        ElementKind::U64 => Tag::ViewU64,
    }
}

fn view_kind_from_tag(b: u8) -> Result<ElementKind> {
    Ok(match b {
        x if x == Tag::ViewBytes.into_u8() => ElementKind::Bytes,
        x if x == Tag::ViewI8.into_u8() => ElementKind::I8,
        x if x == Tag::ViewU8.into_u8() => ElementKind::U8,
        x if x == Tag::ViewU8Clamped.into_u8() => ElementKind::U8Clamped,
        x if x == Tag::ViewI16.into_u8() => ElementKind::I16,
        x if x == Tag::ViewU16.into_u8() => ElementKind::U16,
        x if x == Tag::ViewI32.into_u8() => ElementKind::I32,
        x if x == Tag::ViewU32.into_u8() => ElementKind::U32,
        x if x == Tag::ViewF32.into_u8() => ElementKind::F32,
        x if x == Tag::ViewF64.into_u8() => ElementKind::F64,
        x if x == Tag::ViewI64.into_u8() => ElementKind::I64,
        x if x == Tag::ViewU64.into_u8() => ElementKind::U64,
        _ => return Err(Error::CorruptInput("unrecognized view tag")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{define_extension, ExtensionPayload};
    use crate::value::ElementKind;
    use std::any::Any;
    use std::rc::Rc;

    #[test]
    fn record_round_trips() {
        let rec = Value::empty_record();
        rec.set_field("name", Value::str("ada"));
        rec.set_field("age", Value::Number(36.0));
        let bytes = encode(&rec).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(rec, back);
    }

    #[test]
    fn numeric_array_preserves_nan_and_infinity() {
        let arr = Value::array(vec![
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::Number(f64::NEG_INFINITY),
            Value::Number(-0.0),
        ]);
        let bytes = encode(&arr).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(arr, back);
    }

    #[test]
    fn shared_reference_is_preserved_without_duplication() {
        let shared = Value::array(vec![Value::Number(1.0)]);
        let outer = Value::array(vec![shared.clone(), shared.clone()]);
        let bytes = encode(&outer).unwrap();
        let back = decode(&bytes).unwrap();
        let back_arr = back.as_array().unwrap().borrow();
        assert!(back_arr[0].same_identity(&back_arr[1]));
    }

    #[test]
    fn self_cycle_round_trips() {
        let rec = Value::empty_record();
        rec.set_field("self", rec.clone());
        let bytes = encode(&rec).unwrap();
        let back = decode(&bytes).unwrap();
        let back_self = back.as_record().unwrap().borrow().get("self").cloned().unwrap();
        assert!(back_self.same_identity(&back));
    }

    #[test]
    fn error_with_cause_round_trips() {
        let cause = Value::error(ErrorKind::Type, "bad type", "", Value::Undefined);
        let err = Value::error(ErrorKind::Syntax, "unexpected token", "at line 3", cause);
        let bytes = encode(&err).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn typed_view_with_offset_round_trips() {
        let buf = vec![0u8, 1, 2, 3, 4, 5, 6, 7];
        let view = Value::View(new_ref(ElementView {
            kind: ElementKind::U16,
            buffer: new_ref(buf),
            offset: 2,
            count: 2,
        }));
        let bytes = encode(&view).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(view, back);
    }

    #[test]
    fn view_wire_layout_places_backing_bytes_last() {
        // Spec §4.6: tag, buf-len, offset, count, then the backing buffer's bytes in full.
        let view = Value::View(new_ref(ElementView {
            kind: ElementKind::U8,
            buffer: new_ref(vec![9, 9, 9]),
            offset: 0,
            count: 3,
        }));
        let bytes = encode(&view).unwrap();
        assert_eq!(bytes[0], Tag::ViewU8.into_u8());
        // buf-len=3, offset=0, count=3 each fit in one varint byte.
        assert_eq!(&bytes[1..4], &[3, 0, 3]);
        assert_eq!(&bytes[4..7], &[9, 9, 9]);
    }

    #[test]
    fn regex_with_flags_round_trips() {
        let re = Value::regex("a+b*", "gi");
        let bytes = encode(&re).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(re, back);
    }

    #[derive(Debug, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
    }

    fn point_extension() -> impl Extension<()> {
        define_extension(
            "Point",
            |v: &dyn Any| v.is::<Point>(),
            |v: &dyn Any, _ctx: &mut ()| {
                let p = v.downcast_ref::<Point>().unwrap();
                Ok(Value::array(vec![Value::Number(p.x), Value::Number(p.y)]))
            },
            |reduced: Value, _ctx: &mut ()| {
                let items = reduced.as_array().unwrap().borrow();
                let x = items[0].as_number().unwrap();
                let y = items[1].as_number().unwrap();
                Ok(Rc::new(Point { x, y }) as Rc<dyn ExtensionPayload>)
            },
        )
    }

    #[test]
    fn extension_round_trips_and_preserves_identity() {
        let codec = Codec::builder().push(Box::new(point_extension())).unwrap().build();
        let point = wrap_instance("Point".to_string(), Rc::new(Point { x: 1.0, y: 2.0 }));
        let array = Value::array(vec![point.clone(), point.clone()]);
        let bytes = codec.encode_with(&array, &mut ()).unwrap();
        let back = codec.decode_with(&bytes, &mut ()).unwrap();
        let back_items = back.as_array().unwrap().borrow();
        assert!(back_items[0].same_identity(&back_items[1]));
        if let Value::Extension(ext) = &back_items[0] {
            let p = ext.payload.as_any().downcast_ref::<Point>().unwrap();
            assert_eq!(p, &Point { x: 1.0, y: 2.0 });
        } else {
            panic!("expected an extension value");
        }
    }

    #[test]
    fn unregistered_extension_name_on_decode_is_an_error() {
        let codec = Codec::builder().push(Box::new(point_extension())).unwrap().build();
        let point = wrap_instance("Point".to_string(), Rc::new(Point { x: 0.0, y: 0.0 }));
        let bytes = codec.encode_with(&point, &mut ()).unwrap();
        let empty_codec: Codec<()> = Codec::builder().build();
        assert!(matches!(
            empty_codec.decode_with(&bytes, &mut ()),
            Err(Error::IncompatibleCodec(_))
        ));
    }

    #[test]
    fn lift_wraps_an_accepted_raw_value_for_later_encoding() {
        let codec = Codec::builder().push(Box::new(point_extension())).unwrap().build();
        let point = codec.lift(Rc::new(Point { x: 3.0, y: 4.0 })).unwrap();
        let array = Value::array(vec![point.clone(), point]);
        let bytes = codec.encode_with(&array, &mut ()).unwrap();
        let back = codec.decode_with(&bytes, &mut ()).unwrap();
        let back_items = back.as_array().unwrap().borrow();
        assert!(back_items[0].same_identity(&back_items[1]));
    }

    #[test]
    fn lift_rejects_a_raw_value_no_extension_accepts() {
        #[derive(Debug)]
        struct Unaccepted;
        let codec = Codec::builder().push(Box::new(point_extension())).unwrap().build();
        assert!(matches!(
            codec.lift(Rc::new(Unaccepted)),
            Err(Error::NotSerializable(_))
        ));
    }

    #[test]
    fn truncated_input_is_corrupt_input() {
        let bytes = encode(&Value::array(vec![Value::Number(1.0), Value::Number(2.0)])).unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(decode(truncated), Err(Error::CorruptInput(_))));
    }

    #[test]
    fn duplicate_record_keys_are_malformed() {
        let mut bytes = Vec::new();
        bytes.push(Tag::Record.into_u8());
        varint::write(&mut bytes, 2);
        for _ in 0..2 {
            bytes.push(Tag::Str.into_u8());
            varint::write(&mut bytes, 1);
            bytes.extend_from_slice(b"a");
            bytes.push(Tag::Null.into_u8());
        }
        assert!(matches!(decode(&bytes), Err(Error::MalformedSequence)));
    }
}
