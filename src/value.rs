//! The dynamically typed value universe this codec encodes and decodes.
//!
//! Every variant that carries observable object identity —
//! holds an [`Ref`] handle rather than an owned value. Cloning such a `Value` clones the handle,
//! not the data: two clones are the *same* object, exactly as two references to the same host
//! object are. Identity is tested with [`Rc::ptr_eq`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::container::{new_ref, OrderedMap, Ref};
use crate::extension::ExtensionPayload;

/// The seven error kinds this format defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Base,
    Eval,
    Range,
    Reference,
    Syntax,
    Type,
    Uri,
}

/// A decoded or to-be-encoded error value: kind, message, stack, and an optional cause.
///
/// `cause` is `Value::Undefined` when the error was constructed without a cause (spec's
/// "boundary behaviors" note on `cause = undefined`: this implementation always encodes an
/// explicit cause slot, so there is exactly one wire form for "no cause").
#[derive(Debug)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: String,
    pub cause: Value,
}

/// The element type of a typed view over a byte buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// The neutral, untyped byte view: one view element per byte.
    Bytes,
    I8,
    U8,
    U8Clamped,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
    I64,
    U64,
}

impl ElementKind {
    /// Size in bytes of one element of this kind.
    pub fn element_size(self) -> usize {
        use ElementKind::*;
        match self {
            Bytes | I8 | U8 | U8Clamped => 1,
            I16 | U16 => 2,
            I32 | U32 | F32 => 4,
            F64 | I64 | U64 => 8,
        }
    }
}

/// A typed window over a private backing byte buffer.
///
/// The backing buffer is not shared with any [`Value::Buffer`] the caller may also hold; per
/// The wire format serializes the view's *entire* backing buffer on every occurrence,
/// and the decoder allocates a fresh buffer for each distinct view it decodes (deduplicated only
/// at the view level, by the reference table, not at the buffer level).
#[derive(Debug)]
pub struct ElementView {
    pub kind: ElementKind,
    pub buffer: Ref<Vec<u8>>,
    pub offset: usize,
    /// Element count for typed views; byte length for [`ElementKind::Bytes`].
    pub count: usize,
}

impl ElementView {
    /// Byte length this view spans within its backing buffer.
    pub fn byte_len(&self) -> usize {
        self.count * self.kind.element_size()
    }
}

/// A regular expression's source pattern and flag string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegexValue {
    pub source: String,
    pub flags: String,
}

impl RegexValue {
    /// Best-effort compile into a [`regex::Regex`], for callers that want to actually use the
    /// pattern rather than just carry it. Not on the encode/decode path.
    ///
    /// JavaScript flags without a `regex` crate equivalent (`g`, `y`, `u`, `d`) are ignored;
    /// `i`, `m`, and `s` map onto the corresponding inline flags.
    pub fn to_regex(&self) -> Result<regex::Regex, regex::Error> {
        let mut inline = String::new();
        for flag in self.flags.chars() {
            match flag {
                'i' => inline.push('i'),
                'm' => inline.push('m'),
                's' => inline.push('s'),
                _ => {}
            }
        }
        if inline.is_empty() {
            regex::Regex::new(&self.source)
        } else {
            regex::Regex::new(&format!("(?{}){}", inline, self.source))
        }
    }
}

/// An opaque extension-supplied value, identified by its registering extension's name.
#[derive(Debug)]
pub struct ExtensionInstance {
    pub name: String,
    pub payload: Rc<dyn ExtensionPayload>,
}

/// The value universe.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    /// An IEEE-754 binary64 number.
    Number(f64),
    BigInt(crate::bigint::BigInt),
    Str(String),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    Regex(RegexValue),
    Array(Ref<Vec<Value>>),
    Record(Ref<OrderedMap<Value>>),
    Set(Ref<Vec<Value>>),
    Mapping(Ref<Vec<(Value, Value)>>),
    Error(Ref<ErrorValue>),
    Buffer(Ref<Vec<u8>>),
    View(Ref<ElementView>),
    Extension(Rc<ExtensionInstance>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(new_ref(items))
    }

    pub fn empty_record() -> Value {
        Value::Record(new_ref(OrderedMap::new()))
    }

    pub fn set(items: Vec<Value>) -> Value {
        Value::Set(new_ref(items))
    }

    pub fn mapping(entries: Vec<(Value, Value)>) -> Value {
        Value::Mapping(new_ref(entries))
    }

    pub fn buffer(bytes: Vec<u8>) -> Value {
        Value::Buffer(new_ref(bytes))
    }

    pub fn regex(source: impl Into<String>, flags: impl Into<String>) -> Value {
        Value::Regex(RegexValue { source: source.into(), flags: flags.into() })
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>, stack: impl Into<String>, cause: Value) -> Value {
        Value::Error(new_ref(ErrorValue {
            kind,
            message: message.into(),
            stack: stack.into(),
            cause,
        }))
    }

    /// Insert `value` under `key` if this is a `Value::Record`. No-op otherwise.
    pub fn set_field(&self, key: impl Into<String>, value: Value) {
        if let Value::Record(r) = self {
            r.borrow_mut().insert(key, value);
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Ref<OrderedMap<Value>>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Ref<Vec<Value>>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Whether this value is referrable: anything that may carry object identity.
    pub fn is_referrable(&self) -> bool {
        matches!(
            self,
            Value::Array(_)
                | Value::Record(_)
                | Value::Set(_)
                | Value::Mapping(_)
                | Value::Error(_)
                | Value::Buffer(_)
                | Value::View(_)
                | Value::Extension(_)
        )
    }

    /// Object identity for two referrable values of the *same* runtime variant. Two values of
    /// different variants are never the same object; two scalars are never referrable at all and
    /// so are defined to never alias.
    pub fn same_identity(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Array(a), Array(b)) => Rc::ptr_eq(a, b),
            (Record(a), Record(b)) => Rc::ptr_eq(a, b),
            (Set(a), Set(b)) => Rc::ptr_eq(a, b),
            (Mapping(a), Mapping(b)) => Rc::ptr_eq(a, b),
            (Error(a), Error(b)) => Rc::ptr_eq(a, b),
            (Buffer(a), Buffer(b)) => Rc::ptr_eq(a, b),
            (View(a), View(b)) => Rc::ptr_eq(a, b),
            (Extension(a), Extension(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

thread_local! {
    static VISITED: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// Run `f` while `ptr` is marked visited, to let `Debug`/`PartialEq` detect cycles instead of
/// recursing forever. Returns `None` (without calling `f`) if `ptr` is already on the stack.
fn guard_cycle<R>(ptr: usize, f: impl FnOnce() -> R) -> Option<R> {
    let already = VISITED.with(|v| v.borrow().contains(&ptr));
    if already {
        return None;
    }
    VISITED.with(|v| v.borrow_mut().push(ptr));
    let r = f();
    VISITED.with(|v| {
        v.borrow_mut().pop();
    });
    Some(r)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // `#[derive(Debug)]` would recurse forever on a self-referencing graph; this walks the
        // same structure but tracks visited allocations so a cycle prints as `<cycle>` instead.
        match self {
            Value::Null => write!(f, "Null"),
            Value::Undefined => write!(f, "Undefined"),
            Value::Bool(b) => write!(f, "Bool({:?})", b),
            Value::Number(n) => write!(f, "Number({:?})", n),
            Value::BigInt(n) => write!(f, "BigInt({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Date(t) => write!(f, "Date({:?})", t),
            Value::Regex(r) => write!(f, "Regex({:?})", r),
            Value::Array(a) => {
                let ptr = Rc::as_ptr(a) as *const () as usize;
                match guard_cycle(ptr, || f.debug_list().entries(a.borrow().iter()).finish()) {
                    Some(r) => r,
                    None => write!(f, "<cycle>"),
                }
            }
            Value::Record(r) => {
                let ptr = Rc::as_ptr(r) as *const () as usize;
                match guard_cycle(ptr, || f.debug_map().entries(r.borrow().iter()).finish()) {
                    Some(res) => res,
                    None => write!(f, "<cycle>"),
                }
            }
            Value::Set(s) => {
                let ptr = Rc::as_ptr(s) as *const () as usize;
                match guard_cycle(ptr, || f.debug_set().entries(s.borrow().iter()).finish()) {
                    Some(r) => r,
                    None => write!(f, "<cycle>"),
                }
            }
            Value::Mapping(m) => {
                let ptr = Rc::as_ptr(m) as *const () as usize;
                match guard_cycle(ptr, || f.debug_map().entries(m.borrow().iter().map(|(k, v)| (k, v))).finish()) {
                    Some(r) => r,
                    None => write!(f, "<cycle>"),
                }
            }
            Value::Error(e) => {
                let ptr = Rc::as_ptr(e) as *const () as usize;
                match guard_cycle(ptr, || {
                    let e = e.borrow();
                    f.debug_struct("Error")
                        .field("kind", &e.kind)
                        .field("message", &e.message)
                        .field("cause", &e.cause)
                        .finish()
                }) {
                    Some(r) => r,
                    None => write!(f, "<cycle>"),
                }
            }
            Value::Buffer(b) => write!(f, "Buffer({} bytes)", b.borrow().len()),
            Value::View(v) => {
                let v = v.borrow();
                write!(f, "View({:?}, offset={}, count={})", v.kind, v.offset, v.count)
            }
            Value::Extension(x) => write!(f, "Extension({:?}, {:?})", x.name, x.payload),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) | (Undefined, Undefined) => true,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (BigInt(a), BigInt(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Date(a), Date(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Regex(a), Regex(b)) => a == b,
            (Array(a), Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Record(a), Record(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Set(a), Set(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Mapping(a), Mapping(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Error(a), Error(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.kind == b.kind && a.message == b.message && a.stack == b.stack && a.cause == b.cause
            }
            (Buffer(a), Buffer(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (View(a), View(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.kind == b.kind && a.offset == b.offset && a.count == b.count && *a.buffer.borrow() == *b.buffer.borrow()
            }
            (Extension(a), Extension(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_equals_nan() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn self_cycle_is_debuggable_and_equal_to_itself() {
        let rec = Value::empty_record();
        rec.set_field("self", rec.clone());
        // Should not stack-overflow.
        let _ = format!("{:?}", rec);
        assert_eq!(rec, rec);
    }

    #[test]
    fn identical_field_values_but_different_allocations_are_equal() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = Value::array(vec![Value::Number(1.0)]);
        assert_eq!(a, b);
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn shared_child_has_same_identity_after_clone() {
        let child = Value::empty_record();
        let clone = child.clone();
        assert!(child.same_identity(&clone));
    }
}
