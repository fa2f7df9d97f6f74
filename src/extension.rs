//! The extension protocol: user-pluggable value kinds layered on top of the core format
//! without perturbing it.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{ExtensionInstance, Value};

/// Maximum number of extensions a single codec may register.
pub const MAX_EXTENSIONS: usize = 128;

/// Anything an extension can stash inside a [`Value::Extension`](crate::value::Value::Extension)
/// has to be `'static` (so it can be downcast back by the extension that produced it) and
/// `Debug` (so `Value` as a whole stays `Debug`). Blanket-implemented for every eligible type, so
/// extension authors never implement this by hand.
pub trait ExtensionPayload: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug> ExtensionPayload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A single registered extension. `C` is the opaque per-call context type threaded through
/// `to_reduced`/`from_reduced`.
pub trait Extension<C> {
    /// The extension's name, written onto the wire as a tagged string. Must be non-empty.
    fn name(&self) -> &str;

    /// Whether this extension claims responsibility for `value`.
    fn accepts(&self, value: &dyn Any) -> bool;

    /// Reduce an accepted value down to a member of the core value universe.
    fn to_reduced(&self, value: &dyn Any, context: &mut C) -> Result<Value>;

    /// Reconstruct the extension's value from its reduced form.
    fn from_reduced(&self, reduced: Value, context: &mut C) -> Result<Rc<dyn ExtensionPayload>>;
}

/// An ordered registry of extensions. Registration order is predicate priority: on encode, the
/// first extension whose `accepts` returns `true` wins.
pub struct ExtensionSet<C> {
    extensions: Vec<Box<dyn Extension<C>>>,
}

impl<C> Default for ExtensionSet<C> {
    fn default() -> Self {
        ExtensionSet { extensions: Vec::new() }
    }
}

impl<C> ExtensionSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ext`, rejecting it if this would exceed [`MAX_EXTENSIONS`].
    pub fn push(&mut self, ext: Box<dyn Extension<C>>) -> Result<()> {
        if self.extensions.len() >= MAX_EXTENSIONS {
            return Err(Error::TooManyExtensions);
        }
        self.extensions.push(ext);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Find the first registered extension that accepts `value`, if any.
    pub fn find_acceptor(&self, value: &dyn Any) -> Option<&dyn Extension<C>> {
        self.extensions
            .iter()
            .map(|e| e.as_ref())
            .find(|e| e.accepts(value))
    }

    /// Find a registered extension by name, for decoding (spec: `IncompatibleCodec` when absent).
    pub fn find_by_name(&self, name: &str) -> Option<&dyn Extension<C>> {
        self.extensions
            .iter()
            .map(|e| e.as_ref())
            .find(|e| e.name() == name)
    }
}

/// A convenience constructor built from plain closures instead of a hand-written `Extension`
/// impl. Built from plain closures rather than a user-defined type implementing [`Extension`].
pub struct ClosureExtension<C, A, R, F> {
    name: String,
    accepts: A,
    to_reduced: R,
    from_reduced: F,
    _marker: std::marker::PhantomData<fn(&mut C)>,
}

/// Build an extension from a name and three closures, instead of hand-writing an [`Extension`]
pub fn define_extension<C, A, R, F>(
    name: impl Into<String>,
    accepts: A,
    to_reduced: R,
    from_reduced: F,
) -> ClosureExtension<C, A, R, F>
where
    A: Fn(&dyn Any) -> bool,
    R: Fn(&dyn Any, &mut C) -> Result<Value>,
    F: Fn(Value, &mut C) -> Result<Rc<dyn ExtensionPayload>>,
{
    ClosureExtension {
        name: name.into(),
        accepts,
        to_reduced,
        from_reduced,
        _marker: std::marker::PhantomData,
    }
}

impl<C, A, R, F> Extension<C> for ClosureExtension<C, A, R, F>
where
    A: Fn(&dyn Any) -> bool,
    R: Fn(&dyn Any, &mut C) -> Result<Value>,
    F: Fn(Value, &mut C) -> Result<Rc<dyn ExtensionPayload>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, value: &dyn Any) -> bool {
        (self.accepts)(value)
    }

    fn to_reduced(&self, value: &dyn Any, context: &mut C) -> Result<Value> {
        (self.to_reduced)(value, context)
    }

    fn from_reduced(&self, reduced: Value, context: &mut C) -> Result<Rc<dyn ExtensionPayload>> {
        (self.from_reduced)(reduced, context)
    }
}

/// Wrap a freshly reconstructed extension payload and its owning extension's name into a
/// referrable [`Value::Extension`].
pub fn wrap_instance(name: String, payload: Rc<dyn ExtensionPayload>) -> Value {
    Value::Extension(Rc::new(ExtensionInstance { name, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Url(String);

    fn url_extension() -> ClosureExtension<
        (),
        impl Fn(&dyn Any) -> bool,
        impl Fn(&dyn Any, &mut ()) -> Result<Value>,
        impl Fn(Value, &mut ()) -> Result<Rc<dyn ExtensionPayload>>,
    > {
        define_extension(
            "Url",
            |v: &dyn Any| v.is::<Url>(),
            |v: &dyn Any, _ctx: &mut ()| Ok(Value::str(v.downcast_ref::<Url>().unwrap().0.clone())),
            |reduced: Value, _ctx: &mut ()| {
                let s = reduced.as_str().unwrap().to_string();
                Ok(Rc::new(Url(s)) as Rc<dyn ExtensionPayload>)
            },
        )
    }

    #[test]
    fn registry_enforces_the_128_cap() {
        let mut set: ExtensionSet<()> = ExtensionSet::new();
        for i in 0..MAX_EXTENSIONS {
            let ext = define_extension(
                format!("ext{}", i),
                |_: &dyn Any| false,
                |_: &dyn Any, _: &mut ()| unreachable!(),
                |_: Value, _: &mut ()| unreachable!(),
            );
            set.push(Box::new(ext)).unwrap();
        }
        let one_too_many = define_extension(
            "overflow",
            |_: &dyn Any| false,
            |_: &dyn Any, _: &mut ()| unreachable!(),
            |_: Value, _: &mut ()| unreachable!(),
        );
        assert!(matches!(set.push(Box::new(one_too_many)), Err(Error::TooManyExtensions)));
    }

    #[test]
    fn first_registered_acceptor_wins() {
        let mut set: ExtensionSet<()> = ExtensionSet::new();
        set.push(Box::new(url_extension())).unwrap();
        let url = Url("https://example.com".to_string());
        let found = set.find_acceptor(&url);
        assert!(found.is_some());
        assert_eq!(found.unwrap().name(), "Url");
    }

    #[test]
    fn round_trips_through_reduced_form() {
        let ext = url_extension();
        let mut ctx = ();
        let url = Url("https://example.com".to_string());
        let reduced = ext.to_reduced(&url, &mut ctx).unwrap();
        assert_eq!(reduced, Value::str("https://example.com"));
        let rebuilt = ext.from_reduced(reduced, &mut ctx).unwrap();
        assert_eq!(rebuilt.as_any().downcast_ref::<Url>(), Some(&url));
    }
}
