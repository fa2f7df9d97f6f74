//! Shared container plumbing: the `Rc<RefCell<_>>` handle referrable values are built from, and
//! an insertion-ordered string map used for [`Value::Record`](crate::value::Value::Record).

use std::cell::RefCell;
use std::rc::Rc;

/// A referrable handle: cheap to clone (bumps a refcount), shares its contents with every clone,
/// and is comparable by object identity via [`Rc::ptr_eq`]. This is how object
/// identity in a dynamically typed host is represented in a strictly typed one.
pub type Ref<T> = Rc<RefCell<T>>;

/// Wrap a value in a fresh referrable handle.
pub fn new_ref<T>(v: T) -> Ref<T> {
    Rc::new(RefCell::new(v))
}

/// An insertion-ordered string-keyed map.
///
/// Real host objects never carry duplicate own keys, so `insert` replaces the value of an
/// existing key in place rather than appending a second entry — this mirrors the host's
/// overwrite-on-reassignment behavior instead of treating keys as a multiset. Backed by a
/// `Vec` rather than a hash map: record field counts are small in practice, and a linear scan
/// keeps the same "fine for small graphs" philosophy used for the reference table.
#[derive(Clone, Debug, Default)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        OrderedMap { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert `value` under `key`, replacing any existing entry for that key in place (so the
    /// original insertion position — and hence enumeration order — is preserved on overwrite,
    /// just as reassigning an existing property does on a host object).
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut m: OrderedMap<i32> = OrderedMap::new();
        m.insert("b", 2);
        m.insert("a", 1);
        m.insert("c", 3);
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn reinsertion_keeps_original_position() {
        let mut m: OrderedMap<i32> = OrderedMap::new();
        m.insert("a", 1);
        m.insert("b", 2);
        m.insert("a", 99);
        let entries: Vec<(&str, &i32)> = m.iter().collect();
        assert_eq!(entries, vec![("a", &99), ("b", &2)]);
    }

    #[test]
    fn ref_clones_share_identity() {
        let r1 = new_ref(vec![1, 2, 3]);
        let r2 = r1.clone();
        assert!(Rc::ptr_eq(&r1, &r2));
        r2.borrow_mut().push(4);
        assert_eq!(r1.borrow().len(), 4);
    }
}
