//! Immutable, copy-on-write heterogeneous message tuples.
//!
//! A [`Message`] is an ordered list of type-erased values. Cloning a
//! message only bumps a reference count; mutating a shared message via
//! [`Message::set`] copies the element table first, so other holders
//! never observe the change.
//!
//! Typed access goes through [`FromMessage`], implemented for tuples of
//! up to six `Clone` elements. Each implementation exposes the exact
//! element [`TypeId`]s it expects, which lets behaviors reject a message
//! with a cheap token comparison before attempting extraction.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

// ── Element ─────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Element {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Element {
    fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    fn type_id(&self) -> TypeId {
        // Deref to the trait object first; `Arc<..>::type_id` would
        // describe the Arc itself.
        (*self.value).type_id()
    }
}

// ── Message ─────────────────────────────────────────────────────────────

/// Copy-on-write tuple of type-erased values.
#[derive(Clone, Default)]
pub struct Message {
    elements: Arc<Vec<Element>>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value`, returning the extended message (builder style).
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.elements).push(Element::new(value));
        self
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the message has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Borrow element `index` as `T`, if it exists and has that type.
    #[must_use]
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.elements.get(index)?.value.downcast_ref::<T>()
    }

    /// Runtime type of element `index`.
    #[must_use]
    pub fn type_at(&self, index: usize) -> Option<TypeId> {
        self.elements.get(index).map(Element::type_id)
    }

    /// Whether element `index` holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self, index: usize) -> bool {
        self.type_at(index) == Some(TypeId::of::<T>())
    }

    /// Replace element `index`, detaching from other holders first.
    ///
    /// Returns `false` if `index` is out of bounds.
    pub fn set<T: Any + Send + Sync>(&mut self, index: usize, value: T) -> bool {
        if index >= self.elements.len() {
            return false;
        }
        Arc::make_mut(&mut self.elements)[index] = Element::new(value);
        true
    }

    /// Whether this message and `other` share the same element storage.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.elements, &other.elements)
    }

    /// Whether the element types are exactly `tokens`.
    #[must_use]
    pub fn match_tokens(&self, tokens: &[TypeId]) -> bool {
        self.elements.len() == tokens.len()
            && self
                .elements
                .iter()
                .zip(tokens)
                .all(|(e, t)| e.type_id() == *t)
    }

    /// Copy the elements out as the tuple `T`, if the types line up.
    #[must_use]
    pub fn extract<T: FromMessage>(&self) -> Option<T> {
        T::from_message(self)
    }

    /// Borrow the only element as `T` if the message is a 1-tuple of `T`.
    #[must_use]
    pub fn single<T: Any>(&self) -> Option<&T> {
        if self.elements.len() == 1 {
            self.get::<T>(0)
        } else {
            None
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message")
            .field(&self.elements.iter().map(|e| e.type_name).collect::<Vec<_>>())
            .finish()
    }
}

/// Build a [`Message`] from a list of values.
///
/// ```
/// use hew_actors::{atom, msg};
///
/// let m = msg![atom("add"), 1i32, 2i32];
/// assert_eq!(m.len(), 3);
/// assert_eq!(m.get::<i32>(2), Some(&2));
/// ```
#[macro_export]
macro_rules! msg {
    () => { $crate::Message::new() };
    ($($value:expr),+ $(,)?) => {
        $crate::Message::new()$(.with($value))+
    };
}

// ── Typed extraction ────────────────────────────────────────────────────

/// Tuple types that can be copied out of a [`Message`].
pub trait FromMessage: Sized {
    /// The element types this tuple expects, in order.
    fn type_tokens() -> Vec<TypeId>;

    /// Copy the elements out, or `None` on any type mismatch.
    fn from_message(msg: &Message) -> Option<Self>;
}

impl FromMessage for () {
    fn type_tokens() -> Vec<TypeId> {
        Vec::new()
    }

    fn from_message(msg: &Message) -> Option<Self> {
        msg.is_empty().then_some(())
    }
}

macro_rules! impl_from_message {
    ($len:expr; $($idx:tt $name:ident),+) => {
        impl<$($name),+> FromMessage for ($($name,)+)
        where
            $($name: Any + Clone + Send + Sync),+
        {
            fn type_tokens() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }

            fn from_message(msg: &Message) -> Option<Self> {
                if msg.len() != $len {
                    return None;
                }
                Some(($(msg.get::<$name>($idx)?.clone(),)+))
            }
        }
    };
}

impl_from_message!(1; 0 A);
impl_from_message!(2; 0 A, 1 B);
impl_from_message!(3; 0 A, 1 B, 2 C);
impl_from_message!(4; 0 A, 1 B, 2 C, 3 D);
impl_from_message!(5; 0 A, 1 B, 2 C, 3 D, 4 E);
impl_from_message!(6; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;

    #[test]
    fn builder_and_typed_access() {
        let m = msg![1i32, String::from("two"), 3.0f64];
        assert_eq!(m.len(), 3);
        assert_eq!(m.get::<i32>(0), Some(&1));
        assert_eq!(m.get::<String>(1).map(String::as_str), Some("two"));
        assert!(m.get::<i32>(1).is_none());
        assert!(m.get::<i32>(7).is_none());
        assert!(m.is::<f64>(2));
    }

    #[test]
    fn clone_shares_until_written() {
        let a = msg![1i32, 2i32];
        let mut b = a.clone();
        assert!(a.shares_storage_with(&b));
        assert!(b.set(0, 10i32));
        assert!(!a.shares_storage_with(&b));
        assert_eq!(a.get::<i32>(0), Some(&1));
        assert_eq!(b.get::<i32>(0), Some(&10));
        assert!(!b.set(5, 0i32));
    }

    #[test]
    fn extract_checks_arity_and_types() {
        let m = msg![atom("add"), 1i32, 2i32];
        assert_eq!(m.extract::<(crate::Atom, i32, i32)>(), Some((atom("add"), 1, 2)));
        assert_eq!(m.extract::<(crate::Atom, i32)>(), None);
        assert_eq!(m.extract::<(i32, i32, i32)>(), None);
        assert_eq!(msg![].extract::<()>(), Some(()));
    }

    #[test]
    fn tokens_match_runtime_types() {
        let m = msg![1u8, 2u16];
        assert!(m.match_tokens(&<(u8, u16)>::type_tokens()));
        assert!(!m.match_tokens(&<(u16, u8)>::type_tokens()));
        assert!(!m.match_tokens(&<(u8,)>::type_tokens()));
    }

    #[test]
    fn debug_lists_type_names() {
        let rendered = format!("{:?}", msg![1i32]);
        assert!(rendered.contains("i32"));
    }
}
