//! Heterogeneous argument list.

use std::any::Any;
use std::fmt;

/// Type-erased argument value.
pub type ArgValue = Box<dyn Any + Send>;

/// Ordered argument slots for one procedure call.
///
/// Each slot is either a value or null. Null slots travel as a single
/// `is_null` byte and reconstruct as `None` on the receiver.
///
/// # Example
///
/// ```
/// use netcode_rpc::codec::Args;
///
/// let args = Args::new().with(7i32).with_null().with("hi".to_string());
/// assert_eq!(args.len(), 3);
/// assert_eq!(args.get::<i32>(0), Some(&7));
/// assert!(args.is_null(1));
/// ```
#[derive(Default)]
pub struct Args {
    slots: Vec<Option<ArgValue>>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// `count` null slots.
    pub fn nulls(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }

    pub fn from_slots(slots: Vec<Option<ArgValue>>) -> Self {
        Self { slots }
    }

    /// Append a value (builder style).
    pub fn with<T: Any + Send>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    /// Append a null slot (builder style).
    pub fn with_null(mut self) -> Self {
        self.push_null();
        self
    }

    pub fn push<T: Any + Send>(&mut self, value: T) {
        self.slots.push(Some(Box::new(value)));
    }

    pub fn push_null(&mut self) {
        self.slots.push(None);
    }

    pub(crate) fn push_slot(&mut self, slot: Option<ArgValue>) {
        self.slots.push(slot);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True if slot `index` is null or out of range.
    pub fn is_null(&self, index: usize) -> bool {
        !matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Borrow the erased value in slot `index`.
    pub fn slot(&self, index: usize) -> Option<&(dyn Any + Send)> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    /// Borrow slot `index` as `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.slot(index).and_then(|v| v.downcast_ref::<T>())
    }

    /// Move slot `index` out as `T`, leaving the slot null.
    ///
    /// The slot is left untouched if it does not hold a `T`.
    pub fn take<T: Any>(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        match slot.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(original) => {
                *slot = Some(original);
                None
            }
        }
    }

    pub fn into_slots(self) -> Vec<Option<ArgValue>> {
        self.slots
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.slots
                    .iter()
                    .map(|s| if s.is_some() { "<value>" } else { "null" }),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_access() {
        let args = Args::new().with(1u64).with_null().with(String::from("x"));

        assert_eq!(args.len(), 3);
        assert_eq!(args.get::<u64>(0), Some(&1));
        assert!(args.is_null(1));
        assert_eq!(args.get::<String>(2).map(String::as_str), Some("x"));
        assert!(args.is_null(3));
    }

    #[test]
    fn test_get_wrong_type_is_none() {
        let args = Args::new().with(1i32);
        assert!(args.get::<i64>(0).is_none());
        assert!(!args.is_null(0));
    }

    #[test]
    fn test_take_leaves_null() {
        let mut args = Args::new().with(5i32);
        assert_eq!(args.take::<i32>(0), Some(5));
        assert!(args.is_null(0));
        assert_eq!(args.take::<i32>(0), None);
    }

    #[test]
    fn test_take_wrong_type_keeps_value() {
        let mut args = Args::new().with(5i32);
        assert_eq!(args.take::<String>(0), None);
        assert_eq!(args.get::<i32>(0), Some(&5));
    }

    #[test]
    fn test_nulls() {
        let args = Args::nulls(2);
        assert_eq!(args.len(), 2);
        assert!(args.is_null(0) && args.is_null(1));
        assert_eq!(format!("{:?}", args), "[\"null\", \"null\"]");
    }
}
