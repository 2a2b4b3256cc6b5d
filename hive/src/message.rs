// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::any::{Any, TypeId, type_name};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for a payload type.
///
/// Equal payload types produce equal tags and distinct types produce distinct
/// tags for the lifetime of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeTag(TypeId);

impl TypeTag {
    #[must_use]
    pub fn of<T: Any>() -> Self {
        TypeTag(TypeId::of::<T>())
    }
}

type CloneFn = fn(&(dyn Any + Send)) -> Box<dyn Any + Send>;

// Process-wide create/destroy balance. Checked against each other in the
// teardown statistics report; an imbalance means a leaked message.
pub(crate) static MSG_CREATED: AtomicU64 = AtomicU64::new(0);
pub(crate) static MSG_ERASED: AtomicU64 = AtomicU64::new(0);

/// A sized, typed payload travelling between actors.
///
/// Messages are deliberately mutable and move through the runtime as
/// `Box<Message>`; exactly one party owns a message at any time. A delivered
/// message is destroyed by the runtime after the receiving callable returns,
/// unless ownership was transferred with [`Scope::forward`] or reclaimed with
/// [`Scope::take`].
///
/// [`Scope::forward`]: crate::Scope::forward
/// [`Scope::take`]: crate::Scope::take
pub struct Message {
    tag: TypeTag,
    size: usize,
    type_name: &'static str,
    clone_fn: Option<CloneFn>,
    payload: Box<dyn Any + Send>,
}

impl Message {
    /// Creates a message carrying `value`.
    ///
    /// The tag and size are derived from `T`. The payload can later be
    /// duplicated with [`Message::duplicate`].
    #[must_use]
    pub fn new<T: Any + Send + Clone>(value: T) -> Box<Message> {
        let clone_fn: CloneFn = |payload| {
            let value = payload
                .downcast_ref::<T>()
                .expect("clone fn invoked with foreign payload");
            Box::new(value.clone())
        };
        Self::build(value, Some(clone_fn))
    }

    /// Creates a message whose payload cannot be duplicated.
    ///
    /// [`Message::duplicate`] on such a message returns `None`.
    #[must_use]
    pub fn once<T: Any + Send>(value: T) -> Box<Message> {
        Self::build(value, None)
    }

    fn build<T: Any + Send>(value: T, clone_fn: Option<CloneFn>) -> Box<Message> {
        MSG_CREATED.fetch_add(1, Ordering::Relaxed);
        Box::new(Message {
            tag: TypeTag::of::<T>(),
            size: size_of::<T>(),
            type_name: type_name::<T>(),
            clone_fn,
            payload: Box::new(value),
        })
    }

    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Human-readable payload type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Typed view of the payload, `None` when `T` is not the payload type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        if self.tag != TypeTag::of::<T>() {
            return None;
        }
        self.payload.downcast_ref::<T>()
    }

    /// Mutable typed view of the payload, `None` when `T` is not the payload
    /// type.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        if self.tag != TypeTag::of::<T>() {
            return None;
        }
        self.payload.downcast_mut::<T>()
    }

    /// Deep copy of a caller-owned message.
    ///
    /// Returns `None` when the payload was created with [`Message::once`].
    /// Reclaiming the message currently being delivered is [`Scope::take`],
    /// which transfers ownership without copying.
    ///
    /// [`Scope::take`]: crate::Scope::take
    #[must_use]
    pub fn duplicate(&self) -> Option<Box<Message>> {
        let clone_fn = self.clone_fn?;
        MSG_CREATED.fetch_add(1, Ordering::Relaxed);
        Some(Box::new(Message {
            tag: self.tag,
            size: self.size,
            type_name: self.type_name,
            clone_fn: Some(clone_fn),
            payload: clone_fn(&*self.payload),
        }))
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        MSG_ERASED.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
