#![forbid(unsafe_code)]

//! Item equality functions driving the diff.

use std::fmt;
use std::sync::Arc;

use datalist_core::Payload;

/// Two-item predicate shared across threads.
pub type ItemPredicate<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Produces an optional change hint for an item whose content changed.
pub type PayloadFn<T> = Arc<dyn Fn(&T, &T) -> Option<Payload> + Send + Sync>;

/// Identity, content, and payload functions for a sequence element type.
///
/// `identity` answers "is this the same logical item?"; `content` answers
/// "does it still look the same?" and is only consulted for items whose
/// identity matched. Both must be set for a diff to run.
pub struct Equality<T> {
    identity: Option<ItemPredicate<T>>,
    content: Option<ItemPredicate<T>>,
    payload: Option<PayloadFn<T>>,
}

impl<T: 'static> Equality<T> {
    /// No functions set. Callers fall back to a non-diff overwrite.
    #[must_use]
    pub fn none() -> Self {
        Self {
            identity: None,
            content: None,
            payload: None,
        }
    }

    #[must_use]
    pub fn with_identity(mut self, f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.identity = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_content(mut self, f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.content = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_payload(
        mut self,
        f: impl Fn(&T, &T) -> Option<Payload> + Send + Sync + 'static,
    ) -> Self {
        self.payload = Some(Arc::new(f));
        self
    }

    /// Identity by extracted key, content by `PartialEq`.
    #[must_use]
    pub fn keyed<K, F>(key: F) -> Self
    where
        K: PartialEq + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::none()
            .with_identity(move |a, b| key(a) == key(b))
            .with_content(|a, b| a == b)
    }
}

impl<T> Equality<T> {
    /// Whether identity and content are both available.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.identity.is_some() && self.content.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&ItemPredicate<T>> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn content(&self) -> Option<&ItemPredicate<T>> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn payload(&self) -> Option<&PayloadFn<T>> {
        self.payload.as_ref()
    }
}

impl<T: PartialEq + 'static> Equality<T> {
    /// Identity and content are both `PartialEq`. Changes are never
    /// reported; an edited item shows up as remove plus insert.
    #[must_use]
    pub fn by_value() -> Self {
        Self::none()
            .with_identity(|a, b| a == b)
            .with_content(|a, b| a == b)
    }
}

impl<T: 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            content: self.content.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equality")
            .field("identity", &self.identity.is_some())
            .field("content", &self.content.is_some())
            .field("payload", &self.payload.is_some())
            .finish()
    }
}
