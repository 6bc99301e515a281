#![forbid(unsafe_code)]

//! Fixed-content data.
//!
//! [`ImmutableData`] never loads and never changes, so observer
//! registration is accepted and ignored. It lets a fixed list stand in
//! wherever a data source is expected.

use std::sync::Arc;

use datalist_core::{Available, AvailableObserver, DataObserver, ErrorObserver, LoadingObserver};

use crate::data::DataId;
use crate::error::{LoadError, Result};

/// Data whose content is fixed at construction.
pub struct ImmutableData<T> {
    id: DataId,
    items: Arc<Vec<T>>,
}

impl<T> Clone for ImmutableData<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> std::fmt::Debug for ImmutableData<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmutableData")
            .field("id", &self.id)
            .field("len", &self.items.len())
            .finish()
    }
}

impl<T: Clone> ImmutableData<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            id: DataId::fresh(),
            items: Arc::new(items),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn id(&self) -> DataId {
        self.id
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<T> {
        self.items.get(position).cloned()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.items)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Always false.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        false
    }

    /// Always exhausted.
    #[must_use]
    pub fn available(&self) -> Available {
        Available::Count(0)
    }

    pub fn register_data_observer(&self, _observer: Arc<dyn DataObserver>) -> Result<()> {
        Ok(())
    }

    pub fn unregister_data_observer(&self, _observer: &Arc<dyn DataObserver>) -> Result<()> {
        Ok(())
    }

    pub fn register_loading_observer(&self, _observer: Arc<dyn LoadingObserver>) -> Result<()> {
        Ok(())
    }

    pub fn unregister_loading_observer(&self, _observer: &Arc<dyn LoadingObserver>) -> Result<()> {
        Ok(())
    }

    pub fn register_available_observer(
        &self,
        _observer: Arc<dyn AvailableObserver>,
    ) -> Result<()> {
        Ok(())
    }

    pub fn unregister_available_observer(
        &self,
        _observer: &Arc<dyn AvailableObserver>,
    ) -> Result<()> {
        Ok(())
    }

    pub fn register_error_observer(
        &self,
        _observer: Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        Ok(())
    }

    pub fn unregister_error_observer(
        &self,
        _observer: &Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        Ok(())
    }
}

impl<T: Clone> From<Vec<T>> for ImmutableData<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}
