#![forbid(unsafe_code)]

//! Data instance configuration.

use crate::error::{DataError, Result};

/// Behaviour switches for a data instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DataConfig {
    /// Pair removed and inserted items with equal identity into moves.
    /// Default: true.
    pub detect_moves: bool,

    /// Load page by page (first page overwrites, later pages append)
    /// instead of one whole-content load.
    /// Default: false.
    pub incremental: bool,

    /// Presenting an item within this many rows of the end triggers the
    /// next page. Negative disables look-ahead.
    /// Default: 5.
    pub look_ahead_rows: i32,

    /// A newer overwrite discards mutations queued (not yet started)
    /// before it.
    /// Default: true.
    pub coalesce_overwrites: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            detect_moves: true,
            incremental: false,
            look_ahead_rows: 5,
            coalesce_overwrites: true,
        }
    }
}

impl DataConfig {
    /// Defaults for incremental loading.
    #[must_use]
    pub fn incremental() -> Self {
        Self {
            incremental: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_detect_moves(mut self, detect_moves: bool) -> Self {
        self.detect_moves = detect_moves;
        self
    }

    #[must_use]
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Negative disables look-ahead.
    #[must_use]
    pub fn with_look_ahead_rows(mut self, rows: i32) -> Self {
        self.look_ahead_rows = rows;
        self
    }

    #[must_use]
    pub fn with_coalesce_overwrites(mut self, coalesce: bool) -> Self {
        self.coalesce_overwrites = coalesce;
        self
    }

    /// Whether presenting `position` of `size` items should request more.
    #[must_use]
    pub fn wants_more(&self, position: usize, size: usize) -> bool {
        if self.look_ahead_rows < 0 {
            return false;
        }
        position + 1 + self.look_ahead_rows as usize >= size
    }
}

/// Offset pagination settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PagingConfig {
    /// Items requested per page.
    /// Default: 20.
    pub page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

impl PagingConfig {
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self { page_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(DataError::invalid("page_size must be positive"));
        }
        Ok(())
    }
}
