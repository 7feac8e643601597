//! Core traits for mend abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable document stores and testability.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::{Batch, Document};

// =============================================================================
// DOCUMENT SOURCE
// =============================================================================

/// A document store holding the collection being repaired.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Stream every current document of a collection.
    ///
    /// The stream is lazy, finite, and cannot be restarted. Order is
    /// unspecified. A failed read surfaces as an `Err` item.
    fn scan_collection<'a>(&'a self, collection: &'a str) -> BoxStream<'a, Result<Document>>;

    /// Merge every patch of the batch into its target document.
    ///
    /// All-or-nothing: either every entry is applied or none is. Fields not
    /// named in a patch are left untouched.
    async fn commit_batch(&self, collection: &str, batch: &Batch) -> Result<()>;
}

#[async_trait]
impl<T: DocumentSource + ?Sized> DocumentSource for Arc<T> {
    fn scan_collection<'a>(&'a self, collection: &'a str) -> BoxStream<'a, Result<Document>> {
        (**self).scan_collection(collection)
    }

    async fn commit_batch(&self, collection: &str, batch: &Batch) -> Result<()> {
        (**self).commit_batch(collection, batch).await
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Source of "now" for patches that default a timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
