//! In-memory document source for deterministic testing.
//!
//! Documents keep their insertion order, so a scan returns them in the
//! order they were seeded. Failures can be injected into the scan or into
//! a specific commit attempt, and every commit attempt is recorded for
//! assertion.
//!
//! ## Usage
//!
//! ```rust
//! use mend_db::MemoryDocumentSource;
//! use mend_core::Document;
//! use serde_json::json;
//!
//! let source = MemoryDocumentSource::new()
//!     .with_document("matches", Document::from_value("m1", json!({})).unwrap())
//!     .fail_commit_attempt(1);
//!
//! assert_eq!(source.documents("matches").len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, trace};

use mend_core::{Batch, Document, DocumentSource, Error, Result};

/// One call to [`DocumentSource::commit_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    /// Zero-based commit attempt number.
    pub attempt: usize,
    /// Index the runner gave the batch.
    pub batch_index: usize,
    /// Ids written by the batch, in order.
    pub ids: Vec<String>,
    /// Whether the batch was applied.
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct Collection {
    docs: Vec<Document>,
    index: HashMap<String, usize>,
}

impl Collection {
    fn upsert(&mut self, doc: Document) {
        match self.index.get(&doc.id) {
            Some(&pos) => self.docs[pos] = doc,
            None => {
                self.index.insert(doc.id.clone(), self.docs.len());
                self.docs.push(doc);
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<String, Collection>,
    commits: Vec<CommitRecord>,
    fail_scan_after: Option<usize>,
    failing_commits: HashSet<usize>,
}

/// In-memory [`DocumentSource`].
#[derive(Clone, Default)]
pub struct MemoryDocumentSource {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDocumentSource {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // State stays consistent across a panicking test thread; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed one document.
    pub fn with_document(self, collection: &str, doc: Document) -> Self {
        self.insert(collection, doc);
        self
    }

    /// Seed many documents, in order.
    pub fn with_documents(self, collection: &str, docs: impl IntoIterator<Item = Document>) -> Self {
        for doc in docs {
            self.insert(collection, doc);
        }
        self
    }

    /// Fail the scan after yielding `n` documents.
    pub fn fail_scan_after(self, n: usize) -> Self {
        self.lock().fail_scan_after = Some(n);
        self
    }

    /// Fail the given zero-based commit attempt.
    pub fn fail_commit_attempt(self, attempt: usize) -> Self {
        self.lock().failing_commits.insert(attempt);
        self
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_scan_after = None;
        state.failing_commits.clear();
    }

    /// Insert or replace a document.
    pub fn insert(&self, collection: &str, doc: Document) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .upsert(doc);
    }

    /// Fetch one document by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        let state = self.lock();
        let coll = state.collections.get(collection)?;
        coll.index.get(id).map(|&pos| coll.docs[pos].clone())
    }

    /// Snapshot of a collection in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    /// Every commit attempt so far.
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.lock().commits.clone()
    }

    /// Number of commit attempts so far.
    pub fn commit_attempts(&self) -> usize {
        self.lock().commits.len()
    }

    /// Forget recorded commit attempts.
    pub fn clear_commits(&self) {
        self.lock().commits.clear();
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    fn scan_collection<'a>(&'a self, collection: &'a str) -> BoxStream<'a, Result<Document>> {
        let (docs, fail_after) = {
            let state = self.lock();
            let docs = state
                .collections
                .get(collection)
                .map(|c| c.docs.clone())
                .unwrap_or_default();
            (docs, state.fail_scan_after)
        };

        debug!(
            subsystem = "db",
            component = "memory_source",
            op = "scan",
            collection,
            documents = docs.len(),
            "Scanning in-memory collection"
        );

        let items: Vec<Result<Document>> = match fail_after {
            Some(n) => docs
                .into_iter()
                .take(n)
                .map(Ok)
                .chain(std::iter::once(Err(Error::SourceUnavailable(format!(
                    "scan of {} interrupted after {} documents",
                    collection, n
                )))))
                .collect(),
            None => docs.into_iter().map(Ok).collect(),
        };

        stream::iter(items).boxed()
    }

    async fn commit_batch(&self, collection: &str, batch: &Batch) -> Result<()> {
        let mut state = self.lock();
        let attempt = state.commits.len();
        let ids: Vec<String> = batch.ids().map(str::to_string).collect();

        let outcome = if state.failing_commits.contains(&attempt) {
            Err(Error::SourceUnavailable(format!(
                "commit attempt {} rejected by store",
                attempt
            )))
        } else {
            let coll = state.collections.entry(collection.to_string()).or_default();
            match ids.iter().find(|id| !coll.index.contains_key(id.as_str())) {
                Some(missing) => Err(Error::DocumentNotFound(missing.clone())),
                None => {
                    for entry in &batch.entries {
                        let pos = coll.index[&entry.id];
                        coll.docs[pos].apply(&entry.patch);
                    }
                    Ok(())
                }
            }
        };

        trace!(
            subsystem = "db",
            component = "memory_source",
            op = "commit",
            collection,
            attempt,
            batch_index = batch.index,
            batch_size = batch.len(),
            success = outcome.is_ok(),
            "Commit attempt"
        );

        state.commits.push(CommitRecord {
            attempt,
            batch_index: batch.index,
            ids,
            succeeded: outcome.is_ok(),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mend_core::{Patch, PatchEntry};
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document::from_value(id, json!({"foo": "bar"})).unwrap()
    }

    fn batch(index: usize, ids: &[&str]) -> Batch {
        Batch {
            index,
            entries: ids
                .iter()
                .map(|id| PatchEntry::new(*id, Patch::new().with("isActive", json!(true))))
                .collect(),
        }
    }

    #[tokio::test]
    async fn scan_returns_documents_in_insertion_order() {
        let source = MemoryDocumentSource::new().with_documents("c", ["b", "a", "c"].map(doc));
        let docs: Vec<Document> = source.scan_collection("c").try_collect().await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn scan_of_unknown_collection_is_empty() {
        let source = MemoryDocumentSource::new();
        let docs: Vec<Document> = source.scan_collection("nope").try_collect().await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn injected_scan_failure_surfaces_as_error() {
        let source = MemoryDocumentSource::new()
            .with_documents("c", ["a", "b", "c"].map(doc))
            .fail_scan_after(2);
        let items: Vec<Result<Document>> = source.scan_collection("c").collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(matches!(items[2], Err(Error::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn commit_merges_patch_and_keeps_other_fields() {
        let source = MemoryDocumentSource::new().with_document("c", doc("a"));
        source.commit_batch("c", &batch(0, &["a"])).await.unwrap();

        let a = source.get("c", "a").unwrap();
        assert_eq!(a.fields["foo"], json!("bar"));
        assert_eq!(a.fields["isActive"], json!(true));
    }

    #[tokio::test]
    async fn commit_with_missing_document_applies_nothing() {
        let source = MemoryDocumentSource::new().with_document("c", doc("a"));
        let err = source
            .commit_batch("c", &batch(0, &["a", "ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(id) if id == "ghost"));
        assert!(!source.get("c", "a").unwrap().has("isActive"));
        assert!(!source.commits()[0].succeeded);
    }

    #[tokio::test]
    async fn injected_commit_failure_is_recorded() {
        let source = MemoryDocumentSource::new()
            .with_documents("c", ["a", "b"].map(doc))
            .fail_commit_attempt(1);

        source.commit_batch("c", &batch(0, &["a"])).await.unwrap();
        assert!(source.commit_batch("c", &batch(1, &["b"])).await.is_err());

        let commits = source.commits();
        assert_eq!(commits.len(), 2);
        assert!(commits[0].succeeded);
        assert!(!commits[1].succeeded);
        assert_eq!(commits[1].ids, vec!["b".to_string()]);
        assert!(!source.get("c", "b").unwrap().has("isActive"));

        source.clear_failures();
        source.commit_batch("c", &batch(1, &["b"])).await.unwrap();
        assert!(source.get("c", "b").unwrap().has("isActive"));
    }

    #[test]
    fn insert_replaces_existing_document() {
        let source = MemoryDocumentSource::new().with_document("c", doc("a"));
        source.insert("c", Document::from_value("a", json!({"x": 1})).unwrap());
        let docs = source.documents("c");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["x"], json!(1));
    }
}
