//! Store wrapper for exercising interleaved and failing batch writes

use meshgate_common::{Collection, Database, Error, Precondition, RecordStore, Result};
use parking_lot::Mutex;
use std::sync::Arc;

type Hook = Box<dyn FnOnce() + Send>;

/// Delegates to a database; can run a competing write just before the next
/// batch commits, or reject every batch
pub(crate) struct InterleavedStore {
    inner: Arc<Database>,
    before_batch: Mutex<Option<Hook>>,
    fail_batches: bool,
}

impl InterleavedStore {
    pub(crate) fn with_hook(inner: Arc<Database>, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            before_batch: Mutex::new(Some(Box::new(hook))),
            fail_batches: false,
        }
    }

    pub(crate) fn failing(inner: Arc<Database>) -> Self {
        Self {
            inner,
            before_batch: Mutex::new(None),
            fail_batches: true,
        }
    }
}

impl RecordStore for InterleavedStore {
    fn get_raw(&self, collection: Collection, id: &str) -> Result<Option<String>> {
        self.inner.get_raw(collection, id)
    }

    fn put_raw(&self, collection: Collection, id: &str, body: &str) -> Result<()> {
        self.inner.put_raw(collection, id, body)
    }

    fn put_batch_if(
        &self,
        expected: &[Precondition],
        records: &[(Collection, String, String)],
    ) -> Result<bool> {
        if self.fail_batches {
            return Err(Error::internal("disk full"));
        }
        let hook = self.before_batch.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.put_batch_if(expected, records)
    }

    fn delete_raw(&self, collection: Collection, id: &str) -> Result<bool> {
        self.inner.delete_raw(collection, id)
    }

    fn list_raw(&self, collection: Collection) -> Result<Vec<(String, String)>> {
        self.inner.list_raw(collection)
    }
}
