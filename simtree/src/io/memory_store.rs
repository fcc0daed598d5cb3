//! In-process node store.

use std::sync::Mutex;

use anyhow::{Result, anyhow};

use super::store::{DocumentBackend, StoreDocument};

/// Node store held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
    insert_fault: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next insertion batch fail after `after` of its nodes were staged.
    ///
    /// The fault fires once. Used to exercise batch atomicity.
    pub fn inject_insert_fault(&self, after: usize) {
        if let Ok(mut fault) = self.insert_fault.lock() {
            *fault = Some(after);
        }
    }
}

impl DocumentBackend for MemoryStore {
    fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T> {
        let doc = self
            .doc
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(f(&doc))
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T> {
        let mut doc = self
            .doc
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let mut staged = doc.clone();
        let out = f(&mut staged)?;
        *doc = staged;
        Ok(out)
    }

    fn take_insert_fault(&self) -> Option<usize> {
        self.insert_fault.lock().ok().and_then(|mut fault| fault.take())
    }
}
