//! Introspection cache
//!
//! Structure, primary keys and foreign keys are cached per
//! `(fingerprint, table)`; the table list per fingerprint. Entries never
//! expire; they are dropped only by explicit invalidation (e.g. after
//! table settings are saved or the schema is known to have changed).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::{Fingerprint, ForeignKey, PrimaryKey, Result, TableDs, TableStructure};

type TableKey = (Fingerprint, String);

struct Store<V> {
    name: &'static str,
    entries: RwLock<HashMap<TableKey, Arc<V>>>,
}

impl<V> Store<V> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn get_or_load<F, Fut>(&self, key: TableKey, load: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(hit) = self.entries.read().get(&key) {
            tracing::debug!(kind = self.name, fingerprint = %key.0, table = %key.1, "introspection cache hit");
            return Ok(hit.clone());
        }
        tracing::debug!(kind = self.name, fingerprint = %key.0, table = %key.1, "introspection cache miss");

        // Failed loads are not cached.
        let loaded = Arc::new(load().await?);
        self.entries.write().insert(key, loaded.clone());
        Ok(loaded)
    }

    fn invalidate_table(&self, fingerprint: &Fingerprint, table: &str) {
        self.entries
            .write()
            .retain(|(fp, t), _| !(fp == fingerprint && t == table));
    }

    fn invalidate_connection(&self, fingerprint: &Fingerprint) {
        self.entries.write().retain(|(fp, _), _| fp != fingerprint);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Cache of introspection results shared by every adapter
pub struct IntrospectionCache {
    structure: Store<Vec<TableStructure>>,
    primary_keys: Store<Vec<PrimaryKey>>,
    foreign_keys: Store<Vec<ForeignKey>>,
    tables: Store<Vec<TableDs>>,
}

impl Default for IntrospectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrospectionCache {
    pub fn new() -> Self {
        Self {
            structure: Store::new("structure"),
            primary_keys: Store::new("primary_keys"),
            foreign_keys: Store::new("foreign_keys"),
            tables: Store::new("tables"),
        }
    }

    pub async fn structure<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        table: &str,
        load: F,
    ) -> Result<Arc<Vec<TableStructure>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TableStructure>>>,
    {
        self.structure
            .get_or_load((fingerprint.clone(), table.to_string()), load)
            .await
    }

    pub async fn primary_keys<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        table: &str,
        load: F,
    ) -> Result<Arc<Vec<PrimaryKey>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<PrimaryKey>>>,
    {
        self.primary_keys
            .get_or_load((fingerprint.clone(), table.to_string()), load)
            .await
    }

    pub async fn foreign_keys<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        table: &str,
        load: F,
    ) -> Result<Arc<Vec<ForeignKey>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ForeignKey>>>,
    {
        self.foreign_keys
            .get_or_load((fingerprint.clone(), table.to_string()), load)
            .await
    }

    pub async fn tables<F, Fut>(&self, fingerprint: &Fingerprint, load: F) -> Result<Arc<Vec<TableDs>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TableDs>>>,
    {
        self.tables
            .get_or_load((fingerprint.clone(), String::new()), load)
            .await
    }

    /// Forget everything cached for one table (and the table list)
    pub fn invalidate_table(&self, fingerprint: &Fingerprint, table: &str) {
        self.structure.invalidate_table(fingerprint, table);
        self.primary_keys.invalidate_table(fingerprint, table);
        self.foreign_keys.invalidate_table(fingerprint, table);
        self.tables.invalidate_connection(fingerprint);
    }

    /// Forget everything cached for one connection
    pub fn invalidate_connection(&self, fingerprint: &Fingerprint) {
        self.structure.invalidate_connection(fingerprint);
        self.primary_keys.invalidate_connection(fingerprint);
        self.foreign_keys.invalidate_connection(fingerprint);
        self.tables.invalidate_connection(fingerprint);
    }

    pub fn clear(&self) {
        self.structure.clear();
        self.primary_keys.clear();
        self.foreign_keys.clear();
        self.tables.clear();
    }

    /// Total cached entries across all kinds
    pub fn len(&self) -> usize {
        self.structure.len() + self.primary_keys.len() + self.foreign_keys.len() + self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
