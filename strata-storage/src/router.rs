//! Shard routing
//!
//! Non-shard-aware classes always live in the meta partition. Shard-aware
//! classes live in exactly one named shard, chosen explicitly by the caller
//! on every query and save.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_core::{ClassSchema, ShardError, StrataResult};

use crate::partition::Partition;

/// Maps a class and an optional shard id to a partition.
#[derive(Debug)]
pub struct ShardRouter {
    meta: Arc<Partition>,
    shards: BTreeMap<String, Arc<Partition>>,
    cursor: AtomicUsize,
}

impl ShardRouter {
    pub fn new(meta: Partition, shards: impl IntoIterator<Item = Partition>) -> Self {
        Self {
            meta: Arc::new(meta),
            shards: shards
                .into_iter()
                .map(|p| (p.id().to_string(), Arc::new(p)))
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn meta(&self) -> &Arc<Partition> {
        &self.meta
    }

    pub fn shard(&self, shard_id: &str) -> StrataResult<&Arc<Partition>> {
        self.shards.get(shard_id).ok_or_else(|| {
            ShardError::UnknownShard {
                shard_id: shard_id.to_string(),
            }
            .into()
        })
    }

    /// Shard ids in sorted order.
    pub fn shard_ids(&self) -> Vec<String> {
        self.shards.keys().cloned().collect()
    }

    pub fn writable_shard_ids(&self) -> Vec<String> {
        self.shards
            .values()
            .filter(|p| p.is_writable())
            .map(|p| p.id().to_string())
            .collect()
    }

    /// Partition an operation on `schema` targets.
    ///
    /// The shard id is ignored for meta-partition classes.
    pub fn resolve_partition(
        &self,
        schema: &ClassSchema,
        shard_id: Option<&str>,
    ) -> StrataResult<Arc<Partition>> {
        if !schema.is_shard_aware() {
            return Ok(self.meta.clone());
        }
        let shard_id = shard_id.ok_or_else(|| ShardError::MissingShardId {
            class: schema.class_name().to_string(),
        })?;
        let partition = self.shard(shard_id)?;
        tracing::trace!(class = schema.class_name(), shard_id, "Resolved shard partition");
        Ok(partition.clone())
    }

    /// Pick a writable shard for a new shard-aware record, round-robin.
    pub fn pick_writable_shard(&self) -> StrataResult<String> {
        let writable = self.writable_shard_ids();
        if writable.is_empty() {
            return Err(ShardError::NoWritableShard.into());
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(writable[n % writable.len()].clone())
    }

    /// Every partition, meta first.
    pub fn partitions(&self) -> impl Iterator<Item = &Arc<Partition>> {
        std::iter::once(&self.meta).chain(self.shards.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use strata_core::{SchemaBuilder, StrataError};

    fn partition(id: &str, writable: bool) -> Partition {
        Partition::new(id, Arc::new(MemoryStore::new()), writable)
    }

    fn router() -> ShardRouter {
        ShardRouter::new(
            partition("meta", true),
            vec![partition("s1", true), partition("s2", true), partition("archive", false)],
        )
    }

    #[test]
    fn test_meta_class_ignores_shard_id() {
        let schema = SchemaBuilder::new("User").build();
        let router = router();
        assert_eq!(router.resolve_partition(&schema, None).unwrap().id(), "meta");
        assert_eq!(router.resolve_partition(&schema, Some("s1")).unwrap().id(), "meta");
    }

    #[test]
    fn test_sharded_class_requires_shard_id() {
        let schema = SchemaBuilder::sharded("Event").build();
        let err = router().resolve_partition(&schema, None).unwrap_err();
        assert_eq!(
            err,
            StrataError::Shard(ShardError::MissingShardId {
                class: "Event".to_string()
            })
        );
    }

    #[test]
    fn test_sharded_class_resolves_named_shard() {
        let schema = SchemaBuilder::sharded("Event").build();
        let router = router();
        assert_eq!(router.resolve_partition(&schema, Some("s2")).unwrap().id(), "s2");
        assert!(matches!(
            router.resolve_partition(&schema, Some("nope")),
            Err(StrataError::Shard(ShardError::UnknownShard { .. }))
        ));
    }

    #[test]
    fn test_pick_writable_shard_round_robin() {
        let router = router();
        assert_eq!(router.writable_shard_ids(), vec!["s1", "s2"]);
        let picks: Vec<String> = (0..4).map(|_| router.pick_writable_shard().unwrap()).collect();
        assert_eq!(picks, vec!["s1", "s2", "s1", "s2"]);
    }

    #[test]
    fn test_no_writable_shard() {
        let router = ShardRouter::new(partition("meta", true), vec![partition("archive", false)]);
        assert_eq!(
            router.pick_writable_shard().unwrap_err(),
            StrataError::Shard(ShardError::NoWritableShard)
        );
    }

    #[test]
    fn test_partitions_lists_meta_first() {
        let ids: Vec<String> = router().partitions().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["meta", "archive", "s1", "s2"]);
    }
}
