//! In-memory bookkeeping for the evicting cache.
//!
//! The index knows nothing about files. It tracks which ranges exist, their
//! lengths and last-access times, and plans evictions. The store applies a
//! plan only after the backing file is in place, so a failed write never
//! touches the index.

use crate::error::CacheError;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One stored range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub resource_id: ResourceId,
    pub offset: u64,
    pub length: u64,
    /// Milliseconds since the Unix epoch, from the cache's clock.
    pub last_access: i64,
}

#[derive(Debug, Clone, Copy)]
struct EntryMeta {
    length: u64,
    last_access: i64,
}

/// Eviction order: oldest access first, then resource id, then offset.
type RecencyKey = (i64, ResourceId, u64);

/// Outcome of [`RangeIndex::plan_insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InsertPlan {
    pub victims: Vec<CacheEntry>,
    pub replaced: Option<CacheEntry>,
}

/// A slice of one entry that contributes to a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub entry_offset: u64,
    pub entry_length: u64,
    /// Bytes to skip at the start of the entry.
    pub skip: u64,
    /// Bytes to take after skipping.
    pub take: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RangeIndex {
    capacity: u64,
    occupied: u64,
    entries: HashMap<ResourceId, BTreeMap<u64, EntryMeta>>,
    recency: BTreeSet<RecencyKey>,
}

impl RangeIndex {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn occupied(&self) -> u64 {
        self.occupied
    }

    pub fn len(&self) -> usize {
        self.recency.len()
    }

    pub fn resource_count(&self) -> usize {
        self.entries.len()
    }

    /// Work out which entries must go for a range of `length` to fit.
    ///
    /// An existing entry at the same `(resource, offset)` is replaced and its
    /// bytes count as freed.
    pub fn plan_insert(
        &self,
        resource: &ResourceId,
        offset: u64,
        length: u64,
    ) -> Result<InsertPlan, CacheError> {
        if offset.checked_add(length).is_none() {
            return Err(CacheError::RangeOverflow { offset, length });
        }
        if length > self.capacity {
            return Err(CacheError::CapacityUnavailable {
                requested: length,
                capacity: self.capacity,
            });
        }

        let replaced = self.entry(resource, offset);
        let mut projected = self.occupied - replaced.as_ref().map_or(0, |e| e.length) + length;

        let mut victims = Vec::new();
        for (last_access, victim_resource, victim_offset) in &self.recency {
            if projected <= self.capacity {
                break;
            }
            if victim_resource == resource && *victim_offset == offset {
                continue;
            }
            let Some(meta) = self.meta(victim_resource, *victim_offset) else {
                continue;
            };
            projected -= meta.length;
            victims.push(CacheEntry {
                resource_id: victim_resource.clone(),
                offset: *victim_offset,
                length: meta.length,
                last_access: *last_access,
            });
        }

        Ok(InsertPlan { victims, replaced })
    }

    /// Apply a plan produced by [`plan_insert`](Self::plan_insert) for the same range.
    pub fn commit_insert(
        &mut self,
        plan: &InsertPlan,
        resource: &ResourceId,
        offset: u64,
        length: u64,
        now: i64,
    ) {
        for victim in &plan.victims {
            self.remove(&victim.resource_id, victim.offset);
        }
        self.remove(resource, offset);

        self.entries.entry(resource.clone()).or_default().insert(
            offset,
            EntryMeta {
                length,
                last_access: now,
            },
        );
        self.recency.insert((now, resource.clone(), offset));
        self.occupied += length;
    }

    pub fn remove(&mut self, resource: &ResourceId, offset: u64) -> Option<CacheEntry> {
        let ranges = self.entries.get_mut(resource)?;
        let meta = ranges.remove(&offset)?;
        if ranges.is_empty() {
            self.entries.remove(resource);
        }
        self.recency
            .remove(&(meta.last_access, resource.clone(), offset));
        self.occupied -= meta.length;

        Some(CacheEntry {
            resource_id: resource.clone(),
            offset,
            length: meta.length,
            last_access: meta.last_access,
        })
    }

    /// Mark an entry as used at `now`.
    pub fn touch(&mut self, resource: &ResourceId, offset: u64, now: i64) {
        let Some(meta) = self
            .entries
            .get_mut(resource)
            .and_then(|ranges| ranges.get_mut(&offset))
        else {
            return;
        };
        self.recency
            .remove(&(meta.last_access, resource.clone(), offset));
        meta.last_access = now;
        self.recency.insert((now, resource.clone(), offset));
    }

    /// Entries covering `[offset, offset + length)` in order, or `None` if any
    /// byte of the range is missing.
    pub fn coverage(&self, resource: &ResourceId, offset: u64, length: u64) -> Option<Vec<Segment>> {
        let ranges = self.entries.get(resource)?;
        let end = offset.checked_add(length)?;
        let mut segments = Vec::new();
        let mut pos = offset;

        while pos < end {
            // Of the entries starting at or before `pos`, take the one reaching furthest.
            let (entry_offset, meta) = ranges
                .range(..=pos)
                .filter(|(start, meta)| start.saturating_add(meta.length) > pos)
                .max_by_key(|(start, meta)| start.saturating_add(meta.length))?;
            let entry_end = entry_offset.saturating_add(meta.length);
            let take_end = entry_end.min(end);
            segments.push(Segment {
                entry_offset: *entry_offset,
                entry_length: meta.length,
                skip: pos - entry_offset,
                take: take_end - pos,
            });
            pos = take_end;
        }

        Some(segments)
    }

    /// Drop everything; returns the bytes that were held.
    pub fn clear(&mut self) -> u64 {
        let freed = self.occupied;
        self.entries.clear();
        self.recency.clear();
        self.occupied = 0;
        freed
    }

    /// Snapshot in eviction order.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.recency
            .iter()
            .filter_map(|(last_access, resource, offset)| {
                self.meta(resource, *offset).map(|meta| CacheEntry {
                    resource_id: resource.clone(),
                    offset: *offset,
                    length: meta.length,
                    last_access: *last_access,
                })
            })
            .collect()
    }

    fn meta(&self, resource: &ResourceId, offset: u64) -> Option<EntryMeta> {
        self.entries.get(resource)?.get(&offset).copied()
    }

    fn entry(&self, resource: &ResourceId, offset: u64) -> Option<CacheEntry> {
        self.meta(resource, offset).map(|meta| CacheEntry {
            resource_id: resource.clone(),
            offset,
            length: meta.length,
            last_access: meta.last_access,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn insert(index: &mut RangeIndex, resource: &str, offset: u64, length: u64, now: i64) -> InsertPlan {
        let resource = id(resource);
        let plan = index.plan_insert(&resource, offset, length).unwrap();
        index.commit_insert(&plan, &resource, offset, length, now);
        plan
    }

    #[test]
    fn test_insert_within_capacity() {
        let mut index = RangeIndex::new(10);
        let plan = insert(&mut index, "a", 0, 4, 1);
        assert!(plan.victims.is_empty());
        assert_eq!(index.occupied(), 4);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut index = RangeIndex::new(10);
        insert(&mut index, "a", 0, 4, 1);
        insert(&mut index, "b", 0, 4, 2);
        let plan = insert(&mut index, "c", 0, 4, 3);

        assert_eq!(plan.victims.len(), 1);
        assert_eq!(plan.victims[0].resource_id, id("a"));
        assert_eq!(index.occupied(), 8);
    }

    #[test]
    fn test_touch_changes_victim() {
        let mut index = RangeIndex::new(10);
        insert(&mut index, "a", 0, 4, 1);
        insert(&mut index, "b", 0, 4, 2);
        index.touch(&id("a"), 0, 3);

        let plan = insert(&mut index, "c", 0, 4, 4);
        assert_eq!(plan.victims[0].resource_id, id("b"));
    }

    #[test]
    fn test_tie_break_by_resource_then_offset() {
        let mut index = RangeIndex::new(12);
        insert(&mut index, "b", 0, 4, 5);
        insert(&mut index, "a", 4, 4, 5);
        insert(&mut index, "a", 0, 4, 5);

        let plan = index.plan_insert(&id("c"), 0, 8).unwrap();
        let order: Vec<_> = plan
            .victims
            .iter()
            .map(|v| (v.resource_id.as_str().to_string(), v.offset))
            .collect();
        assert_eq!(order, vec![("a".to_string(), 0), ("a".to_string(), 4)]);
    }

    #[test]
    fn test_oversized_insert_rejected() {
        let mut index = RangeIndex::new(10);
        insert(&mut index, "a", 0, 4, 1);

        let err = index.plan_insert(&id("b"), 0, 11).unwrap_err();
        assert_eq!(
            err,
            CacheError::CapacityUnavailable {
                requested: 11,
                capacity: 10
            }
        );
        assert_eq!(index.occupied(), 4);
    }

    #[test]
    fn test_replacement_frees_old_length() {
        let mut index = RangeIndex::new(10);
        insert(&mut index, "a", 0, 6, 1);
        insert(&mut index, "b", 0, 4, 2);

        let plan = insert(&mut index, "a", 0, 6, 3);
        assert!(plan.victims.is_empty());
        assert_eq!(plan.replaced.unwrap().length, 6);
        assert_eq!(index.occupied(), 10);
    }

    #[test]
    fn test_coverage_stitches_entries() {
        let mut index = RangeIndex::new(100);
        insert(&mut index, "a", 0, 10, 1);
        insert(&mut index, "a", 10, 10, 1);
        insert(&mut index, "a", 5, 20, 1);

        let segments = index.coverage(&id("a"), 2, 20).unwrap();
        assert_eq!(segments[0].entry_offset, 0);
        assert_eq!(segments[0].skip, 2);
        assert_eq!(segments.iter().map(|s| s.take).sum::<u64>(), 20);

        assert!(index.coverage(&id("a"), 20, 10).is_none());
        assert!(index.coverage(&id("b"), 0, 1).is_none());
    }

    #[test]
    fn test_coverage_gap_is_miss() {
        let mut index = RangeIndex::new(100);
        insert(&mut index, "a", 0, 10, 1);
        insert(&mut index, "a", 11, 10, 1);
        assert!(index.coverage(&id("a"), 0, 20).is_none());
        assert!(index.coverage(&id("a"), 0, 10).is_some());
    }

    #[test]
    fn test_clear() {
        let mut index = RangeIndex::new(100);
        insert(&mut index, "a", 0, 10, 1);
        insert(&mut index, "b", 0, 10, 1);
        assert_eq!(index.clear(), 20);
        assert_eq!(index.occupied(), 0);
        assert_eq!(index.resource_count(), 0);
        assert!(index.entries().is_empty());
    }
}
