//! Shared workspace managed as dynamic partitions.
//!
//! The workspace is an ordered, gap-free list of partitions covering the
//! whole capacity. Allocation is best-fit with splitting; release merges the
//! freed partition with free neighbours; when free space exists but is
//! fragmented, the allocator compacts once and retries once.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::AdmissionError;
use crate::core::model::{Order, WorkspaceLease};
use crate::util::serde::OrderId;

/// Order bound to an allocated partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOwner {
    /// Order the partition serves.
    pub order_id: OrderId,
    /// Display name (the dish).
    pub label: String,
}

/// A contiguous slice of the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// 1-based position in the partition list, renumbered on every structural change.
    pub id: u32,
    /// Size in units.
    pub size: u32,
    /// Start offset.
    pub start: u32,
    /// Owner when allocated.
    pub owner: Option<PartitionOwner>,
}

impl Partition {
    const fn vacant(size: u32, start: u32) -> Self {
        Self {
            id: 0,
            size,
            start,
            owner: None,
        }
    }

    /// Whether the partition is allocated.
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.owner.is_some()
    }

    /// One past the last unit.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start + self.size
    }

    fn serves(&self, order_id: OrderId) -> bool {
        self.owner.as_ref().is_some_and(|o| o.order_id == order_id)
    }

    const fn lease(&self, order_id: OrderId) -> WorkspaceLease {
        WorkspaceLease {
            order_id,
            start: self.start,
            size: self.size,
        }
    }
}

/// Immutable copy of the workspace state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    /// Total capacity.
    pub total: u32,
    /// Units allocated.
    pub used: u32,
    /// Partition layout.
    pub partitions: Vec<Partition>,
}

impl WorkspaceSnapshot {
    /// Units not allocated.
    #[must_use]
    pub const fn free(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

/// Best-fit dynamic partition allocator over a fixed capacity.
#[derive(Debug, Clone)]
pub struct WorkspaceAllocator {
    total: u32,
    partitions: Vec<Partition>,
    defragmentations: u64,
}

impl WorkspaceAllocator {
    /// A workspace of `total` units held in one free partition.
    #[must_use]
    pub fn new(total: u32) -> Self {
        let mut allocator = Self {
            total,
            partitions: Vec::new(),
            defragmentations: 0,
        };
        if total > 0 {
            allocator.partitions.push(Partition::vacant(total, 0));
        }
        allocator.renumber();
        allocator
    }

    /// Total capacity.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Units allocated.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.partitions
            .iter()
            .filter(|p| p.is_allocated())
            .map(|p| p.size)
            .sum()
    }

    /// Units not allocated.
    #[must_use]
    pub fn free(&self) -> u32 {
        self.total - self.used()
    }

    /// Size of the largest free partition.
    #[must_use]
    pub fn largest_free_block(&self) -> u32 {
        self.partitions
            .iter()
            .filter(|p| !p.is_allocated())
            .map(|p| p.size)
            .max()
            .unwrap_or(0)
    }

    /// Current layout in address order.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// How many times compaction has run.
    #[must_use]
    pub const fn defragmentations(&self) -> u64 {
        self.defragmentations
    }

    /// Whether `order_id` owns a partition.
    #[must_use]
    pub fn holds(&self, order_id: OrderId) -> bool {
        self.partitions.iter().any(|p| p.serves(order_id))
    }

    /// Current placement of the partition owned by `order_id`.
    #[must_use]
    pub fn lease_of(&self, order_id: OrderId) -> Option<WorkspaceLease> {
        self.partitions
            .iter()
            .find(|p| p.serves(order_id))
            .map(|p| p.lease(order_id))
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            total: self.total,
            used: self.used(),
            partitions: self.partitions.clone(),
        }
    }

    /// Allocate the order's required workspace.
    ///
    /// # Errors
    ///
    /// `Malformed` if the order has no dish or needs no space, `AlreadyAllocated`
    /// if it already owns a partition, `ExceedsCapacity` if it can never fit,
    /// `InsufficientSpace` if it does not fit now. No state changes on error
    /// except a compaction that was attempted to make room.
    pub fn allocate(&mut self, order: &Order) -> Result<WorkspaceLease, AdmissionError> {
        let dish = order.validate()?;
        self.allocate_units(order.id, dish.name.clone(), dish.required_space)
    }

    /// Allocate `size` units for `order_id`.
    ///
    /// # Errors
    ///
    /// Same as [`WorkspaceAllocator::allocate`].
    pub fn allocate_units(
        &mut self,
        order_id: OrderId,
        label: impl Into<String>,
        size: u32,
    ) -> Result<WorkspaceLease, AdmissionError> {
        if size == 0 {
            return Err(AdmissionError::Malformed {
                order_id,
                reason: "zero-sized workspace request".into(),
            });
        }
        if self.holds(order_id) {
            return Err(AdmissionError::AlreadyAllocated(order_id));
        }
        if size > self.total {
            return Err(AdmissionError::ExceedsCapacity {
                requested: size,
                capacity: self.total,
            });
        }
        let label = label.into();
        if let Some(lease) = self.best_fit(order_id, &label, size) {
            return Ok(lease);
        }
        self.handle_insufficient_space(order_id, &label, size)
    }

    /// Fragmentation is fixed by one compaction and one retry; scarcity is reported.
    fn handle_insufficient_space(
        &mut self,
        order_id: OrderId,
        label: &str,
        size: u32,
    ) -> Result<WorkspaceLease, AdmissionError> {
        let free = self.free();
        if free < size {
            debug!(order_id, requested = size, free, "workspace exhausted");
            return Err(AdmissionError::InsufficientSpace {
                requested: size,
                free,
            });
        }
        debug!(
            order_id,
            requested = size,
            free,
            largest = self.largest_free_block(),
            "workspace fragmented, compacting"
        );
        self.defragment();
        self.best_fit(order_id, label, size).ok_or_else(|| {
            warn!(order_id, requested = size, free, "allocation failed after compaction");
            AdmissionError::InsufficientSpace {
                requested: size,
                free,
            }
        })
    }

    fn best_fit(&mut self, order_id: OrderId, label: &str, size: u32) -> Option<WorkspaceLease> {
        let index = self
            .partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_allocated() && p.size >= size)
            .min_by_key(|(_, p)| p.size - size)
            .map(|(i, _)| i)?;

        let leftover = self.partitions[index].size - size;
        if leftover > 0 {
            let start = self.partitions[index].start + size;
            self.partitions[index].size = size;
            self.partitions.insert(index + 1, Partition::vacant(leftover, start));
        }
        let chosen = &mut self.partitions[index];
        chosen.owner = Some(PartitionOwner {
            order_id,
            label: label.to_owned(),
        });
        let lease = chosen.lease(order_id);
        self.renumber();
        debug!(order_id, start = lease.start, size, leftover, "workspace allocated");
        Some(lease)
    }

    /// Free the partition owned by `order_id` and merge it with free neighbours.
    ///
    /// # Errors
    ///
    /// Returns `NotAllocated` if no partition is bound to that order.
    pub fn release(&mut self, order_id: OrderId) -> Result<u32, AdmissionError> {
        let mut index = self
            .partitions
            .iter()
            .position(|p| p.serves(order_id))
            .ok_or(AdmissionError::NotAllocated(order_id))?;
        let freed = self.partitions[index].size;
        self.partitions[index].owner = None;

        if index > 0 && !self.partitions[index - 1].is_allocated() {
            let current = self.partitions.remove(index);
            index -= 1;
            self.partitions[index].size += current.size;
        }
        if index + 1 < self.partitions.len() && !self.partitions[index + 1].is_allocated() {
            let next = self.partitions.remove(index + 1);
            self.partitions[index].size += next.size;
        }
        self.renumber();
        debug!(order_id, freed, "workspace released");
        Ok(freed)
    }

    /// Compact allocated partitions to the front in address order and
    /// coalesce all free space into one trailing partition.
    pub fn defragment(&mut self) {
        let mut allocated: Vec<Partition> = self
            .partitions
            .drain(..)
            .filter(Partition::is_allocated)
            .collect();
        allocated.sort_by_key(|p| p.start);

        let mut cursor = 0;
        for partition in &mut allocated {
            partition.start = cursor;
            cursor += partition.size;
        }
        if cursor < self.total {
            allocated.push(Partition::vacant(self.total - cursor, cursor));
        }
        self.partitions = allocated;
        self.renumber();
        self.defragmentations += 1;
    }

    /// Verify the layout: full coverage, no gaps or overlaps, no empty
    /// partitions, no two free neighbours.
    ///
    /// # Errors
    ///
    /// Describes the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut cursor = 0;
        let mut previous_free = false;
        for partition in &self.partitions {
            if partition.size == 0 {
                return Err(format!("partition {} is empty", partition.id));
            }
            if partition.start != cursor {
                return Err(format!(
                    "partition {} starts at {}, expected {}",
                    partition.id, partition.start, cursor
                ));
            }
            let free = !partition.is_allocated();
            if free && previous_free {
                return Err(format!("partition {} is free next to a free partition", partition.id));
            }
            previous_free = free;
            cursor = partition.end();
        }
        if cursor != self.total {
            return Err(format!("partitions cover {cursor} of {}", self.total));
        }
        Ok(())
    }

    fn renumber(&mut self) {
        for (index, partition) in (1u32..).zip(self.partitions.iter_mut()) {
            partition.id = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay out free blocks of the given sizes separated by one-unit allocated spacers.
    fn fragmented(free_sizes: &[u32]) -> WorkspaceAllocator {
        let total: u32 = free_sizes.iter().sum::<u32>() + u32::try_from(free_sizes.len()).unwrap_or(0);
        let mut ws = WorkspaceAllocator::new(total);
        let mut next_id = 1000;
        for size in free_sizes {
            ws.allocate_units(next_id, "filler", *size).unwrap();
            ws.allocate_units(next_id + 1, "spacer", 1).unwrap();
            next_id += 2;
        }
        let mut id = 1000;
        for _ in free_sizes {
            ws.release(id).unwrap();
            id += 2;
        }
        ws
    }

    #[test]
    fn test_best_fit_picks_smallest_sufficient_block() {
        let mut ws = fragmented(&[10, 30, 15]);
        ws.check_invariants().unwrap();

        let lease = ws.allocate_units(1, "burger", 12).unwrap();
        // free blocks start at 0, 11, 42; the 15-unit block is the best fit
        assert_eq!(lease.start, 42);
        assert_eq!(lease.size, 12);

        let sizes: Vec<(u32, bool)> = ws.partitions().iter().map(|p| (p.size, p.is_allocated())).collect();
        assert_eq!(
            sizes,
            vec![(10, false), (1, true), (30, false), (1, true), (12, true), (3, false), (1, true)]
        );
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_exact_fit_does_not_split() {
        let mut ws = WorkspaceAllocator::new(20);
        ws.allocate_units(1, "a", 20).unwrap();
        assert_eq!(ws.partitions().len(), 1);
        assert_eq!(ws.free(), 0);
    }

    #[test]
    fn test_no_double_allocation() {
        let mut ws = WorkspaceAllocator::new(100);
        ws.allocate_units(1, "a", 10).unwrap();
        assert_eq!(ws.allocate_units(1, "a", 10), Err(AdmissionError::AlreadyAllocated(1)));
        ws.release(1).unwrap();
        assert!(ws.allocate_units(1, "a", 10).is_ok());
    }

    #[test]
    fn test_exceeds_capacity() {
        let mut ws = WorkspaceAllocator::new(50);
        assert_eq!(
            ws.allocate_units(1, "a", 51),
            Err(AdmissionError::ExceedsCapacity { requested: 51, capacity: 50 })
        );
        assert_eq!(ws.partitions().len(), 1);
    }

    #[test]
    fn test_release_merges_both_neighbours() {
        let mut ws = WorkspaceAllocator::new(30);
        ws.allocate_units(1, "a", 10).unwrap();
        ws.allocate_units(2, "b", 10).unwrap();
        ws.allocate_units(3, "c", 10).unwrap();
        ws.release(1).unwrap();
        ws.release(3).unwrap();
        assert_eq!(ws.partitions().len(), 3);

        ws.release(2).unwrap();
        assert_eq!(ws.partitions().len(), 1);
        assert_eq!(ws.partitions()[0].start, 0);
        assert_eq!(ws.partitions()[0].size, 30);
        assert_eq!(ws.partitions()[0].id, 1);
    }

    #[test]
    fn test_release_unknown_order() {
        let mut ws = WorkspaceAllocator::new(30);
        assert_eq!(ws.release(9), Err(AdmissionError::NotAllocated(9)));
    }

    #[test]
    fn test_fragmentation_triggers_compaction() {
        // 10 free, 1 used, 10 free, 1 used -> 20 free but no block of 15
        let mut ws = fragmented(&[10, 10]);
        assert_eq!(ws.free(), 20);
        assert_eq!(ws.largest_free_block(), 10);

        let lease = ws.allocate_units(7, "big", 15).unwrap();
        assert_eq!(ws.defragmentations(), 1);
        assert_eq!(lease.start, 2);
        assert_eq!(ws.free(), 5);
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_scarcity_does_not_compact() {
        let mut ws = WorkspaceAllocator::new(20);
        ws.allocate_units(1, "a", 15).unwrap();
        assert_eq!(
            ws.allocate_units(2, "b", 10),
            Err(AdmissionError::InsufficientSpace { requested: 10, free: 5 })
        );
        assert_eq!(ws.defragmentations(), 0);
    }

    #[test]
    fn test_defragment_is_idempotent() {
        let mut ws = fragmented(&[4, 9, 2]);
        ws.defragment();
        let first = ws.partitions().to_vec();
        ws.defragment();
        assert_eq!(ws.partitions(), first.as_slice());
        ws.check_invariants().unwrap();
    }
}
