//! # Memory Tracker
//!
//! Best-effort record of driver allocations for leak detection. The table
//! has a fixed number of slots reserved at init; when every slot is taken,
//! the oldest freed record is recycled, and only a table full of live
//! records refuses new entries.

use alloc::vec::Vec;

use crate::error::{Resource, TelemetryError, TelemetryResult};
use crate::health::DriverId;

/// One tracked allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Address handed out by the allocator
    pub address: usize,
    /// Size in bytes
    pub size: usize,
    /// Allocation time (ns)
    pub allocated_ns: u64,
    /// Source file of the allocation site
    pub file: &'static str,
    /// Source line of the allocation site
    pub line: u32,
    /// Allocating thread
    pub thread_id: u32,
    /// Driver the allocation is attributed to
    pub owner: Option<DriverId>,
    /// Released through `track_free`
    pub freed: bool,
    /// Already reported by a leak scan
    pub leak_reported: bool,
}

/// Allocation reported by a leak scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leak {
    /// Address
    pub address: usize,
    /// Size in bytes
    pub size: usize,
    /// Age at scan time (ns)
    pub age_ns: u64,
    /// Source file
    pub file: &'static str,
    /// Source line
    pub line: u32,
    /// Attributed driver
    pub owner: Option<DriverId>,
}

/// Result of one leak scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakScan {
    /// Leaks not reported by an earlier scan
    pub new_leaks: Vec<Leak>,
    /// Every live record past the threshold
    pub outstanding: u32,
    /// Bytes held by those records
    pub outstanding_bytes: u64,
}

/// Aggregate of a finished scan, as returned to callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakSummary {
    /// Leaks reported for the first time
    pub new_leaks: u32,
    /// Outstanding leaks
    pub leaks: u32,
    /// Outstanding leaked bytes
    pub bytes: u64,
}

/// Fixed-capacity allocation table
#[derive(Debug)]
pub struct AllocationTracker {
    records: Vec<AllocationRecord>,
    capacity: usize,
    live: usize,
    live_bytes: u64,
}

impl AllocationTracker {
    /// Create a tracker for `capacity` records
    pub fn new(capacity: usize) -> TelemetryResult<Self> {
        if capacity == 0 {
            return Err(TelemetryError::InvalidParam("tracking capacity"));
        }
        let mut records = Vec::new();
        records.try_reserve_exact(capacity)?;
        Ok(Self {
            records,
            capacity,
            live: 0,
            live_bytes: 0,
        })
    }

    /// Bytes a tracker of `capacity` records occupies
    pub const fn footprint(capacity: usize) -> usize {
        capacity * core::mem::size_of::<AllocationRecord>()
    }

    /// Record an allocation
    pub fn track_alloc(&mut self, record: AllocationRecord) -> TelemetryResult<()> {
        if record.address == 0 {
            return Err(TelemetryError::InvalidParam("null address"));
        }
        let record = AllocationRecord {
            freed: false,
            leak_reported: false,
            ..record
        };

        if self.records.len() < self.capacity {
            self.records.push(record);
        } else {
            let slot = self
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.freed)
                .min_by_key(|(_, r)| r.allocated_ns)
                .map(|(i, _)| i)
                .ok_or(TelemetryError::CapacityExhausted(Resource::AllocationRecords))?;
            self.records[slot] = record;
        }

        self.live += 1;
        self.live_bytes = self.live_bytes.saturating_add(record.size as u64);
        Ok(())
    }

    /// Mark the most recent live record for `address` freed
    ///
    /// Returns the freed record, or `NotFound` for untracked addresses and
    /// double frees.
    pub fn track_free(&mut self, address: usize) -> TelemetryResult<AllocationRecord> {
        let record = self
            .records
            .iter_mut()
            .filter(|r| !r.freed && r.address == address)
            .max_by_key(|r| r.allocated_ns)
            .ok_or(TelemetryError::NotFound)?;
        record.freed = true;
        let freed = *record;

        self.live -= 1;
        self.live_bytes = self.live_bytes.saturating_sub(freed.size as u64);
        Ok(freed)
    }

    /// Find live records older than `threshold_ns`
    pub fn scan(&mut self, now_ns: u64, threshold_ns: u64) -> LeakScan {
        let mut scan = LeakScan::default();
        for record in self.records.iter_mut().filter(|r| !r.freed) {
            let age_ns = now_ns.saturating_sub(record.allocated_ns);
            if age_ns <= threshold_ns {
                continue;
            }
            scan.outstanding += 1;
            scan.outstanding_bytes = scan.outstanding_bytes.saturating_add(record.size as u64);
            if !record.leak_reported {
                record.leak_reported = true;
                scan.new_leaks.push(Leak {
                    address: record.address,
                    size: record.size,
                    age_ns,
                    file: record.file,
                    line: record.line,
                    owner: record.owner,
                });
            }
        }
        scan
    }

    /// Live records
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Bytes held by live records
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Record slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every record and free the table
    pub fn release(&mut self) {
        self.records = Vec::new();
        self.live = 0;
        self.live_bytes = 0;
    }
}

// ============================================================================
// TESTS
// ============================================================================
