//! # Failing Block Device
//!
//! A BlockDevice wrapper that can simulate write failures, for exercising
//! rollback and write-through paths without real hardware faults.

use hal::{BlockDevice, BlockError, SectorNumber};

/// Policy for when writes should fail
#[derive(Debug, Clone)]
pub enum FailurePolicy {
    /// Never fail (passthrough)
    Never,
    /// Fail after N writes
    AfterWrites(usize),
    /// Fail on specific sectors
    OnSectors(Vec<SectorNumber>),
}

/// Wrapper around a BlockDevice that can simulate failures
pub struct FailingBlockDevice<D: BlockDevice> {
    inner: D,
    policy: FailurePolicy,
    write_count: usize,
}

impl<D: BlockDevice> FailingBlockDevice<D> {
    /// Create a new failing block device with the given policy
    pub fn new(inner: D, policy: FailurePolicy) -> Self {
        Self {
            inner,
            policy,
            write_count: 0,
        }
    }

    fn should_fail(&self, sector: SectorNumber) -> bool {
        match &self.policy {
            FailurePolicy::Never => false,
            FailurePolicy::AfterWrites(n) => self.write_count >= *n,
            FailurePolicy::OnSectors(sectors) => sectors.contains(&sector),
        }
    }

    /// Get the underlying device (for inspection)
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Get the number of writes that have occurred
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Replace the failure policy
    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
        self.write_count = 0;
    }
}

impl<D: BlockDevice> BlockDevice for FailingBlockDevice<D> {
    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    fn read_sector(&mut self, sector: SectorNumber, buffer: &mut [u8]) -> Result<(), BlockError> {
        self.inner.read_sector(sector, buffer)
    }

    fn write_sector(&mut self, sector: SectorNumber, buffer: &[u8]) -> Result<(), BlockError> {
        if self.should_fail(sector) {
            return Err(BlockError::IoError);
        }
        self.write_count += 1;
        self.inner.write_sector(sector, buffer)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        if matches!(self.policy, FailurePolicy::AfterWrites(n) if self.write_count >= n) {
            return Err(BlockError::IoError);
        }
        self.inner.flush()
    }
}
