//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the storage-device abstraction SectorFS is built on.
//!
//! ## Philosophy
//!
//! **The device is fully abstracted and swappable.**
//!
//! No device-specific assumptions leak into the allocator, inode or directory
//! layers. Everything above this crate talks to a [`BlockDevice`] in terms of
//! fixed-size sectors and nothing else.
//!
//! ## Design Principles
//!
//! 1. **Trait-based**: all device access goes through [`BlockDevice`]
//! 2. **Fixed-size sectors**: every transfer is exactly [`SECTOR_SIZE`] bytes
//! 3. **Testable**: [`RamDisk`] provides an in-memory device for tests

pub mod block_device;

pub use block_device::{BlockDevice, BlockError, RamDisk, SectorNumber, SECTOR_SIZE};
