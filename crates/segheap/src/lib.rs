//! A segregated-fit dynamic memory allocator over a growable byte region.
//!
//! The heap manages a contiguous region that can only grow at its end, in
//! the manner of `sbrk`. Allocations are handed out as payload offsets
//! ([`HeapPtr`]) into that region, aligned to 8 bytes.
//!
//! # Design
//!
//! - **Boundary tags**: every block starts with a header word and ends with
//!   a footer word, both holding the block size and an allocated flag. The
//!   footer lets a block find its predecessor in constant time.
//! - **Segregated free lists**: free blocks are linked into 20 lists by
//!   power-of-two size class; the links live inside the free payloads.
//! - **Immediate coalescing**: a released block is merged with free
//!   neighbors right away, so no two free blocks are ever adjacent.
//! - **Sentinels**: a prologue block and an epilogue header bracket the
//!   heap, so merging never needs bounds checks.
//!
//! # Modules
//!
//! - [`heap`]: the allocator core ([`Heap`])
//! - [`region`]: growable regions backing a heap ([`VecRegion`],
//!   [`SliceRegion`])
//! - [`codec`]: boundary tag encoding and block arithmetic
//! - [`free_list`]: segregated free lists
//! - [`block`]: typed views over blocks for inspection
//! - [`config`]: tunables ([`HeapConfig`], [`FitPolicy`])
//! - [`locked`]: a heap shared behind a spin lock ([`LockedHeap`])
//! - [`error`]: error types
//!
//! # Usage Examples
//!
//! ```rust
//! use segheap::{Heap, HeapConfig, FitPolicy, VecRegion};
//!
//! let config = HeapConfig::new().with_fit_policy(FitPolicy::BestFit);
//! let mut heap = Heap::with_config(VecRegion::with_limit(1 << 20), config).unwrap();
//!
//! let a = heap.allocate(24).unwrap();
//! let b = heap.allocate(500).unwrap();
//! assert_eq!(a.offset() % 8, 0);
//! assert_eq!(b.offset() % 8, 0);
//!
//! heap.deallocate(Some(a));
//! heap.deallocate(Some(b));
//!
//! let stats = heap.check().unwrap();
//! assert_eq!(stats.allocated_blocks, 0);
//! assert_eq!(stats.free_blocks, 1);
//! ```
//!
//! A heap can also live in a fixed buffer:
//!
//! ```rust
//! use segheap::{Heap, HeapConfig, SliceRegion};
//!
//! let mut buffer = [0u8; 1024];
//! let config = HeapConfig::new().with_chunk_size(512);
//! let mut heap = Heap::with_config(SliceRegion::new(&mut buffer), config).unwrap();
//!
//! let a = heap.allocate(400).unwrap();
//! // the buffer only has room for 1024 bytes in total
//! assert!(heap.allocate(600).is_none());
//! assert!(heap.payload(a).is_some());
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub mod block;
mod check;
mod coalesce;
pub mod codec;
pub mod config;
pub mod error;
pub mod free_list;
pub mod heap;
pub mod locked;
pub mod region;

pub use self::{
    block::{Block, Blocks, HeapPtr},
    check::HeapStats,
    config::{FitPolicy, HeapConfig},
    error::{CheckError, GrowError, InitError},
    heap::Heap,
    locked::LockedHeap,
    region::{MemoryRegion, SliceRegion, VecRegion},
};
