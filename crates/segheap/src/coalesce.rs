//! Merging of adjacent free blocks.

use log::trace;

use crate::{
    codec::{self, OVERHEAD},
    free_list::FreeLists,
};

/// Merges the free block at `bp` with its free structural neighbors and
/// links the result into `lists`.
///
/// The block's tags must already mark it free and it must not be linked.
/// Returns the payload offset of the merged block, which is the
/// predecessor's offset whenever the predecessor was absorbed.
///
/// The predecessor is always readable thanks to the prologue footer and
/// the successor thanks to the epilogue header. Afterwards the merged
/// block has no free neighbor on either side.
pub(crate) fn coalesce(lists: &mut FreeLists, bytes: &mut [u8], bp: u32) -> u32 {
    let size = codec::block_size(bytes, bp);
    let prev_tag = codec::read_tag(bytes, bp - OVERHEAD);
    let next = bp + size;
    let next_tag = codec::read_tag(bytes, codec::header(next));

    let mut start = bp;
    let mut merged = size;

    if !next_tag.is_allocated() {
        lists.remove(bytes, next);
        codec::clear_seam(bytes, next);
        merged += next_tag.size();
    }
    if !prev_tag.is_allocated() {
        let prev = bp - prev_tag.size();
        lists.remove(bytes, prev);
        codec::clear_seam(bytes, bp);
        start = prev;
        merged += prev_tag.size();
    }

    codec::write_boundary(bytes, start, merged, false);
    lists.insert(bytes, start);
    if merged != size {
        trace!("coalesced {bp:#x} into {start:#x} ({merged} bytes)");
    }
    start
}
