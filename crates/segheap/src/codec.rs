//! Boundary tag encoding and block address arithmetic.
//!
//! Blocks are addressed by the offset of their payload inside the heap
//! region. Every block carries a one-word header just before the payload
//! and a one-word footer in its last word; both pack the block size
//! (including the tags) with the allocated flag in bit 0.
//!
//! ```text
//!          header                                   footer
//!       ┌──────────┬─────────────────────────────┬──────────┐
//!       │ size | a │ payload                     │ size | a │
//!       └──────────┴─────────────────────────────┴──────────┘
//!                  ^ bp                          ^ bp + size - 8
//!
//! free block payload:
//!                  ┌──────────┬──────────┬───────
//!                  │ next     │ prev     │ ...
//!                  └──────────┴──────────┴───────
//! ```
//!
//! Everything in this module is stateless and operates on a byte slice of
//! the whole region. Sizes are expected to be already rounded to
//! [`ALIGNMENT`]; passing unrounded sizes produces an undefined layout
//! (but never memory unsafety, since every access is bounds-checked).

/// Size of a boundary tag or free-list link in bytes.
pub const WORD_SIZE: u32 = 4;

/// Payload alignment and block size granularity.
pub const ALIGNMENT: u32 = 8;

/// Per-block overhead of the header and footer.
pub const OVERHEAD: u32 = 2 * WORD_SIZE;

/// Smallest block able to hold its tags and both free-list links.
pub const MIN_BLOCK_SIZE: u32 = OVERHEAD + 2 * WORD_SIZE;

const ALLOCATED_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !(ALIGNMENT - 1);

/// A packed `(size, allocated)` boundary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
    /// Tag of the prologue sentinel: an allocated block made of header and
    /// footer only.
    pub const PROLOGUE: Self = Self(OVERHEAD | ALLOCATED_BIT);

    /// Tag of the epilogue sentinel: a zero-size allocated header.
    pub const EPILOGUE: Self = Self(ALLOCATED_BIT);

    /// Packs a block size and allocated flag.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `size` is not a multiple of [`ALIGNMENT`].
    #[must_use]
    pub fn new(size: u32, allocated: bool) -> Self {
        debug_assert_eq!(size & !SIZE_MASK, 0, "block size must be aligned");
        Self(size | u32::from(allocated))
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn size(self) -> u32 {
        self.0 & SIZE_MASK
    }

    #[must_use]
    pub const fn is_allocated(self) -> bool {
        self.0 & ALLOCATED_BIT != 0
    }
}

/// Reads the word at byte offset `at`.
///
/// # Panics
///
/// Panics if the word is not fully inside `bytes`.
#[must_use]
pub fn read_word(bytes: &[u8], at: u32) -> u32 {
    let at = at as usize;
    let mut word = [0; WORD_SIZE as usize];
    word.copy_from_slice(&bytes[at..at + WORD_SIZE as usize]);
    u32::from_ne_bytes(word)
}

/// Like [`read_word`], but returns `None` instead of panicking when the
/// word is outside `bytes`.
#[must_use]
pub fn try_read_word(bytes: &[u8], at: u32) -> Option<u32> {
    let at = at as usize;
    let word = bytes.get(at..at.checked_add(WORD_SIZE as usize)?)?;
    let mut buf = [0; WORD_SIZE as usize];
    buf.copy_from_slice(word);
    Some(u32::from_ne_bytes(buf))
}

/// Writes `value` as the word at byte offset `at`.
///
/// # Panics
///
/// Panics if the word is not fully inside `bytes`.
pub fn write_word(bytes: &mut [u8], at: u32, value: u32) {
    let at = at as usize;
    bytes[at..at + WORD_SIZE as usize].copy_from_slice(&value.to_ne_bytes());
}

#[must_use]
pub fn read_tag(bytes: &[u8], at: u32) -> Tag {
    Tag(read_word(bytes, at))
}

pub fn write_tag(bytes: &mut [u8], at: u32, tag: Tag) {
    write_word(bytes, at, tag.0);
}

/// Offset of the header of the block whose payload starts at `bp`.
#[must_use]
pub const fn header(bp: u32) -> u32 {
    bp - WORD_SIZE
}

/// Size of the block at `bp`, read from its header.
#[must_use]
pub fn block_size(bytes: &[u8], bp: u32) -> u32 {
    read_tag(bytes, header(bp)).size()
}

/// Offset of the footer of the block at `bp`.
#[must_use]
pub fn footer(bytes: &[u8], bp: u32) -> u32 {
    bp + block_size(bytes, bp) - OVERHEAD
}

/// Payload offset of the block structurally after `bp`.
#[must_use]
pub fn next_block(bytes: &[u8], bp: u32) -> u32 {
    bp + block_size(bytes, bp)
}

/// Payload offset of the block structurally before `bp`, found through the
/// footer that ends right before `bp`'s header.
#[must_use]
pub fn prev_block(bytes: &[u8], bp: u32) -> u32 {
    bp - read_tag(bytes, bp - OVERHEAD).size()
}

/// Writes matching header and footer tags for a block of `size` bytes.
pub fn write_boundary(bytes: &mut [u8], bp: u32, size: u32, allocated: bool) {
    let tag = Tag::new(size, allocated);
    write_tag(bytes, header(bp), tag);
    write_tag(bytes, bp + size - OVERHEAD, tag);
}

/// Zeroes the footer/header pair that separates the block ending right
/// before `bp` from the block at `bp`.
///
/// Used when two blocks are merged, so the absorbed block no longer looks
/// like an addressable unit.
pub fn clear_seam(bytes: &mut [u8], bp: u32) {
    let start = (bp - OVERHEAD) as usize;
    bytes[start..bp as usize].fill(0);
}

fn link(word: u32) -> Option<u32> {
    (word != 0).then_some(word)
}

/// Next-free link stored in the first payload word of a free block.
#[must_use]
pub fn read_next_link(bytes: &[u8], bp: u32) -> Option<u32> {
    link(read_word(bytes, bp))
}

/// Previous-free link stored in the second payload word of a free block.
#[must_use]
pub fn read_prev_link(bytes: &[u8], bp: u32) -> Option<u32> {
    link(read_word(bytes, bp + WORD_SIZE))
}

pub fn write_next_link(bytes: &mut [u8], bp: u32, next: Option<u32>) {
    write_word(bytes, bp, next.unwrap_or(0));
}

pub fn write_prev_link(bytes: &mut [u8], bp: u32, prev: Option<u32>) {
    write_word(bytes, bp + WORD_SIZE, prev.unwrap_or(0));
}

/// Rounds a requested payload size up to a full block size.
///
/// The result includes the header and footer, is a multiple of
/// [`ALIGNMENT`] and is at least [`MIN_BLOCK_SIZE`]. Returns `None` if the
/// block would not fit in the 32-bit offset space.
#[must_use]
pub fn adjust_size(request: usize) -> Option<u32> {
    let request = u32::try_from(request).ok()?;
    let size = request.checked_add(OVERHEAD + ALIGNMENT - 1)? & SIZE_MASK;
    Some(size.max(MIN_BLOCK_SIZE))
}
