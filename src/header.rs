use core::mem;

/// Metadata prefix of every block: the list successor and the number of
/// payload bytes following the header.
#[repr(C, align(8))]
pub struct Header {
  pub next: *mut Header,
  pub size: usize,
}

/// Size of the header in bytes. A multiple of 8, so payloads start aligned.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Alignment of headers and of every pointer handed to callers.
pub const BLOCK_ALIGN: usize = mem::align_of::<Header>();

impl Header {
  /// First payload byte: the pointer handed to callers.
  ///
  /// # Safety
  ///
  /// `block` must point at the header of a live block.
  pub unsafe fn payload(block: *mut Header) -> *mut u8 {
    unsafe { (block as *mut u8).add(HEADER_SIZE) }
  }

  /// Recovers the header from a payload pointer obtained via [`Header::payload`].
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by [`Header::payload`].
  pub unsafe fn from_payload(payload: *mut u8) -> *mut Header {
    unsafe { payload.sub(HEADER_SIZE) as *mut Header }
  }

  /// Address one past the last payload byte of the block.
  ///
  /// # Safety
  ///
  /// `block` must point at the header of a live block.
  pub unsafe fn end(block: *mut Header) -> usize {
    unsafe { block as usize + HEADER_SIZE + (*block).size }
  }
}
