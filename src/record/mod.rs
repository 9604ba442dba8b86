mod error;
mod heap_file;
mod page;

pub use error::{HeapError, HeapResult};
pub use heap_file::{HeapFile, HeapScan, Rid};
pub use page::{PageHeader, Slot, SlottedPage, MAX_RECORD_SIZE, NO_SLOT};

/// Slot number within a slotted page
pub type SlotNum = i32;
