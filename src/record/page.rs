use crate::file::PAGE_SIZE;

use super::SlotNum;

/// No next entry in the free-slot chain
pub const NO_SLOT: SlotNum = -1;

/// Record length marking a deleted slot
const TOMBSTONE: i32 = -1;

/// Largest record that can ever fit on a page: the page minus the header
/// and one slot
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - PageHeader::SIZE - Slot::SIZE;

/// Slotted-page header stored at the start of every heap page
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    /// Slots in the directory, live and tombstoned
    pub num_slots: i32,
    /// Offset of the start of free space; records grow down from the
    /// page end toward it
    pub free_space_ptr: i32,
    /// Head of the free-slot chain, or NO_SLOT
    pub next_free_slot: SlotNum,
}

impl PageHeader {
    pub const SIZE: usize = 12;

    fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.num_slots.to_le_bytes());
        result[4..8].copy_from_slice(&self.free_space_ptr.to_le_bytes());
        result[8..12].copy_from_slice(&self.next_free_slot.to_le_bytes());
        result
    }

    fn deserialize(data: &[u8]) -> Self {
        Self {
            num_slots: i32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            free_space_ptr: i32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            next_free_slot: i32::from_le_bytes([data[8], data[9], data[10], data[11]]),
        }
    }
}

/// One slot directory entry. A tombstoned slot has `length == -1` and its
/// `offset` field holds the next link of the free-slot chain.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub offset: i32,
    pub length: i32,
}

impl Slot {
    pub const SIZE: usize = 8;

    fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.offset.to_le_bytes());
        result[4..8].copy_from_slice(&self.length.to_le_bytes());
        result
    }

    fn deserialize(data: &[u8]) -> Self {
        Self {
            offset: i32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            length: i32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        }
    }
}

/// Zero-copy slotted page over a fixed page buffer.
///
/// The slot directory grows up from the header; record bodies are packed
/// down from the page end. Deleted slots are tombstoned and chained for
/// reuse; deleted record bodies are not reclaimed.
pub struct SlottedPage<'a> {
    buffer: &'a mut [u8],
    header: PageHeader,
}

impl<'a> SlottedPage<'a> {
    /// Format a buffer as an empty slotted page
    pub fn init(buffer: &'a mut [u8]) -> Self {
        debug_assert_eq!(buffer.len(), PAGE_SIZE);
        let header = PageHeader {
            num_slots: 0,
            free_space_ptr: PAGE_SIZE as i32,
            next_free_slot: NO_SLOT,
        };
        buffer[..PageHeader::SIZE].copy_from_slice(&header.serialize());
        Self { buffer, header }
    }

    /// Wrap an existing slotted page buffer
    pub fn from_buffer(buffer: &'a mut [u8]) -> Self {
        debug_assert_eq!(buffer.len(), PAGE_SIZE);
        let header = PageHeader::deserialize(&buffer[..PageHeader::SIZE]);
        debug_assert!(
            header.free_space_ptr as usize
                >= PageHeader::SIZE + header.num_slots as usize * Slot::SIZE
        );
        Self { buffer, header }
    }

    pub fn num_slots(&self) -> SlotNum {
        self.header.num_slots
    }

    pub fn slot(&self, slot_num: SlotNum) -> Slot {
        debug_assert!(self.slot_in_range(slot_num));
        let start = PageHeader::SIZE + slot_num as usize * Slot::SIZE;
        Slot::deserialize(&self.buffer[start..start + Slot::SIZE])
    }

    pub fn slot_in_range(&self, slot_num: SlotNum) -> bool {
        slot_num >= 0 && slot_num < self.header.num_slots
    }

    pub fn is_tombstone(&self, slot_num: SlotNum) -> bool {
        self.slot(slot_num).length == TOMBSTONE
    }

    /// Bytes free between the slot directory and the record heap
    pub fn free_space(&self) -> usize {
        self.header.free_space_ptr as usize
            - (PageHeader::SIZE + self.header.num_slots as usize * Slot::SIZE)
    }

    /// Whether a record of `length` bytes fits. Reusing a tombstoned slot
    /// costs no directory space; appending a slot costs `Slot::SIZE`.
    pub fn fits(&self, length: usize) -> bool {
        let slot_cost = if self.header.next_free_slot == NO_SLOT {
            Slot::SIZE
        } else {
            0
        };
        self.free_space() >= length + slot_cost
    }

    /// Store a record, reusing the free-slot chain head when there is one.
    /// The caller must have checked `fits`.
    pub fn insert(&mut self, record: &[u8]) -> SlotNum {
        debug_assert!(self.fits(record.len()));

        let slot_num = if self.header.next_free_slot != NO_SLOT {
            let slot_num = self.header.next_free_slot;
            // The tombstone's offset field is the next chain link
            self.header.next_free_slot = self.slot(slot_num).offset;
            slot_num
        } else {
            let slot_num = self.header.num_slots;
            self.header.num_slots += 1;
            slot_num
        };

        self.header.free_space_ptr -= record.len() as i32;
        let offset = self.header.free_space_ptr;
        self.write_slot(
            slot_num,
            Slot {
                offset,
                length: record.len() as i32,
            },
        );
        self.buffer[offset as usize..offset as usize + record.len()].copy_from_slice(record);
        self.write_header();
        slot_num
    }

    /// Record bytes of a live slot
    pub fn record(&self, slot_num: SlotNum) -> &[u8] {
        let slot = self.slot(slot_num);
        debug_assert!(slot.length != TOMBSTONE);
        let start = slot.offset as usize;
        &self.buffer[start..start + slot.length as usize]
    }

    /// Tombstone a live slot and push it onto the free-slot chain. The
    /// record body stays where it is.
    pub fn delete(&mut self, slot_num: SlotNum) {
        debug_assert!(!self.is_tombstone(slot_num));
        self.write_slot(
            slot_num,
            Slot {
                offset: self.header.next_free_slot,
                length: TOMBSTONE,
            },
        );
        self.header.next_free_slot = slot_num;
        self.write_header();
    }

    fn write_slot(&mut self, slot_num: SlotNum, slot: Slot) {
        let start = PageHeader::SIZE + slot_num as usize * Slot::SIZE;
        self.buffer[start..start + Slot::SIZE].copy_from_slice(&slot.serialize());
    }

    fn write_header(&mut self) {
        self.buffer[..PageHeader::SIZE].copy_from_slice(&self.header.serialize());
    }
}
