use super::error::{PfError, PfResult};
use super::{PageNum, FILE_HEADER_SIZE, NO_PAGE};

/// On-disk file header, stored in the first bytes of the file before page 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Total number of pages in the file, live and free
    pub num_pages: PageNum,
    /// Head of the free-page list, or NO_PAGE if empty
    pub first_free_page: PageNum,
}

impl FileHeader {
    pub const SIZE: usize = FILE_HEADER_SIZE;

    pub fn new() -> Self {
        Self {
            num_pages: 0,
            first_free_page: NO_PAGE,
        }
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.num_pages.to_le_bytes());
        result[4..8].copy_from_slice(&self.first_free_page.to_le_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> PfResult<Self> {
        if data.len() < Self::SIZE {
            return Err(PfError::HdrRead);
        }

        let num_pages = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let first_free_page = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);

        Ok(Self {
            num_pages,
            first_free_page,
        })
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
