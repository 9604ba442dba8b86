use std::path::Path;

use crate::file::{FileDesc, PageNum, PagedFileManager, PfError, NO_PAGE};

use super::error::{HeapError, HeapResult};
use super::page::{SlottedPage, MAX_RECORD_SIZE};
use super::SlotNum;

/// Physical identifier for a record: page plus slot. Stable for the
/// record's lifetime; deletes of other records never move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_num: PageNum,
    pub slot_num: SlotNum,
}

impl Rid {
    pub fn new(page_num: PageNum, slot_num: SlotNum) -> Self {
        Self { page_num, slot_num }
    }
}

/// A heap of variable-length records over a paged file.
///
/// Every page of the file is a slotted page. Methods take the
/// `PagedFileManager` that owns the underlying file, and leave no page
/// fixed when they return.
pub struct HeapFile {
    fd: FileDesc,
}

impl HeapFile {
    /// Create an empty heap file
    pub fn create<P: AsRef<Path>>(pf: &mut PagedFileManager, path: P) -> HeapResult<()> {
        Ok(pf.create_file(path)?)
    }

    /// Remove a heap file; fails while it is open
    pub fn destroy<P: AsRef<Path>>(pf: &mut PagedFileManager, path: P) -> HeapResult<()> {
        Ok(pf.destroy_file(path)?)
    }

    /// Open a heap file
    pub fn open<P: AsRef<Path>>(pf: &mut PagedFileManager, path: P) -> HeapResult<Self> {
        Ok(Self {
            fd: pf.open_file(path)?,
        })
    }

    /// Close the heap file; fails with a fixed-page error while a scan
    /// still holds a page
    pub fn close(self, pf: &mut PagedFileManager) -> HeapResult<()> {
        Ok(pf.close_file(self.fd)?)
    }

    pub fn fd(&self) -> FileDesc {
        self.fd
    }

    /// Store a record and return its identifier.
    ///
    /// First fit: pages are tried in file order and the record lands on
    /// the first page with room, reusing a tombstoned slot when the page
    /// has one; a fresh page is allocated when no page fits.
    pub fn insert_record(&self, pf: &mut PagedFileManager, record: &[u8]) -> HeapResult<Rid> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(HeapError::PageFull(record.len()));
        }

        let page_num = self.page_with_space(pf, record.len())?;
        let buf = pf.fixed_page(self.fd, page_num)?;
        let slot_num = SlottedPage::from_buffer(buf).insert(record);
        pf.unfix_page(self.fd, page_num, true)?;

        Ok(Rid { page_num, slot_num })
    }

    /// Copy out the record at `rid`
    pub fn get_record(&self, pf: &mut PagedFileManager, rid: Rid) -> HeapResult<Vec<u8>> {
        let buf = pf.get_this_page(self.fd, rid.page_num)?;
        let page = SlottedPage::from_buffer(buf);

        if !page.slot_in_range(rid.slot_num) {
            pf.unfix_page(self.fd, rid.page_num, false)?;
            return Err(HeapError::InvalidRid(rid.page_num, rid.slot_num));
        }
        if page.is_tombstone(rid.slot_num) {
            pf.unfix_page(self.fd, rid.page_num, false)?;
            return Err(HeapError::NoRecord(rid.page_num, rid.slot_num));
        }

        let record = page.record(rid.slot_num).to_vec();
        pf.unfix_page(self.fd, rid.page_num, false)?;
        Ok(record)
    }

    /// Tombstone the record at `rid`. The slot becomes reusable; the
    /// record body is not reclaimed.
    pub fn delete_record(&self, pf: &mut PagedFileManager, rid: Rid) -> HeapResult<()> {
        let buf = pf.get_this_page(self.fd, rid.page_num)?;
        let mut page = SlottedPage::from_buffer(buf);

        if !page.slot_in_range(rid.slot_num) {
            pf.unfix_page(self.fd, rid.page_num, false)?;
            return Err(HeapError::InvalidRid(rid.page_num, rid.slot_num));
        }
        if page.is_tombstone(rid.slot_num) {
            pf.unfix_page(self.fd, rid.page_num, false)?;
            return Err(HeapError::NoRecord(rid.page_num, rid.slot_num));
        }

        page.delete(rid.slot_num);
        pf.unfix_page(self.fd, rid.page_num, true)?;
        Ok(())
    }

    /// Begin a sequential scan. The scan shares the file's iteration
    /// cursor, so at most one scan per file may run at a time, and
    /// inserts or deletes invalidate it.
    pub fn start_scan(&self) -> HeapScan {
        HeapScan {
            fd: self.fd,
            page_num: NO_PAGE,
            slot: 0,
            holding: false,
        }
    }

    /// First page with room for `length` more bytes, fixed; allocates and
    /// formats a fresh page when no existing page fits
    fn page_with_space(&self, pf: &mut PagedFileManager, length: usize) -> HeapResult<PageNum> {
        let mut first = true;
        loop {
            let result = if first {
                first = false;
                pf.get_first_page(self.fd)
            } else {
                pf.get_next_page(self.fd)
            };
            match result {
                Ok((page_num, buf)) => {
                    if SlottedPage::from_buffer(buf).fits(length) {
                        return Ok(page_num);
                    }
                    pf.unfix_page(self.fd, page_num, false)?;
                }
                Err(PfError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        let (page_num, buf) = pf.alloc_page(self.fd)?;
        SlottedPage::init(buf);
        Ok(page_num)
    }
}

/// Sequential scan over the live records of a heap file.
///
/// Holds at most one fixed page between calls; `end` must be called to
/// release it unless the scan has already returned `None`.
pub struct HeapScan {
    fd: FileDesc,
    page_num: PageNum,
    slot: SlotNum,
    holding: bool,
}

impl HeapScan {
    /// Next live record, or `None` at the end of the file. The slot
    /// cursor advances before returning, so each call resumes past the
    /// record it produced.
    pub fn next_record(
        &mut self,
        pf: &mut PagedFileManager,
    ) -> HeapResult<Option<(Rid, Vec<u8>)>> {
        loop {
            if !self.holding {
                let result = if self.page_num == NO_PAGE {
                    pf.get_first_page(self.fd)
                } else {
                    pf.get_next_page(self.fd)
                };
                match result {
                    Ok((page_num, _)) => {
                        self.page_num = page_num;
                        self.slot = 0;
                        self.holding = true;
                    }
                    Err(PfError::Eof) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
            }

            let buf = pf.fixed_page(self.fd, self.page_num)?;
            let page = SlottedPage::from_buffer(buf);

            if self.slot >= page.num_slots() {
                pf.unfix_page(self.fd, self.page_num, false)?;
                self.holding = false;
                continue;
            }

            let slot_num = self.slot;
            self.slot += 1;
            if !page.is_tombstone(slot_num) {
                let record = page.record(slot_num).to_vec();
                return Ok(Some((Rid::new(self.page_num, slot_num), record)));
            }
        }
    }

    /// Release the held page, if any. Safe to call at any point, any
    /// number of times.
    pub fn end(&mut self, pf: &mut PagedFileManager) -> HeapResult<()> {
        if self.holding {
            pf.unfix_page(self.fd, self.page_num, false)?;
            self.holding = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{PfConfig, Strategy};
    use tempfile::TempDir;

    fn setup() -> (TempDir, PagedFileManager, HeapFile) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("heap.rhf");
        let mut pf = PagedFileManager::new();
        HeapFile::create(&mut pf, &path).unwrap();
        let heap = HeapFile::open(&mut pf, &path).unwrap();
        (temp_dir, pf, heap)
    }

    /// A recognizable record: 4-byte id followed by filler of the id byte
    fn make_record(id: u32, len: usize) -> Vec<u8> {
        assert!(len >= 4);
        let mut record = vec![(id % 251) as u8; len];
        record[0..4].copy_from_slice(&id.to_le_bytes());
        record
    }

    fn record_id(record: &[u8]) -> u32 {
        u32::from_le_bytes([record[0], record[1], record[2], record[3]])
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let (_temp_dir, mut pf, heap) = setup();

        let record = make_record(7, 33);
        let rid = heap.insert_record(&mut pf, &record).unwrap();
        assert_eq!(rid, Rid::new(0, 0));

        let fetched = heap.get_record(&mut pf, rid).unwrap();
        assert_eq!(fetched, record);
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_max_size_record_roundtrip() {
        let (_temp_dir, mut pf, heap) = setup();

        let record = make_record(1, MAX_RECORD_SIZE);
        let rid = heap.insert_record(&mut pf, &record).unwrap();
        assert_eq!(heap.get_record(&mut pf, rid).unwrap(), record);

        let oversized = make_record(2, MAX_RECORD_SIZE + 1);
        assert!(matches!(
            heap.insert_record(&mut pf, &oversized),
            Err(HeapError::PageFull(_))
        ));
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_invalid_rid() {
        let (_temp_dir, mut pf, heap) = setup();
        heap.insert_record(&mut pf, &make_record(1, 20)).unwrap();

        assert!(matches!(
            heap.get_record(&mut pf, Rid::new(0, 5)),
            Err(HeapError::InvalidRid(0, 5))
        ));
        // A page number past the file surfaces as a paged-file error
        assert!(matches!(
            heap.get_record(&mut pf, Rid::new(9, 0)),
            Err(HeapError::Pf(PfError::InvalidPage(9)))
        ));
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_double_delete_reports_no_record() {
        let (_temp_dir, mut pf, heap) = setup();

        let rid = heap.insert_record(&mut pf, &make_record(3, 24)).unwrap();
        heap.delete_record(&mut pf, rid).unwrap();

        assert!(matches!(
            heap.delete_record(&mut pf, rid),
            Err(HeapError::NoRecord(_, _))
        ));
        assert!(matches!(
            heap.get_record(&mut pf, rid),
            Err(HeapError::NoRecord(_, _))
        ));
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_deleted_slot_is_reused() {
        let (_temp_dir, mut pf, heap) = setup();

        let a = heap.insert_record(&mut pf, &make_record(1, 30)).unwrap();
        let b = heap.insert_record(&mut pf, &make_record(2, 30)).unwrap();
        heap.delete_record(&mut pf, a).unwrap();

        // The tombstoned slot is reused, so the new record gets a's rid
        let c = heap.insert_record(&mut pf, &make_record(3, 30)).unwrap();
        assert_eq!(c, a);

        assert_eq!(record_id(&heap.get_record(&mut pf, b).unwrap()), 2);
        assert_eq!(record_id(&heap.get_record(&mut pf, c).unwrap()), 3);
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_records_spill_to_new_pages() {
        let (_temp_dir, mut pf, heap) = setup();

        let mut rids = Vec::new();
        for i in 0..3 {
            let record = make_record(i, MAX_RECORD_SIZE);
            rids.push(heap.insert_record(&mut pf, &record).unwrap());
        }

        // One maximal record per page
        assert_eq!(rids[0].page_num, 0);
        assert_eq!(rids[1].page_num, 1);
        assert_eq!(rids[2].page_num, 2);

        for (i, rid) in rids.iter().enumerate() {
            let record = heap.get_record(&mut pf, *rid).unwrap();
            assert_eq!(record_id(&record), i as u32);
        }
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_first_fit_returns_to_earlier_page() {
        let (_temp_dir, mut pf, heap) = setup();

        // Fill page 0 down to 68 spare bytes
        let a = heap.insert_record(&mut pf, &make_record(1, 3000)).unwrap();
        let b = heap.insert_record(&mut pf, &make_record(2, 1000)).unwrap();
        assert_eq!(b.page_num, 0);

        let c = heap.insert_record(&mut pf, &make_record(3, 500)).unwrap();
        assert_eq!(c.page_num, 1);

        // Deleting frees a's slot but not its body bytes, so page 0 fits a
        // small record through the slot chain and is chosen before page 1
        heap.delete_record(&mut pf, a).unwrap();
        let d = heap.insert_record(&mut pf, &make_record(4, 60)).unwrap();
        assert_eq!(d, Rid::new(0, 0));
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_scan_skips_tombstones() {
        let (_temp_dir, mut pf, heap) = setup();

        let mut rids = Vec::new();
        for i in 0..10 {
            rids.push(heap.insert_record(&mut pf, &make_record(i, 40)).unwrap());
        }
        heap.delete_record(&mut pf, rids[2]).unwrap();
        heap.delete_record(&mut pf, rids[7]).unwrap();

        let mut scan = heap.start_scan();
        let mut seen = Vec::new();
        while let Some((rid, record)) = scan.next_record(&mut pf).unwrap() {
            assert_eq!(rids[record_id(&record) as usize], rid);
            seen.push(record_id(&record));
        }
        scan.end(&mut pf).unwrap();

        assert_eq!(seen, vec![0, 1, 3, 4, 5, 6, 8, 9]);
        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_bulk_insert_delete_scan() {
        let (_temp_dir, mut pf, heap) = setup();

        // 1000 variable-length records, lengths in [18, 58]
        let mut rids = Vec::new();
        for i in 0..1000u32 {
            let len = 18 + (i as usize * 7) % 41;
            rids.push(heap.insert_record(&mut pf, &make_record(i, len)).unwrap());
        }

        let mut scan = heap.start_scan();
        let mut count = 0;
        while scan.next_record(&mut pf).unwrap().is_some() {
            count += 1;
        }
        scan.end(&mut pf).unwrap();
        assert_eq!(count, 1000);

        for (i, rid) in rids.iter().enumerate() {
            if i % 2 == 0 {
                heap.delete_record(&mut pf, *rid).unwrap();
            }
        }

        let mut scan = heap.start_scan();
        let mut survivors = 0;
        while let Some((_, record)) = scan.next_record(&mut pf).unwrap() {
            assert_eq!(record_id(&record) % 2, 1);
            survivors += 1;
        }
        scan.end(&mut pf).unwrap();
        assert_eq!(survivors, 500);

        heap.close(&mut pf).unwrap();
    }

    #[test]
    fn test_records_survive_close_and_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("heap.rhf");

        let rid = {
            let mut pf = PagedFileManager::new();
            HeapFile::create(&mut pf, &path).unwrap();
            let heap = HeapFile::open(&mut pf, &path).unwrap();
            let rid = heap
                .insert_record(&mut pf, &make_record(42, 50))
                .unwrap();
            heap.close(&mut pf).unwrap();
            rid
        };

        let mut pf = PagedFileManager::new();
        let heap = HeapFile::open(&mut pf, &path).unwrap();
        let record = heap.get_record(&mut pf, rid).unwrap();
        assert_eq!(record_id(&record), 42);
        assert_eq!(record.len(), 50);
        heap.close(&mut pf).unwrap();
        HeapFile::destroy(&mut pf, &path).unwrap();
    }

    #[test]
    fn test_unended_scan_blocks_close() {
        let (_temp_dir, mut pf, heap) = setup();
        heap.insert_record(&mut pf, &make_record(1, 20)).unwrap();
        heap.insert_record(&mut pf, &make_record(2, 20)).unwrap();

        let mut scan = heap.start_scan();
        scan.next_record(&mut pf).unwrap().unwrap();

        // The scan still holds its page
        let fd = heap.fd();
        assert!(matches!(
            pf.close_file(fd),
            Err(PfError::PageFixed(_, _))
        ));

        scan.end(&mut pf).unwrap();
        scan.end(&mut pf).unwrap();
        pf.close_file(fd).unwrap();
    }

    #[test]
    fn test_scan_under_tiny_buffer_pool() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("heap.rhf");
        let mut pf = PagedFileManager::with_config(PfConfig {
            buffer_frames: 3,
            strategy: Strategy::Lru,
        });
        HeapFile::create(&mut pf, &path).unwrap();
        let heap = HeapFile::open(&mut pf, &path).unwrap();

        for i in 0..200u32 {
            heap.insert_record(&mut pf, &make_record(i, 40)).unwrap();
        }

        let mut scan = heap.start_scan();
        let mut count = 0;
        while scan.next_record(&mut pf).unwrap().is_some() {
            count += 1;
        }
        scan.end(&mut pf).unwrap();
        assert_eq!(count, 200);
        heap.close(&mut pf).unwrap();
    }
}
