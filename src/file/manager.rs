use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::buffer::{BufferPool, PageKey, Strategy};
use super::disk::DiskFile;
use super::error::{PfError, PfResult};
use super::header::FileHeader;
use super::{FileDesc, PageNum, DEFAULT_BUFFER_FRAMES, MAX_OPEN_FILES, NO_PAGE};

/// Pool configuration, fixed at construction except for the strategy
#[derive(Debug, Clone, Copy)]
pub struct PfConfig {
    pub buffer_frames: usize,
    pub strategy: Strategy,
}

impl Default for PfConfig {
    fn default() -> Self {
        Self {
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            strategy: Strategy::Lru,
        }
    }
}

/// I/O counters. Logical reads count page fixes; the physical counters
/// count page-body transfers to and from disk. Header I/O is not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoStats {
    pub logical_reads: u64,
    pub physical_reads: u64,
    pub physical_writes: u64,
}

impl IoStats {
    /// Fraction of fixes served from the pool
    pub fn hit_rate(&self) -> f64 {
        if self.logical_reads == 0 {
            return 0.0;
        }
        (self.logical_reads - self.physical_reads) as f64 / self.logical_reads as f64
    }
}

/// An open paged file: its host file, the in-memory header, and the
/// per-file iteration cursor
struct OpenFile {
    disk: DiskFile,
    canonical: PathBuf,
    header: FileHeader,
    header_dirty: bool,
    cursor: PageNum,
}

/// How to fill a freshly claimed frame
enum FillMode {
    /// Read the page body from disk
    Read,
    /// Zero the buffer; the page has no bytes on disk yet
    Zero,
}

/// The paged-file layer: a bounded buffer pool over a table of open files.
///
/// Pages are fixed in the pool by the `get_*`/`alloc_page` operations and
/// must be released with `unfix_page` before the owning file is closed.
/// Disposed pages are threaded into a per-file LIFO free list through their
/// first four bytes and reused by `alloc_page` before the file is extended.
pub struct PagedFileManager {
    pool: BufferPool,
    files: Vec<Option<OpenFile>>,
    open_paths: HashMap<PathBuf, FileDesc>,
    stats: IoStats,
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self::with_config(PfConfig::default())
    }

    pub fn with_config(config: PfConfig) -> Self {
        Self {
            pool: BufferPool::new(config.buffer_frames, config.strategy),
            files: (0..MAX_OPEN_FILES).map(|_| None).collect(),
            open_paths: HashMap::new(),
            stats: IoStats::default(),
        }
    }

    /// Swap the replacement strategy; takes effect on the next eviction
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.pool.set_strategy(strategy);
    }

    /// Create a paged file with an empty header
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> PfResult<()> {
        DiskFile::create(path)
    }

    /// Remove a paged file; fails while the file is open
    pub fn destroy_file<P: AsRef<Path>>(&mut self, path: P) -> PfResult<()> {
        let path = path.as_ref();
        if let Ok(canonical) = path.canonicalize() {
            if self.open_paths.contains_key(&canonical) {
                return Err(PfError::FileOpen(path.display().to_string()));
            }
        }
        DiskFile::destroy(path)
    }

    /// Open a paged file and read its header; each file may be open once
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> PfResult<FileDesc> {
        let path_ref = path.as_ref();
        let canonical = path_ref
            .canonicalize()
            .map_err(|_| PfError::FileNotFound(path_ref.display().to_string()))?;

        if self.open_paths.contains_key(&canonical) {
            return Err(PfError::FileOpen(path_ref.display().to_string()));
        }

        let slot = self
            .files
            .iter()
            .position(|e| e.is_none())
            .ok_or(PfError::FtabFull)?;

        let mut disk = DiskFile::open(&canonical)?;
        let header = disk.read_header()?;

        let fd = FileDesc(slot);
        self.files[slot] = Some(OpenFile {
            disk,
            canonical: canonical.clone(),
            header,
            header_dirty: false,
            cursor: NO_PAGE,
        });
        self.open_paths.insert(canonical, fd);

        Ok(fd)
    }

    /// Close a file: write back its dirty frames and header, release its
    /// frames. Fails with `PageFixed` while any of its pages is fixed.
    pub fn close_file(&mut self, fd: FileDesc) -> PfResult<()> {
        Self::entry(&self.files, fd)?;

        let owned = self.pool.frames_of(fd);
        for (idx, key) in &owned {
            if self.pool.pin_count(*idx) > 0 {
                return Err(PfError::PageFixed(fd.0, key.page_num));
            }
        }

        for (idx, key) in owned {
            if self.pool.frame_dirty(idx) {
                let entry = Self::entry_mut(&mut self.files, fd)?;
                entry.disk.write_page(key.page_num, self.pool.frame_data(idx))?;
                self.stats.physical_writes += 1;
            }
            self.pool.unmap(key)?;
            self.pool.retire_frame(idx);
        }

        {
            let entry = Self::entry_mut(&mut self.files, fd)?;
            if entry.header_dirty {
                entry.disk.write_header(&entry.header)?;
                entry.header_dirty = false;
            }
        }

        if let Some(entry) = self.files[fd.0].take() {
            self.open_paths.remove(&entry.canonical);
        }
        Ok(())
    }

    /// Total page count of the file, live and free
    pub fn num_pages(&self, fd: FileDesc) -> PfResult<PageNum> {
        Ok(Self::entry(&self.files, fd)?.header.num_pages)
    }

    /// Fix an existing page and return its buffer
    pub fn get_this_page(&mut self, fd: FileDesc, page_num: PageNum) -> PfResult<&mut [u8]> {
        let num_pages = Self::entry(&self.files, fd)?.header.num_pages;
        if page_num < 0 || page_num >= num_pages {
            return Err(PfError::InvalidPage(page_num));
        }
        let idx = self.fix_page(fd, page_num, FillMode::Read)?;
        Ok(self.pool.frame_data_mut(idx))
    }

    /// Rewind the file cursor and fix the first live page
    pub fn get_first_page(&mut self, fd: FileDesc) -> PfResult<(PageNum, &mut [u8])> {
        Self::entry_mut(&mut self.files, fd)?.cursor = NO_PAGE;
        self.get_next_page(fd)
    }

    /// Fix the next live page past the cursor, skipping pages on the free
    /// list; `Eof` past the last page.
    ///
    /// The cursor is per file: it is shared by every iteration over the
    /// file and is invalidated by any mutation other than `unfix_page`.
    /// Pages allocated mid-iteration appear in the iteration when their
    /// page number is past the cursor, because liveness is evaluated at
    /// each call.
    pub fn get_next_page(&mut self, fd: FileDesc) -> PfResult<(PageNum, &mut [u8])> {
        let (cursor, num_pages) = {
            let entry = Self::entry(&self.files, fd)?;
            (entry.cursor, entry.header.num_pages)
        };

        let free = self.free_page_set(fd)?;
        let mut page_num = cursor + 1;
        while page_num < num_pages {
            if !free.contains(&page_num) {
                let idx = self.fix_page(fd, page_num, FillMode::Read)?;
                Self::entry_mut(&mut self.files, fd)?.cursor = page_num;
                return Ok((page_num, self.pool.frame_data_mut(idx)));
            }
            page_num += 1;
        }
        Err(PfError::Eof)
    }

    /// Allocate a page: pop the free list, or extend the file with a
    /// zero-filled page. Returns the page fixed and dirty.
    pub fn alloc_page(&mut self, fd: FileDesc) -> PfResult<(PageNum, &mut [u8])> {
        let (first_free, num_pages) = {
            let entry = Self::entry(&self.files, fd)?;
            (entry.header.first_free_page, entry.header.num_pages)
        };

        let (page_num, idx) = if first_free != NO_PAGE {
            let idx = self.fix_page(fd, first_free, FillMode::Read)?;
            let next = read_link(self.pool.frame_data(idx));
            let entry = Self::entry_mut(&mut self.files, fd)?;
            entry.header.first_free_page = next;
            entry.header_dirty = true;
            self.pool.frame_data_mut(idx).fill(0);
            (first_free, idx)
        } else {
            let key = PageKey {
                fd,
                page_num: num_pages,
            };
            if self.pool.find(key).is_some() {
                return Err(PfError::PageInBuf(fd.0, num_pages));
            }
            let idx = self.fix_page(fd, num_pages, FillMode::Zero)?;
            let entry = Self::entry_mut(&mut self.files, fd)?;
            entry.header.num_pages += 1;
            entry.header_dirty = true;
            (num_pages, idx)
        };

        self.pool.set_frame_dirty(idx);
        Ok((page_num, self.pool.frame_data_mut(idx)))
    }

    /// Push a live, unfixed page onto the head of the free list
    pub fn dispose_page(&mut self, fd: FileDesc, page_num: PageNum) -> PfResult<()> {
        let num_pages = Self::entry(&self.files, fd)?.header.num_pages;
        if page_num < 0 || page_num >= num_pages {
            return Err(PfError::InvalidPage(page_num));
        }

        let key = PageKey { fd, page_num };
        if let Some(idx) = self.pool.find(key) {
            if self.pool.pin_count(idx) > 0 {
                return Err(PfError::PageFixed(fd.0, page_num));
            }
        }
        if self.page_on_free_list(fd, page_num)? {
            return Err(PfError::PageFree(fd.0, page_num));
        }

        let idx = self.fix_page(fd, page_num, FillMode::Read)?;
        let entry = Self::entry_mut(&mut self.files, fd)?;
        let old_head = entry.header.first_free_page;
        entry.header.first_free_page = page_num;
        entry.header_dirty = true;
        write_link(self.pool.frame_data_mut(idx), old_head);
        self.pool.unpin(key, true)
    }

    /// Release one fix of a page, ORing in the dirty hint
    pub fn unfix_page(&mut self, fd: FileDesc, page_num: PageNum, dirty: bool) -> PfResult<()> {
        Self::entry(&self.files, fd)?;
        self.pool.unpin(PageKey { fd, page_num }, dirty)
    }

    /// Mark a fixed page dirty; on release it moves to the
    /// most-recently-released end of the replacement order
    pub fn mark_dirty(&mut self, fd: FileDesc, page_num: PageNum) -> PfResult<()> {
        Self::entry(&self.files, fd)?;
        self.pool.mark_dirty(PageKey { fd, page_num })
    }

    /// Re-borrow the buffer of a page that is already fixed. Not a page
    /// request: the statistics are untouched.
    pub fn fixed_page(&mut self, fd: FileDesc, page_num: PageNum) -> PfResult<&mut [u8]> {
        Self::entry(&self.files, fd)?;
        let key = PageKey { fd, page_num };
        let idx = self
            .pool
            .find(key)
            .ok_or(PfError::PageNotInBuf(fd.0, page_num))?;
        if self.pool.pin_count(idx) == 0 {
            return Err(PfError::PageUnfixed(fd.0, page_num));
        }
        Ok(self.pool.frame_data_mut(idx))
    }

    pub fn stats(&self) -> IoStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = IoStats::default();
    }

    /// Fix a page in the pool, claiming and filling a frame on a miss
    fn fix_page(&mut self, fd: FileDesc, page_num: PageNum, mode: FillMode) -> PfResult<usize> {
        self.stats.logical_reads += 1;
        let key = PageKey { fd, page_num };

        if let Some(idx) = self.pool.find(key) {
            self.pool.pin_existing(idx);
            return Ok(idx);
        }

        let idx = self.pool.take_victim()?;
        if let Some(old_key) = self.pool.frame_key(idx) {
            if self.pool.frame_dirty(idx) {
                let entry = Self::entry_mut(&mut self.files, old_key.fd)?;
                entry
                    .disk
                    .write_page(old_key.page_num, self.pool.frame_data(idx))?;
                self.stats.physical_writes += 1;
            }
            self.pool.unmap(old_key)?;
        }

        match mode {
            FillMode::Read => {
                let entry = Self::entry_mut(&mut self.files, fd)?;
                if let Err(e) = entry.disk.read_page(page_num, self.pool.frame_data_mut(idx)) {
                    self.pool.release_frame(idx);
                    return Err(e);
                }
                self.stats.physical_reads += 1;
            }
            FillMode::Zero => self.pool.frame_data_mut(idx).fill(0),
        }

        self.pool.install(idx, key)?;
        Ok(idx)
    }

    /// Pages currently on the file's free list, by walking the on-disk
    /// chain through the pool
    fn free_page_set(&mut self, fd: FileDesc) -> PfResult<HashSet<PageNum>> {
        let mut free = HashSet::new();
        let mut cur = Self::entry(&self.files, fd)?.header.first_free_page;
        while cur != NO_PAGE && !free.contains(&cur) {
            free.insert(cur);
            cur = self.read_free_link(fd, cur)?;
        }
        Ok(free)
    }

    fn page_on_free_list(&mut self, fd: FileDesc, page_num: PageNum) -> PfResult<bool> {
        Ok(self.free_page_set(fd)?.contains(&page_num))
    }

    /// Read a free page's next-link without holding the fix
    fn read_free_link(&mut self, fd: FileDesc, page_num: PageNum) -> PfResult<PageNum> {
        let idx = self.fix_page(fd, page_num, FillMode::Read)?;
        let next = read_link(self.pool.frame_data(idx));
        self.pool.unpin(PageKey { fd, page_num }, false)?;
        Ok(next)
    }

    fn entry(files: &[Option<OpenFile>], fd: FileDesc) -> PfResult<&OpenFile> {
        files
            .get(fd.0)
            .and_then(|e| e.as_ref())
            .ok_or(PfError::BadFd(fd.0))
    }

    fn entry_mut(files: &mut [Option<OpenFile>], fd: FileDesc) -> PfResult<&mut OpenFile> {
        files
            .get_mut(fd.0)
            .and_then(|e| e.as_mut())
            .ok_or(PfError::BadFd(fd.0))
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The free-list link lives in a disposed page's first four bytes
fn read_link(data: &[u8]) -> PageNum {
    i32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

fn write_link(data: &mut [u8], link: PageNum) {
    data[0..4].copy_from_slice(&link.to_le_bytes());
}
