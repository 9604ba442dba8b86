use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{PfError, PfResult};
use super::header::FileHeader;
use super::{PageNum, FILE_HEADER_SIZE, PAGE_SIZE};

/// Block I/O facade over one host file.
///
/// Layout: `[file header | page 0 | page 1 | ... | page N-1]`. Page n lives
/// at byte offset `FILE_HEADER_SIZE + n * PAGE_SIZE`. The file grows by
/// writing past its current end.
pub struct DiskFile {
    file: File,
    path: PathBuf,
}

impl DiskFile {
    /// Create a new paged file with an empty header
    pub fn create<P: AsRef<Path>>(path: P) -> PfResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(PfError::FileExists(path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path)?;
        file.write_all(&FileHeader::new().serialize())
            .map_err(|_| PfError::HdrWrite)?;
        Ok(())
    }

    /// Remove a paged file from the host file system
    pub fn destroy<P: AsRef<Path>>(path: P) -> PfResult<()> {
        let path = path.as_ref();
        std::fs::remove_file(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PfError::FileNotFound(path.display().to_string())
            } else {
                PfError::Io(e)
            }
        })
    }

    /// Open an existing paged file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> PfResult<Self> {
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path_ref)
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    PfError::FileNotFound(path_ref.display().to_string())
                } else {
                    PfError::Io(e)
                }
            })?;

        Ok(Self {
            file,
            path: path_ref.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_offset(page_num: PageNum) -> u64 {
        FILE_HEADER_SIZE as u64 + page_num as u64 * PAGE_SIZE as u64
    }

    /// Read page `page_num` into `buf`.
    ///
    /// A read that yields no bytes is `Eof`; a read cut short mid-page is
    /// `IncompleteRead`.
    pub fn read_page(&mut self, page_num: PageNum, buf: &mut [u8]) -> PfResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PfError::Io(e)),
            }
        }

        if total == 0 {
            return Err(PfError::Eof);
        }
        if total < PAGE_SIZE {
            return Err(PfError::IncompleteRead);
        }
        Ok(())
    }

    /// Write page `page_num` from `buf`, extending the file if needed
    pub fn write_page(&mut self, page_num: PageNum, buf: &[u8]) -> PfResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;

        let mut total = 0;
        while total < PAGE_SIZE {
            match self.file.write(&buf[total..]) {
                Ok(0) => return Err(PfError::IncompleteWrite),
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PfError::Io(e)),
            }
        }
        Ok(())
    }

    /// Read the file header from the start of the file
    pub fn read_header(&mut self) -> PfResult<FileHeader> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|_| PfError::HdrRead)?;

        let mut buf = [0u8; FileHeader::SIZE];
        self.file.read_exact(&mut buf).map_err(|_| PfError::HdrRead)?;
        FileHeader::deserialize(&buf)
    }

    /// Write the file header to the start of the file
    pub fn write_header(&mut self, header: &FileHeader) -> PfResult<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|_| PfError::HdrWrite)?;
        self.file
            .write_all(&header.serialize())
            .map_err(|_| PfError::HdrWrite)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_create_writes_empty_header() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");

        DiskFile::create(&test_file).unwrap();
        assert!(test_file.exists());

        let mut disk = DiskFile::open(&test_file).unwrap();
        let header = disk.read_header().unwrap();
        assert_eq!(header, FileHeader::new());
    }

    #[test]
    fn test_create_already_exists() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");

        DiskFile::create(&test_file).unwrap();
        let result = DiskFile::create(&test_file);
        assert!(matches!(result, Err(PfError::FileExists(_))));
    }

    #[test]
    fn test_open_nonexistent() {
        let temp_dir = setup_test_dir();
        let result = DiskFile::open(temp_dir.path().join("missing.pf"));
        assert!(matches!(result, Err(PfError::FileNotFound(_))));
    }

    #[test]
    fn test_page_roundtrip() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");
        DiskFile::create(&test_file).unwrap();
        let mut disk = DiskFile::open(&test_file).unwrap();

        let mut write_buf = vec![0u8; PAGE_SIZE];
        write_buf[0] = 42;
        write_buf[PAGE_SIZE - 1] = 255;
        disk.write_page(0, &write_buf).unwrap();

        let mut read_buf = vec![0u8; PAGE_SIZE];
        disk.read_page(0, &mut read_buf).unwrap();
        assert_eq!(read_buf, write_buf);
    }

    #[test]
    fn test_pages_do_not_overlap_header() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");
        DiskFile::create(&test_file).unwrap();
        let mut disk = DiskFile::open(&test_file).unwrap();

        let page = vec![0xABu8; PAGE_SIZE];
        disk.write_page(0, &page).unwrap();

        let header = FileHeader {
            num_pages: 1,
            first_free_page: -1,
        };
        disk.write_header(&header).unwrap();

        let mut read_buf = vec![0u8; PAGE_SIZE];
        disk.read_page(0, &mut read_buf).unwrap();
        assert_eq!(read_buf, page);
        assert_eq!(disk.read_header().unwrap(), header);
    }

    #[test]
    fn test_read_past_eof() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");
        DiskFile::create(&test_file).unwrap();
        let mut disk = DiskFile::open(&test_file).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        let result = disk.read_page(0, &mut buf);
        assert!(matches!(result, Err(PfError::Eof)));
    }

    #[test]
    fn test_sparse_write_extends_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");
        DiskFile::create(&test_file).unwrap();
        let mut disk = DiskFile::open(&test_file).unwrap();

        let page = vec![7u8; PAGE_SIZE];
        disk.write_page(4, &page).unwrap();

        let mut read_buf = vec![0u8; PAGE_SIZE];
        disk.read_page(4, &mut read_buf).unwrap();
        assert_eq!(read_buf, page);

        // The gap pages read back as zeros
        disk.read_page(2, &mut read_buf).unwrap();
        assert!(read_buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_truncated_page_is_incomplete_read() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");
        DiskFile::create(&test_file).unwrap();
        let mut disk = DiskFile::open(&test_file).unwrap();

        let page = vec![9u8; PAGE_SIZE];
        disk.write_page(0, &page).unwrap();

        // Chop the file mid-page
        let f = std::fs::OpenOptions::new()
            .write(true)
            .open(&test_file)
            .unwrap();
        f.set_len((FILE_HEADER_SIZE + 100) as u64).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        let result = disk.read_page(0, &mut buf);
        assert!(matches!(result, Err(PfError::IncompleteRead)));
    }

    #[test]
    fn test_destroy() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.pf");
        DiskFile::create(&test_file).unwrap();

        DiskFile::destroy(&test_file).unwrap();
        assert!(!test_file.exists());

        let result = DiskFile::destroy(&test_file);
        assert!(matches!(result, Err(PfError::FileNotFound(_))));
    }
}
