use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::LedgerEntry;

use super::LedgerStore;

/// Encode a single entry to [len][bincode][crc32] format.
fn encode_entry(writer: &mut impl Write, entry: &LedgerEntry) -> io::Result<()> {
    let payload =
        bincode::serialize(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only usage ledger on disk.
///
/// Format per entry: `[u32: len][bincode: LedgerEntry][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A truncated or corrupt tail (crash mid-write) is cut off when the file
///   is opened, so later appends stay reachable on replay.
pub struct FileLedgerStore {
    writer: BufWriter<File>,
    path: PathBuf,
    appended: u64,
    /// File length covered by intact, synced records.
    committed_len: u64,
}

impl FileLedgerStore {
    /// Open (or create) the ledger file at `path`, dropping any torn tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let (_, intact_len) = scan(BufReader::new(&file))?;
        let file_len = file.metadata()?.len();
        if intact_len < file_len {
            warn!(
                "ledger {}: dropping {} bytes of torn tail",
                path.display(),
                file_len - intact_len
            );
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appended: 0,
            committed_len: intact_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended through this handle since it was opened.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Read every intact entry from disk. A missing file is an empty ledger.
    /// Reading stops at the first truncated or corrupt record.
    pub fn replay(path: &Path) -> io::Result<Vec<LedgerEntry>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        scan(BufReader::new(file)).map(|(entries, _)| entries)
    }
}

/// Decode records until EOF or the first bad one. Returns the entries and
/// the byte length they occupy.
fn scan(mut reader: impl Read) -> io::Result<(Vec<LedgerEntry>, u64)> {
    let mut entries = Vec::new();
    let mut intact_len = 0u64;

    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
            Err(e) => return Err(e),
        }

        let mut crc_buf = [0u8; 4];
        match reader.read_exact(&mut crc_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
            Err(e) => return Err(e),
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            break;
        }

        match bincode::deserialize::<LedgerEntry>(&payload) {
            Ok(entry) => entries.push(entry),
            Err(_) => break,
        }
        intact_len += 8 + len as u64;
    }

    Ok((entries, intact_len))
}

impl LedgerStore for FileLedgerStore {
    fn append_buffered(&mut self, entry: &LedgerEntry) -> io::Result<()> {
        encode_entry(&mut self.writer, entry)?;
        self.appended += 1;
        Ok(())
    }

    fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        self.committed_len = file.metadata()?.len();
        Ok(())
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        // into_parts hands back the buffer without writing it out.
        let old = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let _ = old.into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()
    }

    fn load(&self) -> io::Result<Vec<LedgerEntry>> {
        Self::replay(&self.path)
    }
}
