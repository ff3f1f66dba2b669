use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// File header: format tag + version byte.
const MAGIC: [u8; 8] = *b"BGWAL\0\0\x01";

/// Frames claiming more than this are treated as corruption.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Result of scanning a log file.
struct Scan {
    events: Vec<Event>,
    /// Byte offset just past the last intact frame.
    valid_len: u64,
    /// True when bytes after `valid_len` were discarded.
    torn: bool,
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn scan(path: &Path) -> io::Result<Scan> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Scan { events: Vec::new(), valid_len: 0, torn: false });
        }
        Err(e) => return Err(e),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut header = [0u8; MAGIC.len()];
    if !read_exact_or_eof(&mut reader, &mut header)? {
        // Crash while writing the header of a fresh log.
        return Ok(Scan { events: Vec::new(), valid_len: 0, torn: file_len > 0 });
    }
    if header != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not a boothgrid WAL", path.display()),
        ));
    }

    let mut events = Vec::new();
    let mut valid_len = MAGIC.len() as u64;
    loop {
        let mut len_buf = [0u8; 4];
        if !read_exact_or_eof(&mut reader, &mut len_buf)? {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            break;
        }
        let mut payload = vec![0u8; len];
        if !read_exact_or_eof(&mut reader, &mut payload)? {
            break;
        }
        let mut crc_buf = [0u8; 4];
        if !read_exact_or_eof(&mut reader, &mut crc_buf)? {
            break;
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            break;
        }
        match bincode::deserialize::<Event>(&payload) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
        valid_len += 8 + len as u64;
    }

    Ok(Scan { events, valid_len, torn: valid_len < file_len })
}

fn write_header(file: &mut File) -> io::Result<()> {
    file.write_all(&MAGIC)?;
    file.sync_all()
}

/// Append-only write-ahead log of layout events.
///
/// Layout: 8-byte header, then frames of `[u32 len][bincode Event][u32 crc32]`.
/// A torn tail (crash mid-append) is cut off when the log is reopened, so new
/// frames never land behind garbage.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path`, repairing a torn tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let scan = scan(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if scan.torn {
            warn!(
                "discarding torn WAL tail in {} after byte {}",
                path.display(),
                scan.valid_len
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }
        if scan.valid_len == 0 {
            write_header(&mut file)?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append one event and fsync before returning.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        encode_frame(&mut self.writer, event)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a complete replacement log next to `path` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&MAGIC)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every intact event in the log. A torn or corrupt tail ends the replay.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(scan(path)?.events)
    }
}
