//! GZIP-framed binary snapshot codec: durable point-in-time dump and
//! restore of a [`Store`]'s contents.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::store::Store;

const MAGIC: u32 = 0x4348_524F; // "CHRO"
const VERSION: u32 = 1;
const NEVER_TTL: i64 = -1;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as u64
}

/// Writes and restores the GZIP-framed snapshot format described in the
/// design's §4.7. The writer targets `path.tmp` and renames it over `path`
/// only once the full stream has flushed, so a crash mid-write never
/// corrupts a previously good snapshot.
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Serializes every live key in `store` to `path`, compressing with
    /// GZIP and performing an atomic rename once the write completes.
    ///
    /// The fan-out over keys is weakly consistent: entries added during
    /// the walk may or may not be captured, and entries deleted during the
    /// walk may appear with stale values. This mirrors the store's other
    /// fan-out operations and is an accepted trade-off for not locking the
    /// whole store during a snapshot.
    pub fn write(store: &Store, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let tmp_path = append_tmp_suffix(path);

        let keys = store.keys();
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some((value, ttl_remaining_s)) = store.with_entry(&key, |entry| {
                let ttl_remaining_s = entry
                    .ttl_remaining_s(current_wall_ms() as i64)
                    .unwrap_or(NEVER_TTL);
                (entry.value().to_vec(), ttl_remaining_s)
            }) else {
                continue;
            };
            entries.push((key, value, ttl_remaining_s));
        }

        let file = File::create(&tmp_path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());

        encoder.write_all(&MAGIC.to_be_bytes())?;
        encoder.write_all(&VERSION.to_be_bytes())?;
        encoder.write_all(&now_ms().to_be_bytes())?;
        encoder.write_all(&(entries.len() as u32).to_be_bytes())?;

        for (key, value, ttl_remaining_s) in &entries {
            let key_bytes = key.as_bytes();
            encoder.write_all(&(key_bytes.len() as u16).to_be_bytes())?;
            encoder.write_all(key_bytes)?;
            encoder.write_all(&(value.len() as u32).to_be_bytes())?;
            encoder.write_all(value)?;
            encoder.write_all(&ttl_remaining_s.to_be_bytes())?;
        }

        encoder.finish()?;
        fs::rename(&tmp_path, path)?;
        Ok(entries.len())
    }

    /// Restores entries from `path` into `store`. A missing file is not an
    /// error (fresh starts simply have an empty cache). Corruption
    /// encountered partway through the stream aborts restoration of the
    /// remainder but keeps whatever was already loaded.
    pub fn restore(store: &Store, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(Error::SnapshotIo(err)),
        };
        let mut decoder = GzDecoder::new(file);

        let magic = read_u32(&mut decoder)?;
        if magic != MAGIC {
            return Err(Error::SnapshotCorrupted(format!(
                "bad magic: expected {MAGIC:#x}, got {magic:#x}"
            )));
        }
        let version = read_u32(&mut decoder)?;
        if version != VERSION {
            return Err(Error::SnapshotCorrupted(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let _written_at_ms = read_u64(&mut decoder)?;
        let entry_count = read_u32(&mut decoder)?;

        let mut loaded = 0usize;
        for _ in 0..entry_count {
            match read_entry(&mut decoder) {
                Ok((key, value, ttl_remaining_s)) => {
                    let ttl_seconds = if ttl_remaining_s < 0 {
                        0
                    } else {
                        ttl_remaining_s as u64
                    };
                    store.set(&key, value, ttl_seconds, 0);
                    loaded += 1;
                }
                Err(_) => break,
            }
        }
        Ok(loaded)
    }
}

fn current_wall_ms() -> u64 {
    now_ms()
}

fn append_tmp_suffix(path: &Path) -> std::path::PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    std::path::PathBuf::from(os_string)
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_i64(reader: &mut impl Read) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_entry(reader: &mut impl Read) -> Result<(String, Vec<u8>, i64)> {
    let mut key_len_buf = [0u8; 2];
    reader.read_exact(&mut key_len_buf)?;
    let key_len = u16::from_be_bytes(key_len_buf) as usize;
    let mut key_bytes = vec![0u8; key_len];
    reader.read_exact(&mut key_bytes)?;
    let key = String::from_utf8(key_bytes)
        .map_err(|e| Error::SnapshotCorrupted(format!("non-utf8 key: {e}")))?;

    let value_len = read_u32(reader)? as usize;
    let mut value = vec![0u8; value_len];
    reader.read_exact(&mut value)?;

    let ttl_remaining_s = read_i64(reader)?;
    Ok((key, value, ttl_remaining_s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::tempdir;

    #[test]
    fn restore_of_missing_file_is_not_an_error() {
        let store = Store::new(&StoreConfig::default());
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.snapshot");
        let loaded = SnapshotCodec::restore(&store, &path).unwrap();
        assert_eq!(loaded, 0);
    }

    #[test]
    fn round_trips_keys_and_values() {
        let store = Store::new(&StoreConfig {
            segments: 4,
            max_memory_bytes: 1024 * 1024,
            ..StoreConfig::default()
        });
        store.set("a", b"1".to_vec(), 0, 0);
        store.set("b", b"2".to_vec(), 600, 0);

        let dir = tempdir().unwrap();
        let path = dir.path().join("store.snapshot");
        let written = SnapshotCodec::write(&store, &path).unwrap();
        assert_eq!(written, 2);
        assert!(path.exists());
        assert!(!append_tmp_suffix(&path).exists());

        let restored_store = Store::new(&StoreConfig {
            segments: 4,
            max_memory_bytes: 1024 * 1024,
            ..StoreConfig::default()
        });
        let loaded = SnapshotCodec::restore(&restored_store, &path).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(restored_store.get("a"), Some(b"1".to_vec()));
        assert_eq!(restored_store.get("b"), Some(b"2".to_vec()));

        let ttl = restored_store.ttl("b").unwrap();
        assert!(ttl.is_some());
        assert!(ttl.unwrap() <= 600);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.snapshot");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&0xdead_beefu32.to_be_bytes()).unwrap();
            encoder.finish().unwrap();
        }
        let store = Store::new(&StoreConfig::default());
        let result = SnapshotCodec::restore(&store, &path);
        assert!(result.is_err());
    }
}
