//! Persisted calibration record.
//!
//! Position-addressed little-endian layout, no version field:
//!
//! | bytes  | field                         |
//! |--------|-------------------------------|
//! | 0..8   | center (x, y) as `f32`        |
//! | 8..16  | vec_x (x, y) as `f32`         |
//! | 16..24 | vec_y (x, y) as `f32`         |
//! | 24..40 | 8 Z-jitter offsets as `i16`   |
//!
//! An all-ones word means "unset". The pattern stays on disk; the API
//! surfaces it as `Option`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use nalgebra::Vector2;

use crate::correction::AffineCorrection;

pub const RECORD_LEN: usize = 40;

const CENTER_ADDR: usize = 0;
const VEC_X_ADDR: usize = 8;
const VEC_Y_ADDR: usize = 16;
const JITTER_ADDR: usize = 24;
const JITTER_WORDS: usize = 8;

const UNSET_F32: u32 = 0xFFFF_FFFF;
const UNSET_I16: i16 = -1;

/// Z offsets of the 3x3 grid relative to cell (0,0), in 0.01 mm,
/// row-major without the reference cell.
pub type ZJitter = [i16; JITTER_WORDS];

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("address range {addr}..{end} outside the {len} byte record")]
    OutOfRange { addr: usize, end: usize, len: usize },
}

/// Byte-addressed persistent store.
pub trait ByteStore {
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError>;
    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError>;
}

impl<S: ByteStore + ?Sized> ByteStore for &mut S {
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(addr, data)
    }
}

fn check_range(addr: usize, n: usize) -> Result<(), StorageError> {
    let end = addr + n;
    if end > RECORD_LEN {
        return Err(StorageError::OutOfRange {
            addr,
            end,
            len: RECORD_LEN,
        });
    }
    Ok(())
}

/// In-memory record, erased (all ones) on creation.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            bytes: vec![0xFF; RECORD_LEN],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteStore for MemoryStore {
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[addr..addr + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError> {
        check_range(addr, data.len())?;
        self.bytes[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// File-backed record. A missing or short file reads as erased.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let len = file.metadata()?.len() as usize;
        if len < RECORD_LEN {
            file.seek(SeekFrom::Start(len as u64))?;
            file.write_all(&vec![0xFF; RECORD_LEN - len])?;
            file.sync_all()?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStore for FileStore {
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_range(addr, buf.len())?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(addr as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), StorageError> {
        check_range(addr, data.len())?;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(addr as u64))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Typed access to the calibration record.
#[derive(Debug)]
pub struct CalibrationStorage<S> {
    store: S,
}

impl<S: ByteStore> CalibrationStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_vec(&mut self, addr: usize) -> Result<Option<Vector2<f32>>, StorageError> {
        let mut buf = [0u8; 8];
        self.store.read(addr, &mut buf)?;
        let x = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let y = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if x == UNSET_F32 || y == UNSET_F32 {
            return Ok(None);
        }
        Ok(Some(Vector2::new(f32::from_bits(x), f32::from_bits(y))))
    }

    fn write_vec(&mut self, addr: usize, v: Vector2<f32>) -> Result<(), StorageError> {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&v.x.to_le_bytes());
        buf[4..].copy_from_slice(&v.y.to_le_bytes());
        self.store.write(addr, &buf)
    }

    /// The stored correction, `None` if any of the six floats is unset.
    pub fn load_correction(&mut self) -> Result<Option<AffineCorrection>, StorageError> {
        let center = self.read_vec(CENTER_ADDR)?;
        let vec_x = self.read_vec(VEC_X_ADDR)?;
        let vec_y = self.read_vec(VEC_Y_ADDR)?;
        Ok(match (vec_x, vec_y, center) {
            (Some(x), Some(y), Some(c)) => Some(AffineCorrection::new(x, y, c)),
            _ => None,
        })
    }

    pub fn store_correction(&mut self, c: &AffineCorrection) -> Result<(), StorageError> {
        self.write_vec(CENTER_ADDR, c.center)?;
        self.write_vec(VEC_X_ADDR, c.vec_x)?;
        self.write_vec(VEC_Y_ADDR, c.vec_y)
    }

    /// Mark the whole record as never calibrated.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.store.write(0, &[0xFF; RECORD_LEN])
    }

    /// Store the Z-jitter table. A quantised `-1` would read back as
    /// unset, so it is written as `-2`.
    pub fn store_z_jitter(&mut self, jitter: &ZJitter) -> Result<(), StorageError> {
        let mut buf = [0u8; JITTER_WORDS * 2];
        for (chunk, &v) in buf.chunks_exact_mut(2).zip(jitter.iter()) {
            let v = if v == UNSET_I16 { -2 } else { v };
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        self.store.write(JITTER_ADDR, &buf)
    }

    /// The Z-jitter table, `None` if any word is unset.
    pub fn z_jitter(&mut self) -> Result<Option<ZJitter>, StorageError> {
        let mut buf = [0u8; JITTER_WORDS * 2];
        self.store.read(JITTER_ADDR, &mut buf)?;
        let mut out = [0i16; JITTER_WORDS];
        for (v, chunk) in out.iter_mut().zip(buf.chunks_exact(2)) {
            *v = i16::from_le_bytes([chunk[0], chunk[1]]);
            if *v == UNSET_I16 {
                return Ok(None);
            }
        }
        Ok(Some(out))
    }

    pub fn is_z_jitter_valid(&mut self) -> bool {
        matches!(self.z_jitter(), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_is_unset() {
        let mut s = CalibrationStorage::new(MemoryStore::new());
        assert_eq!(s.load_correction().expect("load"), None);
        assert!(!s.is_z_jitter_valid());
    }

    #[test]
    fn correction_layout_is_position_addressed() {
        let mut s = CalibrationStorage::new(MemoryStore::new());
        let c = AffineCorrection::new(
            Vector2::new(1.0, 0.002),
            Vector2::new(-0.001, 1.0),
            Vector2::new(0.25, -0.5),
        );
        s.store_correction(&c).expect("store");
        assert_eq!(s.load_correction().expect("load"), Some(c));

        let bytes = s.store().as_bytes();
        assert_eq!(&bytes[0..4], &0.25_f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1.0_f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &1.0_f32.to_le_bytes());
        assert!(bytes[24..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn single_unset_float_invalidates_record() {
        let mut mem = MemoryStore::new();
        {
            let mut s = CalibrationStorage::new(&mut mem);
            s.store_correction(&AffineCorrection::IDENTITY)
                .expect("store");
        }
        mem.write(VEC_Y_ADDR + 4, &[0xFF; 4]).expect("write");
        let mut s = CalibrationStorage::new(mem);
        assert_eq!(s.load_correction().expect("load"), None);
    }

    #[test]
    fn z_jitter_minus_one_is_not_unset() {
        let mut s = CalibrationStorage::new(MemoryStore::new());
        let j: ZJitter = [0, 5, -1, 12, -30, 7, 1, -4];
        s.store_z_jitter(&j).expect("store");
        let back = s.z_jitter().expect("read").expect("valid");
        assert_eq!(back, [0, 5, -2, 12, -30, 7, 1, -4]);
        assert!(s.is_z_jitter_valid());

        s.reset().expect("reset");
        assert!(!s.is_z_jitter_valid());
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut m = MemoryStore::new();
        let err = m.write(36, &[0; 8]).expect_err("out of range");
        assert!(matches!(err, StorageError::OutOfRange { end: 44, .. }));
    }

    #[test]
    fn file_store_persists_between_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("calib.bin");
        let c = AffineCorrection::new(
            Vector2::new(0.999, 0.001),
            Vector2::new(-0.002, 1.001),
            Vector2::new(1.0, 2.0),
        );
        {
            let mut s = CalibrationStorage::new(FileStore::open(&path).expect("open"));
            assert_eq!(s.load_correction().expect("load"), None);
            s.store_correction(&c).expect("store");
        }
        let mut s = CalibrationStorage::new(FileStore::open(&path).expect("reopen"));
        assert_eq!(s.load_correction().expect("load"), Some(c));
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), RECORD_LEN as u64);
    }
}
