//! Binary model artifact.
//!
//! Layout (all little endian):
//!
//! | field | size |
//! |-------|------|
//! | header: magic `LRM1`, format version, n_features, n_classes | 16 bytes |
//! | class labels | n_classes × i64 |
//! | feature means, feature scales | 2 × n_features × f64 |
//! | weights (row per class) | n_classes × n_features × f64 |
//! | biases | n_classes × f64 |

use bytemuck::{Pod, Zeroable};
use memmap2::MmapOptions;
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracking_re::model::LogisticRegression;
use tracking_re::{Result, TrackingError};

/// File name of the serialized model inside an artifact directory.
pub const MODEL_FILE: &str = "model.bin";
/// Flavor recorded with logged models of this format.
pub const FLAVOR: &str = "logistic_regression";

const MAGIC: [u8; 4] = *b"LRM1";
const FORMAT_VERSION: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Header {
    magic: [u8; 4],
    format_version: u32,
    n_features: u32,
    n_classes: u32,
}

/// A fitted model in its on-disk form.
#[derive(Clone, Debug)]
pub struct ModelArtifact {
    model: LogisticRegression,
}

impl ModelArtifact {
    pub fn from_model(model: LogisticRegression) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &LogisticRegression {
        &self.model
    }

    pub fn into_model(self) -> LogisticRegression {
        self.model
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let m = &self.model;
        let n_features = u32::try_from(m.n_features())
            .map_err(|_| TrackingError::artifact("too many features"))?;
        let n_classes = u32::try_from(m.n_classes())
            .map_err(|_| TrackingError::artifact("too many classes"))?;
        let header = Header {
            magic: MAGIC,
            format_version: FORMAT_VERSION.to_le(),
            n_features: n_features.to_le(),
            n_classes: n_classes.to_le(),
        };

        let mut f = BufWriter::new(File::create(path)?);
        f.write_all(bytemuck::bytes_of(&header))?;
        for c in m.classes() {
            f.write_all(&c.to_le_bytes())?;
        }
        let linear = m.linear();
        let floats = m
            .mean()
            .iter()
            .chain(m.scale().iter())
            .chain(linear.weight().iter())
            .chain(linear.bias().iter());
        for v in floats {
            f.write_all(&v.to_le_bytes())?;
        }
        f.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn load_mmap(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Self::from_bytes(&mmap[..])
    }

    /// Decode an artifact. The returned model owns its data.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut reader = Reader { buf, offset: 0 };
        let header: Header = bytemuck::try_pod_read_unaligned(reader.take(std::mem::size_of::<Header>())?)
            .map_err(|e| TrackingError::artifact(format!("bad header: {e:?}")))?;
        if header.magic != MAGIC {
            return Err(TrackingError::artifact("not a model artifact (bad magic)"));
        }
        let format_version = u32::from_le(header.format_version);
        if format_version != FORMAT_VERSION {
            return Err(TrackingError::artifact(format!(
                "unsupported artifact format version {format_version}"
            )));
        }
        let d = u32::from_le(header.n_features) as usize;
        let k = u32::from_le(header.n_classes) as usize;
        if d == 0 || k == 0 {
            return Err(TrackingError::artifact("artifact declares an empty model"));
        }

        let classes = reader.i64s(k)?;
        let mean = Array1::from(reader.f64s(d)?);
        let scale = Array1::from(reader.f64s(d)?);
        let weight_len = k
            .checked_mul(d)
            .ok_or_else(|| TrackingError::artifact("weight matrix size overflows"))?;
        let weight = Array2::from_shape_vec((k, d), reader.f64s(weight_len)?)
            .map_err(|e| TrackingError::artifact(e.to_string()))?;
        let bias = Array1::from(reader.f64s(k)?);
        if reader.offset != buf.len() {
            return Err(TrackingError::artifact(format!(
                "{} trailing bytes after model data",
                buf.len() - reader.offset
            )));
        }

        let model = LogisticRegression::from_parts(classes, mean, scale, weight, bias)?;
        Ok(Self { model })
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                TrackingError::artifact(format!(
                    "truncated artifact: needed {len} bytes at offset {}",
                    self.offset
                ))
            })?;
        let out = &self.buf[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn words(&mut self, count: usize) -> Result<impl Iterator<Item = [u8; 8]> + 'a> {
        let len = count
            .checked_mul(8)
            .ok_or_else(|| TrackingError::artifact("artifact section size overflows"))?;
        let bytes = self.take(len)?;
        Ok(bytes.chunks_exact(8).map(|c| {
            let mut word = [0u8; 8];
            word.copy_from_slice(c);
            word
        }))
    }

    fn f64s(&mut self, count: usize) -> Result<Vec<f64>> {
        Ok(self.words(count)?.map(f64::from_le_bytes).collect())
    }

    fn i64s(&mut self, count: usize) -> Result<Vec<i64>> {
        Ok(self.words(count)?.map(i64::from_le_bytes).collect())
    }
}
