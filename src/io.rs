//! Safetensors I/O.
//!
//! Used for the persisted event array of the metadata cache and for evoked
//! responses.  Only what those files need is supported: `F64` and `I32`
//! tensors plus the string-to-string `__metadata__` map.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};

const METADATA_KEY: &str = "__metadata__";

// ── Writer ───────────────────────────────────────────────────────────────────

/// Simple safetensors file writer.
///
/// ```rust,no_run
/// use fmed_eeg::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_i32("events", &[1000, 0, 2, 1400, 0, 3], &[2, 3]);
/// w.add_f64("times", &[-0.1, 0.0, 0.1], &[3]);
/// w.set_metadata("kind", "mmn");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Serialise to bytes: `u64` header length, JSON header padded to 8,
    /// tensor payloads.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header_map.insert(METADATA_KEY.to_string(), serde_json::to_value(&self.metadata)?);
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;

        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend_from_slice(&hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// A safetensors file loaded into memory.
#[derive(Debug)]
pub struct StFile {
    bytes: Vec<u8>,
    data_start: usize,
    header: serde_json::Map<String, serde_json::Value>,
}

impl StFile {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            bail!("safetensors file too small");
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        if bytes.len() < 8 + n {
            bail!("safetensors header length {n} exceeds file size {}", bytes.len());
        }
        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;
        Ok(Self { bytes, data_start: 8 + n, header })
    }

    /// Value of a `__metadata__` entry.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get(METADATA_KEY)?.get(key)?.as_str()
    }

    pub fn contains(&self, name: &str) -> bool {
        name != METADATA_KEY && self.header.contains_key(name)
    }

    pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
        let entry = self.entry(name)?;
        entry["shape"]
            .as_array()
            .context("tensor shape is not an array")?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize).context("bad shape entry"))
            .collect()
    }

    pub fn f64s(&self, name: &str) -> Result<Vec<f64>> {
        let raw = self.payload(name, "F64")?;
        Ok(raw
            .chunks_exact(8)
            .map(|b| {
                let mut a = [0u8; 8];
                a.copy_from_slice(b);
                f64::from_le_bytes(a)
            })
            .collect())
    }

    pub fn i32s(&self, name: &str) -> Result<Vec<i32>> {
        let raw = self.payload(name, "I32")?;
        Ok(raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    pub fn f64_arr1(&self, name: &str) -> Result<Array1<f64>> {
        Ok(Array1::from_vec(self.f64s(name)?))
    }

    pub fn f64_arr2(&self, name: &str) -> Result<Array2<f64>> {
        let shape = self.shape(name)?;
        if shape.len() != 2 {
            bail!("tensor '{name}' has shape {shape:?}, expected 2-D");
        }
        Ok(Array2::from_shape_vec((shape[0], shape[1]), self.f64s(name)?)?)
    }

    fn entry(&self, name: &str) -> Result<&serde_json::Value> {
        self.header
            .get(name)
            .filter(|_| name != METADATA_KEY)
            .with_context(|| format!("missing '{name}' tensor"))
    }

    fn payload(&self, name: &str, dtype: &str) -> Result<&[u8]> {
        let entry = self.entry(name)?;
        let found = entry["dtype"].as_str().unwrap_or("?");
        if found != dtype {
            bail!("tensor '{name}' has dtype {found}, expected {dtype}");
        }
        let offsets = entry["data_offsets"].as_array().context("missing data_offsets")?;
        let s = offsets.first().and_then(|v| v.as_u64()).context("bad data_offsets")? as usize;
        let e = offsets.get(1).and_then(|v| v.as_u64()).context("bad data_offsets")? as usize;
        if s > e || self.data_start + e > self.bytes.len() {
            bail!("tensor '{name}' offsets [{s}, {e}) out of bounds");
        }
        Ok(&self.bytes[self.data_start + s..self.data_start + e])
    }
}
