// Checkpoint — save and restore the variables of a tracked graph
//
// A save runs in three steps:
//
//   1. Guard:     `Graph::check_consistency(root)` validates every reachable
//                 wrapper. Any failure aborts before the backend is touched.
//   2. Enumerate: `Graph::variable_paths(root, separator)` names every
//                 reachable variable by its traversal path, e.g.
//                 "layer_list/0/kernel".
//   3. Write:     the named records go to a `CheckpointIo` backend in one call.
//
// A restore reads the records back, matches them to the graph's current
// paths, checks every record's element count and every matched shape before
// writing anything, and then overwrites the matched variables through
// `VariableBackend::set_value`. A restore that fails writes nothing.
//
// Keys must be unique on both sides. Names containing the separator are
// escaped by `variable_paths`; a save whose keys still collide (e.g. with an
// empty separator) is refused.
//
// Binary checkpoint format (.tndr), written by `BinaryIo`:
//
//   Header:
//     magic:   [u8; 4]  = b"TNDR"
//     version: u32 LE   = 1
//     count:   u32 LE   = number of records
//
//   For each record:
//     key_len:  u32 LE
//     key:      [u8; key_len]  (UTF-8, traversal path)
//     dtype:    u8             (0=F32, 1=F64, 2=F16, 3=BF16)
//     ndim:     u32 LE
//     dims:     [u32 LE; ndim]
//     data_len: u64 LE         (in bytes)
//     data:     [u8; data_len] (raw little-endian typed data)
//
// Usage:
//   checkpoint::save("model.tndr", &mut graph, model)?;
//   let status = checkpoint::restore("model.tndr", &mut graph, model)?;
//   status.assert_consumed()?;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use tendril_core::{DType, Error, Graph, ObjectId, Result, VariableBackend, VariableId};

const MAGIC: &[u8; 4] = b"TNDR";
const VERSION: u32 = 1;

/// One saved variable: shape, storage dtype, and values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub data: Vec<f64>,
}

/// Storage collaborator for checkpoints.
///
/// A backend receives the complete, ordered list of named records in one
/// `write` call; the binary layout is its own business.
pub trait CheckpointIo {
    fn write(&mut self, path: &Path, records: &[(String, Record)]) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<(String, Record)>>;
}

// Settings

/// Options for [`Checkpointer`].
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Joins traversal path segments into record keys.
    pub separator: String,
    /// Fail a restore that leaves variables or records unmatched.
    pub strict: bool,
    /// Write every record in this dtype instead of the variable's own.
    pub storage_dtype: Option<DType>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            separator: "/".to_string(),
            strict: false,
            storage_dtype: None,
        }
    }
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn storage_dtype(mut self, dtype: DType) -> Self {
        self.storage_dtype = Some(dtype);
        self
    }
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStatus {
    /// Number of variables overwritten from the checkpoint.
    pub restored: usize,
    /// Graph paths with no record in the checkpoint.
    pub missing: Vec<String>,
    /// Checkpoint records that matched no graph path.
    pub unused: Vec<String>,
}

impl RestoreStatus {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unused.is_empty()
    }

    /// Error unless every variable was restored and every record used.
    pub fn assert_consumed(&self) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        Err(Error::msg(format!(
            "checkpoint not fully consumed: missing {:?}, unused {:?}",
            self.missing, self.unused
        )))
    }
}

// Save / restore

/// A checkpoint backend plus the options used with it.
#[derive(Debug, Default)]
pub struct Checkpointer<I: CheckpointIo> {
    io: I,
    config: CheckpointConfig,
}

impl<I: CheckpointIo> Checkpointer<I> {
    pub fn new(io: I) -> Self {
        Checkpointer {
            io,
            config: CheckpointConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CheckpointConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    /// Validate the graph, then write every reachable variable to `path`.
    /// Returns the number of records written.
    pub fn save(&mut self, graph: &mut Graph, root: ObjectId, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        graph.check_consistency(root)?;
        let records = self.collect(graph, root)?;
        self.io.write(path, &records)?;
        info!(
            path = %path.display(),
            root = %graph.describe(root),
            variables = records.len(),
            "saved checkpoint"
        );
        Ok(records.len())
    }

    /// Overwrite the variables reachable from `root` with the records at
    /// `path`, matched by traversal path.
    pub fn restore(
        &self,
        graph: &mut Graph,
        root: ObjectId,
        path: impl AsRef<Path>,
    ) -> Result<RestoreStatus> {
        let path = path.as_ref();
        let mut records: HashMap<String, Record> = HashMap::new();
        for (key, record) in self.io.read(path)? {
            check_record(&key, &record)?;
            if records.contains_key(&key) {
                return Err(Error::msg(format!(
                    "checkpoint {} holds more than one record for '{key}'",
                    path.display()
                )));
            }
            records.insert(key, record);
        }
        let targets = checkpoint_keys(graph, root, &self.config.separator)?;

        let mut matched = Vec::new();
        let mut status = RestoreStatus::default();
        let mut used = HashSet::new();
        for (key, var) in targets {
            let Some(record) = records.get(&key) else {
                status.missing.push(key);
                continue;
            };
            let shape = graph.variable(var)?.shape();
            if shape != record.shape.as_slice() {
                return Err(Error::ShapeMismatch {
                    name: key,
                    expected: shape.to_vec(),
                    got: record.shape.clone(),
                });
            }
            used.insert(key.clone());
            matched.push((var, record));
        }
        status.unused = records
            .keys()
            .filter(|k| !used.contains(*k))
            .cloned()
            .collect();
        status.unused.sort();

        if self.config.strict {
            status.assert_consumed()?;
        } else if !status.is_complete() {
            warn!(
                path = %path.display(),
                missing = ?status.missing,
                unused = ?status.unused,
                "checkpoint does not match the graph exactly"
            );
        }

        for (var, record) in matched {
            graph.set_value(var, &record.data)?;
            status.restored += 1;
        }
        info!(path = %path.display(), restored = status.restored, "restored checkpoint");
        Ok(status)
    }

    fn collect(&self, graph: &Graph, root: ObjectId) -> Result<Vec<(String, Record)>> {
        checkpoint_keys(graph, root, &self.config.separator)?
            .into_iter()
            .map(|(key, var)| {
                let v = graph.variable(var)?;
                let dtype = self.config.storage_dtype.unwrap_or(v.dtype());
                let record = Record {
                    shape: v.shape().to_vec(),
                    dtype,
                    data: v.values().iter().map(|&x| dtype.quantize(x)).collect(),
                };
                Ok((key, record))
            })
            .collect()
    }
}

/// Traversal paths of every variable under `root`, which must all differ.
fn checkpoint_keys(
    graph: &Graph,
    root: ObjectId,
    separator: &str,
) -> Result<Vec<(String, VariableId)>> {
    let paths = graph.variable_paths(root, separator)?;
    let mut seen = HashSet::new();
    for (key, _) in &paths {
        if !seen.insert(key.clone()) {
            return Err(Error::msg(format!(
                "two variables map to the checkpoint key '{key}' with separator '{separator}'"
            )));
        }
    }
    Ok(paths)
}

/// Reject a record whose data does not fill its shape.
pub(crate) fn check_record(key: &str, record: &Record) -> Result<()> {
    let expected: usize = record.shape.iter().product();
    if record.data.len() != expected {
        return Err(Error::ElementCountMismatch {
            name: key.to_string(),
            expected,
            got: record.data.len(),
        });
    }
    Ok(())
}

/// Save the variables reachable from `root` to a `.tndr` file.
pub fn save(path: impl AsRef<Path>, graph: &mut Graph, root: ObjectId) -> Result<usize> {
    Checkpointer::new(BinaryIo).save(graph, root, path)
}

/// Restore the variables reachable from `root` from a `.tndr` file.
pub fn restore(path: impl AsRef<Path>, graph: &mut Graph, root: ObjectId) -> Result<RestoreStatus> {
    Checkpointer::new(BinaryIo).restore(graph, root, path)
}

// Typed element encoding, shared with the safetensors backend

pub(crate) fn encode_values(dtype: DType, data: &[f64]) -> Vec<u8> {
    match dtype {
        DType::F16 => data
            .iter()
            .flat_map(|&v| half::f16::from_f64(v).to_le_bytes())
            .collect(),
        DType::BF16 => data
            .iter()
            .flat_map(|&v| half::bf16::from_f64(v).to_le_bytes())
            .collect(),
        DType::F32 => data
            .iter()
            .flat_map(|&v| (v as f32).to_le_bytes())
            .collect(),
        DType::F64 => data.iter().flat_map(|&v| v.to_le_bytes()).collect(),
    }
}

pub(crate) fn decode_values(dtype: DType, bytes: &[u8]) -> Result<Vec<f64>> {
    let size = dtype.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(Error::msg(format!(
            "{} bytes is not a whole number of {dtype} elements",
            bytes.len()
        )));
    }
    Ok(match dtype {
        DType::F16 => bytes
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f64())
            .collect(),
        DType::BF16 => bytes
            .chunks_exact(2)
            .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f64())
            .collect(),
        DType::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        DType::F64 => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    })
}

fn dtype_to_u8(dtype: DType) -> u8 {
    match dtype {
        DType::F32 => 0,
        DType::F64 => 1,
        DType::F16 => 2,
        DType::BF16 => 3,
    }
}

fn u8_to_dtype(v: u8) -> Result<DType> {
    match v {
        0 => Ok(DType::F32),
        1 => Ok(DType::F64),
        2 => Ok(DType::F16),
        3 => Ok(DType::BF16),
        _ => Err(Error::msg(format!("Unknown dtype tag: {v}"))),
    }
}

// Low-level IO helpers

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u8(r: &mut impl Read) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_bytes(r: &mut impl Read, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Write records in the `.tndr` format.
pub fn write_records(writer: &mut impl Write, records: &[(String, Record)]) -> Result<()> {
    writer.write_all(MAGIC)?;
    write_u32(writer, VERSION)?;
    write_u32(writer, records.len() as u32)?;

    for (key, record) in records {
        let key_bytes = key.as_bytes();
        write_u32(writer, key_bytes.len() as u32)?;
        writer.write_all(key_bytes)?;

        writer.write_all(&[dtype_to_u8(record.dtype)])?;

        write_u32(writer, record.shape.len() as u32)?;
        for &d in &record.shape {
            write_u32(writer, d as u32)?;
        }

        let data = encode_values(record.dtype, &record.data);
        write_u64(writer, data.len() as u64)?;
        writer.write_all(&data)?;
    }
    Ok(())
}

/// Read records in the `.tndr` format.
pub fn read_records(reader: &mut impl Read) -> Result<Vec<(String, Record)>> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::msg(format!(
            "Invalid checkpoint: expected magic {:?}, got {:?}",
            MAGIC, magic
        )));
    }

    let version = read_u32(reader)?;
    if version != VERSION {
        return Err(Error::msg(format!(
            "Unsupported checkpoint version: {} (expected {})",
            version, VERSION
        )));
    }

    let count = read_u32(reader)? as usize;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let key_len = read_u32(reader)? as usize;
        let key = String::from_utf8(read_bytes(reader, key_len)?)
            .map_err(|e| Error::msg(format!("Invalid UTF-8 key: {e}")))?;

        let dtype = u8_to_dtype(read_u8(reader)?)?;

        let ndim = read_u32(reader)? as usize;
        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            shape.push(read_u32(reader)? as usize);
        }

        let data_len = read_u64(reader)? as usize;
        let data = decode_values(dtype, &read_bytes(reader, data_len)?)?;
        let record = Record { shape, dtype, data };
        check_record(&key, &record)?;
        records.push((key, record));
    }
    Ok(records)
}

/// Serialize records to an in-memory `.tndr` buffer.
pub fn to_bytes(records: &[(String, Record)]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;
    Ok(buf)
}

/// Deserialize records from an in-memory `.tndr` buffer.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<(String, Record)>> {
    read_records(&mut Cursor::new(bytes))
}

// Backends

/// `.tndr` files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryIo;

impl CheckpointIo for BinaryIo {
    fn write(&mut self, path: &Path, records: &[(String, Record)]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write_records(&mut writer, records)?;
        writer.flush()?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<(String, Record)>> {
        let mut reader = BufReader::new(File::open(path)?);
        read_records(&mut reader)
    }
}

/// Keeps `.tndr`-encoded checkpoints in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryIo {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl CheckpointIo for MemoryIo {
    fn write(&mut self, path: &Path, records: &[(String, Record)]) -> Result<()> {
        let bytes = to_bytes(records)?;
        self.files.insert(path.to_path_buf(), bytes);
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<(String, Record)>> {
        let bytes = self.files.get(path).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no checkpoint at {}", path.display()),
            ))
        })?;
        from_bytes(bytes)
    }
}
