// =============================================================================
// Safetensors — interoperable checkpoint backend
// =============================================================================
//
// The safetensors format stores tensors in a single flat file:
//
//   ┌──────────────┬──────────────────────┬───────────────────────┐
//   │ 8 bytes      │ N bytes              │ raw data bytes        │
//   │ header size  │ JSON header (UTF-8)  │ (contiguous, LE)      │
//   │ (u64 LE)     │                      │                       │
//   └──────────────┴──────────────────────┴───────────────────────┘
//
// JSON header example:
//   {
//     "__metadata__": { "format": "tendril" },
//     "layer_list/0/kernel": {
//       "dtype": "F32",
//       "shape": [2, 3],
//       "data_offsets": [0, 24]
//     }
//   }
//
// Keys are the traversal paths produced by `Graph::variable_paths`, so a
// file written here can be read by any safetensors loader.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;

use serde_json::{json, Map, Value as Json};

use tendril_core::{DType, Error, Result};

use crate::checkpoint::{check_record, decode_values, encode_values, CheckpointIo, Record};

const MAX_HEADER_BYTES: usize = 100_000_000;

// ─────────────────────────────────────────────────────────────────────────────
// DType ↔ safetensors string
// ─────────────────────────────────────────────────────────────────────────────

fn dtype_to_st(dtype: DType) -> &'static str {
    match dtype {
        DType::F16 => "F16",
        DType::BF16 => "BF16",
        DType::F32 => "F32",
        DType::F64 => "F64",
    }
}

fn st_to_dtype(s: &str) -> Result<DType> {
    match s {
        "F16" => Ok(DType::F16),
        "BF16" => Ok(DType::BF16),
        "F32" => Ok(DType::F32),
        "F64" => Ok(DType::F64),
        other => Err(Error::msg(format!("safetensors: unsupported dtype '{other}'"))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Header
// ─────────────────────────────────────────────────────────────────────────────

struct Entry {
    name: String,
    dtype: DType,
    shape: Vec<usize>,
    start: usize,
    end: usize,
}

fn build_header(entries: &[Entry]) -> String {
    let mut header = Map::new();
    header.insert("__metadata__".to_string(), json!({ "format": "tendril" }));
    for e in entries {
        header.insert(
            e.name.clone(),
            json!({
                "dtype": dtype_to_st(e.dtype),
                "shape": e.shape,
                "data_offsets": [e.start, e.end],
            }),
        );
    }
    Json::Object(header).to_string()
}

fn parse_header(json_str: &str) -> Result<Vec<Entry>> {
    let value: Json = serde_json::from_str(json_str)
        .map_err(|e| Error::msg(format!("safetensors: invalid JSON header: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| Error::msg("safetensors: header is not a JSON object"))?;

    let mut entries = Vec::new();
    for (key, val) in obj {
        if key == "__metadata__" {
            continue;
        }
        let field = |name: &str| {
            val.get(name)
                .ok_or_else(|| Error::msg(format!("safetensors: '{key}' missing {name}")))
        };
        let dtype = field("dtype")?
            .as_str()
            .ok_or_else(|| Error::msg(format!("safetensors: '{key}' dtype is not a string")))
            .and_then(st_to_dtype)?;
        let shape = as_usizes(field("shape")?, key)?;
        let offsets = as_usizes(field("data_offsets")?, key)?;
        let [start, end] = offsets[..] else {
            return Err(Error::msg(format!(
                "safetensors: '{key}' data_offsets must have exactly 2 elements"
            )));
        };
        if end < start {
            return Err(Error::msg(format!("safetensors: '{key}' has inverted offsets")));
        }
        entries.push(Entry {
            name: key.clone(),
            dtype,
            shape,
            start,
            end,
        });
    }
    Ok(entries)
}

fn as_usizes(value: &Json, key: &str) -> Result<Vec<usize>> {
    value
        .as_array()
        .ok_or_else(|| Error::msg(format!("safetensors: '{key}' expected an array")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| Error::msg(format!("safetensors: '{key}' expected integers")))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Read / write
// ─────────────────────────────────────────────────────────────────────────────

/// Write records in safetensors format.
pub fn write_safetensors(writer: &mut impl Write, records: &[(String, Record)]) -> Result<()> {
    let mut all_data: Vec<u8> = Vec::new();
    let mut entries = Vec::with_capacity(records.len());
    for (name, record) in records {
        let bytes = encode_values(record.dtype, &record.data);
        let start = all_data.len();
        all_data.extend_from_slice(&bytes);
        entries.push(Entry {
            name: name.clone(),
            dtype: record.dtype,
            shape: record.shape.clone(),
            start,
            end: all_data.len(),
        });
    }

    let header = build_header(&entries);
    writer.write_all(&(header.len() as u64).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    writer.write_all(&all_data)?;
    Ok(())
}

/// Read records from safetensors format.
pub fn read_safetensors(reader: &mut impl Read) -> Result<Vec<(String, Record)>> {
    let mut size_buf = [0u8; 8];
    reader.read_exact(&mut size_buf)?;
    let header_size = u64::from_le_bytes(size_buf) as usize;
    if header_size > MAX_HEADER_BYTES {
        return Err(Error::msg(format!(
            "safetensors: header size {header_size} bytes is unreasonably large"
        )));
    }

    let mut header_bytes = vec![0u8; header_size];
    reader.read_exact(&mut header_bytes)?;
    let header = std::str::from_utf8(&header_bytes)
        .map_err(|e| Error::msg(format!("safetensors: invalid UTF-8 header: {e}")))?;
    let entries = parse_header(header)?;

    let data_len = entries.iter().map(|e| e.end).max().unwrap_or(0);
    let mut all_data = vec![0u8; data_len];
    reader.read_exact(&mut all_data)?;

    entries
        .into_iter()
        .map(|e| {
            let data = decode_values(e.dtype, &all_data[e.start..e.end])?;
            let record = Record {
                shape: e.shape,
                dtype: e.dtype,
                data,
            };
            check_record(&e.name, &record)?;
            Ok((e.name, record))
        })
        .collect()
}

pub fn to_bytes(records: &[(String, Record)]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_safetensors(&mut buf, records)?;
    Ok(buf)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Vec<(String, Record)>> {
    read_safetensors(&mut Cursor::new(bytes))
}

/// `.safetensors` files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsIo;

impl CheckpointIo for SafetensorsIo {
    fn write(&mut self, path: &Path, records: &[(String, Record)]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write_safetensors(&mut writer, records)?;
        writer.flush()?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<(String, Record)>> {
        let mut reader = BufReader::new(File::open(path)?);
        read_safetensors(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut records: Vec<(String, Record)>) -> Vec<(String, Record)> {
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    #[test]
    fn test_roundtrip() {
        let records = vec![
            (
                "model/kernel".to_string(),
                Record {
                    shape: vec![2, 2],
                    dtype: DType::F32,
                    data: vec![1.0, 2.0, 3.0, 4.0],
                },
            ),
            (
                "model/bias".to_string(),
                Record {
                    shape: vec![2],
                    dtype: DType::F16,
                    data: vec![0.5, -0.5],
                },
            ),
        ];
        let bytes = to_bytes(&records).unwrap();
        assert_eq!(sorted(from_bytes(&bytes).unwrap()), sorted(records));
    }

    #[test]
    fn test_header_format() {
        let records = vec![(
            "w".to_string(),
            Record {
                shape: vec![3],
                dtype: DType::F64,
                data: vec![0.0; 3],
            },
        )];
        let bytes = to_bytes(&records).unwrap();
        let size = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        let header: Json = serde_json::from_slice(&bytes[8..8 + size]).unwrap();
        assert_eq!(header["w"]["dtype"], "F64");
        assert_eq!(header["w"]["data_offsets"], json!([0, 24]));
        assert_eq!(header["__metadata__"]["format"], "tendril");
    }

    #[test]
    fn test_empty() {
        let bytes = to_bytes(&[]).unwrap();
        assert!(from_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_data_that_does_not_fill_shape() {
        let header = r#"{"w":{"dtype":"F32","shape":[3],"data_offsets":[0,8]}}"#;
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        let err = from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::ElementCountMismatch { expected: 3, got: 2, .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_dtype() {
        let header = r#"{"w":{"dtype":"I64","shape":[1],"data_offsets":[0,8]}}"#;
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(from_bytes(&bytes).is_err());
    }
}
