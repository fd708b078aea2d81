//! .ptm binary snapshot format for the model cache.
//!
//! A fixed little-endian header followed by a JSON payload mapping each
//! streamer name to its slope and intercept. Loads are all-or-nothing: any
//! structural problem is reported as [`TrackerError::CorruptPersistence`].

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use chrono::NaiveDate;

use crate::model_store::ModelStore;
use crate::regression::TrendModel;
use crate::types::{TrackerError, TrackerResult};
use crate::window::WindowPolicy;

/// Magic bytes: "PTMS"
const PTMS_MAGIC: u32 = 0x50544D53;

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 32;

/// Upper bound on the payload a header may announce.
const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

/// Writer for .ptm files.
pub struct ModelWriter;

/// Reader for .ptm files.
pub struct ModelReader;

impl ModelWriter {
    /// Write the model cache to a file, replacing any previous snapshot.
    pub fn write_to_file(store: &ModelStore, path: &Path) -> TrackerResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = std::fs::File::create(path)?;
        Self::write_to(store, &mut file)?;
        file.flush()?;
        tracing::debug!("Wrote {} models to {}", store.len(), path.display());
        Ok(())
    }

    /// Write the model cache to any writer.
    pub fn write_to<W: Write>(store: &ModelStore, writer: &mut W) -> TrackerResult<()> {
        // Sorted keys keep snapshots byte-stable across runs.
        let models: BTreeMap<&str, &TrendModel> =
            store.iter().map(|(name, model)| (name.as_str(), model)).collect();

        let payload = serde_json::to_vec(&SerializedModels {
            policy: store.policy(),
            fitted_on: store.fitted_on(),
            models,
        })
        .map_err(|e| TrackerError::CorruptPersistence(format!("Serialization failed: {e}")))?;

        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header[0..4], PTMS_MAGIC);
        write_u16(&mut header[4..6], FORMAT_VERSION);
        write_u16(&mut header[6..8], 0); // flags
        write_u64(&mut header[8..16], store.len() as u64);
        write_u64(&mut header[16..24], payload.len() as u64);

        writer.write_all(&header)?;
        writer.write_all(&payload)?;

        Ok(())
    }
}

impl ModelReader {
    /// Read a model cache from a file.
    pub fn read_from_file(path: &Path) -> TrackerResult<ModelStore> {
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Read a model cache from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> TrackerResult<ModelStore> {
        let mut header = [0u8; HEADER_SIZE];
        read_exact_or_corrupt(reader, &mut header, "header")?;

        let magic = read_u32(&header[0..4]);
        if magic != PTMS_MAGIC {
            return Err(TrackerError::CorruptPersistence(format!(
                "Invalid magic: expected 0x{PTMS_MAGIC:08X}, got 0x{magic:08X}"
            )));
        }

        let version = read_u16(&header[4..6]);
        if version != FORMAT_VERSION {
            return Err(TrackerError::CorruptPersistence(format!(
                "Unsupported version: {version}"
            )));
        }

        let model_count = read_u64(&header[8..16]);
        let payload_len = read_u64(&header[16..24]);
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(TrackerError::CorruptPersistence(format!(
                "Payload length {payload_len} exceeds limit"
            )));
        }

        let mut payload = vec![0u8; payload_len as usize];
        read_exact_or_corrupt(reader, &mut payload, "payload")?;

        let serialized: DeserializedModels = serde_json::from_slice(&payload)
            .map_err(|e| TrackerError::CorruptPersistence(format!("Deserialization failed: {e}")))?;

        if serialized.models.len() as u64 != model_count {
            return Err(TrackerError::CorruptPersistence(format!(
                "Header announces {model_count} models, payload has {}",
                serialized.models.len()
            )));
        }

        if let Some((name, _)) = serialized
            .models
            .iter()
            .find(|(_, m)| !m.slope.is_finite() || !m.intercept.is_finite())
        {
            return Err(TrackerError::CorruptPersistence(format!(
                "Non-finite coefficients for {name}"
            )));
        }

        serialized.policy.validate().map_err(|e| TrackerError::CorruptPersistence(e.to_string()))?;

        let mut store = ModelStore::with_models(serialized.policy, serialized.models);
        store.fitted_on = serialized.fitted_on;
        Ok(store)
    }
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> TrackerResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            TrackerError::CorruptPersistence(format!("Truncated {what}"))
        } else {
            TrackerError::Io(e)
        }
    })
}

#[derive(serde::Serialize)]
struct SerializedModels<'a> {
    policy: WindowPolicy,
    fitted_on: Option<NaiveDate>,
    models: BTreeMap<&'a str, &'a TrendModel>,
}

#[derive(serde::Deserialize)]
struct DeserializedModels {
    policy: WindowPolicy,
    #[serde(default)]
    fitted_on: Option<NaiveDate>,
    models: HashMap<String, TrendModel>,
}

// Little-endian byte helpers
fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}
