//! Archive encodings.
//!
//! # Formats
//!
//! ```text
//! json: pretty-printed serde_json
//! bin:  bincode
//! lz4:  [u32 LE uncompressed length][LZ4 block of the bincode payload]
//! ```

use crate::ArchiveError;
use mcrun_types::ArchiveFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode `value` in `format`.
pub fn encode<T: Serialize>(value: &T, format: ArchiveFormat) -> Result<Vec<u8>, ArchiveError> {
    match format {
        ArchiveFormat::Json => {
            serde_json::to_vec_pretty(value).map_err(|e| ArchiveError::Encode(e.to_string()))
        }
        ArchiveFormat::Bin => {
            bincode::serialize(value).map_err(|e| ArchiveError::Encode(e.to_string()))
        }
        ArchiveFormat::Lz4 => {
            let payload =
                bincode::serialize(value).map_err(|e| ArchiveError::Encode(e.to_string()))?;
            Ok(lz4_flex::compress_prepend_size(&payload))
        }
    }
}

/// Decode a value previously written with [`encode`] in `format`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], format: ArchiveFormat) -> Result<T, ArchiveError> {
    if bytes.is_empty() {
        return Err(ArchiveError::Decode {
            format,
            reason: "empty archive".to_string(),
        });
    }
    let decode_error = |reason: String| ArchiveError::Decode { format, reason };

    match format {
        ArchiveFormat::Json => serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string())),
        ArchiveFormat::Bin => bincode::deserialize(bytes).map_err(|e| decode_error(e.to_string())),
        ArchiveFormat::Lz4 => {
            check_lz4_header(bytes).map_err(decode_error)?;
            let payload = lz4_flex::decompress_size_prepended(bytes)
                .map_err(|e| decode_error(e.to_string()))?;
            bincode::deserialize(&payload).map_err(|e| decode_error(e.to_string()))
        }
    }
}

/// LZ4 cannot expand data by more than this factor.
const LZ4_MAX_RATIO: usize = 255;

/// Reject size headers no LZ4 block of this length could produce, before
/// the decompressor allocates for them.
fn check_lz4_header(bytes: &[u8]) -> Result<(), String> {
    let header: [u8; 4] = bytes
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| "truncated size header".to_string())?;
    let size = u32::from_le_bytes(header) as usize;
    if size > (bytes.len() - 4).saturating_mul(LZ4_MAX_RATIO) + 16 {
        return Err(format!("corrupt size header ({size} bytes)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcrun_types::SimulationState;

    #[test]
    fn test_lz4_is_compressed_bincode() {
        let state = SimulationState::fresh("a".repeat(512), ArchiveFormat::Lz4);
        let packed = encode(&state, ArchiveFormat::Lz4).unwrap();
        let plain = encode(&state, ArchiveFormat::Bin).unwrap();
        assert!(packed.len() < plain.len());
        assert_eq!(decode::<SimulationState>(&packed, ArchiveFormat::Lz4).unwrap(), state);
    }

    #[test]
    fn test_wrong_format_is_an_error() {
        let state = SimulationState::default();
        let json = encode(&state, ArchiveFormat::Json).unwrap();
        let err = decode::<SimulationState>(&json, ArchiveFormat::Bin).unwrap_err();
        assert!(matches!(err, ArchiveError::Decode { format: ArchiveFormat::Bin, .. }));

        let err = decode::<SimulationState>(&json, ArchiveFormat::Lz4).unwrap_err();
        assert!(err.to_string().contains("corrupt size header"));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(decode::<SimulationState>(&[], ArchiveFormat::Bin).is_err());
    }
}
