// Fixed-order binary records for blocks, transactions and index entries.
// Field order follows struct declaration order, so any layout change is a
// storage format change.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Serialize a record with the standard bincode configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, config())
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize a record, rejecting trailing bytes
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, read) = bincode::decode_from_slice(bytes, config())
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "Deserialization left {} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Record {
        hash: Vec<u8>,
        height: usize,
        timestamp: i64,
    }

    #[test]
    fn test_serialize_deserialize() {
        let original = Record {
            hash: vec![7; 32],
            height: 42,
            timestamp: -1,
        };

        let bytes = serialize(&original).expect("Serialization should work");
        let decoded: Record = deserialize(&bytes).expect("Deserialization should work");
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let mut bytes = serialize(&vec![1u8, 2, 3]).unwrap();
        bytes.push(0);
        let result: Result<Vec<u8>> = deserialize(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Record> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
