use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;
use vault_storage::{FilesystemBackend, MemoryBackend, ObjectStore};

/// Generate deterministic test data from a seed.
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Every backend under test. The TempDir must outlive the filesystem store.
pub async fn all_backends() -> (TempDir, Vec<Arc<dyn ObjectStore>>) {
    let dir = TempDir::new().unwrap();
    let fs = FilesystemBackend::new(dir.path().join("store")).await.unwrap();
    let backends: Vec<Arc<dyn ObjectStore>> = vec![Arc::new(fs), Arc::new(MemoryBackend::new())];
    (dir, backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(42, 1000);
        assert_eq!(data1, data2);
    }

    #[test]
    fn test_seeded_bytes_different_seeds() {
        let data1 = seeded_bytes(42, 1000);
        let data2 = seeded_bytes(43, 1000);
        assert_ne!(data1, data2);
    }
}
