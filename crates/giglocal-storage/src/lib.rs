pub mod storage;

pub use storage::{
    sanitize_key, sniff_content_type, AssetStore, LocalAssetStore, S3AssetStore, StorageError,
};
