use quick_error::quick_error;

use crate::path::PathError;

mod backend;
mod file_system;
mod object_client;
mod object_store;

// forwarding declarations
pub use backend::{ByteStream, ObjectInfo, StorageBackend, SweepReport};
pub use file_system::FileSystem;
pub use object_client::{
    InMemoryObjectClient, ObjectClient, ObjectPage, ObjectSummary, S3Client, S3Settings,
};
pub use object_store::{RemoteObjectStore, S3ObjectStore};

quick_error! {
    #[derive(Debug, PartialEq)]
    pub enum StorageError {
        InvalidPath(err: PathError) {
            from()
            display("invalid path: {}", err)
        }
        SizeExceeded(limit: u64) {
            display("upload exceeds the maximum size of {} bytes", limit)
        }
        NotFound(key: String) {
            display("{} not found", key)
        }
        ForbiddenRoot(path: String) {
            display("refusing to delete the storage root {}", path)
        }
        IoError(message: String) {
            display("{}", message)
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
