use quick_error::quick_error;

use crate::path::PathError;
use crate::storage::StorageError;

quick_error! {
    #[derive(Debug)]
    pub enum DropError {
        Storage(err: StorageError) {
            from()
            from(err: PathError) -> (StorageError::InvalidPath(err))
            display("{}", err)
        }
        Unauthorized {
            display("unauthorized")
        }
        InvalidArgument(message: String) {
            display("invalid argument: {}", message)
        }
        InvalidApplicationState(message: String) {
            display("invalid application state: {}", message)
        }
    }
}

pub type Result<T> = std::result::Result<T, DropError>;

impl DropError {
    /// HTTP status the boundary layer should answer with. Caller mistakes map
    /// to 4xx, storage and set-up failures to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            DropError::Storage(StorageError::InvalidPath(_)) => 400,
            DropError::Storage(StorageError::SizeExceeded(_)) => 413,
            DropError::Storage(StorageError::NotFound(_)) => 404,
            DropError::Storage(StorageError::ForbiddenRoot(_)) => 403,
            DropError::Storage(StorageError::IoError(_)) => 500,
            DropError::Unauthorized => 401,
            DropError::InvalidArgument(_) => 400,
            DropError::InvalidApplicationState(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
