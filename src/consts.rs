// handle generation
pub const HANDLE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
pub const HANDLE_LENGTH: usize = 12;

// user supplied path limits
pub const MAX_PATH_LENGTH: usize = 255;

// local disk layout
pub const COPY_BUFFER_SIZE: usize = 16 * 1024;
pub const DIR_MODE: u32 = 0o750;
pub const FILE_MODE: u32 = 0o640;

// defaults when the environment does not say otherwise
pub const DEFAULT_STORAGE_BASE_PATH: &str = "/var/lib/file-drop";
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 << 20;
pub const DEFAULT_RETENTION_SECONDS: i64 = 24 * 60 * 60;
pub const DEFAULT_CLEANUP_INTERVAL_SECONDS: i64 = 60 * 60;
pub const DEFAULT_S3_REGION: &str = "auto";

pub const STORAGE_TYPE_FILE_SYSTEM: &str = "file_system";
pub const STORAGE_TYPE_S3: &str = "s3";
