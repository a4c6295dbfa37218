use std::time::Duration;

/// Page size shared by the WAL and the paged tree file.
pub const PAGE_SIZE: usize = 8192;
/// Number of WAL pages held in the in-memory ring (1 MiB).
pub const RING_PAGES: usize = 128;
/// Maximum number of keys a leaf or node page may hold.
pub const MAX_DEGREE: usize = 16;
/// Maximum length, in bytes, of a user-supplied key.
pub const MAX_KEY_SIZE: usize = 1024;

/// Tunables that are not baked into the on-disk layout.
///
/// `page_size`/`ring_pages`/`max_degree`/`max_key_size` are exposed for
/// documentation and tests but are not runtime-variable: changing them
/// would change the wire format, so callers should treat the associated
/// constants as the source of truth.
#[derive(Debug, Clone)]
pub struct Config {
    pub page_size: usize,
    pub ring_pages: usize,
    pub max_degree: usize,
    pub max_key_size: usize,
    pub sync_interval: Duration,
    pub upgrade_retry_interval: Duration,
    pub upgrade_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: PAGE_SIZE,
            ring_pages: RING_PAGES,
            max_degree: MAX_DEGREE,
            max_key_size: MAX_KEY_SIZE,
            sync_interval: Duration::from_secs(5),
            upgrade_retry_interval: Duration::from_millis(123),
            upgrade_max_attempts: 11,
        }
    }
}
