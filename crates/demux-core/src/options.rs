// crates/demux-core/src/options.rs
//
// Host-supplied knobs, set once at Cache construction. Mirrors the option
// table: no env/config-file parsing here, the embedder just builds one of
// these directly.

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Target forward read-ahead duration per active stream, in seconds.
    pub readahead_secs: f64,
    /// Hard cap on total forward bytes across all streams.
    pub max_bytes: usize,
    /// Back-buffer byte cap. 0 disables back-buffer retention entirely.
    pub max_bytes_bw: usize,
    /// Extra read-ahead applied on top of `readahead_secs` for network/cached
    /// sources. The producer-adapter doesn't distinguish local vs network
    /// inputs, so this defaults to 0.0 and is provided for embedders that do.
    pub cache_secs: f64,
    /// Treat a non-seekable source as partially seekable (forces real-seek
    /// attempts the producer would otherwise refuse).
    pub force_seekable: bool,
    /// Enable in-cache seek planning and seek-range reporting.
    pub seekable_cache: bool,
    /// Pre-create a closed-caption sidecar queue for every video stream.
    pub sub_create_cc_track: bool,
    /// Newly added streams are selected by default.
    pub autoselect: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            readahead_secs: 1.0,
            max_bytes: 400 * 1024 * 1024,
            max_bytes_bw: 0,
            cache_secs: 0.0,
            force_seekable: false,
            seekable_cache: false,
            sub_create_cc_track: false,
            autoselect: true,
        }
    }
}
