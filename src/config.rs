//! Relay configuration

use std::path::PathBuf;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Enable GOP caching for late-joiner support
    pub cache_gop: bool,

    /// Segment H.264 streams for HLS
    pub hls: bool,

    /// Target HLS segment duration in seconds
    pub hls_fragment: u32,

    /// Directory for HLS segment files (None = keep segments in memory)
    pub hls_segment_path: Option<PathBuf>,

    /// Number of segments kept in the published playlist
    pub hls_remain_segments: usize,

    /// AAC timestamp jitter tolerance in milliseconds (0 = no correction)
    pub aac_sync_ms: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cache_gop: true,
            hls: true,
            hls_fragment: 5,
            hls_segment_path: None,
            hls_remain_segments: 3,
            aac_sync_ms: 100,
        }
    }
}

impl RelayConfig {
    /// Disable GOP caching
    pub fn disable_gop_cache(mut self) -> Self {
        self.cache_gop = false;
        self
    }

    /// Do not produce HLS output
    pub fn disable_hls(mut self) -> Self {
        self.hls = false;
        self
    }

    /// Set the target HLS segment duration (seconds, at least 1)
    pub fn hls_fragment(mut self, secs: u32) -> Self {
        self.hls_fragment = secs.max(1);
        self
    }

    /// Store HLS segments as files under `dir`
    pub fn hls_segment_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hls_segment_path = Some(dir.into());
        self
    }

    /// Set how many segments the playlist keeps
    pub fn hls_remain_segments(mut self, count: usize) -> Self {
        self.hls_remain_segments = count.max(1);
        self
    }

    /// Set the AAC jitter tolerance
    pub fn aac_sync_ms(mut self, ms: u32) -> Self {
        self.aac_sync_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert!(config.cache_gop);
        assert!(config.hls);
        assert_eq!(config.hls_fragment, 5);
        assert!(config.hls_segment_path.is_none());
        assert_eq!(config.hls_remain_segments, 3);
        assert_eq!(config.aac_sync_ms, 100);
    }

    #[test]
    fn test_builder_disable_gop_cache() {
        let config = RelayConfig::default().disable_gop_cache();

        assert!(!config.cache_gop);
    }

    #[test]
    fn test_builder_hls_fragment_floor() {
        // Zero-length fragments would rotate on every keyframe
        let config = RelayConfig::default().hls_fragment(0);

        assert_eq!(config.hls_fragment, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .hls_fragment(2)
            .hls_segment_path("/tmp/hls")
            .hls_remain_segments(5)
            .aac_sync_ms(0)
            .disable_hls()
            .disable_gop_cache();

        assert_eq!(config.hls_fragment, 2);
        assert_eq!(config.hls_segment_path, Some(PathBuf::from("/tmp/hls")));
        assert_eq!(config.hls_remain_segments, 5);
        assert_eq!(config.aac_sync_ms, 0);
        assert!(!config.hls);
        assert!(!config.cache_gop);
    }
}
