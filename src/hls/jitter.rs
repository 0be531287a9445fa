//! AAC timestamp smoothing
//!
//! Millisecond audio timestamps lose precision at rates like 44.1 kHz. Audio
//! PES timestamps are re-estimated from the number of buffered access units
//! while the estimate stays close to the incoming pts.

use crate::codec::aac::SAMPLES_PER_FRAME;

pub struct AacJitter {
    base_pts: i64,
    nb_samples: i64,
    sync_ms: u32,
}

impl AacJitter {
    /// `sync_ms` is the tolerance; 0 disables correction
    pub fn new(sync_ms: u32) -> Self {
        Self {
            base_pts: 0,
            nb_samples: 0,
            sync_ms,
        }
    }

    /// Corrected pts (90 kHz) for the first access unit of a buffer
    pub fn on_buffer_start(&mut self, pts: i64, sample_rate: u32) -> i64 {
        if self.sync_ms == 0 || sample_rate == 0 {
            return pts;
        }

        let est = self.base_pts
            + self.nb_samples * 90_000 * SAMPLES_PER_FRAME as i64 / sample_rate as i64;
        let tolerance = self.sync_ms as i64 * 90;
        if (est - pts).abs() <= tolerance {
            self.nb_samples += 1;
            return est;
        }

        // Resync
        self.base_pts = pts;
        self.nb_samples = 1;
        pts
    }

    /// Another access unit appended to the buffer
    pub fn on_buffer_continue(&mut self) {
        self.nb_samples += 1;
    }
}

impl Default for AacJitter {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimates_within_tolerance() {
        let mut jitter = AacJitter::default();

        assert_eq!(jitter.on_buffer_start(90_000, 44_100), 90_000);
        // One frame later: 1024 * 90000 / 44100 = 2089.79
        assert_eq!(jitter.on_buffer_start(92_070, 44_100), 92_089);
        jitter.on_buffer_continue();
        // 3 * 1024 * 90000 / 44100 = 6269.38
        assert_eq!(jitter.on_buffer_start(96_300, 44_100), 96_269);
    }

    #[test]
    fn test_resync_on_large_gap() {
        let mut jitter = AacJitter::new(100);
        jitter.on_buffer_start(0, 48_000);

        // 1 second gap is far outside ±9000 ticks
        assert_eq!(jitter.on_buffer_start(90_000, 48_000), 90_000);
        assert_eq!(jitter.on_buffer_start(91_900, 48_000), 91_920);
    }

    #[test]
    fn test_disabled() {
        let mut jitter = AacJitter::new(0);
        assert_eq!(jitter.on_buffer_start(12_345, 44_100), 12_345);
        assert_eq!(jitter.on_buffer_start(12_346, 44_100), 12_346);
    }
}
