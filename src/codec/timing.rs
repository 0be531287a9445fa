//! Muxer timestamps shared by the FLV and MPEG-TS outputs
//!
//! Video dts is synthesized: it starts at [`DTS_DELAY`] and advances by one
//! frame interval per frame. pts is the frame's absolute time relative to
//! the first frame seen plus [`PTS_DELAY`], never below dts. Everything is in
//! milliseconds.

/// First video dts
pub const DTS_DELAY: f64 = 200.0;
/// Presentation delay
pub const PTS_DELAY: i64 = 1000;
/// Assumed when the SPS carries no timing info
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Milliseconds per frame
pub fn frame_interval(frame_rate: f64) -> f64 {
    let rate = if frame_rate > 0.0 {
        frame_rate
    } else {
        DEFAULT_FRAME_RATE
    };
    1000.0 / rate
}

/// Per-stream timestamp state of a muxer
#[derive(Debug, Clone)]
pub struct MuxClock {
    base: Option<i64>,
    next_dts: f64,
    step: f64,
}

impl MuxClock {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            base: None,
            next_dts: DTS_DELAY,
            step: frame_interval(frame_rate),
        }
    }

    /// Take the first absolute time seen as the base
    pub fn start(&mut self, abs_timestamp: i64) {
        self.base.get_or_insert(abs_timestamp);
    }

    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.step = frame_interval(frame_rate);
    }

    pub fn pts(&mut self, abs_timestamp: i64) -> i64 {
        let base = *self.base.get_or_insert(abs_timestamp);
        abs_timestamp - base + PTS_DELAY
    }

    /// `(dts, pts)` of the next video frame
    pub fn next_video(&mut self, abs_timestamp: i64) -> (i64, i64) {
        let dts = self.next_dts as i64;
        self.next_dts += self.step;
        (dts, self.pts(abs_timestamp).max(dts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(25.0), 40.0);
        assert_eq!(frame_interval(0.0), 1000.0 / 30.0);
        assert_eq!(frame_interval(-1.0), 1000.0 / 30.0);
    }

    #[test]
    fn test_video_timestamps() {
        let mut clock = MuxClock::new(25.0);
        clock.start(5_000);

        assert_eq!(clock.next_video(5_000), (200, 1000));
        assert_eq!(clock.next_video(5_040), (240, 1040));
        // pts is clamped to dts
        assert_eq!(clock.next_video(4_000), (280, 280));
        assert_eq!(clock.pts(5_023), 1023);
    }

    #[test]
    fn test_unknown_rate_still_advances() {
        let mut clock = MuxClock::new(0.0);
        let dts: Vec<i64> = (0..3).map(|_| clock.next_video(0).0).collect();
        assert_eq!(dts, vec![200, 233, 266]);

        clock.set_frame_rate(50.0);
        let a = clock.next_video(0).0;
        let b = clock.next_video(0).0;
        assert_eq!(b - a, 20);
    }
}
