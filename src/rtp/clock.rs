//! RTCP sender-report clock
//!
//! A sender report pairs an NTP wall-clock instant with the RTP timestamp of
//! the same instant. Once one has been seen, RTP timestamps of that stream
//! map to absolute time.
//!
//! ```text
//! 0       1       2       4       8           12          16          20
//! | V P RC| PT=200| length| SSRC  | NTP msw   | NTP lsw   | RTP time  |
//! ```

use chrono::{DateTime, Local, TimeZone};

/// Seconds between 1900-01-01 (NTP epoch) and 1970-01-01
const JAN_1970: u32 = 0x83AA_7E80;

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

/// RTCP packet type of a sender report
const RTCP_SR: u8 = 200;

/// Most recent sender report of one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncClock {
    /// Unix time of the report in nanoseconds, zero until synced
    pub ntp_time: i64,
    /// RTP timestamp of the report
    pub rtp_time: u32,
}

impl SyncClock {
    /// Update from an RTCP packet; returns false unless it is a sender report
    pub fn decode(&mut self, data: &[u8]) -> bool {
        if data.len() < 20 || data[1] != RTCP_SR {
            return false;
        }

        let msw = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let lsw = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        self.rtp_time = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        self.ntp_time = msw.wrapping_sub(JAN_1970) as i64 * NANOS_PER_SEC
            + ((lsw as i64 * NANOS_PER_SEC) >> 32);
        true
    }

    /// Whether a sender report has been seen
    pub fn is_synced(&self) -> bool {
        self.ntp_time != 0
    }

    /// Absolute milliseconds of an RTP timestamp at `clock_rate` Hz
    ///
    /// The difference to the report is not corrected for 32-bit wraparound.
    pub fn rtp_to_ntp(&self, rtp_time: u32, clock_rate: u32) -> i64 {
        let diff = rtp_time as i64 - self.rtp_time as i64;
        let duration = (diff as f64 / clock_rate as f64 * NANOS_PER_SEC as f64) as i64;
        (self.ntp_time + duration) / NANOS_PER_MILLI
    }

    /// Report instant in local time
    pub fn local_time(&self) -> DateTime<Local> {
        Local.timestamp_nanos(self.ntp_time)
    }
}
