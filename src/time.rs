//! Conversion between device (Unix epoch) and EPICS timestamps.
//!
//! NDS devices stamp values with a `timespec`-like [`UnixTime`], counted from
//! 1970-01-01. EPICS records carry an [`EpicsTimeStamp`], counted from
//! 1990-01-01. Both directions go through a 64-bit nanosecond count so that
//! out-of-range nanosecond fields are normalized rather than wrapped.
//!
//! A timestamp with both fields zero means "no timestamp supplied". It is
//! passed through as zero in either direction, without the epoch offset.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Seconds between the Unix epoch and the EPICS epoch
pub const POSIX_TIME_AT_EPICS_EPOCH: u64 = 631_152_000;

const NANOSECONDS_PER_SECOND: u64 = 1_000_000_000;
const EPICS_EPOCH_OFFSET_NS: u64 = POSIX_TIME_AT_EPICS_EPOCH * NANOSECONDS_PER_SECOND;

/// Device-side timestamp, seconds and nanoseconds past the Unix epoch
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixTime {
    pub sec: i64,
    pub nsec: u32,
}

/// EPICS-side timestamp, seconds and nanoseconds past the EPICS epoch
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpicsTimeStamp {
    pub sec_past_epoch: u32,
    pub nsec: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum TimeConversionError {
    #[error("The Unix time {0:?} is earlier than the EPICS epoch")]
    BeforeEpicsEpoch(UnixTime),
    #[error("The Unix time {0:?} is past the last representable EPICS timestamp")]
    OutOfRange(UnixTime),
}

impl UnixTime {
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// The current wall-clock time
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
}

impl EpicsTimeStamp {
    pub const fn new(sec_past_epoch: u32, nsec: u32) -> Self {
        Self {
            sec_past_epoch,
            nsec,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.sec_past_epoch == 0 && self.nsec == 0
    }
}

impl From<EpicsTimeStamp> for UnixTime {
    fn from(time: EpicsTimeStamp) -> Self {
        if time.is_zero() {
            return UnixTime::default();
        }
        // u32::MAX seconds in nanoseconds plus the offset still fits in a u64
        let time_ns = time.sec_past_epoch as u64 * NANOSECONDS_PER_SECOND
            + time.nsec as u64
            + EPICS_EPOCH_OFFSET_NS;
        UnixTime {
            sec: (time_ns / NANOSECONDS_PER_SECOND) as i64,
            nsec: (time_ns % NANOSECONDS_PER_SECOND) as u32,
        }
    }
}

impl TryFrom<UnixTime> for EpicsTimeStamp {
    type Error = TimeConversionError;

    fn try_from(time: UnixTime) -> Result<Self, Self::Error> {
        if time.is_zero() {
            return Ok(EpicsTimeStamp::default());
        }
        let Ok(sec) = u64::try_from(time.sec) else {
            return Err(TimeConversionError::BeforeEpicsEpoch(time));
        };
        let time_ns = sec
            .checked_mul(NANOSECONDS_PER_SECOND)
            .and_then(|ns| ns.checked_add(time.nsec as u64))
            .ok_or(TimeConversionError::OutOfRange(time))?;
        if time_ns < EPICS_EPOCH_OFFSET_NS {
            return Err(TimeConversionError::BeforeEpicsEpoch(time));
        }
        let epics_ns = time_ns - EPICS_EPOCH_OFFSET_NS;
        Ok(EpicsTimeStamp {
            sec_past_epoch: u32::try_from(epics_ns / NANOSECONDS_PER_SECOND)
                .map_err(|_| TimeConversionError::OutOfRange(time))?,
            nsec: (epics_ns % NANOSECONDS_PER_SECOND) as u32,
        })
    }
}

impl From<SystemTime> for UnixTime {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => UnixTime {
                sec: since.as_secs() as i64,
                nsec: since.subsec_nanos(),
            },
            Err(e) => {
                // Before 1970: keep nsec positive by borrowing a second
                let before = e.duration();
                let mut sec = -(before.as_secs() as i64);
                let mut nsec = before.subsec_nanos();
                if nsec > 0 {
                    sec -= 1;
                    nsec = NANOSECONDS_PER_SECOND as u32 - nsec;
                }
                UnixTime { sec, nsec }
            }
        }
    }
}

impl From<UnixTime> for SystemTime {
    fn from(time: UnixTime) -> Self {
        if time.sec >= 0 {
            UNIX_EPOCH + Duration::new(time.sec as u64, time.nsec)
        } else {
            UNIX_EPOCH - Duration::from_secs(time.sec.unsigned_abs()) + Duration::from_nanos(time.nsec as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_passed_through() {
        assert_eq!(
            EpicsTimeStamp::try_from(UnixTime::default()).unwrap(),
            EpicsTimeStamp::default()
        );
        assert_eq!(UnixTime::from(EpicsTimeStamp::default()), UnixTime::default());
    }

    #[test]
    fn known_offset() {
        let unix = UnixTime::new(1741731609, 250);
        let epics = EpicsTimeStamp::try_from(unix).unwrap();
        assert_eq!(epics, EpicsTimeStamp::new(1110579609, 250));
        assert_eq!(UnixTime::from(epics), unix);
    }

    #[test]
    fn round_trip() {
        for unix in [
            UnixTime::new(631152000, 1),
            UnixTime::new(631152001, 0),
            UnixTime::new(1_000_000_000, 999_999_999),
            UnixTime::new(4_000_000_000, 123_456_789),
        ] {
            let epics = EpicsTimeStamp::try_from(unix).unwrap();
            assert_eq!(UnixTime::from(epics), unix);
        }
        let epics = EpicsTimeStamp::new(u32::MAX, 999_999_999);
        assert_eq!(
            EpicsTimeStamp::try_from(UnixTime::from(epics)).unwrap(),
            epics
        );
    }

    #[test]
    fn before_epics_epoch() {
        for unix in [
            UnixTime::new(631151999, 999_999_999),
            UnixTime::new(1, 0),
            UnixTime::new(0, 1),
            UnixTime::new(-5, 0),
        ] {
            assert_eq!(
                EpicsTimeStamp::try_from(unix),
                Err(TimeConversionError::BeforeEpicsEpoch(unix))
            );
        }
    }

    #[test]
    fn past_epics_range() {
        let unix = UnixTime::new(POSIX_TIME_AT_EPICS_EPOCH as i64 + u32::MAX as i64 + 1, 0);
        assert!(matches!(
            EpicsTimeStamp::try_from(unix),
            Err(TimeConversionError::OutOfRange(_))
        ));
        assert!(matches!(
            EpicsTimeStamp::try_from(UnixTime::new(i64::MAX, 0)),
            Err(TimeConversionError::OutOfRange(_))
        ));
    }

    #[test]
    fn oversized_nanoseconds_are_normalized() {
        let epics = EpicsTimeStamp::new(10, 1_500_000_000);
        assert_eq!(
            UnixTime::from(epics),
            UnixTime::new(POSIX_TIME_AT_EPICS_EPOCH as i64 + 11, 500_000_000)
        );
    }

    #[test]
    fn system_time() {
        let unix = UnixTime::new(1741731609, 42);
        assert_eq!(UnixTime::from(SystemTime::from(unix)), unix);
        let early = UnixTime::new(-2, 750_000_000);
        assert_eq!(UnixTime::from(SystemTime::from(early)), early);
    }
}
