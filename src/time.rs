// SPDX-License-Identifier: GPL-3.0-only

//! EFI_TIME: the fixed 16-byte timestamp embedded in each variable record.

use core::mem;

use plain::Plain;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::{struct_bytes, Error};

/// Timezone value meaning "unspecified"; treated as UTC.
pub const TIMEZONE_UNSPECIFIED: i16 = 2047;

// EFI_TIME
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C, packed)]
pub struct UefiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    /// Offset from UTC in minutes, or [`TIMEZONE_UNSPECIFIED`].
    pub timezone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

unsafe impl Plain for UefiTime {}

impl UefiTime {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let raw: &Self = plain::from_bytes(data).map_err(|_| Error::Truncated("timestamp"))?;
        Ok(*raw)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(struct_bytes(self));
    }

    /// Calendar value of this timestamp. A zero year means "no timestamp"
    /// and yields `None`, as do out-of-range calendar fields.
    pub fn to_datetime(&self) -> Option<OffsetDateTime> {
        if self.year == 0 {
            return None;
        }
        let date = Date::from_calendar_date(
            self.year as i32,
            Month::try_from(self.month).ok()?,
            self.day,
        )
        .ok()?;
        let time = Time::from_hms_nano(self.hour, self.minute, self.second, self.nanosecond).ok()?;
        let offset = if self.timezone == TIMEZONE_UNSPECIFIED {
            UtcOffset::UTC
        } else {
            UtcOffset::from_whole_seconds(self.timezone as i32 * 60).ok()?
        };
        Some(PrimitiveDateTime::new(date, time).assume_offset(offset))
    }

    pub fn from_datetime(t: OffsetDateTime) -> Self {
        Self {
            year: t.year() as u16,
            month: u8::from(t.month()),
            day: t.day(),
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
            pad1: 0,
            nanosecond: t.nanosecond(),
            timezone: t.offset().whole_minutes(),
            daylight: 0,
            pad2: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_layout() {
        assert_eq!(UefiTime::SIZE, 16);
    }

    #[test]
    fn test_zero_year_is_absent() {
        assert_eq!(UefiTime::default().to_datetime(), None);
    }

    #[test]
    fn test_codec_round_trip() {
        let ts = UefiTime {
            year: 2024,
            month: 5,
            day: 1,
            hour: 12,
            minute: 34,
            second: 56,
            pad1: 0,
            nanosecond: 789_000_000,
            timezone: -120,
            daylight: 0,
            pad2: 0,
        };

        let mut bytes = Vec::new();
        ts.encode(&mut bytes);
        assert_eq!(bytes.len(), UefiTime::SIZE);
        assert_eq!(UefiTime::decode(&bytes).unwrap(), ts);
    }

    #[test]
    fn test_unspecified_timezone_is_utc() {
        let ts = UefiTime {
            year: 2024,
            month: 5,
            day: 1,
            timezone: TIMEZONE_UNSPECIFIED,
            ..UefiTime::default()
        };
        assert_eq!(ts.to_datetime().unwrap(), datetime!(2024-05-01 00:00 UTC));
    }

    #[test]
    fn test_datetime_round_trip() {
        let t = datetime!(2023-11-07 08:09:10.000000500 -5);
        let ts = UefiTime::from_datetime(t);
        let timezone = ts.timezone;
        assert_eq!(timezone, -300);
        assert_eq!(ts.to_datetime().unwrap(), t);
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            UefiTime::decode(&[0; 8]),
            Err(Error::Truncated(_))
        ));
    }
}
