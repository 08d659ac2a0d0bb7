// Packed DOS date/time handling
// time: bits 15-11 hours, bits 10-5 minutes, bits 4-0 seconds/2
// date: bits 15-9 years since 1980, bits 8-5 month, bits 4-0 day

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A packed date/time pair as stored in a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FatDateTime {
    pub date: u16,
    pub time: u16,
}

impl FatDateTime {
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(t: SystemTime) -> Self {
        let secs = match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        let (date, time) = unix_to_fat_datetime(secs);
        Self { date, time }
    }

    /// `None` when the packed fields do not form a valid calendar date
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let secs = fat_datetime_to_unix(self.date, self.time)?;
        if secs < 0 {
            return None;
        }
        Some(UNIX_EPOCH + Duration::from_secs(secs as u64))
    }
}

pub fn encode_time(hour: u32, minute: u32, second: u32) -> u16 {
    (((hour & 0x1F) << 11) | ((minute & 0x3F) << 5) | ((second / 2) & 0x1F)) as u16
}

pub fn decode_time(time: u16) -> (u32, u32, u32) {
    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) as u32) << 1;
    (hour, minute, second)
}

pub fn encode_date(year: i32, month: u32, day: u32) -> u16 {
    let years = (year - 1980).clamp(0, 127) as u32;
    ((years << 9) | ((month & 0x0F) << 5) | (day & 0x1F)) as u16
}

pub fn decode_date(date: u16) -> (i32, u32, u32) {
    let year = ((date >> 9) & 0x7F) as i32 + 1980;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    (year, month, day)
}

/// Convert packed date/time to Unix seconds (UTC)
pub fn fat_datetime_to_unix(date: u16, time: u16) -> Option<i64> {
    let (year, month, day) = decode_date(date);
    let (hour, minute, second) = decode_time(time);
    let dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(dt.and_utc().timestamp())
}

/// Convert Unix seconds (UTC) to packed (date, time), clamping to 1980..=2107
pub fn unix_to_fat_datetime(timestamp: i64) -> (u16, u16) {
    let datetime = match DateTime::<Utc>::from_timestamp(timestamp, 0) {
        Some(dt) => dt,
        None => return (encode_date(1980, 1, 1), 0),
    };

    if datetime.year() < 1980 {
        return (encode_date(1980, 1, 1), 0);
    }
    if datetime.year() > 2107 {
        return (encode_date(2107, 12, 31), encode_time(23, 59, 58));
    }

    let date = encode_date(datetime.year(), datetime.month(), datetime.day());
    let time = encode_time(datetime.hour(), datetime.minute(), datetime.second());
    (date, time)
}

pub fn time_to_string(time: u16) -> String {
    let (h, m, s) = decode_time(time);
    format!("{:02}:{:02}:{:02}", h, m, s)
}

pub fn date_to_string(date: u16) -> String {
    let (y, m, d) = decode_date(date);
    format!("{:02}/{:02}/{:04}", d, m, y)
}

/// Parse `HH:MM:SS`
pub fn parse_time(s: &str) -> Option<u16> {
    let mut parts = s.trim().splitn(3, ':').map(|p| p.parse::<u32>().ok());
    let (h, m, sec) = (parts.next()??, parts.next()??, parts.next()??);
    if h > 23 || m > 59 || sec > 59 {
        return None;
    }
    Some(encode_time(h, m, sec))
}

/// Parse `DD/MM/YYYY`
pub fn parse_date(s: &str) -> Option<u16> {
    let mut parts = s.trim().splitn(3, '/');
    let d = parts.next()?.parse::<u32>().ok()?;
    let m = parts.next()?.parse::<u32>().ok()?;
    let y = parts.next()?.parse::<i32>().ok()?;
    if !(1980..2108).contains(&y) {
        return None;
    }
    NaiveDate::from_ymd_opt(y, m, d)?;
    Some(encode_date(y, m, d))
}
