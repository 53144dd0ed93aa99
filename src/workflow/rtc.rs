// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lock clock encoding.
//!
//! The lock stores wall-clock time in one word:
//!
//! ```text
//! bits 31..26  year - 2000
//! bits 25..22  month
//! bits 21..17  day
//! bits 16..12  hour
//! bits 11..6   minute
//! bits  5..0   second
//! ```

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Timelike, Utc};

use crate::error::ProtocolError;

const EPOCH_YEAR: i32 = 2000;
const LAST_YEAR: i32 = EPOCH_YEAR + 63;

/// Pack a local time into the lock's clock word.
pub fn pack<Tz: TimeZone>(time: &DateTime<Tz>) -> Result<u32, ProtocolError> {
    let year = time.year();
    if !(EPOCH_YEAR..=LAST_YEAR).contains(&year) {
        return Err(ProtocolError::RtcOutOfRange(year));
    }

    Ok(((year - EPOCH_YEAR) as u32) << 26
        | time.month() << 22
        | time.day() << 17
        | time.hour() << 12
        | time.minute() << 6
        | time.second())
}

/// Current station time, in a fixed offset when configured.
pub fn station_time(utc_offset_minutes: Option<i32>) -> DateTime<FixedOffset> {
    if let Some(offset) = utc_offset_minutes.and_then(|m| FixedOffset::east_opt(m * 60)) {
        return Utc::now().with_timezone(&offset);
    }
    let now = Local::now();
    now.with_timezone(now.offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_known_date() {
        let time = Utc.with_ymd_and_hms(2024, 3, 15, 10, 20, 30).unwrap();
        assert_eq!(pack(&time).unwrap(), 0x60DE_A51E);

        let last = Utc.with_ymd_and_hms(2063, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(pack(&last).unwrap(), 0xFF3F_7EFB);
    }

    #[test]
    fn test_years_outside_range() {
        let early = Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(pack(&early), Err(ProtocolError::RtcOutOfRange(1999))));

        let late = Utc.with_ymd_and_hms(2064, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(pack(&late), Err(ProtocolError::RtcOutOfRange(2064))));
    }

    #[test]
    fn test_fixed_offset_applied() {
        let time = station_time(Some(-8 * 60));
        assert_eq!(time.offset().local_minus_utc(), -8 * 3600);
    }
}
