//! Change sequence numbers.
//!
//! A CSN orders every accepted mutation. It renders as
//! `yyyyMMddHHmmss.ffffffZ#cccccc#rrrr#mmmmmm` where the hex fields are the
//! change count within the timestamp, the replica id and the modification
//! count. The rendering sorts lexicographically in generation order, so the
//! string form doubles as the resource version.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;

use crate::error::{ScimError, ScimResult};

const TIME_FORMAT: &str = "%Y%m%d%H%M%S%.6fZ";

/// A change sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Csn {
    time: DateTime<Utc>,
    change_count: u32,
    replica_id: u16,
    mod_count: u32,
}

impl Csn {
    pub fn new(time: DateTime<Utc>, change_count: u32, replica_id: u16, mod_count: u32) -> Self {
        Self {
            time,
            change_count,
            replica_id,
            mod_count,
        }
    }

    /// Milliseconds since the epoch.
    pub fn time_millis(&self) -> i64 {
        self.time.timestamp_millis()
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn change_count(&self) -> u32 {
        self.change_count
    }

    pub fn replica_id(&self) -> u16 {
        self.replica_id
    }

    pub fn modification_count(&self) -> u32 {
        self.mod_count
    }
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{:06x}#{:04x}#{:06x}",
            self.time.format(TIME_FORMAT),
            self.change_count,
            self.replica_id,
            self.mod_count
        )
    }
}

impl FromStr for Csn {
    type Err = ScimError;

    fn from_str(s: &str) -> ScimResult<Self> {
        let invalid = || ScimError::bad_request(format!("invalid CSN '{}'", s));

        let mut parts = s.split('#');
        let (Some(ts), Some(cc), Some(rid), Some(mc), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };

        let naive = NaiveDateTime::parse_from_str(ts, TIME_FORMAT).map_err(|_| invalid())?;
        let change_count = u32::from_str_radix(cc, 16).map_err(|_| invalid())?;
        let replica_id = u16::from_str_radix(rid, 16).map_err(|_| invalid())?;
        let mod_count = u32::from_str_radix(mc, 16).map_err(|_| invalid())?;

        Ok(Csn::new(
            Utc.from_utc_datetime(&naive),
            change_count,
            replica_id,
            mod_count,
        ))
    }
}

#[derive(Debug)]
struct GeneratorState {
    last: Option<DateTime<Utc>>,
    change_count: u32,
}

/// Generates strictly increasing CSNs for one replica.
///
/// Two CSNs generated within the same microsecond, or while the wall clock
/// runs backwards, share the last timestamp and differ by change count.
#[derive(Debug)]
pub struct CsnGenerator {
    replica_id: u16,
    mod_count: u32,
    state: Mutex<GeneratorState>,
}

impl CsnGenerator {
    pub fn new(replica_id: u16) -> Self {
        Self {
            replica_id,
            mod_count: 0,
            state: Mutex::new(GeneratorState {
                last: None,
                change_count: 0,
            }),
        }
    }

    pub fn replica_id(&self) -> u16 {
        self.replica_id
    }

    /// Issue the next CSN.
    pub fn next_csn(&self) -> Csn {
        // truncate to the rendered precision so ordering matches the string form
        let now = Utc::now();
        let micros = now.timestamp_micros();
        let now = Utc.timestamp_micros(micros).single().unwrap_or(now);

        let mut state = self.state.lock();
        let time = match state.last {
            Some(last) if now <= last => {
                state.change_count += 1;
                last
            }
            _ => {
                state.last = Some(now);
                state.change_count = 0;
                now
            }
        };

        Csn::new(time, state.change_count, self.replica_id, self.mod_count)
    }
}
