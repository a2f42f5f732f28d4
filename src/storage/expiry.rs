//! Expiry Options and Time Helpers
//!
//! `SET` accepts a flat list of modifier tokens read in pairs:
//!
//! - `EX seconds` / `PX milliseconds`: expire relative to now
//! - `EXAT unix-seconds` / `PXAT unix-milliseconds`: expire at an instant
//!
//! Within each family the last token wins. An absolute instant, once given,
//! is never replaced by a relative one from the same call. Zero or negative
//! relative times produce an instant that is already in the past, so the key
//! disappears on its next read.
//!
//! Instants are kept at millisecond precision so a snapshot, which stores
//! Unix milliseconds, restores them exactly.

use crate::storage::StoreError;
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Expiry requested by the modifiers of one `SET` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetExpiry {
    relative: Option<SystemTime>,
    absolute: Option<SystemTime>,
}

impl SetExpiry {
    /// Parses modifier tokens, computing relative expiries from `now`.
    pub fn parse(tokens: &[Bytes], now: SystemTime) -> Result<Self, StoreError> {
        let now_ms = unix_millis(now);
        let mut expiry = SetExpiry::default();

        for pair in tokens.chunks(2) {
            let [option, amount] = pair else {
                return Err(StoreError::Syntax);
            };
            let amount = parse_amount(amount)?;

            match option.to_ascii_uppercase().as_slice() {
                b"EX" => {
                    let ms = amount
                        .checked_mul(1000)
                        .and_then(|ms| now_ms.checked_add(ms))
                        .ok_or(StoreError::InvalidExpireTime)?;
                    expiry.relative = Some(from_unix_millis(ms));
                }
                b"PX" => {
                    let ms = now_ms
                        .checked_add(amount)
                        .ok_or(StoreError::InvalidExpireTime)?;
                    expiry.relative = Some(from_unix_millis(ms));
                }
                b"EXAT" => {
                    let ms = amount
                        .checked_mul(1000)
                        .ok_or(StoreError::InvalidExpireTime)?;
                    expiry.absolute = Some(from_unix_millis(ms));
                }
                b"PXAT" => expiry.absolute = Some(from_unix_millis(amount)),
                _ => return Err(StoreError::Syntax),
            }
        }

        Ok(expiry)
    }

    /// The instant the key should expire at, if any.
    pub fn resolve(self) -> Option<SystemTime> {
        self.absolute.or(self.relative)
    }
}

fn parse_amount(token: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(StoreError::InvalidExpireTime)
}

/// Milliseconds since the Unix epoch, negative before it.
pub fn unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}

/// The instant `ms` milliseconds from the Unix epoch.
pub fn from_unix_millis(ms: i64) -> SystemTime {
    let offset = Duration::from_millis(ms.unsigned_abs());
    let time = if ms >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    time.unwrap_or(UNIX_EPOCH)
}
