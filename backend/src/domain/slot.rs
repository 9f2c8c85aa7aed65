//! Slot identity and occupancy types.
//!
//! A slot is the unit of bookable capacity: one calendar date combined with
//! one of the fixed time windows. Slot documents are created lazily on first
//! booking and never deleted; their `booked_count` is mutated only inside a
//! transaction that also mutates the owning appointment.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default per-slot capacity applied when a slot document is first created.
pub const DEFAULT_SLOT_CAPACITY: u32 = 400;

/// Fixed set of bookable time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TimeWindow {
    /// 09:00–10:00.
    #[serde(rename = "09:00-10:00")]
    H09,
    /// 10:00–11:00.
    #[serde(rename = "10:00-11:00")]
    H10,
    /// 11:00–12:00.
    #[serde(rename = "11:00-12:00")]
    H11,
    /// 13:00–14:00.
    #[serde(rename = "13:00-14:00")]
    H13,
    /// 14:00–15:00.
    #[serde(rename = "14:00-15:00")]
    H14,
}

impl TimeWindow {
    /// Every bookable window, in day order.
    pub const ALL: [Self; 5] = [Self::H09, Self::H10, Self::H11, Self::H13, Self::H14];

    /// Wire representation, e.g. `09:00-10:00`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H09 => "09:00-10:00",
            Self::H10 => "10:00-11:00",
            Self::H11 => "11:00-12:00",
            Self::H13 => "13:00-14:00",
            Self::H14 => "14:00-15:00",
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when a string does not name a bookable window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time window: {raw}")]
pub struct TimeWindowParseError {
    /// The rejected input.
    pub raw: String,
}

impl std::str::FromStr for TimeWindow {
    type Err = TimeWindowParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|window| window.as_str() == s)
            .ok_or_else(|| TimeWindowParseError { raw: s.to_owned() })
    }
}

/// Calendar date of a booking, carried in strict `YYYY-MM-DD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "2025-06-01")]
pub struct BookingDate(NaiveDate);

/// Error raised for dates that are not strict `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("date must be formatted YYYY-MM-DD: {raw}")]
pub struct BookingDateParseError {
    /// The rejected input.
    pub raw: String,
}

impl BookingDate {
    const FORMAT: &'static str = "%Y-%m-%d";

    /// Parse a strict `YYYY-MM-DD` date.
    ///
    /// chrono tolerates unpadded fields, so the parsed date is re-rendered
    /// and compared with the input to keep the format strict.
    pub fn parse(raw: &str) -> Result<Self, BookingDateParseError> {
        let reject = || BookingDateParseError { raw: raw.to_owned() };
        let date = NaiveDate::parse_from_str(raw, Self::FORMAT).map_err(|_| reject())?;
        if date.format(Self::FORMAT).to_string() != raw {
            return Err(reject());
        }
        Ok(Self(date))
    }

    /// Wrap an already-validated calendar date.
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying calendar date.
    pub fn as_naive(self) -> NaiveDate {
        self.0
    }
}

impl std::fmt::Display for BookingDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl TryFrom<String> for BookingDate {
    type Error = BookingDateParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BookingDate> for String {
    fn from(value: BookingDate) -> Self {
        value.to_string()
    }
}

/// Composite identity of a slot: one date plus one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// Calendar date of the slot.
    pub date: BookingDate,
    /// Time window of the slot.
    pub window: TimeWindow,
}

impl SlotKey {
    /// Build a key from its parts.
    pub fn new(date: BookingDate, window: TimeWindow) -> Self {
        Self { date, window }
    }

    /// Document id of the slot, e.g. `2025-06-01_09:00-10:00`.
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.date, self.window)
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.date, self.window)
    }
}

/// Stored occupancy record for one slot.
///
/// ## Invariants
/// - `booked_count` never exceeds `capacity` and never goes negative;
///   increments past capacity are rejected at the write, decrements floor
///   at zero to tolerate lost-decrement recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Calendar date of the slot.
    pub date: BookingDate,
    /// Time window of the slot.
    pub window: TimeWindow,
    /// Maximum number of units this slot can hold.
    pub capacity: u32,
    /// Units currently booked.
    pub booked_count: u32,
    /// Creation instant of the slot document.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant of the slot document.
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Slot document created by the first booking against its key.
    pub fn first_booking(key: SlotKey, capacity: u32, now: DateTime<Utc>) -> Self {
        Self {
            date: key.date,
            window: key.window,
            capacity,
            booked_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity of this slot.
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.window)
    }
}
