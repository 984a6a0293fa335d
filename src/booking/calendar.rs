//! Admin reservation calendar.
//!
//! A month view lists, per room and per day, the reservation occupying the day
//! and the manual block covering it (0 when there is none). The view carries a
//! version token derived from every restriction overlapping the month. An edit
//! submitted against an older token is refused, so blocks are never removed
//! based on a stale page.

use chrono::{Datelike, Months, NaiveDate};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

use crate::db::{Room, RoomRestriction};

const REMOVE_PREFIX: &str = "remove_block_";
const ADD_PREFIX: &str = "add_block_";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("calendar changed since it was loaded")]
    Stale,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// One room's row in the month view
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMonth {
    pub room: Room,
    /// Day to reservation id
    pub reservations: BTreeMap<NaiveDate, i64>,
    /// Day to block restriction id
    pub blocks: BTreeMap<NaiveDate, i64>,
}

impl RoomMonth {
    fn empty(room: Room, days: &[NaiveDate]) -> Self {
        Self {
            room,
            reservations: days.iter().map(|d| (*d, 0)).collect(),
            blocks: days.iter().map(|d| (*d, 0)).collect(),
        }
    }

    pub fn reservation_on(&self, day: &NaiveDate) -> i64 {
        self.reservations.get(day).copied().unwrap_or(0)
    }

    pub fn block_on(&self, day: &NaiveDate) -> i64 {
        self.blocks.get(day).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct MonthView {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub rooms: Vec<RoomMonth>,
    pub version: String,
}

impl MonthView {
    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        days_between(self.first_day, self.last_day)
    }

    /// `month_bounds` only accepts months with both neighbours in range, so
    /// the fallback to the current month is never taken for a built view
    pub fn previous_month(&self) -> NaiveDate {
        self.first_day
            .checked_sub_months(Months::new(1))
            .unwrap_or(self.first_day)
    }

    pub fn next_month(&self) -> NaiveDate {
        self.first_day
            .checked_add_months(Months::new(1))
            .unwrap_or(self.first_day)
    }
}

/// First and last day of a month. The months before and after must exist
/// too, since the calendar links to them.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), CalendarError> {
    let invalid = || CalendarError::InvalidMonth { year, month };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    first
        .checked_sub_months(Months::new(1))
        .ok_or_else(invalid)?;
    let last = first
        .checked_add_months(Months::new(2))
        .and_then(|d| d.checked_sub_months(Months::new(1)))
        .and_then(|d| d.pred_opt())
        .ok_or_else(invalid)?;
    Ok((first, last))
}

fn days_between(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    first.iter_days().take_while(|d| *d <= last).collect()
}

/// Lay restrictions out over the month's days
fn lay_out(
    rooms: Vec<Room>,
    restrictions: &[RoomRestriction],
    first: NaiveDate,
    last: NaiveDate,
) -> Vec<RoomMonth> {
    let days = days_between(first, last);
    let mut rows: Vec<RoomMonth> = rooms.into_iter().map(|r| RoomMonth::empty(r, &days)).collect();

    for restriction in restrictions {
        let Some(row) = rows.iter_mut().find(|r| r.room.id == restriction.room_id) else {
            continue;
        };
        let from = restriction.start_date.max(first);
        let to = restriction.end_date.min(last);
        for day in days_between(from, to) {
            match restriction.reservation_id {
                Some(reservation_id) => {
                    row.reservations.insert(day, reservation_id);
                }
                None => {
                    row.blocks.insert(day, restriction.id);
                }
            }
        }
    }

    rows
}

fn version_of(restrictions: &[RoomRestriction]) -> String {
    let mut hasher = Sha256::new();
    for r in restrictions {
        hasher.update(
            format!(
                "{}|{}|{}|{}|{}|{}\n",
                r.id,
                r.room_id,
                r.start_date,
                r.end_date,
                r.reservation_id.unwrap_or(0),
                r.restriction_id
            )
            .as_bytes(),
        );
    }
    hex::encode(hasher.finalize())
}

pub async fn build_month_view(
    db: &SqlitePool,
    year: i32,
    month: u32,
) -> Result<MonthView, CalendarError> {
    let (first_day, last_day) = month_bounds(year, month)?;
    let rooms = Room::list_all(db).await?;
    let restrictions = RoomRestriction::overlapping(db, first_day, last_day).await?;

    Ok(MonthView {
        first_day,
        last_day,
        version: version_of(&restrictions),
        rooms: lay_out(rooms, &restrictions, first_day, last_day),
    })
}

/// Checkbox name that keeps an existing block on a day
pub fn remove_block_field(room_id: i64, day: NaiveDate) -> String {
    format!("{}{}_{}", REMOVE_PREFIX, room_id, day.format("%Y-%m-%d"))
}

/// Checkbox name that adds a block on a day
pub fn add_block_field(room_id: i64, day: NaiveDate) -> String {
    format!("{}{}_{}", ADD_PREFIX, room_id, day.format("%Y-%m-%d"))
}

fn parse_add_field(name: &str) -> Option<(i64, NaiveDate)> {
    let rest = name.strip_prefix(ADD_PREFIX)?;
    let (room, day) = rest.split_once('_')?;
    let room_id = room.parse().ok()?;
    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some((room_id, day))
}

/// A posted calendar form
#[derive(Debug, Clone)]
pub struct CalendarSubmission {
    pub year: i32,
    pub month: u32,
    pub version: String,
    /// Names of every posted field
    pub fields: HashSet<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct CalendarEdits {
    /// Block restriction ids to delete
    pub remove: BTreeSet<i64>,
    /// Single-day blocks to insert
    pub add: BTreeSet<(i64, NaiveDate)>,
}

/// Work out which blocks to delete and which to create.
///
/// A block on a day whose `remove_block_` checkbox was not posted is deleted.
/// Every well-formed `add_block_` field for a day inside the view, on a known
/// room without a block that day, creates a single-day block.
pub fn plan_calendar_edits(rooms: &[RoomMonth], fields: &HashSet<String>) -> CalendarEdits {
    let mut edits = CalendarEdits::default();

    for row in rooms {
        for (day, block_id) in &row.blocks {
            if *block_id > 0 && !fields.contains(&remove_block_field(row.room.id, *day)) {
                edits.remove.insert(*block_id);
            }
        }
    }

    for name in fields.iter().filter(|n| n.starts_with(ADD_PREFIX)) {
        let Some((room_id, day)) = parse_add_field(name) else {
            tracing::warn!(field = %name, "Ignoring malformed calendar field");
            continue;
        };
        match rooms.iter().find(|r| r.room.id == room_id) {
            Some(row) if row.blocks.contains_key(&day) && row.block_on(&day) == 0 => {
                edits.add.insert((room_id, day));
            }
            Some(_) => {}
            None => tracing::warn!(room_id = room_id, "Ignoring block for unknown room"),
        }
    }

    edits
}

#[derive(Debug, Default, PartialEq)]
pub struct CalendarEditOutcome {
    pub removed: usize,
    pub added: usize,
    pub failed: usize,
}

/// Reconcile a submission against a freshly built view.
///
/// Individual deletes and inserts are best effort: failures are logged and
/// counted, and the rest of the edits still run.
pub async fn apply_calendar_edits(
    db: &SqlitePool,
    submission: &CalendarSubmission,
) -> Result<CalendarEditOutcome, CalendarError> {
    let view = build_month_view(db, submission.year, submission.month).await?;
    if view.version != submission.version {
        tracing::info!(
            year = submission.year,
            month = submission.month,
            "Calendar edit refused: stale view"
        );
        return Err(CalendarError::Stale);
    }

    let edits = plan_calendar_edits(&view.rooms, &submission.fields);
    let mut outcome = CalendarEditOutcome::default();

    for block_id in &edits.remove {
        match RoomRestriction::delete_block(db, *block_id).await {
            Ok(true) => outcome.removed += 1,
            Ok(false) => tracing::debug!(block_id = block_id, "Block already gone"),
            Err(e) => {
                tracing::error!(error = %e, block_id = block_id, "Failed to remove block");
                outcome.failed += 1;
            }
        }
    }

    for (room_id, day) in &edits.add {
        match RoomRestriction::insert_block(db, *room_id, *day).await {
            Ok(_) => outcome.added += 1,
            Err(e) => {
                tracing::error!(error = %e, room_id = room_id, day = %day, "Failed to add block");
                outcome.failed += 1;
            }
        }
    }

    tracing::info!(
        year = submission.year,
        month = submission.month,
        removed = outcome.removed,
        added = outcome.added,
        failed = outcome.failed,
        "Calendar edits applied"
    );

    Ok(outcome)
}
