//! Seat layout generator.
//!
//! DESIGN
//! ======
//! The backend reports a seat count, an optional seats-per-row and an optional
//! deck count. The seat picker needs a grid. Seats are split across decks as
//! evenly as possible (lower deck takes the extra seat), filled row by row,
//! and labelled `A01..` on the lower deck and `B01..` on the upper deck. An
//! aisle cell is inserted after the configured column. The last row of a deck
//! may be partial.
//!
//! Generation is pure: same input, same grid.

use std::collections::HashSet;

use serde::Serialize;

use crate::backend::types::TripSeats;
use crate::error::ErrorCode;

pub const DEFAULT_COLUMNS: u32 = 4;
pub const MAX_DECKS: u32 = 2;
/// Largest coach the portal will lay out. Anything bigger is bad inventory.
pub const MAX_SEATS: u32 = 120;
pub const MAX_COLUMNS: u32 = 8;

const DECK_CODES: [char; MAX_DECKS as usize] = ['A', 'B'];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatLayoutError {
    #[error("trip has no seats")]
    NoSeats,
    #[error("seats per row must be at least 1")]
    NoColumns,
    #[error("trip has {0} seats, more than {MAX_SEATS}")]
    TooManySeats(u32),
    #[error("seats per row is {0}, more than {MAX_COLUMNS}")]
    TooManyColumns(u32),
    #[error("deck count must be between 1 and {MAX_DECKS}, got {0}")]
    InvalidDecks(u32),
}

impl ErrorCode for SeatLayoutError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoSeats => "E_SEAT_LAYOUT_NO_SEATS",
            Self::NoColumns => "E_SEAT_LAYOUT_NO_COLUMNS",
            Self::TooManySeats(_) => "E_SEAT_LAYOUT_TOO_MANY_SEATS",
            Self::TooManyColumns(_) => "E_SEAT_LAYOUT_TOO_MANY_COLUMNS",
            Self::InvalidDecks(_) => "E_SEAT_LAYOUT_DECKS",
        }
    }
}

// =============================================================================
// INPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutSpec {
    pub total_seats: u32,
    pub columns: u32,
    /// Insert an aisle after this many seats in each row. `None` or a value
    /// outside `1..columns` means no aisle.
    pub aisle_after: Option<u32>,
    pub decks: u32,
}

impl LayoutSpec {
    /// Layout plan for a backend seat inventory, with the default column count and a
    /// centred aisle when the backend omits them.
    #[must_use]
    pub fn from_trip(seats: &TripSeats) -> Self {
        let columns = seats.seats_per_row.unwrap_or(DEFAULT_COLUMNS);
        Self {
            total_seats: seats.total_seats,
            columns,
            aisle_after: default_aisle(columns),
            decks: seats.decks.unwrap_or(1),
        }
    }

    #[must_use]
    pub fn with_aisle_after(mut self, aisle_after: Option<u32>) -> Self {
        self.aisle_after = aisle_after;
        self
    }
}

/// Centred aisle for rows of three or more seats.
#[must_use]
pub fn default_aisle(columns: u32) -> Option<u32> {
    (columns >= 3).then_some(columns / 2)
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Booked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Seat {
    pub label: String,
    pub row: u32,
    pub column: u32,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Seat(Seat),
    Aisle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deck {
    pub code: char,
    pub rows: Vec<Vec<Cell>>,
}

impl Deck {
    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.rows.iter().flatten().filter_map(|cell| match cell {
            Cell::Seat(seat) => Some(seat),
            Cell::Aisle => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatLayout {
    pub decks: Vec<Deck>,
    pub total: u32,
    pub available: u32,
}

impl SeatLayout {
    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.decks.iter().flat_map(Deck::seats)
    }

    #[must_use]
    pub fn seat(&self, label: &str) -> Option<&Seat> {
        self.seats().find(|s| s.label == label)
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Seat label for the `index`-th seat (0-based) of deck `deck` (0-based).
#[must_use]
pub fn seat_label(deck: usize, index: u32) -> String {
    let code = DECK_CODES.get(deck).copied().unwrap_or('?');
    format!("{code}{:02}", index + 1)
}

/// Split `total` across `decks`, earlier decks taking the remainder.
fn split_across_decks(total: u32, decks: u32) -> Vec<u32> {
    let base = total / decks;
    let extra = total % decks;
    (0..decks).map(|d| base + u32::from(d < extra)).collect()
}

/// Build the seat grid, marking every label in `booked` as booked.
///
/// Booked labels are matched case-insensitively; labels that do not exist in
/// the layout are ignored.
///
/// # Errors
///
/// Returns an error when the seat count, the column count or the deck count
/// is zero or out of range.
pub fn generate(plan: &LayoutSpec, booked: &[String]) -> Result<SeatLayout, SeatLayoutError> {
    if plan.total_seats == 0 {
        return Err(SeatLayoutError::NoSeats);
    }
    if plan.total_seats > MAX_SEATS {
        return Err(SeatLayoutError::TooManySeats(plan.total_seats));
    }
    if plan.columns == 0 {
        return Err(SeatLayoutError::NoColumns);
    }
    if plan.columns > MAX_COLUMNS {
        return Err(SeatLayoutError::TooManyColumns(plan.columns));
    }
    if plan.decks == 0 || plan.decks > MAX_DECKS {
        return Err(SeatLayoutError::InvalidDecks(plan.decks));
    }

    let booked: HashSet<String> = booked
        .iter()
        .map(|label| label.trim().to_ascii_uppercase())
        .collect();
    let aisle = plan.aisle_after.filter(|&a| a > 0 && a < plan.columns);

    let mut available = 0;
    let mut decks = Vec::with_capacity(plan.decks as usize);
    for (deck_index, deck_seats) in split_across_decks(plan.total_seats, plan.decks).into_iter().enumerate() {
        let mut rows = Vec::new();
        for row_start in (0..deck_seats).step_by(plan.columns as usize) {
            let row_end = (row_start + plan.columns).min(deck_seats);
            let mut row = Vec::with_capacity((row_end - row_start) as usize + 1);
            for index in row_start..row_end {
                let column = index - row_start;
                if aisle == Some(column) {
                    row.push(Cell::Aisle);
                }
                let label = seat_label(deck_index, index);
                let status = if booked.contains(&label) {
                    SeatStatus::Booked
                } else {
                    available += 1;
                    SeatStatus::Available
                };
                row.push(Cell::Seat(Seat { label, row: row_start / plan.columns + 1, column: column + 1, status }));
            }
            rows.push(row);
        }
        decks.push(Deck { code: DECK_CODES[deck_index], rows });
    }

    Ok(SeatLayout { decks, total: plan.total_seats, available })
}

#[cfg(test)]
#[path = "seats_test.rs"]
mod tests;
