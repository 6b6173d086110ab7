// incident_ingestor/src/keys.rs
// Natural and synthetic keys derived from a normalized row.

use std::fmt;

use crate::error::{IngestorError, Result};
use crate::normalizer::NormalizedRow;

/// Person-type value marking a pedestrian record (compared case-insensitively).
pub const PEDESTRIAN: &str = "pedone";

/// True only when `tipopersona` is literally "pedone"; blank means not a pedestrian.
pub fn is_pedestrian(row: &NormalizedRow) -> bool {
    row.get("tipopersona").to_lowercase() == PEDESTRIAN
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncidentKey(String);

impl IncidentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleKey {
    pub protocollo:  String,
    pub progressivo: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersonId(pub u64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run-scoped generator for synthetic person identifiers.
///
/// Identifiers start at 1 and are never reused within a run. The sequence is
/// not persisted, so a second run over a populated store starts again at 1.
#[derive(Debug, Clone)]
pub struct PersonSequence {
    next: u64,
}

impl Default for PersonSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Returns the current value and advances the sequence.
    pub fn allocate(&mut self) -> PersonId {
        let id = PersonId(self.next);
        self.next += 1;
        id
    }

    /// The identifier the next allocation will hand out.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Recognized gender codes. Anything else produces no lookup node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            "ALTRO" => Some(Gender::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "ALTRO",
        }
    }
}

/// Keys of every entity one row may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKeys {
    pub incident:     IncidentKey,
    /// `None` for pedestrian rows.
    pub vehicle:      Option<VehicleKey>,
    /// `None` for pedestrian rows.
    pub person:       Option<PersonId>,
    pub vehicle_type: Option<String>,
    pub gender:       Option<Gender>,
    pub group:        Option<String>,
}

impl EntityKeys {
    /// Resolves the keys for `row` (1-based within its file).
    ///
    /// Fails without touching `sequence` when `protocollo` is blank. Otherwise a
    /// non-pedestrian row consumes exactly one person identifier.
    pub fn resolve(row: &NormalizedRow, row_no: usize, sequence: &mut PersonSequence) -> Result<Self> {
        let protocollo = row.get("protocollo");
        if protocollo.is_empty() {
            return Err(IngestorError::MissingField { field: "protocollo", row: row_no });
        }
        let incident = IncidentKey(protocollo.to_string());
        let group = non_empty(row.get("gruppo"));

        if is_pedestrian(row) {
            return Ok(Self {
                incident,
                vehicle: None,
                person: None,
                vehicle_type: None,
                gender: None,
                group,
            });
        }

        Ok(Self {
            vehicle: Some(VehicleKey {
                protocollo:  protocollo.to_string(),
                progressivo: row.get("progressivo").to_string(),
            }),
            incident,
            person: Some(sequence.allocate()),
            vehicle_type: non_empty(row.get("tipoveicolo")),
            gender: Gender::from_code(row.get("sesso")),
            group,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() { None } else { Some(value.to_string()) }
}
