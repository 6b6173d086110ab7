// incident_ingestor/src/schema.rs
// Graph schema registry: labels, relationship kinds and the per-run representation toggles.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::{IngestorError, Result};

/// Node labels the loader is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Incident,
    Road,
    Vehicle,
    Person,
    VehicleType,
    Gender,
    Group,
}

impl Label {
    pub const ALL: [Label; 7] = [
        Label::Incident,
        Label::Road,
        Label::Vehicle,
        Label::Person,
        Label::VehicleType,
        Label::Gender,
        Label::Group,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Incident => "Incidente",
            Label::Road => "Strada",
            Label::Vehicle => "Veicolo",
            Label::Person => "Persona",
            Label::VehicleType => "TipoVeicolo",
            Label::Gender => "Sesso",
            Label::Group => "Gruppo",
        }
    }

    /// Properties a node of this label is merged on.
    pub fn key_fields(self) -> &'static [&'static str] {
        match self {
            Label::Incident | Label::Road => &["protocollo"],
            Label::Vehicle => &["protocollo", "progressivo"],
            Label::Person => &["idpersona"],
            Label::VehicleType | Label::Group => &["nome"],
            Label::Gender => &["tipo"],
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship kinds between labels. The stored type name comes from [`SchemaConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelKind {
    OccurredOn,
    InvolvesVehicle,
    InvolvesPerson,
    VehicleOn,
    DrivenBy,
    TypeOf,
    HasGender,
    RespondedTo,
}

impl RelKind {
    pub const ALL: [RelKind; 8] = [
        RelKind::OccurredOn,
        RelKind::InvolvesVehicle,
        RelKind::InvolvesPerson,
        RelKind::VehicleOn,
        RelKind::DrivenBy,
        RelKind::TypeOf,
        RelKind::HasGender,
        RelKind::RespondedTo,
    ];

    pub fn default_name(self) -> &'static str {
        match self {
            RelKind::OccurredOn => "OCCORSO_SU",
            RelKind::InvolvesVehicle => "COINVOLGE_VEICOLO",
            RelKind::InvolvesPerson => "COINVOLGE_PERSONA",
            RelKind::VehicleOn => "SU",
            RelKind::DrivenBy => "GUIDATO_DA",
            RelKind::TypeOf => "TIPO",
            RelKind::HasGender => "HA_SESSO",
            RelKind::RespondedTo => "INTERVENUTO",
        }
    }

    /// (start, end) labels of the relationship.
    pub fn endpoints(self) -> (Label, Label) {
        match self {
            RelKind::OccurredOn => (Label::Incident, Label::Road),
            RelKind::InvolvesVehicle => (Label::Incident, Label::Vehicle),
            RelKind::InvolvesPerson => (Label::Incident, Label::Person),
            RelKind::VehicleOn => (Label::Vehicle, Label::Road),
            RelKind::DrivenBy => (Label::Vehicle, Label::Person),
            RelKind::TypeOf => (Label::Vehicle, Label::VehicleType),
            RelKind::HasGender => (Label::Person, Label::Gender),
            RelKind::RespondedTo => (Label::Group, Label::Incident),
        }
    }

    fn cli_name(self) -> &'static str {
        match self {
            RelKind::OccurredOn => "occurred-on",
            RelKind::InvolvesVehicle => "involves-vehicle",
            RelKind::InvolvesPerson => "involves-person",
            RelKind::VehicleOn => "vehicle-on",
            RelKind::DrivenBy => "driven-by",
            RelKind::TypeOf => "type-of",
            RelKind::HasGender => "has-gender",
            RelKind::RespondedTo => "responded-to",
        }
    }
}

impl FromStr for RelKind {
    type Err = IngestorError;

    fn from_str(s: &str) -> Result<Self> {
        RelKind::ALL
            .into_iter()
            .find(|k| k.cli_name() == s.trim())
            .ok_or_else(|| IngestorError::ConfigurationError(format!("unknown relationship kind '{}'", s)))
    }
}

/// Whether an attribute is stored on its owner or as a shared lookup node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Representation {
    #[default]
    Inline,
    Node,
}

impl Representation {
    pub fn from_flag(as_node: bool) -> Self {
        if as_node { Representation::Node } else { Representation::Inline }
    }

    pub fn is_node(self) -> bool {
        self == Representation::Node
    }
}

/// Historical schema layouts, from fully inline to every lookup as its own node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaPreset {
    /// Vehicle type, gender and group stored as plain attributes.
    Inline,
    /// Vehicle type promoted to a TipoVeicolo node.
    VehicleType,
    /// Vehicle type and gender promoted to lookup nodes.
    Lookups,
    /// Vehicle type, gender and responding group all modeled as nodes.
    Full,
}

/// Schema configuration for one ingestion run. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConfig {
    pub vehicle_type: Representation,
    pub gender:       Representation,
    pub group:        Representation,
    rel_names:        BTreeMap<RelKind, String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self::preset(SchemaPreset::Lookups)
    }
}

impl SchemaConfig {
    pub fn preset(preset: SchemaPreset) -> Self {
        let (vehicle_type, gender, group) = match preset {
            SchemaPreset::Inline => (false, false, false),
            SchemaPreset::VehicleType => (true, false, false),
            SchemaPreset::Lookups => (true, true, false),
            SchemaPreset::Full => (true, true, true),
        };
        Self {
            vehicle_type: Representation::from_flag(vehicle_type),
            gender: Representation::from_flag(gender),
            group: Representation::from_flag(group),
            rel_names: RelKind::ALL
                .into_iter()
                .map(|k| (k, k.default_name().to_string()))
                .collect(),
        }
    }

    /// Renames a relationship type. The name must be a plain identifier.
    pub fn with_relationship_name(mut self, kind: RelKind, name: &str) -> Result<Self> {
        validate_identifier(name)?;
        self.rel_names.insert(kind, name.to_string());
        Ok(self)
    }

    pub fn relationship_name(&self, kind: RelKind) -> &str {
        self.rel_names
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_name())
    }

    /// Reverse lookup used by stores to check a type name against the allow-list.
    pub fn relationship_kind(&self, name: &str) -> Option<RelKind> {
        RelKind::ALL.into_iter().find(|k| self.relationship_name(*k) == name)
    }

    pub fn active_labels(&self) -> Vec<Label> {
        Label::ALL
            .into_iter()
            .filter(|l| match l {
                Label::VehicleType => self.vehicle_type.is_node(),
                Label::Gender => self.gender.is_node(),
                Label::Group => self.group.is_node(),
                _ => true,
            })
            .collect()
    }

    pub fn active_relationships(&self) -> Vec<RelKind> {
        RelKind::ALL
            .into_iter()
            .filter(|k| match k {
                RelKind::TypeOf => self.vehicle_type.is_node(),
                RelKind::HasGender => self.gender.is_node(),
                RelKind::RespondedTo => self.group.is_node(),
                _ => true,
            })
            .collect()
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the only shape ever interpolated into a statement.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        _ => false,
    };
    if valid { Ok(()) } else { Err(IngestorError::InvalidIdentifier(name.to_string())) }
}
