// incident_ingestor/src/plan.rs
// Turns one normalized row into an ordered list of idempotent merge operations.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::keys::{EntityKeys, PersonId, PersonSequence, VehicleKey, is_pedestrian};
use crate::normalizer::NormalizedRow;
use crate::schema::{Label, RelKind, SchemaConfig};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Int(i) => write!(f, "{}", i),
            PropValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Text(s.to_string())
    }
}

pub type Properties = BTreeMap<String, PropValue>;

/// A node identified by its label and merge-key properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub label: Label,
    pub key:   Properties,
}

impl NodeRef {
    fn new<const N: usize>(label: Label, key: [(&str, PropValue); N]) -> Self {
        Self {
            label,
            key: key.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    pub fn incident(protocollo: &str) -> Self {
        Self::new(Label::Incident, [("protocollo", protocollo.into())])
    }

    pub fn road(protocollo: &str) -> Self {
        Self::new(Label::Road, [("protocollo", protocollo.into())])
    }

    pub fn vehicle(key: &VehicleKey) -> Self {
        Self::new(
            Label::Vehicle,
            [
                ("protocollo", key.protocollo.as_str().into()),
                ("progressivo", key.progressivo.as_str().into()),
            ],
        )
    }

    pub fn person(id: PersonId) -> Self {
        Self::new(Label::Person, [("idpersona", PropValue::Int(id.0 as i64))])
    }

    pub fn vehicle_type(name: &str) -> Self {
        Self::new(Label::VehicleType, [("nome", name.into())])
    }

    pub fn gender(code: &str) -> Self {
        Self::new(Label::Gender, [("tipo", code.into())])
    }

    pub fn group(name: &str) -> Self {
        Self::new(Label::Group, [("nome", name.into())])
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.label)?;
        for (k, v) in &self.key {
            write!(f, " {}={}", k, v)?;
        }
        f.write_str(")")
    }
}

/// Merge a node on its key, then set the remaining properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpsert {
    pub node:  NodeRef,
    pub props: Properties,
}

/// Merge a relationship between two nodes matched on their keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelUpsert {
    pub kind:     RelKind,
    pub rel_type: String,
    pub from:     NodeRef,
    pub to:       NodeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Node(NodeUpsert),
    Relationship(RelUpsert),
}

impl Operation {
    pub fn is_node(&self) -> bool {
        matches!(self, Operation::Node(_))
    }
}

/// Keys and operations planned for one row.
#[derive(Debug, Clone)]
pub struct RowPlan {
    pub keys:       EntityKeys,
    pub operations: Vec<Operation>,
}

/// Builds property maps, leaving blank source values out.
fn props(row: &NormalizedRow, mapping: &[(&str, &str)]) -> Properties {
    mapping
        .iter()
        .filter(|(_, source)| row.has_value(source))
        .map(|(target, source)| (target.to_string(), PropValue::Text(row.get(source).to_string())))
        .collect()
}

const INCIDENT_PROPS: &[(&str, &str)] = &[
    ("dataincidente", "dataoraincidente"),
    ("chilometrica", "chilometrica"),
    ("natura", "naturaincidente"),
    ("traffico", "traffico"),
    ("condizioneatm", "condizioneatmosferica"),
    ("visibilita", "visibilita"),
    ("illuminazione", "illuminazione"),
    ("numero_feriti", "num_feriti"),
    ("numero_illesi", "num_illesi"),
    ("numero_morti", "num_morti"),
    ("longitudine", "longitude"),
    ("latitudine", "latitude"),
];

const ROAD_PROPS: &[(&str, &str)] = &[
    ("nome", "strada1"),
    ("particolarita", "particolaritastrade"),
    ("tipostrada", "tipostrada"),
    ("fondostradale", "fondostradale"),
    ("pavimentazione", "pavimentazione"),
    ("segnaletica", "segnaletica"),
];

const VEHICLE_PROPS: &[(&str, &str)] = &[("statoveicolo", "statoveicolo"), ("statoairbag", "airbag")];

const PERSON_PROPS: &[(&str, &str)] = &[
    ("tipolesione", "tipolesione"),
    ("casco_cintura", "cinturacascoutilizzato"),
    ("deceduto", "deceduto"),
    ("deceduto_dopo", "deceduto_dopo"),
    ("tipopersona", "tipopersona"),
];

/// Plans merges for rows under a fixed schema configuration.
pub struct UpsertPlanner<'a> {
    schema: &'a SchemaConfig,
}

impl<'a> UpsertPlanner<'a> {
    pub fn new(schema: &'a SchemaConfig) -> Self {
        Self { schema }
    }

    fn rel(&self, kind: RelKind, from: NodeRef, to: NodeRef) -> Operation {
        Operation::Relationship(RelUpsert {
            kind,
            rel_type: self.schema.relationship_name(kind).to_string(),
            from,
            to,
        })
    }

    /// Plans one row. Node merges always precede the relationship merges that
    /// reference them.
    pub fn plan(&self, row: &NormalizedRow, row_no: usize, sequence: &mut PersonSequence) -> Result<RowPlan> {
        let keys = EntityKeys::resolve(row, row_no, sequence)?;
        let protocollo = keys.incident.as_str();

        let incident = NodeRef::incident(protocollo);
        let road = NodeRef::road(protocollo);

        let mut incident_props = props(row, INCIDENT_PROPS);
        if !self.schema.group.is_node() && row.has_value("gruppo") {
            incident_props.insert("gruppo".into(), row.get("gruppo").into());
        }

        let mut road_props = props(row, ROAD_PROPS);
        let localizzazione = format!("{} {}", row.get("localizzazione1"), row.get("localizzazione2"));
        if !localizzazione.trim().is_empty() {
            road_props.insert("localizzazione".into(), localizzazione.trim().into());
        }

        let mut nodes = vec![
            Operation::Node(NodeUpsert { node: incident.clone(), props: incident_props }),
            Operation::Node(NodeUpsert { node: road.clone(), props: road_props }),
        ];
        let mut rels = vec![self.rel(RelKind::OccurredOn, incident.clone(), road.clone())];

        if is_pedestrian(row) {
            nodes.append(&mut rels);
            return Ok(RowPlan { keys, operations: nodes });
        }

        if let (Some(vehicle_key), Some(person_id)) = (&keys.vehicle, keys.person) {
            let vehicle = NodeRef::vehicle(vehicle_key);
            let person = NodeRef::person(person_id);

            let mut vehicle_props = props(row, VEHICLE_PROPS);
            if !self.schema.vehicle_type.is_node() && row.has_value("tipoveicolo") {
                vehicle_props.insert("tipoveicolo".into(), row.get("tipoveicolo").into());
            }
            nodes.push(Operation::Node(NodeUpsert { node: vehicle.clone(), props: vehicle_props }));
            if self.schema.vehicle_type.is_node() {
                if let Some(name) = &keys.vehicle_type {
                    let lookup = NodeRef::vehicle_type(name);
                    nodes.push(Operation::Node(NodeUpsert { node: lookup.clone(), props: Properties::new() }));
                    rels.push(self.rel(RelKind::TypeOf, vehicle.clone(), lookup));
                }
            }

            let mut person_props = props(row, PERSON_PROPS);
            if !self.schema.gender.is_node() && row.has_value("sesso") {
                person_props.insert("sesso".into(), row.get("sesso").into());
            }
            nodes.push(Operation::Node(NodeUpsert { node: person.clone(), props: person_props }));
            if self.schema.gender.is_node() {
                if let Some(gender) = keys.gender {
                    let lookup = NodeRef::gender(gender.as_str());
                    nodes.push(Operation::Node(NodeUpsert { node: lookup.clone(), props: Properties::new() }));
                    rels.push(self.rel(RelKind::HasGender, person.clone(), lookup));
                }
            }

            rels.push(self.rel(RelKind::InvolvesVehicle, incident.clone(), vehicle.clone()));
            rels.push(self.rel(RelKind::InvolvesPerson, incident.clone(), person.clone()));
            rels.push(self.rel(RelKind::VehicleOn, vehicle.clone(), road));
            rels.push(self.rel(RelKind::DrivenBy, vehicle, person));
        }

        if self.schema.group.is_node() {
            if let Some(name) = &keys.group {
                let lookup = NodeRef::group(name);
                nodes.push(Operation::Node(NodeUpsert { node: lookup.clone(), props: Properties::new() }));
                rels.push(self.rel(RelKind::RespondedTo, lookup, incident));
            }
        }

        nodes.append(&mut rels);
        Ok(RowPlan { keys, operations: nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaPreset;

    fn row(pairs: &[(&str, &str)]) -> NormalizedRow {
        NormalizedRow::from_pairs(pairs.iter().copied())
    }

    fn driver_row(sesso: &str) -> NormalizedRow {
        row(&[
            ("protocollo", "100"),
            ("progressivo", "1"),
            ("tipopersona", "Conducente"),
            ("tipoveicolo", "Auto"),
            ("sesso", sesso),
            ("strada1", "Via Roma"),
            ("gruppo", "Polizia Locale"),
        ])
    }

    fn labels(ops: &[Operation]) -> Vec<Label> {
        ops.iter()
            .filter_map(|op| match op {
                Operation::Node(n) => Some(n.node.label),
                _ => None,
            })
            .collect()
    }

    fn kinds(ops: &[Operation]) -> Vec<RelKind> {
        ops.iter()
            .filter_map(|op| match op {
                Operation::Relationship(r) => Some(r.kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pedestrian_rows_only_touch_incident_and_road() {
        for preset in [SchemaPreset::Inline, SchemaPreset::Lookups, SchemaPreset::Full] {
            let schema = SchemaConfig::preset(preset);
            let mut seq = PersonSequence::new();
            let plan = UpsertPlanner::new(&schema)
                .plan(&row(&[("protocollo", "9"), ("tipopersona", "PeDoNe"), ("gruppo", "CC")]), 1, &mut seq)
                .unwrap();
            assert_eq!(plan.operations.len(), 3);
            assert_eq!(labels(&plan.operations), vec![Label::Incident, Label::Road]);
            assert_eq!(kinds(&plan.operations), vec![RelKind::OccurredOn]);
            assert_eq!(seq.peek(), 1);
        }
    }

    #[test]
    fn driver_row_uses_pre_increment_person_id() {
        let schema = SchemaConfig::default();
        let mut seq = PersonSequence::starting_at(41);
        let plan = UpsertPlanner::new(&schema).plan(&driver_row("M"), 1, &mut seq).unwrap();
        assert_eq!(seq.peek(), 42);
        let person = plan
            .operations
            .iter()
            .find_map(|op| match op {
                Operation::Node(n) if n.node.label == Label::Person => Some(n.node.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(person, NodeRef::person(PersonId(41)));
    }

    #[test]
    fn node_merges_come_before_relationships() {
        let schema = SchemaConfig::preset(SchemaPreset::Full);
        let mut seq = PersonSequence::new();
        let plan = UpsertPlanner::new(&schema).plan(&driver_row("F"), 1, &mut seq).unwrap();
        let first_rel = plan.operations.iter().position(|op| !op.is_node()).unwrap();
        assert!(plan.operations[first_rel..].iter().all(|op| !op.is_node()));
        assert_eq!(
            labels(&plan.operations),
            vec![
                Label::Incident,
                Label::Road,
                Label::Vehicle,
                Label::VehicleType,
                Label::Person,
                Label::Gender,
                Label::Group
            ]
        );
        assert_eq!(kinds(&plan.operations).len(), 8);
    }

    #[test]
    fn recognized_gender_codes_create_one_lookup() {
        let schema = SchemaConfig::preset(SchemaPreset::Lookups);
        for code in ["m", "F", "altro"] {
            let mut seq = PersonSequence::new();
            let plan = UpsertPlanner::new(&schema).plan(&driver_row(code), 1, &mut seq).unwrap();
            let genders: Vec<_> =
                labels(&plan.operations).into_iter().filter(|l| *l == Label::Gender).collect();
            assert_eq!(genders.len(), 1, "code {code}");
            let rels: Vec<_> =
                kinds(&plan.operations).into_iter().filter(|k| *k == RelKind::HasGender).collect();
            assert_eq!(rels.len(), 1, "code {code}");
        }
    }

    #[test]
    fn blank_or_unknown_gender_creates_no_lookup() {
        let schema = SchemaConfig::preset(SchemaPreset::Lookups);
        for code in ["", "X", "n.d."] {
            let mut seq = PersonSequence::new();
            let plan = UpsertPlanner::new(&schema).plan(&driver_row(code), 1, &mut seq).unwrap();
            assert!(!labels(&plan.operations).contains(&Label::Gender));
            assert!(!kinds(&plan.operations).contains(&RelKind::HasGender));
            // the rest of the row is still planned
            assert!(labels(&plan.operations).contains(&Label::Person));
            assert!(kinds(&plan.operations).contains(&RelKind::DrivenBy));
        }
    }

    #[test]
    fn blank_vehicle_type_and_group_create_no_lookups() {
        let schema = SchemaConfig::preset(SchemaPreset::Full);
        let mut seq = PersonSequence::new();
        let blank = row(&[
            ("protocollo", "100"),
            ("progressivo", "1"),
            ("tipopersona", "Conducente"),
            ("tipoveicolo", "  "),
            ("sesso", "M"),
            ("gruppo", ""),
        ]);
        let plan = UpsertPlanner::new(&schema).plan(&blank, 1, &mut seq).unwrap();

        let node_labels = labels(&plan.operations);
        let rel_kinds = kinds(&plan.operations);
        assert!(!node_labels.contains(&Label::VehicleType));
        assert!(!rel_kinds.contains(&RelKind::TypeOf));
        assert!(!node_labels.contains(&Label::Group));
        assert!(!rel_kinds.contains(&RelKind::RespondedTo));

        // Nothing else of the row is lost, and neither value leaks in as an attribute.
        assert_eq!(
            node_labels,
            vec![Label::Incident, Label::Road, Label::Vehicle, Label::Person, Label::Gender]
        );
        assert_eq!(
            rel_kinds,
            vec![
                RelKind::OccurredOn,
                RelKind::HasGender,
                RelKind::InvolvesVehicle,
                RelKind::InvolvesPerson,
                RelKind::VehicleOn,
                RelKind::DrivenBy,
            ]
        );
        let Operation::Node(incident) = &plan.operations[0] else { panic!("expected node") };
        assert!(!incident.props.contains_key("gruppo"));
        let Operation::Node(vehicle) = &plan.operations[2] else { panic!("expected node") };
        assert!(!vehicle.props.contains_key("tipoveicolo"));
        assert_eq!(seq.peek(), 2);
    }

    #[test]
    fn inline_schema_keeps_values_as_attributes() {
        let schema = SchemaConfig::preset(SchemaPreset::Inline);
        let mut seq = PersonSequence::new();
        let plan = UpsertPlanner::new(&schema).plan(&driver_row("M"), 1, &mut seq).unwrap();
        let find = |label: Label| {
            plan.operations
                .iter()
                .find_map(|op| match op {
                    Operation::Node(n) if n.node.label == label => Some(n.props.clone()),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(find(Label::Vehicle).get("tipoveicolo"), Some(&PropValue::from("Auto")));
        assert_eq!(find(Label::Person).get("sesso"), Some(&PropValue::from("M")));
        assert_eq!(find(Label::Incident).get("gruppo"), Some(&PropValue::from("Polizia Locale")));
        assert_eq!(labels(&plan.operations).len(), 4);
    }

    #[test]
    fn group_node_replaces_inline_attribute() {
        let schema = SchemaConfig::preset(SchemaPreset::Full);
        let mut seq = PersonSequence::new();
        let plan = UpsertPlanner::new(&schema).plan(&driver_row("M"), 1, &mut seq).unwrap();
        let Operation::Node(incident) = &plan.operations[0] else { panic!("expected node") };
        assert!(!incident.props.contains_key("gruppo"));
        let responded = plan
            .operations
            .iter()
            .find_map(|op| match op {
                Operation::Relationship(r) if r.kind == RelKind::RespondedTo => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(responded.from, NodeRef::group("Polizia Locale"));
        assert_eq!(responded.to, NodeRef::incident("100"));
        assert_eq!(responded.rel_type, "INTERVENUTO");
    }

    #[test]
    fn blank_values_are_left_out() {
        let schema = SchemaConfig::default();
        let mut seq = PersonSequence::new();
        let plan = UpsertPlanner::new(&schema)
            .plan(&row(&[("protocollo", "1"), ("tipopersona", "pedone"), ("traffico", "")]), 1, &mut seq)
            .unwrap();
        let Operation::Node(incident) = &plan.operations[0] else { panic!("expected node") };
        assert!(incident.props.is_empty());
        let Operation::Node(road) = &plan.operations[1] else { panic!("expected node") };
        assert!(!road.props.contains_key("localizzazione"));
    }

    #[test]
    fn road_location_joins_both_parts() {
        let schema = SchemaConfig::default();
        let mut seq = PersonSequence::new();
        let plan = UpsertPlanner::new(&schema)
            .plan(
                &row(&[
                    ("protocollo", "1"),
                    ("tipopersona", "pedone"),
                    ("localizzazione1", "Strada urbana"),
                    ("localizzazione2", "Incrocio"),
                ]),
                1,
                &mut seq,
            )
            .unwrap();
        let Operation::Node(road) = &plan.operations[1] else { panic!("expected node") };
        assert_eq!(road.props.get("localizzazione"), Some(&PropValue::from("Strada urbana Incrocio")));
    }
}
