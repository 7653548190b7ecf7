//! External actions: legacy command strings and coordinator task intents.
//!
//! Everything an agent sends is validated here and converted into closed
//! typed variants before it reaches the tick loop. Untyped JSON never
//! crosses this boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::GridPos;
use crate::station::StationType;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("action must be a command string or an object of robot intents")]
    NotAnObject,
    #[error("intent for {0} is not an object")]
    EntryNotObject(String),
    #[error("intent is missing its \"type\" field")]
    MissingType,
    #[error("unknown intent type: {0}")]
    UnknownIntentType(String),
    #[error("{intent} intent requires a \"{field}\" field")]
    MissingField {
        intent: &'static str,
        field: &'static str,
    },
    #[error("unrecognised station name: {0}")]
    BadStationName(String),
    #[error("unrecognised command: {0}")]
    UnknownCommand(String),
}

// ---------------------------------------------------------------------------
// Station references and targets
// ---------------------------------------------------------------------------

/// A station named by `<Kind>_<line>[_<index>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationRef {
    pub kind: StationType,
    pub line: u32,
    pub index: u32,
}

impl StationRef {
    pub fn new(kind: StationType, line: u32) -> Self {
        Self {
            kind,
            line,
            index: 0,
        }
    }

    /// Parse `Cutter_0`, `Cutter_0_1`, `final_storage_1`, `VisionQA_0`.
    pub fn parse(name: &str) -> Result<StationRef, ActionError> {
        let bad = || ActionError::BadStationName(name.to_string());
        let parts: Vec<&str> = name.trim().split('_').collect();
        // Trailing numeric parts are line and optional index.
        let numeric = parts
            .iter()
            .rev()
            .take_while(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
            .count();
        if numeric == 0 || numeric > 2 || numeric == parts.len() {
            return Err(bad());
        }
        let split = parts.len() - numeric;
        let kind = StationType::parse(&parts[..split].join("_")).ok_or_else(bad)?;
        let line = parts[split].parse().map_err(|_| bad())?;
        let index = match parts.get(split + 1) {
            Some(p) => p.parse().map_err(|_| bad())?,
            None => 0,
        };
        Ok(StationRef { kind, line, index })
    }
}

impl std::fmt::Display for StationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.index == 0 {
            write!(f, "{}_{}", self.kind.name(), self.line)
        } else {
            write!(f, "{}_{}_{}", self.kind.name(), self.line, self.index)
        }
    }
}

/// Where a move intent should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Station(StationRef),
    Cell(GridPos),
}

impl Target {
    /// `"row,col"` or a station name.
    pub fn parse(s: &str) -> Result<Target, ActionError> {
        if s.contains(',') {
            GridPos::parse(s)
                .map(Target::Cell)
                .ok_or_else(|| ActionError::BadStationName(s.to_string()))
        } else {
            StationRef::parse(s).map(Target::Station)
        }
    }
}

// ---------------------------------------------------------------------------
// Command strings
// ---------------------------------------------------------------------------

/// Legacy string commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `produce_<recipe>` spawns one full ingredient kit;
    /// `produce_<ingredient>` spawns a single unit. Recipe names win.
    Produce(String),
    /// `produce_next` spawns a kit for the first open production order.
    ProduceNext,
    Maintain(StationRef),
    Repair(StationRef),
    ReplaceBlade { line: u32, index: u32 },
    Continue,
}

impl Command {
    pub fn parse(s: &str) -> Result<Command, ActionError> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("continue") {
            return Ok(Command::Continue);
        }
        if let Some(what) = s.strip_prefix("produce_") {
            let what = what.to_ascii_lowercase();
            if what == "next" {
                return Ok(Command::ProduceNext);
            }
            return Ok(Command::Produce(what));
        }
        if let Some(rest) = s.strip_prefix("maintain_") {
            return StationRef::parse(rest).map(Command::Maintain);
        }
        if let Some(rest) = s.strip_prefix("repair_") {
            return StationRef::parse(rest).map(Command::Repair);
        }
        if let Some(rest) = s.strip_prefix("replace_blade_") {
            let station = StationRef::parse(&format!("Cutter_{rest}"))?;
            return Ok(Command::ReplaceBlade {
                line: station.line,
                index: station.index,
            });
        }
        Err(ActionError::UnknownCommand(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Task intents
// ---------------------------------------------------------------------------

/// Wire shape of one intent: `{type, from?, to?, station?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIntent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
}

/// A validated coordinator instruction for one robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskIntent {
    Move { to: Target },
    Pick { from: StationRef },
    Drop { to: StationRef },
    /// Pick at `from` then drop at `to`.
    Transport { from: StationRef, to: StationRef },
    /// Arm only. `station`, when given, must be the arm's own station.
    Operate { station: Option<StationRef> },
    Wait,
}

fn required<'a>(
    value: &'a Option<String>,
    intent: &'static str,
    field: &'static str,
) -> Result<&'a str, ActionError> {
    value
        .as_deref()
        .ok_or(ActionError::MissingField { intent, field })
}

impl TryFrom<RawIntent> for TaskIntent {
    type Error = ActionError;

    fn try_from(raw: RawIntent) -> Result<Self, Self::Error> {
        let kind = raw.kind.as_deref().ok_or(ActionError::MissingType)?;
        let intent = match kind.to_ascii_lowercase().as_str() {
            "move" => TaskIntent::Move {
                to: Target::parse(required(&raw.to, "move", "to")?)?,
            },
            "pick" => TaskIntent::Pick {
                from: StationRef::parse(required(&raw.from, "pick", "from")?)?,
            },
            "drop" => TaskIntent::Drop {
                to: StationRef::parse(required(&raw.to, "drop", "to")?)?,
            },
            "transport" => TaskIntent::Transport {
                from: StationRef::parse(required(&raw.from, "transport", "from")?)?,
                to: StationRef::parse(required(&raw.to, "transport", "to")?)?,
            },
            "operate" => TaskIntent::Operate {
                station: raw.station.as_deref().map(StationRef::parse).transpose()?,
            },
            "wait" | "idle" => TaskIntent::Wait,
            other => return Err(ActionError::UnknownIntentType(other.to_string())),
        };
        Ok(intent)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One external action per step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Command(String),
    /// Coordinator mode: robot id to intent.
    Assign(BTreeMap<String, TaskIntent>),
}

impl Action {
    pub fn idle() -> Self {
        Action::Command("continue".to_string())
    }

    pub fn command(s: impl Into<String>) -> Self {
        Action::Command(s.into())
    }

    /// Strict parse: any malformed entry rejects the whole batch.
    ///
    /// Accepts a bare JSON string (command), `{"action": "<command>"}`, or
    /// an object mapping robot ids to intents.
    pub fn from_json(json: &str) -> Result<Action, ActionError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let map = match classify(value)? {
            Classified::Command(c) => return Ok(Action::Command(c)),
            Classified::Intents(map) => map,
        };
        let mut intents = BTreeMap::new();
        for (robot, entry) in map {
            intents.insert(robot.clone(), parse_entry(&robot, entry)?);
        }
        Ok(Action::Assign(intents))
    }

    /// Lenient parse: malformed entries are dropped and reported, the rest
    /// of the batch survives.
    pub fn from_json_lenient(json: &str) -> Result<(Action, Vec<(String, ActionError)>), ActionError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let map = match classify(value)? {
            Classified::Command(c) => return Ok((Action::Command(c), Vec::new())),
            Classified::Intents(map) => map,
        };
        let mut intents = BTreeMap::new();
        let mut rejected = Vec::new();
        for (robot, entry) in map {
            match parse_entry(&robot, entry) {
                Ok(intent) => {
                    intents.insert(robot, intent);
                }
                Err(e) => rejected.push((robot, e)),
            }
        }
        Ok((Action::Assign(intents), rejected))
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Action::Command(s.to_string())
    }
}

enum Classified {
    Command(String),
    Intents(serde_json::Map<String, serde_json::Value>),
}

fn classify(value: serde_json::Value) -> Result<Classified, ActionError> {
    match value {
        serde_json::Value::String(s) => Ok(Classified::Command(s)),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(cmd)) = map.get("action") {
                if map.len() == 1 {
                    return Ok(Classified::Command(cmd.clone()));
                }
            }
            Ok(Classified::Intents(map))
        }
        _ => Err(ActionError::NotAnObject),
    }
}

fn parse_entry(robot: &str, entry: serde_json::Value) -> Result<TaskIntent, ActionError> {
    if !entry.is_object() {
        return Err(ActionError::EntryNotObject(robot.to_string()));
    }
    let raw: RawIntent = serde_json::from_value(entry)?;
    TaskIntent::try_from(raw)
}

// ---------------------------------------------------------------------------
// Assignment report
// ---------------------------------------------------------------------------

/// Why a coordinator intent was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    UnknownRobot,
    RobotBusy,
    UnsupportedForRole,
    UnknownStation,
    NothingToPick,
    AlreadyCarrying,
    NotCarrying,
    QueueFull,
    WrongStation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::UnknownRobot => "unknown robot",
            SkipReason::RobotBusy => "robot is not idle",
            SkipReason::UnsupportedForRole => "intent not supported for this robot",
            SkipReason::UnknownStation => "no such station",
            SkipReason::NothingToPick => "station has no output",
            SkipReason::AlreadyCarrying => "robot is already carrying",
            SkipReason::NotCarrying => "robot is not carrying anything",
            SkipReason::QueueFull => "task queue is full",
            SkipReason::WrongStation => "arm is bound to a different station",
        };
        f.write_str(s)
    }
}

/// Outcome of applying a coordinator map for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentReport {
    pub assigned: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_ref_parses_names() {
        assert_eq!(
            StationRef::parse("Cutter_0_1").unwrap(),
            StationRef {
                kind: StationType::Cutter,
                line: 0,
                index: 1
            }
        );
        assert_eq!(
            StationRef::parse("final_storage_1").unwrap(),
            StationRef::new(StationType::FinalStorage, 1)
        );
        assert_eq!(
            StationRef::parse("VisionQA_0").unwrap(),
            StationRef::new(StationType::Inspector, 0)
        );
        assert!(StationRef::parse("Cutter").is_err());
        assert!(StationRef::parse("Oven_0").is_err());
        assert!(StationRef::parse("0_1").is_err());
    }

    #[test]
    fn station_ref_display_round_trips() {
        let r = StationRef {
            kind: StationType::Cutter,
            line: 1,
            index: 1,
        };
        assert_eq!(r.to_string(), "Cutter_1_1");
        assert_eq!(StationRef::parse(&r.to_string()).unwrap(), r);
    }

    #[test]
    fn commands_parse() {
        assert_eq!(
            Command::parse("produce_pasta").unwrap(),
            Command::Produce("pasta".into())
        );
        assert_eq!(Command::parse("produce_Next").unwrap(), Command::ProduceNext);
        assert_eq!(
            Command::parse("maintain_Cutter_0").unwrap(),
            Command::Maintain(StationRef::new(StationType::Cutter, 0))
        );
        assert_eq!(
            Command::parse("repair_Sealer_1").unwrap(),
            Command::Repair(StationRef::new(StationType::Sealer, 1))
        );
        assert_eq!(
            Command::parse("replace_blade_0_1").unwrap(),
            Command::ReplaceBlade { line: 0, index: 1 }
        );
        assert_eq!(Command::parse("continue").unwrap(), Command::Continue);
        assert!(matches!(
            Command::parse("dance"),
            Err(ActionError::UnknownCommand(_))
        ));
    }

    #[test]
    fn intents_convert() {
        let raw = RawIntent {
            kind: Some("transport".into()),
            from: Some("Washer_0".into()),
            to: Some("Cutter_0_1".into()),
            station: None,
        };
        let intent = TaskIntent::try_from(raw).unwrap();
        assert!(matches!(intent, TaskIntent::Transport { .. }));

        let raw = RawIntent {
            kind: Some("move".into()),
            to: Some("3, 4".into()),
            ..RawIntent::default()
        };
        assert_eq!(
            TaskIntent::try_from(raw).unwrap(),
            TaskIntent::Move {
                to: Target::Cell(GridPos::new(3, 4))
            }
        );
    }

    #[test]
    fn intent_without_type_is_rejected() {
        let raw = RawIntent {
            to: Some("Washer_0".into()),
            ..RawIntent::default()
        };
        assert!(matches!(
            TaskIntent::try_from(raw),
            Err(ActionError::MissingType)
        ));
    }

    #[test]
    fn intent_missing_field_is_rejected() {
        let raw = RawIntent {
            kind: Some("pick".into()),
            ..RawIntent::default()
        };
        assert!(matches!(
            TaskIntent::try_from(raw),
            Err(ActionError::MissingField {
                intent: "pick",
                field: "from"
            })
        ));
    }

    #[test]
    fn strict_parse_rejects_whole_batch() {
        let json = r#"{
            "logistics_0": {"type": "transport", "from": "Storage_0", "to": "Washer_0"},
            "logistics_1": {"to": "Washer_0"}
        }"#;
        assert!(matches!(
            Action::from_json(json),
            Err(ActionError::MissingType)
        ));
    }

    #[test]
    fn lenient_parse_keeps_good_entries() {
        let json = r#"{
            "logistics_0": {"type": "transport", "from": "Storage_0", "to": "Washer_0"},
            "logistics_1": {"to": "Washer_0"},
            "arm_0": {"type": "wait"}
        }"#;
        let (action, rejected) = Action::from_json_lenient(json).unwrap();
        let Action::Assign(map) = action else {
            panic!("expected assignment map");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, "logistics_1");
    }

    #[test]
    fn continue_object_is_a_command() {
        assert_eq!(
            Action::from_json(r#"{"action": "continue"}"#).unwrap(),
            Action::idle()
        );
        assert_eq!(
            Action::from_json(r#""produce_salad""#).unwrap(),
            Action::command("produce_salad")
        );
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(Action::from_json("[1, 2]"), Err(ActionError::NotAnObject)));
        assert!(matches!(Action::from_json("{"), Err(ActionError::Json(_))));
        assert!(matches!(
            Action::from_json(r#"{"arm_0": 3}"#),
            Err(ActionError::EntryNotObject(_))
        ));
    }
}
