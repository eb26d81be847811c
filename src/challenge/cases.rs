/// Functional cases per challenge level
///
/// Cases are plain data handed to the functional driver script as JSON, so the
/// driver itself stays level-agnostic.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Points for a final response of the expected message type
pub const TYPE_MATCH_POINTS: u32 = 20;
/// Points for a final response whose payload passes the case's check
pub const PAYLOAD_MATCH_POINTS: u32 = 20;

/// Check applied to the payload of the last response in a case
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadCheck {
    /// Every needle appears in the payload's string form
    Contains { needles: Vec<String> },
    /// Payload is a mapping whose numeric `field` is at least `minimum`
    FieldAtLeast { field: String, minimum: i64 },
}

/// One message exchange driven against a loaded handler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionalCase {
    pub name: String,
    /// Sent in order; only the response to the last one is checked
    pub messages: Vec<Value>,
    pub expected_type: String,
    pub check: PayloadCheck,
    pub type_points: u32,
    pub payload_points: u32,
}

impl FunctionalCase {
    pub fn max_points(&self) -> u32 {
        self.type_points + self.payload_points
    }
}

static CASES: Lazy<HashMap<u8, Vec<FunctionalCase>>> = Lazy::new(|| {
    let mut table = HashMap::new();

    table.insert(
        1,
        vec![FunctionalCase {
            name: "echo_roundtrip".to_string(),
            messages: vec![json!({"type": "echo", "payload": "Hello", "from": "test123"})],
            expected_type: "echo_response".to_string(),
            check: PayloadCheck::Contains {
                needles: vec!["ECHO:".to_string(), "Hello".to_string()],
            },
            type_points: TYPE_MATCH_POINTS,
            payload_points: PAYLOAD_MATCH_POINTS,
        }],
    );

    table.insert(
        2,
        vec![FunctionalCase {
            name: "counter_stats".to_string(),
            messages: vec![
                json!({"type": "chat", "payload": "msg1"}),
                json!({"type": "chat", "payload": "msg2"}),
                json!({"type": "stats", "payload": "request"}),
            ],
            expected_type: "stats_response".to_string(),
            check: PayloadCheck::FieldAtLeast {
                field: "total_messages".to_string(),
                minimum: 3,
            },
            type_points: TYPE_MATCH_POINTS,
            payload_points: PAYLOAD_MATCH_POINTS,
        }],
    );

    // TODO: define collector/executor/sync exchanges once their message
    // contracts are written down; until then these levels score 0 here.
    table
});

/// Cases for a level; unknown levels have none
pub fn cases_for_level(level: u8) -> &'static [FunctionalCase] {
    CASES.get(&level).map(Vec::as_slice).unwrap_or(&[])
}
