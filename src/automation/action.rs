//! Macro and action types
//!
//! A [`Macro`] is the declarative list of page actions returned by the
//! reasoning service. Parsing is lenient about tags (unknown tags become
//! [`Action::Unrecognized`]) and strict about fields (a known tag with bad
//! fields rejects the whole macro before anything runs).

use crate::error::MacroError;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One declarative page action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Activate the element
    Click {
        /// Target selector
        selector: String,
    },
    /// Set the element's value as if typed
    Type {
        /// Target selector
        selector: String,
        /// Text to enter
        text: String,
    },
    /// Choose a value in a select element
    Select {
        /// Target selector
        selector: String,
        /// Option value
        value: String,
    },
    /// Suspend before the next action
    Wait {
        /// Delay in milliseconds
        duration_ms: u64,
    },
    /// Scroll an element into view, or the window to coordinates
    Scroll {
        /// Element to bring into view
        selector: Option<String>,
        /// Horizontal window offset
        x: Option<f64>,
        /// Vertical window offset
        y: Option<f64>,
    },
    /// Set several field values in order
    Fill {
        /// `(selector, value)` pairs in the order given
        fields: Vec<(String, String)>,
    },
    /// Any tag the engine does not know
    Unrecognized {
        /// The tag as received
        raw_kind: String,
    },
}

impl Action {
    /// Wire tag of the action
    pub fn kind(&self) -> &str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Select { .. } => "select",
            Action::Wait { .. } => "wait",
            Action::Scroll { .. } => "scroll",
            Action::Fill { .. } => "fill",
            Action::Unrecognized { raw_kind } => raw_kind,
        }
    }

    /// Primary selector the action targets, if any
    pub fn selector(&self) -> Option<&str> {
        match self {
            Action::Click { selector }
            | Action::Type { selector, .. }
            | Action::Select { selector, .. } => Some(selector),
            Action::Scroll { selector, .. } => selector.as_deref(),
            Action::Fill { fields } => fields.first().map(|(s, _)| s.as_str()),
            Action::Wait { .. } | Action::Unrecognized { .. } => None,
        }
    }

    /// Parse one action object
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind,
            None => {
                return Ok(Action::Unrecognized {
                    raw_kind: String::new(),
                })
            }
        };

        let action = match kind {
            "click" => {
                let wire: SelectorOnly = from_wire(value)?;
                Action::Click {
                    selector: wire.selector,
                }
            }
            "type" => {
                let wire: TypeWire = from_wire(value)?;
                Action::Type {
                    selector: wire.selector,
                    text: wire.text,
                }
            }
            "select" => {
                let wire: SelectWire = from_wire(value)?;
                Action::Select {
                    selector: wire.selector,
                    value: wire.value,
                }
            }
            "wait" => {
                let wire: WaitWire = from_wire(value)?;
                if !wire.duration.is_finite() {
                    return Err("duration must be a finite number".to_string());
                }
                Action::Wait {
                    duration_ms: wire.duration.max(0.0).round() as u64,
                }
            }
            "scroll" => {
                let wire: ScrollWire = from_wire(value)?;
                Action::Scroll {
                    selector: wire.selector,
                    x: wire.x,
                    y: wire.y,
                }
            }
            "fill" => {
                let wire: FillWire = from_wire(value)?;
                let fields = wire
                    .data
                    .into_iter()
                    .map(|(selector, v)| {
                        let text = match v {
                            Value::String(s) => s,
                            Value::Null => String::new(),
                            other => other.to_string(),
                        };
                        (selector, text)
                    })
                    .collect();
                Action::Fill { fields }
            }
            other => Action::Unrecognized {
                raw_kind: other.to_string(),
            },
        };
        Ok(action)
    }
}

fn from_wire<T: for<'de> Deserialize<'de>>(value: &Value) -> std::result::Result<T, String> {
    T::deserialize(value).map_err(|e| e.to_string())
}

#[derive(Deserialize)]
struct SelectorOnly {
    selector: String,
}

#[derive(Deserialize)]
struct TypeWire {
    selector: String,
    text: String,
}

#[derive(Deserialize)]
struct SelectWire {
    selector: String,
    value: String,
}

#[derive(Deserialize)]
struct WaitWire {
    duration: f64,
}

#[derive(Deserialize)]
struct ScrollWire {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
}

#[derive(Deserialize)]
struct FillWire {
    data: Map<String, Value>,
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.kind())?;
        match self {
            Action::Click { selector } => map.serialize_entry("selector", selector)?,
            Action::Type { selector, text } => {
                map.serialize_entry("selector", selector)?;
                map.serialize_entry("text", text)?;
            }
            Action::Select { selector, value } => {
                map.serialize_entry("selector", selector)?;
                map.serialize_entry("value", value)?;
            }
            Action::Wait { duration_ms } => map.serialize_entry("duration", duration_ms)?,
            Action::Scroll { selector, x, y } => {
                if let Some(selector) = selector {
                    map.serialize_entry("selector", selector)?;
                }
                if let Some(x) = x {
                    map.serialize_entry("x", x)?;
                }
                if let Some(y) = y {
                    map.serialize_entry("y", y)?;
                }
            }
            Action::Fill { fields } => {
                let data: Map<String, Value> = fields
                    .iter()
                    .map(|(s, v)| (s.clone(), Value::String(v.clone())))
                    .collect();
                map.serialize_entry("data", &data)?;
            }
            Action::Unrecognized { .. } => {}
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Action::from_value(&value).map_err(de::Error::custom)
    }
}

/// Ordered, immutable list of actions
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Macro {
    actions: Vec<Action>,
}

impl Macro {
    /// Build a macro from actions
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// Parse a macro from JSON text
    ///
    /// Accepts a bare array of actions or an object with an `actions` array.
    pub fn from_json(json: &str) -> std::result::Result<Self, MacroError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| MacroError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Parse a macro from an already decoded JSON value
    pub fn from_value(value: &Value) -> std::result::Result<Self, MacroError> {
        let list = match value {
            Value::Array(list) => list,
            Value::Object(obj) => match obj.get("actions") {
                Some(Value::Array(list)) => list,
                _ => return Err(MacroError::NotAList),
            },
            _ => return Err(MacroError::NotAList),
        };

        let actions = list
            .iter()
            .enumerate()
            .map(|(index, v)| {
                Action::from_value(v).map_err(|reason| MacroError::InvalidAction { index, reason })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { actions })
    }

    /// Actions in execution order
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the macro has no actions
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl IntoIterator for Macro {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}
