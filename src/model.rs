use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Read-only view over one JSON object returned by the API.
///
/// Fields are looked up by name and handed back untouched; nothing is checked
/// against a fixed schema, so fields added by the API later remain reachable
/// through [`Record::get`].
pub trait Record: Sized {
    fn from_map(data: Map<String, Value>) -> Self;

    fn data(&self) -> &Map<String, Value>;

    fn into_inner(self) -> Map<String, Value>;

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self::from_map(data)),
            other => Err(Error::Json(serde::de::Error::custom(format!(
                "expected a JSON object, got {other}"
            )))),
        }
    }

    fn get(&self, field: &str) -> Option<&Value> {
        self.data().get(field)
    }

    fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    fn value(&self) -> Option<&Value> {
        self.get("value")
    }

    fn date(&self) -> Option<&str> {
        self.get_str("date")
    }
}

macro_rules! record {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name {
            data: Map<String, Value>,
        }

        impl Record for $name {
            fn from_map(data: Map<String, Value>) -> Self {
                $name { data }
            }

            fn data(&self) -> &Map<String, Value> {
                &self.data
            }

            fn into_inner(self) -> Map<String, Value> {
                self.data
            }
        }
    };
}

record!(
    /// A tracked metric such as `steps` or `mood`.
    Attribute
);
record!(
    /// A generated observation about a trend in one attribute.
    Insight
);
record!(
    /// A statistical relationship between two attributes.
    Correlation
);
record!(
    /// The mean value of an attribute over a period.
    Average
);
record!(User);

impl Attribute {
    pub fn label(&self) -> Option<&str> {
        self.get_str("label")
    }

    /// The historical values of the attribute, when the API includes them.
    pub fn values(&self) -> Option<&Vec<Value>> {
        self.get("values").and_then(Value::as_array)
    }
}

impl Insight {
    pub fn text(&self) -> Option<&str> {
        self.get_str("text")
    }

    pub fn created(&self) -> Option<&str> {
        self.get_str("created")
    }
}

impl Correlation {
    pub fn attribute(&self) -> Option<&str> {
        self.get_str("attribute")
    }

    pub fn attribute2(&self) -> Option<&str> {
        self.get_str("attribute2")
    }

    pub fn stars(&self) -> Option<i64> {
        self.get("stars").and_then(Value::as_i64)
    }
}

impl Average {
    pub fn attribute(&self) -> Option<&str> {
        self.get_str("attribute")
    }

    pub fn overall(&self) -> Option<f64> {
        self.get("overall").and_then(Value::as_f64)
    }
}

impl User {
    pub fn username(&self) -> Option<&str> {
        self.get_str("username")
    }

    pub fn timezone(&self) -> Option<&str> {
        self.get_str("timezone")
    }
}

/// One page of a list endpoint. The API answers either with a bare array or
/// with an envelope carrying the records under `results`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Page {
    Bare(Vec<Value>),
    Envelope { results: Vec<Value> },
}

impl Page {
    pub(crate) fn into_records<R: Record>(self) -> Result<Vec<R>> {
        let values = match self {
            Page::Bare(values) | Page::Envelope { results: values } => values,
        };
        values.into_iter().map(R::from_value).collect()
    }
}
