use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{FieldDescriptor, MessageSchema};

#[derive(Debug, Error)]
pub enum IntDefError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binding {message:?}.{field} refers to unknown dictionary `{dictionary}`")]
    UnknownDictionary {
        message: Option<String>,
        field: String,
        dictionary: String,
    },
}

/// Binds a field to a flag dictionary. `message` may be a full or short
/// message name; without it the binding applies to the field name anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntDefBinding {
    #[serde(default)]
    pub message: Option<String>,
    pub field: String,
    pub dictionary: String,
}

/// Flag dictionaries and the fields they translate.
///
/// ```json
/// {
///   "dictionaries": { "InputConfig": { "1": "NO_INPUT_CHANNEL", "4": "NOT_FOCUSABLE" } },
///   "bindings": [ { "message": "InputWindowInfoProto", "field": "inputConfig", "dictionary": "InputConfig" } ]
/// }
/// ```
///
/// Fields annotated with a `typedef` option are looked up by the annotation
/// value when no explicit binding matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntDefMap {
    #[serde(default)]
    pub dictionaries: BTreeMap<String, BTreeMap<u64, String>>,
    #[serde(default)]
    pub bindings: Vec<IntDefBinding>,
}

impl IntDefMap {
    pub fn from_json(text: &str) -> Result<Self, IntDefError> {
        let map: Self = serde_json::from_str(text)?;
        map.validate()?;
        Ok(map)
    }

    fn validate(&self) -> Result<(), IntDefError> {
        match self
            .bindings
            .iter()
            .find(|b| !self.dictionaries.contains_key(&b.dictionary))
        {
            Some(b) => Err(IntDefError::UnknownDictionary {
                message: b.message.clone(),
                field: b.field.clone(),
                dictionary: b.dictionary.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn with_dictionary<'a>(
        mut self,
        name: &str,
        flags: impl IntoIterator<Item = (u64, &'a str)>,
    ) -> Self {
        let flags = flags.into_iter().map(|(v, n)| (v, n.to_string())).collect();
        self.dictionaries.insert(name.to_string(), flags);
        self
    }

    pub fn with_binding(mut self, message: Option<&str>, field: &str, dictionary: &str) -> Self {
        self.bindings.push(IntDefBinding {
            message: message.map(str::to_string),
            field: field.to_string(),
            dictionary: dictionary.to_string(),
        });
        self
    }

    /// Dictionary for `field` declared in `message`: an exact
    /// `(message, field)` binding, then a field-only binding, then the
    /// field's `typedef` annotation.
    pub fn dictionary_for(&self, message: &MessageSchema, field: &FieldDescriptor) -> Option<Arc<BTreeMap<u64, String>>> {
        let scoped = self.bindings.iter().find(|b| {
            b.field == field.name
                && b.message
                    .as_deref()
                    .is_some_and(|m| m == message.full_name() || m == message.name())
        });
        let unscoped = || {
            self.bindings
                .iter()
                .find(|b| b.message.is_none() && b.field == field.name)
        };
        let name = scoped
            .or_else(unscoped)
            .map(|b| b.dictionary.as_str())
            .or_else(|| field.annotation("typedef"))?;
        self.dictionaries.get(name).cloned().map(Arc::new)
    }
}

/// Decomposes `value` into flag names.
///
/// Flags are tried from the largest value down against the bits not yet
/// accounted for, so composite flags win over their parts. Leftover bits are
/// appended as a number. Zero maps to a declared zero flag, if any.
pub fn decompose(value: u64, flags: &BTreeMap<u64, String>) -> String {
    if value == 0 {
        return flags.get(&0).cloned().unwrap_or_else(|| "0".to_string());
    }
    let mut left = value;
    let mut names: Vec<String> = Vec::new();
    for (&flag, name) in flags.iter().rev() {
        if flag != 0 && left & flag == flag {
            names.push(name.clone());
            left &= !flag;
        }
    }
    if left != 0 {
        names.push(left.to_string());
    }
    names.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(entries: &[(u64, &str)]) -> BTreeMap<u64, String> {
        entries.iter().map(|(v, n)| (*v, n.to_string())).collect()
    }

    #[test]
    fn residual_bits_are_appended() {
        assert_eq!(decompose(3, &flags(&[(1, "NO_INPUT_CHANNEL")])), "NO_INPUT_CHANNEL | 2");
    }

    #[test]
    fn composite_flags_are_preferred() {
        let f = flags(&[(1, "A"), (2, "B"), (3, "A_AND_B"), (8, "D")]);
        assert_eq!(decompose(3, &f), "A_AND_B");
        assert_eq!(decompose(11, &f), "D | A_AND_B");
    }

    #[test]
    fn zero_and_no_match() {
        assert_eq!(decompose(0, &flags(&[(0, "NONE"), (1, "A")])), "NONE");
        assert_eq!(decompose(0, &flags(&[(1, "A")])), "0");
        assert_eq!(decompose(4, &flags(&[(1, "A")])), "4");
    }

    #[test]
    fn json_config() {
        let map = IntDefMap::from_json(
            r#"{
                "dictionaries": { "LayerFlags": { "1": "HIDDEN", "2": "OPAQUE" } },
                "bindings": [ { "message": "LayerProto", "field": "flags", "dictionary": "LayerFlags" } ]
            }"#,
        )
        .expect("parse");
        assert_eq!(map.dictionaries["LayerFlags"].get(&2).map(String::as_str), Some("OPAQUE"));
        assert_eq!(map.bindings[0].message.as_deref(), Some("LayerProto"));
    }

    #[test]
    fn bindings_must_reference_dictionaries() {
        let err = IntDefMap::from_json(r#"{ "bindings": [ { "field": "flags", "dictionary": "Nope" } ] }"#);
        assert!(matches!(err, Err(IntDefError::UnknownDictionary { .. })));
        assert!(matches!(IntDefMap::from_json("{"), Err(IntDefError::Json(_))));
    }
}
