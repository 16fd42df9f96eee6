use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One answer in `formData`. Multi-select questions repeat their key and
/// arrive as arrays; anything else the form posts is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Text(String),
    List(Vec<String>),
    Other(Value),
}

impl FormValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Value as printed in the summary, or `None` when there is nothing to show.
    pub fn display_value(&self) -> Option<String> {
        let rendered = match self {
            FormValue::Text(text) => text.trim().to_string(),
            FormValue::List(items) => items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !is_blank_answer(item))
                .collect::<Vec<_>>()
                .join(", "),
            FormValue::Other(Value::Null) => String::new(),
            FormValue::Other(Value::Bool(flag)) => flag.to_string(),
            FormValue::Other(Value::Number(n)) => n.to_string(),
            FormValue::Other(other) => other.to_string(),
        };
        if is_blank_answer(&rendered) {
            None
        } else {
            Some(rendered)
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<Vec<&str>> for FormValue {
    fn from(value: Vec<&str>) -> Self {
        FormValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Empty strings and the literal placeholders a browser serializes for unset fields.
pub fn is_blank_answer(value: &str) -> bool {
    matches!(value.trim(), "" | "undefined" | "null")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormData(BTreeMap<String, FormValue>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FormValue::as_text)
    }

    pub fn display_value(&self, key: &str) -> Option<String> {
        self.get(key).and_then(FormValue::display_value)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FormValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSubmission {
    pub first_name: String,
    pub last_name: String,
    /// ISO `YYYY-MM-DD` as posted; other shapes are passed through untouched.
    pub dob: String,
    #[serde(default)]
    pub form_data: FormData,
}

impl IntakeSubmission {
    pub fn new(first_name: &str, last_name: &str, dob: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            dob: dob.to_string(),
            form_data: FormData::new(),
        }
    }

    pub fn with_form_data(mut self, form_data: FormData) -> Self {
        self.form_data = form_data;
        self
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn patient_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_payload_with_arrays() {
        let json = r#"{
            "firstName": "Jane",
            "lastName": "Doe",
            "dob": "1990-05-02",
            "formData": {
                "sex": "F",
                "conditions": ["Diabetes", "Hypertension"],
                "isPatientSigner": true,
                "painLevel": 7,
                "sigTermsPatientData": ""
            }
        }"#;
        let submission = IntakeSubmission::from_json(json).expect("parse");
        assert_eq!(submission.patient_name(), "Jane Doe");
        assert_eq!(submission.form_data.text("sex"), Some("F"));
        assert_eq!(
            submission.form_data.display_value("conditions").as_deref(),
            Some("Diabetes, Hypertension")
        );
        assert_eq!(
            submission.form_data.display_value("isPatientSigner").as_deref(),
            Some("true")
        );
        assert_eq!(submission.form_data.display_value("painLevel").as_deref(), Some("7"));
        assert_eq!(submission.form_data.display_value("sigTermsPatientData"), None);
    }

    #[test]
    fn missing_form_data_defaults_to_empty() {
        let submission =
            IntakeSubmission::from_json(r#"{"firstName":"A","lastName":"B","dob":"x"}"#)
                .expect("parse");
        assert!(submission.form_data.is_empty());
    }

    #[test]
    fn placeholder_answers_are_blank() {
        let data = FormData::new()
            .with("a", "undefined")
            .with("b", "null")
            .with("c", "  ")
            .with("d", vec!["", "null"])
            .with("e", "ok");
        for key in ["a", "b", "c", "d"] {
            assert_eq!(data.display_value(key), None, "{key}");
        }
        assert_eq!(data.display_value("e").as_deref(), Some("ok"));
        assert_eq!(data.display_value("missing"), None);
    }

    #[test]
    fn keys_iterate_sorted() {
        let data = FormData::new().with("zeta", "1").with("alpha", "2");
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn serializes_back_to_camel_case() {
        let submission = IntakeSubmission::new("Jane", "Doe", "1990-05-02")
            .with_form_data(FormData::new().with("sex", "F"));
        let value = serde_json::to_value(&submission).expect("json");
        assert_eq!(value["firstName"], "Jane");
        assert_eq!(value["formData"]["sex"], "F");
    }
}
