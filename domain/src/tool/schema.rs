//! Tool schema adapter.
//!
//! Maps the backend catalog onto the completion service's function-calling
//! schema. The model validates generated arguments against `parameters`, so
//! `name` and the parameter schema are carried over untouched.

use crate::tool::entities::{FunctionSpec, ToolDescriptor};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaAdaptationError {
    #[error("tool descriptor #{index} ('{tool}') is missing required field '{field}'")]
    MissingField {
        index: usize,
        tool: String,
        field: &'static str,
    },
}

/// Adapt a whole catalog, preserving its order.
pub fn adapt(catalog: &[ToolDescriptor]) -> Result<Vec<FunctionSpec>, SchemaAdaptationError> {
    catalog
        .iter()
        .enumerate()
        .map(|(index, descriptor)| adapt_descriptor(index, descriptor))
        .collect()
}

fn adapt_descriptor(
    index: usize,
    descriptor: &ToolDescriptor,
) -> Result<FunctionSpec, SchemaAdaptationError> {
    if descriptor.name.is_empty() {
        return Err(SchemaAdaptationError::MissingField {
            index,
            tool: String::new(),
            field: "name",
        });
    }

    let parameters = descriptor.parameter_schema.clone().ok_or_else(|| {
        SchemaAdaptationError::MissingField {
            index,
            tool: descriptor.name.clone(),
            field: "parameter_schema",
        }
    })?;

    Ok(FunctionSpec {
        name: descriptor.name.clone(),
        description: descriptor.description.clone().unwrap_or_default(),
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adapt_echo_descriptor() {
        let catalog = vec![ToolDescriptor::new(
            "echo",
            "echoes input",
            json!({"text": "string"}),
        )];

        let specs = adapt(&catalog).unwrap();

        assert_eq!(
            specs,
            vec![FunctionSpec {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                parameters: json!({"text": "string"}),
            }]
        );
    }

    #[test]
    fn test_adapt_preserves_schema_bytes() {
        // Keys deliberately out of alphabetical order.
        let raw = r#"{"type":"object","properties":{"zeta":{"type":"string"},"alpha":{"type":"integer","minimum":0}},"required":["zeta"]}"#;
        let schema: serde_json::Value = serde_json::from_str(raw).unwrap();
        let catalog = vec![ToolDescriptor::new("query", "run a query", schema)];

        let specs = adapt(&catalog).unwrap();

        assert_eq!(specs[0].name, "query");
        assert_eq!(serde_json::to_string(&specs[0].parameters).unwrap(), raw);
    }

    #[test]
    fn test_adapt_keeps_catalog_order() {
        let catalog = vec![
            ToolDescriptor::new("b", "", json!({})),
            ToolDescriptor::new("a", "", json!({})),
        ];
        let names: Vec<_> = adapt(&catalog).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_missing_description_becomes_empty() {
        let catalog = vec![ToolDescriptor {
            name: "ping".to_string(),
            description: None,
            parameter_schema: Some(json!({"type": "object"})),
        }];
        assert_eq!(adapt(&catalog).unwrap()[0].description, "");
    }

    #[test]
    fn test_missing_schema_fails() {
        let catalog = vec![ToolDescriptor {
            name: "ping".to_string(),
            description: Some("pings".to_string()),
            parameter_schema: None,
        }];
        assert_eq!(
            adapt(&catalog).unwrap_err(),
            SchemaAdaptationError::MissingField {
                index: 0,
                tool: "ping".to_string(),
                field: "parameter_schema",
            }
        );
    }

    #[test]
    fn test_missing_name_fails() {
        let catalog = vec![
            ToolDescriptor::new("ok", "", json!({})),
            ToolDescriptor::new("", "nameless", json!({})),
        ];
        let err = adapt(&catalog).unwrap_err();
        assert!(matches!(
            err,
            SchemaAdaptationError::MissingField { index: 1, field: "name", .. }
        ));
    }
}
