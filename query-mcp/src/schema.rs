use schemars::Schema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tool::ToolError;

pub type RootSchema = Schema;

pub fn schema_for<T: schemars::JsonSchema>() -> RootSchema {
    schemars::schema_for!(T)
}

/// Decodes a raw argument map into a tool's typed arguments.
///
/// Argument types are expected to carry `#[serde(deny_unknown_fields)]`, so
/// unknown names, missing required names and mistyped values all surface as
/// [`ToolError::InvalidArgs`]. A missing payload decodes like `{}`.
pub fn decode_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Args {
        /// Table to read.
        table: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[test]
    fn required_and_unknown_arguments_are_rejected() {
        let ok: Args = decode_args(json!({"table": "songs"})).unwrap();
        assert_eq!(ok.table, "songs");
        assert!(ok.limit.is_none());

        let missing = decode_args::<Args>(json!({})).unwrap_err();
        assert!(matches!(missing, ToolError::InvalidArgs(ref m) if m.contains("table")));

        let unknown = decode_args::<Args>(json!({"table": "songs", "tabel": 1})).unwrap_err();
        assert!(matches!(unknown, ToolError::InvalidArgs(ref m) if m.contains("tabel")));

        let mistyped = decode_args::<Args>(json!({"table": 5})).unwrap_err();
        assert!(matches!(mistyped, ToolError::InvalidArgs(_)));
    }

    #[test]
    fn schema_lists_required_properties() {
        let schema = serde_json::to_value(schema_for::<Args>()).unwrap();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["table"]));
        assert!(schema["properties"]["limit"].is_object());
    }
}
