use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A type the model can be asked to produce as strict JSON.
///
/// Implemented for every `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
  /// JSON schema accepted by strict structured output.
  ///
  /// Strict mode wants `additionalProperties: false` on every object, every
  /// property listed as required (optional ones stay nullable) and no `$ref`s.
  fn strict_schema() -> Value {
    let schema = schema_for!(Self);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    close_objects(&mut value);
    inline_refs(&mut value);

    if let Value::Object(map) = &mut value {
      map.remove("definitions");
      map.remove("$schema");
    }

    value
  }

  /// Name sent alongside the schema.
  fn output_name() -> String {
    <Self as JsonSchema>::schema_name()
  }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close_objects(value: &mut Value) {
  match value {
    Value::Object(map) => {
      if map.get("type") == Some(&Value::String("object".to_string())) {
        map.insert("additionalProperties".to_string(), Value::Bool(false));

        if let Some(Value::Object(props)) = map.get("properties") {
          let keys = props.keys().map(|k| Value::String(k.clone())).collect();
          map.insert("required".to_string(), Value::Array(keys));
        }
      }

      for (_, v) in map.iter_mut() {
        close_objects(v);
      }
    }
    Value::Array(items) => {
      for item in items.iter_mut() {
        close_objects(item);
      }
    }
    _ => {}
  }
}

fn inline_refs(value: &mut Value) {
  let definitions = match value {
    Value::Object(map) => map.get("definitions").cloned(),
    _ => None,
  };

  if let Some(definitions) = definitions {
    inline_refs_with(value, &definitions);
  }
}

fn inline_refs_with(value: &mut Value, definitions: &Value) {
  match value {
    Value::Object(map) => {
      if let Some(Value::String(path)) = map.get("$ref").cloned() {
        if let Some(def) = path
          .strip_prefix("#/definitions/")
          .and_then(|name| definitions.get(name))
        {
          *value = def.clone();
          inline_refs_with(value, definitions);
          return;
        }
      }

      if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
        if let [single] = all_of.as_slice() {
          *value = single.clone();
          inline_refs_with(value, definitions);
          return;
        }
      }

      for (_, v) in map.iter_mut() {
        inline_refs_with(v, definitions);
      }
    }
    Value::Array(items) => {
      for item in items.iter_mut() {
        inline_refs_with(item, definitions);
      }
    }
    _ => {}
  }
}
