//! Schema construction utilities.

use super::JsonSchemaFormat;
use serde_json::{json, Map, Value};

/// Base JSON Schema type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

/// One property schema. Unset constraints are left out of the output.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldType,
    description: Option<String>,
    enum_values: Vec<String>,
    items: Option<Box<Field>>,
    format: Option<String>,
    pattern: Option<String>,
    minimum: Option<Value>,
    maximum: Option<Value>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl Field {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            description: None,
            enum_values: Vec::new(),
            items: None,
            format: None,
            pattern: None,
            minimum: None,
            maximum: None,
            min_items: None,
            max_items: None,
        }
    }

    pub fn kind(&self) -> FieldType {
        self.kind
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Element schema of an array field.
    pub fn items(mut self, items: Field) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    /// String format such as `date`, `date-time`, `uuid` or `email`.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn minimum(mut self, minimum: impl Into<Value>) -> Self {
        self.minimum = Some(minimum.into());
        self
    }

    pub fn maximum(mut self, maximum: impl Into<Value>) -> Self {
        self.maximum = Some(maximum.into());
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn build(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), json!(self.kind.as_str()));
        if let Some(description) = &self.description {
            map.insert("description".into(), json!(description));
        }
        if !self.enum_values.is_empty() {
            map.insert("enum".into(), json!(self.enum_values));
        }
        if let Some(items) = &self.items {
            map.insert("items".into(), items.build());
        }
        if let Some(format) = &self.format {
            map.insert("format".into(), json!(format));
        }
        if let Some(pattern) = &self.pattern {
            map.insert("pattern".into(), json!(pattern));
        }
        if let Some(minimum) = &self.minimum {
            map.insert("minimum".into(), minimum.clone());
        }
        if let Some(maximum) = &self.maximum {
            map.insert("maximum".into(), maximum.clone());
        }
        if let Some(n) = self.min_items {
            map.insert("minItems".into(), json!(n));
        }
        if let Some(n) = self.max_items {
            map.insert("maxItems".into(), json!(n));
        }
        map.into()
    }
}

/// Top-level object schema. `additionalProperties` is always `false`, as
/// strict structured outputs require.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    properties: Vec<(String, Value)>,
    required: Vec<String>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optional(mut self, name: impl Into<String>, field: Field) -> Self {
        self.properties.push((name.into(), field.build()));
        self
    }

    pub fn required(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.push((name, field.build()));
        self
    }

    pub fn build(self) -> Value {
        let properties: Map<String, Value> = self.properties.into_iter().collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "additionalProperties": false,
        })
    }

    /// Strict format named `name`.
    pub fn into_format(self, name: impl Into<String>) -> JsonSchemaFormat {
        JsonSchemaFormat::new(name, self.build())
    }
}

/// A flat field description for [`simple_schema`].
#[derive(Debug, Clone)]
pub struct SimpleField {
    pub name: String,
    pub kind: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub enum_values: Vec<String>,
    pub format: Option<String>,
}

impl SimpleField {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: false,
            enum_values: Vec::new(),
            format: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Builds a schema without nesting from a list of fields.
pub fn simple_schema(name: impl Into<String>, fields: &[SimpleField], strict: bool) -> JsonSchemaFormat {
    let mut schema = ObjectSchema::new();
    for f in fields {
        let mut field = Field::new(f.kind).one_of(f.enum_values.iter().cloned());
        if let Some(description) = &f.description {
            field = field.description(description.clone());
        }
        if let Some(format) = &f.format {
            field = field.format(format.clone());
        }
        schema = if f.required {
            schema.required(f.name.clone(), field)
        } else {
            schema.optional(f.name.clone(), field)
        };
    }
    schema.into_format(name).strict(strict)
}
