//! 结构化输出模块：按 JSON Schema 约束模型回答并解析为 JSON。
//!
//! # Structured Output
//!
//! - [`Field`] / [`ObjectSchema`]: build a strict object schema field by field
//! - [`simple_schema`]: flat schemas from a list of [`SimpleField`]s
//! - [`JsonSchemaFormat`]: named schema sent as the `response_format` of a chat call
//!
//! ```
//! use ai_gateway::structured::{Field, FieldType, ObjectSchema};
//!
//! let format = ObjectSchema::new()
//!     .required("name", Field::new(FieldType::String))
//!     .required("date", Field::new(FieldType::String).format("date"))
//!     .required(
//!         "participants",
//!         Field::new(FieldType::Array).items(Field::new(FieldType::String)),
//!     )
//!     .into_format("event");
//!
//! let wire = format.to_response_format();
//! assert_eq!(wire["type"], "json_schema");
//! assert_eq!(wire["json_schema"]["schema"]["additionalProperties"], false);
//! ```

pub mod json_mode;
pub mod schema;

pub use json_mode::{parse_structured, JsonSchemaFormat};
pub use schema::{simple_schema, Field, FieldType, ObjectSchema, SimpleField};
