//! Declarative output schemas.
//!
//! A [`Schema`] is a flat list of named fields with a semantic type and an
//! optional description. It can be built by hand with [`SchemaBuilder`],
//! converted from a JSON Schema document, or derived from any type that
//! implements [`schemars::JsonSchema`].

use std::collections::HashSet;
use std::fmt;

use schemars::JsonSchema;
use serde_json::{json, Map, Value};

use crate::error::{Result, StructuredError};

/// Nesting limit when following `$ref` chains, guards against recursive types.
const MAX_SCHEMA_DEPTH: usize = 32;

/// Semantic type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    /// A number with no fractional part.
    Integer,
    Boolean,
    /// An array, optionally with a type every item must satisfy.
    Array(Option<Box<FieldType>>),
    /// An object, optionally with its own field list.
    Object(Option<Schema>),
}

impl FieldType {
    /// Array whose items must all have type `item`.
    pub fn array_of(item: FieldType) -> Self {
        Self::Array(Some(Box::new(item)))
    }

    /// Nested object validated against `schema`.
    pub fn object(schema: Schema) -> Self {
        Self::Object(Some(schema))
    }

    /// The JSON type name used in prompts and violation messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            Self::Array(Some(item)) => json!({ "type": "array", "items": item.to_json_schema() }),
            Self::Object(Some(schema)) => schema.to_json_schema(),
            other => json!({ "type": other.name() }),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(Some(item)) => write!(f, "array of {item}"),
            other => f.write_str(other.name()),
        }
    }
}

/// A single named field in a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    field_type: FieldType,
    description: Option<String>,
    required: bool,
}

impl Field {
    /// A required field with no description.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: None,
            required: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.trim().is_empty()).then_some(description);
        self
    }

    /// Mark the field optional: absent or `null` values are accepted.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Immutable description of the fields a generated JSON object must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    title: Option<String>,
    fields: Vec<Field>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Derive a schema from a Rust type via its `schemars` JSON Schema.
    ///
    /// ```rust
    /// use schemars::JsonSchema;
    /// use structured_json_output::Schema;
    ///
    /// #[derive(JsonSchema)]
    /// struct Joke {
    ///     /// question to set up a joke
    ///     setup: String,
    ///     /// answer to resolve the joke
    ///     punchline: String,
    /// }
    ///
    /// let schema = Schema::for_type::<Joke>().unwrap();
    /// assert_eq!(schema.fields().len(), 2);
    /// assert_eq!(schema.field("setup").unwrap().description(), Some("question to set up a joke"));
    /// ```
    pub fn for_type<T: JsonSchema>() -> Result<Self> {
        let root = serde_json::to_value(schemars::schema_for!(T))?;
        Self::from_json_schema(&root)
    }

    /// Convert a JSON Schema object document into a field list.
    ///
    /// `$ref`s into `$defs`/`definitions` are resolved, nullable unions are
    /// collapsed to their non-null branch, and properties missing from
    /// `required` become optional fields.
    pub fn from_json_schema(root: &Value) -> Result<Self> {
        convert_object(root, root, 0)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Render as a JSON Schema object. Extra properties stay allowed.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = field.field_type.to_json_schema();
            if let (Some(desc), Some(obj)) = (&field.description, prop.as_object_mut()) {
                obj.insert("description".to_string(), Value::String(desc.clone()));
            }
            properties.insert(field.name.clone(), prop);
        }
        let required: Vec<Value> = self
            .required_fields()
            .map(|f| Value::String(f.name.clone()))
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if let (Some(title), Some(obj)) = (&self.title, schema.as_object_mut()) {
            obj.insert("title".to_string(), Value::String(title.clone()));
        }
        schema
    }

    fn fmt_fields(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        for field in &self.fields {
            let requirement = if field.required { "required" } else { "optional" };
            write!(
                f,
                "{:indent$}- \"{}\" ({}, {})",
                "",
                field.name,
                field.field_type,
                requirement,
                indent = indent
            )?;
            if let Some(desc) = &field.description {
                write!(f, ": {desc}")?;
            }
            writeln!(f)?;
            match &field.field_type {
                FieldType::Object(Some(nested)) => nested.fmt_fields(f, indent + 2)?,
                FieldType::Array(Some(item)) => {
                    if let FieldType::Object(Some(nested)) = item.as_ref() {
                        writeln!(f, "{:indent$}  each item has fields:", "", indent = indent)?;
                        nested.fmt_fields(f, indent + 4)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Field listing used inside prompts, one line per field.
impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_fields(f, 0)
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    title: Option<String>,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a required field.
    pub fn field(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.push(Field::new(name, field_type).with_description(description))
    }

    /// Add an optional field.
    pub fn optional_field(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.push(
            Field::new(name, field_type)
                .with_description(description)
                .optional(),
        )
    }

    pub fn push(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Finish the schema. Fails on an empty field list, blank names or duplicates.
    pub fn build(self) -> Result<Schema> {
        if self.fields.is_empty() {
            return Err(StructuredError::Schema(
                "schema must declare at least one field".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(StructuredError::Schema(
                    "field names must not be empty".to_string(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StructuredError::Schema(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(Schema {
            title: self.title,
            fields: self.fields,
        })
    }
}

fn resolve<'a>(node: &'a Value, root: &'a Value, depth: usize) -> Result<&'a Value> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(StructuredError::Schema(
            "schema nesting too deep (recursive type?)".to_string(),
        ));
    }
    match node.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            let pointer = reference.strip_prefix('#').ok_or_else(|| {
                StructuredError::Schema(format!("unsupported external $ref '{reference}'"))
            })?;
            let target = root.pointer(pointer).ok_or_else(|| {
                StructuredError::Schema(format!("unresolved $ref '{reference}'"))
            })?;
            resolve(target, root, depth + 1)
        }
        None => Ok(node),
    }
}

fn convert_object(node: &Value, root: &Value, depth: usize) -> Result<Schema> {
    let node = resolve(node, root, depth)?;
    let properties = node
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| StructuredError::Schema("expected an object schema with properties".into()))?;
    let required: HashSet<&str> = node
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut builder = SchemaBuilder::new();
    if let Some(title) = node.get("title").and_then(Value::as_str) {
        builder = builder.title(title);
    }
    for (name, prop) in properties {
        let field_type = convert_type(prop, root, depth + 1)?;
        let description = prop
            .get("description")
            .or_else(|| {
                resolve(prop, root, depth + 1)
                    .ok()
                    .and_then(|p| p.get("description"))
            })
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut field = Field::new(name.clone(), field_type).with_description(description);
        if !required.contains(name.as_str()) {
            field = field.optional();
        }
        builder = builder.push(field);
    }
    builder.build()
}

fn convert_type(node: &Value, root: &Value, depth: usize) -> Result<FieldType> {
    let node = resolve(node, root, depth)?;

    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(branches) = node.get(key).and_then(Value::as_array) {
            let non_null: Vec<&Value> = branches
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            return match non_null.as_slice() {
                [single] => convert_type(single, root, depth + 1),
                _ => Err(StructuredError::Schema(format!(
                    "unsupported '{key}' union with {} alternatives",
                    non_null.len()
                ))),
            };
        }
    }

    let type_name = match node.get("type") {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null"),
        _ => None,
    };
    let type_name = match type_name {
        Some(name) => name,
        None if node.get("properties").is_some() => "object",
        None => match node
            .get("enum")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .or_else(|| node.get("const"))
        {
            Some(sample) => crate::validation::json_type_name(sample),
            None => {
                return Err(StructuredError::Schema(format!(
                    "cannot determine a type for {node}"
                )))
            }
        },
    };

    match type_name {
        "string" => Ok(FieldType::String),
        "number" => Ok(FieldType::Number),
        "integer" => Ok(FieldType::Integer),
        "boolean" => Ok(FieldType::Boolean),
        "array" => {
            let item = node
                .get("items")
                .filter(|items| items.is_object())
                .map(|items| convert_type(items, root, depth + 1))
                .transpose()?;
            Ok(FieldType::Array(item.map(Box::new)))
        }
        "object" => {
            let has_properties = node
                .get("properties")
                .and_then(Value::as_object)
                .is_some_and(|props| !props.is_empty());
            if has_properties {
                Ok(FieldType::Object(Some(convert_object(node, root, depth + 1)?)))
            } else {
                Ok(FieldType::Object(None))
            }
        }
        other => Err(StructuredError::Schema(format!(
            "unsupported JSON type '{other}'"
        ))),
    }
}
