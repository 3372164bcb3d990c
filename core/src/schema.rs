//! Field and type descriptors.
//!
//! # Design
//! A `Schema` is the raw, declarative field list a caller writes once (by
//! hand or from JSON). A `TypeDescriptor` is its compiled, queryable form:
//! an ordered list of `FieldDescriptor`s plus a name index. Compilation is
//! memoized by `SchemaCache` in the caller, keyed by the field list itself,
//! so the raw schema stays a plain immutable value.
//!
//! Coercion is a closed set of `ScalarType` variants, each mapped to one
//! conversion function in `coerce`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce;
use crate::error::BindError;

/// Scalar kinds a field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Number => "number",
            ScalarType::Boolean => "boolean",
            ScalarType::Date => "date",
        }
    }

    /// Convert a non-null value to this kind; `None` when it cannot be.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        let convert = match self {
            ScalarType::String => coerce::to_string,
            ScalarType::Integer => coerce::to_integer,
            ScalarType::Number => coerce::to_number,
            ScalarType::Boolean => coerce::to_boolean,
            ScalarType::Date => coerce::to_date,
        };
        convert(value)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a raw schema, in its JSON shape
/// `{"name", "jsType", "required", "isArray"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "jsType")]
    pub js_type: ScalarType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "isArray", default)]
    pub is_array: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, js_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            js_type,
            required: false,
            is_array: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }
}

/// Declared field list for one request shape.
///
/// Field names are unique; construction fails otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldSpec>", into = "Vec<FieldSpec>")]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, BindError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(BindError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn compile(&self) -> TypeDescriptor {
        TypeDescriptor::new(self)
    }
}

impl TryFrom<Vec<FieldSpec>> for Schema {
    type Error = BindError;

    fn try_from(fields: Vec<FieldSpec>) -> Result<Self, Self::Error> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<FieldSpec> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// Coercion rule for one named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    kind: ScalarType,
    required: bool,
    is_array: bool,
}

impl FieldDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScalarType {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Coerce `container[name]` in place. A missing entry is left alone.
    ///
    /// Array fields convert element-wise; a lone scalar sent for an array
    /// field is wrapped into a one-element array first.
    pub fn cast(&self, container: &mut Map<String, Value>) -> Result<(), BindError> {
        let Some(slot) = container.get_mut(&self.name) else {
            return Ok(());
        };
        if slot.is_null() {
            return self.check_null();
        }
        if !self.is_array {
            *slot = self.convert(slot)?;
            return Ok(());
        }
        if !slot.is_array() {
            *slot = Value::Array(vec![slot.take()]);
        }
        if let Value::Array(items) = slot {
            for item in items.iter_mut() {
                if item.is_null() {
                    self.check_null()?;
                } else {
                    *item = self.convert(item)?;
                }
            }
        }
        Ok(())
    }

    fn convert(&self, value: &Value) -> Result<Value, BindError> {
        self.kind.coerce(value).ok_or_else(|| BindError::Coercion {
            field: self.name.clone(),
            expected: self.kind,
            value: value.clone(),
        })
    }

    fn check_null(&self) -> Result<(), BindError> {
        if self.required {
            Err(BindError::RequiredNull(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

impl From<&FieldSpec> for FieldDescriptor {
    fn from(spec: &FieldSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.js_type,
            required: spec.required,
            is_array: spec.is_array,
        }
    }
}

/// Compiled form of a `Schema`: ordered descriptors plus a name index.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

impl TypeDescriptor {
    pub fn new(schema: &Schema) -> Self {
        let fields: Vec<FieldDescriptor> = schema.fields().iter().map(FieldDescriptor::from).collect();
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self { fields, index }
    }

    /// Look up a field; unknown names are a caller error.
    pub fn get(&self, name: &str) -> Result<&FieldDescriptor, BindError> {
        self.index
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| BindError::UnknownField(name.to_string()))
    }

    pub fn as_slice(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Required fields in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.required)
    }
}
