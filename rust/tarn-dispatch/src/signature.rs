//! Function signatures and call arguments, as seen by overload resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use tarn_core::types::{Flavor, TypeRegistry, ValueType};
use tarn_core::values::Value;

pub const TUPLE: &str = "tuple";
pub const ANY: &str = "any";
pub const BLING: &str = "bling";
pub const VARNAME: &str = "varname";
pub const REF: &str = "ref";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: String,
}

impl Parameter {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }

    /// A bling parameter; its name is the keyword it matches.
    pub fn bling(keyword: &str) -> Self {
        Self::new(keyword, BLING)
    }

    pub fn is_bling(&self) -> bool {
        self.ty == BLING
    }

    pub fn is_ref(&self) -> bool {
        self.ty == REF
    }

    /// Whether this parameter can soak up any number of trailing arguments.
    pub fn is_variadic(&self) -> bool {
        self.ty == TUPLE || self.ty == ANY
    }

    /// The label a dispatch tree uses for this position.
    pub fn tree_label(&self) -> &str {
        if self.is_bling() {
            &self.name
        } else {
            &self.ty
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<Parameter>);

impl Signature {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self(params)
    }

    pub fn params(&self) -> &[Parameter] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of leading `ref` parameters.
    pub fn ref_count(&self) -> usize {
        self.0.iter().take_while(|p| p.is_ref()).count()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if p.is_bling() {
                write!(f, "{}", p.name)?;
            } else {
                write!(f, "{} {}", p.name, p.ty)?;
            }
        }
        write!(f, ")")
    }
}

/// The type of one call argument, and its keyword text if it is bling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub ty: String,
    pub bling: Option<String>,
}

impl Argument {
    pub fn of_type(ty: &str) -> Self {
        Self {
            ty: ty.to_string(),
            bling: None,
        }
    }

    pub fn bling(keyword: &str) -> Self {
        Self {
            ty: BLING.to_string(),
            bling: Some(keyword.to_string()),
        }
    }

    /// Describes a runtime value by its true concrete type name.
    pub fn from_value(v: &Value, types: &TypeRegistry) -> Self {
        if v.ty == ValueType::BLING {
            return Self::bling(v.as_str().unwrap_or_default());
        }
        Self::of_type(&types.describe_type(v.ty, Flavor::Default))
    }
}
