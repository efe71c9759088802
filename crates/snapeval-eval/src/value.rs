//! Value, type and variable proxies over remote handles.

use std::fmt;
use std::hash::{Hash, Hasher};

use snapeval_parser::types::{JType, Primitive, STRING};

use crate::error::ProtocolResult;
use crate::ops;
use crate::target::{ObjectId, Target, TypeCategory, TypeId};

/// A value living in the target process.
///
/// Primitives are carried by value. Objects are handles; two object values
/// are equal exactly when they name the same remote object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectId),
}

impl Value {
    /// The primitive type of this value, if it is one.
    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Value::Boolean(_) => Primitive::Boolean,
            Value::Byte(_) => Primitive::Byte,
            Value::Char(_) => Primitive::Char,
            Value::Short(_) => Primitive::Short,
            Value::Int(_) => Primitive::Int,
            Value::Long(_) => Primitive::Long,
            Value::Float(_) => Primitive::Float,
            Value::Double(_) => Primitive::Double,
            Value::Null | Value::Object(_) => return None,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The integral value widened to `i64`, for any integral primitive.
    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Value::Byte(x) => Some(x as i64),
            Value::Char(x) => Some(x as i64),
            Value::Short(x) => Some(x as i64),
            Value::Int(x) => Some(x as i64),
            Value::Long(x) => Some(x),
            _ => None,
        }
    }

    /// Default value of a variable of type `ty`.
    pub fn default_for(ty: &JType) -> Value {
        match ty {
            JType::Primitive(Primitive::Boolean) => Value::Boolean(false),
            JType::Primitive(Primitive::Byte) => Value::Byte(0),
            JType::Primitive(Primitive::Char) => Value::Char(0),
            JType::Primitive(Primitive::Short) => Value::Short(0),
            JType::Primitive(Primitive::Int) => Value::Int(0),
            JType::Primitive(Primitive::Long) => Value::Long(0),
            JType::Primitive(Primitive::Float) => Value::Float(0.0),
            JType::Primitive(Primitive::Double) => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Object(id) => write!(f, "{}", id),
            Value::Char(c) => write!(f, "'{}'", ops::char_string(*c)),
            primitive => write!(f, "{}", ops::primitive_string(primitive).unwrap_or_default()),
        }
    }
}

/// A loaded type. Equality and hashing use the remote handle only.
#[derive(Debug, Clone)]
pub struct RemoteType {
    pub id: TypeId,
    pub name: String,
    pub category: TypeCategory,
}

impl RemoteType {
    pub fn fetch(target: &dyn Target, id: TypeId) -> ProtocolResult<Self> {
        Ok(Self {
            id,
            name: target.type_name(id)?,
            category: target.type_category(id)?,
        })
    }

    pub fn is_array(&self) -> bool {
        self.category == TypeCategory::Array
    }
}

impl PartialEq for RemoteType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RemoteType {}

impl Hash for RemoteType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RemoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A declared local of a paused frame, with the value it held when the
/// context was built.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub type_name: String,
    pub value: Value,
}

/// An assignable location: what lvalue instructions push.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    /// A local declared inside the snippet
    SnippetLocal(String),
    /// A local of the paused frame
    FrameLocal(String),
    Field {
        object: ObjectId,
        owner: RemoteType,
        name: String,
    },
    StaticField {
        owner: RemoteType,
        name: String,
    },
    ArrayElement {
        array: ObjectId,
        index: i32,
    },
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::SnippetLocal(name) | Variable::FrameLocal(name) => write!(f, "{}", name),
            Variable::Field { object, name, .. } => write!(f, "{}.{}", object, name),
            Variable::StaticField { owner, name } => write!(f, "{}.{}", owner, name),
            Variable::ArrayElement { array, index } => write!(f, "{}[{}]", array, index),
        }
    }
}

/// Render a value for display: strings quoted, other objects as
/// `Type (object#id)`, primitives as literals.
pub fn describe(target: &dyn Target, value: &Value) -> ProtocolResult<String> {
    let Value::Object(id) = value else {
        return Ok(value.to_string());
    };
    let type_name = target.type_name(target.object_type(*id)?)?;
    if type_name == STRING {
        return Ok(format!("{:?}", target.string_value(*id)?));
    }
    if type_name.ends_with("[]") {
        let length = target.array_length(*id)?;
        let mut items = Vec::new();
        for index in 0..length.min(16) {
            items.push(describe(target, &target.array_get(*id, index)?)?);
        }
        if length > 16 {
            items.push("...".to_string());
        }
        return Ok(format!("{} {{{}}}", type_name, items.join(", ")));
    }
    Ok(format!("{} ({})", type_name, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_equality_is_identity() {
        assert_eq!(Value::Object(ObjectId(4)), Value::Object(ObjectId(4)));
        assert_ne!(Value::Object(ObjectId(4)), Value::Object(ObjectId(5)));
        assert_ne!(Value::Null, Value::Object(ObjectId(0)));
    }

    #[test]
    fn test_remote_type_equality_ignores_name() {
        let a = RemoteType {
            id: TypeId(1),
            name: "a.A".into(),
            category: TypeCategory::Class,
        };
        let b = RemoteType {
            name: "renamed".into(),
            ..a.clone()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_primitives() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Double(2.0).to_string(), "2.0");
        assert_eq!(Value::Char('x' as u16).to_string(), "'x'");
        assert_eq!(Value::Boolean(true).to_string(), "true");
    }

    #[test]
    fn test_default_values() {
        assert_eq!(Value::default_for(&JType::int()), Value::Int(0));
        assert_eq!(Value::default_for(&JType::string()), Value::Null);
        assert_eq!(Value::default_for(&JType::boolean()), Value::Boolean(false));
    }
}
