//! Static type environments.
//!
//! [`MapEnvironment`] is a plain in-memory `TypeEnvironment`, filled from
//! [`ClassDescription`]s (the JSON form used by `snapevalc` and test
//! fixtures) and optionally seeded with the core `java.lang` types.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snapeval_parser::resolve::CONSTRUCTOR_NAME;
use snapeval_parser::types::{JType, Primitive, OBJECT};
use snapeval_parser::{FieldInfo, MethodInfo, TypeEnvironment, TypeInfo, TypeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescription {
    /// Method name; constructors use `<init>`
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "void_type")]
    pub returns: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub varargs: bool,
}

fn void_type() -> String {
    "void".to_string()
}

/// Shape of a class as described in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescription {
    pub name: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
    #[serde(default)]
    pub methods: Vec<MethodDescription>,
}

impl ClassDescription {
    pub fn to_type_info(&self) -> TypeInfo {
        let kind = match self.kind {
            ClassKind::Class => TypeKind::Class,
            ClassKind::Interface => TypeKind::Interface,
            ClassKind::Enum => TypeKind::Enum,
        };
        let superclass = match (&self.superclass, kind) {
            (Some(s), _) => Some(s.clone()),
            (None, TypeKind::Interface) => None,
            (None, TypeKind::Enum) => Some("java.lang.Enum".to_string()),
            (None, TypeKind::Class) if self.name == OBJECT => None,
            (None, TypeKind::Class) => Some(OBJECT.to_string()),
        };
        TypeInfo {
            name: self.name.clone(),
            kind,
            superclass,
            interfaces: self.interfaces.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldInfo {
                    name: f.name.clone(),
                    ty: JType::from_type_name(&f.type_name),
                    is_static: f.is_static,
                })
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|m| MethodInfo {
                    name: m.name.clone(),
                    params: m.params.iter().map(|p| JType::from_type_name(p)).collect(),
                    ret: JType::from_type_name(&m.returns),
                    is_static: m.is_static,
                    is_constructor: m.name == CONSTRUCTOR_NAME,
                    varargs: m.varargs,
                })
                .collect(),
        }
    }
}

/// A `TypeEnvironment` backed by a map of binary names.
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    types: HashMap<String, Arc<TypeInfo>>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment holding the core `java.lang` types.
    pub fn with_core_types() -> Self {
        let mut env = Self::new();
        for info in core_types() {
            env.insert(info);
        }
        env
    }

    pub fn insert(&mut self, info: TypeInfo) {
        self.types.insert(info.name.clone(), Arc::new(info));
    }

    pub fn add_descriptions(&mut self, classes: &[ClassDescription]) {
        for class in classes {
            self.insert(class.to_type_info());
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeEnvironment for MapEnvironment {
    fn lookup(&self, binary_name: &str) -> Option<Arc<TypeInfo>> {
        self.types.get(binary_name).cloned()
    }
}

fn method(name: &str, params: &[JType], ret: JType, is_static: bool) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        params: params.to_vec(),
        ret,
        is_static,
        is_constructor: name == CONSTRUCTOR_NAME,
        varargs: false,
    }
}

fn class(name: &str, superclass: Option<&str>, methods: Vec<MethodInfo>) -> TypeInfo {
    TypeInfo {
        name: name.to_string(),
        kind: TypeKind::Class,
        superclass: superclass.map(str::to_string),
        interfaces: Vec::new(),
        fields: Vec::new(),
        methods,
    }
}

/// Signatures of the `java.lang` members snippets commonly touch.
pub fn core_types() -> Vec<TypeInfo> {
    let string = JType::string();
    let object = JType::object();
    let int = JType::int();
    let boolean = JType::boolean();
    let class_type = JType::Class(snapeval_parser::types::CLASS.to_string());

    let mut types = vec![
        class(
            OBJECT,
            None,
            vec![
                method(CONSTRUCTOR_NAME, &[], JType::Void, false),
                method("toString", &[], string.clone(), false),
                method("equals", &[object.clone()], boolean.clone(), false),
                method("hashCode", &[], int.clone(), false),
                method("getClass", &[], class_type.clone(), false),
            ],
        ),
        class(
            snapeval_parser::types::STRING,
            Some(OBJECT),
            vec![
                method("length", &[], int.clone(), false),
                method("isEmpty", &[], boolean.clone(), false),
                method("charAt", &[int.clone()], JType::Primitive(Primitive::Char), false),
                method("substring", &[int.clone()], string.clone(), false),
                method("substring", &[int.clone(), int.clone()], string.clone(), false),
                method("indexOf", &[string.clone()], int.clone(), false),
                method("concat", &[string.clone()], string.clone(), false),
                method("toUpperCase", &[], string.clone(), false),
                method("valueOf", &[object.clone()], string.clone(), true),
            ],
        ),
        class(
            snapeval_parser::types::CLASS,
            Some(OBJECT),
            vec![
                method("getName", &[], string.clone(), false),
                method("isInstance", &[object.clone()], boolean.clone(), false),
                method("forName", &[string.clone()], class_type.clone(), true),
            ],
        ),
        class("java.lang.Number", Some(OBJECT), Vec::new()),
        class(
            snapeval_parser::types::THROWABLE,
            Some(OBJECT),
            vec![
                method(CONSTRUCTOR_NAME, &[], JType::Void, false),
                method(CONSTRUCTOR_NAME, &[string.clone()], JType::Void, false),
                method("getMessage", &[], string.clone(), false),
            ],
        ),
        class("java.lang.Exception", Some(snapeval_parser::types::THROWABLE), Vec::new()),
        class("java.lang.RuntimeException", Some("java.lang.Exception"), Vec::new()),
        class("java.lang.ArithmeticException", Some("java.lang.RuntimeException"), Vec::new()),
        class("java.lang.ClassCastException", Some("java.lang.RuntimeException"), Vec::new()),
        class("java.lang.NullPointerException", Some("java.lang.RuntimeException"), Vec::new()),
        class(
            "java.lang.IllegalStateException",
            Some("java.lang.RuntimeException"),
            vec![
                method(CONSTRUCTOR_NAME, &[], JType::Void, false),
                method(CONSTRUCTOR_NAME, &[string.clone()], JType::Void, false),
            ],
        ),
        class(
            "java.lang.Math",
            Some(OBJECT),
            vec![
                method("abs", &[int.clone()], int.clone(), true),
                method("abs", &[JType::Primitive(Primitive::Double)], JType::Primitive(Primitive::Double), true),
                method("max", &[int.clone(), int.clone()], int.clone(), true),
                method("min", &[int.clone(), int.clone()], int.clone(), true),
            ],
        ),
    ];

    // Subclasses of Throwable inherit its constructors only by declaring them.
    for info in types.iter_mut() {
        if info.name.ends_with("Exception") && info.constructors().next().is_none() {
            info.methods.push(method(CONSTRUCTOR_NAME, &[], JType::Void, false));
            info.methods.push(method(CONSTRUCTOR_NAME, &[string.clone()], JType::Void, false));
        }
    }

    for p in Primitive::ALL {
        let wrapper = JType::Class(p.box_class().to_string());
        let superclass = if p.is_numeric() && p != Primitive::Char {
            "java.lang.Number"
        } else {
            OBJECT
        };
        let value_method = format!("{}Value", p.name());
        types.push(class(
            p.box_class(),
            Some(superclass),
            vec![
                method("valueOf", &[JType::Primitive(p)], wrapper, true),
                method(&value_method, &[], JType::Primitive(p), false),
            ],
        ));
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_types_include_wrappers() {
        let env = MapEnvironment::with_core_types();
        let integer = env.lookup("java.lang.Integer").unwrap();
        assert_eq!(integer.superclass.as_deref(), Some("java.lang.Number"));
        assert!(integer.methods.iter().any(|m| m.name == "intValue"));
        let character = env.lookup("java.lang.Character").unwrap();
        assert_eq!(character.superclass.as_deref(), Some(OBJECT));
        assert!(env.lookup("java.lang.ArithmeticException").unwrap().constructors().count() == 2);
    }

    #[test]
    fn test_class_description_from_json() {
        let json = r#"{
            "name": "geo.Point",
            "fields": [{"name": "x", "type": "int"}, {"name": "ORIGIN", "type": "geo.Point", "is_static": true}],
            "methods": [
                {"name": "<init>", "params": ["int", "int"]},
                {"name": "scaled", "params": ["double"], "returns": "geo.Point"}
            ]
        }"#;
        let desc: ClassDescription = serde_json::from_str(json).unwrap();
        let info = desc.to_type_info();
        assert_eq!(info.superclass.as_deref(), Some(OBJECT));
        assert_eq!(info.fields[1].ty, JType::Class("geo.Point".into()));
        assert!(info.methods[0].is_constructor);
        assert_eq!(info.methods[0].ret, JType::Void);
        assert_eq!(info.methods[1].params, vec![JType::Primitive(Primitive::Double)]);
    }
}
