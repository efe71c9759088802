//! JSON fixtures describing a paused target process.
//!
//! A fixture lists classes (in the same form `snapevalc` reads), a few heap
//! objects, and the one frame a thread is paused in:
//!
//! ```json
//! {
//!   "classes": [{ "name": "geo.Point", "fields": [{ "name": "x", "type": "int" }] }],
//!   "objects": [{ "id": "p", "class": "geo.Point", "fields": { "x": 3 } }],
//!   "frame": {
//!     "declaring_type": "geo.Point",
//!     "this": "p",
//!     "locals": [{ "name": "scale", "type": "int", "value": 2 }]
//!   }
//! }
//! ```
//!
//! Values are converted by the declared type of their slot: JSON numbers,
//! booleans and one-character strings for primitives, strings for
//! `String`, scalars for wrapper types (boxed), JSON arrays for array
//! types, and `{"ref": "<id>"}` for fixture objects.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use snapeval_compiler::environment::{ClassDescription, ClassKind};
use snapeval_parser::resolve::CONSTRUCTOR_NAME;
use snapeval_parser::types::{method_descriptor, JType, Primitive, OBJECT};
use thiserror::Error;

use super::{ClassDef, FrameSpec, SimVm};
use crate::error::ProtocolError;
use crate::target::{FieldDesc, MethodDesc, MethodId, ObjectId, Target, ThreadId, TypeId};
use crate::value::Value;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error("unknown fixture object {0}")]
    UnknownObject(String),

    #[error("cannot use {found} as a value of type {expected}")]
    BadValue { expected: String, found: String },

    #[error("classes with unresolvable supertypes: {0}")]
    UnresolvedSupertypes(String),

    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFixture {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalFixture {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFixture {
    pub declaring_type: String,
    /// Fixture object id of the receiver
    #[serde(default)]
    pub this: Option<String>,
    #[serde(default)]
    pub locals: Vec<LocalFixture>,
}

fn main_thread() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub classes: Vec<ClassDescription>,
    #[serde(default)]
    pub objects: Vec<ObjectFixture>,
    pub frame: FrameFixture,
    #[serde(default = "main_thread")]
    pub thread: String,
}

impl Fixture {
    pub fn from_json(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Define the classes, allocate the objects and push the frame onto a
    /// new suspended thread, which is returned.
    pub fn install(&self, vm: &SimVm) -> Result<ThreadId, FixtureError> {
        self.define_classes(vm)?;

        let mut objects = HashMap::new();
        for object in &self.objects {
            let ty = vm
                .find_class(&object.class)
                .ok_or_else(|| FixtureError::UnknownClass(object.class.clone()))?;
            objects.insert(object.id.clone(), vm.new_object(ty)?);
        }
        let mut installer = Installer { vm, objects: &objects };
        for object in &self.objects {
            let id = objects[&object.id];
            let ty = vm.object_type(id)?;
            for (name, json) in &object.fields {
                let type_name = field_type(vm, ty, name)?.ok_or_else(|| {
                    ProtocolError::NoSuchField {
                        owner: object.class.clone(),
                        name: name.clone(),
                    }
                })?;
                let value = installer.value(&type_name, json)?;
                vm.set_field(id, name, value)?;
            }
        }

        let declaring_type = vm
            .find_class(&self.frame.declaring_type)
            .ok_or_else(|| FixtureError::UnknownClass(self.frame.declaring_type.clone()))?;
        let mut frame = FrameSpec::new(declaring_type);
        if let Some(this) = &self.frame.this {
            let object = objects
                .get(this)
                .copied()
                .ok_or_else(|| FixtureError::UnknownObject(this.clone()))?;
            frame = frame.with_this(object);
        }
        for local in &self.frame.locals {
            let value = installer.value(&local.type_name, &local.value)?;
            frame = frame.with_local(local.name.clone(), local.type_name.clone(), value);
        }
        let thread = vm.spawn_thread(self.thread.clone());
        vm.push_frame(thread, frame)?;
        tracing::debug!(
            classes = self.classes.len(),
            objects = self.objects.len(),
            %thread,
            "installed fixture"
        );
        Ok(thread)
    }

    // supertypes may be listed after their subtypes
    fn define_classes(&self, vm: &SimVm) -> Result<(), FixtureError> {
        let mut pending: Vec<&ClassDescription> = self.classes.iter().collect();
        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|class| {
                class
                    .superclass
                    .iter()
                    .chain(class.interfaces.iter())
                    .all(|name| vm.find_class(name).is_some())
            });
            if ready.is_empty() {
                let names: Vec<&str> = blocked.iter().map(|c| c.name.as_str()).collect();
                return Err(FixtureError::UnresolvedSupertypes(names.join(", ")));
            }
            for class in ready {
                define_class(vm, class)?;
            }
            pending = blocked;
        }
        Ok(())
    }
}

fn define_class(vm: &SimVm, class: &ClassDescription) -> Result<TypeId, FixtureError> {
    let mut def = match class.kind {
        ClassKind::Interface => ClassDef::interface(class.name.clone()),
        ClassKind::Class | ClassKind::Enum => ClassDef::class(class.name.clone()),
    };
    if let Some(superclass) = &class.superclass {
        def = def.extends(superclass.clone());
    }
    for interface in &class.interfaces {
        def = def.implements(interface.clone());
    }
    def.fields = class
        .fields
        .iter()
        .map(|f| FieldDesc {
            name: f.name.clone(),
            type_name: f.type_name.clone(),
            is_static: f.is_static,
        })
        .collect();
    let ty = vm.define_class(def)?;

    let mut has_constructor = false;
    for method in &class.methods {
        let params: Vec<JType> = method.params.iter().map(|p| JType::from_type_name(p)).collect();
        let signature = method_descriptor(&params, &JType::from_type_name(&method.returns));
        has_constructor |= method.name == CONSTRUCTOR_NAME;
        vm.add_declared(
            ty,
            MethodDesc {
                id: MethodId(0),
                name: method.name.clone(),
                signature,
                is_static: method.is_static,
                varargs: method.varargs,
            },
        )?;
    }
    if !has_constructor && class.kind != ClassKind::Interface {
        vm.add_declared(
            ty,
            MethodDesc {
                id: MethodId(0),
                name: CONSTRUCTOR_NAME.to_string(),
                signature: "()V".to_string(),
                is_static: false,
                varargs: false,
            },
        )?;
    }
    Ok(ty)
}

/// Declared type of field `name`, searching superclasses.
fn field_type(vm: &SimVm, ty: TypeId, name: &str) -> Result<Option<String>, ProtocolError> {
    let mut current = Some(ty);
    while let Some(id) = current {
        if let Some(field) = vm.fields(id)?.into_iter().find(|f| f.name == name) {
            return Ok(Some(field.type_name));
        }
        current = vm.superclass(id)?;
    }
    Ok(None)
}

struct Installer<'a> {
    vm: &'a SimVm,
    objects: &'a HashMap<String, ObjectId>,
}

impl Installer<'_> {
    fn value(&mut self, type_name: &str, json: &serde_json::Value) -> Result<Value, FixtureError> {
        let bad = || FixtureError::BadValue {
            expected: type_name.to_string(),
            found: json.to_string(),
        };
        if json.is_null() {
            return match JType::from_type_name(type_name) {
                JType::Primitive(_) => Err(bad()),
                _ => Ok(Value::Null),
            };
        }
        if let Some(reference) = json.get("ref").and_then(|r| r.as_str()) {
            return self
                .objects
                .get(reference)
                .map(|id| Value::Object(*id))
                .ok_or_else(|| FixtureError::UnknownObject(reference.to_string()));
        }
        match JType::from_type_name(type_name) {
            JType::Primitive(p) => primitive(p, json).ok_or_else(bad),
            JType::Array(element) => {
                let items = json.as_array().ok_or_else(bad)?;
                let values = items
                    .iter()
                    .map(|item| self.value(&element.to_string(), item))
                    .collect::<Result<Vec<_>, _>>()?;
                let array_type = self.vm.array_type(type_name.trim())?;
                Ok(Value::Object(self.vm.new_array_of(array_type, values)?))
            }
            JType::Class(name) => {
                if let Some(p) = Primitive::unboxed(&name) {
                    let value = primitive(p, json).ok_or_else(bad)?;
                    return Ok(Value::Object(self.vm.boxed(p, value)?));
                }
                match json.as_str() {
                    Some(text) if name == snapeval_parser::types::STRING || name == OBJECT => {
                        Ok(Value::Object(self.vm.new_string(text)?))
                    }
                    _ => Err(bad()),
                }
            }
            JType::Null | JType::Void => Err(bad()),
        }
    }
}

fn primitive(p: Primitive, json: &serde_json::Value) -> Option<Value> {
    Some(match p {
        Primitive::Boolean => Value::Boolean(json.as_bool()?),
        Primitive::Char => {
            let text = json.as_str()?;
            let mut units = text.encode_utf16();
            let unit = units.next()?;
            if units.next().is_some() {
                return None;
            }
            Value::Char(unit)
        }
        Primitive::Float => Value::Float(json.as_f64()? as f32),
        Primitive::Double => Value::Double(json.as_f64()?),
        Primitive::Byte => Value::Byte(i8::try_from(json.as_i64()?).ok()?),
        Primitive::Short => Value::Short(i16::try_from(json.as_i64()?).ok()?),
        Primitive::Int => Value::Int(i32::try_from(json.as_i64()?).ok()?),
        Primitive::Long => Value::Long(json.as_i64()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINT: &str = r#"{
        "classes": [
            { "name": "geo.Shape", "kind": "interface" },
            {
                "name": "geo.Point",
                "interfaces": ["geo.Shape"],
                "fields": [
                    { "name": "x", "type": "int" },
                    { "name": "label", "type": "java.lang.String" },
                    { "name": "next", "type": "geo.Point" }
                ],
                "methods": [{ "name": "norm", "returns": "double" }]
            }
        ],
        "objects": [
            { "id": "p", "class": "geo.Point", "fields": { "x": 3, "label": "origin", "next": { "ref": "q" } } },
            { "id": "q", "class": "geo.Point" }
        ],
        "frame": {
            "declaring_type": "geo.Point",
            "this": "p",
            "locals": [
                { "name": "scale", "type": "int", "value": 2 },
                { "name": "weights", "type": "double[]", "value": [0.5, 1.5] },
                { "name": "boxed", "type": "java.lang.Integer", "value": 9 },
                { "name": "initial", "type": "char", "value": "z" }
            ]
        }
    }"#;

    #[test]
    fn test_install_point_fixture() {
        let vm = SimVm::new();
        let thread = Fixture::from_json(POINT).unwrap().install(&vm).unwrap();
        let frame = vm.frame(thread, 0).unwrap();
        let this = frame.this.unwrap();
        assert_eq!(vm.get_field(this, "x").unwrap(), Value::Int(3));
        let Value::Object(label) = vm.get_field(this, "label").unwrap() else {
            panic!("label should be a string");
        };
        assert_eq!(vm.text(label).unwrap(), "origin");
        assert!(matches!(vm.get_field(this, "next").unwrap(), Value::Object(_)));

        assert_eq!(vm.local_value(thread, 0, "scale").unwrap(), Value::Int(2));
        assert_eq!(vm.local_value(thread, 0, "initial").unwrap(), Value::Char('z' as u16));
        let Value::Object(weights) = vm.local_value(thread, 0, "weights").unwrap() else {
            panic!("weights should be an array");
        };
        assert_eq!(vm.array_get(weights, 1).unwrap(), Value::Double(1.5));
        let Value::Object(boxed) = vm.local_value(thread, 0, "boxed").unwrap() else {
            panic!("boxed should be an object");
        };
        assert_eq!(vm.get_field(boxed, "value").unwrap(), Value::Int(9));
    }

    #[test]
    fn test_subclass_listed_before_superclass() {
        let json = r#"{
            "classes": [
                { "name": "zoo.Cat", "superclass": "zoo.Animal" },
                { "name": "zoo.Animal" }
            ],
            "frame": { "declaring_type": "zoo.Cat", "is_static": true }
        }"#;
        let vm = SimVm::new();
        Fixture::from_json(json).unwrap().install(&vm).unwrap();
        let cat = vm.find_class("zoo.Cat").unwrap();
        let animal = vm.find_class("zoo.Animal").unwrap();
        assert!(vm.is_assignable(cat, animal));
    }

    #[test]
    fn test_rejects_bad_values() {
        let json = r#"{
            "frame": {
                "declaring_type": "java.lang.Object",
                "locals": [{ "name": "n", "type": "byte", "value": 300 }]
            }
        }"#;
        let vm = SimVm::new();
        let err = Fixture::from_json(json).unwrap().install(&vm).unwrap_err();
        assert!(matches!(err, FixtureError::BadValue { .. }), "{}", err);
    }

    #[test]
    fn test_unknown_reference() {
        let json = r#"{
            "frame": {
                "declaring_type": "java.lang.Object",
                "locals": [{ "name": "o", "type": "java.lang.Object", "value": { "ref": "nope" } }]
            }
        }"#;
        let vm = SimVm::new();
        let err = Fixture::from_json(json).unwrap().install(&vm).unwrap_err();
        assert!(matches!(err, FixtureError::UnknownObject(ref id) if id == "nope"));
    }
}
