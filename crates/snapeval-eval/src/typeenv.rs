//! A compile-time type environment read from the target process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use snapeval_parser::resolve::CONSTRUCTOR_NAME;
use snapeval_parser::types::{JType, Primitive};
use snapeval_parser::{FieldInfo, MethodInfo, TypeEnvironment, TypeInfo, TypeKind};

use crate::error::ProtocolResult;
use crate::target::{Target, TypeCategory, TypeId};

/// Answers the resolver's type lookups from the classes loaded in the
/// target. When a name is loaded more than once, the first candidate is
/// used; all candidates share the same shape for compile purposes.
pub struct TargetEnvironment {
    target: Arc<dyn Target>,
    cache: Mutex<HashMap<String, Option<Arc<TypeInfo>>>>,
}

impl TargetEnvironment {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self {
            target,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Forget cached shapes, e.g. after classes were loaded.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn fetch(&self, name: &str) -> ProtocolResult<Option<TypeInfo>> {
        let Some(&id) = self.target.classes_by_name(name)?.first() else {
            return Ok(None);
        };
        let kind = match self.target.type_category(id)? {
            TypeCategory::Class => TypeKind::Class,
            TypeCategory::Interface => TypeKind::Interface,
            TypeCategory::Array | TypeCategory::Primitive => return Ok(None),
        };
        let superclass = match self.target.superclass(id)? {
            Some(s) => Some(self.target.type_name(s)?),
            None => None,
        };
        let interfaces = self
            .target
            .interfaces(id)?
            .into_iter()
            .map(|i| self.target.type_name(i))
            .collect::<ProtocolResult<Vec<_>>>()?;
        Ok(Some(TypeInfo {
            name: name.to_string(),
            kind: self.refine_kind(kind, superclass.as_deref()),
            superclass,
            interfaces,
            fields: self.fields(id)?,
            methods: self.methods(id)?,
        }))
    }

    fn refine_kind(&self, kind: TypeKind, superclass: Option<&str>) -> TypeKind {
        match (kind, superclass) {
            (TypeKind::Class, Some("java.lang.Enum")) => TypeKind::Enum,
            (kind, _) => kind,
        }
    }

    fn fields(&self, id: TypeId) -> ProtocolResult<Vec<FieldInfo>> {
        Ok(self
            .target
            .fields(id)?
            .into_iter()
            .map(|f| FieldInfo {
                ty: JType::from_type_name(&f.type_name),
                name: f.name,
                is_static: f.is_static,
            })
            .collect())
    }

    fn methods(&self, id: TypeId) -> ProtocolResult<Vec<MethodInfo>> {
        let mut methods = Vec::new();
        for m in self.target.methods(id)? {
            let Some((params, ret)) = parse_method_descriptor(&m.signature) else {
                tracing::debug!(method = %m.name, signature = %m.signature, "skipping method with unreadable signature");
                continue;
            };
            methods.push(MethodInfo {
                is_constructor: m.name == CONSTRUCTOR_NAME,
                name: m.name,
                params,
                ret,
                is_static: m.is_static,
                varargs: m.varargs,
            });
        }
        Ok(methods)
    }
}

impl TypeEnvironment for TargetEnvironment {
    fn lookup(&self, binary_name: &str) -> Option<Arc<TypeInfo>> {
        if let Some(cached) = self.cache.lock().get(binary_name) {
            return cached.clone();
        }
        let info = match self.fetch(binary_name) {
            Ok(info) => info.map(Arc::new),
            Err(e) => {
                tracing::debug!(name = binary_name, "type lookup failed: {}", e);
                None
            }
        };
        self.cache.lock().insert(binary_name.to_string(), info.clone());
        info
    }
}

/// Split a JNI method descriptor into parameter and return types.
pub fn parse_method_descriptor(descriptor: &str) -> Option<(Vec<JType>, JType)> {
    let rest = descriptor.strip_prefix('(')?;
    let (params_text, ret_text) = rest.split_once(')')?;
    let mut params = Vec::new();
    let mut remaining = params_text;
    while !remaining.is_empty() {
        let (ty, tail) = parse_field_descriptor(remaining)?;
        params.push(ty);
        remaining = tail;
    }
    let ret = match ret_text {
        "V" => JType::Void,
        other => match parse_field_descriptor(other)? {
            (ty, "") => ty,
            _ => return None,
        },
    };
    Some((params, ret))
}

fn parse_field_descriptor(text: &str) -> Option<(JType, &str)> {
    let mut chars = text.chars();
    let first = chars.next()?;
    match first {
        '[' => {
            let (element, tail) = parse_field_descriptor(&text[1..])?;
            Some((JType::Array(Box::new(element)), tail))
        }
        'L' => {
            let end = text.find(';')?;
            Some((JType::Class(text[1..end].replace('/', ".")), &text[end + 1..]))
        }
        c => {
            let p = Primitive::ALL.into_iter().find(|p| p.descriptor() == c)?;
            Some((JType::Primitive(p), &text[1..]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) = parse_method_descriptor("(I[[JLjava/lang/String;)Lgeo/Point;").unwrap();
        assert_eq!(
            params,
            vec![
                JType::int(),
                JType::array_of(JType::Primitive(Primitive::Long), 2),
                JType::string(),
            ]
        );
        assert_eq!(ret, JType::Class("geo.Point".into()));
        assert_eq!(parse_method_descriptor("()V").unwrap(), (Vec::new(), JType::Void));
    }

    #[test]
    fn test_rejects_malformed_descriptors() {
        assert!(parse_method_descriptor("I)V").is_none());
        assert!(parse_method_descriptor("(Q)V").is_none());
        assert!(parse_method_descriptor("(Ljava/lang/String)V").is_none());
    }
}
