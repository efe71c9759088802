//! Static types and the language-level conversion tables.
//!
//! The promotion functions here are the single source of truth for both the
//! resolver (which types expressions) and the interpreter (which applies the
//! same promotions to remote values at run time).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Char,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.into_iter().find(|p| p.name() == name)
    }

    /// JNI descriptor character.
    pub fn descriptor(&self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    /// Fully qualified name of the wrapper class.
    pub fn box_class(&self) -> &'static str {
        match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Char => "java.lang.Character",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
        }
    }

    pub fn unboxed(class_name: &str) -> Option<Primitive> {
        Primitive::ALL.into_iter().find(|p| p.box_class() == class_name)
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Primitive::Boolean)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Primitive::Byte | Primitive::Char | Primitive::Short | Primitive::Int | Primitive::Long
        )
    }

    fn rank(&self) -> u8 {
        match self {
            Primitive::Byte => 1,
            Primitive::Short | Primitive::Char => 2,
            Primitive::Int => 3,
            Primitive::Long => 4,
            Primitive::Float => 5,
            Primitive::Double => 6,
            Primitive::Boolean => 0,
        }
    }

    /// Widening primitive conversion (identity included).
    pub fn widens_to(&self, to: Primitive) -> bool {
        if self == &to {
            return true;
        }
        match (self, to) {
            (Primitive::Boolean, _) | (_, Primitive::Boolean) => false,
            // char does not widen to short, nor byte/short to char
            (Primitive::Char, Primitive::Short) => false,
            (_, Primitive::Char) => false,
            _ => self.rank() < to.rank(),
        }
    }
}

/// Unary numeric promotion: byte, short and char become int.
pub fn unary_promotion(p: Primitive) -> Option<Primitive> {
    match p {
        Primitive::Boolean => None,
        Primitive::Byte | Primitive::Short | Primitive::Char | Primitive::Int => Some(Primitive::Int),
        other => Some(other),
    }
}

/// Binary numeric promotion.
pub fn binary_promotion(a: Primitive, b: Primitive) -> Option<Primitive> {
    if !a.is_numeric() || !b.is_numeric() {
        return None;
    }
    Some(if a == Primitive::Double || b == Primitive::Double {
        Primitive::Double
    } else if a == Primitive::Float || b == Primitive::Float {
        Primitive::Float
    } else if a == Primitive::Long || b == Primitive::Long {
        Primitive::Long
    } else {
        Primitive::Int
    })
}

/// A static type as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JType {
    Primitive(Primitive),
    /// Binary name of a class or interface, e.g. `java.lang.String`, `a.Outer$Inner`
    Class(String),
    Array(Box<JType>),
    Null,
    Void,
}

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";
pub const CLASS: &str = "java.lang.Class";
pub const THROWABLE: &str = "java.lang.Throwable";

impl JType {
    pub fn object() -> JType {
        JType::Class(OBJECT.to_string())
    }

    pub fn string() -> JType {
        JType::Class(STRING.to_string())
    }

    pub fn int() -> JType {
        JType::Primitive(Primitive::Int)
    }

    pub fn boolean() -> JType {
        JType::Primitive(Primitive::Boolean)
    }

    pub fn array_of(element: JType, dims: usize) -> JType {
        (0..dims).fold(element, |t, _| JType::Array(Box::new(t)))
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            JType::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, JType::Primitive(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JType::Class(_) | JType::Array(_) | JType::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, JType::Class(n) if n == STRING)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, JType::Primitive(Primitive::Boolean))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, JType::Void)
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            JType::Class(n) => Some(n),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&JType> {
        match self {
            JType::Array(e) => Some(e),
            _ => None,
        }
    }

    /// The primitive this type denotes after unboxing, if any.
    pub fn unboxed_primitive(&self) -> Option<Primitive> {
        match self {
            JType::Primitive(p) => Some(*p),
            JType::Class(n) => Primitive::unboxed(n),
            _ => None,
        }
    }

    /// JNI type descriptor, e.g. `I`, `Ljava/lang/String;`, `[[D`.
    pub fn descriptor(&self) -> String {
        match self {
            JType::Primitive(p) => p.descriptor().to_string(),
            JType::Class(n) => format!("L{};", n.replace('.', "/")),
            JType::Array(e) => format!("[{}", e.descriptor()),
            JType::Null => format!("L{};", OBJECT.replace('.', "/")),
            JType::Void => "V".to_string(),
        }
    }

    /// Parse a type name as the remote protocol reports it (`int`,
    /// `java.lang.String`, `long[][]`).
    pub fn from_type_name(name: &str) -> JType {
        let mut base = name.trim();
        let mut dims = 0;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped.trim_end();
            dims += 1;
        }
        let element = match base {
            "void" => JType::Void,
            other => match Primitive::from_name(other) {
                Some(p) => JType::Primitive(p),
                None => JType::Class(other.to_string()),
            },
        };
        JType::array_of(element, dims)
    }
}

impl fmt::Display for JType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JType::Primitive(p) => write!(f, "{}", p.name()),
            JType::Class(n) => write!(f, "{}", n),
            JType::Array(e) => write!(f, "{}[]", e),
            JType::Null => write!(f, "null"),
            JType::Void => write!(f, "void"),
        }
    }
}

/// Method descriptor built from parameter and return types.
pub fn method_descriptor(params: &[JType], ret: &JType) -> String {
    let mut out = String::from("(");
    for p in params {
        out.push_str(&p.descriptor());
    }
    out.push(')');
    out.push_str(&ret.descriptor());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_promotion_table() {
        use Primitive::*;
        assert_eq!(binary_promotion(Byte, Short), Some(Int));
        assert_eq!(binary_promotion(Char, Char), Some(Int));
        assert_eq!(binary_promotion(Int, Long), Some(Long));
        assert_eq!(binary_promotion(Long, Float), Some(Float));
        assert_eq!(binary_promotion(Float, Double), Some(Double));
        assert_eq!(binary_promotion(Boolean, Int), None);
    }

    #[test]
    fn test_widening() {
        use Primitive::*;
        assert!(Byte.widens_to(Short));
        assert!(Char.widens_to(Int));
        assert!(!Char.widens_to(Short));
        assert!(!Short.widens_to(Char));
        assert!(Long.widens_to(Float));
        assert!(!Double.widens_to(Float));
    }

    #[test]
    fn test_descriptors() {
        let sig = method_descriptor(&[JType::int(), JType::string()], &JType::array_of(JType::Primitive(Primitive::Double), 2));
        assert_eq!(sig, "(ILjava/lang/String;)[[D");
    }

    #[test]
    fn test_from_type_name() {
        assert_eq!(
            JType::from_type_name("java.lang.String[]"),
            JType::Array(Box::new(JType::string()))
        );
        assert_eq!(JType::from_type_name("int"), JType::int());
    }
}
