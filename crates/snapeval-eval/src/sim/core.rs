//! The simulated `java.lang` core every [`SimVm`] starts with.
//!
//! Only what snippets commonly touch is modelled: `Object`, `Class`,
//! `String`, the primitive wrappers, `Math` and the usual runtime
//! exceptions. String indices count UTF-16 code units.

use snapeval_parser::types::{Primitive, CLASS, OBJECT, STRING, THROWABLE};

use super::{Call, ClassDef, SimVm};
use crate::error::{ProtocolError, ProtocolResult};
use crate::ops;
use crate::target::{InvokeOutcome, ObjectId, Target, ThreadId, TypeId};
use crate::value::Value;

pub const NULL_POINTER: &str = "java.lang.NullPointerException";
pub const CLASS_NOT_FOUND: &str = "java.lang.ClassNotFoundException";
pub const STRING_INDEX: &str = "java.lang.StringIndexOutOfBoundsException";

/// Exception classes of the core, each after its superclass.
pub const EXCEPTIONS: &[(&str, &str)] = &[
    ("java.lang.Exception", THROWABLE),
    ("java.lang.RuntimeException", "java.lang.Exception"),
    (CLASS_NOT_FOUND, "java.lang.Exception"),
    ("java.lang.ArithmeticException", "java.lang.RuntimeException"),
    ("java.lang.ClassCastException", "java.lang.RuntimeException"),
    (NULL_POINTER, "java.lang.RuntimeException"),
    ("java.lang.IllegalStateException", "java.lang.RuntimeException"),
    ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
    ("java.lang.IndexOutOfBoundsException", "java.lang.RuntimeException"),
    (STRING_INDEX, "java.lang.IndexOutOfBoundsException"),
];

const TO_STRING: &str = "()Ljava/lang/String;";

pub(crate) fn install(vm: &SimVm) -> ProtocolResult<()> {
    for p in Primitive::ALL {
        vm.define_primitive(p);
    }
    install_object(vm)?;
    vm.define_class(ClassDef::interface("java.lang.CharSequence"))?;
    vm.define_class(ClassDef::interface("java.lang.Comparable"))?;
    install_class(vm)?;
    install_string(vm)?;
    install_wrappers(vm)?;
    install_throwables(vm)?;
    install_math(vm)?;
    Ok(())
}

fn returned(value: Value) -> ProtocolResult<InvokeOutcome> {
    Ok(InvokeOutcome::Returned(value))
}

fn string(vm: &SimVm, text: &str) -> ProtocolResult<InvokeOutcome> {
    returned(Value::Object(vm.new_string(text)?))
}

fn int_arg(call: &Call<'_>, index: usize) -> ProtocolResult<i32> {
    match call.arg(index)? {
        Value::Int(i) => Ok(i),
        other => Err(ProtocolError::Remote(format!("expected an int argument, found {}", other))),
    }
}

/// Text of a string argument, `None` for null.
fn text_arg(vm: &SimVm, call: &Call<'_>, index: usize) -> ProtocolResult<Option<String>> {
    match call.arg(index)? {
        Value::Null => Ok(None),
        Value::Object(id) => vm.text(id).map(Some),
        other => Err(ProtocolError::Remote(format!("expected a string argument, found {}", other))),
    }
}

fn this_units(vm: &SimVm, call: &Call<'_>) -> ProtocolResult<Vec<u16>> {
    Ok(vm.text(call.this()?)?.encode_utf16().collect())
}

fn identity_hash(object: ObjectId) -> i32 {
    (object.0 as i32).wrapping_mul(0x61c8_8647)
}

/// `String.valueOf(Object)`: null, a string itself, or `toString()`.
pub fn value_of(vm: &SimVm, thread: ThreadId, value: Value) -> ProtocolResult<InvokeOutcome> {
    match value {
        Value::Null => string(vm, "null"),
        Value::Object(object) => {
            if vm.class_name(vm.object_type(object)?)? == STRING {
                return returned(value);
            }
            vm.call_virtual(thread, object, "toString", TO_STRING, &[])
        }
        primitive => string(vm, &ops::primitive_string(&primitive).unwrap_or_default()),
    }
}

fn install_object(vm: &SimVm) -> ProtocolResult<()> {
    let object = vm.define_class(ClassDef {
        superclass: None,
        ..ClassDef::class(OBJECT)
    })?;
    vm.add_native(object, "<init>", "()V", false, |_, _| returned(Value::Null))?;
    vm.add_native(object, "toString", TO_STRING, false, |vm, call| {
        let this = call.this()?;
        let name = vm.class_name(vm.object_type(this)?)?;
        string(vm, &format!("{}@{:x}", name, identity_hash(this)))
    })?;
    vm.add_native(object, "equals", "(Ljava/lang/Object;)Z", false, |_, call| {
        returned(Value::Boolean(call.arg(0)? == Value::Object(call.this()?)))
    })?;
    vm.add_native(object, "hashCode", "()I", false, |_, call| {
        returned(Value::Int(identity_hash(call.this()?)))
    })?;
    vm.add_native(object, "getClass", "()Ljava/lang/Class;", false, |vm, call| {
        let ty = vm.object_type(call.this()?)?;
        returned(Value::Object(vm.class_object(ty)?))
    })?;
    Ok(())
}

fn install_class(vm: &SimVm) -> ProtocolResult<()> {
    let class = vm.define_class(ClassDef::class(CLASS))?;
    vm.add_native(class, "getName", TO_STRING, false, |vm, call| {
        let ty = vm.reflected_type(call.this()?)?;
        string(vm, &vm.class_name(ty)?)
    })?;
    vm.add_native(class, "toString", TO_STRING, false, |vm, call| {
        let ty = vm.reflected_type(call.this()?)?;
        let prefix = if vm.type_category(ty)? == crate::target::TypeCategory::Interface {
            "interface"
        } else {
            "class"
        };
        string(vm, &format!("{} {}", prefix, vm.class_name(ty)?))
    })?;
    vm.add_native(class, "isInstance", "(Ljava/lang/Object;)Z", false, |vm, call| {
        let reflected = vm.reflected_type(call.this()?)?;
        let result = match call.arg(0)? {
            Value::Object(object) => vm.is_assignable(vm.object_type(object)?, reflected),
            _ => false,
        };
        returned(Value::Boolean(result))
    })?;
    vm.add_native(
        class,
        "forName",
        "(Ljava/lang/String;)Ljava/lang/Class;",
        true,
        |vm, call| match text_arg(vm, call, 0)? {
            None => vm.throw_new(NULL_POINTER, "class name is null"),
            Some(name) => match vm.for_name(&name) {
                Some(ty) => returned(Value::Object(vm.class_object(ty)?)),
                None => vm.throw_new(CLASS_NOT_FOUND, &name),
            },
        },
    )?;
    Ok(())
}

fn out_of_bounds(vm: &SimVm, message: String) -> ProtocolResult<InvokeOutcome> {
    vm.throw_new(STRING_INDEX, &message)
}

fn install_string(vm: &SimVm) -> ProtocolResult<()> {
    let string_type = vm.define_class(
        ClassDef::class(STRING)
            .implements("java.lang.CharSequence")
            .implements("java.lang.Comparable"),
    )?;
    vm.add_native(string_type, "length", "()I", false, |vm, call| {
        returned(Value::Int(this_units(vm, call)?.len() as i32))
    })?;
    vm.add_native(string_type, "isEmpty", "()Z", false, |vm, call| {
        returned(Value::Boolean(this_units(vm, call)?.is_empty()))
    })?;
    vm.add_native(string_type, "charAt", "(I)C", false, |vm, call| {
        let units = this_units(vm, call)?;
        let index = int_arg(call, 0)?;
        match usize::try_from(index).ok().and_then(|i| units.get(i)) {
            Some(&unit) => returned(Value::Char(unit)),
            None => out_of_bounds(vm, format!("index {} out of bounds for length {}", index, units.len())),
        }
    })?;
    vm.add_native(string_type, "substring", "(I)Ljava/lang/String;", false, |vm, call| {
        let units = this_units(vm, call)?;
        substring(vm, &units, int_arg(call, 0)?, units.len() as i32)
    })?;
    vm.add_native(string_type, "substring", "(II)Ljava/lang/String;", false, |vm, call| {
        let units = this_units(vm, call)?;
        substring(vm, &units, int_arg(call, 0)?, int_arg(call, 1)?)
    })?;
    vm.add_native(string_type, "indexOf", "(Ljava/lang/String;)I", false, |vm, call| {
        let units = this_units(vm, call)?;
        let Some(needle) = text_arg(vm, call, 0)? else {
            return vm.throw_new(NULL_POINTER, "indexOf argument is null");
        };
        let needle: Vec<u16> = needle.encode_utf16().collect();
        let found = if needle.is_empty() {
            Some(0)
        } else {
            units.windows(needle.len()).position(|w| w == needle.as_slice())
        };
        returned(Value::Int(found.map_or(-1, |i| i as i32)))
    })?;
    vm.add_native(string_type, "concat", "(Ljava/lang/String;)Ljava/lang/String;", false, |vm, call| {
        let this = vm.text(call.this()?)?;
        match text_arg(vm, call, 0)? {
            Some(other) => string(vm, &(this + &other)),
            None => vm.throw_new(NULL_POINTER, "concat argument is null"),
        }
    })?;
    vm.add_native(string_type, "toUpperCase", TO_STRING, false, |vm, call| {
        string(vm, &vm.text(call.this()?)?.to_uppercase())
    })?;
    vm.add_native(string_type, "toString", TO_STRING, false, |_, call| {
        returned(Value::Object(call.this()?))
    })?;
    vm.add_native(string_type, "equals", "(Ljava/lang/Object;)Z", false, |vm, call| {
        let this = vm.text(call.this()?)?;
        let equal = match call.arg(0)? {
            Value::Object(other) => vm.class_name(vm.object_type(other)?)? == STRING && vm.text(other)? == this,
            _ => false,
        };
        returned(Value::Boolean(equal))
    })?;
    vm.add_native(string_type, "hashCode", "()I", false, |vm, call| {
        let hash = this_units(vm, call)?
            .iter()
            .fold(0i32, |h, &unit| h.wrapping_mul(31).wrapping_add(unit as i32));
        returned(Value::Int(hash))
    })?;
    vm.add_native(
        string_type,
        "valueOf",
        "(Ljava/lang/Object;)Ljava/lang/String;",
        true,
        |vm, call| value_of(vm, call.thread, call.arg(0)?),
    )?;
    Ok(())
}

fn substring(vm: &SimVm, units: &[u16], begin: i32, end: i32) -> ProtocolResult<InvokeOutcome> {
    let length = units.len() as i32;
    if begin < 0 || end > length || begin > end {
        return out_of_bounds(vm, format!("begin {}, end {}, length {}", begin, end, length));
    }
    string(vm, &String::from_utf16_lossy(&units[begin as usize..end as usize]))
}

fn install_wrappers(vm: &SimVm) -> ProtocolResult<()> {
    vm.define_class(ClassDef::class("java.lang.Number"))?;
    for p in Primitive::ALL {
        let number = p.is_numeric() && p != Primitive::Char;
        let mut def = ClassDef::class(p.box_class()).field("value", p.name());
        if number {
            def = def.extends("java.lang.Number");
        }
        def = match p {
            Primitive::Int => def
                .static_field("MAX_VALUE", "int", Value::Int(i32::MAX))
                .static_field("MIN_VALUE", "int", Value::Int(i32::MIN)),
            Primitive::Long => def
                .static_field("MAX_VALUE", "long", Value::Long(i64::MAX))
                .static_field("MIN_VALUE", "long", Value::Long(i64::MIN)),
            _ => def,
        };
        let wrapper = vm.define_class(def)?;
        install_wrapper(vm, wrapper, p, number)?;
    }
    Ok(())
}

fn install_wrapper(vm: &SimVm, wrapper: TypeId, p: Primitive, number: bool) -> ProtocolResult<()> {
    let descriptor = p.descriptor();
    let wrapper_descriptor = format!("L{};", p.box_class().replace('.', "/"));
    vm.add_native(wrapper, "<init>", &format!("({})V", descriptor), false, move |vm, call| {
        let value = ops::convert(&call.arg(0)?, p).map_err(|e| ProtocolError::Remote(e.to_string()))?;
        vm.set_field(call.this()?, "value", value)?;
        returned(Value::Null)
    })?;
    vm.add_native(
        wrapper,
        "valueOf",
        &format!("({}){}", descriptor, wrapper_descriptor),
        true,
        move |vm, call| returned(Value::Object(vm.boxed(p, call.arg(0)?)?)),
    )?;
    let accessors: Vec<Primitive> = if number {
        Primitive::ALL
            .into_iter()
            .filter(|q| q.is_numeric() && *q != Primitive::Char)
            .collect()
    } else {
        vec![p]
    };
    for q in accessors {
        vm.add_native(
            wrapper,
            &format!("{}Value", q.name()),
            &format!("(){}", q.descriptor()),
            false,
            move |vm, call| {
                let held = vm.get_field(call.this()?, "value")?;
                returned(ops::convert(&held, q).map_err(|e| ProtocolError::Remote(e.to_string()))?)
            },
        )?;
    }
    vm.add_native(wrapper, "toString", TO_STRING, false, |vm, call| {
        let held = vm.get_field(call.this()?, "value")?;
        string(vm, &ops::primitive_string(&held).unwrap_or_default())
    })?;
    vm.add_native(wrapper, "equals", "(Ljava/lang/Object;)Z", false, |vm, call| {
        let this = call.this()?;
        let equal = match call.arg(0)? {
            Value::Object(other) if vm.object_type(other)? == vm.object_type(this)? => {
                vm.get_field(other, "value")? == vm.get_field(this, "value")?
            }
            _ => false,
        };
        returned(Value::Boolean(equal))
    })?;
    vm.add_native(wrapper, "hashCode", "()I", false, |vm, call| {
        let hash = match vm.get_field(call.this()?, "value")? {
            Value::Boolean(b) => {
                if b {
                    1231
                } else {
                    1237
                }
            }
            Value::Float(x) => x.to_bits() as i32,
            Value::Double(x) => {
                let bits = x.to_bits();
                (bits ^ (bits >> 32)) as i32
            }
            other => other.as_long().map_or(0, |v| (v ^ (v >> 32)) as i32),
        };
        returned(Value::Int(hash))
    })?;
    Ok(())
}

fn install_throwables(vm: &SimVm) -> ProtocolResult<()> {
    let throwable = vm.define_class(ClassDef::class(THROWABLE).field("message", STRING))?;
    add_exception_constructors(vm, throwable)?;
    vm.add_native(throwable, "getMessage", TO_STRING, false, |vm, call| {
        returned(vm.get_field(call.this()?, "message")?)
    })?;
    vm.add_native(throwable, "toString", TO_STRING, false, |vm, call| {
        let this = call.this()?;
        let name = vm.class_name(vm.object_type(this)?)?;
        match vm.get_field(this, "message")? {
            Value::Object(message) => string(vm, &format!("{}: {}", name, vm.text(message)?)),
            _ => string(vm, &name),
        }
    })?;
    for (name, parent) in EXCEPTIONS {
        let ty = vm.define_class(ClassDef::class(*name).extends(*parent))?;
        add_exception_constructors(vm, ty)?;
    }
    Ok(())
}

fn add_exception_constructors(vm: &SimVm, ty: TypeId) -> ProtocolResult<()> {
    vm.add_native(ty, "<init>", "()V", false, |_, _| returned(Value::Null))?;
    vm.add_native(ty, "<init>", "(Ljava/lang/String;)V", false, |vm, call| {
        vm.set_field(call.this()?, "message", call.arg(0)?)?;
        returned(Value::Null)
    })?;
    Ok(())
}

fn install_math(vm: &SimVm) -> ProtocolResult<()> {
    let math = vm.define_class(ClassDef::class("java.lang.Math"))?;
    vm.add_native(math, "abs", "(I)I", true, |_, call| {
        returned(Value::Int(int_arg(call, 0)?.wrapping_abs()))
    })?;
    vm.add_native(math, "abs", "(D)D", true, |_, call| match call.arg(0)? {
        Value::Double(x) => returned(Value::Double(x.abs())),
        other => Err(ProtocolError::Remote(format!("expected a double argument, found {}", other))),
    })?;
    vm.add_native(math, "max", "(II)I", true, |_, call| {
        returned(Value::Int(int_arg(call, 0)?.max(int_arg(call, 1)?)))
    })?;
    vm.add_native(math, "min", "(II)I", true, |_, call| {
        returned(Value::Int(int_arg(call, 0)?.min(int_arg(call, 1)?)))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::FrameSpec;

    fn vm_with_thread() -> (SimVm, ThreadId) {
        let vm = SimVm::new();
        let thread = vm.spawn_thread("main");
        let object = vm.find_class(OBJECT).unwrap();
        vm.push_frame(thread, FrameSpec::new(object)).unwrap();
        (vm, thread)
    }

    fn static_method(vm: &SimVm, owner: &str, name: &str, signature: &str) -> (TypeId, crate::target::MethodId) {
        let ty = vm.find_class(owner).unwrap();
        let method = vm
            .methods(ty)
            .unwrap()
            .into_iter()
            .find(|m| m.name == name && m.signature == signature)
            .unwrap();
        (ty, method.id)
    }

    #[test]
    fn test_string_methods_use_utf16_indices() {
        let (vm, thread) = vm_with_thread();
        let text = vm.new_string("h\u{e9}llo").unwrap();
        let outcome = vm.call_virtual(thread, text, "charAt", "(I)C", &[Value::Int(1)]).unwrap();
        assert_eq!(outcome, InvokeOutcome::Returned(Value::Char(0xe9)));
        let outcome = vm
            .call_virtual(thread, text, "substring", "(II)Ljava/lang/String;", &[Value::Int(1), Value::Int(3)])
            .unwrap();
        let InvokeOutcome::Returned(Value::Object(sub)) = outcome else {
            panic!("expected a string, got {:?}", outcome);
        };
        assert_eq!(vm.text(sub).unwrap(), "\u{e9}l");
    }

    #[test]
    fn test_char_at_out_of_range_throws() {
        let (vm, thread) = vm_with_thread();
        let text = vm.new_string("ab").unwrap();
        let outcome = vm.call_virtual(thread, text, "charAt", "(I)C", &[Value::Int(2)]).unwrap();
        let InvokeOutcome::Threw(exception) = outcome else {
            panic!("expected an exception, got {:?}", outcome);
        };
        let ty = vm.object_type(exception).unwrap();
        assert_eq!(vm.class_name(ty).unwrap(), STRING_INDEX);
    }

    #[test]
    fn test_small_boxes_are_shared() {
        let vm = SimVm::new();
        let a = vm.boxed(Primitive::Int, Value::Int(7)).unwrap();
        let b = vm.boxed(Primitive::Int, Value::Int(7)).unwrap();
        let c = vm.boxed(Primitive::Int, Value::Int(1000)).unwrap();
        let d = vm.boxed(Primitive::Int, Value::Int(1000)).unwrap();
        assert_eq!(a, b);
        assert_ne!(c, d);
        assert_eq!(vm.get_field(c, "value").unwrap(), Value::Int(1000));
    }

    #[test]
    fn test_for_name_throws_for_unknown_class() {
        let (vm, thread) = vm_with_thread();
        let (class, for_name) = static_method(&vm, CLASS, "forName", "(Ljava/lang/String;)Ljava/lang/Class;");
        let name = vm.new_string("no.Such").unwrap();
        let outcome = vm.invoke_static(thread, class, for_name, &[Value::Object(name)]).unwrap();
        let InvokeOutcome::Threw(exception) = outcome else {
            panic!("expected an exception, got {:?}", outcome);
        };
        assert_eq!(vm.class_name(vm.object_type(exception).unwrap()).unwrap(), CLASS_NOT_FOUND);
    }

    #[test]
    fn test_exception_hierarchy() {
        let vm = SimVm::new();
        let sioobe = vm.find_class(STRING_INDEX).unwrap();
        let runtime = vm.find_class("java.lang.RuntimeException").unwrap();
        let throwable = vm.find_class(THROWABLE).unwrap();
        let string = vm.find_class(STRING).unwrap();
        assert!(vm.is_assignable(sioobe, runtime));
        assert!(vm.is_assignable(sioobe, throwable));
        assert!(!vm.is_assignable(string, throwable));
        assert!(vm.is_assignable(string, vm.find_class("java.lang.CharSequence").unwrap()));
    }

    #[test]
    fn test_value_of_uses_to_string() {
        let (vm, thread) = vm_with_thread();
        let boxed = vm.boxed(Primitive::Double, Value::Double(1.5)).unwrap();
        let InvokeOutcome::Returned(Value::Object(text)) = value_of(&vm, thread, Value::Object(boxed)).unwrap() else {
            panic!("expected a string");
        };
        assert_eq!(vm.text(text).unwrap(), "1.5");
        let InvokeOutcome::Returned(Value::Object(text)) = value_of(&vm, thread, Value::Null).unwrap() else {
            panic!("expected a string");
        };
        assert_eq!(vm.text(text).unwrap(), "null");
    }
}
