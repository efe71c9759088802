//! The remote debugging protocol seam.
//!
//! Everything the evaluator needs from a paused target process goes through
//! [`Target`]. Handles are opaque numeric ids minted by the implementation;
//! the proxy layer in [`crate::value`] is the only code that interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;
use crate::value::Value;

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// A remote object (instance, array, string or class object).
    ObjectId,
    "object"
);
handle!(
    /// A loaded reference, array or primitive type.
    TypeId,
    "type"
);
handle!(
    /// A method of a loaded type.
    MethodId,
    "method"
);
handle!(
    /// A thread of the target process.
    ThreadId,
    "thread"
);

/// What sort of type a [`TypeId`] denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Class,
    Interface,
    Array,
    Primitive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: String,
    pub type_name: String,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDesc {
    pub id: MethodId,
    /// `<init>` for constructors
    pub name: String,
    /// JNI method descriptor, e.g. `(ILjava/lang/String;)V`
    pub signature: String,
    pub is_static: bool,
    pub varargs: bool,
}

impl MethodDesc {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSlot {
    pub name: String,
    pub type_name: String,
}

/// Static shape of one paused frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub declaring_type: TypeId,
    pub this: Option<ObjectId>,
    pub is_static: bool,
    pub locals: Vec<LocalSlot>,
}

/// How an invocation inside the target ended.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    Returned(Value),
    Threw(ObjectId),
}

/// A connection to a paused target process.
///
/// Invocations resume the given thread for the duration of the call and
/// suspend it again before returning. Every other resume of the thread must
/// advance its [`suspend_epoch`](Target::suspend_epoch), which is how
/// runtime contexts detect that the frame they captured is gone.
pub trait Target: Send + Sync {
    // Types
    fn classes_by_name(&self, name: &str) -> ProtocolResult<Vec<TypeId>>;
    fn type_name(&self, ty: TypeId) -> ProtocolResult<String>;
    fn type_category(&self, ty: TypeId) -> ProtocolResult<TypeCategory>;
    fn superclass(&self, ty: TypeId) -> ProtocolResult<Option<TypeId>>;
    fn interfaces(&self, ty: TypeId) -> ProtocolResult<Vec<TypeId>>;
    /// Fields declared by `ty` itself.
    fn fields(&self, ty: TypeId) -> ProtocolResult<Vec<FieldDesc>>;
    /// Methods declared by `ty` itself.
    fn methods(&self, ty: TypeId) -> ProtocolResult<Vec<MethodDesc>>;
    /// The `java.lang.Class` instance mirroring `ty`.
    fn class_object(&self, ty: TypeId) -> ProtocolResult<ObjectId>;
    fn reflected_type(&self, class_object: ObjectId) -> ProtocolResult<TypeId>;

    // Objects
    fn object_type(&self, object: ObjectId) -> ProtocolResult<TypeId>;
    fn field_value(&self, object: ObjectId, owner: TypeId, name: &str) -> ProtocolResult<Value>;
    fn set_field_value(&self, object: ObjectId, owner: TypeId, name: &str, value: Value) -> ProtocolResult<()>;
    fn static_value(&self, owner: TypeId, name: &str) -> ProtocolResult<Value>;
    fn set_static_value(&self, owner: TypeId, name: &str, value: Value) -> ProtocolResult<()>;
    fn array_length(&self, array: ObjectId) -> ProtocolResult<i32>;
    fn array_get(&self, array: ObjectId, index: i32) -> ProtocolResult<Value>;
    fn array_set(&self, array: ObjectId, index: i32, value: Value) -> ProtocolResult<()>;
    /// A new array of `array_type` with default-valued elements.
    fn new_array(&self, array_type: TypeId, length: i32) -> ProtocolResult<ObjectId>;
    /// A new string object in the target holding `text`.
    fn mirror_string(&self, text: &str) -> ProtocolResult<ObjectId>;
    fn string_value(&self, string: ObjectId) -> ProtocolResult<String>;

    // Threads and frames
    fn suspend_epoch(&self, thread: ThreadId) -> ProtocolResult<u64>;
    /// Frame `depth` of a suspended thread, 0 being the innermost.
    fn frame(&self, thread: ThreadId, depth: usize) -> ProtocolResult<FrameInfo>;
    fn local_value(&self, thread: ThreadId, depth: usize, name: &str) -> ProtocolResult<Value>;
    fn set_local_value(&self, thread: ThreadId, depth: usize, name: &str, value: Value) -> ProtocolResult<()>;

    // Invocation
    /// Invoke an instance method. Unless `nonvirtual` is set, the
    /// implementation dispatches on the runtime type of `object`.
    fn invoke_method(
        &self,
        thread: ThreadId,
        object: ObjectId,
        method: MethodId,
        args: &[Value],
        nonvirtual: bool,
    ) -> ProtocolResult<InvokeOutcome>;
    fn invoke_static(&self, thread: ThreadId, owner: TypeId, method: MethodId, args: &[Value])
        -> ProtocolResult<InvokeOutcome>;
    /// Allocate an instance of `class` and run `constructor` on it; returns
    /// the new object.
    fn new_instance(&self, thread: ThreadId, class: TypeId, constructor: MethodId, args: &[Value])
        -> ProtocolResult<InvokeOutcome>;
}
