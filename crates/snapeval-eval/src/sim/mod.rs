//! An in-memory simulated target process.
//!
//! [`SimVm`] implements [`Target`] over plain data: classes with native
//! method bodies written in Rust, heap objects, arrays and strings, and
//! threads with paused frames. It comes with a small `java.lang` core
//! (see [`core`]) and can be populated from JSON through [`fixture`].

pub mod core;
pub mod fixture;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use snapeval_parser::types::{JType, Primitive, CLASS, OBJECT, STRING};

use crate::error::{ProtocolError, ProtocolResult};
use crate::target::{
    FieldDesc, FrameInfo, InvokeOutcome, LocalSlot, MethodDesc, MethodId, ObjectId, Target, ThreadId, TypeCategory,
    TypeId,
};
use crate::value::Value;

/// Loader of the core classes.
pub const BOOTSTRAP_LOADER: u32 = 0;

/// Body of a simulated method.
pub type Native = Arc<dyn Fn(&SimVm, &Call<'_>) -> ProtocolResult<InvokeOutcome> + Send + Sync>;

/// Arguments of one simulated invocation.
pub struct Call<'a> {
    pub thread: ThreadId,
    pub this: Option<ObjectId>,
    pub args: &'a [Value],
}

impl Call<'_> {
    pub fn this(&self) -> ProtocolResult<ObjectId> {
        self.this.ok_or_else(|| ProtocolError::Remote("instance method invoked without a receiver".into()))
    }

    pub fn arg(&self, index: usize) -> ProtocolResult<Value> {
        self.args
            .get(index)
            .copied()
            .ok_or_else(|| ProtocolError::Remote(format!("missing argument {}", index)))
    }
}

/// Declaration of a class to define in the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub category: TypeCategory,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDesc>,
    pub statics: Vec<(String, Value)>,
}

impl ClassDef {
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: TypeCategory::Class,
            superclass: Some(OBJECT.to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            category: TypeCategory::Interface,
            superclass: None,
            ..Self::class(name)
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.push(FieldDesc {
            name: name.into(),
            type_name: type_name.into(),
            is_static: false,
        });
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, type_name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        self.fields.push(FieldDesc {
            name: name.clone(),
            type_name: type_name.into(),
            is_static: true,
        });
        self.statics.push((name, value));
        self
    }
}

/// A paused frame to push onto a simulated thread.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub declaring_type: TypeId,
    pub this: Option<ObjectId>,
    pub is_static: bool,
    pub locals: Vec<(LocalSlot, Value)>,
}

impl FrameSpec {
    pub fn new(declaring_type: TypeId) -> Self {
        Self {
            declaring_type,
            this: None,
            is_static: true,
            locals: Vec::new(),
        }
    }

    pub fn with_this(mut self, this: ObjectId) -> Self {
        self.this = Some(this);
        self.is_static = false;
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, type_name: impl Into<String>, value: Value) -> Self {
        self.locals.push((
            LocalSlot {
                name: name.into(),
                type_name: type_name.into(),
            },
            value,
        ));
        self
    }
}

/// Blocks natives that wait on it until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    pub fn close(&self) {
        *self.open.lock() = false;
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

struct SimType {
    name: String,
    category: TypeCategory,
    superclass: Option<TypeId>,
    interfaces: Vec<TypeId>,
    fields: Vec<FieldDesc>,
    statics: HashMap<String, Value>,
    methods: Vec<MethodId>,
    loader: u32,
    element: Option<TypeId>,
    mirror: Option<ObjectId>,
}

struct SimMethod {
    desc: MethodDesc,
    body: Option<Native>,
}

enum ObjectData {
    Fields(HashMap<String, Value>),
    Array(Vec<Value>),
    Text(String),
    Mirror(TypeId),
}

struct SimObject {
    ty: TypeId,
    data: ObjectData,
}

struct SimFrame {
    declaring_type: TypeId,
    this: Option<ObjectId>,
    is_static: bool,
    locals: Vec<(LocalSlot, Value)>,
}

struct SimThread {
    name: String,
    frames: Vec<SimFrame>,
    suspended: bool,
    epoch: u64,
}

#[derive(Default)]
struct State {
    types: Vec<SimType>,
    methods: Vec<SimMethod>,
    objects: HashMap<u64, SimObject>,
    next_object: u64,
    threads: Vec<SimThread>,
    context_loader: u32,
    box_cache: HashMap<(TypeId, i64), ObjectId>,
}

impl State {
    fn ty(&self, id: TypeId) -> ProtocolResult<&SimType> {
        self.types.get(id.0 as usize).ok_or(ProtocolError::InvalidHandle { kind: "type", id: id.0 })
    }

    fn ty_mut(&mut self, id: TypeId) -> ProtocolResult<&mut SimType> {
        self.types
            .get_mut(id.0 as usize)
            .ok_or(ProtocolError::InvalidHandle { kind: "type", id: id.0 })
    }

    fn object(&self, id: ObjectId) -> ProtocolResult<&SimObject> {
        self.objects.get(&id.0).ok_or(ProtocolError::InvalidHandle { kind: "object", id: id.0 })
    }

    fn object_mut(&mut self, id: ObjectId) -> ProtocolResult<&mut SimObject> {
        self.objects
            .get_mut(&id.0)
            .ok_or(ProtocolError::InvalidHandle { kind: "object", id: id.0 })
    }

    fn method(&self, id: MethodId) -> ProtocolResult<&SimMethod> {
        self.methods
            .get(id.0 as usize)
            .ok_or(ProtocolError::InvalidHandle { kind: "method", id: id.0 })
    }

    fn thread(&self, id: ThreadId) -> ProtocolResult<&SimThread> {
        self.threads
            .get(id.0 as usize)
            .ok_or(ProtocolError::InvalidHandle { kind: "thread", id: id.0 })
    }

    fn thread_mut(&mut self, id: ThreadId) -> ProtocolResult<&mut SimThread> {
        self.threads
            .get_mut(id.0 as usize)
            .ok_or(ProtocolError::InvalidHandle { kind: "thread", id: id.0 })
    }

    fn suspended_frame(&self, thread: ThreadId, depth: usize) -> ProtocolResult<&SimFrame> {
        let t = self.thread(thread)?;
        if !t.suspended {
            return Err(ProtocolError::ThreadNotSuspended(thread.0));
        }
        t.frames
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| t.frames.get(i))
            .ok_or(ProtocolError::NoSuchFrame { thread: thread.0, depth })
    }

    fn allocate(&mut self, ty: TypeId, data: ObjectData) -> ObjectId {
        self.next_object += 1;
        let id = ObjectId(self.next_object);
        self.objects.insert(id.0, SimObject { ty, data });
        id
    }

    /// Types named `name`, the given loader's first.
    fn named(&self, name: &str) -> Vec<TypeId> {
        (0..self.types.len())
            .filter(|&i| self.types[i].name == name)
            .map(|i| TypeId(i as u64))
            .collect()
    }

    fn named_in(&self, name: &str, loader: u32) -> Option<TypeId> {
        let candidates = self.named(name);
        candidates
            .iter()
            .copied()
            .find(|&id| self.types[id.0 as usize].loader == loader)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&id| self.types[id.0 as usize].loader == BOOTSTRAP_LOADER)
            })
            .or_else(|| candidates.first().copied())
    }

    fn define(&mut self, ty: SimType) -> TypeId {
        let id = TypeId(self.types.len() as u64);
        self.types.push(ty);
        id
    }

    /// The array type with elements named `element`, created on first use.
    fn array_type(&mut self, name: &str, loader: u32) -> Option<TypeId> {
        let element_name = name.strip_suffix("[]")?;
        let element = match self.named_in(element_name, loader) {
            Some(id) => id,
            None => self.array_type(element_name, loader)?,
        };
        let element_loader = self.types[element.0 as usize].loader;
        if let Some(existing) = self
            .named(name)
            .into_iter()
            .find(|id| self.types[id.0 as usize].element == Some(element))
        {
            return Some(existing);
        }
        let object = self.named_in(OBJECT, BOOTSTRAP_LOADER);
        Some(self.define(SimType {
            name: name.to_string(),
            category: TypeCategory::Array,
            superclass: object,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: HashMap::new(),
            methods: Vec::new(),
            loader: element_loader,
            element: Some(element),
            mirror: None,
        }))
    }

    fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return true;
        }
        let (Ok(from_t), Ok(to_t)) = (self.ty(from), self.ty(to)) else {
            return false;
        };
        if from_t.category == TypeCategory::Primitive || to_t.category == TypeCategory::Primitive {
            return false;
        }
        if to_t.name == OBJECT && to_t.superclass.is_none() {
            return true;
        }
        if let (Some(fe), Some(te)) = (from_t.element, to_t.element) {
            let both_primitive = [fe, te]
                .iter()
                .all(|e| self.ty(*e).is_ok_and(|t| t.category == TypeCategory::Primitive));
            return if both_primitive { fe == te } else { self.is_assignable(fe, te) };
        }
        if from_t.category == TypeCategory::Array {
            return false;
        }
        from_t
            .superclass
            .iter()
            .chain(from_t.interfaces.iter())
            .any(|&parent| self.is_assignable(parent, to))
    }

    /// Most specific implementation of `name`+`signature` visible from `ty`.
    fn dispatch(&self, ty: TypeId, name: &str, signature: &str) -> Option<MethodId> {
        let mut current = Some(ty);
        while let Some(id) = current {
            let t = self.ty(id).ok()?;
            for &m in &t.methods {
                let method = self.method(m).ok()?;
                if method.desc.name == name && method.desc.signature == signature && method.body.is_some() {
                    return Some(m);
                }
            }
            current = t.superclass;
        }
        None
    }

    fn default_value(&self, type_name: &str) -> Value {
        Value::default_for(&JType::from_type_name(type_name))
    }

    fn instance_fields(&self, ty: TypeId) -> HashMap<String, Value> {
        let mut fields = HashMap::new();
        let mut current = Some(ty);
        while let Some(id) = current {
            let Ok(t) = self.ty(id) else { break };
            for f in t.fields.iter().filter(|f| !f.is_static) {
                fields.entry(f.name.clone()).or_insert_with(|| self.default_value(&f.type_name));
            }
            current = t.superclass;
        }
        fields
    }
}

/// The simulated target process.
pub struct SimVm {
    state: Mutex<State>,
    gate: Gate,
}

impl SimVm {
    /// A simulator with the core `java.lang` classes loaded.
    pub fn new() -> Self {
        let vm = Self {
            state: Mutex::new(State::default()),
            gate: Gate::default(),
        };
        if let Err(e) = core::install(&vm) {
            tracing::error!("installing the simulated core library failed: {}", e);
        }
        vm
    }

    /// The gate stalling methods wait on. It starts closed.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Loader `Class.forName` resolves names in first.
    pub fn set_context_loader(&self, loader: u32) {
        self.state.lock().context_loader = loader;
    }

    pub fn define_class(&self, def: ClassDef) -> ProtocolResult<TypeId> {
        self.define_class_in(def, BOOTSTRAP_LOADER)
    }

    /// Define a class in `loader`. Supertype names resolve in `loader` first,
    /// then in the bootstrap loader.
    pub fn define_class_in(&self, def: ClassDef, loader: u32) -> ProtocolResult<TypeId> {
        let mut state = self.state.lock();
        let lookup = |state: &State, name: &str| {
            state
                .named_in(name, loader)
                .ok_or_else(|| ProtocolError::Remote(format!("no class {} for {}", name, def.name)))
        };
        let superclass = match &def.superclass {
            Some(name) => Some(lookup(&*state, name)?),
            None => None,
        };
        let interfaces = def
            .interfaces
            .iter()
            .map(|name| lookup(&*state, name))
            .collect::<ProtocolResult<Vec<_>>>()?;
        let statics = def
            .fields
            .iter()
            .filter(|f| f.is_static)
            .map(|f| {
                let value = def
                    .statics
                    .iter()
                    .find(|(name, _)| name == &f.name)
                    .map(|(_, v)| *v)
                    .unwrap_or_else(|| state.default_value(&f.type_name));
                (f.name.clone(), value)
            })
            .collect();
        Ok(state.define(SimType {
            name: def.name,
            category: def.category,
            superclass,
            interfaces,
            fields: def.fields,
            statics,
            methods: Vec::new(),
            loader,
            element: None,
            mirror: None,
        }))
    }

    pub(crate) fn define_primitive(&self, p: Primitive) -> TypeId {
        self.state.lock().define(SimType {
            name: p.name().to_string(),
            category: TypeCategory::Primitive,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: HashMap::new(),
            methods: Vec::new(),
            loader: BOOTSTRAP_LOADER,
            element: None,
            mirror: None,
        })
    }

    fn add_method(&self, owner: TypeId, desc: MethodDesc, body: Option<Native>) -> ProtocolResult<MethodId> {
        let mut state = self.state.lock();
        let id = MethodId(state.methods.len() as u64);
        // same name and signature redefines the method
        let redefined = state
            .ty(owner)?
            .methods
            .iter()
            .position(|&m| {
                state
                    .method(m)
                    .is_ok_and(|old| old.desc.name == desc.name && old.desc.signature == desc.signature)
            });
        let methods = &mut state.ty_mut(owner)?.methods;
        match redefined {
            Some(slot) => methods[slot] = id,
            None => methods.push(id),
        }
        state.methods.push(SimMethod {
            desc: MethodDesc { id, ..desc },
            body,
        });
        Ok(id)
    }

    fn desc(name: &str, signature: &str, is_static: bool) -> MethodDesc {
        MethodDesc {
            id: MethodId(0),
            name: name.to_string(),
            signature: signature.to_string(),
            is_static,
            varargs: false,
        }
    }

    /// Add a method implemented by `body`. An existing method with the same
    /// name and signature is replaced.
    pub fn add_native<F>(&self, owner: TypeId, name: &str, signature: &str, is_static: bool, body: F) -> ProtocolResult<MethodId>
    where
        F: Fn(&SimVm, &Call<'_>) -> ProtocolResult<InvokeOutcome> + Send + Sync + 'static,
    {
        self.add_method(owner, Self::desc(name, signature, is_static), Some(Arc::new(body)))
    }

    /// Add a method with no body. Invoking it fails, except for
    /// constructors, which then only allocate.
    pub fn add_declared(&self, owner: TypeId, desc: MethodDesc) -> ProtocolResult<MethodId> {
        self.add_method(owner, desc, None)
    }

    /// Add a method that blocks on [`gate`](SimVm::gate) and then returns
    /// `result`.
    pub fn add_stalling(&self, owner: TypeId, name: &str, signature: &str, is_static: bool, result: Value) -> ProtocolResult<MethodId> {
        self.add_native(owner, name, signature, is_static, move |vm, _| {
            vm.gate.wait();
            Ok(InvokeOutcome::Returned(result))
        })
    }

    /// First type named `name`, bootstrap loader preferred.
    pub fn find_class(&self, name: &str) -> Option<TypeId> {
        self.state.lock().named_in(name, BOOTSTRAP_LOADER)
    }

    pub fn class_name(&self, ty: TypeId) -> ProtocolResult<String> {
        Ok(self.state.lock().ty(ty)?.name.clone())
    }

    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        self.state.lock().is_assignable(from, to)
    }

    /// Allocate an instance of `ty` with default-valued fields, without
    /// running a constructor.
    pub fn new_object(&self, ty: TypeId) -> ProtocolResult<ObjectId> {
        let mut state = self.state.lock();
        state.ty(ty)?;
        let fields = state.instance_fields(ty);
        Ok(state.allocate(ty, ObjectData::Fields(fields)))
    }

    pub fn new_string(&self, text: &str) -> ProtocolResult<ObjectId> {
        let mut state = self.state.lock();
        let string = state
            .named_in(STRING, BOOTSTRAP_LOADER)
            .ok_or_else(|| ProtocolError::Remote("java.lang.String is not loaded".into()))?;
        Ok(state.allocate(string, ObjectData::Text(text.to_string())))
    }

    /// A new array of type `array_type` holding `values`.
    pub fn new_array_of(&self, array_type: TypeId, values: Vec<Value>) -> ProtocolResult<ObjectId> {
        let mut state = self.state.lock();
        if state.ty(array_type)?.category != TypeCategory::Array {
            return Err(ProtocolError::Remote(format!("{} is not an array type", array_type)));
        }
        Ok(state.allocate(array_type, ObjectData::Array(values)))
    }

    /// The array type named `name` (e.g. `int[][]`), created on first use.
    pub fn array_type(&self, name: &str) -> ProtocolResult<TypeId> {
        let mut state = self.state.lock();
        let loader = state.context_loader;
        state
            .array_type(name, loader)
            .ok_or_else(|| ProtocolError::Remote(format!("no array type {}", name)))
    }

    pub fn set_field(&self, object: ObjectId, name: &str, value: Value) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        match &mut state.object_mut(object)?.data {
            ObjectData::Fields(fields) => {
                fields.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(ProtocolError::NoSuchField {
                owner: object.to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub fn get_field(&self, object: ObjectId, name: &str) -> ProtocolResult<Value> {
        let state = self.state.lock();
        match &state.object(object)?.data {
            ObjectData::Fields(fields) => fields.get(name).copied().ok_or_else(|| ProtocolError::NoSuchField {
                owner: object.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ProtocolError::NoSuchField {
                owner: object.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Text of a string object.
    pub fn text(&self, object: ObjectId) -> ProtocolResult<String> {
        let state = self.state.lock();
        match &state.object(object)?.data {
            ObjectData::Text(text) => Ok(text.clone()),
            _ => Err(ProtocolError::Remote(format!("{} is not a string", object))),
        }
    }

    /// A wrapper object holding `value`, shared for small integral values
    /// and booleans.
    pub fn boxed(&self, p: Primitive, value: Value) -> ProtocolResult<ObjectId> {
        let value = crate::ops::convert(&value, p).map_err(|e| ProtocolError::Remote(e.to_string()))?;
        let wrapper = self
            .find_class(p.box_class())
            .ok_or_else(|| ProtocolError::Remote(format!("{} is not loaded", p.box_class())))?;
        let key = match value {
            Value::Boolean(b) => Some(b as i64),
            Value::Char(c) if c <= 127 => Some(c as i64),
            other => other.as_long().filter(|v| (-128..=127).contains(v)),
        };
        if let Some(key) = key {
            if let Some(&cached) = self.state.lock().box_cache.get(&(wrapper, key)) {
                return Ok(cached);
            }
        }
        let object = self.new_object(wrapper)?;
        self.set_field(object, "value", value)?;
        if let Some(key) = key {
            self.state.lock().box_cache.insert((wrapper, key), object);
        }
        Ok(object)
    }

    /// Allocate `class_name` as a thrown exception carrying `message`.
    pub fn throw_new(&self, class_name: &str, message: &str) -> ProtocolResult<InvokeOutcome> {
        let class = self
            .find_class(class_name)
            .ok_or_else(|| ProtocolError::Remote(format!("{} is not loaded", class_name)))?;
        let exception = self.new_object(class)?;
        let text = self.new_string(message)?;
        self.set_field(exception, "message", Value::Object(text))?;
        Ok(InvokeOutcome::Threw(exception))
    }

    /// Invoke `name`+`signature` on `object` with virtual dispatch, from
    /// inside another native.
    pub fn call_virtual(
        &self,
        thread: ThreadId,
        object: ObjectId,
        name: &str,
        signature: &str,
        args: &[Value],
    ) -> ProtocolResult<InvokeOutcome> {
        let body = {
            let state = self.state.lock();
            let ty = state.object(object)?.ty;
            let method = state
                .dispatch(ty, name, signature)
                .ok_or_else(|| ProtocolError::Remote(format!("no method {}{} on {}", name, signature, object)))?;
            state.method(method)?.body.clone()
        };
        self.run(body, thread, Some(object), args, name)
    }

    fn run(
        &self,
        body: Option<Native>,
        thread: ThreadId,
        this: Option<ObjectId>,
        args: &[Value],
        name: &str,
    ) -> ProtocolResult<InvokeOutcome> {
        let body = body.ok_or_else(|| ProtocolError::Remote(format!("{} has no implementation in the simulator", name)))?;
        body(self, &Call { thread, this, args })
    }

    pub fn spawn_thread(&self, name: impl Into<String>) -> ThreadId {
        let mut state = self.state.lock();
        let id = ThreadId(state.threads.len() as u64);
        state.threads.push(SimThread {
            name: name.into(),
            frames: Vec::new(),
            suspended: true,
            epoch: 0,
        });
        id
    }

    pub fn thread_name(&self, thread: ThreadId) -> ProtocolResult<String> {
        Ok(self.state.lock().thread(thread)?.name.clone())
    }

    /// Push a frame; it becomes the innermost one.
    pub fn push_frame(&self, thread: ThreadId, frame: FrameSpec) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        state.ty(frame.declaring_type)?;
        state.thread_mut(thread)?.frames.push(SimFrame {
            declaring_type: frame.declaring_type,
            this: frame.this,
            is_static: frame.is_static,
            locals: frame.locals,
        });
        Ok(())
    }

    /// Resume a thread, invalidating runtime contexts built on it.
    pub fn resume(&self, thread: ThreadId) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        let t = state.thread_mut(thread)?;
        t.suspended = false;
        t.epoch += 1;
        Ok(())
    }

    pub fn suspend(&self, thread: ThreadId) -> ProtocolResult<()> {
        self.state.lock().thread_mut(thread)?.suspended = true;
        Ok(())
    }

    fn check_suspended(&self, thread: ThreadId) -> ProtocolResult<()> {
        if self.state.lock().thread(thread)?.suspended {
            Ok(())
        } else {
            Err(ProtocolError::ThreadNotSuspended(thread.0))
        }
    }

    pub(crate) fn for_name(&self, name: &str) -> Option<TypeId> {
        let mut state = self.state.lock();
        let loader = state.context_loader;
        let candidates = state.named(name);
        let in_context = candidates
            .iter()
            .copied()
            .find(|&id| state.types[id.0 as usize].loader == loader);
        in_context
            .or_else(|| candidates.first().copied())
            .or_else(|| state.array_type(name, loader))
    }
}

impl Default for SimVm {
    fn default() -> Self {
        Self::new()
    }
}

impl Target for SimVm {
    fn classes_by_name(&self, name: &str) -> ProtocolResult<Vec<TypeId>> {
        let mut state = self.state.lock();
        let found = state.named(name);
        if found.is_empty() && name.ends_with("[]") {
            let loader = state.context_loader;
            return Ok(state.array_type(name, loader).into_iter().collect());
        }
        Ok(found)
    }

    fn type_name(&self, ty: TypeId) -> ProtocolResult<String> {
        self.class_name(ty)
    }

    fn type_category(&self, ty: TypeId) -> ProtocolResult<TypeCategory> {
        Ok(self.state.lock().ty(ty)?.category)
    }

    fn superclass(&self, ty: TypeId) -> ProtocolResult<Option<TypeId>> {
        Ok(self.state.lock().ty(ty)?.superclass)
    }

    fn interfaces(&self, ty: TypeId) -> ProtocolResult<Vec<TypeId>> {
        Ok(self.state.lock().ty(ty)?.interfaces.clone())
    }

    fn fields(&self, ty: TypeId) -> ProtocolResult<Vec<FieldDesc>> {
        Ok(self.state.lock().ty(ty)?.fields.clone())
    }

    fn methods(&self, ty: TypeId) -> ProtocolResult<Vec<MethodDesc>> {
        let state = self.state.lock();
        state
            .ty(ty)?
            .methods
            .iter()
            .map(|&m| state.method(m).map(|method| method.desc.clone()))
            .collect()
    }

    fn class_object(&self, ty: TypeId) -> ProtocolResult<ObjectId> {
        let mut state = self.state.lock();
        if let Some(mirror) = state.ty(ty)?.mirror {
            return Ok(mirror);
        }
        let class = state
            .named_in(CLASS, BOOTSTRAP_LOADER)
            .ok_or_else(|| ProtocolError::Remote("java.lang.Class is not loaded".into()))?;
        let mirror = state.allocate(class, ObjectData::Mirror(ty));
        state.ty_mut(ty)?.mirror = Some(mirror);
        Ok(mirror)
    }

    fn reflected_type(&self, class_object: ObjectId) -> ProtocolResult<TypeId> {
        match self.state.lock().object(class_object)?.data {
            ObjectData::Mirror(ty) => Ok(ty),
            _ => Err(ProtocolError::Remote(format!("{} is not a class object", class_object))),
        }
    }

    fn object_type(&self, object: ObjectId) -> ProtocolResult<TypeId> {
        Ok(self.state.lock().object(object)?.ty)
    }

    fn field_value(&self, object: ObjectId, _owner: TypeId, name: &str) -> ProtocolResult<Value> {
        self.get_field(object, name)
    }

    fn set_field_value(&self, object: ObjectId, _owner: TypeId, name: &str, value: Value) -> ProtocolResult<()> {
        self.get_field(object, name)?;
        self.set_field(object, name, value)
    }

    fn static_value(&self, owner: TypeId, name: &str) -> ProtocolResult<Value> {
        let state = self.state.lock();
        let mut current = Some(owner);
        while let Some(id) = current {
            let t = state.ty(id)?;
            if let Some(value) = t.statics.get(name) {
                return Ok(*value);
            }
            current = t.superclass;
        }
        Err(ProtocolError::NoSuchField {
            owner: state.ty(owner)?.name.clone(),
            name: name.to_string(),
        })
    }

    fn set_static_value(&self, owner: TypeId, name: &str, value: Value) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        let mut current = Some(owner);
        while let Some(id) = current {
            let t = state.ty_mut(id)?;
            if let Some(slot) = t.statics.get_mut(name) {
                *slot = value;
                return Ok(());
            }
            current = t.superclass;
        }
        Err(ProtocolError::NoSuchField {
            owner: state.ty(owner)?.name.clone(),
            name: name.to_string(),
        })
    }

    fn array_length(&self, array: ObjectId) -> ProtocolResult<i32> {
        match &self.state.lock().object(array)?.data {
            ObjectData::Array(items) => Ok(items.len() as i32),
            _ => Err(ProtocolError::Remote(format!("{} is not an array", array))),
        }
    }

    fn array_get(&self, array: ObjectId, index: i32) -> ProtocolResult<Value> {
        match &self.state.lock().object(array)?.data {
            ObjectData::Array(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).copied())
                .ok_or(ProtocolError::IndexOutOfRange {
                    index,
                    length: items.len() as i32,
                }),
            _ => Err(ProtocolError::Remote(format!("{} is not an array", array))),
        }
    }

    fn array_set(&self, array: ObjectId, index: i32, value: Value) -> ProtocolResult<()> {
        match &mut self.state.lock().object_mut(array)?.data {
            ObjectData::Array(items) => {
                let length = items.len() as i32;
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or(ProtocolError::IndexOutOfRange { index, length })?;
                *slot = value;
                Ok(())
            }
            _ => Err(ProtocolError::Remote(format!("{} is not an array", array))),
        }
    }

    fn new_array(&self, array_type: TypeId, length: i32) -> ProtocolResult<ObjectId> {
        let mut state = self.state.lock();
        let element = state
            .ty(array_type)?
            .element
            .ok_or_else(|| ProtocolError::Remote(format!("{} is not an array type", array_type)))?;
        let default = state.default_value(&state.ty(element)?.name);
        let length = usize::try_from(length).map_err(|_| ProtocolError::Remote(format!("negative array length {}", length)))?;
        Ok(state.allocate(array_type, ObjectData::Array(vec![default; length])))
    }

    fn mirror_string(&self, text: &str) -> ProtocolResult<ObjectId> {
        self.new_string(text)
    }

    fn string_value(&self, string: ObjectId) -> ProtocolResult<String> {
        self.text(string)
    }

    fn suspend_epoch(&self, thread: ThreadId) -> ProtocolResult<u64> {
        Ok(self.state.lock().thread(thread)?.epoch)
    }

    fn frame(&self, thread: ThreadId, depth: usize) -> ProtocolResult<FrameInfo> {
        let state = self.state.lock();
        let frame = state.suspended_frame(thread, depth)?;
        Ok(FrameInfo {
            declaring_type: frame.declaring_type,
            this: frame.this,
            is_static: frame.is_static,
            locals: frame.locals.iter().map(|(slot, _)| slot.clone()).collect(),
        })
    }

    fn local_value(&self, thread: ThreadId, depth: usize, name: &str) -> ProtocolResult<Value> {
        let state = self.state.lock();
        state
            .suspended_frame(thread, depth)?
            .locals
            .iter()
            .find(|(slot, _)| slot.name == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| ProtocolError::NoSuchLocal(name.to_string()))
    }

    fn set_local_value(&self, thread: ThreadId, depth: usize, name: &str, value: Value) -> ProtocolResult<()> {
        let mut state = self.state.lock();
        state.suspended_frame(thread, depth)?;
        let t = state.thread_mut(thread)?;
        let index = t.frames.len() - 1 - depth;
        let slot = t.frames[index]
            .locals
            .iter_mut()
            .find(|(slot, _)| slot.name == name)
            .ok_or_else(|| ProtocolError::NoSuchLocal(name.to_string()))?;
        slot.1 = value;
        Ok(())
    }

    fn invoke_method(
        &self,
        thread: ThreadId,
        object: ObjectId,
        method: MethodId,
        args: &[Value],
        nonvirtual: bool,
    ) -> ProtocolResult<InvokeOutcome> {
        self.check_suspended(thread)?;
        let (body, name) = {
            let state = self.state.lock();
            let declared = state.method(method)?;
            let target = if nonvirtual {
                method
            } else {
                let ty = state.object(object)?.ty;
                state
                    .dispatch(ty, &declared.desc.name, &declared.desc.signature)
                    .unwrap_or(method)
            };
            let chosen = state.method(target)?;
            (chosen.body.clone(), chosen.desc.name.clone())
        };
        self.run(body, thread, Some(object), args, &name)
    }

    fn invoke_static(&self, thread: ThreadId, _owner: TypeId, method: MethodId, args: &[Value]) -> ProtocolResult<InvokeOutcome> {
        self.check_suspended(thread)?;
        let (body, name) = {
            let state = self.state.lock();
            let m = state.method(method)?;
            if !m.desc.is_static {
                return Err(ProtocolError::Remote(format!("{} is not static", m.desc.name)));
            }
            (m.body.clone(), m.desc.name.clone())
        };
        self.run(body, thread, None, args, &name)
    }

    fn new_instance(&self, thread: ThreadId, class: TypeId, constructor: MethodId, args: &[Value]) -> ProtocolResult<InvokeOutcome> {
        self.check_suspended(thread)?;
        let body = self.state.lock().method(constructor)?.body.clone();
        let object = self.new_object(class)?;
        if let Some(body) = body {
            if let InvokeOutcome::Threw(exception) = body(self, &Call { thread, this: Some(object), args })? {
                return Ok(InvokeOutcome::Threw(exception));
            }
        }
        Ok(InvokeOutcome::Returned(Value::Object(object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_bumps_epoch_and_hides_frames() {
        let vm = SimVm::new();
        let object = vm.find_class(OBJECT).unwrap();
        let thread = vm.spawn_thread("worker");
        vm.push_frame(thread, FrameSpec::new(object).with_local("n", "int", Value::Int(1)))
            .unwrap();
        assert_eq!(vm.suspend_epoch(thread).unwrap(), 0);
        assert_eq!(vm.local_value(thread, 0, "n").unwrap(), Value::Int(1));

        vm.resume(thread).unwrap();
        assert_eq!(vm.suspend_epoch(thread).unwrap(), 1);
        assert_eq!(vm.frame(thread, 0).unwrap_err(), ProtocolError::ThreadNotSuspended(thread.0));
        vm.suspend(thread).unwrap();
        assert_eq!(
            vm.frame(thread, 1).unwrap_err(),
            ProtocolError::NoSuchFrame { thread: thread.0, depth: 1 }
        );
    }

    #[test]
    fn test_array_types_are_created_on_demand() {
        let vm = SimVm::new();
        let ids = vm.classes_by_name("int[][]").unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(vm.type_category(ids[0]).unwrap(), TypeCategory::Array);
        assert_eq!(vm.classes_by_name("int[][]").unwrap(), ids);

        let array = vm.new_array(vm.array_type("long[]").unwrap(), 2).unwrap();
        assert_eq!(vm.array_get(array, 1).unwrap(), Value::Long(0));
        assert_eq!(
            vm.array_set(array, 2, Value::Long(1)).unwrap_err(),
            ProtocolError::IndexOutOfRange { index: 2, length: 2 }
        );
    }

    #[test]
    fn test_array_assignability() {
        let vm = SimVm::new();
        let strings = vm.array_type("java.lang.String[]").unwrap();
        let objects = vm.array_type("java.lang.Object[]").unwrap();
        let ints = vm.array_type("int[]").unwrap();
        let longs = vm.array_type("long[]").unwrap();
        assert!(vm.is_assignable(strings, objects));
        assert!(!vm.is_assignable(objects, strings));
        assert!(!vm.is_assignable(ints, longs));
        assert!(vm.is_assignable(ints, vm.find_class(OBJECT).unwrap()));
    }

    #[test]
    fn test_for_name_prefers_context_loader() {
        let vm = SimVm::new();
        let first = vm.define_class_in(ClassDef::class("app.Main"), 1).unwrap();
        let second = vm.define_class_in(ClassDef::class("app.Main"), 2).unwrap();
        assert_eq!(vm.for_name("app.Main"), Some(first));
        vm.set_context_loader(2);
        assert_eq!(vm.for_name("app.Main"), Some(second));
        assert_eq!(vm.classes_by_name("app.Main").unwrap(), vec![first, second]);
        assert_eq!(vm.for_name("app.Missing"), None);
    }

    #[test]
    fn test_virtual_dispatch_uses_runtime_type() {
        let vm = SimVm::new();
        let base = vm.define_class(ClassDef::class("zoo.Animal")).unwrap();
        let cat = vm.define_class(ClassDef::class("zoo.Cat").extends("zoo.Animal")).unwrap();
        let speak = vm
            .add_native(base, "speak", "()I", false, |_, _| Ok(InvokeOutcome::Returned(Value::Int(0))))
            .unwrap();
        vm.add_native(cat, "speak", "()I", false, |_, _| Ok(InvokeOutcome::Returned(Value::Int(1))))
            .unwrap();
        let thread = vm.spawn_thread("main");
        let tom = vm.new_object(cat).unwrap();
        assert_eq!(
            vm.invoke_method(thread, tom, speak, &[], false).unwrap(),
            InvokeOutcome::Returned(Value::Int(1))
        );
        assert_eq!(
            vm.invoke_method(thread, tom, speak, &[], true).unwrap(),
            InvokeOutcome::Returned(Value::Int(0))
        );
    }
}
