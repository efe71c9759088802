//! The instruction interpreter.
//!
//! One [`Interpreter`] runs one instruction sequence from the first
//! instruction to completion or fault, on the calling thread. Every remote
//! operation goes through the context's [`Target`].

use std::collections::HashMap;

use snapeval_compiler::Instruction;
use snapeval_parser::types::{JType, Primitive, CLASS, OBJECT, STRING};
use tokio_util::sync::CancellationToken;

use crate::context::RuntimeContext;
use crate::error::{CapturedException, Fault, Result};
use crate::ops::{self, ArithOp, CompareOp};
use crate::target::{InvokeOutcome, MethodId, ObjectId, Target, TypeId};
use crate::value::{RemoteType, Value, Variable};

/// One operand stack entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    Variable(Variable),
}

enum Flow {
    Next,
    Return(Option<Value>),
}

/// Stack machine state for a single run.
pub struct Interpreter<'a> {
    context: &'a RuntimeContext,
    stack: Vec<Entry>,
    locals: HashMap<String, Value>,
    pc: usize,
    steps: u64,
    step_limit: Option<u64>,
    cancel: CancellationToken,
    types: HashMap<String, RemoteType>,
    methods: HashMap<(TypeId, String, String), MethodId>,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a RuntimeContext) -> Self {
        Self {
            context,
            stack: Vec::new(),
            locals: HashMap::new(),
            pc: 0,
            steps: 0,
            step_limit: None,
            cancel: CancellationToken::new(),
            types: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    /// Fail with [`Fault::StepLimit`] after `limit` executed instructions.
    pub fn with_step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }

    /// Stop with [`Fault::Cancelled`] at the next instruction boundary once
    /// `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn target(&self) -> &'a dyn Target {
        self.context.target().as_ref()
    }

    /// Run `code` and return the value it leaves, `None` for void.
    pub fn execute(&mut self, code: &[Instruction]) -> Result<Option<Value>> {
        self.context.ensure_valid()?;
        while let Some(instruction) = code.get(self.pc) {
            if self.cancel.is_cancelled() {
                return Err(Fault::Cancelled);
            }
            self.steps += 1;
            if let Some(limit) = self.step_limit {
                if self.steps > limit {
                    return Err(Fault::StepLimit(limit));
                }
            }
            tracing::trace!(pc = self.pc, %instruction, depth = self.stack.len(), "execute");
            self.pc += instruction.size();
            match self.step(instruction)? {
                Flow::Next => {}
                Flow::Return(value) => return Ok(value),
            }
            if self.pc > code.len() {
                return Err(Fault::internal(format!("jump past the end to {}", self.pc)));
            }
        }
        if self.stack.len() > 1 {
            return Err(Fault::internal(format!(
                "{} entries left on the operand stack",
                self.stack.len()
            )));
        }
        match self.stack.pop() {
            Some(entry) => Ok(Some(self.value_of(entry)?)),
            None => Ok(None),
        }
    }

    // Stack

    fn pop(&mut self) -> Result<Entry> {
        self.stack.pop().ok_or_else(|| Fault::internal("operand stack underflow"))
    }

    fn pop_value(&mut self) -> Result<Value> {
        let entry = self.pop()?;
        self.value_of(entry)
    }

    fn pop_variable(&mut self) -> Result<Variable> {
        match self.pop()? {
            Entry::Variable(v) => Ok(v),
            Entry::Value(v) => Err(Fault::internal(format!("expected a variable, found {}", v))),
        }
    }

    fn pop_object(&mut self, what: &str) -> Result<ObjectId> {
        match self.pop_value()? {
            Value::Object(id) => Ok(id),
            Value::Null => Err(Fault::NullPointer(what.to_string())),
            other => Err(Fault::internal(format!("expected an object for {}, found {}", what, other))),
        }
    }

    fn pop_int(&mut self) -> Result<i32> {
        let value = self.pop_value()?;
        let value = self.unboxed(value, Primitive::Int)?;
        match ops::convert(&value, Primitive::Int)? {
            Value::Int(i) => Ok(i),
            other => Err(Fault::internal(format!("expected an int, found {}", other))),
        }
    }

    fn pop_args(&mut self, count: usize) -> Result<Vec<Value>> {
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            args.push(self.pop_value()?);
        }
        args.reverse();
        Ok(args)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Entry::Value(value));
    }

    fn value_of(&mut self, entry: Entry) -> Result<Value> {
        match entry {
            Entry::Value(v) => Ok(v),
            Entry::Variable(var) => self.read(&var),
        }
    }

    // Variables

    fn read(&mut self, var: &Variable) -> Result<Value> {
        match var {
            Variable::SnippetLocal(name) => self
                .locals
                .get(name)
                .copied()
                .ok_or_else(|| Fault::internal(format!("undeclared local {}", name))),
            Variable::FrameLocal(name) => self.context.local_value(name),
            Variable::Field { object, owner, name } => Ok(self.target().field_value(*object, owner.id, name)?),
            Variable::StaticField { owner, name } => Ok(self.target().static_value(owner.id, name)?),
            Variable::ArrayElement { array, index } => {
                self.check_index(*array, *index)?;
                Ok(self.target().array_get(*array, *index)?)
            }
        }
    }

    fn write(&mut self, var: &Variable, value: Value) -> Result<()> {
        match var {
            Variable::SnippetLocal(name) => {
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            Variable::FrameLocal(name) => self.context.set_local_value(name, value),
            Variable::Field { object, owner, name } => {
                Ok(self.target().set_field_value(*object, owner.id, name, value)?)
            }
            Variable::StaticField { owner, name } => Ok(self.target().set_static_value(owner.id, name, value)?),
            Variable::ArrayElement { array, index } => {
                self.check_index(*array, *index)?;
                Ok(self.target().array_set(*array, *index, value)?)
            }
        }
    }

    fn check_index(&self, array: ObjectId, index: i32) -> Result<()> {
        let length = self.target().array_length(array)?;
        if index < 0 || index >= length {
            return Err(Fault::ArrayIndex { index, length });
        }
        Ok(())
    }

    fn jump(&mut self, offset: isize) -> Result<()> {
        self.pc = self
            .pc
            .checked_add_signed(offset)
            .ok_or_else(|| Fault::internal(format!("jump before the start by {}", offset)))?;
        Ok(())
    }

    fn step(&mut self, instruction: &Instruction) -> Result<Flow> {
        use Instruction as I;
        match instruction {
            I::PushInt(v) => self.push(Value::Int(*v)),
            I::PushLong(v) => self.push(Value::Long(*v)),
            I::PushFloat(v) => self.push(Value::Float(*v)),
            I::PushDouble(v) => self.push(Value::Double(*v)),
            I::PushChar(v) => self.push(Value::Char(*v)),
            I::PushBoolean(v) => self.push(Value::Boolean(*v)),
            I::PushNull => self.push(Value::Null),
            I::PushString(text) => {
                let id = self.target().mirror_string(text)?;
                self.push(Value::Object(id));
            }
            I::PushThis => match self.context.receiver()? {
                Some(this) => self.push(Value::Object(this)),
                None => return Err(Fault::internal("no receiver in a static context")),
            },
            I::PushClass(ty) => {
                let resolved = self.resolve_jtype(ty)?;
                let class = self.target().class_object(resolved.id)?;
                self.push(Value::Object(class));
            }

            I::PushLocal(name) => {
                let var = if self.locals.contains_key(name) {
                    Variable::SnippetLocal(name.clone())
                } else if self.context.has_local(name) {
                    Variable::FrameLocal(name.clone())
                } else {
                    return Err(Fault::internal(format!("unknown local {}", name)));
                };
                self.stack.push(Entry::Variable(var));
            }
            I::LocalVariableCreation { name, ty, has_init } => {
                let value = if *has_init {
                    self.pop_value()?
                } else {
                    Value::default_for(ty)
                };
                self.locals.insert(name.clone(), value);
            }
            I::PushField { owner, name } => {
                let object = self.pop_object(&format!("read of field {}", name))?;
                let owner = self.resolve_type(owner)?;
                self.stack.push(Entry::Variable(Variable::Field {
                    object,
                    owner,
                    name: name.clone(),
                }));
            }
            I::PushStaticField { owner, name } => {
                let owner = self.resolve_type(owner)?;
                self.stack.push(Entry::Variable(Variable::StaticField {
                    owner,
                    name: name.clone(),
                }));
            }
            I::ArrayAccess => {
                let index = self.pop_int()?;
                let array = self.pop_object("array access")?;
                self.stack.push(Entry::Variable(Variable::ArrayElement { array, index }));
            }
            I::ArrayLength => {
                let array = self.pop_object("array length")?;
                let length = self.target().array_length(array)?;
                self.push(Value::Int(length));
            }
            I::Assign => {
                let value = self.pop_value()?;
                let var = self.pop_variable()?;
                self.write(&var, value)?;
                self.push(value);
            }

            I::PreIncrement(ty) => self.increment(ty, 1, true)?,
            I::PreDecrement(ty) => self.increment(ty, -1, true)?,
            I::PostIncrement(ty) => self.increment(ty, 1, false)?,
            I::PostDecrement(ty) => self.increment(ty, -1, false)?,

            I::Dup => {
                let top = self.stack.last().cloned().ok_or_else(|| Fault::internal("dup on empty stack"))?;
                self.stack.push(top);
            }
            I::Pop => {
                self.pop()?;
            }

            I::Negate(p) => {
                let value = self.pop_primitive(*p)?;
                self.push(ops::negate(*p, &value)?);
            }
            I::BitNot(p) => {
                let value = self.pop_primitive(*p)?;
                self.push(ops::bit_not(*p, &value)?);
            }
            I::Not => {
                let value = self.pop_condition()?;
                self.push(Value::Boolean(!value));
            }

            I::Add(p) => self.arithmetic(ArithOp::Add, *p)?,
            I::Subtract(p) => self.arithmetic(ArithOp::Sub, *p)?,
            I::Multiply(p) => self.arithmetic(ArithOp::Mul, *p)?,
            I::Divide(p) => self.arithmetic(ArithOp::Div, *p)?,
            I::Remainder(p) => self.arithmetic(ArithOp::Rem, *p)?,
            I::ShiftLeft(p) => self.arithmetic(ArithOp::Shl, *p)?,
            I::ShiftRight(p) => self.arithmetic(ArithOp::Shr, *p)?,
            I::UnsignedShiftRight(p) => self.arithmetic(ArithOp::UShr, *p)?,
            I::BitAnd(p) => self.arithmetic(ArithOp::And, *p)?,
            I::BitOr(p) => self.arithmetic(ArithOp::Or, *p)?,
            I::BitXor(p) => self.arithmetic(ArithOp::Xor, *p)?,
            I::Less(p) => self.compare(CompareOp::Lt, *p)?,
            I::LessEqual(p) => self.compare(CompareOp::Le, *p)?,
            I::Greater(p) => self.compare(CompareOp::Gt, *p)?,
            I::GreaterEqual(p) => self.compare(CompareOp::Ge, *p)?,
            I::Equal(Some(p)) => self.compare(CompareOp::Eq, *p)?,
            I::NotEqual(Some(p)) => self.compare(CompareOp::Ne, *p)?,
            I::Equal(None) => {
                let same = self.same_reference()?;
                self.push(Value::Boolean(same));
            }
            I::NotEqual(None) => {
                let same = self.same_reference()?;
                self.push(Value::Boolean(!same));
            }
            I::Concat => {
                let rhs = self.pop_value()?;
                let lhs = self.pop_value()?;
                let text = self.string_of(lhs)? + &self.string_of(rhs)?;
                let id = self.target().mirror_string(&text)?;
                self.push(Value::Object(id));
            }

            I::Cast(p) => {
                let value = self.pop_primitive(*p)?;
                self.push(ops::convert(&value, *p)?);
            }
            I::CheckCast(ty) => {
                let value = self.pop_value()?;
                if let Value::Object(object) = value {
                    if !self.is_instance(object, ty)? {
                        let from = self.target().type_name(self.target().object_type(object)?)?;
                        return Err(Fault::ClassCast {
                            from,
                            to: ty.to_string(),
                        });
                    }
                }
                self.push(value);
            }
            I::InstanceOf(ty) => {
                let result = match self.pop_value()? {
                    Value::Object(object) => self.is_instance(object, ty)?,
                    _ => false,
                };
                self.push(Value::Boolean(result));
            }
            I::Box(p) => {
                let value = self.pop_value()?;
                let boxed = self.box_value(value, *p)?;
                self.push(boxed);
            }
            I::Unbox(p) => {
                let value = self.pop_value()?;
                let unboxed = self.unboxed(value, *p)?;
                self.push(unboxed);
            }

            I::Jump(offset) => self.jump(*offset)?,
            I::JumpIfFalse(offset) => {
                if !self.pop_condition()? {
                    self.jump(*offset)?;
                }
            }
            I::JumpIfTrue(offset) => {
                if self.pop_condition()? {
                    self.jump(*offset)?;
                }
            }

            I::SendMessage {
                owner,
                name,
                signature,
                arg_count,
                nonvirtual,
            } => {
                let args = self.pop_args(*arg_count)?;
                let receiver = self.pop_object(&format!("invocation of {}", name))?;
                let owner = self.resolve_type(owner)?;
                let method = self.find_method(&owner, name, signature)?;
                let outcome = self
                    .target()
                    .invoke_method(self.context.thread(), receiver, method, &args, *nonvirtual)?;
                let result = self.returned(outcome)?;
                if !Instruction::returns_void(signature) {
                    self.push(result);
                }
            }
            I::SendStaticMessage {
                owner,
                name,
                signature,
                arg_count,
            } => {
                let args = self.pop_args(*arg_count)?;
                let result = self.invoke_static(owner, name, signature, &args)?;
                if !Instruction::returns_void(signature) {
                    self.push(result);
                }
            }
            I::New {
                class,
                signature,
                arg_count,
            } => {
                let args = self.pop_args(*arg_count)?;
                let class = self.resolve_type(class)?;
                let constructor = self.find_method(&class, "<init>", signature)?;
                let outcome = self
                    .target()
                    .new_instance(self.context.thread(), class.id, constructor, &args)?;
                let object = self.returned(outcome)?;
                self.push(object);
            }

            I::NewArray { ty, dims } => {
                let mut sizes = Vec::with_capacity(*dims);
                for _ in 0..*dims {
                    sizes.push(self.pop_int()?);
                }
                sizes.reverse();
                let array = self.new_array(ty, &sizes)?;
                self.push(Value::Object(array));
            }
            I::ArrayInitializer { ty, length } => {
                let values = self.pop_args(*length)?;
                let array_type = self.resolve_jtype(ty)?;
                let array = self.target().new_array(array_type.id, values.len() as i32)?;
                for (index, value) in values.into_iter().enumerate() {
                    self.target().array_set(array, index as i32, value)?;
                }
                self.push(Value::Object(array));
            }

            I::Throw => {
                let exception = self.pop_object("throw")?;
                return Err(Fault::Exception(self.capture(exception)));
            }
            I::Return { with_value } => {
                let value = if *with_value { Some(self.pop_value()?) } else { None };
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    // Operators

    fn pop_primitive(&mut self, p: Primitive) -> Result<Value> {
        let value = self.pop_value()?;
        self.unboxed(value, p)
    }

    fn pop_condition(&mut self) -> Result<bool> {
        let value = self.pop_primitive(Primitive::Boolean)?;
        value
            .as_bool()
            .ok_or_else(|| Fault::internal(format!("expected a boolean, found {}", value)))
    }

    fn arithmetic(&mut self, op: ArithOp, p: Primitive) -> Result<()> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_primitive(p)?;
        let rhs = self.unboxed(rhs, p)?;
        self.push(ops::arithmetic(op, p, &lhs, &rhs)?);
        Ok(())
    }

    fn compare(&mut self, op: CompareOp, p: Primitive) -> Result<()> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_primitive(p)?;
        let rhs = self.unboxed(rhs, p)?;
        let result = ops::compare(op, p, &lhs, &rhs)?;
        self.push(Value::Boolean(result));
        Ok(())
    }

    fn same_reference(&mut self) -> Result<bool> {
        let rhs = self.pop_value()?;
        let lhs = self.pop_value()?;
        match (lhs, rhs) {
            (Value::Null, Value::Null) => Ok(true),
            (Value::Object(a), Value::Object(b)) => Ok(a == b),
            (Value::Null, Value::Object(_)) | (Value::Object(_), Value::Null) => Ok(false),
            (a, b) => Err(Fault::internal(format!("reference comparison of {} and {}", a, b))),
        }
    }

    fn increment(&mut self, ty: &JType, delta: i32, prefix: bool) -> Result<()> {
        let var = self.pop_variable()?;
        let old = self.read(&var)?;
        let new = match ty {
            JType::Primitive(_) => ops::step(&old, delta)?,
            _ => {
                let p = ty
                    .unboxed_primitive()
                    .ok_or_else(|| Fault::internal(format!("cannot increment a {}", ty)))?;
                let unboxed = self.unboxed(old, p)?;
                let stepped = ops::step(&unboxed, delta)?;
                self.box_value(stepped, p)?
            }
        };
        self.write(&var, new)?;
        self.push(if prefix { new } else { old });
        Ok(())
    }

    fn string_of(&mut self, value: Value) -> Result<String> {
        let object = match value {
            Value::Null => return Ok("null".to_string()),
            Value::Object(id) => id,
            primitive => {
                return ops::primitive_string(&primitive)
                    .ok_or_else(|| Fault::internal(format!("no string form for {}", primitive)))
            }
        };
        let ty = self.target().object_type(object)?;
        if self.target().type_name(ty)? == STRING {
            return Ok(self.target().string_value(object)?);
        }
        let object_type = self.resolve_type(OBJECT)?;
        let to_string = self.find_method(&object_type, "toString", "()Ljava/lang/String;")?;
        let outcome = self
            .target()
            .invoke_method(self.context.thread(), object, to_string, &[], false)?;
        match self.returned(outcome)? {
            Value::Object(text) => Ok(self.target().string_value(text)?),
            _ => Ok("null".to_string()),
        }
    }

    // Boxing

    fn box_value(&mut self, value: Value, p: Primitive) -> Result<Value> {
        if matches!(value, Value::Object(_) | Value::Null) {
            return Ok(value);
        }
        let value = ops::convert(&value, p)?;
        let wrapper = JType::Class(p.box_class().to_string());
        let signature = format!("({}){}", p.descriptor(), wrapper.descriptor());
        self.invoke_static(p.box_class(), "valueOf", &signature, &[value])
    }

    /// The primitive held by `value`, unboxing through `xxxValue()` when it
    /// is a wrapper object.
    fn unboxed(&mut self, value: Value, p: Primitive) -> Result<Value> {
        let object = match value {
            Value::Object(id) => id,
            Value::Null => return Err(Fault::NullPointer(format!("unboxing to {}", p.name()))),
            primitive => return Ok(primitive),
        };
        let ty = self.target().object_type(object)?;
        let type_name = self.target().type_name(ty)?;
        let held = Primitive::unboxed(&type_name)
            .ok_or_else(|| Fault::internal(format!("cannot unbox a {} to {}", type_name, p.name())))?;
        let owner = self.resolve_type(&type_name)?;
        let name = format!("{}Value", held.name());
        let signature = format!("(){}", held.descriptor());
        let method = self.find_method(&owner, &name, &signature)?;
        let outcome = self
            .target()
            .invoke_method(self.context.thread(), object, method, &[], false)?;
        self.returned(outcome)
    }

    // Invocation

    fn invoke_static(&mut self, owner: &str, name: &str, signature: &str, args: &[Value]) -> Result<Value> {
        let owner = self.resolve_type(owner)?;
        let method = self.find_method(&owner, name, signature)?;
        let outcome = self
            .target()
            .invoke_static(self.context.thread(), owner.id, method, args)?;
        self.returned(outcome)
    }

    fn returned(&mut self, outcome: InvokeOutcome) -> Result<Value> {
        match outcome {
            InvokeOutcome::Returned(value) => Ok(value),
            InvokeOutcome::Threw(exception) => Err(Fault::Exception(self.capture(exception))),
        }
    }

    fn capture(&mut self, exception: ObjectId) -> CapturedException {
        let type_name = self
            .target()
            .object_type(exception)
            .and_then(|ty| self.target().type_name(ty))
            .unwrap_or_else(|_| "<unknown>".to_string());
        let message = self.exception_message(exception).ok().flatten();
        CapturedException {
            object: exception,
            type_name,
            message,
        }
    }

    fn exception_message(&mut self, exception: ObjectId) -> Result<Option<String>> {
        let throwable = self.resolve_type(snapeval_parser::types::THROWABLE)?;
        let get_message = self.find_method(&throwable, "getMessage", "()Ljava/lang/String;")?;
        let outcome = self
            .target()
            .invoke_method(self.context.thread(), exception, get_message, &[], false)?;
        match outcome {
            InvokeOutcome::Returned(Value::Object(text)) => Ok(Some(self.target().string_value(text)?)),
            _ => Ok(None),
        }
    }

    /// Find a method declared by `owner` or inherited from its supertypes.
    fn find_method(&mut self, owner: &RemoteType, name: &str, signature: &str) -> Result<MethodId> {
        let key = (owner.id, name.to_string(), signature.to_string());
        if let Some(id) = self.methods.get(&key) {
            return Ok(*id);
        }
        let mut pending = vec![owner.id];
        let mut seen = Vec::new();
        while let Some(ty) = pending.pop() {
            if seen.contains(&ty) {
                continue;
            }
            seen.push(ty);
            let declared = self.target().methods(ty)?;
            if let Some(method) = declared.iter().find(|m| m.name == name && m.signature == signature) {
                self.methods.insert(key, method.id);
                return Ok(method.id);
            }
            // constructors are never inherited
            if name == "<init>" {
                break;
            }
            pending.extend(self.target().interfaces(ty)?);
            if let Some(superclass) = self.target().superclass(ty)? {
                pending.push(superclass);
            }
        }
        Err(Fault::NoSuchMethod {
            owner: owner.name.clone(),
            name: name.to_string(),
            signature: signature.to_string(),
        })
    }

    // Types

    fn resolve_jtype(&mut self, ty: &JType) -> Result<RemoteType> {
        self.resolve_type(&ty.to_string())
    }

    /// Resolve a type name to a loaded type, at most once per run.
    ///
    /// A unique candidate is taken as is. With no candidate, or several
    /// loaded under different class loaders, the name is looked up through
    /// `Class.forName` and the first candidate whose class object is the
    /// returned one wins.
    pub fn resolve_type(&mut self, name: &str) -> Result<RemoteType> {
        if let Some(ty) = self.types.get(name) {
            return Ok(ty.clone());
        }
        let candidates = self.target().classes_by_name(name)?;
        let id = match candidates.as_slice() {
            [only] => *only,
            _ => {
                tracing::debug!(name, candidates = candidates.len(), "looking up type through Class.forName");
                let class = self.class_for_name(name)?;
                if candidates.is_empty() {
                    self.target().reflected_type(class)?
                } else {
                    let mut matched = None;
                    for candidate in &candidates {
                        if self.target().class_object(*candidate)? == class {
                            matched = Some(*candidate);
                            break;
                        }
                    }
                    matched.ok_or_else(|| Fault::AmbiguousType(name.to_string()))?
                }
            }
        };
        let resolved = RemoteType::fetch(self.target(), id)?;
        self.types.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn class_for_name(&mut self, name: &str) -> Result<ObjectId> {
        let class_type = match self.types.get(CLASS) {
            Some(ty) => ty.clone(),
            None => match self.target().classes_by_name(CLASS)?.as_slice() {
                [only] => {
                    let ty = RemoteType::fetch(self.target(), *only)?;
                    self.types.insert(CLASS.to_string(), ty.clone());
                    ty
                }
                _ => return Err(Fault::UnknownType(CLASS.to_string())),
            },
        };
        let for_name = self.find_method(&class_type, "forName", "(Ljava/lang/String;)Ljava/lang/Class;")?;
        let text = self.target().mirror_string(name)?;
        let outcome = self
            .target()
            .invoke_static(self.context.thread(), class_type.id, for_name, &[Value::Object(text)])?;
        match outcome {
            InvokeOutcome::Returned(Value::Object(class)) => Ok(class),
            _ => Err(Fault::UnknownType(name.to_string())),
        }
    }

    fn is_instance(&mut self, object: ObjectId, ty: &JType) -> Result<bool> {
        let resolved = self.resolve_jtype(ty)?;
        let class = self.target().class_object(resolved.id)?;
        let class_type = self.resolve_type(CLASS)?;
        let is_instance = self.find_method(&class_type, "isInstance", "(Ljava/lang/Object;)Z")?;
        let outcome = self.target().invoke_method(
            self.context.thread(),
            class,
            is_instance,
            &[Value::Object(object)],
            false,
        )?;
        match self.returned(outcome)? {
            Value::Boolean(b) => Ok(b),
            other => Err(Fault::internal(format!("isInstance returned {}", other))),
        }
    }

    fn new_array(&mut self, ty: &JType, sizes: &[i32]) -> Result<ObjectId> {
        let Some((&length, inner)) = sizes.split_first() else {
            return Err(Fault::internal("array creation without dimensions"));
        };
        if length < 0 {
            return Err(Fault::NegativeArraySize(length));
        }
        let array_type = self.resolve_jtype(ty)?;
        let array = self.target().new_array(array_type.id, length)?;
        if let (false, Some(element)) = (inner.is_empty(), ty.element_type()) {
            for index in 0..length {
                let sub = self.new_array(element, inner)?;
                self.target().array_set(array, index, Value::Object(sub))?;
            }
        }
        Ok(array)
    }
}
