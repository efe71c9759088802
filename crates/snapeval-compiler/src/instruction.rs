//! The instruction set.
//!
//! A snippet is lowered to a flat sequence of stack-machine instructions.
//! Operand stack entries are either values or variables (assignable
//! locations); instructions that consume a value dereference a variable
//! operand first. Jumps carry an offset relative to the instruction
//! following the jump.

use std::fmt;

use snapeval_parser::types::{JType, Primitive};

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // ---- literals ----
    PushInt(i32),
    PushLong(i64),
    PushFloat(f32),
    PushDouble(f64),
    PushChar(u16),
    PushBoolean(bool),
    /// Mirrors the string into the target process
    PushString(String),
    PushNull,
    PushThis,
    /// The `java.lang.Class` object for a type
    PushClass(JType),

    // ---- variables ----
    /// A snippet local or a frame local, as a variable
    PushLocal(String),
    /// Declare a snippet local. With `has_init` the initial value is popped,
    /// otherwise the type's default value is used.
    LocalVariableCreation { name: String, ty: JType, has_init: bool },
    /// Pop a receiver, push its field as a variable
    PushField { owner: String, name: String },
    PushStaticField { owner: String, name: String },
    /// Pop index and array, push the element as a variable
    ArrayAccess,
    ArrayLength,
    /// Pop value and variable, store, push the value
    Assign,
    /// Increment/decrement a variable of type `ty` (a primitive or its
    /// wrapper), pushing the new value
    PreIncrement(JType),
    PreDecrement(JType),
    /// As above, pushing the old value
    PostIncrement(JType),
    PostDecrement(JType),

    // ---- stack ----
    Dup,
    Pop,

    // ---- unary operators ----
    Negate(Primitive),
    BitNot(Primitive),
    Not,

    // ---- binary operators, typed by the promoted operand type ----
    Add(Primitive),
    Subtract(Primitive),
    Multiply(Primitive),
    Divide(Primitive),
    Remainder(Primitive),
    ShiftLeft(Primitive),
    ShiftRight(Primitive),
    UnsignedShiftRight(Primitive),
    Less(Primitive),
    LessEqual(Primitive),
    Greater(Primitive),
    GreaterEqual(Primitive),
    /// `None` compares references by identity
    Equal(Option<Primitive>),
    NotEqual(Option<Primitive>),
    BitAnd(Primitive),
    BitOr(Primitive),
    BitXor(Primitive),
    /// String concatenation of the two topmost values
    Concat,

    // ---- conversions ----
    /// Primitive conversion
    Cast(Primitive),
    /// Checked reference cast
    CheckCast(JType),
    InstanceOf(JType),
    Box(Primitive),
    Unbox(Primitive),

    // ---- control flow ----
    Jump(isize),
    /// Pops a boolean (unboxing a `java.lang.Boolean`)
    JumpIfFalse(isize),
    JumpIfTrue(isize),

    // ---- invocation ----
    /// Pops `arg_count` arguments then the receiver. `nonvirtual` skips
    /// dynamic dispatch (`super.m()`).
    SendMessage {
        owner: String,
        name: String,
        signature: String,
        arg_count: usize,
        nonvirtual: bool,
    },
    SendStaticMessage {
        owner: String,
        name: String,
        signature: String,
        arg_count: usize,
    },
    New {
        class: String,
        signature: String,
        arg_count: usize,
    },

    // ---- arrays ----
    /// Pops `dims` sizes; `ty` is the full array type
    NewArray { ty: JType, dims: usize },
    /// Pops `length` elements; `ty` is the array type
    ArrayInitializer { ty: JType, length: usize },

    // ---- termination ----
    Throw,
    Return { with_value: bool },
}

impl Instruction {
    /// Number of instruction slots this instruction occupies.
    pub fn size(&self) -> usize {
        1
    }

    /// Whether a message send returns nothing.
    pub fn returns_void(signature: &str) -> bool {
        signature.ends_with(")V")
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_) | Instruction::JumpIfFalse(_) | Instruction::JumpIfTrue(_)
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            PushInt(v) => write!(f, "push int {}", v),
            PushLong(v) => write!(f, "push long {}", v),
            PushFloat(v) => write!(f, "push float {}", v),
            PushDouble(v) => write!(f, "push double {}", v),
            PushChar(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "push char {:?}", c),
                None => write!(f, "push char \\u{:04x}", v),
            },
            PushBoolean(v) => write!(f, "push boolean {}", v),
            PushString(s) => write!(f, "push string {:?}", s),
            PushNull => write!(f, "push null"),
            PushThis => write!(f, "push this"),
            PushClass(ty) => write!(f, "push class {}", ty),
            PushLocal(name) => write!(f, "push local {}", name),
            LocalVariableCreation { name, ty, has_init } => {
                write!(f, "local variable creation {} {}", ty, name)?;
                if *has_init {
                    write!(f, " (initialized)")?;
                }
                Ok(())
            }
            PushField { owner, name } => write!(f, "push field {}.{}", owner, name),
            PushStaticField { owner, name } => write!(f, "push static field {}.{}", owner, name),
            ArrayAccess => write!(f, "array access"),
            ArrayLength => write!(f, "array length"),
            Assign => write!(f, "assign"),
            PreIncrement(ty) => write!(f, "pre-increment {}", ty),
            PreDecrement(ty) => write!(f, "pre-decrement {}", ty),
            PostIncrement(ty) => write!(f, "post-increment {}", ty),
            PostDecrement(ty) => write!(f, "post-decrement {}", ty),
            Dup => write!(f, "dup"),
            Pop => write!(f, "pop"),
            Negate(p) => write!(f, "negate {}", p.name()),
            BitNot(p) => write!(f, "bit not {}", p.name()),
            Not => write!(f, "not"),
            Add(p) => write!(f, "add {}", p.name()),
            Subtract(p) => write!(f, "subtract {}", p.name()),
            Multiply(p) => write!(f, "multiply {}", p.name()),
            Divide(p) => write!(f, "divide {}", p.name()),
            Remainder(p) => write!(f, "remainder {}", p.name()),
            ShiftLeft(p) => write!(f, "shift left {}", p.name()),
            ShiftRight(p) => write!(f, "shift right {}", p.name()),
            UnsignedShiftRight(p) => write!(f, "unsigned shift right {}", p.name()),
            Less(p) => write!(f, "less {}", p.name()),
            LessEqual(p) => write!(f, "less equal {}", p.name()),
            Greater(p) => write!(f, "greater {}", p.name()),
            GreaterEqual(p) => write!(f, "greater equal {}", p.name()),
            Equal(Some(p)) => write!(f, "equal {}", p.name()),
            Equal(None) => write!(f, "equal reference"),
            NotEqual(Some(p)) => write!(f, "not equal {}", p.name()),
            NotEqual(None) => write!(f, "not equal reference"),
            BitAnd(p) => write!(f, "and {}", p.name()),
            BitOr(p) => write!(f, "or {}", p.name()),
            BitXor(p) => write!(f, "xor {}", p.name()),
            Concat => write!(f, "concat"),
            Cast(p) => write!(f, "cast {}", p.name()),
            CheckCast(ty) => write!(f, "check cast {}", ty),
            InstanceOf(ty) => write!(f, "instanceof {}", ty),
            Box(p) => write!(f, "box {}", p.name()),
            Unbox(p) => write!(f, "unbox {}", p.name()),
            Jump(offset) => write!(f, "jump {:+}", offset),
            JumpIfFalse(offset) => write!(f, "jump if false {:+}", offset),
            JumpIfTrue(offset) => write!(f, "jump if true {:+}", offset),
            SendMessage {
                owner,
                name,
                signature,
                arg_count,
                nonvirtual,
            } => {
                write!(f, "send message {}.{}{} ({} args)", owner, name, signature, arg_count)?;
                if *nonvirtual {
                    write!(f, " nonvirtual")?;
                }
                Ok(())
            }
            SendStaticMessage {
                owner,
                name,
                signature,
                arg_count,
            } => write!(f, "send static message {}.{}{} ({} args)", owner, name, signature, arg_count),
            New {
                class,
                signature,
                arg_count,
            } => write!(f, "new {}{} ({} args)", class, signature, arg_count),
            NewArray { ty, dims } => write!(f, "new array {} ({} dims)", ty, dims),
            ArrayInitializer { ty, length } => write!(f, "array initializer {} ({} elements)", ty, length),
            Throw => write!(f, "throw"),
            Return { with_value: true } => write!(f, "return value"),
            Return { with_value: false } => write!(f, "return"),
        }
    }
}

/// Render an instruction sequence, one numbered instruction per line.
pub fn listing(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for (pc, instruction) in instructions.iter().enumerate() {
        out.push_str(&format!("{:>4}  {}\n", pc, instruction));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Instruction::PushInt(5).to_string(), "push int 5");
        assert_eq!(Instruction::Jump(-3).to_string(), "jump -3");
        assert_eq!(Instruction::JumpIfFalse(2).to_string(), "jump if false +2");
        assert_eq!(Instruction::Equal(None).to_string(), "equal reference");
        assert_eq!(
            Instruction::SendMessage {
                owner: "java.lang.Object".into(),
                name: "toString".into(),
                signature: "()Ljava/lang/String;".into(),
                arg_count: 0,
                nonvirtual: true,
            }
            .to_string(),
            "send message java.lang.Object.toString()Ljava/lang/String; (0 args) nonvirtual"
        );
    }

    #[test]
    fn test_listing_numbers_instructions() {
        let text = listing(&[Instruction::PushInt(1), Instruction::Return { with_value: true }]);
        assert_eq!(text, "   0  push int 1\n   1  return value\n");
    }

    #[test]
    fn test_returns_void() {
        assert!(Instruction::returns_void("(I)V"));
        assert!(!Instruction::returns_void("()I"));
    }
}
