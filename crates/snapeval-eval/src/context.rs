//! Runtime contexts: what one evaluation runs against.

use std::fmt;
use std::sync::Arc;

use snapeval_compiler::FrameDescription;

use crate::error::{Fault, Result};
use crate::target::{ObjectId, Target, ThreadId};
use crate::value::{LocalVariable, RemoteType, Value};

/// One paused frame, or one receiver object when no frame is available.
///
/// The frame shape is captured when the context is built. The context stays
/// valid only while its thread stays suspended; once the thread is resumed
/// by anything other than an evaluation's own invocations, every access
/// fails with [`Fault::ContextInvalidated`].
#[derive(Clone)]
pub struct RuntimeContext {
    target: Arc<dyn Target>,
    thread: ThreadId,
    depth: Option<usize>,
    receiver: Option<ObjectId>,
    receiving_type: RemoteType,
    declaring_type: String,
    is_static: bool,
    locals: Vec<LocalVariable>,
    epoch: u64,
}

impl RuntimeContext {
    /// A context for frame `depth` (0 is innermost) of a suspended thread.
    pub fn for_frame(target: Arc<dyn Target>, thread: ThreadId, depth: usize) -> Result<Self> {
        let epoch = target.suspend_epoch(thread)?;
        let frame = target.frame(thread, depth)?;
        let declaring_type = target.type_name(frame.declaring_type)?;
        let receiving_type = match frame.this {
            Some(this) => RemoteType::fetch(target.as_ref(), target.object_type(this)?)?,
            None => RemoteType::fetch(target.as_ref(), frame.declaring_type)?,
        };
        let locals = frame
            .locals
            .into_iter()
            .map(|slot| -> Result<LocalVariable> {
                let value = target.local_value(thread, depth, &slot.name)?;
                Ok(LocalVariable {
                    name: slot.name,
                    type_name: slot.type_name,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            target,
            thread,
            depth: Some(depth),
            receiver: frame.this,
            receiving_type,
            declaring_type,
            is_static: frame.is_static,
            locals,
            epoch,
        })
    }

    /// A context with `object` as receiver and no locals. `thread` is the
    /// suspended thread used for invocations.
    pub fn for_object(target: Arc<dyn Target>, thread: ThreadId, object: ObjectId) -> Result<Self> {
        let epoch = target.suspend_epoch(thread)?;
        let receiving_type = RemoteType::fetch(target.as_ref(), target.object_type(object)?)?;
        Ok(Self {
            target,
            thread,
            depth: None,
            declaring_type: receiving_type.name.clone(),
            receiver: Some(object),
            receiving_type,
            is_static: false,
            locals: Vec::new(),
            epoch,
        })
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Frame depth, or `None` for an object-relative context.
    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// The receiver's runtime type, or the frame's declaring type in a
    /// static context.
    pub fn receiving_type(&self) -> &RemoteType {
        &self.receiving_type
    }

    /// Fail unless the thread is still in the suspension this context was
    /// built in.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.target.suspend_epoch(self.thread)? != self.epoch {
            return Err(Fault::ContextInvalidated);
        }
        Ok(())
    }

    /// The receiver, `None` in a static context.
    pub fn receiver(&self) -> Result<Option<ObjectId>> {
        self.ensure_valid()?;
        Ok(self.receiver)
    }

    /// The frame's declared locals as captured with the context. Reads and
    /// writes made during evaluation go through [`local_value`] instead.
    ///
    /// [`local_value`]: RuntimeContext::local_value
    pub fn locals(&self) -> Result<&[LocalVariable]> {
        self.ensure_valid()?;
        Ok(&self.locals)
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.iter().any(|l| l.name == name)
    }

    pub fn local_value(&self, name: &str) -> Result<Value> {
        let depth = self.frame_depth(name)?;
        self.ensure_valid()?;
        Ok(self.target.local_value(self.thread, depth, name)?)
    }

    pub fn set_local_value(&self, name: &str, value: Value) -> Result<()> {
        let depth = self.frame_depth(name)?;
        self.ensure_valid()?;
        Ok(self.target.set_local_value(self.thread, depth, name, value)?)
    }

    fn frame_depth(&self, name: &str) -> Result<usize> {
        match self.depth {
            Some(depth) if self.has_local(name) => Ok(depth),
            _ => Err(Fault::internal(format!("no local variable {} in context", name))),
        }
    }

    /// Binary name of the type declaring the frame's method.
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// The compiler's view of this context.
    pub fn frame_description(&self) -> FrameDescription {
        if self.depth.is_none() {
            return FrameDescription::for_object(&self.receiving_type.name);
        }
        self.locals.iter().fold(
            FrameDescription::new(self.declaring_type.clone()).with_static(self.is_static),
            |frame, local| frame.with_local(&local.name, &local.type_name),
        )
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("thread", &self.thread)
            .field("depth", &self.depth)
            .field("receiver", &self.receiver)
            .field("receiving_type", &self.receiving_type.name)
            .field("locals", &self.locals)
            .finish()
    }
}
