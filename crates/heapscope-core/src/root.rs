//! GC root pointers.

use std::fmt;

/// Why an object is reachable from outside the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// Root of unknown origin.
    Unknown,
    /// Global JNI reference.
    JniGlobal,
    /// Local JNI reference held by a native frame.
    JniLocal,
    /// Local variable or operand in a Java frame.
    JavaFrame,
    /// Reference from a native stack.
    NativeStack,
    /// Class held by the system class loader.
    StickyClass,
    /// Reference from a thread block.
    ThreadBlock,
    /// Object used as a monitor.
    MonitorUsed,
    /// A live thread object.
    ThreadObject,
    /// Static field of a loaded class.
    StaticField,
    /// Internal VM root (code cache, interned strings, ...).
    Vm,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::JniGlobal => "JNI global",
            Self::JniLocal => "JNI local",
            Self::JavaFrame => "Java frame",
            Self::NativeStack => "native stack",
            Self::StickyClass => "sticky class",
            Self::ThreadBlock => "thread block",
            Self::MonitorUsed => "monitor used",
            Self::ThreadObject => "thread object",
            Self::StaticField => "static field",
            Self::Vm => "VM internal",
        };
        f.write_str(name)
    }
}

/// One root pointer into the heap.
///
/// `T` is the target's key: an [`Address`](crate::id::Address) in a
/// trace-built heap, a [`DenseIndex`](crate::id::DenseIndex) once resolved.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RootPtr<T> {
    /// Root kind.
    pub kind: RootKind,
    /// Object the root points to.
    pub target: T,
    /// Serial number of the owning thread, where the kind has one.
    pub thread: Option<u32>,
    /// Stack frame depth, for frame-local roots.
    pub frame: Option<u32>,
}

impl<T> RootPtr<T> {
    /// A root with no thread or frame context.
    pub fn new(kind: RootKind, target: T) -> Self {
        Self {
            kind,
            target,
            thread: None,
            frame: None,
        }
    }

    /// Re-key the root onto a different target representation.
    pub fn map_target<U>(self, f: impl FnOnce(T) -> U) -> RootPtr<U> {
        RootPtr {
            kind: self.kind,
            target: f(self.target),
            thread: self.thread,
            frame: self.frame,
        }
    }
}
