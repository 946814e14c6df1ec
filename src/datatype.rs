//! Compile-time mapping from Rust element types to wire element kinds.
//!
//! Each supported type carries its [`ElementKind`] as an associated constant,
//! so the lookup costs nothing at runtime. Transports translate the kind into
//! their own datatype handle (e.g. `MPI_INT`).

use bytemuck::Pod;

/// Closed set of element kinds understood by the transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// No element (`MPI_DATATYPE_NULL`); zero-sized.
    Null,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    Unsigned,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
}

impl ElementKind {
    /// Size in bytes of one element of this kind.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            ElementKind::Null => 0,
            ElementKind::SignedChar | ElementKind::UnsignedChar => 1,
            ElementKind::Short | ElementKind::UnsignedShort => 2,
            ElementKind::Int | ElementKind::Unsigned | ElementKind::Float => 4,
            ElementKind::LongLong | ElementKind::UnsignedLongLong | ElementKind::Double => 8,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust type with a fixed wire representation.
///
/// Sealed: the set of element kinds is closed.
pub trait MpiDatatype: Pod + sealed::Sealed {
    /// Wire kind of `Self`.
    const KIND: ElementKind;
}

macro_rules! native_datatype {
    ($($rstype:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $rstype {}
            impl MpiDatatype for $rstype {
                const KIND: ElementKind = ElementKind::$kind;
            }
        )*
    };
}

native_datatype! {
    () => Null,
    i8 => SignedChar,
    u8 => UnsignedChar,
    i16 => Short,
    u16 => UnsignedShort,
    i32 => Int,
    u32 => Unsigned,
    i64 => LongLong,
    u64 => UnsignedLongLong,
    f32 => Float,
    f64 => Double,
}

/// Element kind of `T`; usable in const contexts.
#[inline]
pub const fn kind_of<T: MpiDatatype>() -> ElementKind {
    T::KIND
}
