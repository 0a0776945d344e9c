//! Describing data
//!
//! Messages are homogeneous sequences of elements. The element type travels with every message
//! as a `Datatype` tag, which determines the wire size of an element and lets a receiver detect
//! that it posted a buffer of the wrong type. A direct relationship between a Rust type and a
//! `Datatype` is covered by the `Equivalence` trait, which is implemented for the primitive
//! numeric types (and, with the `complex` feature, for `num_complex::Complex`).
//!
//! Buffers are plain slices: `&[T]` to send, `&mut [T]` to receive, where `T: Equivalence`.

use std::fmt;
use std::mem;

/// Datatype traits
pub mod traits {
    pub use super::{Equivalence, SubstrateEquivalence};
}

/// The element type tag of a message.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Datatype {
    name: &'static str,
    size: usize,
}

impl Datatype {
    /// A datatype called `name` whose elements occupy `size` bytes on the wire.
    pub const fn new(name: &'static str, size: usize) -> Datatype {
        Datatype { name, size }
    }

    /// The name of the element type
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of `count` elements in bytes
    pub fn extent(&self, count: usize) -> usize {
        self.size * count
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.size)
    }
}

/// Additional requirements the active substrate places on element types.
///
/// The in-process substrate moves elements between threads and needs nothing beyond
/// `Equivalence` itself. With the `mpi` feature, elements must also be describable to the MPI
/// library.
#[cfg(not(feature = "mpi"))]
pub trait SubstrateEquivalence {}

#[cfg(not(feature = "mpi"))]
impl<T: ?Sized> SubstrateEquivalence for T {}

/// Additional requirements the active substrate places on element types.
///
/// With the `mpi` feature, elements must also be describable to the MPI library.
#[cfg(feature = "mpi")]
pub trait SubstrateEquivalence: mpi::datatype::Equivalence {}

#[cfg(feature = "mpi")]
impl<T: ?Sized + mpi::datatype::Equivalence> SubstrateEquivalence for T {}

/// A type that can be the element of a message.
pub trait Equivalence: Copy + Send + Sync + 'static + SubstrateEquivalence {
    /// The datatype tag equivalent to this Rust type
    fn equivalent_datatype() -> Datatype;
}

macro_rules! equivalent_system_datatype {
    ($($rstype:ty => $name:expr),* $(,)?) => {
        $(
        impl Equivalence for $rstype {
            fn equivalent_datatype() -> Datatype {
                Datatype::new($name, mem::size_of::<$rstype>())
            }
        }
        )*
    }
}

equivalent_system_datatype! {
    bool => "bool",
    f32 => "f32",
    f64 => "f64",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    isize => "isize",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
}

#[cfg(feature = "complex")]
equivalent_system_datatype! {
    num_complex::Complex<f32> => "complex_f32",
    num_complex::Complex<f64> => "complex_f64",
}
