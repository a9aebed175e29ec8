//! Element types and the dynamically typed arrays that carry them.
//!
//! The container stores arrays of any of the primitive numeric types. Everything that moves data
//! out of the engine does so through `Block`, an `ndarray::ArrayD` tagged with its element type,
//! so that callers can decide on a concrete type only at the point where they need one.
//!
use std::{fmt::Debug, result};

use ndarray::{ArrayD, Axis};
use num_traits::{NumCast, ToPrimitive, Zero};
use paste::paste;

use crate::errors::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dtype {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl Dtype {
    /// Size of a single element, in bytes
    ///
    pub fn size(&self) -> usize {
        match self {
            Dtype::I8 | Dtype::U8 => 1,
            Dtype::I16 | Dtype::U16 => 2,
            Dtype::I32 | Dtype::U32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::U64 | Dtype::F64 => 8,
        }
    }
}

/// A primitive type that can be read out of the container.
///
pub trait Element: Copy + Zero + NumCast + Debug + Send + Sync + 'static {
    const DTYPE: Dtype;

    /// Tag an array with its element type
    fn wrap(array: ArrayD<Self>) -> Block;

    /// Take the array back out of a block, if it holds this element type
    fn unwrap(block: Block) -> result::Result<ArrayD<Self>, Block>;

    /// Borrow a raw output buffer for the engine to fill
    fn buffer(elements: &mut [Self]) -> BufferMut<'_>;

    fn scalar(value: Self) -> Scalar;
}

/// A mutable, typed view of contiguous memory for the engine to read into.
///
pub enum BufferMut<'a> {
    I8(&'a mut [i8]),
    I16(&'a mut [i16]),
    I32(&'a mut [i32]),
    I64(&'a mut [i64]),
    U8(&'a mut [u8]),
    U16(&'a mut [u16]),
    U32(&'a mut [u32]),
    U64(&'a mut [u64]),
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

/// An in-memory array read from the container, of whatever element type the variable has.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// A single value of whatever element type.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! Element {
    ($type:ident) => {
        paste! {
            impl Element for $type {
                const DTYPE: Dtype = Dtype::[<$type:upper>];

                fn wrap(array: ArrayD<Self>) -> Block {
                    Block::[<$type:upper>](array)
                }

                fn unwrap(block: Block) -> result::Result<ArrayD<Self>, Block> {
                    match block {
                        Block::[<$type:upper>](array) => Ok(array),
                        block => Err(block),
                    }
                }

                fn buffer(elements: &mut [Self]) -> BufferMut<'_> {
                    BufferMut::[<$type:upper>](elements)
                }

                fn scalar(value: Self) -> Scalar {
                    Scalar::[<$type:upper>](value)
                }
            }
        }
    };
}

Element!(i8);
Element!(i16);
Element!(i32);
Element!(i64);
Element!(u8);
Element!(u16);
Element!(u32);
Element!(u64);
Element!(f32);
Element!(f64);

/// Evaluate `$body` with `$array` bound to the typed array inside `$block`.
macro_rules! with_array {
    ($block:expr, $array:ident => $body:expr) => {
        match $block {
            Block::I8($array) => $body,
            Block::I16($array) => $body,
            Block::I32($array) => $body,
            Block::I64($array) => $body,
            Block::U8($array) => $body,
            Block::U16($array) => $body,
            Block::U32($array) => $body,
            Block::U64($array) => $body,
            Block::F32($array) => $body,
            Block::F64($array) => $body,
        }
    };
}

/// Like `with_array`, but the result is an array of the same element type, rewrapped.
macro_rules! map_array {
    ($block:expr, $array:ident => $body:expr) => {
        match $block {
            Block::I8($array) => Block::I8($body),
            Block::I16($array) => Block::I16($body),
            Block::I32($array) => Block::I32($body),
            Block::I64($array) => Block::I64($body),
            Block::U8($array) => Block::U8($body),
            Block::U16($array) => Block::U16($body),
            Block::U32($array) => Block::U32($body),
            Block::U64($array) => Block::U64($body),
            Block::F32($array) => Block::F32($body),
            Block::F64($array) => Block::F64($body),
        }
    };
}

impl Block {
    /// Allocate a zeroed, column-major block
    ///
    /// Column-major is the layout the engine reads in, once axis order has been reversed.
    ///
    pub(crate) fn zeros_f(dtype: Dtype, shape: &[usize]) -> Self {
        use ndarray::{IxDyn, ShapeBuilder};

        let shape = IxDyn(shape).f();
        match dtype {
            Dtype::I8 => Block::I8(ArrayD::zeros(shape)),
            Dtype::I16 => Block::I16(ArrayD::zeros(shape)),
            Dtype::I32 => Block::I32(ArrayD::zeros(shape)),
            Dtype::I64 => Block::I64(ArrayD::zeros(shape)),
            Dtype::U8 => Block::U8(ArrayD::zeros(shape)),
            Dtype::U16 => Block::U16(ArrayD::zeros(shape)),
            Dtype::U32 => Block::U32(ArrayD::zeros(shape)),
            Dtype::U64 => Block::U64(ArrayD::zeros(shape)),
            Dtype::F32 => Block::F32(ArrayD::zeros(shape)),
            Dtype::F64 => Block::F64(ArrayD::zeros(shape)),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Block::I8(_) => Dtype::I8,
            Block::I16(_) => Dtype::I16,
            Block::I32(_) => Dtype::I32,
            Block::I64(_) => Dtype::I64,
            Block::U8(_) => Dtype::U8,
            Block::U16(_) => Dtype::U16,
            Block::U32(_) => Dtype::U32,
            Block::U64(_) => Dtype::U64,
            Block::F32(_) => Dtype::F32,
            Block::F64(_) => Dtype::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        with_array!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the typed array out of this block.
    ///
    /// Fails with `Error::Dtype` if the block holds some other element type.
    ///
    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>> {
        T::unwrap(self).map_err(|block| Error::Dtype {
            expected: T::DTYPE,
            found: block.dtype(),
        })
    }

    /// Select `index` along `axis`, dropping that axis.
    ///
    /// Panics if `axis` or `index` is out of bounds.
    ///
    pub fn index_axis_move(self, axis: usize, index: usize) -> Self {
        map_array!(self, array => array.index_axis_move(Axis(axis), index))
    }

    /// Cast every element to `f64`.
    ///
    pub fn to_f64(&self) -> ArrayD<f64> {
        with_array!(self, array => array.mapv(|value| value.to_f64().unwrap_or(f64::NAN)))
    }

    /// Element at a flat, logical (row-major) position.
    ///
    pub fn get_flat(&self, index: usize) -> Option<Scalar> {
        with_array!(self, array => array.iter().nth(index).map(|value| Element::scalar(*value)))
    }

    /// Borrow the block's memory, in memory order, for the engine to fill.
    ///
    pub(crate) fn buffer_mut(&mut self) -> Option<BufferMut<'_>> {
        with_array!(self, array => array.as_slice_memory_order_mut().map(Element::buffer))
    }
}

impl Scalar {
    pub fn dtype(&self) -> Dtype {
        match self {
            Scalar::I8(_) => Dtype::I8,
            Scalar::I16(_) => Dtype::I16,
            Scalar::I32(_) => Dtype::I32,
            Scalar::I64(_) => Dtype::I64,
            Scalar::U8(_) => Dtype::U8,
            Scalar::U16(_) => Dtype::U16,
            Scalar::U32(_) => Dtype::U32,
            Scalar::U64(_) => Dtype::U64,
            Scalar::F32(_) => Dtype::F32,
            Scalar::F64(_) => Dtype::F64,
        }
    }

    pub fn to_f64(&self) -> f64 {
        let value = match self {
            Scalar::I8(value) => value.to_f64(),
            Scalar::I16(value) => value.to_f64(),
            Scalar::I32(value) => value.to_f64(),
            Scalar::I64(value) => value.to_f64(),
            Scalar::U8(value) => value.to_f64(),
            Scalar::U16(value) => value.to_f64(),
            Scalar::U32(value) => value.to_f64(),
            Scalar::U64(value) => value.to_f64(),
            Scalar::F32(value) => value.to_f64(),
            Scalar::F64(value) => Some(*value),
        };

        value.unwrap_or(f64::NAN)
    }
}

macro_rules! Conversions {
    ($type:ident) => {
        paste! {
            impl From<ArrayD<$type>> for Block {
                fn from(array: ArrayD<$type>) -> Self {
                    Block::[<$type:upper>](array)
                }
            }

            impl From<$type> for Scalar {
                fn from(value: $type) -> Self {
                    Scalar::[<$type:upper>](value)
                }
            }
        }
    };
}

Conversions!(i8);
Conversions!(i16);
Conversions!(i32);
Conversions!(i64);
Conversions!(u8);
Conversions!(u16);
Conversions!(u32);
Conversions!(u64);
Conversions!(f32);
Conversions!(f64);
