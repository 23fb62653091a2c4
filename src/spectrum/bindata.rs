//! Encoding of numeric arrays into the base64 text carried by mzML
//! `<binary>` elements.
use std::io::{self, prelude::*};

use bytemuck::Pod;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::params::{ControlledVocabulary, ParamCow};

pub type Bytes = Vec<u8>;

/// The numeric precision of an encoded array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryDataArrayType {
    Float64,
    Float32,
    Int32,
}

impl BinaryDataArrayType {
    pub const fn as_param(&self) -> ParamCow<'static> {
        match self {
            Self::Float64 => ControlledVocabulary::MS.const_param_ident("64-bit float", 1000523),
            Self::Float32 => ControlledVocabulary::MS.const_param_ident("32-bit float", 1000521),
            Self::Int32 => ControlledVocabulary::MS.const_param_ident("32-bit integer", 1000519),
        }
    }
}

/// The compression applied to the raw bytes before base64 encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinaryCompressionType {
    NoCompression,
    #[default]
    Zlib,
}

impl BinaryCompressionType {
    pub const fn as_param(&self) -> ParamCow<'static> {
        match self {
            Self::NoCompression => ControlledVocabulary::MS.const_param_ident("no compression", 1000576),
            Self::Zlib => ControlledVocabulary::MS.const_param_ident("zlib compression", 1000574),
        }
    }
}

/// Values that can be written into a binary data array of a given precision
pub trait ArrayValue: Copy {
    fn to_f64(self) -> f64;
    fn to_i64(self) -> i64;
}

impl ArrayValue for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn to_i64(self) -> i64 {
        self as i64
    }
}

impl ArrayValue for i32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn to_i64(self) -> i64 {
        self as i64
    }
}

fn to_le_bytes<T: Pod>(values: &[T]) -> Bytes {
    #[cfg(target_endian = "little")]
    return bytemuck::cast_slice::<T, u8>(values).to_vec();
    #[cfg(target_endian = "big")]
    {
        let width = std::mem::size_of::<T>();
        let mut buffer = bytemuck::cast_slice::<T, u8>(values).to_vec();
        buffer.chunks_exact_mut(width).for_each(|c| c.reverse());
        buffer
    }
}

/// Lay `values` out as little-endian bytes of the requested precision
pub fn to_bytes<T: ArrayValue>(values: &[T], dtype: BinaryDataArrayType) -> Bytes {
    match dtype {
        BinaryDataArrayType::Float64 => {
            let buffer: Vec<f64> = values.iter().map(|v| v.to_f64()).collect();
            to_le_bytes(&buffer)
        }
        BinaryDataArrayType::Float32 => {
            let buffer: Vec<f32> = values.iter().map(|v| v.to_f64() as f32).collect();
            to_le_bytes(&buffer)
        }
        BinaryDataArrayType::Int32 => {
            let buffer: Vec<i32> = values.iter().map(|v| v.to_i64() as i32).collect();
            to_le_bytes(&buffer)
        }
    }
}

pub fn compress_zlib(bytestring: &[u8]) -> io::Result<Bytes> {
    let result = Bytes::new();
    let mut compressor = ZlibEncoder::new(result, Compression::best());
    compressor.write_all(bytestring)?;
    compressor.finish()
}

/// Encode `values` with the given precision and compression, returning the
/// base64 text that goes inside a `<binary>` element.
pub fn encode_array<T: ArrayValue>(
    values: &[T],
    dtype: BinaryDataArrayType,
    compression: BinaryCompressionType,
) -> io::Result<String> {
    let bytestring = to_bytes(values, dtype);
    let encoded = match compression {
        BinaryCompressionType::NoCompression => base64_simd::STANDARD.encode_type::<Bytes>(&bytestring),
        BinaryCompressionType::Zlib => {
            let compressed = compress_zlib(&bytestring)?;
            base64_simd::STANDARD.encode_type::<Bytes>(&compressed)
        }
    };
    Ok(String::from_utf8_lossy(&encoded).into_owned())
}
