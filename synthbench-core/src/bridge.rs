//! Foreign Execution Bridge
//!
//! Converts bound native values into the C calling convention of a loaded
//! symbol, calls it through libffi, and reads back the return value and any
//! output buffers.
//!
//! Only ever used inside a worker process: the code being called is
//! untrusted and may crash.

use std::ffi::{CStr, CString, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use synthbench_model::{
    Bindings, CType, FunctionSignature, ModelError, Parameter, Primitive, Scalar, Value,
};
use thiserror::Error;

use crate::Invocation;

/// Errors from loading or calling foreign code
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `dlopen` failed
    #[error("Cannot open {library}: {message}")]
    Load {
        /// Library path
        library: PathBuf,
        /// `dlerror` text
        message: String,
    },

    /// `dlsym` failed
    #[error("Symbol `{symbol}` not found in {library}")]
    Symbol {
        /// Library path
        library: PathBuf,
        /// Requested symbol
        symbol: String,
    },

    /// A parameter had no bound value
    #[error("Missing input for parameter `{0}`")]
    MissingInput(String),

    /// A bound value does not fit its parameter
    #[error("Value for `{name}` does not conform to {ctype}")]
    Marshal {
        /// Parameter name
        name: String,
        /// Declared type
        ctype: CType,
    },

    /// The signature cannot be called or a size could not be resolved
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A `dlopen`ed shared library, closed on drop
#[derive(Debug)]
pub struct Library {
    handle: NonNull<c_void>,
    path: PathBuf,
}

impl Library {
    /// Load a shared library with immediate binding
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| BridgeError::Load {
            library: path.to_path_buf(),
            message: "path contains a NUL byte".to_string(),
        })?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        match NonNull::new(handle) {
            Some(handle) => Ok(Self {
                handle,
                path: path.to_path_buf(),
            }),
            None => Err(BridgeError::Load {
                library: path.to_path_buf(),
                message: last_dl_error(),
            }),
        }
    }

    /// Path this library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a symbol's address
    pub fn symbol(&self, name: &str) -> Result<NonNull<c_void>, BridgeError> {
        let missing = || BridgeError::Symbol {
            library: self.path.clone(),
            symbol: name.to_string(),
        };
        let c_name = CString::new(name).map_err(|_| missing())?;
        let address = unsafe { libc::dlsym(self.handle.as_ptr(), c_name.as_ptr()) };
        NonNull::new(address).ok_or_else(missing)
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dlopen error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

fn ffi_type(ctype: &CType) -> Type {
    if ctype.is_pointer() {
        return Type::pointer();
    }
    match ctype.primitive {
        Primitive::Int => Type::i32(),
        Primitive::Float => Type::f32(),
        Primitive::Double => Type::f64(),
        Primitive::Char => Type::i8(),
        Primitive::Bool => Type::u8(),
        Primitive::Void => Type::void(),
    }
}

/// Typed storage behind a pointer argument
#[derive(Debug)]
enum Buffer {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Bytes(Vec<u8>),
}

impl Buffer {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            Buffer::Int(v) => v.as_mut_ptr().cast(),
            Buffer::Float(v) => v.as_mut_ptr().cast(),
            Buffer::Double(v) => v.as_mut_ptr().cast(),
            Buffer::Bytes(v) => v.as_mut_ptr().cast(),
        }
    }
}

/// One packed argument
#[derive(Debug)]
enum Slot {
    Int(i32),
    Float(f32),
    Double(f64),
    Byte(u8),
    Pointer { buffer: Buffer, ptr: *mut c_void },
}

impl Slot {
    fn pointer(mut buffer: Buffer) -> Self {
        let ptr = buffer.as_mut_ptr();
        Slot::Pointer { buffer, ptr }
    }

    fn arg(&self) -> Arg {
        match self {
            Slot::Int(v) => Arg::new(v),
            Slot::Float(v) => Arg::new(v),
            Slot::Double(v) => Arg::new(v),
            Slot::Byte(v) => Arg::new(v),
            Slot::Pointer { ptr, .. } => Arg::new(ptr),
        }
    }
}

/// Arguments in declared parameter order, ready for a call
#[derive(Debug)]
pub struct PackedArgs {
    slots: Vec<Slot>,
}

/// Convert bound inputs into foreign arguments.
///
/// Non-char arrays get a buffer of exactly the resolved size. Output strings
/// get `size + 1` bytes for the terminator; input strings are passed as a
/// NUL-terminated copy.
pub fn pack(signature: &FunctionSignature, inputs: &Bindings) -> Result<PackedArgs, BridgeError> {
    let slots = signature
        .parameters
        .iter()
        .map(|param| pack_parameter(param, inputs))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PackedArgs { slots })
}

fn pack_parameter(param: &Parameter, inputs: &Bindings) -> Result<Slot, BridgeError> {
    let value = inputs
        .get(&param.name)
        .ok_or_else(|| BridgeError::MissingInput(param.name.clone()))?;
    let mismatch = || BridgeError::Marshal {
        name: param.name.clone(),
        ctype: param.ctype,
    };
    if !value.conforms_to(&param.ctype) {
        return Err(mismatch());
    }

    match value {
        Value::Scalar(Scalar::Int(v)) => Ok(Slot::Int(*v)),
        Value::Scalar(Scalar::Float(v)) => Ok(Slot::Float(*v)),
        Value::Scalar(Scalar::Double(v)) => Ok(Slot::Double(*v)),
        Value::Scalar(Scalar::Char(v)) => Ok(Slot::Byte(*v)),
        Value::Scalar(Scalar::Bool(v)) => Ok(Slot::Byte(u8::from(*v))),
        Value::Str(text) => {
            let mut bytes = Value::string_bytes(text);
            if param.is_output {
                let size = resolve_size(param, inputs, bytes.len())?;
                bytes.resize(size.max(bytes.len()), 0);
                bytes.truncate(size);
            }
            bytes.push(0);
            Ok(Slot::pointer(Buffer::Bytes(bytes)))
        }
        Value::Array(items) => {
            let size = resolve_size(param, inputs, items.len())?;
            let buffer = match param.ctype.primitive {
                Primitive::Int => Buffer::Int(fill(items, size, |s| match s {
                    Scalar::Int(v) => *v,
                    _ => 0,
                })),
                Primitive::Float => Buffer::Float(fill(items, size, |s| match s {
                    Scalar::Float(v) => *v,
                    _ => 0.0,
                })),
                Primitive::Double => Buffer::Double(fill(items, size, |s| match s {
                    Scalar::Double(v) => *v,
                    _ => 0.0,
                })),
                Primitive::Bool => Buffer::Bytes(fill(items, size, |s| match s {
                    Scalar::Bool(v) => u8::from(*v),
                    _ => 0,
                })),
                Primitive::Char | Primitive::Void => return Err(mismatch()),
            };
            Ok(Slot::pointer(buffer))
        }
        Value::Void => Err(mismatch()),
    }
}

fn resolve_size(
    param: &Parameter,
    inputs: &Bindings,
    native_len: usize,
) -> Result<usize, BridgeError> {
    match &param.size {
        Some(spec) => Ok(spec.evaluate(&param.name, inputs, false, Some(native_len))?),
        None => Ok(native_len),
    }
}

fn fill<T: Default + Clone>(
    items: &[Scalar],
    size: usize,
    convert: impl Fn(&Scalar) -> T,
) -> Vec<T> {
    let mut buffer: Vec<T> = items.iter().take(size).map(convert).collect();
    buffer.resize(size, T::default());
    buffer
}

/// Read an output parameter back from its buffer
fn unpack(slot: &Slot, param: &Parameter) -> Value {
    match slot {
        Slot::Pointer { buffer, .. } => match buffer {
            Buffer::Int(v) => Value::Array(v.iter().copied().map(Scalar::Int).collect()),
            Buffer::Float(v) => Value::Array(v.iter().copied().map(Scalar::Float).collect()),
            Buffer::Double(v) => Value::Array(v.iter().copied().map(Scalar::Double).collect()),
            Buffer::Bytes(v) if param.is_string() => {
                let end = v.iter().position(|b| *b == 0).unwrap_or(v.len());
                Value::string_from_bytes(&v[..end])
            }
            Buffer::Bytes(v) => Value::Array(v.iter().map(|b| Scalar::Bool(*b != 0)).collect()),
        },
        Slot::Int(v) => Value::Scalar(Scalar::Int(*v)),
        Slot::Float(v) => Value::Scalar(Scalar::Float(*v)),
        Slot::Double(v) => Value::Scalar(Scalar::Double(*v)),
        Slot::Byte(v) if param.ctype.primitive == Primitive::Bool => {
            Value::Scalar(Scalar::Bool(*v != 0))
        }
        Slot::Byte(v) => Value::Scalar(Scalar::Char(*v)),
    }
}

/// Decode the raw return slot according to the declared return type
fn decode_return(raw: u64, ctype: &CType) -> Value {
    match ctype.primitive {
        Primitive::Void => Value::Void,
        Primitive::Int => Value::Scalar(Scalar::Int(raw as u32 as i32)),
        Primitive::Float => Value::Scalar(Scalar::Float(f32::from_bits(raw as u32))),
        Primitive::Double => Value::Scalar(Scalar::Double(f64::from_bits(raw))),
        Primitive::Char => Value::Scalar(Scalar::Char(raw as u8)),
        Primitive::Bool => Value::Scalar(Scalar::Bool(raw as u8 != 0)),
    }
}

/// A callable symbol with a prepared call interface
pub struct ForeignFunction<'lib> {
    _library: &'lib Library,
    signature: FunctionSignature,
    code: CodePtr,
    cif: Cif,
}

impl<'lib> ForeignFunction<'lib> {
    /// Resolve `signature.name` in `library` and prepare its call interface.
    ///
    /// Pointer return types are rejected here, before any call.
    pub fn new(library: &'lib Library, signature: &FunctionSignature) -> Result<Self, BridgeError> {
        signature.validate()?;
        let address = library.symbol(&signature.name)?;
        let cif = Cif::new(
            signature.parameters.iter().map(|p| ffi_type(&p.ctype)),
            ffi_type(&signature.return_type),
        );
        Ok(Self {
            _library: library,
            signature: signature.clone(),
            code: CodePtr::from_ptr(address.as_ptr().cast_const()),
            cif,
        })
    }

    /// Call the function once with `inputs`
    pub fn invoke(&self, inputs: &Bindings) -> Result<Invocation, BridgeError> {
        let packed = pack(&self.signature, inputs)?;
        let args: Vec<Arg> = packed.slots.iter().map(Slot::arg).collect();

        // Zeroed and as wide as ffi_arg: narrower returns land in the low bytes.
        let mut raw: u64 = 0;
        unsafe {
            libffi::raw::ffi_call(
                self.cif.as_raw_ptr(),
                Some(*self.code.as_fun()),
                (&mut raw as *mut u64).cast(),
                args.as_ptr() as *mut *mut c_void,
            );
        }

        let mut outputs = Bindings::new();
        for (slot, param) in packed.slots.iter().zip(&self.signature.parameters) {
            if param.is_output {
                outputs.insert(param.name.clone(), unpack(slot, param));
            }
        }

        Ok(Invocation {
            return_value: decode_return(raw, &self.signature.return_type),
            outputs,
        })
    }
}
