//! C ABI for the flatentity table codec.
//!
//! Builders and readers are opaque heap handles created and destroyed through this
//! interface. Every entry point runs inside an [`ErrorBridge`] in abort mode, so no
//! panic or unexpected fault crosses into the caller: it terminates the process with
//! a message on stderr instead.
//!
//! Payload allocation failures are not fatal. `fe_fbb_prepare_string` and
//! `fe_fbb_prepare_bytes` return 0 for them, and collecting 0 leaves the property null.

use std::ffi::{CStr, c_char};
use std::slice;
use std::sync::LazyLock;

use flatentity::{
    BridgeConfig, DataOffset, ErrorBridge, FatalMode, Fault, FieldOffset, TableBuilder,
    TableReader,
};

static BRIDGE: LazyLock<ErrorBridge> = LazyLock::new(|| {
    ErrorBridge::without_engine(BridgeConfig::default().fatal_mode(FatalMode::Abort))
});

/// Opaque builder handle.
pub struct FeBuilder(TableBuilder);

/// Opaque reader handle.
///
/// Borrows the bytes passed to [`fe_fbr_get_root`]; they must outlive the handle.
pub struct FeReader(TableReader<'static>);

/// Borrowed bytes owned by someone else.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FeByteView {
    pub data: *const u8,
    pub size: usize,
}

impl FeByteView {
    const EMPTY: FeByteView = FeByteView {
        data: std::ptr::null(),
        size: 0,
    };

    fn new(bytes: &[u8]) -> Self {
        Self {
            data: bytes.as_ptr(),
            size: bytes.len(),
        }
    }
}

fn null_handle(kind: &str) -> Fault {
    Fault::Panic(format!("null {kind} handle"))
}

/// # Safety
///
/// `ptr` must be null or a live handle from [`fe_fbb_create`].
unsafe fn builder<'a>(ptr: *mut FeBuilder) -> Result<&'a mut TableBuilder, Fault> {
    unsafe { ptr.as_mut() }
        .map(|handle| &mut handle.0)
        .ok_or_else(|| null_handle("builder"))
}

/// # Safety
///
/// `ptr` must be null or a live handle from [`fe_fbr_get_root`].
unsafe fn reader<'a>(ptr: *const FeReader) -> Result<&'a TableReader<'static>, Fault> {
    unsafe { ptr.as_ref() }
        .map(|handle| &handle.0)
        .ok_or_else(|| null_handle("reader"))
}

/// # Safety
///
/// `data` must be null or point to `size` readable bytes that outlive `'a`.
unsafe fn bytes<'a>(data: *const u8, size: usize) -> &'a [u8] {
    if data.is_null() || size == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(data, size) }
    }
}

/// Creates a builder, reusing the calling thread's cached one if there is one.
#[unsafe(no_mangle)]
pub extern "C" fn fe_fbb_create() -> *mut FeBuilder {
    Box::into_raw(Box::new(FeBuilder(TableBuilder::dequeue())))
}

/// Destroys a builder. Null is ignored.
///
/// # Safety
///
/// `builder` must be null or a handle from [`fe_fbb_create`] that has not been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_free(builder: *mut FeBuilder) {
    if !builder.is_null() {
        let handle = unsafe { Box::from_raw(builder) };
        TableBuilder::recycle(handle.0);
    }
}

/// Finishes the table and returns the record.
///
/// The view stays valid until the builder is cleared, collected into or freed.
///
/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_finish(builder: *mut FeBuilder) -> FeByteView {
    BRIDGE.run_always_fatal(|| {
        let builder = unsafe { self::builder(builder) }?;
        Ok(FeByteView::new(builder.finish()?))
    })
}

/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_is_collecting(builder: *mut FeBuilder) -> bool {
    BRIDGE.run_always_fatal(|| Ok(unsafe { self::builder(builder) }?.is_collecting()))
}

/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_set_collecting(builder: *mut FeBuilder, collecting: bool) {
    BRIDGE.run_always_fatal(|| {
        unsafe { self::builder(builder) }?.set_collecting(collecting);
        Ok(())
    })
}

/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_did_start(builder: *mut FeBuilder) -> bool {
    BRIDGE.run_always_fatal(|| Ok(unsafe { self::builder(builder) }?.did_start()))
}

/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_ensure_started(builder: *mut FeBuilder) {
    BRIDGE.run_always_fatal(|| {
        unsafe { self::builder(builder) }?.ensure_started();
        Ok(())
    })
}

/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_clear(builder: *mut FeBuilder) {
    BRIDGE.run_always_fatal(|| {
        unsafe { self::builder(builder) }?.clear();
        Ok(())
    })
}

macro_rules! collect_fns {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            /// # Safety
            ///
            /// `builder` must be a live builder handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn $name(builder: *mut FeBuilder, value: $ty, field: FieldOffset) {
                BRIDGE.run_always_fatal(|| {
                    unsafe { self::builder(builder) }?.collect_scalar(value, field)?;
                    Ok(())
                })
            }
        )*
    };
}

collect_fns! {
    fe_fbb_collect_bool: bool,
    fe_fbb_collect_int8: i8,
    fe_fbb_collect_int16: i16,
    fe_fbb_collect_int32: i32,
    fe_fbb_collect_int64: i64,
    fe_fbb_collect_uint8: u8,
    fe_fbb_collect_uint16: u16,
    fe_fbb_collect_uint32: u32,
    fe_fbb_collect_uint64: u64,
    fe_fbb_collect_float: f32,
    fe_fbb_collect_double: f64,
}

/// Collects a handle returned by one of the prepare functions. 0 leaves the property null.
///
/// # Safety
///
/// `builder` must be a live builder handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_collect_data_offset(
    builder: *mut FeBuilder,
    offset: u32,
    field: FieldOffset,
) {
    BRIDGE.run_always_fatal(|| {
        unsafe { self::builder(builder) }?
            .collect_offset(DataOffset::from_raw(offset), field)?;
        Ok(())
    })
}

/// Writes a NUL-terminated string and returns its handle, or 0 if it could not be stored.
///
/// Invalid UTF-8 is replaced with U+FFFD. A null `text` returns 0.
///
/// # Safety
///
/// `builder` must be a live builder handle; `text` must be null or a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_prepare_string(builder: *mut FeBuilder, text: *const c_char) -> u32 {
    BRIDGE.run_always_fatal(|| {
        let builder = unsafe { self::builder(builder) }?;
        if text.is_null() {
            return Ok(0);
        }
        let text = unsafe { CStr::from_ptr(text) }.to_string_lossy();
        Ok(builder.prepare_string(&text)?.raw())
    })
}

/// Writes a byte vector and returns its handle, or 0 if it could not be stored.
///
/// # Safety
///
/// `builder` must be a live builder handle; `data` must be null or point to `size`
/// readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbb_prepare_bytes(
    builder: *mut FeBuilder,
    data: *const u8,
    size: usize,
) -> u32 {
    BRIDGE.run_always_fatal(|| {
        let builder = unsafe { self::builder(builder) }?;
        let data = unsafe { bytes(data, size) };
        Ok(builder.prepare_bytes(data)?.raw())
    })
}

/// Creates a reader for a finished record.
///
/// The reader does not copy `data`; the bytes must stay valid and unchanged until
/// [`fe_fbr_free`]. Malformed records read as having no fields.
///
/// # Safety
///
/// `data` must be null or point to `size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbr_get_root(data: *const u8, size: usize) -> *mut FeReader {
    let bytes: &'static [u8] = unsafe { bytes(data, size) };
    Box::into_raw(Box::new(FeReader(TableReader::get_root(bytes))))
}

/// Destroys a reader. Null is ignored.
///
/// # Safety
///
/// `reader` must be null or a handle from [`fe_fbr_get_root`] that has not been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbr_free(reader: *mut FeReader) {
    if !reader.is_null() {
        drop(unsafe { Box::from_raw(reader) });
    }
}

macro_rules! read_fns {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            /// Returns whether the property is present and, if so, writes it to `out`.
            ///
            /// # Safety
            ///
            /// `reader` must be a live reader handle; `out` must be null or writable.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn $name(reader: *const FeReader, field: FieldOffset, out: *mut $ty) -> bool {
                BRIDGE.run_always_fatal(|| {
                    let value = unsafe { self::reader(reader) }?.read_scalar::<$ty>(field);
                    Ok(match value {
                        Some(value) => {
                            if let Some(out) = unsafe { out.as_mut() } {
                                *out = value;
                            }
                            true
                        }
                        None => false,
                    })
                })
            }
        )*
    };
}

read_fns! {
    fe_fbr_read_bool: bool,
    fe_fbr_read_int8: i8,
    fe_fbr_read_int16: i16,
    fe_fbr_read_int32: i32,
    fe_fbr_read_int64: i64,
    fe_fbr_read_uint8: u8,
    fe_fbr_read_uint16: u16,
    fe_fbr_read_uint32: u32,
    fe_fbr_read_uint64: u64,
    fe_fbr_read_float: f32,
    fe_fbr_read_double: f64,
}

/// # Safety
///
/// `out` must be null or writable.
unsafe fn write_view(out: *mut FeByteView, bytes: Option<&[u8]>) -> bool {
    let out = unsafe { out.as_mut() };
    match (bytes, out) {
        (Some(bytes), Some(out)) => {
            *out = FeByteView::new(bytes);
            true
        }
        (Some(_), None) => true,
        (None, Some(out)) => {
            *out = FeByteView::EMPTY;
            false
        }
        (None, None) => false,
    }
}

/// Reads a string property into `out`, without copying.
///
/// The view excludes the terminating NUL, which is still present in memory after it.
///
/// # Safety
///
/// `reader` must be a live reader handle; `out` must be null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbr_read_string(
    reader: *const FeReader,
    field: FieldOffset,
    out: *mut FeByteView,
) -> bool {
    BRIDGE.run_always_fatal(|| {
        let value = unsafe { self::reader(reader) }?.read_string_bytes(field);
        Ok(unsafe { write_view(out, value) })
    })
}

/// Reads a byte vector property into `out`, without copying.
///
/// # Safety
///
/// `reader` must be a live reader handle; `out` must be null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fe_fbr_read_bytes(
    reader: *const FeReader,
    field: FieldOffset,
    out: *mut FeByteView,
) -> bool {
    BRIDGE.run_always_fatal(|| {
        let value = unsafe { self::reader(reader) }?.read_bytes(field);
        Ok(unsafe { write_view(out, value) })
    })
}
