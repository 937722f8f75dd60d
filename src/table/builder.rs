use std::ops::{Deref, DerefMut};

use super::buffer::{DownwardBuffer, padding_bytes};
use super::scalar::Scalar;
use super::{FIRST_FIELD_OFFSET, SOFFSET_SIZE, UOFFSET_SIZE, VOFFSET_SIZE};
use crate::CHECKED;
use crate::config::BuilderConfig;
use crate::error::{AllocationError, CodecError, ProtocolViolation};

/// Vtable byte offset of a property slot, assigned by the schema compiler.
pub type FieldOffset = u16;

/// Largest slot whose vtable size still fits in a `u16`.
const MAX_FIELD_OFFSET: FieldOffset = u16::MAX - VOFFSET_SIZE as u16;

/// Handle to a string or byte vector already written into a builder.
///
/// The raw value is the payload's distance from the end of the buffer. It is only
/// meaningful for the builder that returned it, until that builder is cleared.
/// [`DataOffset::NULL`] stands for "no value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DataOffset(u32);

impl DataOffset {
    /// The null handle. Collecting it leaves the property absent.
    pub const NULL: DataOffset = DataOffset(0);

    /// Wraps a raw handle, e.g. one passed back through a C boundary.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns true for the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A collected field: its vtable slot and where its value was written.
#[derive(Debug, Clone, Copy)]
struct FieldLoc {
    field: FieldOffset,
    position: usize,
}

/// Encoder for one entity table at a time.
///
/// A put operation drives the builder in a fixed order:
///
/// 1. open a collection window with [`set_collecting(true)`](Self::set_collecting) or
///    [`begin_collecting`](Self::begin_collecting)
/// 2. [`prepare_string`](Self::prepare_string) / [`prepare_bytes`](Self::prepare_bytes)
///    for every variable-length property
/// 3. [`collect_scalar`](Self::collect_scalar) and [`collect_offset`](Self::collect_offset)
///    for every property that has a value; the first of these opens the table
/// 4. [`finish`](Self::finish) to get the record bytes
///
/// [`clear`](Self::clear) resets the builder for the next object without giving up its
/// buffer. Breaking the order is reported as a [`ProtocolViolation`] when
/// [`CHECKED`] is true; otherwise the check is skipped.
///
/// A builder is not shared between threads; use [`dequeue`](Self::dequeue) to get a
/// per-thread instance.
pub struct TableBuilder {
    buf: DownwardBuffer,
    config: BuilderConfig,
    collecting: bool,
    table_start: Option<usize>,
    fields: Vec<FieldLoc>,
    /// Handles returned by `prepare_*` since the last clear; only tracked when checked.
    payloads: Vec<u32>,
    min_align: usize,
    finished: bool,
}

impl TableBuilder {
    /// Creates a builder that forces defaults. Allocation is deferred to the first write.
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    /// Creates a builder with an explicit configuration.
    pub fn with_config(config: BuilderConfig) -> Self {
        Self {
            buf: DownwardBuffer::new(config.initial_capacity, config.max_buffer_size),
            config,
            collecting: false,
            table_start: None,
            fields: Vec::new(),
            payloads: Vec::new(),
            min_align: 1,
            finished: false,
        }
    }

    /// Creates a builder and allocates `capacity` bytes up front.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, AllocationError> {
        let mut builder = Self::with_config(BuilderConfig::default().initial_capacity(capacity));
        builder.buf.reserve(capacity)?;
        Ok(builder)
    }

    /// Returns this builder's configuration.
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Whether a put operation is currently collecting into this builder.
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Opens or closes the collection window.
    pub fn set_collecting(&mut self, collecting: bool) {
        self.collecting = collecting;
    }

    /// Opens the collection window until the returned guard is dropped.
    pub fn begin_collecting(&mut self) -> CollectingGuard<'_> {
        self.collecting = true;
        CollectingGuard { builder: self }
    }

    /// Whether the table header has been opened.
    pub fn did_start(&self) -> bool {
        self.table_start.is_some()
    }

    /// Opens the table header unless it is already open.
    ///
    /// Every collect call does this implicitly. Call it directly before [`finish`](Self::finish)
    /// to produce an empty table for an object without values.
    pub fn ensure_started(&mut self) {
        if self.table_start.is_none() {
            self.table_start = Some(self.buf.len());
            self.fields.clear();
        }
    }

    /// Resets the builder for the next object, keeping its buffer allocation.
    ///
    /// Every [`DataOffset`] handed out so far becomes invalid.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.table_start = None;
        self.fields.clear();
        self.payloads.clear();
        self.min_align = 1;
        self.finished = false;
    }

    /// Records a scalar property.
    ///
    /// There is no null for scalars: a property without a value is simply not collected.
    pub fn collect_scalar<T: Scalar>(
        &mut self,
        value: T,
        field: FieldOffset,
    ) -> Result<(), CodecError> {
        self.check_collecting()?;
        self.check_field(field)?;
        self.ensure_started();

        if !self.config.force_defaults && value == T::default() {
            return Ok(());
        }

        self.prep(T::SIZE, 0)?;
        value.write_le(self.buf.claim(T::SIZE)?);
        self.track_field(field);
        Ok(())
    }

    /// Records an optional scalar property; `None` leaves it absent.
    pub fn collect_opt<T: Scalar>(
        &mut self,
        value: Option<T>,
        field: FieldOffset,
    ) -> Result<(), CodecError> {
        match value {
            Some(value) => self.collect_scalar(value, field),
            None => Ok(()),
        }
    }

    /// Records a reference to a payload prepared earlier in this table's put operation.
    ///
    /// [`DataOffset::NULL`] opens the table like any other collect call but emits no slot.
    pub fn collect_offset(
        &mut self,
        data: DataOffset,
        field: FieldOffset,
    ) -> Result<(), CodecError> {
        self.check_collecting()?;
        self.ensure_started();
        if data.is_null() {
            return Ok(());
        }

        self.check_field(field)?;
        if CHECKED && !self.payloads.contains(&data.raw()) {
            return Err(ProtocolViolation::StaleDataOffset(data.raw()).into());
        }

        self.push_uoffset(data.raw())?;
        self.track_field(field);
        Ok(())
    }

    /// Writes a UTF-8 string payload and returns its handle.
    ///
    /// Must be called before the table is started. If the buffer cannot grow, the failure
    /// is logged and [`DataOffset::NULL`] is returned so the property ends up absent.
    pub fn prepare_string(&mut self, text: &str) -> Result<DataOffset, ProtocolViolation> {
        self.check_payload_allowed()?;

        match self.create_vector(text.as_bytes(), true) {
            Ok(offset) => Ok(offset),
            Err(_err) => {
                #[cfg(feature = "logging")]
                log::warn!("unexpected allocation failure preparing a string: {_err}");
                Ok(DataOffset::NULL)
            }
        }
    }

    /// Writes an opaque byte vector payload and returns its handle.
    ///
    /// Same contract as [`prepare_string`](Self::prepare_string).
    pub fn prepare_bytes(&mut self, bytes: &[u8]) -> Result<DataOffset, ProtocolViolation> {
        self.check_payload_allowed()?;

        match self.create_vector(bytes, false) {
            Ok(offset) => Ok(offset),
            Err(_err) => {
                #[cfg(feature = "logging")]
                log::warn!("unexpected allocation failure preparing a byte vector: {_err}");
                Ok(DataOffset::NULL)
            }
        }
    }

    /// Prepares an optional string; `None` yields [`DataOffset::NULL`] without touching the buffer.
    pub fn prepare_string_opt(
        &mut self,
        text: Option<&str>,
    ) -> Result<DataOffset, ProtocolViolation> {
        match text {
            Some(text) => self.prepare_string(text),
            None => Ok(DataOffset::NULL),
        }
    }

    /// Prepares an optional byte vector; `None` yields [`DataOffset::NULL`].
    pub fn prepare_bytes_opt(
        &mut self,
        bytes: Option<&[u8]>,
    ) -> Result<DataOffset, ProtocolViolation> {
        match bytes {
            Some(bytes) => self.prepare_bytes(bytes),
            None => Ok(DataOffset::NULL),
        }
    }

    /// Closes the table, makes it the buffer's root and returns the finished record.
    ///
    /// The bytes stay valid until the builder is cleared, mutated or dropped. Copy them
    /// (or hand them to the engine) before the next put operation.
    pub fn finish(&mut self) -> Result<&[u8], CodecError> {
        if CHECKED {
            if self.finished {
                return Err(ProtocolViolation::AlreadyFinished.into());
            }
            if self.table_start.is_none() {
                return Err(ProtocolViolation::NotStarted.into());
            }
        }

        if !self.finished {
            self.ensure_started();
            let root = self.end_table()?;
            self.finish_root(root)?;
            self.finished = true;
        }
        Ok(self.buf.data())
    }

    /// Size of the data written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written since creation or the last [`clear`](Self::clear).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// Bytes currently allocated for the buffer.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn check_collecting(&self) -> Result<(), ProtocolViolation> {
        if CHECKED {
            if !self.collecting {
                return Err(ProtocolViolation::NotCollecting);
            }
            if self.finished {
                return Err(ProtocolViolation::AlreadyFinished);
            }
        }
        Ok(())
    }

    fn check_payload_allowed(&self) -> Result<(), ProtocolViolation> {
        self.check_collecting()?;
        if CHECKED && self.table_start.is_some() {
            return Err(ProtocolViolation::PayloadAfterTableStart);
        }
        Ok(())
    }

    fn check_field(&self, field: FieldOffset) -> Result<(), ProtocolViolation> {
        if CHECKED {
            if field < FIRST_FIELD_OFFSET || field > MAX_FIELD_OFFSET || field % 2 != 0 {
                return Err(ProtocolViolation::InvalidFieldOffset(field));
            }
            if self.fields.iter().any(|loc| loc.field == field) {
                return Err(ProtocolViolation::DuplicateField(field));
            }
        }
        Ok(())
    }

    fn track_field(&mut self, field: FieldOffset) {
        self.fields.push(FieldLoc {
            field,
            position: self.buf.len(),
        });
    }

    /// Pads so that, after `additional` more bytes, the next `size` bytes are aligned
    /// to `size`, and reserves room for all of it.
    fn prep(&mut self, size: usize, additional: usize) -> Result<(), AllocationError> {
        self.min_align = self.min_align.max(size);
        let padding = padding_bytes(self.buf.len() + additional, size);
        self.buf.reserve(padding + size + additional)?;
        self.buf.push_zeros(padding)
    }

    /// Writes an offset that points from its own position to `target`.
    fn push_uoffset(&mut self, target: u32) -> Result<(), AllocationError> {
        self.prep(UOFFSET_SIZE, 0)?;
        let relative = (self.buf.len() + UOFFSET_SIZE).wrapping_sub(target as usize) as u32;
        self.buf.push(&relative.to_le_bytes())
    }

    fn create_vector(
        &mut self,
        bytes: &[u8],
        nul_terminated: bool,
    ) -> Result<DataOffset, AllocationError> {
        let terminator = usize::from(nul_terminated);
        self.prep(UOFFSET_SIZE, bytes.len() + terminator)?;
        self.buf.push_zeros(terminator)?;
        self.buf.push(bytes)?;
        // The buffer limit keeps every length below i32::MAX.
        self.buf.push(&(bytes.len() as u32).to_le_bytes())?;
        let offset = self.buf.len() as u32;
        if CHECKED {
            self.payloads.push(offset);
        }
        Ok(DataOffset(offset))
    }

    /// Writes the vtable for the open table and returns the table's position.
    fn end_table(&mut self) -> Result<usize, CodecError> {
        let table_start = self.table_start.unwrap_or(0);

        self.prep(SOFFSET_SIZE, 0)?;
        self.buf.push_zeros(SOFFSET_SIZE)?;
        let table_position = self.buf.len();

        let table_size = table_position - table_start;
        let table_size =
            u16::try_from(table_size).map_err(|_| CodecError::TableTooLarge(table_size))?;

        let vtable_size = self
            .fields
            .iter()
            .map(|loc| loc.field as usize + VOFFSET_SIZE)
            .max()
            .unwrap_or(0)
            .max(FIRST_FIELD_OFFSET as usize);
        let vtable_len =
            u16::try_from(vtable_size).map_err(|_| CodecError::TableTooLarge(vtable_size))?;

        self.buf.push_zeros(vtable_size)?;
        let vtable_position = self.buf.len();
        {
            let vtable = self.buf.at_mut(vtable_position, vtable_size);
            vtable[0..2].copy_from_slice(&vtable_len.to_le_bytes());
            vtable[2..4].copy_from_slice(&table_size.to_le_bytes());
            // Later entries for the same slot overwrite earlier ones.
            for loc in &self.fields {
                let slot = loc.field as usize;
                let relative = (table_position - loc.position) as u16;
                vtable[slot..slot + 2].copy_from_slice(&relative.to_le_bytes());
            }
        }

        let soffset = vtable_position as i32 - table_position as i32;
        self.buf
            .at_mut(table_position, SOFFSET_SIZE)
            .copy_from_slice(&soffset.to_le_bytes());

        self.fields.clear();
        Ok(table_position)
    }

    fn finish_root(&mut self, root: usize) -> Result<(), AllocationError> {
        self.prep(self.min_align, UOFFSET_SIZE)?;
        self.push_uoffset(root as u32)
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a builder's collection window open; closes it on drop.
pub struct CollectingGuard<'a> {
    builder: &'a mut TableBuilder,
}

impl Deref for CollectingGuard<'_> {
    type Target = TableBuilder;

    fn deref(&self) -> &TableBuilder {
        self.builder
    }
}

impl DerefMut for CollectingGuard<'_> {
    fn deref_mut(&mut self) -> &mut TableBuilder {
        self.builder
    }
}

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.builder.collecting = false;
    }
}
