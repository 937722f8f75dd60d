use super::scalar::Scalar;
use super::{FIRST_FIELD_OFFSET, UOFFSET_SIZE, VOFFSET_SIZE};

/// Zero-copy view of a finished entity table.
///
/// A reader is two positions into borrowed bytes: the table and its vtable. It owns
/// nothing and has no mutable state, so it is `Copy` and can be shared between threads
/// for as long as the bytes live.
///
/// Every access is bounds-checked. A truncated or malformed buffer never panics and never
/// reads outside the slice; the affected fields simply read as absent.
#[derive(Debug, Clone, Copy)]
pub struct TableReader<'a> {
    /// Record bytes
    buf: &'a [u8],
    /// Position of the root table
    table: usize,
    /// Position of the table's vtable
    vtable: usize,
    /// Vtable size in bytes; 0 when the header could not be decoded
    vtable_size: usize,
}

impl<'a> TableReader<'a> {
    /// Interprets `buf` as a finished record and returns a reader for its root table.
    pub fn get_root(buf: &'a [u8]) -> Self {
        Self::try_root(buf).unwrap_or(Self {
            buf,
            table: 0,
            vtable: 0,
            vtable_size: 0,
        })
    }

    fn try_root(buf: &'a [u8]) -> Option<Self> {
        let table = read_u32(buf, 0)? as usize;
        let soffset = read_i32(buf, table)?;

        // vtable = table - soffset, in either direction
        let vtable = if soffset >= 0 {
            table.checked_sub(soffset as usize)?
        } else {
            table.checked_add(soffset.unsigned_abs() as usize)?
        };

        let vtable_size = read_u16(buf, vtable)? as usize;
        if vtable_size < FIRST_FIELD_OFFSET as usize || vtable.checked_add(vtable_size)? > buf.len()
        {
            return None;
        }

        Some(Self {
            buf,
            table,
            vtable,
            vtable_size,
        })
    }

    /// The bytes this reader borrows.
    #[inline]
    pub fn raw_bytes(&self) -> &'a [u8] {
        self.buf
    }

    /// Absolute position of a field's inline value, or `None` if the slot is absent.
    fn field_position(&self, field: u16) -> Option<usize> {
        let field = field as usize;
        if field < FIRST_FIELD_OFFSET as usize
            || field % VOFFSET_SIZE != 0
            || field + VOFFSET_SIZE > self.vtable_size
        {
            return None;
        }

        match read_u16(self.buf, self.vtable + field)? {
            0 => None,
            relative => self.table.checked_add(relative as usize),
        }
    }

    /// Follows the uoffset stored in a field to a length-prefixed payload.
    fn read_vector(&self, field: u16) -> Option<&'a [u8]> {
        let position = self.field_position(field)?;
        let start = position.checked_add(read_u32(self.buf, position)? as usize)?;
        let len = read_u32(self.buf, start)? as usize;
        let data = start.checked_add(UOFFSET_SIZE)?;
        self.buf.get(data..data.checked_add(len)?)
    }

    /// Whether the table has a slot for `field`.
    pub fn has_field(&self, field: u16) -> bool {
        self.field_position(field).is_some()
    }

    /// Reads a scalar property, or `None` if it was never collected.
    pub fn read_scalar<T: Scalar>(&self, field: u16) -> Option<T> {
        let position = self.field_position(field)?;
        let bytes = self.buf.get(position..position.checked_add(T::SIZE)?)?;
        Some(T::read_le(bytes))
    }

    /// Reads a scalar property, falling back to the type default (0 or `false`).
    pub fn read_or_default<T: Scalar>(&self, field: u16) -> T {
        self.read_scalar(field).unwrap_or_default()
    }

    /// Reads a string property.
    ///
    /// Returns `None` for an absent property. A present property whose bytes are not
    /// valid UTF-8 reads as `Some("")`; use [`read_string_bytes`](Self::read_string_bytes)
    /// for the raw payload.
    pub fn read_string(&self, field: u16) -> Option<&'a str> {
        self.read_string_bytes(field)
            .map(|bytes| std::str::from_utf8(bytes).unwrap_or_default())
    }

    /// Reads a string property, with an absent property reading as `""`.
    pub fn read_string_or_empty(&self, field: u16) -> &'a str {
        self.read_string(field).unwrap_or_default()
    }

    /// Raw bytes of a string property, without the trailing zero.
    pub fn read_string_bytes(&self, field: u16) -> Option<&'a [u8]> {
        self.read_vector(field)
    }

    /// Reads a byte vector property.
    pub fn read_bytes(&self, field: u16) -> Option<&'a [u8]> {
        self.read_vector(field)
    }

    /// Reads a byte vector property, with an absent property reading as empty.
    pub fn read_bytes_or_empty(&self, field: u16) -> &'a [u8] {
        self.read_bytes(field).unwrap_or_default()
    }
}

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
fn read_i32(buf: &[u8], offset: usize) -> Option<i32> {
    read_u32(buf, offset).map(|v| v as i32)
}
