//! Schema-bound records
//!
//! A record holds one value per attribute of its schema and is reused across
//! rows: iterators overwrite it by deserializing the next row into it.
//!
//! The serialized form is cached. Assigning an attribute does not invalidate
//! the cache; callers must call [`Record::mark_changed`] before the record is
//! written again, otherwise the previous bytes are produced.

use std::cell::RefCell;
use std::io::{Cursor, Read};
use std::rc::Rc;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use super::value::AttVal;
use crate::catalog::{AttType, Schema};
use crate::error::{Error, Result};

/// A live record buffer shared between an iterator and the computations
/// compiled against it
pub type RecordRef = Rc<RefCell<Record>>;

/// A record (row) bound to a schema
#[derive(Debug, Clone)]
pub struct Record {
    /// Layout of this record
    schema: Arc<Schema>,
    /// One value per attribute
    values: Vec<AttVal>,
    /// Last serialized form
    cached: Option<Bytes>,
    /// Set by `mark_changed`, cleared by serialization
    changed: bool,
}

impl Record {
    /// Create a record holding the zero value of every attribute
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .atts()
            .iter()
            .map(|att| AttVal::default_for(att.att_type))
            .collect();
        Self {
            schema,
            values,
            cached: None,
            changed: true,
        }
    }

    /// Create a record from a full list of values
    pub fn from_values(schema: Arc<Schema>, values: Vec<AttVal>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(Error::AttributeIndex {
                index: values.len(),
                len: schema.len(),
            });
        }
        let mut record = Self::new(schema);
        for (i, value) in values.into_iter().enumerate() {
            record.set_att(i, value)?;
        }
        record.mark_changed();
        Ok(record)
    }

    /// Wrap this record into a shared live buffer
    pub fn into_ref(self) -> RecordRef {
        Rc::new(RefCell::new(self))
    }

    /// Get the schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get all values
    pub fn values(&self) -> &[AttVal] {
        &self.values
    }

    /// Get a value by position
    pub fn get_att(&self, index: usize) -> Result<&AttVal> {
        self.values.get(index).ok_or(Error::AttributeIndex {
            index,
            len: self.values.len(),
        })
    }

    /// Replace the value at a position, converting it to the slot's type.
    ///
    /// Does not invalidate the cached bytes.
    pub fn set_att(&mut self, index: usize, value: AttVal) -> Result<()> {
        let len = self.values.len();
        let att_type = self
            .schema
            .att(index)
            .map(|att| att.att_type)
            .ok_or(Error::AttributeIndex { index, len })?;
        self.values[index] = value.coerce_to(att_type)?;
        Ok(())
    }

    /// Record that the values changed since the last serialization
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Serialized form, re-encoded only if marked changed
    pub fn to_bytes(&mut self) -> Bytes {
        if !self.changed {
            if let Some(bytes) = &self.cached {
                return bytes.clone();
            }
        }
        let bytes = self.encode();
        self.cached = Some(bytes.clone());
        self.changed = false;
        bytes
    }

    fn encode(&self) -> Bytes {
        encode_values(&self.values)
    }

    /// Overwrite every value from a serialized form
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let corrupt = |e: std::io::Error| Error::CorruptRecord(e.to_string());
        let mut cursor = Cursor::new(bytes);

        let count = cursor.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        if count != self.schema.len() {
            return Err(Error::CorruptRecord(format!(
                "expected {} attributes, found {}",
                self.schema.len(),
                count
            )));
        }

        let mut values = Vec::with_capacity(count);
        for att in self.schema.atts() {
            let tag = cursor.read_u8().map_err(corrupt)?;
            if tag != att.att_type.tag() {
                return Err(Error::CorruptRecord(format!(
                    "attribute '{}' expected tag {}, found {}",
                    att.name,
                    att.att_type.tag(),
                    tag
                )));
            }
            let value = match att.att_type {
                AttType::Int => AttVal::Int(cursor.read_i64::<LittleEndian>().map_err(corrupt)?),
                AttType::Double => {
                    AttVal::Double(cursor.read_f64::<LittleEndian>().map_err(corrupt)?)
                }
                AttType::String => {
                    let len = cursor.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
                    let mut buf = vec![0u8; len];
                    cursor.read_exact(&mut buf).map_err(corrupt)?;
                    let s = String::from_utf8(buf)
                        .map_err(|e| Error::CorruptRecord(e.to_string()))?;
                    AttVal::String(s)
                }
                AttType::Bool => AttVal::Bool(cursor.read_u8().map_err(corrupt)? != 0),
            };
            values.push(value);
        }

        self.values = values;
        self.cached = Some(Bytes::copy_from_slice(bytes));
        self.changed = false;
        Ok(())
    }
}

/// Serialize a list of values in the record wire format
pub fn encode_values(values: &[AttVal]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + values.len() * 9);
    buf.put_u32_le(values.len() as u32);
    for value in values {
        buf.put_u8(value.att_type().tag());
        match value {
            AttVal::Int(i) => buf.put_i64_le(*i),
            AttVal::Double(d) => buf.put_f64_le(*d),
            AttVal::String(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            AttVal::Bool(b) => buf.put_u8(*b as u8),
        }
    }
    buf.freeze()
}
