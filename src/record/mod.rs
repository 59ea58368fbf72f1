//! Live records: lazy field access over the fixed-width row bytes.
//!
//! A [`Record`] is a shared handle; the table's cache holds the same
//! state weakly, so a record fetched twice is the same object and an
//! unreferenced one is re-read from disk on the next access. Byte 0
//! is the delete flag, the rest is the concatenation of the encoded
//! fields. Edits mark the record dirty; [`Record::write`] persists
//! dirty bytes and feeds every live index.

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::field::{FieldInfo, Value};
use crate::table::TableInner;
use crate::{DbfError, Result};


pub const ACTIVE: u8 = b' ';
pub const DELETED: u8 = b'*';

pub(crate) struct RecordInner {
    pub(crate) recnum: i64,
    pub(crate) data: Vec<u8>,
    pub(crate) dirty: bool,
    pub(crate) table: Weak<RefCell<TableInner>>,
}

/// Shared handle to one record of a table.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RefCell<RecordInner>>,
}

impl Record {
    pub(crate) fn from_parts(
        recnum: i64,
        data: Vec<u8>,
        table: Weak<RefCell<TableInner>>,
    ) -> Record {
        Record {
            inner: Rc::new(RefCell::new(RecordInner { recnum, data, dirty: false, table })),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<RecordInner>>) -> Record {
        Record { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<RecordInner>> {
        &self.inner
    }

    pub(crate) fn table(&self) -> Result<Rc<RefCell<TableInner>>> {
        self.inner
            .borrow()
            .table
            .upgrade()
            .ok_or_else(|| DbfError::Invalid("table is no longer available".to_string()))
    }

    /// Physical record number; `-1` once the record has been packed
    /// away.
    pub fn record_number(&self) -> i64 {
        self.inner.borrow().recnum
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.borrow().data.first() == Some(&DELETED)
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty
    }

    /// A copy of the raw record bytes, delete flag included.
    pub fn data(&self) -> Vec<u8> {
        self.inner.borrow().data.clone()
    }

    pub fn field_names(&self) -> Result<Vec<String>> {
        let table = self.table()?;
        let names = table.borrow().fields.iter().map(|f| f.name.clone()).collect();
        Ok(names)
    }

    pub fn field_count(&self) -> Result<usize> {
        Ok(self.table()?.borrow().fields.len())
    }

    /// Read a field by name.
    pub fn get(&self, name: &str) -> Result<Value> {
        let table = self.table()?;
        let mut table = table.borrow_mut();
        let info = table.field_info(name)?.clone();
        let entry = table.dialect.entry(info.kind)?;
        let raw = {
            let inner = self.inner.borrow();
            inner.data[info.start..info.end()].to_vec()
        };
        (entry.decode)(&raw, &info, &mut table.ctx())
            .map_err(|e| annotate(e, &info.name, entry.name))
    }

    /// Read a field by position; negative positions count from the
    /// end.
    pub fn get_at(&self, position: isize) -> Result<Value> {
        let name = self.name_at(position)?;
        self.get(&name)
    }

    /// Read a run of fields by position.
    pub fn get_slice(&self, range: Range<isize>) -> Result<Vec<Value>> {
        let count = self.field_count()? as isize;
        let start = range.start.clamp(0, count);
        let end = range.end.clamp(start, count);
        (start..end).map(|i| self.get_at(i)).collect()
    }

    fn name_at(&self, position: isize) -> Result<String> {
        let table = self.table()?;
        let table = table.borrow();
        let count = table.fields.len() as isize;
        let index = if position < 0 { position + count } else { position };
        if !(0..count).contains(&index) {
            return Err(DbfError::Invalid(format!(
                "field offset {} is not in record",
                position
            )));
        }
        Ok(table.fields[index as usize].name.clone())
    }

    /// Write a field by name. The encoded bytes replace the field's
    /// slice of the record; anything longer than the descriptor is a
    /// `DataOverflow`.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        let table = self.table()?;
        let mut table = table.borrow_mut();
        table.check_writable()?;
        let info = table.field_info(name)?.clone();
        let entry = table.dialect.entry(info.kind)?;
        let bytes = (entry.encode)(&value, &info, &mut table.ctx())
            .map_err(|e| annotate(e, &info.name, entry.name))?;
        drop(table);
        let mut inner = self.inner.borrow_mut();
        inner.data[info.start..info.end()].copy_from_slice(&bytes);
        inner.dirty = true;
        Ok(())
    }

    /// Write a field by position.
    pub fn set_at(&self, position: isize, value: Value) -> Result<()> {
        let name = self.name_at(position)?;
        self.set(&name, value)
    }

    /// Mark the record soft-deleted.
    pub fn delete(&self) -> Result<()> {
        self.set_flag(DELETED)
    }

    /// Clear the soft-delete flag.
    pub fn undelete(&self) -> Result<()> {
        self.set_flag(ACTIVE)
    }

    fn set_flag(&self, flag: u8) -> Result<()> {
        let table = self.table()?;
        table.borrow().check_writable()?;
        let mut inner = self.inner.borrow_mut();
        inner.data[0] = flag;
        inner.dirty = true;
        Ok(())
    }

    /// Persist the record if dirty, feeding every live index.
    /// Returns 1 when bytes were written, 0 otherwise.
    pub fn write(&self) -> Result<usize> {
        if !self.inner.borrow().dirty {
            return Ok(0);
        }
        self.flush()?;
        Ok(1)
    }

    /// Bulk-write fields from a mapping, then persist.
    pub fn write_with(&self, values: &[(&str, Value)]) -> Result<usize> {
        self.gather(values, false)?;
        self.write()
    }

    /// Persist unconditionally and notify observers.
    pub(crate) fn flush(&self) -> Result<()> {
        let table = self.table()?;
        {
            let mut table = table.borrow_mut();
            let inner = self.inner.borrow();
            table.write_record_bytes(inner.recnum, &inner.data)?;
        }
        self.inner.borrow_mut().dirty = false;
        crate::table::notify_indexes(&table, self);
        Ok(())
    }

    /// Blank the record back to the table's template, restoring the
    /// listed fields afterwards.
    pub fn reset(&self, keep_fields: &[&str]) -> Result<()> {
        let kept: Vec<(String, Value)> = keep_fields
            .iter()
            .map(|name| Ok((name.to_string(), self.get(name)?)))
            .collect::<Result<_>>()?;
        let table = self.table()?;
        let blank = {
            let mut table = table.borrow_mut();
            table.check_writable()?;
            table.blank_record()?
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.data = blank;
            inner.dirty = true;
        }
        for (name, value) in kept {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Write fields from a mapping. Unknown keys raise
    /// `FieldMissing` unless `drop` is set; on any error the record
    /// bytes are restored, so a failed gather never leaves a
    /// half-written record.
    pub fn gather(&self, values: &[(&str, Value)], drop_missing: bool) -> Result<()> {
        let old_data = self.inner.borrow().data.clone();
        let names = self.field_names()?;
        let outcome = (|| {
            for (name, value) in values {
                if !names.iter().any(|n| n == name) {
                    if drop_missing {
                        continue;
                    }
                    return Err(DbfError::FieldMissing(name.to_string()));
                }
                self.set(name, value.clone())?;
            }
            Ok(())
        })();
        if outcome.is_err() {
            self.inner.borrow_mut().data = old_data;
        }
        outcome
    }

    /// A name → value mapping of the whole record; with `blank`, the
    /// field types' blank values instead.
    pub fn scatter(&self, blank: bool) -> Result<Vec<(String, Value)>> {
        let table = self.table()?;
        let fields: Vec<FieldInfo> = table.borrow().fields.clone();
        let mut pairs = Vec::with_capacity(fields.len());
        for info in &fields {
            let value = if blank {
                let table = table.borrow();
                let entry = table.dialect.entry(info.kind)?;
                (entry.blank)(&table.map)
            } else {
                self.get(&info.name)?
            };
            pairs.push((info.name.clone(), value));
        }
        Ok(pairs)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Record")
            .field("record_number", &inner.recnum)
            .field("data", &String::from_utf8_lossy(&inner.data))
            .finish()
    }
}

/// Field-level failures carry the field name and type.
fn annotate(err: DbfError, field: &str, type_name: &str) -> DbfError {
    let tag = |message: String| format!("field --{}-- is {} -> {}", field, type_name, message);
    match err {
        DbfError::DataOverflow { message, data } => {
            DbfError::DataOverflow { message: tag(message), data }
        }
        DbfError::NonUnicode(message) => DbfError::NonUnicode(tag(message)),
        DbfError::Invalid(message) => DbfError::Invalid(tag(message)),
        DbfError::Corrupt(message) => DbfError::Corrupt(tag(message)),
        other => other,
    }
}
