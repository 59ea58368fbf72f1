//! In-memory ordered indexes.
//!
//! An index keeps a sorted vector of key tuples, a parallel vector
//! of record numbers and a recno → key map for removal. It registers
//! itself as a weak observer on its table: every record write feeds
//! [`update_entry`], and `pack` rebuilds the whole thing. A user key
//! function returning [`IndexKey::DoNotIndex`] keeps that record out
//! of the index.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::field::Value;
use crate::list::RecordList;
use crate::record::Record;
use crate::table::{Table, TableInner};
use crate::{DbfError, Result};


/// Outcome of a user key function.
pub enum IndexKey {
    /// Index the record under this key tuple.
    Key(Vec<Value>),
    /// Omit the record from the index.
    DoNotIndex,
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> IndexKey {
        IndexKey::Key(vec![value])
    }
}

impl From<Vec<Value>> for IndexKey {
    fn from(values: Vec<Value>) -> IndexKey {
        IndexKey::Key(values)
    }
}

/// A failed field read keeps the record out of the index, so key
/// functions can end with `record.get("age").into()`.
impl From<Result<Value>> for IndexKey {
    fn from(value: Result<Value>) -> IndexKey {
        match value {
            Ok(v) => v.into(),
            Err(_) => IndexKey::DoNotIndex,
        }
    }
}

type KeyFn = Rc<dyn Fn(&Record) -> IndexKey>;

pub(crate) struct IndexInner {
    table: Weak<RefCell<TableInner>>,
    key: KeyFn,
    values: Vec<Vec<Value>>,
    rec_by_val: Vec<i64>,
    records: HashMap<i64, Vec<Value>>,
}

fn bisect_left(values: &[Vec<Value>], key: &[Value]) -> usize {
    values.partition_point(|v| v.as_slice() < key)
}

fn bisect_right(values: &[Vec<Value>], key: &[Value]) -> usize {
    values.partition_point(|v| v.as_slice() <= key)
}

/// Exact match on every component except the last, which may be a
/// string prefix.
fn partial_match(target: &[Value], matched: &[Value]) -> bool {
    if matched.is_empty() || matched.len() > target.len() {
        return matched.is_empty();
    }
    let head = matched.len() - 1;
    if target[..head] != matched[..head] {
        return false;
    }
    match (&target[head], &matched[head]) {
        (Value::Character(t), Value::Character(m)) => t.starts_with(m.as_str()),
        (t, m) => t == m,
    }
}

/// Re-key one record after a write: drop any existing entry for its
/// record number, recompute the key, and insert in order.
pub(crate) fn update_entry(observer: &Rc<RefCell<IndexInner>>, record: &Record) {
    let key_fn = observer.borrow().key.clone();
    let recnum = record.record_number();
    {
        let mut inner = observer.borrow_mut();
        if let Some(old) = inner.records.remove(&recnum) {
            let position = bisect_left(&inner.values, &old);
            if position < inner.values.len() && inner.values[position] == old {
                inner.values.remove(position);
                inner.rec_by_val.remove(position);
            }
        }
    }
    let key = match key_fn(record) {
        IndexKey::Key(key) => key,
        IndexKey::DoNotIndex => return,
    };
    let mut inner = observer.borrow_mut();
    let position = bisect_right(&inner.values, &key);
    inner.values.insert(position, key.clone());
    inner.rec_by_val.insert(position, recnum);
    inner.records.insert(recnum, key);
}

pub(crate) fn clear_entries(observer: &Rc<RefCell<IndexInner>>) {
    let mut inner = observer.borrow_mut();
    inner.values.clear();
    inner.rec_by_val.clear();
    inner.records.clear();
}

pub(crate) fn reindex(observer: &Rc<RefCell<IndexInner>>, table: &Table) -> Result<()> {
    clear_entries(observer);
    for record in table.iter() {
        update_entry(observer, &record?);
    }
    Ok(())
}

/// An ordered index over one table.
pub struct Index {
    inner: Rc<RefCell<IndexInner>>,
}

impl Index {
    pub(crate) fn build(table: &Table, key: KeyFn) -> Result<Index> {
        let index = Index {
            inner: Rc::new(RefCell::new(IndexInner {
                table: Rc::downgrade(table.inner()),
                key,
                values: Vec::new(),
                rec_by_val: Vec::new(),
                records: HashMap::new(),
            })),
        };
        table.register_index(&index.inner);
        for record in table.iter() {
            update_entry(&index.inner, &record?);
        }
        Ok(index)
    }

    fn table(&self) -> Result<Table> {
        self.inner
            .borrow()
            .table
            .upgrade()
            .map(Table::from_inner)
            .ok_or_else(|| DbfError::Invalid("table is no longer available".to_string()))
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sorted key tuples (mainly for diagnostics).
    pub fn keys(&self) -> Vec<Vec<Value>> {
        self.inner.borrow().values.clone()
    }

    /// Fetch a record by index position; negative positions count
    /// from the end.
    pub fn get(&self, position: i64) -> Result<Record> {
        let recno = {
            let inner = self.inner.borrow();
            let count = inner.rec_by_val.len() as i64;
            if !(-count..count).contains(&position) {
                return Err(DbfError::Invalid(format!(
                    "record {} is not in index",
                    position
                )));
            }
            let physical = if position < 0 { position + count } else { position };
            inner.rec_by_val[physical as usize]
        };
        self.table()?.fetch(recno as usize)
    }

    /// A registered [`RecordList`] over a run of index positions.
    pub fn slice(&self, range: std::ops::Range<i64>) -> Result<RecordList> {
        let table = self.table()?;
        let result = RecordList::with_desc("index slice");
        table.register_list(&result);
        let count = self.inner.borrow().rec_by_val.len() as i64;
        let start = range.start.clamp(0, count);
        let end = range.end.clamp(start, count);
        for position in start..end {
            let record = self.get(position)?;
            result.push(&record)?;
        }
        Ok(result)
    }

    /// Position of the lowest (partial) match, or `-1`. Deleted
    /// records are skipped when the table's `use_deleted` is off.
    pub fn find(&self, matched: &[Value], partial: bool) -> Result<i64> {
        let table = self.table()?;
        let use_deleted = table.use_deleted();
        let inner = self.inner.borrow();
        let usable = |position: usize| -> Result<bool> {
            if use_deleted {
                return Ok(true);
            }
            Ok(!table.fetch(inner.rec_by_val[position] as usize)?.is_deleted())
        };
        let mut position = bisect_left(&inner.values, matched);
        while position < inner.values.len() && inner.values[position].as_slice() == matched {
            if usable(position)? {
                return Ok(position as i64);
            }
            position += 1;
        }
        if partial {
            while position < inner.values.len() && partial_match(&inner.values[position], matched)
            {
                if usable(position)? {
                    return Ok(position as i64);
                }
                position += 1;
            }
        }
        Ok(-1)
    }

    /// Like [`Index::find`], but an absent match is an error.
    pub fn index_of(&self, matched: &[Value], partial: bool) -> Result<usize> {
        match self.find(matched, partial)? {
            -1 => Err(DbfError::Invalid(format!(
                "match criteria {:?} not in index",
                matched
            ))),
            position => Ok(position as usize),
        }
    }

    /// Insertion position for a key, whether or not it is present.
    pub fn find_index(&self, matched: &[Value]) -> usize {
        bisect_left(&self.inner.borrow().values, matched)
    }

    /// All (partial) matches as a registered [`RecordList`],
    /// stopping at the first non-match.
    pub fn search(&self, matched: &[Value], partial: bool) -> Result<RecordList> {
        let table = self.table()?;
        let use_deleted = table.use_deleted();
        let result = RecordList::with_desc("index search");
        table.register_list(&result);
        let inner = self.inner.borrow();
        let mut position = bisect_left(&inner.values, matched);
        while position < inner.values.len() && inner.values[position].as_slice() == matched {
            let record = table.fetch(inner.rec_by_val[position] as usize)?;
            if use_deleted || !record.is_deleted() {
                result.push(&record)?;
            }
            position += 1;
        }
        if partial {
            while position < inner.values.len() && partial_match(&inner.values[position], matched)
            {
                let record = table.fetch(inner.rec_by_val[position] as usize)?;
                if use_deleted || !record.is_deleted() {
                    result.push(&record)?;
                }
                position += 1;
            }
        }
        Ok(result)
    }

    pub fn contains(&self, matched: &[Value]) -> Result<bool> {
        Ok(self.find(matched, false)? != -1)
    }

    pub fn contains_record(&self, record: &Record) -> bool {
        self.inner.borrow().records.contains_key(&record.record_number())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        clear_entries(&self.inner);
    }

    /// Rebuild from the table.
    pub fn reindex(&self) -> Result<()> {
        let table = self.table()?;
        reindex(&self.inner, &table)
    }

    /// Iterate records in key order.
    pub fn iter(&self) -> IndexIter {
        IndexIter { index: Index { inner: self.inner.clone() }, position: 0 }
    }
}

/// Iterator over an index's records in key order, honoring the
/// table's `use_deleted` setting.
pub struct IndexIter {
    index: Index,
    position: usize,
}

impl Iterator for IndexIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        loop {
            let recno = {
                let inner = self.index.inner.borrow();
                if self.position >= inner.rec_by_val.len() {
                    return None;
                }
                inner.rec_by_val[self.position]
            };
            self.position += 1;
            let table = match self.index.table() {
                Ok(table) => table,
                Err(error) => return Some(Err(error)),
            };
            match table.fetch(recno as usize) {
                Ok(record) => {
                    if !table.use_deleted() && record.is_deleted() {
                        continue;
                    }
                    return Some(Ok(record));
                }
                Err(error) => return Some(Err(error)),
            }
        }
    }
}
