//! Set-like ordered collections of records.
//!
//! A [`RecordList`] keeps `(table, record number, key value)` triples
//! in insertion order with a set of the seen key values for constant
//! time deduplication. Iteration re-fetches live records from their
//! table. Lists produced by table operations are registered as weak
//! observers so `pack` can purge entries for removed records and
//! shift the survivors.

use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::field::Value;
use crate::record::Record;
use crate::table::{Table, TableInner};
use crate::{DbfError, Result};


/// A list key: either the record's identity (default) or the value
/// tuple computed by a user key function.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyVal {
    Identity(usize, i64),
    Values(Vec<Value>),
}

type ListKeyFn = Rc<dyn Fn(&Record) -> Result<Vec<Value>>>;

#[derive(Clone)]
pub(crate) struct ListItem {
    table: Weak<RefCell<TableInner>>,
    recno: i64,
    key: KeyVal,
}

pub(crate) struct ListInner {
    items: Vec<ListItem>,
    seen: HashSet<KeyVal>,
    current: i64,
    desc: String,
    key: Option<ListKeyFn>,
}

/// Purge callback used by `pack`: remove the entry for
/// `(table, old_recno)` if present, then shift every later entry of
/// the same table down by `offset`. Returns whether an entry was
/// removed.
pub(crate) fn purge(
    observer: &Rc<RefCell<ListInner>>,
    table: &Rc<RefCell<TableInner>>,
    old_recno: i64,
    offset: i64,
) -> bool {
    let target = Rc::downgrade(table);
    let mut inner = observer.borrow_mut();
    let mut found = false;
    if let Some(position) = inner
        .items
        .iter()
        .position(|item| item.recno == old_recno && Weak::ptr_eq(&item.table, &target))
    {
        let item = inner.items.remove(position);
        inner.seen.remove(&item.key);
        found = true;
    }
    let mut rekeyed: Vec<(KeyVal, KeyVal)> = Vec::new();
    for item in inner.items.iter_mut() {
        if item.recno > old_recno && Weak::ptr_eq(&item.table, &target) {
            item.recno -= offset;
            let fresh = match &item.key {
                KeyVal::Identity(ptr, old) => Some(KeyVal::Identity(*ptr, *old - offset)),
                KeyVal::Values(_) => None,
            };
            if let Some(fresh) = fresh {
                rekeyed.push((item.key.clone(), fresh.clone()));
                item.key = fresh;
            }
        }
    }
    for (old, fresh) in rekeyed {
        inner.seen.remove(&old);
        inner.seen.insert(fresh);
    }
    found
}

/// An ordered, value-deduplicated collection of records.
pub struct RecordList {
    inner: Rc<RefCell<ListInner>>,
}

impl RecordList {
    pub fn new() -> RecordList {
        RecordList::make(String::new(), None)
    }

    pub fn with_desc(desc: &str) -> RecordList {
        RecordList::make(desc.to_string(), None)
    }

    /// A list deduplicating on a user key instead of record
    /// identity.
    pub fn with_key<F>(key: F) -> RecordList
    where
        F: Fn(&Record) -> Result<Vec<Value>> + 'static,
    {
        RecordList::make(String::new(), Some(Rc::new(key)))
    }

    fn make(desc: String, key: Option<ListKeyFn>) -> RecordList {
        RecordList {
            inner: Rc::new(RefCell::new(ListInner {
                items: Vec::new(),
                seen: HashSet::new(),
                current: -1,
                desc,
                key,
            })),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<ListInner>> {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn desc(&self) -> String {
        self.inner.borrow().desc.clone()
    }

    fn key_of(&self, record: &Record) -> Result<KeyVal> {
        let key = self.inner.borrow().key.clone();
        match key {
            Some(function) => Ok(KeyVal::Values(function(record)?)),
            None => {
                let table = record.table()?;
                Ok(KeyVal::Identity(
                    Rc::as_ptr(&table) as usize,
                    record.record_number(),
                ))
            }
        }
    }

    fn item_for(&self, record: &Record) -> Result<ListItem> {
        let key = self.key_of(record)?;
        let table = record.table()?;
        Ok(ListItem { table: Rc::downgrade(&table), recno: record.record_number(), key })
    }

    /// Append unless the record's key value is already present.
    /// Returns whether the record was added.
    pub fn push(&self, record: &Record) -> Result<bool> {
        let item = self.item_for(record)?;
        let mut inner = self.inner.borrow_mut();
        if inner.seen.contains(&item.key) {
            return Ok(false);
        }
        inner.seen.insert(item.key.clone());
        inner.items.push(item);
        if inner.current == -1 {
            inner.current = 0;
        }
        Ok(true)
    }

    /// Insert at a position unless the key value is already present.
    pub fn insert(&self, position: usize, record: &Record) -> Result<bool> {
        let item = self.item_for(record)?;
        let mut inner = self.inner.borrow_mut();
        if position > inner.items.len() {
            return Err(DbfError::Invalid(format!(
                "index {} not in list of {} records",
                position,
                inner.items.len()
            )));
        }
        if inner.seen.contains(&item.key) {
            return Ok(false);
        }
        inner.seen.insert(item.key.clone());
        inner.items.insert(position, item);
        Ok(true)
    }

    pub fn extend<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        for record in records {
            self.push(&record)?;
        }
        Ok(())
    }

    /// Remove a record from the list.
    pub fn remove(&self, record: &Record) -> Result<()> {
        let key = self.key_of(record)?;
        let mut inner = self.inner.borrow_mut();
        match inner.items.iter().position(|item| item.key == key) {
            Some(position) => {
                inner.items.remove(position);
                inner.seen.remove(&key);
                Ok(())
            }
            None => Err(DbfError::Invalid("record not in list".to_string())),
        }
    }

    /// Remove and return the record at `position` (the last record
    /// by default).
    pub fn pop(&self, position: Option<usize>) -> Result<Record> {
        let item = {
            let mut inner = self.inner.borrow_mut();
            if inner.items.is_empty() {
                return Err(DbfError::Invalid("list is empty".to_string()));
            }
            let position = position.unwrap_or(inner.items.len() - 1);
            if position >= inner.items.len() {
                return Err(DbfError::Invalid(format!(
                    "index {} not in list of {} records",
                    position,
                    inner.items.len()
                )));
            }
            let item = inner.items.remove(position);
            inner.seen.remove(&item.key);
            item
        };
        fetch_item(&item)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.items.clear();
        inner.seen.clear();
        inner.current = -1;
    }

    pub fn contains(&self, record: &Record) -> Result<bool> {
        let key = self.key_of(record)?;
        Ok(self.inner.borrow().seen.contains(&key))
    }

    /// Fetch the record at a position; negative positions count from
    /// the end.
    pub fn get(&self, position: i64) -> Result<Record> {
        let item = {
            let inner = self.inner.borrow();
            let count = inner.items.len() as i64;
            if !(-count..count).contains(&position) {
                return Err(DbfError::Invalid(format!(
                    "record {} is not in list",
                    position
                )));
            }
            let physical = if position < 0 { position + count } else { position };
            inner.items[physical as usize].clone()
        };
        fetch_item(&item)
    }

    /// A new list of the same kind over a range of positions.
    pub fn slice(&self, range: Range<i64>) -> RecordList {
        let inner = self.inner.borrow();
        let count = inner.items.len() as i64;
        let start = range.start.clamp(0, count);
        let end = range.end.clamp(start, count);
        let items: Vec<ListItem> = inner.items[start as usize..end as usize].to_vec();
        let seen = items.iter().map(|item| item.key.clone()).collect();
        RecordList {
            inner: Rc::new(RefCell::new(ListInner {
                current: if items.is_empty() { -1 } else { 0 },
                seen,
                items,
                desc: inner.desc.clone(),
                key: inner.key.clone(),
            })),
        }
    }

    /// Set union under this list's key function.
    pub fn union(&self, other: &RecordList) -> Result<RecordList> {
        let result = self.slice(0..self.len() as i64);
        let same_key = {
            let ours = self.inner.borrow();
            let theirs = other.inner.borrow();
            match (&ours.key, &theirs.key) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            }
        };
        if same_key {
            let items: Vec<ListItem> = other.inner.borrow().items.clone();
            let mut inner = result.inner.borrow_mut();
            for item in items {
                if !inner.seen.contains(&item.key) {
                    inner.seen.insert(item.key.clone());
                    inner.items.push(item);
                }
            }
        } else {
            for record in other.iter() {
                result.push(&record?)?;
            }
        }
        Ok(result)
    }

    /// Set difference: the records of `self` whose key values do not
    /// appear in `other` (under this list's key function).
    pub fn difference(&self, other: &RecordList) -> Result<RecordList> {
        let mut lost: HashSet<KeyVal> = HashSet::new();
        let same_key = {
            let ours = self.inner.borrow();
            let theirs = other.inner.borrow();
            match (&ours.key, &theirs.key) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            }
        };
        if same_key {
            for item in other.inner.borrow().items.iter() {
                lost.insert(item.key.clone());
            }
        } else {
            for record in other.iter() {
                lost.insert(self.key_of(&record?)?);
            }
        }
        let result = self.slice(0..0);
        {
            let ours = self.inner.borrow();
            let mut inner = result.inner.borrow_mut();
            for item in ours.items.iter() {
                if !lost.contains(&item.key) {
                    inner.seen.insert(item.key.clone());
                    inner.items.push(item.clone());
                }
            }
            inner.current = if inner.items.is_empty() { -1 } else { 0 };
        }
        Ok(result)
    }

    pub fn iter(&self) -> ListIter {
        ListIter { list: RecordList { inner: self.inner.clone() }, position: 0 }
    }

    // ----- cursor -----

    pub fn current_index(&self) -> i64 {
        self.inner.borrow().current
    }

    pub fn top(&self) -> Result<Record> {
        if self.is_empty() {
            return Err(DbfError::Invalid("list is empty".to_string()));
        }
        self.inner.borrow_mut().current = 0;
        self.current()
    }

    pub fn bottom(&self) -> Result<Record> {
        if self.is_empty() {
            return Err(DbfError::Invalid("list is empty".to_string()));
        }
        let last = self.len() as i64 - 1;
        self.inner.borrow_mut().current = last;
        self.current()
    }

    pub fn next(&self) -> Result<Record> {
        let count = self.len() as i64;
        let mut inner = self.inner.borrow_mut();
        if inner.current < count {
            inner.current += 1;
        }
        if inner.current < count {
            drop(inner);
            return self.current();
        }
        Err(DbfError::Eof)
    }

    pub fn prev(&self) -> Result<Record> {
        let mut inner = self.inner.borrow_mut();
        if inner.current >= 0 {
            inner.current -= 1;
        }
        if inner.current > -1 {
            drop(inner);
            return self.current();
        }
        Err(DbfError::Bof)
    }

    pub fn current(&self) -> Result<Record> {
        let position = {
            let inner = self.inner.borrow();
            if inner.current < 0 {
                return Err(DbfError::Bof);
            }
            if inner.current >= inner.items.len() as i64 {
                return Err(DbfError::Eof);
            }
            inner.current
        };
        self.get(position)
    }

    pub fn goto(&self, position: i64) -> Result<Record> {
        let count = self.len() as i64;
        if count == 0 {
            return Err(DbfError::Invalid("list is empty".to_string()));
        }
        if !(0..count).contains(&position) {
            return Err(DbfError::Invalid(format!(
                "index {} not in list of {} records",
                position, count
            )));
        }
        self.inner.borrow_mut().current = position;
        self.current()
    }
}

impl Default for RecordList {
    fn default() -> RecordList {
        RecordList::new()
    }
}

fn fetch_item(item: &ListItem) -> Result<Record> {
    let table = item
        .table
        .upgrade()
        .map(Table::from_inner)
        .ok_or_else(|| DbfError::Invalid("table is no longer available".to_string()))?;
    table.fetch(item.recno as usize)
}

/// Iterator over a list's records, re-fetched live from their
/// tables.
pub struct ListIter {
    list: RecordList,
    position: usize,
}

impl Iterator for ListIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        if self.position >= self.list.len() {
            return None;
        }
        let record = self.list.get(self.position as i64);
        self.position += 1;
        Some(record)
    }
}
