//! The table engine: open/create/close lifecycle, the record
//! cursor, append/delete/pack/zap, structural field mutations and
//! on-disk synchronization.
//!
//! A [`Table`] is a shared handle over the engine state. Records are
//! produced on demand from a weakly-held cache backed by the file
//! (or held strongly for `:memory:` and read-only tables); indexes
//! and record lists register themselves as weak observers and are
//! fed by every mutation. Dropping the table leaves observers
//! detached: their reads fail with a clear diagnostic instead of
//! dangling.

use std::cell::RefCell;
use std::env;
use std::fmt;
use std::fs::{self, File, OpenOptions as FsOpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use encoding_rs::Encoding;
use log::debug;

use crate::field::{self, FieldCtx, FieldInfo, TypeMap, Value};
use crate::header::TableHeader;
use crate::index::{self, Index, IndexKey};
use crate::list::{self, RecordList};
use crate::logical::Implication;
use crate::memo::{Db3Memo, MemoStore, MemoryMemo, VfpMemo};
use crate::record::{Record, RecordInner};
use crate::temporal::Date;
use crate::{codepage_lookup, CodePage, Dialect, DbfError, Result};

#[cfg(test)]
mod tests;

/// Access mode of a table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fully open: reads and writes.
    ReadWrite,
    /// Records are cached in memory, the file is closed.
    ReadOnly,
    /// Only the header survives; record access fails.
    MetaOnly,
}

/// Open/create configuration beyond the defaults.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Treat the memo file as absent: memo reads produce empty
    /// values, memo writes store block 0.
    pub ignore_memos: bool,
    /// Load all records into memory, then close the file.
    pub read_only: bool,
    /// With `read_only`, also materialize memo contents.
    pub keep_memos: bool,
    /// Discard record data, keeping only table structure.
    pub meta_only: bool,
    /// Override the codepage byte stored in the table.
    pub codepage: Option<u8>,
    /// Host types for decoded values.
    pub map: TypeMap,
    /// Default implication mode for three-valued predicates over
    /// this table.
    pub implication: Implication,
    /// VFP memo block multiplier (1..=32, times 512 bytes).
    pub memo_size: usize,
}

impl Default for OpenOptions {
    fn default() -> OpenOptions {
        OpenOptions {
            ignore_memos: false,
            read_only: false,
            keep_memos: false,
            meta_only: false,
            codepage: None,
            map: TypeMap::default(),
            implication: Implication::default(),
            memo_size: 1,
        }
    }
}

/// One matching criterion for [`Table::locate`]: the wanted value,
/// the field it is compared against, and an optional transform
/// applied to the field value first.
pub struct Criterion<'a> {
    pub value: Value,
    pub field: &'a str,
    pub transform: Option<&'a dyn Fn(Value) -> Value>,
}

pub(crate) enum RecordSlot {
    /// Disk-backed: re-read when the weak reference is gone.
    Cached(Weak<RefCell<RecordInner>>),
    /// Memory-backed or read-only: owned by the table.
    Held(Record),
}

pub(crate) struct TableInner {
    pub(crate) dialect: Dialect,
    pub(crate) path: Option<PathBuf>,
    pub(crate) memo_path: Option<PathBuf>,
    pub(crate) header: TableHeader,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) file: Option<File>,
    pub(crate) memo: Option<Box<dyn MemoStore>>,
    pub(crate) ignore_memos: bool,
    pub(crate) memo_size: usize,
    pub(crate) mode: Mode,
    pub(crate) current: i64,
    pub(crate) use_deleted: bool,
    pub(crate) encoding: &'static Encoding,
    pub(crate) codepage_override: Option<u8>,
    pub(crate) map: TypeMap,
    pub(crate) implication: Implication,
    pub(crate) blank: Option<Vec<u8>>,
    pub(crate) records: Vec<RecordSlot>,
    pub(crate) indexes: Vec<Weak<RefCell<index::IndexInner>>>,
    pub(crate) lists: Vec<Weak<RefCell<list::ListInner>>>,
    pub(crate) backup: Option<PathBuf>,
}

impl TableInner {
    pub(crate) fn check_writable(&self) -> Result<()> {
        match self.mode {
            Mode::ReadWrite => Ok(()),
            Mode::ReadOnly => Err(DbfError::Invalid("table is read-only".to_string())),
            Mode::MetaOnly => {
                Err(DbfError::Invalid("table is closed, records are unavailable".to_string()))
            }
        }
    }

    pub(crate) fn field_info(&self, name: &str) -> Result<&FieldInfo> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| DbfError::FieldMissing(name.to_string()))
    }

    pub(crate) fn ctx(&mut self) -> FieldCtx<'_> {
        let memo = if self.ignore_memos {
            None
        } else {
            self.memo.as_deref_mut().map(|m| m as &mut dyn MemoStore)
        };
        FieldCtx { memo, encoding: self.encoding, map: self.map }
    }

    /// Build (and cache) the all-blank record template. Blank memo
    /// fields reference block 0, so the template never touches the
    /// memo store.
    pub(crate) fn blank_record(&mut self) -> Result<Vec<u8>> {
        if let Some(blank) = &self.blank {
            return Ok(blank.clone());
        }
        let mut data = vec![crate::record::ACTIVE; self.header.record_length()];
        let fields = self.fields.clone();
        for info in &fields {
            let entry = self.dialect.entry(info.kind)?;
            let value = (entry.blank)(&self.map);
            let mut ctx = FieldCtx { memo: None, encoding: self.encoding, map: self.map };
            let bytes = (entry.encode)(&value, info, &mut ctx)?;
            data[info.start..info.end()].copy_from_slice(&bytes);
        }
        self.blank = Some(data.clone());
        Ok(data)
    }

    pub(crate) fn write_record_bytes(&mut self, recnum: i64, data: &[u8]) -> Result<()> {
        if recnum < 0 {
            return Err(DbfError::Invalid(
                "attempted to update record that has been packed".to_string(),
            ));
        }
        let offset = self.header.start() as u64
            + recnum as u64 * self.header.record_length() as u64;
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let bytes = self.header.data()?.to_vec();
        if let Some(file) = self.file.as_mut() {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&bytes)?;
        }
        Ok(())
    }

    /// Cut the file to exactly the record area, writing the dBase
    /// III end-of-file marker where the dialect requires one.
    fn sync_length(&mut self) -> Result<()> {
        let end = (self.header.start()
            + self.header.record_count() * self.header.record_length()) as u64;
        let marker = self.dialect.writes_eof_marker();
        if let Some(file) = self.file.as_mut() {
            if marker {
                file.seek(SeekFrom::Start(end))?;
                file.write_all(&[0x1a])?;
                file.set_len(end + 1)?;
            } else {
                file.set_len(end)?;
            }
            file.flush()?;
        }
        Ok(())
    }

    /// Rebuild the header's descriptor block from the field list and
    /// refresh the version byte's memo bit.
    fn rebuild_header_fields(&mut self) -> Result<()> {
        let mut block = Vec::with_capacity(self.fields.len() * 32);
        let mut has_memo = false;
        for info in &self.fields {
            if self.fields.iter().filter(|f| f.name == info.name).count() > 1 {
                return Err(DbfError::Corrupt(format!(
                    "duplicate field name found: {}",
                    info.name
                )));
            }
            block.extend_from_slice(&field::pack_descriptor(info)?);
            if self.dialect.memo_types().contains(&info.kind) {
                has_memo = true;
            }
        }
        self.header.set_fields(&block)?;
        self.header.set_version(self.dialect.version_byte(has_memo));
        Ok(())
    }

    fn has_memo_fields(&self) -> bool {
        self.fields.iter().any(|f| self.dialect.memo_types().contains(&f.kind))
    }

    fn memo_field_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| self.dialect.memo_types().contains(&f.kind))
            .map(|f| f.name.clone())
            .collect()
    }
}

/// Feed every live index after a record write; dead observers are
/// dropped from the registry on the way.
pub(crate) fn notify_indexes(table: &Rc<RefCell<TableInner>>, record: &Record) {
    let observers: Vec<_> = table.borrow().indexes.to_vec();
    for weak in observers {
        if let Some(observer) = weak.upgrade() {
            index::update_entry(&observer, record);
        }
    }
    table.borrow_mut().indexes.retain(|w| w.strong_count() > 0);
}

/// A dBase-family table.
#[derive(Clone)]
pub struct Table {
    inner: Rc<RefCell<TableInner>>,
}

impl Table {
    // ----- lifecycle -----

    /// Create a table on disk from `name TYPE(args)` field specs,
    /// replacing any existing file.
    pub fn create<P: AsRef<Path>>(path: P, specs: &str, dialect: Dialect) -> Result<Table> {
        Table::create_with(path, specs, dialect, &OpenOptions::default())
    }

    pub fn create_with<P: AsRef<Path>>(
        path: P,
        specs: &str,
        dialect: Dialect,
        options: &OpenOptions,
    ) -> Result<Table> {
        let path = normalize_path(path.as_ref());
        let memo_path = path.with_extension(dialect.memo_ext());
        let mut inner = Table::build(specs, dialect, options)?;
        let file = FsOpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        inner.file = Some(file);
        if inner.has_memo_fields() && !inner.ignore_memos {
            let store: Box<dyn MemoStore> = match dialect {
                Dialect::Db3 => Box::new(Db3Memo::create(&memo_path)?),
                Dialect::Fp | Dialect::Vfp => {
                    Box::new(VfpMemo::create(&memo_path, options.memo_size)?)
                }
            };
            inner.memo = Some(store);
        }
        inner.path = Some(path);
        inner.memo_path = Some(memo_path);
        let table = Table { inner: Rc::new(RefCell::new(inner)) };
        table.flush()?;
        Ok(table)
    }

    /// Create a table living purely in memory (the `:memory:`
    /// handle of the file-based API).
    pub fn in_memory(specs: &str, dialect: Dialect) -> Result<Table> {
        Table::in_memory_with(specs, dialect, &OpenOptions::default())
    }

    pub fn in_memory_with(
        specs: &str,
        dialect: Dialect,
        options: &OpenOptions,
    ) -> Result<Table> {
        let mut inner = Table::build(specs, dialect, options)?;
        if inner.has_memo_fields() && !inner.ignore_memos {
            inner.memo = Some(Box::new(MemoryMemo::new()));
        }
        Ok(Table { inner: Rc::new(RefCell::new(inner)) })
    }

    /// Field layout and header shared by the create paths.
    fn build(specs: &str, dialect: Dialect, options: &OpenOptions) -> Result<TableInner> {
        let mut fields = field::parse_field_specs(specs, dialect)?;
        if fields.is_empty() {
            return Err(DbfError::Invalid(
                "field list must be specified for new tables".to_string(),
            ));
        }
        let mut offset = 1;
        for info in fields.iter_mut() {
            info.start = offset;
            offset += info.length;
        }
        let codepage_byte = options.codepage.unwrap_or_else(|| dialect.default_codepage());
        let encoding = codepage_lookup(codepage_byte)?.encoding()?;
        let mut inner = TableInner {
            dialect,
            path: None,
            memo_path: None,
            header: TableHeader::new(),
            fields,
            file: None,
            memo: None,
            ignore_memos: options.ignore_memos,
            memo_size: options.memo_size,
            mode: Mode::ReadWrite,
            current: -1,
            use_deleted: true,
            encoding,
            codepage_override: options.codepage,
            map: options.map,
            implication: options.implication,
            blank: None,
            records: Vec::new(),
            indexes: Vec::new(),
            lists: Vec::new(),
            backup: None,
        };
        inner.rebuild_header_fields()?;
        inner.header.set_extra(dialect.header_extra())?;
        inner.header.set_codepage(codepage_byte);
        Ok(inner)
    }

    /// Open an existing table.
    pub fn open<P: AsRef<Path>>(path: P, dialect: Dialect) -> Result<Table> {
        Table::open_with(path, dialect, &OpenOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(
        path: P,
        dialect: Dialect,
        options: &OpenOptions,
    ) -> Result<Table> {
        let path = normalize_path(path.as_ref());
        let inner = TableInner {
            dialect,
            path: Some(path.clone()),
            memo_path: Some(path.with_extension(dialect.memo_ext())),
            header: TableHeader::new(),
            fields: Vec::new(),
            file: None,
            memo: None,
            ignore_memos: options.ignore_memos,
            memo_size: options.memo_size,
            mode: Mode::ReadWrite,
            current: -1,
            use_deleted: true,
            encoding: encoding_rs::WINDOWS_1252,
            codepage_override: options.codepage,
            map: options.map,
            implication: options.implication,
            blank: None,
            records: Vec::new(),
            indexes: Vec::new(),
            lists: Vec::new(),
            backup: None,
        };
        let table = Table { inner: Rc::new(RefCell::new(inner)) };
        load_from_disk(&mut table.inner.borrow_mut())?;
        if options.meta_only {
            table.close(false, false)?;
        } else if options.read_only {
            table.close(true, options.keep_memos)?;
        }
        Ok(table)
    }

    /// Open a table choosing the dialect from its version byte.
    pub fn open_detect<P: AsRef<Path>>(path: P) -> Result<Table> {
        let path = normalize_path(path.as_ref());
        let kind = crate::table_type(&path)?;
        let dialect = kind.dialects().first().copied().ok_or_else(|| {
            DbfError::Unsupported(format!("tables of type {} not supported", kind.description()))
        })?;
        Table::open(path, dialect)
    }

    /// Re-open a previously closed disk table for read/write.
    pub fn reopen(&self) -> Result<()> {
        load_from_disk(&mut self.inner.borrow_mut())
    }

    /// Close the disk files. `keep_table` caches all records in
    /// memory first (read-only mode); `keep_memos` additionally
    /// materializes memo contents into an in-memory store. Without
    /// `keep_table` the handle drops to meta-only.
    pub fn close(&self, keep_table: bool, keep_memos: bool) -> Result<()> {
        if self.inner.borrow().path.is_none() {
            // memory tables have no descriptors to release
            return Ok(());
        }
        if keep_table {
            let count = self.len();
            for recno in 0..count {
                let record = self.fetch(recno)?;
                let mut inner = self.inner.borrow_mut();
                inner.records[recno] = RecordSlot::Held(record);
            }
        }
        let has_memo = self.inner.borrow().memo.is_some();
        if has_memo && keep_table && keep_memos {
            self.materialize_memos()?;
        } else {
            self.inner.borrow_mut().memo = None;
        }
        let mut inner = self.inner.borrow_mut();
        inner.file = None;
        inner.mode = if keep_table { Mode::ReadOnly } else { Mode::MetaOnly };
        Ok(())
    }

    /// Re-home every memo payload into an in-memory store so reads
    /// keep working after the side-file is closed.
    fn materialize_memos(&self) -> Result<()> {
        let memo_fields = self.inner.borrow().memo_field_names();
        let count = self.len();
        let mut contents: Vec<(usize, String, Value)> = Vec::new();
        for recno in 0..count {
            let record = self.fetch(recno)?;
            for name in &memo_fields {
                contents.push((recno, name.clone(), record.get(name)?));
            }
        }
        self.inner.borrow_mut().memo = Some(Box::new(MemoryMemo::new()));
        for (recno, name, value) in contents {
            let record = self.fetch(recno)?;
            record.set(&name, value)?;
        }
        Ok(())
    }

    // ----- structure accessors -----

    pub fn len(&self) -> usize {
        self.inner.borrow().header.record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> Mode {
        self.inner.borrow().mode
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.borrow().dialect
    }

    /// The version byte at header offset 0.
    pub fn version(&self) -> u8 {
        self.inner.borrow().header.version()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.borrow().path.clone()
    }

    pub fn memo_path(&self) -> Option<PathBuf> {
        self.inner.borrow().memo_path.clone()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.inner.borrow().fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_count(&self) -> usize {
        self.inner.borrow().fields.len()
    }

    pub fn record_length(&self) -> usize {
        self.inner.borrow().header.record_length()
    }

    pub fn last_update(&self) -> Date {
        self.inner.borrow().header.update()
    }

    /// `(length, decimals)` of a field.
    pub fn size_of(&self, name: &str) -> Result<(usize, usize)> {
        let inner = self.inner.borrow();
        let info = inner.field_info(name)?;
        Ok((info.length, info.decimals))
    }

    /// The type code of a field.
    pub fn type_of(&self, name: &str) -> Result<u8> {
        Ok(self.inner.borrow().field_info(name)?.kind)
    }

    pub fn is_memo_type(&self, name: &str) -> Result<bool> {
        let inner = self.inner.borrow();
        let info = inner.field_info(name)?;
        Ok(inner.dialect.memo_types().contains(&info.kind))
    }

    pub fn is_decimal_type(&self, name: &str) -> Result<bool> {
        let inner = self.inner.borrow();
        let info = inner.field_info(name)?;
        Ok(inner.dialect.decimal_types().contains(&info.kind))
    }

    /// Field layout strings suitable for [`Table::create`].
    pub fn structure(&self, fields: Option<&[&str]>) -> Result<Vec<String>> {
        let inner = self.inner.borrow();
        match fields {
            None => Ok(inner.fields.iter().map(|f| f.layout(inner.dialect)).collect()),
            Some(names) => names
                .iter()
                .map(|name| Ok(inner.field_info(name)?.layout(inner.dialect)))
                .collect(),
        }
    }

    /// A new empty table of the same dialect, layout and codepage.
    pub fn new_like<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        let specs = self.structure(None)?.join("; ");
        let mut options = OpenOptions::default();
        {
            let inner = self.inner.borrow();
            options.codepage = Some(inner.header.codepage());
            options.map = inner.map;
            options.implication = inner.implication;
            options.memo_size = inner.memo_size;
        }
        Table::create_with(path, &specs, self.dialect(), &options)
    }

    pub fn use_deleted(&self) -> bool {
        self.inner.borrow().use_deleted
    }

    /// When false, cursor motion and iteration skip soft-deleted
    /// records.
    pub fn set_use_deleted(&self, use_deleted: bool) {
        self.inner.borrow_mut().use_deleted = use_deleted;
    }

    pub fn implication(&self) -> Implication {
        self.inner.borrow().implication
    }

    pub fn codepage(&self) -> &'static CodePage {
        let byte = {
            let inner = self.inner.borrow();
            inner.codepage_override.unwrap_or_else(|| inner.header.codepage())
        };
        codepage_lookup(byte).unwrap_or(&crate::CODE_PAGES[0])
    }

    /// Change the table codepage: rewrites the header byte and swaps
    /// the in-memory encoder/decoder; existing record bytes are left
    /// as they are.
    pub fn set_codepage(&self, byte: u8) -> Result<()> {
        let encoding = codepage_lookup(byte)?.encoding()?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.check_writable()?;
            inner.header.set_codepage(byte);
            inner.encoding = encoding;
            inner.codepage_override = None;
        }
        self.flush_header()
    }

    /// Next unallocated memo block, when a memo store is attached.
    pub fn memo_next_free(&self) -> Option<u32> {
        self.inner.borrow().memo.as_ref().map(|m| m.next_free())
    }

    // ----- record access -----

    /// Fetch a record by number; negative numbers count from the
    /// end.
    pub fn record(&self, recno: i64) -> Result<Record> {
        let count = self.len() as i64;
        if !(-count..count).contains(&recno) {
            return Err(DbfError::Invalid(format!("record {} is not in table", recno)));
        }
        let physical = if recno < 0 { recno + count } else { recno };
        self.fetch(physical as usize)
    }

    pub(crate) fn fetch(&self, recno: usize) -> Result<Record> {
        let cached = {
            let inner = self.inner.borrow();
            match &inner.records[recno] {
                RecordSlot::Held(record) => return Ok(record.clone()),
                RecordSlot::Cached(weak) => weak.upgrade(),
            }
        };
        if let Some(rc) = cached {
            return Ok(Record::from_inner(rc));
        }
        let mut inner = self.inner.borrow_mut();
        if inner.mode == Mode::MetaOnly {
            return Err(DbfError::Invalid(
                "table is closed, records are unavailable".to_string(),
            ));
        }
        let length = inner.header.record_length();
        let offset = inner.header.start() as u64 + recno as u64 * length as u64;
        let mut data = vec![0u8; length];
        {
            let file = inner.file.as_mut().ok_or_else(|| {
                DbfError::Invalid("table is closed, records are unavailable".to_string())
            })?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut data).map_err(|_| {
                DbfError::Corrupt(format!("unable to read record data at offset {}", offset))
            })?;
        }
        let record = Record::from_parts(recno as i64, data, Rc::downgrade(&self.inner));
        inner.records[recno] = RecordSlot::Cached(Rc::downgrade(record.inner()));
        Ok(record)
    }

    /// Iterate records in physical order, skipping soft-deleted
    /// records unless `use_deleted` is set. Reaching the end is a
    /// clean stop, not an error.
    pub fn iter(&self) -> TableIter {
        TableIter { table: self.clone(), position: -1 }
    }

    /// A registered [`RecordList`] over a range of record numbers,
    /// honoring `use_deleted`.
    pub fn slice(&self, range: Range<i64>) -> Result<RecordList> {
        let result = RecordList::with_desc(&format!(
            "{} --> {:?}",
            self.describe(),
            range
        ));
        self.register_list(&result);
        let count = self.len() as i64;
        let start = range.start.clamp(0, count);
        let end = range.end.clamp(start, count);
        for recno in start..end {
            let record = self.fetch(recno as usize)?;
            if self.use_deleted() || !record.is_deleted() {
                result.push(&record)?;
            }
        }
        Ok(result)
    }

    /// All current records as a registered [`RecordList`].
    pub fn to_list(&self) -> Result<RecordList> {
        self.slice(0..self.len() as i64)
    }

    /// Scan for records satisfying `predicate`, as a registered
    /// [`RecordList`].
    pub fn find<F>(&self, predicate: F) -> Result<RecordList>
    where
        F: Fn(&Record) -> bool,
    {
        let result = RecordList::with_desc(&format!("{} --> find", self.describe()));
        self.register_list(&result);
        for record in self.iter() {
            let record = record?;
            if predicate(&record) {
                result.push(&record)?;
            }
        }
        Ok(result)
    }

    /// Build an in-memory ordered index over this table.
    pub fn create_index<F>(&self, key: F) -> Result<Index>
    where
        F: Fn(&Record) -> IndexKey + 'static,
    {
        Index::build(self, Rc::new(key))
    }

    pub(crate) fn register_list(&self, list: &RecordList) {
        let mut inner = self.inner.borrow_mut();
        inner.lists.push(Rc::downgrade(list.inner()));
        inner.lists.retain(|w| w.strong_count() > 0);
    }

    pub(crate) fn register_index(&self, observer: &Rc<RefCell<index::IndexInner>>) {
        let mut inner = self.inner.borrow_mut();
        inner.indexes.push(Rc::downgrade(observer));
        inner.indexes.retain(|w| w.strong_count() > 0);
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<TableInner>> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<TableInner>>) -> Table {
        Table { inner }
    }

    fn describe(&self) -> String {
        match self.path() {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }

    // ----- cursor -----

    /// Index of the current record: `-1` is before the first record,
    /// `len()` is past the last.
    pub fn current_index(&self) -> i64 {
        self.inner.borrow().current
    }

    fn set_current(&self, position: i64) {
        self.inner.borrow_mut().current = position;
    }

    /// Move the record pointer before the first record.
    pub fn top(&self) {
        self.set_current(-1);
    }

    /// Move the record pointer past the last record.
    pub fn bottom(&self) {
        self.set_current(self.len() as i64);
    }

    /// Seek to and return the first usable record.
    pub fn first(&self) -> Result<Record> {
        self.top();
        self.next().map_err(|e| match e {
            DbfError::Eof => {
                self.set_current(-1);
                DbfError::Bof
            }
            other => other,
        })
    }

    /// Seek to and return the last usable record.
    pub fn last(&self) -> Result<Record> {
        self.bottom();
        self.prev().map_err(|e| match e {
            DbfError::Bof => {
                self.set_current(self.len() as i64);
                DbfError::Eof
            }
            other => other,
        })
    }

    /// Advance to the next usable record.
    pub fn next(&self) -> Result<Record> {
        let count = self.len() as i64;
        let mut position = self.current_index();
        loop {
            if position >= count - 1 {
                self.set_current(count);
                return Err(DbfError::Eof);
            }
            position += 1;
            let record = self.fetch(position as usize)?;
            if self.use_deleted() || !record.is_deleted() {
                self.set_current(position);
                return Ok(record);
            }
        }
    }

    /// Step back to the previous usable record.
    pub fn prev(&self) -> Result<Record> {
        let mut position = self.current_index();
        loop {
            if position <= 0 {
                self.set_current(-1);
                return Err(DbfError::Bof);
            }
            position -= 1;
            let record = self.fetch(position as usize)?;
            if self.use_deleted() || !record.is_deleted() {
                self.set_current(position);
                return Ok(record);
            }
        }
    }

    /// The record under the cursor.
    pub fn current(&self) -> Result<Record> {
        let position = self.current_index();
        if position < 0 {
            return Err(DbfError::Bof);
        }
        if position >= self.len() as i64 {
            return Err(DbfError::Eof);
        }
        self.fetch(position as usize)
    }

    /// Move the cursor to a record number (negative counts from the
    /// end) and return the record.
    pub fn goto(&self, recno: i64) -> Result<Record> {
        let count = self.len() as i64;
        if !(-count..count).contains(&recno) {
            return Err(DbfError::Invalid(format!("record {} does not exist", recno)));
        }
        let physical = if recno < 0 { recno + count } else { recno };
        self.set_current(physical);
        self.current()
    }

    /// Walk forward from the cursor to the first (non-deleted)
    /// record whose transformed field tuple equals the criteria
    /// values; the cursor is restored when nothing matches.
    pub fn locate(&self, criteria: &[Criterion]) -> Result<Record> {
        let original = self.current_index();
        let count = self.len() as i64;
        let mut position = original.max(0);
        while position < count {
            let record = self.fetch(position as usize)?;
            if self.use_deleted() || !record.is_deleted() {
                let mut matched = true;
                for criterion in criteria {
                    let mut value = record.get(criterion.field)?;
                    if let Some(transform) = criterion.transform {
                        value = transform(value);
                    }
                    if value != criterion.value {
                        matched = false;
                        break;
                    }
                }
                if matched {
                    self.set_current(position);
                    return Ok(record);
                }
            }
            position += 1;
        }
        self.set_current(original);
        Err(DbfError::Invalid("no record matching criteria".to_string()))
    }

    // ----- mutation -----

    /// Append one blank record.
    pub fn append(&self) -> Result<Record> {
        self.append_multiple(&[], false, 1)
    }

    /// Append a record populated from a field mapping; on any error
    /// the append is rolled back completely.
    pub fn append_with(&self, values: &[(&str, Value)], drop_missing: bool) -> Result<Record> {
        self.append_multiple(values, drop_missing, 1)
    }

    /// Append `multiple` copies of one populated record. The copies
    /// share the first record's bytes verbatim, so memo fields keep
    /// the already-allocated block numbers (one `put` per memo
    /// field).
    pub fn append_multiple(
        &self,
        values: &[(&str, Value)],
        drop_missing: bool,
        multiple: usize,
    ) -> Result<Record> {
        {
            let inner = self.inner.borrow();
            inner.check_writable()?;
            if inner.fields.is_empty() {
                return Err(DbfError::Invalid("no fields defined, cannot append".to_string()));
            }
        }
        if multiple == 0 {
            return Err(DbfError::Invalid("cannot append zero records".to_string()));
        }
        let was_empty = self.is_empty();
        let blank = self.inner.borrow_mut().blank_record()?;
        let record = self.push_record(blank)?;
        let outcome = (|| -> Result<()> {
            if !values.is_empty() {
                record.gather(values, drop_missing)?;
            }
            record.flush()
        })();
        if let Err(error) = outcome {
            let mut inner = self.inner.borrow_mut();
            inner.records.pop();
            let count = inner.header.record_count();
            inner.header.set_record_count(count - 1)?;
            inner.write_header()?;
            inner.sync_length()?;
            return Err(error);
        }
        let mut newest = record.clone();
        for _ in 1..multiple {
            let copy = self.push_record(record.data())?;
            copy.flush()?;
            newest = copy;
        }
        self.flush_header()?;
        if was_empty {
            self.set_current(0);
        } else if multiple > 1 {
            self.set_current(self.len() as i64 - 1);
        }
        Ok(newest)
    }

    /// Append a copy of an existing record (bytes, delete flag and
    /// memo references included).
    pub fn append_record(&self, source: &Record) -> Result<Record> {
        self.inner.borrow().check_writable()?;
        let record = self.push_record(source.data())?;
        record.flush()?;
        self.flush_header()?;
        Ok(record)
    }

    fn push_record(&self, mut data: Vec<u8>) -> Result<Record> {
        let mut inner = self.inner.borrow_mut();
        let length = inner.header.record_length();
        data.resize(length, crate::record::ACTIVE);
        let recno = inner.header.record_count() as i64;
        let record = Record::from_parts(recno, data, Rc::downgrade(&self.inner));
        let slot = if inner.file.is_some() {
            RecordSlot::Cached(Rc::downgrade(record.inner()))
        } else {
            RecordSlot::Held(record.clone())
        };
        inner.records.push(slot);
        let count = inner.header.record_count();
        inner.header.set_record_count(count + 1)?;
        Ok(record)
    }

    /// Physically remove all soft-deleted records: live lists are
    /// purged, record numbers reassigned, the file rewritten and
    /// every live index rebuilt.
    pub fn pack(&self) -> Result<()> {
        self.inner.borrow().check_writable()?;
        for observer in self.live_indexes() {
            index::clear_entries(&observer);
        }
        let lists = self.live_lists();
        let count = self.len();
        let mut survivors: Vec<Record> = Vec::with_capacity(count);
        let mut purged = 0i64;
        for recno in 0..count {
            let record = self.fetch(recno)?;
            if record.is_deleted() {
                for observer in &lists {
                    list::purge(observer, &self.inner, recno as i64 - purged, 1);
                }
                record.inner().borrow_mut().recnum = -1;
                purged += 1;
            } else {
                record.inner().borrow_mut().recnum = survivors.len() as i64;
                survivors.push(record);
            }
        }
        debug!("pack removed {} of {} records", purged, count);
        {
            let mut inner = self.inner.borrow_mut();
            let held = inner.file.is_none();
            inner.records = survivors
                .iter()
                .map(|r| {
                    if held {
                        RecordSlot::Held(r.clone())
                    } else {
                        RecordSlot::Cached(Rc::downgrade(r.inner()))
                    }
                })
                .collect();
            inner.header.set_record_count(survivors.len())?;
            inner.current = -1;
            inner.write_header()?;
            for record in &survivors {
                let ri = record.inner().borrow();
                inner.write_record_bytes(ri.recnum, &ri.data)?;
            }
            inner.sync_length()?;
        }
        self.reindex()?;
        Ok(())
    }

    /// Remove every record. `are_you_sure` must be true.
    pub fn zap(&self, are_you_sure: bool) -> Result<()> {
        if !are_you_sure {
            return Err(DbfError::Invalid(
                "you must say you are sure to wipe the table".to_string(),
            ));
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.check_writable()?;
            inner.records.clear();
            inner.header.set_record_count(0)?;
            inner.current = -1;
            inner.write_header()?;
            inner.sync_length()?;
        }
        self.reindex()
    }

    /// Rebuild every live index from the table.
    pub fn reindex(&self) -> Result<()> {
        for observer in self.live_indexes() {
            index::reindex(&observer, self)?;
        }
        Ok(())
    }

    fn live_indexes(&self) -> Vec<Rc<RefCell<index::IndexInner>>> {
        let mut inner = self.inner.borrow_mut();
        inner.indexes.retain(|w| w.strong_count() > 0);
        inner.indexes.iter().filter_map(Weak::upgrade).collect()
    }

    fn live_lists(&self) -> Vec<Rc<RefCell<list::ListInner>>> {
        let mut inner = self.inner.borrow_mut();
        inner.lists.retain(|w| w.strong_count() > 0);
        inner.lists.iter().filter_map(Weak::upgrade).collect()
    }

    // ----- structural mutation -----

    /// Add fields to the layout. Existing records grow with blank
    /// values; a backup copy of the file is written first.
    pub fn add_fields(&self, specs: &str) -> Result<()> {
        self.inner.borrow().check_writable()?;
        let dialect = self.dialect();
        let new_fields = field::parse_field_specs(specs, dialect)?;
        let all_records = self.materialize()?;
        if !all_records.is_empty() {
            self.create_backup(None, false)?;
        }
        let mut added: Vec<String> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            for info in &new_fields {
                let taken = inner
                    .fields
                    .iter()
                    .chain(new_fields.iter())
                    .filter(|f| f.name == info.name)
                    .count();
                // the chain sees `info` itself once
                if taken > 1 {
                    return Err(DbfError::Invalid(format!(
                        "field '{}' already exists",
                        info.name
                    )));
                }
            }
            inner.blank = None;
            let mut offset = inner.header.record_length();
            for mut info in new_fields {
                info.start = offset;
                offset += info.length;
                added.push(info.name.clone());
                inner.fields.push(info);
            }
            inner.rebuild_header_fields()?;
        }
        self.attach_memo_store_if_needed()?;
        // grow each record, then blank the new fields through the
        // normal write path
        let new_length = self.record_length();
        for record in &all_records {
            record.inner().borrow_mut().data.resize(new_length, crate::record::ACTIVE);
            for name in &added {
                let blank = {
                    let inner = self.inner.borrow();
                    let info = inner.field_info(name)?;
                    let entry = inner.dialect.entry(info.kind)?;
                    (entry.blank)(&inner.map)
                };
                record.set(name, blank)?;
            }
        }
        self.flush()
    }

    /// Remove fields from the layout, splicing their bytes out of
    /// every record. A backup copy of the file is written first.
    pub fn delete_fields(&self, names: &str) -> Result<()> {
        self.inner.borrow().check_writable()?;
        let victims: Vec<String> =
            names.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        {
            let inner = self.inner.borrow();
            for victim in &victims {
                inner.field_info(victim)?;
            }
        }
        let all_records = self.materialize()?;
        self.create_backup(None, false)?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.blank = None;
            for victim in &victims {
                let position = inner.fields.iter().position(|f| f.name == *victim).ok_or_else(
                    || DbfError::FieldMissing(victim.clone()),
                )?;
                let doomed = inner.fields.remove(position);
                for record in &all_records {
                    let mut ri = record.inner().borrow_mut();
                    ri.data.drain(doomed.start..doomed.end());
                    ri.dirty = true;
                }
                recompute_starts(&mut inner.fields);
            }
            inner.rebuild_header_fields()?;
        }
        self.flush()
    }

    /// Resize a field, preserving the leading bytes of each record's
    /// value and space-filling the rest.
    pub fn resize_field(&self, name: &str, new_size: usize) -> Result<()> {
        self.inner.borrow().check_writable()?;
        if !(1..=255).contains(&new_size) {
            return Err(DbfError::Invalid(format!(
                "new_size must be between 1 and 255, not {} (use delete_fields to remove a field)",
                new_size
            )));
        }
        self.inner.borrow().field_info(name)?;
        let all_records = self.materialize()?;
        self.create_backup(None, false)?;
        {
            let mut inner = self.inner.borrow_mut();
            inner.blank = None;
            let position = inner
                .fields
                .iter()
                .position(|f| f.name == name)
                .ok_or_else(|| DbfError::FieldMissing(name.to_string()))?;
            let old = inner.fields[position].clone();
            let keep = old.length.min(new_size);
            for record in &all_records {
                let mut ri = record.inner().borrow_mut();
                let mut resized = vec![crate::record::ACTIVE; new_size];
                resized[..keep].copy_from_slice(&ri.data[old.start..old.start + keep]);
                ri.data.splice(old.start..old.end(), resized);
                ri.dirty = true;
            }
            inner.fields[position].length = new_size;
            recompute_starts(&mut inner.fields);
            inner.rebuild_header_fields()?;
        }
        self.flush()
    }

    /// Rename a field; only the descriptor block is rewritten.
    pub fn rename_field(&self, old: &str, new: &str) -> Result<()> {
        self.inner.borrow().check_writable()?;
        let new = field::validate_field_name(new)?;
        {
            let inner = self.inner.borrow();
            inner.field_info(old)?;
            if inner.fields.iter().any(|f| f.name == new) {
                return Err(DbfError::Invalid(format!("field --{}-- already exists", new)));
            }
        }
        if !self.is_empty() {
            self.create_backup(None, false)?;
        }
        {
            let mut inner = self.inner.borrow_mut();
            let position = inner
                .fields
                .iter()
                .position(|f| f.name == old)
                .ok_or_else(|| DbfError::FieldMissing(old.to_string()))?;
            inner.fields[position].name = new;
            inner.rebuild_header_fields()?;
        }
        self.flush_header()
    }

    /// Copy the table file into `$DBF_TEMP` (or the system temp
    /// directory). Memory tables are ignored.
    pub fn create_backup(
        &self,
        new_name: Option<&Path>,
        overwrite: bool,
    ) -> Result<Option<PathBuf>> {
        let (path, existing) = {
            let inner = self.inner.borrow();
            match &inner.path {
                Some(path) => (path.clone(), inner.backup.clone()),
                None => return Ok(None),
            }
        };
        let overwrite = overwrite || new_name.is_some();
        if !overwrite && existing.is_some() {
            return Ok(existing);
        }
        let target = match new_name {
            Some(name) => name.to_path_buf(),
            None => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "table".to_string());
                let upper = stem.chars().all(|c| !c.is_ascii_lowercase());
                let suffix = if upper { "_BACKUP" } else { "_backup" };
                let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
                let mut name = format!("{}{}", stem, suffix);
                if let Some(ext) = ext {
                    name.push('.');
                    name.push_str(&ext);
                }
                backup_dir().join(name)
            }
        };
        fs::copy(&path, &target)?;
        debug!("backed {} up to {}", path.display(), target.display());
        self.inner.borrow_mut().backup = Some(target.clone());
        Ok(Some(target))
    }

    /// Keep every record alive for the duration of a structural
    /// rewrite.
    fn materialize(&self) -> Result<Vec<Record>> {
        (0..self.len()).map(|recno| self.fetch(recno)).collect()
    }

    fn attach_memo_store_if_needed(&self) -> Result<()> {
        let needs = {
            let inner = self.inner.borrow();
            inner.has_memo_fields() && inner.memo.is_none() && !inner.ignore_memos
        };
        if !needs {
            return Ok(());
        }
        let (dialect, memo_path, memo_size, on_disk) = {
            let inner = self.inner.borrow();
            (inner.dialect, inner.memo_path.clone(), inner.memo_size, inner.file.is_some())
        };
        let store: Box<dyn MemoStore> = if on_disk {
            let memo_path = memo_path
                .ok_or_else(|| DbfError::Invalid("table has no memo path".to_string()))?;
            match dialect {
                Dialect::Db3 => Box::new(Db3Memo::create(&memo_path)?),
                Dialect::Fp | Dialect::Vfp => Box::new(VfpMemo::create(&memo_path, memo_size)?),
            }
        } else {
            Box::new(MemoryMemo::new())
        };
        self.inner.borrow_mut().memo = Some(store);
        Ok(())
    }

    // ----- on-disk sync -----

    /// Rewrite the header, every live record, and cut the file to
    /// its exact size.
    pub fn flush(&self) -> Result<()> {
        let handles: Vec<Record> = {
            let inner = self.inner.borrow();
            inner
                .records
                .iter()
                .filter_map(|slot| match slot {
                    RecordSlot::Held(record) => Some(record.clone()),
                    RecordSlot::Cached(weak) => weak.upgrade().map(Record::from_inner),
                })
                .collect()
        };
        let mut inner = self.inner.borrow_mut();
        inner.write_header()?;
        for record in &handles {
            let mut ri = record.inner().borrow_mut();
            let (recnum, dirty) = (ri.recnum, ri.dirty);
            inner.write_record_bytes(recnum, &ri.data)?;
            if dirty {
                ri.dirty = false;
            }
        }
        inner.sync_length()
    }

    /// Rewrite only the header (and the dBase III end-of-file
    /// marker).
    pub(crate) fn flush_header(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.write_header()?;
        if inner.dialect.writes_eof_marker() {
            inner.sync_length()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.describe())
            .field("dialect", &self.dialect())
            .field("mode", &self.mode())
            .field("records", &self.len())
            .finish()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.mode() {
            Mode::ReadWrite => "read/write",
            Mode::ReadOnly => "read-only",
            Mode::MetaOnly => "meta-only",
        };
        writeln!(f, "Table:         {}", self.describe())?;
        writeln!(f, "Type:          {}", self.dialect().name())?;
        writeln!(f, "Codepage:      {} ({})", self.codepage().name, self.codepage().description)?;
        writeln!(f, "Status:        {}", status)?;
        writeln!(f, "Last updated:  {}", self.last_update())?;
        writeln!(f, "Record count:  {}", self.len())?;
        writeln!(f, "Field count:   {}", self.field_count())?;
        writeln!(f, "Record length: {}", self.record_length())?;
        writeln!(f, "--Fields--")?;
        let inner = self.inner.borrow();
        for (position, info) in inner.fields.iter().enumerate() {
            writeln!(f, "{:>3}) {}", position, info.layout(inner.dialect))?;
        }
        Ok(())
    }
}

/// Iterator over a table's usable records.
pub struct TableIter {
    table: Table,
    position: i64,
}

impl Iterator for TableIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        loop {
            self.position += 1;
            if self.position >= self.table.len() as i64 {
                return None;
            }
            match self.table.fetch(self.position as usize) {
                Ok(record) => {
                    if !self.table.use_deleted() && record.is_deleted() {
                        continue;
                    }
                    return Some(Ok(record));
                }
                Err(error) => return Some(Err(error)),
            }
        }
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    if path.extension().is_none() {
        path.with_extension("dbf")
    } else {
        path.to_path_buf()
    }
}

fn backup_dir() -> PathBuf {
    env::var_os("DBF_TEMP")
        .or_else(|| env::var_os("TEMP"))
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
}

fn recompute_starts(fields: &mut [FieldInfo]) {
    let mut offset = 1;
    for info in fields.iter_mut() {
        info.start = offset;
        offset += info.length;
    }
}

/// (Re)load table state from the file named in `inner.path`.
fn load_from_disk(inner: &mut TableInner) -> Result<()> {
    let path = inner
        .path
        .clone()
        .ok_or_else(|| DbfError::Invalid("memory tables cannot be reopened".to_string()))?;
    let mut file = FsOpenOptions::new().read(true).write(true).open(&path)?;
    let mut prefix = [0u8; 32];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut prefix)?;
    let mut header = TableHeader::from_bytes(&prefix)?;
    if !inner.dialect.supported_versions().contains(&header.version()) {
        return Err(DbfError::Unsupported(format!(
            "{} does not support {} [0x{:02x}]",
            inner.dialect.name(),
            crate::DbfType::parse_type(header.version()).description(),
            header.version()
        )));
    }
    let codepage_byte = inner.codepage_override.unwrap_or_else(|| header.codepage());
    let encoding = codepage_lookup(codepage_byte)?.encoding()?;
    if header.start() < 33 {
        return Err(DbfError::Corrupt("corrupt field structure in header".to_string()));
    }
    let mut block = vec![0u8; header.start() - 32];
    file.read_exact(&mut block)
        .map_err(|_| DbfError::Corrupt("corrupt field structure in header".to_string()))?;
    let field_end = (0..)
        .map(|i| i * 32)
        .take_while(|offset| *offset < block.len())
        .find(|offset| block[*offset] == crate::header::TERMINATOR)
        .ok_or_else(|| DbfError::Corrupt("corrupt field structure in header".to_string()))?;
    let count = header.record_count();
    header.set_fields(&block[..field_end])?;
    header.set_extra(&block[field_end + 1..])?;

    // parse descriptors; a null-flags column ends the layout
    let mut fields: Vec<FieldInfo> = Vec::new();
    let mut offset = 1;
    for frame in header.fields()?.chunks(32) {
        let mut info = field::unpack_descriptor(frame)?;
        if info.kind == b'0' {
            break;
        }
        inner.dialect.entry(info.kind)?;
        if fields.iter().any(|f| f.name == info.name) {
            return Err(DbfError::Corrupt(format!(
                "duplicate field name found: {}",
                info.name
            )));
        }
        if !inner.dialect.explicit_start() {
            info.start = offset;
        }
        offset += info.length;
        fields.push(info);
    }

    // memo integrity
    let memo_path = path.with_extension(inner.dialect.memo_ext());
    let has_memo_fields =
        fields.iter().any(|f| inner.dialect.memo_types().contains(&f.kind));
    let mut memo: Option<Box<dyn MemoStore>> = None;
    if !inner.ignore_memos {
        match inner.dialect {
            Dialect::Db3 => {
                if header.version() == 0x83 {
                    memo = Some(Box::new(Db3Memo::open(&memo_path)?));
                }
                if has_memo_fields {
                    if header.version() != 0x83 {
                        return Err(DbfError::Corrupt(
                            "table structure corrupt: memo fields exist, header declares no memos"
                                .to_string(),
                        ));
                    }
                    if !memo_path.exists() {
                        return Err(DbfError::Corrupt(
                            "table structure corrupt: memo fields exist without memo file"
                                .to_string(),
                        ));
                    }
                }
            }
            Dialect::Fp | Dialect::Vfp => {
                if memo_path.exists() {
                    memo = Some(Box::new(VfpMemo::open(&memo_path)?));
                } else if has_memo_fields {
                    return Err(DbfError::Corrupt(
                        "table structure corrupt: memo fields exist without memo file".to_string(),
                    ));
                }
            }
        }
    }

    inner.header = header;
    inner.fields = fields;
    inner.encoding = encoding;
    inner.file = Some(file);
    inner.memo = memo;
    inner.memo_path = Some(memo_path);
    inner.blank = None;
    inner.mode = Mode::ReadWrite;
    inner.records = (0..count).map(|_| RecordSlot::Cached(Weak::new())).collect();
    inner.current = if count > 0 { 0 } else { -1 };
    Ok(())
}
