//! Reading, writing and querying dBase-family tables.
//!
//! Supported on-disk formats are dBase III Plus (`0x03`/`0x83`),
//! FoxPro 2 (`0x03`/`0xF5`) and Visual FoxPro 6 (`0x30`), together
//! with their `.dbt`/`.fpt` memo side-files. A [`Table`] owns the
//! header, the field layout and the record file; [`Index`] and
//! [`RecordList`] observe a table and are kept consistent through
//! every mutation.
//!
//! ```no_run
//! use xbase_rs::{Dialect, Table, Value};
//!
//! let table = Table::create("people.dbf", "name C(25); age N(3,0)", Dialect::Db3)?;
//! table.append_with(&[("name", Value::from("Ethan")), ("age", Value::from(29))], false)?;
//! # Ok::<(), xbase_rs::DbfError>(())
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;
use thiserror::Error;

#[cfg(test)]
mod tests;

pub mod codec;
pub mod export;
pub mod field;
pub mod header;
pub mod index;
pub mod list;
pub mod logical;
pub mod memo;
pub mod record;
pub mod table;
pub mod temporal;

pub use export::ExportFormat;
pub use field::{
    Currency, CurrencyKind, FieldInfo, NumberKind, TextKind, TypeMap, Value,
};
pub use index::{Index, IndexKey};
pub use list::RecordList;
pub use logical::{Implication, Logical};
pub use record::Record;
pub use table::{Criterion, Mode, OpenOptions, Table, TableIter};
pub use temporal::{Date, DateTime, Time};

/// Everything that can go wrong while working with a table.
///
/// `Bof` and `Eof` are cursor termination signals rather than fatal
/// conditions; iterators convert them into a clean stop.
#[derive(Debug, Error)]
pub enum DbfError {
    /// A value cannot fit in its field.
    #[error("data overflow: {message} (value: {data})")]
    DataOverflow { message: String, data: String },
    /// Named field does not exist in the table.
    #[error("{0}: no such field in table")]
    FieldMissing(String),
    /// Text cannot be represented in the table's codepage.
    #[error("text not representable in table codepage: {0}")]
    NonUnicode(String),
    /// Record pointer moved before the first usable record.
    #[error("beginning of file reached")]
    Bof,
    /// Record pointer moved past the last usable record.
    #[error("end of file reached")]
    Eof,
    /// Structural damage: corrupt field block, memo header mismatch, ...
    #[error("{0}")]
    Corrupt(String),
    /// Unsupported version byte, codepage or field type.
    #[error("{0}")]
    Unsupported(String),
    /// Invalid argument or operation for the table's current state.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbfError>;

/// Table type identified by the version byte at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbfType {
    FoxBase,
    DBase3,
    DBase4,
    DBase5,
    VisualFoxPro,
    VisualFoxProAutoInc,
    VisualFoxProVarBlob,
    DBase4SqlTable,
    DBase4SqlSystem,
    DBase3Memo,
    DBase4Memo,
    DBase4SqlTableMemo,
    FoxProMemo,
    Undefined,
}

impl DbfType {
    pub fn parse_type(flag: u8) -> DbfType {
        match flag {
            0x02 => DbfType::FoxBase,
            0x03 => DbfType::DBase3,
            0x04 => DbfType::DBase4,
            0x05 => DbfType::DBase5,
            0x30 => DbfType::VisualFoxPro,
            0x31 => DbfType::VisualFoxProAutoInc,
            0x32 => DbfType::VisualFoxProVarBlob,
            0x43 => DbfType::DBase4SqlTable,
            0x63 => DbfType::DBase4SqlSystem,
            0x83 => DbfType::DBase3Memo,
            0x8b => DbfType::DBase4Memo,
            0x8e => DbfType::DBase4SqlTableMemo,
            0xf5 => DbfType::FoxProMemo,
            _ => DbfType::Undefined,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DbfType::FoxBase => "FoxBASE",
            DbfType::DBase3 => "dBase III Plus",
            DbfType::DBase4 => "dBase IV",
            DbfType::DBase5 => "dBase V",
            DbfType::VisualFoxPro => "Visual FoxPro",
            DbfType::VisualFoxProAutoInc => "Visual FoxPro (auto increment field)",
            DbfType::VisualFoxProVarBlob => "Visual FoxPro (Varchar/Varbinary)",
            DbfType::DBase4SqlTable => "dBase IV SQL",
            DbfType::DBase4SqlSystem => "dBase IV SQL system",
            DbfType::DBase3Memo => "dBase III Plus w/memos",
            DbfType::DBase4Memo => "dBase IV w/memos",
            DbfType::DBase4SqlTableMemo => "dBase IV w/SQL table",
            DbfType::FoxProMemo => "FoxPro w/memos",
            DbfType::Undefined => "unknown",
        }
    }

    /// Dialects able to open a table carrying this version byte.
    pub fn dialects(&self) -> &'static [Dialect] {
        match self {
            DbfType::DBase3 => &[Dialect::Db3, Dialect::Fp],
            DbfType::DBase3Memo => &[Dialect::Db3],
            DbfType::FoxProMemo => &[Dialect::Fp],
            DbfType::VisualFoxPro => &[Dialect::Vfp],
            _ => &[],
        }
    }
}

/// Read the version byte of a dbf file and identify its type.
pub fn table_type<P: AsRef<Path>>(path: P) -> Result<DbfType> {
    let mut file = File::open(path.as_ref())?;
    let flag = &mut [0];
    file.read_exact(flag)?;
    Ok(DbfType::parse_type(flag[0]))
}

/// One of the supported on-disk dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// dBase III Plus: `C D L M N`, `.dbt` memos, `0x1A` end-of-file marker.
    Db3,
    /// FoxPro 2: `C D F G L M N P`, `.fpt` memos.
    Fp,
    /// Visual FoxPro 6: FoxPro types plus `B I T Y`, explicit field offsets.
    Vfp,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Db3 => "dBase III Plus",
            Dialect::Fp => "FoxPro",
            Dialect::Vfp => "Visual FoxPro 6",
        }
    }

    pub fn memo_ext(&self) -> &'static str {
        match self {
            Dialect::Db3 => "dbt",
            Dialect::Fp | Dialect::Vfp => "fpt",
        }
    }

    /// Version bytes this dialect will open.
    pub fn supported_versions(&self) -> &'static [u8] {
        match self {
            Dialect::Db3 => &[0x03, 0x83],
            Dialect::Fp => &[0x03, 0xf5],
            Dialect::Vfp => &[0x30],
        }
    }

    /// Version byte written for a table with or without memo fields.
    pub fn version_byte(&self, has_memo: bool) -> u8 {
        match (self, has_memo) {
            (Dialect::Db3, false) => 0x03,
            (Dialect::Db3, true) => 0x83,
            (Dialect::Fp, false) => 0x03,
            (Dialect::Fp, true) => 0xf5,
            (Dialect::Vfp, _) => 0x30,
        }
    }

    /// Field offsets are stored in the descriptor rather than computed.
    pub fn explicit_start(&self) -> bool {
        matches!(self, Dialect::Vfp)
    }

    /// dBase III terminates the record area with a single `0x1A`.
    pub fn writes_eof_marker(&self) -> bool {
        matches!(self, Dialect::Db3)
    }

    /// Bytes between the `0x0D` field terminator and the first record.
    /// Visual FoxPro reserves 263 zero bytes for the backlink path.
    pub fn header_extra(&self) -> &'static [u8] {
        const BACKLINK: [u8; 263] = [0; 263];
        match self {
            Dialect::Db3 => &[],
            Dialect::Fp | Dialect::Vfp => &BACKLINK,
        }
    }

    pub fn default_codepage(&self) -> u8 {
        0x03
    }
}

/// A codepage registry entry: the byte stored at header offset 29,
/// its conventional short and long names, and the encoding label the
/// text layer resolves it with. Entries without a label are known
/// pages this build cannot decode; opening such a table fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePage {
    pub byte: u8,
    pub name: &'static str,
    pub description: &'static str,
    label: Option<&'static str>,
}

impl CodePage {
    pub fn encoding(&self) -> Result<&'static Encoding> {
        self.label
            .and_then(|l| Encoding::for_label(l.as_bytes()))
            .ok_or_else(|| {
                DbfError::Unsupported(format!(
                    "unsupported codepage: {} [0x{:02x}]",
                    self.description, self.byte
                ))
            })
    }
}

macro_rules! cp {
    ($byte:expr, $name:expr, $desc:expr) => {
        CodePage { byte: $byte, name: $name, description: $desc, label: None }
    };
    ($byte:expr, $name:expr, $desc:expr, $label:expr) => {
        CodePage { byte: $byte, name: $name, description: $desc, label: Some($label) }
    };
}

pub static CODE_PAGES: &[CodePage] = &[
    cp!(0x00, "ascii", "plain ol' ascii", "ascii"),
    cp!(0x01, "cp437", "U.S. MS-DOS"),
    cp!(0x02, "cp850", "International MS-DOS"),
    cp!(0x03, "cp1252", "Windows ANSI", "windows-1252"),
    cp!(0x04, "mac_roman", "Standard Macintosh", "macintosh"),
    cp!(0x08, "cp865", "Danish OEM"),
    cp!(0x09, "cp437", "Dutch OEM"),
    cp!(0x0a, "cp850", "Dutch OEM (secondary)"),
    cp!(0x0b, "cp437", "Finnish OEM"),
    cp!(0x0d, "cp437", "French OEM"),
    cp!(0x0e, "cp850", "French OEM (secondary)"),
    cp!(0x0f, "cp437", "German OEM"),
    cp!(0x10, "cp850", "German OEM (secondary)"),
    cp!(0x11, "cp437", "Italian OEM"),
    cp!(0x12, "cp850", "Italian OEM (secondary)"),
    cp!(0x13, "cp932", "Japanese Shift-JIS", "shift_jis"),
    cp!(0x14, "cp850", "Spanish OEM (secondary)"),
    cp!(0x15, "cp437", "Swedish OEM"),
    cp!(0x16, "cp850", "Swedish OEM (secondary)"),
    cp!(0x17, "cp865", "Norwegian OEM"),
    cp!(0x18, "cp437", "Spanish OEM"),
    cp!(0x19, "cp437", "English OEM (Britain)"),
    cp!(0x1a, "cp850", "English OEM (Britain) (secondary)"),
    cp!(0x1b, "cp437", "English OEM (U.S.)"),
    cp!(0x1c, "cp863", "French OEM (Canada)"),
    cp!(0x1d, "cp850", "French OEM (secondary)"),
    cp!(0x1f, "cp852", "Czech OEM"),
    cp!(0x22, "cp852", "Hungarian OEM"),
    cp!(0x23, "cp852", "Polish OEM"),
    cp!(0x24, "cp860", "Portugese OEM"),
    cp!(0x25, "cp850", "Portugese OEM (secondary)"),
    cp!(0x26, "cp866", "Russian OEM", "ibm866"),
    cp!(0x37, "cp850", "English OEM (U.S.) (secondary)"),
    cp!(0x40, "cp852", "Romanian OEM"),
    cp!(0x4d, "cp936", "Chinese GBK (PRC)", "gbk"),
    cp!(0x4e, "cp949", "Korean (ANSI/OEM)", "euc-kr"),
    cp!(0x4f, "cp950", "Chinese Big 5 (Taiwan)", "big5"),
    cp!(0x50, "cp874", "Thai (ANSI/OEM)", "windows-874"),
    cp!(0x57, "cp1252", "ANSI", "windows-1252"),
    cp!(0x58, "cp1252", "Western European ANSI", "windows-1252"),
    cp!(0x59, "cp1252", "Spanish ANSI", "windows-1252"),
    cp!(0x64, "cp852", "Eastern European MS-DOS"),
    cp!(0x65, "cp866", "Russian MS-DOS", "ibm866"),
    cp!(0x66, "cp865", "Nordic MS-DOS"),
    cp!(0x67, "cp861", "Icelandic MS-DOS"),
    cp!(0x6a, "cp737", "Greek MS-DOS (437G)"),
    cp!(0x6b, "cp857", "Turkish MS-DOS"),
    cp!(0x78, "cp950", "Traditional Chinese (Hong Kong SAR, Taiwan) Windows", "big5"),
    cp!(0x79, "cp949", "Korean Windows", "euc-kr"),
    cp!(0x7a, "cp936", "Chinese Simplified (PRC, Singapore) Windows", "gbk"),
    cp!(0x7b, "cp932", "Japanese Windows", "shift_jis"),
    cp!(0x7c, "cp874", "Thai Windows", "windows-874"),
    cp!(0x7d, "cp1255", "Hebrew Windows", "windows-1255"),
    cp!(0x7e, "cp1256", "Arabic Windows", "windows-1256"),
    cp!(0x96, "mac_cyrillic", "Russian Macintosh", "x-mac-cyrillic"),
    cp!(0x97, "mac_latin2", "Macintosh EE"),
    cp!(0x98, "mac_greek", "Greek Macintosh"),
    cp!(0xc8, "cp1250", "Eastern European Windows", "windows-1250"),
    cp!(0xc9, "cp1251", "Russian Windows", "windows-1251"),
    cp!(0xca, "cp1254", "Turkish Windows", "windows-1254"),
    cp!(0xcb, "cp1253", "Greek Windows", "windows-1253"),
];

/// Look a codepage up by its header byte, failing fast with the
/// responsible byte value.
pub fn codepage_lookup(byte: u8) -> Result<&'static CodePage> {
    CODE_PAGES
        .iter()
        .find(|cp| cp.byte == byte)
        .ok_or_else(|| DbfError::Unsupported(format!("unsupported codepage: 0x{:02x}", byte)))
}

/// Look a codepage up by short name (`"cp1252"`).
pub fn codepage_by_name(name: &str) -> Result<&'static CodePage> {
    CODE_PAGES
        .iter()
        .find(|cp| cp.name == name)
        .ok_or_else(|| DbfError::Unsupported(format!("unsupported codepage: {}", name)))
}
