//! Field types: the host [`Value`] enum, the per-type-code registry
//! of init/blank/decode/encode routines, field-spec parsing and the
//! 32-byte descriptor codec.
//!
//! ## Field descriptor layout
//! ---
//! | Byte offset | Description |
//! | --- | --- |
//! | 0 - 10 | Field name, upper-cased, NUL padded |
//! | 11 | Type code (`C N F L D M G P I B Y T 0`) |
//! | 12 - 15 | Offset of field in record, little-endian (VFP; computed elsewhere) |
//! | 16 | Length of field in bytes |
//! | 17 | Number of decimal places |
//! | 18 | Field flags |
//! | 19 - 31 | Reserved |

use std::cmp::Ordering;
use std::convert::TryInto;
use std::fmt;
use std::hash::{Hash, Hasher};

use encoding_rs::Encoding;

use crate::codec::{pack_name, pack_u32, unpack_name, unpack_u32, ByteOrder};
use crate::logical::Logical;
use crate::memo::MemoStore;
use crate::temporal::{Date, DateTime, Time};
use crate::{Dialect, DbfError, Result};


/// Offset between a proleptic-Gregorian day number and the Julian
/// day number Visual FoxPro stores in `T` fields.
pub const VFP_EPOCH: i64 = 1_721_425;

/// A decoded field value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Character(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    Logical(Logical),
    Date(Date),
    DateTime(DateTime),
    Currency(Currency),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_) | Value::Currency(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Character(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Currency(c) => Some(c.to_f64()),
            _ => None,
        }
    }

    pub fn as_logical(&self) -> Option<Logical> {
        match self {
            Value::Logical(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Logical(_) => 1,
            Value::Integer(_) | Value::Float(_) | Value::Currency(_) => 2,
            Value::Character(_) => 3,
            Value::Bytes(_) => 4,
            Value::Date(_) => 5,
            Value::DateTime(_) => 6,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Character(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Logical(l) => write!(f, "{}", l),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Currency(c) => write!(f, "{}", c),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Total order used by index keys: same-type values compare
    /// natively, numerics compare across representations, different
    /// types collate by rank.
    fn cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Currency(a), Value::Currency(b)) => a.cmp(b),
            (Value::Character(a), Value::Character(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Logical(a), Value::Logical(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Null, Value::Null) => Ordering::Equal,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Value::Null => {}
            Value::Character(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            // numerics hash through their common representation so
            // cross-type equality stays consistent
            Value::Integer(_) | Value::Float(_) | Value::Currency(_) => {
                state.write_u64(self.as_f64().unwrap_or(0.0).to_bits())
            }
            Value::Logical(l) => l.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Character(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Character(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Logical(b.into())
    }
}

impl From<Logical> for Value {
    fn from(l: Logical) -> Value {
        Value::Logical(l)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Value {
        Value::Date(d)
    }
}

impl From<DateTime> for Value {
    fn from(dt: DateTime) -> Value {
        Value::DateTime(dt)
    }
}

impl From<Currency> for Value {
    fn from(c: Currency) -> Value {
        Value::Currency(c)
    }
}

/// Fixed-precision currency: an `i64` count of 1/10000ths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(i64);

impl Currency {
    pub const SCALE: i64 = 10_000;

    pub fn from_scaled(raw: i64) -> Currency {
        Currency(raw)
    }

    pub fn scaled(&self) -> i64 {
        self.0
    }

    pub fn from_f64(value: f64) -> Result<Currency> {
        let scaled = value * Currency::SCALE as f64;
        if !scaled.is_finite() || scaled >= i64::MAX as f64 || scaled <= i64::MIN as f64 {
            return Err(DbfError::DataOverflow {
                message: "currency value is out of bounds".to_string(),
                data: value.to_string(),
            });
        }
        Ok(Currency(scaled as i64))
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / Currency::SCALE as f64
    }

    pub fn integral(&self) -> i64 {
        self.0 / Currency::SCALE
    }

    pub fn fractional(&self) -> i64 {
        (self.0 % Currency::SCALE).abs()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:04}", sign, self.integral().abs(), self.fractional())
    }
}

/// Host types decoded values are delivered in, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMap {
    pub text: TextKind,
    pub number: NumberKind,
    pub currency: CurrencyKind,
}

impl Default for TypeMap {
    fn default() -> TypeMap {
        TypeMap {
            text: TextKind::Unicode,
            number: NumberKind::Auto,
            currency: CurrencyKind::Fixed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// Decode through the table codepage into `String`.
    Unicode,
    /// Deliver the raw bytes (binary character columns).
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    /// `decimals == 0` reads as integer, otherwise as float.
    Auto,
    /// Always float.
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyKind {
    /// Fixed-precision [`Currency`].
    Fixed,
    /// Scaled down to `f64`.
    Float,
}

/// One field of the record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub kind: u8,
    /// Offset within the record, counting the delete flag at 0.
    pub start: usize,
    pub length: usize,
    pub decimals: usize,
    pub flags: u8,
}

impl FieldInfo {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Layout description suitable for re-creating the field,
    /// `name C(25)` style.
    pub fn layout(&self, dialect: Dialect) -> String {
        let kind = self.kind as char;
        if dialect.decimal_types().contains(&self.kind) {
            format!("{} {}({},{})", self.name, kind, self.length, self.decimals)
        } else if dialect.fixed_types().contains(&self.kind) {
            format!("{} {}", self.name, kind)
        } else {
            format!("{} {}({})", self.name, kind, self.length)
        }
    }
}

/// Encode a field descriptor into its 32-byte frame.
pub fn pack_descriptor(info: &FieldInfo) -> Result<[u8; 32]> {
    let mut frame = [0u8; 32];
    frame[..11].copy_from_slice(&pack_name(&info.name)?);
    frame[11] = info.kind;
    frame[12..16].copy_from_slice(&pack_u32(info.start as u64, ByteOrder::Little)?);
    frame[16] = info.length as u8;
    frame[17] = info.decimals as u8;
    frame[18] = info.flags;
    Ok(frame)
}

/// Decode a 32-byte descriptor frame. The returned `start` is the
/// stored offset; dBase III callers recompute it sequentially.
pub fn unpack_descriptor(frame: &[u8]) -> Result<FieldInfo> {
    if frame.len() != 32 {
        return Err(DbfError::Corrupt(format!(
            "field descriptor should be 32 bytes, but is {} bytes",
            frame.len()
        )));
    }
    Ok(FieldInfo {
        name: unpack_name(&frame[..11]),
        kind: frame[11],
        start: unpack_u32(&frame[12..16], ByteOrder::Little)? as usize,
        length: frame[16] as usize,
        decimals: frame[17] as usize,
        flags: frame[18],
    })
}

/// Field names: at most ten bytes, a leading letter, then letters,
/// digits and underscores; stored lower-cased.
pub fn validate_field_name(name: &str) -> Result<String> {
    let valid = name.len() <= 10
        && name.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(DbfError::Invalid(format!(
            "`{}` invalid: field names must start with a letter, be at most ten \
             characters, and can only contain letters, digits, and _",
            name
        )));
    }
    Ok(name.to_ascii_lowercase())
}

/// Parse one `name TYPE[(args)]` field specifier.
pub fn parse_field_spec(spec: &str, dialect: Dialect) -> Result<FieldInfo> {
    let mut parts = spec.split_whitespace();
    let (name, format) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(format), None) => (name, format),
        _ => {
            return Err(DbfError::Invalid(format!(
                "invalid field specifier: {} (multiple fields should be separated with ';')",
                spec
            )))
        }
    };
    let name = validate_field_name(name)?;
    let kind = format.as_bytes()[0].to_ascii_uppercase();
    let entry = dialect.entry(kind)?;
    let (length, decimals) = (entry.init)(format)?;
    Ok(FieldInfo { name, kind, start: 0, length, decimals, flags: 0 })
}

/// Parse a `;`-separated run of field specifiers.
pub fn parse_field_specs(specs: &str, dialect: Dialect) -> Result<Vec<FieldInfo>> {
    specs
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_field_spec(s, dialect))
        .collect()
}

/// Everything a decode/encode routine may need from its table: the
/// memo store (absent when memos are ignored), the codepage encoding
/// and the host-type configuration.
pub struct FieldCtx<'a> {
    pub memo: Option<&'a mut dyn MemoStore>,
    pub encoding: &'static Encoding,
    pub map: TypeMap,
}

impl<'a> FieldCtx<'a> {
    /// Block 0 and an ignored memo store both read as empty.
    fn get_memo(&mut self, block: u32) -> Result<Vec<u8>> {
        match self.memo.as_mut() {
            Some(memo) if block != 0 => memo.get(block),
            _ => Ok(Vec::new()),
        }
    }

    /// Empty payloads and an ignored memo store both store block 0.
    fn put_memo(&mut self, data: &[u8]) -> Result<u32> {
        match self.memo.as_mut() {
            Some(memo) if !data.is_empty() => memo.put(data),
            _ => Ok(0),
        }
    }
}

/// A registry entry: how to size a field from its spec, produce its
/// blank value, and convert between host values and record bytes.
pub struct TypeEntry {
    pub name: &'static str,
    pub init: fn(&str) -> Result<(usize, usize)>,
    pub blank: fn(&TypeMap) -> Value,
    pub decode: fn(&[u8], &FieldInfo, &mut FieldCtx) -> Result<Value>,
    pub encode: fn(&Value, &FieldInfo, &mut FieldCtx) -> Result<Vec<u8>>,
}

impl Dialect {
    /// Look the type code up in this dialect's registry.
    pub fn entry(&self, kind: u8) -> Result<&'static TypeEntry> {
        let entry = match (self, kind.to_ascii_uppercase()) {
            (_, b'C') => &CHARACTER,
            (_, b'L') => &LOGICAL,
            (_, b'D') => &DATE,
            (Dialect::Db3, b'N') => &NUMERIC_DB3,
            (Dialect::Db3, b'M') => &MEMO,
            (Dialect::Fp, b'N') | (Dialect::Vfp, b'N') => &NUMERIC,
            (Dialect::Fp, b'F') | (Dialect::Vfp, b'F') => &FLOAT,
            (Dialect::Fp, b'M') => &MEMO_FP,
            (Dialect::Fp, b'G') => &GENERAL_FP,
            (Dialect::Fp, b'P') => &PICTURE_FP,
            (Dialect::Vfp, b'M') => &MEMO_VFP,
            (Dialect::Vfp, b'G') => &GENERAL_VFP,
            (Dialect::Vfp, b'P') => &PICTURE_VFP,
            (Dialect::Vfp, b'Y') => &CURRENCY,
            (Dialect::Vfp, b'B') => &DOUBLE,
            (Dialect::Vfp, b'I') => &INTEGER,
            (Dialect::Vfp, b'T') => &DATETIME,
            (Dialect::Fp, b'0') | (Dialect::Vfp, b'0') => &NULL_FLAGS,
            _ => {
                return Err(DbfError::Unsupported(format!(
                    "unknown field type: {}",
                    kind as char
                )))
            }
        };
        Ok(entry)
    }

    /// Codes referencing memo blocks.
    pub fn memo_types(&self) -> &'static [u8] {
        match self {
            Dialect::Db3 => b"M",
            Dialect::Fp | Dialect::Vfp => b"GMP",
        }
    }

    /// Text-based numeric codes carrying a decimal count.
    pub fn decimal_types(&self) -> &'static [u8] {
        match self {
            Dialect::Db3 => b"N",
            Dialect::Fp | Dialect::Vfp => b"FN",
        }
    }

    /// Codes whose storage length never varies.
    pub fn fixed_types(&self) -> &'static [u8] {
        match self {
            Dialect::Db3 => b"DLM",
            Dialect::Fp | Dialect::Vfp => b"BDGILMPTY",
        }
    }
}

static CHARACTER: TypeEntry = TypeEntry {
    name: "Character",
    init: init_character,
    blank: blank_character,
    decode: decode_character,
    encode: encode_character,
};

static NUMERIC_DB3: TypeEntry = TypeEntry {
    name: "Numeric",
    init: init_numeric_db3,
    blank: blank_integer,
    decode: decode_numeric,
    encode: encode_numeric,
};

static NUMERIC: TypeEntry = TypeEntry {
    name: "Numeric",
    init: init_numeric,
    blank: blank_integer,
    decode: decode_numeric,
    encode: encode_numeric,
};

static FLOAT: TypeEntry = TypeEntry {
    name: "Float",
    init: init_numeric,
    blank: blank_float,
    decode: decode_numeric,
    encode: encode_numeric,
};

static LOGICAL: TypeEntry = TypeEntry {
    name: "Logical",
    init: init_logical,
    blank: blank_logical,
    decode: decode_logical,
    encode: encode_logical,
};

static DATE: TypeEntry = TypeEntry {
    name: "Date",
    init: init_date,
    blank: blank_date,
    decode: decode_date,
    encode: encode_date,
};

static MEMO: TypeEntry = TypeEntry {
    name: "Memo",
    init: init_memo,
    blank: blank_memo,
    decode: decode_memo,
    encode: encode_memo,
};

static MEMO_FP: TypeEntry = TypeEntry {
    name: "Memo",
    init: init_memo,
    blank: blank_memo,
    decode: decode_memo,
    encode: encode_memo,
};

static GENERAL_FP: TypeEntry = TypeEntry {
    name: "General",
    init: init_memo,
    blank: blank_memo,
    decode: decode_memo,
    encode: encode_memo,
};

static PICTURE_FP: TypeEntry = TypeEntry {
    name: "Picture",
    init: init_memo,
    blank: blank_memo,
    decode: decode_memo,
    encode: encode_memo,
};

static MEMO_VFP: TypeEntry = TypeEntry {
    name: "Memo",
    init: init_memo_vfp,
    blank: blank_memo,
    decode: decode_memo_vfp,
    encode: encode_memo_vfp,
};

static GENERAL_VFP: TypeEntry = TypeEntry {
    name: "General",
    init: init_memo_vfp,
    blank: blank_memo,
    decode: decode_memo_vfp,
    encode: encode_memo_vfp,
};

static PICTURE_VFP: TypeEntry = TypeEntry {
    name: "Picture",
    init: init_memo_vfp,
    blank: blank_memo,
    decode: decode_memo_vfp,
    encode: encode_memo_vfp,
};

static CURRENCY: TypeEntry = TypeEntry {
    name: "Currency",
    init: init_currency,
    blank: blank_currency,
    decode: decode_currency,
    encode: encode_currency,
};

static DOUBLE: TypeEntry = TypeEntry {
    name: "Double",
    init: init_double,
    blank: blank_float,
    decode: decode_double,
    encode: encode_double,
};

static INTEGER: TypeEntry = TypeEntry {
    name: "Integer",
    init: init_integer,
    blank: blank_integer,
    decode: decode_integer,
    encode: encode_integer,
};

static DATETIME: TypeEntry = TypeEntry {
    name: "DateTime",
    init: init_datetime,
    blank: blank_datetime,
    decode: decode_datetime,
    encode: encode_datetime,
};

static NULL_FLAGS: TypeEntry = TypeEntry {
    name: "_NullFlags",
    init: init_unsupported,
    blank: blank_character,
    decode: decode_unsupported,
    encode: encode_unsupported,
};

fn spec_args<'a>(format: &'a str, shape: &str) -> Result<&'a str> {
    if format.len() >= 3 && format[1..].starts_with('(') && format.ends_with(')') {
        Ok(&format[2..format.len() - 1])
    } else {
        Err(DbfError::Invalid(format!(
            "format for field creation is {}, not {}",
            shape, format
        )))
    }
}

fn init_character(format: &str) -> Result<(usize, usize)> {
    let args = spec_args(format, "C(n)")?;
    let length: usize = args
        .trim()
        .parse()
        .map_err(|_| DbfError::Invalid(format!("invalid Character length: {}", args)))?;
    if !(1..=254).contains(&length) {
        return Err(DbfError::Invalid(format!(
            "Character fields hold 1..=254 bytes, not {}",
            length
        )));
    }
    Ok((length, 0))
}

fn init_numeric_bounded(format: &str, max_length: usize) -> Result<(usize, usize)> {
    let args = spec_args(format, "N(n,n)")?;
    let mut split = args.splitn(2, ',');
    let length: usize = split
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| DbfError::Invalid(format!("invalid Numeric length: {}", args)))?;
    let decimals: usize = match split.next() {
        Some(part) => part
            .trim()
            .parse()
            .map_err(|_| DbfError::Invalid(format!("invalid Numeric decimals: {}", args)))?,
        None => 0,
    };
    if !(1..=max_length).contains(&length) {
        return Err(DbfError::Invalid(format!(
            "Numeric fields hold 1..={} digits, not {}",
            max_length, length
        )));
    }
    if decimals != 0 && !(1..=length.saturating_sub(2)).contains(&decimals) {
        return Err(DbfError::Invalid(format!(
            "Numeric decimals must leave room for the point, not {}",
            decimals
        )));
    }
    Ok((length, decimals))
}

fn init_numeric_db3(format: &str) -> Result<(usize, usize)> {
    init_numeric_bounded(format, 17)
}

fn init_numeric(format: &str) -> Result<(usize, usize)> {
    init_numeric_bounded(format, 20)
}

fn init_logical(_format: &str) -> Result<(usize, usize)> {
    Ok((1, 0))
}

fn init_date(_format: &str) -> Result<(usize, usize)> {
    Ok((8, 0))
}

fn init_memo(_format: &str) -> Result<(usize, usize)> {
    Ok((10, 0))
}

fn init_memo_vfp(_format: &str) -> Result<(usize, usize)> {
    Ok((4, 0))
}

fn init_currency(_format: &str) -> Result<(usize, usize)> {
    Ok((8, 0))
}

fn init_double(_format: &str) -> Result<(usize, usize)> {
    Ok((8, 0))
}

fn init_integer(_format: &str) -> Result<(usize, usize)> {
    Ok((4, 0))
}

fn init_datetime(_format: &str) -> Result<(usize, usize)> {
    Ok((8, 8))
}

fn init_unsupported(_format: &str) -> Result<(usize, usize)> {
    Err(DbfError::Unsupported("field type is not supported".to_string()))
}

fn blank_character(_map: &TypeMap) -> Value {
    Value::Character(String::new())
}

fn blank_integer(_map: &TypeMap) -> Value {
    Value::Integer(0)
}

fn blank_float(_map: &TypeMap) -> Value {
    Value::Float(0.0)
}

fn blank_logical(_map: &TypeMap) -> Value {
    Value::Logical(Logical::False)
}

fn blank_date(_map: &TypeMap) -> Value {
    Value::Date(Date::today())
}

fn blank_memo(_map: &TypeMap) -> Value {
    Value::Character(String::new())
}

fn blank_currency(_map: &TypeMap) -> Value {
    Value::Currency(Currency::from_scaled(0))
}

fn blank_datetime(_map: &TypeMap) -> Value {
    Value::DateTime(DateTime::now())
}

fn trim_trailing(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0))
        .map(|p| p + 1)
        .unwrap_or(0);
    &data[..end]
}

fn decode_text(ctx: &FieldCtx, bytes: &[u8]) -> String {
    ctx.encoding.decode_without_bom_handling(bytes).0.into_owned()
}

fn encode_text(ctx: &FieldCtx, text: &str) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = ctx.encoding.encode(text);
    if had_errors {
        return Err(DbfError::NonUnicode(text.to_string()));
    }
    Ok(bytes.into_owned())
}

/// Pad to the descriptor length, rejecting anything longer.
fn fit(mut bytes: Vec<u8>, info: &FieldInfo) -> Result<Vec<u8>> {
    if bytes.len() > info.length {
        return Err(DbfError::DataOverflow {
            message: format!(
                "tried to store {} bytes in {} byte field",
                bytes.len(),
                info.length
            ),
            data: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    bytes.resize(info.length, b' ');
    Ok(bytes)
}

fn incompatible(value: &Value, entry: &str) -> DbfError {
    DbfError::Invalid(format!("incompatible type for {} field: {:?}", entry, value))
}

fn decode_character(raw: &[u8], _info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Value> {
    let trimmed = trim_trailing(raw);
    Ok(match ctx.map.text {
        TextKind::Unicode => Value::Character(decode_text(ctx, trimmed)),
        TextKind::Bytes => Value::Bytes(trimmed.to_vec()),
    })
}

fn encode_character(value: &Value, info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let bytes = match value {
        Value::Null => Vec::new(),
        Value::Bytes(b) => trim_trailing(b).to_vec(),
        Value::Character(s) => encode_text(ctx, s.trim_end())?,
        other => encode_text(ctx, &other.to_string())?,
    };
    fit(bytes, info)
}

fn decode_numeric(raw: &[u8], info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Value> {
    // a leading '*' is the Visual FoxPro "unrepresentable" sentinel
    if raw.first() == Some(&b'*') {
        return Ok(Value::Null);
    }
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let text = if text.is_empty() { "0" } else { text };
    if ctx.map.number == NumberKind::Auto && info.decimals == 0 {
        text.parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| DbfError::Corrupt(format!("invalid numeric data: {:?}", text)))
    } else {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| DbfError::Corrupt(format!("invalid numeric data: {:?}", text)))
    }
}

fn numeric_value(value: &Value, entry: &str) -> Result<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Currency(c) => Ok(c.to_f64()),
        Value::Character(s) => s
            .trim()
            .parse()
            .map_err(|_| incompatible(value, entry)),
        _ => Err(incompatible(value, entry)),
    }
}

fn encode_numeric(value: &Value, info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let number = numeric_value(value, "Numeric")?;
    let point = if info.decimals > 0 { info.decimals + 1 } else { 0 };
    let max_integer = info.length.saturating_sub(point);
    let integer_digits = format!("{:.0}", number.floor()).len();
    if integer_digits > max_integer {
        return Err(DbfError::DataOverflow {
            message: "integer portion too big".to_string(),
            data: number.to_string(),
        });
    }
    let text = format!("{:>width$.prec$}", number, width = info.length, prec = info.decimals);
    fit(text.into_bytes(), info)
}

fn decode_logical(raw: &[u8], _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Value> {
    Ok(Value::Logical(match raw.first() {
        Some(b'?') => Logical::Unknown,
        Some(b't') | Some(b'T') | Some(b'y') | Some(b'Y') => Logical::True,
        _ => Logical::False,
    }))
}

fn encode_logical(value: &Value, info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let logical = match value {
        Value::Logical(l) => *l,
        Value::Null => Logical::Unknown,
        Value::Character(s) => s.parse()?,
        Value::Integer(i) => Logical::from(*i != 0),
        _ => return Err(incompatible(value, "Logical")),
    };
    fit(vec![logical.byte()], info)
}

fn decode_date(raw: &[u8], _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Value> {
    Ok(Value::Date(Date::from_ymd(&String::from_utf8_lossy(raw))?))
}

fn encode_date(value: &Value, info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let date = match value {
        Value::Date(d) => *d,
        Value::DateTime(dt) => dt.date(),
        Value::Null => Date::empty(),
        Value::Character(s) => Date::from_ymd(s)?,
        _ => return Err(incompatible(value, "Date")),
    };
    fit(date.ymd().into_bytes(), info)
}

fn memo_payload(value: &Value, ctx: &mut FieldCtx, entry: &str) -> Result<Vec<u8>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Bytes(b) => Ok(b.clone()),
        Value::Character(s) => encode_text(ctx, s),
        Value::Integer(_) | Value::Float(_) | Value::Currency(_) => {
            encode_text(ctx, &value.to_string())
        }
        _ => Err(incompatible(value, entry)),
    }
}

fn memo_content(block: u32, ctx: &mut FieldCtx) -> Result<Value> {
    let content = ctx.get_memo(block)?;
    Ok(match ctx.map.text {
        TextKind::Unicode => Value::Character(decode_text(ctx, &content)),
        TextKind::Bytes => Value::Bytes(content),
    })
}

fn decode_memo(raw: &[u8], _info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Value> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let block = if text.is_empty() {
        0
    } else {
        text.parse::<u32>()
            .map_err(|_| DbfError::Corrupt(format!("invalid memo block reference: {:?}", text)))?
    };
    memo_content(block, ctx)
}

fn encode_memo(value: &Value, info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let payload = memo_payload(value, ctx, "Memo")?;
    let block = ctx.put_memo(&payload)?;
    let text = if block == 0 { String::new() } else { block.to_string() };
    fit(format!("{:>width$}", text, width = info.length).into_bytes(), info)
}

fn decode_memo_vfp(raw: &[u8], _info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Value> {
    let block = unpack_u32(raw, ByteOrder::Little)?;
    memo_content(block, ctx)
}

fn encode_memo_vfp(value: &Value, _info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let payload = memo_payload(value, ctx, "Memo")?;
    let block = ctx.put_memo(&payload)?;
    Ok(pack_u32(block as u64, ByteOrder::Little)?.to_vec())
}

fn decode_integer(raw: &[u8], _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Value> {
    let frame: [u8; 4] = raw
        .try_into()
        .map_err(|_| DbfError::Corrupt(format!("expected 4 bytes, found {}", raw.len())))?;
    Ok(Value::Integer(i32::from_le_bytes(frame) as i64))
}

fn encode_integer(value: &Value, _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let number = match value {
        Value::Integer(i) => *i,
        Value::Float(f) => *f as i64,
        Value::Character(s) => s.trim().parse().map_err(|_| incompatible(value, "Integer"))?,
        _ => return Err(incompatible(value, "Integer")),
    };
    if !(i32::MIN as i64..=i32::MAX as i64).contains(&number) {
        return Err(DbfError::DataOverflow {
            message: "integer size exceeded, possible: -2,147,483,648..+2,147,483,647".to_string(),
            data: number.to_string(),
        });
    }
    Ok((number as i32).to_le_bytes().to_vec())
}

fn decode_double(raw: &[u8], _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Value> {
    let frame: [u8; 8] = raw
        .try_into()
        .map_err(|_| DbfError::Corrupt(format!("expected 8 bytes, found {}", raw.len())))?;
    Ok(Value::Float(f64::from_le_bytes(frame)))
}

fn encode_double(value: &Value, _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    Ok(numeric_value(value, "Double")?.to_le_bytes().to_vec())
}

fn decode_currency(raw: &[u8], _info: &FieldInfo, ctx: &mut FieldCtx) -> Result<Value> {
    let frame: [u8; 8] = raw
        .try_into()
        .map_err(|_| DbfError::Corrupt(format!("expected 8 bytes, found {}", raw.len())))?;
    let currency = Currency::from_scaled(i64::from_le_bytes(frame));
    Ok(match ctx.map.currency {
        CurrencyKind::Fixed => Value::Currency(currency),
        CurrencyKind::Float => Value::Float(currency.to_f64()),
    })
}

fn encode_currency(value: &Value, _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let currency = match value {
        Value::Currency(c) => *c,
        Value::Integer(i) => Currency::from_f64(*i as f64)?,
        Value::Float(f) => Currency::from_f64(*f)?,
        Value::Character(s) => {
            let number: f64 = s.trim().parse().map_err(|_| incompatible(value, "Currency"))?;
            Currency::from_f64(number)?
        }
        _ => return Err(incompatible(value, "Currency")),
    };
    Ok(currency.scaled().to_le_bytes().to_vec())
}

fn decode_datetime(raw: &[u8], _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Value> {
    if raw.len() != 8 {
        return Err(DbfError::Corrupt(format!("expected 8 bytes, found {}", raw.len())));
    }
    let julian = unpack_u32(&raw[..4], ByteOrder::Little)? as i64;
    let milliseconds = unpack_u32(&raw[4..8], ByteOrder::Little)?;
    let date = Date::from_ordinal((julian - VFP_EPOCH).max(0) as i32);
    let microseconds = (milliseconds % 1_000) * 1_000;
    let seconds = milliseconds / 1_000;
    let time = Time::new((seconds / 3_600) % 24, (seconds / 60) % 60, seconds % 60, microseconds)?;
    Ok(Value::DateTime(DateTime::combine(date, time)))
}

fn encode_datetime(value: &Value, _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    let moment = match value {
        Value::DateTime(dt) => *dt,
        Value::Date(d) => DateTime::combine(*d, Time::new(0, 0, 0, 0)?),
        Value::Null => DateTime::empty(),
        _ => return Err(incompatible(value, "DateTime")),
    };
    if moment.is_empty() {
        return Ok(vec![0u8; 8]);
    }
    let julian = (moment.date().ordinal()? as i64 + VFP_EPOCH) as u64;
    let milliseconds = (moment.hour()? * 3_600 + moment.minute()? * 60 + moment.second()?) as u64
        * 1_000
        + (moment.microsecond()? / 1_000) as u64;
    let mut bytes = Vec::with_capacity(8);
    bytes.extend_from_slice(&pack_u32(julian, ByteOrder::Little)?);
    bytes.extend_from_slice(&pack_u32(milliseconds, ByteOrder::Little)?);
    Ok(bytes)
}

fn decode_unsupported(_raw: &[u8], _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Value> {
    Err(DbfError::Unsupported("field type is not supported".to_string()))
}

fn encode_unsupported(_value: &Value, _info: &FieldInfo, _ctx: &mut FieldCtx) -> Result<Vec<u8>> {
    Err(DbfError::Unsupported("field type is not supported".to_string()))
}
