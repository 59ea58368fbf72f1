//! CSV, tab-delimited and fixed-width export.
//!
//! The CSV dialect is comma-delimited with double quotes, every
//! non-numeric value quoted, `\n` line terminators and initial
//! spaces skipped on the way in.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::field::Value;
use crate::list::RecordList;
use crate::table::Table;
use crate::{DbfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Tab,
    Fixed,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tab => "tab",
            ExportFormat::Fixed => "txt",
        }
    }
}

fn csv_field(value: &Value) -> String {
    if value.is_numeric() {
        value.to_string()
    } else {
        format!("\"{}\"", value.to_string().replace('"', "\"\""))
    }
}

impl Table {
    /// Write the table (or the given record list) out as CSV,
    /// tab-delimited or fixed-width text. The target name defaults
    /// to the table name with the format's extension; fixed-width
    /// additionally writes a `_layout.txt` companion. Returns the
    /// number of records written.
    pub fn export(
        &self,
        records: Option<&RecordList>,
        filename: Option<&Path>,
        fields: Option<&[&str]>,
        format: ExportFormat,
        header: bool,
    ) -> Result<usize> {
        let field_names: Vec<String> = match fields {
            Some(names) => {
                for name in names {
                    self.size_of(name)?;
                }
                names.iter().map(|n| n.to_string()).collect()
            }
            None => self.field_names(),
        };
        let base = match filename {
            Some(name) => name.to_path_buf(),
            None => self.path().ok_or_else(|| {
                DbfError::Invalid("exporting a memory table needs a filename".to_string())
            })?,
        };
        let path = match base.extension() {
            Some(ext) if !ext.eq_ignore_ascii_case("dbf") => base,
            _ => base.with_extension(format.extension()),
        };

        let mut out = BufWriter::new(File::create(&path)?);
        let written;
        match format {
            ExportFormat::Csv => {
                if header {
                    let names: Vec<String> =
                        field_names.iter().map(|n| format!("\"{}\"", n)).collect();
                    write!(out, "{}\n", names.join(","))?;
                }
                written = self.export_rows(records, &field_names, |values| {
                    let cells: Vec<String> = values.iter().map(csv_field).collect();
                    write!(out, "{}\n", cells.join(","))?;
                    Ok(())
                })?;
            }
            ExportFormat::Tab => {
                if header {
                    write!(out, "{}\n", field_names.join("\t"))?;
                }
                written = self.export_rows(records, &field_names, |values| {
                    let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                    write!(out, "{}\n", cells.join("\t"))?;
                    Ok(())
                })?;
            }
            ExportFormat::Fixed => {
                let sizes: Vec<usize> = field_names
                    .iter()
                    .map(|name| Ok(self.size_of(name)?.0))
                    .collect::<Result<_>>()?;
                let layout_path = layout_companion(&path);
                let mut layout = BufWriter::new(File::create(&layout_path)?);
                write!(layout, "{:<15}  Size\n", "Field Name")?;
                write!(layout, "{:<15}  ----\n", "-".repeat(15))?;
                for (name, size) in field_names.iter().zip(&sizes) {
                    write!(layout, "{:<15}  {:>3}\n", name, size)?;
                }
                written = self.export_rows(records, &field_names, |values| {
                    for (value, size) in values.iter().zip(&sizes) {
                        write!(out, "{:<width$}", value.to_string(), width = *size)?;
                    }
                    write!(out, "\n")?;
                    Ok(())
                })?;
                let mut layout = layout.into_inner().map_err(|e| e.into_error())?;
                write!(layout, "\nTotal Records in file: {}\n", written)?;
            }
        }
        out.flush()?;
        Ok(written)
    }

    fn export_rows<F>(
        &self,
        records: Option<&RecordList>,
        field_names: &[String],
        mut emit: F,
    ) -> Result<usize>
    where
        F: FnMut(&[Value]) -> Result<()>,
    {
        let mut written = 0;
        let mut handle = |record: crate::record::Record| -> Result<()> {
            let values: Vec<Value> = field_names
                .iter()
                .map(|name| record.get(name))
                .collect::<Result<_>>()?;
            emit(&values)?;
            written += 1;
            Ok(())
        };
        match records {
            Some(list) => {
                for record in list.iter() {
                    handle(record?)?;
                }
            }
            None => {
                for record in self.iter() {
                    handle(record?)?;
                }
            }
        }
        Ok(written)
    }
}

fn layout_companion(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    path.with_file_name(format!("{}_layout.txt", stem))
}
