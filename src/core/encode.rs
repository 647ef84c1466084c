/// Delimited-text encoding for the relational store's bulk loader.
///
/// Cell rules:
/// - `Null` is an empty cell; an empty string is `""`, so the two stay distinct.
/// - JSON values become one compact JSON document.
/// - Scalar lists become array literals `{a,b,c}`.
/// - A cell holding the delimiter, a quote, CR or LF is quoted, with
///   embedded quotes doubled.
///
/// Records end with `\n`.

use serde_json::Value;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has {got} cells, header has {expected}")]
    Arity { expected: usize, got: usize },
}

/// One typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    Array(Vec<Option<String>>),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, Self::text)
    }

    pub fn opt_int(value: Option<u32>) -> Self {
        value.map_or(Self::Null, |v| Self::Int(i64::from(v)))
    }

    pub fn opt_float(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Float)
    }

    pub fn opt_json(value: Option<Value>) -> Self {
        value.map_or(Self::Null, Self::Json)
    }

    pub fn array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(items.into_iter().map(|s| Some(s.into())).collect())
    }

    /// The cell's value before delimiter quoting.
    fn raw(&self) -> Result<Option<String>, EncodeError> {
        Ok(match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(x) => Some(format_float(*x)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Json(v) => Some(serde_json::to_string(v)?),
            Self::Array(items) => Some(array_literal(items)),
        })
    }

    /// The cell as it appears in a record.
    pub fn render(&self, delimiter: char) -> Result<String, EncodeError> {
        Ok(match self.raw()? {
            None => String::new(),
            Some(s) if s.is_empty() => "\"\"".to_string(),
            Some(s) => quote(&s, delimiter),
        })
    }
}

/// Whole floats keep one decimal place so the column reads as numeric.
fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        x.to_string()
    }
}

fn quote(s: &str, delimiter: char) -> String {
    let needs = s.contains(delimiter) || s.contains(['"', '\r', '\n']);
    if needs {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn array_element(item: &Option<String>) -> String {
    match item {
        None => "NULL".to_string(),
        Some(s) if s.is_empty() => "\"\"".to_string(),
        Some(s) if s.eq_ignore_ascii_case("null") => format!("\"{s}\""),
        Some(s) => {
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                if matches!(c, '\\' | ',' | '{' | '}' | '"') {
                    out.push('\\');
                }
                out.push(c);
            }
            out
        }
    }
}

/// `{a,b,c}` array literal.
pub fn array_literal(items: &[Option<String>]) -> String {
    let inner: Vec<String> = items.iter().map(array_element).collect();
    format!("{{{}}}", inner.join(","))
}

/// Streaming table writer: one header line, then records.
pub struct TableWriter<W: Write> {
    inner: W,
    delimiter: char,
    columns: usize,
    records: usize,
}

impl<W: Write> TableWriter<W> {
    pub fn new(mut inner: W, header: &[&str], delimiter: char) -> Result<Self, EncodeError> {
        let line: Vec<String> = header.iter().map(|h| quote(h, delimiter)).collect();
        writeln!(inner, "{}", line.join(&delimiter.to_string()))?;
        Ok(Self {
            inner,
            delimiter,
            columns: header.len(),
            records: 0,
        })
    }

    pub fn write_record(&mut self, cells: &[Cell]) -> Result<(), EncodeError> {
        if cells.len() != self.columns {
            return Err(EncodeError::Arity {
                expected: self.columns,
                got: cells.len(),
            });
        }
        let rendered = cells
            .iter()
            .map(|c| c.render(self.delimiter))
            .collect::<Result<Vec<_>, _>>()?;
        writeln!(self.inner, "{}", rendered.join(&self.delimiter.to_string()))?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(mut self) -> Result<W, EncodeError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(cell: Cell) -> String {
        cell.render(',').unwrap()
    }

    #[test]
    fn tags_array_literal() {
        let tags = Cell::array(["brainrot", "italian", "memes"]);
        assert_eq!(tags.raw().unwrap().unwrap(), "{brainrot,italian,memes}");
        // The literal contains the delimiter, so the record quotes it.
        assert_eq!(render(tags), "\"{brainrot,italian,memes}\"");
    }

    #[test]
    fn array_element_escapes() {
        let items = vec![
            None,
            Some(String::new()),
            Some("null".to_string()),
            Some("a,b".to_string()),
            Some("{x}".to_string()),
            Some("say \"hi\"".to_string()),
            Some("back\\slash".to_string()),
        ];
        assert_eq!(
            array_literal(&items),
            r#"{NULL,"","null",a\,b,\{x\},say \"hi\",back\\slash}"#
        );
        assert_eq!(array_literal(&[]), "{}");
    }

    #[test]
    fn null_and_empty_differ() {
        assert_eq!(render(Cell::Null), "");
        assert_eq!(render(Cell::text("")), "\"\"");
    }

    #[test]
    fn scalar_cells() {
        assert_eq!(render(Cell::Bool(true)), "true");
        assert_eq!(render(Cell::Bool(false)), "false");
        assert_eq!(render(Cell::Int(42)), "42");
        assert_eq!(render(Cell::Float(0.35)), "0.35");
        assert_eq!(render(Cell::Float(1.0)), "1.0");
        assert_eq!(render(Cell::opt_int(None)), "");
    }

    #[test]
    fn json_cell_is_compact_and_quoted() {
        let cell = Cell::Json(json!({"tier": 2, "glow": true}));
        assert_eq!(render(cell), r#""{""glow"":true,""tier"":2}""#);
    }

    #[test]
    fn text_quoting() {
        assert_eq!(render(Cell::text("plain")), "plain");
        assert_eq!(render(Cell::text("a,b")), "\"a,b\"");
        assert_eq!(render(Cell::text("line\nbreak")), "\"line\nbreak\"");
        assert_eq!(render(Cell::text("cr\rhere")), "\"cr\rhere\"");
        assert_eq!(render(Cell::text("a;b")), "a;b");
        assert_eq!(Cell::text("a;b").render(';').unwrap(), "\"a;b\"");
    }

    #[test]
    fn writer_checks_arity_and_terminates_records() {
        let mut writer = TableWriter::new(Vec::new(), &["id", "tags"], ',').unwrap();
        writer
            .write_record(&[Cell::text("BC_001"), Cell::array(["x"])])
            .unwrap();
        assert!(matches!(
            writer.write_record(&[Cell::Null]),
            Err(EncodeError::Arity { expected: 2, got: 1 })
        ));
        assert_eq!(writer.records(), 1);
        let bytes = writer.finish().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "id,tags\nBC_001,{x}\n");
    }
}
