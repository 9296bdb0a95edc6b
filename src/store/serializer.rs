//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! PDF specification ISO 32000-1:2008, Section 7.3.

use crate::object::{Dict, Object, ObjectRef};
use std::io::Write;

/// Serializer for PDF objects.
///
/// Converts PDF Object types to their byte representation following
/// the PDF specification syntax rules. Dictionaries are written one entry per
/// line with keys in sorted order, so output is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Create a new object serializer.
    pub fn new() -> Self {
        Self
    }

    /// Write an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn write_indirect<W: Write>(
        &self,
        w: &mut W,
        obj_ref: ObjectRef,
        obj: &Object,
    ) -> std::io::Result<()> {
        writeln!(w, "{} {} obj", obj_ref.id, obj_ref.gen)?;
        self.write_object(w, obj)?;
        write!(w, "\nendobj\n")
    }

    /// Write an object to a buffer.
    pub fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    /// Write a real number with appropriate precision.
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if value.fract() == 0.0 {
            write!(w, "{}", value as i64)
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }

    /// Write a PDF string.
    ///
    /// Uses literal string syntax `(...)` with proper escaping,
    /// or hex string syntax `<...>` for binary data.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> std::io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Write a PDF name.
    ///
    /// Names start with `/` and escape delimiters, whitespace and `#` as `#xx`.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for byte in name.bytes() {
            match byte {
                b'!'
                | b'"'
                | b'$'
                | b'&'
                | b'\''
                | b'*'..=b'.'
                | b'0'..=b'9'
                | b':'
                | b';'
                | b'='
                | b'?'
                | b'@'
                | b'A'..=b'Z'
                | b'\\'
                | b'^'..=b'z'
                | b'|'
                | b'~' => {
                    w.write_all(&[byte])?;
                },
                _ => {
                    write!(w, "#{:02X}", byte)?;
                },
            }
        }
        Ok(())
    }

    /// Write a PDF array.
    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object]) -> std::io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj)?;
        }
        write!(w, "]")
    }

    /// Write a PDF dictionary.
    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dict) -> std::io::Result<()> {
        write!(w, "<<")?;

        // Sort keys for deterministic output
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(value) = dict.get(key) {
                write!(w, "\n  ")?;
                self.write_name(w, key)?;
                write!(w, " ")?;
                self.write_object(w, value)?;
            }
        }

        if !dict.is_empty() {
            writeln!(w)?;
        }
        write!(w, ">>")
    }
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Name object.
    pub fn name(s: &str) -> Object {
        Object::Name(s.to_string())
    }

    /// Create a String object from a Rust string.
    ///
    /// Non-ASCII text is encoded as UTF-16BE with a byte order mark.
    pub fn text(s: &str) -> Object {
        if s.is_ascii() {
            Object::String(s.as_bytes().to_vec())
        } else {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in s.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            Object::String(bytes)
        }
    }

    /// Create an Integer object.
    pub fn integer(i: i64) -> Object {
        Object::Integer(i)
    }

    /// Create a Boolean object.
    pub fn boolean(b: bool) -> Object {
        Object::Boolean(b)
    }

    /// Create an Array object.
    pub fn array(items: Vec<Object>) -> Object {
        Object::Array(items)
    }

    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        let map: Dict = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Object::Dictionary(map)
    }

    /// Create a Reference object.
    pub fn reference(r: ObjectRef) -> Object {
        Object::Reference(r)
    }

    /// Create a rectangle array [x, y, width, height] -> [llx, lly, urx, ury].
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Object {
        Object::Array(vec![
            Object::Real(x),
            Object::Real(y),
            Object::Real(x + width),
            Object::Real(y + height),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(obj: &Object) -> String {
        let mut buf = Vec::new();
        ObjectSerializer::new().write_object(&mut buf, obj).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_serialize_scalars() {
        assert_eq!(render(&Object::Null), "null");
        assert_eq!(render(&Object::Boolean(true)), "true");
        assert_eq!(render(&Object::Integer(-123)), "-123");
        assert_eq!(render(&Object::Real(1.0)), "1");
        assert_eq!(render(&Object::Real(0.5)), "0.5");
    }

    #[test]
    fn test_serialize_string() {
        assert_eq!(render(&Object::String(b"en-US".to_vec())), "(en-US)");
        assert_eq!(
            render(&Object::String(b"Test (parens)".to_vec())),
            "(Test \\(parens\\))"
        );
        assert_eq!(render(&Object::String(vec![0xFE, 0xFF, 0x00])), "<FEFF00>");
    }

    #[test]
    fn test_serialize_name_with_special_chars() {
        assert_eq!(render(&ObjectSerializer::name("OBJR")), "/OBJR");
        assert_eq!(render(&ObjectSerializer::name("My Role")), "/My#20Role");
        assert_eq!(render(&ObjectSerializer::name("A#B")), "/A#23B");
        assert_eq!(render(&ObjectSerializer::name("A/B")), "/A#2FB");
        assert_eq!(render(&ObjectSerializer::name("50%")), "/50#25");
    }

    #[test]
    fn test_serialize_array() {
        let arr = Object::Array(vec![
            Object::Integer(0),
            ObjectSerializer::reference(ObjectRef::new(7, 0)),
        ]);
        assert_eq!(render(&arr), "[0 7 0 R]");
    }

    #[test]
    fn test_serialize_dictionary_sorted() {
        let dict = ObjectSerializer::dict(vec![
            ("Type", ObjectSerializer::name("OBJR")),
            ("Obj", ObjectSerializer::reference(ObjectRef::new(12, 0))),
        ]);
        assert_eq!(render(&dict), "<<\n  /Obj 12 0 R\n  /Type /OBJR\n>>");
        assert_eq!(render(&ObjectSerializer::dict(vec![])), "<<>>");
    }

    #[test]
    fn test_write_indirect() {
        let s = ObjectSerializer::new();
        let mut buf = Vec::new();
        s.write_indirect(&mut buf, ObjectRef::new(1, 0), &Object::Integer(42))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&buf), "1 0 obj\n42\nendobj\n");
    }

    #[test]
    fn test_text_helper_utf16() {
        assert_eq!(ObjectSerializer::text("en"), Object::String(b"en".to_vec()));
        let obj = ObjectSerializer::text("é");
        assert_eq!(obj, Object::String(vec![0xFE, 0xFF, 0x00, 0xE9]));
        assert_eq!(obj.as_text().as_deref(), Some("é"));
    }

    #[test]
    fn test_rect_helper() {
        let rect = ObjectSerializer::rect(100.0, 600.0, 200.0, 50.0);
        assert_eq!(render(&rect), "[100 600 300 650]");
    }
}
