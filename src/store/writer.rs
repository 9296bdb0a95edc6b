//! PDF document writer.
//!
//! Assembles complete PDF files with proper structure:
//! header, body, xref table, and trailer (ISO 32000-1:2008, Section 7.5).

use super::ObjectSerializer;
use crate::error::Result;
use crate::object::{Object, ObjectRef};
use std::io::Write;

/// Writes an indirect object table as a complete PDF file.
#[derive(Debug, Clone)]
pub struct DocumentWriter {
    version: String,
    serializer: ObjectSerializer,
}

impl DocumentWriter {
    /// Create a writer for the given PDF version (e.g., "1.7").
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            serializer: ObjectSerializer::new(),
        }
    }

    /// Write the file.
    ///
    /// `objects` must be in ascending object number order. `size` is one past
    /// the highest object number; numbers without an object become free xref
    /// entries.
    pub fn write<'a>(
        &self,
        w: &mut dyn Write,
        objects: impl Iterator<Item = (ObjectRef, &'a Object)>,
        size: u32,
        root: ObjectRef,
    ) -> Result<()> {
        let mut output = Vec::new();
        let mut xref_offsets: Vec<(u32, usize)> = Vec::new();

        // PDF Header
        writeln!(output, "%PDF-{}", self.version)?;
        // Binary marker (recommended for binary content)
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        for (obj_ref, obj) in objects {
            xref_offsets.push((obj_ref.id, output.len()));
            self.serializer.write_indirect(&mut output, obj_ref, obj)?;
        }

        // Write xref table
        let xref_start = output.len();
        writeln!(output, "xref")?;
        writeln!(output, "0 {}", size)?;
        writeln!(output, "0000000000 65535 f ")?;

        let mut entries = xref_offsets.iter().peekable();
        for id in 1..size {
            match entries.peek() {
                Some((entry_id, offset)) if *entry_id == id => {
                    writeln!(output, "{:010} 00000 n ", offset)?;
                    entries.next();
                },
                _ => writeln!(output, "0000000000 00001 f ")?,
            }
        }

        let trailer = ObjectSerializer::dict(vec![
            ("Size", ObjectSerializer::integer(size as i64)),
            ("Root", ObjectSerializer::reference(root)),
        ]);

        writeln!(output, "trailer")?;
        self.serializer.write_object(&mut output, &trailer)?;
        writeln!(output)?;
        writeln!(output, "startxref")?;
        writeln!(output, "{}", xref_start)?;
        write!(output, "%%EOF")?;

        w.write_all(&output)?;
        log::trace!("Wrote {} bytes ({} objects)", output.len(), xref_offsets.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_objects(objects: &[(ObjectRef, Object)], size: u32) -> String {
        let writer = DocumentWriter::new("1.7");
        let mut out = Vec::new();
        writer
            .write(
                &mut out,
                objects.iter().map(|(r, o)| (*r, o)),
                size,
                ObjectRef::new(1, 0),
            )
            .unwrap();
        String::from_utf8_lossy(&out).to_string()
    }

    #[test]
    fn test_header_and_trailer() {
        let content = write_objects(&[(ObjectRef::new(1, 0), Object::Integer(1))], 2);
        assert!(content.starts_with("%PDF-1.7\n"));
        assert!(content.contains("1 0 obj\n1\nendobj\n"));
        assert!(content.contains("/Root 1 0 R"));
        assert!(content.contains("/Size 2"));
        assert!(content.ends_with("%%EOF"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let objects = vec![
            (ObjectRef::new(1, 0), Object::Integer(10)),
            (ObjectRef::new(2, 0), Object::Name("X".into())),
        ];
        let content = write_objects(&objects, 3);

        let xref_pos = content.find("xref\n").unwrap();
        let lines: Vec<&str> = content[xref_pos..].lines().collect();
        assert_eq!(lines[1], "0 3");
        let second_offset: usize = lines[4][..10].parse().unwrap();
        assert!(content[second_offset..].starts_with("2 0 obj"));

        let startxref = content.rfind("startxref\n").unwrap();
        let declared: usize = content[startxref + 10..]
            .lines()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, xref_pos);
    }

    #[test]
    fn test_gaps_become_free_entries() {
        let objects = vec![(ObjectRef::new(1, 0), Object::Null), (ObjectRef::new(3, 0), Object::Null)];
        let content = write_objects(&objects, 4);
        let xref_pos = content.find("xref\n").unwrap();
        let lines: Vec<&str> = content[xref_pos..].lines().collect();
        assert!(lines[3].ends_with("00001 f "));
        assert!(lines[4].ends_with("00000 n "));
    }
}
