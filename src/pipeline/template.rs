//! Template filling: `«Name»` placeholders in a DOCX → record values.
//!
//! A DOCX is a ZIP of XML parts. Visible text lives in `<w:t>` elements
//! inside runs (`<w:r>`) inside paragraphs (`<w:p>`). Word freely splits a
//! typed `«Placa»` over several runs (spell-check marks, revision ids,
//! formatting changes), so placeholders are matched on the concatenated
//! text of a whole paragraph and the replacement is written into the run
//! that holds the opening `«`. Every other byte of the package, including
//! run formatting, is carried over unchanged.
//!
//! ## Delimiter rules
//!
//! * `«` inside an open placeholder, a `»` with no open placeholder, or a
//!   paragraph ending inside a placeholder are errors: the template is
//!   malformed and nothing is produced.
//! * Unknown placeholder names resolve to the empty string.
//! * Paragraphs without either delimiter keep their runs untouched.
//! * A newline in a value becomes a `<w:br/>` inside the same run.

use crate::error::TivError;
use crate::normalize::TemplateFields;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::{Cursor, Read, Write};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const OPEN: char = '«';
pub const CLOSE: char = '»';

const MAIN_PART: &str = "word/document.xml";

/// Fills a Word template with placeholder values.
pub trait TemplateEngine: Send + Sync {
    fn fill(&self, template: &[u8], fields: &TemplateFields) -> Result<Vec<u8>, TivError>;
}

/// [`TemplateEngine`] for `.docx` packages.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxTemplateEngine;

impl TemplateEngine for DocxTemplateEngine {
    fn fill(&self, template: &[u8], fields: &TemplateFields) -> Result<Vec<u8>, TivError> {
        let mut archive = ZipArchive::new(Cursor::new(template))
            .map_err(|e| TivError::template(format!("not a valid DOCX package: {e}")))?;

        if !archive.file_names().any(|n| n == MAIN_PART) {
            return Err(TivError::template(format!("{MAIN_PART} is missing")));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut substituted = 0usize;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| TivError::template(format!("corrupt DOCX entry #{i}: {e}")))?;
            let name = entry.name().to_string();

            if entry.is_dir() {
                writer
                    .add_directory(name.as_str(), options)
                    .map_err(|e| TivError::template(format!("cannot write {name}: {e}")))?;
                continue;
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| TivError::template(format!("cannot read {name}: {e}")))?;

            if is_text_part(&name) {
                let xml = std::str::from_utf8(&data)
                    .map_err(|e| TivError::template(format!("{name} is not UTF-8: {e}")))?;
                let (filled, count) = fill_part(xml, fields)
                    .map_err(|e| TivError::template(format!("{name}: {e}")))?;
                substituted += count;
                data = filled.into_bytes();
            }

            writer
                .start_file(name.as_str(), options)
                .map_err(|e| TivError::template(format!("cannot write {name}: {e}")))?;
            writer
                .write_all(&data)
                .map_err(|e| TivError::template(format!("cannot write {name}: {e}")))?;
        }

        let bytes = writer
            .finish()
            .map_err(|e| TivError::template(format!("cannot finish DOCX: {e}")))?
            .into_inner();
        info!("Filled {substituted} placeholder(s) → {} bytes", bytes.len());
        Ok(bytes)
    }
}

/// Parts that carry document text: the body, headers and footers.
fn is_text_part(name: &str) -> bool {
    if name == MAIN_PART {
        return true;
    }
    name.strip_prefix("word/")
        .filter(|rest| !rest.contains('/'))
        .is_some_and(|rest| {
            (rest.starts_with("header") || rest.starts_with("footer")) && rest.ends_with(".xml")
        })
}

// ── XML part rewriting ───────────────────────────────────────────────────────

/// One `<w:t>` element: where it sits in the event list and its text.
struct TextSlot {
    start: usize,
    texts: Vec<usize>,
    value: String,
}

/// Substitute placeholders in one XML part; returns the new XML and the
/// number of placeholders replaced.
fn fill_part(xml: &str, fields: &TemplateFields) -> Result<(String, usize), String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    // One slot per parsed event; rewriting may empty a slot or widen it.
    let mut events: Vec<Vec<Event<'static>>> = Vec::new();
    // Innermost paragraph last; text boxes nest paragraphs inside runs.
    let mut paragraphs: Vec<Vec<TextSlot>> = Vec::new();
    let mut open_slot: Option<TextSlot> = None;
    let mut count = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at byte {}: {e}", reader.buffer_position()))?;
        let idx = events.len();
        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"w:p" => paragraphs.push(Vec::new()),
            Event::End(e) if e.name().as_ref() == b"w:p" => {
                let slots = paragraphs.pop().unwrap_or_default();
                count += rewrite_paragraph(&mut events, slots, fields)?;
            }
            Event::Start(e) if e.name().as_ref() == b"w:t" => {
                open_slot = Some(TextSlot {
                    start: idx,
                    texts: Vec::new(),
                    value: String::new(),
                });
            }
            Event::End(e) if e.name().as_ref() == b"w:t" => {
                if let Some(slot) = open_slot.take() {
                    if let Some(p) = paragraphs.last_mut() {
                        p.push(slot);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(slot) = open_slot.as_mut() {
                    let text = t.unescape().map_err(|e| format!("bad text escape: {e}"))?;
                    slot.value.push_str(&text);
                    slot.texts.push(idx);
                }
            }
            _ => {}
        }
        events.push(vec![event.into_owned()]);
    }

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    for event in events.into_iter().flatten() {
        writer
            .write_event(event)
            .map_err(|e| format!("cannot serialise XML: {e}"))?;
    }
    let out = String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| format!("serialised XML is not UTF-8: {e}"))?;
    Ok((out, count))
}

/// Apply placeholder substitution to the text slots of one paragraph.
fn rewrite_paragraph(
    events: &mut [Vec<Event<'static>>],
    slots: Vec<TextSlot>,
    fields: &TemplateFields,
) -> Result<usize, String> {
    if !slots
        .iter()
        .any(|s| s.value.contains(OPEN) || s.value.contains(CLOSE))
    {
        return Ok(0);
    }

    let texts: Vec<&str> = slots.iter().map(|s| s.value.as_str()).collect();
    let (rewritten, count) = substitute(&texts, fields)?;

    for (slot, new_value) in slots.iter().zip(rewritten) {
        if new_value == slot.value {
            continue;
        }
        let start = match events[slot.start].first() {
            Some(Event::Start(start)) => preserve_space(start),
            _ => continue,
        };
        let mut text_events = slot.texts.iter();
        if let Some(&first) = text_events.next() {
            events[first] = text_with_breaks(&new_value, &start);
        }
        for &rest in text_events {
            events[rest].clear();
        }
        events[slot.start] = vec![Event::Start(start)];
    }
    Ok(count)
}

/// Text events for one `<w:t>` body. Each `\n` closes the element, emits
/// `<w:br/>` and reopens it with `reopen`.
fn text_with_breaks(value: &str, reopen: &BytesStart<'static>) -> Vec<Event<'static>> {
    let mut out = Vec::new();
    for (i, line) in value.split('\n').enumerate() {
        if i > 0 {
            out.push(Event::End(BytesEnd::new("w:t")));
            out.push(Event::Empty(BytesStart::new("w:br")));
            out.push(Event::Start(reopen.clone()));
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if !line.is_empty() {
            out.push(Event::Text(BytesText::new(line).into_owned()));
        }
    }
    out
}

/// Copy of a `<w:t>` start tag with `xml:space="preserve"`, so leading and
/// trailing spaces of substituted values survive.
fn preserve_space(start: &BytesStart<'_>) -> BytesStart<'static> {
    let mut out = BytesStart::new("w:t");
    out.extend_attributes(
        start
            .attributes()
            .filter_map(Result::ok)
            .filter(|a| a.key.as_ref() != b"xml:space"),
    );
    out.push_attribute(("xml:space", "preserve"));
    out.into_owned()
}

/// Substitute placeholders across consecutive text runs.
///
/// A replacement value lands in the run holding the opening `«`; the
/// remaining characters of the placeholder are removed from whichever runs
/// held them.
pub fn substitute(texts: &[&str], fields: &TemplateFields) -> Result<(Vec<String>, usize), String> {
    let mut out: Vec<String> = vec![String::new(); texts.len()];
    let mut open: Option<(usize, String)> = None;
    let mut count = 0usize;

    for (run, text) in texts.iter().enumerate() {
        for c in text.chars() {
            match open.take() {
                None if c == OPEN => open = Some((run, String::new())),
                None if c == CLOSE => {
                    return Err(format!("'{CLOSE}' without a matching '{OPEN}'"))
                }
                None => out[run].push(c),
                Some((_, name)) if c == OPEN => {
                    return Err(format!("'{OPEN}' inside placeholder '{OPEN}{name}'"))
                }
                Some((owner, name)) if c == CLOSE => {
                    let key = name.trim();
                    let value = fields.value(key);
                    debug!("{OPEN}{key}{CLOSE} → {value:?}");
                    out[owner].push_str(value);
                    count += 1;
                }
                Some((owner, mut name)) => {
                    name.push(c);
                    open = Some((owner, name));
                }
            }
        }
    }

    if let Some((_, name)) = open {
        return Err(format!("placeholder '{OPEN}{name}' is never closed"));
    }
    Ok((out, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VehicleRecord;

    fn fields() -> TemplateFields {
        let mut r = VehicleRecord::default();
        r.placa = "B7X-042".into();
        r.marca = "HONDA".into();
        r.zona_registral = "II".into();
        TemplateFields::from_record(&r)
    }

    #[test]
    fn substitute_single_run() {
        let (out, n) = substitute(&["Placa: «Placa»."], &fields()).unwrap();
        assert_eq!(out, vec!["Placa: B7X-042."]);
        assert_eq!(n, 1);
    }

    #[test]
    fn substitute_split_runs_writes_into_opening_run() {
        let (out, n) = substitute(&["Marca «Mar", "ca", "» fin"], &fields()).unwrap();
        assert_eq!(out, vec!["Marca HONDA", "", " fin"]);
        assert_eq!(n, 1);
    }

    #[test]
    fn substitute_unknown_name_is_empty() {
        let (out, _) = substitute(&["[«NoSuchField»]"], &fields()).unwrap();
        assert_eq!(out, vec!["[]"]);
    }

    #[test]
    fn substitute_rejects_bad_delimiters() {
        assert!(substitute(&["«Placa"], &fields()).is_err());
        assert!(substitute(&["Placa»"], &fields()).is_err());
        assert!(substitute(&["«Pla«ca»"], &fields()).is_err());
    }

    #[test]
    fn text_parts() {
        assert!(is_text_part("word/document.xml"));
        assert!(is_text_part("word/header1.xml"));
        assert!(is_text_part("word/footer2.xml"));
        assert!(!is_text_part("word/styles.xml"));
        assert!(!is_text_part("word/_rels/header1.xml.rels"));
        assert!(!is_text_part("customXml/item1.xml"));
    }

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>«Pla</w:t></w:r><w:r><w:t>ca»</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">«Zona_Registral_Completa» &amp; co</w:t></w:r></w:p><w:p><w:r><w:t>untouched</w:t></w:r></w:p></w:body></w:document>"#;

    #[test]
    fn fill_part_rewrites_runs_and_keeps_formatting() {
        let (xml, n) = fill_part(BODY, &fields()).unwrap();
        assert_eq!(n, 2);
        assert!(xml.contains(r#"<w:rPr><w:b/></w:rPr><w:t xml:space="preserve">B7X-042</w:t>"#), "{xml}");
        assert!(xml.contains(r#"<w:t xml:space="preserve"></w:t>"#), "{xml}");
        assert!(xml.contains("ZONA REGISTRAL N° II &amp; co"), "{xml}");
        assert!(xml.contains("<w:t>untouched</w:t>"));
        assert!(!xml.contains('«'));
    }

    #[test]
    fn fill_part_turns_newlines_into_breaks() {
        let mut r = VehicleRecord::default();
        r.marca = "LINEA1\r\nLINEA2".into();
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>«Marca»</w:t></w:r></w:p></w:body></w:document>"#;
        let (out, n) = fill_part(xml, &TemplateFields::from_record(&r)).unwrap();
        assert_eq!(n, 1);
        assert!(
            out.contains(r#"<w:r><w:t xml:space="preserve">LINEA1</w:t><w:br/><w:t xml:space="preserve">LINEA2</w:t></w:r>"#),
            "{out}"
        );
    }

    #[test]
    fn fill_part_rejects_unclosed_placeholder() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>«Placa</w:t></w:r></w:p></w:body></w:document>"#;
        assert!(fill_part(xml, &fields()).is_err());
    }

    fn docx(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            w.start_file(*name, SimpleFileOptions::default()).unwrap();
            w.write_all(body.as_bytes()).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut a = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut s = String::new();
        a.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn fill_docx_package() {
        let template = docx(&[
            ("[Content_Types].xml", "<Types/>"),
            (MAIN_PART, BODY),
            (
                "word/header1.xml",
                r#"<w:hdr xmlns:w="x"><w:p><w:r><w:t>«Marca»</w:t></w:r></w:p></w:hdr>"#,
            ),
        ]);
        let filled = DocxTemplateEngine.fill(&template, &fields()).unwrap();
        assert!(read_part(&filled, MAIN_PART).contains("B7X-042"));
        assert!(read_part(&filled, "word/header1.xml").contains("HONDA"));
        assert_eq!(read_part(&filled, "[Content_Types].xml"), "<Types/>");
    }

    #[test]
    fn corrupt_zip_is_template_error() {
        let err = DocxTemplateEngine.fill(b"PK\x03\x04garbage", &fields()).unwrap_err();
        assert!(matches!(err, TivError::TemplateFailed { .. }));
    }

    #[test]
    fn missing_document_part_is_template_error() {
        let template = docx(&[("[Content_Types].xml", "<Types/>")]);
        let err = DocxTemplateEngine.fill(&template, &fields()).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn malformed_delimiters_are_template_error() {
        let template = docx(&[(
            MAIN_PART,
            r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Placa»</w:t></w:r></w:p></w:body></w:document>"#,
        )]);
        let err = DocxTemplateEngine.fill(&template, &fields()).unwrap_err();
        assert!(matches!(err, TivError::TemplateFailed { .. }));
    }
}
