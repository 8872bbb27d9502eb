//! The XML parts of a single-sheet Office Open XML workbook.

use super::cell::{self, CellContent, Style};
use super::Worksheet;
use crate::error::Res;
use crate::model::Value;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// Part names inside the archive
pub(super) const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
pub(super) const ROOT_RELS_PATH: &str = "_rels/.rels";
pub(super) const WORKBOOK_PATH: &str = "xl/workbook.xml";
pub(super) const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
pub(super) const STYLES_PATH: &str = "xl/styles.xml";
pub(super) const SHEET_PATH: &str = "xl/worksheets/sheet1.xml";

pub(super) const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

pub(super) const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

pub(super) const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// The `cellXfs` entries must stay in the order of `Style`.
pub(super) const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="2"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/><numFmt numFmtId="165" formatCode="yyyy\-mm\-dd\ hh:mm:ss"/></numFmts><fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="4"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="165" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="21" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

/// `xl/workbook.xml` listing the one sheet.
pub(super) fn workbook(sheet_name: &str) -> Res<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    w.write_event(Event::Start(
        BytesStart::new("workbook").with_attributes([("xmlns", NS_MAIN), ("xmlns:r", NS_RELATIONSHIPS)]),
    ))?;
    w.write_event(Event::Start(BytesStart::new("sheets")))?;
    w.write_event(Event::Empty(BytesStart::new("sheet").with_attributes([
        ("name", sheet_name),
        ("sheetId", "1"),
        ("r:id", "rId1"),
    ])))?;
    w.write_event(Event::End(BytesEnd::new("sheets")))?;
    w.write_event(Event::End(BytesEnd::new("workbook")))?;
    Ok(w.into_inner())
}

/// `xl/worksheets/sheet1.xml`: the header row followed by one row per record.
pub(super) fn worksheet(sheet: &Worksheet) -> Res<Vec<u8>> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    w.write_event(Event::Start(
        BytesStart::new("worksheet").with_attributes([("xmlns", NS_MAIN)]),
    ))?;

    let last_column = sheet.columns().len().saturating_sub(1);
    let dimension = format!(
        "A1:{}",
        cell::reference(last_column, sheet.rows().len() + 1)
    );
    w.write_event(Event::Empty(
        BytesStart::new("dimension").with_attributes([("ref", dimension.as_str())]),
    ))?;

    w.write_event(Event::Start(BytesStart::new("sheetData")))?;
    let header = sheet
        .columns()
        .iter()
        .map(|name| CellContent::from(&Value::Text(name.clone())));
    write_row(&mut w, 1, header)?;
    for (i, row) in sheet.rows().iter().enumerate() {
        write_row(&mut w, i + 2, row.iter().map(CellContent::from))?;
    }
    w.write_event(Event::End(BytesEnd::new("sheetData")))?;

    w.write_event(Event::End(BytesEnd::new("worksheet")))?;
    Ok(w.into_inner())
}

fn write_row(
    w: &mut Writer<Vec<u8>>,
    row_number: usize,
    cells: impl Iterator<Item = CellContent>,
) -> Res<()> {
    let r = row_number.to_string();
    w.write_event(Event::Start(
        BytesStart::new("row").with_attributes([("r", r.as_str())]),
    ))?;
    for (column, content) in cells.enumerate() {
        write_cell(w, &cell::reference(column, row_number), content)?;
    }
    w.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell(w: &mut Writer<Vec<u8>>, reference: &str, content: CellContent) -> Res<()> {
    let start = BytesStart::new("c").with_attributes([("r", reference)]);
    match content {
        CellContent::Empty => {}
        CellContent::Bool(b) => {
            w.write_event(Event::Start(start.with_attributes([("t", "b")])))?;
            write_value(w, if b { "1" } else { "0" })?;
            w.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellContent::Number(n, style) => {
            let start = match style {
                Style::General => start,
                other => {
                    let s = (other as u8).to_string();
                    start.with_attributes([("s", s.as_str())])
                }
            };
            w.write_event(Event::Start(start))?;
            write_value(w, &n)?;
            w.write_event(Event::End(BytesEnd::new("c")))?;
        }
        CellContent::Text(s) => {
            w.write_event(Event::Start(start.with_attributes([("t", "inlineStr")])))?;
            w.write_event(Event::Start(BytesStart::new("is")))?;
            w.write_event(Event::Start(
                BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
            ))?;
            w.write_event(Event::Text(BytesText::new(&s)))?;
            w.write_event(Event::End(BytesEnd::new("t")))?;
            w.write_event(Event::End(BytesEnd::new("is")))?;
            w.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}

fn write_value(w: &mut Writer<Vec<u8>>, v: &str) -> Res<()> {
    w.write_event(Event::Start(BytesStart::new("v")))?;
    w.write_event(Event::Text(BytesText::new(v)))?;
    w.write_event(Event::End(BytesEnd::new("v")))?;
    Ok(())
}
