//! mddataset result documents.
//!
//! Documents are built event by event with `quick_xml`, so text and
//! attribute escaping happens exactly once, at write time. Child-element
//! order inside `root` is fixed: inline schema, `OlapInfo`, `Axes`,
//! `CellData`. Serialization either yields a complete document or an error;
//! partial documents never escape this module.

use chrono::NaiveDateTime;
use lattice_mdx::{Axis, MemberCell, ResultSet, Value};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use std::sync::Arc;

pub type SerializeResult<T> = Result<T, SerializationError>;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("xml writer: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("result document is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

// `Writer::write_event` surfaces bare `std::io::Error`s; fold them into the
// `Xml` variant so every write failure reports through one path, as `raw` does.
impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        Self::Xml(quick_xml::Error::from(err))
    }
}

type Sink = Writer<Cursor<Vec<u8>>>;
type XmlResult<T> = Result<T, quick_xml::Error>;

/// Inline schema carried at the top of every dataset response.
const EXECUTE_XSD: &str = r#"<xsd:schema targetNamespace="urn:schemas-microsoft-com:xml-analysis:mddataset" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns="urn:schemas-microsoft-com:xml-analysis:mddataset" elementFormDefault="qualified"><xsd:complexType name="MemberType"><xsd:sequence><xsd:element name="UName" type="xsd:string"/><xsd:element name="Caption" type="xsd:string"/><xsd:element name="LName" type="xsd:string"/><xsd:element name="LNum" type="xsd:unsignedInt"/><xsd:element name="DisplayInfo" type="xsd:unsignedInt"/></xsd:sequence><xsd:attribute name="Hierarchy" type="xsd:string"/></xsd:complexType><xsd:complexType name="TupleType"><xsd:sequence><xsd:element name="Member" type="MemberType" minOccurs="0" maxOccurs="unbounded"/></xsd:sequence></xsd:complexType><xsd:complexType name="TuplesType"><xsd:sequence><xsd:element name="Tuple" type="TupleType" minOccurs="0" maxOccurs="unbounded"/></xsd:sequence></xsd:complexType><xsd:complexType name="AxisType"><xsd:sequence><xsd:element name="Tuples" type="TuplesType"/></xsd:sequence><xsd:attribute name="name" type="xsd:string"/></xsd:complexType><xsd:complexType name="CellType"><xsd:sequence><xsd:element name="Value" minOccurs="0"/></xsd:sequence><xsd:attribute name="CellOrdinal" type="xsd:unsignedInt"/></xsd:complexType><xsd:element name="root"><xsd:complexType><xsd:sequence><xsd:element name="OlapInfo" minOccurs="0"/><xsd:element name="Axes" minOccurs="0"><xsd:complexType><xsd:sequence><xsd:element name="Axis" type="AxisType" minOccurs="0" maxOccurs="unbounded"/></xsd:sequence></xsd:complexType></xsd:element><xsd:element name="CellData" minOccurs="0"><xsd:complexType><xsd:sequence><xsd:element name="Cell" type="CellType" minOccurs="0" maxOccurs="unbounded"/></xsd:sequence></xsd:complexType></xsd:element></xsd:sequence></xsd:complexType></xsd:element></xsd:schema>"#;

/// Serializes an executed result into the `<return>` payload of an Execute
/// response. `updated` feeds the cube timestamps, which are the only
/// non-deterministic part of the document.
pub fn write_result_document(
    result: &ResultSet,
    updated: NaiveDateTime,
) -> SerializeResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Start(BytesStart::new("return")))?;

    let mut root = BytesStart::new("root");
    root.push_attribute(("xmlns", "urn:schemas-microsoft-com:xml-analysis:mddataset"));
    root.push_attribute(("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"));
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    writer.write_event(Event::Start(root))?;

    raw(&mut writer, EXECUTE_XSD)?;
    write_olap_info(&mut writer, result, updated)?;

    writer.write_event(Event::Start(BytesStart::new("Axes")))?;
    for axis in &result.axes {
        write_axis(&mut writer, axis)?;
    }
    write_axis(&mut writer, &result.slicer)?;
    writer.write_event(Event::End(BytesEnd::new("Axes")))?;

    write_cell_data(&mut writer, &result.cells)?;

    writer.write_event(Event::End(BytesEnd::new("root")))?;
    writer.write_event(Event::End(BytesEnd::new("return")))?;
    finish(writer)
}

/// The response to a statement with no content: an empty-schema root.
pub fn write_empty_document() -> SerializeResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Start(BytesStart::new("return")))?;
    let mut root = BytesStart::new("root");
    root.push_attribute(("xmlns", "urn:schemas-microsoft-com:xml-analysis:empty"));
    writer.write_event(Event::Empty(root))?;
    writer.write_event(Event::End(BytesEnd::new("return")))?;
    finish(writer)
}

fn write_olap_info(writer: &mut Sink, result: &ResultSet, updated: NaiveDateTime) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new("OlapInfo")))?;

    writer.write_event(Event::Start(BytesStart::new("CubeInfo")))?;
    writer.write_event(Event::Start(BytesStart::new("Cube")))?;
    text_element(writer, "CubeName", &result.cube)?;
    let stamp = updated.format("%Y-%m-%dT%H:%M:%S").to_string();
    for tag in ["LastDataUpdate", "LastSchemaUpdate"] {
        let mut elem = BytesStart::new(tag);
        elem.push_attribute((
            "xmlns",
            "http://schemas.microsoft.com/analysisservices/2003/engine",
        ));
        writer.write_event(Event::Start(elem))?;
        writer.write_event(Event::Text(BytesText::new(&stamp)))?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Cube")))?;
    writer.write_event(Event::End(BytesEnd::new("CubeInfo")))?;

    writer.write_event(Event::Start(BytesStart::new("AxesInfo")))?;
    for axis in &result.axes {
        write_axis_info(writer, axis)?;
    }
    write_axis_info(writer, &result.slicer)?;
    writer.write_event(Event::End(BytesEnd::new("AxesInfo")))?;

    write_cell_info(writer)?;
    writer.write_event(Event::End(BytesEnd::new("OlapInfo")))?;
    Ok(())
}

fn write_axis_info(writer: &mut Sink, axis: &Axis) -> XmlResult<()> {
    let mut info = BytesStart::new("AxisInfo");
    info.push_attribute(("name", axis.name.as_str()));
    writer.write_event(Event::Start(info))?;
    for hierarchy in &axis.hierarchies {
        let mut elem = BytesStart::new("HierarchyInfo");
        elem.push_attribute(("name", hierarchy.as_str()));
        writer.write_event(Event::Start(elem))?;
        for (tag, property, kind) in [
            ("UName", "MEMBER_UNIQUE_NAME", "xs:string"),
            ("Caption", "MEMBER_CAPTION", "xs:string"),
            ("LName", "LEVEL_UNIQUE_NAME", "xs:string"),
            ("LNum", "LEVEL_NUMBER", "xs:int"),
            ("DisplayInfo", "DISPLAY_INFO", "xs:unsignedInt"),
        ] {
            let name = format!("{hierarchy}.[{property}]");
            let mut prop = BytesStart::new(tag);
            prop.push_attribute(("name", name.as_str()));
            prop.push_attribute(("type", kind));
            writer.write_event(Event::Empty(prop))?;
        }
        writer.write_event(Event::End(BytesEnd::new("HierarchyInfo")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("AxisInfo")))?;
    Ok(())
}

fn write_cell_info(writer: &mut Sink) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new("CellInfo")))?;
    for (tag, name, kind) in [
        ("Value", "VALUE", None),
        ("FormatString", "FORMAT_STRING", Some("xs:string")),
        ("Language", "LANGUAGE", Some("xs:unsignedInt")),
        ("BackColor", "BACK_COLOR", Some("xs:unsignedInt")),
        ("ForeColor", "FORE_COLOR", Some("xs:unsignedInt")),
        ("FontFlags", "FONT_FLAGS", Some("xs:int")),
    ] {
        let mut prop = BytesStart::new(tag);
        prop.push_attribute(("name", name));
        if let Some(kind) = kind {
            prop.push_attribute(("type", kind));
        }
        writer.write_event(Event::Empty(prop))?;
    }
    writer.write_event(Event::End(BytesEnd::new("CellInfo")))?;
    Ok(())
}

fn write_axis(writer: &mut Sink, axis: &Axis) -> XmlResult<()> {
    let mut elem = BytesStart::new("Axis");
    elem.push_attribute(("name", axis.name.as_str()));
    writer.write_event(Event::Start(elem))?;
    writer.write_event(Event::Start(BytesStart::new("Tuples")))?;
    for tuple in &axis.tuples {
        writer.write_event(Event::Start(BytesStart::new("Tuple")))?;
        for member in &tuple.members {
            write_member(writer, member)?;
        }
        writer.write_event(Event::End(BytesEnd::new("Tuple")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Tuples")))?;
    writer.write_event(Event::End(BytesEnd::new("Axis")))?;
    Ok(())
}

fn write_member(writer: &mut Sink, member: &MemberCell) -> XmlResult<()> {
    let mut elem = BytesStart::new("Member");
    elem.push_attribute(("Hierarchy", member.hierarchy.as_str()));
    writer.write_event(Event::Start(elem))?;
    text_element(writer, "UName", &member.unique_name)?;
    text_element(writer, "Caption", &member.caption)?;
    text_element(writer, "LName", &member.level)?;
    text_element(writer, "LNum", &member.level_number.to_string())?;
    text_element(writer, "DisplayInfo", &member.display_info.to_string())?;
    writer.write_event(Event::End(BytesEnd::new("Member")))?;
    Ok(())
}

fn write_cell_data(writer: &mut Sink, cells: &[Value]) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new("CellData")))?;
    for (ordinal, value) in cells.iter().enumerate() {
        let ordinal = ordinal.to_string();
        let mut cell = BytesStart::new("Cell");
        cell.push_attribute(("CellOrdinal", ordinal.as_str()));
        if value.is_blank() {
            writer.write_event(Event::Empty(cell))?;
            continue;
        }
        writer.write_event(Event::Start(cell))?;
        let mut val = BytesStart::new("Value");
        val.push_attribute(("xsi:type", value_type(value)));
        writer.write_event(Event::Start(val))?;
        writer.write_event(Event::Text(BytesText::new(&value.to_string())))?;
        writer.write_event(Event::End(BytesEnd::new("Value")))?;
        writer.write_event(Event::End(BytesEnd::new("Cell")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("CellData")))?;
    Ok(())
}

fn value_type(value: &Value) -> &'static str {
    match value.as_number() {
        Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => "xsd:long",
        Some(_) => "xsd:double",
        None => match value {
            Value::Boolean(_) => "xsd:boolean",
            _ => "xsd:string",
        },
    }
}

fn text_element(writer: &mut Sink, tag: &str, text: &str) -> XmlResult<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn raw(writer: &mut Sink, xml: &str) -> XmlResult<()> {
    writer
        .get_mut()
        .write_all(xml.as_bytes())
        .map_err(|err| quick_xml::Error::Io(Arc::new(err)))
}

fn finish(writer: Sink) -> SerializeResult<String> {
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_is_the_empty_schema_root() {
        assert_eq!(
            write_empty_document().unwrap(),
            "<return><root xmlns=\"urn:schemas-microsoft-com:xml-analysis:empty\"/></return>"
        );
    }

    #[test]
    fn cell_values_pick_schema_types_by_shape() {
        assert_eq!(value_type(&Value::from(1023)), "xsd:long");
        assert_eq!(value_type(&Value::from(2.5)), "xsd:double");
        assert_eq!(value_type(&Value::from("x")), "xsd:string");
        assert_eq!(value_type(&Value::from(true)), "xsd:boolean");
    }

    #[test]
    fn inline_schema_is_well_formed() {
        assert!(roxmltree::Document::parse(EXECUTE_XSD).is_ok());
    }
}
