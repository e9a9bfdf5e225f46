//! Per-invoice XML document.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;

use crate::error::OutputError;
use crate::models::invoice::InvoiceRecord;

/// Root element of every invoice document.
pub const ROOT_ELEMENT: &str = "Invoice";

const LIST_ITEM: &str = "item";

/// Serialize a record as `<Invoice>` with one child element per field.
///
/// Values carry no type attributes. Lists become `<item>` children, objects
/// nest and `null` is an empty element.
pub fn to_xml(record: &InvoiceRecord) -> Result<Vec<u8>, OutputError> {
    let mut writer = Writer::new(Vec::new());

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
    for (key, value) in record.iter() {
        write_field(&mut writer, key, value)?;
    }
    write(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    Ok(writer.into_inner())
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), OutputError> {
    writer
        .write_event(event)
        .map_err(|e| OutputError::Xml(e.to_string()))
}

/// Write `value` inside an element named after `key`.
///
/// Keys that cannot be made into an element name are written as
/// `<key name="...">`.
fn write_field(writer: &mut Writer<Vec<u8>>, key: &str, value: &Value) -> Result<(), OutputError> {
    let (tag, start) = match element_name(key) {
        Some(name) => {
            let start = BytesStart::new(name.clone());
            (name, start)
        }
        None => {
            let mut start = BytesStart::new("key");
            start.push_attribute(("name", key));
            ("key".to_string(), start)
        }
    };

    write(writer, Event::Start(start))?;
    write_value(writer, value)?;
    write(writer, Event::End(BytesEnd::new(tag)))
}

fn write_value(writer: &mut Writer<Vec<u8>>, value: &Value) -> Result<(), OutputError> {
    match value {
        Value::Null => Ok(()),
        Value::String(s) => write(writer, Event::Text(BytesText::new(s))),
        Value::Bool(_) | Value::Number(_) => {
            write(writer, Event::Text(BytesText::new(&value.to_string())))
        }
        Value::Array(items) => {
            for item in items {
                write_field(writer, LIST_ITEM, item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                write_field(writer, key, item)?;
            }
            Ok(())
        }
    }
}

/// Element name for a record key: spaces become `_` and a leading digit
/// gets an `n` prefix. `None` if the result is still not a valid XML name.
fn element_name(key: &str) -> Option<String> {
    let mut name = key.trim().replace(' ', "_");
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'n');
    }

    let mut chars = name.chars();
    let first = chars.next()?;
    let valid_start = first.is_alphabetic() || first == '_';
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    let reserved = name.to_ascii_lowercase().starts_with("xml");

    (valid_start && valid_rest && !reserved).then_some(name)
}
