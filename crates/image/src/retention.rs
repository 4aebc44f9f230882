//! Removal of options declared with `retention = RETENTION_SOURCE`.
//!
//! Custom options are extensions of the `google.protobuf.*Options` messages
//! and are only present as unknown fields, so the whole transform runs on
//! the raw descriptor encoding.

use crate::error::Result;
use crate::image::{Image, ImageFile};
use crate::wire::{parse_fields, rewrite_fields, Field};
use prost::DecodeError;
use std::collections::{HashMap, HashSet};

const FIELD_OPTIONS_RETENTION: u32 = 17;
const RETENTION_SOURCE: u64 = 2;

const FILE_OPTIONS: &str = ".google.protobuf.FileOptions";
const MESSAGE_OPTIONS: &str = ".google.protobuf.MessageOptions";
const FIELD_OPTIONS: &str = ".google.protobuf.FieldOptions";
const ONEOF_OPTIONS: &str = ".google.protobuf.OneofOptions";
const EXTENSION_RANGE_OPTIONS: &str = ".google.protobuf.ExtensionRangeOptions";
const ENUM_OPTIONS: &str = ".google.protobuf.EnumOptions";
const ENUM_VALUE_OPTIONS: &str = ".google.protobuf.EnumValueOptions";
const SERVICE_OPTIONS: &str = ".google.protobuf.ServiceOptions";
const METHOD_OPTIONS: &str = ".google.protobuf.MethodOptions";

mod file {
    pub const MESSAGE_TYPE: u32 = 4;
    pub const ENUM_TYPE: u32 = 5;
    pub const SERVICE: u32 = 6;
    pub const EXTENSION: u32 = 7;
    pub const OPTIONS: u32 = 8;
}

mod message {
    pub const FIELD: u32 = 2;
    pub const NESTED_TYPE: u32 = 3;
    pub const ENUM_TYPE: u32 = 4;
    pub const EXTENSION_RANGE: u32 = 5;
    pub const EXTENSION_RANGE_OPTIONS: u32 = 3;
    pub const EXTENSION: u32 = 6;
    pub const OPTIONS: u32 = 7;
    pub const ONEOF_DECL: u32 = 8;
    pub const ONEOF_OPTIONS: u32 = 2;
}

mod field {
    pub const EXTENDEE: u32 = 2;
    pub const NUMBER: u32 = 3;
    pub const OPTIONS: u32 = 8;
}

mod enumeration {
    pub const VALUE: u32 = 2;
    pub const VALUE_OPTIONS: u32 = 3;
    pub const OPTIONS: u32 = 3;
}

mod service {
    pub const METHOD: u32 = 2;
    pub const METHOD_OPTIONS: u32 = 4;
    pub const OPTIONS: u32 = 3;
}

/// Extendee name to extension field numbers with source retention.
type SourceOnly = HashMap<String, HashSet<u32>>;

/// Copy of `image` without source-retention options. Files that define no
/// such options, or that are unaffected, are returned unchanged.
pub fn strip_source_retention_options(image: &Image) -> Result<Image> {
    let mut source_only = SourceOnly::new();
    for file in image.files() {
        collect_file(file.raw(), &mut source_only)?;
    }
    if source_only.is_empty() {
        return Ok(image.clone());
    }
    let mut files = Vec::with_capacity(image.len());
    for file in image.files() {
        let raw = strip_file(file.raw(), &source_only)?;
        if raw.as_slice() == file.raw().as_ref() {
            files.push(file.clone());
            continue;
        }
        let module_id = file.module_id().map(str::to_string);
        files.push(ImageFile::new(file.info().clone(), raw)?.with_module_id(module_id));
    }
    Image::new(files)
}

fn collect_file(data: &[u8], out: &mut SourceOnly) -> std::result::Result<(), DecodeError> {
    for f in parse_fields(data)? {
        match f.number {
            file::EXTENSION => collect_extension(f.payload, out)?,
            file::MESSAGE_TYPE => collect_message(f.payload, out)?,
            _ => {}
        }
    }
    Ok(())
}

fn collect_message(data: &[u8], out: &mut SourceOnly) -> std::result::Result<(), DecodeError> {
    for f in parse_fields(data)? {
        match f.number {
            message::EXTENSION => collect_extension(f.payload, out)?,
            message::NESTED_TYPE => collect_message(f.payload, out)?,
            _ => {}
        }
    }
    Ok(())
}

fn collect_extension(data: &[u8], out: &mut SourceOnly) -> std::result::Result<(), DecodeError> {
    let mut extendee = None;
    let mut number = None;
    let mut source = false;
    for f in parse_fields(data)? {
        match f.number {
            field::EXTENDEE => extendee = f.string().map(normalize_extendee),
            field::NUMBER => number = f.varint(),
            field::OPTIONS => {
                source = parse_fields(f.payload)?.iter().any(|option| {
                    option.number == FIELD_OPTIONS_RETENTION
                        && option.varint() == Some(RETENTION_SOURCE)
                });
            }
            _ => {}
        }
    }
    if let (true, Some(extendee), Some(number)) = (source, extendee, number) {
        if let Ok(number) = u32::try_from(number) {
            out.entry(extendee).or_default().insert(number);
        }
    }
    Ok(())
}

fn normalize_extendee(name: &str) -> String {
    if name.starts_with('.') {
        name.to_string()
    } else {
        format!(".{name}")
    }
}

fn strip_file(data: &[u8], s: &SourceOnly) -> std::result::Result<Vec<u8>, DecodeError> {
    rewrite_fields(data, &|_| true, &mut |f| {
        Ok(match f.number {
            file::OPTIONS => Some(strip_options(f, FILE_OPTIONS, s)?),
            file::MESSAGE_TYPE => Some(strip_message(f.payload, s)?),
            file::ENUM_TYPE => Some(strip_enum(f.payload, s)?),
            file::SERVICE => Some(strip_service(f.payload, s)?),
            file::EXTENSION => Some(strip_field(f.payload, s)?),
            _ => None,
        })
    })
}

fn strip_message(data: &[u8], s: &SourceOnly) -> std::result::Result<Vec<u8>, DecodeError> {
    rewrite_fields(data, &|_| true, &mut |f| {
        Ok(match f.number {
            message::FIELD | message::EXTENSION => Some(strip_field(f.payload, s)?),
            message::NESTED_TYPE => Some(strip_message(f.payload, s)?),
            message::ENUM_TYPE => Some(strip_enum(f.payload, s)?),
            message::OPTIONS => Some(strip_options(f, MESSAGE_OPTIONS, s)?),
            message::EXTENSION_RANGE => Some(strip_nested_options(
                f.payload,
                message::EXTENSION_RANGE_OPTIONS,
                EXTENSION_RANGE_OPTIONS,
                s,
            )?),
            message::ONEOF_DECL => Some(strip_nested_options(
                f.payload,
                message::ONEOF_OPTIONS,
                ONEOF_OPTIONS,
                s,
            )?),
            _ => None,
        })
    })
}

fn strip_field(data: &[u8], s: &SourceOnly) -> std::result::Result<Vec<u8>, DecodeError> {
    strip_nested_options(data, field::OPTIONS, FIELD_OPTIONS, s)
}

fn strip_enum(data: &[u8], s: &SourceOnly) -> std::result::Result<Vec<u8>, DecodeError> {
    rewrite_fields(data, &|_| true, &mut |f| {
        Ok(match f.number {
            enumeration::VALUE => Some(strip_nested_options(
                f.payload,
                enumeration::VALUE_OPTIONS,
                ENUM_VALUE_OPTIONS,
                s,
            )?),
            enumeration::OPTIONS => Some(strip_options(f, ENUM_OPTIONS, s)?),
            _ => None,
        })
    })
}

fn strip_service(data: &[u8], s: &SourceOnly) -> std::result::Result<Vec<u8>, DecodeError> {
    rewrite_fields(data, &|_| true, &mut |f| {
        Ok(match f.number {
            service::METHOD => Some(strip_nested_options(
                f.payload,
                service::METHOD_OPTIONS,
                METHOD_OPTIONS,
                s,
            )?),
            service::OPTIONS => Some(strip_options(f, SERVICE_OPTIONS, s)?),
            _ => None,
        })
    })
}

/// Rewrite the options field `options_number` of the message in `data`.
fn strip_nested_options(
    data: &[u8],
    options_number: u32,
    extendee: &str,
    s: &SourceOnly,
) -> std::result::Result<Vec<u8>, DecodeError> {
    rewrite_fields(data, &|_| true, &mut |f| {
        Ok(if f.number == options_number {
            Some(strip_options(f, extendee, s)?)
        } else {
            None
        })
    })
}

fn strip_options(
    options: &Field<'_>,
    extendee: &str,
    s: &SourceOnly,
) -> std::result::Result<Vec<u8>, DecodeError> {
    let Some(numbers) = s.get(extendee) else {
        return Ok(options.payload.to_vec());
    };
    rewrite_fields(options.payload, &|f| !numbers.contains(&f.number), &mut |_| Ok(None))
}
