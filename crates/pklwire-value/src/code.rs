//! Type tags used inside evaluated-value payloads.
//!
//! Every non-primitive value is encoded as an array whose first element is one
//! of these tags. Object members carry their own sub-tags.

pub const OBJECT: u8 = 0x1;
pub const MAP: u8 = 0x2;
pub const MAPPING: u8 = 0x3;
pub const LIST: u8 = 0x4;
pub const LISTING: u8 = 0x5;
pub const SET: u8 = 0x6;
pub const DURATION: u8 = 0x7;
pub const DATA_SIZE: u8 = 0x8;
pub const PAIR: u8 = 0x9;
pub const INT_SEQ: u8 = 0xA;
pub const REGEX: u8 = 0xB;
pub const CLASS: u8 = 0xC;
pub const TYPE_ALIAS: u8 = 0xD;

/// Object member: named property.
pub const MEMBER_PROPERTY: u8 = 0x10;
/// Object member: keyed entry (dynamic objects only).
pub const MEMBER_ENTRY: u8 = 0x11;
/// Object member: indexed element (dynamic objects only).
pub const MEMBER_ELEMENT: u8 = 0x12;

/// Class name and module of the one object type that keeps all three member axes.
pub const DYNAMIC_CLASS: &str = "Dynamic";
pub const BASE_MODULE: &str = "pkl:base";

/// Returns a human-readable name for a value tag.
pub fn code_name(code: u64) -> &'static str {
    match code {
        0x1 => "Object",
        0x2 => "Map",
        0x3 => "Mapping",
        0x4 => "List",
        0x5 => "Listing",
        0x6 => "Set",
        0x7 => "Duration",
        0x8 => "DataSize",
        0x9 => "Pair",
        0xA => "IntSeq",
        0xB => "Regex",
        0xC => "Class",
        0xD => "TypeAlias",
        0x10 => "ObjectMemberProperty",
        0x11 => "ObjectMemberEntry",
        0x12 => "ObjectMemberElement",
        _ => "unknown",
    }
}

/// Returns true if the tag identifies an object member rather than a value.
pub fn is_member(code: u64) -> bool {
    (u64::from(MEMBER_PROPERTY)..=u64::from(MEMBER_ELEMENT)).contains(&code)
}
