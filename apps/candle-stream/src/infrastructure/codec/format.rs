//! Wire tags of the supported `MessagePack` subset.

pub const POSITIVE_FIXINT_MAX: u8 = 0x7f;
pub const FIXMAP: u8 = 0x80;
pub const FIXMAP_MAX: u8 = 0x8f;
pub const FIXARRAY: u8 = 0x90;
pub const FIXARRAY_MAX: u8 = 0x9f;
pub const FIXSTR: u8 = 0xa0;
pub const FIXSTR_MAX: u8 = 0xbf;
pub const NIL: u8 = 0xc0;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;
pub const FLOAT64: u8 = 0xcb;
pub const UINT8: u8 = 0xcc;
pub const UINT16: u8 = 0xcd;
pub const UINT32: u8 = 0xce;
pub const INT8: u8 = 0xd0;
pub const INT16: u8 = 0xd1;
pub const INT32: u8 = 0xd2;
pub const STR8: u8 = 0xd9;
pub const STR16: u8 = 0xda;
pub const ARRAY16: u8 = 0xdc;
pub const MAP16: u8 = 0xde;
pub const NEGATIVE_FIXINT: u8 = 0xe0;

/// Longest string a fixstr can carry.
pub const FIXSTR_LEN_MAX: usize = 31;

/// Most elements a fixarray or fixmap can carry.
pub const FIXCOLLECTION_LEN_MAX: usize = 15;
