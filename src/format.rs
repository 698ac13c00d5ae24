// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The MessagePack format byte grammar: tag constants and the small
//! classification predicates used to dispatch reads and pick write sizes.
//!
//! See the spec: <https://github.com/msgpack/msgpack/blob/master/spec.md>.

use amplify_derive::Display;

pub const NIL: u8 = 0xc0;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;

pub const BIN8: u8 = 0xc4;
pub const BIN16: u8 = 0xc5;
pub const BIN32: u8 = 0xc6;

pub const EXT8: u8 = 0xc7;
pub const EXT16: u8 = 0xc8;
pub const EXT32: u8 = 0xc9;

pub const FLOAT32: u8 = 0xca;
pub const FLOAT64: u8 = 0xcb;

pub const UINT8: u8 = 0xcc;
pub const UINT16: u8 = 0xcd;
pub const UINT32: u8 = 0xce;
pub const UINT64: u8 = 0xcf;

pub const INT8: u8 = 0xd0;
pub const INT16: u8 = 0xd1;
pub const INT32: u8 = 0xd2;
pub const INT64: u8 = 0xd3;

pub const FIXEXT1: u8 = 0xd4;
pub const FIXEXT2: u8 = 0xd5;
pub const FIXEXT4: u8 = 0xd6;
pub const FIXEXT8: u8 = 0xd7;
pub const FIXEXT16: u8 = 0xd8;

pub const STR8: u8 = 0xd9;
pub const STR16: u8 = 0xda;
pub const STR32: u8 = 0xdb;

pub const ARRAY16: u8 = 0xdc;
pub const ARRAY32: u8 = 0xdd;

pub const MAP16: u8 = 0xde;
pub const MAP32: u8 = 0xdf;

/// The reserved extension type for the timestamp extension.
pub const TIMESTAMP_EXT_TYPE: i8 = -1;

const FIXMAP_PREFIX: u8 = 0x80;
const FIXARRAY_PREFIX: u8 = 0x90;
const FIXSTR_PREFIX: u8 = 0xa0;
const NEGATIVE_FIXINT_PREFIX: u8 = 0xe0;

pub const FIXMAP_MAX: usize = 15;
pub const FIXARRAY_MAX: usize = 15;
pub const FIXSTR_MAX: usize = 31;
pub const POSITIVE_FIXINT_MAX: i64 = 127;
pub const NEGATIVE_FIXINT_MIN: i64 = -32;

/// Returns whether `tag` encodes a positive or negative fixint.
#[inline]
pub fn is_fix_int(tag: u8) -> bool {
	is_positive_fix_int(tag) || is_negative_fix_int(tag)
}

#[inline]
pub fn is_positive_fix_int(tag: u8) -> bool { tag & 0x80 == 0 }

#[inline]
pub fn is_negative_fix_int(tag: u8) -> bool { tag & 0xe0 == NEGATIVE_FIXINT_PREFIX }

#[inline]
pub fn is_fix_str(tag: u8) -> bool { tag & 0xe0 == FIXSTR_PREFIX }

#[inline]
pub fn is_fix_array(tag: u8) -> bool { tag & 0xf0 == FIXARRAY_PREFIX }

#[inline]
pub fn is_fix_map(tag: u8) -> bool { tag & 0xf0 == FIXMAP_PREFIX }

#[inline]
pub fn is_fix_ext(tag: u8) -> bool {
	matches!(tag, FIXEXT1 | FIXEXT2 | FIXEXT4 | FIXEXT8 | FIXEXT16)
}

/// Decodes a positive or negative fixint tag into its signed value.
#[inline]
pub fn fix_int_value(tag: u8) -> i8 { tag as i8 }

/// Encodes `len` as a fixstr tag, panicking if it doesn't fit.
#[inline]
pub fn fix_str_tag(len: usize) -> u8 {
	debug_assert!(len <= FIXSTR_MAX);
	FIXSTR_PREFIX | len as u8
}

#[inline]
pub fn fix_array_tag(len: usize) -> u8 {
	debug_assert!(len <= FIXARRAY_MAX);
	FIXARRAY_PREFIX | len as u8
}

#[inline]
pub fn fix_map_tag(len: usize) -> u8 {
	debug_assert!(len <= FIXMAP_MAX);
	FIXMAP_PREFIX | len as u8
}

/// The broad category of an upcoming value, as reported by `next_type`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum MessageType {
	#[display("nil")]
	Nil,
	#[display("boolean")]
	Boolean,
	#[display("integer")]
	Integer,
	#[display("float")]
	Float,
	#[display("string")]
	String,
	#[display("binary")]
	Binary,
	#[display("array")]
	Array,
	#[display("map")]
	Map,
	#[display("extension")]
	Extension,
}

/// Classifies a format byte into its [`MessageType`].
pub fn type_of(tag: u8) -> MessageType {
	use MessageType::*;
	match tag {
		NIL => Nil,
		FALSE | TRUE => Boolean,
		UINT8 | UINT16 | UINT32 | UINT64 => Integer,
		INT8 | INT16 | INT32 | INT64 => Integer,
		FLOAT32 | FLOAT64 => Float,
		STR8 | STR16 | STR32 => String,
		BIN8 | BIN16 | BIN32 => Binary,
		ARRAY16 | ARRAY32 => Array,
		MAP16 | MAP32 => Map,
		EXT8 | EXT16 | EXT32 => Extension,
		FIXEXT1 | FIXEXT2 | FIXEXT4 | FIXEXT8 | FIXEXT16 => Extension,
		tag if is_fix_int(tag) => Integer,
		tag if is_fix_str(tag) => String,
		tag if is_fix_array(tag) => Array,
		tag if is_fix_map(tag) => Map,
		_ => unreachable!("tag {tag:#x} covers the full byte range"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fix_int_classification() {
		assert!(is_positive_fix_int(0x00));
		assert!(is_positive_fix_int(0x7f));
		assert!(!is_positive_fix_int(0x80));
		assert!(is_negative_fix_int(0xe0));
		assert!(is_negative_fix_int(0xff));
		assert!(!is_negative_fix_int(0xdf));
	}

	#[test]
	fn fix_container_classification() {
		assert!(is_fix_str(0xa0));
		assert!(is_fix_str(0xbf));
		assert!(is_fix_array(0x90));
		assert!(is_fix_array(0x9f));
		assert!(is_fix_map(0x80));
		assert!(is_fix_map(0x8f));
		assert!(!is_fix_map(0x90));
	}

	#[test]
	fn type_of_covers_every_tag() {
		for tag in 0u8..=255 {
			// Must not panic for any byte value.
			let _ = type_of(tag);
		}
	}
}
