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

//! The message reader: a stateless-per-call decoder over a [`MessageSource`].

use std::io::Read;
use std::sync::Arc;
use crate::alloc::SharedAllocator;
use crate::error::{Error, Result};
use crate::format::{self, MessageType};
use crate::source::{MessageSource, SourceOptions};
use crate::strcodec::{IdentifierCache, DEFAULT_IDENTIFIER_CACHE_LIMIT, DEFAULT_MAX_IDENTIFIER_LENGTH};
use crate::timestamp::Timestamp;

#[derive(Clone)]
#[non_exhaustive]
pub struct ReaderOptions {
	pub allocator: SharedAllocator,
	pub buffer_capacity: usize,
	pub identifier_cache_limit: usize,
	pub max_identifier_length: usize,
}

impl Default for ReaderOptions {
	fn default() -> Self {
		let source = SourceOptions::default();
		Self {
			allocator: source.allocator,
			buffer_capacity: source.buffer_capacity,
			identifier_cache_limit: DEFAULT_IDENTIFIER_CACHE_LIMIT,
			max_identifier_length: DEFAULT_MAX_IDENTIFIER_LENGTH,
		}
	}
}

/// Decodes MessagePack values from a blocking byte source.
///
/// Every method call is a complete, self-contained decode step: the reader
/// holds no partially parsed token state across calls. After any error other
/// than [`ErrorKind::EndOfInput`](crate::error::ErrorKind::EndOfInput) the
/// stream position is undefined and the reader should be closed.
pub struct MessageReader<R> {
	source: MessageSource<R>,
	identifiers: IdentifierCache,
}

impl<R: Read> MessageReader<R> {
	pub fn new(input: R, options: ReaderOptions) -> Result<Self> {
		let source = MessageSource::new(input, SourceOptions {
			allocator: options.allocator,
			buffer_capacity: options.buffer_capacity,
		})?;
		Ok(Self {
			source,
			identifiers: IdentifierCache::new(options.identifier_cache_limit, options.max_identifier_length),
		})
	}

	pub fn of(input: R) -> Result<Self> { Self::new(input, ReaderOptions::default()) }

	/// The upcoming format byte, without consuming it.
	pub fn next_format(&mut self) -> Result<u8> { self.source.peek_u8() }

	/// The [`MessageType`] of the upcoming value.
	pub fn next_type(&mut self) -> Result<MessageType> {
		Ok(format::type_of(self.next_format()?))
	}

	fn expect(&mut self, expected: MessageType) -> Result<u8> {
		let tag = self.next_format()?;
		let found = format::type_of(tag);
		if found != expected {
			return Err(Error::type_mismatch(expected, found))
		}
		Ok(self.source.read_u8()?)
	}

	pub fn read_nil(&mut self) -> Result<()> {
		self.expect(MessageType::Nil)?;
		Ok(())
	}

	pub fn read_boolean(&mut self) -> Result<bool> {
		let tag = self.expect(MessageType::Boolean)?;
		Ok(tag == format::TRUE)
	}

	/// Reads the upcoming integer widened to `i64`, the common path behind
	/// `read_byte`/`read_short`/`read_int`/`read_long`.
	fn read_signed(&mut self) -> Result<i64> {
		let tag = self.source.peek_u8()?;
		if format::is_fix_int(tag) {
			self.source.read_u8()?;
			return Ok(format::fix_int_value(tag) as i64)
		}

		let found = format::type_of(tag);
		if found != MessageType::Integer {
			return Err(Error::type_mismatch(MessageType::Integer, found))
		}
		self.source.read_u8()?;

		Ok(match tag {
			format::UINT8 => self.source.read_array::<1>()?[0] as i64,
			format::UINT16 => u16::from_be_bytes(self.source.read_array()?) as i64,
			format::UINT32 => u32::from_be_bytes(self.source.read_array()?) as i64,
			format::UINT64 => {
				let value = u64::from_be_bytes(self.source.read_array()?);
				i64::try_from(value).map_err(|_| Error::integer_overflow())?
			}
			format::INT8 => self.source.read_array::<1>()?[0] as i8 as i64,
			format::INT16 => i16::from_be_bytes(self.source.read_array()?) as i64,
			format::INT32 => i32::from_be_bytes(self.source.read_array()?) as i64,
			format::INT64 => i64::from_be_bytes(self.source.read_array()?),
			_ => unreachable!("classified as Integer above"),
		})
	}

	/// Reads the upcoming unsigned 64-bit integer losslessly. Use this for
	/// values the wire format permits to exceed `i64::MAX`.
	pub fn read_u64(&mut self) -> Result<u64> {
		let tag = self.source.peek_u8()?;
		if format::is_positive_fix_int(tag) {
			self.source.read_u8()?;
			return Ok(tag as u64)
		}
		if format::is_negative_fix_int(tag) {
			return Err(Error::integer_overflow())
		}

		let found = format::type_of(tag);
		if found != MessageType::Integer {
			return Err(Error::type_mismatch(MessageType::Integer, found))
		}
		self.source.read_u8()?;

		match tag {
			format::UINT8 => Ok(self.source.read_array::<1>()?[0] as u64),
			format::UINT16 => Ok(u16::from_be_bytes(self.source.read_array()?) as u64),
			format::UINT32 => Ok(u32::from_be_bytes(self.source.read_array()?) as u64),
			format::UINT64 => Ok(u64::from_be_bytes(self.source.read_array()?)),
			format::INT8 | format::INT16 | format::INT32 | format::INT64 => {
				let signed = match tag {
					format::INT8 => self.source.read_array::<1>()?[0] as i8 as i64,
					format::INT16 => i16::from_be_bytes(self.source.read_array()?) as i64,
					format::INT32 => i32::from_be_bytes(self.source.read_array()?) as i64,
					format::INT64 => i64::from_be_bytes(self.source.read_array()?),
					_ => unreachable!(),
				};
				u64::try_from(signed).map_err(|_| Error::integer_overflow())
			}
			_ => unreachable!("classified as Integer above"),
		}
	}

	pub fn read_byte(&mut self) -> Result<i8> {
		i8::try_from(self.read_signed()?).map_err(|_| Error::integer_overflow())
	}

	pub fn read_short(&mut self) -> Result<i16> {
		i16::try_from(self.read_signed()?).map_err(|_| Error::integer_overflow())
	}

	pub fn read_int(&mut self) -> Result<i32> {
		i32::try_from(self.read_signed()?).map_err(|_| Error::integer_overflow())
	}

	pub fn read_long(&mut self) -> Result<i64> { self.read_signed() }

	/// Reads an IEEE-754 float, narrowing a `float64` tag's payload to `f32`
	/// if that's what's on the wire. Integer tags are never auto-promoted.
	pub fn read_float(&mut self) -> Result<f32> {
		let tag = self.expect(MessageType::Float)?;
		match tag {
			format::FLOAT32 => Ok(f32::from_be_bytes(self.source.read_array()?)),
			format::FLOAT64 => Ok(f64::from_be_bytes(self.source.read_array()?) as f32),
			_ => unreachable!("classified as Float above"),
		}
	}

	pub fn read_double(&mut self) -> Result<f64> {
		let tag = self.expect(MessageType::Float)?;
		match tag {
			format::FLOAT64 => Ok(f64::from_be_bytes(self.source.read_array()?)),
			format::FLOAT32 => Ok(f32::from_be_bytes(self.source.read_array()?) as f64),
			_ => unreachable!("classified as Float above"),
		}
	}

	/// Reads the timestamp extension (type -1), in its 4-, 8-, or 12-byte
	/// wire form.
	pub fn read_timestamp(&mut self) -> Result<Timestamp> {
		let (ext_type, len) = self.read_extension_header()?;
		if ext_type != format::TIMESTAMP_EXT_TYPE {
			return Err(Error::invalid_value("extension type is not the timestamp type"))
		}
		let bytes = self.source.read_bytes(len)?;
		Timestamp::decode(&bytes)
	}

	/// Reads a UTF-8 string, interning it if its length is within the
	/// identifier cache's limit.
	pub fn read_identifier(&mut self) -> Result<Arc<str>> {
		let len = self.read_string_header()?;
		if len > self.identifiers.max_length() {
			return Ok(Arc::from(self.source.read_utf8_string(len)?));
		}

		let bytes = self.source.read_bytes(len)?;
		let decoded = simdutf8::compat::from_utf8(&bytes)
			.map_err(|e| crate::error::Utf8Error::from_compat(e, 0))?;
		let owned = decoded.to_owned();
		Ok(self.identifiers.get_or_insert(&bytes, || Arc::from(owned)))
	}

	pub fn read_string(&mut self) -> Result<String> {
		let len = self.read_string_header()?;
		self.source.read_utf8_string(len)
	}

	/// Reads a string header, returning the byte length of the payload the
	/// caller must then consume.
	pub fn read_string_header(&mut self) -> Result<usize> {
		let tag = self.source.peek_u8()?;
		let found = format::type_of(tag);
		if found != MessageType::String {
			return Err(Error::type_mismatch(MessageType::String, found))
		}
		self.source.read_u8()?;

		Ok(if format::is_fix_str(tag) {
			(tag & 0x1f) as usize
		} else {
			match tag {
				format::STR8 => self.source.read_array::<1>()?[0] as usize,
				format::STR16 => u16::from_be_bytes(self.source.read_array()?) as usize,
				format::STR32 => u32::from_be_bytes(self.source.read_array()?) as usize,
				_ => unreachable!("classified as String above"),
			}
		})
	}

	pub fn read_binary_header(&mut self) -> Result<usize> {
		let tag = self.source.peek_u8()?;
		let found = format::type_of(tag);
		if found != MessageType::Binary {
			return Err(Error::type_mismatch(MessageType::Binary, found))
		}
		self.source.read_u8()?;

		Ok(match tag {
			format::BIN8 => self.source.read_array::<1>()?[0] as usize,
			format::BIN16 => u16::from_be_bytes(self.source.read_array()?) as usize,
			format::BIN32 => u32::from_be_bytes(self.source.read_array()?) as usize,
			_ => unreachable!("classified as Binary above"),
		})
	}

	pub fn read_binary(&mut self) -> Result<Vec<u8>> {
		let len = self.read_binary_header()?;
		self.source.read_bytes(len)
	}

	/// Reads an extension header, returning its type id and payload length.
	pub fn read_extension_header(&mut self) -> Result<(i8, usize)> {
		let tag = self.source.peek_u8()?;
		let found = format::type_of(tag);
		if found != MessageType::Extension {
			return Err(Error::type_mismatch(MessageType::Extension, found))
		}
		self.source.read_u8()?;

		let len = match tag {
			format::FIXEXT1 => 1,
			format::FIXEXT2 => 2,
			format::FIXEXT4 => 4,
			format::FIXEXT8 => 8,
			format::FIXEXT16 => 16,
			format::EXT8 => self.source.read_array::<1>()?[0] as usize,
			format::EXT16 => u16::from_be_bytes(self.source.read_array()?) as usize,
			format::EXT32 => u32::from_be_bytes(self.source.read_array()?) as usize,
			_ => unreachable!("classified as Extension above"),
		};
		let ext_type = self.source.read_array::<1>()?[0] as i8;
		Ok((ext_type, len))
	}

	pub fn read_array_header(&mut self) -> Result<usize> {
		let tag = self.source.peek_u8()?;
		let found = format::type_of(tag);
		if found != MessageType::Array {
			return Err(Error::type_mismatch(MessageType::Array, found))
		}
		self.source.read_u8()?;

		Ok(if format::is_fix_array(tag) {
			(tag & 0x0f) as usize
		} else {
			match tag {
				format::ARRAY16 => u16::from_be_bytes(self.source.read_array()?) as usize,
				format::ARRAY32 => u32::from_be_bytes(self.source.read_array()?) as usize,
				_ => unreachable!("classified as Array above"),
			}
		})
	}

	pub fn read_map_header(&mut self) -> Result<usize> {
		let tag = self.source.peek_u8()?;
		let found = format::type_of(tag);
		if found != MessageType::Map {
			return Err(Error::type_mismatch(MessageType::Map, found))
		}
		self.source.read_u8()?;

		Ok(if format::is_fix_map(tag) {
			(tag & 0x0f) as usize
		} else {
			match tag {
				format::MAP16 => u16::from_be_bytes(self.source.read_array()?) as usize,
				format::MAP32 => u32::from_be_bytes(self.source.read_array()?) as usize,
				_ => unreachable!("classified as Map above"),
			}
		})
	}

	/// Copies exactly `dest.len()` raw bytes, for callers that already know
	/// a payload's length (e.g. after `read_binary_header`).
	pub fn read_payload(&mut self, dest: &mut [u8]) -> Result<()> {
		self.source.read_payload(dest)
	}

	/// Advances past `n` whole values, expanding arrays by their element
	/// count and maps by twice their entry count. Never allocates.
	pub fn skip_value(&mut self, n: usize) -> Result<()> {
		let mut remaining = n;
		while remaining > 0 {
			remaining -= 1;
			self.skip_one()?;
		}
		Ok(())
	}

	fn skip_one(&mut self) -> Result<()> {
		let tag = self.source.read_u8()?;
		let found = format::type_of(tag);
		match found {
			MessageType::Nil | MessageType::Boolean => Ok(()),
			MessageType::Integer => self.skip_integer_payload(tag),
			MessageType::Float => self.source.skip_bytes(if tag == format::FLOAT32 { 4 } else { 8 }),
			MessageType::String => {
				let len = self.read_string_header_payload_only(tag)?;
				self.source.skip_bytes(len)
			}
			MessageType::Binary => {
				let len = self.read_length_payload_only(tag, format::BIN8, format::BIN16, format::BIN32)?;
				self.source.skip_bytes(len)
			}
			MessageType::Array => {
				let count = self.read_count_payload_only(tag, 0x0f, format::ARRAY16, format::ARRAY32)?;
				self.skip_value(count)
			}
			MessageType::Map => {
				let count = self.read_count_payload_only(tag, 0x0f, format::MAP16, format::MAP32)?;
				self.skip_value(count * 2)
			}
			MessageType::Extension => {
				let len = match tag {
					format::FIXEXT1 => 1,
					format::FIXEXT2 => 2,
					format::FIXEXT4 => 4,
					format::FIXEXT8 => 8,
					format::FIXEXT16 => 16,
					format::EXT8 => self.source.read_array::<1>()?[0] as usize,
					format::EXT16 => u16::from_be_bytes(self.source.read_array()?) as usize,
					format::EXT32 => u32::from_be_bytes(self.source.read_array()?) as usize,
					_ => unreachable!("classified as Extension above"),
				};
				self.source.skip_bytes(len + 1) // + the type-id byte
			}
		}
	}

	fn skip_integer_payload(&mut self, tag: u8) -> Result<()> {
		if format::is_fix_int(tag) { return Ok(()) }
		let len = match tag {
			format::UINT8 | format::INT8 => 1,
			format::UINT16 | format::INT16 => 2,
			format::UINT32 | format::INT32 => 4,
			format::UINT64 | format::INT64 => 8,
			_ => unreachable!("classified as Integer above"),
		};
		self.source.skip_bytes(len)
	}

	fn read_string_header_payload_only(&mut self, tag: u8) -> Result<usize> {
		if format::is_fix_str(tag) { return Ok((tag & 0x1f) as usize) }
		match tag {
			format::STR8 => Ok(self.source.read_array::<1>()?[0] as usize),
			format::STR16 => Ok(u16::from_be_bytes(self.source.read_array()?) as usize),
			format::STR32 => Ok(u32::from_be_bytes(self.source.read_array()?) as usize),
			_ => unreachable!("classified as String above"),
		}
	}

	fn read_length_payload_only(&mut self, tag: u8, w8: u8, w16: u8, w32: u8) -> Result<usize> {
		Ok(match tag {
			t if t == w8 => self.source.read_array::<1>()?[0] as usize,
			t if t == w16 => u16::from_be_bytes(self.source.read_array()?) as usize,
			t if t == w32 => u32::from_be_bytes(self.source.read_array()?) as usize,
			_ => unreachable!(),
		})
	}

	fn read_count_payload_only(&mut self, tag: u8, fix_mask: u8, w16: u8, w32: u8) -> Result<usize> {
		Ok(if tag & 0xf0 == 0x90 || tag & 0xf0 == 0x80 {
			(tag & fix_mask) as usize
		} else if tag == w16 {
			u16::from_be_bytes(self.source.read_array()?) as usize
		} else if tag == w32 {
			u32::from_be_bytes(self.source.read_array()?) as usize
		} else {
			unreachable!()
		})
	}

	pub fn close(&mut self) -> Result { self.source.close() }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::writer::MessageWriter;

	fn roundtrip_bytes(bytes: &[u8]) -> MessageReader<&[u8]> {
		MessageReader::of(bytes).unwrap()
	}

	#[test]
	fn reads_nil_bool_int_string_in_order() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_nil().unwrap();
			w.write_bool(true).unwrap();
			w.write_i64(42).unwrap();
			w.write_str("Hello").unwrap();
			w.close().unwrap();
		}
		assert_eq!(out, [0xc0, 0xc3, 0x2a, 0xa5, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);

		let mut r = roundtrip_bytes(&out);
		assert_eq!(r.next_type().unwrap(), MessageType::Nil);
		r.read_nil().unwrap();
		assert_eq!(r.next_type().unwrap(), MessageType::Boolean);
		assert_eq!(r.read_boolean().unwrap(), true);
		assert_eq!(r.next_type().unwrap(), MessageType::Integer);
		assert_eq!(r.read_long().unwrap(), 42);
		assert_eq!(r.next_type().unwrap(), MessageType::String);
		assert_eq!(r.read_string().unwrap(), "Hello");
	}

	#[test]
	fn reads_array_of_ints() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_array_header(3).unwrap();
			w.write_i64(1).unwrap();
			w.write_i64(2).unwrap();
			w.write_i64(3).unwrap();
		}
		assert_eq!(out, [0x93, 0x01, 0x02, 0x03]);

		let mut r = roundtrip_bytes(&out);
		assert_eq!(r.read_array_header().unwrap(), 3);
		assert_eq!(r.read_long().unwrap(), 1);
		assert_eq!(r.read_long().unwrap(), 2);
		assert_eq!(r.read_long().unwrap(), 3);
	}

	#[test]
	fn byte_overflow_fails_but_short_succeeds() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_i64(128).unwrap();
		}
		assert_eq!(out, [0xcc, 0x80]);

		let mut r = roundtrip_bytes(&out);
		assert!(MessageReader::of(&out[..]).unwrap().read_byte().is_err());
		assert_eq!(r.read_short().unwrap(), 128);
	}

	#[test]
	fn map_of_one_entry() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_map_header(1).unwrap();
			w.write_str("k").unwrap();
			w.write_str("v").unwrap();
		}
		assert_eq!(out, [0x81, 0xa1, 0x6b, 0xa1, 0x76]);

		let mut r = roundtrip_bytes(&out);
		assert_eq!(r.read_map_header().unwrap(), 1);
		assert_eq!(r.read_string().unwrap(), "k");
		assert_eq!(r.read_string().unwrap(), "v");
	}

	#[test]
	fn timestamp_epoch_roundtrip() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_timestamp(Timestamp::EPOCH).unwrap();
		}
		assert_eq!(out, [0xd6, 0xff, 0x00, 0x00, 0x00, 0x00]);

		let mut r = roundtrip_bytes(&out);
		assert_eq!(r.read_timestamp().unwrap(), Timestamp::EPOCH);
	}

	#[test]
	fn skip_value_over_nested_container() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_array_header(2).unwrap();
			w.write_map_header(1).unwrap();
			w.write_str("a").unwrap();
			w.write_i64(1).unwrap();
			w.write_str("tail").unwrap();
			w.write_str("next").unwrap();
		}

		let mut r = roundtrip_bytes(&out);
		r.skip_value(1).unwrap();
		assert_eq!(r.read_string().unwrap(), "next");
	}

	#[test]
	fn skip_equivalence_matches_reading_and_discarding() {
		let mut written = Vec::new();
		{
			let mut w = MessageWriter::of(&mut written).unwrap();
			w.write_i64(1).unwrap();
			w.write_str("two").unwrap();
			w.write_array_header(2).unwrap();
			w.write_i64(3).unwrap();
			w.write_i64(4).unwrap();
			w.write_bool(true).unwrap();
		}

		let mut skip_reader = roundtrip_bytes(&written);
		skip_reader.skip_value(4).unwrap();

		let mut discard_reader = roundtrip_bytes(&written);
		discard_reader.read_long().unwrap();
		discard_reader.read_string().unwrap();
		let n = discard_reader.read_array_header().unwrap();
		discard_reader.skip_value(n).unwrap();
		discard_reader.read_boolean().unwrap();

		// Both readers should be at end-of-stream now.
		assert!(skip_reader.next_format().is_err());
		assert!(discard_reader.next_format().is_err());
	}

	#[test]
	fn identifier_cache_interns_repeated_strings() {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			w.write_str("id").unwrap();
			w.write_str("id").unwrap();
		}
		let mut r = roundtrip_bytes(&out);
		let a = r.read_identifier().unwrap();
		let b = r.read_identifier().unwrap();
		assert!(Arc::ptr_eq(&a, &b));
	}
}
