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

//! The message writer: a stateless-per-call encoder over a [`MessageSink`].

use std::io::{Read, Write};
use crate::alloc::SharedAllocator;
use crate::error::Result;
use crate::format;
use crate::sink::{MessageSink, SinkOptions};
use crate::strcodec::HeaderClass;
use crate::timestamp::Timestamp;

/// Default UTF-8 size estimate: 3 bytes per `char`, covering the full BMP
/// plus surrogate pairs with room to spare. Over-reserves 2x for ASCII-heavy
/// text; see the module docs for the tradeoff.
pub const DEFAULT_STRING_SIZE_ESTIMATOR: usize = 3;

#[derive(Clone)]
#[non_exhaustive]
pub struct WriterOptions {
	pub allocator: SharedAllocator,
	pub buffer_capacity: usize,
	pub string_size_estimator: usize,
}

impl Default for WriterOptions {
	fn default() -> Self {
		let sink = SinkOptions::default();
		Self {
			allocator: sink.allocator,
			buffer_capacity: sink.buffer_capacity,
			string_size_estimator: DEFAULT_STRING_SIZE_ESTIMATOR,
		}
	}
}

/// Encodes MessagePack values to a blocking byte sink, always choosing the
/// smallest legal wire representation.
pub struct MessageWriter<W> {
	sink: MessageSink<W>,
	string_size_estimator: usize,
}

impl<W: Write> MessageWriter<W> {
	pub fn new(output: W, options: WriterOptions) -> Result<Self> {
		let sink = MessageSink::new(output, SinkOptions {
			allocator: options.allocator,
			buffer_capacity: options.buffer_capacity,
		})?;
		Ok(Self { sink, string_size_estimator: options.string_size_estimator })
	}

	pub fn of(output: W) -> Result<Self> { Self::new(output, WriterOptions::default()) }

	pub fn write_nil(&mut self) -> Result { self.sink.write_u8(format::NIL) }

	pub fn write_bool(&mut self, value: bool) -> Result {
		self.sink.write_u8(if value { format::TRUE } else { format::FALSE })
	}

	/// Writes the smallest legal integer encoding for `value`: fixint for
	/// `-32..=127`, else the narrowest sized tag that fits.
	pub fn write_i64(&mut self, value: i64) -> Result {
		if (format::NEGATIVE_FIXINT_MIN..=format::POSITIVE_FIXINT_MAX).contains(&value) {
			return self.sink.write_u8(value as i8 as u8)
		}

		if value >= 0 {
			let value = value as u64;
			return if value <= u8::MAX as u64 {
				self.sink.write_u8(format::UINT8)?;
				self.sink.write_u8(value as u8)
			} else if value <= u16::MAX as u64 {
				self.sink.write_u8(format::UINT16)?;
				self.sink.write_array((value as u16).to_be_bytes())
			} else if value <= u32::MAX as u64 {
				self.sink.write_u8(format::UINT32)?;
				self.sink.write_array((value as u32).to_be_bytes())
			} else {
				self.sink.write_u8(format::UINT64)?;
				self.sink.write_array(value.to_be_bytes())
			}
		}

		if value >= i8::MIN as i64 {
			self.sink.write_u8(format::INT8)?;
			self.sink.write_u8(value as i8 as u8)
		} else if value >= i16::MIN as i64 {
			self.sink.write_u8(format::INT16)?;
			self.sink.write_array((value as i16).to_be_bytes())
		} else if value >= i32::MIN as i64 {
			self.sink.write_u8(format::INT32)?;
			self.sink.write_array((value as i32).to_be_bytes())
		} else {
			self.sink.write_u8(format::INT64)?;
			self.sink.write_array(value.to_be_bytes())
		}
	}

	/// Writes an unsigned 64-bit integer losslessly, including values beyond
	/// `i64::MAX`.
	pub fn write_u64(&mut self, value: u64) -> Result {
		if value <= format::POSITIVE_FIXINT_MAX as u64 {
			return self.sink.write_u8(value as u8)
		}
		if value <= u8::MAX as u64 {
			self.sink.write_u8(format::UINT8)?;
			self.sink.write_u8(value as u8)
		} else if value <= u16::MAX as u64 {
			self.sink.write_u8(format::UINT16)?;
			self.sink.write_array((value as u16).to_be_bytes())
		} else if value <= u32::MAX as u64 {
			self.sink.write_u8(format::UINT32)?;
			self.sink.write_array((value as u32).to_be_bytes())
		} else {
			self.sink.write_u8(format::UINT64)?;
			self.sink.write_array(value.to_be_bytes())
		}
	}

	pub fn write_f32(&mut self, value: f32) -> Result {
		self.sink.write_u8(format::FLOAT32)?;
		self.sink.write_array(value.to_be_bytes())
	}

	pub fn write_f64(&mut self, value: f64) -> Result {
		self.sink.write_u8(format::FLOAT64)?;
		self.sink.write_array(value.to_be_bytes())
	}

	/// Writes the timestamp extension (type -1), choosing the smallest of
	/// the three wire layouts that loses no precision.
	pub fn write_timestamp(&mut self, value: Timestamp) -> Result {
		let bytes = value.encode();
		self.write_extension_header(format::TIMESTAMP_EXT_TYPE, bytes.as_slice().len())?;
		self.sink.write_payload(bytes.as_slice())
	}

	/// Writes a UTF-8 string. The header width is chosen from the exact byte
	/// length, since Rust's `&str` always carries it upfront.
	pub fn write_str(&mut self, value: &str) -> Result {
		self.write_string_header(value.len())?;
		self.sink.write_payload(value.as_bytes())
	}

	/// Writes a UTF-8 string built from a `char` iterator whose total byte
	/// length isn't known upfront: reserves a header using the size
	/// estimator, encodes into a scratch buffer, then backfills.
	pub fn write_str_chars(&mut self, chars: impl Iterator<Item = char> + Clone) -> Result {
		let char_count = chars.clone().count();
		let mut scratch = String::with_capacity(char_count * self.string_size_estimator);
		scratch.extend(chars);
		self.write_str(&scratch)
	}

	pub fn write_bytes(&mut self, value: &[u8]) -> Result {
		self.write_binary_header(value.len())?;
		self.sink.write_payload(value)
	}

	pub fn write_string_header(&mut self, byte_len: usize) -> Result {
		let class = HeaderClass::for_str_len(byte_len);
		let tag = class.str_tag(byte_len);
		self.sink.write_u8(tag)?;
		match class {
			HeaderClass::Fix => Ok(()),
			HeaderClass::W8 => self.sink.write_u8(byte_len as u8),
			HeaderClass::W16 => self.sink.write_array((byte_len as u16).to_be_bytes()),
			HeaderClass::W32 => self.sink.write_array((byte_len as u32).to_be_bytes()),
		}
	}

	pub fn write_binary_header(&mut self, byte_len: usize) -> Result {
		let class = HeaderClass::for_bin_len(byte_len);
		self.sink.write_u8(class.bin_tag())?;
		match class {
			HeaderClass::Fix => unreachable!("binary has no fix class"),
			HeaderClass::W8 => self.sink.write_u8(byte_len as u8),
			HeaderClass::W16 => self.sink.write_array((byte_len as u16).to_be_bytes()),
			HeaderClass::W32 => self.sink.write_array((byte_len as u32).to_be_bytes()),
		}
	}

	pub fn write_extension_header(&mut self, ext_type: i8, byte_len: usize) -> Result {
		let tag = match byte_len {
			1 => Some(format::FIXEXT1),
			2 => Some(format::FIXEXT2),
			4 => Some(format::FIXEXT4),
			8 => Some(format::FIXEXT8),
			16 => Some(format::FIXEXT16),
			_ => None,
		};

		if let Some(tag) = tag {
			self.sink.write_u8(tag)?;
		} else if byte_len <= u8::MAX as usize {
			self.sink.write_u8(format::EXT8)?;
			self.sink.write_u8(byte_len as u8)?;
		} else if byte_len <= u16::MAX as usize {
			self.sink.write_u8(format::EXT16)?;
			self.sink.write_array((byte_len as u16).to_be_bytes())?;
		} else {
			self.sink.write_u8(format::EXT32)?;
			self.sink.write_array((byte_len as u32).to_be_bytes())?;
		}

		self.sink.write_i8(ext_type)
	}

	pub fn write_array_header(&mut self, count: usize) -> Result {
		if count <= format::FIXARRAY_MAX {
			self.sink.write_u8(format::fix_array_tag(count))
		} else if count <= u16::MAX as usize {
			self.sink.write_u8(format::ARRAY16)?;
			self.sink.write_array((count as u16).to_be_bytes())
		} else {
			self.sink.write_u8(format::ARRAY32)?;
			self.sink.write_array((count as u32).to_be_bytes())
		}
	}

	pub fn write_map_header(&mut self, count: usize) -> Result {
		if count <= format::FIXMAP_MAX {
			self.sink.write_u8(format::fix_map_tag(count))
		} else if count <= u16::MAX as usize {
			self.sink.write_u8(format::MAP16)?;
			self.sink.write_array((count as u16).to_be_bytes())
		} else {
			self.sink.write_u8(format::MAP32)?;
			self.sink.write_array((count as u32).to_be_bytes())
		}
	}

	/// Writes a raw payload, bypassing header selection. Used after writing
	/// a binary/string/extension header by hand.
	pub fn write_payload(&mut self, data: &[u8]) -> Result { self.sink.write_payload(data) }

	/// Streams up to `max_bytes` from `source` through the sink.
	pub fn write_from<R: Read>(&mut self, source: &mut R, max_bytes: usize) -> Result<usize> {
		self.sink.transfer_from(source, max_bytes)
	}

	pub fn flush(&mut self) -> Result { self.sink.flush() }

	pub fn close(&mut self) -> Result { self.sink.close() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn written<F: FnOnce(&mut MessageWriter<&mut Vec<u8>>) -> Result>(f: F) -> Vec<u8> {
		let mut out = Vec::new();
		{
			let mut w = MessageWriter::of(&mut out).unwrap();
			f(&mut w).unwrap();
		}
		out
	}

	#[test]
	fn smallest_int_encoding_boundaries() {
		assert_eq!(written(|w| w.write_i64(0)), [0x00]);
		assert_eq!(written(|w| w.write_i64(127)), [0x7f]);
		assert_eq!(written(|w| w.write_i64(128)), [0xcc, 0x80]);
		assert_eq!(written(|w| w.write_i64(-1)), [0xff]);
		assert_eq!(written(|w| w.write_i64(-32)), [0xe0]);
		assert_eq!(written(|w| w.write_i64(-33)), [0xd0, 0xdf]);
		assert_eq!(written(|w| w.write_i64(256)), [0xcd, 0x01, 0x00]);
		assert_eq!(written(|w| w.write_i64(65536)), [0xce, 0x00, 0x01, 0x00, 0x00]);
		assert_eq!(written(|w| w.write_i64(i64::MIN)), {
			let mut v = vec![0xd3];
			v.extend_from_slice(&i64::MIN.to_be_bytes());
			v
		});
	}

	#[test]
	fn long_ascii_string_uses_str8() {
		let s = "a".repeat(40);
		let out = written(|w| w.write_str(&s));
		assert_eq!(&out[..2], [0xd9, 0x28]);
		assert_eq!(&out[2..], vec![0x61u8; 40].as_slice());
	}

	#[test]
	fn fixstr_boundary() {
		let s = "a".repeat(31);
		let out = written(|w| w.write_str(&s));
		assert_eq!(out[0], 0xbf);
		let s = "a".repeat(32);
		let out = written(|w| w.write_str(&s));
		assert_eq!(&out[..2], [0xd9, 0x20]);
	}

	#[test]
	fn array_and_map_headers() {
		assert_eq!(written(|w| w.write_array_header(15)), [0x9f]);
		assert_eq!(written(|w| w.write_array_header(16)), [0xdc, 0x00, 0x10]);
		assert_eq!(written(|w| w.write_map_header(15)), [0x8f]);
		assert_eq!(written(|w| w.write_map_header(16)), [0xde, 0x00, 0x10]);
	}

	#[test]
	fn u64_beyond_i64_max_is_lossless() {
		let value = u64::MAX;
		let out = written(|w| w.write_u64(value));
		assert_eq!(out, {
			let mut v = vec![0xcf];
			v.extend_from_slice(&value.to_be_bytes());
			v
		});
	}
}
