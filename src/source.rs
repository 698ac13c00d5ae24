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

//! The buffered source: blocking byte input with an internal read buffer,
//! refilled on demand.

use std::io::Read;
use simdutf8::compat::from_utf8;
use crate::alloc::{BufferAllocator, PooledAllocator, SharedAllocator};
use crate::error::{Error, Result};
use crate::error::utf8::Utf8Error;

/// The minimum buffer capacity: a tag byte plus a 64-bit payload.
pub const MIN_BUFFER_CAPACITY: usize = 9;
/// The default internal buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

#[derive(Clone)]
#[non_exhaustive]
pub struct SourceOptions {
	pub allocator: SharedAllocator,
	pub buffer_capacity: usize,
}

impl Default for SourceOptions {
	fn default() -> Self {
		Self {
			allocator: PooledAllocator::new(Default::default()),
			buffer_capacity: DEFAULT_BUFFER_CAPACITY,
		}
	}
}

/// A blocking byte source with an internal read buffer.
///
/// The buffer's readable region, `buf[pos..filled]`, always holds bytes not
/// yet consumed by the codec. `ensure_remaining` compacts unread bytes to the
/// front, then refills until enough are present or the channel is exhausted.
pub struct MessageSource<R> {
	input: R,
	allocator: SharedAllocator,
	buf: Vec<u8>,
	pos: usize,
	filled: usize,
	closed: bool,
}

impl<R: Read> MessageSource<R> {
	pub fn new(input: R, options: SourceOptions) -> Result<Self> {
		if options.buffer_capacity < MIN_BUFFER_CAPACITY {
			return Err(Error::buffer_too_small())
		}

		let buf = options.allocator.acquire_byte_buffer(options.buffer_capacity)?;
		Ok(Self {
			input,
			allocator: options.allocator,
			buf,
			pos: 0,
			filled: 0,
			closed: false,
		})
	}

	pub fn of(input: R) -> Result<Self> { Self::new(input, SourceOptions::default()) }

	/// The number of unread bytes currently buffered.
	#[inline]
	pub fn readable(&self) -> usize { self.filled - self.pos }

	#[inline]
	pub fn capacity(&self) -> usize { self.buf.capacity() }

	fn readable_slice(&self) -> &[u8] { &self.buf[self.pos..self.filled] }

	/// Moves unread bytes to the front of the buffer.
	fn compact(&mut self) {
		if self.pos == 0 { return }
		self.buf.copy_within(self.pos..self.filled, 0);
		self.filled -= self.pos;
		self.pos = 0;
	}

	/// Guarantees the buffer holds at least `n` readable bytes, refilling
	/// from the channel as needed.
	pub fn ensure_remaining(&mut self, n: usize) -> Result<()> {
		if n > self.buf.capacity() { return Err(Error::buffer_too_small()) }
		if self.readable() >= n { return Ok(()) }

		self.compact();
		// SAFETY-free: we only ever read into the uninitialized tail after
		// growing the buffer's logical length with zero-fill, never reading
		// uninitialized memory.
		if self.buf.len() < self.buf.capacity() {
			self.buf.resize(self.buf.capacity(), 0);
		}

		while self.readable() < n {
			if self.filled == self.buf.len() {
				// Caller asked for more than the buffer can ever hold.
				return Err(Error::buffer_too_small())
			}

			let read = self.input.read(&mut self.buf[self.filled..])?;
			if read == 0 {
				return Err(Error::end_of_input())
			}
			self.filled += read;
		}

		Ok(())
	}

	/// Reads directly into the caller's buffer, preferring buffered bytes
	/// before falling back to the channel. Returns `-1` on EOF.
	pub fn read_any(&mut self, target: &mut [u8]) -> Result<isize> {
		if target.is_empty() { return Ok(0) }

		if self.readable() > 0 {
			let n = target.len().min(self.readable());
			target[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
			self.pos += n;
			return Ok(n as isize)
		}

		let read = self.input.read(target)?;
		if read == 0 {
			return Ok(-1)
		}
		Ok(read as isize)
	}

	/// Moves exactly `byte_count` bytes to `sink`, buffered bytes first, then
	/// a direct channel-to-channel relay for the remainder.
	pub fn transfer_to<W: std::io::Write>(
		&mut self,
		sink: &mut crate::sink::MessageSink<W>,
		mut byte_count: usize,
	) -> Result<()> {
		while byte_count > 0 && self.readable() > 0 {
			let n = byte_count.min(self.readable());
			sink.write_payload(&self.buf[self.pos..self.pos + n])?;
			self.pos += n;
			byte_count -= n;
		}

		let mut relay = [0u8; 4096];
		while byte_count > 0 {
			let n = byte_count.min(relay.len());
			self.input.read_exact(&mut relay[..n])?;
			sink.write_payload(&relay[..n])?;
			byte_count -= n;
		}

		Ok(())
	}

	/// Returns the next byte without consuming it.
	pub fn peek_u8(&mut self) -> Result<u8> {
		self.ensure_remaining(1)?;
		Ok(self.buf[self.pos])
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		self.ensure_remaining(1)?;
		let byte = self.buf[self.pos];
		self.pos += 1;
		Ok(byte)
	}

	pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		self.ensure_remaining(N)?;
		let mut out = [0u8; N];
		out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
		self.pos += N;
		Ok(out)
	}

	/// Copies exactly `dest.len()` bytes into `dest`.
	pub fn read_payload(&mut self, dest: &mut [u8]) -> Result<()> {
		let mut off = 0;
		while off < dest.len() {
			if self.readable() == 0 {
				self.ensure_remaining((dest.len() - off).min(self.buf.capacity()))?;
			}
			let n = (dest.len() - off).min(self.readable());
			dest[off..off + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
			self.pos += n;
			off += n;
		}
		Ok(())
	}

	/// Reads a byte payload of `len` bytes as an owned `Vec<u8>`.
	pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
		let mut out = vec![0u8; len];
		self.read_payload(&mut out)?;
		Ok(out)
	}

	/// Decodes `len` bytes of UTF-8 into a freshly acquired `String`.
	pub fn read_utf8_string(&mut self, len: usize) -> Result<String> {
		let mut chars = self.allocator.acquire_char_buffer(len)?;
		if let Err(err) = self.read_utf8_into(&mut chars, len) {
			self.allocator.release_char_buffer(chars);
			return Err(err)
		}
		Ok(chars)
	}

	/// Decodes `len` bytes of UTF-8, appending into the caller-supplied
	/// buffer. Used by the identifier cache to decode into a reusable buffer.
	pub fn read_utf8_into(&mut self, chars: &mut String, mut remaining: usize) -> Result<()> {
		let mut offset = 0;
		while remaining > 0 {
			if self.readable() == 0 {
				self.ensure_remaining(remaining.min(self.buf.capacity()))?;
			}
			let n = remaining.min(self.readable());
			let chunk = &self.buf[self.pos..self.pos + n];
			let s = from_utf8(chunk).map_err(|e| Utf8Error::from_compat(e, offset))?;
			chars.push_str(s);
			self.pos += n;
			offset += n;
			remaining -= n;
		}
		Ok(())
	}

	/// Advances past `byte_count` bytes without allocating.
	pub fn skip_bytes(&mut self, mut byte_count: usize) -> Result<()> {
		while byte_count > 0 {
			if self.readable() == 0 {
				self.ensure_remaining(byte_count.min(self.buf.capacity()))?;
			}
			let n = byte_count.min(self.readable());
			self.pos += n;
			byte_count -= n;
		}
		Ok(())
	}

	pub fn close(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		let buf = std::mem::take(&mut self.buf);
		self.allocator.release_byte_buffer(buf);
		Ok(())
	}
}

impl<R> Drop for MessageSource<R> {
	fn drop(&mut self) {
		if !self.closed {
			let buf = std::mem::take(&mut self.buf);
			self.allocator.release_byte_buffer(buf);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ensure_remaining_refills_across_short_reads() {
		struct Stutter(Vec<u8>);
		impl Read for Stutter {
			fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
				let n = 1.min(buf.len()).min(self.0.len());
				buf[..n].copy_from_slice(&self.0[..n]);
				self.0.drain(..n);
				Ok(n)
			}
		}

		let mut src = MessageSource::of(Stutter(vec![1, 2, 3, 4, 5])).unwrap();
		src.ensure_remaining(5).unwrap();
		assert_eq!(src.readable(), 5);
	}

	#[test]
	fn ensure_remaining_over_capacity_fails() {
		let options = SourceOptions { buffer_capacity: MIN_BUFFER_CAPACITY, ..Default::default() };
		let mut src = MessageSource::new(&b"abc"[..], options).unwrap();
		assert!(src.ensure_remaining(100).is_err());
	}

	#[test]
	fn skip_bytes_advances_without_reading_payload() {
		let mut src = MessageSource::of(&b"hello world"[..]).unwrap();
		src.skip_bytes(6).unwrap();
		assert_eq!(src.read_bytes(5).unwrap(), b"world");
	}
}
