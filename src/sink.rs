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

//! The buffered sink: blocking byte output with an internal write buffer,
//! flushed on demand.

use std::io::Write;
use crate::alloc::{BufferAllocator, PooledAllocator, SharedAllocator};
use crate::error::{Error, Result};
use crate::source::{MIN_BUFFER_CAPACITY, DEFAULT_BUFFER_CAPACITY};

#[derive(Clone)]
#[non_exhaustive]
pub struct SinkOptions {
	pub allocator: SharedAllocator,
	pub buffer_capacity: usize,
}

impl Default for SinkOptions {
	fn default() -> Self {
		Self {
			allocator: PooledAllocator::new(Default::default()),
			buffer_capacity: DEFAULT_BUFFER_CAPACITY,
		}
	}
}

/// A blocking byte sink with an internal write buffer.
///
/// `buf[0..len]` is reserved for the codec's pending writes. `ensure_remaining`
/// flushes through the channel until `n` bytes of writable space remain.
pub struct MessageSink<W> {
	output: W,
	allocator: SharedAllocator,
	buf: Vec<u8>,
	closed: bool,
}

impl<W: Write> MessageSink<W> {
	pub fn new(output: W, options: SinkOptions) -> Result<Self> {
		if options.buffer_capacity < MIN_BUFFER_CAPACITY {
			return Err(Error::buffer_too_small())
		}

		let buf = options.allocator.acquire_byte_buffer(options.buffer_capacity)?;
		Ok(Self { output, allocator: options.allocator, buf, closed: false })
	}

	pub fn of(output: W) -> Result<Self> { Self::new(output, SinkOptions::default()) }

	#[inline]
	pub fn capacity(&self) -> usize { self.buf.capacity() }

	#[inline]
	pub fn pending(&self) -> usize { self.buf.len() }

	fn is_aliased(&self, other: &[u8]) -> bool {
		if other.is_empty() { return false }
		let buf_start = self.buf.as_ptr() as usize;
		let buf_end = buf_start + self.buf.capacity();
		let other_start = other.as_ptr() as usize;
		other_start >= buf_start && other_start < buf_end
	}

	/// Flushes buffered bytes through the channel until `n` bytes of
	/// writable space remain. Fatal if `n` exceeds the buffer's capacity.
	pub fn ensure_remaining(&mut self, n: usize) -> Result<()> {
		if n > self.buf.capacity() { return Err(Error::buffer_too_small()) }

		while self.buf.capacity() - self.buf.len() < n {
			self.flush_buffer()?;
		}
		Ok(())
	}

	fn flush_buffer(&mut self) -> Result {
		if self.buf.is_empty() { return Ok(()) }
		let written = self.output.write(&self.buf)?;
		if written == 0 {
			return Err(Error::non_blocking_channel())
		}
		self.buf.drain(..written);
		Ok(())
	}

	pub fn write_u8(&mut self, value: u8) -> Result {
		self.ensure_remaining(1)?;
		self.buf.push(value);
		Ok(())
	}

	pub fn write_i8(&mut self, value: i8) -> Result { self.write_u8(value as u8) }

	pub fn write_array<const N: usize>(&mut self, bytes: [u8; N]) -> Result {
		self.ensure_remaining(N)?;
		self.buf.extend_from_slice(&bytes);
		Ok(())
	}

	/// Writes a raw payload, bypassing the UTF-8/number formatting layer.
	/// Large payloads that exceed the internal buffer are flushed and then
	/// written directly to the channel to avoid an extra copy.
	pub fn write_payload(&mut self, data: &[u8]) -> Result {
		if self.is_aliased(data) {
			return Err(Error::aliased_buffer())
		}

		if data.len() >= self.buf.capacity() {
			self.flush_buffer()?;
			self.write_direct(data)?;
			return Ok(())
		}

		self.ensure_remaining(data.len())?;
		self.buf.extend_from_slice(data);
		Ok(())
	}

	fn write_direct(&mut self, mut data: &[u8]) -> Result {
		while !data.is_empty() {
			let n = self.output.write(data)?;
			if n == 0 {
				return Err(Error::non_blocking_channel())
			}
			data = &data[n..];
		}
		Ok(())
	}

	/// Writes buffered bytes together with `extra` in a single gather write.
	/// `extra` must not alias the internal buffer.
	pub fn write_gather(&mut self, extra: &[&[u8]]) -> Result {
		for slice in extra {
			if self.is_aliased(slice) {
				return Err(Error::aliased_buffer())
			}
		}

		self.flush_buffer()?;
		for slice in extra {
			self.write_direct(slice)?;
		}
		Ok(())
	}

	/// Streams up to `max_bytes` from `source` through the internal buffer.
	pub fn transfer_from<R: std::io::Read>(&mut self, source: &mut R, max_bytes: usize) -> Result<usize> {
		let mut remaining = max_bytes;
		let mut total = 0;
		let mut chunk = vec![0u8; self.buf.capacity().min(max_bytes.max(1))];
		while remaining > 0 {
			let n = remaining.min(chunk.len());
			let read = source.read(&mut chunk[..n])?;
			if read == 0 { break }
			self.write_payload(&chunk[..read])?;
			remaining -= read;
			total += read;
		}
		Ok(total)
	}

	pub fn flush(&mut self) -> Result {
		self.flush_buffer()?;
		self.output.flush()?;
		Ok(())
	}

	pub fn close(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		let flush_result = self.flush();
		let buf = std::mem::take(&mut self.buf);
		self.allocator.release_byte_buffer(buf);
		flush_result
	}
}

impl<W> Drop for MessageSink<W> {
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
	fn ensure_remaining_flushes_to_make_room() {
		let mut out = Vec::new();
		let options = SinkOptions { buffer_capacity: MIN_BUFFER_CAPACITY, ..Default::default() };
		{
			let mut sink = MessageSink::new(&mut out, options).unwrap();
			sink.write_payload(b"abcdefgh").unwrap();
			sink.write_payload(b"ijk").unwrap();
			sink.flush().unwrap();
		}
		assert_eq!(out, b"abcdefghijk");
	}

	#[test]
	fn ensure_remaining_over_capacity_fails() {
		let mut out = Vec::new();
		let options = SinkOptions { buffer_capacity: MIN_BUFFER_CAPACITY, ..Default::default() };
		let mut sink = MessageSink::new(&mut out, options).unwrap();
		assert!(sink.ensure_remaining(100).is_err());
	}

	#[test]
	fn large_payload_bypasses_internal_buffer() {
		let mut out = Vec::new();
		{
			let mut sink = MessageSink::of(&mut out).unwrap();
			let big = vec![7u8; DEFAULT_BUFFER_CAPACITY * 2];
			sink.write_payload(&big).unwrap();
			sink.flush().unwrap();
		}
		assert_eq!(out.len(), DEFAULT_BUFFER_CAPACITY * 2);
		assert!(out.iter().all(|&b| b == 7));
	}
}
