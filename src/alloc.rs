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

//! The buffer allocator: pooled and unpooled acquire/release of byte and
//! character buffers, respecting a handful of capacity caps.
//!
//! A single mutex guards each pool's free lists. Acquisition only happens at
//! reader/writer construction, close, and oversized-string scratch-path
//! boundaries, so contention on the steady-state hot path is not a concern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};

/// Tuning knobs for [`PooledAllocator`]. Unpooled allocators only honor the
/// two `max_*_buffer_capacity` caps.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct AllocatorOptions {
	pub max_byte_buffer_capacity: usize,
	pub max_char_buffer_capacity: usize,
	pub max_pooled_byte_buffer_capacity: usize,
	pub max_pooled_char_buffer_capacity: usize,
	pub max_byte_buffer_pool_capacity: usize,
	pub max_char_buffer_pool_capacity: usize,
	pub prefer_direct_buffers: bool,
}

impl Default for AllocatorOptions {
	fn default() -> Self {
		Self {
			max_byte_buffer_capacity: 1 << 30,
			max_char_buffer_capacity: 1 << 30,
			max_pooled_byte_buffer_capacity: 1 << 20,
			max_pooled_char_buffer_capacity: 1 << 20,
			max_byte_buffer_pool_capacity: 1 << 24,
			max_char_buffer_pool_capacity: 1 << 24,
			prefer_direct_buffers: false,
		}
	}
}

/// Rounds `cap` up to the next power of two, the pool's bucketing key.
fn size_class(cap: usize) -> usize { cap.next_power_of_two().max(1) }

/// Acquire/release of reusable byte and character buffers.
///
/// Buffers are always handed out reset to empty with capacity at least the
/// requested amount. `close` drops all pooled buffers; every acquire after
/// that fails.
pub trait BufferAllocator: Send + Sync {
	fn acquire_byte_buffer(&self, cap: usize) -> Result<Vec<u8>>;
	fn release_byte_buffer(&self, buf: Vec<u8>);
	fn acquire_char_buffer(&self, cap: usize) -> Result<String>;
	fn release_char_buffer(&self, buf: String);
	fn close(&self);
	fn options(&self) -> &AllocatorOptions;
}

/// A shared handle to a [`BufferAllocator`].
pub type SharedAllocator = Arc<dyn BufferAllocator>;

/// Every `acquire` allocates fresh; every `release` frees immediately.
pub struct UnpooledAllocator {
	options: AllocatorOptions,
	closed: Mutex<bool>,
}

impl UnpooledAllocator {
	pub fn new(options: AllocatorOptions) -> SharedAllocator {
		Arc::new(Self { options, closed: Mutex::new(false) })
	}
}

impl BufferAllocator for UnpooledAllocator {
	fn acquire_byte_buffer(&self, cap: usize) -> Result<Vec<u8>> {
		if *self.closed.lock().unwrap() { return Err(Error::closed()) }
		if cap > self.options.max_byte_buffer_capacity {
			return Err(Error::allocator_capacity())
		}
		Ok(Vec::with_capacity(cap))
	}

	fn release_byte_buffer(&self, _buf: Vec<u8>) { /* dropped */ }

	fn acquire_char_buffer(&self, cap: usize) -> Result<String> {
		if *self.closed.lock().unwrap() { return Err(Error::closed()) }
		if cap > self.options.max_char_buffer_capacity {
			return Err(Error::allocator_capacity())
		}
		Ok(String::with_capacity(cap))
	}

	fn release_char_buffer(&self, _buf: String) { /* dropped */ }

	fn close(&self) { *self.closed.lock().unwrap() = true; }

	fn options(&self) -> &AllocatorOptions { &self.options }
}

#[derive(Default)]
struct Pool {
	buckets: HashMap<usize, Vec<Vec<u8>>>,
	total_capacity: usize,
}

#[derive(Default)]
struct CharPool {
	buckets: HashMap<usize, Vec<String>>,
	total_capacity: usize,
}

/// Maintains per-size-class free lists, respecting the configured caps.
pub struct PooledAllocator {
	options: AllocatorOptions,
	bytes: Mutex<Pool>,
	chars: Mutex<CharPool>,
	closed: Mutex<bool>,
}

impl PooledAllocator {
	pub fn new(options: AllocatorOptions) -> SharedAllocator {
		Arc::new(Self {
			options,
			bytes: Mutex::new(Pool::default()),
			chars: Mutex::new(CharPool::default()),
			closed: Mutex::new(false),
		})
	}
}

impl BufferAllocator for PooledAllocator {
	fn acquire_byte_buffer(&self, cap: usize) -> Result<Vec<u8>> {
		if *self.closed.lock().unwrap() { return Err(Error::closed()) }
		if cap > self.options.max_byte_buffer_capacity {
			return Err(Error::allocator_capacity())
		}

		let class = size_class(cap);
		let mut pool = self.bytes.lock().unwrap();
		if let Some(bucket) = pool.buckets.get_mut(&class) {
			if let Some(mut buf) = bucket.pop() {
				pool.total_capacity -= buf.capacity();
				buf.clear();
				return Ok(buf)
			}
		}
		drop(pool);
		Ok(Vec::with_capacity(cap))
	}

	fn release_byte_buffer(&self, mut buf: Vec<u8>) {
		buf.clear();
		let cap = buf.capacity();
		if cap == 0 || cap > self.options.max_pooled_byte_buffer_capacity {
			return
		}

		let mut pool = self.bytes.lock().unwrap();
		if pool.total_capacity + cap > self.options.max_byte_buffer_pool_capacity {
			return
		}
		pool.total_capacity += cap;
		pool.buckets.entry(size_class(cap)).or_default().push(buf);
	}

	fn acquire_char_buffer(&self, cap: usize) -> Result<String> {
		if *self.closed.lock().unwrap() { return Err(Error::closed()) }
		if cap > self.options.max_char_buffer_capacity {
			return Err(Error::allocator_capacity())
		}

		let class = size_class(cap);
		let mut pool = self.chars.lock().unwrap();
		if let Some(bucket) = pool.buckets.get_mut(&class) {
			if let Some(mut buf) = bucket.pop() {
				pool.total_capacity -= buf.capacity();
				buf.clear();
				return Ok(buf)
			}
		}
		drop(pool);
		Ok(String::with_capacity(cap))
	}

	fn release_char_buffer(&self, mut buf: String) {
		buf.clear();
		let cap = buf.capacity();
		if cap == 0 || cap > self.options.max_pooled_char_buffer_capacity {
			return
		}

		let mut pool = self.chars.lock().unwrap();
		if pool.total_capacity + cap > self.options.max_char_buffer_pool_capacity {
			return
		}
		pool.total_capacity += cap;
		pool.buckets.entry(size_class(cap)).or_default().push(buf);
	}

	fn close(&self) {
		*self.closed.lock().unwrap() = true;
		self.bytes.lock().unwrap().buckets.clear();
		self.chars.lock().unwrap().buckets.clear();
	}

	fn options(&self) -> &AllocatorOptions { &self.options }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pooled_reuses_released_buffer() {
		let pool = PooledAllocator::new(AllocatorOptions::default());
		let buf = pool.acquire_byte_buffer(64).unwrap();
		let ptr = buf.as_ptr();
		pool.release_byte_buffer(buf);
		let buf = pool.acquire_byte_buffer(64).unwrap();
		assert_eq!(buf.as_ptr(), ptr, "should reuse the pooled allocation");
	}

	#[test]
	fn release_above_cap_is_dropped_not_pooled() {
		let options = AllocatorOptions {
			max_pooled_byte_buffer_capacity: 16,
			..Default::default()
		};
		let pool = PooledAllocator::new(options);
		let buf = pool.acquire_byte_buffer(64).unwrap();
		pool.release_byte_buffer(buf);
		let next = pool.acquire_byte_buffer(64).unwrap();
		assert_eq!(next.len(), 0);
		assert!(next.capacity() >= 64);
	}

	#[test]
	fn closed_allocator_rejects_acquire() {
		let pool = PooledAllocator::new(AllocatorOptions::default());
		pool.close();
		assert!(pool.acquire_byte_buffer(16).is_err());
	}

	#[test]
	fn acquire_over_max_capacity_fails() {
		let options = AllocatorOptions { max_byte_buffer_capacity: 32, ..Default::default() };
		let pool = UnpooledAllocator::new(options);
		assert!(pool.acquire_byte_buffer(64).is_err());
		assert!(pool.acquire_byte_buffer(16).is_ok());
	}
}
