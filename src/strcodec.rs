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

//! String header sizing and the reader's identifier-interning cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use crate::format::{self, FIXSTR_MAX};

/// The wire width class chosen for a string or binary header.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HeaderClass {
	Fix,
	W8,
	W16,
	W32,
}

impl HeaderClass {
	/// Picks the smallest class able to hold `byte_len`, per the fixstr/str8/
	/// str16/str32 grammar (binary headers skip the fix class).
	pub fn for_str_len(byte_len: usize) -> Self {
		if byte_len <= FIXSTR_MAX { Self::Fix }
		else if byte_len < 1 << 8 { Self::W8 }
		else if byte_len < 1 << 16 { Self::W16 }
		else { Self::W32 }
	}

	pub fn for_bin_len(byte_len: usize) -> Self {
		if byte_len < 1 << 8 { Self::W8 }
		else if byte_len < 1 << 16 { Self::W16 }
		else { Self::W32 }
	}

	/// The default UTF-8 size estimate for a char count: `chars * 3`. This
	/// deliberately over-reserves for BMP-only text; see the writer's string
	/// size estimator option.
	pub fn estimate_for_chars(char_count: usize, max_bytes_per_char: usize) -> Self {
		Self::for_str_len(char_count * max_bytes_per_char)
	}

	pub fn str_tag(self, byte_len: usize) -> u8 {
		match self {
			Self::Fix => format::fix_str_tag(byte_len),
			Self::W8 => format::STR8,
			Self::W16 => format::STR16,
			Self::W32 => format::STR32,
		}
	}

	pub fn bin_tag(self) -> u8 {
		match self {
			Self::Fix => unreachable!("binary has no fix class"),
			Self::W8 => format::BIN8,
			Self::W16 => format::BIN16,
			Self::W32 => format::BIN32,
		}
	}
}

/// Default entry-count limit for the identifier cache.
pub const DEFAULT_IDENTIFIER_CACHE_LIMIT: usize = 1024;
/// Default per-string byte length limit for identifier interning.
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 64;

/// Interns short, frequently repeated decoded strings, keyed by their raw
/// UTF-8 bytes. Eviction is a simple fixed-size LRU: the least-recently-used
/// entry is dropped when the cache is full.
pub struct IdentifierCache {
	max_length: usize,
	limit: usize,
	entries: HashMap<Box<[u8]>, Arc<str>>,
	order: VecDeque<Box<[u8]>>,
}

impl IdentifierCache {
	pub fn new(limit: usize, max_length: usize) -> Self {
		Self {
			max_length,
			limit,
			entries: HashMap::new(),
			order: VecDeque::new(),
		}
	}

	pub fn max_length(&self) -> usize { self.max_length }

	/// Returns the interned string for `key`, decoding and inserting it with
	/// `decode` if absent. `key` must already be valid UTF-8.
	pub fn get_or_insert(&mut self, key: &[u8], decode: impl FnOnce() -> Arc<str>) -> Arc<str> {
		if let Some(value) = self.entries.get(key).cloned() {
			self.touch(key);
			return value
		}

		let value = decode();
		self.insert(key, value.clone());
		value
	}

	fn touch(&mut self, key: &[u8]) {
		if let Some(pos) = self.order.iter().position(|k| k.as_ref() == key) {
			let k = self.order.remove(pos).unwrap();
			self.order.push_back(k);
		}
	}

	fn insert(&mut self, key: &[u8], value: Arc<str>) {
		if self.entries.len() >= self.limit {
			if let Some(oldest) = self.order.pop_front() {
				self.entries.remove(&oldest);
			}
		}
		let key: Box<[u8]> = key.into();
		self.order.push_back(key.clone());
		self.entries.insert(key, value);
	}

	pub fn len(&self) -> usize { self.entries.len() }
	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_class_picks_smallest_fit() {
		assert_eq!(HeaderClass::for_str_len(0), HeaderClass::Fix);
		assert_eq!(HeaderClass::for_str_len(31), HeaderClass::Fix);
		assert_eq!(HeaderClass::for_str_len(32), HeaderClass::W8);
		assert_eq!(HeaderClass::for_str_len(255), HeaderClass::W8);
		assert_eq!(HeaderClass::for_str_len(256), HeaderClass::W16);
		assert_eq!(HeaderClass::for_str_len(65535), HeaderClass::W16);
		assert_eq!(HeaderClass::for_str_len(65536), HeaderClass::W32);
	}

	#[test]
	fn identifier_cache_interns_repeated_keys() {
		let mut cache = IdentifierCache::new(2, 64);
		let mut decode_count = 0;
		let a1 = cache.get_or_insert(b"hello", || { decode_count += 1; Arc::from("hello") });
		let a2 = cache.get_or_insert(b"hello", || { decode_count += 1; Arc::from("hello") });
		assert!(Arc::ptr_eq(&a1, &a2));
		assert_eq!(decode_count, 1);
	}

	#[test]
	fn identifier_cache_evicts_oldest_when_full() {
		let mut cache = IdentifierCache::new(1, 64);
		cache.get_or_insert(b"a", || Arc::from("a"));
		cache.get_or_insert(b"b", || Arc::from("b"));
		assert_eq!(cache.len(), 1);
		let mut decoded = false;
		cache.get_or_insert(b"a", || { decoded = true; Arc::from("a") });
		assert!(decoded, "evicted entry should be re-decoded");
	}
}
