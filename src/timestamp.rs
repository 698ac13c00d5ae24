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

//! The timestamp extension (type -1), with its three fixed wire layouts.

use crate::error::{Error, Result};

/// An instant with nanosecond resolution, as carried by the timestamp
/// extension. `seconds` may be negative (before the epoch); `nanos` is
/// always in `0..1_000_000_000`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Timestamp {
	pub seconds: i64,
	pub nanos: u32,
}

impl Timestamp {
	pub const EPOCH: Self = Self { seconds: 0, nanos: 0 };

	pub fn new(seconds: i64, nanos: u32) -> Result<Self> {
		if nanos >= 1_000_000_000 {
			return Err(Error::invalid_value("timestamp nanoseconds must be < 1e9"))
		}
		Ok(Self { seconds, nanos })
	}

	/// Encodes to the smallest lossless wire layout: 4 bytes if `nanos == 0`
	/// and `seconds` fits an unsigned 32-bit value; 8 bytes if `nanos` fits
	/// 30 bits and `seconds` fits an unsigned 34-bit value; else 12 bytes.
	pub fn encode(self) -> TimestampBytes {
		if self.nanos == 0 && (0..=u32::MAX as i64).contains(&self.seconds) {
			TimestampBytes::B4((self.seconds as u32).to_be_bytes())
		} else if self.nanos < 1 << 30 && (0..(1i64 << 34)).contains(&self.seconds) {
			let packed = ((self.nanos as u64) << 34) | self.seconds as u64;
			TimestampBytes::B8(packed.to_be_bytes())
		} else {
			let mut bytes = [0u8; 12];
			bytes[..4].copy_from_slice(&self.nanos.to_be_bytes());
			bytes[4..].copy_from_slice(&self.seconds.to_be_bytes());
			TimestampBytes::B12(bytes)
		}
	}

	/// Decodes a timestamp extension payload of length 4, 8, or 12.
	pub fn decode(bytes: &[u8]) -> Result<Self> {
		match bytes.len() {
			4 => {
				let mut a = [0u8; 4];
				a.copy_from_slice(bytes);
				Ok(Self { seconds: u32::from_be_bytes(a) as i64, nanos: 0 })
			}
			8 => {
				let mut a = [0u8; 8];
				a.copy_from_slice(bytes);
				let packed = u64::from_be_bytes(a);
				let nanos = (packed >> 34) as u32;
				let seconds = (packed & ((1u64 << 34) - 1)) as i64;
				Self::new(seconds, nanos)
			}
			12 => {
				let mut n = [0u8; 4];
				n.copy_from_slice(&bytes[..4]);
				let mut s = [0u8; 8];
				s.copy_from_slice(&bytes[4..]);
				Self::new(i64::from_be_bytes(s), u32::from_be_bytes(n))
			}
			_ => Err(Error::invalid_value("timestamp extension length must be 4, 8, or 12")),
		}
	}
}

pub enum TimestampBytes {
	B4([u8; 4]),
	B8([u8; 8]),
	B12([u8; 12]),
}

impl TimestampBytes {
	pub fn as_slice(&self) -> &[u8] {
		match self {
			Self::B4(b) => b,
			Self::B8(b) => b,
			Self::B12(b) => b,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn epoch_encodes_as_4_bytes() {
		let enc = Timestamp::EPOCH.encode();
		assert_eq!(enc.as_slice(), &[0, 0, 0, 0]);
		assert_eq!(Timestamp::decode(enc.as_slice()).unwrap(), Timestamp::EPOCH);
	}

	#[test]
	fn negative_seconds_require_12_bytes() {
		let ts = Timestamp::new(-1, 0).unwrap();
		let enc = ts.encode();
		assert_eq!(enc.as_slice().len(), 12);
		assert_eq!(Timestamp::decode(enc.as_slice()).unwrap(), ts);
	}

	#[test]
	fn nanos_fitting_30_bits_use_8_bytes() {
		let ts = Timestamp::new(1_000_000_000, 500_000_000).unwrap();
		let enc = ts.encode();
		assert_eq!(enc.as_slice().len(), 8);
		assert_eq!(Timestamp::decode(enc.as_slice()).unwrap(), ts);
	}

	#[test]
	fn large_nanos_require_12_bytes() {
		// nanos alone is always < 1e9 < 2^30, so the only way to force the
		// 12-byte form here is seconds overflowing the 34-bit unsigned range.
		let ts = Timestamp::new(1i64 << 40, 0).unwrap();
		let enc = ts.encode();
		assert_eq!(enc.as_slice().len(), 12);
		assert_eq!(Timestamp::decode(enc.as_slice()).unwrap(), ts);
	}

	#[test]
	fn invalid_nanos_rejected() {
		assert!(Timestamp::new(0, 1_000_000_000).is_err());
	}

	#[test]
	fn invalid_length_rejected() {
		assert!(Timestamp::decode(&[0; 5]).is_err());
	}
}
