// SPDX-License-Identifier: Apache-2.0

use amplify_derive::Display;
use simdutf8::compat;
use thiserror::Error;

/// A UTF-8 decode error, reported with the byte offset of the first invalid
/// or incomplete sequence.
#[derive(Copy, Clone, Debug, Error)]
#[error(
	"{kind} UTF-8 byte sequence ({:X?}) from index {valid_up_to}",
	self.bytes()
)]
pub struct Utf8Error {
	/// The length of the valid string before the error.
	pub valid_up_to: usize,
	/// The invalid or incomplete byte sequence, padded with zeros.
	bytes: [u8; 4],
	/// The number of bytes in the invalid or incomplete byte sequence.
	count: usize,
	/// The error kind.
	pub kind: Utf8ErrorKind,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum Utf8ErrorKind {
	#[display("invalid")]
	InvalidSequence,
	#[display("incomplete")]
	IncompleteChar,
}

impl Utf8Error {
	pub(crate) fn from_compat(error: compat::Utf8Error, offset: usize) -> Self {
		let valid_up_to = offset + error.valid_up_to();
		if let Some(len) = error.error_len() {
			Self {
				valid_up_to,
				bytes: [0; 4],
				count: len,
				kind: Utf8ErrorKind::InvalidSequence,
			}
		} else {
			Self {
				valid_up_to,
				bytes: [0; 4],
				count: 0,
				kind: Utf8ErrorKind::IncompleteChar,
			}
		}
	}

	/// The invalid or incomplete byte sequence.
	pub fn bytes(&self) -> &[u8] { &self.bytes[..self.count] }
}
