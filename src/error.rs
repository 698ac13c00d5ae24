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

use std::{error, io, result};
use amplify_derive::Display;
use crate::format::MessageType;

pub mod utf8;
pub use utf8::Utf8Error;

pub type Result<T = ()> = result::Result<T, Error>;

#[derive(Copy, Clone, Debug, Display)]
pub enum ErrorKind {
	#[display("end of input reached before the required bytes were available")]
	EndOfInput,
	#[display("expected a {expected} value, found a {found} tag")]
	TypeMismatch { expected: MessageType, found: MessageType },
	#[display("value is well-formed but semantically invalid: {0}")]
	InvalidValue(&'static str),
	#[display("integer does not fit the requested width")]
	IntegerOverflow,
	#[display("malformed UTF-8 byte sequence")]
	InvalidUtf8,
	#[display("requested buffer capacity exceeds the configured maximum")]
	BufferTooSmall,
	#[display("caller's buffer aliases the internal buffer")]
	AliasedBuffer,
	#[display("channel returned a zero-byte result for a non-empty request")]
	NonBlockingChannel,
	#[display("the allocator's per-buffer capacity was exceeded")]
	AllocatorCapacity,
	#[display("the stream has been closed")]
	Closed,
	#[display("I/O error")]
	Io,
}

#[derive(Debug, Display)]
#[display("{kind}")]
pub struct Error {
	kind: ErrorKind,
	source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		self.source.as_ref().map(|e| e.as_ref() as &(dyn error::Error + 'static))
	}
}

impl Error {
	fn new(kind: ErrorKind) -> Self {
		Self { kind, source: None }
	}

	fn with_source(kind: ErrorKind, source: impl error::Error + Send + Sync + 'static) -> Self {
		Self { kind, source: Some(Box::new(source)) }
	}

	pub fn kind(&self) -> ErrorKind { self.kind }

	pub(crate) fn end_of_input() -> Self { Self::new(ErrorKind::EndOfInput) }

	pub(crate) fn type_mismatch(expected: MessageType, found: MessageType) -> Self {
		Self::new(ErrorKind::TypeMismatch { expected, found })
	}

	pub(crate) fn invalid_value(message: &'static str) -> Self {
		Self::new(ErrorKind::InvalidValue(message))
	}

	pub(crate) fn integer_overflow() -> Self { Self::new(ErrorKind::IntegerOverflow) }

	pub(crate) fn invalid_utf8(error: Utf8Error) -> Self {
		Self::with_source(ErrorKind::InvalidUtf8, error)
	}

	pub(crate) fn buffer_too_small() -> Self { Self::new(ErrorKind::BufferTooSmall) }

	pub(crate) fn aliased_buffer() -> Self { Self::new(ErrorKind::AliasedBuffer) }

	pub(crate) fn non_blocking_channel() -> Self { Self::new(ErrorKind::NonBlockingChannel) }

	pub(crate) fn allocator_capacity() -> Self { Self::new(ErrorKind::AllocatorCapacity) }

	pub(crate) fn closed() -> Self { Self::new(ErrorKind::Closed) }

	pub(crate) fn io(error: io::Error) -> Self { Self::with_source(ErrorKind::Io, error) }

	/// Returns the source downcast into an IO error, if the error originated
	/// from the underlying channel.
	pub fn io_source(&self) -> Option<&io::Error> {
		use error::Error as _;
		self.source()?.downcast_ref()
	}
}

impl From<io::Error> for Error {
	fn from(value: io::Error) -> Self {
		match value.kind() {
			io::ErrorKind::UnexpectedEof => Self::end_of_input(),
			_ => Self::io(value),
		}
	}
}

impl From<Utf8Error> for Error {
	fn from(value: Utf8Error) -> Self { Self::invalid_utf8(value) }
}
