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

//! A streaming, buffer-oriented MessagePack codec.
//!
//! [`MessageReader`] and [`MessageWriter`] decode and encode values directly
//! against a blocking [`Read`](std::io::Read)/[`Write`](std::io::Write)
//! channel, each call consuming or producing exactly one token. Buffers are
//! drawn from a [`BufferAllocator`](alloc::BufferAllocator) so long-lived
//! readers and writers amortize allocation across many messages.

pub mod alloc;
pub mod error;
pub mod format;
pub mod reader;
pub mod sink;
pub mod source;
pub mod strcodec;
pub mod timestamp;
pub mod writer;

pub use alloc::{AllocatorOptions, BufferAllocator, PooledAllocator, SharedAllocator, UnpooledAllocator};
pub use error::{Error, ErrorKind, Result};
pub use format::MessageType;
pub use reader::{MessageReader, ReaderOptions};
pub use sink::{MessageSink, SinkOptions};
pub use source::{MessageSource, SourceOptions};
pub use timestamp::Timestamp;
pub use writer::{MessageWriter, WriterOptions};
