// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod backend;
mod bus;
mod message;
mod mock;
mod redis_backend;

pub use backend::QueueBackend;
pub use bus::{flush_all, receive, receive_non_blocking, send, QueueError};
pub use message::{MessageType, QueueMessage};
pub use mock::MockQueueBackend;
pub use redis_backend::RedisQueueBackend;
