//! I/O building blocks of the device
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Session (per open)                 │
//! │  - own cursor (offset)              │
//! │  - own interrupt signal             │
//! └─────────────────────────────────────┘
//!          │ calls into
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  BufferManager (one per device)     │
//! │  - one async lock                   │
//! │  - flag word                        │
//! └─────────────────────────────────────┘
//!          │ owns
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  BoundedBuffer (storage)            │
//! │  - fixed capacity                   │
//! │  - logical length                   │
//! └─────────────────────────────────────┘
//! ```
//!
//! Bytes cross into and out of the device only through the traits in
//! [`usermem`].

pub mod buffer;
pub mod usermem;

pub use buffer::BoundedBuffer;
pub use usermem::{CopyFault, UserArg, UserSlice, UserSliceMut};
