//! Client-side synchronization core: reconciles REST-fetched snapshots with
//! streamed gateway events into one consistent per-session view (chat list
//! ordering, open message list, unread counters) plus the typing-signal
//! debounce. Pure state machines with explicit clocks; no I/O here.

pub mod session;
pub mod typing;
