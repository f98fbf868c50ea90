//! Consistent-hash ring membership.
//!
//! Replicas register a set of random tokens in a shared key-value store;
//! the owner of a 32-bit key is the replica holding the first token at or
//! after the key (wrapping). The [`lifecycler::Lifecycler`] keeps this
//! replica's registration alive and hands ownership off on shutdown, while
//! [`ring::TokenRing`] answers ownership and membership queries.

pub mod error;
pub mod kv;
pub mod lifecycler;
pub mod ring;


pub use error::{RingError, Result};
pub use kv::{InMemoryKv, KvClient};
pub use lifecycler::{Lifecycler, LifecyclerConfig};
pub use ring::{ReplicaDesc, ReplicaState, Ring, RingDesc, TokenRing};
