//! AlgoChat Core - conversation model, caches, durable send queue and the
//! `Chat` facade that orchestrates them.
//!
//! This crate is the stateful layer above `algochat-crypto`. Where the
//! crypto crate is pure and reentrant, everything here that holds mutable
//! state (the PSK ratchet per peer, the caches, the send queue) is wrapped
//! behind an owning handle that serializes access, following the same
//! shape as an actor: callers `.await` a method and see a consistent
//! snapshot, never a partial update racing another caller.

#![forbid(unsafe_code)]

// Collaborator trait interfaces (ledger client, indexer, signing account,
// durable storage, key storage) - consumed, never implemented, by this crate.
pub mod collaborators;

// Supporting modules
pub mod errors;
pub mod types;
pub mod keys;

// Conversation model, caches, durable queue, sync, discovery/scan.
pub mod conversation;
pub mod cache;
pub mod queue;
pub mod sync;
pub mod indexer;

// The Chat facade: orchestrates everything above.
pub mod chat;

// In-memory test doubles for the collaborator traits.
pub mod harness;
