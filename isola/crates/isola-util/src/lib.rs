//! isola-util - Foundation types shared by the isola runtime crates
//!
//! ============================================================================
//! MODULE OVERVIEW
//! ============================================================================
//!
//! Two small building blocks live here:
//!
//! 1. TYPED ARENA INDICES ([`index_vec`])
//!    Heaps in isola are arenas addressed by typed indices instead of raw
//!    addresses. An index from one arena can never be used to address
//!    another, and an index stays valid no matter how the backing vector
//!    grows or moves.
//!
//! 2. MONOTONIC IDENTIFIERS ([`id`])
//!    Execution contexts receive a stable integer identity exactly once,
//!    drawn from a process-wide counter that never hands out a value twice.
//!
//! DESIGN PRINCIPLES:
//! ------------------
//! - Zero-cost: `IndexVec<I, T>` is a `Vec<T>` at runtime.
//! - Type safety: index spaces are distinct types (see [`define_idx!`]).

pub mod id;
pub mod index_vec;

pub use id::IdGenerator;
pub use index_vec::{Idx, IndexVec};

static_assertions::assert_eq_size!(IndexVec<u32, u64>, Vec<u64>);
static_assertions::assert_impl_all!(IdGenerator: Send, Sync);
