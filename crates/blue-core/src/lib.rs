//! Blue Core Types and Unification
//!
//! This crate provides the foundational types for the Blue data-description
//! language. It includes:
//!
//! - **Content hashes**: SHA-256 digests used as cache keys and conflict
//!   tokens ([`hash::ContentHash`])
//! - **Types**: the structural type model ([`types::TypeNode`])
//! - **Unification**: merging of structural types ([`unify`] module)

pub mod constraints;
pub mod hash;
pub mod types;
pub mod unify;

pub use constraints::{Bound, Constraints};
pub use hash::ContentHash;
pub use types::{ObjectType, Primitive, Reference, TypeId, TypeNode, UnionType};
pub use unify::{Definitions, Opaque, UnificationError, UnifyOptions, unify, unify_in, unify_with};
