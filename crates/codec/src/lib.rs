// Path: crates/codec/src/lib.rs
#![forbid(unsafe_code)]

//! # m2m Wire Codec
//!
//! Encode/decode for the OER (Octet Encoding Rules) primitives used on the
//! connector's wire, plus the ILP packet envelope built from them.
//!
//! The codec is synchronous and pure: reads never modify their input and all
//! failures are typed [`CodecError`]s, never panics. Variable-length reads
//! return zero-copy views into the source buffer.

pub mod oer;
pub mod packet;

pub use m2m_types::error::CodecError;
pub use packet::Packet;
