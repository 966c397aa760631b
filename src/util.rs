//! Shared utility modules used across hashdex components.

pub mod varint;
