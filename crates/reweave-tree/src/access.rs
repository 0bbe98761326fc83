//! Classfile access flags
//!
//! The subset of modifier flag values the processor inspects. Modifier
//! lists store one flag value per entry.

pub const ACC_PUBLIC: i64 = 0x0001;
pub const ACC_PRIVATE: i64 = 0x0002;
pub const ACC_PROTECTED: i64 = 0x0004;
pub const ACC_STATIC: i64 = 0x0008;
pub const ACC_FINAL: i64 = 0x0010;
pub const ACC_INTERFACE: i64 = 0x0200;
pub const ACC_ABSTRACT: i64 = 0x0400;
pub const ACC_SYNTHETIC: i64 = 0x1000;
