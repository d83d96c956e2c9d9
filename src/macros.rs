//! # Internal Macros
//!
//! Accessor generation for zerocopy header structs whose fields use
//! little-endian wrapper types (U32, U64).
//!
//! ```ignore
//! use zerocopy::little_endian::{U32, U64};
//!
//! #[repr(C)]
//! struct Header {
//!     entry_count: U64,
//!     version: U32,
//! }
//!
//! impl Header {
//!     zerocopy_accessors! {
//!         entry_count: u64,
//!         version: u32,
//!     }
//! }
//!
//! // Generates:
//! // pub fn entry_count(&self) -> u64 { self.entry_count.get() }
//! // pub fn set_entry_count(&mut self, val: u64) { ... }
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    (@impl $field:ident, u64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u64) {
                self.$field = ::zerocopy::little_endian::U64::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}
