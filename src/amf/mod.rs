//! Command-object codec
//!
//! RTMP command invocations and their replies are AMF0-encoded sequences of
//! typed values. The rest of the crate treats this module as a black box
//! with `decode`/`encode` operations over [`AmfValue`].

pub mod amf0;
mod value;

pub use value::AmfValue;
