//! Library surface of the pbeskit CLI: the JSON input schema and its
//! lowering. Exposed so integration tests can drive the same loading path
//! as the binary.

pub mod schema;
