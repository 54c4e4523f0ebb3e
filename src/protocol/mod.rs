//! EngineMQ wire protocol: message types, grammar, identifiers and
//! inbound payload validation.

pub mod ids;
pub mod messages;
pub mod topics;
pub mod validation;

pub use ids::{IdGenerator, UuidIdGenerator};
pub use messages::*;
pub use topics::*;
pub use validation::{PayloadValidator, SchemaError, SchemaValidator};
