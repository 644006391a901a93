pub mod model;
pub mod payload;

pub use model::{DataModel, DataType, Field, LinkToSingle, Table};
pub use payload::Payload;
