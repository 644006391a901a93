pub mod expression;
pub mod serialization;
pub mod trace;
pub mod value;

pub use expression::*;
pub use serialization::*;
pub use trace::*;
pub use value::*;
