pub mod error;
pub mod expression;
mod field;

pub use error::CronError;
pub use expression::CronExpression;
