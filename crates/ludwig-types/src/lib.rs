mod constants;
mod cursor;
mod enums;
mod ids;
mod karma;
mod timestamp;
mod validation;

pub use constants::*;
pub use cursor::Cursor;
pub use enums::*;
pub use ids::*;
pub use karma::Karma;
pub use timestamp::Timestamp;
pub use validation::{ValidationError, ValidationResult};
