// Reading documents and the dashboard's comfort model

mod comfort;
mod reading;

pub use comfort::{ComfortLevel, ComfortStatus, classic_thi};
pub use reading::{FieldError, ReadingView, id_string, numeric_field, timestamp_field};
