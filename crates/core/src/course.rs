//! Course catalog validation.
//!
//! The catalog itself is managed elsewhere; these rules guard the fields a
//! versioned course update may touch.

use validator::Validate;

use crate::error::CoreError;
use crate::types::MinorUnits;

/// Maximum course price in minor units (10 000.00).
pub const MAX_PRICE: MinorUnits = 1_000_000;

/// The mutable fields of a course, as they will be written.
#[derive(Debug, Validate)]
pub struct CourseFields {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 4000))]
    pub description: String,
    #[validate(length(max = 2048))]
    pub image_url: String,
    #[validate(range(min = 0, max = 1_000_000))]
    pub price: MinorUnits,
}

/// Validate course fields before a write.
pub fn validate_course_fields(fields: &CourseFields) -> Result<(), CoreError> {
    fields
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))
}
