//! Course catalog models and DTOs.

use coursehub_core::course::CourseFields;
use coursehub_core::types::{DbId, MinorUnits, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::Versioned;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A courses row from the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Course {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: MinorUnits,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Versioned for Course {
    const TABLE: &'static str = "courses";
    const KEY_COLUMN: &'static str = "id";
    const ENTITY: &'static str = "Course";

    fn key(&self) -> DbId {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }
}

impl Course {
    /// Apply a patch in memory. Fields absent from the patch are kept.
    pub fn apply(&mut self, patch: &UpdateCourse) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url = image_url.clone();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
    }

    /// The mutable fields, for validation before a write.
    pub fn fields(&self) -> CourseFields {
        CourseFields {
            name: self.name.clone(),
            description: self.description.clone(),
            image_url: self.image_url.clone(),
            price: self.price,
        }
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Input for creating a new course record.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourse {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub price: MinorUnits,
}

// ---------------------------------------------------------------------------
// Update DTO
// ---------------------------------------------------------------------------

/// Patch for an existing course. All fields are optional.
///
/// `version`, when given, is the version the client last saw; a mismatch
/// is reported as a conflict without attempting the write.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCourse {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<MinorUnits>,
    pub version: Option<i32>,
}
