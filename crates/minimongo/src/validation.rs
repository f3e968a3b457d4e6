//! Input validation for names and ids
//!
//! Collection names come either from a model declaration or from the
//! model's type name, so they are checked once at registration. Field
//! names are checked when a document is accessed attribute-style, where
//! the name doubles as a path segment, and as top-level keys of updates.

use crate::Result;
use minimongo_common::MinimongoError;
use tracing::warn;

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Validated collection name
///
/// # Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    /// Creates a new validated collection name
    ///
    /// # Errors
    /// Returns a validation error if the name is empty, too long, contains
    /// null bytes or `$`, or starts with "system."
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(MinimongoError::Validation(
                "Collection name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(MinimongoError::Validation(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(MinimongoError::Validation(
                "Collection name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with("system.") {
            return Err(MinimongoError::Validation(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(MinimongoError::Validation(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        // Allowed, but almost always a typo
        if name.contains("..") || name.ends_with('.') {
            warn!(collection = name, "Collection name contains suspicious pattern");
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    /// Returns the validated collection name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Consumes the ValidatedCollectionName and returns the inner String
    pub fn into_string(self) -> String {
        self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validated field name
///
/// # Guarantees
/// - Not empty
/// - Maximum 1024 characters
/// - No null bytes
/// - No $ prefix (unless operators are allowed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFieldName {
    name: String,
}

impl ValidatedFieldName {
    /// Creates a new validated field name
    ///
    /// # Arguments
    /// * `name` - The field name to validate
    /// * `allow_operators` - If true, allows $ prefix for update operators like $set, $inc
    pub fn new(name: &str, allow_operators: bool) -> Result<Self> {
        if name.is_empty() {
            return Err(MinimongoError::Validation(
                "Field name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_FIELD_NAME_LENGTH {
            return Err(MinimongoError::Validation(format!(
                "Field name exceeds maximum length of {} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }

        if name.contains('\0') {
            return Err(MinimongoError::Validation(
                "Field name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with('$') && !allow_operators {
            return Err(MinimongoError::Validation(format!(
                "Field name cannot start with '$' (reserved for operators): '{}'",
                name
            )));
        }

        if name.starts_with('$') && !Self::is_update_operator(name) {
            warn!(field = name, "Unknown MongoDB update operator");
        }

        Ok(ValidatedFieldName {
            name: name.to_string(),
        })
    }

    /// Validates a name used for attribute-style access.
    ///
    /// Same rules as a plain field name, and no `.` since attribute names
    /// are single path segments.
    pub fn attribute(name: &str) -> Result<Self> {
        let validated = Self::new(name, false)?;
        if name.contains('.') {
            return Err(MinimongoError::Validation(format!(
                "Attribute name cannot contain '.': '{}'",
                name
            )));
        }
        Ok(validated)
    }

    /// Checks if the name is a known update operator
    pub fn is_update_operator(name: &str) -> bool {
        const UPDATE_OPERATORS: &[&str] = &[
            "$set", "$unset", "$inc", "$mul", "$rename", "$setOnInsert",
            "$min", "$max", "$currentDate", "$addToSet", "$pop", "$pull",
            "$push", "$pullAll", "$bit",
        ];

        UPDATE_OPERATORS.contains(&name)
    }

    /// Returns the validated field name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Consumes the ValidatedFieldName and returns the inner String
    pub fn into_string(self) -> String {
        self.name
    }
}

impl AsRef<str> for ValidatedFieldName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedFieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Converts string ids to ObjectIds where they look like one
pub struct ObjectIdParser;

impl ObjectIdParser {
    /// Converts a string id to BSON: an ObjectId when it is 24 hex
    /// characters, the string itself otherwise.
    pub fn parse_id(value: &str) -> bson::Bson {
        if Self::is_valid_objectid_format(value) {
            if let Ok(oid) = bson::oid::ObjectId::parse_str(value) {
                return bson::Bson::ObjectId(oid);
            }
        }
        bson::Bson::String(value.to_string())
    }

    /// Checks if a string has valid ObjectId format (24 hex characters)
    fn is_valid_objectid_format(value: &str) -> bool {
        value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
    }
}
