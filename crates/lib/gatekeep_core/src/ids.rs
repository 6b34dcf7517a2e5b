// Identifier generation for user and session IDs.
//
// Both are random (v4) UUIDs rendered as hyphenated lowercase strings. Neither
// needs time ordering: users are looked up by ID or email, and session IDs are
// only ever compared for equality or fingerprinted.

use uuid::Uuid;

/// Generate a new user ID.
pub fn user_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new session ID.
pub fn session_id() -> String {
    Uuid::new_v4().to_string()
}
