//! Utility functions for common operations.
//!
//! - **URL validation**: accept only http(s) feed locators
//! - **Filenames**: turn episode and show titles into safe path components

mod text;
mod url_validator;

pub use text::sanitize_filename;
pub use url_validator::{validate_url, UrlValidationError};
