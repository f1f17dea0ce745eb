/// Validation logic for star submissions separated from type definitions
use crate::error::ChainError;
use crate::star::types::StarSubmission;

impl StarSubmission {
    /// Stateless schema check: required fields present, story within the byte
    /// ceiling and restricted to ASCII.
    pub fn validate(&self, max_story_bytes: usize) -> Result<(), ChainError> {
        if self.ra.trim().is_empty() {
            return Err(ChainError::Validation(
                "Star right ascension (ra) is required".to_string(),
            ));
        }

        if self.dec.trim().is_empty() {
            return Err(ChainError::Validation(
                "Star declination (dec) is required".to_string(),
            ));
        }

        if self.story.trim().is_empty() {
            return Err(ChainError::Validation("Star story is required".to_string()));
        }

        if !self.story.is_ascii() {
            return Err(ChainError::Validation(
                "Star story must contain only ASCII characters".to_string(),
            ));
        }

        if self.story.len() > max_story_bytes {
            return Err(ChainError::Validation(format!(
                "Star story too large: {} bytes (max: {})",
                self.story.len(),
                max_story_bytes
            )));
        }

        Ok(())
    }
}
