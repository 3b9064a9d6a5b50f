//! Request body checks for `/api/ask`

use serde::Deserialize;

use super::errors::ApiError;

pub const MAX_QUESTION_CHARS: usize = 2000;
pub const MAX_TOP_K: i64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<i64>,
}

/// A question that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQuestion {
    pub question: String,
    pub top_k: Option<usize>,
}

impl TryFrom<AskRequest> for ValidQuestion {
    type Error = ApiError;

    #[inline]
    fn try_from(request: AskRequest) -> Result<Self, Self::Error> {
        let length = request.question.chars().count();
        if length == 0 {
            return Err(ApiError::Validation(
                "question must contain at least 1 character".to_string(),
            ));
        }
        if length > MAX_QUESTION_CHARS {
            return Err(ApiError::Validation(format!(
                "question must contain at most {} characters, got {}",
                MAX_QUESTION_CHARS, length
            )));
        }

        let top_k = match request.top_k {
            None => None,
            Some(k) if (1..=MAX_TOP_K).contains(&k) => usize::try_from(k).ok(),
            Some(k) => {
                return Err(ApiError::Validation(format!(
                    "top_k must be between 1 and {}, got {}",
                    MAX_TOP_K, k
                )));
            }
        };

        Ok(Self {
            question: request.question,
            top_k,
        })
    }
}
