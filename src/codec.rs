use crate::error::{QuizError, Result};

/// Parse an answer-spec string such as `"1 0 0 1"` into a correctness
/// vector. Only `0` and `1` tokens are accepted; an empty spec is an error.
pub fn parse_correctness(spec: &str) -> Result<Vec<bool>> {
    let mut correctness = Vec::new();
    for token in spec.split_whitespace() {
        match token {
            "0" => correctness.push(false),
            "1" => correctness.push(true),
            _ => return Err(QuizError::MalformedAnswerSpec(token.to_string())),
        }
    }

    if correctness.is_empty() {
        return Err(QuizError::MalformedAnswerSpec(spec.to_string()));
    }

    Ok(correctness)
}

/// Compare a response against a correctness vector.
///
/// Indices beyond the end of the response are ignored, so a response that
/// omits trailing entries is still comparable; a response longer than the
/// correctness vector can never match. An absent response counts as
/// all-false.
pub fn is_correct(response: Option<&[bool]>, correctness: &[bool]) -> bool {
    match response {
        None => correctness.iter().all(|&correct| !correct),
        Some(response) => {
            response.len() <= correctness.len()
                && response.iter().zip(correctness).all(|(picked, correct)| picked == correct)
        }
    }
}
