use rand::prelude::*;

use crate::models::{DisplayBinding, Question};

/// Build the shuffled presentation of a question's options.
///
/// Option text, correctness flag, and original index move as one unit, so
/// the binding stays aligned no matter where an option lands. Callers cache
/// the result on the question for the rest of the session; rebuilding it
/// mid-session would desynchronize stored answers from displayed positions.
pub fn build_binding(question: &Question) -> DisplayBinding {
    let mut entries = question
        .options
        .iter()
        .cloned()
        .zip(question.correctness.iter().copied())
        .enumerate()
        .map(|(index, (option, correct))| (option, correct, index))
        .collect::<Vec<_>>();

    let mut rng = thread_rng();
    entries.shuffle(&mut rng);

    let mut binding = DisplayBinding {
        options: Vec::with_capacity(entries.len()),
        correctness: Vec::with_capacity(entries.len()),
        source_indices: Vec::with_capacity(entries.len()),
    };
    for (option, correct, index) in entries {
        binding.options.push(option);
        binding.correctness.push(correct);
        binding.source_indices.push(index);
    }

    binding
}
