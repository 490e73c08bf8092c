//! Interactive input.
//!
//! Two questions, asked in order: how many keys, then whether to save them.

use std::io::{BufRead, Write};

use crate::errors::{KeyforgeError, KeyforgeResult};

/// Amount used when the first answer is left empty.
pub const DEFAULT_AMOUNT_INPUT: &str = "10";

/// Answers collected before a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Raw amount text; normalized later by the pipeline
    pub amount: String,
    pub persist: bool,
}

/// True if the answer means yes: trimmed, it starts with `y` or `Y`.
pub fn parse_persist_answer(answer: &str) -> bool {
    answer
        .trim()
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'y'))
}

fn ask<I: BufRead, O: Write>(input: &mut I, output: &mut O, question: &str) -> KeyforgeResult<String> {
    write!(output, "{}", question)?;
    output.flush()?;

    let mut line = String::new();
    let read = input.read_line(&mut line)?;
    if read == 0 {
        return Err(KeyforgeError::InputError(format!(
            "input closed before answering: {}",
            question.trim()
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask for the amount and the save flag, in that order.
pub fn read_run_request<I: BufRead, O: Write>(mut input: I, mut output: O) -> KeyforgeResult<RunRequest> {
    let amount = ask(
        &mut input,
        &mut output,
        "Enter the amount of keys to generate (default 10): ",
    )?;
    let save = ask(&mut input, &mut output, "Save to file? (yes/no): ")?;

    let amount = if amount.is_empty() {
        DEFAULT_AMOUNT_INPUT.to_string()
    } else {
        amount
    };

    Ok(RunRequest {
        amount,
        persist: parse_persist_answer(&save),
    })
}
