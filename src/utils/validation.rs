use anyhow::{anyhow, Result};

/// Longest task text accepted from chat.
pub const MAX_TASK_TEXT_CHARS: usize = 500;

pub fn validate_task_text(text: &str) -> Result<&str> {
    let text = text.trim();

    if text.is_empty() {
        return Err(anyhow!("Task text cannot be empty"));
    }

    if text.chars().count() > MAX_TASK_TEXT_CHARS {
        return Err(anyhow!("Task text cannot be longer than {} characters", MAX_TASK_TEXT_CHARS));
    }

    Ok(text)
}

/// Parses a task number as shown in the list (1-based) into a list index.
pub fn parse_task_number(raw: &str) -> Result<usize> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(anyhow!("Task number is missing"));
    }

    let number: usize = raw
        .strip_prefix('#')
        .unwrap_or(raw)
        .parse()
        .map_err(|_| anyhow!("'{}' is not a task number", raw))?;

    if number == 0 {
        return Err(anyhow!("Task numbers start at 1"));
    }

    Ok(number - 1)
}

/// Splits `"<n> [time phrase]"` into a list index and the optional phrase.
pub fn split_task_argument(args: &str) -> Result<(usize, Option<&str>)> {
    let args = args.trim();
    let (number, rest) = match args.split_once(char::is_whitespace) {
        Some((number, rest)) => (number, Some(rest.trim())),
        None => (args, None),
    };

    let index = parse_task_number(number)?;
    Ok((index, rest.filter(|phrase| !phrase.is_empty())))
}

pub fn is_skip_answer(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "skip" | "no" | "-" | "нет" | "пропустить"
    )
}

pub fn is_yes_answer(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "yes" | "y" | "да" | "+")
}
