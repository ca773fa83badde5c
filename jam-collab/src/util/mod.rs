mod code;
mod id;

pub use code::*;
pub use id::*;

/// Trims `input` and checks its character count is within `min..=max`.
pub(crate) fn trimmed_within(input: &str, min: usize, max: usize) -> Option<String> {
    let trimmed = input.trim();
    let length = trimmed.chars().count();

    (min..=max).contains(&length).then(|| trimmed.to_string())
}
